use thiserror::Error;

use crate::{
    clustering::ClusteringError, features::FeatureError, ml::ClassifierError,
    scoring::ScoringError, similarity::SimilarityError,
};

/// Problems with the order snapshot itself. Any of these aborts the run
/// before an artifact is written.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InputError {
    #[error("required column `{column}` is missing from the order snapshot")]
    MissingColumn { column: String },
    #[error("order snapshot contains no records")]
    Empty,
    #[error("line {line}: could not parse order date `{value}` (accepted formats: {formats})")]
    UnparseableDate { line: usize, value: String, formats: String },
    #[error("line {line}: could not parse `{column}` value `{value}` as a number")]
    UnparseableNumber { line: usize, column: String, value: String },
    #[error("line {line}: `{column}` must not be empty")]
    EmptyKey { line: usize, column: String },
    #[error("malformed order snapshot: {0}")]
    Malformed(String),
}

#[derive(Clone, Debug, Error, PartialEq)]
pub enum PipelineError {
    #[error(transparent)]
    Input(#[from] InputError),
    #[error("feature derivation failed: {0}")]
    Features(#[from] FeatureError),
    #[error("customer scoring failed: {0}")]
    Scoring(#[from] ScoringError),
    #[error("profitability classifier failed: {0}")]
    Classifier(#[from] ClassifierError),
    #[error("region similarity failed: {0}")]
    Similarity(#[from] SimilarityError),
    #[error("region clustering failed: {0}")]
    Clustering(#[from] ClusteringError),
}

impl PipelineError {
    /// Stable machine-readable class for command output.
    pub fn error_class(&self) -> &'static str {
        match self {
            Self::Input(_) | Self::Features(FeatureError::EmptyInput) => "input_validation",
            Self::Scoring(_) => "customer_scoring",
            Self::Classifier(_) => "classifier_fit",
            Self::Similarity(_) => "similarity",
            Self::Clustering(_) => "clustering",
        }
    }
}
