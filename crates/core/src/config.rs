use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::clustering::ClusteringSettings;
use crate::features::{FeatureSettings, MonetaryAggregation, RecencyReference};
use crate::ml::ClassifierSettings;
use crate::pipeline::PipelineSettings;
use crate::similarity::SimilaritySettings;

pub const CONFIG_FILE_CANDIDATES: [&str; 2] = ["storelens.toml", "config/storelens.toml"];

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AppConfig {
    pub input: InputConfig,
    pub output: OutputConfig,
    pub features: FeatureSettings,
    pub similarity: SimilaritySettings,
    pub clustering: ClusteringSettings,
    pub classifier: ClassifierSettings,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct InputConfig {
    pub path: PathBuf,
    /// `chrono` formats tried in order for the `Order Date` column.
    pub date_formats: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct OutputConfig {
    pub dir: PathBuf,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub input_path: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub log_level: Option<String>,
    pub neighbors: Option<usize>,
    pub clusters: Option<usize>,
    pub seed: Option<u64>,
    pub evaluate_on_holdout: Option<bool>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

pub fn default_date_formats() -> Vec<String> {
    vec!["%Y-%m-%d".to_string(), "%m/%d/%Y".to_string()]
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            input: InputConfig {
                path: PathBuf::from("dados/ss.csv"),
                date_formats: default_date_formats(),
            },
            output: OutputConfig { dir: PathBuf::from("dados") },
            features: FeatureSettings::default(),
            similarity: SimilaritySettings::default(),
            clustering: ClusteringSettings::default(),
            classifier: ClassifierSettings::default(),
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Compact => f.write_str("compact"),
            Self::Pretty => f.write_str("pretty"),
            Self::Json => f.write_str("json"),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from(CONFIG_FILE_CANDIDATES[0]));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            features: self.features,
            similarity: self.similarity,
            clustering: self.clustering,
            classifier: self.classifier,
        }
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(input) = patch.input {
            if let Some(path) = input.path {
                self.input.path = path;
            }
            if let Some(date_formats) = input.date_formats {
                self.input.date_formats = date_formats;
            }
        }

        if let Some(output) = patch.output {
            if let Some(dir) = output.dir {
                self.output.dir = dir;
            }
        }

        if let Some(features) = patch.features {
            if let Some(monetary) = features.monetary {
                self.features.monetary = monetary;
            }
            if let Some(recency_reference) = features.recency_reference {
                self.features.recency_reference = recency_reference;
            }
        }

        if let Some(similarity) = patch.similarity {
            if let Some(neighbors) = similarity.neighbors {
                self.similarity.neighbors = neighbors;
            }
        }

        if let Some(clustering) = patch.clustering {
            if let Some(clusters) = clustering.clusters {
                self.clustering.clusters = clusters;
            }
            if let Some(seed) = clustering.seed {
                self.clustering.seed = seed;
            }
            if let Some(max_iterations) = clustering.max_iterations {
                self.clustering.max_iterations = max_iterations;
            }
            if let Some(n_runs) = clustering.n_runs {
                self.clustering.n_runs = n_runs;
            }
            if let Some(tolerance) = clustering.tolerance {
                self.clustering.tolerance = tolerance;
            }
        }

        if let Some(classifier) = patch.classifier {
            if let Some(evaluate_on_holdout) = classifier.evaluate_on_holdout {
                self.classifier.evaluate_on_holdout = evaluate_on_holdout;
            }
            if let Some(holdout_fraction) = classifier.holdout_fraction {
                self.classifier.holdout_fraction = holdout_fraction;
            }
            if let Some(regularization) = classifier.regularization {
                self.classifier.regularization = regularization;
            }
            if let Some(max_iterations) = classifier.max_iterations {
                self.classifier.max_iterations = max_iterations;
            }
            if let Some(seed) = classifier.seed {
                self.classifier.seed = seed;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("STORELENS_INPUT_PATH") {
            self.input.path = PathBuf::from(value);
        }
        if let Some(value) = read_env("STORELENS_INPUT_DATE_FORMATS") {
            self.input.date_formats = value
                .split(',')
                .map(str::trim)
                .filter(|format| !format.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(value) = read_env("STORELENS_OUTPUT_DIR") {
            self.output.dir = PathBuf::from(value);
        }

        if let Some(value) = read_env("STORELENS_FEATURES_MONETARY") {
            self.features.monetary =
                parse_env::<MonetaryAggregation>("STORELENS_FEATURES_MONETARY", &value)?;
        }
        if let Some(value) = read_env("STORELENS_FEATURES_RECENCY_REFERENCE") {
            self.features.recency_reference =
                parse_env::<RecencyReference>("STORELENS_FEATURES_RECENCY_REFERENCE", &value)?;
        }

        if let Some(value) = read_env("STORELENS_SIMILARITY_NEIGHBORS") {
            self.similarity.neighbors = parse_env("STORELENS_SIMILARITY_NEIGHBORS", &value)?;
        }

        if let Some(value) = read_env("STORELENS_CLUSTERING_CLUSTERS") {
            self.clustering.clusters = parse_env("STORELENS_CLUSTERING_CLUSTERS", &value)?;
        }
        if let Some(value) = read_env("STORELENS_CLUSTERING_SEED") {
            self.clustering.seed = parse_env("STORELENS_CLUSTERING_SEED", &value)?;
        }
        if let Some(value) = read_env("STORELENS_CLUSTERING_MAX_ITERATIONS") {
            self.clustering.max_iterations =
                parse_env("STORELENS_CLUSTERING_MAX_ITERATIONS", &value)?;
        }
        if let Some(value) = read_env("STORELENS_CLUSTERING_N_RUNS") {
            self.clustering.n_runs = parse_env("STORELENS_CLUSTERING_N_RUNS", &value)?;
        }
        if let Some(value) = read_env("STORELENS_CLUSTERING_TOLERANCE") {
            self.clustering.tolerance = parse_env("STORELENS_CLUSTERING_TOLERANCE", &value)?;
        }

        if let Some(value) = read_env("STORELENS_CLASSIFIER_EVALUATE_ON_HOLDOUT") {
            self.classifier.evaluate_on_holdout =
                parse_env("STORELENS_CLASSIFIER_EVALUATE_ON_HOLDOUT", &value)?;
        }
        if let Some(value) = read_env("STORELENS_CLASSIFIER_HOLDOUT_FRACTION") {
            self.classifier.holdout_fraction =
                parse_env("STORELENS_CLASSIFIER_HOLDOUT_FRACTION", &value)?;
        }
        if let Some(value) = read_env("STORELENS_CLASSIFIER_REGULARIZATION") {
            self.classifier.regularization =
                parse_env("STORELENS_CLASSIFIER_REGULARIZATION", &value)?;
        }
        if let Some(value) = read_env("STORELENS_CLASSIFIER_MAX_ITERATIONS") {
            self.classifier.max_iterations =
                parse_env("STORELENS_CLASSIFIER_MAX_ITERATIONS", &value)?;
        }
        if let Some(value) = read_env("STORELENS_CLASSIFIER_SEED") {
            self.classifier.seed = parse_env("STORELENS_CLASSIFIER_SEED", &value)?;
        }

        let log_level =
            read_env("STORELENS_LOGGING_LEVEL").or_else(|| read_env("STORELENS_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("STORELENS_LOGGING_FORMAT").or_else(|| read_env("STORELENS_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(input_path) = overrides.input_path {
            self.input.path = input_path;
        }
        if let Some(output_dir) = overrides.output_dir {
            self.output.dir = output_dir;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(neighbors) = overrides.neighbors {
            self.similarity.neighbors = neighbors;
        }
        if let Some(clusters) = overrides.clusters {
            self.clustering.clusters = clusters;
        }
        if let Some(seed) = overrides.seed {
            self.clustering.seed = seed;
            self.classifier.seed = seed;
        }
        if let Some(evaluate_on_holdout) = overrides.evaluate_on_holdout {
            self.classifier.evaluate_on_holdout = evaluate_on_holdout;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_input(&self.input)?;
        validate_output(&self.output)?;
        validate_similarity(&self.similarity)?;
        validate_clustering(&self.clustering)?;
        validate_classifier(&self.classifier)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

/// Config file `load` would pick up, if any.
pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    CONFIG_FILE_CANDIDATES.into_iter().map(PathBuf::from).find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_input(input: &InputConfig) -> Result<(), ConfigError> {
    if input.path.as_os_str().is_empty() {
        return Err(ConfigError::Validation("input.path must not be empty".to_string()));
    }
    if input.date_formats.is_empty() {
        return Err(ConfigError::Validation(
            "input.date_formats must list at least one chrono format (e.g. `%Y-%m-%d`)"
                .to_string(),
        ));
    }
    Ok(())
}

fn validate_output(output: &OutputConfig) -> Result<(), ConfigError> {
    if output.dir.as_os_str().is_empty() {
        return Err(ConfigError::Validation("output.dir must not be empty".to_string()));
    }
    Ok(())
}

fn validate_similarity(similarity: &SimilaritySettings) -> Result<(), ConfigError> {
    if similarity.neighbors == 0 {
        return Err(ConfigError::Validation(
            "similarity.neighbors must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn validate_clustering(clustering: &ClusteringSettings) -> Result<(), ConfigError> {
    if clustering.clusters == 0 {
        return Err(ConfigError::Validation(
            "clustering.clusters must be greater than zero".to_string(),
        ));
    }
    if clustering.max_iterations == 0 {
        return Err(ConfigError::Validation(
            "clustering.max_iterations must be greater than zero".to_string(),
        ));
    }
    if clustering.n_runs == 0 {
        return Err(ConfigError::Validation(
            "clustering.n_runs must be greater than zero".to_string(),
        ));
    }
    if !(clustering.tolerance.is_finite() && clustering.tolerance > 0.0) {
        return Err(ConfigError::Validation(
            "clustering.tolerance must be a positive number".to_string(),
        ));
    }
    Ok(())
}

fn validate_classifier(classifier: &ClassifierSettings) -> Result<(), ConfigError> {
    let fraction = classifier.holdout_fraction;
    if !(fraction > 0.0 && fraction < 1.0) {
        return Err(ConfigError::Validation(
            "classifier.holdout_fraction must be strictly between 0 and 1".to_string(),
        ));
    }
    if !(classifier.regularization.is_finite() && classifier.regularization > 0.0) {
        return Err(ConfigError::Validation(
            "classifier.regularization must be a positive number".to_string(),
        ));
    }
    if classifier.max_iterations == 0 {
        return Err(ConfigError::Validation(
            "classifier.max_iterations must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_env<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse::<T>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigPatch {
    input: Option<InputPatch>,
    output: Option<OutputPatch>,
    features: Option<FeaturesPatch>,
    similarity: Option<SimilarityPatch>,
    clustering: Option<ClusteringPatch>,
    classifier: Option<ClassifierPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct InputPatch {
    path: Option<PathBuf>,
    date_formats: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct OutputPatch {
    dir: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct FeaturesPatch {
    monetary: Option<MonetaryAggregation>,
    recency_reference: Option<RecencyReference>,
}

#[derive(Debug, Default, Deserialize)]
struct SimilarityPatch {
    neighbors: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct ClusteringPatch {
    clusters: Option<usize>,
    seed: Option<u64>,
    max_iterations: Option<u64>,
    n_runs: Option<usize>,
    tolerance: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct ClassifierPatch {
    evaluate_on_holdout: Option<bool>,
    holdout_fraction: Option<f64>,
    regularization: Option<f64>,
    max_iterations: Option<usize>,
    seed: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
