pub mod clustering;
pub mod config;
pub mod domain;
pub mod errors;
pub mod features;
pub mod ml;
pub mod pipeline;
pub mod scoring;
pub mod similarity;
pub mod stats;

pub use clustering::{cluster_regions, ClusteringError, ClusteringSettings, RegionClustering};
pub use domain::artifacts::{
    ClusterAssignment, ClusterCentroid, CustomerClassification, RegionalProbability,
    RfmFeatureRow, SimilarityEdge,
};
pub use domain::order::{CustomerId, GroupingKey, OrderRecord, RegionId, REQUIRED_COLUMNS};
pub use errors::{InputError, PipelineError};
pub use features::{build_rfm, group_means, FeatureSettings, GroupMeans};
pub use ml::{predict_profitability, ClassifierSettings, ModelMetrics, ProfitabilityReport};
pub use pipeline::{run, PipelineOutput, PipelineSettings};
pub use scoring::classify_customers;
pub use similarity::{nearest_neighbors, SimilarityError, SimilaritySettings};
