//! Batch orchestration of the analytics engines.
//!
//! Engines only borrow the shared aggregates immutably and each runs to
//! completion before anything is handed to the artifact store.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::clustering::{cluster_regions, ClusteringSettings, RegionClustering};
use crate::domain::artifacts::{CustomerClassification, RfmFeatureRow, SimilarityEdge};
use crate::domain::order::{GroupingKey, OrderRecord};
use crate::errors::{InputError, PipelineError};
use crate::features::{build_rfm, group_means, FeatureSettings};
use crate::ml::{predict_profitability, ClassifierSettings, ProfitabilityReport};
use crate::scoring::classify_customers;
use crate::similarity::{nearest_neighbors, SimilaritySettings};

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineSettings {
    pub features: FeatureSettings,
    pub similarity: SimilaritySettings,
    pub clustering: ClusteringSettings,
    pub classifier: ClassifierSettings,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PipelineOutput {
    pub customers: Vec<CustomerClassification>,
    pub profitability: ProfitabilityReport,
    pub similarity: Vec<SimilarityEdge>,
    pub region_features: Vec<RfmFeatureRow>,
    pub clustering: RegionClustering,
}

fn stage_completed(stage: &'static str, rows: usize, started: Instant) {
    info!(
        event_name = "pipeline.stage.completed",
        stage,
        rows,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "pipeline stage completed"
    );
}

pub fn run(
    records: &[OrderRecord],
    settings: &PipelineSettings,
) -> Result<PipelineOutput, PipelineError> {
    if records.is_empty() {
        return Err(InputError::Empty.into());
    }
    info!(
        event_name = "pipeline.run.started",
        records = records.len(),
        "starting analytics pipeline"
    );

    let started = Instant::now();
    let customer_means = group_means(records, GroupingKey::Customer)?;
    let customers = classify_customers(&customer_means)?;
    stage_completed("customer_classification", customers.len(), started);

    let started = Instant::now();
    let region_means = group_means(records, GroupingKey::Region)?;
    let profitability = predict_profitability(&region_means, &settings.classifier)?;
    stage_completed("regional_probability", profitability.rows.len(), started);

    let started = Instant::now();
    let region_features = build_rfm(records, GroupingKey::Region, &settings.features)?;
    stage_completed("region_features", region_features.len(), started);

    let started = Instant::now();
    let similarity = nearest_neighbors(&region_features, &settings.similarity)?;
    stage_completed("region_similarity", similarity.len(), started);

    let started = Instant::now();
    let clustering = cluster_regions(&region_features, &settings.clustering)?;
    stage_completed("region_clustering", clustering.assignments.len(), started);

    Ok(PipelineOutput { customers, profitability, similarity, region_features, clustering })
}
