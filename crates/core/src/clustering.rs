//! Region clustering in RFM space.
//!
//! A single seeded k-means fit (k-means++ initialization, best of `n_runs`)
//! yields both the per-region labels and the centroid vectors. Every region
//! row is joined with its cluster's centroid profile.

use std::collections::HashSet;

use linfa::prelude::*;
use linfa_clustering::KMeans;
use ndarray::Array2;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256Plus;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::artifacts::{ClusterAssignment, ClusterCentroid, RfmFeatureRow, RFM_DIMENSIONS};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClusteringSettings {
    pub clusters: usize,
    pub seed: u64,
    pub max_iterations: u64,
    pub n_runs: usize,
    pub tolerance: f64,
}

impl Default for ClusteringSettings {
    fn default() -> Self {
        Self { clusters: 5, seed: 0, max_iterations: 300, n_runs: 10, tolerance: 1e-4 }
    }
}

#[derive(Clone, Debug, Error, PartialEq)]
pub enum ClusteringError {
    #[error("cluster count must be greater than zero")]
    InvalidClusterCount,
    #[error("{clusters} clusters requested but only {distinct} distinct regions are available")]
    TooFewSamples { clusters: usize, distinct: usize },
    #[error("region `{region}` has a non-finite feature value")]
    NonFiniteFeature { region: String },
    #[error("k-means fit failed: {0}")]
    Fit(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct RegionClustering {
    pub assignments: Vec<ClusterAssignment>,
    pub centroids: Vec<ClusterCentroid>,
}

impl RegionClustering {
    pub fn labels(&self) -> Vec<usize> {
        self.assignments.iter().map(|assignment| assignment.cluster).collect()
    }
}

fn centroid_from(cluster: usize, values: &[f64]) -> ClusterCentroid {
    ClusterCentroid {
        cluster,
        f_sales: values[0],
        f_profit: values[1],
        m_profit: values[2],
        m_quantity: values[3],
        m_sales: values[4],
        r_days: values[5],
    }
}

pub fn cluster_regions(
    rows: &[RfmFeatureRow],
    settings: &ClusteringSettings,
) -> Result<RegionClustering, ClusteringError> {
    if settings.clusters == 0 {
        return Err(ClusteringError::InvalidClusterCount);
    }
    if let Some(row) = rows.iter().find(|row| row.vector().iter().any(|value| !value.is_finite())) {
        return Err(ClusteringError::NonFiniteFeature { region: row.reference.clone() });
    }

    let distinct = rows
        .iter()
        .map(|row| row.vector().map(f64::to_bits))
        .collect::<HashSet<_>>()
        .len();
    if distinct < settings.clusters {
        return Err(ClusteringError::TooFewSamples { clusters: settings.clusters, distinct });
    }

    let flat: Vec<f64> = rows.iter().flat_map(RfmFeatureRow::vector).collect();
    let observations = Array2::from_shape_vec((rows.len(), RFM_DIMENSIONS), flat)
        .map_err(|error| ClusteringError::Fit(error.to_string()))?;
    let dataset = DatasetBase::from(observations.clone());

    let model = KMeans::params_with_rng(settings.clusters, Xoshiro256Plus::seed_from_u64(settings.seed))
        .n_runs(settings.n_runs)
        .max_n_iterations(settings.max_iterations)
        .tolerance(settings.tolerance)
        .fit(&dataset)
        .map_err(|error| ClusteringError::Fit(error.to_string()))?;

    let labels = model.predict(&observations);
    let centroids: Vec<ClusterCentroid> = model
        .centroids()
        .outer_iter()
        .enumerate()
        .map(|(cluster, center)| centroid_from(cluster, &center.to_vec()))
        .collect();

    let assignments = rows
        .iter()
        .zip(labels.iter())
        .map(|(row, label)| ClusterAssignment::join(row, &centroids[*label]))
        .collect();

    Ok(RegionClustering { assignments, centroids })
}

#[cfg(test)]
mod tests {
    use crate::domain::artifacts::RfmFeatureRow;

    use super::{cluster_regions, ClusteringError, ClusteringSettings};

    fn row(reference: &str, m_sales: f64, r_days: f64) -> RfmFeatureRow {
        RfmFeatureRow {
            reference: reference.to_owned(),
            f_sales: 10.0,
            f_profit: 5.0,
            m_profit: m_sales * 0.1,
            m_quantity: 20.0,
            m_sales,
            r_days,
        }
    }

    fn three_groups() -> Vec<RfmFeatureRow> {
        vec![
            row("A1", 100.0, 1.0),
            row("A2", 110.0, 2.0),
            row("A3", 105.0, 1.0),
            row("B1", 5_000.0, 30.0),
            row("B2", 5_100.0, 31.0),
            row("B3", 4_950.0, 29.0),
            row("C1", 20_000.0, 90.0),
            row("C2", 20_300.0, 92.0),
        ]
    }

    fn settings(clusters: usize) -> ClusteringSettings {
        ClusteringSettings { clusters, ..ClusteringSettings::default() }
    }

    #[test]
    fn same_seed_reproduces_assignments() {
        let rows = three_groups();

        let first = cluster_regions(&rows, &settings(3)).expect("clustering");
        let second = cluster_regions(&rows, &settings(3)).expect("clustering");

        assert_eq!(first.labels(), second.labels());
        assert_eq!(first, second);
    }

    #[test]
    fn well_separated_groups_share_clusters() {
        let result = cluster_regions(&three_groups(), &settings(3)).expect("clustering");
        let labels = result.labels();

        assert_eq!(labels[0], labels[1]);
        assert_eq!(labels[1], labels[2]);
        assert_eq!(labels[3], labels[4]);
        assert_eq!(labels[4], labels[5]);
        assert_eq!(labels[6], labels[7]);
        assert_ne!(labels[0], labels[3]);
        assert_ne!(labels[3], labels[6]);
        assert_eq!(result.centroids.len(), 3);
    }

    #[test]
    fn every_row_carries_its_cluster_centroid() {
        let result = cluster_regions(&three_groups(), &settings(3)).expect("clustering");

        for assignment in &result.assignments {
            let centroid = &result.centroids[assignment.cluster];
            assert_eq!(centroid.cluster, assignment.cluster);
            assert_eq!(assignment.centroid_m_sales, centroid.m_sales);
            assert_eq!(assignment.centroid_r_days, centroid.r_days);
        }
        let c_group = &result.assignments[6];
        assert!((c_group.centroid_m_sales - 20_150.0).abs() < 1e-6);
    }

    #[test]
    fn too_few_distinct_regions_is_an_error() {
        let rows = vec![row("A", 1.0, 1.0), row("B", 2.0, 2.0), row("C", 2.0, 2.0)];

        assert_eq!(
            cluster_regions(&rows, &settings(3)),
            Err(ClusteringError::TooFewSamples { clusters: 3, distinct: 2 })
        );
    }

    #[test]
    fn zero_clusters_is_rejected() {
        assert_eq!(
            cluster_regions(&three_groups(), &settings(0)),
            Err(ClusteringError::InvalidClusterCount)
        );
    }
}
