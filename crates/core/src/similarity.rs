//! Nearest-neighbor similarity between regions in RFM space.
//!
//! Distances are Euclidean over the six raw RFM dimensions, served by a
//! `linfa-nn` k-d tree. Each row's `k` nearest rows include the row itself;
//! equal distances are ordered with the querying row first and then by input
//! position, so results are stable across runs. The self entry is dropped
//! from the emitted edges.

use std::cmp::Ordering;

use linfa_nn::distance::{Distance, L2Dist};
use linfa_nn::{CommonNearestNeighbour, NearestNeighbour, NearestNeighbourIndex, NnError};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::domain::artifacts::{RfmFeatureRow, SimilarityEdge, RFM_DIMENSIONS};

/// Relative widening of the k-th distance so every row tied with it is
/// gathered before the tie-break is applied.
const TIE_SLACK: f64 = 1e-9;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimilaritySettings {
    /// Neighbors queried per region, the region itself included.
    pub neighbors: usize,
}

impl Default for SimilaritySettings {
    fn default() -> Self {
        Self { neighbors: 6 }
    }
}

#[derive(Clone, Debug, Error, PartialEq)]
pub enum SimilarityError {
    #[error("nearest-neighbor index could not be built: {0}")]
    Index(String),
    #[error("nearest-neighbor query for row {row} failed: {message}")]
    Query { row: usize, message: String },
}

/// Effective neighbor count: the requested count clamped to the population.
pub fn effective_neighbors(requested: usize, population: usize) -> usize {
    requested.min(population)
}

/// Indices of the `k` nearest rows for every row of `observations`, each
/// list starting with the query row itself.
pub fn neighbor_indices(
    observations: &Array2<f64>,
    k: usize,
) -> Result<Vec<Vec<usize>>, SimilarityError> {
    if observations.nrows() == 0 || k == 0 {
        return Ok(vec![Vec::new(); observations.nrows()]);
    }

    let index = CommonNearestNeighbour::KdTree
        .from_batch(observations, L2Dist)
        .map_err(|error| SimilarityError::Index(error.to_string()))?;

    (0..observations.nrows()).map(|row| query_row(index.as_ref(), observations, row, k)).collect()
}

fn query_row(
    index: &(dyn NearestNeighbourIndex<f64> + Send + Sync),
    observations: &Array2<f64>,
    row: usize,
    k: usize,
) -> Result<Vec<usize>, SimilarityError> {
    let query_error =
        |error: NnError| SimilarityError::Query { row, message: error.to_string() };
    let point = observations.row(row);

    let radius = index
        .k_nearest(point, k)
        .map_err(query_error)?
        .iter()
        .map(|(hit, _)| L2Dist.distance(point, hit.view()))
        .fold(0.0, f64::max);

    let mut candidates: Vec<(f64, usize)> = index
        .within_range(point, radius + TIE_SLACK * radius.max(1.0))
        .map_err(query_error)?
        .into_iter()
        .map(|(hit, position)| (L2Dist.distance(point, hit.view()), position))
        .collect();
    candidates.sort_by(|(left_distance, left), (right_distance, right)| {
        left_distance.total_cmp(right_distance).then_with(|| match (*left == row, *right == row) {
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            _ => left.cmp(right),
        })
    });

    Ok(candidates.into_iter().take(k).map(|(_, position)| position).collect())
}

/// Reference→neighbor edges for every region, self-edges excluded.
pub fn nearest_neighbors(
    rows: &[RfmFeatureRow],
    settings: &SimilaritySettings,
) -> Result<Vec<SimilarityEdge>, SimilarityError> {
    let k = effective_neighbors(settings.neighbors, rows.len());
    if k < settings.neighbors {
        debug!(
            event_name = "similarity.neighbors.clamped",
            requested = settings.neighbors,
            effective = k,
            "neighbor count clamped to population size"
        );
    }

    let flat: Vec<f64> = rows.iter().flat_map(RfmFeatureRow::vector).collect();
    let observations = Array2::from_shape_vec((rows.len(), RFM_DIMENSIONS), flat)
        .map_err(|error| SimilarityError::Index(error.to_string()))?;

    Ok(neighbor_indices(&observations, k)?
        .into_iter()
        .enumerate()
        .flat_map(|(query, neighbors)| neighbors.into_iter().map(move |neighbor| (query, neighbor)))
        .filter(|(query, neighbor)| query != neighbor)
        .map(|(query, neighbor)| SimilarityEdge {
            reference: rows[query].reference.clone(),
            neighbor: rows[neighbor].reference.clone(),
        })
        .collect())
}
