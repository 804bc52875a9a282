//! Customer value classification.
//!
//! The score is the sum of the sample z-scores of a customer's mean sales,
//! quantity and profit. The class is the floor of the standardized score
//! shifted by three and clamped to `0..=6`, so it always depends on the whole
//! customer population.

use std::cmp::Ordering;

use thiserror::Error;

use crate::domain::artifacts::CustomerClassification;
use crate::features::GroupMeans;
use crate::stats::{z_scores_or_zero, Deviation, NormalizeError};

pub const MIN_CLASS: u8 = 0;
pub const MAX_CLASS: u8 = 6;
const CLASS_OFFSET: f64 = 3.0;

#[derive(Clone, Debug, Error, PartialEq)]
pub enum ScoringError {
    #[error("cannot classify an empty customer population")]
    EmptyPopulation,
    #[error(transparent)]
    Normalize(#[from] NormalizeError),
}

/// Maps a standardized score to a class in `MIN_CLASS..=MAX_CLASS`.
pub fn class_for(standardized_score: f64) -> u8 {
    if !standardized_score.is_finite() {
        return if standardized_score.is_nan() {
            CLASS_OFFSET as u8
        } else if standardized_score > 0.0 {
            MAX_CLASS
        } else {
            MIN_CLASS
        };
    }
    (standardized_score.floor() + CLASS_OFFSET).clamp(f64::from(MIN_CLASS), f64::from(MAX_CLASS))
        as u8
}

/// Dense descending rank: the highest score gets 1 and equal scores share a
/// rank.
pub fn dense_rank_descending(scores: &[f64]) -> Vec<u32> {
    // `-0.0 + 0.0` is `+0.0`, so both zeros land on one rank under `total_cmp`.
    let normalized: Vec<f64> = scores.iter().map(|score| score + 0.0).collect();
    let mut distinct = normalized.clone();
    distinct.sort_by(|left, right| right.total_cmp(left));
    distinct.dedup_by(|left, right| left.total_cmp(right) == Ordering::Equal);

    normalized
        .iter()
        .map(|score| {
            let position = distinct
                .binary_search_by(|probe| score.total_cmp(probe))
                .unwrap_or_else(|insert_at| insert_at);
            position as u32 + 1
        })
        .collect()
}

pub fn profit_flag(mean_profit: f64) -> u8 {
    u8::from(mean_profit >= 0.0)
}

pub fn classify_customers(
    customers: &[GroupMeans],
) -> Result<Vec<CustomerClassification>, ScoringError> {
    if customers.is_empty() {
        return Err(ScoringError::EmptyPopulation);
    }

    let sales: Vec<f64> = customers.iter().map(|customer| customer.sales).collect();
    let quantity: Vec<f64> = customers.iter().map(|customer| customer.quantity).collect();
    let profit: Vec<f64> = customers.iter().map(|customer| customer.profit).collect();

    let z_sales = z_scores_or_zero(&sales, Deviation::Sample, "Sales")?;
    let z_quantity = z_scores_or_zero(&quantity, Deviation::Sample, "Quantity")?;
    let z_profit = z_scores_or_zero(&profit, Deviation::Sample, "Profit")?;

    let scores: Vec<f64> = (0..customers.len())
        .map(|index| z_sales[index] + z_quantity[index] + z_profit[index])
        .collect();
    let standardized = z_scores_or_zero(&scores, Deviation::Sample, "score")?;
    let ranks = dense_rank_descending(&scores);

    Ok(customers
        .iter()
        .enumerate()
        .map(|(index, customer)| CustomerClassification {
            customer_id: customer.key.clone(),
            sales: customer.sales,
            quantity: customer.quantity,
            profit: customer.profit,
            z_sales: z_sales[index],
            z_quantity: z_quantity[index],
            z_profit: z_profit[index],
            score: scores[index],
            classe: class_for(standardized[index]),
            rank: ranks[index],
            lucro: profit_flag(customer.profit),
        })
        .collect())
}
