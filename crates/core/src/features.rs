//! RFM feature derivation.
//!
//! Frequency counts order lines (`f_sales`) and order lines with a
//! non-negative profit (`f_profit`), the same zero-inclusive boundary the
//! `lucro` flag uses. Monetary columns are sums or means of the
//! non-missing values depending on [`MonetaryAggregation`]. Recency is the
//! number of whole days between the configured reference date and the key's
//! most recent order. Every aggregate without data is emitted as `0.0`.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::artifacts::RfmFeatureRow;
use crate::domain::order::{GroupingKey, OrderRecord};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonetaryAggregation {
    #[default]
    Sum,
    Mean,
}

impl FromStr for MonetaryAggregation {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "sum" => Ok(Self::Sum),
            "mean" => Ok(Self::Mean),
            other => Err(format!("unsupported monetary aggregation `{other}` (expected sum|mean)")),
        }
    }
}

/// Date recency is measured against.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum RecencyReference {
    /// Most recent order date in the whole input.
    #[default]
    LatestOrder,
    /// Current UTC calendar date at run time.
    Today,
    Fixed(NaiveDate),
}

impl FromStr for RecencyReference {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "latest_order" => Ok(Self::LatestOrder),
            "today" => Ok(Self::Today),
            other => NaiveDate::parse_from_str(other, "%Y-%m-%d").map(Self::Fixed).map_err(|_| {
                format!(
                    "unsupported recency reference `{other}` (expected latest_order|today|YYYY-MM-DD)"
                )
            }),
        }
    }
}

impl TryFrom<String> for RecencyReference {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RecencyReference> for String {
    fn from(value: RecencyReference) -> Self {
        value.to_string()
    }
}

impl fmt::Display for RecencyReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LatestOrder => f.write_str("latest_order"),
            Self::Today => f.write_str("today"),
            Self::Fixed(date) => write!(f, "{}", date.format("%Y-%m-%d")),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSettings {
    pub monetary: MonetaryAggregation,
    pub recency_reference: RecencyReference,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FeatureError {
    #[error("cannot derive features from an empty order set")]
    EmptyInput,
}

/// Per-key means of the three monetary columns, missing values skipped.
#[derive(Clone, Debug, PartialEq)]
pub struct GroupMeans {
    pub key: String,
    pub sales: f64,
    pub quantity: f64,
    pub profit: f64,
}

#[derive(Default)]
struct Accumulator {
    lines: usize,
    profitable_lines: usize,
    sales: ColumnSum,
    quantity: ColumnSum,
    profit: ColumnSum,
    last_order: Option<NaiveDate>,
}

#[derive(Default)]
struct ColumnSum {
    total: f64,
    present: usize,
}

impl ColumnSum {
    fn push(&mut self, value: Option<f64>) {
        if let Some(value) = value.filter(|value| value.is_finite()) {
            self.total += value;
            self.present += 1;
        }
    }

    fn aggregate(&self, aggregation: MonetaryAggregation) -> f64 {
        match aggregation {
            MonetaryAggregation::Sum => self.total,
            MonetaryAggregation::Mean if self.present > 0 => self.total / self.present as f64,
            MonetaryAggregation::Mean => 0.0,
        }
    }
}

fn accumulate<'a>(records: &'a [OrderRecord], key: GroupingKey) -> BTreeMap<&'a str, Accumulator> {
    let mut groups: BTreeMap<&str, Accumulator> = BTreeMap::new();
    for record in records {
        let entry = groups.entry(key.key_of(record)).or_default();
        entry.lines += 1;
        if record.profit.is_some_and(|profit| profit >= 0.0) {
            entry.profitable_lines += 1;
        }
        entry.sales.push(record.sales);
        entry.quantity.push(record.quantity);
        entry.profit.push(record.profit);
        entry.last_order = entry.last_order.max(Some(record.order_date));
    }
    groups
}

pub fn resolve_reference_date(
    records: &[OrderRecord],
    reference: RecencyReference,
) -> Result<NaiveDate, FeatureError> {
    match reference {
        RecencyReference::LatestOrder => records
            .iter()
            .map(|record| record.order_date)
            .max()
            .ok_or(FeatureError::EmptyInput),
        RecencyReference::Today => Ok(Utc::now().date_naive()),
        RecencyReference::Fixed(date) => Ok(date),
    }
}

/// One RFM row per distinct key, ordered by key.
pub fn build_rfm(
    records: &[OrderRecord],
    key: GroupingKey,
    settings: &FeatureSettings,
) -> Result<Vec<RfmFeatureRow>, FeatureError> {
    if records.is_empty() {
        return Err(FeatureError::EmptyInput);
    }
    let reference_date = resolve_reference_date(records, settings.recency_reference)?;

    let rows = accumulate(records, key)
        .into_iter()
        .map(|(reference, group)| RfmFeatureRow {
            reference: reference.to_owned(),
            f_sales: group.lines as f64,
            f_profit: group.profitable_lines as f64,
            m_profit: group.profit.aggregate(settings.monetary),
            m_quantity: group.quantity.aggregate(settings.monetary),
            m_sales: group.sales.aggregate(settings.monetary),
            r_days: group
                .last_order
                .map(|last| (reference_date - last).num_days() as f64)
                .unwrap_or(0.0),
        })
        .collect();

    Ok(rows)
}

/// Mean sales, quantity and profit per key, ordered by key.
pub fn group_means(
    records: &[OrderRecord],
    key: GroupingKey,
) -> Result<Vec<GroupMeans>, FeatureError> {
    if records.is_empty() {
        return Err(FeatureError::EmptyInput);
    }

    Ok(accumulate(records, key)
        .into_iter()
        .map(|(reference, group)| GroupMeans {
            key: reference.to_owned(),
            sales: group.sales.aggregate(MonetaryAggregation::Mean),
            quantity: group.quantity.aggregate(MonetaryAggregation::Mean),
            profit: group.profit.aggregate(MonetaryAggregation::Mean),
        })
        .collect())
}
