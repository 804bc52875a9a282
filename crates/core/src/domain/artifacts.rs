//! Output rows handed to the artifact store.
//!
//! Serialized column names are the dashboard contract and must not change.

use serde::{Deserialize, Serialize};

/// Number of RFM dimensions used by the similarity and clustering engines.
pub const RFM_DIMENSIONS: usize = 6;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RfmFeatureRow {
    #[serde(rename = "referencia")]
    pub reference: String,
    #[serde(rename = "f_vendas")]
    pub f_sales: f64,
    #[serde(rename = "f_lucro")]
    pub f_profit: f64,
    #[serde(rename = "m_lucro")]
    pub m_profit: f64,
    #[serde(rename = "m_qtde")]
    pub m_quantity: f64,
    #[serde(rename = "m_vendas")]
    pub m_sales: f64,
    #[serde(rename = "r_dias")]
    pub r_days: f64,
}

impl RfmFeatureRow {
    /// Feature vector in fixed column order.
    pub fn vector(&self) -> [f64; RFM_DIMENSIONS] {
        [self.f_sales, self.f_profit, self.m_profit, self.m_quantity, self.m_sales, self.r_days]
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CustomerClassification {
    #[serde(rename = "Customer ID")]
    pub customer_id: String,
    #[serde(rename = "Sales")]
    pub sales: f64,
    #[serde(rename = "Quantity")]
    pub quantity: f64,
    #[serde(rename = "Profit")]
    pub profit: f64,
    #[serde(rename = "zSales")]
    pub z_sales: f64,
    #[serde(rename = "zQuantity")]
    pub z_quantity: f64,
    #[serde(rename = "zProfit")]
    pub z_profit: f64,
    pub score: f64,
    pub classe: u8,
    pub rank: u32,
    pub lucro: u8,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RegionalProbability {
    #[serde(rename = "State")]
    pub state: String,
    #[serde(rename = "Sales")]
    pub sales: f64,
    #[serde(rename = "Quantity")]
    pub quantity: f64,
    #[serde(rename = "Profit")]
    pub profit: f64,
    #[serde(rename = "Lucro")]
    pub lucro: u8,
    pub previsao: u8,
    pub prob_prejuizo: f64,
    pub prob_lucro: f64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimilarityEdge {
    #[serde(rename = "referencia")]
    pub reference: String,
    #[serde(rename = "vizinho")]
    pub neighbor: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClusterCentroid {
    pub cluster: usize,
    #[serde(rename = "clf_vendas")]
    pub f_sales: f64,
    #[serde(rename = "cls_lucro")]
    pub f_profit: f64,
    #[serde(rename = "clm_lucro")]
    pub m_profit: f64,
    #[serde(rename = "clm_qtde")]
    pub m_quantity: f64,
    #[serde(rename = "clm_vendas")]
    pub m_sales: f64,
    #[serde(rename = "clr_dias")]
    pub r_days: f64,
}

/// A region's own RFM values next to its cluster's centroid profile.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClusterAssignment {
    #[serde(rename = "referencia")]
    pub reference: String,
    #[serde(rename = "f_vendas")]
    pub f_sales: f64,
    #[serde(rename = "f_lucro")]
    pub f_profit: f64,
    #[serde(rename = "m_lucro")]
    pub m_profit: f64,
    #[serde(rename = "m_qtde")]
    pub m_quantity: f64,
    #[serde(rename = "m_vendas")]
    pub m_sales: f64,
    #[serde(rename = "r_dias")]
    pub r_days: f64,
    pub cluster: usize,
    #[serde(rename = "clf_vendas")]
    pub centroid_f_sales: f64,
    #[serde(rename = "cls_lucro")]
    pub centroid_f_profit: f64,
    #[serde(rename = "clm_lucro")]
    pub centroid_m_profit: f64,
    #[serde(rename = "clm_qtde")]
    pub centroid_m_quantity: f64,
    #[serde(rename = "clm_vendas")]
    pub centroid_m_sales: f64,
    #[serde(rename = "clr_dias")]
    pub centroid_r_days: f64,
}

impl ClusterAssignment {
    pub fn join(row: &RfmFeatureRow, centroid: &ClusterCentroid) -> Self {
        Self {
            reference: row.reference.clone(),
            f_sales: row.f_sales,
            f_profit: row.f_profit,
            m_profit: row.m_profit,
            m_quantity: row.m_quantity,
            m_sales: row.m_sales,
            r_days: row.r_days,
            cluster: centroid.cluster,
            centroid_f_sales: centroid.f_sales,
            centroid_f_profit: centroid.f_profit,
            centroid_m_profit: centroid.m_profit,
            centroid_m_quantity: centroid.m_quantity,
            centroid_m_sales: centroid.m_sales,
            centroid_r_days: centroid.r_days,
        }
    }
}
