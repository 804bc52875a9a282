use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Input columns every order snapshot must carry, in canonical order.
pub const REQUIRED_COLUMNS: [&str; 8] = [
    "Customer ID",
    "Customer Name",
    "Segment",
    "State",
    "Order Date",
    "Sales",
    "Quantity",
    "Profit",
];

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CustomerId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RegionId(pub String);

/// One transaction line. Numeric cells are optional because the source
/// snapshot may leave them empty; aggregations skip missing values.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub customer_id: CustomerId,
    pub customer_name: String,
    pub segment: String,
    pub region: RegionId,
    pub order_date: NaiveDate,
    pub sales: Option<f64>,
    pub quantity: Option<f64>,
    pub profit: Option<f64>,
}

/// Column an RFM table is grouped by.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupingKey {
    Customer,
    Region,
}

impl GroupingKey {
    pub fn column_name(&self) -> &'static str {
        match self {
            Self::Customer => "Customer ID",
            Self::Region => "State",
        }
    }

    pub fn key_of<'a>(&self, record: &'a OrderRecord) -> &'a str {
        match self {
            Self::Customer => &record.customer_id.0,
            Self::Region => &record.region.0,
        }
    }
}

impl std::fmt::Display for GroupingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.column_name())
    }
}
