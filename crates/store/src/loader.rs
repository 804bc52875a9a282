//! CSV order snapshot loader.
//!
//! The snapshot must carry every column in [`REQUIRED_COLUMNS`]; extra
//! columns are ignored. Empty numeric cells load as missing values.

use std::fs;
use std::io::Read;
use std::path::Path;

use chrono::NaiveDate;
use tracing::info;

use storelens_core::domain::order::{CustomerId, OrderRecord, RegionId, REQUIRED_COLUMNS};
use storelens_core::errors::InputError;

use crate::error::StoreError;
use crate::manifest::InputFingerprint;

#[derive(Clone, Debug, PartialEq)]
pub struct LoadedOrders {
    pub records: Vec<OrderRecord>,
    pub fingerprint: InputFingerprint,
}

/// Positions of the required columns within one snapshot's header row.
struct ColumnIndex {
    customer_id: usize,
    customer_name: usize,
    segment: usize,
    state: usize,
    order_date: usize,
    sales: usize,
    quantity: usize,
    profit: usize,
}

impl ColumnIndex {
    fn from_headers(headers: &csv::StringRecord) -> Result<Self, InputError> {
        let position = |column: &str| {
            headers
                .iter()
                .position(|header| header.trim_start_matches('\u{feff}') == column)
                .ok_or_else(|| InputError::MissingColumn { column: column.to_string() })
        };

        Ok(Self {
            customer_id: position("Customer ID")?,
            customer_name: position("Customer Name")?,
            segment: position("Segment")?,
            state: position("State")?,
            order_date: position("Order Date")?,
            sales: position("Sales")?,
            quantity: position("Quantity")?,
            profit: position("Profit")?,
        })
    }
}

fn csv_reader<R: Read>(reader: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new().has_headers(true).trim(csv::Trim::All).from_reader(reader)
}

/// Required columns absent from `headers`, in canonical order.
pub fn missing_columns(headers: &[String]) -> Vec<&'static str> {
    REQUIRED_COLUMNS
        .into_iter()
        .filter(|column| {
            !headers.iter().any(|header| header.trim_start_matches('\u{feff}') == *column)
        })
        .collect()
}

/// Header row of the snapshot at `path`.
pub fn read_header(path: &Path) -> Result<Vec<String>, StoreError> {
    let file = fs::File::open(path)
        .map_err(|source| StoreError::Read { path: path.to_path_buf(), source })?;
    let mut reader = csv_reader(file);
    let headers =
        reader.headers().map_err(|error| InputError::Malformed(error.to_string()))?;
    Ok(headers.iter().map(str::to_string).collect())
}

pub fn load_orders(path: &Path, date_formats: &[String]) -> Result<LoadedOrders, StoreError> {
    let bytes =
        fs::read(path).map_err(|source| StoreError::Read { path: path.to_path_buf(), source })?;
    let records = parse_orders(bytes.as_slice(), date_formats)?;
    let fingerprint = InputFingerprint {
        path: path.display().to_string(),
        records: records.len(),
        blake3: blake3::hash(&bytes).to_hex().to_string(),
    };

    info!(
        event_name = "store.input.loaded",
        path = %path.display(),
        records = records.len(),
        "order snapshot loaded"
    );

    Ok(LoadedOrders { records, fingerprint })
}

pub fn parse_orders<R: Read>(
    reader: R,
    date_formats: &[String],
) -> Result<Vec<OrderRecord>, InputError> {
    let mut reader = csv_reader(reader);
    let headers = reader.headers().map_err(|error| InputError::Malformed(error.to_string()))?;
    let columns = ColumnIndex::from_headers(headers)?;

    let mut records = Vec::new();
    for (index, result) in reader.records().enumerate() {
        let row = result.map_err(|error| InputError::Malformed(error.to_string()))?;
        let line = row.position().map(|position| position.line() as usize).unwrap_or(index + 2);
        records.push(parse_row(&row, line, &columns, date_formats)?);
    }

    if records.is_empty() {
        return Err(InputError::Empty);
    }
    Ok(records)
}

fn parse_row(
    row: &csv::StringRecord,
    line: usize,
    columns: &ColumnIndex,
    date_formats: &[String],
) -> Result<OrderRecord, InputError> {
    let cell = |index: usize| row.get(index).unwrap_or("");

    Ok(OrderRecord {
        customer_id: CustomerId(key_cell(cell(columns.customer_id), line, "Customer ID")?),
        customer_name: cell(columns.customer_name).to_string(),
        segment: cell(columns.segment).to_string(),
        region: RegionId(key_cell(cell(columns.state), line, "State")?),
        order_date: parse_date(cell(columns.order_date), line, date_formats)?,
        sales: parse_number(cell(columns.sales), line, "Sales")?,
        quantity: parse_number(cell(columns.quantity), line, "Quantity")?,
        profit: parse_number(cell(columns.profit), line, "Profit")?,
    })
}

fn key_cell(value: &str, line: usize, column: &str) -> Result<String, InputError> {
    if value.is_empty() {
        return Err(InputError::EmptyKey { line, column: column.to_string() });
    }
    Ok(value.to_string())
}

fn parse_date(value: &str, line: usize, formats: &[String]) -> Result<NaiveDate, InputError> {
    formats
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(value, format).ok())
        .ok_or_else(|| InputError::UnparseableDate {
            line,
            value: value.to_string(),
            formats: formats.join(", "),
        })
}

/// Empty cells and `NaN` load as missing.
fn parse_number(value: &str, line: usize, column: &str) -> Result<Option<f64>, InputError> {
    if value.is_empty() {
        return Ok(None);
    }
    let parsed = value.parse::<f64>().map_err(|_| InputError::UnparseableNumber {
        line,
        column: column.to_string(),
        value: value.to_string(),
    })?;
    Ok((!parsed.is_nan()).then_some(parsed))
}
