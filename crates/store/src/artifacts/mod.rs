//! Artifact persistence.
//!
//! Every table is encoded in memory before the store is touched. The
//! previous manifest is removed first and the new one written last, so a
//! directory without a manifest always means an incomplete run.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use storelens_core::pipeline::{PipelineOutput, PipelineSettings};

use crate::error::StoreError;
use crate::manifest::{
    ArtifactCheck, ArtifactEntry, ArtifactStatus, ClassifierSummary, InputFingerprint,
    RunManifest, VerificationReport, MANIFEST_FILE, MANIFEST_VERSION,
};

pub mod directory;
pub mod memory;

pub use directory::DirectoryArtifactStore;
pub use memory::InMemoryArtifactStore;

/// Named blob storage for one output location.
pub trait ArtifactStore {
    /// Human-readable location used in logs and errors.
    fn location(&self) -> String;
    fn put(&self, name: &str, contents: &[u8]) -> Result<(), StoreError>;
    fn get(&self, name: &str) -> Result<Option<Vec<u8>>, StoreError>;
    /// Removing an absent name is not an error.
    fn remove(&self, name: &str) -> Result<(), StoreError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    CustomerClassification,
    RegionalProbability,
    RegionSimilarity,
    RegionClusters,
    ClusterCentroids,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 5] = [
        Self::CustomerClassification,
        Self::RegionalProbability,
        Self::RegionSimilarity,
        Self::RegionClusters,
        Self::ClusterCentroids,
    ];

    pub fn file_name(&self) -> &'static str {
        match self {
            Self::CustomerClassification => "classificacao_consumidor.csv",
            Self::RegionalProbability => "probabilidade_estado.csv",
            Self::RegionSimilarity => "knn_estado.csv",
            Self::RegionClusters => "clusterizacao_estado.csv",
            Self::ClusterCentroids => "centroides_estado.csv",
        }
    }

    /// Header row, written even when the table has no rows.
    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            Self::CustomerClassification => &[
                "Customer ID",
                "Sales",
                "Quantity",
                "Profit",
                "zSales",
                "zQuantity",
                "zProfit",
                "score",
                "classe",
                "rank",
                "lucro",
            ],
            Self::RegionalProbability => &[
                "State",
                "Sales",
                "Quantity",
                "Profit",
                "Lucro",
                "previsao",
                "prob_prejuizo",
                "prob_lucro",
            ],
            Self::RegionSimilarity => &["referencia", "vizinho"],
            Self::RegionClusters => &[
                "referencia",
                "f_vendas",
                "f_lucro",
                "m_lucro",
                "m_qtde",
                "m_vendas",
                "r_dias",
                "cluster",
                "clf_vendas",
                "cls_lucro",
                "clm_lucro",
                "clm_qtde",
                "clm_vendas",
                "clr_dias",
            ],
            Self::ClusterCentroids => &[
                "cluster",
                "clf_vendas",
                "cls_lucro",
                "clm_lucro",
                "clm_qtde",
                "clm_vendas",
                "clr_dias",
            ],
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_name())
    }
}

/// Facts about the run that are not part of the pipeline output.
#[derive(Clone, Debug)]
pub struct RunContext {
    pub input: InputFingerprint,
    pub settings: PipelineSettings,
    pub started_at: DateTime<Utc>,
}

struct EncodedTable {
    kind: ArtifactKind,
    rows: usize,
    bytes: Vec<u8>,
}

fn encode_table<T: Serialize>(kind: ArtifactKind, rows: &[T]) -> Result<EncodedTable, StoreError> {
    let encode_error =
        |message: String| StoreError::Encode { name: kind.file_name().to_string(), message };

    let mut writer = csv::Writer::from_writer(Vec::new());
    if rows.is_empty() {
        writer.write_record(kind.columns()).map_err(|error| encode_error(error.to_string()))?;
    }
    for row in rows {
        writer.serialize(row).map_err(|error| encode_error(error.to_string()))?;
    }
    let bytes = writer.into_inner().map_err(|error| encode_error(error.to_string()))?;

    Ok(EncodedTable { kind, rows: rows.len(), bytes })
}

fn encode_all(output: &PipelineOutput) -> Result<Vec<EncodedTable>, StoreError> {
    Ok(vec![
        encode_table(ArtifactKind::CustomerClassification, &output.customers)?,
        encode_table(ArtifactKind::RegionalProbability, &output.profitability.rows)?,
        encode_table(ArtifactKind::RegionSimilarity, &output.similarity)?,
        encode_table(ArtifactKind::RegionClusters, &output.clustering.assignments)?,
        encode_table(ArtifactKind::ClusterCentroids, &output.clustering.centroids)?,
    ])
}

pub fn checksum(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

/// Writes every artifact table and then the manifest.
pub fn write_run(
    store: &dyn ArtifactStore,
    output: &PipelineOutput,
    context: RunContext,
) -> Result<RunManifest, StoreError> {
    let tables = encode_all(output)?;

    store.remove(MANIFEST_FILE)?;

    let mut artifacts = Vec::with_capacity(tables.len());
    for table in tables {
        let file = table.kind.file_name();
        store.put(file, &table.bytes)?;
        info!(
            event_name = "store.artifact.written",
            file,
            rows = table.rows,
            bytes = table.bytes.len(),
            location = %store.location(),
            "artifact written"
        );
        artifacts.push(ArtifactEntry {
            kind: table.kind,
            file: file.to_string(),
            rows: table.rows,
            bytes: table.bytes.len(),
            blake3: checksum(&table.bytes),
        });
    }

    let manifest = RunManifest {
        version: MANIFEST_VERSION,
        run_id: Uuid::new_v4(),
        started_at: context.started_at,
        completed_at: Utc::now(),
        input: context.input,
        settings: context.settings,
        classifier: ClassifierSummary::from(&output.profitability),
        artifacts,
    };
    let encoded = manifest.to_json().map_err(|error| StoreError::Encode {
        name: MANIFEST_FILE.to_string(),
        message: error.to_string(),
    })?;
    store.put(MANIFEST_FILE, &encoded)?;

    info!(
        event_name = "store.manifest.written",
        run_id = %manifest.run_id,
        artifacts = manifest.artifacts.len(),
        location = %store.location(),
        "run manifest written"
    );

    Ok(manifest)
}

pub fn read_manifest(store: &dyn ArtifactStore) -> Result<RunManifest, StoreError> {
    let bytes = store
        .get(MANIFEST_FILE)?
        .ok_or_else(|| StoreError::ManifestMissing { location: store.location() })?;
    RunManifest::from_json(&bytes).map_err(|error| StoreError::ManifestDecode(error.to_string()))
}

/// Recomputes each artifact checksum against the manifest.
pub fn verify_run(store: &dyn ArtifactStore) -> Result<VerificationReport, StoreError> {
    let manifest = read_manifest(store)?;

    let mut checks = Vec::with_capacity(manifest.artifacts.len());
    for entry in &manifest.artifacts {
        let status = match store.get(&entry.file)? {
            None => ArtifactStatus::Missing,
            Some(bytes) => {
                let actual = checksum(&bytes);
                if actual == entry.blake3 {
                    ArtifactStatus::Verified
                } else {
                    ArtifactStatus::Mismatch { actual }
                }
            }
        };
        checks.push(ArtifactCheck {
            file: entry.file.clone(),
            expected: entry.blake3.clone(),
            status,
        });
    }

    Ok(VerificationReport { run_id: manifest.run_id, completed_at: manifest.completed_at, checks })
}
