//! Run manifest: the completion marker of an artifact write.
//!
//! The manifest is the last file written. Its absence means the previous
//! run never finished.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use storelens_core::ml::{EvaluationMode, ModelMetrics, ProfitabilityReport};
use storelens_core::pipeline::PipelineSettings;

use crate::artifacts::ArtifactKind;

pub const MANIFEST_FILE: &str = "run_manifest.json";
pub const MANIFEST_VERSION: u32 = 1;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputFingerprint {
    pub path: String,
    pub records: usize,
    pub blake3: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClassifierSummary {
    pub evaluation: EvaluationMode,
    pub training_samples: usize,
    pub iterations: usize,
    pub converged: bool,
    pub metrics: ModelMetrics,
}

impl From<&ProfitabilityReport> for ClassifierSummary {
    fn from(report: &ProfitabilityReport) -> Self {
        Self {
            evaluation: report.evaluation,
            training_samples: report.training_samples,
            iterations: report.model.iterations,
            converged: report.model.converged,
            metrics: report.metrics.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactEntry {
    pub kind: ArtifactKind,
    pub file: String,
    pub rows: usize,
    pub bytes: usize,
    pub blake3: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    pub version: u32,
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub input: InputFingerprint,
    pub settings: PipelineSettings,
    pub classifier: ClassifierSummary,
    pub artifacts: Vec<ArtifactEntry>,
}

impl RunManifest {
    pub fn entry(&self, kind: ArtifactKind) -> Option<&ArtifactEntry> {
        self.artifacts.iter().find(|entry| entry.kind == kind)
    }

    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec_pretty(self)
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ArtifactStatus {
    Verified,
    Missing,
    Mismatch { actual: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactCheck {
    pub file: String,
    pub expected: String,
    #[serde(flatten)]
    pub status: ArtifactStatus,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VerificationReport {
    pub run_id: Uuid,
    pub completed_at: DateTime<Utc>,
    pub checks: Vec<ArtifactCheck>,
}

impl VerificationReport {
    pub fn is_intact(&self) -> bool {
        self.checks.iter().all(|check| check.status == ArtifactStatus::Verified)
    }

    pub fn failures(&self) -> impl Iterator<Item = &ArtifactCheck> {
        self.checks.iter().filter(|check| check.status != ArtifactStatus::Verified)
    }
}
