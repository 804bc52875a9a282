use std::path::PathBuf;

use serde::Serialize;
use storelens_core::config::{AppConfig, ConfigOverrides, LoadOptions};
use storelens_store::{
    read_manifest, verify_run, ArtifactCheck, DirectoryArtifactStore, RunManifest, StoreError,
};

use crate::commands::{escape_json, CommandResult, EXIT_ARTIFACT, EXIT_CONFIG};

const COMMAND: &str = "inspect";

#[derive(Debug, Serialize)]
struct InspectReport<'a> {
    command: &'static str,
    intact: bool,
    manifest: &'a RunManifest,
    checks: &'a [ArtifactCheck],
}

pub fn run(
    config_path: Option<PathBuf>,
    output_dir: Option<PathBuf>,
    json_output: bool,
) -> CommandResult {
    let config = match AppConfig::load(LoadOptions {
        config_path,
        overrides: ConfigOverrides { output_dir, ..ConfigOverrides::default() },
        ..LoadOptions::default()
    }) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                COMMAND,
                "config_validation",
                format!("configuration issue: {error}"),
                EXIT_CONFIG,
            );
        }
    };

    let store = DirectoryArtifactStore::new(&config.output.dir);
    let verified = read_manifest(&store)
        .and_then(|manifest| verify_run(&store).map(|report| (manifest, report)));
    let (manifest, report) = match verified {
        Ok(verified) => verified,
        Err(error) => {
            let error_class = match error {
                StoreError::ManifestMissing { .. } => "incomplete_run",
                _ => error.error_class(),
            };
            return CommandResult::failure(COMMAND, error_class, error.to_string(), EXIT_ARTIFACT);
        }
    };

    let intact = report.is_intact();
    let exit_code = if intact { 0 } else { EXIT_ARTIFACT };

    if json_output {
        let payload =
            InspectReport { command: COMMAND, intact, manifest: &manifest, checks: &report.checks };
        let output = serde_json::to_string_pretty(&payload).unwrap_or_else(|error| {
            format!(
                "{{\"command\":\"inspect\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
        return CommandResult { exit_code, output };
    }

    if !intact {
        let broken: Vec<String> = report
            .failures()
            .map(|check| format!("{} ({:?})", check.file, check.status))
            .collect();
        return CommandResult::failure(
            COMMAND,
            "artifact_integrity",
            format!("run {} failed verification: {}", manifest.run_id, broken.join(", ")),
            EXIT_ARTIFACT,
        );
    }

    let tables: Vec<String> = manifest
        .artifacts
        .iter()
        .map(|entry| format!("{} ({} rows)", entry.file, entry.rows))
        .collect();
    CommandResult::success(
        COMMAND,
        format!(
            "run {} completed at {} from `{}` ({} records); verified {}",
            manifest.run_id,
            manifest.completed_at.to_rfc3339(),
            manifest.input.path,
            manifest.input.records,
            tables.join(", ")
        ),
    )
}
