use std::path::PathBuf;

use chrono::Utc;
use storelens_core::config::{AppConfig, ConfigOverrides, LoadOptions};
use storelens_core::errors::PipelineError;
use storelens_core::ml::EvaluationMode;
use storelens_core::pipeline;
use storelens_store::{load_orders, write_run, DirectoryArtifactStore, RunContext, StoreError};
use tracing::error;

use crate::commands::{CommandResult, EXIT_ARTIFACT, EXIT_CONFIG, EXIT_INPUT, EXIT_PIPELINE};
use crate::logging::init_logging;

const COMMAND: &str = "run";

#[derive(Clone, Debug, Default)]
pub struct RunArgs {
    pub config_path: Option<PathBuf>,
    pub overrides: ConfigOverrides,
}

pub fn run(args: RunArgs) -> CommandResult {
    let config = match AppConfig::load(LoadOptions {
        config_path: args.config_path,
        overrides: args.overrides,
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
    init_logging(&config.logging);

    execute(&config)
}

/// Load → analyze → persist. Nothing is written unless every engine
/// succeeded.
pub fn execute(config: &AppConfig) -> CommandResult {
    let started_at = Utc::now();

    let loaded = match load_orders(&config.input.path, &config.input.date_formats) {
        Ok(loaded) => loaded,
        Err(failure) => {
            error!(event_name = "run.input.failed", error = %failure, "order snapshot rejected");
            let exit_code = match failure {
                StoreError::Input(_) | StoreError::Read { .. } => EXIT_INPUT,
                _ => EXIT_ARTIFACT,
            };
            return CommandResult::failure(
                COMMAND,
                failure.error_class(),
                failure.to_string(),
                exit_code,
            );
        }
    };

    let settings = config.pipeline_settings();
    let output = match pipeline::run(&loaded.records, &settings) {
        Ok(output) => output,
        Err(failure) => {
            error!(
                event_name = "run.pipeline.failed",
                error_class = failure.error_class(),
                error = %failure,
                "analytics pipeline failed; no artifacts written"
            );
            let exit_code = match failure {
                PipelineError::Input(_) => EXIT_INPUT,
                _ => EXIT_PIPELINE,
            };
            return CommandResult::failure(
                COMMAND,
                failure.error_class(),
                failure.to_string(),
                exit_code,
            );
        }
    };

    let store = DirectoryArtifactStore::new(&config.output.dir);
    let context = RunContext { input: loaded.fingerprint, settings, started_at };
    let manifest = match write_run(&store, &output, context) {
        Ok(manifest) => manifest,
        Err(failure) => {
            error!(event_name = "run.artifacts.failed", error = %failure, "artifact write failed");
            return CommandResult::failure(
                COMMAND,
                "artifact_write",
                failure.to_string(),
                EXIT_ARTIFACT,
            );
        }
    };

    CommandResult::success(
        COMMAND,
        format!(
            "run {} wrote {} artifacts to `{}`: {} customers, {} regions, {} clusters ({} classifier, accuracy {:.3})",
            manifest.run_id,
            manifest.artifacts.len(),
            store.root().display(),
            output.customers.len(),
            output.region_features.len(),
            output.clustering.centroids.len(),
            match manifest.classifier.evaluation {
                EvaluationMode::InSample => "in-sample",
                EvaluationMode::Holdout => "holdout",
            },
            manifest.classifier.metrics.accuracy,
        ),
    )
}
