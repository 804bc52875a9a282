use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use storelens_core::config::{resolve_config_path, AppConfig, LoadOptions};
use toml::Value;

use crate::commands::{CommandResult, EXIT_CONFIG};

pub fn run(config_path: Option<PathBuf>) -> CommandResult {
    let config = match AppConfig::load(LoadOptions {
        config_path: config_path.clone(),
        ..LoadOptions::default()
    }) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "config",
                "config_validation",
                format!("config validation failed: {error}"),
                EXIT_CONFIG,
            );
        }
    };

    let config_file_path = resolve_config_path(config_path.as_deref());
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let source = |key_path: &str, env_keys: &[&str]| {
        field_source(key_path, env_keys, config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let fields: Vec<(&str, String, Vec<&str>)> = vec![
        ("input.path", config.input.path.display().to_string(), vec!["STORELENS_INPUT_PATH"]),
        (
            "input.date_formats",
            config.input.date_formats.join(", "),
            vec!["STORELENS_INPUT_DATE_FORMATS"],
        ),
        ("output.dir", config.output.dir.display().to_string(), vec!["STORELENS_OUTPUT_DIR"]),
        (
            "features.monetary",
            format!("{:?}", config.features.monetary).to_ascii_lowercase(),
            vec!["STORELENS_FEATURES_MONETARY"],
        ),
        (
            "features.recency_reference",
            config.features.recency_reference.to_string(),
            vec!["STORELENS_FEATURES_RECENCY_REFERENCE"],
        ),
        (
            "similarity.neighbors",
            config.similarity.neighbors.to_string(),
            vec!["STORELENS_SIMILARITY_NEIGHBORS"],
        ),
        (
            "clustering.clusters",
            config.clustering.clusters.to_string(),
            vec!["STORELENS_CLUSTERING_CLUSTERS"],
        ),
        ("clustering.seed", config.clustering.seed.to_string(), vec!["STORELENS_CLUSTERING_SEED"]),
        (
            "clustering.max_iterations",
            config.clustering.max_iterations.to_string(),
            vec!["STORELENS_CLUSTERING_MAX_ITERATIONS"],
        ),
        (
            "clustering.n_runs",
            config.clustering.n_runs.to_string(),
            vec!["STORELENS_CLUSTERING_N_RUNS"],
        ),
        (
            "clustering.tolerance",
            config.clustering.tolerance.to_string(),
            vec!["STORELENS_CLUSTERING_TOLERANCE"],
        ),
        (
            "classifier.evaluate_on_holdout",
            config.classifier.evaluate_on_holdout.to_string(),
            vec!["STORELENS_CLASSIFIER_EVALUATE_ON_HOLDOUT"],
        ),
        (
            "classifier.holdout_fraction",
            config.classifier.holdout_fraction.to_string(),
            vec!["STORELENS_CLASSIFIER_HOLDOUT_FRACTION"],
        ),
        (
            "classifier.regularization",
            config.classifier.regularization.to_string(),
            vec!["STORELENS_CLASSIFIER_REGULARIZATION"],
        ),
        (
            "classifier.max_iterations",
            config.classifier.max_iterations.to_string(),
            vec!["STORELENS_CLASSIFIER_MAX_ITERATIONS"],
        ),
        ("classifier.seed", config.classifier.seed.to_string(), vec!["STORELENS_CLASSIFIER_SEED"]),
        (
            "logging.level",
            config.logging.level.clone(),
            vec!["STORELENS_LOGGING_LEVEL", "STORELENS_LOG_LEVEL"],
        ),
        (
            "logging.format",
            config.logging.format.to_string(),
            vec!["STORELENS_LOGGING_FORMAT", "STORELENS_LOG_FORMAT"],
        ),
    ];

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for (key_path, value, env_keys) in &fields {
        lines.push(render_line(key_path, value, source(key_path, env_keys)));
    }

    CommandResult::success("config", lines.join("\n"))
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}
