use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

use serde_json::Value;
use storelens_cli::commands::run::RunArgs;
use storelens_cli::commands::{config, doctor, inspect, run};
use storelens_core::config::ConfigOverrides;
use tempfile::TempDir;

const HEADER: &str = "Row ID,Order Date,Customer ID,Customer Name,Segment,State,Sales,Quantity,Profit";

const REGIONS: [(&str, f64); 6] = [
    ("Texas", -40.0),
    ("Ohio", -15.0),
    ("Illinois", -5.0),
    ("California", 60.0),
    ("New York", 45.0),
    ("Washington", 20.0),
];

#[test]
fn run_writes_artifacts_for_a_valid_snapshot() {
    with_env(&[], || {
        let dir = TempDir::new().expect("tempdir");
        let input = write_snapshot(dir.path(), &snapshot(false));
        let output_dir = dir.path().join("out");

        let result = run::run(run_args(&input, &output_dir));
        assert_eq!(result.exit_code, 0, "expected successful run: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "run");
        assert_eq!(payload["status"], "ok");
        for file in [
            "classificacao_consumidor.csv",
            "probabilidade_estado.csv",
            "knn_estado.csv",
            "clusterizacao_estado.csv",
            "centroides_estado.csv",
            "run_manifest.json",
        ] {
            assert!(output_dir.join(file).exists(), "{file} should be written");
        }
    });
}

#[test]
fn run_reports_missing_columns_as_input_failure() {
    with_env(&[], || {
        let dir = TempDir::new().expect("tempdir");
        let input = write_snapshot(
            dir.path(),
            "Order Date,Customer ID,Customer Name,Segment,State,Sales,Quantity\n",
        );
        let output_dir = dir.path().join("out");

        let result = run::run(run_args(&input, &output_dir));
        assert_eq!(result.exit_code, 3, "expected input failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "input_validation");
        assert!(payload["message"].as_str().unwrap_or_default().contains("Profit"));
        assert!(!output_dir.exists(), "nothing should be written for rejected input");
    });
}

#[test]
fn run_returns_config_failure_for_invalid_env() {
    with_env(&[("STORELENS_SIMILARITY_NEIGHBORS", "0")], || {
        let result = run::run(RunArgs::default());
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "run");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn single_class_regions_fail_without_writing() {
    with_env(&[], || {
        let dir = TempDir::new().expect("tempdir");
        let input = write_snapshot(dir.path(), &snapshot(true));
        let output_dir = dir.path().join("out");

        let result = run::run(run_args(&input, &output_dir));
        assert_eq!(result.exit_code, 4, "expected pipeline failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["error_class"], "classifier_fit");
        assert!(!output_dir.join("run_manifest.json").exists());
    });
}

#[test]
fn inspect_verifies_then_flags_tampering() {
    with_env(&[], || {
        let dir = TempDir::new().expect("tempdir");
        let input = write_snapshot(dir.path(), &snapshot(false));
        let output_dir = dir.path().join("out");
        assert_eq!(run::run(run_args(&input, &output_dir)).exit_code, 0);

        let clean = inspect::run(None, Some(output_dir.clone()), false);
        assert_eq!(clean.exit_code, 0, "expected clean inspect: {}", clean.output);
        assert_eq!(parse_payload(&clean.output)["status"], "ok");

        fs::write(output_dir.join("knn_estado.csv"), "referencia,vizinho\n").expect("tamper");
        let tampered = inspect::run(None, Some(output_dir.clone()), false);
        assert_eq!(tampered.exit_code, 5);
        let payload = parse_payload(&tampered.output);
        assert_eq!(payload["error_class"], "artifact_integrity");
        assert!(payload["message"].as_str().unwrap_or_default().contains("knn_estado.csv"));
    });
}

#[test]
fn inspect_without_a_run_reports_incomplete_run() {
    with_env(&[], || {
        let dir = TempDir::new().expect("tempdir");

        let result = inspect::run(None, Some(dir.path().to_path_buf()), false);
        assert_eq!(result.exit_code, 5);
        assert_eq!(parse_payload(&result.output)["error_class"], "incomplete_run");
    });
}

#[test]
fn doctor_json_passes_after_a_completed_run() {
    let dir = TempDir::new().expect("tempdir");
    let input = write_snapshot(dir.path(), &snapshot(false));
    let output_dir = dir.path().join("out");
    let input_var = input.display().to_string();
    let output_var = output_dir.display().to_string();

    with_env(
        &[("STORELENS_INPUT_PATH", input_var.as_str()), ("STORELENS_OUTPUT_DIR", output_var.as_str())],
        || {
            assert_eq!(run::run(run_args(&input, &output_dir)).exit_code, 0);

            let result = doctor::run(true, None);
            assert_eq!(result.exit_code, 0, "expected healthy doctor: {}", result.output);

            let report = parse_payload(&result.output);
            assert_eq!(report["overall_status"], "pass");
            let checks = report["checks"].as_array().cloned().unwrap_or_default();
            let statuses: Vec<(String, String)> = checks
                .iter()
                .map(|check| {
                    (
                        check["name"].as_str().unwrap_or_default().to_string(),
                        check["status"].as_str().unwrap_or_default().to_string(),
                    )
                })
                .collect();
            assert_eq!(
                statuses,
                vec![
                    ("config_validation".to_string(), "pass".to_string()),
                    ("input_snapshot".to_string(), "pass".to_string()),
                    ("output_directory".to_string(), "pass".to_string()),
                    ("last_run".to_string(), "pass".to_string()),
                ]
            );
        },
    );
}

#[test]
fn doctor_flags_a_run_without_manifest() {
    let dir = TempDir::new().expect("tempdir");
    let input = write_snapshot(dir.path(), &snapshot(false));
    let output_dir = dir.path().join("out");
    let input_var = input.display().to_string();
    let output_var = output_dir.display().to_string();

    with_env(
        &[("STORELENS_INPUT_PATH", input_var.as_str()), ("STORELENS_OUTPUT_DIR", output_var.as_str())],
        || {
            assert_eq!(run::run(run_args(&input, &output_dir)).exit_code, 0);
            fs::remove_file(output_dir.join("run_manifest.json")).expect("drop manifest");

            let result = doctor::run(true, None);
            assert_eq!(result.exit_code, 6);
            assert_eq!(parse_payload(&result.output)["overall_status"], "fail");
        },
    );
}

#[test]
fn config_reports_env_sources() {
    with_env(&[("STORELENS_CLUSTERING_CLUSTERS", "4")], || {
        let result = config::run(None);
        assert_eq!(result.exit_code, 0);

        let payload = parse_payload(&result.output);
        let message = payload["message"].as_str().unwrap_or_default();
        assert!(message
            .contains("- clustering.clusters = 4 (source: env (STORELENS_CLUSTERING_CLUSTERS))"));
        assert!(message.contains("- similarity.neighbors = 6 (source: default)"));
    });
}

fn snapshot(all_profitable: bool) -> String {
    let mut csv = format!("{HEADER}\n");
    let mut row_id = 1;
    for (index, (state, profit)) in REGIONS.iter().enumerate() {
        for line in 0..(index + 2) {
            let profit = if all_profitable { profit.abs() } else { *profit };
            csv.push_str(&format!(
                "{row_id},2017-{:02}-{:02},CU-{index}{line},Customer {row_id},Consumer,{state},{},{},{}\n",
                1 + line % 12,
                1 + index,
                120.0 * (index + 1) as f64 + line as f64,
                line + 1,
                profit + line as f64,
            ));
            row_id += 1;
        }
    }
    csv
}

fn write_snapshot(dir: &Path, contents: &str) -> PathBuf {
    let path = dir.join("ss.csv");
    fs::write(&path, contents).expect("write snapshot");
    path
}

fn run_args(input: &Path, output_dir: &Path) -> RunArgs {
    RunArgs {
        config_path: None,
        overrides: ConfigOverrides {
            input_path: Some(input.to_path_buf()),
            output_dir: Some(output_dir.to_path_buf()),
            clusters: Some(3),
            ..ConfigOverrides::default()
        },
    }
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "STORELENS_INPUT_PATH",
        "STORELENS_INPUT_DATE_FORMATS",
        "STORELENS_OUTPUT_DIR",
        "STORELENS_FEATURES_MONETARY",
        "STORELENS_FEATURES_RECENCY_REFERENCE",
        "STORELENS_SIMILARITY_NEIGHBORS",
        "STORELENS_CLUSTERING_CLUSTERS",
        "STORELENS_CLUSTERING_SEED",
        "STORELENS_CLUSTERING_MAX_ITERATIONS",
        "STORELENS_CLUSTERING_N_RUNS",
        "STORELENS_CLUSTERING_TOLERANCE",
        "STORELENS_CLASSIFIER_EVALUATE_ON_HOLDOUT",
        "STORELENS_CLASSIFIER_HOLDOUT_FRACTION",
        "STORELENS_CLASSIFIER_REGULARIZATION",
        "STORELENS_CLASSIFIER_MAX_ITERATIONS",
        "STORELENS_CLASSIFIER_SEED",
        "STORELENS_LOGGING_LEVEL",
        "STORELENS_LOGGING_FORMAT",
        "STORELENS_LOG_LEVEL",
        "STORELENS_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
