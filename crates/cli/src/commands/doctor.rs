use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use serde::Serialize;
use storelens_core::config::{AppConfig, LoadOptions};
use storelens_store::{
    missing_columns, read_header, verify_run, ArtifactKind, ArtifactStore,
    DirectoryArtifactStore, StoreError,
};

use crate::commands::{escape_json, CommandResult, EXIT_NOT_READY};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool, config_path: Option<PathBuf>) -> CommandResult {
    let report = build_report(config_path);
    let exit_code = if report.overall_status == CheckStatus::Fail { EXIT_NOT_READY } else { 0 };

    if json_output {
        let output = serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
        return CommandResult { exit_code, output };
    }

    CommandResult { exit_code, output: render_human(&report) }
}

fn build_report(config_path: Option<PathBuf>) -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions { config_path, ..LoadOptions::default() }) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_input_snapshot(&config.input.path));
            checks.push(check_output_directory(&config.output.dir));
            checks.push(check_last_run(&config.output.dir));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in ["input_snapshot", "output_directory", "last_run"] {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
        }
    }

    let any_failed = checks.iter().any(|check| check.status == CheckStatus::Fail);
    let overall_status = if any_failed { CheckStatus::Fail } else { CheckStatus::Pass };
    let summary = if any_failed {
        "doctor: one or more readiness checks failed".to_string()
    } else {
        "doctor: all readiness checks passed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn inspect_input_header(path: &Path) -> anyhow::Result<usize> {
    let headers = read_header(path)
        .with_context(|| format!("order snapshot `{}` is not readable", path.display()))?;
    let missing = missing_columns(&headers);
    if !missing.is_empty() {
        bail!("order snapshot `{}` lacks required columns: {}", path.display(), missing.join(", "));
    }
    Ok(headers.len())
}

fn check_input_snapshot(path: &Path) -> DoctorCheck {
    match inspect_input_header(path) {
        Ok(columns) => DoctorCheck {
            name: "input_snapshot",
            status: CheckStatus::Pass,
            details: format!("`{}` has all required columns ({columns} total)", path.display()),
        },
        Err(error) => DoctorCheck {
            name: "input_snapshot",
            status: CheckStatus::Fail,
            details: format!("{error:#}"),
        },
    }
}

fn probe_output_directory(dir: &Path) -> anyhow::Result<()> {
    fs::create_dir_all(dir)
        .with_context(|| format!("cannot create output directory `{}`", dir.display()))?;
    let probe = dir.join(".storelens-doctor-probe");
    fs::write(&probe, b"probe")
        .with_context(|| format!("output directory `{}` is not writable", dir.display()))?;
    fs::remove_file(&probe)
        .with_context(|| format!("cannot clean up probe file in `{}`", dir.display()))?;
    Ok(())
}

fn check_output_directory(dir: &Path) -> DoctorCheck {
    match probe_output_directory(dir) {
        Ok(()) => DoctorCheck {
            name: "output_directory",
            status: CheckStatus::Pass,
            details: format!("`{}` is writable", dir.display()),
        },
        Err(error) => DoctorCheck {
            name: "output_directory",
            status: CheckStatus::Fail,
            details: format!("{error:#}"),
        },
    }
}

fn check_last_run(dir: &Path) -> DoctorCheck {
    let store = DirectoryArtifactStore::new(dir);

    match verify_run(&store) {
        Ok(report) if report.is_intact() => DoctorCheck {
            name: "last_run",
            status: CheckStatus::Pass,
            details: format!(
                "run {} completed at {} with {} verified artifacts",
                report.run_id,
                report.completed_at.to_rfc3339(),
                report.checks.len()
            ),
        },
        Ok(report) => {
            let broken: Vec<String> = report.failures().map(|check| check.file.clone()).collect();
            DoctorCheck {
                name: "last_run",
                status: CheckStatus::Fail,
                details: format!(
                    "run {} artifacts do not match the manifest: {}",
                    report.run_id,
                    broken.join(", ")
                ),
            }
        }
        Err(StoreError::ManifestMissing { .. }) => {
            let leftovers = ArtifactKind::ALL
                .iter()
                .filter(|kind| matches!(store.get(kind.file_name()), Ok(Some(_))))
                .count();
            if leftovers == 0 {
                DoctorCheck {
                    name: "last_run",
                    status: CheckStatus::Skipped,
                    details: "no previous run found".to_string(),
                }
            } else {
                DoctorCheck {
                    name: "last_run",
                    status: CheckStatus::Fail,
                    details: format!(
                        "{leftovers} artifacts present without a run manifest; the last run did not complete"
                    ),
                }
            }
        }
        Err(error) => DoctorCheck {
            name: "last_run",
            status: CheckStatus::Fail,
            details: error.to_string(),
        },
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}
