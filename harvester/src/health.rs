//! Preflight checks for the machine a run is about to use.
//!
//! Nothing here opens a browser. The checks only confirm that a run has a
//! driver to talk to and somewhere to put its files.

use crate::config::PipelineConfig;
use crate::driver::driver_ready;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Instant;

/// Overall system health status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Everything is working correctly
    Healthy,
    /// A run can start, but only through a fallback path
    Degraded,
    /// A run would fail during setup
    Unhealthy,
}

impl HealthStatus {
    /// Process exit code for the `health` command
    pub fn exit_code(&self) -> i32 {
        match self {
            HealthStatus::Healthy => 0,
            HealthStatus::Degraded => 0,
            HealthStatus::Unhealthy => 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckOutcome {
    pub ok: bool,
    pub detail: String,
}

impl CheckOutcome {
    fn pass(detail: impl Into<String>) -> Self {
        Self {
            ok: true,
            detail: detail.into(),
        }
    }

    fn fail(detail: impl Into<String>) -> Self {
        Self {
            ok: false,
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub status: HealthStatus,

    /// A chromedriver binary can be launched by this run
    pub driver_binary: CheckOutcome,

    /// The configured WebDriver endpoint answers `/status`
    pub webdriver_endpoint: CheckOutcome,

    pub download_dir: CheckOutcome,

    pub archive_dir: CheckOutcome,

    /// Time taken to perform the health check in milliseconds
    pub check_duration_ms: u64,

    pub platform: String,

    /// Additional diagnostics
    pub diagnostics: BTreeMap<String, serde_json::Value>,
}

impl HealthCheckResult {
    /// Derive the overall status from the individual checks. Either driver
    /// path is enough to start a session; both directories are required.
    pub fn update_status(&mut self) {
        let any_driver = self.driver_binary.ok || self.webdriver_endpoint.ok;
        let dirs_ok = self.download_dir.ok && self.archive_dir.ok;
        self.status = if !any_driver || !dirs_ok {
            HealthStatus::Unhealthy
        } else if !self.driver_binary.ok {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };
    }

    /// Add a diagnostic value
    pub fn add_diagnostic(&mut self, key: impl Into<String>, value: impl Serialize) {
        if let Ok(json_value) = serde_json::to_value(value) {
            self.diagnostics.insert(key.into(), json_value);
        }
    }
}

fn check_driver_binary(config: &PipelineConfig) -> CheckOutcome {
    match &config.browser.driver_binary {
        Some(path) if path.is_file() => CheckOutcome::pass(path.display().to_string()),
        Some(path) => CheckOutcome::fail(format!("{} does not exist", path.display())),
        None => match which::which("chromedriver") {
            Ok(path) => CheckOutcome::pass(path.display().to_string()),
            Err(e) => CheckOutcome::fail(format!("chromedriver not on PATH: {e}")),
        },
    }
}

fn check_download_dir(dir: &Path) -> CheckOutcome {
    if dir.is_dir() {
        CheckOutcome::pass(dir.display().to_string())
    } else {
        CheckOutcome::fail(format!("{} is not a directory", dir.display()))
    }
}

/// The archive directory is created on demand, so it passes when it
/// already exists or its nearest existing ancestor is a writable directory.
fn check_archive_dir(dir: &Path) -> CheckOutcome {
    if dir.is_dir() {
        return CheckOutcome::pass(format!("{} exists", dir.display()));
    }
    let mut ancestor = dir.parent();
    while let Some(candidate) = ancestor {
        if candidate.as_os_str().is_empty() {
            ancestor = Some(Path::new("."));
            continue;
        }
        if candidate.exists() {
            return match std::fs::metadata(candidate) {
                Ok(meta) if meta.is_dir() && !meta.permissions().readonly() => {
                    CheckOutcome::pass(format!(
                        "{} will be created under {}",
                        dir.display(),
                        candidate.display()
                    ))
                }
                Ok(_) => CheckOutcome::fail(format!("{} is not writable", candidate.display())),
                Err(e) => CheckOutcome::fail(format!("{}: {e}", candidate.display())),
            };
        }
        ancestor = candidate.parent();
    }
    CheckOutcome::fail(format!("no existing parent for {}", dir.display()))
}

/// Run every preflight check against `config`.
pub async fn check_health(config: &PipelineConfig) -> HealthCheckResult {
    let started = Instant::now();

    let webdriver_endpoint = if driver_ready(&config.browser.webdriver_url).await {
        CheckOutcome::pass(config.browser.webdriver_url.clone())
    } else {
        CheckOutcome::fail(format!("no answer from {}", config.browser.webdriver_url))
    };

    let mut result = HealthCheckResult {
        status: HealthStatus::Unhealthy,
        driver_binary: check_driver_binary(config),
        webdriver_endpoint,
        download_dir: check_download_dir(&config.browser.download_dir),
        archive_dir: check_archive_dir(&config.archive.dest_dir),
        check_duration_ms: 0,
        platform: std::env::consts::OS.to_string(),
        diagnostics: BTreeMap::new(),
    };
    result.add_diagnostic("headless", config.browser.headless);
    result.add_diagnostic("report_url", &config.portal.report_url);
    result.add_diagnostic("diagnostics_dir", config.diagnostics.dir.display().to_string());
    result.update_status();
    result.check_duration_ms = started.elapsed().as_millis() as u64;
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(binary: bool, endpoint: bool, dirs: bool) -> HealthCheckResult {
        let outcome = |ok| CheckOutcome {
            ok,
            detail: String::new(),
        };
        HealthCheckResult {
            status: HealthStatus::Unhealthy,
            driver_binary: outcome(binary),
            webdriver_endpoint: outcome(endpoint),
            download_dir: outcome(dirs),
            archive_dir: outcome(dirs),
            check_duration_ms: 0,
            platform: "test".into(),
            diagnostics: BTreeMap::new(),
        }
    }

    #[test]
    fn status_follows_checks() {
        let cases = [
            ((true, true, true), HealthStatus::Healthy),
            ((false, true, true), HealthStatus::Degraded),
            ((false, false, true), HealthStatus::Unhealthy),
            ((true, true, false), HealthStatus::Unhealthy),
        ];
        for ((binary, endpoint, dirs), expected) in cases {
            let mut r = result(binary, endpoint, dirs);
            r.update_status();
            assert_eq!(r.status, expected, "binary={binary} endpoint={endpoint} dirs={dirs}");
        }
    }

    #[test]
    fn archive_dir_under_existing_parent_passes() {
        let dir = tempfile::tempdir().unwrap();
        assert!(check_archive_dir(&dir.path().join("a").join("b")).ok);
        assert!(check_archive_dir(dir.path()).ok);
    }

    #[test]
    fn missing_download_dir_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!check_download_dir(&dir.path().join("missing")).ok);
    }
}
