//! Failure evidence for a run: which stage was active, plus screenshots and
//! markup dumps taken from the browser when something goes wrong.
//!
//! Capturing is best-effort. A failed capture is logged and dropped so it
//! can never replace the error that triggered it.

use crate::platforms::BrowserEngine;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{error, info, warn};

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    SessionInit,
    Authenticate,
    Navigate,
    Export,
    Download,
    Archive,
    Teardown,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::SessionInit => "session_init",
            Stage::Authenticate => "authenticate",
            Stage::Navigate => "navigate",
            Stage::Export => "export",
            Stage::Download => "download",
            Stage::Archive => "archive",
            Stage::Teardown => "teardown",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[async_trait]
pub trait Diagnostics: Send + Sync {
    /// Note that the pipeline entered `stage`.
    fn record_stage(&self, stage: Stage);

    /// Save a screenshot of the current page under `label`.
    async fn capture_screenshot(&self, engine: &dyn BrowserEngine, label: &str);

    /// Save the full markup of the current page under `label`.
    async fn capture_markup(&self, engine: &dyn BrowserEngine, label: &str);
}

/// Writes `<label>.png` and `<label>_source.html` into one directory.
#[derive(Debug, Clone)]
pub struct FileDiagnostics {
    dir: PathBuf,
}

impl FileDiagnostics {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn screenshot_path(&self, label: &str) -> PathBuf {
        self.dir.join(format!("{label}.png"))
    }

    pub fn markup_path(&self, label: &str) -> PathBuf {
        self.dir.join(format!("{label}_source.html"))
    }

    async fn write(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, bytes).await
    }
}

#[async_trait]
impl Diagnostics for FileDiagnostics {
    fn record_stage(&self, stage: Stage) {
        info!(stage = %stage, "Entering stage");
    }

    async fn capture_screenshot(&self, engine: &dyn BrowserEngine, label: &str) {
        let path = self.screenshot_path(label);
        match engine.screenshot().await {
            Ok(png) => match Self::write(&path, &png).await {
                Ok(()) => info!("Saved screenshot to {}", path.display()),
                Err(e) => warn!("Could not write screenshot {}: {}", path.display(), e),
            },
            Err(e) => warn!("Could not take screenshot '{}': {}", label, e),
        }
    }

    async fn capture_markup(&self, engine: &dyn BrowserEngine, label: &str) {
        let path = self.markup_path(label);
        match engine.page_source().await {
            Ok(html) => match Self::write(&path, html.as_bytes()).await {
                Ok(()) => info!("Saved page source to {}", path.display()),
                Err(e) => warn!("Could not write page source {}: {}", path.display(), e),
            },
            Err(e) => error!("Could not read page source for '{}': {}", label, e),
        }
    }
}

/// One thing a [`RecordingDiagnostics`] saw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiagnosticEvent {
    Stage(Stage),
    Screenshot(String),
    Markup(String),
}

/// Keeps every event in memory instead of touching the filesystem.
#[derive(Debug, Default)]
pub struct RecordingDiagnostics {
    events: Mutex<Vec<DiagnosticEvent>>,
}

impl RecordingDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<DiagnosticEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn stages(&self) -> Vec<Stage> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                DiagnosticEvent::Stage(stage) => Some(stage),
                _ => None,
            })
            .collect()
    }

    pub fn screenshots(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                DiagnosticEvent::Screenshot(label) => Some(label),
                _ => None,
            })
            .collect()
    }

    pub fn markups(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                DiagnosticEvent::Markup(label) => Some(label),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: DiagnosticEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

#[async_trait]
impl Diagnostics for RecordingDiagnostics {
    fn record_stage(&self, stage: Stage) {
        self.push(DiagnosticEvent::Stage(stage));
    }

    async fn capture_screenshot(&self, _engine: &dyn BrowserEngine, label: &str) {
        self.push(DiagnosticEvent::Screenshot(label.to_string()));
    }

    async fn capture_markup(&self, _engine: &dyn BrowserEngine, label: &str) {
        self.push(DiagnosticEvent::Markup(label.to_string()));
    }
}
