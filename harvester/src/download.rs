//! Locating the file the browser just downloaded.
//!
//! The browser gives no completion signal, so the download directory is
//! polled. Only the newest matching file is considered, and only if it is
//! younger than the freshness window; an older newest file is a leftover
//! from an earlier run and never counts.

use crate::clock::Clock;
use crate::config::DownloadConfig;
use crate::errors::ExportError;
use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{debug, info, instrument, warn};

/// A freshly downloaded report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportArtifact {
    pub path: PathBuf,
    pub modified: SystemTime,
    /// Lowercase extension without the dot
    pub format: String,
}

impl ExportArtifact {
    pub fn from_path(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let modified = std::fs::metadata(&path)?.modified()?;
        let format = extension_of(&path).unwrap_or_default();
        Ok(Self {
            path,
            modified,
            format,
        })
    }
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
}

/// Newest file in `dir` with extension `extension`, if it is younger than
/// `freshness` at `now`. Files stamped in the future count as brand new.
pub fn select_fresh(
    dir: &Path,
    extension: &str,
    now: SystemTime,
    freshness: Duration,
) -> io::Result<Option<ExportArtifact>> {
    let wanted = extension.trim_start_matches('.').to_lowercase();
    let mut newest: Option<ExportArtifact> = None;

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if extension_of(&path).as_deref() != Some(wanted.as_str()) {
            continue;
        }
        let metadata = match entry.metadata() {
            Ok(m) if m.is_file() => m,
            Ok(_) => continue,
            // Removed between listing and stat
            Err(_) => continue,
        };
        let modified = metadata.modified()?;
        let is_newer = match &newest {
            Some(current) => modified > current.modified,
            None => true,
        };
        if is_newer {
            newest = Some(ExportArtifact {
                path,
                modified,
                format: wanted.clone(),
            });
        }
    }

    Ok(newest.filter(|artifact| {
        let age = now.duration_since(artifact.modified).unwrap_or(Duration::ZERO);
        if age < freshness {
            true
        } else {
            debug!(
                "Newest file {} is {:?} old, ignoring",
                artifact.path.display(),
                age
            );
            false
        }
    }))
}

pub struct DownloadResolver {
    dir: PathBuf,
    extension: String,
    poll_interval: Duration,
    max_wait: Duration,
    freshness: Duration,
    clock: Arc<dyn Clock>,
}

impl DownloadResolver {
    pub fn new(dir: impl Into<PathBuf>, config: &DownloadConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            dir: dir.into(),
            extension: config.extension.trim_start_matches('.').to_lowercase(),
            poll_interval: Duration::from_secs(config.poll_interval_secs),
            max_wait: Duration::from_secs(config.max_wait_secs),
            freshness: Duration::from_secs(config.freshness_secs),
            clock,
        }
    }

    /// One look at the directory.
    pub fn scan(&self) -> io::Result<Option<ExportArtifact>> {
        select_fresh(
            &self.dir,
            &self.extension,
            self.clock.now_system(),
            self.freshness,
        )
    }

    /// Poll until a fresh file shows up or the wait budget runs out.
    #[instrument(skip(self), fields(dir = %self.dir.display(), ext = %self.extension))]
    pub async fn resolve(&self) -> Result<ExportArtifact, ExportError> {
        let mut waited = Duration::ZERO;
        let mut last_error = None;
        loop {
            match self.scan() {
                Ok(Some(artifact)) => {
                    info!("Found downloaded file {}", artifact.path.display());
                    return Ok(artifact);
                }
                Ok(None) => debug!("No fresh .{} file yet ({:?} waited)", self.extension, waited),
                Err(e) => {
                    warn!("Cannot read {}: {}", self.dir.display(), e);
                    last_error = Some(e);
                }
            }
            if waited >= self.max_wait {
                break;
            }
            tokio::time::sleep(self.poll_interval).await;
            waited += self.poll_interval;
        }

        let mut reason = format!(
            "no .{} file newer than {:?} appeared in {} within {:?}",
            self.extension,
            self.freshness,
            self.dir.display(),
            self.max_wait
        );
        if let Some(e) = last_error {
            reason.push_str(&format!(" (last error: {e})"));
        }
        Err(ExportError::DownloadNotFound(reason))
    }
}
