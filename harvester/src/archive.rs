use crate::clock::Clock;
use crate::config::ArchiveConfig;
use crate::download::ExportArtifact;
use crate::errors::ExportError;
use chrono::{DateTime, Local};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Where a report ended up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchivedReport {
    pub path: PathBuf,
    pub archived_at: DateTime<Local>,
}

/// Moves downloaded reports into a timestamped archive.
pub struct Archiver {
    dest_dir: PathBuf,
    prefix: String,
    clock: Arc<dyn Clock>,
}

impl Archiver {
    pub fn new(config: &ArchiveConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            dest_dir: config.dest_dir.clone(),
            prefix: config.prefix.clone(),
            clock,
        }
    }

    pub fn dest_dir(&self) -> &Path {
        &self.dest_dir
    }

    /// `<prefix>_YYYYMMDD_HHMMSS.<ext>` in local time.
    pub fn file_name(&self, at: &DateTime<Local>, extension: &str) -> String {
        format!(
            "{}_{}.{}",
            self.prefix,
            at.format("%Y%m%d_%H%M%S"),
            extension.trim_start_matches('.')
        )
    }

    /// Move `artifact` into the archive directory, creating it if needed.
    /// An existing file at the destination is never replaced.
    #[instrument(skip(self, artifact), fields(source = %artifact.path.display()))]
    pub fn archive(&self, artifact: &ExportArtifact) -> Result<ArchivedReport, ExportError> {
        let now = self.clock.now();
        let extension = artifact
            .path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_string)
            .unwrap_or_else(|| artifact.format.clone());
        let destination = self.dest_dir.join(self.file_name(&now, &extension));

        std::fs::create_dir_all(&self.dest_dir).map_err(|e| {
            ExportError::Archive(format!("cannot create {}: {e}", self.dest_dir.display()))
        })?;
        if destination.exists() {
            return Err(ExportError::Archive(format!(
                "{} already exists, refusing to overwrite",
                destination.display()
            )));
        }

        move_file(&artifact.path, &destination).map_err(|e| {
            ExportError::Archive(format!(
                "cannot move {} to {}: {e}",
                artifact.path.display(),
                destination.display()
            ))
        })?;
        info!("Archived report to {}", destination.display());
        Ok(ArchivedReport {
            path: destination,
            archived_at: now,
        })
    }
}

/// Rename, falling back to copy and delete across filesystems.
fn move_file(from: &Path, to: &Path) -> std::io::Result<()> {
    match std::fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(rename_err) => {
            warn!("Rename failed ({}), copying instead", rename_err);
            std::fs::copy(from, to)?;
            if let Err(e) = std::fs::remove_file(from) {
                let _ = std::fs::remove_file(to);
                return Err(e);
            }
            Ok(())
        }
    }
}
