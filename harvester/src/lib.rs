//! Unattended report export from a web portal.
//!
//! A run opens a browser, logs in through the portal's hosted identity
//! page, opens a report, picks CSV from its export menu, waits for the file
//! to land in the download directory and moves it into a timestamped
//! archive. See [`ExportPipeline`].

pub mod archive;
pub mod auth;
pub mod clock;
pub mod config;
pub mod diagnostics;
pub mod download;
pub mod driver;
pub mod element;
pub mod errors;
pub mod export;
pub mod health;
pub mod locator;
pub mod navigator;
pub mod pipeline;
pub mod platforms;
pub mod selector;
#[cfg(test)]
mod tests;
pub mod wait;

pub use archive::{ArchivedReport, Archiver};
pub use auth::{AuthState, Authenticator};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{Credential, MenuStrategyKind, PipelineConfig};
pub use diagnostics::{Diagnostics, FileDiagnostics, RecordingDiagnostics, Stage};
pub use download::{DownloadResolver, ExportArtifact};
pub use driver::{BrowserSession, SessionFactory, SessionInitializer};
pub use element::{Element, ElementImpl, Key};
pub use errors::{AutomationError, ExportError};
pub use export::{ExportTrigger, MenuStrategy};
pub use health::{check_health, HealthCheckResult, HealthStatus};
pub use locator::{LocatorChain, LocatorStrategy};
pub use navigator::ReportNavigator;
pub use pipeline::ExportPipeline;
pub use platforms::BrowserEngine;
pub use selector::Selector;

/// Run one export with the production browser stack.
pub async fn run_export(
    config: PipelineConfig,
    credential: Credential,
) -> Result<ArchivedReport, ExportError> {
    ExportPipeline::new(config, credential)?.run().await
}
