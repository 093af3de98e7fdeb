//! One end-to-end export run.
//!
//! Stages run strictly in order: session, login, report page, export menu,
//! download, archive. The first failing stage ends the run. Whatever
//! happens after the session opens, the browser is shut down before `run`
//! returns.

use crate::archive::{ArchivedReport, Archiver};
use crate::auth::Authenticator;
use crate::clock::{Clock, SystemClock};
use crate::config::{Credential, PipelineConfig};
use crate::diagnostics::{Diagnostics, FileDiagnostics, Stage};
use crate::download::DownloadResolver;
use crate::driver::{SessionFactory, SessionInitializer};
use crate::errors::ExportError;
use crate::export::ExportTrigger;
use crate::navigator::ReportNavigator;
use crate::platforms::BrowserEngine;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

pub struct ExportPipeline {
    config: PipelineConfig,
    credential: Credential,
    sessions: Box<dyn SessionFactory>,
    diagnostics: Arc<dyn Diagnostics>,
    clock: Arc<dyn Clock>,
}

impl ExportPipeline {
    /// A pipeline that drives a real Chrome through chromedriver and
    /// writes diagnostics to the configured directory.
    pub fn new(config: PipelineConfig, credential: Credential) -> Result<Self, ExportError> {
        config.validate()?;
        Ok(Self {
            sessions: Box::new(SessionInitializer::from_config(&config.browser)),
            diagnostics: Arc::new(FileDiagnostics::new(&config.diagnostics.dir)),
            clock: Arc::new(SystemClock),
            config,
            credential,
        })
    }

    pub fn with_session_factory(mut self, sessions: impl SessionFactory + 'static) -> Self {
        self.sessions = Box::new(sessions);
        self
    }

    pub fn with_diagnostics(mut self, diagnostics: Arc<dyn Diagnostics>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run every stage once. Nothing is retried; a failed run is simply
    /// invoked again by whoever schedules it.
    #[instrument(skip(self), fields(report = %self.config.portal.report_url))]
    pub async fn run(&self) -> Result<ArchivedReport, ExportError> {
        self.diagnostics.record_stage(Stage::SessionInit);
        let session = match self.sessions.open().await {
            Ok(session) => session,
            Err(e) => {
                error!(stage = %Stage::SessionInit, "Export run failed: {}", e);
                return Err(e);
            }
        };

        let result = self.run_stages(session.engine()).await;

        self.diagnostics.record_stage(Stage::Teardown);
        match session.close().await {
            Ok(()) => info!("Browser closed"),
            Err(e) => warn!("Browser shutdown reported an error: {}", e),
        }

        match &result {
            Ok(report) => info!("Export run finished: {}", report.path.display()),
            Err(e) => {
                let stage = e.stage().map(|s| s.as_str()).unwrap_or("unknown");
                error!(stage, "Export run failed: {}", e);
            }
        }
        result
    }

    async fn run_stages(&self, engine: &dyn BrowserEngine) -> Result<ArchivedReport, ExportError> {
        let config = &self.config;
        let diagnostics = self.diagnostics.as_ref();

        self.diagnostics.record_stage(Stage::Authenticate);
        Authenticator::new(&config.portal, &config.timeouts, diagnostics)
            .dump_login_page(config.diagnostics.dump_login_page)
            .login(engine, &self.credential)
            .await?;

        self.diagnostics.record_stage(Stage::Navigate);
        ReportNavigator::new(&config.portal.report_url, &config.timeouts, diagnostics)
            .ready_selector(config.export.ready_selector.as_deref())
            .open(engine)
            .await?;

        self.diagnostics.record_stage(Stage::Export);
        let outcome = ExportTrigger::new(&config.export, &config.timeouts, diagnostics)
            .trigger(engine)
            .await?;
        info!(
            control = %outcome.control_strategy,
            menu = %outcome.menu_strategy,
            "Export requested"
        );

        self.diagnostics.record_stage(Stage::Download);
        let resolver = DownloadResolver::new(
            &config.browser.download_dir,
            &config.download,
            self.clock.clone(),
        );
        let artifact = match resolver.resolve().await {
            Ok(artifact) => artifact,
            Err(e) => {
                diagnostics.capture_screenshot(engine, "download_error").await;
                return Err(e);
            }
        };

        self.diagnostics.record_stage(Stage::Archive);
        match Archiver::new(&config.archive, self.clock.clone()).archive(&artifact) {
            Ok(report) => Ok(report),
            Err(e) => {
                diagnostics.capture_screenshot(engine, "archive_error").await;
                Err(e)
            }
        }
    }
}
