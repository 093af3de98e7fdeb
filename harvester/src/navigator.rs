use crate::config::TimeoutConfig;
use crate::diagnostics::Diagnostics;
use crate::errors::{AutomationError, ExportError};
use crate::platforms::BrowserEngine;
use crate::selector::Selector;
use crate::wait::{settle, wait_for_element, wait_for_ready_state};
use tracing::{error, info, instrument};

/// Opens the report page and waits until it has rendered.
pub struct ReportNavigator<'a> {
    report_url: &'a str,
    timeouts: &'a TimeoutConfig,
    ready_selector: Option<Selector>,
    diagnostics: &'a dyn Diagnostics,
}

impl<'a> ReportNavigator<'a> {
    pub fn new(
        report_url: &'a str,
        timeouts: &'a TimeoutConfig,
        diagnostics: &'a dyn Diagnostics,
    ) -> Self {
        Self {
            report_url,
            timeouts,
            ready_selector: None,
            diagnostics,
        }
    }

    /// Also wait for an element that only exists once the report is drawn.
    pub fn ready_selector(mut self, selector: Option<&str>) -> Self {
        self.ready_selector = selector.map(Selector::from);
        self
    }

    #[instrument(skip_all, fields(url = %self.report_url))]
    pub async fn open(&self, engine: &dyn BrowserEngine) -> Result<(), ExportError> {
        if let Err(e) = self.load(engine).await {
            error!("Report page did not load: {}", e);
            self.diagnostics
                .capture_screenshot(engine, "navigation_error")
                .await;
            return Err(ExportError::NavigationTimeout(format!(
                "{}: {e}",
                self.report_url
            )));
        }
        settle(self.timeouts.settle()).await;
        info!("Report page loaded");
        Ok(())
    }

    async fn load(&self, engine: &dyn BrowserEngine) -> Result<(), AutomationError> {
        let timeout = self.timeouts.page_load();
        let poll = self.timeouts.poll_interval();
        engine.goto(self.report_url).await?;
        wait_for_element(engine, &Selector::tag("body"), timeout, poll).await?;
        wait_for_ready_state(engine, timeout, poll).await?;
        if let Some(selector) = &self.ready_selector {
            wait_for_element(engine, selector, timeout, poll).await?;
        }
        Ok(())
    }
}
