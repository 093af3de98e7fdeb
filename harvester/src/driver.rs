//! Browser session setup and teardown.
//!
//! A session needs a WebDriver endpoint. [`ManagedDriver`] launches a
//! chromedriver found on the host; [`ExistingDriver`] attaches to one that
//! is already listening. [`SessionInitializer`] tries its provisioners in
//! order and fails with every attempt listed when none works.

use crate::config::BrowserConfig;
use crate::errors::{AutomationError, ExportError};
use crate::platforms::webdriver::WebDriverEngine;
use crate::platforms::BrowserEngine;
use crate::wait::wait_until;
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::{Child, Command};
use tracing::{debug, info, instrument, warn};

/// A chromedriver process owned by this run.
#[derive(Debug)]
pub struct DriverProcess {
    child: Child,
    port: u16,
}

impl DriverProcess {
    pub fn port(&self) -> u16 {
        self.port
    }

    pub async fn stop(mut self) -> Result<(), AutomationError> {
        debug!("Stopping chromedriver on port {}", self.port);
        self.child.kill().await.map_err(AutomationError::Io)
    }
}

/// Where to reach a driver, plus the process if this run started it.
#[derive(Debug)]
pub struct DriverEndpoint {
    pub url: String,
    pub process: Option<DriverProcess>,
}

#[async_trait]
pub trait DriverProvisioner: Send + Sync {
    fn name(&self) -> &str;

    async fn provision(&self) -> Result<DriverEndpoint, AutomationError>;
}

/// Launch chromedriver on a free local port.
#[derive(Debug, Clone)]
pub struct ManagedDriver {
    binary: Option<PathBuf>,
    startup_timeout: Duration,
}

impl ManagedDriver {
    pub fn new(binary: Option<PathBuf>) -> Self {
        Self {
            binary,
            startup_timeout: Duration::from_secs(20),
        }
    }

    pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }

    fn resolve_binary(&self) -> Result<PathBuf, AutomationError> {
        match &self.binary {
            Some(path) if path.is_file() => Ok(path.clone()),
            Some(path) => Err(AutomationError::InvalidArgument(format!(
                "driver binary {} does not exist",
                path.display()
            ))),
            None => which::which("chromedriver").map_err(|e| {
                AutomationError::PlatformError(format!("chromedriver not found on PATH: {e}"))
            }),
        }
    }
}

fn free_port() -> Result<u16, AutomationError> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}

#[async_trait]
impl DriverProvisioner for ManagedDriver {
    fn name(&self) -> &str {
        "managed"
    }

    async fn provision(&self) -> Result<DriverEndpoint, AutomationError> {
        let binary = self.resolve_binary()?;
        let port = free_port()?;
        info!("Starting {} on port {}", binary.display(), port);

        let child = Command::new(&binary)
            .arg(format!("--port={port}"))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;
        let process = DriverProcess { child, port };

        let url = format!("http://127.0.0.1:{port}");
        // On timeout `process` is dropped here, which kills it.
        wait_until(
            "chromedriver to accept sessions",
            self.startup_timeout,
            Duration::from_millis(250),
            || {
                let url = url.clone();
                async move { Ok(driver_ready(&url).await.then_some(())) }
            },
        )
        .await?;
        Ok(DriverEndpoint {
            url,
            process: Some(process),
        })
    }
}

/// Attach to a driver that is already running.
#[derive(Debug, Clone)]
pub struct ExistingDriver {
    url: String,
}

impl ExistingDriver {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl DriverProvisioner for ExistingDriver {
    fn name(&self) -> &str {
        "existing"
    }

    async fn provision(&self) -> Result<DriverEndpoint, AutomationError> {
        if driver_ready(&self.url).await {
            Ok(DriverEndpoint {
                url: self.url.clone(),
                process: None,
            })
        } else {
            Err(AutomationError::PlatformError(format!(
                "no WebDriver answering at {}",
                self.url
            )))
        }
    }
}

/// Ask a driver's `/status` endpoint whether it accepts new sessions.
pub async fn driver_ready(base_url: &str) -> bool {
    let status_url = format!("{}/status", base_url.trim_end_matches('/'));
    let client = match reqwest::Client::builder()
        .timeout(Duration::from_secs(2))
        .build()
    {
        Ok(client) => client,
        Err(e) => {
            warn!("Could not build HTTP client: {}", e);
            return false;
        }
    };
    match client.get(&status_url).send().await {
        Ok(response) if response.status().is_success() => {
            match response.json::<serde_json::Value>().await {
                Ok(body) => body
                    .pointer("/value/ready")
                    .and_then(|ready| ready.as_bool())
                    .unwrap_or(true),
                Err(_) => true,
            }
        }
        Ok(response) => {
            debug!("{} answered {}", status_url, response.status());
            false
        }
        Err(e) => {
            debug!("{} unreachable: {}", status_url, e);
            false
        }
    }
}

/// A live browser and the driver process behind it, if any.
///
/// Call [`BrowserSession::close`] to shut it down. A session dropped
/// without `close` (a panic, a cancelled run) quits the browser from a
/// background task on the current tokio runtime.
pub struct BrowserSession {
    engine: Arc<dyn BrowserEngine>,
    driver: Option<DriverProcess>,
    closed: bool,
}

impl BrowserSession {
    pub fn new(engine: Box<dyn BrowserEngine>, driver: Option<DriverProcess>) -> Self {
        Self {
            engine: Arc::from(engine),
            driver,
            closed: false,
        }
    }

    pub fn engine(&self) -> &dyn BrowserEngine {
        self.engine.as_ref()
    }

    /// Quit the browser, then stop the driver this run started. Both are
    /// attempted even when the first fails.
    pub async fn close(mut self) -> Result<(), AutomationError> {
        self.closed = true;
        shutdown(self.engine.as_ref(), self.driver.take()).await
    }
}

async fn shutdown(
    engine: &dyn BrowserEngine,
    driver: Option<DriverProcess>,
) -> Result<(), AutomationError> {
    let quit = engine.quit().await;
    if let Err(e) = &quit {
        warn!("Browser did not quit cleanly: {}", e);
    }
    if let Some(driver) = driver {
        if let Err(e) = driver.stop().await {
            warn!("Could not stop chromedriver: {}", e);
        }
    }
    quit
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        let engine = Arc::clone(&self.engine);
        let driver = self.driver.take();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!("Browser session dropped without close, shutting it down");
                handle.spawn(async move {
                    let _ = shutdown(engine.as_ref(), driver).await;
                });
            }
            // The driver child, if any, is killed when `driver` drops here.
            Err(_) => warn!("Browser session dropped outside a runtime, browser left open"),
        }
    }
}

/// Anything that can hand out a fresh browser session.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn open(&self) -> Result<BrowserSession, ExportError>;
}

/// Opens Chrome sessions through the first provisioner that works.
pub struct SessionInitializer {
    browser: BrowserConfig,
    provisioners: Vec<Box<dyn DriverProvisioner>>,
}

impl SessionInitializer {
    /// Managed chromedriver first, then the configured endpoint.
    pub fn from_config(browser: &BrowserConfig) -> Self {
        Self {
            browser: browser.clone(),
            provisioners: vec![
                Box::new(ManagedDriver::new(browser.driver_binary.clone())),
                Box::new(ExistingDriver::new(browser.webdriver_url.clone())),
            ],
        }
    }

    pub fn with_provisioners(
        browser: &BrowserConfig,
        provisioners: Vec<Box<dyn DriverProvisioner>>,
    ) -> Self {
        Self {
            browser: browser.clone(),
            provisioners,
        }
    }

    async fn try_provisioner(
        &self,
        provisioner: &dyn DriverProvisioner,
    ) -> Result<BrowserSession, AutomationError> {
        let endpoint = provisioner.provision().await?;
        match WebDriverEngine::connect(&endpoint.url, &self.browser).await {
            Ok(engine) => Ok(BrowserSession::new(Box::new(engine), endpoint.process)),
            Err(e) => {
                if let Some(process) = endpoint.process {
                    let _ = process.stop().await;
                }
                Err(e)
            }
        }
    }
}

#[async_trait]
impl SessionFactory for SessionInitializer {
    #[instrument(skip(self), fields(headless = self.browser.headless))]
    async fn open(&self) -> Result<BrowserSession, ExportError> {
        std::fs::create_dir_all(&self.browser.download_dir).map_err(|e| {
            ExportError::DriverInitialization(format!(
                "cannot create download directory {}: {e}",
                self.browser.download_dir.display()
            ))
        })?;

        let mut failures = Vec::new();
        for provisioner in &self.provisioners {
            match self.try_provisioner(provisioner.as_ref()).await {
                Ok(session) => {
                    info!(provisioner = provisioner.name(), "Browser session ready");
                    return Ok(session);
                }
                Err(e) => {
                    warn!(provisioner = provisioner.name(), "Driver attempt failed: {}", e);
                    failures.push(format!("{}: {e}", provisioner.name()));
                }
            }
        }
        Err(ExportError::DriverInitialization(if failures.is_empty() {
            "no driver provisioners configured".to_string()
        } else {
            failures.join("; ")
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Unavailable(&'static str);

    #[async_trait]
    impl DriverProvisioner for Unavailable {
        fn name(&self) -> &str {
            self.0
        }

        async fn provision(&self) -> Result<DriverEndpoint, AutomationError> {
            Err(AutomationError::PlatformError("not installed".into()))
        }
    }

    #[tokio::test]
    async fn all_attempts_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let browser = BrowserConfig {
            download_dir: dir.path().join("downloads"),
            ..BrowserConfig::default()
        };
        let init = SessionInitializer::with_provisioners(
            &browser,
            vec![Box::new(Unavailable("managed")), Box::new(Unavailable("existing"))],
        );
        let err = match init.open().await {
            Err(e) => e,
            Ok(_) => panic!("session should not open"),
        };
        let message = err.to_string();
        assert!(matches!(err, ExportError::DriverInitialization(_)));
        assert!(message.contains("managed: "));
        assert!(message.contains("existing: "));
        assert!(dir.path().join("downloads").is_dir());
    }

    #[test]
    fn missing_explicit_binary_is_rejected() {
        let driver = ManagedDriver::new(Some(PathBuf::from("/nonexistent/chromedriver")));
        assert!(matches!(
            driver.resolve_binary(),
            Err(AutomationError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_not_ready() {
        let port = free_port().unwrap();
        assert!(!driver_ready(&format!("http://127.0.0.1:{port}")).await);
    }
}
