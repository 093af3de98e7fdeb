//! Pipeline configuration.
//!
//! Every section has defaults matching the portal this crate was first
//! pointed at, so a YAML file only needs to name what differs. Durations are
//! plain integers with the unit in the field name.

use crate::errors::ExportError;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub portal: PortalConfig,
    pub browser: BrowserConfig,
    pub timeouts: TimeoutConfig,
    pub export: ExportConfig,
    pub download: DownloadConfig,
    pub archive: ArchiveConfig,
    pub diagnostics: DiagnosticsConfig,
}

impl PipelineConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ExportError> {
        let config: Self = serde_yaml::from_str(yaml)
            .map_err(|e| ExportError::Config(format!("invalid YAML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self, ExportError> {
        let yaml = std::fs::read_to_string(path).map_err(|e| {
            ExportError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_yaml_str(&yaml)
    }

    pub fn to_yaml(&self) -> Result<String, ExportError> {
        serde_yaml::to_string(self).map_err(|e| ExportError::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ExportError> {
        let urls = [
            ("portal.login_url", &self.portal.login_url),
            ("portal.identity_login_url", &self.portal.identity_login_url),
            ("portal.report_url", &self.portal.report_url),
            ("browser.webdriver_url", &self.browser.webdriver_url),
        ];
        for (field, value) in urls {
            if value.trim().is_empty() {
                return Err(ExportError::Config(format!("{field} must not be empty")));
            }
        }
        if self.portal.app_host.trim().is_empty() {
            return Err(ExportError::Config("portal.app_host must not be empty".into()));
        }
        if self.export.menu_strategies.is_empty() {
            return Err(ExportError::Config(
                "export.menu_strategies needs at least one strategy".into(),
            ));
        }
        if self.export.format_labels.is_empty() {
            return Err(ExportError::Config(
                "export.format_labels needs at least one label".into(),
            ));
        }
        if self.timeouts.poll_interval_ms == 0 || self.download.poll_interval_secs == 0 {
            return Err(ExportError::Config("poll intervals must be non-zero".into()));
        }
        if self.archive.prefix.trim().is_empty() {
            return Err(ExportError::Config("archive.prefix must not be empty".into()));
        }
        if self.download.extension.trim_start_matches('.').is_empty() {
            return Err(ExportError::Config("download.extension must not be empty".into()));
        }
        Ok(())
    }
}

/// Where the portal lives and how to tell its pages apart.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PortalConfig {
    /// Entry point that redirects to the hosted identity provider
    pub login_url: String,
    /// Direct identity-provider login page, used when no redirect happens
    pub identity_login_url: String,
    /// Substrings of the URL that identify the hosted login page
    pub identity_markers: Vec<String>,
    /// Host of the authenticated application
    pub app_host: String,
    /// Substrings of the URL that mean the browser is still on a login page
    pub login_markers: Vec<String>,
    pub report_url: String,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            login_url: "https://redbeam.com/login".to_string(),
            identity_login_url: "https://login.app.redbeam.com/u/login/identifier".to_string(),
            identity_markers: vec!["login.app.redbeam.com".to_string(), "auth0".to_string()],
            app_host: "app.redbeam.com".to_string(),
            login_markers: vec![
                "login.app.redbeam.com".to_string(),
                "/u/login".to_string(),
                "login".to_string(),
            ],
            report_url: "https://app.redbeam.com/g/0/Reports/All%20Assets".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub headless: bool,
    pub window_width: u32,
    pub window_height: u32,
    pub user_agent: String,
    pub download_dir: PathBuf,
    /// Endpoint of a driver that is already running on the host
    pub webdriver_url: String,
    /// Explicit chromedriver binary; looked up on `PATH` when unset
    pub driver_binary: Option<PathBuf>,
    pub browser_binary: Option<PathBuf>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            window_width: 1920,
            window_height: 1080,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36".to_string(),
            download_dir: default_download_dir(),
            webdriver_url: "http://localhost:9515".to_string(),
            driver_binary: None,
            browser_binary: None,
        }
    }
}

fn default_download_dir() -> PathBuf {
    dirs::download_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join("Downloads")))
        .unwrap_or_else(|| PathBuf::from("Downloads"))
}

/// Per-stage waits. There is no overall deadline for a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub redirect_secs: u64,
    pub page_load_secs: u64,
    pub password_step_secs: u64,
    pub login_complete_secs: u64,
    /// Extra time for client-side rendering after the document reports loaded
    pub settle_secs: u64,
    pub menu_open_secs: u64,
    pub poll_interval_ms: u64,
    /// Pause after typing into a login field before moving on
    pub field_settle_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            redirect_secs: 30,
            page_load_secs: 30,
            password_step_secs: 15,
            login_complete_secs: 45,
            settle_secs: 10,
            menu_open_secs: 5,
            poll_interval_ms: 500,
            field_settle_ms: 2000,
        }
    }
}

impl TimeoutConfig {
    pub fn redirect(&self) -> Duration {
        Duration::from_secs(self.redirect_secs)
    }

    pub fn page_load(&self) -> Duration {
        Duration::from_secs(self.page_load_secs)
    }

    pub fn password_step(&self) -> Duration {
        Duration::from_secs(self.password_step_secs)
    }

    pub fn login_complete(&self) -> Duration {
        Duration::from_secs(self.login_complete_secs)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_secs(self.settle_secs)
    }

    pub fn menu_open(&self) -> Duration {
        Duration::from_secs(self.menu_open_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn field_settle(&self) -> Duration {
        Duration::from_millis(self.field_settle_ms)
    }

    /// Zero every wait; for tests against a scripted browser.
    pub fn immediate() -> Self {
        Self {
            redirect_secs: 0,
            page_load_secs: 0,
            password_step_secs: 0,
            login_complete_secs: 0,
            settle_secs: 0,
            menu_open_secs: 0,
            poll_interval_ms: 1,
            field_settle_ms: 0,
        }
    }
}

/// How a menu entry gets selected once the export menu is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MenuStrategyKind {
    /// Fixed number of arrow-down presses then Enter. Relies on the menu
    /// order being known up front.
    Keyboard,
    /// Search the document for an item naming the format
    Content,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Text label next to the export control in the report header
    pub anchor_text: String,
    pub icon_keywords: Vec<String>,
    /// CSS selectors for the class/title/label fallback, in order
    pub control_selectors: Vec<String>,
    pub format_labels: Vec<String>,
    pub menu_strategies: Vec<MenuStrategyKind>,
    /// Arrow-down presses for the keyboard strategy. With the default menu
    /// (two spreadsheet formats, then CSV) three presses land on CSV.
    pub keyboard_down_presses: usize,
    pub keyboard_pause_ms: u64,
    /// Element that only exists once the report has rendered
    pub ready_selector: Option<String>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            anchor_text: "Records".to_string(),
            icon_keywords: ["export", "download", "cloud", "arrow"]
                .map(String::from)
                .to_vec(),
            control_selectors: [
                "button[class*='export']",
                "button[class*='download']",
                "button[class*='icon']",
                "button[title*='Export']",
                "button[title*='Download']",
                "button[aria-label*='Export']",
                "button[aria-label*='Download']",
            ]
            .map(String::from)
            .to_vec(),
            format_labels: vec!["CSV".to_string(), "Comma Separated Values".to_string()],
            menu_strategies: vec![MenuStrategyKind::Keyboard, MenuStrategyKind::Content],
            keyboard_down_presses: 3,
            keyboard_pause_ms: 300,
            ready_selector: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    pub extension: String,
    pub poll_interval_secs: u64,
    pub max_wait_secs: u64,
    /// Files older than this are leftovers from an earlier run
    pub freshness_secs: u64,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            extension: "csv".to_string(),
            poll_interval_secs: 2,
            max_wait_secs: 60,
            freshness_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    pub dest_dir: PathBuf,
    pub prefix: String,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            dest_dir: dirs::desktop_dir()
                .map(|desktop| desktop.join("redbeam scraper"))
                .unwrap_or_else(|| PathBuf::from("archive")),
            prefix: "redbeam_data".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticsConfig {
    /// Where screenshots and markup dumps land
    pub dir: PathBuf,
    /// Save the login page markup before looking for the form fields
    pub dump_login_page: bool,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("."),
            dump_login_page: false,
        }
    }
}

/// Login identifier and secret. Supplied by the caller for each run; the
/// secret never appears in `Debug` output.
pub struct Credential {
    pub identifier: String,
    pub secret: SecretString,
}

impl Credential {
    pub fn new(identifier: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            secret: SecretString::from(secret.into()),
        }
    }

    pub fn expose_secret(&self) -> &str {
        self.secret.expose_secret()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("identifier", &self.identifier)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_yaml_keeps_defaults() {
        let config = PipelineConfig::from_yaml_str(
            r#"
archive:
  dest_dir: /srv/reports
export:
  menu_strategies: [content]
timeouts:
  settle_secs: 3
"#,
        )
        .unwrap();
        assert_eq!(config.archive.dest_dir, PathBuf::from("/srv/reports"));
        assert_eq!(config.archive.prefix, "redbeam_data");
        assert_eq!(config.export.menu_strategies, vec![MenuStrategyKind::Content]);
        assert_eq!(config.export.keyboard_down_presses, 3);
        assert_eq!(config.timeouts.settle(), Duration::from_secs(3));
        assert_eq!(config.timeouts.login_complete(), Duration::from_secs(45));
    }

    #[test]
    fn empty_strategy_list_is_rejected() {
        let err = PipelineConfig::from_yaml_str("export:\n  menu_strategies: []\n").unwrap_err();
        assert!(matches!(err, ExportError::Config(_)));
    }

    #[test]
    fn empty_prefix_is_rejected() {
        let mut config = PipelineConfig::default();
        config.archive.prefix = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn credential_debug_hides_secret() {
        let credential = Credential::new("ops@example.com", "hunter2");
        let printed = format!("{credential:?}");
        assert!(printed.contains("ops@example.com"));
        assert!(!printed.contains("hunter2"));
        assert_eq!(credential.expose_secret(), "hunter2");
    }
}
