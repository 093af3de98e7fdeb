use thiserror::Error;

use crate::diagnostics::Stage;

/// Low-level failures reported by the browser engine and its elements.
#[derive(Error, Debug)]
pub enum AutomationError {
    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Platform-specific error: {0}")]
    PlatformError(String),

    #[error("Invalid selector: {0}")]
    InvalidSelector(String),

    #[error("Element is not visible: {0}")]
    ElementNotVisible(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<fantoccini::error::CmdError> for AutomationError {
    fn from(err: fantoccini::error::CmdError) -> Self {
        if err.is_no_such_element() {
            AutomationError::ElementNotFound(err.to_string())
        } else {
            AutomationError::PlatformError(err.to_string())
        }
    }
}

/// Terminal errors of an export run. None of them is retried inside the
/// pipeline; the caller re-invokes the whole run on its next cycle.
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Driver initialization failed: {0}")]
    DriverInitialization(String),

    #[error("Login failed: {0}")]
    Login(String),

    #[error("Navigation timed out: {0}")]
    NavigationTimeout(String),

    #[error("Export control not found: {0}")]
    ExportControlNotFound(String),

    #[error("Export option not found: {0}")]
    ExportOptionNotFound(String),

    #[error("Downloaded file not found: {0}")]
    DownloadNotFound(String),

    #[error("Archive failed: {0}")]
    Archive(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl ExportError {
    /// The pipeline stage this error belongs to.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            ExportError::DriverInitialization(_) => Some(Stage::SessionInit),
            ExportError::Login(_) => Some(Stage::Authenticate),
            ExportError::NavigationTimeout(_) => Some(Stage::Navigate),
            ExportError::ExportControlNotFound(_) | ExportError::ExportOptionNotFound(_) => {
                Some(Stage::Export)
            }
            ExportError::DownloadNotFound(_) => Some(Stage::Download),
            ExportError::Archive(_) => Some(Stage::Archive),
            ExportError::Config(_) => None,
        }
    }
}
