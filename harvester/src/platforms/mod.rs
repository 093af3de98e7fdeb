use crate::{AutomationError, Element, Key, Selector};
use std::time::Duration;

pub mod webdriver;

/// The common trait every browser backend implements.
///
/// One engine drives exactly one browser session; the pipeline owns it for
/// the whole run and nothing else touches it concurrently.
#[async_trait::async_trait]
pub trait BrowserEngine: Send + Sync {
    /// Navigate the current tab to `url`
    async fn goto(&self, url: &str) -> Result<(), AutomationError>;

    /// The location currently shown by the browser
    async fn current_url(&self) -> Result<String, AutomationError>;

    /// Find all elements matching a selector anywhere in the document,
    /// including overlay layers rendered outside the main tree
    async fn find_all(&self, selector: &Selector) -> Result<Vec<Element>, AutomationError>;

    /// Run a script in the page; `args` are exposed as `arguments[i]`
    async fn execute(
        &self,
        script: &str,
        args: &[&Element],
    ) -> Result<serde_json::Value, AutomationError>;

    /// `document.readyState` of the current page
    async fn ready_state(&self) -> Result<String, AutomationError> {
        let value = self.execute("return document.readyState;", &[]).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    /// Move keyboard focus to the document body so page-level key events
    /// reach whatever menu currently owns the keyboard
    async fn focus_body(&self) -> Result<(), AutomationError> {
        self.execute("document.body.focus();", &[]).await.map(|_| ())
    }

    /// Press and release each key in order, pausing between presses
    async fn send_key_sequence(&self, keys: &[Key], pause: Duration)
        -> Result<(), AutomationError>;

    /// Move the pointer onto the element and click it, so it receives real
    /// hover and focus events
    async fn pointer_click(&self, element: &Element) -> Result<(), AutomationError>;

    /// Click through a script-dispatched event, bypassing overlays that
    /// would intercept a pointer click
    async fn script_click(&self, element: &Element) -> Result<(), AutomationError> {
        self.execute(
            "arguments[0].scrollIntoView({block: 'center'}); arguments[0].click();",
            &[element],
        )
        .await
        .map(|_| ())
    }

    /// PNG screenshot of the viewport
    async fn screenshot(&self) -> Result<Vec<u8>, AutomationError>;

    /// Full markup of the current document
    async fn page_source(&self) -> Result<String, AutomationError>;

    /// Terminate the browser session
    async fn quit(&self) -> Result<(), AutomationError>;

    /// Enable downcasting to concrete engine types
    fn as_any(&self) -> &dyn std::any::Any;
}
