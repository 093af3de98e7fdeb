//! WebDriver backend built on `fantoccini`.
//!
//! Chrome is configured for unattended runs: headless, a fixed window size,
//! a custom user agent, and download preferences that save straight into
//! the configured directory without prompting.

use crate::config::BrowserConfig;
use crate::element::{Element, ElementImpl, Key};
use crate::errors::AutomationError;
use crate::platforms::BrowserEngine;
use crate::selector::Selector;
use async_trait::async_trait;
use fantoccini::actions::{
    InputSource, KeyAction, KeyActions, MouseActions, PointerAction, MOUSE_BUTTON_LEFT,
};
use fantoccini::{Client, ClientBuilder, Locator};
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::{debug, info};

/// Chrome capabilities for an unattended export session.
pub fn chrome_capabilities(config: &BrowserConfig) -> Map<String, Value> {
    let mut args = vec![
        "--no-sandbox".to_string(),
        "--disable-dev-shm-usage".to_string(),
        "--disable-gpu".to_string(),
        format!("--window-size={},{}", config.window_width, config.window_height),
        format!("--user-agent={}", config.user_agent),
    ];
    if config.headless {
        args.push("--headless=new".to_string());
    }

    let download_dir = config.download_dir.to_string_lossy().to_string();
    let prefs = json!({
        "download.default_directory": download_dir,
        "download.prompt_for_download": false,
        "download.directory_upgrade": true,
        "safebrowsing.enabled": true,
        "plugins.always_open_pdf_externally": true,
    });

    let mut chrome_opts = Map::new();
    chrome_opts.insert("args".to_string(), json!(args));
    chrome_opts.insert("prefs".to_string(), prefs);
    if let Some(binary) = &config.browser_binary {
        chrome_opts.insert(
            "binary".to_string(),
            json!(binary.to_string_lossy().to_string()),
        );
    }

    let mut caps = Map::new();
    caps.insert("browserName".to_string(), json!("chrome"));
    caps.insert("goog:chromeOptions".to_string(), Value::Object(chrome_opts));
    caps
}

fn locator(selector: &Selector) -> Locator<'_> {
    match selector {
        Selector::Css(s) => Locator::Css(s),
        Selector::XPath(s) => Locator::XPath(s),
        Selector::Tag(s) => Locator::Css(s),
    }
}

/// A live WebDriver session.
pub struct WebDriverEngine {
    client: Client,
}

impl WebDriverEngine {
    /// Open a new browser session against a running driver endpoint.
    pub async fn connect(webdriver_url: &str, config: &BrowserConfig) -> Result<Self, AutomationError> {
        debug!("Connecting to WebDriver at {}", webdriver_url);
        let client = ClientBuilder::native()
            .capabilities(chrome_capabilities(config))
            .connect(webdriver_url)
            .await
            .map_err(|e| {
                AutomationError::PlatformError(format!(
                    "Failed to open a session at {webdriver_url}: {e}"
                ))
            })?;

        if let Err(e) = client
            .set_window_size(config.window_width, config.window_height)
            .await
        {
            // headless Chrome already honours --window-size
            debug!("Could not set window size: {}", e);
        }

        info!("Browser session opened via {}", webdriver_url);
        Ok(Self { client })
    }

    fn wrap(&self, elements: Vec<fantoccini::elements::Element>) -> Vec<Element> {
        elements
            .into_iter()
            .map(|element| Element::new(Box::new(WebDriverElement { element })))
            .collect()
    }

    fn raw(element: &Element) -> Result<&fantoccini::elements::Element, AutomationError> {
        element
            .as_any()
            .downcast_ref::<WebDriverElement>()
            .map(|e| &e.element)
            .ok_or_else(|| {
                AutomationError::InvalidArgument(
                    "element does not belong to a WebDriver session".to_string(),
                )
            })
    }
}

#[async_trait]
impl BrowserEngine for WebDriverEngine {
    async fn goto(&self, url: &str) -> Result<(), AutomationError> {
        info!("Navigating to {}", url);
        self.client.goto(url).await?;
        Ok(())
    }

    async fn current_url(&self) -> Result<String, AutomationError> {
        Ok(self.client.current_url().await?.to_string())
    }

    async fn find_all(&self, selector: &Selector) -> Result<Vec<Element>, AutomationError> {
        let found = self.client.find_all(locator(selector)).await?;
        Ok(self.wrap(found))
    }

    async fn execute(
        &self,
        script: &str,
        args: &[&Element],
    ) -> Result<Value, AutomationError> {
        let mut json_args = Vec::with_capacity(args.len());
        for arg in args {
            let raw = Self::raw(arg)?;
            json_args.push(
                serde_json::to_value(raw)
                    .map_err(|e| AutomationError::InvalidArgument(e.to_string()))?,
            );
        }
        Ok(self.client.execute(script, json_args).await?)
    }

    async fn send_key_sequence(
        &self,
        keys: &[Key],
        pause: Duration,
    ) -> Result<(), AutomationError> {
        let mut actions = KeyActions::new("keyboard".to_string());
        for key in keys {
            let value = key.code_point();
            actions = actions
                .then(KeyAction::Down { value })
                .then(KeyAction::Up { value })
                .then(KeyAction::Pause { duration: pause });
        }
        self.client.perform_actions(actions).await?;
        self.client.release_actions().await?;
        Ok(())
    }

    async fn pointer_click(&self, element: &Element) -> Result<(), AutomationError> {
        let raw = Self::raw(element)?.clone();
        let actions = MouseActions::new("mouse".to_string())
            .then(PointerAction::MoveToElement {
                element: raw,
                duration: Some(Duration::from_millis(100)),
                x: Default::default(),
                y: Default::default(),
            })
            .then(PointerAction::Down {
                button: MOUSE_BUTTON_LEFT,
            })
            .then(PointerAction::Up {
                button: MOUSE_BUTTON_LEFT,
            });
        self.client.perform_actions(actions).await?;
        self.client.release_actions().await?;
        Ok(())
    }

    async fn screenshot(&self) -> Result<Vec<u8>, AutomationError> {
        Ok(self.client.screenshot().await?)
    }

    async fn page_source(&self) -> Result<String, AutomationError> {
        Ok(self.client.source().await?)
    }

    async fn quit(&self) -> Result<(), AutomationError> {
        self.client.clone().close().await?;
        info!("Browser session closed");
        Ok(())
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

#[derive(Debug, Clone)]
pub struct WebDriverElement {
    element: fantoccini::elements::Element,
}

#[async_trait]
impl ElementImpl for WebDriverElement {
    fn id(&self) -> String {
        self.element.element_id().to_string()
    }

    async fn tag_name(&self) -> Result<String, AutomationError> {
        Ok(self.element.tag_name().await?)
    }

    async fn attr(&self, name: &str) -> Result<Option<String>, AutomationError> {
        Ok(self.element.attr(name).await?)
    }

    async fn text(&self) -> Result<String, AutomationError> {
        Ok(self.element.text().await?)
    }

    async fn outer_html(&self) -> Result<String, AutomationError> {
        Ok(self.element.html(false).await?)
    }

    async fn is_displayed(&self) -> Result<bool, AutomationError> {
        Ok(self.element.is_displayed().await?)
    }

    async fn is_enabled(&self) -> Result<bool, AutomationError> {
        Ok(self.element.is_enabled().await?)
    }

    async fn find_all(&self, selector: &Selector) -> Result<Vec<Element>, AutomationError> {
        let found = self.element.find_all(locator(selector)).await?;
        Ok(found
            .into_iter()
            .map(|element| Element::new(Box::new(WebDriverElement { element })))
            .collect())
    }

    async fn click(&self) -> Result<(), AutomationError> {
        self.element.click().await?;
        Ok(())
    }

    async fn clear(&self) -> Result<(), AutomationError> {
        self.element.clear().await?;
        Ok(())
    }

    async fn send_keys(&self, text: &str) -> Result<(), AutomationError> {
        self.element.send_keys(text).await?;
        Ok(())
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn clone_box(&self) -> Box<dyn ElementImpl> {
        Box::new(self.clone())
    }
}
