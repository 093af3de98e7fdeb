use crate::errors::AutomationError;
use crate::selector::Selector;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::Debug;

/// Keys the pipeline sends to the page, either to a focused element or as
/// a free-standing keyboard sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Key {
    Down,
    Enter,
    Tab,
    Escape,
}

impl Key {
    /// The WebDriver code point for this key.
    pub fn code_point(self) -> char {
        match self {
            Key::Down => '\u{e015}',
            Key::Enter => '\u{e007}',
            Key::Tab => '\u{e004}',
            Key::Escape => '\u{e00c}',
        }
    }
}

/// A live element in the current page.
///
/// Elements are cheap handles; every accessor goes back to the browser, so a
/// handle may fail once the page re-renders the node it points to.
#[derive(Debug)]
pub struct Element {
    inner: Box<dyn ElementImpl>,
}

/// Attribute snapshot of an element, used for logging what a scan saw.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ElementSummary {
    pub tag: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
}

impl fmt::Display for ElementSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<{}> type={} name={} id={} class={}",
            self.tag,
            self.input_type.as_deref().unwrap_or("-"),
            self.name.as_deref().unwrap_or("-"),
            self.id.as_deref().unwrap_or("-"),
            self.class.as_deref().unwrap_or("-"),
        )
    }
}

/// Backend-specific element operations.
#[async_trait]
pub trait ElementImpl: Send + Sync + Debug {
    /// Stable identity of the underlying node within the session.
    fn id(&self) -> String;
    async fn tag_name(&self) -> Result<String, AutomationError>;
    async fn attr(&self, name: &str) -> Result<Option<String>, AutomationError>;
    /// Rendered text of the element and its descendants.
    async fn text(&self) -> Result<String, AutomationError>;
    async fn outer_html(&self) -> Result<String, AutomationError>;
    async fn is_displayed(&self) -> Result<bool, AutomationError>;
    async fn is_enabled(&self) -> Result<bool, AutomationError>;
    /// Find elements relative to this one.
    async fn find_all(&self, selector: &Selector) -> Result<Vec<Element>, AutomationError>;
    async fn click(&self) -> Result<(), AutomationError>;
    async fn clear(&self) -> Result<(), AutomationError>;
    async fn send_keys(&self, text: &str) -> Result<(), AutomationError>;
    async fn press_key(&self, key: Key) -> Result<(), AutomationError> {
        self.send_keys(&key.code_point().to_string()).await
    }
    fn as_any(&self) -> &dyn std::any::Any;
    fn clone_box(&self) -> Box<dyn ElementImpl>;
}

impl Element {
    pub fn new(inner: Box<dyn ElementImpl>) -> Self {
        Self { inner }
    }

    pub fn id(&self) -> String {
        self.inner.id()
    }

    pub async fn tag_name(&self) -> Result<String, AutomationError> {
        Ok(self.inner.tag_name().await?.to_lowercase())
    }

    pub async fn attr(&self, name: &str) -> Result<Option<String>, AutomationError> {
        self.inner.attr(name).await
    }

    /// Attribute value lowercased, empty when absent.
    pub async fn attr_lower(&self, name: &str) -> String {
        self.inner
            .attr(name)
            .await
            .ok()
            .flatten()
            .unwrap_or_default()
            .to_lowercase()
    }

    pub async fn text(&self) -> Result<String, AutomationError> {
        self.inner.text().await
    }

    pub async fn outer_html(&self) -> Result<String, AutomationError> {
        self.inner.outer_html().await
    }

    pub async fn is_displayed(&self) -> Result<bool, AutomationError> {
        self.inner.is_displayed().await
    }

    pub async fn is_enabled(&self) -> Result<bool, AutomationError> {
        self.inner.is_enabled().await
    }

    /// Visible and enabled. Lookup failures count as "not interactable",
    /// since nodes detach while the page is still rendering.
    pub async fn is_interactable(&self) -> bool {
        matches!(self.inner.is_displayed().await, Ok(true))
            && matches!(self.inner.is_enabled().await, Ok(true))
    }

    pub async fn find_all(
        &self,
        selector: impl Into<Selector>,
    ) -> Result<Vec<Element>, AutomationError> {
        self.inner.find_all(&selector.into()).await
    }

    pub async fn click(&self) -> Result<(), AutomationError> {
        self.inner.click().await
    }

    pub async fn clear(&self) -> Result<(), AutomationError> {
        self.inner.clear().await
    }

    pub async fn send_keys(&self, text: &str) -> Result<(), AutomationError> {
        self.inner.send_keys(text).await
    }

    pub async fn press_key(&self, key: Key) -> Result<(), AutomationError> {
        self.inner.press_key(key).await
    }

    /// Replace the element's value with `text`.
    pub async fn fill(&self, text: &str) -> Result<(), AutomationError> {
        self.inner.clear().await?;
        self.inner.send_keys(text).await
    }

    pub async fn summary(&self) -> ElementSummary {
        ElementSummary {
            tag: self.tag_name().await.unwrap_or_default(),
            input_type: self.attr("type").await.ok().flatten(),
            name: self.attr("name").await.ok().flatten(),
            id: self.attr("id").await.ok().flatten(),
            class: self.attr("class").await.ok().flatten(),
        }
    }

    pub fn as_any(&self) -> &dyn std::any::Any {
        self.inner.as_any()
    }
}

impl Clone for Element {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone_box(),
        }
    }
}

impl PartialEq for Element {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for Element {}
