//! Ordered element discovery.
//!
//! Each [`LocatorStrategy`] is one way of finding an element. A
//! [`LocatorChain`] tries its strategies in order and returns the first hit,
//! so when several strategies would match, the earliest one wins.

use crate::element::Element;
use crate::errors::AutomationError;
use crate::platforms::BrowserEngine;
use crate::selector::Selector;
use async_trait::async_trait;
use tracing::{debug, info, warn};

/// A single way of finding an element.
#[async_trait]
pub trait LocatorStrategy: Send + Sync {
    /// Name used in logs, e.g. `css:input[name='username']`.
    fn name(&self) -> String;

    async fn find(&self, engine: &dyn BrowserEngine) -> Result<Option<Element>, AutomationError>;
}

/// Element checks applied to raw selector matches.
///
/// Nodes that fail a check, or that fail to answer because they detached
/// mid-render, are skipped.
#[derive(Debug, Clone, Default)]
pub struct ElementFilter {
    require_visible: bool,
    require_enabled: bool,
    only_types: Vec<String>,
    excluded_types: Vec<String>,
}

impl ElementFilter {
    /// Accept anything.
    pub fn any() -> Self {
        Self::default()
    }

    /// Displayed, enabled elements.
    pub fn interactable() -> Self {
        Self {
            require_visible: true,
            require_enabled: true,
            ..Self::default()
        }
    }

    /// Displayed elements.
    pub fn visible() -> Self {
        Self {
            require_visible: true,
            ..Self::default()
        }
    }

    /// Only elements whose `type` attribute is one of `types`.
    pub fn only_types(mut self, types: &[&str]) -> Self {
        self.only_types = types.iter().map(|t| t.to_string()).collect();
        self
    }

    /// Skip elements whose `type` attribute is one of `types`.
    pub fn excluding_types(mut self, types: &[&str]) -> Self {
        self.excluded_types = types.iter().map(|t| t.to_string()).collect();
        self
    }

    pub async fn accepts(&self, element: &Element) -> bool {
        if self.require_visible && !matches!(element.is_displayed().await, Ok(true)) {
            return false;
        }
        if self.require_enabled && !matches!(element.is_enabled().await, Ok(true)) {
            return false;
        }
        if !self.only_types.is_empty() || !self.excluded_types.is_empty() {
            let element_type = match element.attr("type").await {
                Ok(t) => t.unwrap_or_default().to_lowercase(),
                Err(_) => return false,
            };
            if !self.only_types.is_empty() && !self.only_types.contains(&element_type) {
                return false;
            }
            if self.excluded_types.contains(&element_type) {
                return false;
            }
        }
        true
    }

    /// First element of `candidates` passing the filter.
    pub async fn first_accepted(&self, candidates: Vec<Element>) -> Option<Element> {
        for candidate in candidates {
            if self.accepts(&candidate).await {
                return Some(candidate);
            }
        }
        None
    }
}

/// Match one selector, then filter.
#[derive(Debug, Clone)]
pub struct SelectorStrategy {
    selector: Selector,
    filter: ElementFilter,
}

impl SelectorStrategy {
    pub fn new(selector: impl Into<Selector>, filter: ElementFilter) -> Self {
        Self {
            selector: selector.into(),
            filter,
        }
    }
}

#[async_trait]
impl LocatorStrategy for SelectorStrategy {
    fn name(&self) -> String {
        self.selector.to_string()
    }

    async fn find(&self, engine: &dyn BrowserEngine) -> Result<Option<Element>, AutomationError> {
        let candidates = engine.find_all(&self.selector).await?;
        Ok(self.filter.first_accepted(candidates).await)
    }
}

/// Look at every `<input>` on the page, in document order.
#[derive(Debug, Clone)]
pub struct InputScanStrategy {
    filter: ElementFilter,
}

impl InputScanStrategy {
    pub fn new(filter: ElementFilter) -> Self {
        Self { filter }
    }
}

#[async_trait]
impl LocatorStrategy for InputScanStrategy {
    fn name(&self) -> String {
        "scan:all-inputs".to_string()
    }

    async fn find(&self, engine: &dyn BrowserEngine) -> Result<Option<Element>, AutomationError> {
        let inputs = engine.find_all(&Selector::tag("input")).await?;
        debug!("Input scan sees {} input fields", inputs.len());
        Ok(self.filter.first_accepted(inputs).await)
    }
}

/// The element a chain found and which strategy found it.
#[derive(Debug, Clone)]
pub struct Located {
    pub element: Element,
    pub strategy: String,
}

/// Strategies tried in order until one yields an element.
pub struct LocatorChain {
    label: String,
    strategies: Vec<Box<dyn LocatorStrategy>>,
}

impl LocatorChain {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            strategies: Vec::new(),
        }
    }

    pub fn with(mut self, strategy: impl LocatorStrategy + 'static) -> Self {
        self.strategies.push(Box::new(strategy));
        self
    }

    pub fn with_boxed(mut self, strategy: Box<dyn LocatorStrategy>) -> Self {
        self.strategies.push(strategy);
        self
    }

    /// Append one [`SelectorStrategy`] per selector, sharing `filter`.
    pub fn selectors<S: AsRef<str>>(mut self, selectors: &[S], filter: ElementFilter) -> Self {
        for selector in selectors {
            self.strategies.push(Box::new(SelectorStrategy::new(
                selector.as_ref(),
                filter.clone(),
            )));
        }
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn strategy_names(&self) -> Vec<String> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Try each strategy once, in order.
    ///
    /// A strategy that errors (bad selector, node detached while rendering)
    /// counts as a miss and the chain moves on.
    pub async fn find_first(&self, engine: &dyn BrowserEngine) -> Option<Located> {
        for strategy in &self.strategies {
            let name = strategy.name();
            match strategy.find(engine).await {
                Ok(Some(element)) => {
                    info!(target_element = %self.label, strategy = %name, "Located element");
                    return Some(Located {
                        element,
                        strategy: name,
                    });
                }
                Ok(None) => debug!(target_element = %self.label, strategy = %name, "No match"),
                Err(e) => debug!(
                    target_element = %self.label,
                    strategy = %name,
                    "Strategy failed: {}",
                    e
                ),
            }
        }
        warn!(
            target_element = %self.label,
            tried = self.strategies.len(),
            "No strategy located the element"
        );
        None
    }
}

/// Login identifier (username / email) input.
pub fn identifier_field() -> LocatorChain {
    LocatorChain::new("identifier field")
        .selectors(
            &[
                "input[name='username']",
                "input[name='email']",
                "input[id='username']",
                "input[id='email']",
                "input[type='email']",
                "input[autocomplete='username']",
                "input[autocomplete='email']",
                "input[name='user']",
                "input[type='text']",
                "input[id*='user']",
                "input[id*='email']",
                "input[id*='login']",
                "input[class*='user']",
                "input[class*='email']",
                "//input[contains(@placeholder, 'user')]",
                "//input[contains(@placeholder, 'email')]",
                "//input[contains(@placeholder, 'Email')]",
                "//input[contains(@placeholder, 'Username')]",
            ],
            ElementFilter::interactable().excluding_types(&["password"]),
        )
        .with(InputScanStrategy::new(
            ElementFilter::interactable().excluding_types(&["password", "hidden", "submit", "button"]),
        ))
}

/// The "continue" control of the identifier step.
pub fn continue_button() -> LocatorChain {
    LocatorChain::new("continue button").selectors(
        &[
            "button[type='submit']",
            "button[data-action-button-primary='true']",
            "button[class*='continue']",
            "button[class*='submit']",
            "//button[contains(text(), 'Continue')]",
            "//button[contains(text(), 'CONTINUE')]",
            "//*[@type='submit']",
        ],
        ElementFilter::interactable(),
    )
}

/// Password input of the second login step.
pub fn password_field() -> LocatorChain {
    LocatorChain::new("password field")
        .selectors(
            &[
                "input[name='password']",
                "input[type='password']",
                "input[id*='pass']",
                "input[autocomplete='current-password']",
                "//input[contains(@name, 'pass')]",
            ],
            ElementFilter::interactable().only_types(&["password"]),
        )
        .with(InputScanStrategy::new(
            ElementFilter::visible().only_types(&["password"]),
        ))
}

/// Final submit control of the password step.
pub fn submit_button() -> LocatorChain {
    LocatorChain::new("submit button")
        .selectors(
            &[
                "button[type='submit']",
                "button[data-action-button-primary='true']",
                "button[class*='continue']",
                "button[class*='submit']",
                "input[type='submit']",
                "//button[contains(text(), 'Continue')]",
                "//button[contains(text(), 'CONTINUE')]",
                "//button[contains(text(), 'Login')]",
                "//button[contains(text(), 'Sign in')]",
                "//button[contains(text(), 'Log in')]",
                "//button[contains(text(), 'Sign In')]",
                "//input[@value='Login']",
                "//input[@value='Sign in']",
                "//input[@value='Continue']",
                "//button[contains(@class, 'login')]",
            ],
            ElementFilter::interactable(),
        )
        .selectors(&["//*[@type='submit']"], ElementFilter::visible())
}
