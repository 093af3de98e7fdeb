//! Finding the report's export control and picking a format from its menu.
//!
//! The control is an unlabeled icon in the report header, so it is located
//! by a chain of heuristics. The menu it opens renders in an overlay outside
//! the main document tree; entries are picked either blind (arrow keys) or by
//! searching the whole document for the format label.

use crate::config::{ExportConfig, MenuStrategyKind, TimeoutConfig};
use crate::diagnostics::Diagnostics;
use crate::element::{Element, Key};
use crate::errors::{AutomationError, ExportError};
use crate::locator::{ElementFilter, LocatorChain, LocatorStrategy};
use crate::platforms::BrowserEngine;
use crate::selector::{xpath_literal, Selector};
use crate::wait::settle;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

/// Markup fragments that make an `<svg>` look like a drawn icon.
const ICON_SHAPES: &[&str] = &["path", "polygon", "circle"];

/// Buttons carrying an icon, matched by keyword or by sitting in the
/// header/toolbar that holds the anchor text.
pub struct IconButtonStrategy {
    anchor_text: String,
    keywords: Vec<String>,
}

impl IconButtonStrategy {
    pub fn new(anchor_text: impl Into<String>, keywords: &[String]) -> Self {
        Self {
            anchor_text: anchor_text.into(),
            keywords: keywords.iter().map(|k| k.to_lowercase()).collect(),
        }
    }

    pub(crate) fn container_selector(&self) -> Selector {
        Selector::xpath(format!(
            "//*[contains(text(), {})]/ancestor::*[contains(@class, 'header') or contains(@class, 'toolbar') or contains(@class, 'action')]",
            xpath_literal(&self.anchor_text)
        ))
    }

    /// Ids of buttons inside a container that also holds the anchor text.
    async fn anchored_button_ids(&self, engine: &dyn BrowserEngine) -> HashSet<String> {
        let mut ids = HashSet::new();
        let containers = engine
            .find_all(&self.container_selector())
            .await
            .unwrap_or_default();
        for container in containers {
            if let Ok(buttons) = container.find_all(Selector::tag("button")).await {
                ids.extend(buttons.iter().map(Element::id));
            }
        }
        ids
    }
}

#[async_trait]
impl LocatorStrategy for IconButtonStrategy {
    fn name(&self) -> String {
        "icon-button".to_string()
    }

    async fn find(&self, engine: &dyn BrowserEngine) -> Result<Option<Element>, AutomationError> {
        let buttons = engine.find_all(&Selector::tag("button")).await?;
        debug!("Icon scan sees {} buttons", buttons.len());
        let mut anchored: Option<HashSet<String>> = None;

        for button in buttons {
            if !matches!(button.is_displayed().await, Ok(true)) {
                continue;
            }
            let svgs = button.find_all(Selector::tag("svg")).await.unwrap_or_default();
            if svgs.is_empty() {
                continue;
            }

            let mut hints = String::new();
            for attr in ["title", "aria-label", "class"] {
                hints.push_str(&button.attr_lower(attr).await);
                hints.push(' ');
            }
            if let Some(keyword) = self.keywords.iter().find(|k| hints.contains(k.as_str())) {
                debug!("Icon button matched keyword '{}'", keyword);
                return Ok(Some(button));
            }

            for svg in &svgs {
                let markup = svg.outer_html().await.unwrap_or_default().to_lowercase();
                if !ICON_SHAPES.iter().any(|shape| markup.contains(shape)) {
                    continue;
                }
                if anchored.is_none() {
                    anchored = Some(self.anchored_button_ids(engine).await);
                }
                if anchored
                    .as_ref()
                    .is_some_and(|ids| ids.contains(&button.id()))
                {
                    debug!("Icon button sits next to '{}'", self.anchor_text);
                    return Ok(Some(button));
                }
            }
        }
        Ok(None)
    }
}

/// Buttons near the anchor text, preferring ones that carry an icon.
pub struct AnchorProximityStrategy {
    anchor_text: String,
}

impl AnchorProximityStrategy {
    pub fn new(anchor_text: impl Into<String>) -> Self {
        Self {
            anchor_text: anchor_text.into(),
        }
    }
}

#[async_trait]
impl LocatorStrategy for AnchorProximityStrategy {
    fn name(&self) -> String {
        format!("near-text:{}", self.anchor_text)
    }

    async fn find(&self, engine: &dyn BrowserEngine) -> Result<Option<Element>, AutomationError> {
        let anchors = engine
            .find_all(&Selector::containing_text(&self.anchor_text))
            .await?;
        for anchor in anchors {
            let parent = match anchor.find_all(Selector::xpath("./ancestor::*[1]")).await {
                Ok(parents) => parents.into_iter().next(),
                Err(e) => {
                    debug!("Skipping '{}' anchor without a parent: {}", self.anchor_text, e);
                    continue;
                }
            };
            let Some(parent) = parent else {
                continue;
            };
            let nearby = match parent
                .find_all(Selector::xpath(
                    ".//button | ./following-sibling::*//button | ./preceding-sibling::*//button",
                ))
                .await
            {
                Ok(nearby) => nearby,
                Err(e) => {
                    debug!("Skipping '{}' anchor: {}", self.anchor_text, e);
                    continue;
                }
            };

            let mut styled = None;
            for button in nearby {
                if !matches!(button.is_displayed().await, Ok(true)) {
                    continue;
                }
                let has_icon = !button
                    .find_all(Selector::tag("svg"))
                    .await
                    .unwrap_or_default()
                    .is_empty();
                if has_icon {
                    return Ok(Some(button));
                }
                if styled.is_none() && !button.attr_lower("class").await.trim().is_empty() {
                    styled = Some(button);
                }
            }
            if styled.is_some() {
                return Ok(styled);
            }
        }
        Ok(None)
    }
}

/// Icon heuristics, then proximity to the anchor, then the configured
/// class/title/label selectors.
pub fn export_control(config: &ExportConfig) -> LocatorChain {
    LocatorChain::new("export control")
        .with(IconButtonStrategy::new(&config.anchor_text, &config.icon_keywords))
        .with(AnchorProximityStrategy::new(&config.anchor_text))
        .selectors(&config.control_selectors, ElementFilter::visible())
}

/// Case-insensitive search for any element whose text contains `label`.
pub fn format_label_selector(label: &str) -> Selector {
    Selector::xpath(format!(
        "//*[contains(translate(normalize-space(.), 'ABCDEFGHIJKLMNOPQRSTUVWXYZ', 'abcdefghijklmnopqrstuvwxyz'), {})]",
        xpath_literal(&label.to_lowercase())
    ))
}

/// How closely an element resembles a menu entry; lower is better.
async fn menu_rank(element: &Element) -> Option<u8> {
    let role = element.attr_lower("role").await;
    if matches!(role.as_str(), "menuitem" | "menuitemradio" | "option") {
        return Some(0);
    }
    let class = element.attr_lower("class").await;
    if class.contains("menuitem") || class.contains("menu-item") || class.contains("menu__item") {
        return Some(1);
    }
    if class.contains("menu") {
        return Some(2);
    }
    match element.tag_name().await.ok()?.as_str() {
        "a" | "button" | "li" => Some(3),
        "div" | "span" => Some(4),
        _ => None,
    }
}

/// The visible element most likely to be the menu entry for `label`.
///
/// Broad text matches also hit the containers wrapping the entry, so the
/// most menu-like candidate wins, then the one with the least text.
pub async fn find_menu_item(
    engine: &dyn BrowserEngine,
    label: &str,
) -> Result<Option<Element>, AutomationError> {
    let needle = label.to_lowercase();
    let candidates = engine.find_all(&format_label_selector(label)).await?;
    let mut best: Option<(u8, usize, Element)> = None;
    for candidate in candidates {
        if !matches!(candidate.is_displayed().await, Ok(true)) {
            continue;
        }
        let Ok(text) = candidate.text().await else {
            continue;
        };
        let text = text.trim();
        if !text.to_lowercase().contains(&needle) {
            continue;
        }
        let Some(rank) = menu_rank(&candidate).await else {
            continue;
        };
        let len = text.chars().count();
        let better = match &best {
            Some((best_rank, best_len, _)) => (rank, len) < (*best_rank, *best_len),
            None => true,
        };
        if better {
            best = Some((rank, len, candidate));
        }
    }
    Ok(best.map(|(_, _, element)| element))
}

/// One way of choosing the format once the menu is open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MenuStrategy {
    Keyboard { down_presses: usize, pause: Duration },
    ContentMatch { labels: Vec<String> },
}

impl MenuStrategy {
    pub fn from_config(kind: MenuStrategyKind, config: &ExportConfig) -> Self {
        match kind {
            MenuStrategyKind::Keyboard => MenuStrategy::Keyboard {
                down_presses: config.keyboard_down_presses,
                pause: Duration::from_millis(config.keyboard_pause_ms),
            },
            MenuStrategyKind::Content => MenuStrategy::ContentMatch {
                labels: config.format_labels.clone(),
            },
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            MenuStrategy::Keyboard { .. } => "keyboard",
            MenuStrategy::ContentMatch { .. } => "content",
        }
    }

    /// Perform the selection. An error means the strategy could not be
    /// carried out at all.
    pub async fn select(&self, engine: &dyn BrowserEngine) -> Result<(), AutomationError> {
        match self {
            MenuStrategy::Keyboard {
                down_presses,
                pause,
            } => {
                if let Err(e) = engine.focus_body().await {
                    debug!("Could not focus document body: {}", e);
                }
                let mut keys = vec![Key::Down; *down_presses];
                keys.push(Key::Enter);
                engine.send_key_sequence(&keys, *pause).await?;
                info!("Selected menu entry with {} arrow presses", down_presses);
                Ok(())
            }
            MenuStrategy::ContentMatch { labels } => {
                for label in labels {
                    let Some(item) = find_menu_item(engine, label).await? else {
                        debug!("No menu entry mentions '{}'", label);
                        continue;
                    };
                    activate_menu_item(engine, &item).await?;
                    info!("Selected menu entry '{}'", label);
                    return Ok(());
                }
                Err(AutomationError::ElementNotFound(format!(
                    "no visible menu entry for {}",
                    labels.join(" / ")
                )))
            }
        }
    }
}

/// Script click first (menus sit in overlays that intercept the pointer),
/// then a pointer click, then the element's own click.
async fn activate_menu_item(engine: &dyn BrowserEngine, item: &Element) -> Result<(), AutomationError> {
    if let Err(e) = engine.script_click(item).await {
        debug!("Script click failed: {}", e);
        if let Err(e) = engine.pointer_click(item).await {
            debug!("Pointer click failed: {}", e);
            item.click().await?;
        }
    }
    Ok(())
}

/// What the trigger did, for logging and tests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TriggerOutcome {
    pub control_strategy: String,
    pub menu_strategy: String,
}

pub struct ExportTrigger<'a> {
    config: &'a ExportConfig,
    timeouts: &'a TimeoutConfig,
    diagnostics: &'a dyn Diagnostics,
    control: LocatorChain,
}

impl<'a> ExportTrigger<'a> {
    pub fn new(
        config: &'a ExportConfig,
        timeouts: &'a TimeoutConfig,
        diagnostics: &'a dyn Diagnostics,
    ) -> Self {
        Self {
            config,
            timeouts,
            diagnostics,
            control: export_control(config),
        }
    }

    /// Open the export menu and choose the configured format.
    #[instrument(skip_all)]
    pub async fn trigger(&self, engine: &dyn BrowserEngine) -> Result<TriggerOutcome, ExportError> {
        let Some(control) = self.control.find_first(engine).await else {
            error!("Export control not found");
            self.capture(engine, "export_button_not_found").await;
            return Err(ExportError::ExportControlNotFound(format!(
                "tried {}",
                self.control.strategy_names().join(", ")
            )));
        };

        if let Err(e) = self.activate_control(engine, &control.element).await {
            error!("Export control found but not clickable: {}", e);
            self.capture(engine, "export_button_not_found").await;
            return Err(ExportError::ExportControlNotFound(format!(
                "found via {} but could not click it: {e}",
                control.strategy
            )));
        }
        info!(strategy = %control.strategy, "Opened export menu");
        settle(self.timeouts.menu_open()).await;

        let mut failures = Vec::new();
        for kind in &self.config.menu_strategies {
            let strategy = MenuStrategy::from_config(*kind, self.config);
            match strategy.select(engine).await {
                Ok(()) => {
                    return Ok(TriggerOutcome {
                        control_strategy: control.strategy,
                        menu_strategy: strategy.name().to_string(),
                    });
                }
                Err(e) => {
                    warn!(strategy = strategy.name(), "Menu selection failed: {}", e);
                    failures.push(format!("{}: {e}", strategy.name()));
                }
            }
        }

        error!("No menu strategy could select the export format");
        self.capture(engine, "export_error").await;
        Err(ExportError::ExportOptionNotFound(failures.join("; ")))
    }

    /// Pointer click first so the menu sees real hover/focus events.
    async fn activate_control(
        &self,
        engine: &dyn BrowserEngine,
        control: &Element,
    ) -> Result<(), AutomationError> {
        if let Err(e) = engine.pointer_click(control).await {
            debug!("Pointer click on export control failed, clicking directly: {}", e);
            control.click().await?;
        }
        Ok(())
    }

    async fn capture(&self, engine: &dyn BrowserEngine, label: &str) {
        self.diagnostics.capture_screenshot(engine, label).await;
        self.diagnostics.capture_markup(engine, label).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_selector_lowercases_the_needle() {
        let selector = format_label_selector("CSV");
        assert!(selector.to_string().contains("'csv'"));
        assert!(matches!(selector, Selector::XPath(_)));
    }

    #[test]
    fn strategies_follow_config() {
        let config = ExportConfig::default();
        let keyboard = MenuStrategy::from_config(MenuStrategyKind::Keyboard, &config);
        assert_eq!(
            keyboard,
            MenuStrategy::Keyboard {
                down_presses: 3,
                pause: Duration::from_millis(300)
            }
        );
        assert_eq!(
            MenuStrategy::from_config(MenuStrategyKind::Content, &config).name(),
            "content"
        );
    }

    #[test]
    fn control_chain_order() {
        let chain = export_control(&ExportConfig::default());
        let names = chain.strategy_names();
        assert_eq!(names[0], "icon-button");
        assert_eq!(names[1], "near-text:Records");
        assert_eq!(names[2], "css:button[class*='export']");
    }
}
