//! A scripted in-memory browser.
//!
//! Pages are flat lists of nodes with parent links. Selector lookups are
//! answered from explicit routes registered by the test; `tag:` selectors
//! fall back to a scan by tag name so `body`, `input`, `button` and `svg`
//! work without routing. Clicks and key presses can trigger queued actions
//! (change the URL, reveal a node, write a download).

use crate::driver::{BrowserSession, SessionFactory};
use crate::element::{Element, ElementImpl, Key};
use crate::errors::{AutomationError, ExportError};
use crate::platforms::BrowserEngine;
use crate::selector::Selector;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

pub type NodeId = usize;

pub const BODY: NodeId = 0;

#[derive(Debug, Clone)]
pub enum Action {
    SetUrl(String),
    Reveal(NodeId),
    WriteFile(PathBuf, String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Goto(String),
    Click(NodeId),
    PointerClick(NodeId),
    ScriptClick(NodeId),
    SendKeys(NodeId, String),
    PressKey(NodeId, Key),
    Keys(Vec<Key>),
    FocusBody,
    Screenshot,
    PageSource,
    Quit,
}

#[derive(Debug, Clone)]
pub struct MockNode {
    tag: String,
    attrs: HashMap<String, String>,
    text: String,
    markup: Option<String>,
    displayed: bool,
    enabled: bool,
    parent: Option<NodeId>,
}

impl MockNode {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
            attrs: HashMap::new(),
            text: String::new(),
            markup: None,
            displayed: true,
            enabled: true,
            parent: Some(BODY),
        }
    }

    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attrs.insert(name.to_string(), value.to_string());
        self
    }

    pub fn text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }

    pub fn markup(mut self, markup: &str) -> Self {
        self.markup = Some(markup.to_string());
        self
    }

    pub fn hidden(mut self) -> Self {
        self.displayed = false;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn under(mut self, parent: NodeId) -> Self {
        self.parent = Some(parent);
        self
    }
}

#[derive(Debug, Default)]
struct State {
    url: String,
    ready_state: String,
    nodes: Vec<MockNode>,
    routes: HashMap<Selector, Vec<NodeId>>,
    relative_routes: HashMap<(NodeId, Selector), Vec<NodeId>>,
    failing_selectors: HashSet<Selector>,
    detached: HashSet<NodeId>,
    redirects: HashMap<String, String>,
    node_actions: HashMap<NodeId, VecDeque<Vec<Action>>>,
    key_actions: VecDeque<Vec<Action>>,
    fail_pointer_click: bool,
    fail_script_click: bool,
    fail_key_sequence: bool,
    calls: Vec<Call>,
}

impl State {
    fn is_descendant(&self, node: NodeId, ancestor: NodeId) -> bool {
        let mut current = self.nodes.get(node).and_then(|n| n.parent);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.nodes.get(id).and_then(|n| n.parent);
        }
        false
    }

    fn run(&mut self, actions: Vec<Action>) {
        for action in actions {
            match action {
                Action::SetUrl(url) => self.url = url,
                Action::Reveal(id) => {
                    if let Some(node) = self.nodes.get_mut(id) {
                        node.displayed = true;
                    }
                }
                Action::WriteFile(path, contents) => {
                    std::fs::write(&path, contents).unwrap();
                }
            }
        }
    }

    fn trigger(&mut self, id: NodeId) {
        if let Some(actions) = self.node_actions.get_mut(&id).and_then(|q| q.pop_front()) {
            self.run(actions);
        }
    }
}

#[derive(Debug, Clone)]
pub struct MockBrowser {
    state: Arc<Mutex<State>>,
}

impl MockBrowser {
    /// A loaded, empty page at `url` holding just `<body>`.
    pub fn new(url: &str) -> Self {
        let state = State {
            url: url.to_string(),
            ready_state: "complete".to_string(),
            nodes: vec![MockNode {
                parent: None,
                ..MockNode::new("body")
            }],
            ..State::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub fn add(&self, node: MockNode) -> NodeId {
        let mut state = self.lock();
        state.nodes.push(node);
        state.nodes.len() - 1
    }

    /// Answer `selector` with `ids`, in that order.
    pub fn route(&self, selector: impl Into<Selector>, ids: &[NodeId]) {
        self.lock().routes.insert(selector.into(), ids.to_vec());
    }

    /// Answer `selector` evaluated relative to `parent` with `ids`.
    pub fn route_within(&self, parent: NodeId, selector: impl Into<Selector>, ids: &[NodeId]) {
        self.lock()
            .relative_routes
            .insert((parent, selector.into()), ids.to_vec());
    }

    /// Make lookups of `selector` error out.
    pub fn fail_selector(&self, selector: impl Into<Selector>) {
        self.lock().failing_selectors.insert(selector.into());
    }

    /// Navigating to `from` lands on `to`.
    pub fn redirect(&self, from: &str, to: &str) {
        self.lock().redirects.insert(from.to_string(), to.to_string());
    }

    /// Run `actions` the next time `id` is clicked or receives Enter. Each
    /// call queues one batch; batches are consumed in order.
    pub fn on_activate(&self, id: NodeId, actions: Vec<Action>) {
        self.lock()
            .node_actions
            .entry(id)
            .or_default()
            .push_back(actions);
    }

    /// Run `actions` after the next page-level key sequence ending in Enter.
    pub fn on_key_enter(&self, actions: Vec<Action>) {
        self.lock().key_actions.push_back(actions);
    }

    /// Lookups relative to `id` fail, as for a node removed from the page.
    pub fn detach(&self, id: NodeId) {
        self.lock().detached.insert(id);
    }

    pub fn set_ready_state(&self, ready_state: &str) {
        self.lock().ready_state = ready_state.to_string();
    }

    pub fn fail_pointer_clicks(&self) {
        self.lock().fail_pointer_click = true;
    }

    pub fn fail_script_clicks(&self) {
        self.lock().fail_script_click = true;
    }

    pub fn fail_key_sequences(&self) {
        self.lock().fail_key_sequence = true;
    }

    pub fn url(&self) -> String {
        self.lock().url.clone()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    pub fn typed_into(&self, id: NodeId) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::SendKeys(node, text) if node == id => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn was_quit(&self) -> bool {
        self.calls().contains(&Call::Quit)
    }

    fn element(&self, id: NodeId) -> Element {
        Element::new(Box::new(MockElement {
            id,
            browser: self.clone(),
        }))
    }

    fn elements(&self, ids: Vec<NodeId>) -> Vec<Element> {
        ids.into_iter().map(|id| self.element(id)).collect()
    }

    fn node_id(element: &Element) -> Result<NodeId, AutomationError> {
        element
            .as_any()
            .downcast_ref::<MockElement>()
            .map(|e| e.id)
            .ok_or_else(|| AutomationError::InvalidArgument("foreign element".into()))
    }

    fn record(&self, call: Call) {
        self.lock().calls.push(call);
    }

    /// Hand this browser out as the session for a pipeline run.
    pub fn sessions(&self) -> MockSessions {
        MockSessions {
            browser: Some(self.clone()),
        }
    }
}

#[async_trait]
impl BrowserEngine for MockBrowser {
    async fn goto(&self, url: &str) -> Result<(), AutomationError> {
        let mut state = self.lock();
        state.calls.push(Call::Goto(url.to_string()));
        state.url = state
            .redirects
            .get(url)
            .cloned()
            .unwrap_or_else(|| url.to_string());
        Ok(())
    }

    async fn current_url(&self) -> Result<String, AutomationError> {
        Ok(self.url())
    }

    async fn find_all(&self, selector: &Selector) -> Result<Vec<Element>, AutomationError> {
        let ids = {
            let state = self.lock();
            if state.failing_selectors.contains(selector) {
                return Err(AutomationError::InvalidSelector(selector.to_string()));
            }
            match (state.routes.get(selector), selector) {
                (Some(ids), _) => ids.clone(),
                (None, Selector::Tag(tag)) => (0..state.nodes.len())
                    .filter(|&id| state.nodes[id].tag == *tag)
                    .collect(),
                (None, _) => Vec::new(),
            }
        };
        Ok(self.elements(ids))
    }

    async fn execute(
        &self,
        script: &str,
        _args: &[&Element],
    ) -> Result<serde_json::Value, AutomationError> {
        if script.contains("readyState") {
            return Ok(serde_json::Value::String(self.lock().ready_state.clone()));
        }
        Ok(serde_json::Value::Null)
    }

    async fn focus_body(&self) -> Result<(), AutomationError> {
        self.record(Call::FocusBody);
        Ok(())
    }

    async fn send_key_sequence(&self, keys: &[Key], _pause: Duration) -> Result<(), AutomationError> {
        let mut state = self.lock();
        if state.fail_key_sequence {
            return Err(AutomationError::PlatformError("key actions rejected".into()));
        }
        state.calls.push(Call::Keys(keys.to_vec()));
        if keys.last() == Some(&Key::Enter) {
            if let Some(actions) = state.key_actions.pop_front() {
                state.run(actions);
            }
        }
        Ok(())
    }

    async fn pointer_click(&self, element: &Element) -> Result<(), AutomationError> {
        let id = Self::node_id(element)?;
        let mut state = self.lock();
        if state.fail_pointer_click {
            return Err(AutomationError::PlatformError("pointer blocked".into()));
        }
        state.calls.push(Call::PointerClick(id));
        state.trigger(id);
        Ok(())
    }

    async fn script_click(&self, element: &Element) -> Result<(), AutomationError> {
        let id = Self::node_id(element)?;
        let mut state = self.lock();
        if state.fail_script_click {
            return Err(AutomationError::PlatformError("script blocked".into()));
        }
        state.calls.push(Call::ScriptClick(id));
        state.trigger(id);
        Ok(())
    }

    async fn screenshot(&self) -> Result<Vec<u8>, AutomationError> {
        self.record(Call::Screenshot);
        Ok(b"\x89PNG\r\n".to_vec())
    }

    async fn page_source(&self) -> Result<String, AutomationError> {
        self.record(Call::PageSource);
        Ok("<html><body></body></html>".to_string())
    }

    async fn quit(&self) -> Result<(), AutomationError> {
        self.record(Call::Quit);
        Ok(())
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

#[derive(Debug, Clone)]
pub struct MockElement {
    id: NodeId,
    browser: MockBrowser,
}

impl MockElement {
    fn node(&self) -> Result<MockNode, AutomationError> {
        self.browser
            .lock()
            .nodes
            .get(self.id)
            .cloned()
            .ok_or_else(|| AutomationError::ElementNotFound(format!("node {}", self.id)))
    }
}

#[async_trait]
impl ElementImpl for MockElement {
    fn id(&self) -> String {
        format!("mock-{}", self.id)
    }

    async fn tag_name(&self) -> Result<String, AutomationError> {
        Ok(self.node()?.tag)
    }

    async fn attr(&self, name: &str) -> Result<Option<String>, AutomationError> {
        Ok(self.node()?.attrs.get(name).cloned())
    }

    async fn text(&self) -> Result<String, AutomationError> {
        Ok(self.node()?.text)
    }

    async fn outer_html(&self) -> Result<String, AutomationError> {
        let node = self.node()?;
        Ok(node
            .markup
            .unwrap_or_else(|| format!("<{0}>{1}</{0}>", node.tag, node.text)))
    }

    async fn is_displayed(&self) -> Result<bool, AutomationError> {
        Ok(self.node()?.displayed)
    }

    async fn is_enabled(&self) -> Result<bool, AutomationError> {
        Ok(self.node()?.enabled)
    }

    async fn find_all(&self, selector: &Selector) -> Result<Vec<Element>, AutomationError> {
        let ids = {
            let state = self.browser.lock();
            if state.detached.contains(&self.id) {
                return Err(AutomationError::ElementNotFound(format!(
                    "stale element reference: node {}",
                    self.id
                )));
            }
            match (state.relative_routes.get(&(self.id, selector.clone())), selector) {
                (Some(ids), _) => ids.clone(),
                (None, Selector::Tag(tag)) => (0..state.nodes.len())
                    .filter(|&id| state.nodes[id].tag == *tag && state.is_descendant(id, self.id))
                    .collect(),
                (None, Selector::XPath(xpath)) if xpath == "./ancestor::*[1]" => {
                    state.nodes[self.id].parent.into_iter().collect()
                }
                (None, _) => Vec::new(),
            }
        };
        Ok(self.browser.elements(ids))
    }

    async fn click(&self) -> Result<(), AutomationError> {
        let mut state = self.browser.lock();
        state.calls.push(Call::Click(self.id));
        state.trigger(self.id);
        Ok(())
    }

    async fn clear(&self) -> Result<(), AutomationError> {
        Ok(())
    }

    async fn send_keys(&self, text: &str) -> Result<(), AutomationError> {
        self.browser.record(Call::SendKeys(self.id, text.to_string()));
        Ok(())
    }

    async fn press_key(&self, key: Key) -> Result<(), AutomationError> {
        let mut state = self.browser.lock();
        state.calls.push(Call::PressKey(self.id, key));
        if key == Key::Enter {
            state.trigger(self.id);
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn clone_box(&self) -> Box<dyn ElementImpl> {
        Box::new(self.clone())
    }
}

/// Hands out one mock session, or fails when built with [`MockSessions::unavailable`].
pub struct MockSessions {
    browser: Option<MockBrowser>,
}

impl MockSessions {
    pub fn unavailable() -> Self {
        Self { browser: None }
    }
}

#[async_trait]
impl SessionFactory for MockSessions {
    async fn open(&self) -> Result<BrowserSession, ExportError> {
        match &self.browser {
            Some(browser) => Ok(BrowserSession::new(Box::new(browser.clone()), None)),
            None => Err(ExportError::DriverInitialization(
                "managed: chromedriver not found; existing: no WebDriver answering".into(),
            )),
        }
    }
}
