//! Two-step hosted login: identifier first, then password.

use crate::config::{Credential, PortalConfig, TimeoutConfig};
use crate::diagnostics::Diagnostics;
use crate::element::{Element, Key};
use crate::errors::{AutomationError, ExportError};
use crate::locator::{self, LocatorChain};
use crate::platforms::BrowserEngine;
use crate::selector::Selector;
use crate::wait::{settle, wait_for_element, wait_for_ready_state, wait_for_url};
use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};

/// Where the login flow currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthState {
    Unauthenticated,
    IdentifierEntered,
    PasswordStepVisible,
    Submitted,
    Authenticated,
    Failed,
}

/// Selectors that commonly hold login error messages.
const ERROR_MESSAGE_SELECTORS: &[&str] = &[
    "//*[contains(@class, 'error')]",
    "//*[contains(@class, 'alert')]",
    "//*[contains(@class, 'message')]",
    "//*[contains(@id, 'error')]",
    "//*[contains(text(), 'error')]",
    "//*[contains(text(), 'invalid')]",
    "//*[contains(text(), 'incorrect')]",
];

pub struct Authenticator<'a> {
    portal: &'a PortalConfig,
    timeouts: &'a TimeoutConfig,
    diagnostics: &'a dyn Diagnostics,
    dump_login_page: bool,
    identifier_chain: LocatorChain,
    continue_chain: LocatorChain,
    password_chain: LocatorChain,
    submit_chain: LocatorChain,
    state: AuthState,
}

impl<'a> Authenticator<'a> {
    pub fn new(
        portal: &'a PortalConfig,
        timeouts: &'a TimeoutConfig,
        diagnostics: &'a dyn Diagnostics,
    ) -> Self {
        Self {
            portal,
            timeouts,
            diagnostics,
            dump_login_page: false,
            identifier_chain: locator::identifier_field(),
            continue_chain: locator::continue_button(),
            password_chain: locator::password_field(),
            submit_chain: locator::submit_button(),
            state: AuthState::Unauthenticated,
        }
    }

    /// Save the login page markup before looking for fields.
    pub fn dump_login_page(mut self, enabled: bool) -> Self {
        self.dump_login_page = enabled;
        self
    }

    pub fn state(&self) -> AuthState {
        self.state
    }

    fn transition(&mut self, next: AuthState) {
        debug!(from = ?self.state, to = ?next, "Login state change");
        self.state = next;
    }

    /// Drive the login form to completion.
    #[instrument(skip_all, fields(identifier = %credential.identifier))]
    pub async fn login(
        &mut self,
        engine: &dyn BrowserEngine,
        credential: &Credential,
    ) -> Result<(), ExportError> {
        self.open_login_page(engine).await?;

        let identifier = match self.identifier_chain.find_first(engine).await {
            Some(found) => found.element,
            None => {
                log_all_inputs(engine).await;
                return Err(self
                    .fail(engine, "login_page_error", "Username field not found")
                    .await);
            }
        };
        if let Err(e) = identifier.fill(&credential.identifier).await {
            return Err(self
                .fail(engine, "login_error", &format!("could not enter identifier: {e}"))
                .await);
        }
        info!("Identifier entered");
        self.transition(AuthState::IdentifierEntered);
        settle(self.timeouts.field_settle()).await;

        if let Err(e) = self.advance(engine, true, &identifier).await {
            return Err(self
                .fail(engine, "login_error", &format!("could not leave identifier step: {e}"))
                .await);
        }

        let password_selector = Selector::css("input[type='password']");
        match wait_for_element(
            engine,
            &password_selector,
            self.timeouts.password_step(),
            self.timeouts.poll_interval(),
        )
        .await
        {
            Ok(_) => debug!("Password field present"),
            Err(e) => warn!("Password field not immediately visible, continuing: {}", e),
        }
        self.transition(AuthState::PasswordStepVisible);

        let password = match self.password_chain.find_first(engine).await {
            Some(found) => found.element,
            None => {
                return Err(self
                    .fail(
                        engine,
                        "login_error",
                        "Password field not found after clicking Continue",
                    )
                    .await);
            }
        };
        if let Err(e) = password.fill(credential.expose_secret()).await {
            return Err(self
                .fail(engine, "login_error", &format!("could not enter password: {e}"))
                .await);
        }
        info!("Password entered");
        settle(self.timeouts.field_settle()).await;

        if let Err(e) = self.advance(engine, false, &password).await {
            return Err(self
                .fail(engine, "login_error", &format!("could not submit login form: {e}"))
                .await);
        }
        self.transition(AuthState::Submitted);

        self.await_application(engine).await
    }

    /// Navigate to the entry point and wait for the hosted login page.
    async fn open_login_page(&mut self, engine: &dyn BrowserEngine) -> Result<(), ExportError> {
        let portal = self.portal;
        if let Err(e) = engine.goto(&portal.login_url).await {
            return Err(self
                .fail(engine, "login_error", &format!("could not open login page: {e}"))
                .await);
        }

        let markers = &portal.identity_markers;
        match wait_for_url(
            engine,
            "redirect to identity provider",
            self.timeouts.redirect(),
            self.timeouts.poll_interval(),
            |url| contains_any(url, markers),
        )
        .await
        {
            Ok(url) => info!("Redirected to hosted login page: {}", url),
            Err(_) => {
                info!(
                    "No redirect detected, opening {} directly",
                    portal.identity_login_url
                );
                if let Err(e) = engine.goto(&portal.identity_login_url).await {
                    return Err(self
                        .fail(engine, "login_error", &format!("could not open login page: {e}"))
                        .await);
                }
            }
        }

        if let Err(e) = self.await_document(engine).await {
            return Err(self
                .fail(engine, "login_error", &format!("login page did not load: {e}"))
                .await);
        }
        settle(self.timeouts.settle()).await;

        match engine.current_url().await {
            Ok(url) if contains_any(&url, markers) => info!("On hosted login page: {}", url),
            Ok(url) => warn!("Unexpected login URL, continuing: {}", url),
            Err(e) => warn!("Could not read current URL: {}", e),
        }

        if self.dump_login_page {
            self.diagnostics.capture_markup(engine, "login_page").await;
        }
        Ok(())
    }

    async fn await_document(&self, engine: &dyn BrowserEngine) -> Result<(), AutomationError> {
        wait_for_element(
            engine,
            &Selector::tag("body"),
            self.timeouts.page_load(),
            self.timeouts.poll_interval(),
        )
        .await?;
        wait_for_ready_state(engine, self.timeouts.page_load(), self.timeouts.poll_interval()).await
    }

    /// Click the step's button, or press Enter in `field` when there is none.
    async fn advance(
        &self,
        engine: &dyn BrowserEngine,
        identifier_step: bool,
        field: &Element,
    ) -> Result<(), AutomationError> {
        let chain = if identifier_step {
            &self.continue_chain
        } else {
            &self.submit_chain
        };
        match chain.find_first(engine).await {
            Some(found) => {
                found.element.click().await?;
                info!("Clicked {}", chain.label());
            }
            None => {
                warn!(
                    "{} not found, submitting with Enter instead",
                    chain.label()
                );
                field.press_key(Key::Enter).await?;
            }
        }
        Ok(())
    }

    /// Wait for the browser to land on the application host.
    async fn await_application(&mut self, engine: &dyn BrowserEngine) -> Result<(), ExportError> {
        let portal = self.portal;
        let app_host = portal.app_host.as_str();
        match wait_for_url(
            engine,
            "redirect to application",
            self.timeouts.login_complete(),
            self.timeouts.poll_interval(),
            |url| is_app_url(url, app_host),
        )
        .await
        {
            Ok(url) => {
                info!("Login successful, now at {}", url);
                self.transition(AuthState::Authenticated);
                Ok(())
            }
            Err(_) => {
                let url = engine.current_url().await.unwrap_or_default();
                warn!("Timed out waiting for the application, current URL: {}", url);
                if contains_any(&url, &portal.login_markers) {
                    let messages = collect_error_messages(engine).await;
                    for message in &messages {
                        error!("Login page reports: {}", message);
                    }
                    let mut reason = format!("still on login page ({url})");
                    if !messages.is_empty() {
                        reason.push_str(&format!(": {}", messages.join("; ")));
                    }
                    return Err(self.fail(engine, "login_failed", &reason).await);
                }
                // The redirect check is a heuristic; any non-login page counts.
                warn!("Not on the application host but off the login page, continuing");
                self.transition(AuthState::Authenticated);
                Ok(())
            }
        }
    }

    async fn fail(&mut self, engine: &dyn BrowserEngine, label: &str, reason: &str) -> ExportError {
        error!("Login error: {}", reason);
        self.transition(AuthState::Failed);
        self.diagnostics.capture_screenshot(engine, label).await;
        ExportError::Login(reason.to_string())
    }
}

fn contains_any(url: &str, markers: &[String]) -> bool {
    let url = url.to_lowercase();
    markers.iter().any(|m| url.contains(&m.to_lowercase()))
}

/// True when `url` is served by exactly `app_host`. A substring check
/// would also accept identity hosts such as `login.<app_host>`.
pub fn is_app_url(url: &str, app_host: &str) -> bool {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.eq_ignore_ascii_case(app_host)))
        .unwrap_or(false)
}

async fn log_all_inputs(engine: &dyn BrowserEngine) {
    match engine.find_all(&Selector::tag("input")).await {
        Ok(inputs) => {
            error!("Found {} input elements on page:", inputs.len());
            for (idx, input) in inputs.iter().enumerate() {
                error!("  Input {}: {}", idx, input.summary().await);
            }
        }
        Err(e) => warn!("Could not list input fields: {}", e),
    }
}

/// Visible error texts on the page, deduplicated, in discovery order.
pub async fn collect_error_messages(engine: &dyn BrowserEngine) -> Vec<String> {
    let mut messages: Vec<String> = Vec::new();
    for selector in ERROR_MESSAGE_SELECTORS {
        let Ok(elements) = engine.find_all(&Selector::from(*selector)).await else {
            continue;
        };
        for element in elements {
            if !matches!(element.is_displayed().await, Ok(true)) {
                continue;
            }
            if let Ok(text) = element.text().await {
                let text = text.trim().to_string();
                if !text.is_empty() && !messages.contains(&text) {
                    messages.push(text);
                }
            }
        }
    }
    messages
}
