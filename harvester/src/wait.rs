use crate::element::Element;
use crate::errors::AutomationError;
use crate::platforms::BrowserEngine;
use crate::selector::Selector;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, instrument};

/// Poll `predicate` until it yields `Some`, or fail with
/// [`AutomationError::Timeout`] once `timeout` has elapsed.
///
/// The predicate is always evaluated at least once, so a zero timeout is a
/// single check. Errors from the predicate count as "not yet".
pub async fn wait_until<T, F, Fut>(
    description: &str,
    timeout: Duration,
    poll_interval: Duration,
    mut predicate: F,
) -> Result<T, AutomationError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, AutomationError>>,
{
    let deadline = Instant::now() + timeout;
    loop {
        match predicate().await {
            Ok(Some(value)) => return Ok(value),
            Ok(None) => {}
            Err(e) => debug!("{} not satisfied yet: {}", description, e),
        }
        if Instant::now() >= deadline {
            return Err(AutomationError::Timeout(format!(
                "Timed out after {timeout:?} waiting for {description}"
            )));
        }
        tokio::time::sleep(poll_interval).await;
    }
}

/// Wait until the current location satisfies `matches`; returns that URL.
#[instrument(level = "debug", skip(engine, matches))]
pub async fn wait_for_url<F>(
    engine: &dyn BrowserEngine,
    description: &str,
    timeout: Duration,
    poll_interval: Duration,
    matches: F,
) -> Result<String, AutomationError>
where
    F: Fn(&str) -> bool,
{
    let matches = &matches;
    wait_until(description, timeout, poll_interval, || async move {
        let url = engine.current_url().await?;
        Ok(matches(&url).then_some(url))
    })
    .await
}

/// Wait for the first element matching `selector` to be present.
pub async fn wait_for_element(
    engine: &dyn BrowserEngine,
    selector: &Selector,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<Element, AutomationError> {
    let description = format!("element {selector}");
    wait_until(&description, timeout, poll_interval, || async move {
        Ok(engine.find_all(selector).await?.into_iter().next())
    })
    .await
}

/// Wait for `document.readyState == "complete"`.
pub async fn wait_for_ready_state(
    engine: &dyn BrowserEngine,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<(), AutomationError> {
    wait_until("document ready state", timeout, poll_interval, || async move {
        let state = engine.ready_state().await?;
        Ok((state == "complete").then_some(()))
    })
    .await
}

/// Fixed pause for client-side rendering that finishes after the document
/// reports loaded.
pub async fn settle(delay: Duration) {
    if !delay.is_zero() {
        debug!("Settling for {:?}", delay);
        tokio::time::sleep(delay).await;
    }
}
