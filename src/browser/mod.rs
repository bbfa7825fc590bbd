//! Browser Engine — the abstract capability the Step Executor and Recovery
//! Pipeline drive (§2/§4/§6/§9). The concrete driver binding is explicitly
//! out of scope for this crate's core; two implementations ship anyway: a
//! `SimulatedEngine` test double used throughout this crate's own tests,
//! and an optional `thirtyfour`-backed `WebDriverEngine` behind the
//! `webdriver` feature.

pub mod simulated;
#[cfg(feature = "webdriver")]
pub mod webdriver;

use crate::recipe::{ActionRef, SelectorEntry};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

pub use simulated::SimulatedEngine;

/// Minimal capability required to drive a single step (§6).
#[async_trait]
pub trait BrowserEngine: Send + Sync {
    async fn goto(&self, url: &str) -> Result<()>;
    async fn act(&self, action: &ActionRef) -> Result<bool>;
    async fn observe(&self, instruction: &str, scope: Option<&str>) -> Result<Vec<ActionRef>>;
    async fn extract(&self, schema: Option<&Value>, scope: Option<&str>) -> Result<Value>;
    async fn screenshot(&self, selector: Option<&str>) -> Result<Vec<u8>>;
    async fn current_url(&self) -> Result<String>;
    async fn current_title(&self) -> Result<String>;
}

/// Optional capability: engines that can try a primary selector then a
/// fallback list themselves. The Recovery Pipeline checks for this before
/// attempting selector-fallback (§9).
#[async_trait]
pub trait FallbackCapableEngine: BrowserEngine {
    async fn act_with_fallback(&self, action: &ActionRef, selectors: &SelectorEntry) -> Result<bool>;
}

/// Default `act_with_fallback`: try the preferred action, then each
/// selector candidate in order, stopping at the first success. Engines
/// that can do better (e.g. batching DOM queries) should override it.
pub async fn act_with_fallback_default(
    engine: &dyn BrowserEngine,
    action: &ActionRef,
    selectors: &SelectorEntry,
) -> Result<bool> {
    if engine.act(action).await.unwrap_or(false) {
        return Ok(true);
    }
    for candidate in selectors.candidates() {
        let mut attempt = action.clone();
        attempt.selector = candidate.to_string();
        if engine.act(&attempt).await.unwrap_or(false) {
            return Ok(true);
        }
    }
    Ok(false)
}
