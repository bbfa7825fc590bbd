//! A scriptable, in-memory `BrowserEngine` used by this crate's own tests
//! (and available to embedders for dry runs), mirroring the teacher's
//! `ActionExecutor::execute_simulated` fallback-to-simulation idiom.

use super::{BrowserEngine, FallbackCapableEngine};
use crate::recipe::{ActionRef, SelectorEntry};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// A single fixture page: what's visible, and what text it yields.
#[derive(Debug, Clone, Default)]
pub struct PageFixture {
    pub title: String,
    pub visible_selectors: Vec<String>,
    pub texts: HashMap<String, String>,
}

impl PageFixture {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            visible_selectors: Vec::new(),
            texts: HashMap::new(),
        }
    }

    pub fn with_selector(mut self, selector: impl Into<String>) -> Self {
        self.visible_selectors.push(selector.into());
        self
    }

    pub fn with_text(mut self, scope: impl Into<String>, text: impl Into<String>) -> Self {
        self.texts.insert(scope.into(), text.into());
        self
    }
}

struct State {
    current_url: String,
    pages: HashMap<String, PageFixture>,
    observe_responses: HashMap<String, Vec<ActionRef>>,
}

/// A test-double browser: no real navigation happens, but `goto`/`act`/
/// `observe`/`extract` behave consistently against a fixture graph the
/// caller sets up ahead of time.
pub struct SimulatedEngine {
    state: RwLock<State>,
}

impl SimulatedEngine {
    pub fn new(start_url: impl Into<String>) -> Self {
        Self {
            state: RwLock::new(State {
                current_url: start_url.into(),
                pages: HashMap::new(),
                observe_responses: HashMap::new(),
            }),
        }
    }

    pub async fn with_page(self, url: impl Into<String>, fixture: PageFixture) -> Self {
        self.state.write().await.pages.insert(url.into(), fixture);
        self
    }

    pub async fn with_observe_response(self, instruction: impl Into<String>, candidates: Vec<ActionRef>) -> Self {
        self.state
            .write()
            .await
            .observe_responses
            .insert(instruction.into(), candidates);
        self
    }
}

#[async_trait]
impl BrowserEngine for SimulatedEngine {
    async fn goto(&self, url: &str) -> Result<()> {
        let mut state = self.state.write().await;
        state.current_url = url.to_string();
        state.pages.entry(url.to_string()).or_default();
        Ok(())
    }

    async fn act(&self, action: &ActionRef) -> Result<bool> {
        let state = self.state.read().await;
        let found = state
            .pages
            .get(&state.current_url)
            .map(|p| p.visible_selectors.iter().any(|s| s == &action.selector))
            .unwrap_or(false);
        Ok(found)
    }

    async fn observe(&self, instruction: &str, _scope: Option<&str>) -> Result<Vec<ActionRef>> {
        let state = self.state.read().await;
        Ok(state.observe_responses.get(instruction).cloned().unwrap_or_default())
    }

    async fn extract(&self, schema: Option<&Value>, scope: Option<&str>) -> Result<Value> {
        let state = self.state.read().await;
        let Some(page) = state.pages.get(&state.current_url) else {
            return Ok(Value::Null);
        };
        let _ = schema; // schema shapes the extraction; unused by this fixture model.
        match scope {
            Some(key) => Ok(page
                .texts
                .get(key)
                .map(|t| Value::String(t.clone()))
                .unwrap_or(Value::Null)),
            None => {
                if page.texts.is_empty() {
                    Ok(Value::Null)
                } else {
                    Ok(serde_json::to_value(&page.texts)?)
                }
            }
        }
    }

    async fn screenshot(&self, _selector: Option<&str>) -> Result<Vec<u8>> {
        Ok(b"simulated-screenshot".to_vec())
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.state.read().await.current_url.clone())
    }

    async fn current_title(&self) -> Result<String> {
        let state = self.state.read().await;
        Ok(state.pages.get(&state.current_url).map(|p| p.title.clone()).unwrap_or_default())
    }
}

#[async_trait]
impl FallbackCapableEngine for SimulatedEngine {
    async fn act_with_fallback(&self, action: &ActionRef, selectors: &SelectorEntry) -> Result<bool> {
        super::act_with_fallback_default(self, action, selectors).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipe::ActionMethod;

    #[tokio::test]
    async fn act_succeeds_only_for_visible_selectors() {
        let engine = SimulatedEngine::new("https://example.com")
            .with_page(
                "https://example.com",
                PageFixture::new("Example").with_selector("#real"),
            )
            .await;

        let ok = engine
            .act(&ActionRef {
                selector: "#real".into(),
                description: "".into(),
                method: ActionMethod::Click,
                arguments: None,
            })
            .await
            .unwrap();
        assert!(ok);

        let missing = engine
            .act(&ActionRef {
                selector: "#missing".into(),
                description: "".into(),
                method: ActionMethod::Click,
                arguments: None,
            })
            .await
            .unwrap();
        assert!(!missing);
    }
}
