//! A real-browser `BrowserEngine` over WebDriver, via `thirtyfour`. This is
//! the "driver binding to a concrete browser automation library" the
//! specification treats as an external collaborator (§1); it exists here
//! only so the crate is buildable and runnable end to end with a real
//! browser, not as a hardened production driver.

use super::{BrowserEngine, FallbackCapableEngine};
use crate::recipe::{ActionMethod, ActionRef, SelectorEntry};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::Value;
use thirtyfour::prelude::*;

pub struct WebDriverEngine {
    driver: WebDriver,
}

impl WebDriverEngine {
    pub async fn connect(webdriver_url: &str, headless: bool) -> Result<Self> {
        let mut caps = DesiredCapabilities::chrome();
        if headless {
            caps.set_headless()?;
        }
        let driver = WebDriver::new(webdriver_url, caps).await?;
        Ok(Self { driver })
    }

    async fn find(&self, selector: &str) -> Result<WebElement> {
        self.driver
            .find(By::Css(selector))
            .await
            .map_err(|e| anyhow!("element not found for {selector}: {e}"))
    }
}

#[async_trait]
impl BrowserEngine for WebDriverEngine {
    async fn goto(&self, url: &str) -> Result<()> {
        self.driver.goto(url).await?;
        Ok(())
    }

    async fn act(&self, action: &ActionRef) -> Result<bool> {
        let element = match self.find(&action.selector).await {
            Ok(e) => e,
            Err(_) => return Ok(false),
        };
        let outcome = match action.method {
            ActionMethod::Click => element.click().await,
            ActionMethod::Fill | ActionMethod::Type => {
                let text = action
                    .arguments
                    .as_ref()
                    .and_then(|a| a.first())
                    .cloned()
                    .unwrap_or_default();
                element.clear().await.ok();
                element.send_keys(text).await
            }
            ActionMethod::Press => {
                let key = action
                    .arguments
                    .as_ref()
                    .and_then(|a| a.first())
                    .cloned()
                    .unwrap_or_default();
                element.send_keys(key).await
            }
        };
        Ok(outcome.is_ok())
    }

    async fn observe(&self, _instruction: &str, _scope: Option<&str>) -> Result<Vec<ActionRef>> {
        // Observation requires an LLM/vision capability the driver binding
        // alone doesn't provide; callers pair this engine with a
        // PatchPlanner-backed observer upstream of the recovery pipeline.
        Ok(Vec::new())
    }

    async fn extract(&self, _schema: Option<&Value>, scope: Option<&str>) -> Result<Value> {
        let selector = scope.unwrap_or("body");
        match self.find(selector).await {
            Ok(element) => {
                let text = element.text().await.unwrap_or_default();
                if text.is_empty() {
                    Ok(Value::Null)
                } else {
                    Ok(Value::String(text))
                }
            }
            Err(_) => Ok(Value::Null),
        }
    }

    async fn screenshot(&self, selector: Option<&str>) -> Result<Vec<u8>> {
        match selector {
            Some(sel) => {
                let element = self.find(sel).await?;
                Ok(element.screenshot_as_png().await?)
            }
            None => Ok(self.driver.screenshot_as_png().await?),
        }
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.driver.current_url().await?.to_string())
    }

    async fn current_title(&self) -> Result<String> {
        Ok(self.driver.title().await?)
    }
}

#[async_trait]
impl FallbackCapableEngine for WebDriverEngine {
    async fn act_with_fallback(&self, action: &ActionRef, selectors: &SelectorEntry) -> Result<bool> {
        super::act_with_fallback_default(self, action, selectors).await
    }
}
