//! Runtime configuration — TOML-backed, environment-overridable, per the
//! teacher's own layered config pattern (defaults, then a file, then env
//! vars prefixed `RECIPE_RUNTIME_`).

use crate::budget::TokenBudget;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    pub headless: bool,
    pub window_width: u32,
    pub window_height: u32,
    pub webdriver_url: String,
    pub navigation_timeout_ms: u64,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            headless: true,
            window_width: 1280,
            window_height: 800,
            webdriver_url: "http://localhost:9515".to_string(),
            navigation_timeout_ms: 30_000,
        }
    }
}

/// Authoring/patch service client settings, consumed only when the
/// `remote-patch` feature's `HttpPatchPlanner` is wired up.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthoringServiceConfig {
    pub endpoint: String,
    pub timeout_ms: u64,
}

impl Default for AuthoringServiceConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8090/patch".to_string(),
            timeout_ms: 15_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Root directory recipes are loaded from and saved under (§6's
    /// `<recipes-root>/<domain>/<flow>/<vNNN>/` layout).
    pub recipes_root: PathBuf,
    /// Root directory each run's persisted state is written under (§6).
    pub run_dir_root: PathBuf,
    /// Path to the Healing Memory JSON store (§4.1).
    pub healing_memory_path: PathBuf,
    /// Per-run automatic retry count when a step's `onFail` is `retry`
    /// (Open Question #1, resolved to `1`).
    pub max_retries: u32,
    pub token_budget: TokenBudget,
    pub browser: BrowserSettings,
    pub authoring_service: AuthoringServiceConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            recipes_root: PathBuf::from("./recipes"),
            run_dir_root: PathBuf::from("./runs"),
            healing_memory_path: PathBuf::from("./healing_memory.json"),
            max_retries: 1,
            token_budget: TokenBudget::default(),
            browser: BrowserSettings::default(),
            authoring_service: AuthoringServiceConfig::default(),
        }
    }
}

impl RuntimeConfig {
    /// Loads from a TOML file if present, falling back to defaults, then
    /// applies `RECIPE_RUNTIME_*` environment overrides for the handful of
    /// settings operators most commonly need to tweak without editing the
    /// file.
    pub async fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let raw = tokio::fs::read_to_string(path).await?;
            toml::from_str(&raw)?
        } else {
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(root) = std::env::var("RECIPE_RUNTIME_RECIPES_ROOT") {
            self.recipes_root = PathBuf::from(root);
        }
        if let Ok(root) = std::env::var("RECIPE_RUNTIME_RUN_DIR_ROOT") {
            self.run_dir_root = PathBuf::from(root);
        }
        if let Ok(path) = std::env::var("RECIPE_RUNTIME_HEALING_MEMORY_PATH") {
            self.healing_memory_path = PathBuf::from(path);
        }
        if let Ok(retries) = std::env::var("RECIPE_RUNTIME_MAX_RETRIES") {
            if let Ok(n) = retries.parse() {
                self.max_retries = n;
            }
        }
        if let Ok(headless) = std::env::var("RECIPE_RUNTIME_HEADLESS") {
            self.browser.headless = headless.eq_ignore_ascii_case("true") || headless == "1";
        }
        if let Ok(url) = std::env::var("RECIPE_RUNTIME_WEBDRIVER_URL") {
            self.browser.webdriver_url = url;
        }
        if let Ok(endpoint) = std::env::var("RECIPE_RUNTIME_AUTHORING_ENDPOINT") {
            self.authoring_service.endpoint = endpoint;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_falls_back_to_defaults() {
        let config = RuntimeConfig::load("/nonexistent/path/recipe-runtime.toml").await.unwrap();
        assert_eq!(config.max_retries, 1);
        assert!(config.browser.headless);
    }

    #[tokio::test]
    async fn loads_values_from_toml_file() {
        let dir = temp_dir::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        tokio::fs::write(&path, "max_retries = 3\n\n[browser]\nheadless = false\n")
            .await
            .unwrap();

        let config = RuntimeConfig::load(&path).await.unwrap();
        assert_eq!(config.max_retries, 3);
        assert!(!config.browser.headless);
    }
}
