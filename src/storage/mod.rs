//! Recipe file storage & archive import/export (§6): the on-disk layout of
//! a recipe version directory, and ZIP-backed import/export with the
//! filename-then-content-shape type inference §6 specifies.
//!
//! Grounded on the teacher's `optimized_persistence` module's general
//! load/store/migrate shape, reimplemented for this crate's own five-file
//! layout.

pub mod archive;

use crate::error::{Result, RuntimeError};
use crate::recipe::{ActionEntry, Fingerprint, Policy, Recipe, RecipeVersion, SelectorEntry, Workflow};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The five JSON documents making up one recipe version, keyed by the
/// filename §6 gives them.
#[derive(Debug, Clone)]
pub struct RecipeSections {
    pub workflow: Workflow,
    pub actions: HashMap<String, ActionEntry>,
    pub selectors: HashMap<String, SelectorEntry>,
    pub policies: HashMap<String, Policy>,
    pub fingerprints: Vec<Fingerprint>,
}

impl RecipeSections {
    fn into_recipe(self, domain: String, flow: String, version: RecipeVersion) -> Recipe {
        Recipe {
            domain,
            flow,
            version,
            workflow: self.workflow,
            actions: self.actions,
            selectors: self.selectors,
            fingerprints: self.fingerprints,
            policies: self.policies,
        }
    }

    fn from_recipe(recipe: &Recipe) -> Self {
        Self {
            workflow: recipe.workflow.clone(),
            actions: recipe.actions.clone(),
            selectors: recipe.selectors.clone(),
            policies: recipe.policies.clone(),
            fingerprints: recipe.fingerprints.clone(),
        }
    }
}

pub fn recipe_dir(root: &Path, domain: &str, flow: &str, version: RecipeVersion) -> PathBuf {
    root.join(domain).join(flow).join(version.as_dir_name())
}

/// Loads a recipe from `<root>/<domain>/<flow>/<vNNN>/` (§6).
pub async fn load(root: &Path, domain: &str, flow: &str, version: RecipeVersion) -> Result<Recipe> {
    let dir = recipe_dir(root, domain, flow, version);
    if !dir.is_dir() {
        return Err(RuntimeError::RecipeNotFound(format!("{}/{}@{}", domain, flow, version)));
    }

    let workflow = read_json(&dir.join("workflow.json")).await?;
    let actions = read_json(&dir.join("actions.json")).await?;
    let selectors = read_json(&dir.join("selectors.json")).await?;
    let policies = read_json(&dir.join("policies.json")).await?;
    let fingerprints = read_json(&dir.join("fingerprints.json")).await?;

    Ok(RecipeSections {
        workflow,
        actions,
        selectors,
        policies,
        fingerprints,
    }
    .into_recipe(domain.to_string(), flow.to_string(), version))
}

/// Writes a recipe's five JSON files under `<root>/<domain>/<flow>/<vNNN>/`,
/// creating the directory if needed. Both old and new versions are kept
/// side by side, per the Patch Workflow's versioning contract (§4.8).
pub async fn save(root: &Path, recipe: &Recipe) -> Result<()> {
    let dir = recipe_dir(root, &recipe.domain, &recipe.flow, recipe.version);
    tokio::fs::create_dir_all(&dir).await?;

    let sections = RecipeSections::from_recipe(recipe);
    write_json(&dir.join("workflow.json"), &sections.workflow).await?;
    write_json(&dir.join("actions.json"), &sections.actions).await?;
    write_json(&dir.join("selectors.json"), &sections.selectors).await?;
    write_json(&dir.join("policies.json"), &sections.policies).await?;
    write_json(&dir.join("fingerprints.json"), &sections.fingerprints).await?;

    Ok(())
}

async fn read_json<T: serde::de::DeserializeOwned + Default>(path: &Path) -> Result<T> {
    if !path.exists() {
        return Ok(T::default());
    }
    let bytes = tokio::fs::read(path).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

async fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    tokio::fs::write(path, bytes).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipe::{Step, Op};

    fn sample_recipe() -> Recipe {
        Recipe {
            domain: "example.com".into(),
            flow: "login".into(),
            version: RecipeVersion::initial(),
            workflow: Workflow {
                id: "wf".into(),
                version: None,
                vars: serde_json::Value::Null,
                steps: vec![Step {
                    id: "open".into(),
                    op: Op::Goto,
                    target_key: None,
                    args: serde_json::json!({"url": "https://example.com"}),
                    expect: vec![],
                    on_fail: None,
                }],
            },
            actions: HashMap::new(),
            selectors: HashMap::new(),
            fingerprints: vec![],
            policies: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn save_then_load_roundtrips() {
        let dir = temp_dir::TempDir::new().unwrap();
        let recipe = sample_recipe();

        save(dir.path(), &recipe).await.unwrap();
        let loaded = load(dir.path(), "example.com", "login", RecipeVersion::initial()).await.unwrap();

        assert_eq!(loaded.workflow.steps.len(), 1);
        assert_eq!(loaded.domain, "example.com");
    }

    #[tokio::test]
    async fn load_missing_version_is_recipe_not_found() {
        let dir = temp_dir::TempDir::new().unwrap();
        let err = load(dir.path(), "example.com", "login", RecipeVersion::initial()).await.unwrap_err();
        assert!(matches!(err, RuntimeError::RecipeNotFound(_)));
    }
}
