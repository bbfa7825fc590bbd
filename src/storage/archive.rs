//! ZIP archive import/export for a single recipe version (§6). An archive
//! is one ZIP file containing the five section documents inside a folder
//! named `<domain>-<version>`. Import accepts archives whose member names
//! don't match the canonical filenames by falling back to content-shape
//! inference, since authoring tools in the wild don't always agree on
//! naming.

use super::RecipeSections;
use crate::error::{Result, RuntimeError};
use crate::recipe::{ActionEntry, Fingerprint, Policy, Recipe, RecipeVersion, SelectorEntry, Workflow};
use std::collections::HashMap;
use std::io::{Cursor, Read, Write};
use zip::write::SimpleFileOptions;
use zip::ZipArchive;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Workflow,
    Actions,
    Selectors,
    Fingerprints,
    Policies,
}

/// Infers which section a member belongs to, filename substring first,
/// falling back to content shape (§6).
fn infer_section(filename: &str, content: &serde_json::Value) -> Option<Section> {
    let lower = filename.to_ascii_lowercase();
    if lower.contains("workflow") {
        return Some(Section::Workflow);
    }
    if lower.contains("action") {
        return Some(Section::Actions);
    }
    if lower.contains("selector") {
        return Some(Section::Selectors);
    }
    if lower.contains("fingerprint") {
        return Some(Section::Fingerprints);
    }
    if lower.contains("polic") {
        return Some(Section::Policies);
    }

    infer_section_by_shape(content)
}

fn infer_section_by_shape(content: &serde_json::Value) -> Option<Section> {
    match content {
        serde_json::Value::Object(map) => {
            if map.contains_key("steps") {
                return Some(Section::Workflow);
            }
            if map.values().any(is_action_shaped) {
                return Some(Section::Actions);
            }
            if map.values().any(is_selector_shaped) {
                return Some(Section::Selectors);
            }
            if map.is_empty() || map.values().any(is_policy_shaped) {
                return Some(Section::Policies);
            }
            None
        }
        serde_json::Value::Array(items) => {
            if items.iter().any(is_fingerprint_shaped) {
                Some(Section::Fingerprints)
            } else if items.is_empty() {
                Some(Section::Policies)
            } else {
                None
            }
        }
        _ => None,
    }
}

fn is_action_shaped(v: &serde_json::Value) -> bool {
    v.get("instruction").is_some()
}

fn is_selector_shaped(v: &serde_json::Value) -> bool {
    v.get("primary").is_some() && v.get("fallbacks").is_some()
}

fn is_fingerprint_shaped(v: &serde_json::Value) -> bool {
    v.get("mustText").is_some() || v.get("urlContains").is_some() || v.get("mustSelectors").is_some()
}

fn is_policy_shaped(v: &serde_json::Value) -> bool {
    v.get("hard").is_some() && v.get("score").is_some()
}

/// Packs a recipe's five sections into a ZIP, folder-named `<domain>-<version>`.
pub fn export(recipe: &Recipe) -> Result<Vec<u8>> {
    let sections = RecipeSections::from_recipe(recipe);
    let folder = format!("{}-{}", recipe.domain, recipe.version);

    let mut buf = Vec::new();
    {
        let cursor = Cursor::new(&mut buf);
        let mut zip = zip::ZipWriter::new(cursor);
        let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

        write_member(&mut zip, &options, &folder, "workflow.json", &sections.workflow)?;
        write_member(&mut zip, &options, &folder, "actions.json", &sections.actions)?;
        write_member(&mut zip, &options, &folder, "selectors.json", &sections.selectors)?;
        write_member(&mut zip, &options, &folder, "policies.json", &sections.policies)?;
        write_member(&mut zip, &options, &folder, "fingerprints.json", &sections.fingerprints)?;

        zip.finish().map_err(|e| RuntimeError::Archive(e.to_string()))?;
    }

    Ok(buf)
}

fn write_member<T: serde::Serialize>(
    zip: &mut zip::ZipWriter<Cursor<&mut Vec<u8>>>,
    options: &SimpleFileOptions,
    folder: &str,
    name: &str,
    value: &T,
) -> Result<()> {
    zip.start_file(format!("{folder}/{name}"), *options)
        .map_err(|e| RuntimeError::Archive(e.to_string()))?;
    let bytes = serde_json::to_vec_pretty(value)?;
    zip.write_all(&bytes)
        .map_err(|e| RuntimeError::Archive(e.to_string()))?;
    Ok(())
}

/// Unpacks a ZIP archive into a `Recipe`. `domain`/`flow`/`version` are
/// supplied by the caller (the admin `import` subcommand derives them from
/// the destination path, not the archive itself) since the folder name
/// inside the archive is informational only.
pub fn import(bytes: &[u8], domain: &str, flow: &str, version: RecipeVersion) -> Result<Recipe> {
    let cursor = Cursor::new(bytes);
    let mut archive = ZipArchive::new(cursor).map_err(|e| RuntimeError::Archive(e.to_string()))?;

    let mut workflow: Option<Workflow> = None;
    let mut actions: HashMap<String, ActionEntry> = HashMap::new();
    let mut selectors: HashMap<String, SelectorEntry> = HashMap::new();
    let mut policies: HashMap<String, Policy> = HashMap::new();
    let mut fingerprints: Vec<Fingerprint> = Vec::new();

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| RuntimeError::Archive(e.to_string()))?;
        if entry.is_dir() {
            continue;
        }
        let name = entry.name().to_string();
        let mut raw = String::new();
        entry
            .read_to_string(&mut raw)
            .map_err(|e| RuntimeError::Archive(e.to_string()))?;
        let content: serde_json::Value = serde_json::from_str(&raw)?;

        let member_name = name.rsplit('/').next().unwrap_or(&name);
        let Some(section) = infer_section(member_name, &content) else {
            return Err(RuntimeError::UnknownRecipeSection(name));
        };

        match section {
            Section::Workflow => workflow = Some(serde_json::from_value(content)?),
            Section::Actions => actions = serde_json::from_value(content)?,
            Section::Selectors => selectors = serde_json::from_value(content)?,
            Section::Fingerprints => fingerprints = serde_json::from_value(content)?,
            Section::Policies => policies = serde_json::from_value(content)?,
        }
    }

    let workflow = workflow.ok_or_else(|| RuntimeError::Archive("archive missing workflow section".to_string()))?;

    Ok(RecipeSections {
        workflow,
        actions,
        selectors,
        policies,
        fingerprints,
    }
    .into_recipe(domain.to_string(), flow.to_string(), version))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipe::{Op, Step};

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

    #[test]
    fn export_then_import_roundtrips() {
        let recipe = sample_recipe();
        let bytes = export(&recipe).unwrap();
        let loaded = import(&bytes, "example.com", "login", RecipeVersion::initial()).unwrap();
        assert_eq!(loaded.workflow.steps.len(), 1);
    }

    #[test]
    fn infers_workflow_by_filename_substring() {
        let content = serde_json::json!({"steps": []});
        assert_eq!(infer_section("wf_v2.json", &content), Some(Section::Workflow));
    }

    #[test]
    fn infers_actions_by_content_shape_when_filename_is_ambiguous() {
        let content = serde_json::json!({"submit": {"instruction": "click submit"}});
        assert_eq!(infer_section("data.json", &content), Some(Section::Actions));
    }

    #[test]
    fn infers_selectors_by_content_shape() {
        let content = serde_json::json!({"submit": {"primary": "#go", "fallbacks": []}});
        assert_eq!(infer_section("data.json", &content), Some(Section::Selectors));
    }

    #[test]
    fn infers_fingerprints_by_content_shape() {
        let content = serde_json::json!([{"urlContains": "/login"}]);
        assert_eq!(infer_section("data.json", &content), Some(Section::Fingerprints));
    }

    #[test]
    fn empty_object_defaults_to_policies() {
        let content = serde_json::json!({});
        assert_eq!(infer_section("data.json", &content), Some(Section::Policies));
    }
}
