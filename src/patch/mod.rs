//! Patch Workflow — classifies, applies and versions up recipe patches
//! (§3/§4.8).

use crate::checkpoint::{CheckpointHandler, Decision};
use crate::error::{Result, RuntimeError};
use crate::recipe::{ActionEntry, Expectation, Policy, Recipe, SelectorEntry};
use serde::{Deserialize, Serialize};

/// A single structured edit to a Recipe. Tagged by `op` with dotted names
/// matching the wire format in §3 (`actions.add`, `selectors.replace`, …).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op")]
pub enum PatchOp {
    #[serde(rename = "actions.add")]
    ActionsAdd { key: String, value: ActionEntry },
    #[serde(rename = "actions.replace")]
    ActionsReplace { key: String, value: ActionEntry },
    #[serde(rename = "selectors.add")]
    SelectorsAdd { key: String, value: SelectorEntry },
    #[serde(rename = "selectors.replace")]
    SelectorsReplace { key: String, value: SelectorEntry },
    #[serde(rename = "workflow.update_expect")]
    WorkflowUpdateExpect { step: String, value: Vec<Expectation> },
    #[serde(rename = "policies.update")]
    PoliciesUpdate { key: String, value: Policy },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchPayload {
    pub patch: Vec<PatchOp>,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchClass {
    Minor,
    Major,
}

/// A single `actions.replace|selectors.replace|actions.add|selectors.add`
/// op is minor; anything else (multiple ops, any `policies.update`, any
/// `workflow.update_expect`) is major (§4.8).
pub fn classify(payload: &PatchPayload) -> PatchClass {
    if payload.patch.len() == 1
        && matches!(
            payload.patch[0],
            PatchOp::ActionsReplace { .. }
                | PatchOp::SelectorsReplace { .. }
                | PatchOp::ActionsAdd { .. }
                | PatchOp::SelectorsAdd { .. }
        )
    {
        PatchClass::Minor
    } else {
        PatchClass::Major
    }
}

/// Applies `payload`'s ops to a clone of `recipe` and bumps the version.
/// Pure: `recipe` is never mutated. `add` ops fail if the key already
/// exists (§9 open question #3: downgraded to a `RuntimeError`, not a
/// panic).
pub fn apply(recipe: &Recipe, payload: &PatchPayload) -> Result<Recipe> {
    let mut next = recipe.clone();

    for op in &payload.patch {
        match op {
            PatchOp::ActionsAdd { key, value } => {
                if next.actions.contains_key(key) {
                    return Err(RuntimeError::PatchFailed(format!(
                        "actions.add: key {key} already exists"
                    )));
                }
                next.actions.insert(key.clone(), value.clone());
            }
            PatchOp::ActionsReplace { key, value } => {
                next.actions.insert(key.clone(), value.clone());
            }
            PatchOp::SelectorsAdd { key, value } => {
                if next.selectors.contains_key(key) {
                    return Err(RuntimeError::PatchFailed(format!(
                        "selectors.add: key {key} already exists"
                    )));
                }
                next.selectors.insert(key.clone(), value.clone());
            }
            PatchOp::SelectorsReplace { key, value } => {
                next.selectors.insert(key.clone(), value.clone());
            }
            PatchOp::WorkflowUpdateExpect { step, value } => {
                let target = next
                    .workflow
                    .steps
                    .iter_mut()
                    .find(|s| &s.id == step)
                    .ok_or_else(|| {
                        RuntimeError::PatchFailed(format!("workflow.update_expect: no such step {step}"))
                    })?;
                target.expect = value.clone();
            }
            PatchOp::PoliciesUpdate { key, value } => {
                next.policies.insert(key.clone(), value.clone());
            }
        }
    }

    next.version = next.version.next();
    Ok(next)
}

/// Classifies and, if major, gates the patch behind a checkpoint before
/// applying (§4.8). Returns the new, versioned `Recipe` on success; the
/// stored recipe files are untouched either way (persisting the result is
/// the caller's job, typically via `storage::recipe_files`).
pub async fn apply_and_version_up(
    recipe: &Recipe,
    payload: &PatchPayload,
    checkpoint: &dyn CheckpointHandler,
) -> Result<Recipe> {
    if classify(payload) == PatchClass::Major {
        let message = format!(
            "major patch for {}/{} ({} ops): {}",
            recipe.domain,
            recipe.flow,
            payload.patch.len(),
            payload.reason
        );
        if checkpoint.request_approval(&message, None).await != Decision::Go {
            return Err(RuntimeError::PatchFailed("major patch rejected at checkpoint".into()));
        }
    }
    apply(recipe, payload)
}
