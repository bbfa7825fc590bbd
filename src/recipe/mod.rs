//! Recipe Model — typed data for a workflow, its cached actions/selectors,
//! preflight fingerprints and candidate-ranking policies (§3).

pub mod action;
pub mod fingerprint;
pub mod policy;
pub mod selector;
pub mod version;
pub mod workflow;

pub use action::{ActionEntry, ActionMethod, ActionRef};
pub use fingerprint::Fingerprint;
pub use policy::{Condition, ConditionOp, PickStrategy, Policy, ScoreRule};
pub use selector::{SelectorEntry, SelectorStrategy};
pub use version::RecipeVersion;
pub use workflow::{Expectation, ExpectationKind, OnFail, Op, Step, Workflow};

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// A validated bundle of five JSON documents describing a site-specific
/// automation for a given flow and version. Immutable during a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recipe {
    pub domain: String,
    pub flow: String,
    pub version: RecipeVersion,
    pub workflow: Workflow,
    pub actions: HashMap<String, ActionEntry>,
    pub selectors: HashMap<String, SelectorEntry>,
    pub fingerprints: Vec<Fingerprint>,
    pub policies: HashMap<String, Policy>,
}

impl Recipe {
    /// Collects every invariant violation rather than stopping at the
    /// first one, so a caller (e.g. the admin `import` subcommand) can
    /// report everything at once.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if self.workflow.steps.is_empty() {
            problems.push("workflow.steps must be non-empty".to_string());
        }

        let mut seen_ids = HashSet::new();
        for step in &self.workflow.steps {
            if !seen_ids.insert(step.id.clone()) {
                problems.push(format!("duplicate step id: {}", step.id));
            }
            problems.extend(step.validate());

            if matches!(step.op, Op::ActCached) {
                if let Some(key) = &step.target_key {
                    if !self.actions.contains_key(key) && !self.selectors.contains_key(key) {
                        problems.push(format!(
                            "step {}: targetKey {key} has neither an actions nor selectors entry",
                            step.id
                        ));
                    }
                }
            }
        }

        problems
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_recipe() -> Recipe {
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
    fn minimal_recipe_is_valid() {
        assert!(minimal_recipe().is_valid());
    }

    #[test]
    fn empty_steps_is_invalid() {
        let mut r = minimal_recipe();
        r.workflow.steps.clear();
        let problems = r.validate();
        assert!(problems.iter().any(|p| p.contains("non-empty")));
    }

    #[test]
    fn duplicate_step_ids_are_invalid() {
        let mut r = minimal_recipe();
        let dup = r.workflow.steps[0].clone();
        r.workflow.steps.push(dup);
        let problems = r.validate();
        assert!(problems.iter().any(|p| p.contains("duplicate step id")));
    }

    #[test]
    fn act_cached_without_target_key_is_invalid() {
        let mut r = minimal_recipe();
        r.workflow.steps.push(Step {
            id: "click".into(),
            op: Op::ActCached,
            target_key: None,
            args: serde_json::Value::Null,
            expect: vec![],
            on_fail: None,
        });
        let problems = r.validate();
        assert!(problems.iter().any(|p| p.contains("requires targetKey")));
    }

    #[test]
    fn act_cached_missing_cross_reference_is_invalid() {
        let mut r = minimal_recipe();
        r.workflow.steps.push(Step {
            id: "click".into(),
            op: Op::ActCached,
            target_key: Some("missing_key".into()),
            args: serde_json::Value::Null,
            expect: vec![],
            on_fail: None,
        });
        let problems = r.validate();
        assert!(problems
            .iter()
            .any(|p| p.contains("neither an actions nor selectors entry")));
    }

    #[test]
    fn choose_step_requires_from_policy_into() {
        let mut r = minimal_recipe();
        r.workflow.steps.push(Step {
            id: "pick".into(),
            op: Op::Choose,
            target_key: None,
            args: serde_json::json!({"from": "candidates"}),
            expect: vec![],
            on_fail: None,
        });
        let problems = r.validate();
        assert!(problems.iter().any(|p| p.contains("args.policy")));
        assert!(problems.iter().any(|p| p.contains("args.into")));
    }
}
