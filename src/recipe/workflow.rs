use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Op {
    Goto,
    ActCached,
    ActTemplate,
    Extract,
    Choose,
    Checkpoint,
    Wait,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnFail {
    Retry,
    Fallback,
    Checkpoint,
    Abort,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpectationKind {
    UrlContains,
    TitleContains,
    SelectorVisible,
    TextContains,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Expectation {
    pub kind: ExpectationKind,
    pub value: String,
}

/// One unit of work in a workflow, identified by `id` and typed by `op`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub id: String,
    pub op: Op,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_key: Option<String>,
    #[serde(default)]
    pub args: serde_json::Value,
    #[serde(default)]
    pub expect: Vec<Expectation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_fail: Option<OnFail>,
}

impl Step {
    pub fn arg_str(&self, key: &str) -> Option<&str> {
        self.args.get(key).and_then(|v| v.as_str())
    }

    pub fn arg_u64(&self, key: &str) -> Option<u64> {
        self.args.get(key).and_then(|v| v.as_u64())
    }

    /// Invariants from §3: `act_cached`/`act_template` steps require a
    /// `targetKey`; `choose` steps require `args.from`, `args.policy`,
    /// `args.into`.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();
        match self.op {
            Op::ActCached | Op::ActTemplate => {
                if self.target_key.is_none() {
                    problems.push(format!("step {}: {:?} requires targetKey", self.id, self.op));
                }
            }
            Op::Choose => {
                for key in ["from", "policy", "into"] {
                    if self.arg_str(key).is_none() {
                        problems.push(format!("step {}: choose requires args.{key}", self.id));
                    }
                }
            }
            _ => {}
        }
        problems
    }
}

/// Ordered list of steps; `steps` non-empty, step ids unique (checked by
/// `Recipe::validate`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default)]
    pub vars: serde_json::Value,
    pub steps: Vec<Step>,
}
