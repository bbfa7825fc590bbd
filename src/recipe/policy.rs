use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOp {
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
    In,
    NotIn,
    Contains,
}

/// A single predicate over a candidate record's `field`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Condition {
    pub field: String,
    pub op: ConditionOp,
    pub value: serde_json::Value,
}

/// A scoring rule: add `add` to a candidate's score when `when` holds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreRule {
    pub when: Condition,
    pub add: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PickStrategy {
    Argmax,
    Argmin,
    First,
}

/// A declarative record over a candidate list producing exactly one choice
/// (or none), per §4.3.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    #[serde(default)]
    pub hard: Vec<Condition>,
    #[serde(default)]
    pub score: Vec<ScoreRule>,
    /// Field names, optionally suffixed `_asc`/`_desc` (default `_asc`).
    #[serde(default)]
    pub tie_break: Vec<String>,
    pub pick: PickStrategy,
}
