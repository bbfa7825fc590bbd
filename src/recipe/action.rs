use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How an `ActionRef` should be applied to its target element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionMethod {
    Click,
    Fill,
    Type,
    Press,
}

/// A concrete, executable reference to a UI action: a selector plus the
/// method to invoke on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRef {
    pub selector: String,
    pub description: String,
    pub method: ActionMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Vec<String>>,
}

/// A recipe's cached knowledge of how to perform one `targetKey`'s action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionEntry {
    pub instruction: String,
    pub preferred: ActionRef,
    pub observed_at: DateTime<Utc>,
}
