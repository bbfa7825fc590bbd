//! `RunContext` and the step-level result/error types shared by the
//! executor, recovery pipeline and runner (§3).

use crate::budget::{BudgetGuard, TokenBudget, UsageCounters};
use crate::recipe::Recipe;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Per-run mutable state: the recipe (read-only), the `vars` scratch space
/// steps read and write, and the budget guard.
pub struct RunContext {
    pub recipe: Recipe,
    pub vars: RwLock<Value>,
    pub budget: Arc<BudgetGuard>,
    pub run_id: Uuid,
    pub started_at: chrono::DateTime<chrono::Utc>,
}

impl RunContext {
    pub fn new(recipe: Recipe, budget: TokenBudget) -> Self {
        let initial_vars = recipe.workflow.vars.clone();
        Self {
            recipe,
            vars: RwLock::new(if initial_vars.is_null() {
                serde_json::json!({})
            } else {
                initial_vars
            }),
            budget: Arc::new(BudgetGuard::new(budget)),
            run_id: Uuid::new_v4(),
            started_at: chrono::Utc::now(),
        }
    }

    pub async fn get_var(&self, name: &str) -> Option<Value> {
        self.vars.read().await.get(name).cloned()
    }

    pub async fn set_var(&self, name: &str, value: Value) {
        let mut vars = self.vars.write().await;
        if !vars.is_object() {
            *vars = serde_json::json!({});
        }
        vars.as_object_mut()
            .expect("just ensured object")
            .insert(name.to_string(), value);
    }

    pub fn usage(&self) -> UsageCounters {
        self.budget.usage_counters()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum ErrorType {
    TargetNotFound,
    ExpectationFailed,
    ExtractionEmpty,
    CaptchaOr2FA,
    AuthoringServiceTimeout,
    CanvasDetected,
    Navigation,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub step_id: String,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<ErrorType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl StepResult {
    pub fn ok(step_id: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            step_id: step_id.into(),
            ok: true,
            error_type: None,
            message: None,
            duration_ms: Some(duration_ms),
            data: None,
        }
    }

    pub fn fail(step_id: impl Into<String>, error_type: ErrorType, message: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            step_id: step_id.into(),
            ok: false,
            error_type: Some(error_type),
            message: Some(message.into()),
            duration_ms: Some(duration_ms),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}
