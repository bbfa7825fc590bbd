use super::{FailureContext, RecoveryAction, RecoveryDeps, RecoveryOutcome};
use crate::browser::BrowserEngine;
use async_trait::async_trait;

/// Captures a screenshot if the budget allows, then asks the Checkpoint
/// Handler for a GO/NOT-GO decision. Always terminal: the pipeline stops
/// here regardless of outcome (§4.5).
pub(super) struct CheckpointEscalation;

#[async_trait]
impl RecoveryAction for CheckpointEscalation {
    fn method_name(&self) -> &'static str {
        "checkpoint"
    }

    async fn attempt(&self, ctx: &FailureContext, deps: &RecoveryDeps<'_>) -> RecoveryOutcome {
        let screenshot = if deps.budget.can_take_screenshot(true) {
            match deps.engine.screenshot(ctx.failed_selector.as_deref()).await {
                Ok(bytes) => {
                    deps.budget.record_screenshot(true);
                    Some(bytes)
                }
                Err(_) => None,
            }
        } else {
            None
        };

        let message = format!(
            "step {} failed with {:?} at {}{}",
            ctx.step_id,
            ctx.error_type,
            ctx.url,
            ctx.failed_selector
                .as_ref()
                .map(|s| format!(" (selector {s})"))
                .unwrap_or_default()
        );

        let decision = deps.checkpoint.request_approval(&message, screenshot.as_deref()).await;

        if decision.is_go() {
            RecoveryOutcome::recovered(self.method_name(), "operator approved continuation at checkpoint")
        } else {
            let mut outcome = RecoveryOutcome::not_recovered(self.method_name());
            outcome.message = Some("operator rejected continuation at checkpoint".to_string());
            outcome
        }
    }
}
