use super::{FailureContext, RecoveryAction, RecoveryDeps, RecoveryOutcome};
use crate::browser::BrowserEngine;
use async_trait::async_trait;

/// Tries `selectors[targetKey]`'s primary then each fallback in order,
/// using the failed action's method/arguments against each candidate
/// selector. First success recovers (§4.5).
pub(super) struct SelectorFallback;

#[async_trait]
impl RecoveryAction for SelectorFallback {
    fn method_name(&self) -> &'static str {
        "selector_fallback"
    }

    async fn attempt(&self, ctx: &FailureContext, deps: &RecoveryDeps<'_>) -> RecoveryOutcome {
        let (Some(target_key), Some(action)) = (&ctx.target_key, &ctx.failed_action) else {
            return RecoveryOutcome::not_recovered(self.method_name());
        };
        let Some(selector_entry) = deps.recipe.selectors.get(target_key) else {
            return RecoveryOutcome::not_recovered(self.method_name());
        };

        for candidate in selector_entry.candidates() {
            let mut attempt = action.clone();
            attempt.selector = candidate.to_string();
            if deps.engine.act(&attempt).await.unwrap_or(false) {
                return RecoveryOutcome::recovered(
                    self.method_name(),
                    format!("recovered via selector fallback to {candidate}"),
                );
            }
        }

        RecoveryOutcome::not_recovered(self.method_name())
    }
}
