use super::{FailureContext, RecoveryAction, RecoveryDeps, RecoveryOutcome};
use crate::browser::BrowserEngine;
use async_trait::async_trait;

/// Re-issues the failed action as-is. Success recovers (§4.5).
pub(super) struct Retry;

#[async_trait]
impl RecoveryAction for Retry {
    fn method_name(&self) -> &'static str {
        "retry"
    }

    async fn attempt(&self, ctx: &FailureContext, deps: &RecoveryDeps<'_>) -> RecoveryOutcome {
        let Some(action) = &ctx.failed_action else {
            return RecoveryOutcome::not_recovered(self.method_name());
        };

        match deps.engine.act(action).await {
            Ok(true) => RecoveryOutcome::recovered(self.method_name(), "recovered via retry"),
            _ => RecoveryOutcome::not_recovered(self.method_name()),
        }
    }
}
