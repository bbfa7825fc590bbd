use super::{FailureContext, RecoveryAction, RecoveryDeps, RecoveryOutcome};
use crate::browser::BrowserEngine;
use async_trait::async_trait;

/// Looks up `healingMemory.findMatch(targetKey, url)` and executes it if
/// found (§4.5). Records a hit/miss with the metrics collector either way.
pub(super) struct HealingMemoryLookup;

#[async_trait]
impl RecoveryAction for HealingMemoryLookup {
    fn method_name(&self) -> &'static str {
        "healing_memory"
    }

    async fn attempt(&self, ctx: &FailureContext, deps: &RecoveryDeps<'_>) -> RecoveryOutcome {
        let Some(target_key) = &ctx.target_key else {
            return RecoveryOutcome::not_recovered(self.method_name());
        };

        let found = deps.healing_memory.find_match(target_key, &ctx.url, 0.6).await;
        deps.metrics.record_healing_memory(found.is_some());

        let Some(action) = found else {
            return RecoveryOutcome::not_recovered(self.method_name());
        };

        if deps.engine.act(&action).await.unwrap_or(false) {
            RecoveryOutcome::recovered(self.method_name(), "recovered via healing memory")
        } else {
            RecoveryOutcome::not_recovered(self.method_name())
        }
    }
}
