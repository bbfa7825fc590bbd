use super::{FailureContext, RecoveryAction, RecoveryDeps, RecoveryOutcome};
use crate::browser::BrowserEngine;
use crate::healing::Evidence;
use async_trait::async_trait;
use chrono::Utc;

/// Asks the engine to re-observe the page for the step's instruction (an
/// LLM-backed capability gated by the Budget Guard) and executes the first
/// candidate it returns. Success records both the LLM call and a healing
/// memory entry (§4.5).
pub(super) struct ObserveRefresh;

#[async_trait]
impl RecoveryAction for ObserveRefresh {
    fn method_name(&self) -> &'static str {
        "observe_refresh"
    }

    async fn attempt(&self, ctx: &FailureContext, deps: &RecoveryDeps<'_>) -> RecoveryOutcome {
        if !deps.budget.can_call_llm() {
            return RecoveryOutcome::not_recovered(self.method_name());
        }

        let instruction = ctx
            .failed_action
            .as_ref()
            .map(|a| a.description.clone())
            .unwrap_or_else(|| format!("interact with {}", ctx.target_key.as_deref().unwrap_or("target")));

        let candidates = match deps.engine.observe(&instruction, ctx.target_key.as_deref()).await {
            Ok(c) => c,
            Err(_) => return RecoveryOutcome::not_recovered(self.method_name()),
        };

        let Some(candidate) = candidates.into_iter().next() else {
            return RecoveryOutcome::not_recovered(self.method_name());
        };

        if deps.engine.act(&candidate).await.unwrap_or(false) {
            deps.budget.record_llm_call(instruction.len());
            deps.metrics.record_llm_call(instruction.len(), 0);

            if let Some(target_key) = &ctx.target_key {
                let original_selector = ctx
                    .failed_action
                    .as_ref()
                    .map(|a| a.selector.clone())
                    .unwrap_or_default();
                let evidence = Evidence {
                    original_selector,
                    healed_selector: candidate.selector.clone(),
                    dom_context: String::new(),
                    page_title: ctx.title.clone().unwrap_or_default(),
                    page_url: ctx.url.clone(),
                    method: "observe_refresh".to_string(),
                    timestamp: Utc::now(),
                };
                let _ = deps
                    .healing_memory
                    .record(target_key, candidate.clone(), &ctx.url, evidence)
                    .await;
            }

            return RecoveryOutcome::recovered(self.method_name(), "recovered via observe/refresh");
        }

        RecoveryOutcome::not_recovered(self.method_name())
    }
}
