use super::{FailureContext, RecoveryAction, RecoveryDeps, RecoveryOutcome};
use crate::browser::BrowserEngine;
use crate::planner::PatchRequest;
use async_trait::async_trait;
use base64::Engine as _;
use uuid::Uuid;

/// Requests a patch from the configured `PatchPlanner`, gated on
/// `canCallAuthoring()`. Marks recovery as having produced a patch but does
/// not apply it — application is the Patch Workflow's job (§4.5).
pub(super) struct AuthoringPatch;

#[async_trait]
impl RecoveryAction for AuthoringPatch {
    fn method_name(&self) -> &'static str {
        "authoring_patch"
    }

    async fn attempt(&self, ctx: &FailureContext, deps: &RecoveryDeps<'_>) -> RecoveryOutcome {
        let Some(planner) = deps.patch_planner else {
            return RecoveryOutcome::not_recovered(self.method_name());
        };
        if !deps.budget.can_call_authoring() {
            return RecoveryOutcome::not_recovered(self.method_name());
        }

        let screenshot_base64 = if deps.budget.can_take_screenshot(false) {
            match deps.engine.screenshot(ctx.failed_selector.as_deref()).await {
                Ok(bytes) => {
                    deps.budget.record_screenshot(false);
                    Some(base64::engine::general_purpose::STANDARD.encode(bytes))
                }
                Err(_) => None,
            }
        } else {
            None
        };

        let request = PatchRequest {
            request_id: Uuid::new_v4(),
            step_id: ctx.step_id.clone(),
            error_type: ctx.error_type,
            url: ctx.url.clone(),
            title: ctx.title.clone(),
            failed_selector: ctx.failed_selector.clone(),
            failed_action: ctx.failed_action.clone(),
            dom_snippet: None,
            screenshot_base64,
        };

        deps.budget.record_authoring_call();

        match planner.plan_patch(request).await {
            Ok(payload) => {
                let mut outcome = RecoveryOutcome::not_recovered(self.method_name());
                outcome.message = Some("authoring service proposed a patch, pending application".to_string());
                outcome.pending_patch = Some(payload);
                outcome
            }
            Err(_) => RecoveryOutcome::not_recovered(self.method_name()),
        }
    }
}
