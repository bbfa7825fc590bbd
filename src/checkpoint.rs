//! Checkpoint Handler — the bridge to human (or auto) GO/NOT-GO decisions
//! (§4.9/§6). Deciding how an approval request reaches an operator is
//! explicitly out of scope (§1); this module ships only the minimal
//! defaults spec.md requires.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::io::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Decision {
    Go,
    NotGo,
}

impl Decision {
    pub fn is_go(self) -> bool {
        matches!(self, Decision::Go)
    }
}

#[async_trait]
pub trait CheckpointHandler: Send + Sync {
    async fn request_approval(&self, message: &str, screenshot: Option<&[u8]>) -> Decision;
}

/// Required by §6: a variant that always returns `GO`.
pub struct AutoApproveCheckpoint;

#[async_trait]
impl CheckpointHandler for AutoApproveCheckpoint {
    async fn request_approval(&self, _message: &str, _screenshot: Option<&[u8]>) -> Decision {
        Decision::Go
    }
}

/// Prompts on stdout and blocks on a stdin line, for the CLI's interactive
/// path — analogous to the teacher's `interactive_mode` stdin loop in
/// `src/main.rs`. Not a substitute for a real approvals channel.
pub struct StdoutCheckpoint;

#[async_trait]
impl CheckpointHandler for StdoutCheckpoint {
    async fn request_approval(&self, message: &str, _screenshot: Option<&[u8]>) -> Decision {
        print!("\ncheckpoint: {message}\nGO/NOT_GO? ");
        let _ = std::io::stdout().flush();

        let decision = tokio::task::spawn_blocking(|| {
            let mut input = String::new();
            std::io::stdin().read_line(&mut input).ok();
            input
        })
        .await
        .unwrap_or_default();

        if decision.trim().eq_ignore_ascii_case("go") {
            Decision::Go
        } else {
            Decision::NotGo
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn auto_approve_always_goes() {
        let handler = AutoApproveCheckpoint;
        assert_eq!(handler.request_approval("ok?", None).await, Decision::Go);
    }
}
