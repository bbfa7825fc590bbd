//! Run Event Stream — the discriminated union of events a run emits to
//! subscribers, carried over `tokio::sync::broadcast` (§3/§4.7/§5/§9).
//!
//! `broadcast` is chosen because producers must never block on a slow
//! subscriber and drop-oldest semantics are acceptable here (§9): the CLI
//! driver always attaches before `run_start` is sent and keeps pace with a
//! single run's event volume.

use crate::context::ErrorType;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum RunEvent {
    RunStart {
        run_id: Uuid,
        total_steps: usize,
    },
    StepStart {
        step_id: String,
        step_index: usize,
        op: String,
    },
    StepEnd {
        step_id: String,
        step_index: usize,
        ok: bool,
        duration_ms: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error_type: Option<ErrorType>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        screenshot: Option<String>,
    },
    RunComplete {
        ok: bool,
        total_duration_ms: u64,
        vars: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        aborted_at: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        summary: Option<String>,
    },
    RunError {
        error: String,
    },
}

const CHANNEL_CAPACITY: usize = 1024;

/// A run's event bus. `publish` never blocks on subscribers; if nobody is
/// listening the event is simply dropped (§5/§9).
pub struct EventStream {
    tx: broadcast::Sender<RunEvent>,
}

impl EventStream {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: RunEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for EventStream {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_sees_events_in_order() {
        let stream = EventStream::new();
        let mut rx = stream.subscribe();

        stream.publish(RunEvent::RunStart { run_id: Uuid::new_v4(), total_steps: 1 });
        stream.publish(RunEvent::RunComplete {
            ok: true,
            total_duration_ms: 5,
            vars: serde_json::json!({}),
            aborted_at: None,
            summary: None,
        });

        assert!(matches!(rx.recv().await.unwrap(), RunEvent::RunStart { .. }));
        assert!(matches!(rx.recv().await.unwrap(), RunEvent::RunComplete { .. }));
    }

    #[test]
    fn run_start_serializes_with_snake_case_event_tag() {
        let event = RunEvent::RunStart { run_id: Uuid::nil(), total_steps: 3 };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "run_start");
        assert_eq!(json["totalSteps"], 3);
    }
}
