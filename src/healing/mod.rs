//! Healing Memory — a durable keyed store mapping `(targetKey, url)` to
//! previously recovered actions, with per-entry confidence (§4.1).
//!
//! Mutations are serialized through a single background task reached over
//! an `mpsc` channel (the "asynchronous queue" §4.1/§5 calls for) so two
//! concurrent `record` calls for the same key never lose an increment, and
//! a failed persist never corrupts the in-memory view.

mod store;

pub use store::HealingStats;

use crate::error::{Result, RuntimeError};
use crate::recipe::ActionRef;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use store::EntryStore;
use tokio::sync::{mpsc, oneshot};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evidence {
    pub original_selector: String,
    pub healed_selector: String,
    #[serde(default)]
    pub dom_context: String,
    #[serde(default)]
    pub page_title: String,
    pub page_url: String,
    pub method: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealingEntry {
    pub target_key: String,
    pub domain: String,
    pub url: String,
    pub action: ActionRef,
    pub success_count: u32,
    pub fail_count: u32,
    pub confidence: f64,
    pub last_success_at: DateTime<Utc>,
    #[serde(default)]
    pub last_fail_at: Option<DateTime<Utc>>,
    pub evidence: Evidence,
}

impl HealingEntry {
    pub(crate) fn recompute_confidence(&mut self) {
        let total = self.success_count + self.fail_count;
        self.confidence = if total == 0 {
            0.0
        } else {
            self.success_count as f64 / total as f64
        };
    }

    pub(crate) fn key(&self) -> (String, String, String) {
        (self.target_key.clone(), self.action.selector.clone(), self.url.clone())
    }
}

enum Command {
    FindMatch {
        target_key: String,
        url: String,
        min_confidence: f64,
        reply: oneshot::Sender<Option<ActionRef>>,
    },
    Record {
        target_key: String,
        action: ActionRef,
        url: String,
        evidence: Evidence,
        reply: oneshot::Sender<Result<()>>,
    },
    RecordFailure {
        target_key: String,
        url: String,
        reply: oneshot::Sender<Result<()>>,
    },
    Prune {
        min_confidence: Option<f64>,
        max_age_days: Option<i64>,
        reply: oneshot::Sender<Result<usize>>,
    },
    Stats {
        reply: oneshot::Sender<HealingStats>,
    },
}

/// Handle to the single-writer healing memory actor. Cheap to clone.
#[derive(Clone)]
pub struct HealingMemory {
    tx: mpsc::Sender<Command>,
}

impl HealingMemory {
    /// Loads (or creates) the JSON store at `path` and spawns its
    /// single-writer task.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let mut store = EntryStore::load(&path).await?;
        let (tx, mut rx) = mpsc::channel::<Command>(256);

        tokio::spawn(async move {
            while let Some(cmd) = rx.recv().await {
                match cmd {
                    Command::FindMatch {
                        target_key,
                        url,
                        min_confidence,
                        reply,
                    } => {
                        let found = store.find_match(&target_key, &url, min_confidence);
                        let _ = reply.send(found);
                    }
                    Command::Record {
                        target_key,
                        action,
                        url,
                        evidence,
                        reply,
                    } => {
                        let outcome = store.record(&path, target_key, action, url, evidence).await;
                        let _ = reply.send(outcome);
                    }
                    Command::RecordFailure { target_key, url, reply } => {
                        let outcome = store.record_failure(&path, &target_key, &url).await;
                        let _ = reply.send(outcome);
                    }
                    Command::Prune {
                        min_confidence,
                        max_age_days,
                        reply,
                    } => {
                        let outcome = store.prune(&path, min_confidence, max_age_days).await;
                        let _ = reply.send(outcome);
                    }
                    Command::Stats { reply } => {
                        let _ = reply.send(store.stats());
                    }
                }
            }
        });

        Ok(Self { tx })
    }

    /// Selection order (§4.1): same-domain matches above `min_confidence`
    /// first, ranked by confidence desc then success_count desc; if none,
    /// any-domain matches above the threshold, same ranking. `None` if
    /// still empty.
    pub async fn find_match(&self, target_key: &str, url: &str, min_confidence: f64) -> Option<ActionRef> {
        let (reply, rx) = oneshot::channel();
        if self
            .tx
            .send(Command::FindMatch {
                target_key: target_key.to_string(),
                url: url.to_string(),
                min_confidence,
                reply,
            })
            .await
            .is_err()
        {
            return None;
        }
        rx.await.unwrap_or(None)
    }

    pub async fn record(&self, target_key: &str, action: ActionRef, url: &str, evidence: Evidence) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Record {
                target_key: target_key.to_string(),
                action,
                url: url.to_string(),
                evidence,
                reply,
            })
            .await
            .map_err(|_| RuntimeError::HealingMemory("healing memory actor is gone".into()))?;
        rx.await.map_err(|_| RuntimeError::HealingMemory("healing memory actor dropped reply".into()))?
    }

    pub async fn record_failure(&self, target_key: &str, url: &str) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::RecordFailure {
                target_key: target_key.to_string(),
                url: url.to_string(),
                reply,
            })
            .await
            .map_err(|_| RuntimeError::HealingMemory("healing memory actor is gone".into()))?;
        rx.await.map_err(|_| RuntimeError::HealingMemory("healing memory actor dropped reply".into()))?
    }

    pub async fn prune(&self, min_confidence: Option<f64>, max_age_days: Option<i64>) -> Result<usize> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Prune {
                min_confidence,
                max_age_days,
                reply,
            })
            .await
            .map_err(|_| RuntimeError::HealingMemory("healing memory actor is gone".into()))?;
        rx.await.map_err(|_| RuntimeError::HealingMemory("healing memory actor dropped reply".into()))?
    }

    pub async fn get_stats(&self) -> HealingStats {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(Command::Stats { reply }).await.is_err() {
            return HealingStats::default();
        }
        rx.await.unwrap_or_default()
    }
}

/// Legacy on-disk shape migrated transparently on load (§4.1).
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct LegacyHealingEntry {
    pub target_key: String,
    pub domain: String,
    pub url: String,
    pub action: ActionRef,
    pub success_count: u32,
    pub healed_at: DateTime<Utc>,
}

impl From<LegacyHealingEntry> for HealingEntry {
    fn from(legacy: LegacyHealingEntry) -> Self {
        HealingEntry {
            target_key: legacy.target_key,
            domain: legacy.domain,
            url: legacy.url.clone(),
            action: legacy.action.clone(),
            success_count: legacy.success_count,
            fail_count: 0,
            confidence: 1.0,
            last_success_at: legacy.healed_at,
            last_fail_at: None,
            evidence: Evidence {
                original_selector: legacy.action.selector.clone(),
                healed_selector: legacy.action.selector,
                dom_context: String::new(),
                page_title: String::new(),
                page_url: legacy.url,
                method: "migration".to_string(),
                timestamp: legacy.healed_at,
            },
        }
    }
}
