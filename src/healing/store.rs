use super::{Evidence, HealingEntry, LegacyHealingEntry};
use crate::error::{Result, RuntimeError};
use crate::recipe::ActionRef;
use chrono::Utc;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

/// A single on-disk record is either the current shape or the legacy one;
/// `serde`'s untagged enum drives the migration described in §4.1.
#[derive(Deserialize)]
#[serde(untagged)]
enum OnDiskEntry {
    Current(HealingEntry),
    Legacy(LegacyHealingEntry),
}

#[derive(Debug, Clone, Default)]
pub struct HealingStats {
    pub total_records: usize,
    pub avg_confidence: f64,
    pub hit_rate: f64,
    pub domain_distribution: HashMap<String, usize>,
}

pub(crate) struct EntryStore {
    entries: HashMap<(String, String, String), HealingEntry>,
    hits: u64,
    misses: u64,
}

impl EntryStore {
    pub async fn load(path: &Path) -> Result<Self> {
        let entries = if path.exists() {
            let bytes = tokio::fs::read(path).await?;
            if bytes.is_empty() {
                Vec::new()
            } else {
                let raw: Vec<OnDiskEntry> = serde_json::from_slice(&bytes)?;
                raw.into_iter()
                    .map(|e| match e {
                        OnDiskEntry::Current(e) => e,
                        OnDiskEntry::Legacy(l) => l.into(),
                    })
                    .collect()
            }
        } else {
            Vec::new()
        };

        let mut map = HashMap::new();
        for entry in entries {
            map.insert(entry.key(), entry);
        }

        Ok(Self {
            entries: map,
            hits: 0,
            misses: 0,
        })
    }

    async fn persist(&self, path: &Path) -> Result<()> {
        let entries: Vec<&HealingEntry> = self.entries.values().collect();
        let bytes = serde_json::to_vec_pretty(&entries)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }

    pub fn find_match(&mut self, target_key: &str, url: &str, min_confidence: f64) -> Option<ActionRef> {
        let domain = domain_of(url);

        let same_domain: Vec<&HealingEntry> = self
            .entries
            .values()
            .filter(|e| e.target_key == target_key && e.confidence >= min_confidence)
            .filter(|e| domain.as_deref().map(|d| d == e.domain).unwrap_or(false))
            .collect();

        let chosen = if !same_domain.is_empty() {
            best_of(same_domain)
        } else {
            let any_domain: Vec<&HealingEntry> = self
                .entries
                .values()
                .filter(|e| e.target_key == target_key && e.confidence >= min_confidence)
                .collect();
            if any_domain.is_empty() {
                None
            } else {
                best_of(any_domain)
            }
        };

        if chosen.is_some() {
            self.hits += 1;
        } else {
            self.misses += 1;
        }
        chosen
    }

    pub async fn record(
        &mut self,
        path: &Path,
        target_key: String,
        action: ActionRef,
        url: String,
        evidence: Evidence,
    ) -> Result<()> {
        let domain = domain_of(&url).unwrap_or_default();
        let probe_key = (target_key.clone(), action.selector.clone(), url.clone());

        if let Some(existing) = self.entries.get_mut(&probe_key) {
            existing.success_count += 1;
            existing.last_success_at = Utc::now();
            existing.recompute_confidence();
        } else {
            let mut entry = HealingEntry {
                target_key,
                domain,
                url,
                action,
                success_count: 1,
                fail_count: 0,
                confidence: 1.0,
                last_success_at: Utc::now(),
                last_fail_at: None,
                evidence,
            };
            entry.recompute_confidence();
            self.entries.insert(probe_key, entry);
        }

        self.persist(path).await
    }

    pub async fn record_failure(&mut self, path: &Path, target_key: &str, url: &str) -> Result<()> {
        let mut touched = false;
        for entry in self.entries.values_mut() {
            if entry.target_key == target_key && entry.url == url {
                entry.fail_count += 1;
                entry.last_fail_at = Some(Utc::now());
                entry.recompute_confidence();
                touched = true;
            }
        }
        if touched {
            self.persist(path).await
        } else {
            Ok(())
        }
    }

    pub async fn prune(&mut self, path: &Path, min_confidence: Option<f64>, max_age_days: Option<i64>) -> Result<usize> {
        let now = Utc::now();
        let before = self.entries.len();

        self.entries.retain(|_, e| {
            let fails_confidence = min_confidence.is_some_and(|min| e.confidence < min);
            let age_days = (now - e.last_success_at).num_days();
            let fails_age = max_age_days.is_some_and(|max| age_days > max);
            !(fails_confidence || fails_age)
        });

        let removed = before - self.entries.len();
        if removed > 0 {
            self.persist(path).await?;
        }
        Ok(removed)
    }

    pub fn stats(&self) -> HealingStats {
        let total_records = self.entries.len();
        let avg_confidence = if total_records == 0 {
            0.0
        } else {
            self.entries.values().map(|e| e.confidence).sum::<f64>() / total_records as f64
        };
        let total_lookups = self.hits + self.misses;
        let hit_rate = if total_lookups == 0 {
            0.0
        } else {
            self.hits as f64 / total_lookups as f64
        };
        let mut domain_distribution = HashMap::new();
        for entry in self.entries.values() {
            *domain_distribution.entry(entry.domain.clone()).or_insert(0) += 1;
        }

        HealingStats {
            total_records,
            avg_confidence,
            hit_rate,
            domain_distribution,
        }
    }
}

/// Ranks by confidence descending, ties broken by success_count descending.
fn best_of(mut candidates: Vec<&HealingEntry>) -> Option<ActionRef> {
    candidates.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.success_count.cmp(&a.success_count))
    });
    candidates.first().map(|e| e.action.clone())
}

pub(crate) fn domain_of(url: &str) -> Option<String> {
    url::Url::parse(url).ok().and_then(|u| u.host_str().map(str::to_string))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipe::{ActionMethod, ActionRef};

    fn action(sel: &str) -> ActionRef {
        ActionRef {
            selector: sel.to_string(),
            description: "test".to_string(),
            method: ActionMethod::Click,
            arguments: None,
        }
    }

    fn evidence(url: &str) -> Evidence {
        Evidence {
            original_selector: "#old".into(),
            healed_selector: "#new".into(),
            dom_context: String::new(),
            page_title: String::new(),
            page_url: url.into(),
            method: "observe_refresh".into(),
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn record_then_find_match_roundtrips() {
        let dir = temp_dir::TempDir::new().unwrap();
        let path = dir.path().join("healing.json");
        let mut store = EntryStore::load(&path).await.unwrap();
        store
            .record(&path, "k".into(), action("#a"), "https://example.com/p".into(), evidence("https://example.com/p"))
            .await
            .unwrap();

        let found = store.find_match("k", "https://example.com/p", 0.6);
        assert_eq!(found.unwrap().selector, "#a");
    }

    #[tokio::test]
    async fn confidence_drift_scenario() {
        let dir = temp_dir::TempDir::new().unwrap();
        let path = dir.path().join("healing.json");
        let mut store = EntryStore::load(&path).await.unwrap();
        store
            .record(&path, "k".into(), action("#a"), "https://example.com".into(), evidence("https://example.com"))
            .await
            .unwrap();
        for _ in 0..3 {
            store.record_failure(&path, "k", "https://example.com").await.unwrap();
        }

        assert!(store.find_match("k", "https://example.com", 0.6).is_none());
        assert!(store.find_match("k", "https://example.com", 0.2).is_some());
    }

    #[tokio::test]
    async fn migrates_legacy_shape_on_load() {
        let dir = temp_dir::TempDir::new().unwrap();
        let path = dir.path().join("healing.json");
        let legacy = serde_json::json!([{
            "target_key": "k",
            "domain": "example.com",
            "url": "https://example.com",
            "action": {"selector": "#a", "description": "x", "method": "click"},
            "success_count": 2,
            "healed_at": Utc::now(),
        }]);
        tokio::fs::write(&path, serde_json::to_vec(&legacy).unwrap()).await.unwrap();

        let mut store = EntryStore::load(&path).await.unwrap();
        let found = store.find_match("k", "https://example.com", 1.0);
        assert!(found.is_some(), "migrated entry should have confidence 1.0 and failCount 0");
    }
}
