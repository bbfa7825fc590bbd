//! Budget Guard — a monotonic counter plus policy object bounding the
//! per-run LLM/authoring/screenshot spend (§4.2).

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DowngradeStep {
    TrimDom,
    DropHistory,
    ObserveScopeNarrow,
    RequireHumanCheckpoint,
}

pub const DOWNGRADE_ORDER: [DowngradeStep; 4] = [
    DowngradeStep::TrimDom,
    DowngradeStep::DropHistory,
    DowngradeStep::ObserveScopeNarrow,
    DowngradeStep::RequireHumanCheckpoint,
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenBudget {
    pub max_llm_calls_per_run: u32,
    pub max_prompt_chars: usize,
    pub max_dom_snippet_chars: usize,
    pub max_screenshot_per_failure: u32,
    pub max_screenshot_per_checkpoint: u32,
    pub max_authoring_service_calls_per_run: u32,
    pub authoring_service_timeout_ms: u64,
}

impl Default for TokenBudget {
    fn default() -> Self {
        // Most healthy runs should need zero LLM calls once healing memory
        // is warm, keeping the aggregate SLO (llmCallsPerRun <= 0.2, §4.9)
        // reachable even though a single run may use a few.
        Self {
            max_llm_calls_per_run: 5,
            max_prompt_chars: 8_000,
            max_dom_snippet_chars: 4_000,
            max_screenshot_per_failure: 1,
            max_screenshot_per_checkpoint: 1,
            max_authoring_service_calls_per_run: 2,
            authoring_service_timeout_ms: 15_000,
        }
    }
}

#[derive(Debug, Default)]
struct Usage {
    llm_calls: u32,
    authoring_calls: u32,
    prompt_chars: usize,
    screenshots_per_failure: u32,
    screenshots_per_checkpoint: u32,
    downgrade_index: usize,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct UsageCounters {
    pub llm_calls: u32,
    pub authoring_calls: u32,
    pub prompt_chars: usize,
    pub screenshots: u32,
}

/// Enforces §4.2's per-run limits. Cheap to share via `Arc` across the
/// executor and recovery pipeline.
pub struct BudgetGuard {
    budget: TokenBudget,
    usage: Mutex<Usage>,
}

impl BudgetGuard {
    pub fn new(budget: TokenBudget) -> Self {
        Self {
            budget,
            usage: Mutex::new(Usage::default()),
        }
    }

    pub fn can_call_llm(&self) -> bool {
        self.usage.lock().llm_calls < self.budget.max_llm_calls_per_run
    }

    pub fn can_call_authoring(&self) -> bool {
        self.usage.lock().authoring_calls < self.budget.max_authoring_service_calls_per_run
    }

    pub fn can_take_screenshot(&self, for_checkpoint: bool) -> bool {
        let usage = self.usage.lock();
        if for_checkpoint {
            usage.screenshots_per_checkpoint < self.budget.max_screenshot_per_checkpoint
        } else {
            usage.screenshots_per_failure < self.budget.max_screenshot_per_failure
        }
    }

    pub fn record_llm_call(&self, prompt_chars: usize) {
        let mut usage = self.usage.lock();
        usage.llm_calls += 1;
        usage.prompt_chars += prompt_chars;
    }

    pub fn record_authoring_call(&self) {
        self.usage.lock().authoring_calls += 1;
    }

    pub fn record_screenshot(&self, for_checkpoint: bool) {
        let mut usage = self.usage.lock();
        if for_checkpoint {
            usage.screenshots_per_checkpoint += 1;
        } else {
            usage.screenshots_per_failure += 1;
        }
    }

    pub fn is_over_budget(&self) -> bool {
        let usage = self.usage.lock();
        usage.llm_calls >= self.budget.max_llm_calls_per_run
            && usage.authoring_calls >= self.budget.max_authoring_service_calls_per_run
    }

    /// The next cheapening step to apply before retrying, or `None` once
    /// the downgrade ladder is exhausted (the next failure must escalate
    /// to a checkpoint, per §4.2).
    pub fn get_downgrade_action(&self) -> Option<DowngradeStep> {
        let mut usage = self.usage.lock();
        let step = DOWNGRADE_ORDER.get(usage.downgrade_index).copied();
        if step.is_some() {
            usage.downgrade_index += 1;
        }
        step
    }

    pub fn usage_counters(&self) -> UsageCounters {
        let usage = self.usage.lock();
        UsageCounters {
            llm_calls: usage.llm_calls,
            authoring_calls: usage.authoring_calls,
            prompt_chars: usage.prompt_chars,
            screenshots: usage.screenshots_per_failure + usage.screenshots_per_checkpoint,
        }
    }
}
