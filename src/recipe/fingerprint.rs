use serde::{Deserialize, Serialize};

/// A soft preflight guard: the runner checks `url_contains` before starting
/// a run (§4.6 step 1). `must_text`/`must_selectors` are advisory and belong
/// to per-page guards the runner does not evaluate itself.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Fingerprint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub must_text: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub must_selectors: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_contains: Option<String>,
}
