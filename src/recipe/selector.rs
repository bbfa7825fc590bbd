use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectorStrategy {
    Testid,
    Role,
    Css,
    Xpath,
}

/// A recipe's cached knowledge of how to locate one `targetKey`'s element,
/// with an ordered fallback list tried by the selector-fallback recovery
/// strategy (§4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectorEntry {
    pub primary: String,
    #[serde(default)]
    pub fallbacks: Vec<String>,
    pub strategy: SelectorStrategy,
}

impl SelectorEntry {
    /// The primary selector followed by each fallback, in try order.
    pub fn candidates(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.primary.as_str()).chain(self.fallbacks.iter().map(String::as_str))
    }
}
