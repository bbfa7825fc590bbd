//! Crate-wide error type.
//!
//! Business logic threads `anyhow::Result` the way the rest of the crate
//! does; this enum is the error type surfaced at library boundaries
//! (recipe loading, healing memory persistence, patch application) where a
//! caller benefits from matching on a specific variant.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("recipe validation failed: {0:?}")]
    InvalidRecipe(Vec<String>),

    #[error("recipe not found at {0}")]
    RecipeNotFound(String),

    #[error("unrecognized recipe section for file {0}")]
    UnknownRecipeSection(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("archive error: {0}")]
    Archive(String),

    #[error("patch could not be applied: {0}")]
    PatchFailed(String),

    #[error("healing memory error: {0}")]
    HealingMemory(String),

    #[error("budget exceeded: {0}")]
    BudgetExceeded(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, RuntimeError>;
