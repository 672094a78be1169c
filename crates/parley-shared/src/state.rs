//! Explicit load state for anything fetched asynchronously.

use serde::{Deserialize, Serialize};

/// Distinguishes "never asked" from "asked and got nothing" without relying
/// on `Option`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum LoadState<T> {
    NotStarted,
    Loading,
    Success(T),
    /// Displayable error message.
    Error(String),
}

impl<T> Default for LoadState<T> {
    fn default() -> Self {
        Self::NotStarted
    }
}

impl<T> LoadState<T> {
    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Success(v) => Some(v),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Error(e) => Some(e),
            _ => None,
        }
    }
}
