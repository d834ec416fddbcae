// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types shared across the model

use evg_db::DbError;
use thiserror::Error;

/// Errors surfaced by model operations
#[derive(Debug, Error)]
pub enum ModelError {
    /// Entity missing from the store
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// The dependency graph loops back on itself
    #[error("dependency cycle detected")]
    CycleDetected,

    /// Caller handed us something unusable
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Duplicate key where uniqueness is required
    #[error("conflict: {0}")]
    Conflict(String),

    /// Store-layer failure; the caller may retry unless it was a
    /// cancellation
    #[error(transparent)]
    Db(#[from] DbError),
}

impl ModelError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound { kind, id: id.into() }
    }

    /// Whether retrying the operation could succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Db(DbError::Unavailable(_)))
    }
}
