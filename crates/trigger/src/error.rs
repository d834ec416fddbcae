// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for trigger evaluation

use evg_model::ModelError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TriggerError {
    /// No handler is registered for the event's resource type
    #[error("no event handler for resource type: {0}")]
    UnknownResourceType(String),

    /// The event payload does not belong to this handler
    #[error("event {event_id} does not carry {expected} data")]
    MismatchedEventData { event_id: String, expected: &'static str },

    /// A template failed to parse or render; logged and skipped for
    /// custom fields, fatal for the main description
    #[error("template error: {0}")]
    Template(String),

    #[error(transparent)]
    Model(#[from] ModelError),
}

impl From<evg_db::DbError> for TriggerError {
    fn from(err: evg_db::DbError) -> Self {
        Self::Model(ModelError::from(err))
    }
}

impl From<minijinja::Error> for TriggerError {
    fn from(err: minijinja::Error) -> Self {
        Self::Template(err.to_string())
    }
}
