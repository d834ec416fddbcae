// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Document store trait and operation context

use crate::query::{Filter, Update};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// A stored document. Typed models round-trip through this via
/// [`to_document`] and [`from_document`].
pub type Document = serde_json::Value;

/// Shared handle to a store implementation
pub type Db = Arc<dyn DocumentStore>;

/// Errors from store operations
#[derive(Debug, Error)]
pub enum DbError {
    #[error("duplicate document id: {0}")]
    Duplicate(String),
    #[error("operation cancelled")]
    Cancelled,
    #[error("malformed document: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Per-operation context carrying the cancellation token
///
/// A cancelled context makes store calls return [`DbError::Cancelled`]
/// before they touch the backing store.
#[derive(Clone, Default)]
pub struct OpContext {
    cancel: CancellationToken,
}

impl OpContext {
    /// A context that is never cancelled
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_cancel(cancel: CancellationToken) -> Self {
        Self { cancel }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Fail fast if the context was cancelled
    pub fn ensure_live(&self) -> Result<(), DbError> {
        if self.cancel.is_cancelled() {
            return Err(DbError::Cancelled);
        }
        Ok(())
    }
}

/// Result of an update or upsert
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateResult {
    pub matched: u64,
    pub modified: u64,
    pub upserted: bool,
}

/// A document database offering named collections
///
/// All mutations are atomic per call; the conditional forms
/// (`update_one` with a filter) are the concurrency primitive the rest
/// of the core builds on.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert a single document. A duplicate `_id` is an error.
    async fn insert_one(
        &self,
        ctx: &OpContext,
        collection: &str,
        doc: Document,
    ) -> Result<(), DbError>;

    /// Insert a batch of documents
    async fn insert_many(
        &self,
        ctx: &OpContext,
        collection: &str,
        docs: Vec<Document>,
    ) -> Result<(), DbError>;

    /// Find the first document matching the filter
    async fn find_one(
        &self,
        ctx: &OpContext,
        collection: &str,
        filter: &Filter,
    ) -> Result<Option<Document>, DbError>;

    /// Find all documents matching the filter, in insertion order
    async fn find(
        &self,
        ctx: &OpContext,
        collection: &str,
        filter: &Filter,
    ) -> Result<Vec<Document>, DbError>;

    /// Count documents matching the filter
    async fn count(
        &self,
        ctx: &OpContext,
        collection: &str,
        filter: &Filter,
    ) -> Result<u64, DbError>;

    /// Atomically update the first matching document
    async fn update_one(
        &self,
        ctx: &OpContext,
        collection: &str,
        filter: &Filter,
        update: &Update,
    ) -> Result<UpdateResult, DbError>;

    /// Atomically update every matching document
    async fn update_many(
        &self,
        ctx: &OpContext,
        collection: &str,
        filter: &Filter,
        update: &Update,
    ) -> Result<UpdateResult, DbError>;

    /// Update the first matching document, inserting one synthesized
    /// from the filter's equality terms when nothing matches
    async fn upsert(
        &self,
        ctx: &OpContext,
        collection: &str,
        filter: &Filter,
        update: &Update,
    ) -> Result<UpdateResult, DbError>;

    /// Delete the first matching document
    async fn delete_one(
        &self,
        ctx: &OpContext,
        collection: &str,
        filter: &Filter,
    ) -> Result<bool, DbError>;

    /// Delete every matching document
    async fn delete_many(
        &self,
        ctx: &OpContext,
        collection: &str,
        filter: &Filter,
    ) -> Result<u64, DbError>;
}

/// Serialize a typed model into a document
pub fn to_document<T: Serialize>(value: &T) -> Result<Document, DbError> {
    Ok(serde_json::to_value(value)?)
}

/// Deserialize a document into a typed model
pub fn from_document<T: DeserializeOwned>(doc: Document) -> Result<T, DbError> {
    Ok(serde_json::from_value(doc)?)
}
