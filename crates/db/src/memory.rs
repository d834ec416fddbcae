// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory document store
//!
//! Collections are plain vectors behind one mutex, so every operation
//! is atomic with respect to every other. Used by tests in place of the
//! document database.

use crate::query::{Filter, Update};
use crate::store::{Db, DbError, Document, DocumentStore, OpContext, UpdateResult};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Default)]
pub struct MemoryStore {
    collections: Mutex<HashMap<String, Vec<Document>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A fresh store behind the shared [`Db`] handle
    pub fn shared() -> Db {
        Arc::new(Self::new())
    }

    fn with_collection<R>(&self, name: &str, f: impl FnOnce(&mut Vec<Document>) -> R) -> R {
        let mut collections = self.collections.lock().unwrap_or_else(|e| e.into_inner());
        f(collections.entry(name.to_string()).or_default())
    }

    fn check_duplicate(docs: &[Document], doc: &Document) -> Result<(), DbError> {
        let id = match doc.get("_id") {
            Some(id) if !id.is_null() => id,
            _ => return Ok(()),
        };
        if docs.iter().any(|d| d.get("_id") == Some(id)) {
            let rendered = id.as_str().map(str::to_string).unwrap_or_else(|| id.to_string());
            return Err(DbError::Duplicate(rendered));
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn insert_one(
        &self,
        ctx: &OpContext,
        collection: &str,
        doc: Document,
    ) -> Result<(), DbError> {
        ctx.ensure_live()?;
        self.with_collection(collection, |docs| {
            Self::check_duplicate(docs, &doc)?;
            docs.push(doc);
            Ok(())
        })
    }

    async fn insert_many(
        &self,
        ctx: &OpContext,
        collection: &str,
        new_docs: Vec<Document>,
    ) -> Result<(), DbError> {
        ctx.ensure_live()?;
        self.with_collection(collection, |docs| {
            for doc in &new_docs {
                Self::check_duplicate(docs, doc)?;
            }
            docs.extend(new_docs);
            Ok(())
        })
    }

    async fn find_one(
        &self,
        ctx: &OpContext,
        collection: &str,
        filter: &Filter,
    ) -> Result<Option<Document>, DbError> {
        ctx.ensure_live()?;
        Ok(self.with_collection(collection, |docs| {
            docs.iter().find(|d| filter.matches(d)).cloned()
        }))
    }

    async fn find(
        &self,
        ctx: &OpContext,
        collection: &str,
        filter: &Filter,
    ) -> Result<Vec<Document>, DbError> {
        ctx.ensure_live()?;
        Ok(self.with_collection(collection, |docs| {
            docs.iter().filter(|d| filter.matches(d)).cloned().collect()
        }))
    }

    async fn count(
        &self,
        ctx: &OpContext,
        collection: &str,
        filter: &Filter,
    ) -> Result<u64, DbError> {
        ctx.ensure_live()?;
        Ok(self.with_collection(collection, |docs| {
            docs.iter().filter(|d| filter.matches(d)).count() as u64
        }))
    }

    async fn update_one(
        &self,
        ctx: &OpContext,
        collection: &str,
        filter: &Filter,
        update: &Update,
    ) -> Result<UpdateResult, DbError> {
        ctx.ensure_live()?;
        Ok(self.with_collection(collection, |docs| {
            match docs.iter_mut().find(|d| filter.matches(d)) {
                Some(doc) => {
                    update.apply(doc);
                    UpdateResult { matched: 1, modified: 1, upserted: false }
                }
                None => UpdateResult::default(),
            }
        }))
    }

    async fn update_many(
        &self,
        ctx: &OpContext,
        collection: &str,
        filter: &Filter,
        update: &Update,
    ) -> Result<UpdateResult, DbError> {
        ctx.ensure_live()?;
        Ok(self.with_collection(collection, |docs| {
            let mut result = UpdateResult::default();
            for doc in docs.iter_mut().filter(|d| filter.matches(d)) {
                update.apply(doc);
                result.matched += 1;
                result.modified += 1;
            }
            result
        }))
    }

    async fn upsert(
        &self,
        ctx: &OpContext,
        collection: &str,
        filter: &Filter,
        update: &Update,
    ) -> Result<UpdateResult, DbError> {
        ctx.ensure_live()?;
        self.with_collection(collection, |docs| {
            if let Some(doc) = docs.iter_mut().find(|d| filter.matches(d)) {
                update.apply(doc);
                return Ok(UpdateResult { matched: 1, modified: 1, upserted: false });
            }
            let mut doc = Value::Object(Default::default());
            let seed = Update::new();
            let seed = filter
                .equality_terms()
                .fold(seed, |u, (path, value)| u.set(path, value.clone()));
            seed.apply(&mut doc);
            update.apply(&mut doc);
            Self::check_duplicate(docs, &doc)?;
            docs.push(doc);
            Ok(UpdateResult { matched: 0, modified: 0, upserted: true })
        })
    }

    async fn delete_one(
        &self,
        ctx: &OpContext,
        collection: &str,
        filter: &Filter,
    ) -> Result<bool, DbError> {
        ctx.ensure_live()?;
        Ok(self.with_collection(collection, |docs| {
            match docs.iter().position(|d| filter.matches(d)) {
                Some(idx) => {
                    docs.remove(idx);
                    true
                }
                None => false,
            }
        }))
    }

    async fn delete_many(
        &self,
        ctx: &OpContext,
        collection: &str,
        filter: &Filter,
    ) -> Result<u64, DbError> {
        ctx.ensure_live()?;
        Ok(self.with_collection(collection, |docs| {
            let before = docs.len();
            docs.retain(|d| !filter.matches(d));
            (before - docs.len()) as u64
        }))
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
