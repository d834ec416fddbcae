// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-test results reported by the agent

use crate::error::ModelError;
use evg_db::{from_document, to_document, Db, Filter, OpContext};
use serde::{Deserialize, Serialize};

pub const COLLECTION: &str = "testresults";

pub const TEST_SUCCEEDED: &str = "pass";
pub const TEST_FAILED: &str = "fail";

/// Outcome of a single test within a task execution
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    #[serde(default)]
    pub task_id: String,
    #[serde(default)]
    pub execution: i64,
    #[serde(default)]
    pub status: String,
    /// Path-like test identifier
    #[serde(default)]
    pub test_file: String,
    /// Log location, either an internal log id or an external URL
    #[serde(default)]
    pub log_id: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub exit_code: i64,
}

impl TestResult {
    pub async fn insert(&self, ctx: &OpContext, db: &Db) -> Result<(), ModelError> {
        db.insert_one(ctx, COLLECTION, to_document(self)?).await?;
        Ok(())
    }
}

pub async fn find(
    ctx: &OpContext,
    db: &Db,
    filter: &Filter,
) -> Result<Vec<TestResult>, ModelError> {
    let docs = db.find(ctx, COLLECTION, filter).await?;
    docs.into_iter()
        .map(|doc| from_document(doc).map_err(ModelError::from))
        .collect()
}
