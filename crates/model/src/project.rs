// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Project references

use crate::error::ModelError;
use evg_db::{from_document, Db, Filter, OpContext};
use serde::{Deserialize, Serialize};

pub const COLLECTION: &str = "projects";

/// A tracked repository a version belongs to
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectRef {
    #[serde(rename = "_id")]
    pub identifier: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub repo: String,
    #[serde(default)]
    pub branch: String,
}

pub async fn find_one_id(
    ctx: &OpContext,
    db: &Db,
    identifier: &str,
) -> Result<Option<ProjectRef>, ModelError> {
    match db.find_one(ctx, COLLECTION, &Filter::by_id(identifier)).await? {
        Some(doc) => Ok(Some(from_document(doc)?)),
        None => Ok(None),
    }
}
