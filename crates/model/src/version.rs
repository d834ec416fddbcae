// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Versions: one revision of a project

use crate::error::ModelError;
use evg_db::{from_document, Db, Filter, OpContext};
use serde::{Deserialize, Serialize};

pub const COLLECTION: &str = "versions";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Version {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub identifier: String,
    #[serde(default)]
    pub revision: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub branch: String,
}

pub async fn find_one_id(
    ctx: &OpContext,
    db: &Db,
    id: &str,
) -> Result<Option<Version>, ModelError> {
    match db.find_one(ctx, COLLECTION, &Filter::by_id(id)).await? {
        Some(doc) => Ok(Some(from_document(doc)?)),
        None => Ok(None),
    }
}
