// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Host documents, as far as the core needs them
//!
//! Provisioning and teardown belong to the cloud layer; the core only
//! reads hosts to resolve events and render links.

use crate::error::ModelError;
use evg_db::{from_document, Db, Filter, OpContext};
use serde::{Deserialize, Serialize};

pub const COLLECTION: &str = "hosts";

pub const HOST_RUNNING: &str = "running";
pub const HOST_EXPIRED: &str = "expired";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Host {
    #[serde(rename = "_id")]
    pub id: String,
    /// DNS name the agent reports in on
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub started_by: String,
    #[serde(default)]
    pub running_task: String,
}

pub async fn find_one_id(
    ctx: &OpContext,
    db: &Db,
    id: &str,
) -> Result<Option<Host>, ModelError> {
    match db.find_one(ctx, COLLECTION, &Filter::by_id(id)).await? {
        Some(doc) => Ok(Some(from_document(doc)?)),
        None => Ok(None),
    }
}
