// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Buffered bulk insertion
//!
//! Batches documents and writes them with `insert_many`, flushing when
//! the buffer reaches a count threshold or a timer fires. Notification
//! fan-out uses this; the event log never does (event writes must be
//! durable before the caller proceeds).

use crate::store::{Db, DbError, Document, OpContext};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::error;

/// Flush thresholds
#[derive(Debug, Clone, Copy)]
pub struct BufferedInsertOpts {
    pub count: usize,
    pub interval: Duration,
}

impl Default for BufferedInsertOpts {
    fn default() -> Self {
        Self { count: 50, interval: Duration::from_secs(5) }
    }
}

enum Message {
    Doc(Document),
    Flush(oneshot::Sender<Result<(), DbError>>),
}

/// Handle to a background insertion task
pub struct BufferedInserter {
    tx: mpsc::Sender<Message>,
    handle: JoinHandle<Result<(), DbError>>,
}

impl BufferedInserter {
    pub fn new(db: Db, collection: impl Into<String>, opts: BufferedInsertOpts) -> Self {
        let (tx, rx) = mpsc::channel(opts.count.max(1) * 2);
        let handle = tokio::spawn(run(db, collection.into(), opts, rx));
        Self { tx, handle }
    }

    /// Queue a document for insertion
    pub async fn append(&self, doc: Document) -> Result<(), DbError> {
        self.tx
            .send(Message::Doc(doc))
            .await
            .map_err(|_| DbError::Unavailable("buffered inserter closed".to_string()))
    }

    /// Write out everything buffered so far, surfacing any insertion
    /// error recorded since the previous flush
    pub async fn flush(&self) -> Result<(), DbError> {
        let (reply, result) = oneshot::channel();
        self.tx
            .send(Message::Flush(reply))
            .await
            .map_err(|_| DbError::Unavailable("buffered inserter closed".to_string()))?;
        result
            .await
            .map_err(|_| DbError::Unavailable("buffered inserter closed".to_string()))?
    }

    /// Flush and stop the background task
    pub async fn close(self) -> Result<(), DbError> {
        drop(self.tx);
        self.handle
            .await
            .map_err(|e| DbError::Unavailable(e.to_string()))?
    }
}

async fn run(
    db: Db,
    collection: String,
    opts: BufferedInsertOpts,
    mut rx: mpsc::Receiver<Message>,
) -> Result<(), DbError> {
    let mut buf: Vec<Document> = Vec::with_capacity(opts.count);
    let mut failed: Option<DbError> = None;
    let mut ticker = tokio::time::interval(opts.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick of a tokio interval completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            msg = rx.recv() => match msg {
                Some(Message::Doc(doc)) => {
                    buf.push(doc);
                    if buf.len() >= opts.count {
                        flush(&db, &collection, &mut buf, &mut failed).await;
                    }
                }
                Some(Message::Flush(reply)) => {
                    flush(&db, &collection, &mut buf, &mut failed).await;
                    let _ = reply.send(match failed.take() {
                        Some(err) => Err(err),
                        None => Ok(()),
                    });
                }
                None => {
                    flush(&db, &collection, &mut buf, &mut failed).await;
                    return match failed {
                        Some(err) => Err(err),
                        None => Ok(()),
                    };
                }
            },
            _ = ticker.tick() => {
                flush(&db, &collection, &mut buf, &mut failed).await;
            }
        }
    }
}

/// Write out the buffer. A failed batch is dropped, not retried; the
/// error is held for the next flush/close to report.
async fn flush(db: &Db, collection: &str, buf: &mut Vec<Document>, failed: &mut Option<DbError>) {
    if buf.is_empty() {
        return;
    }
    let docs = std::mem::take(buf);
    let count = docs.len();
    if let Err(err) = db.insert_many(&OpContext::background(), collection, docs).await {
        error!(%err, collection, count, "buffered insert failed");
        *failed = Some(err);
    }
}

#[cfg(test)]
#[path = "buffered_tests.rs"]
mod tests;
