use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use atlas_core::traits::{FullTextSearch, RowStore, SearchOptions};
use atlas_core::types::{coerce_text, DatasetRef, IdTuple, Predicate, RowId};
use atlas_core::{Error, Result};

use crate::worker::{Command, Reply, WorkerClient};

const PUSH_BATCH: usize = 4096;

/// Which filter the worker index currently reflects.
#[derive(Debug, Clone, PartialEq)]
struct IndexSnapshot {
    predicate: Option<Predicate>,
    rows: usize,
}

/// Keeps an in-memory full-text index in sync with the rows that match the
/// active filter, rebuilding it only when the filter changes.
///
/// Builds and queries are serialized by one async lock, so a query always
/// runs against the index built for its own filter.
pub struct TextIndexManager {
    store: Arc<dyn RowStore>,
    dataset: DatasetRef,
    text_columns: Vec<String>,
    worker: WorkerClient,
    snapshot: Mutex<Option<IndexSnapshot>>,
    rebuilds: AtomicUsize,
}

impl TextIndexManager {
    /// Must be called from inside a tokio runtime; the index worker starts
    /// immediately but stays empty until the first query.
    pub fn new(store: Arc<dyn RowStore>, dataset: DatasetRef, text_columns: &[String]) -> Result<Self> {
        let mut columns: Vec<String> = Vec::new();
        for c in text_columns.iter().map(|c| c.trim()).filter(|c| !c.is_empty()) {
            if !columns.iter().any(|seen| seen == c) { columns.push(c.to_string()); }
        }
        if columns.is_empty() { return Err(Error::InvalidConfig("full-text search needs at least one text column".into())); }
        Ok(Self {
            store,
            dataset,
            text_columns: columns,
            worker: WorkerClient::spawn()?,
            snapshot: Mutex::new(None),
            rebuilds: AtomicUsize::new(0),
        })
    }

    pub fn text_columns(&self) -> &[String] { &self.text_columns }

    /// Number of completed index builds.
    pub fn rebuild_count(&self) -> usize { self.rebuilds.load(Ordering::SeqCst) }

    /// Rows in the current snapshot, `None` when no valid snapshot exists.
    pub async fn indexed_rows(&self) -> Option<usize> { self.snapshot.lock().await.as_ref().map(|s| s.rows) }

    /// Forgets the current snapshot; the next query rebuilds.
    pub async fn invalidate(&self) { *self.snapshot.lock().await = None; }

    pub async fn build_index_if_needed(&self, predicate: Option<&Predicate>) -> Result<()> {
        let mut slot = self.snapshot.lock().await;
        self.ensure_built(&mut slot, predicate).await
    }

    /// Ids of matching rows, best first, among rows passing `predicate`.
    pub async fn query(&self, text: &str, limit: usize, predicate: Option<&Predicate>) -> Result<Vec<RowId>> {
        let mut slot = self.snapshot.lock().await;
        self.ensure_built(&mut slot, predicate).await?;
        match self.worker.call(Command::Query { text: text.to_string(), limit }).await? {
            Reply::Matches(ids) => Ok(ids),
            Reply::Failed(msg) => Err(Error::Query(msg)),
            other => Err(Error::Query(format!("unexpected index reply {other:?}"))),
        }
    }

    async fn ensure_built(&self, slot: &mut Option<IndexSnapshot>, predicate: Option<&Predicate>) -> Result<()> {
        if slot.as_ref().is_some_and(|s| s.predicate.as_ref() == predicate) {
            debug!(predicate = ?predicate.map(Predicate::as_str), "text index cache hit");
            return Ok(());
        }
        let started = Instant::now();
        let rows = self.store.scan_rows(&self.dataset, &self.text_columns, predicate).await?;

        // From here on the worker index no longer matches the old tag.
        *slot = None;
        let points: Vec<(RowId, String)> = rows
            .into_iter()
            .map(|row| {
                let text = coerce_text(self.text_columns.iter().map(|c| row.values.get(c).unwrap_or(&serde_json::Value::Null)));
                (row.id, text)
            })
            .filter(|(_, text)| !text.trim().is_empty())
            .collect();

        expect_reply(self.worker.call(Command::Clear).await?, |r| matches!(r, Reply::Cleared))?;
        let mut remaining = points;
        while !remaining.is_empty() {
            let rest = remaining.split_off(remaining.len().min(PUSH_BATCH));
            expect_reply(self.worker.call(Command::Points(remaining)).await?, |r| matches!(r, Reply::Added(_)))?;
            remaining = rest;
        }
        let indexed = match self.worker.call(Command::Commit).await? {
            Reply::Committed(n) => n,
            other => {
                warn!(reply = ?other, "text index commit failed");
                return Err(reply_error(other));
            }
        };

        *slot = Some(IndexSnapshot { predicate: predicate.cloned(), rows: indexed });
        let n = self.rebuilds.fetch_add(1, Ordering::SeqCst) + 1;
        info!(
            rows = indexed,
            rebuild = n,
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            predicate = ?predicate.map(Predicate::as_str),
            "text index rebuilt"
        );
        Ok(())
    }
}

fn expect_reply(reply: Reply, ok: impl Fn(&Reply) -> bool) -> Result<()> {
    if ok(&reply) { Ok(()) } else { Err(reply_error(reply)) }
}

fn reply_error(reply: Reply) -> Error {
    match reply {
        Reply::Failed(msg) => Error::IndexBuild(msg),
        other => Error::IndexBuild(format!("unexpected index reply {other:?}")),
    }
}

#[async_trait]
impl FullTextSearch for TextIndexManager {
    async fn full_text_search(&self, query: &str, opts: &SearchOptions) -> Result<Vec<IdTuple>> {
        if query.trim().is_empty() { return Ok(Vec::new()); }
        let ids = self.query(query, opts.limit, opts.predicate.as_ref()).await?;
        Ok(ids.into_iter().map(IdTuple::unscored).collect())
    }
}
