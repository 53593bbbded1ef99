//! Background thread owning the tantivy index.
//!
//! Callers never touch the index directly: they send an [`IndexRequest`]
//! carrying a fresh identifier and await the [`IndexResponse`] with the same
//! identifier. The dispatcher task in [`WorkerClient`] routes each response to
//! the one caller waiting on it.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use tantivy::collector::TopDocs;
use tantivy::query::{BooleanQuery, BoostQuery, FuzzyTermQuery, Occur, Query, TermQuery};
use tantivy::schema::{IndexRecordOption, Value};
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, Term};
use tokio::sync::{mpsc as tokio_mpsc, oneshot};
use tracing::{debug, warn};

use atlas_core::types::RowId;
use atlas_core::{Error, Result};

use crate::tantivy_utils::{analyze, build_schema, register_tokenizer, RowFields};

const WRITER_HEAP_BYTES: usize = 15_000_000;
const EXACT_TERM_BOOST: f32 = 2.0;

#[derive(Debug)]
pub enum Command {
    /// Drop every indexed row.
    Clear,
    /// Add rows; not searchable until the next [`Command::Commit`].
    Points(Vec<(RowId, String)>),
    Commit,
    Query { text: String, limit: usize },
}

#[derive(Debug)]
pub struct IndexRequest {
    pub identifier: u64,
    pub command: Command,
}

#[derive(Debug, PartialEq)]
pub enum Reply {
    Cleared,
    Added(usize),
    Committed(usize),
    Matches(Vec<RowId>),
    Failed(String),
}

#[derive(Debug)]
pub struct IndexResponse {
    pub identifier: u64,
    pub reply: Reply,
}

struct IndexWorker {
    index: Index,
    writer: IndexWriter,
    reader: IndexReader,
    fields: RowFields,
    rows: Vec<RowId>,
}

impl IndexWorker {
    fn open() -> tantivy::Result<Self> {
        let (schema, fields) = build_schema();
        let index = Index::create_in_ram(schema);
        register_tokenizer(&index);
        let writer = index.writer_with_num_threads(1, WRITER_HEAP_BYTES)?;
        let reader = index.reader_builder().reload_policy(ReloadPolicy::Manual).try_into()?;
        Ok(Self { index, writer, reader, fields, rows: Vec::new() })
    }

    fn handle(&mut self, command: Command) -> tantivy::Result<Reply> {
        match command {
            Command::Clear => {
                self.writer.delete_all_documents()?;
                self.writer.commit()?;
                self.reader.reload()?;
                self.rows.clear();
                Ok(Reply::Cleared)
            }
            Command::Points(points) => {
                let n = points.len();
                for (id, text) in points {
                    let row = self.rows.len() as u64;
                    self.rows.push(id);
                    self.writer.add_document(doc!(self.fields.text => text, self.fields.row => row))?;
                }
                Ok(Reply::Added(n))
            }
            Command::Commit => {
                self.writer.commit()?;
                self.reader.reload()?;
                Ok(Reply::Committed(self.rows.len()))
            }
            Command::Query { text, limit } => self.query(&text, limit).map(Reply::Matches),
        }
    }

    /// Every query term has to prefix-match a term of the row; rows holding
    /// the exact term rank above rows that only share the prefix.
    fn query(&self, text: &str, limit: usize) -> tantivy::Result<Vec<RowId>> {
        let terms = analyze(&self.index, self.fields.text, text)?;
        if terms.is_empty() || limit == 0 { return Ok(Vec::new()); }
        let clauses: Vec<(Occur, Box<dyn Query>)> = terms
            .iter()
            .map(|t| {
                let term = Term::from_field_text(self.fields.text, t);
                let exact: Box<dyn Query> = Box::new(BoostQuery::new(
                    Box::new(TermQuery::new(term.clone(), IndexRecordOption::WithFreqs)),
                    EXACT_TERM_BOOST,
                ));
                let prefix: Box<dyn Query> = Box::new(FuzzyTermQuery::new_prefix(term, 0, true));
                let either: Box<dyn Query> = Box::new(BooleanQuery::new(vec![(Occur::Should, exact), (Occur::Should, prefix)]));
                (Occur::Must, either)
            })
            .collect();
        let query = BooleanQuery::new(clauses);
        let searcher = self.reader.searcher();
        let top_docs = searcher.search(&query, &TopDocs::with_limit(limit))?;
        let mut ids = Vec::with_capacity(top_docs.len());
        for (_score, addr) in top_docs {
            let doc: TantivyDocument = searcher.doc(addr)?;
            let row = doc.get_first(self.fields.row).and_then(|v| v.as_u64());
            if let Some(id) = row.and_then(|r| usize::try_from(r).ok()).and_then(|r| self.rows.get(r)) {
                ids.push(id.clone());
            }
        }
        Ok(ids)
    }

    fn run(mut self, requests: mpsc::Receiver<IndexRequest>, responses: tokio_mpsc::UnboundedSender<IndexResponse>) {
        while let Ok(IndexRequest { identifier, command }) = requests.recv() {
            let reply = self.handle(command).unwrap_or_else(|e| {
                warn!(identifier, error = %e, "index worker request failed");
                Reply::Failed(e.to_string())
            });
            if responses.send(IndexResponse { identifier, reply }).is_err() { break; }
        }
        debug!("index worker stopped");
    }
}

type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<Reply>>>>;

/// Handle to the worker thread. Dropping it stops the worker.
pub struct WorkerClient {
    requests: mpsc::Sender<IndexRequest>,
    pending: Pending,
    next_identifier: AtomicU64,
}

impl WorkerClient {
    /// Starts the worker thread and its dispatcher. Must be called from inside
    /// a tokio runtime.
    pub fn spawn() -> Result<Self> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| Error::Operation(format!("text index needs a tokio runtime: {e}")))?;
        let worker = IndexWorker::open().map_err(Error::index_build)?;
        let (request_tx, request_rx) = mpsc::channel::<IndexRequest>();
        let (response_tx, mut response_rx) = tokio_mpsc::unbounded_channel::<IndexResponse>();
        thread::Builder::new()
            .name("atlas-text-index".to_string())
            .spawn(move || worker.run(request_rx, response_tx))
            .map_err(|e| Error::Operation(format!("failed to start index worker: {e}")))?;

        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let routes = pending.clone();
        runtime.spawn(async move {
            while let Some(IndexResponse { identifier, reply }) = response_rx.recv().await {
                match routes.lock().remove(&identifier) {
                    // a dropped receiver means the caller gave up; nothing to do
                    Some(tx) => { let _ = tx.send(reply); }
                    None => warn!(identifier, "index response without a pending request"),
                }
            }
            routes.lock().clear();
        });

        Ok(Self { requests: request_tx, pending, next_identifier: AtomicU64::new(1) })
    }

    pub async fn call(&self, command: Command) -> Result<Reply> {
        let identifier = self.next_identifier.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(identifier, tx);
        if self.requests.send(IndexRequest { identifier, command }).is_err() {
            self.pending.lock().remove(&identifier);
            return Err(Error::WorkerClosed);
        }
        rx.await.map_err(|_| Error::WorkerClosed)
    }

    pub fn pending_requests(&self) -> usize { self.pending.lock().len() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn concurrent_calls_get_their_own_reply() {
        let client = Arc::new(WorkerClient::spawn().expect("spawn"));
        let rows = vec![
            (RowId::Int(1), "red rash".to_string()),
            (RowId::Int(2), "blue bruise".to_string()),
            (RowId::Int(3), "green graze".to_string()),
        ];
        assert_eq!(client.call(Command::Points(rows)).await.expect("points"), Reply::Added(3));
        assert_eq!(client.call(Command::Commit).await.expect("commit"), Reply::Committed(3));

        let queries = [("rash", 1), ("bruise", 2), ("graze", 3)];
        let handles: Vec<_> = (0..30)
            .map(|i| {
                let client = client.clone();
                let (text, expected) = queries[i % 3];
                tokio::spawn(async move {
                    let reply = client.call(Command::Query { text: text.to_string(), limit: 5 }).await.expect("query");
                    assert_eq!(reply, Reply::Matches(vec![RowId::Int(expected)]));
                })
            })
            .collect();
        for h in handles { h.await.expect("join"); }
        assert_eq!(client.pending_requests(), 0);
    }

    #[tokio::test]
    async fn exact_terms_rank_before_prefix_matches() {
        let client = WorkerClient::spawn().expect("spawn");
        let rows = vec![(RowId::Int(1), "rashes everywhere".to_string()), (RowId::Int(2), "a rash".to_string())];
        client.call(Command::Points(rows)).await.expect("points");
        client.call(Command::Commit).await.expect("commit");
        let reply = client.call(Command::Query { text: "Rash".to_string(), limit: 10 }).await.expect("query");
        assert_eq!(reply, Reply::Matches(vec![RowId::Int(2), RowId::Int(1)]));

        let reply = client.call(Command::Query { text: "the".to_string(), limit: 10 }).await.expect("query");
        assert_eq!(reply, Reply::Matches(Vec::new()));
    }

    #[tokio::test]
    async fn clear_empties_the_index() {
        let client = WorkerClient::spawn().expect("spawn");
        client.call(Command::Points(vec![(RowId::Int(1), "itch".to_string())])).await.expect("points");
        client.call(Command::Commit).await.expect("commit");
        assert_eq!(client.call(Command::Clear).await.expect("clear"), Reply::Cleared);
        let reply = client.call(Command::Query { text: "itch".to_string(), limit: 10 }).await.expect("query");
        assert_eq!(reply, Reply::Matches(Vec::new()));
    }
}
