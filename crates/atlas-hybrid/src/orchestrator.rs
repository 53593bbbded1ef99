//! Search sessions: debounce, supersession, pagination and the filter
//! backfill, committed into a watchable [`SearchView`].
//!
//! Every session takes a fresh generation number when it starts. It checks
//! that number after each await and again before committing; a session that
//! is no longer the latest stops without touching any state.

use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use atlas_core::config::{SearchSettings, Settings, TextMode};
use atlas_core::filter::FilterSpec;
use atlas_core::traits::{RowStore, SearchCapabilities, SearchOptions, StatusSink};
use atlas_core::types::{GroupSummary, IdTuple, Point, Predicate, Projection, RowId, SearchResultItem, SearchResultSet};
use atlas_core::Error;

use crate::filtering::{active_filters, apply_filters};
use crate::focus::focus_point;
use crate::group::NeighborGroupAggregator;
use crate::join::RowJoinResolver;
use crate::pagination::{has_more_local, has_more_remote, next_backfill_k, next_limit};
use crate::remote::{UploadFile, UploadNeighbors};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    #[default]
    Idle,
    Searching,
    Settled,
}

/// What subscribers see. Replaced as a whole on every change.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SearchView {
    pub phase: SessionPhase,
    pub generation: u64,
    /// Bumped whenever a result set is committed or cleared.
    pub revision: u64,
    pub results: Option<Arc<SearchResultSet>>,
    /// Length of the visible prefix of `results`.
    pub displayed: usize,
    pub status: Option<String>,
    pub has_more: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SearchRequest {
    Text { query: String, mode: TextMode },
    Neighbors { id: RowId },
    Upload { file: Arc<UploadFile> },
}

impl SearchRequest {
    fn label(&self) -> (String, Option<String>) {
        match self {
            Self::Text { query, .. } => (format!("Search results for \"{query}\""), Some(query.clone())),
            Self::Neighbors { id } => (format!("Nearest neighbors of {id}"), None),
            Self::Upload { file } => (format!("Nearest neighbors of {}", file.name), None),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub search: SearchSettings,
    pub projection: Projection,
    /// Field the groups are keyed by.
    pub group_by: Option<String>,
}

impl OrchestratorSettings {
    pub fn from_settings(settings: &Settings) -> Self {
        Self { search: settings.search.clone(), projection: settings.projection(), group_by: settings.columns.group_by.clone() }
    }

    /// Groups by `column`, adding it to the projection when missing.
    pub fn with_group_by(mut self, column: impl Into<String>) -> Self {
        let column = column.into();
        if !self.projection.fields.iter().any(|f| f.name == column) {
            self.projection = self.projection.with_column(column.clone());
        }
        self.group_by = Some(column);
        self
    }
}

enum SessionError {
    Superseded,
    Unavailable(&'static str),
    Failed(Error),
}

impl From<Error> for SessionError {
    fn from(e: Error) -> Self { Self::Failed(e) }
}

struct Fetched {
    set: SearchResultSet,
    limit: usize,
    fetched: usize,
}

struct LastRequest {
    request: SearchRequest,
    limit: usize,
    fetched: usize,
}

struct Debounce {
    token: u64,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct State {
    phase: SessionPhase,
    revision: u64,
    predicate: Option<Predicate>,
    filters: Vec<FilterSpec>,
    results: Option<Arc<SearchResultSet>>,
    displayed: usize,
    status: Option<String>,
    /// Request of the session still running, if any.
    running: Option<SearchRequest>,
    last: Option<LastRequest>,
    debounce: Option<Debounce>,
    debounce_tokens: u64,
}

impl State {
    fn cancel_debounce(&mut self) {
        if let Some(d) = self.debounce.take() { d.handle.abort(); }
    }

    /// Request to repeat after a filter change: the running one, else the
    /// last committed one.
    fn rerun_request(&self) -> Option<SearchRequest> {
        self.running.clone().or_else(|| self.last.as_ref().map(|l| l.request.clone()))
    }
}

struct Inner {
    capabilities: RwLock<Arc<SearchCapabilities>>,
    upload: RwLock<Option<Arc<dyn UploadNeighbors>>>,
    store: Arc<dyn RowStore>,
    join: RowJoinResolver,
    aggregator: NeighborGroupAggregator,
    settings: SearchSettings,
    generation: AtomicU64,
    state: Mutex<State>,
    view: watch::Sender<SearchView>,
}

/// Drives searches against a [`SearchCapabilities`] record and keeps the
/// latest committed result set. Cheap to clone; clones share one session
/// state.
#[derive(Clone)]
pub struct SearchOrchestrator {
    inner: Arc<Inner>,
}

impl SearchOrchestrator {
    pub fn new(store: Arc<dyn RowStore>, capabilities: SearchCapabilities, settings: OrchestratorSettings) -> Self {
        let (view, _) = watch::channel(SearchView::default());
        let aggregator = NeighborGroupAggregator::new(settings.group_by.clone(), settings.search.unknown_group_label.clone());
        Self {
            inner: Arc::new(Inner {
                capabilities: RwLock::new(Arc::new(capabilities)),
                upload: RwLock::new(None),
                join: RowJoinResolver::new(store.clone(), settings.projection),
                store,
                aggregator,
                settings: settings.search,
                generation: AtomicU64::new(0),
                state: Mutex::new(State::default()),
                view,
            }),
        }
    }

    pub fn set_upload(&self, upload: Option<Arc<dyn UploadNeighbors>>) { *self.inner.upload.write() = upload; }

    /// Swaps the capability record and drops the current results.
    pub fn reconfigure(&self, capabilities: SearchCapabilities) {
        *self.inner.capabilities.write() = Arc::new(capabilities);
        self.clear();
    }

    pub fn capabilities(&self) -> Arc<SearchCapabilities> { self.inner.capabilities.read().clone() }

    pub fn subscribe(&self) -> watch::Receiver<SearchView> { self.inner.view.subscribe() }

    pub fn view(&self) -> SearchView { self.inner.view.borrow().clone() }

    pub fn predicate(&self) -> Option<Predicate> { self.inner.state.lock().predicate.clone() }

    pub fn filters(&self) -> Vec<FilterSpec> { self.inner.state.lock().filters.clone() }

    /// Schedules a text search after the debounce delay; a newer call
    /// replaces a pending one. An empty query clears the results right away.
    /// Has no effect outside a tokio runtime.
    pub fn set_query(&self, query: &str) {
        let query = query.trim().to_string();
        if query.is_empty() {
            self.clear();
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("set_query called outside a tokio runtime");
            return;
        };
        let inner = self.inner.clone();
        let delay = inner.settings.debounce();
        let mut state = self.inner.state.lock();
        state.cancel_debounce();
        state.debounce_tokens += 1;
        let token = state.debounce_tokens;
        let handle = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            {
                let mut state = inner.state.lock();
                if state.debounce.as_ref().map(|d| d.token) != Some(token) { return; }
                state.debounce = None;
            }
            let mode = inner.settings.text_mode;
            inner.start(SearchRequest::Text { query, mode }).await;
        });
        state.debounce = Some(Debounce { token, handle });
    }

    /// Text search in the configured mode, without waiting for the debounce.
    pub async fn search_text_now(&self, query: &str) {
        let mode = self.inner.settings.text_mode;
        self.search_text_with(query, mode).await;
    }

    pub async fn search_vector(&self, query: &str) { self.search_text_with(query, TextMode::Vector).await; }

    async fn search_text_with(&self, query: &str, mode: TextMode) {
        let query = query.trim();
        if query.is_empty() {
            self.clear();
            return;
        }
        self.inner.state.lock().cancel_debounce();
        self.inner.start(SearchRequest::Text { query: query.to_string(), mode }).await;
    }

    pub async fn find_neighbors(&self, id: RowId) {
        self.inner.state.lock().cancel_debounce();
        self.inner.start(SearchRequest::Neighbors { id }).await;
    }

    pub async fn submit_upload(&self, file: UploadFile) {
        self.inner.state.lock().cancel_debounce();
        self.inner.start(SearchRequest::Upload { file: Arc::new(file) }).await;
    }

    /// Shows the next page: first from rows already fetched, then by asking
    /// the backend for a larger limit.
    pub async fn load_more(&self) {
        let page = self.inner.settings.page_size;
        let (request, limit, displayed) = {
            let mut state = self.inner.state.lock();
            let Some(available) = state.results.as_ref().map(|r| r.items.len()) else { return };
            if has_more_local(available, state.displayed) {
                state.displayed = (state.displayed + page).min(available);
                self.inner.publish(&state);
                return;
            }
            let Some(last) = &state.last else { return };
            if !has_more_remote(last.fetched, last.limit, self.inner.settings.paged_ceiling) { return; }
            (last.request.clone(), next_limit(last.limit, page, self.inner.settings.paged_ceiling), state.displayed + page)
        };
        self.inner.run(request, limit, displayed).await;
    }

    /// Sets the row filter and re-runs the last request against it.
    pub async fn set_predicate(&self, raw: &str) {
        let predicate = Predicate::canonicalize(raw);
        let rerun = {
            let mut state = self.inner.state.lock();
            if state.predicate == predicate { return; }
            state.predicate = predicate;
            state.rerun_request()
        };
        if let Some(request) = rerun { self.inner.start(request).await; }
    }

    /// Replaces the metadata filters and re-runs the last request.
    pub async fn set_filters(&self, filters: Vec<FilterSpec>) {
        let rerun = {
            let mut state = self.inner.state.lock();
            if state.filters == filters { return; }
            state.filters = filters;
            state.rerun_request()
        };
        if let Some(request) = rerun { self.inner.start(request).await; }
    }

    /// Drops the results and abandons any running or pending session.
    pub fn clear(&self) {
        let mut state = self.inner.state.lock();
        state.cancel_debounce();
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        state.results = None;
        state.displayed = 0;
        state.running = None;
        state.last = None;
        state.status = None;
        state.phase = SessionPhase::Idle;
        state.revision += 1;
        self.inner.publish(&state);
    }

    pub fn visible_items(&self) -> Vec<SearchResultItem> {
        let state = self.inner.state.lock();
        state.results.as_ref().map(|r| r.items.iter().take(state.displayed).cloned().collect()).unwrap_or_default()
    }

    pub fn groups(&self) -> Vec<GroupSummary> { self.inner.aggregator.aggregate(&self.visible_items()) }

    pub fn focus_point(&self) -> Option<Point> { focus_point(&self.visible_items()) }
}

impl Inner {
    fn is_current(&self, generation: u64) -> bool { self.generation.load(Ordering::SeqCst) == generation }

    fn check(&self, generation: u64) -> Result<(), SessionError> {
        if self.is_current(generation) { Ok(()) } else { Err(SessionError::Superseded) }
    }

    fn publish(&self, state: &State) {
        let available = state.results.as_ref().map_or(0, |r| r.items.len());
        let remote = state.last.as_ref().is_some_and(|l| has_more_remote(l.fetched, l.limit, self.settings.paged_ceiling));
        self.view.send_replace(SearchView {
            phase: state.phase,
            generation: self.generation.load(Ordering::SeqCst),
            revision: state.revision,
            results: state.results.clone(),
            displayed: state.displayed,
            status: state.status.clone(),
            has_more: state.results.is_some() && (has_more_local(available, state.displayed) || remote),
        });
    }

    fn status_sink(self: &Arc<Self>, generation: u64) -> StatusSink {
        let weak: Weak<Self> = Arc::downgrade(self);
        Arc::new(move |text: Option<String>| {
            let Some(inner) = weak.upgrade() else { return };
            let mut state = inner.state.lock();
            if inner.is_current(generation) {
                state.status = text;
                inner.publish(&state);
            }
        })
    }

    fn initial_limit(&self, request: &SearchRequest) -> usize {
        match request {
            SearchRequest::Text { .. } => self.settings.text_limit,
            SearchRequest::Neighbors { .. } | SearchRequest::Upload { .. } => self.settings.neighbor_k,
        }
    }

    async fn start(self: &Arc<Self>, request: SearchRequest) {
        let limit = self.initial_limit(&request);
        self.run(request, limit, self.settings.page_size).await;
    }

    async fn run(self: &Arc<Self>, request: SearchRequest, limit: usize, displayed: usize) {
        let (generation, predicate, filters) = {
            let mut state = self.state.lock();
            let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            state.phase = SessionPhase::Searching;
            state.status = None;
            state.running = Some(request.clone());
            self.publish(&state);
            (generation, state.predicate.clone(), active_filters(&state.filters))
        };
        debug!(generation, ?request, limit, "search session started");

        let outcome = self.execute(&request, limit, predicate.as_ref(), &filters, generation).await;

        let mut state = self.state.lock();
        if !self.is_current(generation) {
            debug!(generation, "search session superseded");
            return;
        }
        state.running = None;
        match outcome {
            Ok(fetched) => {
                debug!(generation, items = fetched.set.items.len(), limit = fetched.limit, "search session settled");
                state.displayed = displayed.min(fetched.set.items.len());
                state.results = Some(Arc::new(fetched.set));
                state.last = Some(LastRequest { request, limit: fetched.limit, fetched: fetched.fetched });
                state.status = None;
            }
            Err(SessionError::Superseded) => {
                debug!(generation, "search session superseded");
                return;
            }
            Err(SessionError::Unavailable(what)) => {
                let (label, highlight) = request.label();
                state.results = Some(Arc::new(SearchResultSet { highlight, ..SearchResultSet::empty(label) }));
                state.displayed = 0;
                state.last = None;
                state.status = Some(what.to_string());
            }
            Err(SessionError::Failed(e)) => {
                warn!(generation, error = %e, "search session failed");
                let (label, highlight) = request.label();
                state.results = Some(Arc::new(SearchResultSet { highlight, ..SearchResultSet::empty(label) }));
                state.displayed = 0;
                state.last = None;
                state.status = Some(format!("Search failed: {e}"));
            }
        }
        state.phase = SessionPhase::Settled;
        state.revision += 1;
        self.publish(&state);
    }

    async fn fetch(&self, request: &SearchRequest, opts: &SearchOptions) -> Result<(Vec<IdTuple>, Option<Point>), SessionError> {
        let caps = self.capabilities.read().clone();
        match request {
            SearchRequest::Text { query, mode } => match (*mode, caps.full_text.clone(), caps.vector.clone()) {
                (TextMode::FullText, Some(text), _) | (TextMode::Vector, Some(text), None) => {
                    Ok((text.full_text_search(query, opts).await?, None))
                }
                (TextMode::Vector, _, Some(vector)) | (TextMode::FullText, None, Some(vector)) => {
                    Ok((vector.vector_search(query, opts).await?, None))
                }
                _ => Err(SessionError::Unavailable("Text search is not available for this dataset")),
            },
            SearchRequest::Neighbors { id } => match caps.neighbors.clone() {
                Some(nn) => Ok((nn.nearest_neighbors(id, opts).await?, None)),
                None => Err(SessionError::Unavailable("Nearest-neighbor search is not available for this dataset")),
            },
            SearchRequest::Upload { file } => {
                let upload = self.upload.read().clone();
                match upload {
                    Some(upload) => {
                        let list = upload.upload_neighbors(file, opts).await?;
                        Ok((list.neighbors, list.query_point))
                    }
                    None => Err(SessionError::Unavailable("Upload search is not configured")),
                }
            }
        }
    }

    /// Fetches candidates, growing `k` while active filters leave fewer
    /// than `limit` of them, then joins the survivors to their rows.
    async fn execute(
        self: &Arc<Self>,
        request: &SearchRequest,
        limit: usize,
        predicate: Option<&Predicate>,
        filters: &[FilterSpec],
        generation: u64,
    ) -> Result<Fetched, SessionError> {
        let status = self.status_sink(generation);
        let dataset = &self.join.projection().dataset;
        let mut k = limit;
        let (tuples, fetched, query_point) = loop {
            let opts = SearchOptions::new(k).with_predicate(predicate.cloned()).with_status(status.clone());
            let (raw, query_point) = self.fetch(request, &opts).await?;
            self.check(generation)?;
            let fetched = raw.len();
            if filters.is_empty() { break (raw, fetched, query_point); }

            let kept = apply_filters(&self.store, dataset, raw, filters).await?;
            self.check(generation)?;
            if kept.len() >= limit { break (kept, fetched, query_point); }
            match next_backfill_k(k, limit, self.settings.backfill_ceiling, fetched) {
                Some(next) => {
                    debug!(generation, kept = kept.len(), wanted = limit, next, "growing filtered fetch");
                    k = next;
                }
                None => break (kept, fetched, query_point),
            }
        };

        let items = self.join.resolve(&tuples, predicate).await?;
        self.check(generation)?;
        let (label, highlight) = request.label();
        Ok(Fetched { set: SearchResultSet { label, highlight, items, query_point }, limit: k, fetched })
    }
}
