use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

use trellis_proto::{
    ErrorPayload, MessageKind, PanelRole, QueryPayload, RawResult, RawRow,
};
use trellis_transport::{RouteGuard, SharedTransport, Transport};
use trellis_tree::{TreeArena, TreeBuilder};

use crate::error::LoadError;
use crate::events::{EventRegistry, EventSubscription, LoadEvent, Notification, NotificationHandler};
use crate::pagination::{PageSink, PageWindow};

/// Lifecycle of one logical query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadPhase {
    Idle,
    Loading,
    Applied,
    Failed,
}

/// Final disposition of one `load` call. `load` never returns an error;
/// failure details travel on the `error` notification channel and
/// cancellation resolves quietly.
#[derive(Debug, Clone)]
pub enum LoadOutcome {
    Applied(Arc<RawResult>),
    /// The new payload differed only in presentation fields; no query
    /// was resubmitted.
    FormattingOnly,
    Cancelled,
    Failed,
}

struct ServiceState {
    phase: LoadPhase,
    last_payload: Option<QueryPayload>,
    applied: bool,
    total_items: usize,
    row_tree: Option<Arc<TreeArena>>,
    column_tree: Option<Arc<TreeArena>>,
    active_query: Option<String>,
}

impl Default for ServiceState {
    fn default() -> Self {
        ServiceState {
            phase: LoadPhase::Idle,
            last_payload: None,
            applied: false,
            total_items: 0,
            row_tree: None,
            column_tree: None,
            active_query: None,
        }
    }
}

struct ServiceInner {
    transport: SharedTransport,
    events: EventRegistry,
    state: Mutex<ServiceState>,
    /// Tag of the current load cycle. Responses carrying an older tag
    /// are dropped silently; bumping it is what makes `cancel_query` and
    /// `clear` safe against late responses.
    generation: AtomicU64,
    invalidate_tx: watch::Sender<u64>,
    /// Serializes tree builds and pagination merges so nothing reads a
    /// tree mid-mutation. A competing build waits here.
    build_guard: tokio::sync::Mutex<()>,
}

/// Orchestrates one logical query's lifecycle on top of a shared
/// transport: submit, cancel, clear, incremental pages. Exactly one
/// logical query is in flight per instance; the transport is shared and
/// multiplexes instances by query id.
#[derive(Clone)]
pub struct DataLoadService {
    inner: Arc<ServiceInner>,
}

impl DataLoadService {
    pub fn new(transport: SharedTransport) -> Self {
        let (invalidate_tx, _) = watch::channel(0);
        DataLoadService {
            inner: Arc::new(ServiceInner {
                transport,
                events: EventRegistry::new(),
                state: Mutex::new(ServiceState::default()),
                generation: AtomicU64::new(0),
                invalidate_tx,
                build_guard: tokio::sync::Mutex::new(()),
            }),
        }
    }

    pub fn subscribe(&self, event: LoadEvent, handler: NotificationHandler) -> EventSubscription {
        self.inner.events.subscribe(event, handler)
    }

    /// Last known server row count; 0 before any successful load.
    pub fn total_items_count(&self) -> usize {
        self.inner.state.lock().total_items
    }

    /// True exactly while no payload has been applied (the degenerate
    /// empty state).
    pub fn is_single_row_tree(&self) -> bool {
        !self.inner.state.lock().applied
    }

    pub fn phase(&self) -> LoadPhase {
        self.inner.state.lock().phase
    }

    pub fn row_tree(&self) -> Option<Arc<TreeArena>> {
        self.inner.state.lock().row_tree.clone()
    }

    pub fn column_tree(&self) -> Option<Arc<TreeArena>> {
        self.inner.state.lock().column_tree.clone()
    }

    /// Submits a payload. A payload differing from the previous one only
    /// in presentation fields (format/width/color) skips resubmission and
    /// instead notifies the formatting channels locally.
    pub async fn load(&self, payload: QueryPayload) -> LoadOutcome {
        let formatting_only = {
            let mut state = self.inner.state.lock();
            let skip = state.applied
                && state
                    .last_payload
                    .as_ref()
                    .is_some_and(|prev| formatting_only_change(prev, &payload));
            if skip {
                let overrides = state
                    .last_payload
                    .as_ref()
                    .map(|prev| changed_formats(prev, &payload))
                    .unwrap_or_default();
                state.last_payload = Some(payload.clone());
                Some(overrides)
            } else {
                None
            }
        };

        if let Some(overrides) = formatting_only {
            for format in overrides {
                self.inner.events.emit(&Notification::CellFormatting(format));
            }
            self.inner
                .events
                .emit(&Notification::FormattingChanged(Arc::new(payload)));
            return LoadOutcome::FormattingOnly;
        }

        self.submit(payload).await
    }

    /// Aborts the in-flight load, if any. Resolves once cancellation is
    /// acknowledged locally; never surfaces as an error to listeners.
    pub async fn cancel_query(&self) {
        let generation = self.invalidate();
        self.inner.state.lock().phase = LoadPhase::Idle;
        tracing::debug!(generation, "query canceled");
    }

    /// Discards all loaded state and returns to `Idle`, invalidating any
    /// in-flight load. Emits nothing; calling it twice is the same as
    /// calling it once.
    pub fn clear(&self) {
        self.invalidate();
        let mut state = self.inner.state.lock();
        state.phase = LoadPhase::Idle;
        state.applied = false;
        state.total_items = 0;
        state.row_tree = None;
        state.column_tree = None;
        state.last_payload = None;
    }

    fn invalidate(&self) -> u64 {
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let active = self.inner.state.lock().active_query.take();
        if let Some(query_id) = active {
            self.inner.transport.cancel(&query_id);
        }
        let _ = self.inner.invalidate_tx.send(generation);
        generation
    }

    fn stale(&self, generation: u64) -> bool {
        generation != self.inner.generation.load(Ordering::SeqCst)
    }

    async fn submit(&self, payload: QueryPayload) -> LoadOutcome {
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let query_id = Uuid::new_v4().to_string();
        {
            let mut state = self.inner.state.lock();
            state.phase = LoadPhase::Loading;
            state.active_query = Some(query_id.clone());
            state.last_payload = Some(payload.clone());
        }

        let mut invalidated = self.inner.invalidate_tx.subscribe();
        let (frames_tx, mut frames) = mpsc::unbounded_channel();
        let _routes = register_routes(self.inner.transport.as_ref(), &query_id, frames_tx);

        if let Err(err) = self.inner.transport.send(&query_id, &payload).await {
            self.fail(generation, LoadError::Connection(err));
            return LoadOutcome::Failed;
        }
        tracing::debug!(%query_id, generation, "query submitted");

        loop {
            if self.stale(generation) {
                tracing::debug!(%query_id, "load superseded");
                return LoadOutcome::Cancelled;
            }
            tokio::select! {
                frame = frames.recv() => {
                    let Some((kind, body)) = frame else {
                        return LoadOutcome::Cancelled;
                    };
                    if self.stale(generation) {
                        tracing::debug!(%query_id, "dropping stale response");
                        return LoadOutcome::Cancelled;
                    }
                    match kind {
                        MessageKind::Progress => {
                            self.inner.events.emit(&Notification::Progress(body));
                        }
                        MessageKind::Error => {
                            let error: ErrorPayload =
                                serde_json::from_value(body).unwrap_or_default();
                            self.fail(
                                generation,
                                LoadError::Query {
                                    status: error.status,
                                    message: error
                                        .message
                                        .unwrap_or_else(|| "query failed".to_owned()),
                                },
                            );
                            return LoadOutcome::Failed;
                        }
                        MessageKind::Data => {
                            return self.apply(generation, &payload, body).await;
                        }
                    }
                }
                _ = invalidated.changed() => {}
            }
        }
    }

    async fn apply(&self, generation: u64, payload: &QueryPayload, body: Value) -> LoadOutcome {
        let _build = self.inner.build_guard.lock().await;
        if self.stale(generation) {
            return LoadOutcome::Cancelled;
        }

        let raw: RawResult = match serde_json::from_value(body) {
            Ok(raw) => raw,
            Err(err) => {
                self.fail(generation, LoadError::MalformedResponse(err.to_string()));
                return LoadOutcome::Failed;
            }
        };

        // The data frame may echo the panels; fall back to the submitted
        // payload's panels when it does not.
        let panels = if raw.metadata_panels.is_empty() {
            &payload.metadata_panels
        } else {
            &raw.metadata_panels
        };
        let row_tree = TreeBuilder::for_axis(panels, PanelRole::Rows).build(&raw.rows);
        let column_tree = TreeBuilder::for_axis(panels, PanelRole::Columns).build(&raw.rows);

        let raw = Arc::new(raw);
        {
            let mut state = self.inner.state.lock();
            if self.stale(generation) {
                return LoadOutcome::Cancelled;
            }
            state.phase = LoadPhase::Applied;
            state.applied = true;
            state.total_items = raw.total_items_count;
            state.row_tree = Some(Arc::new(row_tree));
            state.column_tree = Some(Arc::new(column_tree));
            state.active_query = None;
        }
        self.inner.events.emit(&Notification::Data(raw.clone()));
        LoadOutcome::Applied(raw)
    }

    fn fail(&self, generation: u64, error: LoadError) {
        if self.stale(generation) {
            return;
        }
        {
            let mut state = self.inner.state.lock();
            state.phase = LoadPhase::Failed;
            state.active_query = None;
        }
        tracing::warn!(%error, "load failed");
        self.inner.events.emit(&Notification::Error(Arc::new(error)));
    }
}

#[async_trait]
impl PageSink for DataLoadService {
    async fn fetch_page(
        &self,
        offset: usize,
        count: usize,
    ) -> Result<Option<Vec<RawRow>>, LoadError> {
        let (generation, mut payload) = {
            let state = self.inner.state.lock();
            let Some(payload) = state.last_payload.clone() else {
                return Err(LoadError::NoQuery);
            };
            (self.inner.generation.load(Ordering::SeqCst), payload)
        };
        payload.offset = Some(offset);
        payload.count = Some(count);

        let query_id = Uuid::new_v4().to_string();
        let mut invalidated = self.inner.invalidate_tx.subscribe();
        let (frames_tx, mut frames) = mpsc::unbounded_channel();
        let _routes = register_routes(self.inner.transport.as_ref(), &query_id, frames_tx);

        self.inner.transport.send(&query_id, &payload).await?;
        tracing::debug!(%query_id, offset, count, "page requested");

        loop {
            if self.stale(generation) {
                return Ok(None);
            }
            tokio::select! {
                frame = frames.recv() => {
                    let Some((kind, body)) = frame else {
                        return Ok(None);
                    };
                    if self.stale(generation) {
                        return Ok(None);
                    }
                    match kind {
                        MessageKind::Progress => {
                            self.inner.events.emit(&Notification::Progress(body));
                        }
                        MessageKind::Error => {
                            let error: ErrorPayload =
                                serde_json::from_value(body).unwrap_or_default();
                            return Err(LoadError::Query {
                                status: error.status,
                                message: error
                                    .message
                                    .unwrap_or_else(|| "query failed".to_owned()),
                            });
                        }
                        MessageKind::Data => {
                            let raw: RawResult = serde_json::from_value(body)
                                .map_err(|err| LoadError::MalformedResponse(err.to_string()))?;
                            self.inner.state.lock().total_items = raw.total_items_count;
                            return Ok(Some(raw.rows));
                        }
                    }
                }
                _ = invalidated.changed() => {}
            }
        }
    }

    async fn apply_page(&self, window: &PageWindow, rows: &[RawRow]) {
        let _build = self.inner.build_guard.lock().await;
        let mut state = self.inner.state.lock();
        let Some(payload) = state.last_payload.clone() else {
            return;
        };
        let builder = TreeBuilder::for_axis(&payload.metadata_panels, PanelRole::Rows);
        match state.row_tree.as_mut() {
            Some(tree) => builder.extend(Arc::make_mut(tree), rows),
            None => state.row_tree = Some(Arc::new(builder.build(rows))),
        }
        tracing::debug!(offset = window.offset, rows = rows.len(), "page merged");
    }
}

fn register_routes(
    transport: &dyn Transport,
    query_id: &str,
    frames: mpsc::UnboundedSender<(MessageKind, Value)>,
) -> Vec<RouteGuard> {
    [MessageKind::Data, MessageKind::Error, MessageKind::Progress]
        .into_iter()
        .map(|kind| {
            let frames = frames.clone();
            transport.on_message(
                kind,
                query_id,
                Box::new(move |payload| {
                    let _ = frames.send((kind, payload));
                }),
            )
        })
        .collect()
}

/// Strips presentation-only fields so two payloads can be compared on
/// dimension/measure identity, filters, sort, and panel membership.
fn comparable(payload: &QueryPayload) -> QueryPayload {
    let mut stripped = payload.clone();
    stripped.query_id = None;
    for panel in &mut stripped.metadata_panels {
        panel.format = None;
        for key in ["format", "width", "color"] {
            panel.field_spec.definition.remove(key);
        }
    }
    stripped
}

fn formatting_only_change(prev: &QueryPayload, next: &QueryPayload) -> bool {
    comparable(prev) == comparable(next)
}

/// Per-panel format overrides that changed between two payloads.
fn changed_formats(prev: &QueryPayload, next: &QueryPayload) -> Vec<Value> {
    next.metadata_panels
        .iter()
        .zip(prev.metadata_panels.iter())
        .filter(|(after, before)| after.format != before.format)
        .filter_map(|(after, _)| after.format.clone())
        .collect()
}
