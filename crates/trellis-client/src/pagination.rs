use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use trellis_proto::RawRow;

use crate::error::LoadError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageStatus {
    Pending,
    Applied,
}

/// One loaded (or in-flight) row window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub offset: usize,
    pub count: usize,
    pub status: PageStatus,
}

/// Seam between the pagination sequencing and the load service that
/// performs the actual fetch and tree merge.
#[async_trait]
pub trait PageSink: Send + Sync {
    /// Issues the incremental fetch. `Ok(None)` means the fetch was
    /// superseded by a cancel/clear and carries no rows.
    async fn fetch_page(&self, offset: usize, count: usize)
        -> Result<Option<Vec<RawRow>>, LoadError>;

    /// Merges an arrived window into the tree. Called strictly in
    /// ascending offset order, with the window already marked `Applied`.
    async fn apply_page(&self, window: &PageWindow, rows: &[RawRow]);
}

#[async_trait]
impl<S: PageSink + ?Sized> PageSink for Arc<S> {
    async fn fetch_page(
        &self,
        offset: usize,
        count: usize,
    ) -> Result<Option<Vec<RawRow>>, LoadError> {
        (**self).fetch_page(offset, count).await
    }

    async fn apply_page(&self, window: &PageWindow, rows: &[RawRow]) {
        (**self).apply_page(window, rows).await;
    }
}

#[derive(Debug, Clone, Copy)]
struct TrackedWindow {
    count: usize,
    status: PageStatus,
}

#[derive(Default)]
struct PaginationState {
    windows: BTreeMap<usize, TrackedWindow>,
    buffered: BTreeMap<usize, Vec<RawRow>>,
    total: usize,
    applied_rows: usize,
}

/// Tracks loaded windows and the server-reported total, and sequences
/// incremental fetches. Arrivals may come out of order; windows are
/// applied to the tree strictly in ascending offset order, with
/// later-arriving windows held until every lower-offset window has been
/// applied.
pub struct PaginationController<S: PageSink> {
    sink: S,
    state: Mutex<PaginationState>,
}

impl<S: PageSink> PaginationController<S> {
    pub fn new(sink: S) -> Self {
        PaginationController {
            sink,
            state: Mutex::new(PaginationState::default()),
        }
    }

    /// Registers a window as pending. Returns false when the offset is
    /// already tracked; a duplicate request is rejected, not re-issued.
    pub fn register_window(&self, offset: usize, count: usize) -> bool {
        let mut state = self.state.lock();
        if state.windows.contains_key(&offset) {
            tracing::debug!(offset, "duplicate page request ignored");
            return false;
        }
        state.windows.insert(
            offset,
            TrackedWindow {
                count,
                status: PageStatus::Pending,
            },
        );
        true
    }

    /// Issues the next incremental fetch with only offset/count varied.
    /// Returns whether a fetch was performed and its rows handed to the
    /// apply sequencing.
    pub async fn request_next_page(&self, offset: usize, count: usize) -> bool {
        if !self.register_window(offset, count) {
            return false;
        }
        match self.sink.fetch_page(offset, count).await {
            Ok(Some(rows)) => {
                self.on_page_arrived(
                    PageWindow {
                        offset,
                        count,
                        status: PageStatus::Pending,
                    },
                    rows,
                )
                .await;
                true
            }
            Ok(None) => {
                self.state.lock().windows.remove(&offset);
                false
            }
            Err(err) => {
                tracing::warn!(%err, offset, "page fetch failed");
                self.state.lock().windows.remove(&offset);
                false
            }
        }
    }

    /// Buffers an arrival and drains every window that has become
    /// applicable, in ascending offset order.
    pub async fn on_page_arrived(&self, window: PageWindow, rows: Vec<RawRow>) {
        {
            let mut state = self.state.lock();
            state.windows.entry(window.offset).or_insert(TrackedWindow {
                count: window.count,
                status: PageStatus::Pending,
            });
            state.buffered.insert(window.offset, rows);
        }

        loop {
            let next = {
                let state = self.state.lock();
                match state.buffered.keys().next().copied() {
                    Some(offset)
                        if state
                            .windows
                            .range(..offset)
                            .all(|(_, w)| w.status == PageStatus::Applied) =>
                    {
                        Some(offset)
                    }
                    _ => None,
                }
            };
            let Some(offset) = next else {
                break;
            };

            let (rows, count) = {
                let mut state = self.state.lock();
                let Some(rows) = state.buffered.remove(&offset) else {
                    break;
                };
                let count = state
                    .windows
                    .get(&offset)
                    .map(|w| w.count)
                    .unwrap_or(rows.len());
                (rows, count)
            };

            let window = PageWindow {
                offset,
                count,
                status: PageStatus::Applied,
            };
            self.sink.apply_page(&window, &rows).await;

            let mut state = self.state.lock();
            if let Some(tracked) = state.windows.get_mut(&offset) {
                tracked.status = PageStatus::Applied;
            }
            state.applied_rows += rows.len();
            tracing::debug!(offset, rows = rows.len(), "page window applied");
        }
    }

    /// Records the most recent total-row count reported by the server.
    pub fn track_total(&self, count: usize) {
        self.state.lock().total = count;
    }

    pub fn total(&self) -> usize {
        self.state.lock().total
    }

    pub fn has_more(&self) -> bool {
        let state = self.state.lock();
        state.applied_rows < state.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct RecordingSink {
        applied: Mutex<Vec<usize>>,
        statuses: Mutex<Vec<PageStatus>>,
        rows_seen: Mutex<Vec<Vec<RawRow>>>,
    }

    impl RecordingSink {
        fn new() -> Arc<Self> {
            Arc::new(RecordingSink {
                applied: Mutex::new(Vec::new()),
                statuses: Mutex::new(Vec::new()),
                rows_seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl PageSink for RecordingSink {
        async fn fetch_page(
            &self,
            offset: usize,
            _count: usize,
        ) -> Result<Option<Vec<RawRow>>, LoadError> {
            Ok(Some(vec![RawRow::data(vec![json!(offset)])]))
        }

        async fn apply_page(&self, window: &PageWindow, rows: &[RawRow]) {
            self.applied.lock().push(window.offset);
            self.statuses.lock().push(window.status);
            self.rows_seen.lock().push(rows.to_vec());
        }
    }

    fn page(offset: usize) -> (PageWindow, Vec<RawRow>) {
        (
            PageWindow {
                offset,
                count: 1,
                status: PageStatus::Pending,
            },
            vec![RawRow::data(vec![json!(offset)])],
        )
    }

    #[tokio::test]
    async fn out_of_order_arrivals_apply_in_offset_order() {
        let sink = RecordingSink::new();
        let controller = PaginationController::new(sink.clone());

        for offset in [0usize, 1, 2] {
            assert!(controller.register_window(offset, 1));
        }
        for offset in [1usize, 0, 2] {
            let (window, rows) = page(offset);
            controller.on_page_arrived(window, rows).await;
        }

        assert_eq!(*sink.applied.lock(), vec![0, 1, 2]);
        let merged: Vec<_> = sink
            .rows_seen
            .lock()
            .iter()
            .flat_map(|rows| rows.iter().map(|r| r.cells[0].clone()))
            .collect();
        assert_eq!(merged, vec![json!(0), json!(1), json!(2)]);
    }

    #[tokio::test]
    async fn duplicate_pending_offset_is_rejected() {
        let sink = RecordingSink::new();
        let controller = PaginationController::new(sink.clone());

        assert!(controller.register_window(5, 10));
        assert!(!controller.register_window(5, 10));
        assert!(!controller.request_next_page(5, 10).await);
        assert!(sink.applied.lock().is_empty());
    }

    #[tokio::test]
    async fn request_next_page_fetches_and_applies() {
        let sink = RecordingSink::new();
        let controller = PaginationController::new(sink.clone());

        assert!(controller.request_next_page(0, 1).await);
        assert!(controller.request_next_page(1, 1).await);
        assert_eq!(*sink.applied.lock(), vec![0, 1]);
        assert!(sink
            .statuses
            .lock()
            .iter()
            .all(|status| *status == PageStatus::Applied));
    }

    #[tokio::test]
    async fn has_more_tracks_server_total() {
        let sink = RecordingSink::new();
        let controller = PaginationController::new(sink.clone());

        controller.track_total(2);
        assert!(controller.has_more());

        controller.request_next_page(0, 1).await;
        assert!(controller.has_more());
        controller.request_next_page(1, 1).await;
        assert!(!controller.has_more());
    }
}
