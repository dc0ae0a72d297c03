//! Query lifecycle engine for streamed pivot data.
//!
//! [`DataLoadService`] owns one logical query at a time on top of a
//! shared transport: submit, cancel, clear, and incremental page fetches
//! that extend the row tree in place. [`SortController`] and
//! [`PaginationController`] shape the payloads it submits; consumers
//! observe results through the service's typed notification channels.

pub mod error;
pub mod events;
pub mod pagination;
pub mod service;
pub mod sort;

pub use error::LoadError;
pub use events::{EventRegistry, EventSubscription, LoadEvent, Notification, NotificationHandler};
pub use pagination::{PageSink, PageStatus, PageWindow, PaginationController};
pub use service::{DataLoadService, LoadOutcome, LoadPhase};
pub use sort::{SortController, SortOptions, SortState};
