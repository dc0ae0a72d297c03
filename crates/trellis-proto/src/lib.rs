//! Wire-level types for the trellis pivot query protocol.
//!
//! Everything in this crate is a plain serde data type: the envelopes
//! exchanged over the persistent connection, the query payload the
//! caller assembles, and the streamed result rows the engine consumes.
//! No I/O happens here.

pub mod envelope;
pub mod payload;
pub mod result;

pub use envelope::{MessageKind, QueryEnvelope, QueryRequest, ResponseEnvelope};
pub use payload::{
    FieldRef, FieldSpec, GrandTotals, Panel, PanelRole, QueryPayload, SortDetails, SortDirection,
};
pub use result::{ErrorPayload, RawResult, RawRow, RowMarker};
