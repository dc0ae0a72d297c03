use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::payload::QueryPayload;

/// Kind tag on every inbound frame, used together with the query id to
/// route the frame to the interested load cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Data,
    Error,
    Progress,
}

/// Outbound frame: `{ "event": "query", "payload": { "queryPayload": ..., "queryId": ... } }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryEnvelope {
    pub event: OutboundEvent,
    pub payload: QueryRequest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutboundEvent {
    Query,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    pub query_payload: QueryPayload,
    pub query_id: String,
}

impl QueryEnvelope {
    pub fn new(query_id: impl Into<String>, query_payload: QueryPayload) -> Self {
        QueryEnvelope {
            event: OutboundEvent::Query,
            payload: QueryRequest {
                query_payload,
                query_id: query_id.into(),
            },
        }
    }

    pub fn query_id(&self) -> &str {
        &self.payload.query_id
    }
}

/// Inbound frame, correlated by `queryId`. The payload stays opaque at
/// this layer; the load service decodes it according to `kind`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEnvelope {
    pub kind: MessageKind,
    pub query_id: String,
    #[serde(default)]
    pub payload: Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn outbound_envelope_wire_shape() {
        let envelope = QueryEnvelope::new("q-1", QueryPayload::default());
        let wire = serde_json::to_value(&envelope).expect("serialize");
        assert_eq!(
            wire,
            json!({
                "event": "query",
                "payload": {
                    "queryPayload": { "metadataPanels": [] },
                    "queryId": "q-1",
                }
            })
        );
    }

    #[test]
    fn inbound_envelope_wire_shape() {
        let frame = json!({
            "kind": "progress",
            "queryId": "q-7",
            "payload": { "percent": 40 }
        });
        let envelope: ResponseEnvelope = serde_json::from_value(frame).expect("deserialize");
        assert_eq!(envelope.kind, MessageKind::Progress);
        assert_eq!(envelope.query_id, "q-7");
        assert_eq!(envelope.payload["percent"], 40);
    }

    #[test]
    fn inbound_payload_defaults_to_null() {
        let envelope: ResponseEnvelope =
            serde_json::from_value(json!({ "kind": "error", "queryId": "q" })).expect("deserialize");
        assert!(envelope.payload.is_null());
    }
}
