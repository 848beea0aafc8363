//! The event envelope emitted to the downstream indexing bus.

use serde::{Deserialize, Serialize};

use super::vertex::RecordType;
use super::Key;

/// The three lifecycle events a record can emit.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Create,
    Update,
    Delete,
}

/// Fixed envelope shape delivered to the indexing bus, one per record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventEnvelope {
    pub org_id: Key,
    pub record_id: Key,
    pub record_name: String,
    pub record_type: RecordType,
    pub record_version: u32,
    pub event_type: EventType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
    pub signed_url_route: String,
    pub metadata_route: String,
    pub connector_name: String,
    pub record_source: String,
    pub mime_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extension: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    pub created_at_source_timestamp: i64,
    pub modified_at_source_timestamp: i64,
}

impl EventEnvelope {
    /// Route templates are keyed by `recordId`.
    pub fn signed_url_route(record_id: Key) -> String {
        format!("/records/{record_id}/signed-url")
    }

    pub fn metadata_route(record_id: Key) -> String {
        format!("/records/{record_id}/metadata")
    }
}
