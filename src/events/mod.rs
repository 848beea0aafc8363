//! Event Emitter (C2).
//!
//! Delivers one envelope per record to an external indexing bus,
//! fire-and-forget: `emit` never returns an error back into the caller's
//! transaction, it only logs. Events are always sent after the owning
//! graph commit has already succeeded.

use async_trait::async_trait;

use crate::model::EventEnvelope;

#[async_trait]
pub trait EventEmitter: Send + Sync {
    async fn emit(&self, envelope: EventEnvelope);
}

/// Demo/production-shaped emitter: logs every envelope at `info` and drops
/// it. Used by the CLI binary, where there is no real bus to deliver to.
#[derive(Debug, Default)]
pub struct LoggingEventEmitter;

#[async_trait]
impl EventEmitter for LoggingEventEmitter {
    async fn emit(&self, envelope: EventEnvelope) {
        log::info!(
            "emit {:?} record={} type={:?} version={}",
            envelope.event_type,
            envelope.record_id,
            envelope.record_type,
            envelope.record_version,
        );
    }
}

/// Test double that records every envelope it receives, in order, so tests
/// can assert on the emit-after-commit contract and on expected envelope
/// counts without standing up a real bus.
#[derive(Debug, Default)]
pub struct RecordingEventEmitter {
    envelopes: std::sync::Mutex<Vec<EventEnvelope>>,
}

impl RecordingEventEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn envelopes(&self) -> Vec<EventEnvelope> {
        self.envelopes.lock().expect("emitter mutex poisoned").clone()
    }

    pub fn len(&self) -> usize {
        self.envelopes.lock().expect("emitter mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl EventEmitter for RecordingEventEmitter {
    async fn emit(&self, envelope: EventEnvelope) {
        log::debug!(
            "recording emit {:?} record={}",
            envelope.event_type,
            envelope.record_id
        );
        self.envelopes
            .lock()
            .expect("emitter mutex poisoned")
            .push(envelope);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EventType, Key, RecordType};

    fn sample(record_id: Key) -> EventEnvelope {
        EventEnvelope {
            org_id: Key::new_v4(),
            record_id,
            record_name: "m1".into(),
            record_type: RecordType::Message,
            record_version: 1,
            event_type: EventType::Create,
            body: None,
            signed_url_route: EventEnvelope::signed_url_route(record_id),
            metadata_route: EventEnvelope::metadata_route(record_id),
            connector_name: "gmail".into(),
            record_source: "CONNECTOR".into(),
            mime_type: "message/rfc822".into(),
            extension: None,
            thread_id: Some("t1".into()),
            created_at_source_timestamp: 0,
            modified_at_source_timestamp: 0,
        }
    }

    #[tokio::test]
    async fn recording_emitter_preserves_order() {
        let emitter = RecordingEventEmitter::new();
        let a = Key::new_v4();
        let b = Key::new_v4();
        emitter.emit(sample(a)).await;
        emitter.emit(sample(b)).await;
        let got: Vec<Key> = emitter.envelopes().iter().map(|e| e.record_id).collect();
        assert_eq!(got, vec![a, b]);
    }
}
