//! Engine event publishing

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;

/// Events published by the engine for console/log sinks
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    /// A hop is about to be sent
    RequestStarted {
        request_id: String,
        hop: usize,
        method: String,
        url: String,
        timestamp: DateTime<Utc>,
    },

    /// A hop completed with a response
    RequestComplete {
        request_id: String,
        hop: usize,
        status: u16,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// A hop failed at the transport level
    RequestFailed {
        request_id: String,
        hop: usize,
        error: String,
        timestamp: DateTime<Utc>,
    },

    /// A client was built on the insecure trust path
    InsecureTls { host: Option<String> },
}

/// Non-blocking event publisher.
///
/// Events are dropped when no receiver is attached or the channel is full;
/// the network operation never waits on a consumer.
#[derive(Debug, Clone, Default)]
pub struct EventEmitter {
    tx: Option<mpsc::Sender<EngineEvent>>,
}

impl EventEmitter {
    /// Create an emitter with a bounded channel and return its receiver
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<EngineEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx: Some(tx) }, rx)
    }

    /// Emitter that discards everything
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Publish an event without waiting
    pub fn emit(&self, event: EngineEvent) {
        let Some(tx) = &self.tx else {
            return;
        };

        if let Err(e) = tx.try_send(event) {
            tracing::debug!("Dropped engine event: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emit_is_received() {
        let (emitter, mut rx) = EventEmitter::channel(4);
        emitter.emit(EngineEvent::InsecureTls { host: None });

        match rx.recv().await {
            Some(EngineEvent::InsecureTls { host }) => assert!(host.is_none()),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_full_channel_does_not_block() {
        let (emitter, _rx) = EventEmitter::channel(1);
        for _ in 0..10 {
            emitter.emit(EngineEvent::InsecureTls { host: None });
        }
    }

    #[test]
    fn test_disabled_emitter() {
        EventEmitter::disabled().emit(EngineEvent::InsecureTls { host: None });
    }

    #[test]
    fn test_event_serialization() {
        let event = EngineEvent::RequestComplete {
            request_id: "abc".to_string(),
            hop: 1,
            status: 302,
            duration_ms: 12,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "request_complete");
        assert_eq!(json["status"], 302);
    }
}
