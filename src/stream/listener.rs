//! Lifecycle callback contracts for long-lived sessions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::http::HeaderList;

/// Result of the opening handshake
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Handshake {
    /// Session URL
    pub url: String,

    /// Handshake response status (101 for WebSocket, 200 for SSE)
    pub status: u16,

    /// Handshake response headers
    pub headers: HeaderList,
}

/// One Server-Sent Events message
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SseEvent {
    /// Last event ID at dispatch time
    pub id: Option<String>,

    /// Event type (`message` when absent)
    pub event: Option<String>,

    /// Data lines joined with `\n`
    pub data: String,
}

impl SseEvent {
    pub fn event_type(&self) -> &str {
        self.event.as_deref().unwrap_or("message")
    }
}

/// WebSocket session callbacks.
///
/// Called from the transport task; implementations use interior mutability.
pub trait WebSocketListener: Send + Sync {
    fn on_open(&self, handshake: &Handshake);
    fn on_text(&self, text: &str);
    fn on_binary(&self, data: &[u8]);
    fn on_closing(&self, code: u16, reason: &str);
    fn on_closed(&self, code: u16, reason: &str);
    fn on_failure(&self, error: &str);
}

/// Server-Sent Events session callbacks
pub trait EventSourceListener: Send + Sync {
    fn on_open(&self, handshake: &Handshake);
    fn on_event(&self, event: &SseEvent);
    fn on_closed(&self);
    fn on_failure(&self, error: &str);
}

impl<T: WebSocketListener + ?Sized> WebSocketListener for Arc<T> {
    fn on_open(&self, handshake: &Handshake) {
        (**self).on_open(handshake)
    }

    fn on_text(&self, text: &str) {
        (**self).on_text(text)
    }

    fn on_binary(&self, data: &[u8]) {
        (**self).on_binary(data)
    }

    fn on_closing(&self, code: u16, reason: &str) {
        (**self).on_closing(code, reason)
    }

    fn on_closed(&self, code: u16, reason: &str) {
        (**self).on_closed(code, reason)
    }

    fn on_failure(&self, error: &str) {
        (**self).on_failure(error)
    }
}

impl<T: EventSourceListener + ?Sized> EventSourceListener for Arc<T> {
    fn on_open(&self, handshake: &Handshake) {
        (**self).on_open(handshake)
    }

    fn on_event(&self, event: &SseEvent) {
        (**self).on_event(event)
    }

    fn on_closed(&self) {
        (**self).on_closed()
    }

    fn on_failure(&self, error: &str) {
        (**self).on_failure(error)
    }
}

/// Streaming protocol of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Protocol {
    WebSocket,
    Sse,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::WebSocket => "WebSocket",
            Protocol::Sse => "SSE",
        }
    }
}

/// What happened in a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionEventKind {
    Open { url: String, status: u16 },
    Text { payload: String },
    Binary { size: usize, payload_hex: String },
    Event { event: SseEvent },
    Closing { code: u16, reason: String },
    Closed { code: Option<u16>, reason: String },
    Failure { error: String },
}

/// Observation record handed to a sink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionEvent {
    pub session_id: u64,
    pub protocol: Protocol,
    pub kind: SessionEventKind,
    pub timestamp: DateTime<Utc>,
}

/// Receives observation records.
///
/// Called concurrently from many sessions on transport tasks; must not
/// block longer than a log append.
pub trait ObservationSink: Send + Sync {
    fn observe(&self, event: &SessionEvent) -> anyhow::Result<()>;
}
