//! Logging decorators for session listeners
//!
//! Each callback is reported to the observation sink first and then
//! forwarded to the wrapped listener with the same arguments.

use chrono::Utc;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::listener::{
    EventSourceListener, Handshake, ObservationSink, Protocol, SessionEvent, SessionEventKind,
    SseEvent, WebSocketListener,
};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Shared reporting half of the relays
struct Reporter {
    sink: Arc<dyn ObservationSink>,
    session_id: u64,
    protocol: Protocol,
}

impl Reporter {
    fn new(sink: Arc<dyn ObservationSink>, protocol: Protocol) -> Self {
        Self {
            sink,
            session_id: NEXT_SESSION_ID.fetch_add(1, Ordering::SeqCst),
            protocol,
        }
    }

    /// Report to the sink. Sink errors and panics are logged and swallowed.
    fn report(&self, kind: SessionEventKind) {
        let event = SessionEvent {
            session_id: self.session_id,
            protocol: self.protocol,
            kind,
            timestamp: Utc::now(),
        };

        match catch_unwind(AssertUnwindSafe(|| self.sink.observe(&event))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(session_id = self.session_id, "Observation sink failed: {}", e);
            }
            Err(_) => {
                tracing::warn!(session_id = self.session_id, "Observation sink panicked");
            }
        }
    }
}

/// WebSocket listener decorator
pub struct ObservedWebSocket<L> {
    inner: L,
    reporter: Reporter,
}

impl<L: WebSocketListener> ObservedWebSocket<L> {
    pub fn new(inner: L, sink: Arc<dyn ObservationSink>) -> Self {
        Self {
            inner,
            reporter: Reporter::new(sink, Protocol::WebSocket),
        }
    }

    pub fn session_id(&self) -> u64 {
        self.reporter.session_id
    }

    pub fn into_inner(self) -> L {
        self.inner
    }
}

impl<L: WebSocketListener> WebSocketListener for ObservedWebSocket<L> {
    fn on_open(&self, handshake: &Handshake) {
        self.reporter.report(SessionEventKind::Open {
            url: handshake.url.clone(),
            status: handshake.status,
        });
        self.inner.on_open(handshake);
    }

    fn on_text(&self, text: &str) {
        self.reporter.report(SessionEventKind::Text {
            payload: text.to_string(),
        });
        self.inner.on_text(text);
    }

    fn on_binary(&self, data: &[u8]) {
        self.reporter.report(SessionEventKind::Binary {
            size: data.len(),
            payload_hex: hex::encode(data),
        });
        self.inner.on_binary(data);
    }

    fn on_closing(&self, code: u16, reason: &str) {
        self.reporter.report(SessionEventKind::Closing {
            code,
            reason: reason.to_string(),
        });
        self.inner.on_closing(code, reason);
    }

    fn on_closed(&self, code: u16, reason: &str) {
        self.reporter.report(SessionEventKind::Closed {
            code: Some(code),
            reason: reason.to_string(),
        });
        self.inner.on_closed(code, reason);
    }

    fn on_failure(&self, error: &str) {
        self.reporter.report(SessionEventKind::Failure {
            error: error.to_string(),
        });
        self.inner.on_failure(error);
    }
}

/// Server-Sent Events listener decorator
pub struct ObservedEventSource<L> {
    inner: L,
    reporter: Reporter,
}

impl<L: EventSourceListener> ObservedEventSource<L> {
    pub fn new(inner: L, sink: Arc<dyn ObservationSink>) -> Self {
        Self {
            inner,
            reporter: Reporter::new(sink, Protocol::Sse),
        }
    }

    pub fn session_id(&self) -> u64 {
        self.reporter.session_id
    }

    pub fn into_inner(self) -> L {
        self.inner
    }
}

impl<L: EventSourceListener> EventSourceListener for ObservedEventSource<L> {
    fn on_open(&self, handshake: &Handshake) {
        self.reporter.report(SessionEventKind::Open {
            url: handshake.url.clone(),
            status: handshake.status,
        });
        self.inner.on_open(handshake);
    }

    fn on_event(&self, event: &SseEvent) {
        self.reporter.report(SessionEventKind::Event {
            event: event.clone(),
        });
        self.inner.on_event(event);
    }

    fn on_closed(&self) {
        self.reporter.report(SessionEventKind::Closed {
            code: None,
            reason: String::new(),
        });
        self.inner.on_closed();
    }

    fn on_failure(&self, error: &str) {
        self.reporter.report(SessionEventKind::Failure {
            error: error.to_string(),
        });
        self.inner.on_failure(error);
    }
}
