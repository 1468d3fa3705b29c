//! Streaming session relay
//!
//! Listener contracts for WebSocket and Server-Sent Events sessions,
//! decorators that report every callback to an observation sink before
//! forwarding it, the bounded session log and the transport drivers.

mod listener;
mod log;
pub(crate) mod relay;
mod sse;
mod websocket;

pub use listener::{
    EventSourceListener, Handshake, ObservationSink, Protocol, SessionEvent, SessionEventKind,
    SseEvent, WebSocketListener,
};
pub use log::{SessionLog, SessionRecord, SessionState};
pub use relay::{ObservedEventSource, ObservedWebSocket};
pub use sse::{connect_event_source, EventSourceHandle, SseParser};
pub use websocket::{connect_websocket, WebSocketHandle};
