//! Courier - HTTP request-execution engine
//!
//! Single-call execution, bounded redirect resolution, mutual TLS client
//! identities from PFX or PEM stores, observed WebSocket and SSE sessions
//! and a fluent assertion runtime for scripts.

pub mod app;
pub mod engine;
pub mod error;
pub mod http;
pub mod scripting;
pub mod stream;
pub mod tls;

pub use app::{Config, EngineEvent, EventEmitter};
pub use engine::Engine;
pub use error::{AssertionError, ConfigError, CourierError, HttpError, Secret, UserHint};
