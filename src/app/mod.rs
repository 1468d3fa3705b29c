//! Engine configuration and lifecycle events

mod config;
mod events;

pub use config::{Config, HttpSettings, StreamingSettings, TlsSettings};
pub use events::{EngineEvent, EventEmitter};
