//! Session log
//!
//! Bounded in-memory record of streaming sessions and their events.
//! Installed as the default observation sink.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::listener::{ObservationSink, Protocol, SessionEvent, SessionEventKind};
use crate::app::StreamingSettings;

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Open,
    Closing,
    Closed,
    Failed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Open => "Open",
            SessionState::Closing => "Closing",
            SessionState::Closed => "Closed",
            SessionState::Failed => "Failed",
        }
    }
}

/// One logged session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: u64,
    pub protocol: Protocol,
    pub url: String,
    pub state: SessionState,
    /// Messages or events received
    pub messages_received: usize,
    pub bytes_received: usize,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Close code or failure text
    pub outcome: Option<String>,
}

impl SessionRecord {
    fn new(id: u64, protocol: Protocol, url: &str, at: DateTime<Utc>) -> Self {
        Self {
            id,
            protocol,
            url: url.to_string(),
            state: SessionState::Open,
            messages_received: 0,
            bytes_received: 0,
            started_at: at,
            ended_at: None,
            outcome: None,
        }
    }

    fn record_received(&mut self, size: usize) {
        self.messages_received += 1;
        self.bytes_received += size;
    }

    fn finish(&mut self, state: SessionState, outcome: String, at: DateTime<Utc>) {
        self.state = state;
        self.outcome = Some(outcome);
        self.ended_at = Some(at);
    }

    /// Session duration as a short string
    pub fn duration_str(&self) -> String {
        let end = self.ended_at.unwrap_or_else(Utc::now);
        let secs = end.signed_duration_since(self.started_at).num_seconds();
        if secs < 60 {
            format!("{}s", secs)
        } else if secs < 3600 {
            format!("{}m {}s", secs / 60, secs % 60)
        } else {
            format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
        }
    }
}

/// Bounded session and event history
pub struct SessionLog {
    sessions: RwLock<VecDeque<SessionRecord>>,
    events: RwLock<VecDeque<SessionEvent>>,
    max_sessions: usize,
    max_events: usize,
}

impl Default for SessionLog {
    fn default() -> Self {
        Self::new(&StreamingSettings::default())
    }
}

impl SessionLog {
    pub fn new(settings: &StreamingSettings) -> Self {
        Self {
            sessions: RwLock::new(VecDeque::new()),
            events: RwLock::new(VecDeque::new()),
            max_sessions: settings.max_sessions,
            max_events: settings.max_events,
        }
    }

    fn update_session<F>(&self, session_id: u64, f: F)
    where
        F: FnOnce(&mut SessionRecord),
    {
        let mut sessions = self.sessions.write();
        if let Some(session) = sessions.iter_mut().find(|s| s.id == session_id) {
            f(session);
        }
    }

    fn apply(&self, event: &SessionEvent) {
        let at = event.timestamp;
        match &event.kind {
            SessionEventKind::Open { url, .. } => {
                let mut sessions = self.sessions.write();
                sessions.push_back(SessionRecord::new(event.session_id, event.protocol, url, at));
                while sessions.len() > self.max_sessions {
                    sessions.pop_front();
                }
            }
            SessionEventKind::Text { payload } => {
                let size = payload.len();
                self.update_session(event.session_id, |s| s.record_received(size));
            }
            SessionEventKind::Binary { size, .. } => {
                let size = *size;
                self.update_session(event.session_id, |s| s.record_received(size));
            }
            SessionEventKind::Event { event: sse } => {
                let size = sse.data.len();
                self.update_session(event.session_id, |s| s.record_received(size));
            }
            SessionEventKind::Closing { .. } => {
                self.update_session(event.session_id, |s| s.state = SessionState::Closing);
            }
            SessionEventKind::Closed { code, reason } => {
                let outcome = match code {
                    Some(code) if reason.is_empty() => code.to_string(),
                    Some(code) => format!("{} {}", code, reason),
                    None => "closed".to_string(),
                };
                self.update_session(event.session_id, |s| {
                    s.finish(SessionState::Closed, outcome, at)
                });
            }
            SessionEventKind::Failure { error } => {
                let outcome = error.clone();
                self.update_session(event.session_id, |s| {
                    s.finish(SessionState::Failed, outcome, at)
                });
            }
        }

        let mut events = self.events.write();
        events.push_back(event.clone());
        while events.len() > self.max_events {
            events.pop_front();
        }
    }

    pub fn sessions(&self) -> Vec<SessionRecord> {
        self.sessions.read().iter().cloned().collect()
    }

    pub fn session(&self, session_id: u64) -> Option<SessionRecord> {
        self.sessions.read().iter().find(|s| s.id == session_id).cloned()
    }

    /// Events of one session in arrival order
    pub fn session_events(&self, session_id: u64) -> Vec<SessionEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.session_id == session_id)
            .cloned()
            .collect()
    }

    /// Most recent events across all sessions, newest first
    pub fn recent_events(&self, limit: usize) -> Vec<SessionEvent> {
        self.events.read().iter().rev().take(limit).cloned().collect()
    }

    pub fn event_count(&self) -> usize {
        self.events.read().len()
    }

    pub fn active_session_count(&self) -> usize {
        self.sessions
            .read()
            .iter()
            .filter(|s| s.state == SessionState::Open)
            .count()
    }

    pub fn clear(&self) {
        self.sessions.write().clear();
        self.events.write().clear();
    }
}

impl ObservationSink for SessionLog {
    fn observe(&self, event: &SessionEvent) -> anyhow::Result<()> {
        match &event.kind {
            SessionEventKind::Text { payload } => tracing::debug!(
                session_id = event.session_id,
                protocol = event.protocol.as_str(),
                "← {}",
                payload
            ),
            SessionEventKind::Binary { size, .. } => tracing::debug!(
                session_id = event.session_id,
                protocol = event.protocol.as_str(),
                size,
                "← binary"
            ),
            SessionEventKind::Event { event: sse } => tracing::debug!(
                session_id = event.session_id,
                protocol = event.protocol.as_str(),
                event_type = sse.event_type(),
                "← {}",
                sse.data
            ),
            SessionEventKind::Failure { error } => tracing::warn!(
                session_id = event.session_id,
                protocol = event.protocol.as_str(),
                "Session failed: {}",
                error
            ),
            other => tracing::info!(
                session_id = event.session_id,
                protocol = event.protocol.as_str(),
                "{:?}",
                other
            ),
        }

        self.apply(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::SseEvent;

    fn event(session_id: u64, protocol: Protocol, kind: SessionEventKind) -> SessionEvent {
        SessionEvent {
            session_id,
            protocol,
            kind,
            timestamp: Utc::now(),
        }
    }

    fn open(session_id: u64) -> SessionEvent {
        event(
            session_id,
            Protocol::WebSocket,
            SessionEventKind::Open {
                url: format!("ws://example.com/{}", session_id),
                status: 101,
            },
        )
    }

    #[test]
    fn test_session_lifecycle() {
        let log = SessionLog::default();
        log.observe(&open(1)).unwrap();
        log.observe(&event(
            1,
            Protocol::WebSocket,
            SessionEventKind::Text {
                payload: "hello".to_string(),
            },
        ))
        .unwrap();
        log.observe(&event(
            1,
            Protocol::WebSocket,
            SessionEventKind::Binary {
                size: 3,
                payload_hex: "010203".to_string(),
            },
        ))
        .unwrap();
        assert_eq!(log.active_session_count(), 1);

        log.observe(&event(
            1,
            Protocol::WebSocket,
            SessionEventKind::Closed {
                code: Some(1000),
                reason: "bye".to_string(),
            },
        ))
        .unwrap();

        let session = log.session(1).unwrap();
        assert_eq!(session.state, SessionState::Closed);
        assert_eq!(session.messages_received, 2);
        assert_eq!(session.bytes_received, 8);
        assert_eq!(session.outcome.as_deref(), Some("1000 bye"));
        assert!(session.ended_at.is_some());
        assert_eq!(log.active_session_count(), 0);
        assert_eq!(log.session_events(1).len(), 4);
    }

    #[test]
    fn test_failure_marks_session() {
        let log = SessionLog::default();
        log.observe(&event(
            7,
            Protocol::Sse,
            SessionEventKind::Open {
                url: "http://example.com/feed".to_string(),
                status: 200,
            },
        ))
        .unwrap();
        log.observe(&event(
            7,
            Protocol::Sse,
            SessionEventKind::Event {
                event: SseEvent {
                    data: "tick".to_string(),
                    ..Default::default()
                },
            },
        ))
        .unwrap();
        log.observe(&event(
            7,
            Protocol::Sse,
            SessionEventKind::Failure {
                error: "connection reset".to_string(),
            },
        ))
        .unwrap();

        let session = log.session(7).unwrap();
        assert_eq!(session.state, SessionState::Failed);
        assert_eq!(session.outcome.as_deref(), Some("connection reset"));
    }

    #[test]
    fn test_bounded_history() {
        let log = SessionLog::new(&StreamingSettings {
            max_sessions: 2,
            max_events: 3,
        });
        for id in 1..=4 {
            log.observe(&open(id)).unwrap();
        }

        let ids: Vec<u64> = log.sessions().iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![3, 4]);
        assert_eq!(log.event_count(), 3);
        assert_eq!(log.recent_events(1)[0].session_id, 4);

        log.clear();
        assert!(log.sessions().is_empty());
        assert_eq!(log.event_count(), 0);
    }
}
