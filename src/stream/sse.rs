//! Server-Sent Events transport
//!
//! Incremental `text/event-stream` parser and a driver that feeds a
//! response body stream through it into an [`EventSourceListener`].

use futures::StreamExt;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use super::listener::{EventSourceListener, Handshake, SseEvent};
use crate::error::{CourierError, HttpError};
use crate::http::{HeaderList, HttpExecutor, PreparedRequest};

/// Incremental event-stream parser
#[derive(Debug, Default)]
pub struct SseParser {
    /// Bytes of an unfinished line
    pending: Vec<u8>,
    /// Last line ended in CR; a leading LF belongs to it
    after_cr: bool,
    data: Vec<String>,
    event: Option<String>,
    last_event_id: Option<String>,
    retry_ms: Option<u64>,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every event completed by it
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.pending.extend_from_slice(chunk);
        let mut events = Vec::new();

        loop {
            // LF completing a CRLF split across chunks
            if self.after_cr && !self.pending.is_empty() {
                if self.pending[0] == b'\n' {
                    self.pending.remove(0);
                }
                self.after_cr = false;
            }

            let Some(pos) = self.pending.iter().position(|b| *b == b'\n' || *b == b'\r') else {
                break;
            };
            let mut line: Vec<u8> = self.pending.drain(..=pos).collect();
            self.after_cr = line.pop() == Some(b'\r');

            let line = String::from_utf8_lossy(&line).into_owned();
            if let Some(event) = self.process_line(&line) {
                events.push(event);
            }
        }

        events
    }

    /// Reconnection delay announced by the server
    pub fn retry_ms(&self) -> Option<u64> {
        self.retry_ms
    }

    pub fn last_event_id(&self) -> Option<&str> {
        self.last_event_id.as_deref()
    }

    fn process_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.dispatch();
        }

        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "data" => self.data.push(value.to_string()),
            "event" => self.event = Some(value.to_string()),
            "id" if !value.contains('\0') => self.last_event_id = Some(value.to_string()),
            "retry" => {
                if let Ok(ms) = value.parse() {
                    self.retry_ms = Some(ms);
                }
            }
            _ => {}
        }

        None
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        let event = self.event.take();
        if self.data.is_empty() {
            return None;
        }

        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseEvent {
            id: self.last_event_id.clone(),
            event: event.filter(|e| !e.is_empty()),
            data,
        })
    }
}

/// Running event-stream session. Dropping the handle stops the session.
pub struct EventSourceHandle {
    cancel: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl EventSourceHandle {
    /// Stop reading. The listener receives `on_closed`.
    pub async fn close(mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
        let _ = self.task.await;
    }

    /// Wait for the server to end the stream
    pub async fn closed(self) {
        let Self { cancel: _cancel, task } = self;
        let _ = task.await;
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Open an event stream and deliver its events to `listener`.
///
/// Handshake failures are reported to the listener and returned.
pub async fn connect_event_source<L>(
    executor: &HttpExecutor,
    request: &PreparedRequest,
    listener: L,
) -> Result<EventSourceHandle, CourierError>
where
    L: EventSourceListener + 'static,
{
    let response = match executor.open_stream(request).await {
        Ok(response) => response,
        Err(e) => {
            listener.on_failure(&e.to_string());
            return Err(e);
        }
    };

    let status = response.status();
    let headers: HeaderList = response
        .headers()
        .iter()
        .map(|(k, v)| {
            (
                k.as_str().to_string(),
                String::from_utf8_lossy(v.as_bytes()).into_owned(),
            )
        })
        .collect();

    let is_event_stream = headers
        .get("content-type")
        .map(|ct| ct.to_ascii_lowercase().starts_with("text/event-stream"))
        .unwrap_or(false);

    if !status.is_success() || !is_event_stream {
        let reason = format!(
            "not an event stream: {} {}",
            status.as_u16(),
            headers.get("content-type").unwrap_or("(no content type)")
        );
        listener.on_failure(&reason);
        return Err(HttpError::RequestFailed(reason).into());
    }

    listener.on_open(&Handshake {
        url: request.url.clone(),
        status: status.as_u16(),
        headers,
    });

    let (cancel, mut cancelled) = oneshot::channel::<()>();
    let mut body = response.bytes_stream();

    let task = tokio::spawn(async move {
        let mut parser = SseParser::new();

        loop {
            tokio::select! {
                _ = &mut cancelled => break,
                chunk = body.next() => match chunk {
                    Some(Ok(bytes)) => {
                        for event in parser.feed(&bytes) {
                            listener.on_event(&event);
                        }
                    }
                    Some(Err(e)) => {
                        listener.on_failure(&e.to_string());
                        return;
                    }
                    None => break,
                },
            }
        }

        // An event without its terminating blank line is discarded
        listener.on_closed();
    });

    Ok(EventSourceHandle {
        cancel: Some(cancel),
        task,
    })
}
