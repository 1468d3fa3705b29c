//! WebSocket transport
//!
//! Connects with tokio-tungstenite, reports frames to a
//! [`WebSocketListener`] from a reader task and accepts outgoing
//! messages through a [`WebSocketHandle`].

use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async_tls_with_config, Connector};

use super::listener::{Handshake, WebSocketListener};
use crate::error::{CourierError, HttpError};
use crate::http::HeaderList;

/// Close code reported when the peer sent no status
const NO_STATUS_RECEIVED: u16 = 1005;

/// Close code reported when the connection dropped without a close frame
const ABNORMAL_CLOSURE: u16 = 1006;

/// Running WebSocket session
pub struct WebSocketHandle {
    outgoing: mpsc::UnboundedSender<Message>,
    reader: JoinHandle<()>,
}

impl WebSocketHandle {
    pub fn send_text(&self, text: impl Into<String>) -> Result<(), HttpError> {
        self.send(Message::Text(text.into()))
    }

    pub fn send_binary(&self, data: impl Into<Vec<u8>>) -> Result<(), HttpError> {
        self.send(Message::Binary(data.into()))
    }

    /// Start the closing handshake
    pub fn close(&self, code: u16, reason: &str) -> Result<(), HttpError> {
        self.send(Message::Close(Some(CloseFrame {
            code: CloseCode::from(code),
            reason: reason.to_string().into(),
        })))
    }

    fn send(&self, message: Message) -> Result<(), HttpError> {
        self.outgoing
            .send(message)
            .map_err(|_| HttpError::RequestFailed("WebSocket session is closed".to_string()))
    }

    /// Wait until the session ends
    pub async fn closed(self) {
        let _ = self.reader.await;
    }

    pub fn is_finished(&self) -> bool {
        self.reader.is_finished()
    }
}

/// Connect to `url` and deliver session callbacks to `listener`.
///
/// `tls` overrides the default `wss` configuration.
///
/// Handshake failures are reported to the listener and returned.
pub async fn connect_websocket<L>(
    url: &str,
    headers: &HeaderList,
    tls: Option<Arc<rustls::ClientConfig>>,
    listener: L,
) -> Result<WebSocketHandle, CourierError>
where
    L: WebSocketListener + 'static,
{
    let mut request = url
        .into_client_request()
        .map_err(|e| HttpError::InvalidUrl(format!("{} ({})", url, e)))?;

    for (key, value) in headers.iter() {
        let name = HeaderName::from_bytes(key.as_bytes()).map_err(|e| HttpError::InvalidHeader {
            name: key.to_string(),
            reason: e.to_string(),
        })?;
        let value = HeaderValue::from_str(value).map_err(|e| HttpError::InvalidHeader {
            name: key.to_string(),
            reason: e.to_string(),
        })?;
        request.headers_mut().append(name, value);
    }

    let host = request.uri().host().unwrap_or("").to_string();
    let connector = tls.map(Connector::Rustls);
    let connected = connect_async_tls_with_config(request, None, false, connector).await;
    let (stream, response) = match connected {
        Ok(connected) => connected,
        Err(e) => {
            listener.on_failure(&e.to_string());
            return Err(HttpError::Connection {
                host,
                reason: e.to_string(),
            }
            .into());
        }
    };

    let handshake_headers: HeaderList = response
        .headers()
        .iter()
        .map(|(k, v)| {
            (
                k.as_str().to_string(),
                String::from_utf8_lossy(v.as_bytes()).into_owned(),
            )
        })
        .collect();

    tracing::info!(url = %url, "WebSocket connected");
    listener.on_open(&Handshake {
        url: url.to_string(),
        status: response.status().as_u16(),
        headers: handshake_headers,
    });

    let (mut sink, mut source) = stream.split();
    let (outgoing, mut queue) = mpsc::unbounded_channel::<Message>();

    let writer = tokio::spawn(async move {
        while let Some(message) = queue.recv().await {
            if sink.send(message).await.is_err() {
                break;
            }
        }
    });

    let reader = tokio::spawn(async move {
        let mut close: Option<(u16, String)> = None;

        while let Some(frame) = source.next().await {
            match frame {
                Ok(Message::Text(text)) => listener.on_text(&text),
                Ok(Message::Binary(data)) => listener.on_binary(&data),
                Ok(Message::Close(frame)) => {
                    let (code, reason) = frame
                        .map(|f| (u16::from(f.code), f.reason.to_string()))
                        .unwrap_or((NO_STATUS_RECEIVED, String::new()));
                    listener.on_closing(code, &reason);
                    close = Some((code, reason));
                }
                Ok(_) => {}
                Err(e) => {
                    listener.on_failure(&e.to_string());
                    writer.abort();
                    return;
                }
            }
        }

        let (code, reason) = close.unwrap_or((ABNORMAL_CLOSURE, String::new()));
        listener.on_closed(code, &reason);
        writer.abort();
    });

    Ok(WebSocketHandle { outgoing, reader })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::relay::tests::Recorder;
    use crate::stream::{ObservedWebSocket, SessionLog, SessionState};
    use tokio::net::TcpListener;

    /// Server that echoes the first text, then sends a binary frame and closes
    async fn spawn_server() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();

            if let Some(Ok(Message::Text(text))) = ws.next().await {
                ws.send(Message::Text(format!("echo {}", text))).await.unwrap();
            }
            ws.send(Message::Binary(vec![1, 2, 3])).await.unwrap();
            ws.close(Some(CloseFrame {
                code: CloseCode::Normal,
                reason: "bye".into(),
            }))
            .await
            .unwrap();
            while let Some(Ok(_)) = ws.next().await {}
        });

        format!("ws://{}", addr)
    }

    #[tokio::test]
    async fn test_session_callbacks_in_order() {
        let url = spawn_server().await;
        let recorder = Arc::new(Recorder::default());

        let handle = connect_websocket(&url, &HeaderList::default(), None, recorder.clone())
            .await
            .unwrap();
        handle.send_text("hi").unwrap();
        handle.closed().await;

        assert_eq!(
            recorder.calls(),
            vec![
                "open 101",
                "text echo hi",
                "binary [1, 2, 3]",
                "closing 1000 bye",
                "closed 1000 bye"
            ]
        );
    }

    #[tokio::test]
    async fn test_observed_session_is_logged() {
        let url = spawn_server().await;
        let recorder = Arc::new(Recorder::default());
        let log = Arc::new(SessionLog::default());
        let relay = ObservedWebSocket::new(recorder.clone(), log.clone());
        let session_id = relay.session_id();

        let handle = connect_websocket(&url, &HeaderList::default(), None, relay)
            .await
            .unwrap();
        handle.send_text("hi").unwrap();
        handle.closed().await;

        let session = log.session(session_id).unwrap();
        assert_eq!(session.state, SessionState::Closed);
        assert_eq!(session.messages_received, 2);
        assert_eq!(log.session_events(session_id).len(), 5);
        assert_eq!(recorder.calls().len(), 5);
    }

    #[tokio::test]
    async fn test_connect_failure_reported() {
        let recorder = Arc::new(Recorder::default());
        let result = connect_websocket(
            "ws://127.0.0.1:1/",
            &HeaderList::default(),
            None,
            recorder.clone(),
        )
        .await;

        assert!(matches!(result, Err(CourierError::Http(HttpError::Connection { .. }))));
        assert_eq!(recorder.calls().len(), 1);
        assert!(recorder.calls()[0].starts_with("failure"));
    }

    #[tokio::test]
    async fn test_invalid_url_rejected() {
        let result =
            connect_websocket("not a url", &HeaderList::default(), None, Recorder::default()).await;
        assert!(matches!(result, Err(CourierError::Http(HttpError::InvalidUrl(_)))));
    }
}
