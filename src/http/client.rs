//! Single-call HTTP executor

use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::multipart::{Form, Part};
use rustls::client::ResolvesClientCert;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempPath;
use tokio::io::AsyncWriteExt;
use url::Url;

use super::request::{MultipartField, PartValue, PreparedRequest, RequestBody};
use super::response::{disposition_file_name, HttpResponse, ResponseBody};
use super::HeaderList;
use crate::app::{Config, EngineEvent, EventEmitter, HttpSettings, TlsSettings};
use crate::error::{CourierError, HttpError};
use crate::tls::{self, HostAwareResolver, TlsMaterialProvider};

/// Performs exactly one HTTP round trip per call
#[async_trait]
pub trait Execute: Send + Sync {
    /// Execute `request` as hop number `hop` (0-based) of a chain
    async fn execute(&self, request: &PreparedRequest, hop: usize)
        -> Result<HttpResponse, CourierError>;
}

/// HTTP executor backed by reqwest
pub struct HttpExecutor {
    /// Client without a client certificate
    client: reqwest::Client,

    /// HTTP settings
    settings: HttpSettings,

    /// Client certificate settings
    tls_settings: TlsSettings,

    /// Identity material cache
    tls: Arc<TlsMaterialProvider>,

    /// Event publisher
    events: EventEmitter,
}

impl HttpExecutor {
    /// Create a new executor
    pub fn new(
        config: &Config,
        tls: Arc<TlsMaterialProvider>,
        events: EventEmitter,
    ) -> Result<Self, CourierError> {
        let client = build_client(
            &config.http,
            Some(config.http.timeout()),
            tls.verify_certificates(),
            None,
            None,
            &events,
        )?;

        Ok(Self {
            client,
            settings: config.http.clone(),
            tls_settings: config.tls.clone(),
            tls,
            events,
        })
    }

    /// True when server certificates are not verified
    pub fn is_insecure(&self) -> bool {
        !self.tls.verify_certificates()
    }

    /// Pick the client for a URL, resolving client identity material first.
    ///
    /// Streaming clients carry no total timeout, only the connect timeout.
    fn client_for(&self, url: &Url, streaming: bool) -> Result<reqwest::Client, CourierError> {
        let secure = url.scheme() == "https" || url.scheme() == "wss";
        let host = url.host_str().filter(|_| secure);
        let certificate = host.and_then(|h| self.tls_settings.certificate_for(h));

        let resolver = match (host, certificate) {
            (Some(host), Some(certificate)) => {
                let identity = self.tls.resolve(host, certificate)?;
                Some(Arc::new(HostAwareResolver::new(host, identity)))
            }
            _ if !streaming => return Ok(self.client.clone()),
            _ => None,
        };

        let timeout = (!streaming).then(|| self.settings.timeout());
        Ok(build_client(
            &self.settings,
            timeout,
            self.tls.verify_certificates(),
            host,
            resolver,
            &self.events,
        )?)
    }

    /// TLS configuration for a `wss` session, `None` for plain `ws`.
    ///
    /// Applies the same verification policy and client identity
    /// selection as HTTPS requests.
    pub fn websocket_tls(&self, url: &Url) -> Result<Option<Arc<rustls::ClientConfig>>, CourierError> {
        if url.scheme() != "wss" {
            return Ok(None);
        }

        let host = url.host_str();
        let resolver: Option<Arc<dyn ResolvesClientCert>> =
            match host.and_then(|h| self.tls_settings.certificate_for(h).map(|c| (h, c))) {
                Some((host, certificate)) => {
                    let identity = self.tls.resolve(host, certificate)?;
                    Some(Arc::new(HostAwareResolver::new(host, identity)))
                }
                None => None,
            };

        let verify = self.tls.verify_certificates();
        if !verify {
            self.events.emit(EngineEvent::InsecureTls {
                host: host.map(str::to_string),
            });
        }

        let config = tls::client_config(verify, host, resolver)?;
        Ok(Some(Arc::new(config)))
    }

    /// Open a long-lived GET for an event stream.
    ///
    /// Uses the same TLS and proxy configuration as regular requests.
    /// Returns the response once headers arrive; the body is left unread.
    pub async fn open_stream(
        &self,
        request: &PreparedRequest,
    ) -> Result<reqwest::Response, CourierError> {
        let url = Url::parse(&request.url)
            .map_err(|e| HttpError::InvalidUrl(format!("{} ({})", request.url, e)))?;
        let host = url.host_str().unwrap_or("").to_string();
        let client = self.client_for(&url, true)?;

        let mut headers = header_map(&request.headers, false)?;
        if !headers.contains_key(ACCEPT) {
            headers.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));
        }

        let response = client
            .get(url)
            .headers(headers)
            .send()
            .await
            .map_err(|e| transport_error(e, &host, self.settings.connect_timeout()))?;

        Ok(response)
    }

    async fn send(
        &self,
        client: reqwest::Client,
        url: Url,
        request: &PreparedRequest,
    ) -> Result<HttpResponse, CourierError> {
        let host = url.host_str().unwrap_or("").to_string();
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|_| HttpError::InvalidMethod(request.method.clone()))?;

        let multipart = matches!(request.body, RequestBody::Multipart(_));
        let mut builder = client
            .request(method, url)
            .headers(header_map(&request.headers, multipart)?);

        builder = match &request.body {
            RequestBody::None => builder,
            RequestBody::Raw(bytes) => builder.body(bytes.clone()),
            RequestBody::UrlEncoded(pairs) => {
                if !request.headers.contains("content-type") {
                    builder = builder.header(CONTENT_TYPE, "application/x-www-form-urlencoded");
                }
                builder.body(RequestBody::encode_urlencoded(pairs))
            }
            RequestBody::Multipart(fields) => builder.multipart(multipart_form(fields).await?),
        };

        let start = Instant::now();
        let response = builder
            .send()
            .await
            .map_err(|e| transport_error(e, &host, self.settings.timeout()))?;

        self.build_response(response, start, &host).await
    }

    /// Build the response record, spilling large bodies to a temporary file
    async fn build_response(
        &self,
        mut response: reqwest::Response,
        start: Instant,
        host: &str,
    ) -> Result<HttpResponse, CourierError> {
        let status = response.status();
        let http_version = format!("{:?}", response.version());

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
        let file_name = headers
            .get("content-disposition")
            .and_then(disposition_file_name);

        let body = read_body(
            &mut response,
            self.settings.max_body_size,
            &std::env::temp_dir(),
            host,
            self.settings.timeout(),
        )
        .await?;

        Ok(HttpResponse {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or("").to_string(),
            headers,
            body,
            duration_ms: start.elapsed().as_millis() as u64,
            http_version,
            file_name,
        })
    }
}

#[async_trait]
impl Execute for HttpExecutor {
    async fn execute(
        &self,
        request: &PreparedRequest,
        hop: usize,
    ) -> Result<HttpResponse, CourierError> {
        let url = Url::parse(&request.url)
            .map_err(|e| HttpError::InvalidUrl(format!("{} ({})", request.url, e)))?;

        // Certificate problems surface here, before any network activity
        let client = self.client_for(&url, false)?;

        if request.emit_events {
            self.events.emit(EngineEvent::RequestStarted {
                request_id: request.id.clone(),
                hop,
                method: request.method.clone(),
                url: request.url.clone(),
                timestamp: Utc::now(),
            });
        }

        let result = self.send(client, url, request).await;

        match &result {
            Ok(response) => {
                tracing::debug!(
                    request_id = %request.id,
                    hop,
                    status = response.status,
                    duration_ms = response.duration_ms,
                    "{} {}",
                    request.method,
                    request.url
                );
                if request.emit_events {
                    self.events.emit(EngineEvent::RequestComplete {
                        request_id: request.id.clone(),
                        hop,
                        status: response.status,
                        duration_ms: response.duration_ms,
                        timestamp: Utc::now(),
                    });
                }
            }
            Err(e) => {
                tracing::debug!(request_id = %request.id, hop, error = %e, "Request failed");
                if request.emit_events {
                    self.events.emit(EngineEvent::RequestFailed {
                        request_id: request.id.clone(),
                        hop,
                        error: e.to_string(),
                        timestamp: Utc::now(),
                    });
                }
            }
        }

        result
    }
}

/// Build a reqwest client that never follows redirects on its own
fn build_client(
    settings: &HttpSettings,
    timeout: Option<Duration>,
    verify: bool,
    host: Option<&str>,
    client_auth: Option<Arc<HostAwareResolver>>,
    events: &EventEmitter,
) -> Result<reqwest::Client, HttpError> {
    let client_auth = client_auth.map(|r| r as Arc<dyn ResolvesClientCert>);
    let tls_config = tls::client_config(verify, host, client_auth)?;

    if !verify {
        events.emit(EngineEvent::InsecureTls {
            host: host.map(str::to_string),
        });
    }

    let mut builder = reqwest::Client::builder()
        .use_preconfigured_tls(tls_config)
        .redirect(reqwest::redirect::Policy::none())
        .connect_timeout(settings.connect_timeout())
        .user_agent(&settings.user_agent);

    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }

    if let Some(proxy) = &settings.proxy {
        let proxy = reqwest::Proxy::all(proxy)
            .map_err(|e| HttpError::InvalidUrl(format!("proxy {}: {}", proxy, e)))?;
        builder = builder.proxy(proxy);
    }

    builder
        .build()
        .map_err(|e| HttpError::RequestFailed(format!("failed to create HTTP client: {}", e)))
}

fn header_map(headers: &HeaderList, multipart: bool) -> Result<HeaderMap, HttpError> {
    let mut map = HeaderMap::new();

    for (key, value) in headers.iter() {
        // The multipart encoder sets its own boundary content type
        if multipart && key.eq_ignore_ascii_case("content-type") {
            continue;
        }

        let name = HeaderName::from_bytes(key.as_bytes()).map_err(|e| HttpError::InvalidHeader {
            name: key.to_string(),
            reason: e.to_string(),
        })?;
        let value = HeaderValue::from_str(value).map_err(|e| HttpError::InvalidHeader {
            name: key.to_string(),
            reason: e.to_string(),
        })?;
        map.append(name, value);
    }

    Ok(map)
}

async fn multipart_form(fields: &[MultipartField]) -> Result<Form, CourierError> {
    let mut form = Form::new();

    for field in fields {
        form = match &field.value {
            PartValue::Text { value } => form.text(field.name.clone(), value.clone()),
            PartValue::File {
                path,
                file_name,
                content_type,
            } => {
                let data = tokio::fs::read(path).await?;
                let name = file_name
                    .clone()
                    .or_else(|| path.file_name().map(|n| n.to_string_lossy().into_owned()))
                    .unwrap_or_else(|| "file".to_string());

                let mut part = Part::bytes(data).file_name(name);
                if let Some(content_type) = content_type {
                    part = part
                        .mime_str(content_type)
                        .map_err(|e| HttpError::InvalidHeader {
                            name: "Content-Type".to_string(),
                            reason: e.to_string(),
                        })?;
                }
                form.part(field.name.clone(), part)
            }
        };
    }

    Ok(form)
}

/// Read a response body, spilling it to a file in `spill_dir` once it
/// exceeds `threshold` bytes.
///
/// The spill file is removed again unless the body is read completely.
async fn read_body(
    response: &mut reqwest::Response,
    threshold: usize,
    spill_dir: &Path,
    host: &str,
    timeout: Duration,
) -> Result<ResponseBody, CourierError> {
    let mut buffer: Vec<u8> = Vec::new();
    let mut spill: Option<(tokio::fs::File, TempPath)> = None;
    let mut size: u64 = 0;

    loop {
        let chunk = response
            .chunk()
            .await
            .map_err(|e| match transport_error(e, host, timeout) {
                HttpError::Timeout(ms) => HttpError::Timeout(ms),
                other => HttpError::Body(other.to_string()),
            })?;
        let Some(chunk) = chunk else {
            break;
        };
        size += chunk.len() as u64;

        match spill.as_mut() {
            Some((file, _)) => file.write_all(&chunk).await?,
            None => {
                buffer.extend_from_slice(&chunk);
                if buffer.len() > threshold {
                    let (mut file, path) = download_file(spill_dir)?;
                    file.write_all(&buffer).await?;
                    buffer = Vec::new();
                    tracing::debug!(path = %path.display(), "Streaming large response body to disk");
                    spill = Some((file, path));
                }
            }
        }
    }

    match spill {
        Some((mut file, path)) => {
            file.flush().await?;
            let path = path.keep().map_err(|e| e.error)?;
            Ok(ResponseBody::File { path, size })
        }
        None => Ok(ResponseBody::Text {
            content: String::from_utf8_lossy(&buffer).into_owned(),
        }),
    }
}

/// Create a temporary file for a downloaded body; deleted on drop until kept
fn download_file(dir: &Path) -> Result<(tokio::fs::File, TempPath), std::io::Error> {
    let (file, path) = tempfile::Builder::new()
        .prefix("courier-")
        .suffix(".download")
        .tempfile_in(dir)?
        .into_parts();

    Ok((tokio::fs::File::from_std(file), path))
}

/// Map a reqwest error onto the transport taxonomy
fn transport_error(err: reqwest::Error, host: &str, timeout: Duration) -> HttpError {
    let reason = error_chain(&err);

    if err.is_timeout() {
        HttpError::Timeout(timeout.as_millis() as u64)
    } else if err.is_connect() {
        let lower = reason.to_ascii_lowercase();
        if lower.contains("certificate") || lower.contains("tls") || lower.contains("handshake") {
            HttpError::Tls {
                host: host.to_string(),
                reason,
            }
        } else {
            HttpError::Connection {
                host: host.to_string(),
                reason,
            }
        }
    } else {
        HttpError::RequestFailed(reason)
    }
}

fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tls::ClientCertificateConfig;
    use wiremock::matchers::{body_string, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn executor_with(config: Config, events: EventEmitter) -> HttpExecutor {
        let tls = Arc::new(TlsMaterialProvider::new(&config.tls));
        HttpExecutor::new(&config, tls, events).unwrap()
    }

    fn executor() -> HttpExecutor {
        executor_with(Config::default(), EventEmitter::disabled())
    }

    #[tokio::test]
    async fn test_client_creation() {
        let executor = executor();
        assert!(!executor.is_insecure());
    }

    #[tokio::test]
    async fn test_get_builds_response_record() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/hello"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("hi there")
                    .insert_header("X-Test", "1"),
            )
            .mount(&server)
            .await;

        let request = PreparedRequest::new("GET", &format!("{}/hello", server.uri()));
        let response = executor().execute(&request, 0).await.unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(response.status_text, "OK");
        assert_eq!(response.header("x-test"), Some("1"));
        assert_eq!(response.body_text(), "hi there");
    }

    #[tokio::test]
    async fn test_raw_body_sent_as_is() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/raw"))
            .and(header("content-type", "text/plain"))
            .and(body_string("payload"))
            .respond_with(ResponseTemplate::new(201))
            .mount(&server)
            .await;

        let request = PreparedRequest::builder()
            .method("POST")
            .url(&format!("{}/raw", server.uri()))
            .header("Content-Type", "text/plain")
            .body("payload")
            .build();

        let response = executor().execute(&request, 0).await.unwrap();
        assert_eq!(response.status, 201);
    }

    #[tokio::test]
    async fn test_urlencoded_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("content-type", "application/x-www-form-urlencoded"))
            .and(body_string("name=John%20Doe&tag=a%26b"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let request = PreparedRequest::builder()
            .method("POST")
            .url(&server.uri())
            .form("name", "John Doe")
            .form("tag", "a&b")
            .build();

        let response = executor().execute(&request, 0).await.unwrap();
        assert_eq!(response.status, 200);
    }

    #[tokio::test]
    async fn test_multipart_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("notes.txt");
        std::fs::write(&file, "file contents").unwrap();

        let request = PreparedRequest::builder()
            .method("POST")
            .url(&server.uri())
            .header("Content-Type", "text/plain")
            .part(MultipartField::text("field", "value"))
            .part(MultipartField::file("upload", &file))
            .build();

        executor().execute(&request, 0).await.unwrap();

        let received = server.received_requests().await.unwrap();
        let content_types: Vec<_> = received[0].headers.get_all("content-type").iter().collect();
        assert_eq!(content_types.len(), 1);
        assert!(content_types[0]
            .to_str()
            .unwrap()
            .starts_with("multipart/form-data; boundary="));

        let body = String::from_utf8_lossy(&received[0].body);
        assert!(body.contains("name=\"field\""));
        assert!(body.contains("filename=\"notes.txt\""));
        assert!(body.contains("file contents"));
    }

    #[tokio::test]
    async fn test_large_body_streams_to_file() {
        let server = MockServer::start().await;
        let payload = "x".repeat(100);
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(payload.clone())
                    .insert_header("Content-Disposition", "attachment; filename=\"big.bin\""),
            )
            .mount(&server)
            .await;

        let mut config = Config::default();
        config.http.max_body_size = 16;
        let executor = executor_with(config, EventEmitter::disabled());

        let response = executor
            .execute(&PreparedRequest::new("GET", &server.uri()), 0)
            .await
            .unwrap();

        match &response.body {
            ResponseBody::File { path, size } => {
                assert_eq!(*size, 100);
                assert_eq!(std::fs::read_to_string(path).unwrap(), payload);
                std::fs::remove_file(path).unwrap();
            }
            other => panic!("expected file body, got {:?}", other),
        }
        assert_eq!(response.file_name.as_deref(), Some("big.bin"));
    }

    #[tokio::test]
    async fn test_truncated_spilled_body_leaves_no_file() {
        use tokio::io::AsyncReadExt;
        use tokio::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 1024];
            let _ = socket.read(&mut request).await;
            socket
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 1000\r\n\r\n")
                .await
                .unwrap();
            socket.write_all(&[b'x'; 100]).await.unwrap();
            socket.flush().await.unwrap();
        });

        let mut response = executor()
            .client
            .get(format!("http://{}/", addr))
            .send()
            .await
            .unwrap();
        let dir = tempfile::tempdir().unwrap();

        let result =
            read_body(&mut response, 16, dir.path(), "127.0.0.1", Duration::from_secs(5)).await;

        assert!(matches!(result, Err(CourierError::Http(HttpError::Body(_)))));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_complete_spilled_body_is_kept() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("y".repeat(64)))
            .mount(&server)
            .await;

        let mut response = executor().client.get(server.uri()).send().await.unwrap();
        let dir = tempfile::tempdir().unwrap();

        let body = read_body(&mut response, 16, dir.path(), "127.0.0.1", Duration::from_secs(5))
            .await
            .unwrap();

        match body {
            ResponseBody::File { path, size } => {
                assert_eq!(size, 64);
                assert!(path.starts_with(dir.path()));
                assert_eq!(std::fs::metadata(&path).unwrap().len(), 64);
            }
            other => panic!("expected file body, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_redirect_not_followed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(302).insert_header("Location", "/elsewhere"))
            .mount(&server)
            .await;

        let response = executor()
            .execute(&PreparedRequest::new("GET", &server.uri()), 0)
            .await
            .unwrap();
        assert_eq!(response.status, 302);
        assert_eq!(response.location(), Some("/elsewhere"));
    }

    #[tokio::test]
    async fn test_connection_refused() {
        let request = PreparedRequest::new("GET", "http://127.0.0.1:1/");
        let err = executor().execute(&request, 0).await.unwrap_err();
        assert!(matches!(
            err,
            CourierError::Http(HttpError::Connection { .. } | HttpError::Timeout(_))
        ));
    }

    #[tokio::test]
    async fn test_invalid_method_and_url() {
        let err = executor()
            .execute(&PreparedRequest::new("GET", "not a url"), 0)
            .await
            .unwrap_err();
        assert!(matches!(err, CourierError::Http(HttpError::InvalidUrl(_))));

        let err = executor()
            .execute(&PreparedRequest::new("BAD METHOD", "http://127.0.0.1:1/"), 0)
            .await
            .unwrap_err();
        assert!(matches!(err, CourierError::Http(HttpError::InvalidMethod(_))));
    }

    #[tokio::test]
    async fn test_certificate_error_before_network() {
        let mut config = Config::default();
        config.tls.client_certificates.push(ClientCertificateConfig::pfx(
            "localhost",
            "/nonexistent/client.pfx",
            Some("secret".into()),
        ));
        let executor = executor_with(config, EventEmitter::disabled());

        let err = executor
            .execute(&PreparedRequest::new("GET", "https://localhost:1/"), 0)
            .await
            .unwrap_err();
        assert!(err.is_config());
        assert!(!err.to_string().contains("secret"));
    }

    #[tokio::test]
    async fn test_events_emitted_when_enabled() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let (events, mut rx) = EventEmitter::channel(8);
        let executor = executor_with(Config::default(), events);

        let request = PreparedRequest::builder()
            .url(&server.uri())
            .emit_events(true)
            .build();
        executor.execute(&request, 3).await.unwrap();

        assert!(matches!(rx.recv().await, Some(EngineEvent::RequestStarted { hop: 3, .. })));
        assert!(matches!(
            rx.recv().await,
            Some(EngineEvent::RequestComplete { status: 204, hop: 3, .. })
        ));
    }

    #[tokio::test]
    async fn test_insecure_path_is_observable() {
        let mut config = Config::default();
        config.tls.verify_certificates = false;
        let (events, mut rx) = EventEmitter::channel(8);

        let executor = executor_with(config, events);
        assert!(executor.is_insecure());
        assert!(matches!(rx.recv().await, Some(EngineEvent::InsecureTls { host: None })));
    }
}
