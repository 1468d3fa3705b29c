//! Request engine
//!
//! Owns the executor, the redirect resolver, the TLS material cache and
//! the session log. Every top-level request runs on its own task; hops
//! inside one resolution run one after another.

use std::sync::Arc;
use tokio::task::JoinHandle;
use url::Url;

use crate::app::{Config, EventEmitter};
use crate::error::{CourierError, HttpError};
use crate::http::{HeaderList, HttpExecutor, PreparedRequest, RedirectChain, RedirectResolver};
use crate::stream::{
    connect_event_source, connect_websocket, EventSourceHandle, EventSourceListener,
    ObservationSink, ObservedEventSource, ObservedWebSocket, SessionLog, WebSocketHandle,
    WebSocketListener,
};
use crate::tls::TlsMaterialProvider;

/// HTTP request engine
pub struct Engine {
    /// Redirect resolver over the live executor
    resolver: Arc<RedirectResolver<HttpExecutor>>,

    /// Identity material cache, kept across reconfiguration
    tls: Arc<TlsMaterialProvider>,

    /// Event publisher
    events: EventEmitter,

    /// Streaming session history
    sessions: Arc<SessionLog>,

    /// Receives streaming observations, the session log unless replaced
    sink: Arc<dyn ObservationSink>,

    /// Active configuration
    config: Config,
}

impl Engine {
    /// Create a new engine
    pub fn new(config: Config, events: EventEmitter) -> Result<Self, CourierError> {
        config.validate()?;

        let tls = Arc::new(TlsMaterialProvider::new(&config.tls));
        let resolver = Self::build_resolver(&config, tls.clone(), events.clone())?;
        let sessions = Arc::new(SessionLog::new(&config.streaming));

        Ok(Self {
            resolver,
            tls,
            events,
            sink: sessions.clone(),
            sessions,
            config,
        })
    }

    fn build_resolver(
        config: &Config,
        tls: Arc<TlsMaterialProvider>,
        events: EventEmitter,
    ) -> Result<Arc<RedirectResolver<HttpExecutor>>, CourierError> {
        let executor = HttpExecutor::new(config, tls, events)?;
        Ok(Arc::new(RedirectResolver::new(
            executor,
            config.http.max_redirects,
        )))
    }

    /// Apply new settings.
    ///
    /// Cached identity material whose configuration or verification
    /// policy changed is invalidated. Requests already running finish
    /// with the settings they started with.
    pub fn reconfigure(&mut self, config: Config) -> Result<(), CourierError> {
        config.validate()?;

        self.tls.apply(&config.tls);
        self.resolver = Self::build_resolver(&config, self.tls.clone(), self.events.clone())?;
        self.config = config;

        tracing::info!("Engine reconfigured");
        Ok(())
    }

    /// Execute a request and follow redirects
    pub async fn send(&self, request: &PreparedRequest) -> Result<RedirectChain, CourierError> {
        self.resolver.resolve(request).await
    }

    /// Execute a request on a background task
    pub fn spawn(&self, request: PreparedRequest) -> JoinHandle<Result<RedirectChain, CourierError>> {
        let resolver = self.resolver.clone();

        tokio::spawn(async move {
            let result = resolver.resolve(&request).await;
            if let Err(e) = &result {
                tracing::warn!(request_id = %request.id, "Request failed: {}", e);
            }
            result
        })
    }

    /// Open a WebSocket session observed by the engine's sink
    pub async fn open_websocket<L>(
        &self,
        url: &str,
        headers: &HeaderList,
        listener: L,
    ) -> Result<WebSocketHandle, CourierError>
    where
        L: WebSocketListener + 'static,
    {
        let parsed =
            Url::parse(url).map_err(|e| HttpError::InvalidUrl(format!("{} ({})", url, e)))?;
        let tls = self.executor().websocket_tls(&parsed)?;
        let relay = ObservedWebSocket::new(listener, self.sink.clone());

        connect_websocket(url, headers, tls, relay).await
    }

    /// Open a Server-Sent Events session observed by the engine's sink
    pub async fn open_event_source<L>(
        &self,
        request: &PreparedRequest,
        listener: L,
    ) -> Result<EventSourceHandle, CourierError>
    where
        L: EventSourceListener + 'static,
    {
        let relay = ObservedEventSource::new(listener, self.sink.clone());
        connect_event_source(self.executor(), request, relay).await
    }

    /// Replace the observation sink for sessions opened from now on
    pub fn set_observation_sink(&mut self, sink: Arc<dyn ObservationSink>) {
        self.sink = sink;
    }

    pub fn sessions(&self) -> &Arc<SessionLog> {
        &self.sessions
    }

    /// Single executor call without redirect handling
    pub fn executor(&self) -> &HttpExecutor {
        self.resolver.executor()
    }

    pub fn tls(&self) -> &Arc<TlsMaterialProvider> {
        &self.tls
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}
