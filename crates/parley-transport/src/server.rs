//! Inbound HTTP endpoint.
//!
//! [`HttpPlugin`] listens on `host:port`, accepts `POST {path}` with an
//! activity as JSON body and answers with the dispatch's
//! [`InvokeResponse`]:
//!
//! ```text
//! POST /api/messages ──parse──▶ ActivityEmitter::emit ──▶ App pipeline
//!       ◀── status + JSON body ◀──────── InvokeResponse
//! ```
//!
//! Settings come from `[plugins.http]`:
//!
//! ```toml
//! [plugins.http]
//! host = "0.0.0.0"
//! port = 3978
//! path = "/api/messages"
//! timeout_secs = 30
//! ```

use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use parking_lot::Mutex;
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use parley_core::{
    Activity, BoxedSender, ConversationReference, CredentialProvider, InvokeResponse, Token,
};
use parley_framework::{
    ActivityEmitter, Bindings, BoxError, Dependency, ErrorEmitter, EventSlot, InboundActivity,
    Logger, Plugin, PluginMetadata, PluginSettings, StreamConfig, Streamer, StreamingBuffer,
};

use crate::client::ConnectorClient;
use crate::error::TransportError;

pub const PLUGIN_NAME: &str = "http";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub host: String,
    pub port: u16,
    pub path: String,
    /// Timeout for outbound connector requests.
    pub timeout_secs: u64,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 3978,
            path: "/api/messages".into(),
            timeout_secs: 30,
        }
    }
}

impl HttpSettings {
    fn normalized_path(&self) -> String {
        if self.path.starts_with('/') {
            self.path.clone()
        } else {
            format!("/{}", self.path)
        }
    }
}

/// Everything filled in by `bind`.
struct Bound {
    emitter: ActivityEmitter,
    errors: ErrorEmitter,
    logger: Logger,
    settings: Result<HttpSettings, String>,
    stream_config: StreamConfig,
    sender: Option<BoxedSender>,
}

/// Webhook transport: receives activities over HTTP and sends replies
/// through a [`ConnectorClient`].
pub struct HttpPlugin {
    bound: OnceLock<Bound>,
    shutdown: CancellationToken,
    local_addr: OnceLock<SocketAddr>,
    server: Mutex<Option<JoinHandle<()>>>,
}

impl HttpPlugin {
    pub fn new() -> Self {
        Self {
            bound: OnceLock::new(),
            shutdown: CancellationToken::new(),
            local_addr: OnceLock::new(),
            server: Mutex::new(None),
        }
    }

    /// Address actually bound once started (resolves port 0).
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr.get().copied()
    }

    /// The axum router serving the endpoint, available after binding.
    pub fn router(&self) -> Option<Router> {
        let bound = self.bound.get()?;
        let settings = bound.settings.as_ref().ok()?;
        let state = Arc::new(EndpointState {
            emitter: bound.emitter.clone(),
            logger: bound.logger.clone(),
        });
        Some(
            Router::new()
                .route(&settings.normalized_path(), post(receive))
                .with_state(state),
        )
    }
}

impl Default for HttpPlugin {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Plugin for HttpPlugin {
    fn metadata(&self) -> PluginMetadata {
        PluginMetadata::new(PLUGIN_NAME)
            .version(env!("CARGO_PKG_VERSION"))
            .description("HTTP webhook endpoint and connector client")
    }

    fn dependencies(&self) -> Vec<Dependency> {
        vec![
            Dependency::event("activity", EventSlot::Activity),
            Dependency::event("error", EventSlot::Error),
            Dependency::logger("logger"),
            Dependency::config("settings"),
            Dependency::of::<StreamConfig>("streaming").optional(),
            Dependency::of::<dyn CredentialProvider>("credentials").optional(),
        ]
    }

    fn bind(&self, bindings: Bindings) {
        let (Some(emitter), Some(errors), Some(logger), Some(settings)) = (
            bindings.get::<ActivityEmitter>("activity"),
            bindings.get::<ErrorEmitter>("error"),
            bindings.get::<Logger>("logger"),
            bindings.get::<PluginSettings>("settings"),
        ) else {
            tracing::error!("http plugin bound without its required slots");
            return;
        };

        let settings: Result<HttpSettings, String> =
            settings.get().map_err(|err| err.to_string());
        let timeout = settings
            .as_ref()
            .map(|s| Duration::from_secs(s.timeout_secs))
            .unwrap_or(crate::client::DEFAULT_TIMEOUT);

        let sender = match ConnectorClient::with_timeout(timeout) {
            Ok(client) => {
                let client = match bindings.get::<dyn CredentialProvider>("credentials") {
                    Some(provider) => client.with_credentials(provider),
                    None => client,
                };
                Some(Arc::new(client) as BoxedSender)
            }
            Err(err) => {
                logger.error(format_args!("connector client unavailable: {err}"));
                None
            }
        };

        let stream_config = bindings
            .get::<StreamConfig>("streaming")
            .map(|config| config.as_ref().clone())
            .unwrap_or_default();

        let _ = self.bound.set(Bound {
            emitter: emitter.as_ref().clone(),
            errors: errors.as_ref().clone(),
            logger: logger.as_ref().clone(),
            settings,
            stream_config,
            sender,
        });
    }

    async fn on_start(&self) -> Result<(), BoxError> {
        let bound = self
            .bound
            .get()
            .ok_or_else(|| TransportError::Settings("plugin was never bound".into()))?;
        let settings = bound.settings.clone().map_err(TransportError::Settings)?;
        let router = self
            .router()
            .ok_or_else(|| TransportError::Settings("router unavailable".into()))?;

        let listener = TcpListener::bind((settings.host.as_str(), settings.port))
            .await
            .map_err(TransportError::Io)?;
        let addr = listener.local_addr().map_err(TransportError::Io)?;
        let _ = self.local_addr.set(addr);
        bound.logger.info(format_args!(
            "listening on http://{addr}{}",
            settings.normalized_path()
        ));

        let shutdown = self.shutdown.clone();
        let errors = bound.errors.clone();
        let handle = tokio::spawn(async move {
            let served = axum::serve(listener, router)
                .with_graceful_shutdown(shutdown.cancelled_owned())
                .await;
            if let Err(err) = served {
                errors.emit(TransportError::Io(err)).await;
            }
        });
        *self.server.lock() = Some(handle);
        Ok(())
    }

    async fn on_stop(&self) -> Result<(), BoxError> {
        self.shutdown.cancel();
        let handle = self.server.lock().take();
        if let Some(handle) = handle {
            handle.await?;
        }
        if let Some(bound) = self.bound.get() {
            bound.logger.info("stopped");
        }
        Ok(())
    }

    fn sender(&self) -> Option<BoxedSender> {
        self.bound.get()?.sender.clone()
    }

    fn create_stream(&self, reference: &Arc<ConversationReference>) -> Option<Arc<dyn Streamer>> {
        let bound = self.bound.get()?;
        let sender = bound.sender.clone()?;
        Some(Arc::new(StreamingBuffer::new(
            sender,
            reference.clone(),
            bound.stream_config.clone(),
        )))
    }
}

// ─── Endpoint ─────────────────────────────────────────────────────────────────

struct EndpointState {
    emitter: ActivityEmitter,
    logger: Logger,
}

async fn receive(
    State(state): State<Arc<EndpointState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let activity: Activity = match serde_json::from_slice(&body) {
        Ok(activity) => activity,
        Err(err) => {
            state.logger.warn(format_args!("rejecting malformed activity: {err}"));
            return (StatusCode::BAD_REQUEST, err.to_string()).into_response();
        }
    };

    let mut inbound = InboundActivity::new(activity);
    if let Some(token) = bearer_token(&headers) {
        inbound = inbound.with_token(token);
    }

    into_http(state.emitter.emit(inbound).await)
}

fn bearer_token(headers: &HeaderMap) -> Option<Token> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    (scheme.eq_ignore_ascii_case("bearer") && !token.trim().is_empty())
        .then(|| Token::new(token.trim()))
}

fn into_http(response: InvokeResponse) -> Response {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    match response.body {
        Some(body) => (status, Json(body)).into_response(),
        None => status.into_response(),
    }
}
