//! Host events and the per-plugin emitters that feed them.

use std::error::Error as StdError;
use std::fmt;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use tracing::warn;

use parley_core::{Activity, ConversationReference, InvokeResponse, SentActivity, Token};

use crate::error::BoxError;

/// An inbound activity as delivered by a transport.
#[derive(Debug, Clone)]
pub struct InboundActivity {
    pub activity: Activity,
    /// Bearer token the request was authenticated with, if any.
    pub token: Option<Token>,
}

impl InboundActivity {
    pub fn new(activity: Activity) -> Self {
        Self {
            activity,
            token: None,
        }
    }

    pub fn with_token(mut self, token: Token) -> Self {
        self.token = Some(token);
        self
    }
}

/// An activity left the process.
#[derive(Debug, Clone)]
pub struct ActivitySentEvent {
    /// Plugin the originating dispatch came through (or `"app"` for
    /// proactive sends).
    pub plugin: String,
    pub reference: Arc<ConversationReference>,
    pub sent: SentActivity,
}

/// A dispatch finished and produced its response.
#[derive(Debug, Clone)]
pub struct ActivityResponseEvent {
    pub plugin: String,
    pub activity: Arc<Activity>,
    pub response: InvokeResponse,
}

/// A failure reported by a plugin or a dispatch.
#[derive(Debug, Clone)]
pub struct ErrorEvent {
    pub plugin: String,
    pub error: Arc<dyn StdError + Send + Sync>,
    /// The activity being processed, when the error came from a dispatch.
    pub activity: Option<Arc<Activity>>,
}

/// The host side of the plugin event slots.
#[async_trait]
pub trait EventSink: Send + Sync + 'static {
    /// Runs an inbound activity through the dispatch pipeline.
    async fn on_activity(&self, plugin: &str, inbound: InboundActivity) -> InvokeResponse;

    async fn on_error(&self, event: ErrorEvent);

    async fn on_activity_sent(&self, event: ActivitySentEvent);
}

// ─── Emitters ─────────────────────────────────────────────────────────────────

/// Pushes inbound activities into the host, tagged with the owning plugin.
#[derive(Clone)]
pub struct ActivityEmitter {
    plugin: Arc<str>,
    sink: Weak<dyn EventSink>,
}

impl ActivityEmitter {
    pub fn new(plugin: impl Into<Arc<str>>, sink: Weak<dyn EventSink>) -> Self {
        Self {
            plugin: plugin.into(),
            sink,
        }
    }

    pub fn plugin(&self) -> &str {
        &self.plugin
    }

    /// Dispatches `inbound` and resolves to the response for the platform.
    ///
    /// Answers `503` once the host is gone.
    pub async fn emit(&self, inbound: InboundActivity) -> InvokeResponse {
        match self.sink.upgrade() {
            Some(sink) => sink.on_activity(&self.plugin, inbound).await,
            None => {
                warn!(plugin = %self.plugin, "activity emitted after host shutdown");
                InvokeResponse::new(503)
            }
        }
    }
}

impl fmt::Debug for ActivityEmitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActivityEmitter")
            .field("plugin", &self.plugin)
            .finish_non_exhaustive()
    }
}

/// Reports plugin failures to the host's error hooks.
#[derive(Clone)]
pub struct ErrorEmitter {
    plugin: Arc<str>,
    sink: Weak<dyn EventSink>,
}

impl ErrorEmitter {
    pub fn new(plugin: impl Into<Arc<str>>, sink: Weak<dyn EventSink>) -> Self {
        Self {
            plugin: plugin.into(),
            sink,
        }
    }

    pub async fn emit(&self, error: impl Into<BoxError>) {
        let error: BoxError = error.into();
        match self.sink.upgrade() {
            Some(sink) => {
                sink.on_error(ErrorEvent {
                    plugin: self.plugin.to_string(),
                    error: Arc::from(error),
                    activity: None,
                })
                .await
            }
            None => warn!(plugin = %self.plugin, %error, "error emitted after host shutdown"),
        }
    }
}

impl fmt::Debug for ErrorEmitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorEmitter")
            .field("plugin", &self.plugin)
            .finish_non_exhaustive()
    }
}
