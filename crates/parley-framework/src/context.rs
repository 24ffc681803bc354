//! Per-dispatch context and the continuation chain.
//!
//! One [`ActivityContext`] is created for every inbound activity that matched
//! at least one route. Cloning it is cheap (a single `Arc`), which is how the
//! same context reaches every handler of the chain; it is never reused for a
//! second activity.
//!
//! The chain is an explicit cursor over the selected handlers:
//!
//! ```text
//!  next() ──▶ handler[0] ──next()──▶ handler[1] ──next()──▶ … ──▶ (end)
//!     ◀── response ◀──────────── response ◀──────────────────────
//! ```
//!
//! A handler that never calls [`ActivityContext::next`] ends the chain: the
//! handlers after it are not invoked.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use parley_core::{
    Activity, ActivityType, ApiError, ApiResult, BoxedSender, ConversationReference,
    InvokeResponse, ResourceResponse, SentActivity, Token,
};

use crate::error::HandlerResult;
use crate::handler::BoxedHandler;
use crate::plugin::{ActivitySentEvent, EventSink};
use crate::stream::{StreamFragment, Streamer};

// =============================================================================
// Credentials & ApiClient
// =============================================================================

/// Bearer credentials resolved for one dispatch. Each may be absent.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    /// Token the inbound request was authenticated with.
    pub bot: Option<Token>,
    /// The app's own token for the activity's tenant.
    pub app: Option<Token>,
    /// The sender's token for the configured OAuth connection.
    pub user: Option<Token>,
}

impl Credentials {
    /// `true` when the sender holds a user token.
    pub fn is_signed_in(&self) -> bool {
        self.user.is_some()
    }
}

/// Outbound calls addressed to the current conversation.
#[derive(Clone)]
pub struct ApiClient {
    sender: Option<BoxedSender>,
    reference: Arc<ConversationReference>,
    credentials: Credentials,
}

impl ApiClient {
    pub fn new(
        sender: Option<BoxedSender>,
        reference: Arc<ConversationReference>,
        credentials: Credentials,
    ) -> Self {
        Self {
            sender,
            reference,
            credentials,
        }
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn reference(&self) -> &ConversationReference {
        &self.reference
    }

    pub fn is_connected(&self) -> bool {
        self.sender.is_some()
    }

    pub async fn send_activity(&self, activity: &Activity) -> ApiResult<ResourceResponse> {
        let sender = self.sender.as_ref().ok_or(ApiError::NoSender)?;
        sender.send_activity(&self.reference, activity).await
    }

    pub async fn update_activity(
        &self,
        id: &str,
        activity: &Activity,
    ) -> ApiResult<ResourceResponse> {
        let sender = self.sender.as_ref().ok_or(ApiError::NoSender)?;
        sender.update_activity(&self.reference, id, activity).await
    }
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("connected", &self.is_connected())
            .field("conversation", &self.reference.conversation.id)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Chain
// =============================================================================

struct ChainState {
    /// Index of the next handler to invoke.
    cursor: usize,
    /// Latest defined handler return value.
    response: Option<InvokeResponse>,
}

struct Chain {
    routes: Vec<BoxedHandler>,
    state: Mutex<ChainState>,
}

impl Chain {
    fn new(routes: Vec<BoxedHandler>) -> Self {
        Self {
            routes,
            state: Mutex::new(ChainState {
                cursor: 0,
                response: None,
            }),
        }
    }

    /// Takes the next handler, or `None` when the chain is exhausted.
    fn advance(&self) -> Option<BoxedHandler> {
        let mut state = self.state.lock();
        let handler = self.routes.get(state.cursor)?.clone();
        state.cursor += 1;
        Some(handler)
    }

    fn record(&self, response: Option<InvokeResponse>) -> Option<InvokeResponse> {
        let mut state = self.state.lock();
        if response.is_some() {
            state.response = response;
        }
        state.response.clone()
    }

    fn response(&self) -> Option<InvokeResponse> {
        self.state.lock().response.clone()
    }
}

// =============================================================================
// ActivityContext
// =============================================================================

/// Everything the host hands over when building a context.
pub struct ContextParts {
    /// Name of the plugin that received the activity.
    pub plugin: String,
    pub activity: Arc<Activity>,
    pub reference: Arc<ConversationReference>,
    pub api: ApiClient,
    pub stream: Arc<dyn Streamer>,
    pub sink: Arc<dyn EventSink>,
}

struct ContextInner {
    plugin: String,
    activity: Arc<Activity>,
    reference: Arc<ConversationReference>,
    api: ApiClient,
    stream: Arc<dyn Streamer>,
    sink: Arc<dyn EventSink>,
    state: Mutex<HashMap<TypeId, Box<dyn Any + Send + Sync>>>,
    chain: Chain,
}

/// The context handed to every handler of one dispatch.
#[derive(Clone)]
pub struct ActivityContext {
    inner: Arc<ContextInner>,
}

impl ActivityContext {
    /// Builds a context whose chain runs `routes` in order.
    pub fn new(parts: ContextParts, routes: Vec<BoxedHandler>) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                plugin: parts.plugin,
                activity: parts.activity,
                reference: parts.reference,
                api: parts.api,
                stream: parts.stream,
                sink: parts.sink,
                state: Mutex::new(HashMap::new()),
                chain: Chain::new(routes),
            }),
        }
    }

    pub fn activity(&self) -> &Activity {
        &self.inner.activity
    }

    pub fn reference(&self) -> &ConversationReference {
        &self.inner.reference
    }

    /// Name of the plugin the activity arrived through.
    pub fn plugin(&self) -> &str {
        &self.inner.plugin
    }

    pub fn api(&self) -> &ApiClient {
        &self.inner.api
    }

    pub fn credentials(&self) -> &Credentials {
        self.inner.api.credentials()
    }

    pub fn stream(&self) -> &Arc<dyn Streamer> {
        &self.inner.stream
    }

    /// Shorthand for `ctx.stream().emit(fragment.into())`.
    pub fn emit(&self, fragment: impl Into<StreamFragment>) {
        self.inner.stream.emit(fragment.into());
    }

    /// Runs the rest of the chain.
    ///
    /// Invokes the next selected handler and records its return value when it
    /// produced one, then resolves to the current response. When the chain is
    /// already exhausted it resolves to the current response immediately.
    pub async fn next(&self) -> HandlerResult {
        let chain = &self.inner.chain;
        let Some(handler) = chain.advance() else {
            return Ok(chain.response());
        };

        let response = handler(self.clone()).await?;
        trace!(has_response = response.is_some(), "handler returned");
        Ok(chain.record(response))
    }

    /// The response recorded so far.
    pub fn response(&self) -> Option<InvokeResponse> {
        self.inner.chain.response()
    }

    // ─── Outbound helpers ─────────────────────────────────────────────────────

    /// Sends an activity into the current conversation.
    pub async fn send(&self, activity: Activity) -> ApiResult<SentActivity> {
        let activity = self.inner.reference.apply(activity);
        activity.validate()?;

        let resource = self.inner.api.send_activity(&activity).await?;
        let sent = SentActivity::new(resource.id, activity);
        self.inner
            .sink
            .on_activity_sent(ActivitySentEvent {
                plugin: self.inner.plugin.clone(),
                reference: self.inner.reference.clone(),
                sent: sent.clone(),
            })
            .await;
        Ok(sent)
    }

    /// Sends an activity as a reply to the inbound one.
    pub async fn reply(&self, mut activity: Activity) -> ApiResult<SentActivity> {
        if activity.reply_to_id.is_none() {
            activity.reply_to_id = self.inner.activity.id.clone();
        }
        self.send(activity).await
    }

    /// Sends a typing indicator.
    pub async fn typing(&self) -> ApiResult<SentActivity> {
        self.send(Activity::new(ActivityType::TYPING)).await
    }

    // ─── State ────────────────────────────────────────────────────────────────

    /// Stores a value for the rest of this dispatch, replacing any previous
    /// value of the same type.
    pub fn set_state<T: Send + Sync + 'static>(&self, value: T) {
        self.inner
            .state
            .lock()
            .insert(TypeId::of::<T>(), Box::new(value));
    }

    /// Returns a clone of the stored value of type `T`.
    pub fn get_state<T: Clone + Send + Sync + 'static>(&self) -> Option<T> {
        self.inner
            .state
            .lock()
            .get(&TypeId::of::<T>())
            .and_then(|value| value.downcast_ref::<T>())
            .cloned()
    }

    /// Removes and returns the stored value of type `T`.
    pub fn take_state<T: Send + Sync + 'static>(&self) -> Option<T> {
        self.inner
            .state
            .lock()
            .remove(&TypeId::of::<T>())
            .and_then(|value| value.downcast::<T>().ok())
            .map(|value| *value)
    }
}

impl fmt::Debug for ActivityContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActivityContext")
            .field("plugin", &self.inner.plugin)
            .field("activity_type", self.inner.activity.activity_type())
            .field("activity_id", &self.inner.activity.id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::handler::into_handler;
    use crate::stream::NoopStreamer;
    use crate::testing::{RecordingSender, RecordingSink};
    use serde_json::json;

    pub(crate) fn inbound() -> Activity {
        serde_json::from_value(json!({
            "type": "message",
            "id": "in-1",
            "serviceUrl": "https://connector.example/",
            "channelId": "test",
            "from": { "id": "user-1" },
            "recipient": { "id": "bot-1" },
            "conversation": { "id": "conv-1" },
            "text": "ping"
        }))
        .unwrap()
    }

    fn context(
        routes: Vec<BoxedHandler>,
        sender: Option<BoxedSender>,
        sink: Arc<RecordingSink>,
    ) -> ActivityContext {
        let activity = Arc::new(inbound());
        let reference = Arc::new(ConversationReference::from_activity(&activity));
        ActivityContext::new(
            ContextParts {
                plugin: "test".into(),
                api: ApiClient::new(sender, reference.clone(), Credentials::default()),
                activity,
                reference,
                stream: Arc::new(NoopStreamer),
                sink,
            },
            routes,
        )
    }

    #[tokio::test]
    async fn handler_without_next_ends_chain() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let first = calls.clone();
        let second = calls.clone();
        let routes = vec![
            into_handler(move |_ctx| {
                let calls = first.clone();
                async move { calls.lock().push("first") }
            }),
            into_handler(move |_ctx| {
                let calls = second.clone();
                async move { calls.lock().push("second") }
            }),
        ];

        let ctx = context(routes, None, Arc::default());
        let response = ctx.next().await.unwrap();

        assert!(response.is_none());
        assert_eq!(*calls.lock(), vec!["first"]);
    }

    #[tokio::test]
    async fn later_return_overwrites_earlier() {
        let routes = vec![
            into_handler(|ctx: ActivityContext| async move {
                ctx.next().await?;
                Ok::<_, crate::BoxError>(InvokeResponse::new(201))
            }),
            into_handler(|ctx: ActivityContext| async move {
                ctx.next().await?;
                Ok::<_, crate::BoxError>(InvokeResponse::new(202))
            }),
        ];

        let ctx = context(routes, None, Arc::default());
        let response = ctx.next().await.unwrap();

        // The inner handler returns first; the outer one returns last.
        assert_eq!(response.map(|r| r.status), Some(201));
    }

    #[tokio::test]
    async fn next_past_end_returns_current_response() {
        let routes = vec![into_handler(|ctx: ActivityContext| async move {
            let after = ctx.next().await?;
            assert!(after.is_none());
            Ok::<_, crate::BoxError>(InvokeResponse::new(204))
        })];

        let ctx = context(routes, None, Arc::default());
        assert_eq!(ctx.next().await.unwrap().map(|r| r.status), Some(204));
        assert_eq!(ctx.next().await.unwrap().map(|r| r.status), Some(204));
    }

    #[tokio::test]
    async fn state_is_typed_and_per_context() {
        #[derive(Clone, Debug, PartialEq)]
        struct Marker(u32);

        let routes = vec![
            into_handler(|ctx: ActivityContext| async move {
                ctx.set_state(Marker(7));
                ctx.next().await
            }),
            into_handler(|ctx: ActivityContext| async move {
                assert_eq!(ctx.get_state::<Marker>(), Some(Marker(7)));
            }),
        ];

        let ctx = context(routes, None, Arc::default());
        tokio_test::assert_ok!(ctx.next().await);
        assert_eq!(ctx.take_state::<Marker>(), Some(Marker(7)));
        assert_eq!(ctx.get_state::<Marker>(), None);
    }

    #[tokio::test]
    async fn reply_is_addressed_and_reported() {
        let sender = Arc::new(RecordingSender::default());
        let sink = Arc::new(RecordingSink::default());
        let ctx = context(Vec::new(), Some(sender.clone()), sink.clone());

        let sent = ctx.reply(Activity::message("pong")).await.unwrap();

        let sends = sender.sends();
        assert_eq!(sends.len(), 1);
        assert_eq!(sends[0].text.as_deref(), Some("pong"));
        assert_eq!(sends[0].reply_to_id.as_deref(), Some("in-1"));
        assert_eq!(sends[0].service_url.as_deref(), Some("https://connector.example"));
        assert_eq!(sends[0].recipient.id, "user-1");
        assert_eq!(sink.sent().len(), 1);
        assert_eq!(sink.sent()[0].sent.id, sent.id);
    }

    #[tokio::test]
    async fn send_without_sender_fails() {
        let ctx = context(Vec::new(), None, Arc::default());
        let err = ctx.send(Activity::message("lost")).await.unwrap_err();
        assert!(matches!(err, ApiError::NoSender));
    }

    #[tokio::test]
    async fn empty_message_is_rejected_before_send() {
        let sender = Arc::new(RecordingSender::default());
        let ctx = context(Vec::new(), Some(sender.clone()), Arc::default());

        let err = ctx.send(Activity::new(ActivityType::MESSAGE)).await.unwrap_err();
        assert!(matches!(err, ApiError::Invalid(_)));
        assert!(sender.sends().is_empty());
    }
}
