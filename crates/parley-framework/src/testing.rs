//! In-memory collaborators shared by the unit tests of this crate.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use parley_core::{
    Activity, ActivitySender, ApiError, ApiResult, ConversationReference, InvokeResponse,
    ResourceResponse,
};

use crate::context::{ActivityContext, ApiClient, ContextParts, Credentials};
use crate::handler::BoxedHandler;
use crate::plugin::{ActivitySentEvent, ErrorEvent, EventSink, InboundActivity};
use crate::stream::NoopStreamer;

#[derive(Debug, Clone)]
pub(crate) enum SentCall {
    Send(Activity),
    Update(String, Activity),
}

impl SentCall {
    pub(crate) fn activity(&self) -> Option<&Activity> {
        match self {
            Self::Send(activity) | Self::Update(_, activity) => Some(activity),
        }
    }
}

/// Records successful calls; fails the next `n` calls on request.
#[derive(Default)]
pub(crate) struct RecordingSender {
    calls: Mutex<Vec<SentCall>>,
    attempts: Mutex<Vec<Instant>>,
    failures_left: Mutex<usize>,
    sends: Mutex<usize>,
    update_delay: Mutex<Option<Duration>>,
}

impl RecordingSender {
    pub(crate) fn fail_next(&self, n: usize) {
        *self.failures_left.lock() = n;
    }

    /// Makes every later update take `delay` before it is recorded.
    pub(crate) fn slow_updates(&self, delay: Duration) {
        *self.update_delay.lock() = Some(delay);
    }

    pub(crate) fn calls(&self) -> Vec<SentCall> {
        self.calls.lock().clone()
    }

    pub(crate) fn sends(&self) -> Vec<Activity> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                SentCall::Send(activity) => Some(activity.clone()),
                SentCall::Update(..) => None,
            })
            .collect()
    }

    pub(crate) fn send_count(&self) -> usize {
        *self.sends.lock()
    }

    /// Times of every call, failed or not.
    pub(crate) fn attempts(&self) -> Vec<Instant> {
        self.attempts.lock().clone()
    }

    fn attempt(&self) -> ApiResult<()> {
        self.attempts.lock().push(Instant::now());
        let mut left = self.failures_left.lock();
        if *left > 0 {
            *left -= 1;
            return Err(ApiError::Http {
                status: 502,
                body: "bad gateway".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ActivitySender for RecordingSender {
    async fn send_activity(
        &self,
        _reference: &ConversationReference,
        activity: &Activity,
    ) -> ApiResult<ResourceResponse> {
        self.attempt()?;
        let id = {
            let mut sends = self.sends.lock();
            *sends += 1;
            format!("activity-{}", *sends)
        };
        self.calls.lock().push(SentCall::Send(activity.clone()));
        Ok(ResourceResponse::new(id))
    }

    async fn update_activity(
        &self,
        _reference: &ConversationReference,
        id: &str,
        activity: &Activity,
    ) -> ApiResult<ResourceResponse> {
        let delay = *self.update_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.attempt()?;
        self.calls
            .lock()
            .push(SentCall::Update(id.to_owned(), activity.clone()));
        Ok(ResourceResponse::new(id))
    }
}

/// Answers every inbound activity with 200 and records all events.
#[derive(Default)]
pub(crate) struct RecordingSink {
    inbound: Mutex<Vec<(String, Option<String>)>>,
    errors: Mutex<Vec<ErrorEvent>>,
    sent: Mutex<Vec<ActivitySentEvent>>,
}

impl RecordingSink {
    pub(crate) fn inbound(&self) -> Vec<(String, Option<String>)> {
        self.inbound.lock().clone()
    }

    pub(crate) fn errors(&self) -> Vec<ErrorEvent> {
        self.errors.lock().clone()
    }

    pub(crate) fn sent(&self) -> Vec<ActivitySentEvent> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl EventSink for RecordingSink {
    async fn on_activity(&self, plugin: &str, inbound: InboundActivity) -> InvokeResponse {
        self.inbound
            .lock()
            .push((plugin.to_owned(), inbound.activity.text));
        InvokeResponse::ok()
    }

    async fn on_error(&self, event: ErrorEvent) {
        self.errors.lock().push(event);
    }

    async fn on_activity_sent(&self, event: ActivitySentEvent) {
        self.sent.lock().push(event);
    }
}

/// A disconnected context over `activity` running `routes`.
pub(crate) fn context(activity: Activity, routes: Vec<BoxedHandler>) -> ActivityContext {
    let activity = Arc::new(activity);
    let reference = Arc::new(ConversationReference::from_activity(&activity));
    ActivityContext::new(
        ContextParts {
            plugin: "test".into(),
            api: ApiClient::new(None, reference.clone(), Credentials::default()),
            activity,
            reference,
            stream: Arc::new(NoopStreamer),
            sink: Arc::new(RecordingSink::default()),
        },
        routes,
    )
}
