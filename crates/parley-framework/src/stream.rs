//! Progressive responses.
//!
//! A handler emits many small [`StreamFragment`]s; the [`StreamingBuffer`]
//! coalesces them and pushes a bounded number of progress updates to the
//! platform, then finalizes everything into one `message` on close.
//!
//! ```text
//!  emit("Hel") emit("lo")        emit(" world")                  close()
//!      │          │                   │                             │
//!      ▼          ▼   debounce        ▼   debounce                  ▼
//!  ┌─────────────────┐──────▶ flush ──────────▶ flush ──▶ … ──▶ final message
//!  │ queue           │        typing #1         typing #2        (update #id)
//!  └─────────────────┘        (send → #id)      (update #id)
//! ```
//!
//! Flushing rules:
//!
//! - A flush merges a batch of `max(1, round(len / batch_divisor))` queued
//!   fragments, FIFO. Text is appended, attachments and entities are
//!   concatenated, channel data is shallow-merged with later keys winning.
//! - The first successful flush captures the activity id; every later flush
//!   and the final message update that id.
//! - On success the failure count resets and, if fragments remain, the next
//!   flush runs after `interval`.
//! - On failure the merge is discarded, the failure count grows by two, and
//!   the flush is retried after `(failures + 1) × interval`. Failed flushes
//!   are never abandoned.
//! - Flushes never overlap.
//! - Fragments emitted while the final message is in flight are drained
//!   and the same activity is finalized again before `close` returns.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use tokio::sync::{Mutex as AsyncMutex, broadcast};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use parley_core::{
    Activity, ActivityType, ApiResult, Attachment, BoxedSender, ConversationReference, Entity,
    ResourceResponse, SentActivity,
};

/// Entity type carrying stream metadata.
pub const STREAM_INFO: &str = "streaminfo";

// ─── Streamer ─────────────────────────────────────────────────────────────────

/// The stream handle a handler sees as `ctx.stream()`.
#[async_trait]
pub trait Streamer: Send + Sync + 'static {
    /// Queues a fragment. Never blocks and never fails.
    fn emit(&self, fragment: StreamFragment);

    /// Flushes everything and sends the finalized activity.
    ///
    /// Resolves to `None` when nothing was emitted.
    async fn close(&self) -> ApiResult<Option<SentActivity>>;
}

/// A stream that discards everything; used when the transport offers none.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopStreamer;

#[async_trait]
impl Streamer for NoopStreamer {
    fn emit(&self, _fragment: StreamFragment) {}

    async fn close(&self) -> ApiResult<Option<SentActivity>> {
        Ok(None)
    }
}

// ─── Fragments ────────────────────────────────────────────────────────────────

/// A partial piece of the outbound activity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamFragment {
    pub text: Option<String>,
    pub attachments: Vec<Attachment>,
    pub entities: Vec<Entity>,
    pub channel_data: Option<Map<String, Value>>,
}

impl StreamFragment {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    pub fn with_entity(mut self, entity: Entity) -> Self {
        self.entities.push(entity);
        self
    }

    pub fn with_channel_data(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.channel_data
            .get_or_insert_with(Map::new)
            .insert(key.into(), value.into());
        self
    }
}

impl From<&str> for StreamFragment {
    fn from(value: &str) -> Self {
        Self::text(value)
    }
}

impl From<String> for StreamFragment {
    fn from(value: String) -> Self {
        Self::text(value)
    }
}

impl From<Attachment> for StreamFragment {
    fn from(value: Attachment) -> Self {
        Self::default().with_attachment(value)
    }
}

// ─── Configuration & events ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConfig {
    /// Quiet period after an emit before a flush.
    pub debounce: Duration,
    /// Base delay between consecutive flushes, and the backoff unit.
    pub interval: Duration,
    /// How often `close` checks for a drained queue.
    pub close_poll: Duration,
    /// A flush merges roughly `queue length / batch_divisor` fragments.
    pub batch_divisor: usize,
    /// Extra attempts for the final message before `close` gives up.
    pub final_retries: u32,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(200),
            interval: Duration::from_millis(500),
            close_poll: Duration::from_millis(200),
            batch_divisor: 10,
            final_retries: 2,
        }
    }
}

/// Notifications broadcast by a [`StreamingBuffer`].
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// A progress update reached the platform.
    Chunk { sequence: u64, id: String },
    /// The finalized activity was sent.
    Closed(SentActivity),
}

// ─── StreamingBuffer ──────────────────────────────────────────────────────────

#[derive(Default)]
struct Accumulator {
    text: String,
    attachments: Vec<Attachment>,
    entities: Vec<Entity>,
    channel_data: Map<String, Value>,
    sequence: u64,
    queue: VecDeque<StreamFragment>,
    id: Option<String>,
    failures: u32,
    /// Set by the first emit of a turn.
    used: bool,
    timer: Option<JoinHandle<()>>,
    /// Bumped on every (re)schedule; a timer only flushes if it is current.
    generation: u64,
}

impl Accumulator {
    /// Everything but the queue and the timer goes back to empty.
    fn reset(&mut self) {
        self.text.clear();
        self.attachments.clear();
        self.entities.clear();
        self.channel_data.clear();
        self.sequence = 0;
        self.id = None;
        self.failures = 0;
        self.used = !self.queue.is_empty();
    }
}

/// Merge result of one batch, committed only if the send succeeds.
struct Merged {
    taken: usize,
    text: String,
    attachments: Vec<Attachment>,
    entities: Vec<Entity>,
    channel_data: Map<String, Value>,
}

struct Inner {
    sender: BoxedSender,
    reference: Arc<ConversationReference>,
    config: StreamConfig,
    state: Mutex<Accumulator>,
    /// Serializes flushes and the final send.
    flushing: AsyncMutex<()>,
    events: broadcast::Sender<StreamEvent>,
}

/// Coalesces stream fragments into a few progress updates and one final
/// message. See the [module docs](self) for the flushing rules.
///
/// Must be used inside a Tokio runtime: timers are spawned tasks.
#[derive(Clone)]
pub struct StreamingBuffer {
    inner: Arc<Inner>,
}

impl StreamingBuffer {
    pub fn new(
        sender: BoxedSender,
        reference: Arc<ConversationReference>,
        config: StreamConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            inner: Arc::new(Inner {
                sender,
                reference,
                config,
                state: Mutex::new(Accumulator::default()),
                flushing: AsyncMutex::new(()),
                events,
            }),
        }
    }

    pub fn config(&self) -> &StreamConfig {
        &self.inner.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StreamEvent> {
        self.inner.events.subscribe()
    }

    /// Fragments still waiting to be merged.
    pub fn pending(&self) -> usize {
        self.inner.state.lock().queue.len()
    }

    /// Id captured by the first successful flush of the current turn.
    pub fn activity_id(&self) -> Option<String> {
        self.inner.state.lock().id.clone()
    }

    /// Runs one flush now instead of waiting for the timer.
    pub async fn flush(&self) {
        Inner::flush(&self.inner).await;
    }
}

impl fmt::Debug for StreamingBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("StreamingBuffer")
            .field("conversation", &self.inner.reference.conversation.id)
            .field("sequence", &state.sequence)
            .field("queued", &state.queue.len())
            .field("id", &state.id)
            .finish_non_exhaustive()
    }
}

impl Inner {
    /// Replaces the pending timer with one firing after `delay`.
    ///
    /// Only a timer that has not fired yet is aborted; a firing timer clears
    /// its own handle before flushing.
    fn schedule(self: &Arc<Self>, state: &mut Accumulator, delay: Duration) {
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        state.generation = state.generation.wrapping_add(1);
        let generation = state.generation;
        let weak: Weak<Self> = Arc::downgrade(self);

        state.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            {
                let mut state = inner.state.lock();
                if state.generation != generation {
                    return;
                }
                state.timer = None;
            }
            Inner::flush(&inner).await;
        }));
    }

    fn batch_size(&self, queued: usize) -> usize {
        let divisor = self.config.batch_divisor.max(1);
        ((queued + divisor / 2) / divisor).max(1)
    }

    fn merge(&self, state: &Accumulator) -> Merged {
        let taken = self.batch_size(state.queue.len()).min(state.queue.len());
        let mut merged = Merged {
            taken,
            text: state.text.clone(),
            attachments: state.attachments.clone(),
            entities: state.entities.clone(),
            channel_data: state.channel_data.clone(),
        };

        for fragment in state.queue.iter().take(taken) {
            if let Some(text) = &fragment.text {
                merged.text.push_str(text);
            }
            merged.attachments.extend(fragment.attachments.iter().cloned());
            merged.entities.extend(fragment.entities.iter().cloned());
            if let Some(data) = &fragment.channel_data {
                for (key, value) in data {
                    merged.channel_data.insert(key.clone(), value.clone());
                }
            }
        }
        merged
    }

    async fn flush(self: &Arc<Self>) {
        let _flushing = self.flushing.lock().await;

        let (merged, sequence, id) = {
            let state = self.state.lock();
            if state.queue.is_empty() {
                return;
            }
            (self.merge(&state), state.sequence + 1, state.id.clone())
        };

        let activity = self.reference.apply(progress_activity(
            &merged.text,
            sequence,
            id.as_deref(),
        ));
        let result = match &id {
            Some(id) => {
                self.sender
                    .update_activity(&self.reference, id, &activity)
                    .await
            }
            None => self.sender.send_activity(&self.reference, &activity).await,
        };

        let mut state = self.state.lock();
        match result {
            Ok(resource) => {
                state.queue.drain(..merged.taken);
                state.text = merged.text;
                state.attachments = merged.attachments;
                state.entities = merged.entities;
                state.channel_data = merged.channel_data;
                state.sequence = sequence;
                state.failures = 0;
                if state.id.is_none() && !resource.id.is_empty() {
                    state.id = Some(resource.id);
                }
                trace!(sequence, merged = merged.taken, "Stream chunk sent");

                if let Some(id) = state.id.clone() {
                    let _ = self.events.send(StreamEvent::Chunk { sequence, id });
                }
                if !state.queue.is_empty() {
                    self.schedule(&mut state, self.config.interval);
                }
            }
            Err(error) => {
                state.failures = state.failures.saturating_add(2);
                let delay = self.config.interval * (state.failures + 1);
                warn!(
                    %error,
                    failures = state.failures,
                    retry_in = ?delay,
                    "Stream flush failed; retrying"
                );
                self.schedule(&mut state, delay);
            }
        }
    }

    async fn close(self: &Arc<Self>) -> ApiResult<Option<SentActivity>> {
        if !self.state.lock().used {
            return Ok(None);
        }

        loop {
            // Wait for the last flush: an id is assigned and nothing is queued.
            let (flushing, id, activity) = loop {
                let flushing = self.flushing.lock().await;
                {
                    let state = self.state.lock();
                    if state.id.is_some() && state.queue.is_empty() {
                        let activity = self.reference.apply(final_activity(&state));
                        break (flushing, state.id.clone(), activity);
                    }
                }
                drop(flushing);
                tokio::time::sleep(self.config.close_poll).await;
            };

            let resource = self.send_final(id.as_deref(), &activity).await?;

            // Fragments emitted while the final send was in flight go out as
            // another update of the same activity.
            let late = {
                let mut state = self.state.lock();
                let late = state.queue.len();
                if late == 0 {
                    state.reset();
                }
                late
            };
            drop(flushing);
            if late > 0 {
                debug!(late, "Fragments arrived during close; finalizing again");
                continue;
            }

            let final_id = if resource.id.is_empty() {
                id.unwrap_or_default()
            } else {
                resource.id
            };
            let sent = SentActivity::new(final_id, activity);
            debug!(id = %sent.id, "Stream closed");

            let _ = self.events.send(StreamEvent::Closed(sent.clone()));
            return Ok(Some(sent));
        }
    }

    async fn send_final(
        &self,
        id: Option<&str>,
        activity: &Activity,
    ) -> ApiResult<ResourceResponse> {
        let mut attempt = 0;
        loop {
            let result = match id {
                Some(id) => {
                    self.sender
                        .update_activity(&self.reference, id, activity)
                        .await
                }
                None => self.sender.send_activity(&self.reference, activity).await,
            };
            match result {
                Ok(resource) => return Ok(resource),
                Err(error) if attempt < self.config.final_retries => {
                    attempt += 1;
                    warn!(%error, attempt, "Final stream message failed; retrying");
                    tokio::time::sleep(self.config.interval * attempt).await;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

#[async_trait]
impl Streamer for StreamingBuffer {
    fn emit(&self, fragment: StreamFragment) {
        let mut state = self.inner.state.lock();
        state.used = true;
        state.queue.push_back(fragment);
        self.inner.schedule(&mut state, self.inner.config.debounce);
    }

    async fn close(&self) -> ApiResult<Option<SentActivity>> {
        Inner::close(&self.inner).await
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(timer) = self.state.get_mut().timer.take() {
            timer.abort();
        }
    }
}

// ─── Activity composition ─────────────────────────────────────────────────────

fn stream_info(stream_type: &str, sequence: Option<u64>, id: Option<&str>) -> Entity {
    let mut entity = Entity::new(STREAM_INFO).with("streamType", stream_type);
    if let Some(sequence) = sequence {
        entity = entity.with("streamSequence", sequence);
    }
    if let Some(id) = id {
        entity = entity.with("streamId", id);
    }
    entity
}

fn progress_activity(text: &str, sequence: u64, id: Option<&str>) -> Activity {
    Activity::new(ActivityType::TYPING)
        .with_text(text)
        .with_entity(stream_info("streaming", Some(sequence), id))
}

fn final_activity(state: &Accumulator) -> Activity {
    let mut activity = Activity::new(ActivityType::MESSAGE);
    if !state.text.is_empty() {
        activity.text = Some(state.text.clone());
    }
    activity.attachments = state.attachments.clone();
    activity.entities = state.entities.clone();
    activity
        .entities
        .push(stream_info("final", None, state.id.as_deref()));
    if !state.channel_data.is_empty() {
        activity.channel_data = Some(state.channel_data.clone());
    }
    activity
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingSender, SentCall};
    use serde_json::json;
    use tokio::time::{Instant, advance};

    fn buffer(sender: Arc<RecordingSender>, config: StreamConfig) -> StreamingBuffer {
        let activity = crate::context::tests::inbound();
        let reference = Arc::new(ConversationReference::from_activity(&activity));
        StreamingBuffer::new(sender, reference, config)
    }

    /// Lets spawned timer tasks run to completion.
    async fn settle() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    fn stream_type(activity: &Activity) -> Option<String> {
        activity
            .entities
            .iter()
            .find(|entity| entity.entity_type == STREAM_INFO)
            .and_then(|entity| entity.get("streamType"))
            .and_then(Value::as_str)
            .map(str::to_owned)
    }

    #[tokio::test(start_paused = true)]
    async fn close_without_emit_is_a_noop() {
        let sender = Arc::new(RecordingSender::default());
        let stream = buffer(sender.clone(), StreamConfig::default());

        assert_eq!(stream.close().await.unwrap(), None);
        assert!(sender.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn progress_sends_are_paced_by_interval() {
        let sender = Arc::new(RecordingSender::default());
        let stream = buffer(sender.clone(), StreamConfig::default());

        stream.emit("a".into());
        stream.emit("b".into());
        stream.emit("c".into());
        advance(Duration::from_millis(200)).await;
        settle().await;

        let calls = sender.calls();
        assert_eq!(calls.len(), 1);
        let SentCall::Send(progress) = &calls[0] else {
            panic!("expected a send, got {:?}", calls[0]);
        };
        assert_eq!(progress.activity_type(), &ActivityType::TYPING);
        assert_eq!(progress.text.as_deref(), Some("a"));
        assert_eq!(stream_type(progress).as_deref(), Some("streaming"));
        assert_eq!(stream.activity_id().as_deref(), Some("activity-1"));

        advance(Duration::from_millis(500)).await;
        settle().await;
        advance(Duration::from_millis(500)).await;
        settle().await;

        let texts: Vec<_> = sender
            .calls()
            .iter()
            .filter_map(SentCall::activity)
            .map(|activity| activity.text.clone().unwrap_or_default())
            .collect();
        assert_eq!(texts, vec!["a", "ab", "abc"]);
        assert_eq!(stream.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn large_backlog_drains_in_batches_in_order() {
        let sender = Arc::new(RecordingSender::default());
        let stream = buffer(sender.clone(), StreamConfig::default());
        let mut events = stream.subscribe();

        for chunk in ["a", "b", "c", "d", "e", "f", "g", "h", "i", "j", "k", "l", "m", "n", "o"] {
            stream.emit(chunk.into());
        }
        let sent = stream.close().await.unwrap().unwrap();

        assert_eq!(sent.activity.text.as_deref(), Some("abcdefghijklmno"));
        assert_eq!(stream_type(&sent.activity).as_deref(), Some("final"));

        // 15 queued → batch of 2, then batches of 1 as the queue shrinks.
        let calls = sender.calls();
        let progress: Vec<_> = calls
            .iter()
            .filter_map(|call| call.activity())
            .filter(|activity| activity.is(&ActivityType::TYPING))
            .map(|activity| activity.text.clone().unwrap_or_default())
            .collect();
        assert_eq!(progress[0], "ab");
        assert!(progress.windows(2).all(|w| w[1].starts_with(w[0].as_str())));
        assert_eq!(progress.last().map(String::as_str), Some("abcdefghijklmno"));

        let mut last = 0;
        while let Ok(event) = events.try_recv() {
            if let StreamEvent::Chunk { sequence, .. } = event {
                assert!(sequence > last);
                last = sequence;
            }
        }
        assert_eq!(last as usize, progress.len());
    }

    #[tokio::test(start_paused = true)]
    async fn id_from_first_flush_is_reused() {
        let sender = Arc::new(RecordingSender::default());
        let stream = buffer(sender.clone(), StreamConfig::default());

        stream.emit("one".into());
        stream.flush().await;
        stream.emit(" two".into());
        stream.flush().await;
        let sent = stream.close().await.unwrap().unwrap();

        let calls = sender.calls();
        assert!(matches!(calls[0], SentCall::Send(_)));
        assert!(calls[1..].iter().all(|call| matches!(
            call,
            SentCall::Update(id, _) if id == "activity-1"
        )));
        assert_eq!(calls.len(), 3);
        assert_eq!(sent.id, "activity-1");
        assert_eq!(sender.send_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_flush_backs_off_and_keeps_queue() {
        let sender = Arc::new(RecordingSender::default());
        sender.fail_next(2);
        let config = StreamConfig::default();
        let interval = config.interval;
        let stream = buffer(sender.clone(), config);

        stream.emit("x".into());
        let start = Instant::now();

        // First attempt after debounce fails.
        advance(Duration::from_millis(200)).await;
        settle().await;
        assert_eq!(sender.attempts().len(), 1);
        assert_eq!(stream.pending(), 1);

        // Second attempt: failures = 2 → 3 × interval.
        advance(interval * 3).await;
        settle().await;
        assert_eq!(sender.attempts().len(), 2);
        assert_eq!(stream.pending(), 1);

        // Third attempt: failures = 4 → 5 × interval; this one succeeds.
        advance(interval * 5 - Duration::from_millis(1)).await;
        settle().await;
        assert_eq!(sender.attempts().len(), 2);
        advance(Duration::from_millis(1)).await;
        settle().await;
        assert_eq!(sender.attempts().len(), 3);
        assert_eq!(stream.pending(), 0);

        let attempts = sender.attempts();
        let first_gap = attempts[1] - attempts[0];
        let second_gap = attempts[2] - attempts[1];
        assert!(second_gap > first_gap);
        assert_eq!(attempts[0] - start, Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn close_waits_for_drain_and_includes_late_emits() {
        let sender = Arc::new(RecordingSender::default());
        let stream = buffer(sender.clone(), StreamConfig::default());

        stream.emit("first".into());
        let closing = tokio::spawn({
            let stream = stream.clone();
            async move { stream.close().await }
        });
        tokio::task::yield_now().await;
        stream.emit(" second".into());

        let sent = closing.await.unwrap().unwrap().unwrap();
        assert_eq!(sent.activity.text.as_deref(), Some("first second"));

        // Nothing is sent after the final message.
        let calls = sender.calls();
        let last = calls.last().and_then(SentCall::activity).unwrap();
        assert_eq!(stream_type(last).as_deref(), Some("final"));
        assert_eq!(last.activity_type(), &ActivityType::MESSAGE);
        assert_eq!(stream.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn emit_during_final_send_reaches_the_final_message() {
        let sender = Arc::new(RecordingSender::default());
        let stream = buffer(sender.clone(), StreamConfig::default());

        stream.emit("a".into());
        stream.flush().await;
        sender.slow_updates(Duration::from_secs(1));

        let closing = tokio::spawn({
            let stream = stream.clone();
            async move { stream.close().await }
        });
        // The final update of "a" is now in flight.
        advance(Duration::from_millis(10)).await;
        settle().await;
        assert_eq!(sender.calls().len(), 1);
        assert_eq!(stream.pending(), 0);
        stream.emit("b".into());

        let sent = closing.await.unwrap().unwrap().unwrap();
        assert_eq!(sent.activity.text.as_deref(), Some("ab"));
        assert_eq!(sent.id, "activity-1");

        let calls = sender.calls();
        assert_eq!(sender.send_count(), 1);
        assert!(calls[1..].iter().all(|call| matches!(
            call,
            SentCall::Update(id, _) if id == "activity-1"
        )));
        let last = calls.last().and_then(SentCall::activity).unwrap();
        assert_eq!(last.activity_type(), &ActivityType::MESSAGE);
        assert_eq!(last.text.as_deref(), Some("ab"));

        // Nothing is left behind to flush later.
        advance(Duration::from_secs(5)).await;
        settle().await;
        assert_eq!(sender.calls().len(), calls.len());
        assert!(stream.activity_id().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn fragments_merge_attachments_entities_and_channel_data() {
        let sender = Arc::new(RecordingSender::default());
        let stream = buffer(sender.clone(), StreamConfig::default());

        stream.emit(
            StreamFragment::text("card: ")
                .with_attachment(Attachment::new("image/png"))
                .with_channel_data("feedback", json!(false))
                .with_channel_data("tag", json!("a")),
        );
        stream.emit(
            StreamFragment::default()
                .with_entity(Entity::new("mention"))
                .with_channel_data("tag", json!("b")),
        );
        let sent = stream.close().await.unwrap().unwrap();

        let activity = sent.activity;
        assert_eq!(activity.text.as_deref(), Some("card: "));
        assert_eq!(activity.attachments.len(), 1);
        assert_eq!(activity.entities[0].entity_type, "mention");
        assert_eq!(activity.channel_data_value("tag"), Some(&json!("b")));
        assert_eq!(activity.channel_data_value("feedback"), Some(&json!(false)));
    }

    #[tokio::test(start_paused = true)]
    async fn state_resets_after_close() {
        let sender = Arc::new(RecordingSender::default());
        let stream = buffer(sender.clone(), StreamConfig::default());
        let mut events = stream.subscribe();

        stream.emit("turn one".into());
        stream.close().await.unwrap();
        assert!(stream.activity_id().is_none());

        stream.emit("turn two".into());
        let sent = stream.close().await.unwrap().unwrap();

        assert_eq!(sent.activity.text.as_deref(), Some("turn two"));
        assert_eq!(sender.send_count(), 2);

        let mut closed = 0;
        while let Ok(event) = events.try_recv() {
            if matches!(event, StreamEvent::Closed(_)) {
                closed += 1;
            }
        }
        assert_eq!(closed, 2);
    }

    #[test]
    fn batch_size_rounds_and_never_drops_to_zero() {
        let sender = Arc::new(RecordingSender::default());
        let activity = crate::context::tests::inbound();
        let reference = Arc::new(ConversationReference::from_activity(&activity));
        let inner = Inner {
            sender,
            reference,
            config: StreamConfig::default(),
            state: Mutex::new(Accumulator::default()),
            flushing: AsyncMutex::new(()),
            events: broadcast::channel(1).0,
        };

        assert_eq!(inner.batch_size(1), 1);
        assert_eq!(inner.batch_size(4), 1);
        assert_eq!(inner.batch_size(15), 2);
        assert_eq!(inner.batch_size(24), 2);
        assert_eq!(inner.batch_size(25), 3);
        assert_eq!(inner.batch_size(100), 10);
    }
}
