//! The outbound capability.

use std::sync::Arc;

use async_trait::async_trait;

use crate::activity::Activity;
use crate::error::ApiResult;
use crate::reference::ConversationReference;
use crate::response::ResourceResponse;

/// Sends and updates activities in a conversation.
///
/// Implemented by transports. The dispatch pipeline and the streaming buffer
/// only ever talk to the platform through this trait.
#[async_trait]
pub trait ActivitySender: Send + Sync + 'static {
    /// Creates a new activity in the referenced conversation.
    async fn send_activity(
        &self,
        reference: &ConversationReference,
        activity: &Activity,
    ) -> ApiResult<ResourceResponse>;

    /// Replaces the activity `id` in the referenced conversation.
    async fn update_activity(
        &self,
        reference: &ConversationReference,
        id: &str,
        activity: &Activity,
    ) -> ApiResult<ResourceResponse>;
}

pub type BoxedSender = Arc<dyn ActivitySender>;
