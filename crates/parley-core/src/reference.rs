//! Addressing a conversation independently of the activity that started it.

use serde::{Deserialize, Serialize};

use crate::activity::{Activity, ChannelAccount, ConversationAccount};

/// Everything needed to send into a conversation.
///
/// Derived once per inbound activity and shared read-only by the dispatch
/// context. It can also be persisted and used later for proactive messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationReference {
    /// Base URL of the platform's connector, without a trailing `/`.
    pub service_url: String,
    pub channel_id: String,
    pub conversation: ConversationAccount,
    /// The bot's account (the inbound recipient).
    pub bot: ChannelAccount,
    /// The user's account (the inbound sender).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<ChannelAccount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    /// Id of the activity the reference was taken from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity_id: Option<String>,
}

impl ConversationReference {
    pub fn from_activity(activity: &Activity) -> Self {
        let service_url = activity.service_url.as_deref().unwrap_or_default();
        let service_url = service_url.strip_suffix('/').unwrap_or(service_url);

        Self {
            service_url: service_url.to_owned(),
            channel_id: activity.channel_id.clone(),
            conversation: activity.conversation.clone(),
            bot: activity.recipient.clone(),
            user: (!activity.from.is_empty()).then(|| activity.from.clone()),
            locale: activity.locale.clone(),
            activity_id: activity.id.clone(),
        }
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation.id
    }

    /// Fills the address fields of an outbound activity.
    ///
    /// Fields the caller already set (recipient, locale) are left alone.
    pub fn apply(&self, mut activity: Activity) -> Activity {
        activity.service_url = Some(self.service_url.clone());
        activity.channel_id = self.channel_id.clone();
        activity.conversation = self.conversation.clone();
        activity.from = self.bot.clone();
        if activity.recipient.is_empty()
            && let Some(user) = &self.user
        {
            activity.recipient = user.clone();
        }
        if activity.locale.is_none() {
            activity.locale = self.locale.clone();
        }
        activity
    }
}
