//! The activity envelope exchanged with conversational platforms.
//!
//! Wire names are camelCase. Unknown activity types and unknown entity
//! properties survive a deserialize/serialize cycle untouched.

use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ActivityError;

// ─── ActivityType ─────────────────────────────────────────────────────────────

/// String-backed activity discriminant.
///
/// The well-known values are associated constants; anything else is kept as
/// the raw string so that it can be routed on and forwarded unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActivityType(Cow<'static, str>);

impl ActivityType {
    pub const MESSAGE: Self = Self(Cow::Borrowed("message"));
    pub const TYPING: Self = Self(Cow::Borrowed("typing"));
    pub const INVOKE: Self = Self(Cow::Borrowed("invoke"));
    pub const EVENT: Self = Self(Cow::Borrowed("event"));
    pub const CONVERSATION_UPDATE: Self = Self(Cow::Borrowed("conversationUpdate"));
    pub const MESSAGE_REACTION: Self = Self(Cow::Borrowed("messageReaction"));
    pub const MESSAGE_UPDATE: Self = Self(Cow::Borrowed("messageUpdate"));
    pub const MESSAGE_DELETE: Self = Self(Cow::Borrowed("messageDelete"));
    pub const INSTALLATION_UPDATE: Self = Self(Cow::Borrowed("installationUpdate"));

    /// Creates a type from an arbitrary string.
    pub fn new(value: impl Into<Cow<'static, str>>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActivityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&'static str> for ActivityType {
    fn from(value: &'static str) -> Self {
        Self(Cow::Borrowed(value))
    }
}

impl From<String> for ActivityType {
    fn from(value: String) -> Self {
        Self(Cow::Owned(value))
    }
}

impl PartialEq<str> for ActivityType {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for ActivityType {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

// ─── Accounts ─────────────────────────────────────────────────────────────────

/// A participant of a conversation (user or bot).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelAccount {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aad_object_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

impl ChannelAccount {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.id.is_empty() && self.name.is_none()
    }
}

/// The conversation an activity belongs to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationAccount {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_group: Option<bool>,
}

impl ConversationAccount {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.id.is_empty()
    }
}

// ─── Attachments & Entities ───────────────────────────────────────────────────

/// A file or card attached to an activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub content_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Attachment {
    pub fn new(content_type: impl Into<String>) -> Self {
        Self {
            content_type: content_type.into(),
            content_url: None,
            content: None,
            name: None,
        }
    }

    pub fn with_content(mut self, content: Value) -> Self {
        self.content = Some(content);
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.content_url = Some(url.into());
        self
    }
}

/// Metadata attached to an activity (mentions, stream info, client info, …).
///
/// Only `type` is interpreted; every other property is kept verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    #[serde(rename = "type")]
    pub entity_type: String,
    #[serde(flatten)]
    pub properties: Map<String, Value>,
}

impl Entity {
    pub fn new(entity_type: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            properties: Map::new(),
        }
    }

    /// Sets a property, replacing any previous value under the same key.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }
}

// ─── Activity ─────────────────────────────────────────────────────────────────

/// The envelope of everything that flows between a bot and a platform.
///
/// The activity type is fixed at construction: build an outbound activity
/// with [`Activity::message`], [`Activity::typing`] or [`Activity::new`] and
/// fill the rest through the `with_*` builders or the public fields.
///
/// ```rust
/// use parley_core::{Activity, ActivityType};
///
/// let reply = Activity::message("pong");
/// assert_eq!(reply.activity_type(), &ActivityType::MESSAGE);
/// assert_eq!(reply.text.as_deref(), Some("pong"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    #[serde(rename = "type")]
    activity_type: ActivityType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_url: Option<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub channel_id: String,
    #[serde(default, skip_serializing_if = "ChannelAccount::is_empty")]
    pub from: ChannelAccount,
    #[serde(default, skip_serializing_if = "ChannelAccount::is_empty")]
    pub recipient: ChannelAccount,
    #[serde(default, skip_serializing_if = "ConversationAccount::is_empty")]
    pub conversation: ConversationAccount,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entities: Vec<Entity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_data: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
}

impl Activity {
    /// Creates an empty activity of the given type.
    pub fn new(activity_type: impl Into<ActivityType>) -> Self {
        Self {
            activity_type: activity_type.into(),
            id: None,
            service_url: None,
            channel_id: String::new(),
            from: ChannelAccount::default(),
            recipient: ChannelAccount::default(),
            conversation: ConversationAccount::default(),
            text: None,
            attachments: Vec::new(),
            entities: Vec::new(),
            channel_data: None,
            name: None,
            value: None,
            reply_to_id: None,
            locale: None,
        }
    }

    /// A `message` activity carrying `text`.
    pub fn message(text: impl Into<String>) -> Self {
        Self::new(ActivityType::MESSAGE).with_text(text)
    }

    /// A `typing` indicator.
    pub fn typing() -> Self {
        Self::new(ActivityType::TYPING)
    }

    pub fn activity_type(&self) -> &ActivityType {
        &self.activity_type
    }

    /// `true` when the activity has the given type.
    pub fn is(&self, activity_type: &ActivityType) -> bool {
        &self.activity_type == activity_type
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_value(mut self, value: Value) -> Self {
        self.value = Some(value);
        self
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    pub fn with_entity(mut self, entity: Entity) -> Self {
        self.entities.push(entity);
        self
    }

    /// Inserts one `channelData` key, creating the object if needed.
    pub fn with_channel_data(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.channel_data
            .get_or_insert_with(Map::new)
            .insert(key.into(), value.into());
        self
    }

    /// Looks up a top-level `channelData` key.
    pub fn channel_data_value(&self, key: &str) -> Option<&Value> {
        self.channel_data.as_ref()?.get(key)
    }

    /// The tenant this activity belongs to.
    ///
    /// Taken from `conversation.tenantId`, falling back to
    /// `channelData.tenant.id`.
    pub fn tenant_id(&self) -> Option<&str> {
        self.conversation.tenant_id.as_deref().or_else(|| {
            self.channel_data_value("tenant")?
                .get("id")?
                .as_str()
        })
    }

    /// Checks the fields required before the activity can be sent.
    ///
    /// A `message` needs text or at least one attachment.
    pub fn validate(&self) -> Result<(), ActivityError> {
        if self.is(&ActivityType::MESSAGE)
            && self.text.as_deref().is_none_or(str::is_empty)
            && self.attachments.is_empty()
        {
            return Err(ActivityError::MissingField {
                activity_type: self.activity_type.clone(),
                field: "text",
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn inbound_message_deserializes() {
        let activity: Activity = serde_json::from_value(json!({
            "type": "message",
            "id": "a-1",
            "serviceUrl": "https://smba.example.net/teams/",
            "channelId": "msteams",
            "from": { "id": "user-1", "name": "Ada" },
            "recipient": { "id": "bot-1" },
            "conversation": { "id": "conv-1", "tenantId": "t-1" },
            "text": "ping"
        }))
        .unwrap();

        assert!(activity.is(&ActivityType::MESSAGE));
        assert_eq!(activity.text.as_deref(), Some("ping"));
        assert_eq!(activity.from.name.as_deref(), Some("Ada"));
        assert_eq!(activity.tenant_id(), Some("t-1"));
    }

    #[test]
    fn unknown_type_and_entity_properties_survive() {
        let raw = json!({
            "type": "custom/thing",
            "entities": [{ "type": "clientInfo", "locale": "en-US", "nested": { "a": 1 } }]
        });
        let activity: Activity = serde_json::from_value(raw.clone()).unwrap();

        assert_eq!(activity.activity_type().as_str(), "custom/thing");
        assert_eq!(activity.entities[0].get("locale"), Some(&json!("en-US")));
        assert_eq!(serde_json::to_value(&activity).unwrap(), raw);
    }

    #[test]
    fn tenant_falls_back_to_channel_data() {
        let activity = Activity::message("hi").with_channel_data("tenant", json!({ "id": "t-9" }));
        assert_eq!(activity.tenant_id(), Some("t-9"));
    }

    #[test]
    fn outbound_message_omits_empty_fields() {
        let value = serde_json::to_value(Activity::message("pong")).unwrap();
        assert_eq!(value, json!({ "type": "message", "text": "pong" }));
    }

    #[test]
    fn empty_message_fails_validation() {
        let err = Activity::new(ActivityType::MESSAGE).validate().unwrap_err();
        assert_eq!(
            err,
            ActivityError::MissingField {
                activity_type: ActivityType::MESSAGE,
                field: "text",
            }
        );

        let with_card = Activity::new(ActivityType::MESSAGE)
            .with_attachment(Attachment::new("application/vnd.microsoft.card.adaptive"));
        assert!(with_card.validate().is_ok());
        assert!(Activity::typing().validate().is_ok());
    }
}
