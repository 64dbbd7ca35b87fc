//! Typed LINE webhook events.
//!
//! Only the fields the bot reads are decoded. Events are decoded one at a
//! time so a malformed event fails alone; kinds the bot does not handle land
//! in `Event::Other`.

use serde::Deserialize;

/// Body of one webhook delivery. Events stay raw until `Event::decode`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventBatch {
    #[serde(default)]
    pub destination: String,
    #[serde(default)]
    pub events: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Event {
    Message(MessageEvent),
    Unsend(UnsendEvent),
    #[serde(other)]
    Other,
}

impl Event {
    pub fn decode(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageEvent {
    /// Absent on redelivered events.
    #[serde(default)]
    pub reply_token: String,
    pub source: Source,
    pub message: MessageContent,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MessageContent {
    Text(TextMessage),
    Sticker(StickerMessage),
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TextMessage {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub mention: Option<Mention>,
}

impl TextMessage {
    pub fn mentionees(&self) -> &[Mentionee] {
        self.mention.as_ref().map(|m| m.mentionees.as_slice()).unwrap_or(&[])
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StickerMessage {
    pub id: String,
    pub package_id: String,
    pub sticker_id: String,
    #[serde(default)]
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Mention {
    #[serde(default)]
    pub mentionees: Vec<Mentionee>,
}

/// One @-mention inside a text message.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mentionee {
    #[serde(rename = "type")]
    pub kind: MentioneeKind,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub is_self: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MentioneeKind {
    User,
    All,
}

/// Who a mention points at, after folding `isSelf` in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MentionTarget<'a> {
    Everyone,
    Bot,
    User(Option<&'a str>),
}

impl Mentionee {
    pub fn target(&self) -> MentionTarget<'_> {
        match self.kind {
            MentioneeKind::All => MentionTarget::Everyone,
            MentioneeKind::User if self.is_self => MentionTarget::Bot,
            MentioneeKind::User => MentionTarget::User(self.user_id.as_deref()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnsendEvent {
    pub source: Source,
    pub unsend: Unsend,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Unsend {
    pub message_id: String,
}

/// Where an event came from.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub group_id: Option<String>,
    #[serde(default)]
    pub room_id: Option<String>,
}

impl Source {
    /// Push target for this conversation: group, then room, then the user.
    pub fn conversation_id(&self) -> Option<&str> {
        self.group_id
            .as_deref()
            .or(self.room_id.as_deref())
            .or(self.user_id.as_deref())
    }
}
