//! Inbound messages.
//!
//! The transport delivers frames holding a [`MessageReceive`] record. It is
//! decoded once and flattened into an [`Event`], which is what the dispatcher
//! and handlers see.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::envelope::{Route, TargetType};
use crate::error::DecodeResult;

/// Permission ordinal of an ordinary user.
pub const DEFAULT_USER_PM: u8 = 3;

// =============================================================================
// Wire record
// =============================================================================

/// One inbound segment as sent by a backend.
///
/// Backends send more segment types than the core produces, so inbound
/// segments stay loosely typed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSegment {
    /// Segment type (`text`, `image`, `at`, `reply`, ...).
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    /// Segment payload.
    #[serde(default)]
    pub data: Option<Value>,
}

impl RawSegment {
    /// Creates a segment with a string payload.
    pub fn new(kind: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            kind: Some(kind.into()),
            data: Some(Value::String(data.into())),
        }
    }

    fn data_str(&self) -> Option<&str> {
        self.data.as_ref().and_then(Value::as_str)
    }
}

/// Inbound message record as produced by a backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageReceive {
    #[serde(default = "default_bot_id")]
    pub bot_id: String,
    #[serde(default)]
    pub bot_self_id: String,
    #[serde(default)]
    pub msg_id: String,
    #[serde(default = "default_user_type")]
    pub user_type: TargetType,
    #[serde(default)]
    pub group_id: Option<String>,
    #[serde(default)]
    pub user_id: String,
    #[serde(default = "default_user_pm")]
    pub user_pm: u8,
    #[serde(default)]
    pub content: Vec<RawSegment>,
}

fn default_bot_id() -> String {
    "onebot".to_string()
}

fn default_user_type() -> TargetType {
    TargetType::Group
}

fn default_user_pm() -> u8 {
    DEFAULT_USER_PM
}

impl MessageReceive {
    /// Decodes a JSON frame.
    pub fn decode(frame: &[u8]) -> DecodeResult<Self> {
        Ok(serde_json::from_slice(frame)?)
    }

    /// Flattens the record into an [`Event`].
    pub fn into_event(self) -> Event {
        let mut raw_text = String::new();
        let mut image_list = Vec::new();
        let mut at_list = Vec::new();

        for segment in &self.content {
            match (segment.kind.as_deref(), segment.data_str()) {
                (Some("text"), Some(text)) => raw_text.push_str(text),
                (Some("image"), Some(reference)) => image_list.push(reference.to_string()),
                (Some("at"), Some(user_id)) => at_list.push(user_id.to_string()),
                _ => {}
            }
        }

        let raw_text = raw_text.trim().to_string();
        let is_tome = !self.bot_self_id.is_empty() && at_list.contains(&self.bot_self_id);

        Event {
            bot_id: self.bot_id,
            bot_self_id: self.bot_self_id,
            msg_id: self.msg_id,
            user_type: self.user_type,
            group_id: self.group_id.filter(|id| !id.is_empty()),
            user_id: self.user_id,
            user_pm: self.user_pm,
            text: raw_text.clone(),
            raw_text,
            command: String::new(),
            image_list,
            at_list,
            is_tome,
            content: self.content,
        }
    }
}

// =============================================================================
// Event
// =============================================================================

/// A normalized inbound message.
///
/// `text` is what the matched trigger left over; `raw_text` is always the
/// full message text.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub bot_id: String,
    pub bot_self_id: String,
    pub msg_id: String,
    /// Scope kind the message arrived in.
    pub user_type: TargetType,
    pub group_id: Option<String>,
    pub user_id: String,
    /// Caller permission ordinal, lower is more privileged.
    pub user_pm: u8,
    pub raw_text: String,
    pub text: String,
    /// Pattern of the trigger that matched, empty before dispatch.
    pub command: String,
    pub image_list: Vec<String>,
    pub at_list: Vec<String>,
    /// Whether the bot itself was mentioned.
    pub is_tome: bool,
    pub content: Vec<RawSegment>,
}

impl Event {
    /// Creates a text event from `user_id` in the given scope.
    pub fn new(user_type: TargetType, user_id: impl Into<String>, text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            bot_id: default_bot_id(),
            bot_self_id: String::new(),
            msg_id: String::new(),
            user_type,
            group_id: None,
            user_id: user_id.into(),
            user_pm: DEFAULT_USER_PM,
            raw_text: text.clone(),
            content: vec![RawSegment::new("text", text.clone())],
            text,
            command: String::new(),
            image_list: Vec::new(),
            at_list: Vec::new(),
            is_tome: false,
        }
    }

    /// Sets the group id.
    pub fn with_group(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = Some(group_id.into());
        self
    }

    /// Sets the caller permission ordinal.
    pub fn with_pm(mut self, user_pm: u8) -> Self {
        self.user_pm = user_pm;
        self
    }

    /// Sets the backend and self ids.
    pub fn with_bot(mut self, bot_id: impl Into<String>, bot_self_id: impl Into<String>) -> Self {
        self.bot_id = bot_id.into();
        self.bot_self_id = bot_self_id.into();
        self
    }

    /// Sets the message id.
    pub fn with_msg_id(mut self, msg_id: impl Into<String>) -> Self {
        self.msg_id = msg_id.into();
        self
    }

    /// The id replies go to: the group when there is one, else the user.
    pub fn target_id(&self) -> &str {
        self.group_id.as_deref().unwrap_or(&self.user_id)
    }

    /// Route answering this event in the scope it came from.
    pub fn reply_route(&self) -> Route {
        Route {
            target_type: self.user_type,
            target_id: Some(self.target_id().to_string()),
            bot_id: self.bot_id.clone(),
            bot_self_id: self.bot_self_id.clone(),
            msg_id: self.msg_id.clone(),
        }
    }
}
