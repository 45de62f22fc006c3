//! Outbound envelope and routing metadata.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::SendResult;
use crate::segment::Segment;

/// The conversational scope a message belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetType {
    /// A group chat.
    Group,
    /// A one-to-one conversation.
    Direct,
    /// A channel.
    Channel,
    /// A sub-channel of a channel.
    SubChannel,
}

impl TargetType {
    /// Returns the wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Group => "group",
            Self::Direct => "direct",
            Self::Channel => "channel",
            Self::SubChannel => "sub_channel",
        }
    }
}

impl fmt::Display for TargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a message goes and which inbound message it answers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    /// Scope kind of the destination.
    pub target_type: TargetType,
    /// Group, channel or user id of the destination.
    pub target_id: Option<String>,
    /// Backend id of the originating connection.
    pub bot_id: String,
    /// The bot's own account id on that backend.
    pub bot_self_id: String,
    /// Id of the originating message, empty when unsolicited.
    pub msg_id: String,
}

impl Route {
    /// Creates a route without an originating message.
    pub fn new(
        target_type: TargetType,
        target_id: Option<String>,
        bot_id: impl Into<String>,
        bot_self_id: impl Into<String>,
    ) -> Self {
        Self {
            target_type,
            target_id,
            bot_id: bot_id.into(),
            bot_self_id: bot_self_id.into(),
            msg_id: String::new(),
        }
    }

    /// Sets the originating message id.
    pub fn with_msg_id(mut self, msg_id: impl Into<String>) -> Self {
        self.msg_id = msg_id.into();
        self
    }
}

/// The serialized record handed to the transport for one outgoing message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageSend {
    /// Normalized content, never empty.
    pub content: Vec<Segment>,
    /// Backend id of the originating connection.
    pub bot_id: String,
    /// The bot's own account id.
    pub bot_self_id: String,
    /// Scope kind of the destination.
    pub target_type: TargetType,
    /// Destination id.
    pub target_id: Option<String>,
    /// Originating message id.
    pub msg_id: String,
}

impl MessageSend {
    /// Builds an envelope from normalized content and a route.
    pub fn new(content: Vec<Segment>, route: &Route) -> Self {
        Self {
            content,
            bot_id: route.bot_id.clone(),
            bot_self_id: route.bot_self_id.clone(),
            target_type: route.target_type,
            target_id: route.target_id.clone(),
            msg_id: route.msg_id.clone(),
        }
    }

    /// Serializes the envelope to JSON bytes.
    pub fn encode(&self) -> SendResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}
