//! Outbound message segments and payload normalization.
//!
//! A [`Segment`] is one unit of outbound content. It serializes to the
//! `{"type": ..., "data": ...}` shape expected by backends:
//!
//! - `text` → `{"type":"text","data":"hello"}`
//! - `image` → `{"type":"image","data":"base64://..."}` or an URL
//! - `at` → `{"type":"at","data":"10001"}`
//! - `node` → `{"type":"node","data":[...]}`
//!
//! Handlers rarely build segments by hand. Anything convertible into a
//! [`Payload`] can be sent, and [`Payload::into_segments`] turns it into the
//! final, non-empty segment list.

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{SendError, SendResult};

/// Marker prefix of an inline image reference.
pub const BASE64_PREFIX: &str = "base64://";

// ============================================================================
// Segment
// ============================================================================

/// A single piece of outbound message content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Segment {
    /// Plain text.
    Text(String),
    /// Image reference: an URL, a path, or a `base64://` inline payload.
    Image(String),
    /// Mention of a user id.
    #[serde(rename = "at")]
    Mention(String),
    /// Grouped forward node wrapping other segments.
    #[serde(rename = "node")]
    ForwardNode(Vec<Segment>),
}

impl Segment {
    /// Creates a text segment.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    /// Creates an image segment from an URL or an existing `base64://` reference.
    pub fn image(reference: impl Into<String>) -> Self {
        Self::Image(reference.into())
    }

    /// Creates an inline image segment from raw bytes.
    pub fn image_bytes(bytes: &[u8]) -> Self {
        Self::Image(format!("{BASE64_PREFIX}{}", STANDARD.encode(bytes)))
    }

    /// Creates a mention segment.
    pub fn mention(user_id: impl Into<String>) -> Self {
        Self::Mention(user_id.into())
    }

    /// Creates a forward node from a list of segments.
    pub fn forward(segments: Vec<Segment>) -> Self {
        Self::ForwardNode(segments)
    }

    /// Returns the segment type as it appears on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Image(_) => "image",
            Self::Mention(_) => "at",
            Self::ForwardNode(_) => "node",
        }
    }

    /// Returns the text content if this is a text segment.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => write!(f, "{text}"),
            Self::Image(reference) if reference.starts_with(BASE64_PREFIX) => {
                write!(f, "[image:inline]")
            }
            Self::Image(reference) => write!(f, "[image:{reference}]"),
            Self::Mention(user_id) => write!(f, "@{user_id}"),
            Self::ForwardNode(segments) => write!(f, "[forward:{}]", segments.len()),
        }
    }
}

// ============================================================================
// Payload
// ============================================================================

/// Every shape a handler may hand to a send call.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// A single prepared segment.
    Segment(Segment),
    /// A prepared, ordered list of segments.
    Segments(Vec<Segment>),
    /// A list of raw strings, sent as one grouped forward node.
    Texts(Vec<String>),
    /// A raw string: plain text, or an inline image when it carries the `base64://` marker.
    Text(String),
    /// Raw binary, sent as an inline image.
    Bytes(Vec<u8>),
}

impl Payload {
    /// Normalizes the payload into a non-empty ordered segment list.
    ///
    /// Fails with [`SendError::InvalidPayload`] instead of producing an empty
    /// message.
    pub fn into_segments(self) -> SendResult<Vec<Segment>> {
        match self {
            Self::Segment(segment) => Ok(vec![segment]),
            Self::Segments(segments) if segments.is_empty() => {
                Err(SendError::invalid("empty segment list"))
            }
            Self::Segments(segments) => Ok(segments),
            Self::Texts(texts) if texts.is_empty() => {
                Err(SendError::invalid("empty forward node"))
            }
            Self::Texts(texts) => Ok(vec![Segment::forward(
                texts.into_iter().map(Segment::Text).collect(),
            )]),
            Self::Text(text) if text.is_empty() => Err(SendError::invalid("empty text")),
            Self::Text(text) if text.starts_with(BASE64_PREFIX) => Ok(vec![Segment::Image(text)]),
            Self::Text(text) => Ok(vec![Segment::Text(text)]),
            Self::Bytes(bytes) if bytes.is_empty() => Err(SendError::invalid("empty image data")),
            Self::Bytes(bytes) => Ok(vec![Segment::image_bytes(&bytes)]),
        }
    }
}

impl From<Segment> for Payload {
    fn from(segment: Segment) -> Self {
        Self::Segment(segment)
    }
}

impl From<Vec<Segment>> for Payload {
    fn from(segments: Vec<Segment>) -> Self {
        Self::Segments(segments)
    }
}

impl From<Vec<String>> for Payload {
    fn from(texts: Vec<String>) -> Self {
        Self::Texts(texts)
    }
}

impl From<Vec<&str>> for Payload {
    fn from(texts: Vec<&str>) -> Self {
        Self::Texts(texts.into_iter().map(str::to_owned).collect())
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&String> for Payload {
    fn from(text: &String) -> Self {
        Self::Text(text.clone())
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<&[u8]> for Payload {
    fn from(bytes: &[u8]) -> Self {
        Self::Bytes(bytes.to_vec())
    }
}

/// Interprets dynamically typed content (for example a scripted reply).
///
/// Strings become [`Payload::Text`], arrays of strings become
/// [`Payload::Texts`], objects and arrays of objects are read as segments.
impl TryFrom<Value> for Payload {
    type Error = SendError;

    fn try_from(value: Value) -> SendResult<Self> {
        match value {
            Value::String(text) => Ok(Self::Text(text)),
            Value::Array(items) if items.iter().all(Value::is_string) => Ok(Self::Texts(
                items
                    .into_iter()
                    .filter_map(|item| match item {
                        Value::String(text) => Some(text),
                        _ => None,
                    })
                    .collect(),
            )),
            Value::Array(items) => {
                let segments = items
                    .into_iter()
                    .map(serde_json::from_value)
                    .collect::<Result<Vec<Segment>, _>>()
                    .map_err(|e| SendError::invalid(format!("unrecognized segment: {e}")))?;
                Ok(Self::Segments(segments))
            }
            Value::Object(_) => serde_json::from_value(value)
                .map(Self::Segment)
                .map_err(|e| SendError::invalid(format!("unrecognized segment: {e}"))),
            other => Err(SendError::invalid(format!(
                "unsupported payload value: {other}"
            ))),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_segment_serialize() {
        let json = serde_json::to_string(&Segment::text("hello")).unwrap();
        assert_eq!(json, r#"{"type":"text","data":"hello"}"#);

        let json = serde_json::to_string(&Segment::mention("u1")).unwrap();
        assert_eq!(json, r#"{"type":"at","data":"u1"}"#);

        let node = Segment::forward(vec![Segment::text("a"), Segment::text("b")]);
        assert_eq!(
            serde_json::to_value(&node).unwrap(),
            json!({"type": "node", "data": [
                {"type": "text", "data": "a"},
                {"type": "text", "data": "b"},
            ]})
        );
    }

    #[test]
    fn test_plain_text_becomes_one_text_segment() {
        let segments = Payload::from("hello").into_segments().unwrap();
        assert_eq!(segments, vec![Segment::text("hello")]);
    }

    #[test]
    fn test_marked_text_becomes_image() {
        let segments = Payload::from("base64://aGk=").into_segments().unwrap();
        assert_eq!(segments, vec![Segment::image("base64://aGk=")]);
    }

    #[test]
    fn test_bytes_become_inline_image() {
        let segments = Payload::from(b"hi".to_vec()).into_segments().unwrap();
        assert_eq!(segments, vec![Segment::image("base64://aGk=")]);
    }

    #[test]
    fn test_string_list_becomes_single_forward_node() {
        let segments = Payload::from(vec!["one", "two"]).into_segments().unwrap();
        assert_eq!(
            segments,
            vec![Segment::forward(vec![
                Segment::text("one"),
                Segment::text("two")
            ])]
        );
    }

    #[test]
    fn test_segment_list_keeps_order() {
        let input = vec![Segment::image("https://example.com/a.png"), Segment::text("a")];
        let segments = Payload::from(input.clone()).into_segments().unwrap();
        assert_eq!(segments, input);
    }

    #[test]
    fn test_empty_payloads_are_rejected() {
        for payload in [
            Payload::from(""),
            Payload::from(Vec::<u8>::new()),
            Payload::from(Vec::<String>::new()),
            Payload::from(Vec::<Segment>::new()),
        ] {
            assert!(matches!(
                payload.into_segments(),
                Err(SendError::InvalidPayload(_))
            ));
        }
    }

    #[test]
    fn test_payload_from_json_value() {
        let payload = Payload::try_from(json!({"type": "at", "data": "42"})).unwrap();
        assert_eq!(payload, Payload::Segment(Segment::mention("42")));

        let payload = Payload::try_from(json!(["x", "y"])).unwrap();
        assert_eq!(payload, Payload::Texts(vec!["x".into(), "y".into()]));

        assert!(Payload::try_from(json!(42)).is_err());
        assert!(Payload::try_from(json!([{"type": "unknown", "data": 1}])).is_err());
    }
}
