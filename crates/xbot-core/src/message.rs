//! Message segments.
//!
//! A [`Message`] is an ordered list of [`Segment`]s. Each segment has a type
//! tag (`"text"`, `"at"`, `"image"`, ...) and a free-form data object, which
//! mirrors the array message format used by OneBot-style gateways.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single unit of message content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Map<String, Value>,
}

impl Segment {
    /// Creates a segment of type `kind` with the given data fields.
    pub fn new<I, K>(kind: impl Into<String>, data: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Self {
            kind: kind.into(),
            data: data.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::new("text", [("text", Value::String(text.into()))])
    }

    /// Mentions a user. The id is carried as a string, as gateways send it.
    pub fn at(user_id: i64) -> Self {
        Self::new("at", [("qq", Value::String(user_id.to_string()))])
    }

    pub fn at_all() -> Self {
        Self::new("at", [("qq", Value::String("all".into()))])
    }

    pub fn image(file: impl Into<String>) -> Self {
        Self::new("image", [("file", Value::String(file.into()))])
    }

    pub fn reply(message_id: i64) -> Self {
        Self::new("reply", [("id", Value::String(message_id.to_string()))])
    }

    pub fn is_text(&self) -> bool {
        self.kind == "text"
    }

    /// Text content of a text segment.
    pub fn as_text(&self) -> Option<&str> {
        if self.is_text() {
            self.data.get("text").and_then(Value::as_str)
        } else {
            None
        }
    }

    /// Target of an `at` segment. `@all` and malformed ids yield `None`.
    pub fn at_target(&self) -> Option<i64> {
        if self.kind != "at" {
            return None;
        }
        let id = match self.data.get("qq")? {
            Value::String(id) => id.parse().ok(),
            Value::Number(id) => id.as_i64(),
            _ => None,
        };
        id.filter(|id: &i64| *id > 0)
    }
}

/// An ordered list of segments.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Message(Vec<Segment>);

impl Message {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, segment: Segment) {
        self.0.push(segment);
    }

    /// Builder-style [`push`](Self::push).
    pub fn with(mut self, segment: Segment) -> Self {
        self.0.push(segment);
        self
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Segment> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[Segment] {
        &self.0
    }

    /// Concatenation of all text segments, other segments skipped.
    pub fn plain_text(&self) -> String {
        self.iter().filter_map(Segment::as_text).collect()
    }

    /// Users mentioned through `at` segments, in message order.
    pub fn at_targets(&self) -> Vec<i64> {
        self.iter().filter_map(Segment::at_target).collect()
    }

    pub fn has_kind(&self, kind: &str) -> bool {
        self.iter().any(|seg| seg.kind == kind)
    }
}

impl From<&str> for Message {
    fn from(text: &str) -> Self {
        Self(vec![Segment::text(text)])
    }
}

impl From<String> for Message {
    fn from(text: String) -> Self {
        Self(vec![Segment::text(text)])
    }
}

impl From<Segment> for Message {
    fn from(segment: Segment) -> Self {
        Self(vec![segment])
    }
}

impl From<Vec<Segment>> for Message {
    fn from(segments: Vec<Segment>) -> Self {
        Self(segments)
    }
}

impl FromIterator<Segment> for Message {
    fn from_iter<T: IntoIterator<Item = Segment>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Message {
    type Item = &'a Segment;
    type IntoIter = std::slice::Iter<'a, Segment>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_plain_text_skips_non_text() {
        let msg = Message::new()
            .with(Segment::at(42))
            .with(Segment::text("hello "))
            .with(Segment::image("a.png"))
            .with(Segment::text("world"));
        assert_eq!(msg.plain_text(), "hello world");
    }

    #[test]
    fn test_at_targets_accept_strings_and_numbers() {
        let msg: Message = serde_json::from_value(json!([
            {"type": "at", "data": {"qq": "10001"}},
            {"type": "at", "data": {"qq": 10002}},
            {"type": "at", "data": {"qq": "all"}},
            {"type": "text", "data": {"text": "hi"}}
        ]))
        .unwrap();

        assert_eq!(msg.at_targets(), vec![10001, 10002]);
        assert!(msg.has_kind("text"));
    }

    #[test]
    fn test_segment_wire_shape() {
        let value = serde_json::to_value(Segment::text("x")).unwrap();
        assert_eq!(value, json!({"type": "text", "data": {"text": "x"}}));
    }
}
