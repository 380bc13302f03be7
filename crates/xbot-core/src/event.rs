//! Event model.
//!
//! - [`Event`]: object-safe trait every inbound event implements
//! - [`EventType`]: coarse classification used by event-kind matchers
//! - [`BoxedEvent`]: cheaply cloneable, type-erased event handle
//! - concrete events: [`PrivateMessage`], [`GroupMessage`], [`Notice`],
//!   [`Request`], [`Meta`]

use std::any::Any;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::message::Message;

/// Coarse event category, named after the `post_type` field of the wire
/// format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Message,
    Notice,
    Request,
    #[serde(rename = "meta_event", alias = "meta")]
    Meta,
    #[serde(other)]
    Other,
}

impl EventType {
    /// Classifies a raw `post_type` value. Unknown values map to
    /// [`EventType::Other`]; `message_sent` echoes count as messages.
    pub fn of_post_type(post_type: &str) -> Self {
        match post_type {
            "message" | "message_sent" => Self::Message,
            "notice" => Self::Notice,
            "request" => Self::Request,
            "meta_event" => Self::Meta,
            _ => Self::Other,
        }
    }

    pub fn post_type(self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::Notice => "notice",
            Self::Request => "request",
            Self::Meta => "meta_event",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.post_type())
    }
}

/// Role of a message sender inside a group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Owner,
    Admin,
    #[default]
    #[serde(other)]
    Member,
}

/// Sender information attached to message events.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Sender {
    #[serde(default)]
    pub user_id: i64,
    #[serde(default)]
    pub nickname: String,
    #[serde(default)]
    pub card: String,
    #[serde(default)]
    pub role: Role,
}

/// Inbound event as seen by matchers.
///
/// Accessors return `None` when the event carries no such field, e.g.
/// [`group_id`](Self::group_id) on a private message.
pub trait Event: Any + Send + Sync {
    /// Human-readable name of the concrete event type.
    fn event_name(&self) -> &'static str;

    fn event_type(&self) -> EventType;

    /// Account id of the bot that received the event.
    fn self_id(&self) -> i64;

    fn user_id(&self) -> Option<i64> {
        None
    }

    fn group_id(&self) -> Option<i64> {
        None
    }

    fn message_id(&self) -> Option<i64> {
        None
    }

    /// The message carried by message events.
    fn message(&self) -> Option<&Message> {
        None
    }

    fn sender_role(&self) -> Option<Role> {
        None
    }

    /// Backs [`BoxedEvent::downcast_ref`].
    fn as_any(&self) -> &dyn Any;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PrivateMessage {
    #[serde(default)]
    pub time: i64,
    pub self_id: i64,
    #[serde(default)]
    pub sub_type: String,
    #[serde(default)]
    pub message_id: i64,
    pub user_id: i64,
    pub message: Message,
    #[serde(default)]
    pub raw_message: String,
    #[serde(default)]
    pub sender: Sender,
}

impl PrivateMessage {
    /// Minimal private message, mostly useful in tests and console drivers.
    pub fn new(self_id: i64, user_id: i64, message: impl Into<Message>) -> Self {
        Self {
            self_id,
            user_id,
            message: message.into(),
            sender: Sender {
                user_id,
                ..Sender::default()
            },
            ..Self::default()
        }
    }
}

impl Event for PrivateMessage {
    fn event_name(&self) -> &'static str {
        "message.private"
    }

    fn event_type(&self) -> EventType {
        EventType::Message
    }

    fn self_id(&self) -> i64 {
        self.self_id
    }

    fn user_id(&self) -> Option<i64> {
        Some(self.user_id)
    }

    fn message_id(&self) -> Option<i64> {
        Some(self.message_id)
    }

    fn message(&self) -> Option<&Message> {
        Some(&self.message)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupMessage {
    #[serde(default)]
    pub time: i64,
    pub self_id: i64,
    #[serde(default)]
    pub sub_type: String,
    #[serde(default)]
    pub message_id: i64,
    pub group_id: i64,
    pub user_id: i64,
    pub message: Message,
    #[serde(default)]
    pub raw_message: String,
    #[serde(default)]
    pub sender: Sender,
}

impl GroupMessage {
    pub fn new(self_id: i64, group_id: i64, user_id: i64, message: impl Into<Message>) -> Self {
        Self {
            self_id,
            group_id,
            user_id,
            message: message.into(),
            sender: Sender {
                user_id,
                ..Sender::default()
            },
            ..Self::default()
        }
    }

    /// Sets the sender's group role.
    pub fn with_role(mut self, role: Role) -> Self {
        self.sender.role = role;
        self
    }

    pub fn is_owner(&self) -> bool {
        self.sender.role == Role::Owner
    }

    pub fn is_admin(&self) -> bool {
        self.sender.role == Role::Admin
    }
}

impl Event for GroupMessage {
    fn event_name(&self) -> &'static str {
        "message.group"
    }

    fn event_type(&self) -> EventType {
        EventType::Message
    }

    fn self_id(&self) -> i64 {
        self.self_id
    }

    fn user_id(&self) -> Option<i64> {
        Some(self.user_id)
    }

    fn group_id(&self) -> Option<i64> {
        Some(self.group_id)
    }

    fn message_id(&self) -> Option<i64> {
        Some(self.message_id)
    }

    fn message(&self) -> Option<&Message> {
        Some(&self.message)
    }

    fn sender_role(&self) -> Option<Role> {
        Some(self.sender.role)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Any notice event. Type-specific fields stay in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Notice {
    #[serde(default)]
    pub time: i64,
    pub self_id: i64,
    pub notice_type: String,
    #[serde(default)]
    pub sub_type: String,
    #[serde(default)]
    pub group_id: Option<i64>,
    #[serde(default)]
    pub user_id: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Event for Notice {
    fn event_name(&self) -> &'static str {
        "notice"
    }

    fn event_type(&self) -> EventType {
        EventType::Notice
    }

    fn self_id(&self) -> i64 {
        self.self_id
    }

    fn user_id(&self) -> Option<i64> {
        self.user_id
    }

    fn group_id(&self) -> Option<i64> {
        self.group_id
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Friend or group join request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Request {
    #[serde(default)]
    pub time: i64,
    pub self_id: i64,
    pub request_type: String,
    #[serde(default)]
    pub sub_type: String,
    pub user_id: i64,
    #[serde(default)]
    pub group_id: Option<i64>,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub flag: String,
}

impl Event for Request {
    fn event_name(&self) -> &'static str {
        "request"
    }

    fn event_type(&self) -> EventType {
        EventType::Request
    }

    fn self_id(&self) -> i64 {
        self.self_id
    }

    fn user_id(&self) -> Option<i64> {
        Some(self.user_id)
    }

    fn group_id(&self) -> Option<i64> {
        self.group_id
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Lifecycle and heartbeat events.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Meta {
    #[serde(default)]
    pub time: i64,
    pub self_id: i64,
    pub meta_event_type: String,
    #[serde(default)]
    pub sub_type: String,
}

impl Event for Meta {
    fn event_name(&self) -> &'static str {
        "meta_event"
    }

    fn event_type(&self) -> EventType {
        EventType::Meta
    }

    fn self_id(&self) -> i64 {
        self.self_id
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Shared handle to an event of any concrete type.
///
/// Derefs to `dyn Event`; clones share the same allocation, so one event can
/// be handed to every engine of a registry.
#[derive(Clone)]
pub struct BoxedEvent {
    inner: Arc<dyn Event>,
}

impl BoxedEvent {
    pub fn new<E: Event>(event: E) -> Self {
        Self {
            inner: Arc::new(event),
        }
    }

    pub fn inner(&self) -> &Arc<dyn Event> {
        &self.inner
    }

    pub fn downcast_ref<E: Event>(&self) -> Option<&E> {
        self.inner.as_any().downcast_ref()
    }

    pub fn is<E: Event>(&self) -> bool {
        self.downcast_ref::<E>().is_some()
    }
}

impl<E: Event> From<E> for BoxedEvent {
    fn from(event: E) -> Self {
        Self::new(event)
    }
}

impl Deref for BoxedEvent {
    type Target = dyn Event;

    fn deref(&self) -> &Self::Target {
        self.inner.as_ref()
    }
}

impl fmt::Debug for BoxedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoxedEvent")
            .field("event_name", &self.event_name())
            .field("self_id", &self.self_id())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_group_message_from_json() {
        let event: GroupMessage = serde_json::from_value(json!({
            "time": 1,
            "self_id": 10,
            "post_type": "message",
            "message_type": "group",
            "message_id": 7,
            "group_id": 100,
            "user_id": 20,
            "message": [{"type": "text", "data": {"text": "hi"}}],
            "sender": {"user_id": 20, "nickname": "n", "role": "admin"}
        }))
        .unwrap();

        assert!(event.is_admin());
        let boxed = BoxedEvent::new(event);
        assert_eq!(boxed.event_type(), EventType::Message);
        assert_eq!(boxed.group_id(), Some(100));
        assert_eq!(boxed.sender_role(), Some(Role::Admin));
        assert_eq!(boxed.message().map(Message::plain_text).as_deref(), Some("hi"));
    }

    #[test]
    fn test_unknown_role_is_member() {
        let sender: Sender = serde_json::from_value(json!({"role": "guest"})).unwrap();
        assert_eq!(sender.role, Role::Member);
    }

    #[test]
    fn test_downcast() {
        let boxed: BoxedEvent = PrivateMessage::new(1, 2, "yo").into();
        assert!(boxed.is::<PrivateMessage>());
        assert!(boxed.downcast_ref::<GroupMessage>().is_none());
        assert_eq!(boxed.group_id(), None);
        assert_eq!(boxed.user_id(), Some(2));
    }

    #[test]
    fn test_notice_keeps_extra_fields() {
        let notice: Notice = serde_json::from_value(json!({
            "self_id": 1,
            "notice_type": "notify",
            "sub_type": "poke",
            "group_id": 5,
            "user_id": 6,
            "target_id": 1
        }))
        .unwrap();

        assert_eq!(notice.extra.get("target_id"), Some(&json!(1)));
    }

    #[test]
    fn test_event_type_from_post_type() {
        assert_eq!(EventType::of_post_type("message_sent"), EventType::Message);
        assert_eq!(EventType::of_post_type("meta_event"), EventType::Meta);
        assert_eq!(EventType::of_post_type("heartbeat"), EventType::Other);

        let parsed: EventType = serde_json::from_value(json!("meta")).unwrap();
        assert_eq!(parsed, EventType::Meta);
        let unknown: EventType = serde_json::from_value(json!("poke")).unwrap();
        assert_eq!(unknown, EventType::Other);
        assert_eq!(EventType::Meta.to_string(), "meta_event");
    }
}
