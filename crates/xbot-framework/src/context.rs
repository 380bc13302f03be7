//! Per-event dispatch context.
//!
//! One [`Context`] is created for every incoming event and shared, behind an
//! `Arc`, between the dispatch loop and every handler task launched for that
//! event. All mutable parts use interior mutability so that handlers running
//! concurrently can read and write them.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use regex::Regex;
use tracing::warn;

use xbot_core::{ApiError, ApiResult, BoxedBot, BoxedEvent, EventType, Message};

// =============================================================================
// BotSettings
// =============================================================================

/// Bot-wide settings consulted by command rules and filters.
#[derive(Debug, Clone)]
pub struct BotSettings {
    command_prefix: String,
    super_users: Vec<i64>,
    nicknames: Vec<Regex>,
}

impl Default for BotSettings {
    fn default() -> Self {
        Self {
            command_prefix: "/".to_string(),
            super_users: Vec::new(),
            nicknames: Vec::new(),
        }
    }
}

impl BotSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn command_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.command_prefix = prefix.into();
        self
    }

    pub fn super_users(mut self, users: impl IntoIterator<Item = i64>) -> Self {
        self.super_users = users.into_iter().collect();
        self
    }

    /// Nicknames are regular expressions matched against the plain text.
    ///
    /// A nickname that is not a valid expression is matched literally.
    pub fn nicknames<I, S>(mut self, nicknames: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.nicknames = nicknames
            .into_iter()
            .filter(|n| !n.as_ref().is_empty())
            .filter_map(|n| {
                let n = n.as_ref();
                Regex::new(n)
                    .or_else(|err| {
                        warn!(nickname = n, error = %err, "nickname is not a valid regex, matching literally");
                        Regex::new(&regex::escape(n))
                    })
                    .ok()
            })
            .collect();
        self
    }

    pub fn get_command_prefix(&self) -> &str {
        &self.command_prefix
    }

    pub fn get_super_users(&self) -> &[i64] {
        &self.super_users
    }

    pub fn is_super_user(&self, user_id: i64) -> bool {
        self.super_users.contains(&user_id)
    }

    /// Returns `true` if any nickname occurs in `text`.
    pub fn mentions_nickname(&self, text: &str) -> bool {
        !text.is_empty() && self.nicknames.iter().any(|re| re.is_match(text))
    }
}

// =============================================================================
// RegexMatch
// =============================================================================

/// Capture results stored by regex rules.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegexMatch {
    /// The whole matched text.
    pub matched: String,
    /// Capture groups by index; index `0` is the whole match. Groups that did
    /// not participate are `None`.
    pub groups: Vec<Option<String>>,
    /// Named groups that participated in the match.
    pub named: HashMap<String, String>,
}

impl RegexMatch {
    pub fn group(&self, index: usize) -> Option<&str> {
        self.groups.get(index)?.as_deref()
    }

    pub fn name(&self, name: &str) -> Option<&str> {
        self.named.get(name).map(String::as_str)
    }
}

// =============================================================================
// Context
// =============================================================================

/// The context handed to rules, filters, middleware and handlers.
///
/// # Flow control
///
/// - [`abort`](Self::abort) stops the dispatch loop before the next matcher
///   is evaluated. Handlers already launched keep running.
/// - [`next`](Self::next) records that the current handler declined the event
///   and later matchers should run.
pub struct Context {
    event: BoxedEvent,
    bot: BoxedBot,
    settings: Arc<BotSettings>,
    state: Mutex<HashMap<String, Box<dyn Any + Send + Sync>>>,
    regex_match: Mutex<Option<RegexMatch>>,
    text_override: Mutex<Option<String>>,
    matched: AtomicBool,
    aborted: AtomicBool,
    proceed: AtomicBool,
}

impl Context {
    pub fn new(event: BoxedEvent, bot: BoxedBot, settings: Arc<BotSettings>) -> Self {
        Self {
            event,
            bot,
            settings,
            state: Mutex::new(HashMap::new()),
            regex_match: Mutex::new(None),
            text_override: Mutex::new(None),
            matched: AtomicBool::new(false),
            aborted: AtomicBool::new(false),
            proceed: AtomicBool::new(true),
        }
    }

    pub fn event(&self) -> &BoxedEvent {
        &self.event
    }

    pub fn bot(&self) -> &BoxedBot {
        &self.bot
    }

    pub fn settings(&self) -> &BotSettings {
        &self.settings
    }

    // ─── Event accessors ──────────────────────────────────────────────────────

    pub fn user_id(&self) -> Option<i64> {
        self.event.user_id()
    }

    pub fn group_id(&self) -> Option<i64> {
        self.event.group_id()
    }

    pub fn message(&self) -> Option<&Message> {
        self.event.message()
    }

    pub fn is_group_message(&self) -> bool {
        self.event.event_type() == EventType::Message && self.event.group_id().is_some()
    }

    pub fn is_private_message(&self) -> bool {
        self.event.event_type() == EventType::Message && self.event.group_id().is_none()
    }

    /// Plain text of the message, or the text installed by a replacing filter.
    ///
    /// Empty for events without a message.
    pub fn plain_text(&self) -> String {
        if let Some(text) = self.text_override.lock().as_ref() {
            return text.clone();
        }
        self.message().map(Message::plain_text).unwrap_or_default()
    }

    /// Replaces the text later rules and handlers see through
    /// [`plain_text`](Self::plain_text). The event itself is untouched.
    pub fn set_plain_text(&self, text: impl Into<String>) {
        *self.text_override.lock() = Some(text.into());
    }

    /// Text after the command prefix and the command word, leading whitespace
    /// removed: `"/echo  hello world"` yields `"hello world"`.
    pub fn args(&self) -> String {
        let text = self.plain_text();
        let prefix = self.settings.get_command_prefix();
        let rest = text.strip_prefix(prefix).unwrap_or(&text).trim_start();

        match rest.find(char::is_whitespace) {
            Some(index) => rest[index..].trim_start().to_string(),
            None => String::new(),
        }
    }

    /// Users mentioned in the message.
    pub fn at_users(&self) -> Vec<i64> {
        self.message().map(Message::at_targets).unwrap_or_default()
    }

    pub fn is_super_user(&self) -> bool {
        self.user_id()
            .is_some_and(|id| self.settings.is_super_user(id))
    }

    // ─── Scratch state ────────────────────────────────────────────────────────

    /// Stores a value under `key`, replacing any previous value.
    pub fn set<T: Send + Sync + 'static>(&self, key: impl Into<String>, value: T) {
        self.state.lock().insert(key.into(), Box::new(value));
    }

    /// Returns a clone of the value under `key` if it has type `T`.
    pub fn get<T: Clone + 'static>(&self, key: &str) -> Option<T> {
        self.state
            .lock()
            .get(key)
            .and_then(|v| v.downcast_ref::<T>())
            .cloned()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.state.lock().contains_key(key)
    }

    /// Removes and returns the value under `key` if it has type `T`.
    ///
    /// A value of another type is left in place.
    pub fn remove<T: 'static>(&self, key: &str) -> Option<T> {
        let mut state = self.state.lock();
        if !state.get(key)?.is::<T>() {
            return None;
        }
        state
            .remove(key)
            .and_then(|v| v.downcast::<T>().ok())
            .map(|v| *v)
    }

    // ─── Regex results ────────────────────────────────────────────────────────

    pub fn regex_match(&self) -> Option<RegexMatch> {
        self.regex_match.lock().clone()
    }

    pub(crate) fn set_regex_match(&self, result: RegexMatch) {
        *self.regex_match.lock() = Some(result);
    }

    // ─── Flow control ─────────────────────────────────────────────────────────

    /// Marks that later matchers should keep processing this event.
    pub fn next(&self) {
        self.proceed.store(true, Ordering::SeqCst);
    }

    /// Stops the dispatch loop before the next matcher is evaluated.
    pub fn abort(&self) {
        self.aborted.store(true, Ordering::SeqCst);
        self.proceed.store(false, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    pub fn should_continue(&self) -> bool {
        self.proceed.load(Ordering::SeqCst)
    }

    /// Returns `true` once any matcher matched this event.
    pub fn is_matched(&self) -> bool {
        self.matched.load(Ordering::SeqCst)
    }

    pub(crate) fn set_matched(&self) {
        self.matched.store(true, Ordering::SeqCst);
    }

    // ─── Replies ──────────────────────────────────────────────────────────────

    /// Replies in the conversation the event came from.
    ///
    /// Returns the id of the sent message. Fails with
    /// [`ApiError::MissingSession`] for events that are not messages.
    pub async fn reply(&self, message: impl Into<Message>) -> ApiResult<i64> {
        let message = message.into();
        if self.event.event_type() != EventType::Message {
            return Err(ApiError::MissingSession(format!(
                "cannot reply to a {} event",
                self.event.event_name()
            )));
        }

        match (self.group_id(), self.user_id()) {
            (Some(group_id), _) => self.bot.send_group_msg(group_id, message).await,
            (None, Some(user_id)) => self.bot.send_private_msg(user_id, message).await,
            (None, None) => Err(ApiError::MissingSession(
                "message event without user id".to_string(),
            )),
        }
    }

    /// Recalls the message that triggered this event.
    pub async fn delete_message(&self) -> ApiResult<()> {
        let message_id = self
            .event
            .message_id()
            .ok_or_else(|| ApiError::MissingSession("event has no message id".to_string()))?;
        self.bot.delete_msg(message_id).await
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("event", &self.event)
            .field("matched", &self.is_matched())
            .field("aborted", &self.is_aborted())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::any::Any;

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::{Value, json};
    use xbot_core::{Bot, GroupMessage, Meta, PrivateMessage, Segment};

    use super::*;

    /// Bot that records every API call.
    #[derive(Default)]
    pub(crate) struct MockBot {
        pub(crate) calls: Mutex<Vec<(String, Value)>>,
    }

    #[async_trait]
    impl Bot for MockBot {
        fn self_id(&self) -> i64 {
            10
        }

        async fn call_api(&self, action: &str, params: Value) -> ApiResult<Value> {
            self.calls.lock().push((action.to_string(), params));
            Ok(json!({ "message_id": 1 }))
        }

        fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
            self
        }
    }

    pub(crate) fn context_for(event: impl Into<BoxedEvent>, settings: BotSettings) -> Context {
        Context::new(event.into(), Arc::new(MockBot::default()), Arc::new(settings))
    }

    pub(crate) fn group_text(text: &str) -> Context {
        context_for(GroupMessage::new(10, 100, 20, text), BotSettings::default())
    }

    #[test]
    fn test_args_after_command() {
        let ctx = group_text("/echo   hello world");
        assert_eq!(ctx.args(), "hello world");

        let ctx = group_text("/echo");
        assert_eq!(ctx.args(), "");

        let ctx = context_for(
            PrivateMessage::new(10, 20, "#roll 1d6"),
            BotSettings::new().command_prefix("#"),
        );
        assert_eq!(ctx.args(), "1d6");
    }

    #[test]
    fn test_scratch_state_is_typed() {
        let ctx = group_text("hi");
        ctx.set("count", 3usize);

        assert_eq!(ctx.get::<usize>("count"), Some(3));
        assert_eq!(ctx.get::<String>("count"), None);
        assert_eq!(ctx.remove::<String>("count"), None);
        assert!(ctx.contains_key("count"));
        assert_eq!(ctx.remove::<usize>("count"), Some(3));
        assert!(!ctx.contains_key("count"));
    }

    #[test]
    fn test_text_override() {
        let ctx = group_text("bad words");
        ctx.set_plain_text("*** words");
        assert_eq!(ctx.plain_text(), "*** words");
        assert_eq!(
            ctx.message().map(Message::plain_text).as_deref(),
            Some("bad words")
        );
    }

    #[test]
    fn test_abort_and_next() {
        let ctx = group_text("x");
        assert!(ctx.should_continue());
        ctx.abort();
        assert!(ctx.is_aborted());
        assert!(!ctx.should_continue());
        ctx.next();
        assert!(ctx.should_continue());
        assert!(ctx.is_aborted());
    }

    #[test]
    fn test_message_kind_and_mentions() {
        let group = group_text("x");
        assert!(group.is_group_message());
        assert!(!group.is_private_message());

        let msg = Message::new().with(Segment::at(7)).with(Segment::text("hey"));
        let private = context_for(PrivateMessage::new(10, 20, msg), BotSettings::default());
        assert!(private.is_private_message());
        assert_eq!(private.at_users(), vec![7]);

        let meta = context_for(
            Meta {
                self_id: 10,
                meta_event_type: "heartbeat".into(),
                ..Meta::default()
            },
            BotSettings::default(),
        );
        assert!(!meta.is_private_message());
        assert_eq!(meta.plain_text(), "");
    }

    #[test]
    fn test_super_user_and_nicknames() {
        let settings = BotSettings::new()
            .super_users([20])
            .nicknames(["^bot", "(unclosed"]);
        let ctx = context_for(GroupMessage::new(10, 100, 20, "x"), settings.clone());
        assert!(ctx.is_super_user());

        assert!(settings.mentions_nickname("bot, help"));
        assert!(!settings.mentions_nickname("robot"));
        assert!(settings.mentions_nickname("an (unclosed one"));
    }

    #[tokio::test]
    async fn test_reply_routes_by_conversation() {
        let bot = Arc::new(MockBot::default());
        let ctx = Context::new(
            GroupMessage::new(10, 100, 20, "x").into(),
            bot.clone(),
            Arc::new(BotSettings::default()),
        );
        ctx.reply("pong").await.unwrap();

        let ctx = Context::new(
            PrivateMessage::new(10, 20, "x").into(),
            bot.clone(),
            Arc::new(BotSettings::default()),
        );
        ctx.reply("pong").await.unwrap();

        let calls = bot.calls.lock();
        assert_eq!(calls[0].0, "send_group_msg");
        assert_eq!(calls[0].1["group_id"], 100);
        assert_eq!(calls[1].0, "send_private_msg");
        assert_eq!(calls[1].1["user_id"], 20);
    }

    #[tokio::test]
    async fn test_reply_to_meta_event_fails() {
        let ctx = context_for(
            Meta {
                self_id: 10,
                meta_event_type: "lifecycle".into(),
                ..Meta::default()
            },
            BotSettings::default(),
        );
        assert!(matches!(
            ctx.reply("x").await,
            Err(ApiError::MissingSession(_))
        ));
    }
}
