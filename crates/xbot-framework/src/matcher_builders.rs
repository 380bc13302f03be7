//! Rule builders.
//!
//! Each function returns a [`Matcher`] whose rule inspects the event. Text
//! rules look at [`Context::plain_text`](crate::Context::plain_text), so a replacing filter that runs in
//! an earlier matcher changes what they see.
//!
//! ```rust,ignore
//! engine.add(on_command("ping").handle(|_ctx| async { "pong" }));
//! engine.add(on_regex(r"^roll (?P<n>\d+)d(?P<sides>\d+)$").handle(roll));
//! engine.add(on_ac_keywords(banned.clone()).priority(100).block(true).handle(warn_user));
//! ```

use std::sync::Arc;

use regex::Regex;
use tracing::warn;
use xbot_core::EventType;
use xbot_keyword::{AcAutomaton, KeywordProvider, KeywordTrie, MatcherCache, ProviderCaches};

use crate::context::RegexMatch;
use crate::keyword::ContextKeywordProvider;
use crate::matcher::Matcher;

// ============================================================================
// Event kinds
// ============================================================================

pub fn on_message() -> Matcher {
    Matcher::new(|ctx| ctx.event().event_type() == EventType::Message)
}

pub fn on_notice() -> Matcher {
    Matcher::new(|ctx| ctx.event().event_type() == EventType::Notice)
}

pub fn on_request() -> Matcher {
    Matcher::new(|ctx| ctx.event().event_type() == EventType::Request)
}

pub fn on_meta() -> Matcher {
    Matcher::new(|ctx| ctx.event().event_type() == EventType::Meta)
}

// ============================================================================
// Text
// ============================================================================

/// Matches when the plain text equals `text`.
pub fn on_full_match(text: impl Into<String>) -> Matcher {
    let text = text.into();
    Matcher::new(move |ctx| ctx.plain_text() == text)
}

pub fn on_prefix(prefix: impl Into<String>) -> Matcher {
    let prefix = prefix.into();
    Matcher::new(move |ctx| ctx.plain_text().starts_with(&prefix))
}

pub fn on_suffix(suffix: impl Into<String>) -> Matcher {
    let suffix = suffix.into();
    Matcher::new(move |ctx| ctx.plain_text().ends_with(&suffix))
}

/// Matches when the plain text contains any of `keywords`.
///
/// Keywords are checked one by one. For large or changing lists use
/// [`on_ac_keywords`] instead.
pub fn on_keywords<I, S>(keywords: I) -> Matcher
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let keywords: Vec<String> = keywords.into_iter().map(Into::into).collect();
    Matcher::new(move |ctx| {
        let text = ctx.plain_text();
        keywords.iter().any(|k| text.contains(k.as_str()))
    })
}

/// Matches the plain text against `pattern`, storing the captures in the
/// context for the handler.
///
/// An invalid pattern is logged and produces a matcher that never matches.
pub fn on_regex(pattern: &str) -> Matcher {
    let re = match Regex::new(pattern) {
        Ok(re) => re,
        Err(err) => {
            warn!(pattern, error = %err, "invalid regex, matcher will never match");
            return Matcher::new(|_| false);
        }
    };

    Matcher::new(move |ctx| {
        let text = ctx.plain_text();
        let Some(captures) = re.captures(&text) else {
            return false;
        };

        let groups: Vec<Option<String>> = captures
            .iter()
            .map(|m| m.map(|m| m.as_str().to_string()))
            .collect();
        let named = re
            .capture_names()
            .flatten()
            .filter_map(|name| Some((name.to_string(), captures.name(name)?.as_str().to_string())))
            .collect();

        ctx.set_regex_match(RegexMatch {
            matched: captures
                .get(0)
                .map(|m| m.as_str().to_string())
                .unwrap_or_default(),
            groups,
            named,
        });
        true
    })
}

// ============================================================================
// Commands
// ============================================================================

/// Command name after the prefix, or `None` if the text has no prefix.
fn command_body<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    text.strip_prefix(prefix).map(str::trim)
}

fn is_command(body: &str, command: &str) -> bool {
    body.strip_prefix(command)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with(' '))
}

/// Matches `{prefix}{command}` alone or followed by a space and arguments.
///
/// The prefix is the bot's configured command prefix at the time the event
/// is evaluated.
pub fn on_command(command: impl Into<String>) -> Matcher {
    let command = command.into();
    Matcher::new(move |ctx| {
        let text = ctx.plain_text();
        command_body(&text, ctx.settings().get_command_prefix())
            .is_some_and(|body| is_command(body, &command))
    })
}

/// Like [`on_command`], matching any of `commands`.
pub fn on_command_group<I, S>(commands: I) -> Matcher
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let commands: Vec<String> = commands.into_iter().map(Into::into).collect();
    Matcher::new(move |ctx| {
        let text = ctx.plain_text();
        command_body(&text, ctx.settings().get_command_prefix())
            .is_some_and(|body| commands.iter().any(|c| is_command(body, c)))
    })
}

// ============================================================================
// Keyword providers
// ============================================================================

/// Matches when the text contains any of the provider's keywords, using an
/// Aho-Corasick automaton rebuilt whenever the provider's version changes.
pub fn on_ac_keywords(provider: Arc<dyn KeywordProvider>) -> Matcher {
    let cache = MatcherCache::<AcAutomaton>::new(provider);
    Matcher::new(move |ctx| cache.is_match(&ctx.plain_text()))
}

/// Like [`on_ac_keywords`], backed by a keyword trie.
pub fn on_dfa_keywords(provider: Arc<dyn KeywordProvider>) -> Matcher {
    let cache = MatcherCache::<KeywordTrie>::new(provider);
    Matcher::new(move |ctx| cache.is_match(&ctx.plain_text()))
}

/// Like [`on_ac_keywords`], with the provider picked per event.
pub fn on_ac_keywords_with<R: ContextKeywordProvider>(resolver: R) -> Matcher {
    let caches = ProviderCaches::<AcAutomaton>::new();
    Matcher::new(move |ctx| {
        resolver
            .provider(ctx)
            .is_some_and(|provider| caches.is_match(&provider, &ctx.plain_text()))
    })
}

/// Like [`on_dfa_keywords`], with the provider picked per event.
pub fn on_dfa_keywords_with<R: ContextKeywordProvider>(resolver: R) -> Matcher {
    let caches = ProviderCaches::<KeywordTrie>::new();
    Matcher::new(move |ctx| {
        resolver
            .provider(ctx)
            .is_some_and(|provider| caches.is_match(&provider, &ctx.plain_text()))
    })
}

#[cfg(test)]
mod tests {
    use xbot_core::{GroupMessage, Meta, Notice};
    use xbot_keyword::{KeywordManager, LockedKeywords};

    use super::*;
    use crate::context::tests::{context_for, group_text};
    use crate::context::{BotSettings, Context};

    #[test]
    fn test_text_rules() {
        let ctx = group_text("hello world");

        assert!(on_full_match("hello world").matches(&ctx));
        assert!(!on_full_match("hello").matches(&ctx));
        assert!(on_prefix("hello").matches(&ctx));
        assert!(on_suffix("world").matches(&ctx));
        assert!(!on_suffix("hello").matches(&ctx));
        assert!(on_keywords(["nope", "lo wo"]).matches(&ctx));
        assert!(!on_keywords(["nope"]).matches(&ctx));
    }

    #[test]
    fn test_event_kind_rules() {
        let notice = context_for(
            Notice {
                self_id: 10,
                notice_type: "group_increase".into(),
                ..Notice::default()
            },
            BotSettings::default(),
        );
        let meta = context_for(
            Meta {
                self_id: 10,
                meta_event_type: "heartbeat".into(),
                ..Meta::default()
            },
            BotSettings::default(),
        );

        assert!(on_notice().matches(&notice));
        assert!(!on_message().matches(&notice));
        assert!(on_meta().matches(&meta));
        assert!(!on_request().matches(&meta));
        assert!(on_message().matches(&group_text("x")));
    }

    #[test]
    fn test_command_rules() {
        assert!(on_command("echo").matches(&group_text("/echo")));
        assert!(on_command("echo").matches(&group_text("/echo hi")));
        assert!(on_command("echo").matches(&group_text("/ echo hi")));
        assert!(!on_command("echo").matches(&group_text("/echoes")));
        assert!(!on_command("echo").matches(&group_text("echo hi")));

        let hash = context_for(
            GroupMessage::new(10, 1, 2, "#roll 1d6"),
            BotSettings::new().command_prefix("#"),
        );
        let slash = context_for(
            GroupMessage::new(10, 1, 2, "/roll 1d6"),
            BotSettings::new().command_prefix("#"),
        );
        assert!(on_command("roll").matches(&hash));
        assert!(!on_command("roll").matches(&slash));

        let group = on_command_group(["help", "h"]);
        assert!(group.matches(&group_text("/h")));
        assert!(group.matches(&group_text("/help me")));
        assert!(!group.matches(&group_text("/hello")));
    }

    #[test]
    fn test_regex_stores_captures() {
        let ctx = group_text("roll 2d20 now");
        let m = on_regex(r"roll (?P<n>\d+)d(?P<sides>\d+)( twice)?");

        assert!(m.matches(&ctx));
        let result = ctx.regex_match().unwrap();
        assert_eq!(result.matched, "roll 2d20");
        assert_eq!(result.group(1), Some("2"));
        assert_eq!(result.name("sides"), Some("20"));
        assert_eq!(result.group(3), None);
        assert_eq!(result.groups.len(), 4);
        assert_eq!(result.named.len(), 2);
    }

    #[test]
    fn test_invalid_regex_never_matches() {
        let m = on_regex("(unclosed");
        let ctx = group_text("(unclosed");
        assert!(!m.matches(&ctx));
        assert!(ctx.regex_match().is_none());
    }

    #[test]
    fn test_ac_keywords_follow_provider() {
        let words = Arc::new(LockedKeywords::new(["spam"]));
        let m = on_ac_keywords(words.clone());

        assert!(m.matches(&group_text("buy spam now")));
        assert!(!m.matches(&group_text("buy eggs now")));

        words.add_keyword("eggs".to_string());
        assert!(m.matches(&group_text("buy eggs now")));

        words.clear();
        assert!(!m.matches(&group_text("buy spam now")));
    }

    #[test]
    fn test_dfa_keywords_follow_provider() {
        let words = Arc::new(LockedKeywords::new(Vec::<String>::new()));
        let m = on_dfa_keywords(words.clone());
        assert!(!m.matches(&group_text("anything")));

        words.set_keywords(vec!["thing".to_string()]);
        assert!(m.matches(&group_text("anything")));
    }

    #[test]
    fn test_keywords_with_resolver() {
        let per_group: Arc<dyn KeywordProvider> = Arc::new(LockedKeywords::new(["alpha"]));
        let resolver = move |ctx: &Context| -> Option<Arc<dyn KeywordProvider>> {
            (ctx.group_id() == Some(100)).then(|| Arc::clone(&per_group))
        };
        let ac = on_ac_keywords_with(resolver.clone());
        let dfa = on_dfa_keywords_with(resolver);

        let inside = group_text("alpha beta");
        let outside = context_for(GroupMessage::new(10, 200, 20, "alpha beta"), BotSettings::default());
        assert!(ac.matches(&inside));
        assert!(dfa.matches(&inside));
        assert!(!ac.matches(&outside));
        assert!(!dfa.matches(&outside));
    }
}
