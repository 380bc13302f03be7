//! Keyword Bot Example
//!
//! Reads chat lines from stdin, dispatches them as group messages and prints
//! every API call the handlers make.
//!
//! ```text
//! > 10001: hello rust
//! send_group_msg {"group_id":100,"message":[{"type":"text","data":{"text":"🦀 rust spotted"}}]}
//! > 1: /kw add ferris
//! > 10001: what a badword
//! ```
//!
//! Lines are `<user_id>: <text>`; a bare line is sent by user 10001. User 1 is
//! a super user and may edit the keyword list with `/kw add|del|list`.
//!
//! # Usage
//!
//! ```bash
//! cargo run --package keyword-bot
//! ```

use std::any::Any;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use xbot::core::{ApiResult, GroupMessage};
use xbot::framework::{Handler, SensitiveFilter};
use xbot::prelude::*;

const GROUP_ID: i64 = 100;
const DEFAULT_USER: i64 = 10001;

// ============================================================================
// Console bot
// ============================================================================

/// Prints outgoing API calls instead of sending them.
struct ConsoleBot;

#[async_trait]
impl Bot for ConsoleBot {
    fn self_id(&self) -> i64 {
        10
    }

    async fn call_api(&self, action: &str, params: Value) -> ApiResult<Value> {
        println!("{action} {params}");
        Ok(json!({ "message_id": 0 }))
    }

    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

// ============================================================================
// Handlers
// ============================================================================

async fn ping(_ctx: Arc<Context>) -> &'static str {
    "pong"
}

fn keyword_admin(words: Arc<CowKeywords>) -> impl Handler {
    move |ctx: Arc<Context>| {
        let words = Arc::clone(&words);
        async move {
            let args = ctx.args();
            let (op, word) = args.split_once(' ').unwrap_or((args.as_str(), ""));
            match (op, word.trim()) {
                ("add", word) if !word.is_empty() => {
                    words.add_keyword(word.to_string());
                    format!("added {word} (version {})", words.version())
                }
                ("del", word) if !word.is_empty() => {
                    if words.remove_keyword(word) {
                        format!("removed {word}")
                    } else {
                        format!("{word} is not a keyword")
                    }
                }
                ("list", _) => words.keywords().join(", "),
                _ => "usage: /kw add|del <word>, /kw list".to_string(),
            }
        }
    }
}

fn keyword_spotted(words: Arc<CowKeywords>) -> impl Handler {
    move |ctx: Arc<Context>| {
        let words = Arc::clone(&words);
        async move {
            let text = ctx.plain_text();
            let hits: Vec<String> = words
                .keywords()
                .into_iter()
                .filter(|w| text.contains(w.as_str()))
                .collect();
            format!("🦀 {} spotted", hits.join(", "))
        }
    }
}

// ============================================================================
// Stdin
// ============================================================================

fn parse_line(line: &str) -> Option<(i64, &str)> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    match line.split_once(':') {
        Some((user, text)) => match user.trim().parse() {
            Ok(user) => Some((user, text.trim())),
            Err(_) => Some((DEFAULT_USER, line)),
        },
        None => Some((DEFAULT_USER, line)),
    }
}

async fn read_stdin(events: EventSender) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let Some((user_id, text)) = parse_line(&line) else {
            continue;
        };
        events
            .send(GroupMessage::new(10, GROUP_ID, user_id, text))
            .await?;
    }
    info!("stdin closed");
    Ok(())
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let runtime = XbotRuntime::builder().build(Arc::new(ConsoleBot))?;

    let sensitive = Arc::new(SensitiveFilter::new(["badword"]));
    let words = Arc::new(CowKeywords::new(["rust", "ferris"]));
    let limiter = runtime.limiter(Duration::from_secs(10), 3);

    let engine = runtime.engine();
    let super_users = runtime.config().bot.super_users.iter().copied().chain([1]);
    engine.set_settings(runtime.settings().super_users(super_users));
    engine
        .use_middleware(middleware::recovery())
        .use_middleware(middleware::logger());
    engine
        // masks sensitive words for every matcher below
        .add(
            Matcher::new(|ctx| ctx.message().is_some())
                .name("censor")
                .priority(1000)
                .filter(sensitive.as_replacer('*')),
        )
        .add(on_command("ping").name("ping").priority(10).handle(ping))
        .add(
            on_command("kw")
                .name("keyword admin")
                .priority(10)
                .block(true)
                .filter(filter::only_super_users())
                .handle(keyword_admin(Arc::clone(&words))),
        )
        .add(
            on_ac_keywords(words.clone())
                .name("keywords")
                .limit_with(limiter)
                .on_exceed(|ctx| warn!(user = ?ctx.user_id(), "keyword replies rate limited"))
                .handle(keyword_spotted(Arc::clone(&words))),
        );

    let events = runtime.event_sender();
    let stdin = tokio::spawn(read_stdin(events));

    runtime
        .run_until(async {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => info!("Received Ctrl+C, shutting down"),
                result = stdin => match result {
                    Ok(Err(err)) => warn!(error = %err, "stdin reader failed"),
                    Err(err) => warn!(error = %err, "stdin reader panicked"),
                    Ok(Ok(())) => {}
                },
            }
        })
        .await?;

    runtime.shutdown().await;
    Ok(())
}
