//! Sensitive-word detection and masking.
//!
//! [`SensitiveFilter`] holds a keyword trie that can be swapped at runtime,
//! either from a word list or by re-reading the file it was loaded from,
//! by hand or whenever the file changes (see [`SensitiveFilter::watch`]).
//! It plugs into matchers as a [`Filter`]:
//!
//! ```rust,ignore
//! let words = Arc::new(SensitiveFilter::from_file("data/sensitive.txt")?);
//!
//! // drop messages containing sensitive words
//! engine.add(on_message().filter(words.as_filter()).handle(chat));
//!
//! // or mask them for every matcher that runs afterwards
//! engine.add(on_message().priority(1000).filter(words.as_replacer('*')));
//!
//! // pick up edits to the file until `_watch` is dropped
//! let _watch = words.watch(Duration::from_secs(10))?;
//! ```

use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::time::{Duration, SystemTime};

use parking_lot::RwLock;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, warn};
use xbot_keyword::{KeywordMatch, KeywordTrie, load_keywords};

use crate::error::{FrameworkError, FrameworkResult};
use crate::filter::Filter;

pub struct SensitiveFilter {
    trie: RwLock<Arc<KeywordTrie>>,
    path: Option<PathBuf>,
}

impl SensitiveFilter {
    pub fn new<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            trie: RwLock::new(Arc::new(KeywordTrie::build(words))),
            path: None,
        }
    }

    /// Loads one word per line from `path`, skipping blank lines.
    pub fn from_file(path: impl AsRef<Path>) -> FrameworkResult<Self> {
        let path = path.as_ref().to_path_buf();
        let filter = Self {
            trie: RwLock::new(Arc::new(KeywordTrie::default())),
            path: Some(path),
        };
        filter.reload()?;
        Ok(filter)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Re-reads the source file.
    ///
    /// Fails with [`FrameworkError::NoSource`] for filters built from a word
    /// list. On a read error the current words stay in place.
    pub fn reload(&self) -> FrameworkResult<()> {
        let path = self.path.as_ref().ok_or(FrameworkError::NoSource)?;
        let words = load_keywords(path)?;
        let trie = KeywordTrie::build(&words);
        info!(path = %path.display(), words = trie.word_count(), "sensitive words loaded");
        *self.trie.write() = Arc::new(trie);
        Ok(())
    }

    /// Polls the source file every `every` and reloads it when its size or
    /// modification time changed. Polling stops when the returned guard is
    /// dropped or the filter itself is gone.
    ///
    /// A missing file or a failed reload keeps the current words.
    pub fn watch(self: &Arc<Self>, every: Duration) -> FrameworkResult<DropGuard> {
        let path = self.path.clone().ok_or(FrameworkError::NoSource)?;
        if every.is_zero() {
            return Err(FrameworkError::ZeroInterval);
        }
        let handle =
            tokio::runtime::Handle::try_current().map_err(|_| FrameworkError::NoRuntime)?;

        let filter = Arc::downgrade(self);
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let mut last = FileStamp::read(&path);
        debug!(path = %path.display(), interval = ?every, "watching sensitive word file");

        handle.spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + every, every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = cancelled.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(filter) = Weak::upgrade(&filter) else { break };
                        let current = FileStamp::read(&path);
                        if current.is_none() || current == last {
                            continue;
                        }
                        last = current;
                        if let Err(err) = filter.reload() {
                            warn!(path = %path.display(), error = %err, "sensitive word reload failed");
                        }
                    }
                }
            }
            debug!(path = %path.display(), "stopped watching sensitive word file");
        });

        Ok(token.drop_guard())
    }

    /// Replaces the word list.
    pub fn set_words<I, S>(&self, words: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        *self.trie.write() = Arc::new(KeywordTrie::build(words));
    }

    pub fn word_count(&self) -> usize {
        self.current().word_count()
    }

    fn current(&self) -> Arc<KeywordTrie> {
        Arc::clone(&self.trie.read())
    }

    pub fn contains(&self, text: &str) -> bool {
        self.current().contains(text)
    }

    pub fn find_all(&self, text: &str) -> Vec<KeywordMatch> {
        self.current().find_all(text)
    }

    /// Replaces every character of every sensitive word with `replacement`.
    pub fn censor(&self, text: &str, replacement: char) -> String {
        self.current().filter(text, replacement)
    }

    /// A filter rejecting messages that contain sensitive words.
    ///
    /// Events without a message pass.
    pub fn as_filter(self: &Arc<Self>) -> Filter {
        let this = Arc::clone(self);
        Filter::new(move |ctx| {
            if ctx.message().is_none() {
                return true;
            }
            !this.contains(&ctx.plain_text())
        })
    }

    /// A filter that always passes and masks sensitive words in the text seen
    /// by later rules, filters and handlers.
    ///
    /// A matcher carrying only this filter matches every event its rule
    /// accepts, so [`Engine::handle_event`](crate::Engine::handle_event)
    /// reports such events as matched even when nothing else handled them.
    pub fn as_replacer(self: &Arc<Self>, replacement: char) -> Filter {
        let this = Arc::clone(self);
        Filter::new(move |ctx| {
            if ctx.message().is_none() {
                return true;
            }
            let text = ctx.plain_text();
            if this.contains(&text) {
                ctx.set_plain_text(this.censor(&text, replacement));
            }
            true
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileStamp {
    modified: Option<SystemTime>,
    len: u64,
}

impl FileStamp {
    fn read(path: &Path) -> Option<Self> {
        let meta = std::fs::metadata(path).ok()?;
        Some(Self {
            modified: meta.modified().ok(),
            len: meta.len(),
        })
    }
}

impl std::fmt::Debug for SensitiveFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SensitiveFilter")
            .field("words", &self.word_count())
            .field("path", &self.path)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use xbot_core::Meta;

    use super::*;
    use crate::context::BotSettings;
    use crate::context::tests::{context_for, group_text};

    fn temp_file(name: &str, content: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("xbot-{}-{name}", std::process::id()));
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_contains_and_censor() {
        let filter = SensitiveFilter::new(["bad", "worse"]);
        assert!(filter.contains("this is bad"));
        assert!(!filter.contains("this is fine"));
        assert_eq!(filter.censor("bad and worse", '*'), "*** and *****");

        let found: Vec<String> = filter.find_all("worse bad").into_iter().map(|m| m.word).collect();
        assert_eq!(found, ["worse", "bad"]);
    }

    #[test]
    fn test_as_filter() {
        let filter = Arc::new(SensitiveFilter::new(["bad"]));
        let check = filter.as_filter();

        assert!(!check.check(&group_text("so bad")));
        assert!(check.check(&group_text("so good")));

        let meta = context_for(
            Meta {
                self_id: 10,
                meta_event_type: "heartbeat".into(),
                ..Meta::default()
            },
            BotSettings::default(),
        );
        assert!(check.check(&meta));
    }

    #[test]
    fn test_as_replacer_masks_text() {
        let filter = Arc::new(SensitiveFilter::new(["bad"]));
        let ctx = group_text("so bad");

        assert!(filter.as_replacer('#').check(&ctx));
        assert_eq!(ctx.plain_text(), "so ###");
    }

    #[test]
    fn test_reload_from_file() {
        let path = temp_file("reload.txt", "  bad \n\n");
        let filter = SensitiveFilter::from_file(&path).unwrap();
        assert_eq!(filter.word_count(), 1);
        assert!(!filter.contains("awful"));

        std::fs::write(&path, "bad\nawful\n").unwrap();
        filter.reload().unwrap();
        assert!(filter.contains("awful"));

        std::fs::remove_file(&path).unwrap();
        assert!(filter.reload().is_err());
        assert!(filter.contains("awful"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_reloads_until_guard_dropped() {
        let path = temp_file("watch.txt", "bad\n");
        let filter = Arc::new(SensitiveFilter::from_file(&path).unwrap());
        let guard = filter.watch(Duration::from_secs(5)).unwrap();

        std::fs::write(&path, "bad\nawful\n").unwrap();
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(filter.contains("awful"));
        assert_eq!(filter.word_count(), 2);

        drop(guard);
        std::fs::write(&path, "calm\n").unwrap();
        tokio::time::sleep(Duration::from_secs(11)).await;
        assert!(filter.contains("awful"));
        assert!(!filter.contains("calm"));

        std::fs::remove_file(&path).unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_keeps_words_when_file_disappears() {
        let path = temp_file("watch-gone.txt", "bad\n");
        let filter = Arc::new(SensitiveFilter::from_file(&path).unwrap());
        let _guard = filter.watch(Duration::from_secs(5)).unwrap();

        std::fs::remove_file(&path).unwrap();
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(filter.contains("bad"));
    }

    #[tokio::test]
    async fn test_watch_requires_source_and_interval() {
        let words = Arc::new(SensitiveFilter::new(["x"]));
        assert!(matches!(
            words.watch(Duration::from_secs(1)),
            Err(FrameworkError::NoSource)
        ));

        let path = temp_file("watch-zero.txt", "x\n");
        let filed = Arc::new(SensitiveFilter::from_file(&path).unwrap());
        assert!(matches!(filed.watch(Duration::ZERO), Err(FrameworkError::ZeroInterval)));
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_watch_outside_runtime() {
        let path = temp_file("watch-nort.txt", "x\n");
        let filed = Arc::new(SensitiveFilter::from_file(&path).unwrap());
        assert!(matches!(
            filed.watch(Duration::from_secs(1)),
            Err(FrameworkError::NoRuntime)
        ));
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_reload_without_source() {
        let filter = SensitiveFilter::new(["x"]);
        assert!(matches!(filter.reload(), Err(FrameworkError::NoSource)));

        filter.set_words(["y", "z"]);
        assert_eq!(filter.word_count(), 2);
    }
}
