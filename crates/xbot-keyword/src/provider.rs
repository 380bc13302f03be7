//! Versioned keyword sources.
//!
//! A provider hands out its keyword list together with a monotonically
//! increasing version. Consumers such as [`MatcherCache`](crate::MatcherCache)
//! compare versions to decide whether a cached automaton is stale, so the
//! version must be cheap to read and every mutation must bump it exactly once.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use parking_lot::{Mutex, RwLock};

/// Version a freshly created manager starts at.
pub const INITIAL_VERSION: i64 = 1;

/// A source of keywords with a change counter.
pub trait KeywordProvider: Send + Sync {
    /// Returns a copy of the current keyword list.
    fn keywords(&self) -> Vec<String>;

    /// Returns the current version without taking a lock.
    fn version(&self) -> i64;

    /// Returns a version and the keyword list that belongs to it.
    ///
    /// The default implementation re-reads the version until it is stable
    /// around the list read. Implementations that can do better under their
    /// own lock should override it.
    fn snapshot(&self) -> (i64, Vec<String>) {
        loop {
            let before = self.version();
            let keywords = self.keywords();
            if self.version() == before {
                return (before, keywords);
            }
        }
    }
}

/// A keyword provider that can be edited at runtime.
pub trait KeywordManager: KeywordProvider {
    /// Replaces the whole list.
    fn set_keywords(&self, keywords: Vec<String>);

    /// Appends one keyword.
    fn add_keyword(&self, keyword: String);

    /// Removes the first occurrence of `keyword`.
    ///
    /// Returns `false`, leaving the version untouched, when it is absent.
    fn remove_keyword(&self, keyword: &str) -> bool;

    /// Removes every keyword.
    fn clear(&self);

    /// Number of keywords, duplicates included.
    fn count(&self) -> usize;
}

/// Lock-guarded keyword manager.
///
/// Readers and writers share a [`RwLock`]; the version lives in an atomic so
/// [`version`](KeywordProvider::version) never blocks. Mutations bump the
/// version while still holding the write lock, which keeps
/// [`snapshot`](KeywordProvider::snapshot) consistent.
#[derive(Debug)]
pub struct LockedKeywords {
    keywords: RwLock<Vec<String>>,
    version: AtomicI64,
}

impl LockedKeywords {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keywords: RwLock::new(keywords.into_iter().map(Into::into).collect()),
            version: AtomicI64::new(INITIAL_VERSION),
        }
    }

    fn bump(&self) {
        self.version.fetch_add(1, Ordering::AcqRel);
    }
}

impl Default for LockedKeywords {
    fn default() -> Self {
        Self::new(Vec::<String>::new())
    }
}

impl KeywordProvider for LockedKeywords {
    fn keywords(&self) -> Vec<String> {
        self.keywords.read().clone()
    }

    fn version(&self) -> i64 {
        self.version.load(Ordering::Acquire)
    }

    fn snapshot(&self) -> (i64, Vec<String>) {
        let keywords = self.keywords.read();
        (self.version.load(Ordering::Acquire), keywords.clone())
    }
}

impl KeywordManager for LockedKeywords {
    fn set_keywords(&self, keywords: Vec<String>) {
        let mut guard = self.keywords.write();
        *guard = keywords;
        self.bump();
    }

    fn add_keyword(&self, keyword: String) {
        let mut guard = self.keywords.write();
        guard.push(keyword);
        self.bump();
    }

    fn remove_keyword(&self, keyword: &str) -> bool {
        let mut guard = self.keywords.write();
        match guard.iter().position(|k| k == keyword) {
            Some(index) => {
                guard.remove(index);
                self.bump();
                true
            }
            None => false,
        }
    }

    fn clear(&self) {
        let mut guard = self.keywords.write();
        guard.clear();
        self.bump();
    }

    fn count(&self) -> usize {
        self.keywords.read().len()
    }
}

#[derive(Debug)]
struct Published {
    version: i64,
    keywords: Arc<Vec<String>>,
}

/// Copy-on-write keyword manager.
///
/// Readers clone an [`Arc`] to the published list and never wait on writers
/// for longer than a pointer swap. Writers serialize on a separate mutex,
/// build a fresh list, publish it, and only then advance the atomic version,
/// so anyone who observes the new version also observes the new list.
#[derive(Debug)]
pub struct CowKeywords {
    published: RwLock<Arc<Published>>,
    version: AtomicI64,
    writer: Mutex<()>,
}

impl CowKeywords {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            published: RwLock::new(Arc::new(Published {
                version: INITIAL_VERSION,
                keywords: Arc::new(keywords.into_iter().map(Into::into).collect()),
            })),
            version: AtomicI64::new(INITIAL_VERSION),
            writer: Mutex::new(()),
        }
    }

    fn current(&self) -> Arc<Published> {
        Arc::clone(&self.published.read())
    }

    /// Shared view of the current list, without copying it.
    pub fn shared(&self) -> Arc<Vec<String>> {
        Arc::clone(&self.current().keywords)
    }

    // callers hold `writer`
    fn publish(&self, keywords: Vec<String>) {
        let version = self.current().version + 1;
        *self.published.write() = Arc::new(Published {
            version,
            keywords: Arc::new(keywords),
        });
        self.version.store(version, Ordering::Release);
    }
}

impl Default for CowKeywords {
    fn default() -> Self {
        Self::new(Vec::<String>::new())
    }
}

impl KeywordProvider for CowKeywords {
    fn keywords(&self) -> Vec<String> {
        self.current().keywords.as_ref().clone()
    }

    fn version(&self) -> i64 {
        self.version.load(Ordering::Acquire)
    }

    fn snapshot(&self) -> (i64, Vec<String>) {
        let published = self.current();
        (published.version, published.keywords.as_ref().clone())
    }
}

impl KeywordManager for CowKeywords {
    fn set_keywords(&self, keywords: Vec<String>) {
        let _writer = self.writer.lock();
        self.publish(keywords);
    }

    fn add_keyword(&self, keyword: String) {
        let _writer = self.writer.lock();
        let mut next = self.keywords();
        next.push(keyword);
        self.publish(next);
    }

    fn remove_keyword(&self, keyword: &str) -> bool {
        let _writer = self.writer.lock();
        let current = self.current();
        let Some(index) = current.keywords.iter().position(|k| k == keyword) else {
            return false;
        };

        let mut next = current.keywords.as_ref().clone();
        next.remove(index);
        self.publish(next);
        true
    }

    fn clear(&self) {
        let _writer = self.writer.lock();
        self.publish(Vec::new());
    }

    fn count(&self) -> usize {
        self.current().keywords.len()
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    fn exercise(manager: &dyn KeywordManager) {
        assert_eq!(manager.version(), INITIAL_VERSION);
        assert_eq!(manager.count(), 2);

        manager.add_keyword("c".into());
        assert_eq!(manager.version(), 2);
        assert_eq!(manager.keywords(), vec!["a", "b", "c"]);

        assert!(manager.remove_keyword("b"));
        assert_eq!(manager.version(), 3);

        assert!(!manager.remove_keyword("missing"));
        assert_eq!(manager.version(), 3);

        manager.set_keywords(vec!["x".into(), "x".into()]);
        assert_eq!(manager.version(), 4);
        assert_eq!(manager.count(), 2);

        // only the first duplicate goes
        assert!(manager.remove_keyword("x"));
        assert_eq!(manager.keywords(), vec!["x"]);

        manager.clear();
        assert_eq!(manager.version(), 6);
        assert_eq!(manager.count(), 0);
        assert_eq!(manager.snapshot(), (6, Vec::new()));
    }

    #[test]
    fn test_locked_keywords_versioning() {
        exercise(&LockedKeywords::new(["a", "b"]));
    }

    #[test]
    fn test_cow_keywords_versioning() {
        exercise(&CowKeywords::new(["a", "b"]));
    }

    #[test]
    fn test_keywords_returns_independent_copy() {
        let manager = LockedKeywords::new(["a"]);
        let mut copy = manager.keywords();
        copy.push("b".into());
        assert_eq!(manager.count(), 1);

        let manager = CowKeywords::new(["a"]);
        let held = manager.shared();
        manager.add_keyword("b".into());
        assert_eq!(held.as_slice(), ["a"]);
        assert_eq!(manager.count(), 2);
    }

    #[test]
    fn test_concurrent_adds_bump_once_each() {
        let locked = Arc::new(LockedKeywords::default());
        let cow = Arc::new(CowKeywords::default());

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let locked = Arc::clone(&locked);
                let cow = Arc::clone(&cow);
                thread::spawn(move || {
                    for i in 0..50 {
                        locked.add_keyword(format!("{t}-{i}"));
                        cow.add_keyword(format!("{t}-{i}"));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(locked.count(), 400);
        assert_eq!(locked.version(), INITIAL_VERSION + 400);
        assert_eq!(cow.count(), 400);
        assert_eq!(cow.version(), INITIAL_VERSION + 400);
    }

    #[test]
    fn test_snapshot_version_matches_list() {
        let manager = Arc::new(CowKeywords::default());
        let writer = {
            let manager = Arc::clone(&manager);
            thread::spawn(move || {
                for i in 0..200 {
                    manager.add_keyword(i.to_string());
                }
            })
        };

        for _ in 0..200 {
            let (version, keywords) = manager.snapshot();
            assert_eq!(keywords.len() as i64, version - INITIAL_VERSION);
        }
        writer.join().unwrap();
    }
}
