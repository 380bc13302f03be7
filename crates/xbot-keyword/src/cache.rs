//! Lazily rebuilt keyword indexes keyed on provider versions.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use tracing::debug;

use crate::ac::AcAutomaton;
use crate::provider::KeywordProvider;
use crate::trie::KeywordTrie;

/// Version recorded before anything has been built.
const UNBUILT: i64 = -1;

/// A searchable structure that can be built from a keyword list.
pub trait KeywordIndex: Send + Sync + 'static {
    fn build(keywords: &[String]) -> Self;

    fn is_match(&self, text: &str) -> bool;
}

impl KeywordIndex for AcAutomaton {
    fn build(keywords: &[String]) -> Self {
        AcAutomaton::build(keywords)
    }

    fn is_match(&self, text: &str) -> bool {
        AcAutomaton::is_match(self, text)
    }
}

impl KeywordIndex for KeywordTrie {
    fn build(keywords: &[String]) -> Self {
        KeywordTrie::build(keywords)
    }

    fn is_match(&self, text: &str) -> bool {
        self.contains(text)
    }
}

struct Entry<A> {
    index: Option<Arc<A>>,
    version: i64,
}

/// Caches one index built from a provider and rebuilds it when the provider's
/// version moves.
///
/// The check is double-checked: a shared lock serves the common case where
/// the cached version is current, and a rebuild re-checks under the exclusive
/// lock so that concurrent callers racing on the same version transition
/// build exactly once. The stored version is always the one returned together
/// with the keyword list by [`KeywordProvider::snapshot`], never a value read
/// separately.
pub struct MatcherCache<A> {
    provider: Arc<dyn KeywordProvider>,
    entry: RwLock<Entry<A>>,
    rebuilds: AtomicU64,
}

impl<A: KeywordIndex> fmt::Debug for MatcherCache<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MatcherCache")
            .field("version", &self.cached_version())
            .field("rebuilds", &self.rebuild_count())
            .finish_non_exhaustive()
    }
}

impl<A: KeywordIndex> MatcherCache<A> {
    pub fn new(provider: Arc<dyn KeywordProvider>) -> Self {
        Self {
            provider,
            entry: RwLock::new(Entry {
                index: None,
                version: UNBUILT,
            }),
            rebuilds: AtomicU64::new(0),
        }
    }

    pub fn provider(&self) -> &Arc<dyn KeywordProvider> {
        &self.provider
    }

    /// Returns the index for the provider's current version, rebuilding it
    /// first if needed.
    ///
    /// Returns `None` while the provider has no keywords.
    pub fn get(&self) -> Option<Arc<A>> {
        let version = self.provider.version();
        {
            let entry = self.entry.read();
            if entry.version == version {
                return entry.index.clone();
            }
        }

        let mut entry = self.entry.write();
        if entry.version == self.provider.version() {
            return entry.index.clone();
        }

        let (version, keywords) = self.provider.snapshot();
        if keywords.is_empty() {
            entry.index = None;
            entry.version = version;
            return None;
        }

        let index = Arc::new(A::build(&keywords));
        entry.index = Some(Arc::clone(&index));
        entry.version = version;
        self.rebuilds.fetch_add(1, Ordering::Relaxed);
        debug!(version, keywords = keywords.len(), "keyword index rebuilt");

        Some(index)
    }

    /// Returns `true` if any current keyword occurs in `text`.
    pub fn is_match(&self, text: &str) -> bool {
        self.get().is_some_and(|index| index.is_match(text))
    }

    /// Number of times an index has been built.
    pub fn rebuild_count(&self) -> u64 {
        self.rebuilds.load(Ordering::Relaxed)
    }

    /// Version the cached index was built from, `-1` before the first build.
    pub fn cached_version(&self) -> i64 {
        self.entry.read().version
    }
}

/// One [`MatcherCache`] per provider instance.
///
/// Providers are told apart by identity. Caches are created on first use and
/// kept for the lifetime of the map; each cache holds its provider, so an
/// identity can never be reused by a different provider while the entry
/// exists.
pub struct ProviderCaches<A> {
    caches: RwLock<HashMap<usize, Arc<MatcherCache<A>>>>,
}

impl<A> Default for ProviderCaches<A> {
    fn default() -> Self {
        Self {
            caches: RwLock::new(HashMap::new()),
        }
    }
}

impl<A> fmt::Debug for ProviderCaches<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderCaches")
            .field("len", &self.caches.read().len())
            .finish()
    }
}

fn identity(provider: &Arc<dyn KeywordProvider>) -> usize {
    Arc::as_ptr(provider).cast::<()>() as usize
}

impl<A: KeywordIndex> ProviderCaches<A> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cache for `provider`, creating it on first sight.
    pub fn cache_for(&self, provider: &Arc<dyn KeywordProvider>) -> Arc<MatcherCache<A>> {
        let key = identity(provider);
        if let Some(cache) = self.caches.read().get(&key) {
            return Arc::clone(cache);
        }

        let mut caches = self.caches.write();
        Arc::clone(
            caches
                .entry(key)
                .or_insert_with(|| Arc::new(MatcherCache::new(Arc::clone(provider)))),
        )
    }

    /// Matches `text` against `provider`'s current keywords.
    pub fn is_match(&self, provider: &Arc<dyn KeywordProvider>, text: &str) -> bool {
        self.cache_for(provider).is_match(text)
    }

    /// Number of distinct providers seen so far.
    pub fn len(&self) -> usize {
        self.caches.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
