//! # xbot keyword
//!
//! Multi-pattern text matching for the xbot framework.
//!
//! - [`AcAutomaton`]: Aho-Corasick automaton, linear-time containment checks
//!   and end positions of every match
//! - [`KeywordTrie`]: plain trie that also reports matched words and can mask
//!   them
//! - [`KeywordProvider`] / [`KeywordManager`]: versioned keyword sources, with
//!   a lock-guarded ([`LockedKeywords`]) and a copy-on-write ([`CowKeywords`])
//!   implementation
//! - [`MatcherCache`] / [`ProviderCaches`]: indexes rebuilt lazily, once per
//!   provider version
//!
//! ```
//! use std::sync::Arc;
//! use xbot_keyword::{AcAutomaton, KeywordManager, LockedKeywords, MatcherCache};
//!
//! let words = Arc::new(LockedKeywords::new(["spam"]));
//! let cache = MatcherCache::<AcAutomaton>::new(words.clone());
//! assert!(cache.is_match("no spam"));
//!
//! words.add_keyword("eggs".to_string());
//! assert!(cache.is_match("green eggs"));
//! assert_eq!(cache.rebuild_count(), 2);
//! ```

pub mod ac;
pub mod cache;
pub mod error;
pub mod provider;
pub mod source;
pub mod trie;

pub use ac::{AcAutomaton, AcMachine};
pub use cache::{KeywordIndex, MatcherCache, ProviderCaches};
pub use error::{KeywordError, KeywordResult};
pub use provider::{CowKeywords, INITIAL_VERSION, KeywordManager, KeywordProvider, LockedKeywords};
pub use source::{load_keywords, parse_keywords};
pub use trie::{KeywordMatch, KeywordTrie};
