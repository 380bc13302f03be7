//! Aho-Corasick multi-pattern automaton.
//!
//! The automaton is stored as an arena of nodes indexed by `usize`; node `0` is
//! the root. Transitions are keyed by Unicode scalar values (`char`), so the
//! scan cost does not depend on the alphabet size and multi-byte text is matched
//! per code point rather than per byte.
//!
//! All positions reported by [`AcAutomaton::match_all`] are **code-point
//! indices, end-inclusive**: for patterns `{"ab", "bc"}` and text `"xabcx"` the
//! result is `[2, 3]`.
//!
//! ```
//! use xbot_keyword::AcAutomaton;
//!
//! let ac = AcAutomaton::build(["he", "she", "his", "hers"]);
//! assert!(ac.is_match("ushers"));
//! assert_eq!(ac.match_all("ushers"), vec![3, 5]);
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::provider::KeywordProvider;

const ROOT: usize = 0;

#[derive(Debug, Clone, Default)]
struct Node {
    children: HashMap<char, usize>,
    /// Longest proper suffix of this node's path that is also a path from root.
    fail: usize,
    /// Set for pattern ends and for nodes whose failure target is accepting.
    output: bool,
}

/// An immutable Aho-Corasick automaton built from a set of patterns.
#[derive(Debug, Clone)]
pub struct AcAutomaton {
    nodes: Vec<Node>,
    patterns: usize,
}

impl Default for AcAutomaton {
    fn default() -> Self {
        Self {
            nodes: vec![Node::default()],
            patterns: 0,
        }
    }
}

impl AcAutomaton {
    /// Builds an automaton from `patterns`. Empty patterns are ignored.
    pub fn build<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut automaton = Self::default();
        for pattern in patterns {
            automaton.insert(pattern.as_ref());
        }
        automaton.link_failures();
        automaton
    }

    fn insert(&mut self, pattern: &str) {
        if pattern.is_empty() {
            return;
        }

        let mut node = ROOT;
        for ch in pattern.chars() {
            node = match self.nodes[node].children.get(&ch) {
                Some(&next) => next,
                None => {
                    let next = self.nodes.len();
                    self.nodes.push(Node::default());
                    self.nodes[node].children.insert(ch, next);
                    next
                }
            };
        }

        if !self.nodes[node].output {
            self.patterns += 1;
        }
        self.nodes[node].output = true;
    }

    /// Breadth-first failure link construction.
    ///
    /// A node's failure target is always shallower than the node itself, so by
    /// the time a node is reached its target's `output` flag is final.
    fn link_failures(&mut self) {
        let mut queue = VecDeque::new();

        let first_level: Vec<usize> = self.nodes[ROOT].children.values().copied().collect();
        for child in first_level {
            self.nodes[child].fail = ROOT;
            queue.push_back(child);
        }

        while let Some(current) = queue.pop_front() {
            let edges: Vec<(char, usize)> = self.nodes[current]
                .children
                .iter()
                .map(|(&ch, &child)| (ch, child))
                .collect();

            for (ch, child) in edges {
                queue.push_back(child);

                let mut state = self.nodes[current].fail;
                let fail = loop {
                    if let Some(&next) = self.nodes[state].children.get(&ch) {
                        break next;
                    }
                    if state == ROOT {
                        break ROOT;
                    }
                    state = self.nodes[state].fail;
                };

                self.nodes[child].fail = fail;
                if self.nodes[fail].output {
                    self.nodes[child].output = true;
                }
            }
        }
    }

    /// Number of distinct non-empty patterns in the automaton.
    pub fn pattern_count(&self) -> usize {
        self.patterns
    }

    /// Returns `true` if the automaton holds no patterns.
    pub fn is_empty(&self) -> bool {
        self.patterns == 0
    }

    fn step(&self, mut node: usize, ch: char) -> usize {
        loop {
            if let Some(&next) = self.nodes[node].children.get(&ch) {
                return next;
            }
            if node == ROOT {
                return ROOT;
            }
            node = self.nodes[node].fail;
        }
    }

    /// Returns `true` if any pattern occurs in `text`.
    pub fn is_match(&self, text: &str) -> bool {
        let mut node = ROOT;
        for ch in text.chars() {
            node = self.step(node, ch);
            if self.nodes[node].output {
                return true;
            }
        }
        false
    }

    /// Returns the end position of every match, one entry per position.
    ///
    /// Positions are code-point indices and end-inclusive. The scan always runs
    /// to the end of `text`.
    pub fn match_all(&self, text: &str) -> Vec<usize> {
        let mut matches = Vec::new();
        let mut node = ROOT;

        for (index, ch) in text.chars().enumerate() {
            node = self.step(node, ch);
            // `output` already folds in every failure-chain suffix
            if self.nodes[node].output {
                matches.push(index);
            }
        }

        matches
    }
}

/// A shareable, rebuildable holder for an [`AcAutomaton`].
///
/// [`build`](Self::build) constructs the new automaton outside the lock and
/// then swaps the reference, so concurrent readers either see the previous
/// automaton or the new one, never a partially built tree.
#[derive(Debug, Default)]
pub struct AcMachine {
    current: RwLock<Arc<AcAutomaton>>,
}

impl AcMachine {
    /// Creates a machine with no patterns.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds the automaton from `patterns`, replacing the previous one.
    pub fn build<I, S>(&self, patterns: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let automaton = Arc::new(AcAutomaton::build(patterns));
        *self.current.write() = automaton;
    }

    /// Rebuilds from the provider's current keywords.
    pub fn reload(&self, provider: &dyn KeywordProvider) {
        self.build(provider.keywords());
    }

    /// Returns the automaton currently installed.
    pub fn snapshot(&self) -> Arc<AcAutomaton> {
        Arc::clone(&self.current.read())
    }

    /// See [`AcAutomaton::is_match`].
    pub fn is_match(&self, text: &str) -> bool {
        self.snapshot().is_match(text)
    }

    /// See [`AcAutomaton::match_all`].
    pub fn match_all(&self, text: &str) -> Vec<usize> {
        self.snapshot().match_all(text)
    }
}
