//! Plain keyword trie without failure links.
//!
//! Scanning restarts the walk at every text position, `O(n * m)` in the worst
//! case. Unlike [`AcAutomaton`](crate::AcAutomaton), the trie reports *which*
//! words matched and where, and can mask them out of the text.

use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
struct TrieNode {
    children: HashMap<char, usize>,
    end: bool,
}

/// A keyword found by [`KeywordTrie::find_all`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordMatch {
    /// The matched keyword.
    pub word: String,
    /// Code-point index of the first character.
    pub start: usize,
    /// Code-point index one past the last character.
    pub end: usize,
}

/// A keyword trie supporting containment checks, enumeration and masking.
#[derive(Debug, Clone)]
pub struct KeywordTrie {
    nodes: Vec<TrieNode>,
    words: usize,
}

impl Default for KeywordTrie {
    fn default() -> Self {
        Self {
            nodes: vec![TrieNode::default()],
            words: 0,
        }
    }
}

impl KeywordTrie {
    /// Builds a trie from `words`. Empty words are ignored.
    pub fn build<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut trie = Self::default();
        for word in words {
            trie.insert(word.as_ref());
        }
        trie
    }

    fn insert(&mut self, word: &str) {
        if word.is_empty() {
            return;
        }

        let mut node = 0;
        for ch in word.chars() {
            node = match self.nodes[node].children.get(&ch) {
                Some(&next) => next,
                None => {
                    let next = self.nodes.len();
                    self.nodes.push(TrieNode::default());
                    self.nodes[node].children.insert(ch, next);
                    next
                }
            };
        }

        if !self.nodes[node].end {
            self.words += 1;
        }
        self.nodes[node].end = true;
    }

    /// Number of distinct non-empty words.
    pub fn word_count(&self) -> usize {
        self.words
    }

    /// Returns `true` if the trie holds no words.
    pub fn is_empty(&self) -> bool {
        self.words == 0
    }

    /// Calls `on_end(start, end)` for every word occurrence, in scan order.
    ///
    /// Returning `false` from the callback stops the scan.
    fn scan(&self, chars: &[char], mut on_end: impl FnMut(usize, usize) -> bool) {
        for start in 0..chars.len() {
            let mut node = 0;
            for (offset, ch) in chars[start..].iter().enumerate() {
                match self.nodes[node].children.get(ch) {
                    Some(&next) => node = next,
                    None => break,
                }
                if self.nodes[node].end && !on_end(start, start + offset + 1) {
                    return;
                }
            }
        }
    }

    /// Returns `true` if any word occurs in `text`.
    pub fn contains(&self, text: &str) -> bool {
        let chars: Vec<char> = text.chars().collect();
        let mut found = false;
        self.scan(&chars, |_, _| {
            found = true;
            false
        });
        found
    }

    /// Returns every occurrence of every word, including overlapping ones.
    pub fn find_all(&self, text: &str) -> Vec<KeywordMatch> {
        let chars: Vec<char> = text.chars().collect();
        let mut matches = Vec::new();
        self.scan(&chars, |start, end| {
            matches.push(KeywordMatch {
                word: chars[start..end].iter().collect(),
                start,
                end,
            });
            true
        });
        matches
    }

    /// Replaces every character covered by a match with `replacement`.
    pub fn filter(&self, text: &str, replacement: char) -> String {
        let chars: Vec<char> = text.chars().collect();
        let mut masked = chars.clone();
        self.scan(&chars, |start, end| {
            masked[start..end].fill(replacement);
            true
        });
        masked.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains() {
        let trie = KeywordTrie::build(["bad", "worse"]);
        assert!(trie.contains("this is bad"));
        assert!(trie.contains("worse"));
        assert!(!trie.contains("ba d"));
        assert!(!trie.contains(""));
    }

    #[test]
    fn test_find_all_reports_positions() {
        let trie = KeywordTrie::build(["ab", "abc", "bc"]);
        let found = trie.find_all("xabc");

        assert_eq!(
            found,
            vec![
                KeywordMatch { word: "ab".into(), start: 1, end: 3 },
                KeywordMatch { word: "abc".into(), start: 1, end: 4 },
                KeywordMatch { word: "bc".into(), start: 2, end: 4 },
            ]
        );
    }

    #[test]
    fn test_filter_masks_overlapping_spans() {
        let trie = KeywordTrie::build(["ab", "bcd"]);
        assert_eq!(trie.filter("xabcdx", '*'), "x****x");
        assert_eq!(trie.filter("nothing", '*'), "nothing");
    }

    #[test]
    fn test_filter_is_per_code_point() {
        let trie = KeywordTrie::build(["坏话"]);
        assert_eq!(trie.filter("不要说坏话哦", '*'), "不要说**哦");
    }

    #[test]
    fn test_empty_words_ignored() {
        let trie = KeywordTrie::build([""]);
        assert!(trie.is_empty());
        assert!(!trie.contains("abc"));
        assert!(trie.find_all("abc").is_empty());
    }
}
