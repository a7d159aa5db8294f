//! Free-text query syntax.
//!
//! ```text
//! covid "breaking news" -draft |vaccine |"public health" -"opinion piece"
//! ```
//!
//! Bare terms are required (AND), `|` marks an optional term of which at least
//! one must match (OR), `-` excludes (NOT). Double quotes group a phrase.

use std::fmt;

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct SearchQuery {
    and_words: Vec<String>,
    or_words: Vec<String>,
    not_words: Vec<String>,
    and_phrases: Vec<String>,
    or_phrases: Vec<String>,
    not_phrases: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TermClass {
    And,
    Or,
    Not,
}

impl SearchQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(text: &str) -> Self {
        let mut query = Self::default();
        let mut chars = text.chars().peekable();

        loop {
            while chars.next_if(|c| c.is_whitespace()).is_some() {}
            let Some(&first) = chars.peek() else { break };

            let class = match first {
                '-' => TermClass::Not,
                '|' => TermClass::Or,
                _ => TermClass::And,
            };
            if class != TermClass::And {
                chars.next();
            }

            if chars.next_if_eq(&'"').is_some() {
                let mut phrase = String::new();
                for c in chars.by_ref() {
                    if c == '"' {
                        break;
                    }
                    phrase.push(c);
                }
                let phrase = normalize_phrase(&phrase);
                if !phrase.is_empty() {
                    query.push_phrase(class, phrase);
                }
            } else {
                let mut word = String::new();
                while let Some(c) = chars.next_if(|c| !c.is_whitespace()) {
                    word.push(c);
                }
                if !word.is_empty() {
                    query.push_word(class, word);
                }
            }
        }

        query
    }

    /// Native syntax for this query. `parse(serialize(q)) == q` for every
    /// query whose words contain no whitespace or quotes (and do not start
    /// with `-` or `|`) and whose phrases are single-spaced without quotes.
    pub fn serialize(&self) -> String {
        let mut parts: Vec<String> = Vec::new();
        parts.extend(self.and_words.iter().cloned());
        parts.extend(self.and_phrases.iter().map(|p| format!("\"{}\"", p)));
        parts.extend(self.or_words.iter().map(|w| format!("|{}", w)));
        parts.extend(self.or_phrases.iter().map(|p| format!("|\"{}\"", p)));
        parts.extend(self.not_words.iter().map(|w| format!("-{}", w)));
        parts.extend(self.not_phrases.iter().map(|p| format!("-\"{}\"", p)));
        parts.join(" ")
    }

    fn push_word(&mut self, class: TermClass, word: String) {
        match class {
            TermClass::And => self.and_words.push(word),
            TermClass::Or => self.or_words.push(word),
            TermClass::Not => self.not_words.push(word),
        }
    }

    fn push_phrase(&mut self, class: TermClass, phrase: String) {
        match class {
            TermClass::And => self.and_phrases.push(phrase),
            TermClass::Or => self.or_phrases.push(phrase),
            TermClass::Not => self.not_phrases.push(phrase),
        }
    }

    pub fn and_word(mut self, word: impl Into<String>) -> Self {
        self.and_words.push(word.into());
        self
    }

    pub fn or_word(mut self, word: impl Into<String>) -> Self {
        self.or_words.push(word.into());
        self
    }

    pub fn not_word(mut self, word: impl Into<String>) -> Self {
        self.not_words.push(word.into());
        self
    }

    pub fn and_phrase(mut self, phrase: impl Into<String>) -> Self {
        self.and_phrases.push(phrase.into());
        self
    }

    pub fn or_phrase(mut self, phrase: impl Into<String>) -> Self {
        self.or_phrases.push(phrase.into());
        self
    }

    pub fn not_phrase(mut self, phrase: impl Into<String>) -> Self {
        self.not_phrases.push(phrase.into());
        self
    }

    pub fn and_words(&self) -> &[String] {
        &self.and_words
    }

    pub fn or_words(&self) -> &[String] {
        &self.or_words
    }

    pub fn not_words(&self) -> &[String] {
        &self.not_words
    }

    pub fn and_phrases(&self) -> &[String] {
        &self.and_phrases
    }

    pub fn or_phrases(&self) -> &[String] {
        &self.or_phrases
    }

    pub fn not_phrases(&self) -> &[String] {
        &self.not_phrases
    }

    pub fn is_empty(&self) -> bool {
        self.and_words.is_empty()
            && self.or_words.is_empty()
            && self.not_words.is_empty()
            && self.and_phrases.is_empty()
            && self.or_phrases.is_empty()
            && self.not_phrases.is_empty()
    }

    /// Relevance of `texts` for this query, or `None` when they do not match.
    ///
    /// Matching is case-insensitive over alphanumeric tokens. The score is the
    /// number of occurrences of the required and optional terms.
    pub fn score<'a>(&self, texts: impl IntoIterator<Item = &'a str>) -> Option<f64> {
        let tokens: Vec<String> = texts.into_iter().flat_map(tokenize).collect();

        let excluded = self
            .not_words
            .iter()
            .chain(&self.not_phrases)
            .any(|term| occurrences(&tokens, term) > 0);
        if excluded {
            return None;
        }

        let mut score = 0usize;
        for term in self.and_words.iter().chain(&self.and_phrases) {
            match occurrences(&tokens, term) {
                0 => return None,
                n => score += n,
            }
        }

        let mut any_optional = self.or_words.is_empty() && self.or_phrases.is_empty();
        for term in self.or_words.iter().chain(&self.or_phrases) {
            let n = occurrences(&tokens, term);
            if n > 0 {
                any_optional = true;
                score += n;
            }
        }

        any_optional.then_some(score as f64)
    }
}

impl fmt::Display for SearchQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.serialize())
    }
}

fn normalize_phrase(phrase: &str) -> String {
    phrase.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Occurrences of a word or phrase as a contiguous token run.
fn occurrences(tokens: &[String], term: &str) -> usize {
    let needle = tokenize(term);
    if needle.is_empty() || needle.len() > tokens.len() {
        return 0;
    }
    tokens
        .windows(needle.len())
        .filter(|window| *window == needle.as_slice())
        .count()
}
