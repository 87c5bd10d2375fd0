//! Normalized trigger words and the lexicon that holds them

use std::fmt;

use serde::{Deserialize, Serialize};

/// Phrases installed when no saved lexicon exists
pub const DEFAULT_TRIGGERS: [&str; 3] = ["help", "emergency", "sos"];

/// Errors from lexicon mutations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LexiconError {
    #[error("trigger word is empty")]
    Empty,
}

/// A trimmed, lowercased, non-empty trigger phrase
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TriggerWord(String);

impl TriggerWord {
    /// Normalize raw input into a trigger word
    pub fn parse(raw: &str) -> Result<Self, LexiconError> {
        let normalized = raw.trim().to_lowercase();
        if normalized.is_empty() {
            return Err(LexiconError::Empty);
        }
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for TriggerWord {
    type Error = LexiconError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TriggerWord> for String {
    fn from(word: TriggerWord) -> Self {
        word.0
    }
}

impl fmt::Display for TriggerWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Ordered set of trigger words
///
/// Order only affects display and which word is reported when several
/// match the same text; membership is what matters for escalation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TriggerLexicon {
    words: Vec<TriggerWord>,
}

impl TriggerLexicon {
    /// Create an empty lexicon
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a lexicon from raw words, skipping empties and duplicates
    pub fn from_words<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut lexicon = Self::new();
        for word in words {
            let _ = lexicon.add(word.as_ref());
        }
        lexicon
    }

    /// Normalize and insert a word
    ///
    /// Returns `Ok(false)` when the word was already present.
    pub fn add(&mut self, raw: &str) -> Result<bool, LexiconError> {
        let word = TriggerWord::parse(raw)?;
        if self.words.contains(&word) {
            return Ok(false);
        }
        self.words.push(word);
        Ok(true)
    }

    /// Remove a word after normalizing it; returns whether anything changed
    pub fn remove(&mut self, raw: &str) -> bool {
        let Ok(word) = TriggerWord::parse(raw) else {
            return false;
        };
        let before = self.words.len();
        self.words.retain(|w| *w != word);
        self.words.len() != before
    }

    /// Find the first stored word contained in `text`, ignoring case
    pub fn matches(&self, text: &str) -> Option<&TriggerWord> {
        let haystack = text.to_lowercase();
        self.words
            .iter()
            .find(|word| haystack.contains(word.as_str()))
    }

    pub fn words(&self) -> &[TriggerWord] {
        &self.words
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }
}
