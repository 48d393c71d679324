//! Lexicon
//!
//! Immutable set of known natural-language words, loaded once at startup.
//! Lookups are case-insensitive.

use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

/// Word list shipped with most unix systems
pub const DEFAULT_DICTIONARY_PATH: &str = "/usr/share/dict/words";

/// Errors that can occur while loading the lexicon
#[derive(Error, Debug)]
pub enum LexiconError {
    #[error("Word list unreadable at {path}: {source}")]
    Unreadable {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Set of lowercase dictionary words
#[derive(Debug, Clone, Default)]
pub struct Lexicon {
    words: HashSet<String>,
}

impl Lexicon {
    /// Build a lexicon from a raw word list.
    ///
    /// Anything that is not a word character (alphanumeric or `_`) separates
    /// words, so entries like `don't` contribute `don` and `t`.
    pub fn from_text(text: &str) -> Self {
        let words = text
            .split(|c: char| !is_word_char(c))
            .filter(|w| !w.is_empty())
            .map(str::to_lowercase)
            .collect();
        Self { words }
    }

    /// Load the lexicon from a file on disk
    ///
    /// # Arguments
    /// * `path` - Path to the word list; a leading `~/` is expanded
    ///
    /// # Returns
    /// The loaded `Lexicon`, or `LexiconError::Unreadable` if the file is missing
    pub fn load(path: &str) -> Result<Self, LexiconError> {
        let expanded = expand_path(path);
        let text = std::fs::read_to_string(Path::new(&expanded)).map_err(|source| {
            LexiconError::Unreadable {
                path: expanded.clone(),
                source,
            }
        })?;
        Ok(Self::from_text(&text))
    }

    /// Case-insensitive membership check
    pub fn contains(&self, word: &str) -> bool {
        if word.chars().any(char::is_uppercase) {
            self.words.contains(&word.to_lowercase())
        } else {
            self.words.contains(word)
        }
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

impl<S: AsRef<str>> FromIterator<S> for Lexicon {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            words: iter.into_iter().map(|w| w.as_ref().to_lowercase()).collect(),
        }
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Expand ~ to home directory in path
pub fn expand_path(path: &str) -> String {
    if path.starts_with("~/") {
        if let Some(home) = dirs::home_dir() {
            return path.replacen('~', &home.to_string_lossy(), 1);
        }
    }
    path.to_string()
}
