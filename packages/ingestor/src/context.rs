//! Monitor Context
//!
//! Read-only state built once at startup and shared by every decode.

use crate::decoder::SpamMarkers;
use crate::lexicon::{Lexicon, LexiconError};

/// Immutable lookup tables for the payload pipeline
#[derive(Debug, Clone, Default)]
pub struct MonitorContext {
    pub lexicon: Lexicon,
    pub spam_markers: SpamMarkers,
}

impl MonitorContext {
    pub fn new(lexicon: Lexicon, spam_markers: SpamMarkers) -> Self {
        Self {
            lexicon,
            spam_markers,
        }
    }

    /// Load the dictionary and combine the default spam markers with `extra_markers`
    pub fn load<I, S>(dictionary_path: &str, extra_markers: I) -> Result<Self, LexiconError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let lexicon = Lexicon::load(dictionary_path)?;
        Ok(Self::new(lexicon, SpamMarkers::with_extra(extra_markers)))
    }
}
