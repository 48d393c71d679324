//! Payload Decoder
//!
//! Turns a hex-encoded transaction input into candidate text tokens.
//! The cheap gates (length, printability, token count, spam markers) run here,
//! before any dictionary lookups, so opaque binary calldata is rejected fast.

use std::collections::HashSet;
use thiserror::Error;

/// Number of leading characters skipped before the hex body (the `0x` marker)
pub const PAYLOAD_PREFIX_LEN: usize = 2;

/// Minimum number of whitespace-separated tokens for a payload to be a candidate
pub const MIN_TOKENS: usize = 2;

/// Payload markers of known low-value repetitive transactions
pub const DEFAULT_SPAM_MARKERS: &[&str] = &["Mooncats", "Firebit", "ALBET.IO", "FLUF"];

/// Reasons a payload has no decodable body.
///
/// [`decode_payload`] maps every variant to an empty result; an undecodable
/// payload is simply not a candidate.
#[derive(Error, Debug, PartialEq)]
pub enum DecodeError {
    #[error("Payload has nothing after its 2-character prefix")]
    Empty,

    #[error("Payload prefix is not 2 single-byte characters")]
    InvalidPrefix,

    #[error("Invalid hex payload: {0}")]
    InvalidHex(#[from] hex::FromHexError),
}

/// Case-sensitive set of spam marker tokens
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpamMarkers {
    markers: HashSet<String>,
}

impl Default for SpamMarkers {
    fn default() -> Self {
        Self::new(DEFAULT_SPAM_MARKERS.iter().copied())
    }
}

impl SpamMarkers {
    pub fn new<I, S>(markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            markers: markers.into_iter().map(Into::into).collect(),
        }
    }

    /// Default markers plus any extra configured ones
    pub fn with_extra<I, S>(extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut markers = Self::default();
        markers.markers.extend(extra.into_iter().map(Into::into));
        markers
    }

    /// Exact, case-sensitive token match
    pub fn contains(&self, token: &str) -> bool {
        self.markers.contains(token)
    }

    /// True if any token is a spam marker
    pub fn matches_any<S: AsRef<str>>(&self, tokens: &[S]) -> bool {
        tokens.iter().any(|t| self.contains(t.as_ref()))
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }
}

/// Result of decoding one payload
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedPayload {
    /// Whitespace-separated tokens; empty when the payload is not a candidate
    pub tokens: Vec<String>,
    /// Full decoded text, kept for debug logging
    pub raw_text: String,
    /// Set when a spam marker suppressed the payload
    pub is_spam: bool,
}

impl DecodedPayload {
    /// Whether the payload survived every gate and should reach the word filter
    pub fn is_candidate(&self) -> bool {
        !self.is_spam && !self.tokens.is_empty()
    }

    fn rejected(raw_text: String) -> Self {
        Self {
            tokens: Vec::new(),
            raw_text,
            is_spam: false,
        }
    }
}

/// Decode a hex payload into candidate text tokens
///
/// # Arguments
/// * `payload_hex` - The transaction input as received, including its 2-character prefix
/// * `spam_markers` - Tokens that suppress the payload outright
///
/// # Returns
/// A `DecodedPayload`. Malformed hex and non-text payloads yield empty tokens.
pub fn decode_payload(payload_hex: &str, spam_markers: &SpamMarkers) -> DecodedPayload {
    let bytes = match payload_bytes(payload_hex) {
        Ok(bytes) => bytes,
        Err(_) => return DecodedPayload::default(),
    };
    let text = decode_utf8_dropping_invalid(&bytes);

    if !is_printable_ascii(&text) {
        return DecodedPayload::rejected(text);
    }

    let tokens: Vec<String> = text.split_whitespace().map(str::to_owned).collect();
    if tokens.len() < MIN_TOKENS {
        return DecodedPayload::rejected(text);
    }

    if spam_markers.matches_any(&tokens) {
        return DecodedPayload {
            tokens: Vec::new(),
            raw_text: text,
            is_spam: true,
        };
    }

    DecodedPayload {
        tokens,
        raw_text: text,
        is_spam: false,
    }
}

/// Decode bytes as UTF-8, dropping invalid sequences instead of replacing them
pub fn decode_utf8_dropping_invalid(bytes: &[u8]) -> String {
    bytes.utf8_chunks().map(|chunk| chunk.valid()).collect()
}

/// Strip the fixed prefix and hex-decode the rest of the payload
pub fn payload_bytes(payload_hex: &str) -> Result<Vec<u8>, DecodeError> {
    if payload_hex.len() <= PAYLOAD_PREFIX_LEN {
        return Err(DecodeError::Empty);
    }
    let body = payload_hex
        .get(PAYLOAD_PREFIX_LEN..)
        .ok_or(DecodeError::InvalidPrefix)?;
    Ok(hex::decode(body)?)
}

/// True if every character is a visible ASCII character or ASCII whitespace.
///
/// Vertical tab counts as whitespace here even though
/// `char::is_ascii_whitespace` leaves it out.
pub fn is_printable_ascii(text: &str) -> bool {
    text.chars()
        .all(|c| c.is_ascii_graphic() || c.is_ascii_whitespace() || c == '\x0b')
}
