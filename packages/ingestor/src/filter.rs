//! Word Filter
//!
//! Scores decoded payload tokens against the lexicon and assembles the
//! human-readable alert body.

use crate::decoder::DecodedPayload;
use crate::lexicon::Lexicon;
use crate::notifier::AlertMessage;
use crate::stream::TransactionEvent;

/// Tokens this short are never counted as words
pub const MIN_WORD_LEN: usize = 1;

/// An alert fires only when the assembled body is longer than this.
///
/// One short recognized word ("hi ") stays below it; two words or one longer
/// word clear it.
pub const MIN_ALERT_BODY_LEN: usize = 3;

/// Shown in place of the recipient for contract creation transactions
pub const CONTRACT_CREATION_LABEL: &str = "(contract creation)";

/// Collect the tokens the lexicon recognizes, in order
///
/// # Arguments
/// * `tokens` - Decoded payload tokens
/// * `lexicon` - Known words
///
/// # Returns
/// Every recognized token followed by a single space, e.g. `"the quick fox "`
pub fn filter_words<S: AsRef<str>>(tokens: &[S], lexicon: &Lexicon) -> String {
    let mut body = String::new();
    for token in tokens {
        let token = token.as_ref();
        if token.len() > MIN_WORD_LEN && lexicon.contains(token) {
            body.push_str(token);
            body.push(' ');
        }
    }
    body
}

/// Whether an assembled body carries enough recognized text to alert on
pub fn should_alert(body: &str) -> bool {
    body.len() > MIN_ALERT_BODY_LEN
}

/// Format the `sender -> recipient` header line
pub fn format_header(sender: &str, recipient: Option<&str>) -> String {
    format!(
        "{} -> {}",
        sender,
        recipient.unwrap_or(CONTRACT_CREATION_LABEL)
    )
}

/// Build an alert for a decoded payload, if it qualifies
///
/// # Returns
/// `Some(AlertMessage)` when the payload is a candidate and its recognized
/// words clear [`MIN_ALERT_BODY_LEN`], `None` otherwise
pub fn build_alert(
    event: &TransactionEvent,
    decoded: &DecodedPayload,
    lexicon: &Lexicon,
) -> Option<AlertMessage> {
    if !decoded.is_candidate() {
        return None;
    }

    let body = filter_words(&decoded.tokens, lexicon);
    if !should_alert(&body) {
        return None;
    }

    Some(AlertMessage {
        header: format_header(&event.sender, event.recipient.as_deref()),
        body,
        debug_text: decoded.raw_text.clone(),
    })
}
