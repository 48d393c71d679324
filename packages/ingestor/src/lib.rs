//! TxnProse Ingestor Library
//!
//! This crate watches a pending-transaction stream, decodes each transaction's
//! input payload, and raises an alert when the payload reads like natural
//! language rather than opaque calldata.

pub mod config;
pub mod context;
pub mod decoder;
pub mod filter;
pub mod lexicon;
pub mod notifier;
pub mod stream;
pub mod supervisor;
pub mod twilio;

// Re-export commonly used types
pub use context::MonitorContext;
pub use decoder::{decode_payload, DecodedPayload, SpamMarkers};
pub use filter::{build_alert, filter_words, should_alert};
pub use lexicon::Lexicon;
pub use notifier::{AlertMessage, Notifier, Pager, PagingSink};
pub use stream::{BloxrouteFeed, MempoolFeed, TransactionEvent};
pub use supervisor::{ConnectionState, Supervisor};
