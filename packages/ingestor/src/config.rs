//! Configuration
//!
//! Command-line flags with environment fallbacks, read once at startup.
//! Environment names match the variables the monitor has always used
//! (`BLOXROUTE_AUTH_HEADER`, `SEND_TEXTS`, `TWILIO_*`, `MY_NUM`).

use clap::builder::BoolishValueParser;
use clap::{ArgAction, Parser};
use std::time::Duration;
use thiserror::Error;

use crate::lexicon::DEFAULT_DICTIONARY_PATH;
use crate::stream::{FeedConfig, DEFAULT_STREAM_URI};
use crate::supervisor::{SupervisorConfig, DEFAULT_RECONNECT_DELAY_MS};
use crate::twilio::TwilioCredentials;

/// Errors that make a configuration unusable
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing stream auth header (set BLOXROUTE_AUTH_HEADER or --auth-header)")]
    MissingAuthHeader,

    #[error("Stream URI must use ws:// or wss://, got: {0}")]
    InvalidStreamUri(String),

    #[error("Text alerts enabled but {0} is not set")]
    MissingPagingCredential(&'static str),
}

/// Mempool text monitor
#[derive(Parser, Debug, Clone)]
#[command(name = "txnprose", version, about = "Watch the mempool for transactions carrying readable text")]
pub struct Config {
    /// Websocket endpoint of the transaction stream
    #[arg(long, env = "BLOXROUTE_WSS_URI", default_value = DEFAULT_STREAM_URI)]
    pub stream_uri: String,

    /// Authorization header value for the stream
    #[arg(long, env = "BLOXROUTE_AUTH_HEADER", hide_env_values = true)]
    pub auth_header: Option<String>,

    /// Word list used to recognize natural-language tokens
    #[arg(long, env = "DICTIONARY_PATH", default_value = DEFAULT_DICTIONARY_PATH)]
    pub dictionary: String,

    /// Delay before reconnecting after any stream failure
    #[arg(long, env = "RECONNECT_DELAY_MS", default_value_t = DEFAULT_RECONNECT_DELAY_MS)]
    pub reconnect_delay_ms: u64,

    /// Reconnect if the stream is silent for this long
    #[arg(long, env = "IDLE_TIMEOUT_SECS")]
    pub idle_timeout_secs: Option<u64>,

    /// Additional spam marker tokens (case-sensitive)
    #[arg(long = "spam-marker", env = "EXTRA_SPAM_MARKERS", value_delimiter = ',')]
    pub spam_markers: Vec<String>,

    /// Send each alert as an SMS through Twilio
    #[arg(
        long,
        env = "SEND_TEXTS",
        default_value_t = false,
        action = ArgAction::Set,
        value_parser = BoolishValueParser::new()
    )]
    pub send_texts: bool,

    #[arg(long, env = "TWILIO_ACCOUNT_SID")]
    pub twilio_account_sid: Option<String>,

    #[arg(long, env = "TWILIO_AUTH_TOKEN", hide_env_values = true)]
    pub twilio_auth_token: Option<String>,

    /// Twilio sender number
    #[arg(long, env = "TWILIO_NUM")]
    pub twilio_from: Option<String>,

    /// Number that receives alert texts
    #[arg(long, env = "MY_NUM")]
    pub twilio_to: Option<String>,
}

impl Config {
    /// Check the cross-field rules clap cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.stream_uri.starts_with("ws://") || self.stream_uri.starts_with("wss://")) {
            return Err(ConfigError::InvalidStreamUri(self.stream_uri.clone()));
        }
        if self.auth_header.as_deref().map_or(true, |h| h.trim().is_empty()) {
            return Err(ConfigError::MissingAuthHeader);
        }
        self.twilio_credentials()?;
        Ok(())
    }

    /// Twilio credentials, if text alerts are enabled
    pub fn twilio_credentials(&self) -> Result<Option<TwilioCredentials>, ConfigError> {
        if !self.send_texts {
            return Ok(None);
        }

        Ok(Some(TwilioCredentials {
            account_sid: required(&self.twilio_account_sid, "TWILIO_ACCOUNT_SID")?,
            auth_token: required(&self.twilio_auth_token, "TWILIO_AUTH_TOKEN")?,
            from_number: required(&self.twilio_from, "TWILIO_NUM")?,
            to_number: required(&self.twilio_to, "MY_NUM")?,
        }))
    }

    pub fn feed_config(&self) -> FeedConfig {
        FeedConfig {
            uri: self.stream_uri.clone(),
            auth_header: self.auth_header.clone(),
            idle_timeout: self.idle_timeout_secs.map(Duration::from_secs),
        }
    }

    pub fn supervisor_config(&self) -> SupervisorConfig {
        SupervisorConfig {
            reconnect_delay_ms: self.reconnect_delay_ms,
            ..Default::default()
        }
    }
}

fn required(value: &Option<String>, name: &'static str) -> Result<String, ConfigError> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(ConfigError::MissingPagingCredential(name)),
    }
}
