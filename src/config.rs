use crate::api::cryptocompare::rest::QUOTE_SYMBOLS;
use crate::error::NotifierError;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_QUOTE: &str = "USD";

#[derive(Debug, Clone)]
pub struct Config {
    pub bot_token: String,
    pub price_api_key: Option<String>,
    pub db_path: PathBuf,
    pub alert_interval: Duration,
    pub poll_timeout: Duration,
    pub default_quote: String,
}

impl Config {
    /// Reads the process environment (after `.env` has been loaded).
    pub fn from_env() -> Result<Self, NotifierError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, NotifierError> {
        let bot_token = lookup("TELEGRAM_BOT_TOKEN")
            .filter(|token| !token.trim().is_empty())
            .ok_or_else(|| NotifierError::ConfigError("TELEGRAM_BOT_TOKEN is not set".to_string()))?;

        let default_quote = lookup("DEFAULT_QUOTE")
            .map(|quote| quote.trim().to_uppercase())
            .filter(|quote| !quote.is_empty())
            .unwrap_or_else(|| DEFAULT_QUOTE.to_string());
        if !QUOTE_SYMBOLS.contains(&default_quote.as_str()) {
            return Err(NotifierError::ConfigError(format!(
                "DEFAULT_QUOTE {} is not one of {}",
                default_quote,
                QUOTE_SYMBOLS.join(", ")
            )));
        }

        Ok(Self {
            bot_token,
            price_api_key: lookup("CRYPTOCOMPARE_API_KEY").filter(|key| !key.is_empty()),
            db_path: lookup("NOTIFIER_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("db.json")),
            alert_interval: positive_secs(&lookup, "ALERT_INTERVAL_SECS", 30)?,
            poll_timeout: positive_secs(&lookup, "POLL_TIMEOUT_SECS", 9)?,
            default_quote,
        })
    }
}

/// A zero period would make the tick loop panic.
fn positive_secs(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: u64,
) -> Result<Duration, NotifierError> {
    match parse_or(lookup, key, default)? {
        0 => Err(NotifierError::ConfigError(format!("{} must be at least 1", key))),
        secs => Ok(Duration::from_secs(secs)),
    }
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, NotifierError> {
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| NotifierError::ConfigError(format!("{} has invalid value {:?}", key, raw))),
        None => Ok(default),
    }
}
