use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use crate::error::ArbError;
use crate::security::envelope::KEY_LENGTH;
use crate::security::pow::{DEFAULT_DIFFICULTY, DEFAULT_MAX_ATTEMPTS, MAX_DIFFICULTY};

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub feed_url: String,
    /// Simulated venue when unset.
    pub venue_url: Option<String>,
    pub min_amount: Decimal,
    pub pow_difficulty: u32,
    pub pow_max_attempts: u64,
    /// Hex-encoded AES-256 key.
    pub encryption_key: String,
    pub environment: String,
    pub settlement_delay_secs: u64,
    /// Per-request timeout for venue submissions.
    pub venue_timeout_secs: u64,
    /// How long an in-flight sell may keep running after shutdown.
    pub sell_grace_secs: u64,
    pub max_in_flight: usize,
    pub journal_dir: PathBuf,
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<String>,
    pub log_format: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            feed_url: "ws://127.0.0.1:8546/mempool".to_string(),
            venue_url: None,
            min_amount: Decimal::TEN,
            pow_difficulty: DEFAULT_DIFFICULTY,
            pow_max_attempts: DEFAULT_MAX_ATTEMPTS,
            encryption_key: String::new(),
            environment: "development".to_string(),
            settlement_delay_secs: 10,
            venue_timeout_secs: 10,
            sell_grace_secs: 5,
            max_in_flight: 64,
            journal_dir: PathBuf::from("./logs"),
            telegram_bot_token: None,
            telegram_chat_id: None,
            log_format: "pretty".to_string(),
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("feed_url", &self.feed_url)
            .field("venue_url", &self.venue_url)
            .field("min_amount", &self.min_amount)
            .field("pow_difficulty", &self.pow_difficulty)
            .field("pow_max_attempts", &self.pow_max_attempts)
            .field("encryption_key", &"<redacted>")
            .field("environment", &self.environment)
            .field("settlement_delay_secs", &self.settlement_delay_secs)
            .field("venue_timeout_secs", &self.venue_timeout_secs)
            .field("sell_grace_secs", &self.sell_grace_secs)
            .field("max_in_flight", &self.max_in_flight)
            .field("journal_dir", &self.journal_dir)
            .field("telegram", &self.telegram_bot_token.is_some())
            .field("log_format", &self.log_format)
            .finish()
    }
}

/// Read-only settings shared by every execution context.
#[derive(Clone)]
pub struct ExecutionConfig {
    pub min_amount: Decimal,
    pub difficulty: u32,
    pub max_attempts: u64,
    pub encryption_key: [u8; KEY_LENGTH],
}

impl fmt::Debug for ExecutionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionConfig")
            .field("min_amount", &self.min_amount)
            .field("difficulty", &self.difficulty)
            .field("max_attempts", &self.max_attempts)
            .finish_non_exhaustive()
    }
}

impl Config {
    /// Applies overrides from a key lookup (the process environment in
    /// production). Unset keys leave the current value alone.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("MEMPOOL_URL") {
            self.feed_url = v;
        }
        if let Some(v) = lookup("VENUE_URL") {
            self.venue_url = Some(v).filter(|s| !s.is_empty());
        }
        if let Some(v) = parse_var(&lookup, "MIN_AMOUNT")? {
            self.min_amount = v;
        }
        if let Some(v) = parse_var(&lookup, "POW_DIFFICULTY")? {
            self.pow_difficulty = v;
        }
        if let Some(v) = parse_var(&lookup, "POW_MAX_ATTEMPTS")? {
            self.pow_max_attempts = v;
        }
        if let Some(v) = lookup("ENCRYPTION_KEY") {
            self.encryption_key = v;
        }
        if let Some(v) = lookup("ENVIRONMENT") {
            self.environment = v;
        }
        if let Some(v) = parse_var(&lookup, "SETTLEMENT_DELAY_SECS")? {
            self.settlement_delay_secs = v;
        }
        if let Some(v) = parse_var(&lookup, "VENUE_TIMEOUT_SECS")? {
            self.venue_timeout_secs = v;
        }
        if let Some(v) = parse_var(&lookup, "SELL_GRACE_SECS")? {
            self.sell_grace_secs = v;
        }
        if let Some(v) = parse_var(&lookup, "MAX_IN_FLIGHT")? {
            self.max_in_flight = v;
        }
        if let Some(v) = lookup("JOURNAL_DIR") {
            self.journal_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("TELEGRAM_BOT_TOKEN") {
            self.telegram_bot_token = Some(v);
        }
        if let Some(v) = lookup("TELEGRAM_CHAT_ID") {
            self.telegram_chat_id = Some(v);
        }
        if let Some(v) = lookup("LOG_FORMAT") {
            self.log_format = v;
        }
        Ok(())
    }

    pub fn validate(&self) -> std::result::Result<(), ArbError> {
        if self.feed_url.trim().is_empty() {
            return Err(ArbError::config_error("feed_url must not be empty"));
        }
        if self.min_amount.is_sign_negative() {
            return Err(ArbError::config_error("min_amount must not be negative"));
        }
        if self.pow_difficulty > MAX_DIFFICULTY {
            return Err(ArbError::InvalidDifficulty(self.pow_difficulty));
        }
        if self.pow_max_attempts == 0 {
            return Err(ArbError::config_error("pow_max_attempts must be positive"));
        }
        if self.max_in_flight == 0 {
            return Err(ArbError::config_error("max_in_flight must be positive"));
        }
        // A zero timeout would let a stalled venue hold shutdown forever.
        if self.venue_timeout_secs == 0 {
            return Err(ArbError::config_error("venue_timeout_secs must be positive"));
        }
        self.decode_key().map(|_| ())
    }

    pub fn execution_config(&self) -> std::result::Result<ExecutionConfig, ArbError> {
        self.validate()?;
        Ok(ExecutionConfig {
            min_amount: self.min_amount,
            difficulty: self.pow_difficulty,
            max_attempts: self.pow_max_attempts,
            encryption_key: self.decode_key()?,
        })
    }

    pub fn settlement_delay(&self) -> Duration {
        Duration::from_secs(self.settlement_delay_secs)
    }

    pub fn venue_timeout(&self) -> Duration {
        Duration::from_secs(self.venue_timeout_secs)
    }

    pub fn sell_grace(&self) -> Duration {
        Duration::from_secs(self.sell_grace_secs)
    }

    fn decode_key(&self) -> std::result::Result<[u8; KEY_LENGTH], ArbError> {
        if self.encryption_key.trim().is_empty() {
            return Err(ArbError::config_error("ENCRYPTION_KEY is not set"));
        }
        let bytes = hex::decode(self.encryption_key.trim())
            .map_err(|e| ArbError::config_error(format!("Invalid encryption key: {e}")))?;
        let actual = bytes.len();
        bytes.try_into().map_err(|_| ArbError::InvalidKeySize {
            expected: KEY_LENGTH,
            actual,
        })
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("Invalid value for {}: {}", key, e)),
        None => Ok(None),
    }
}

/// Defaults, then the optional TOML file, then environment variables.
/// Validation happens when the execution settings are derived.
pub async fn load_config(path: Option<&Path>) -> Result<Config> {
    let mut config = match path {
        Some(path) => {
            let raw = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            toml::from_str(&raw)
                .with_context(|| format!("Failed to parse config file {}", path.display()))?
        }
        None => Config::default(),
    };

    config.apply_overrides(|key| env::var(key).ok())?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn valid_key() -> String {
        "11".repeat(KEY_LENGTH)
    }

    #[test]
    fn env_overrides_defaults() {
        let mut config = Config::default();
        config
            .apply_overrides(lookup(&[
                ("MEMPOOL_URL", "wss://feed.example/ws"),
                ("MIN_AMOUNT", "12.5"),
                ("POW_DIFFICULTY", "3"),
                ("ENCRYPTION_KEY", valid_key().as_str()),
                ("VENUE_URL", ""),
            ]))
            .unwrap();

        assert_eq!(config.feed_url, "wss://feed.example/ws");
        assert_eq!(config.min_amount, dec!(12.5));
        assert_eq!(config.pow_difficulty, 3);
        assert!(config.venue_url.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn malformed_numbers_are_rejected() {
        let mut config = Config::default();
        let err = config
            .apply_overrides(lookup(&[("POW_DIFFICULTY", "four")]))
            .unwrap_err();
        assert!(err.to_string().contains("POW_DIFFICULTY"));
    }

    #[test]
    fn missing_or_short_key_is_fatal() {
        let mut config = Config::default();
        assert!(matches!(config.validate(), Err(ArbError::Config(_))));

        config.encryption_key = "abcd".to_string();
        assert!(matches!(
            config.validate(),
            Err(ArbError::InvalidKeySize { expected: 32, actual: 2 })
        ));
    }

    #[test]
    fn bounds_are_checked() {
        let mut config = Config {
            encryption_key: valid_key(),
            ..Config::default()
        };
        config.pow_difficulty = 65;
        assert!(matches!(config.validate(), Err(ArbError::InvalidDifficulty(65))));

        config.pow_difficulty = 4;
        config.max_in_flight = 0;
        assert!(config.validate().is_err());

        config.max_in_flight = 1;
        config.venue_timeout_secs = 0;
        assert!(config.validate().is_err());

        config.venue_timeout_secs = 10;
        config.min_amount = dec!(-1);
        assert!(config.validate().is_err());
    }

    #[test]
    fn execution_config_carries_decoded_key() {
        let config = Config {
            encryption_key: valid_key(),
            ..Config::default()
        };
        let exec = config.execution_config().unwrap();
        assert_eq!(exec.encryption_key, [0x11u8; KEY_LENGTH]);
        assert_eq!(exec.difficulty, DEFAULT_DIFFICULTY);
        assert!(!format!("{exec:?}").contains("11111111"));
    }

    #[test]
    fn parses_toml_file() {
        let config: Config = toml::from_str(
            r#"
            feed_url = "ws://node:8546"
            min_amount = "25"
            pow_difficulty = 2
            max_in_flight = 8
            "#,
        )
        .unwrap();
        assert_eq!(config.min_amount, dec!(25));
        assert_eq!(config.max_in_flight, 8);
        assert_eq!(config.settlement_delay_secs, 10);
        assert_eq!(config.venue_timeout(), Duration::from_secs(10));
        assert_eq!(config.sell_grace(), Duration::from_secs(5));
    }
}
