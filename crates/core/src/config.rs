use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::SteamId;
use crate::trades::{RetryPolicy, TradesSettings};

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub bot: BotConfig,
    pub trading: TradingConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct BotConfig {
    pub steam_id: String,
    /// Needed to accept mobile confirmations. Without it offers stay
    /// pending until confirmed by hand.
    pub identity_secret: Option<SecretString>,
}

#[derive(Clone, Debug)]
pub struct TradingConfig {
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub confirmation_delay_ms: u64,
    pub offer_message: String,
    pub poll_interval_secs: u64,
}

#[derive(Clone, Debug)]
pub struct StorageConfig {
    pub poll_data_path: PathBuf,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub steam_id: Option<String>,
    pub log_level: Option<String>,
    pub poll_data_path: Option<PathBuf>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bot: BotConfig { steam_id: String::new(), identity_secret: None },
            trading: TradingConfig {
                max_attempts: 5,
                backoff_base_ms: 1_000,
                confirmation_delay_ms: 1_000,
                offer_message: String::new(),
                poll_interval_secs: 30,
            },
            storage: StorageConfig { poll_data_path: PathBuf::from("files/polldata.json") },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("tradebot.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    pub fn steam_id(&self) -> SteamId {
        SteamId::new(self.bot.steam_id.clone())
    }

    pub fn trades_settings(&self) -> TradesSettings {
        TradesSettings {
            retry: RetryPolicy {
                max_attempts: self.trading.max_attempts,
                base_delay_ms: self.trading.backoff_base_ms,
                ..RetryPolicy::default()
            },
            confirmation_delay: Duration::from_millis(self.trading.confirmation_delay_ms),
            confirmations_enabled: self.bot.identity_secret.is_some(),
        }
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(bot) = patch.bot {
            if let Some(steam_id) = bot.steam_id {
                self.bot.steam_id = steam_id;
            }
            if let Some(identity_secret_value) = bot.identity_secret {
                self.bot.identity_secret = Some(secret_value(identity_secret_value));
            }
        }

        if let Some(trading) = patch.trading {
            if let Some(max_attempts) = trading.max_attempts {
                self.trading.max_attempts = max_attempts;
            }
            if let Some(backoff_base_ms) = trading.backoff_base_ms {
                self.trading.backoff_base_ms = backoff_base_ms;
            }
            if let Some(confirmation_delay_ms) = trading.confirmation_delay_ms {
                self.trading.confirmation_delay_ms = confirmation_delay_ms;
            }
            if let Some(offer_message) = trading.offer_message {
                self.trading.offer_message = offer_message;
            }
            if let Some(poll_interval_secs) = trading.poll_interval_secs {
                self.trading.poll_interval_secs = poll_interval_secs;
            }
        }

        if let Some(storage) = patch.storage {
            if let Some(poll_data_path) = storage.poll_data_path {
                self.storage.poll_data_path = poll_data_path;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("TRADEBOT_BOT_STEAM_ID") {
            self.bot.steam_id = value;
        }
        if let Some(value) = read_env("TRADEBOT_BOT_IDENTITY_SECRET") {
            self.bot.identity_secret = Some(secret_value(value));
        }

        if let Some(value) = read_env("TRADEBOT_TRADING_MAX_ATTEMPTS") {
            self.trading.max_attempts = parse_u32("TRADEBOT_TRADING_MAX_ATTEMPTS", &value)?;
        }
        if let Some(value) = read_env("TRADEBOT_TRADING_BACKOFF_BASE_MS") {
            self.trading.backoff_base_ms = parse_u64("TRADEBOT_TRADING_BACKOFF_BASE_MS", &value)?;
        }
        if let Some(value) = read_env("TRADEBOT_TRADING_CONFIRMATION_DELAY_MS") {
            self.trading.confirmation_delay_ms =
                parse_u64("TRADEBOT_TRADING_CONFIRMATION_DELAY_MS", &value)?;
        }
        if let Some(value) = read_env("TRADEBOT_TRADING_OFFER_MESSAGE") {
            self.trading.offer_message = value;
        }
        if let Some(value) = read_env("TRADEBOT_TRADING_POLL_INTERVAL_SECS") {
            self.trading.poll_interval_secs =
                parse_u64("TRADEBOT_TRADING_POLL_INTERVAL_SECS", &value)?;
        }

        if let Some(value) = read_env("TRADEBOT_STORAGE_POLL_DATA_PATH") {
            self.storage.poll_data_path = PathBuf::from(value);
        }

        let log_level =
            read_env("TRADEBOT_LOGGING_LEVEL").or_else(|| read_env("TRADEBOT_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("TRADEBOT_LOGGING_FORMAT").or_else(|| read_env("TRADEBOT_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(steam_id) = overrides.steam_id {
            self.bot.steam_id = steam_id;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(poll_data_path) = overrides.poll_data_path {
            self.storage.poll_data_path = poll_data_path;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_bot(&self.bot)?;
        validate_trading(&self.trading)?;
        validate_storage(&self.storage)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("tradebot.toml"), PathBuf::from("config/tradebot.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_bot(bot: &BotConfig) -> Result<(), ConfigError> {
    let steam_id = bot.steam_id.trim();
    if steam_id.is_empty() {
        return Err(ConfigError::Validation(
            "bot.steam_id is required (set it in tradebot.toml or TRADEBOT_BOT_STEAM_ID)".to_string(),
        ));
    }
    if !SteamId::is_valid(steam_id) {
        return Err(ConfigError::Validation(format!(
            "bot.steam_id must be a 17 digit SteamID64 starting with 7656119, got `{steam_id}`"
        )));
    }
    Ok(())
}

fn validate_trading(trading: &TradingConfig) -> Result<(), ConfigError> {
    if trading.max_attempts == 0 || trading.max_attempts > 10 {
        return Err(ConfigError::Validation(
            "trading.max_attempts must be in range 1..=10".to_string(),
        ));
    }

    if trading.backoff_base_ms > 60_000 {
        return Err(ConfigError::Validation(
            "trading.backoff_base_ms must not exceed 60000".to_string(),
        ));
    }

    if trading.poll_interval_secs == 0 || trading.poll_interval_secs > 3_600 {
        return Err(ConfigError::Validation(
            "trading.poll_interval_secs must be in range 1..=3600".to_string(),
        ));
    }

    Ok(())
}

fn validate_storage(storage: &StorageConfig) -> Result<(), ConfigError> {
    if storage.poll_data_path.as_os_str().is_empty() {
        return Err(ConfigError::Validation("storage.poll_data_path must not be empty".to_string()));
    }
    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    bot: Option<BotPatch>,
    trading: Option<TradingPatch>,
    storage: Option<StoragePatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct BotPatch {
    steam_id: Option<String>,
    identity_secret: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct TradingPatch {
    max_attempts: Option<u32>,
    backoff_base_ms: Option<u64>,
    confirmation_delay_ms: Option<u64>,
    offer_message: Option<String>,
    poll_interval_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct StoragePatch {
    poll_data_path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
