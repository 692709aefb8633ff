use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use toml::Value;
use tradebot_core::config::{AppConfig, LoadOptions};

use super::CommandResult;

struct Sources {
    path: Option<PathBuf>,
    doc: Option<Value>,
}

impl Sources {
    fn detect(explicit: Option<&Path>) -> Self {
        let path = detect_config_path(explicit);
        let doc = path.as_deref().and_then(load_config_file_doc);
        Self { path, doc }
    }

    fn of(&self, key_path: &str, env_keys: &[&str]) -> String {
        if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
            return format!("env ({env_key})");
        }

        if let Some(doc) = &self.doc {
            if contains_path(doc, key_path) {
                let file_path = self
                    .path
                    .as_ref()
                    .map(|path| path.display().to_string())
                    .unwrap_or_else(|| "config file".to_string());
                return format!("file ({file_path})");
            }
        }

        "default".to_string()
    }
}

/// Effective configuration with the layer each value came from. Secrets
/// are only reported as set or unset.
pub fn run(options: LoadOptions) -> CommandResult {
    let sources = Sources::detect(options.config_path.as_deref());
    let config = match AppConfig::load(options) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure("check-config", "config_validation", error.to_string(), 2);
        }
    };

    let identity_secret = if config.bot.identity_secret.is_some() { "<redacted>" } else { "<unset>" };
    let offer_message =
        if config.trading.offer_message.is_empty() { "<empty>".to_string() } else { config.trading.offer_message.clone() };

    let rows = [
        ("bot.steam_id", config.bot.steam_id.clone(), vec!["TRADEBOT_BOT_STEAM_ID"]),
        ("bot.identity_secret", identity_secret.to_string(), vec!["TRADEBOT_BOT_IDENTITY_SECRET"]),
        (
            "trading.max_attempts",
            config.trading.max_attempts.to_string(),
            vec!["TRADEBOT_TRADING_MAX_ATTEMPTS"],
        ),
        (
            "trading.backoff_base_ms",
            config.trading.backoff_base_ms.to_string(),
            vec!["TRADEBOT_TRADING_BACKOFF_BASE_MS"],
        ),
        (
            "trading.confirmation_delay_ms",
            config.trading.confirmation_delay_ms.to_string(),
            vec!["TRADEBOT_TRADING_CONFIRMATION_DELAY_MS"],
        ),
        ("trading.offer_message", offer_message, vec!["TRADEBOT_TRADING_OFFER_MESSAGE"]),
        (
            "trading.poll_interval_secs",
            config.trading.poll_interval_secs.to_string(),
            vec!["TRADEBOT_TRADING_POLL_INTERVAL_SECS"],
        ),
        (
            "storage.poll_data_path",
            config.storage.poll_data_path.display().to_string(),
            vec!["TRADEBOT_STORAGE_POLL_DATA_PATH"],
        ),
        ("logging.level", config.logging.level.clone(), vec!["TRADEBOT_LOGGING_LEVEL", "TRADEBOT_LOG_LEVEL"]),
        (
            "logging.format",
            format!("{:?}", config.logging.format),
            vec!["TRADEBOT_LOGGING_FORMAT", "TRADEBOT_LOG_FORMAT"],
        ),
    ];

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for (key, value, env_keys) in rows {
        lines.push(render_line(key, &value, sources.of(key, &env_keys)));
    }

    CommandResult::text(lines.join("\n"))
}

fn detect_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return path.exists().then(|| path.to_path_buf());
    }

    [PathBuf::from("tradebot.toml"), PathBuf::from("config/tradebot.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: &Path) -> Option<Value> {
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}
