use std::{env, net::SocketAddr};

use dotenvy::dotenv;
use url::Url;

use crate::error::ConfigError;

const DEFAULT_DATABASE_URL: &str = "sqlite://qa_bot.db?mode=rwc";

#[derive(Debug, Clone, PartialEq)]
pub struct Webhook {
    pub url: Url,
    pub addr: SocketAddr,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bot_token: String,
    pub database_url: String,
    pub log_level: String,
    /// Long polling is used when absent.
    pub webhook: Option<Webhook>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bot_token = lookup("BOT_TOKEN")
            .filter(|token| !token.trim().is_empty())
            .ok_or(ConfigError::Missing("BOT_TOKEN"))?;

        let database_url = lookup("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());
        let log_level = lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string());

        let webhook = match (lookup("WEBHOOK_URL"), lookup("WEBHOOK_ADDR")) {
            (Some(url), Some(addr)) => Some(Webhook {
                url: url.parse().map_err(|e: url::ParseError| ConfigError::Invalid {
                    key: "WEBHOOK_URL",
                    reason: e.to_string(),
                })?,
                addr: addr
                    .parse()
                    .map_err(|e: std::net::AddrParseError| ConfigError::Invalid {
                        key: "WEBHOOK_ADDR",
                        reason: e.to_string(),
                    })?,
            }),
            (None, None) => None,
            (Some(_), None) => return Err(ConfigError::Missing("WEBHOOK_ADDR")),
            (None, Some(_)) => return Err(ConfigError::Missing("WEBHOOK_URL")),
        };

        Ok(Self {
            bot_token,
            database_url,
            log_level,
            webhook,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn token_is_required() {
        assert!(matches!(config(&[]), Err(ConfigError::Missing("BOT_TOKEN"))));
        assert!(matches!(
            config(&[("BOT_TOKEN", "  ")]),
            Err(ConfigError::Missing("BOT_TOKEN"))
        ));
    }

    #[test]
    fn defaults_to_polling_and_local_sqlite() {
        let config = config(&[("BOT_TOKEN", "123:abc")]).unwrap();
        assert_eq!(config.database_url, DEFAULT_DATABASE_URL);
        assert_eq!(config.log_level, "info");
        assert!(config.webhook.is_none());
    }

    #[test]
    fn webhook_needs_both_parts() {
        let parsed = config(&[
            ("BOT_TOKEN", "123:abc"),
            ("WEBHOOK_URL", "https://bot.example.com/hook"),
            ("WEBHOOK_ADDR", "0.0.0.0:8080"),
        ])
        .unwrap();
        assert_eq!(parsed.webhook.unwrap().addr.port(), 8080);

        assert!(matches!(
            config(&[("BOT_TOKEN", "t"), ("WEBHOOK_URL", "https://x.io")]),
            Err(ConfigError::Missing("WEBHOOK_ADDR"))
        ));
        assert!(matches!(
            config(&[
                ("BOT_TOKEN", "t"),
                ("WEBHOOK_URL", "https://x.io"),
                ("WEBHOOK_ADDR", "not an addr")
            ]),
            Err(ConfigError::Invalid { key: "WEBHOOK_ADDR", .. })
        ));
    }
}
