use std::env;
use std::time::Duration;

use nostr_sdk::prelude::*;

use crate::relay::{RelayCategories, DEFAULT_CATEGORY};
use crate::Error;

const ENV_SECRET_KEY: &str = "NOSTR_SECRET_KEY";
const ENV_MIN_ACKS: &str = "NOSTR_MIN_ACKS";
const ENV_TIMEOUT_SECS: &str = "NOSTR_TIMEOUT_SECS";
const ENV_VALIDATE: &str = "NOSTR_VALIDATE";
const ENV_RELAY_CATEGORY: &str = "NOSTR_RELAY_CATEGORY";
const ENV_RELAY_CATEGORIES_FILE: &str = "NOSTR_RELAY_CATEGORIES_FILE";

#[derive(Debug, Clone)]
pub struct PublisherConfig {
    /// Hex or bech32 secret key used to sign events.
    pub secret_key: Option<String>,
    /// Relays that must accept a unit before it counts as published.
    pub min_acks: usize,
    /// Per network call.
    pub timeout: Duration,
    pub probe_timeout: Duration,
    pub validate: bool,
    /// Wait between a publish and its validation read.
    pub validation_delay: Duration,
    /// Category used when a document names no relays.
    pub default_category: String,
    pub categories: RelayCategories,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            secret_key: None,
            min_acks: 1,
            timeout: Duration::from_secs(10),
            probe_timeout: Duration::from_secs(5),
            validate: true,
            validation_delay: Duration::from_secs(2),
            default_category: DEFAULT_CATEGORY.to_string(),
            categories: RelayCategories::default(),
        }
    }
}

impl PublisherConfig {
    /// Build a configuration from the environment.
    ///
    /// - `NOSTR_SECRET_KEY`: signing key (only required to publish)
    /// - `NOSTR_MIN_ACKS`: relay acceptance quorum, default 1
    /// - `NOSTR_TIMEOUT_SECS`: per-call timeout, default 10
    /// - `NOSTR_VALIDATE`: read events back after publishing, default true
    /// - `NOSTR_RELAY_CATEGORY`: fallback category, default `default`
    /// - `NOSTR_RELAY_CATEGORIES_FILE`: JSON object of extra categories
    pub fn from_env() -> Result<Self, Error> {
        let mut config = Self {
            secret_key: env::var(ENV_SECRET_KEY).ok().filter(|key| !key.is_empty()),
            ..Self::default()
        };

        if let Some(min_acks) = parse_env(ENV_MIN_ACKS)? {
            config.min_acks = min_acks;
        }
        if let Some(secs) = parse_env::<u64>(ENV_TIMEOUT_SECS)? {
            config.timeout = Duration::from_secs(secs);
        }
        if let Ok(value) = env::var(ENV_VALIDATE) {
            config.validate = parse_bool(&value).ok_or(Error::InvalidEnv {
                name: ENV_VALIDATE,
                value,
            })?;
        }
        if let Ok(category) = env::var(ENV_RELAY_CATEGORY) {
            config.default_category = category.to_ascii_lowercase();
        }
        if let Ok(path) = env::var(ENV_RELAY_CATEGORIES_FILE) {
            config.categories = RelayCategories::from_file(path)?;
        }

        Ok(config)
    }

    pub fn keys(&self) -> Result<Keys, Error> {
        let secret = self
            .secret_key
            .as_deref()
            .ok_or(Error::MissingEnv(ENV_SECRET_KEY))?;
        Ok(Keys::parse(secret)?)
    }
}

fn parse_env<T: std::str::FromStr>(name: &'static str) -> Result<Option<T>, Error> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| Error::InvalidEnv { name, value }),
        Err(_) => Ok(None),
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Env vars are process-global; keep every env scenario in one test.
    #[test]
    fn test_from_env_scenarios() {
        use std::sync::Mutex;
        static ENV_LOCK: Mutex<()> = Mutex::new(());
        let _guard = ENV_LOCK.lock().unwrap();

        fn clear_all_nostr_vars() {
            for name in [
                ENV_SECRET_KEY,
                ENV_MIN_ACKS,
                ENV_TIMEOUT_SECS,
                ENV_VALIDATE,
                ENV_RELAY_CATEGORY,
                ENV_RELAY_CATEGORIES_FILE,
            ] {
                std::env::remove_var(name);
            }
        }

        clear_all_nostr_vars();
        let config = PublisherConfig::from_env().unwrap();
        assert!(config.secret_key.is_none());
        assert_eq!(config.min_acks, 1);
        assert!(config.validate);
        assert_eq!(config.default_category, DEFAULT_CATEGORY);
        assert!(matches!(
            config.keys(),
            Err(Error::MissingEnv("NOSTR_SECRET_KEY"))
        ));

        clear_all_nostr_vars();
        std::env::set_var(ENV_MIN_ACKS, "2");
        std::env::set_var(ENV_TIMEOUT_SECS, "30");
        std::env::set_var(ENV_VALIDATE, "no");
        std::env::set_var(ENV_RELAY_CATEGORY, "Wiki");
        let config = PublisherConfig::from_env().unwrap();
        assert_eq!(config.min_acks, 2);
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert!(!config.validate);
        assert_eq!(config.default_category, "wiki");

        clear_all_nostr_vars();
        std::env::set_var(ENV_MIN_ACKS, "many");
        let err = PublisherConfig::from_env().unwrap_err();
        assert!(matches!(err, Error::InvalidEnv { name: "NOSTR_MIN_ACKS", .. }));

        clear_all_nostr_vars();
        std::env::set_var(
            ENV_SECRET_KEY,
            "0000000000000000000000000000000000000000000000000000000000000001",
        );
        let config = PublisherConfig::from_env().unwrap();
        let keys = config.keys().unwrap();
        assert_eq!(keys.public_key().to_string(), crate::mock::MOCK_AUTHOR);

        clear_all_nostr_vars();
    }
}
