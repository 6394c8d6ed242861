//! Relay target resolution and liveness filtering.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use futures::future::join_all;
use nostr_sdk::RelayUrl;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::client::Transport;
use crate::retry::{with_retry, RetryPolicy};
use crate::Error;

pub const DEFAULT_CATEGORY: &str = "default";
/// Last resort when no configured relay answers.
pub const FALLBACK_RELAY: &str = "wss://thecitadel.nostr1.com";

/// Where a document should be published, decided once from its `relays`
/// metadata value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "value")]
pub enum RelayTarget {
    Explicit(Vec<String>),
    Category(String),
    Default,
}

impl RelayTarget {
    /// Comma-separated `ws://`/`wss://` addresses become [`RelayTarget::Explicit`];
    /// a bare word names a category; an empty value or `default` means the
    /// configured default category. Addresses are normalized and an address
    /// that does not parse is an error.
    pub fn parse(value: &str) -> Result<Self, Error> {
        let entries: Vec<&str> = value
            .split([',', ' '])
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .collect();

        if entries.is_empty() {
            return Ok(RelayTarget::Default);
        }

        let mut addresses: Vec<String> = Vec::new();
        for entry in entries.iter().filter(|entry| has_ws_scheme(entry)) {
            let url = normalize_relay_url(entry)?;
            if !addresses.contains(&url) {
                addresses.push(url);
            }
        }
        if !addresses.is_empty() {
            if entries.iter().any(|entry| !has_ws_scheme(entry)) {
                warn!(target_value = %value, "Ignoring non-address entries in relay list");
            }
            return Ok(RelayTarget::Explicit(addresses));
        }

        let name = entries[0].to_ascii_lowercase();
        if name == DEFAULT_CATEGORY {
            Ok(RelayTarget::Default)
        } else {
            Ok(RelayTarget::Category(name))
        }
    }
}

fn has_ws_scheme(value: &str) -> bool {
    let lower = value.to_ascii_lowercase();
    lower.starts_with("wss://") || lower.starts_with("ws://")
}

/// Validate `url` with nostr-sdk and return it with a lowercase scheme and
/// host and no trailing slash.
pub fn normalize_relay_url(url: &str) -> Result<String, Error> {
    let url = url.trim();
    let invalid = |reason: String| Error::InvalidRelayUrl {
        url: url.to_string(),
        reason,
    };

    if !has_ws_scheme(url) {
        return Err(invalid("must start with wss:// or ws://".to_string()));
    }
    let parsed = RelayUrl::parse(url).map_err(|err| invalid(err.to_string()))?;

    let mut normalized = parsed.to_string();
    while normalized.ends_with('/') {
        normalized.pop();
    }
    Ok(normalized)
}

/// Named relay groups. Loaded files are merged over the built-in set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RelayCategories(BTreeMap<String, Vec<String>>);

impl Default for RelayCategories {
    fn default() -> Self {
        let mut map = BTreeMap::new();
        map.insert(
            DEFAULT_CATEGORY.to_string(),
            vec![
                "wss://thecitadel.nostr1.com".to_string(),
                "wss://relay.damus.io".to_string(),
                "wss://nos.lol".to_string(),
            ],
        );
        map.insert(
            "alexandria".to_string(),
            vec![
                "wss://thecitadel.nostr1.com".to_string(),
                "wss://theforest.nostr1.com".to_string(),
            ],
        );
        map.insert(
            "wiki".to_string(),
            vec![
                "wss://thecitadel.nostr1.com".to_string(),
                "wss://relay.wikifreedia.xyz".to_string(),
            ],
        );
        Self(map)
    }
}

impl RelayCategories {
    pub fn empty() -> Self {
        Self(BTreeMap::new())
    }

    /// Parse a `{"category": ["wss://..."]}` object and merge it over the
    /// defaults.
    pub fn from_json_str(json: &str) -> Result<Self, Error> {
        let loaded: BTreeMap<String, Vec<String>> = serde_json::from_str(json)?;
        let mut categories = Self::default();
        for (name, relays) in loaded {
            categories.insert(&name, relays);
        }
        Ok(categories)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn insert(&mut self, name: &str, relays: Vec<String>) {
        self.0.insert(name.to_ascii_lowercase(), relays);
    }

    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.0.get(&name.to_ascii_lowercase()).map(Vec::as_slice)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

#[derive(Debug, Clone)]
pub struct RelaySelector {
    categories: RelayCategories,
    default_category: String,
    probe_timeout: Duration,
    retry: RetryPolicy,
    fallback: String,
}

impl RelaySelector {
    pub fn new(categories: RelayCategories, default_category: impl Into<String>) -> Self {
        Self {
            categories,
            default_category: default_category.into(),
            probe_timeout: Duration::from_secs(5),
            retry: RetryPolicy::network(),
            fallback: FALLBACK_RELAY.to_string(),
        }
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_fallback(mut self, relay: impl Into<String>) -> Self {
        self.fallback = relay.into();
        self
    }

    /// Candidate relays for `target`, normalized and deduplicated, before
    /// any liveness check.
    pub fn resolve(&self, target: &RelayTarget) -> Result<Vec<String>, Error> {
        let relays = match target {
            RelayTarget::Explicit(relays) => relays.clone(),
            RelayTarget::Category(name) => self
                .categories
                .get(name)
                .ok_or_else(|| Error::UnknownRelayCategory(name.clone()))?
                .to_vec(),
            RelayTarget::Default => self
                .categories
                .get(&self.default_category)
                .ok_or_else(|| Error::UnknownRelayCategory(self.default_category.clone()))?
                .to_vec(),
        };

        let mut unique: Vec<String> = Vec::with_capacity(relays.len());
        for relay in relays {
            let relay = normalize_relay_url(&relay)?;
            if !unique.contains(&relay) {
                unique.push(relay);
            }
        }
        Ok(unique)
    }

    /// Resolve `target` and keep the relays that answer a probe. Falls back
    /// to a single hardcoded relay when none do.
    pub async fn select(
        &self,
        target: &RelayTarget,
        transport: &dyn Transport,
    ) -> Result<Vec<String>, Error> {
        let candidates = self.resolve(target)?;

        let probes = candidates.iter().map(|relay| async move {
            let result = self.probe(relay, transport).await;
            (relay, result)
        });

        let mut reachable = Vec::new();
        for (relay, result) in join_all(probes).await {
            match result {
                Ok(()) => reachable.push(relay.clone()),
                Err(err) => warn!(relay = %relay, error = %err, "Relay probe failed"),
            }
        }

        if !reachable.is_empty() {
            info!(
                reachable = reachable.len(),
                candidates = candidates.len(),
                "Selected relays"
            );
            return Ok(reachable);
        }

        warn!(fallback = %self.fallback, "No candidate relay reachable, trying fallback");
        match self.probe(&self.fallback, transport).await {
            Ok(()) => Ok(vec![self.fallback.clone()]),
            Err(err) => {
                warn!(relay = %self.fallback, error = %err, "Fallback relay probe failed");
                Err(Error::NoReachableRelays)
            }
        }
    }

    async fn probe(&self, relay: &str, transport: &dyn Transport) -> Result<(), Error> {
        let timeout = self.probe_timeout;
        with_retry(&self.retry, "relay probe", move || transport.probe(relay, timeout)).await
    }
}
