//! In-memory relay network for tests and dry integration runs.
//!
//! `MockTransport` stands in for the relay pool: it answers probes, hands out
//! [`MockClient`]s and stores every accepted event so it can be fetched back.
//! Failure modes are configured up front:
//!
//! - `with_unreachable`: the relay fails probes and never accepts events
//! - `with_rejecting`: the relay is reachable but refuses every event
//! - `with_failing_unit`: publishing the unit with this d-tag always fails
//! - `with_flaky_unit`: the first `n` publishes of the unit fail
//! - `with_corrupt_fetch`: fetching the unit returns altered content

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;

use crate::client::{EventClient, PublishAck, Transport};
use crate::events::{EventDraft, NostrEvent};
use crate::Error;

/// Public key of the secp256k1 secret key `1`.
pub const MOCK_AUTHOR: &str = "79be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798";

#[derive(Debug, Clone, Default)]
struct Behaviour {
    unreachable: HashSet<String>,
    rejecting: BTreeMap<String, String>,
    failing_units: HashSet<String>,
    flaky_units: HashMap<String, usize>,
    corrupt_units: HashSet<String>,
}

#[derive(Debug, Default)]
struct Network {
    events: HashMap<String, NostrEvent>,
    published: Vec<EventDraft>,
    attempts: HashMap<String, usize>,
}

#[derive(Debug, Default)]
struct Counters {
    probes: AtomicUsize,
    opens: AtomicUsize,
    publishes: AtomicUsize,
    fetches: AtomicUsize,
}

#[derive(Debug, Clone)]
pub struct MockTransport {
    author: String,
    behaviour: Arc<Behaviour>,
    network: Arc<RwLock<Network>>,
    counters: Arc<Counters>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            author: MOCK_AUTHOR.to_string(),
            behaviour: Arc::new(Behaviour::default()),
            network: Arc::new(RwLock::new(Network::default())),
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    pub fn with_unreachable(mut self, relay: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.behaviour)
            .unreachable
            .insert(relay.into());
        self
    }

    pub fn with_rejecting(mut self, relay: impl Into<String>, reason: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.behaviour)
            .rejecting
            .insert(relay.into(), reason.into());
        self
    }

    pub fn with_failing_unit(mut self, d_tag: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.behaviour)
            .failing_units
            .insert(d_tag.into());
        self
    }

    pub fn with_flaky_unit(mut self, d_tag: impl Into<String>, failures: usize) -> Self {
        Arc::make_mut(&mut self.behaviour)
            .flaky_units
            .insert(d_tag.into(), failures);
        self
    }

    pub fn with_corrupt_fetch(mut self, d_tag: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.behaviour)
            .corrupt_units
            .insert(d_tag.into());
        self
    }

    pub fn author(&self) -> &str {
        &self.author
    }

    pub fn probe_count(&self) -> usize {
        self.counters.probes.load(Ordering::SeqCst)
    }

    pub fn open_count(&self) -> usize {
        self.counters.opens.load(Ordering::SeqCst)
    }

    pub fn publish_count(&self) -> usize {
        self.counters.publishes.load(Ordering::SeqCst)
    }

    pub fn fetch_count(&self) -> usize {
        self.counters.fetches.load(Ordering::SeqCst)
    }

    /// Total calls into the network, of any kind.
    pub fn call_count(&self) -> usize {
        self.probe_count() + self.open_count() + self.publish_count() + self.fetch_count()
    }

    /// Accepted drafts in publish order.
    pub async fn published(&self) -> Vec<EventDraft> {
        self.network.read().await.published.clone()
    }

    pub async fn event(&self, event_id: &str) -> Option<NostrEvent> {
        self.network.read().await.events.get(event_id).cloned()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn probe(&self, relay: &str, _timeout: Duration) -> Result<(), Error> {
        self.counters.probes.fetch_add(1, Ordering::SeqCst);
        if self.behaviour.unreachable.contains(relay) {
            return Err(Error::Probe {
                relay: relay.to_string(),
                reason: "connection refused".to_string(),
            });
        }
        Ok(())
    }

    async fn open(&self, relays: &[String]) -> Result<Arc<dyn EventClient>, Error> {
        self.counters.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MockClient {
            relays: relays.to_vec(),
            author: self.author.clone(),
            behaviour: self.behaviour.clone(),
            network: self.network.clone(),
            counters: self.counters.clone(),
        }))
    }
}

#[derive(Debug, Clone)]
pub struct MockClient {
    relays: Vec<String>,
    author: String,
    behaviour: Arc<Behaviour>,
    network: Arc<RwLock<Network>>,
    counters: Arc<Counters>,
}

#[async_trait]
impl EventClient for MockClient {
    fn author(&self) -> String {
        self.author.clone()
    }

    async fn publish(&self, draft: &EventDraft) -> Result<PublishAck, Error> {
        self.counters.publishes.fetch_add(1, Ordering::SeqCst);
        let d_tag = draft.d_tag().unwrap_or_default().to_string();

        let mut network = self.network.write().await;
        let attempt = {
            let attempts = network.attempts.entry(d_tag.clone()).or_default();
            *attempts += 1;
            *attempts
        };

        if self.behaviour.failing_units.contains(&d_tag) {
            return Err(Error::Publish(format!("relay refused {d_tag}")));
        }
        if let Some(&failures) = self.behaviour.flaky_units.get(&d_tag) {
            if attempt <= failures {
                return Err(Error::Publish(format!("transient failure for {d_tag}")));
            }
        }

        let mut accepted = Vec::new();
        let mut rejected = Vec::new();
        for relay in &self.relays {
            if self.behaviour.unreachable.contains(relay) {
                rejected.push((relay.clone(), "connection refused".to_string()));
            } else if let Some(reason) = self.behaviour.rejecting.get(relay) {
                rejected.push((relay.clone(), reason.clone()));
            } else {
                accepted.push(relay.clone());
            }
        }
        if accepted.is_empty() {
            return Err(Error::Publish("event not accepted by any relay".to_string()));
        }

        let event_id = mock_event_id(&self.author, draft)?;
        network.events.insert(
            event_id.clone(),
            NostrEvent {
                event_id: event_id.clone(),
                kind: draft.kind,
                pubkey: self.author.clone(),
                created_at: 0,
                content: draft.content.clone(),
                tags: draft.tags.clone(),
                raw_json: String::new(),
            },
        );
        network.published.push(draft.clone());

        Ok(PublishAck {
            event_id,
            accepted,
            rejected,
        })
    }

    async fn fetch(&self, event_id: &str) -> Result<Option<NostrEvent>, Error> {
        self.counters.fetches.fetch_add(1, Ordering::SeqCst);
        let network = self.network.read().await;
        let Some(mut event) = network.events.get(event_id).cloned() else {
            return Ok(None);
        };
        let d_tag = crate::events::tag_value(&event.tags, "d").unwrap_or_default();
        if self.behaviour.corrupt_units.contains(d_tag) {
            event.content.push_str(" [corrupted]");
        }
        Ok(Some(event))
    }
}

/// Deterministic id over the NIP-01 serialization minus `created_at`.
fn mock_event_id(author: &str, draft: &EventDraft) -> Result<String, Error> {
    let tags: Vec<Vec<&str>> = draft
        .tags
        .iter()
        .map(|tag| {
            std::iter::once(tag.name.as_str())
                .chain(tag.values.iter().map(String::as_str))
                .collect()
        })
        .collect();
    let serialized = serde_json::to_string(&(0, author, draft.kind, tags, &draft.content))?;
    Ok(hex::encode(Sha256::digest(serialized.as_bytes())))
}
