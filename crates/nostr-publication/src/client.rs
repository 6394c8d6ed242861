use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use nostr_sdk::prelude::*;
use tracing::{debug, info};

use crate::events::{EventDraft, NostrEvent};
use crate::Error;

/// Relay responses to a single publish call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishAck {
    pub event_id: String,
    pub accepted: Vec<String>,
    /// `(relay, reason)` for every relay that refused the event.
    pub rejected: Vec<(String, String)>,
}

/// A signing client bound to a fixed relay set.
#[async_trait]
pub trait EventClient: Send + Sync {
    /// Hex public key events are signed with.
    fn author(&self) -> String;
    async fn publish(&self, draft: &EventDraft) -> Result<PublishAck, Error>;
    async fn fetch(&self, event_id: &str) -> Result<Option<NostrEvent>, Error>;
}

/// Access to the relay network.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Liveness check against a single relay.
    async fn probe(&self, relay: &str, timeout: Duration) -> Result<(), Error>;
    async fn open(&self, relays: &[String]) -> Result<Arc<dyn EventClient>, Error>;
}

#[derive(Clone)]
pub struct NostrTransport {
    keys: Keys,
    timeout: Duration,
}

impl NostrTransport {
    pub fn new(keys: Keys, timeout: Duration) -> Self {
        Self { keys, timeout }
    }
}

#[async_trait]
impl Transport for NostrTransport {
    async fn probe(&self, relay: &str, timeout: Duration) -> Result<(), Error> {
        let probe_error = |reason: String| Error::Probe {
            relay: relay.to_string(),
            reason,
        };

        let client = Client::default();
        client.add_relay(relay).await?;
        let handle = client.relay(relay).await?;

        let result = async {
            handle
                .try_connect(timeout)
                .await
                .map_err(|err| probe_error(err.to_string()))?;
            // Minimal read-only query.
            tokio::time::timeout(timeout, client.fetch_events(Filter::new().limit(1), timeout))
                .await
                .map_err(|_| probe_error("query timed out".to_string()))?
                .map_err(|err| probe_error(err.to_string()))?;
            Ok(())
        }
        .await;

        client.shutdown().await;
        result
    }

    async fn open(&self, relays: &[String]) -> Result<Arc<dyn EventClient>, Error> {
        let client = Client::builder().signer(self.keys.clone()).build();
        for relay in relays {
            client.add_relay(relay).await?;
        }
        client.connect().await;
        debug!(relays = relays.len(), "Connected publishing client");

        Ok(Arc::new(NostrEventClient {
            client,
            author: self.keys.public_key().to_string(),
            timeout: self.timeout,
        }))
    }
}

#[derive(Clone)]
pub struct NostrEventClient {
    client: Client,
    author: String,
    timeout: Duration,
}

#[async_trait]
impl EventClient for NostrEventClient {
    fn author(&self) -> String {
        self.author.clone()
    }

    async fn publish(&self, draft: &EventDraft) -> Result<PublishAck, Error> {
        let builder = draft.to_builder()?;
        let output = tokio::time::timeout(self.timeout, self.client.send_event_builder(builder))
            .await
            .map_err(|_| Error::Timeout)??;

        let mut accepted: Vec<String> = output.success.iter().map(|url| url.to_string()).collect();
        accepted.sort();
        let mut rejected: Vec<(String, String)> = output
            .failed
            .iter()
            .map(|(url, reason)| (url.to_string(), reason.clone()))
            .collect();
        rejected.sort();

        let event_id = output.id().to_string();
        info!(
            event_id = %event_id,
            success = accepted.len(),
            failed = rejected.len(),
            "Sent nostr event"
        );

        Ok(PublishAck {
            event_id,
            accepted,
            rejected,
        })
    }

    async fn fetch(&self, event_id: &str) -> Result<Option<NostrEvent>, Error> {
        let id =
            EventId::parse(event_id).map_err(|_| Error::InvalidEventId(event_id.to_string()))?;
        let filter = Filter::new().id(id).limit(1);
        let events = tokio::time::timeout(self.timeout, self.client.fetch_events(filter, self.timeout))
            .await
            .map_err(|_| Error::Timeout)??;
        let first = events.iter().next().map(NostrEvent::from_event);
        Ok(first)
    }
}
