//! Read-back check of published events.

use std::sync::Arc;
use std::time::Duration;

use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::client::EventClient;
use crate::events::{tag_value, tags_named, EventDraft, NostrEvent, NostrTag};
use crate::retry::{with_retry, RetryPolicy};
use crate::Error;

pub struct Validator {
    client: Arc<dyn EventClient>,
    grace: Duration,
    retry: RetryPolicy,
}

impl Validator {
    pub fn new(client: Arc<dyn EventClient>, grace: Duration) -> Self {
        Self {
            client,
            grace,
            retry: RetryPolicy::validation(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Wait out the grace period, fetch `event_id` and compare it with the
    /// draft it was published from. Any error is a warning for the caller;
    /// nothing here changes publish state.
    pub async fn validate(&self, expected: &EventDraft, event_id: &str) -> Result<(), Error> {
        if !self.grace.is_zero() {
            tokio::time::sleep(self.grace).await;
        }

        let client = &self.client;
        let event = with_retry(&self.retry, "validation fetch", move || async move {
            client
                .fetch(event_id)
                .await?
                .ok_or_else(|| Error::EventNotFound(event_id.to_string()))
        })
        .await?;

        compare_event(expected, &self.client.author(), &event)?;
        debug!(event_id = %event_id, "Validated published event");
        Ok(())
    }
}

/// Compare a fetched event against the draft it should match.
pub fn compare_event(expected: &EventDraft, author: &str, actual: &NostrEvent) -> Result<(), Error> {
    check("kind", expected.kind, actual.kind)?;
    check("author", author, actual.pubkey.as_str())?;

    if expected.content != actual.content {
        let expected_digest = digest(&expected.content);
        let actual_digest = digest(&actual.content);
        warn!(
            expected = %expected_digest,
            actual = %actual_digest,
            "Fetched content differs from published content"
        );
        return Err(Error::ValidationMismatch {
            field: "content".to_string(),
            expected: expected_digest,
            actual: actual_digest,
        });
    }

    check("tag count", expected.tags.len(), actual.tags.len())?;
    for name in ["d", "title"] {
        check(
            name,
            tag_value(&expected.tags, name).unwrap_or_default(),
            tag_value(&actual.tags, name).unwrap_or_default(),
        )?;
    }

    let expected_refs: Vec<&NostrTag> = tags_named(&expected.tags, "a").collect();
    let actual_refs: Vec<&NostrTag> = tags_named(&actual.tags, "a").collect();
    check("reference count", expected_refs.len(), actual_refs.len())?;
    for (position, (want, got)) in expected_refs.iter().zip(&actual_refs).enumerate() {
        check(&format!("reference {position}"), want.values.join(" "), got.values.join(" "))?;
    }

    Ok(())
}

fn check<T: PartialEq + ToString>(field: &str, expected: T, actual: T) -> Result<(), Error> {
    if expected == actual {
        return Ok(());
    }
    Err(Error::ValidationMismatch {
        field: field.to_string(),
        expected: expected.to_string(),
        actual: actual.to_string(),
    })
}

fn digest(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}
