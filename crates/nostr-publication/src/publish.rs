use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::client::{EventClient, PublishAck};
use crate::events::EventDraft;
use crate::hierarchy::{Unit, UnitKind};
use crate::pipeline::PublicationPlan;
use crate::render::{render_unit, RenderContext};
use crate::retry::{with_retry, RetryPolicy};
use crate::validate::Validator;
use crate::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum UnitOutcome {
    Published {
        event_id: String,
        accepted: Vec<String>,
        rejected: Vec<(String, String)>,
        /// Validation problems; the unit still counts as published.
        warnings: Vec<String>,
    },
    Failed {
        reason: String,
    },
    /// A referenced unit has no event id, so this one was never sent.
    SkippedDependency {
        missing: Vec<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitResult {
    pub d_tag: String,
    pub title: String,
    pub kind: UnitKind,
    pub event_kind: u16,
    #[serde(flatten)]
    pub outcome: UnitOutcome,
}

impl UnitResult {
    fn new(unit: &Unit, outcome: UnitOutcome) -> Self {
        Self {
            d_tag: unit.d_tag.clone(),
            title: unit.title.clone(),
            kind: unit.kind,
            event_kind: unit.event_kind,
            outcome,
        }
    }

    pub fn is_published(&self) -> bool {
        matches!(self.outcome, UnitOutcome::Published { .. })
    }

    pub fn event_id(&self) -> Option<&str> {
        match &self.outcome {
            UnitOutcome::Published { event_id, .. } => Some(event_id),
            _ => None,
        }
    }

    /// One line per unit attempt, for terminal output.
    pub fn summary_line(&self) -> String {
        match &self.outcome {
            UnitOutcome::Published {
                event_id,
                accepted,
                warnings,
                ..
            } => {
                let mut line = format!(
                    "published {} [{}] {} ({} relays)",
                    self.d_tag,
                    self.event_kind,
                    event_id,
                    accepted.len()
                );
                if !warnings.is_empty() {
                    line.push_str(&format!(", {} warning(s)", warnings.len()));
                }
                line
            }
            UnitOutcome::Failed { reason } => format!("FAILED {}: {}", self.d_tag, reason),
            UnitOutcome::SkippedDependency { missing } => format!(
                "SKIPPED {}: dependency unresolved ({})",
                self.d_tag,
                missing.join(", ")
            ),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PublishSettings {
    pub min_acks: usize,
    pub validate: bool,
    pub validation_delay: Duration,
    /// Relay URL embedded in index pointers.
    pub relay_hint: String,
}

impl Default for PublishSettings {
    fn default() -> Self {
        Self {
            min_acks: 1,
            validate: true,
            validation_delay: Duration::from_secs(2),
            relay_hint: String::new(),
        }
    }
}

/// Publishes a plan's units one at a time in dependency order.
pub struct Orchestrator {
    client: Arc<dyn EventClient>,
    settings: PublishSettings,
    retry: RetryPolicy,
    validation_retry: RetryPolicy,
}

impl Orchestrator {
    pub fn new(client: Arc<dyn EventClient>, settings: PublishSettings) -> Self {
        Self {
            client,
            settings,
            retry: RetryPolicy::network(),
            validation_retry: RetryPolicy::validation(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_validation_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.validation_retry = retry;
        self
    }

    /// Walk the publish order. Per-unit failures are collected, not
    /// returned, so independent units still go out. Event ids are written
    /// back to the plan's units.
    pub async fn publish(&self, plan: &mut PublicationPlan) -> Vec<UnitResult> {
        let author = self.client.author();
        let validator = self.settings.validate.then(|| {
            Validator::new(self.client.clone(), self.settings.validation_delay)
                .with_retry_policy(self.validation_retry.clone())
        });

        let mut event_ids: HashMap<String, String> = HashMap::new();
        let mut results = Vec::with_capacity(plan.order.len());

        for index in plan.order.clone() {
            let unit = &plan.units[index];

            let missing: Vec<String> = unit
                .references
                .iter()
                .filter(|reference| !event_ids.contains_key(&reference.d_tag))
                .map(|reference| reference.d_tag.clone())
                .collect();
            if !missing.is_empty() {
                warn!(
                    d_tag = %unit.d_tag,
                    missing = %missing.join(","),
                    "Skipping unit with unresolved references"
                );
                results.push(UnitResult::new(
                    unit,
                    UnitOutcome::SkippedDependency { missing },
                ));
                continue;
            }

            let ctx = RenderContext {
                author: &author,
                relay_hint: &self.settings.relay_hint,
                metadata: &plan.metadata,
                mime_type: plan.dialect.mime_type(),
                document_d_tag: &plan.document_d_tag,
            };
            let draft = render_unit(unit, &ctx, &event_ids);

            let ack = match self.send(&draft).await {
                Ok(ack) => ack,
                Err(err) => {
                    error!(d_tag = %unit.d_tag, error = %err, "Failed to publish unit");
                    results.push(UnitResult::new(
                        unit,
                        UnitOutcome::Failed {
                            reason: err.to_string(),
                        },
                    ));
                    continue;
                }
            };

            for (relay, reason) in &ack.rejected {
                warn!(d_tag = %unit.d_tag, relay = %relay, reason = %reason, "Relay rejected event");
            }
            info!(
                d_tag = %unit.d_tag,
                event_id = %ack.event_id,
                accepted = ack.accepted.len(),
                "Published unit"
            );

            let mut warnings = Vec::new();
            if let Some(validator) = &validator {
                if let Err(err) = validator.validate(&draft, &ack.event_id).await {
                    warn!(d_tag = %unit.d_tag, event_id = %ack.event_id, error = %err, "Validation failed");
                    warnings.push(err.to_string());
                }
            }

            event_ids.insert(unit.d_tag.clone(), ack.event_id.clone());
            results.push(UnitResult::new(
                unit,
                UnitOutcome::Published {
                    event_id: ack.event_id.clone(),
                    accepted: ack.accepted,
                    rejected: ack.rejected,
                    warnings,
                },
            ));
            plan.units[index].network_id = Some(ack.event_id);
        }

        results
    }

    /// One publish with retries; falling short of `min_acks` is retried
    /// like any other transient failure.
    async fn send(&self, draft: &EventDraft) -> Result<PublishAck, Error> {
        let client = &self.client;
        let min_acks = self.settings.min_acks;
        with_retry(&self.retry, "publish", move || async move {
            let ack = client.publish(draft).await?;
            if ack.accepted.len() < min_acks {
                return Err(Error::Quorum {
                    required: min_acks,
                    actual: ack.accepted.len(),
                });
            }
            Ok(ack)
        })
        .await
    }
}
