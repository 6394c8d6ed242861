//! Publish AsciiDoc and Markdown documents as linked Nostr publication events.
//!
//! A document is parsed into a section tree, split into content and index
//! units at a configurable header depth, ordered so every referenced unit is
//! published before the index that points at it, and sent to a probed set of
//! relays with retries and optional read-back validation.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                       NOSTR-PUBLICATION                           │
//! │                                                                   │
//! │  document ──► hierarchy ──► dependency ──► publish (Orchestrator) │
//! │  (parse,       (content /    (publish       │  render            │
//! │   metadata,     index         order)        │  retry             │
//! │   d-tags)       units)                      │  validate          │
//! │                                             ▼                     │
//! │                          relay (RelaySelector) ──► Transport      │
//! │                                                     │             │
//! │                                          NostrTransport / Mock    │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Event Kinds
//!
//! | Kind | Constant | Purpose |
//! |------|----------|---------|
//! | 30040 | `KIND_PUBLICATION_INDEX` | Index unit, `a` tag per child |
//! | 30041 | `KIND_PUBLICATION_CONTENT` | Content unit (default) |
//! | 30023 | `KIND_LONG_FORM` | Long-form article (Markdown, or AsciiDoc by choice) |
//! | 30818 | `KIND_WIKI` | Wiki article |
//!
//! All kinds are parameterized replaceable events keyed by their `d` tag,
//! so re-publishing a document replaces its previous events.
//!
//! # Example
//!
//! ```rust,ignore
//! use nostr_publication::{publish_document, NostrTransport, PublishRequest, PublisherConfig};
//!
//! let config = PublisherConfig::from_env()?;
//! let transport = NostrTransport::new(config.keys()?, config.timeout);
//!
//! let mut request = PublishRequest::new("book.adoc");
//! request.content_level = Some(3);
//!
//! let report = publish_document(&request, &config, &transport).await?;
//! for result in &report.published_events {
//!     println!("{}", result.summary_line());
//! }
//! ```
//!
//! # Traits
//!
//! - [`Transport`] - Probe relays and open a signing client
//! - [`EventClient`] - Publish a draft, fetch an event by id

mod client;
mod config;
mod dependency;
pub mod document;
mod error;
mod events;
mod hierarchy;
pub mod mock;
mod pipeline;
mod publish;
mod relay;
mod render;
mod retry;
mod validate;

pub use nostr_sdk;

pub use client::{EventClient, NostrEventClient, NostrTransport, PublishAck, Transport};
pub use config::PublisherConfig;
pub use dependency::publish_order;
pub use document::{parse_document, Dialect, Document, Metadata, Section};
pub use error::Error;
pub use events::{
    a_tag, d_tag, tag_value, tags_named, title_tag, ContentKind, EventDraft, NostrEvent, NostrTag,
    KIND_LONG_FORM, KIND_PUBLICATION_CONTENT, KIND_PUBLICATION_INDEX, KIND_WIKI,
};
pub use hierarchy::{build_hierarchy, Hierarchy, Reference, Unit, UnitKind};
pub use pipeline::{
    check_overrides, plan_document, publish_document, publish_plan, resolve_content_options,
    PublicationPlan, PublishRequest, RunReport,
};
pub use publish::{Orchestrator, PublishSettings, UnitOutcome, UnitResult};
pub use relay::{
    normalize_relay_url, RelayCategories, RelaySelector, RelayTarget, DEFAULT_CATEGORY,
    FALLBACK_RELAY,
};
pub use render::{render_unit, RenderContext};
pub use retry::{with_retry, RetryPolicy};
pub use validate::{compare_event, Validator};

/// Crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
