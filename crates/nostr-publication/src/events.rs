use std::fmt;
use std::str::FromStr;

use nostr_sdk::prelude::*;
use serde::{Deserialize, Serialize};

use crate::Error;

pub const KIND_PUBLICATION_INDEX: u16 = 30040;
pub const KIND_PUBLICATION_CONTENT: u16 = 30041;
pub const KIND_LONG_FORM: u16 = 30023;
pub const KIND_WIKI: u16 = 30818;

/// Event kind used for content units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    LongForm,
    PublicationContent,
    Wiki,
}

impl ContentKind {
    pub fn event_kind(self) -> u16 {
        match self {
            ContentKind::LongForm => KIND_LONG_FORM,
            ContentKind::PublicationContent => KIND_PUBLICATION_CONTENT,
            ContentKind::Wiki => KIND_WIKI,
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentKind::LongForm => f.write_str("longform"),
            ContentKind::PublicationContent => f.write_str("publication"),
            ContentKind::Wiki => f.write_str("wiki"),
        }
    }
}

impl FromStr for ContentKind {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "30023" | "longform" | "long-form" | "long_form" | "article" => Ok(ContentKind::LongForm),
            "30041" | "publication" | "content" | "section" => Ok(ContentKind::PublicationContent),
            "30818" | "wiki" => Ok(ContentKind::Wiki),
            other => Err(Error::InvalidOptions(format!("unknown content kind: {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NostrTag {
    pub name: String,
    pub values: Vec<String>,
}

impl NostrTag {
    pub fn new(name: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    pub fn single(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(name, vec![value.into()])
    }

    pub fn to_sdk_tag(&self) -> Result<Tag, Error> {
        let mut parts = Vec::with_capacity(1 + self.values.len());
        parts.push(self.name.clone());
        parts.extend(self.values.clone());
        Ok(Tag::parse(parts)?)
    }

    pub fn from_sdk_tag(tag: &Tag) -> Self {
        let parts = tag.clone().to_vec();
        let name = parts.first().cloned().unwrap_or_default();
        let values = parts.into_iter().skip(1).collect();
        Self { name, values }
    }
}

/// An unsigned event: what the publisher hands to the signing client and
/// what the validator expects to read back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventDraft {
    pub kind: u16,
    pub content: String,
    pub tags: Vec<NostrTag>,
}

impl EventDraft {
    pub fn new(kind: u16, content: impl Into<String>, tags: Vec<NostrTag>) -> Self {
        Self {
            kind,
            content: content.into(),
            tags,
        }
    }

    pub fn d_tag(&self) -> Option<&str> {
        tag_value(&self.tags, "d")
    }

    pub fn to_builder(&self) -> Result<EventBuilder, Error> {
        let tags = self
            .tags
            .iter()
            .map(NostrTag::to_sdk_tag)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(EventBuilder::new(Kind::from(self.kind), self.content.clone()).tags(tags))
    }
}

/// A signed event as read back from a relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NostrEvent {
    pub event_id: String,
    pub kind: u16,
    pub pubkey: String,
    pub created_at: u64,
    pub content: String,
    pub tags: Vec<NostrTag>,
    pub raw_json: String,
}

impl NostrEvent {
    pub fn from_event(event: &Event) -> Self {
        let tags = event
            .tags
            .iter()
            .map(NostrTag::from_sdk_tag)
            .collect();

        Self {
            event_id: event.id.to_string(),
            kind: event.kind.as_u16(),
            pubkey: event.pubkey.to_string(),
            created_at: event.created_at.as_secs(),
            content: event.content.clone(),
            tags,
            raw_json: event.as_json(),
        }
    }
}

pub fn d_tag(id: &str) -> NostrTag {
    NostrTag::single("d", id)
}

pub fn title_tag(title: &str) -> NostrTag {
    NostrTag::single("title", title)
}

/// NKBIP-01 address pointer: `["a", "<kind>:<pubkey>:<d>", <relay>, <event id>]`.
pub fn a_tag(kind: u16, author: &str, d_tag: &str, relay_hint: &str, event_id: Option<&str>) -> NostrTag {
    let mut values = vec![format!("{kind}:{author}:{d_tag}"), relay_hint.to_string()];
    if let Some(event_id) = event_id {
        values.push(event_id.to_string());
    }
    NostrTag::new("a", values)
}

pub fn tag_value<'a>(tags: &'a [NostrTag], name: &str) -> Option<&'a str> {
    tags.iter()
        .find(|tag| tag.name == name)
        .and_then(|tag| tag.values.first().map(|s| s.as_str()))
}

pub fn tags_named<'a>(tags: &'a [NostrTag], name: &'a str) -> impl Iterator<Item = &'a NostrTag> + 'a {
    tags.iter().filter(move |tag| tag.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_kind_aliases() {
        for alias in ["30023", "longform", "Long-Form", "article"] {
            assert_eq!(alias.parse::<ContentKind>().unwrap(), ContentKind::LongForm);
        }
        for alias in ["30041", "publication", "content", "SECTION"] {
            assert_eq!(
                alias.parse::<ContentKind>().unwrap(),
                ContentKind::PublicationContent
            );
        }
        assert_eq!("wiki".parse::<ContentKind>().unwrap(), ContentKind::Wiki);
        assert!("30040".parse::<ContentKind>().is_err());
        assert_eq!(ContentKind::Wiki.event_kind(), KIND_WIKI);
    }

    #[test]
    fn test_tag_helpers() {
        let tags = vec![d_tag("doc-1"), title_tag("Doc"), d_tag("doc-2")];
        assert_eq!(tag_value(&tags, "d"), Some("doc-1"));
        assert_eq!(tag_value(&tags, "title"), Some("Doc"));
        assert_eq!(tags_named(&tags, "d").count(), 2);
    }

    #[test]
    fn test_a_tag_layout() {
        let tag = a_tag(30041, "abc", "doc-intro", "wss://relay.example", Some("ff"));
        assert_eq!(
            tag.values,
            vec!["30041:abc:doc-intro", "wss://relay.example", "ff"]
        );
        let tag = a_tag(30040, "abc", "doc", "", None);
        assert_eq!(tag.values.len(), 2);
    }

    #[test]
    fn test_tag_conversion() {
        let tag = NostrTag::new("d", vec!["doc-1".to_string()]);
        let sdk_tag = tag.to_sdk_tag().unwrap();
        let roundtrip = NostrTag::from_sdk_tag(&sdk_tag);
        assert_eq!(tag, roundtrip);
    }

    #[test]
    fn test_draft_exposes_d_tag() {
        let draft = EventDraft::new(KIND_PUBLICATION_CONTENT, "body", vec![d_tag("x")]);
        assert_eq!(draft.d_tag(), Some("x"));
        assert!(draft.to_builder().is_ok());
    }
}
