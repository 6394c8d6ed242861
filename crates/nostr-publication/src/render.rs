//! Unit → unsigned event.

use std::collections::HashMap;

use tracing::debug;

use crate::document::metadata::{
    KEY_AUTHORS, KEY_AUTO_UPDATE, KEY_CONTENT_KIND, KEY_CONTENT_LEVEL, KEY_DATE, KEY_EMAIL,
    KEY_FIRSTNAME, KEY_IMAGE, KEY_LANGUAGE, KEY_LASTNAME, KEY_MIDDLENAME, KEY_REMARK,
    KEY_SUMMARY, KEY_TAGS, KEY_TYPE, KEY_VERSION,
};
use crate::document::{MetaValue, Metadata};
use crate::events::{a_tag, d_tag, title_tag, EventDraft, NostrTag};
use crate::hierarchy::{Unit, UnitKind};

/// Metadata keys that map onto a fixed event tag name.
const TAG_NAMES: &[(&str, &str)] = &[
    (KEY_VERSION, "version"),
    (KEY_DATE, "published_on"),
    (KEY_SUMMARY, "summary"),
    (KEY_LANGUAGE, "language"),
    (KEY_IMAGE, "image"),
    (KEY_TYPE, "type"),
    (KEY_AUTO_UPDATE, "auto-update"),
];

/// Keys consumed elsewhere or folded into another tag.
const SKIPPED_KEYS: &[&str] = &[
    KEY_EMAIL,
    KEY_FIRSTNAME,
    KEY_MIDDLENAME,
    KEY_LASTNAME,
    KEY_REMARK,
    KEY_CONTENT_LEVEL,
    KEY_CONTENT_KIND,
];

/// Tag names the renderer owns; metadata may not add a second copy.
const RESERVED_TAGS: &[&str] = &["d", "title", "a", "e", "p", "m"];

#[derive(Debug, Clone)]
pub struct RenderContext<'a> {
    /// Hex public key of the signer; index pointers embed it.
    pub author: &'a str,
    pub relay_hint: &'a str,
    pub metadata: &'a Metadata,
    pub mime_type: &'a str,
    /// D-tag of the unit that carries document metadata.
    pub document_d_tag: &'a str,
}

/// Render `unit` using the event ids already known for its references.
/// Unknown references are rendered without an event id.
pub fn render_unit(
    unit: &Unit,
    ctx: &RenderContext<'_>,
    event_ids: &HashMap<String, String>,
) -> EventDraft {
    let mut tags = vec![d_tag(&unit.d_tag), title_tag(&unit.title)];

    match unit.kind {
        UnitKind::Content => {
            tags.push(NostrTag::single("m", ctx.mime_type));
        }
        UnitKind::Index => {
            for reference in &unit.references {
                tags.push(a_tag(
                    reference.event_kind,
                    ctx.author,
                    &reference.d_tag,
                    ctx.relay_hint,
                    event_ids.get(&reference.d_tag).map(String::as_str),
                ));
            }
        }
    }

    if unit.d_tag == ctx.document_d_tag {
        tags.extend(metadata_tags(ctx.metadata));
    }

    EventDraft::new(unit.event_kind, unit.content.clone(), tags)
}

fn metadata_tags(metadata: &Metadata) -> Vec<NostrTag> {
    let mut tags = Vec::new();
    for (key, value) in metadata.iter() {
        if SKIPPED_KEYS.contains(&key) {
            continue;
        }
        if key == KEY_AUTHORS {
            tags.extend(metadata.authors().into_iter().map(|a| NostrTag::single("author", a)));
        } else if key == KEY_TAGS {
            tags.extend(metadata.tags().into_iter().map(|t| NostrTag::single("t", t)));
        } else if let Some((_, name)) = TAG_NAMES.iter().find(|(k, _)| *k == key) {
            if let Some(value) = metadata.get(key) {
                tags.push(NostrTag::single(*name, value));
            }
        } else if RESERVED_TAGS.contains(&key) {
            debug!(key = %key, "Skipping metadata key that shadows a reserved tag");
        } else {
            let values = match value {
                MetaValue::Single(value) => vec![value.clone()],
                MetaValue::List(values) => values.clone(),
            };
            tags.push(NostrTag::new(key, values));
        }
    }
    tags
}
