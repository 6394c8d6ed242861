//! Turns a parsed section tree into publishable units.
//!
//! The content level `L` picks the header depth that becomes leaf content:
//!
//! ```text
//! L = 0 | 1   whole document  -> one content unit
//! L >= 2      section at L     -> content unit (with everything below it)
//!             section above L  -> index unit pointing at its children,
//!                                 or content unit when nothing below it
//!                                 was published
//!             document title   -> root index
//! ```
//!
//! At `L >= 2` a document whose sections and preamble are all empty has
//! nothing for the root index to point at and is rejected.

use std::collections::HashSet;

use serde::Serialize;
use tracing::debug;

use crate::document::{DTagGenerator, Document};
use crate::events::{ContentKind, KIND_PUBLICATION_INDEX};
use crate::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    Content,
    Index,
}

/// Pointer from an index unit to a child unit, resolved to an event id once
/// the child is published.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reference {
    pub event_kind: u16,
    pub d_tag: String,
    /// Position of the child in the publish order, set once the order is known.
    pub position: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Unit {
    pub kind: UnitKind,
    pub d_tag: String,
    pub title: String,
    /// Rendered body; empty for index units.
    pub content: String,
    pub references: Vec<Reference>,
    pub event_kind: u16,
    /// Event id assigned by the relays, set once after a successful publish.
    pub network_id: Option<String>,
}

impl Unit {
    pub fn content(d_tag: String, title: &str, content: String, event_kind: u16) -> Self {
        Self {
            kind: UnitKind::Content,
            d_tag,
            title: title.to_string(),
            content,
            references: Vec::new(),
            event_kind,
            network_id: None,
        }
    }

    pub fn index(d_tag: String, title: &str, references: Vec<Reference>) -> Self {
        Self {
            kind: UnitKind::Index,
            d_tag,
            title: title.to_string(),
            content: String::new(),
            references,
            event_kind: KIND_PUBLICATION_INDEX,
            network_id: None,
        }
    }

    pub fn is_index(&self) -> bool {
        self.kind == UnitKind::Index
    }

    pub fn reference(&self) -> Reference {
        Reference {
            event_kind: self.event_kind,
            d_tag: self.d_tag.clone(),
            position: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Hierarchy {
    pub content_units: Vec<Unit>,
    pub index_units: Vec<Unit>,
    /// D-tag of the root index; `None` for content levels 0 and 1.
    pub root: Option<String>,
}

impl Hierarchy {
    pub fn len(&self) -> usize {
        self.content_units.len() + self.index_units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Content units first, then index units.
    pub fn into_units(self) -> Vec<Unit> {
        let mut units = self.content_units;
        units.extend(self.index_units);
        units
    }
}

pub fn build_hierarchy(doc: &Document, level: u8, kind: ContentKind) -> Result<Hierarchy, Error> {
    let mut builder = Builder {
        doc,
        level,
        event_kind: kind.event_kind(),
        generator: DTagGenerator::new(&doc.title),
        claimed: HashSet::new(),
        entries: Vec::new(),
    };

    if level <= 1 {
        builder.flatten();
    } else {
        builder.split()?;
    }

    let root = (level > 1).then(|| {
        builder
            .entries
            .iter()
            .find(|entry| entry.order == ROOT_ORDER)
            .map(|entry| entry.unit.d_tag.clone())
            .unwrap_or_default()
    });

    builder.entries.sort_by_key(|entry| entry.order);
    let mut hierarchy = Hierarchy {
        root,
        ..Hierarchy::default()
    };
    for entry in builder.entries {
        match entry.unit.kind {
            UnitKind::Content => hierarchy.content_units.push(entry.unit),
            UnitKind::Index => hierarchy.index_units.push(entry.unit),
        }
    }

    debug!(
        level,
        content = hierarchy.content_units.len(),
        index = hierarchy.index_units.len(),
        "Built unit hierarchy"
    );
    Ok(hierarchy)
}

const ROOT_ORDER: usize = usize::MAX;

struct Entry {
    /// Document position: 0 for the preamble, section index + 1 otherwise.
    order: usize,
    unit: Unit,
}

struct Builder<'a> {
    doc: &'a Document,
    level: u8,
    event_kind: u16,
    generator: DTagGenerator,
    claimed: HashSet<String>,
    entries: Vec<Entry>,
}

impl Builder<'_> {
    fn flatten(&mut self) {
        let doc = self.doc;
        let mut parts = Vec::new();
        if !doc.preamble.is_empty() {
            parts.push(doc.preamble.clone());
        }
        for index in 0..doc.sections.len() {
            parts.push(self.section_block(index));
        }
        let d_tag = self.claim(self.generator.root(false));
        let unit = Unit::content(d_tag, &doc.title, parts.join("\n\n"), self.event_kind);
        self.entries.push(Entry { order: 0, unit });
    }

    fn split(&mut self) -> Result<(), Error> {
        let doc = self.doc;
        let count = doc.sections.len();
        let mut outcome: Vec<Option<Reference>> = vec![None; count];

        // Children always follow their parent in the arena, so walking it
        // backwards settles every subtree before its ancestors.
        for index in (0..count).rev() {
            let section = &doc.sections[index];
            let parent_level = section
                .parent
                .map_or(1, |parent| doc.sections[parent].level);

            if section.level >= self.level {
                if parent_level >= self.level {
                    continue;
                }
                let text = self.subtree_text(index);
                outcome[index] = self.push_content(index, &text, false);
                continue;
            }

            let child_refs: Vec<Reference> = section
                .children
                .iter()
                .filter_map(|child| outcome[*child].clone())
                .collect();

            if child_refs.is_empty() {
                let text = self.subtree_text(index);
                outcome[index] = self.push_content(index, &text, false);
                continue;
            }

            let mut references = Vec::with_capacity(child_refs.len() + 1);
            if let Some(intro) = self.push_content(index, &section.body, true) {
                references.push(intro);
            }
            references.extend(child_refs);

            let d_tag = self.claim(self.generator.generate(
                &section.title,
                &self.ancestor_slugs(index),
                false,
            ));
            let unit = Unit::index(d_tag, &section.title, references);
            outcome[index] = Some(unit.reference());
            self.entries.push(Entry {
                order: index + 1,
                unit,
            });
        }

        let mut references = Vec::new();
        if !doc.preamble.is_empty() {
            let d_tag = self.claim(self.generator.root(true));
            let unit = Unit::content(d_tag, &doc.title, doc.preamble.clone(), self.event_kind);
            references.push(unit.reference());
            self.entries.push(Entry { order: 0, unit });
        }
        references.extend(doc.top_level().filter_map(|index| outcome[index].clone()));
        if references.is_empty() {
            return Err(Error::EmptyPublication { level: self.level });
        }

        let d_tag = self.claim(self.generator.root(false));
        let root = Unit::index(d_tag, &doc.title, references);
        self.entries.push(Entry {
            order: ROOT_ORDER,
            unit: root,
        });
        Ok(())
    }

    /// Emit a content unit for `index` unless `text` is empty.
    fn push_content(&mut self, index: usize, text: &str, intro: bool) -> Option<Reference> {
        let doc = self.doc;
        let section = &doc.sections[index];
        if text.trim().is_empty() {
            debug!(section = %section.title, "Dropping empty section");
            return None;
        }
        let d_tag = self.claim(self.generator.generate(
            &section.title,
            &self.ancestor_slugs(index),
            intro,
        ));
        let unit = Unit::content(d_tag, &section.title, text.to_string(), self.event_kind);
        let reference = unit.reference();
        self.entries.push(Entry {
            order: index + 1,
            unit,
        });
        Some(reference)
    }

    /// Section body followed by every descendant re-headered at its own level.
    fn subtree_text(&self, index: usize) -> String {
        let mut parts = Vec::new();
        let body = &self.doc.sections[index].body;
        if !body.is_empty() {
            parts.push(body.clone());
        }
        for descendant in self.doc.descendants(index) {
            parts.push(self.section_block(descendant));
        }
        parts.join("\n\n")
    }

    fn section_block(&self, index: usize) -> String {
        let section = &self.doc.sections[index];
        let header = self.doc.dialect.render_header(section.level, &section.title);
        if section.body.is_empty() {
            header
        } else {
            format!("{header}\n\n{}", section.body)
        }
    }

    fn ancestor_slugs(&self, index: usize) -> Vec<String> {
        self.doc
            .ancestors(index)
            .into_iter()
            .map(|ancestor| self.doc.sections[ancestor].slug.clone())
            .collect()
    }

    fn claim(&mut self, d_tag: String) -> String {
        let mut candidate = d_tag.clone();
        let mut counter = 2;
        while self.claimed.contains(&candidate) {
            candidate = self.generator.with_counter(&d_tag, counter);
            counter += 1;
        }
        self.claimed.insert(candidate.clone());
        candidate
    }
}
