//! Header metadata extraction.
//!
//! Two notations are recognised in the block under the title:
//!
//! | Notation  | Example                     |
//! |-----------|-----------------------------|
//! | attribute | `:author: Jane Doe`         |
//! | bold      | `**Author:** Jane Doe`      |
//!
//! AsciiDoc documents may also carry a free-text author line and a revision
//! line directly after the title. Keys are folded onto a canonical
//! vocabulary; anything unrecognised is kept under its own name.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::Dialect;

pub const KEY_AUTHORS: &str = "authors";
pub const KEY_EMAIL: &str = "email";
pub const KEY_FIRSTNAME: &str = "firstname";
pub const KEY_MIDDLENAME: &str = "middlename";
pub const KEY_LASTNAME: &str = "lastname";
pub const KEY_VERSION: &str = "version";
pub const KEY_DATE: &str = "date";
pub const KEY_REMARK: &str = "remark";
pub const KEY_SUMMARY: &str = "summary";
pub const KEY_TAGS: &str = "tags";
pub const KEY_LANGUAGE: &str = "language";
pub const KEY_IMAGE: &str = "image";
pub const KEY_AUTO_UPDATE: &str = "auto_update";
pub const KEY_TYPE: &str = "type";
pub const KEY_CONTENT_LEVEL: &str = "content_level";
pub const KEY_CONTENT_KIND: &str = "content_kind";

const KEY_RELAYS: &str = "relays";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    Single(String),
    List(Vec<String>),
}

/// Normalized metadata in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata {
    entries: IndexMap<String, MetaValue>,
}

impl Metadata {
    pub fn get(&self, key: &str) -> Option<&str> {
        match self.entries.get(key)? {
            MetaValue::Single(value) => Some(value.as_str()),
            MetaValue::List(values) => values.first().map(String::as_str),
        }
    }

    pub fn list(&self, key: &str) -> Vec<&str> {
        match self.entries.get(key) {
            Some(MetaValue::Single(value)) => vec![value.as_str()],
            Some(MetaValue::List(values)) => values.iter().map(String::as_str).collect(),
            None => Vec::new(),
        }
    }

    pub fn authors(&self) -> Vec<&str> {
        self.list(KEY_AUTHORS)
    }

    pub fn tags(&self) -> Vec<&str> {
        self.list(KEY_TAGS)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &MetaValue)> {
        self.entries.iter().map(|(key, value)| (key.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), MetaValue::Single(value.into()));
    }

    fn set_if_absent(&mut self, key: &str, value: &str) {
        if !self.entries.contains_key(key) {
            self.set(key, value);
        }
    }

    /// Append values to a list-valued key, keeping first-seen order and
    /// dropping exact duplicates.
    pub fn push_list<I, S>(&mut self, key: &str, values: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| MetaValue::List(Vec::new()));
        if let MetaValue::Single(existing) = entry {
            let existing = std::mem::take(existing);
            *entry = MetaValue::List(vec![existing]);
        }
        if let MetaValue::List(list) = entry {
            for value in values {
                let value = value.into();
                if !list.contains(&value) {
                    list.push(value);
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedMetadata {
    pub metadata: Metadata,
    /// Raw relay target: the `relays` key, or the fallback when absent.
    pub relays: String,
}

/// True for lines written in one of the two key notations.
pub fn is_key_line(line: &str) -> bool {
    parse_key_line(line).is_some()
}

/// Interpret the raw metadata block. Extraction is best-effort and never
/// fails; malformed lines are skipped.
pub fn extract_metadata(lines: &[String], dialect: Dialect, fallback_relays: &str) -> ExtractedMetadata {
    let mut metadata = Metadata::default();
    let mut relays: Vec<String> = Vec::new();
    let mut author_line_at: Option<usize> = None;

    for (index, line) in lines.iter().enumerate() {
        let line = line.trim();
        if let Some((key, value)) = parse_key_line(line) {
            apply_entry(&mut metadata, &mut relays, &key, value);
            continue;
        }

        if dialect != Dialect::AsciiDoc || looks_like_key_value(line) {
            debug!(line = %line, "Skipping unrecognised metadata line");
            continue;
        }

        if index == 0 {
            apply_author_line(&mut metadata, line);
            author_line_at = Some(index);
        } else if author_line_at == Some(index - 1) && apply_revision_line(&mut metadata, line) {
            continue;
        } else {
            debug!(line = %line, "Skipping free-text metadata line");
        }
    }

    if metadata.authors().is_empty() {
        let name = [KEY_FIRSTNAME, KEY_MIDDLENAME, KEY_LASTNAME]
            .iter()
            .filter_map(|key| metadata.get(key))
            .collect::<Vec<_>>()
            .join(" ");
        if !name.is_empty() {
            metadata.push_list(KEY_AUTHORS, [name]);
        }
    }

    let relays = if relays.is_empty() {
        fallback_relays.to_string()
    } else {
        relays.join(",")
    };

    ExtractedMetadata { metadata, relays }
}

fn apply_entry(metadata: &mut Metadata, relays: &mut Vec<String>, key: &str, value: &str) {
    match canonical_key(key) {
        Some(KEY_RELAYS) => relays.extend(split_list(value)),
        Some(KEY_AUTHORS) => {
            for author in split_list(value) {
                let (name, email) = split_email(&author);
                metadata.push_list(KEY_AUTHORS, [name]);
                if let Some(email) = email {
                    metadata.set_if_absent(KEY_EMAIL, &email);
                }
            }
        }
        Some(KEY_TAGS) => metadata.push_list(KEY_TAGS, split_list(value)),
        Some(KEY_VERSION) => metadata.set(KEY_VERSION, strip_version_prefix(value)),
        Some(canonical) => metadata.set(canonical, value),
        None => metadata.set(key, value),
    }
}

fn canonical_key(key: &str) -> Option<&'static str> {
    let normalized = key.trim().to_ascii_lowercase().replace(['-', ' '], "_");
    let canonical = match normalized.as_str() {
        "author" | "authors" => KEY_AUTHORS,
        "email" => KEY_EMAIL,
        "firstname" | "first_name" => KEY_FIRSTNAME,
        "middlename" | "middle_name" => KEY_MIDDLENAME,
        "lastname" | "last_name" => KEY_LASTNAME,
        "version" | "revnumber" | "revision" => KEY_VERSION,
        "revdate" | "date" | "published_on" => KEY_DATE,
        "revremark" | "remark" => KEY_REMARK,
        "summary" | "description" | "abstract" => KEY_SUMMARY,
        "keywords" | "tags" => KEY_TAGS,
        "lang" | "language" => KEY_LANGUAGE,
        "image" | "cover" => KEY_IMAGE,
        "relays" | "relay" => KEY_RELAYS,
        "auto_update" | "autoupdate" => KEY_AUTO_UPDATE,
        "type" | "doctype" => KEY_TYPE,
        "content_level" => KEY_CONTENT_LEVEL,
        "content_kind" => KEY_CONTENT_KIND,
        _ => return None,
    };
    Some(canonical)
}

fn parse_key_line(line: &str) -> Option<(String, &str)> {
    let line = line.trim();

    if let Some(rest) = line.strip_prefix(':') {
        let end = rest.find(':')?;
        let key = &rest[..end];
        let valid = !key.is_empty()
            && !key.ends_with('!')
            && key
                .chars()
                .all(|ch| ch.is_alphanumeric() || ch == '-' || ch == '_');
        if !valid {
            return None;
        }
        return Some((key.to_string(), rest[end + 1..].trim()));
    }

    if let Some(rest) = line.strip_prefix("**") {
        let end = rest.find("**")?;
        let inner = rest[..end].trim();
        let after = &rest[end + 2..];
        // Both `**Key:** value` and `**Key**: value`.
        let (key, value) = match inner.strip_suffix(':') {
            Some(key) => (key, after),
            None => (inner, after.strip_prefix(':')?),
        };
        let key = key.trim();
        if key.is_empty() {
            return None;
        }
        return Some((key.to_string(), value.trim()));
    }

    None
}

/// `Word: value` style lines, which must not be taken for author or
/// revision lines.
fn looks_like_key_value(line: &str) -> bool {
    if is_key_line(line) {
        return true;
    }
    let Some(pos) = line.find(':') else {
        return false;
    };
    let key = &line[..pos];
    let value_follows = line[pos + 1..].starts_with(' ') || line.len() == pos + 1;
    !key.is_empty()
        && value_follows
        && key
            .chars()
            .next()
            .is_some_and(|ch| ch.is_alphabetic())
        && key
            .chars()
            .all(|ch| ch.is_alphanumeric() || matches!(ch, '_' | '-' | ' '))
}

fn apply_author_line(metadata: &mut Metadata, line: &str) {
    for (position, author) in line
        .split(';')
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .enumerate()
    {
        let (name, email) = split_email(author);
        let tokens: Vec<&str> = name.split_whitespace().collect();
        let name = if tokens.len() >= 2 {
            let first = tokens[0];
            let last = tokens[tokens.len() - 1];
            let middle = tokens[1..tokens.len() - 1].join(" ");
            if position == 0 {
                metadata.set_if_absent(KEY_FIRSTNAME, first);
                metadata.set_if_absent(KEY_LASTNAME, last);
                if !middle.is_empty() {
                    metadata.set_if_absent(KEY_MIDDLENAME, &middle);
                }
            }
            [first, middle.as_str(), last]
                .iter()
                .filter(|part| !part.is_empty())
                .copied()
                .collect::<Vec<_>>()
                .join(" ")
        } else {
            name
        };

        if name.is_empty() {
            continue;
        }
        metadata.push_list(KEY_AUTHORS, [name]);
        if position == 0 {
            if let Some(email) = email {
                metadata.set_if_absent(KEY_EMAIL, &email);
            }
        }
    }
}

/// `version[, date[, remark]]`, also accepting `version, date: remark`.
fn apply_revision_line(metadata: &mut Metadata, line: &str) -> bool {
    let mut parts = line.splitn(3, ',').map(str::trim);
    let Some(version) = parts.next() else {
        return false;
    };
    let version = strip_version_prefix(version);
    if !version.starts_with(|ch: char| ch.is_ascii_digit()) {
        return false;
    }

    metadata.set(KEY_VERSION, version);
    let date = parts.next().filter(|date| !date.is_empty());
    let remark = parts.next().filter(|remark| !remark.is_empty());

    match (date, remark) {
        (Some(date), Some(remark)) => {
            metadata.set(KEY_DATE, date);
            metadata.set(KEY_REMARK, remark);
        }
        (Some(date), None) => match date.split_once(':') {
            Some((date, remark)) => {
                metadata.set(KEY_DATE, date.trim());
                if !remark.trim().is_empty() {
                    metadata.set(KEY_REMARK, remark.trim());
                }
            }
            None => metadata.set(KEY_DATE, date),
        },
        _ => {}
    }
    true
}

fn strip_version_prefix(value: &str) -> &str {
    let value = value.trim();
    match value.strip_prefix(['v', 'V']) {
        Some(rest) if rest.starts_with(|ch: char| ch.is_ascii_digit()) => rest,
        _ => value,
    }
}

fn split_email(author: &str) -> (String, Option<String>) {
    match (author.find('<'), author.rfind('>')) {
        (Some(open), Some(close)) if open < close => {
            let name = author[..open].trim().to_string();
            let email = author[open + 1..close].trim().to_string();
            (name, (!email.is_empty()).then_some(email))
        }
        _ => (author.trim().to_string(), None),
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(text: &str) -> Vec<String> {
        text.lines().map(String::from).collect()
    }

    #[test]
    fn test_attribute_and_bold_notations() {
        let block = lines(
            ":author: Ada Lovelace, Charles Babbage\n\
             **Summary:** Notes on the engine\n\
             :keywords: math, , engines\n\
             **Language**: en\n\
             :publisher: Analytical Press",
        );
        let extracted = extract_metadata(&block, Dialect::AsciiDoc, "default");
        let meta = extracted.metadata;
        assert_eq!(meta.authors(), vec!["Ada Lovelace", "Charles Babbage"]);
        assert_eq!(meta.get(KEY_SUMMARY), Some("Notes on the engine"));
        assert_eq!(meta.tags(), vec!["math", "engines"]);
        assert_eq!(meta.get(KEY_LANGUAGE), Some("en"));
        assert_eq!(meta.get("publisher"), Some("Analytical Press"));
        assert_eq!(extracted.relays, "default");
    }

    #[test]
    fn test_author_and_revision_lines() {
        let block = lines("Jane Quincy Doe <jane@example.com>\nv2.1, 2024-05-06: Second edition");
        let meta = extract_metadata(&block, Dialect::AsciiDoc, "default").metadata;
        assert_eq!(meta.authors(), vec!["Jane Quincy Doe"]);
        assert_eq!(meta.get(KEY_EMAIL), Some("jane@example.com"));
        assert_eq!(meta.get(KEY_FIRSTNAME), Some("Jane"));
        assert_eq!(meta.get(KEY_MIDDLENAME), Some("Quincy"));
        assert_eq!(meta.get(KEY_LASTNAME), Some("Doe"));
        assert_eq!(meta.get(KEY_VERSION), Some("2.1"));
        assert_eq!(meta.get(KEY_DATE), Some("2024-05-06"));
        assert_eq!(meta.get(KEY_REMARK), Some("Second edition"));
    }

    #[test]
    fn test_revision_line_with_comma_remark() {
        let block = lines("Solo\n1.0, 2020-01-01, first cut");
        let meta = extract_metadata(&block, Dialect::AsciiDoc, "default").metadata;
        assert_eq!(meta.authors(), vec!["Solo"]);
        assert_eq!(meta.get(KEY_VERSION), Some("1.0"));
        assert_eq!(meta.get(KEY_REMARK), Some("first cut"));
    }

    #[test]
    fn test_key_value_lines_are_not_author_lines() {
        let block = lines("Status: draft\nv1.0");
        let meta = extract_metadata(&block, Dialect::AsciiDoc, "default").metadata;
        assert!(meta.authors().is_empty());
        assert_eq!(meta.get(KEY_VERSION), None);
    }

    #[test]
    fn test_synonyms_collapse() {
        let block = lines(
            ":revnumber: v3\n:revdate: 2023-01-01\n:description: d\n:lang: fr\n:doctype: book\n:relay: wss://a.example, wss://b.example",
        );
        let extracted = extract_metadata(&block, Dialect::AsciiDoc, "default");
        let meta = extracted.metadata;
        assert_eq!(meta.get(KEY_VERSION), Some("3"));
        assert_eq!(meta.get(KEY_DATE), Some("2023-01-01"));
        assert_eq!(meta.get(KEY_SUMMARY), Some("d"));
        assert_eq!(meta.get(KEY_LANGUAGE), Some("fr"));
        assert_eq!(meta.get(KEY_TYPE), Some("book"));
        assert!(!meta.contains("relays"));
        assert_eq!(extracted.relays, "wss://a.example,wss://b.example");
    }

    #[test]
    fn test_name_parts_compose_author() {
        let block = lines(":firstname: Grace\n:lastname: Hopper");
        let meta = extract_metadata(&block, Dialect::AsciiDoc, "default").metadata;
        assert_eq!(meta.authors(), vec!["Grace Hopper"]);
    }

    #[test]
    fn test_markdown_ignores_free_text() {
        let block = lines("Jane Doe\n**Tags:** a, b");
        let meta = extract_metadata(&block, Dialect::Markdown, "default").metadata;
        assert!(meta.authors().is_empty());
        assert_eq!(meta.tags(), vec!["a", "b"]);
    }

    #[test]
    fn test_is_key_line() {
        assert!(is_key_line(":toc: left"));
        assert!(is_key_line("**Author:** Someone"));
        assert!(is_key_line("**Author**: Someone"));
        assert!(!is_key_line("Just a sentence: with a colon"));
        assert!(!is_key_line(":not an attribute"));
        assert!(!is_key_line("**bold text** only"));
    }
}
