//! Line-oriented structure parser for AsciiDoc and Markdown documents.
//!
//! The parser only understands headers, the metadata block under the title
//! and delimited blocks (so a `#` inside a code fence is not a header).
//! Everything else is carried through verbatim as section body text.

use tracing::debug;

use super::metadata::is_key_line;
use super::slug::slugify;
use super::{Dialect, Document, Section, MAX_SECTION_LEVEL};
use crate::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
enum LineKind<'a> {
    Header { level: u8, title: &'a str },
    Text,
}

#[derive(Debug)]
struct Line<'a> {
    number: usize,
    raw: &'a str,
    kind: LineKind<'a>,
}

/// Parse `text` into a [`Document`], enforcing a single level-1 title as the
/// first non-blank line.
pub fn parse_document(text: &str, dialect: Dialect) -> Result<Document, Error> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let lines = classify(text, dialect);

    let titles: Vec<&Line<'_>> = lines
        .iter()
        .filter(|line| matches!(line.kind, LineKind::Header { level: 1, .. }))
        .collect();
    if titles.len() != 1 {
        return Err(Error::TitleCount {
            count: titles.len(),
            line: titles.get(1).map(|line| line.number),
        });
    }

    let mut cursor = lines.iter().peekable();
    let title = loop {
        let Some(line) = cursor.next() else {
            return Err(Error::TitleCount {
                count: 0,
                line: None,
            });
        };
        match line.kind {
            LineKind::Header { level: 1, title } => break title.to_string(),
            _ if line.raw.trim().is_empty() => continue,
            _ => {
                return Err(Error::ContentBeforeTitle {
                    line: line.number,
                    text: line.raw.trim().to_string(),
                })
            }
        }
    };

    let mut metadata_lines = Vec::new();
    while let Some(line) = cursor.peek() {
        if line.raw.trim().is_empty() || !matches!(line.kind, LineKind::Text) {
            break;
        }
        if dialect == Dialect::Markdown && !is_key_line(line.raw) {
            break;
        }
        metadata_lines.push(line.raw.trim().to_string());
        cursor.next();
    }

    let mut preamble = Vec::new();
    let mut sections: Vec<Section> = Vec::new();
    let mut bodies: Vec<Vec<&str>> = Vec::new();
    // Open sections, innermost last.
    let mut open: Vec<usize> = Vec::new();

    for line in cursor {
        match line.kind {
            LineKind::Header { level, title } => {
                while let Some(&top) = open.last() {
                    if sections[top].level >= level {
                        open.pop();
                    } else {
                        break;
                    }
                }
                let parent = open.last().copied();
                let index = sections.len();
                sections.push(Section {
                    title: title.to_string(),
                    level,
                    slug: slugify(title),
                    body: String::new(),
                    parent,
                    children: Vec::new(),
                    line: line.number,
                });
                bodies.push(Vec::new());
                if let Some(parent) = parent {
                    sections[parent].children.push(index);
                }
                open.push(index);
            }
            LineKind::Text => match sections.len() {
                0 => preamble.push(line.raw),
                n => bodies[n - 1].push(line.raw),
            },
        }
    }

    for (section, body) in sections.iter_mut().zip(bodies) {
        section.body = join_trimmed(&body);
    }

    debug!(
        title = %title,
        sections = sections.len(),
        metadata_lines = metadata_lines.len(),
        "Parsed document structure"
    );

    let mut slug = slugify(&title);
    if slug.is_empty() {
        slug = "untitled".to_string();
    }

    Ok(Document {
        title,
        dialect,
        slug,
        metadata_lines,
        preamble: join_trimmed(&preamble),
        sections,
    })
}

fn classify(text: &str, dialect: Dialect) -> Vec<Line<'_>> {
    let mut fence: Option<String> = None;
    let mut out = Vec::new();

    for (index, raw) in text.lines().enumerate() {
        let raw = raw.trim_end_matches('\r');
        let number = index + 1;

        if let Some(delimiter) = block_delimiter(raw, dialect) {
            match &fence {
                Some(open) if fence_closes(open, &delimiter, dialect) => fence = None,
                Some(_) => {}
                None => fence = Some(delimiter),
            }
            out.push(Line {
                number,
                raw,
                kind: LineKind::Text,
            });
            continue;
        }

        let kind = if fence.is_none() {
            header(raw, dialect).unwrap_or(LineKind::Text)
        } else {
            LineKind::Text
        };
        out.push(Line { number, raw, kind });
    }

    out
}

fn header(raw: &str, dialect: Dialect) -> Option<LineKind<'_>> {
    let marker = dialect.header_marker();
    let count = raw.chars().take_while(|ch| *ch == marker).count();
    if count == 0 || count > MAX_SECTION_LEVEL as usize {
        return None;
    }
    let rest = &raw[count..];
    if !rest.starts_with([' ', '\t']) {
        return None;
    }
    let mut title = rest.trim();
    if dialect == Dialect::Markdown {
        title = title.trim_end_matches('#').trim_end();
    }
    if title.is_empty() {
        return None;
    }
    Some(LineKind::Header {
        level: count as u8,
        title,
    })
}

fn block_delimiter(raw: &str, dialect: Dialect) -> Option<String> {
    let trimmed = raw.trim_end();
    match dialect {
        Dialect::AsciiDoc => {
            let first = trimmed.chars().next()?;
            let delimiter_chars = ['-', '.', '+', '_', '*', '/', '='];
            if trimmed.len() >= 4
                && delimiter_chars.contains(&first)
                && trimmed.chars().all(|ch| ch == first)
            {
                Some(trimmed.to_string())
            } else {
                None
            }
        }
        Dialect::Markdown => {
            let indented = trimmed.trim_start();
            if indented.starts_with("```") {
                Some("```".to_string())
            } else if indented.starts_with("~~~") {
                Some("~~~".to_string())
            } else {
                None
            }
        }
    }
}

fn fence_closes(open: &str, candidate: &str, dialect: Dialect) -> bool {
    match dialect {
        Dialect::AsciiDoc => open == candidate,
        Dialect::Markdown => open.chars().next() == candidate.chars().next(),
    }
}

fn join_trimmed(lines: &[&str]) -> String {
    let start = lines
        .iter()
        .position(|line| !line.trim().is_empty())
        .unwrap_or(lines.len());
    let end = lines
        .iter()
        .rposition(|line| !line.trim().is_empty())
        .map_or(start, |pos| pos + 1);
    lines[start..end].join("\n")
}
