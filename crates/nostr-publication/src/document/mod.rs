pub mod metadata;
mod parser;
mod slug;

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::Error;

pub use metadata::{extract_metadata, is_key_line, ExtractedMetadata, MetaValue, Metadata};
pub use parser::parse_document;
pub use slug::{slugify, DTagGenerator, CONTENT_SUFFIX, MAX_D_TAG_LEN};

pub const MAX_SECTION_LEVEL: u8 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    AsciiDoc,
    Markdown,
}

impl Dialect {
    /// Pick the dialect from the file extension, falling back to the marker
    /// of the first non-blank line.
    pub fn detect(path: Option<&Path>, text: &str) -> Self {
        let extension = path
            .and_then(|path| path.extension())
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);

        match extension.as_deref() {
            Some("adoc" | "asciidoc" | "asc") => return Dialect::AsciiDoc,
            Some("md" | "markdown" | "mdown") => return Dialect::Markdown,
            _ => {}
        }

        let first = text
            .trim_start_matches('\u{feff}')
            .lines()
            .map(str::trim_start)
            .find(|line| !line.is_empty());
        match first {
            Some(line) if line.starts_with('#') => Dialect::Markdown,
            _ => Dialect::AsciiDoc,
        }
    }

    pub fn header_marker(self) -> char {
        match self {
            Dialect::AsciiDoc => '=',
            Dialect::Markdown => '#',
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            Dialect::AsciiDoc => "text/asciidoc",
            Dialect::Markdown => "text/markdown",
        }
    }

    pub fn render_header(self, level: u8, title: &str) -> String {
        let marker = self.header_marker().to_string().repeat(level as usize);
        format!("{marker} {title}")
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dialect::AsciiDoc => f.write_str("asciidoc"),
            Dialect::Markdown => f.write_str("markdown"),
        }
    }
}

impl FromStr for Dialect {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "asciidoc" | "adoc" => Ok(Dialect::AsciiDoc),
            "markdown" | "md" => Ok(Dialect::Markdown),
            other => Err(Error::InvalidOptions(format!("unknown dialect: {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub title: String,
    pub level: u8,
    /// Basic slug of the title, without any ancestor prefix.
    pub slug: String,
    pub body: String,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
    /// 1-based line of the header.
    pub line: usize,
}

/// A parsed document: title, raw metadata block, preamble and a flat arena of
/// sections linked by parent index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub title: String,
    pub dialect: Dialect,
    pub slug: String,
    pub metadata_lines: Vec<String>,
    pub preamble: String,
    pub sections: Vec<Section>,
}

impl Document {
    pub fn top_level(&self) -> impl Iterator<Item = usize> + '_ {
        self.sections
            .iter()
            .enumerate()
            .filter(|(_, section)| section.parent.is_none())
            .map(|(index, _)| index)
    }

    /// Ancestor indices of `index`, outermost first.
    pub fn ancestors(&self, index: usize) -> Vec<usize> {
        let mut chain = Vec::new();
        let mut current = self.sections[index].parent;
        while let Some(parent) = current {
            chain.push(parent);
            current = self.sections[parent].parent;
        }
        chain.reverse();
        chain
    }

    /// Descendant indices of `index` in document order.
    pub fn descendants(&self, index: usize) -> Vec<usize> {
        let mut out = Vec::new();
        let mut stack: Vec<usize> = self.sections[index].children.iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.sections[next].children.iter().rev().copied());
        }
        out
    }

    /// Depth of the deepest section in the document, or 1 when there are none.
    pub fn max_level(&self) -> u8 {
        self.sections
            .iter()
            .map(|section| section.level)
            .max()
            .unwrap_or(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_dialect() {
        assert_eq!(
            Dialect::detect(Some(Path::new("book.adoc")), "# not markdown"),
            Dialect::AsciiDoc
        );
        assert_eq!(
            Dialect::detect(Some(Path::new("notes.MD")), "= Title"),
            Dialect::Markdown
        );
        assert_eq!(Dialect::detect(None, "\n\n# Title\n"), Dialect::Markdown);
        assert_eq!(Dialect::detect(None, "= Title\n"), Dialect::AsciiDoc);
        assert_eq!(Dialect::detect(None, "\u{feff}# Title\n"), Dialect::Markdown);
        assert_eq!(
            Dialect::detect(Some(Path::new("README")), "plain text"),
            Dialect::AsciiDoc
        );
    }

    #[test]
    fn test_render_header() {
        assert_eq!(Dialect::AsciiDoc.render_header(3, "Deep"), "=== Deep");
        assert_eq!(Dialect::Markdown.render_header(2, "Two"), "## Two");
    }
}
