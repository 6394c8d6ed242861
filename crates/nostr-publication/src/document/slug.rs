//! Stable, length-bounded identifiers ("d-tags") for publication units.
//!
//! A d-tag is the document slug joined with every ancestor section slug and
//! the unit's own slug, so two sections with the same title in different
//! branches never collide. Keys longer than [`MAX_D_TAG_LEN`] are trimmed
//! segment by segment, favouring the document segment and the leaf segment.

pub const MAX_D_TAG_LEN: usize = 70;
pub const CONTENT_SUFFIX: &str = "content";

const SEPARATOR: char = '-';
const DOC_SEGMENT_CAP: usize = 12;
const LEAF_SEGMENT_CAP: usize = 10;
const INTERIOR_SEGMENT_CAP: usize = 6;
const EMPTY_SLUG: &str = "untitled";

/// Lower-case `text`, turn whitespace runs into single hyphens and drop
/// everything that is not alphanumeric, `-` or `_`.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_hyphen = false;

    for ch in text.chars() {
        if ch.is_alphanumeric() || ch == '_' {
            if pending_hyphen && !slug.is_empty() {
                slug.push(SEPARATOR);
            }
            pending_hyphen = false;
            slug.extend(ch.to_lowercase());
        } else if ch == SEPARATOR || ch.is_whitespace() {
            pending_hyphen = true;
        }
    }

    slug
}

#[derive(Debug, Clone)]
pub struct DTagGenerator {
    document: String,
    max_len: usize,
}

impl DTagGenerator {
    pub fn new(document_title: &str) -> Self {
        Self::with_max_len(document_title, MAX_D_TAG_LEN)
    }

    pub fn with_max_len(document_title: &str, max_len: usize) -> Self {
        let mut document = slugify(document_title);
        if document.is_empty() {
            document = EMPTY_SLUG.to_string();
        }
        Self { document, max_len }
    }

    pub fn document_slug(&self) -> &str {
        &self.document
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    /// D-tag of the document-level unit.
    pub fn root(&self, content: bool) -> String {
        self.build(vec![self.document.clone()], content)
    }

    /// D-tag for a section titled `title` below `ancestors` (outermost first,
    /// already slugified).
    pub fn generate(&self, title: &str, ancestors: &[String], content: bool) -> String {
        let mut leaf = slugify(title);
        if leaf.is_empty() {
            leaf = EMPTY_SLUG.to_string();
        }

        let mut parts = Vec::with_capacity(ancestors.len() + 2);
        parts.push(self.document.clone());
        parts.extend(ancestors.iter().filter(|slug| !slug.is_empty()).cloned());
        parts.push(leaf);
        self.build(parts, content)
    }

    /// Append a numeric counter to an already generated tag while keeping the
    /// length bound.
    pub fn with_counter(&self, d_tag: &str, counter: usize) -> String {
        let suffix = format!("{SEPARATOR}{counter}");
        let budget = self.max_len.saturating_sub(suffix.chars().count());
        let base = hard_cut(d_tag, budget);
        format!("{base}{suffix}")
    }

    fn build(&self, parts: Vec<String>, content: bool) -> String {
        if !content {
            return fit(&parts, self.max_len);
        }
        let suffix_len = CONTENT_SUFFIX.len() + 1;
        let base = fit(&parts, self.max_len.saturating_sub(suffix_len));
        format!("{base}{SEPARATOR}{CONTENT_SUFFIX}")
    }
}

fn fit(parts: &[String], budget: usize) -> String {
    let joined = join(parts);
    if char_len(&joined) <= budget {
        return joined;
    }

    let proportional = trim_proportional(parts, budget);
    if char_len(&proportional) <= budget {
        return proportional;
    }

    let capped = trim_capped(parts);
    if char_len(&capped) <= budget {
        return capped;
    }

    hard_cut(&capped, budget)
}

fn trim_proportional(parts: &[String], budget: usize) -> String {
    let count = parts.len();
    if count == 1 {
        return trim_segment(&parts[0], budget);
    }

    let available = budget.saturating_sub(count - 1);
    let share = (available / count).max(1);

    let interior: Vec<String> = parts[1..count - 1]
        .iter()
        .map(|part| trim_segment(part, share))
        .collect();
    let used: usize = interior.iter().map(|part| char_len(part)).sum();
    let remaining = available.saturating_sub(used);

    let first_need = char_len(&parts[0]);
    let last_need = char_len(&parts[count - 1]);
    let half = remaining / 2;
    let (first_max, last_max) = if first_need <= half {
        (first_need, remaining - first_need)
    } else if last_need <= remaining - half {
        (remaining - last_need, last_need)
    } else {
        (half, remaining - half)
    };

    let mut trimmed = Vec::with_capacity(count);
    trimmed.push(trim_segment(&parts[0], first_max));
    trimmed.extend(interior);
    trimmed.push(trim_segment(&parts[count - 1], last_max));
    join(&trimmed)
}

fn trim_capped(parts: &[String]) -> String {
    let last = parts.len() - 1;
    let trimmed: Vec<String> = parts
        .iter()
        .enumerate()
        .map(|(index, part)| {
            let cap = match index {
                0 => DOC_SEGMENT_CAP,
                i if i == last => LEAF_SEGMENT_CAP,
                _ => INTERIOR_SEGMENT_CAP,
            };
            trim_segment(part, cap)
        })
        .collect();
    join(&trimmed)
}

/// Cut `segment` to at most `max` characters, at the last hyphen or
/// underscore inside the budget when there is one.
fn trim_segment(segment: &str, max: usize) -> String {
    if char_len(segment) <= max {
        return segment.to_string();
    }
    let cut: String = segment.chars().take(max).collect();
    match cut.rfind(['-', '_']) {
        Some(pos) if pos > 0 => cut[..pos].to_string(),
        _ => cut,
    }
}

fn hard_cut(value: &str, budget: usize) -> String {
    if char_len(value) <= budget {
        return value.to_string();
    }
    let cut: String = value.chars().take(budget).collect();
    let cut = match cut.rfind(SEPARATOR) {
        Some(pos) if pos >= budget / 2 => cut[..pos].to_string(),
        _ => cut,
    };
    cut.trim_end_matches(['-', '_']).to_string()
}

fn join(parts: &[String]) -> String {
    let mut out = String::new();
    for part in parts {
        let part = part.trim_matches(['-', '_']);
        if part.is_empty() {
            continue;
        }
        if !out.is_empty() {
            out.push(SEPARATOR);
        }
        out.push_str(part);
    }
    out
}

fn char_len(value: &str) -> usize {
    value.chars().count()
}
