//! Document → plan → published events.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::info;

use crate::client::Transport;
use crate::config::PublisherConfig;
use crate::dependency::publish_order;
use crate::document::metadata::{KEY_CONTENT_KIND, KEY_CONTENT_LEVEL};
use crate::document::{extract_metadata, parse_document, Dialect, Metadata, MAX_SECTION_LEVEL};
use crate::events::ContentKind;
use crate::hierarchy::{build_hierarchy, Unit, UnitKind};
use crate::publish::{Orchestrator, PublishSettings, UnitResult};
use crate::relay::{RelaySelector, RelayTarget};
use crate::Error;

/// Everything needed to publish one document, computed without touching
/// the network.
#[derive(Debug, Clone)]
pub struct PublicationPlan {
    pub title: String,
    pub dialect: Dialect,
    pub content_level: u8,
    pub content_kind: ContentKind,
    pub metadata: Metadata,
    pub relay_target: RelayTarget,
    pub units: Vec<Unit>,
    /// Indices into `units`, children before the indexes that list them.
    pub order: Vec<usize>,
    /// Root index d-tag; `None` when the document is a single content unit.
    pub root: Option<String>,
    /// D-tag of the unit that carries document metadata.
    pub document_d_tag: String,
}

impl PublicationPlan {
    pub fn ordered_units(&self) -> impl Iterator<Item = &Unit> + '_ {
        self.order.iter().map(|index| &self.units[*index])
    }

    pub fn order_d_tags(&self) -> Vec<String> {
        self.ordered_units().map(|unit| unit.d_tag.clone()).collect()
    }

    pub fn count(&self, kind: UnitKind) -> usize {
        self.units.iter().filter(|unit| unit.kind == kind).count()
    }
}

/// Reject explicit overrides that can never be valid, before parsing.
pub fn check_overrides(
    dialect: Dialect,
    content_level: Option<u8>,
    content_kind: Option<ContentKind>,
) -> Result<(), Error> {
    if dialect == Dialect::Markdown && (content_level.is_some() || content_kind.is_some()) {
        return Err(Error::InvalidOptions(
            "markdown documents are always published as a single long-form event; \
             content level and kind cannot be set"
                .to_string(),
        ));
    }
    if let Some(level) = content_level {
        check_level(level)?;
    }
    if let (Some(ContentKind::LongForm), Some(level)) = (content_kind, content_level) {
        check_long_form(level)?;
    }
    Ok(())
}

/// Explicit value, then document metadata, then the dialect default.
pub fn resolve_content_options(
    dialect: Dialect,
    metadata: &Metadata,
    content_level: Option<u8>,
    content_kind: Option<ContentKind>,
) -> Result<(u8, ContentKind), Error> {
    if dialect == Dialect::Markdown {
        return Ok((0, ContentKind::LongForm));
    }

    let level = match content_level {
        Some(level) => level,
        None => match metadata.get(KEY_CONTENT_LEVEL) {
            Some(value) => value.trim().parse().map_err(|_| {
                Error::InvalidOptions(format!("content_level must be 0-{MAX_SECTION_LEVEL}, got {value:?}"))
            })?,
            None => 0,
        },
    };
    let kind = match content_kind {
        Some(kind) => kind,
        None => match metadata.get(KEY_CONTENT_KIND) {
            Some(value) => value.parse()?,
            None => ContentKind::PublicationContent,
        },
    };

    check_level(level)?;
    if kind == ContentKind::LongForm {
        check_long_form(level)?;
    }
    Ok((level, kind))
}

fn check_level(level: u8) -> Result<(), Error> {
    if level > MAX_SECTION_LEVEL {
        return Err(Error::InvalidOptions(format!(
            "content_level must be 0-{MAX_SECTION_LEVEL}, got {level}"
        )));
    }
    Ok(())
}

fn check_long_form(level: u8) -> Result<(), Error> {
    if level == 0 {
        return Err(Error::InvalidOptions(
            "long-form content requires a content_level above 0".to_string(),
        ));
    }
    Ok(())
}

/// Parse `text` and lay out its units and publish order.
pub fn plan_document(
    text: &str,
    path: Option<&Path>,
    content_level: Option<u8>,
    content_kind: Option<ContentKind>,
    fallback_relays: &str,
) -> Result<PublicationPlan, Error> {
    let dialect = Dialect::detect(path, text);
    check_overrides(dialect, content_level, content_kind)?;

    let document = parse_document(text, dialect)?;
    let extracted = extract_metadata(&document.metadata_lines, dialect, fallback_relays);
    let (level, kind) =
        resolve_content_options(dialect, &extracted.metadata, content_level, content_kind)?;

    let relay_target = RelayTarget::parse(&extracted.relays)?;

    let hierarchy = build_hierarchy(&document, level, kind)?;
    let root = hierarchy.root.clone();
    let mut units = hierarchy.into_units();
    let order = publish_order(&units)?;

    let mut positions = vec![0; units.len()];
    for (position, index) in order.iter().enumerate() {
        positions[*index] = position;
    }
    let by_tag: std::collections::HashMap<String, usize> = units
        .iter()
        .enumerate()
        .map(|(index, unit)| (unit.d_tag.clone(), index))
        .collect();
    for unit in &mut units {
        for reference in &mut unit.references {
            reference.position = by_tag.get(&reference.d_tag).map(|index| positions[*index]);
        }
    }

    let document_d_tag = match &root {
        Some(root) => root.clone(),
        None => units
            .first()
            .map(|unit| unit.d_tag.clone())
            .unwrap_or_else(|| document.slug.clone()),
    };

    info!(
        title = %document.title,
        dialect = %dialect,
        level,
        kind = %kind,
        units = units.len(),
        "Planned publication"
    );

    Ok(PublicationPlan {
        title: document.title,
        dialect,
        content_level: level,
        content_kind: kind,
        metadata: extracted.metadata,
        relay_target,
        units,
        order,
        root,
        document_d_tag,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishRequest {
    pub document_path: PathBuf,
    pub content_level: Option<u8>,
    pub content_kind: Option<ContentKind>,
    pub dry_run: bool,
}

impl PublishRequest {
    pub fn new(document_path: impl Into<PathBuf>) -> Self {
        Self {
            document_path: document_path.into(),
            content_level: None,
            content_kind: None,
            dry_run: false,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub title: String,
    pub dialect: Dialect,
    pub content_level: u8,
    pub content_kind: ContentKind,
    pub content_units: usize,
    pub index_units: usize,
    pub publish_order: Vec<String>,
    pub relay_target: RelayTarget,
    pub relays: Vec<String>,
    pub dry_run: bool,
    pub published_events: Vec<UnitResult>,
    pub published: usize,
    pub expected: usize,
    pub success: bool,
}

impl RunReport {
    pub fn dry_run(plan: &PublicationPlan) -> Self {
        Self::build(plan, Vec::new(), Vec::new(), true)
    }

    pub fn published(plan: &PublicationPlan, relays: Vec<String>, results: Vec<UnitResult>) -> Self {
        Self::build(plan, relays, results, false)
    }

    fn build(
        plan: &PublicationPlan,
        relays: Vec<String>,
        results: Vec<UnitResult>,
        dry_run: bool,
    ) -> Self {
        let expected = plan.units.len();
        let published = results.iter().filter(|result| result.is_published()).count();
        Self {
            title: plan.title.clone(),
            dialect: plan.dialect,
            content_level: plan.content_level,
            content_kind: plan.content_kind,
            content_units: plan.count(UnitKind::Content),
            index_units: plan.count(UnitKind::Index),
            publish_order: plan.order_d_tags(),
            relay_target: plan.relay_target.clone(),
            relays,
            dry_run,
            published_events: results,
            published,
            expected,
            success: dry_run || published == expected,
        }
    }
}

/// Read, plan and (unless dry-running) publish a document.
pub async fn publish_document(
    request: &PublishRequest,
    config: &PublisherConfig,
    transport: &dyn Transport,
) -> Result<RunReport, Error> {
    let text = std::fs::read_to_string(&request.document_path)?;
    let mut plan = plan_document(
        &text,
        Some(&request.document_path),
        request.content_level,
        request.content_kind,
        &config.default_category,
    )?;

    if request.dry_run {
        info!(units = plan.units.len(), "Dry run, nothing published");
        return Ok(RunReport::dry_run(&plan));
    }
    publish_plan(&mut plan, config, transport).await
}

/// Select relays, publish every unit of `plan` and report per-unit outcomes.
pub async fn publish_plan(
    plan: &mut PublicationPlan,
    config: &PublisherConfig,
    transport: &dyn Transport,
) -> Result<RunReport, Error> {
    let selector = RelaySelector::new(config.categories.clone(), config.default_category.clone())
        .with_probe_timeout(config.probe_timeout);
    let relays = selector.select(&plan.relay_target, transport).await?;
    let client = transport.open(&relays).await?;

    let settings = PublishSettings {
        min_acks: config.min_acks,
        validate: config.validate,
        validation_delay: config.validation_delay,
        relay_hint: relays.first().cloned().unwrap_or_default(),
    };
    let results = Orchestrator::new(client, settings).publish(plan).await;

    let report = RunReport::published(plan, relays, results);
    info!(
        published = report.published,
        expected = report.expected,
        success = report.success,
        "Publication run finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_markdown_rejects_overrides() {
        let err = check_overrides(Dialect::Markdown, Some(2), None).unwrap_err();
        assert!(err.is_fatal());
        assert!(check_overrides(Dialect::Markdown, None, Some(ContentKind::Wiki)).is_err());
        assert!(check_overrides(Dialect::Markdown, None, None).is_ok());
    }

    #[test]
    fn test_long_form_needs_a_level() {
        assert!(check_overrides(Dialect::AsciiDoc, Some(0), Some(ContentKind::LongForm)).is_err());
        assert!(check_overrides(Dialect::AsciiDoc, Some(7), None).is_err());
        assert!(check_overrides(Dialect::AsciiDoc, Some(2), Some(ContentKind::LongForm)).is_ok());

        let err = resolve_content_options(
            Dialect::AsciiDoc,
            &Metadata::default(),
            None,
            Some(ContentKind::LongForm),
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidOptions(_)));
    }

    #[test]
    fn test_options_fall_back_to_metadata() {
        let mut metadata = Metadata::default();
        metadata.set(KEY_CONTENT_LEVEL, "3");
        metadata.set(KEY_CONTENT_KIND, "wiki");
        assert_eq!(
            resolve_content_options(Dialect::AsciiDoc, &metadata, None, None).unwrap(),
            (3, ContentKind::Wiki)
        );
        assert_eq!(
            resolve_content_options(Dialect::AsciiDoc, &metadata, Some(2), None).unwrap(),
            (2, ContentKind::Wiki)
        );
        assert_eq!(
            resolve_content_options(Dialect::Markdown, &metadata, None, None).unwrap(),
            (0, ContentKind::LongForm)
        );

        metadata.set(KEY_CONTENT_LEVEL, "deep");
        assert!(resolve_content_options(Dialect::AsciiDoc, &metadata, None, None).is_err());
    }

    #[test]
    fn test_plan_assigns_reference_positions() {
        let text = "= Book\n\n== A\n\n=== A1\n\nText.\n\n== B\n\n=== B1\n\nMore.\n";
        let plan = plan_document(text, None, Some(3), None, "default").unwrap();
        assert_eq!(plan.root.as_deref(), Some("book"));
        assert_eq!(plan.document_d_tag, "book");

        let order = plan.order_d_tags();
        for unit in &plan.units {
            let own = order.iter().position(|tag| tag == &unit.d_tag).unwrap();
            for reference in &unit.references {
                let child = reference.position.unwrap();
                assert_eq!(order[child], reference.d_tag);
                assert!(child < own);
            }
        }
    }

    #[test]
    fn test_plan_reads_relay_target_from_metadata() {
        let text = "= Book\n:relays: wss://one.example, wss://two.example\n\nBody.\n";
        let plan = plan_document(text, None, None, None, "default").unwrap();
        assert_eq!(
            plan.relay_target,
            RelayTarget::Explicit(vec![
                "wss://one.example".to_string(),
                "wss://two.example".to_string()
            ])
        );

        let plan = plan_document("= Book\n\nBody.\n", None, None, None, "wiki").unwrap();
        assert_eq!(plan.relay_target, RelayTarget::Category("wiki".to_string()));
    }

    #[test]
    fn test_markdown_plan_is_single_long_form_unit() {
        let text = "# Post\n**Author:** Sam\n\nIntro.\n\n## Part\n\nBody.\n";
        let plan = plan_document(text, Some(Path::new("post.md")), None, None, "default").unwrap();
        assert_eq!(plan.dialect, Dialect::Markdown);
        assert_eq!(plan.content_kind, ContentKind::LongForm);
        assert_eq!(plan.units.len(), 1);
        assert_eq!(plan.units[0].event_kind, 30023);
        assert!(plan.units[0].content.contains("## Part"));
        assert!(plan.root.is_none());
    }
}
