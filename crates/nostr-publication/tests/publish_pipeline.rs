use std::path::PathBuf;

use nostr_publication::mock::MockTransport;
use nostr_publication::{
    plan_document, publish_document, publish_plan, tag_value, tags_named, PublishRequest,
    PublisherConfig, RelayCategories, UnitKind, UnitOutcome, KIND_PUBLICATION_CONTENT,
    KIND_PUBLICATION_INDEX,
};

const SCENARIO_TWO: &str = "\
= Travel Notes
:author: Rosa Diaz
:tags: travel, notes

== Europe

=== Lisbon

Hills and trams.

== Asia

=== Hanoi

Scooters everywhere.
";

const SCENARIO_THREE: &str = "\
= Travel Notes

== Europe

=== Lisbon

Hills and trams.

== Asia

Only a short visit.
";

fn config(relays: &[&str]) -> PublisherConfig {
    let mut categories = RelayCategories::empty();
    categories.insert(
        "default",
        relays.iter().map(|relay| relay.to_string()).collect(),
    );
    PublisherConfig {
        categories,
        validate: false,
        ..PublisherConfig::default()
    }
}

fn write_temp(name: &str, text: &str) -> PathBuf {
    let mut path = std::env::temp_dir();
    path.push(format!(
        "nostr_publication_{}_{}_{}",
        std::process::id(),
        nostr_publication::version(),
        name
    ));
    std::fs::write(&path, text).unwrap();
    path
}

#[test]
fn preamble_only_document_is_one_content_unit() {
    let plan = plan_document(
        "= Short Note\n\nA single paragraph.\n",
        None,
        Some(0),
        None,
        "default",
    )
    .unwrap();
    assert_eq!(plan.count(UnitKind::Content), 1);
    assert_eq!(plan.count(UnitKind::Index), 0);
    assert_eq!(plan.order.len(), 1);
    assert!(plan.root.is_none());
}

#[test]
fn two_sections_with_subsections_make_five_units() {
    let plan = plan_document(SCENARIO_TWO, None, Some(3), None, "default").unwrap();
    assert_eq!(plan.count(UnitKind::Content), 2);
    assert_eq!(plan.count(UnitKind::Index), 3);

    let order = plan.order_d_tags();
    let at = |tag: &str| order.iter().position(|d| d == tag).unwrap();
    assert!(at("travel-notes-europe-lisbon") < at("travel-notes-europe"));
    assert!(at("travel-notes-asia-hanoi") < at("travel-notes-asia"));
    assert!(at("travel-notes-europe") < at("travel-notes"));
    assert!(at("travel-notes-asia") < at("travel-notes"));
    assert_eq!(order.last().map(String::as_str), Some("travel-notes"));
}

#[test]
fn section_without_subsections_becomes_content() {
    let plan = plan_document(SCENARIO_THREE, None, Some(3), None, "default").unwrap();
    assert_eq!(plan.units.len(), 4);

    let asia = plan
        .units
        .iter()
        .find(|unit| unit.d_tag == "travel-notes-asia")
        .unwrap();
    assert_eq!(asia.kind, UnitKind::Content);
    assert_eq!(asia.content, "Only a short visit.");

    let europe = plan
        .units
        .iter()
        .find(|unit| unit.d_tag == "travel-notes-europe")
        .unwrap();
    assert_eq!(europe.kind, UnitKind::Index);
}

#[tokio::test]
async fn dry_run_never_touches_the_network() {
    let path = write_temp("dry_run.adoc", SCENARIO_TWO);
    let transport = MockTransport::new();
    let request = PublishRequest {
        dry_run: true,
        content_level: Some(3),
        ..PublishRequest::new(&path)
    };

    let report = publish_document(&request, &config(&["wss://a"]), &transport)
        .await
        .unwrap();
    std::fs::remove_file(&path).ok();

    assert!(report.dry_run);
    assert!(report.published_events.is_empty());
    assert_eq!(report.publish_order.len(), 5);
    assert_eq!(report.expected, 5);
    assert_eq!(transport.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn single_accepting_relay_meets_default_quorum() {
    let transport = MockTransport::new()
        .with_rejecting("wss://b", "blocked: rate limited")
        .with_rejecting("wss://c", "auth-required");
    let config = config(&["wss://a", "wss://b", "wss://c"]);
    let mut plan = plan_document("= Note\n\nBody.\n", None, None, None, "default").unwrap();

    let report = publish_plan(&mut plan, &config, &transport).await.unwrap();
    assert!(report.success);
    assert_eq!(report.relays.len(), 3);
    match &report.published_events[0].outcome {
        UnitOutcome::Published {
            accepted,
            rejected,
            warnings,
            ..
        } => {
            assert_eq!(accepted, &["wss://a"]);
            assert_eq!(rejected.len(), 2);
            assert!(warnings.is_empty());
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn full_publication_links_indexes_to_children() {
    let transport = MockTransport::new().with_unreachable("wss://down");
    let mut config = config(&["wss://a", "wss://down"]);
    config.validate = true;
    let mut plan = plan_document(SCENARIO_TWO, None, Some(3), None, "default").unwrap();

    let report = publish_plan(&mut plan, &config, &transport).await.unwrap();
    assert!(report.success, "{report:?}");
    assert_eq!(report.published, 5);
    assert_eq!(report.relays, vec!["wss://a"]);

    let published = transport.published().await;
    assert_eq!(published.len(), 5);

    let root = published.last().unwrap();
    assert_eq!(root.kind, KIND_PUBLICATION_INDEX);
    assert_eq!(tag_value(&root.tags, "author"), Some("Rosa Diaz"));
    assert_eq!(tags_named(&root.tags, "t").count(), 2);

    let europe_id = report
        .published_events
        .iter()
        .find(|result| result.d_tag == "travel-notes-europe")
        .and_then(|result| result.event_id())
        .unwrap()
        .to_string();
    let pointer = tags_named(&root.tags, "a").next().unwrap();
    assert_eq!(pointer.values[0], format!("30040:{}:travel-notes-europe", transport.author()));
    assert_eq!(pointer.values[1], "wss://a");
    assert_eq!(pointer.values[2], europe_id);

    let lisbon = published
        .iter()
        .find(|draft| draft.d_tag() == Some("travel-notes-europe-lisbon"))
        .unwrap();
    assert_eq!(lisbon.kind, KIND_PUBLICATION_CONTENT);
    assert_eq!(tag_value(&lisbon.tags, "m"), Some("text/asciidoc"));
}

#[tokio::test(start_paused = true)]
async fn failed_unit_marks_run_failed_but_reports_successes() {
    let transport = MockTransport::new().with_failing_unit("travel-notes-asia-hanoi");
    let mut plan = plan_document(SCENARIO_TWO, None, Some(3), None, "default").unwrap();

    let report = publish_plan(&mut plan, &config(&["wss://a"]), &transport)
        .await
        .unwrap();
    assert!(!report.success);
    assert_eq!(report.expected, 5);
    assert_eq!(report.published, 2);

    let skipped: Vec<&str> = report
        .published_events
        .iter()
        .filter(|result| matches!(result.outcome, UnitOutcome::SkippedDependency { .. }))
        .map(|result| result.d_tag.as_str())
        .collect();
    assert_eq!(skipped, vec!["travel-notes-asia", "travel-notes"]);
}

#[tokio::test(start_paused = true)]
async fn no_reachable_relay_aborts_the_run() {
    let transport = MockTransport::new()
        .with_unreachable("wss://a")
        .with_unreachable(nostr_publication::FALLBACK_RELAY);
    let mut plan = plan_document("= Note\n\nBody.\n", None, None, None, "default").unwrap();

    let err = publish_plan(&mut plan, &config(&["wss://a"]), &transport)
        .await
        .unwrap_err();
    assert!(err.is_fatal());
    assert_eq!(transport.publish_count(), 0);
}

#[test]
fn structural_errors_abort_before_planning() {
    let err = plan_document("= One\n\n= Two\n", None, None, None, "default").unwrap_err();
    assert!(err.is_fatal());
    assert!(err.to_string().contains("found 2"));

    let err = plan_document("# Post\n\nBody\n", None, Some(2), None, "default").unwrap_err();
    assert!(err.is_fatal());

    let err = plan_document("= Title\n", None, Some(2), None, "default").unwrap_err();
    assert!(err.is_fatal());
    assert!(err.to_string().contains("nothing to publish"));
}

#[test]
fn malformed_relay_address_is_a_configuration_error() {
    let err = plan_document("= Note\n:relays: wss://\n\nBody.\n", None, None, None, "default")
        .unwrap_err();
    assert!(err.is_fatal());
    assert!(!err.is_retryable());
}

#[tokio::test(start_paused = true)]
async fn equivalent_relay_addresses_are_probed_once() {
    let transport = MockTransport::new();
    let text = "= Note\n:relays: wss://relay.example.com, wss://relay.example.com/, WSS://Relay.Example.com\n\nBody.\n";
    let mut plan = plan_document(text, None, None, None, "default").unwrap();

    let report = publish_plan(&mut plan, &config(&["wss://unused"]), &transport)
        .await
        .unwrap();
    assert!(report.success);
    assert_eq!(report.relays, vec!["wss://relay.example.com"]);
    assert_eq!(transport.probe_count(), 1);
}
