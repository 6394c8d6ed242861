use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};

use nostr_publication::nostr_sdk::Keys;
use nostr_publication::{
    publish_document, ContentKind, NostrTransport, PublishRequest, PublisherConfig,
    RelayCategories, RunReport,
};

#[derive(Debug, Parser)]
#[command(name = "nostr-publish")]
#[command(about = "Publish an AsciiDoc or Markdown document as Nostr publication events")]
struct Args {
    /// Input document path (.adoc or .md)
    file: PathBuf,

    /// Header depth that becomes content events (0-6). AsciiDoc only.
    #[arg(long)]
    content_level: Option<u8>,

    /// Content event kind: publication (30041), longform (30023) or wiki (30818). AsciiDoc only.
    #[arg(long, value_parser = parse_content_kind)]
    content_kind: Option<ContentKind>,

    /// Parse and plan only; print the publish order without contacting relays
    #[arg(long)]
    dry_run: bool,

    /// Nostr secret key (hex or bech32). Falls back to NOSTR_SECRET_KEY env.
    #[arg(long)]
    key: Option<String>,

    /// Relay category used when the document names none. Falls back to NOSTR_RELAY_CATEGORY env.
    #[arg(long)]
    relay_category: Option<String>,

    /// JSON file of extra relay categories. Falls back to NOSTR_RELAY_CATEGORIES_FILE env.
    #[arg(long)]
    relay_categories: Option<PathBuf>,

    /// Minimum relay acks required per event
    #[arg(long)]
    min_acks: Option<usize>,

    /// Per-call network timeout in seconds
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Skip reading events back after publishing
    #[arg(long)]
    no_validate: bool,

    /// Print the full run report as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    match run(args).await {
        Ok(report) if report.success => ExitCode::SUCCESS,
        Ok(_) => ExitCode::FAILURE,
        Err(err) => {
            error!(error = %err, "Publication aborted");
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<RunReport, Box<dyn std::error::Error>> {
    let mut config = PublisherConfig::from_env()?;
    if let Some(key) = args.key {
        config.secret_key = Some(key);
    }
    if let Some(category) = args.relay_category {
        config.default_category = category.to_ascii_lowercase();
    }
    if let Some(path) = args.relay_categories {
        config.categories = RelayCategories::from_file(path)?;
    }
    if let Some(min_acks) = args.min_acks {
        config.min_acks = min_acks;
    }
    if let Some(secs) = args.timeout_secs {
        config.timeout = Duration::from_secs(secs);
    }
    if args.no_validate {
        config.validate = false;
    }

    let request = PublishRequest {
        document_path: args.file,
        content_level: args.content_level,
        content_kind: args.content_kind,
        dry_run: args.dry_run,
    };

    let report = if request.dry_run {
        // Dry runs never sign, so no key is required.
        let transport = NostrTransport::new(Keys::generate(), config.timeout);
        publish_document(&request, &config, &transport).await?
    } else {
        let transport = NostrTransport::new(config.keys()?, config.timeout);
        publish_document(&request, &config, &transport).await?
    };

    print_report(&report, args.json)?;
    Ok(report)
}

fn parse_content_kind(value: &str) -> Result<ContentKind, String> {
    value.parse().map_err(|err: nostr_publication::Error| err.to_string())
}

fn print_report(report: &RunReport, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    println!(
        "{} [{} level {} {}] {} content, {} index",
        report.title,
        report.dialect,
        report.content_level,
        report.content_kind,
        report.content_units,
        report.index_units
    );

    if report.dry_run {
        for (position, d_tag) in report.publish_order.iter().enumerate() {
            println!("{:>3}. {}", position + 1, d_tag);
        }
        info!(units = report.publish_order.len(), "Dry run complete");
        return Ok(());
    }

    for result in &report.published_events {
        println!("{}", result.summary_line());
    }
    println!(
        "{}/{} units published via {}",
        report.published,
        report.expected,
        report.relays.join(", ")
    );
    Ok(())
}
