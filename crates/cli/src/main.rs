//! # docscribe: command-line front end
//!
//! Fetches a Feishu document, describes its images and prints the reassembled text.

mod config;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use docscribe::providers::factory::create_vision_provider;
use docscribe::{DocumentKind, DocumentSource};
use docscribe_feishu::FeishuDocumentSource;
use serde_json::json;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

// --- CLI Definition ---

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to a YAML config file (defaults to ./docscribe.yml when present)
    #[arg(long, global = true, env = "DOCSCRIBE_CONFIG")]
    config: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Retrieve a document and print its text with image descriptions inlined
    Fetch(FetchArgs),
    /// Show which document a URL points at, following wiki nodes
    Resolve(ResolveArgs),
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Parser, Debug)]
struct FetchArgs {
    /// Document URL (`/docx/`, `/docs/` or `/wiki/`)
    url: String,
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
    /// Skip the vision provider and describe images with OCR only
    #[arg(long)]
    no_vision: bool,
    /// Number of concurrent enrichment workers
    #[arg(long)]
    workers: Option<usize>,
}

#[derive(Parser, Debug)]
struct ResolveArgs {
    url: String,
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
}

// --- Main Application Entry ---

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    // Logs go to stderr so stdout carries only the document.
    fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let outcome = match &cli.command {
        Commands::Fetch(args) => handle_fetch(cli.config.as_deref(), args)
            .await
            .map_err(|e| ("Fetch", e)),
        Commands::Resolve(args) => handle_resolve(cli.config.as_deref(), args)
            .await
            .map_err(|e| ("Resolve", e)),
    };
    if let Err((command, e)) = outcome {
        eprintln!("{command} failed: {e}");
        std::process::exit(1);
    }
}

// --- Command Handlers ---

async fn handle_fetch(config_path: Option<&str>, args: &FetchArgs) -> Result<()> {
    let app_config = config::get_config(config_path)?;
    let mut source = FeishuDocumentSource::new(app_config.feishu_config())?
        .with_enrichment(app_config.enrichment_config(args.workers));

    match app_config.vision_config() {
        Some(vision) if !args.no_vision => {
            source = source.with_vision(create_vision_provider(&vision)?);
        }
        _ => info!("Describing images with OCR only"),
    }

    let document = source.retrieve(&args.url).await?;
    info!(
        "Retrieved document {} with {} images",
        document.document_id,
        document.assets.len()
    );

    match args.format {
        OutputFormat::Text => println!("{}", document.ordered_text),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&document)?),
    }
    Ok(())
}

async fn handle_resolve(config_path: Option<&str>, args: &ResolveArgs) -> Result<()> {
    let app_config = config::get_config(config_path)?;
    let source = FeishuDocumentSource::new(app_config.feishu_config())?;
    let reference = source.resolve(&args.url).await?;

    match args.format {
        OutputFormat::Text => println!("{}\t{}", kind_label(reference.kind), reference.id),
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string_pretty(&json!({
                "id": reference.id,
                "kind": reference.kind,
            }))?
        ),
    }
    Ok(())
}

fn kind_label(kind: DocumentKind) -> &'static str {
    match kind {
        DocumentKind::Legacy => "legacy",
        DocumentKind::Modern => "modern",
        DocumentKind::IndirectionNode => "wiki",
    }
}
