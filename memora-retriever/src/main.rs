use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use memora_retriever::{
    config::MemoraConfig,
    retrieval::{ResultView, SearchRequest},
    session::Session,
};
use memora_vision::VisionConfig;
use serde::Serialize;
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

/// Index a directory of images and search it by description.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory holding the images and the .memory_index.db catalog
    #[arg(short, long, default_value = ".")]
    root: PathBuf,

    /// Config file (defaults to <root>/memora.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, default_value = "summary", global = true)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create or open the catalog and load the vector index
    Mount,
    /// Index new images under the root
    Scan {
        /// Directory to scan, relative to the root (defaults to the root)
        path: Option<PathBuf>,
        /// Re-process every file, not only new content
        #[arg(long)]
        rescan: bool,
    },
    /// Search images by description
    Search {
        query: String,
        /// Maximum number of candidates
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
        /// Earliest capture date (YYYY-MM-DD)
        #[arg(long)]
        from: Option<NaiveDate>,
        /// Latest capture date (YYYY-MM-DD)
        #[arg(long)]
        to: Option<NaiveDate>,
    },
    /// Show one record
    Get { file_id: String },
    /// List records, newest first
    List {
        #[arg(short, long, default_value_t = 50)]
        limit: usize,
        #[arg(short, long, default_value_t = 0)]
        offset: usize,
    },
    /// Write a record's thumbnail JPEG to a file
    Thumbnail {
        file_id: String,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Manage the optional vision backend
    Vision {
        #[command(subcommand)]
        action: VisionAction,
    },
    /// Show catalog statistics and index consistency
    Status,
}

#[derive(Subcommand, Debug)]
enum VisionAction {
    /// Print the stored backend
    Show,
    /// Store a backend for later scans and searches
    Set {
        endpoint_url: String,
        model_name: String,
        #[arg(long)]
        api_key: Option<String>,
    },
    /// Probe a backend; without arguments, probe the stored one
    Test {
        endpoint_url: Option<String>,
        model_name: Option<String>,
        #[arg(long)]
        api_key: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq)]
enum OutputFormat {
    Summary,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "summary" => Ok(OutputFormat::Summary),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Invalid format: {s}")),
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn load_config(args: &Args) -> anyhow::Result<MemoraConfig> {
    Ok(match &args.config {
        Some(path) => MemoraConfig::load(path)?,
        None => MemoraConfig::load_for_root(&args.root)?,
    })
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_results(results: &[ResultView]) {
    println!("Found {} images:", results.len());
    for r in results {
        let date = r
            .exif_date
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| r.created_at.format("%Y-%m-%d").to_string());
        println!(
            "  {:.3} | {} | {} | {} | {}",
            r.score,
            &r.file_id[..r.file_id.len().min(12)],
            date,
            r.path,
            r.summary.as_deref().unwrap_or("-")
        );
    }
}

async fn open(args: &Args) -> anyhow::Result<Session> {
    Ok(Session::open(&args.root, load_config(args)?).await?)
}

async fn run() -> anyhow::Result<()> {
    let args = Args::parse();

    match &args.command {
        Commands::Mount => {
            let (_session, info) = Session::mount(&args.root, load_config(&args)?).await?;
            match args.format {
                OutputFormat::Json => print_json(&info)?,
                OutputFormat::Summary => {
                    println!("Mounted {}", args.root.display());
                    println!("Database location: {}", info.db_path.display());
                    println!("Indexed images: {}", info.count);
                }
            }
        }
        Commands::Scan { path, rescan } => {
            let (session, _) = Session::mount(&args.root, load_config(&args)?).await?;
            let summary = session.scan_path(path.as_deref(), *rescan).await?;
            let scanned = path
                .as_deref()
                .map_or_else(|| session.root().to_path_buf(), |p| session.root().join(p));
            match args.format {
                OutputFormat::Json => print_json(&summary)?,
                OutputFormat::Summary => println!(
                    "Scanned {}: {} new, {} skipped ({} failed)",
                    scanned.display(),
                    summary.added,
                    summary.skipped,
                    summary.failed
                ),
            }
        }
        Commands::Search {
            query,
            top_k,
            from,
            to,
        } => {
            let session = open(&args).await?;
            let mut request = SearchRequest::new(query.clone()).with_dates(*from, *to);
            request.top_k = *top_k;
            let results = session.search(&request).await?;
            match args.format {
                OutputFormat::Json => print_json(&results)?,
                OutputFormat::Summary => print_results(&results),
            }
        }
        Commands::Get { file_id } => {
            let session = open(&args).await?;
            let record = session.get(file_id).await?;
            match args.format {
                OutputFormat::Json => print_json(&record)?,
                OutputFormat::Summary => {
                    println!("File ID: {}", record.file_id);
                    println!("Path: {}", record.path);
                    println!("Hash: {}", record.hash);
                    println!("Created: {}", record.created_at);
                    if let Some(exif_date) = record.exif_date {
                        println!("Captured: {exif_date}");
                    }
                    println!("Vision: {}", record.vision_status);
                    if let Some(summary) = &record.memory_summary {
                        println!("Summary: {summary}");
                    }
                    if !record.tags.is_empty() {
                        println!("Tags: {}", record.tags_text());
                    }
                    if let Some(ocr) = &record.ocr_text {
                        println!("OCR text:\n{ocr}");
                    }
                }
            }
        }
        Commands::List { limit, offset } => {
            let session = open(&args).await?;
            let results = session.list(*limit, *offset).await?;
            match args.format {
                OutputFormat::Json => print_json(&results)?,
                OutputFormat::Summary => print_results(&results),
            }
        }
        Commands::Thumbnail { file_id, output } => {
            let session = open(&args).await?;
            let jpeg = session.thumbnail(file_id).await?;
            tokio::fs::write(output, &jpeg).await?;
            println!("Wrote {} bytes to {}", jpeg.len(), output.display());
        }
        Commands::Vision { action } => vision(&args, action).await?,
        Commands::Status => {
            let session = open(&args).await?;
            let report = session.status().await?;
            match args.format {
                OutputFormat::Json => print_json(&report)?,
                OutputFormat::Summary => {
                    println!("Memora Status");
                    println!("=============");
                    println!("Root: {}", report.root);
                    println!("Records: {}", report.catalog.total_records);
                    println!("With embeddings: {}", report.catalog.embedded_records);
                    for (status, count) in &report.catalog.vision_status_counts {
                        println!("  vision {status}: {count}");
                    }
                    if let Some(size) = report.catalog.database_size_bytes {
                        println!("Database size: {:.1} MB", size as f64 / 1_048_576.0);
                    }
                    match (&report.vision_backend.endpoint_url, &report.vision_backend.model_name) {
                        (Some(url), Some(model)) => println!("Vision backend: {model} at {url}"),
                        _ => println!("Vision backend: not configured"),
                    }
                    println!("Index consistency: {:?}", report.consistency.overall_status);
                    for check in &report.consistency.checks_performed {
                        for detail in &check.issue_details {
                            println!("  {}: {}", check.check_name, detail);
                        }
                    }
                    for rec in &report.consistency.issues_summary.recommendations {
                        println!("  -> {rec}");
                    }
                }
            }
        }
    }
    Ok(())
}

async fn vision(args: &Args, action: &VisionAction) -> anyhow::Result<()> {
    let session = open(args).await?;
    match action {
        VisionAction::Show => {
            let config = session.vision_config().await?;
            match (&args.format, config) {
                (OutputFormat::Json, config) => print_json(&config.map(redacted))?,
                (OutputFormat::Summary, Some(config)) => {
                    println!("Endpoint: {}", config.endpoint_url);
                    println!("Model: {}", config.model_name);
                    println!(
                        "API key: {}",
                        if config.bearer_token().is_some() { "set" } else { "none" }
                    );
                }
                (OutputFormat::Summary, None) => println!("No vision backend configured"),
            }
        }
        VisionAction::Set {
            endpoint_url,
            model_name,
            api_key,
        } => {
            let config = with_key(VisionConfig::new(endpoint_url, model_name), api_key);
            session.set_vision_config(&config).await?;
            println!("Vision backend saved");
        }
        VisionAction::Test {
            endpoint_url,
            model_name,
            api_key,
        } => {
            let config = match endpoint_url {
                Some(url) => with_key(
                    VisionConfig::new(url, model_name.clone().unwrap_or_default()),
                    api_key,
                ),
                None => session
                    .vision_config()
                    .await?
                    .ok_or_else(|| anyhow::anyhow!("no vision backend configured"))?,
            };
            let report = session.test_vision_config(&config).await;
            match args.format {
                OutputFormat::Json => print_json(&report)?,
                OutputFormat::Summary => println!(
                    "{}: {}",
                    if report.ok { "OK" } else { "FAILED" },
                    report.details
                ),
            }
        }
    }
    Ok(())
}

fn with_key(config: VisionConfig, api_key: &Option<String>) -> VisionConfig {
    match api_key {
        Some(key) => config.with_api_key(key),
        None => config,
    }
}

fn redacted(mut config: VisionConfig) -> VisionConfig {
    if config.api_key.is_some() {
        config.api_key = Some("***".to_string());
    }
    config
}
