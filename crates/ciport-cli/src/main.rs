//! ciport CLI - CI pipeline migration through a generate-validate-repair loop
//!
//! Usage:
//!   ciport convert <source>     Convert a pipeline definition
//!   ciport init                 Write a default .ciport/config.toml
//!   ciport cache list           Show cached documentation summaries
//!   ciport cache clear          Delete the documentation cache
//!   ciport normalize <file>     Apply deterministic cleanup only

use anyhow::{Context, Result};
use ciport_agent::{client_from_config, LlmClient};
use ciport_core::config::{Provider, CONFIG_DIR};
use ciport_core::fail_open::fail_open;
use ciport_core::{
    CiportConfig, FanoutSink, MemorySink, RunContext, RunEvent, RunStatus, TracingSink,
};
use ciport_orchestrator::{normalize, DocCache, HttpDocFetcher, LoopSettings, RepairLoop, RunReport};
use ciport_validation::ActionlintValidator;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "ciport")]
#[command(author, version, about = "Migrate CI pipelines with an LLM repair loop")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Write DEBUG-level logs to this file instead of stderr
    #[arg(long, global = true, value_name = "FILE")]
    debug_log: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert a pipeline definition into the target dialect
    Convert(ConvertArgs),

    /// Write a default .ciport/config.toml
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },

    /// Inspect the persisted documentation cache
    Cache {
        #[command(subcommand)]
        action: CacheCommands,
    },

    /// Apply deterministic normalization to a file and print the result
    Normalize {
        /// Candidate file
        file: PathBuf,
    },
}

#[derive(Args)]
struct ConvertArgs {
    /// Source pipeline definition
    source: PathBuf,

    /// Maximum number of attempts
    #[arg(short = 'n', long)]
    max_attempts: Option<usize>,

    /// LLM provider (anthropic, openrouter)
    #[arg(long)]
    provider: Option<Provider>,

    /// Model name (opus/sonnet/haiku for anthropic, model id for openrouter)
    #[arg(short, long)]
    model: Option<String>,

    /// Judge semantic equivalence once a candidate validates
    #[arg(long)]
    quality_check: bool,

    /// Keep repairing when the quality check rejects a valid candidate
    #[arg(long)]
    thorough: bool,

    /// Directory for attempt files, the final result and the activity log
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Neither read nor update the documentation cache
    #[arg(long)]
    no_doc_cache: bool,

    /// Write the run report and its event timeline as JSON
    #[arg(long, value_name = "FILE")]
    report: Option<PathBuf>,
}

#[derive(Subcommand)]
enum CacheCommands {
    /// List cached summaries
    List,
    /// Delete the cache file
    Clear,
}

fn init_logging(verbose: bool, debug_log: Option<&Path>) -> Result<()> {
    match debug_log {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create debug log {}", path.display()))?;
            let subscriber = FmtSubscriber::builder()
                .with_max_level(Level::DEBUG)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
        None => {
            let level = if verbose { Level::DEBUG } else { Level::INFO };
            let subscriber = FmtSubscriber::builder()
                .with_max_level(level)
                .with_target(false)
                .with_writer(std::io::stderr)
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.debug_log.as_deref())?;

    let root = std::env::current_dir().context("Failed to resolve working directory")?;

    match cli.command {
        Commands::Convert(args) => {
            let code = cmd_convert(&root, args).await?;
            if code != 0 {
                std::io::stdout().flush()?;
                std::process::exit(code);
            }
            Ok(())
        }
        Commands::Init { force } => cmd_init(&root, force),
        Commands::Cache { action } => cmd_cache(&root, action).await,
        Commands::Normalize { file } => cmd_normalize(&file).await,
    }
}

fn load_config(root: &Path) -> Result<CiportConfig> {
    CiportConfig::load_or_default(root)
        .with_context(|| format!("Failed to load {}/config.toml", CONFIG_DIR))
}

async fn cmd_convert(root: &Path, args: ConvertArgs) -> Result<i32> {
    let mut config = load_config(root)?;

    // Flags override the config file
    if let Some(max_attempts) = args.max_attempts {
        config.run.max_attempts = max_attempts;
    }
    if let Some(provider) = args.provider {
        config.models.provider = provider;
    }
    if let Some(model) = args.model {
        config.models.default = model;
    }
    config.run.quality_gate |= args.quality_check;
    config.run.thorough |= args.thorough;
    if let Some(dir) = args.output_dir {
        config.output.dir = dir;
    }

    let input = tokio::fs::read_to_string(&args.source)
        .await
        .with_context(|| format!("Failed to read {}", args.source.display()))?;

    let llm = client_from_config(&config.models).context("Failed to configure LLM client")?;
    let validator = ActionlintValidator::from_settings(&config.validator);
    let fetcher = HttpDocFetcher::from_settings(&config.docs)?;

    let cache_path = root.join(&config.docs.cache_file);
    let cache = if args.no_doc_cache {
        DocCache::new()
    } else {
        fail_open("doc_cache::load", || DocCache::load(&cache_path))
            .await
            .unwrap_or_default()
    };

    let settings = LoopSettings::from_config(&config);
    let output_dir = root.join(&config.output.dir);

    println!("Converting {}", args.source.display());
    println!("  {} -> {}", settings.dialects.source, settings.dialects.target);
    println!("  Model: {}", llm.describe());
    println!("  Validator: {}", config.validator.command);
    println!("  Max attempts: {}", settings.max_attempts);
    println!(
        "  Quality gate: {}",
        match (settings.quality_gate, settings.thorough) {
            (_, true) => "thorough",
            (true, false) => "on",
            (false, false) => "off",
        }
    );
    if !cache.is_empty() {
        println!("  Cached doc summaries: {}", cache.len());
    }
    println!();

    let mut repair = RepairLoop::new(llm, validator, fetcher, settings)
        .with_cache(cache)
        .with_output_dir(output_dir)
        .with_source_name(args.source.display().to_string());

    let timeline = Arc::new(MemorySink::new());
    let sink = FanoutSink::new()
        .with(Arc::new(TracingSink))
        .with(timeline.clone());
    let ctx = RunContext::new(Arc::new(sink));
    let result = repair.run(&ctx, &input).await;

    // Saved before a fatal error is propagated
    if !args.no_doc_cache {
        fail_open("doc_cache::save", || repair.cache().save(&cache_path)).await;
    }

    let report = result.context("Conversion aborted")?;
    print_report(&report);

    if let Some(path) = args.report {
        let record = RunRecord {
            report: &report,
            events: timeline.events(),
        };
        let json = serde_json::to_string_pretty(&record)?;
        tokio::fs::write(&path, json)
            .await
            .with_context(|| format!("Failed to write report {}", path.display()))?;
        info!("Report written to {}", path.display());
    }

    Ok(report.exit_code())
}

/// Contents of the `--report` file
#[derive(Serialize)]
struct RunRecord<'a> {
    report: &'a RunReport,
    events: Vec<RunEvent>,
}

fn print_report(report: &RunReport) {
    println!();
    match report.status {
        RunStatus::Done => println!("Conversion complete ({})", report.status),
        RunStatus::Exhausted => println!("Conversion stopped ({})", report.status),
    }
    println!("  Run: {}", report.run_id);
    println!("  Attempts: {}", report.attempts.len());
    println!("  Cost: ${:.4}", report.total_cost_usd);

    if let Some(verdict) = &report.quality {
        println!(
            "  Quality: {}",
            if verdict.passed { "approved" } else { "not approved" }
        );
    }

    if report.validation_passed {
        if let Some(path) = &report.final_path {
            println!("  Result: {}", path.display());
        } else if let Some(candidate) = &report.final_candidate {
            println!();
            print!("{}", candidate);
        }
    } else {
        println!();
        print!("{}", report.failure_summary());
    }
}

fn cmd_init(root: &Path, force: bool) -> Result<()> {
    let path = root.join(CONFIG_DIR).join("config.toml");
    if path.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
    }

    let written = CiportConfig::write_default(root)?;
    println!("Wrote {}", written.display());
    Ok(())
}

async fn cmd_cache(root: &Path, action: CacheCommands) -> Result<()> {
    let config = load_config(root)?;
    let cache_path = root.join(&config.docs.cache_file);

    match action {
        CacheCommands::List => {
            let cache = DocCache::load(&cache_path)
                .await
                .with_context(|| format!("Failed to read {}", cache_path.display()))?;

            if cache.is_empty() {
                println!("Documentation cache is empty");
                return Ok(());
            }

            println!("{} cached summaries in {}:", cache.len(), cache_path.display());
            for entry in cache.entries() {
                println!();
                println!("  {}", entry.message);
                println!("    {}", entry.url);
                if let Some(first) = entry.summary.lines().find(|l| !l.trim().is_empty()) {
                    println!("    {}", first.trim());
                }
            }
        }

        CacheCommands::Clear => {
            if cache_path.exists() {
                tokio::fs::remove_file(&cache_path).await?;
                println!("Removed {}", cache_path.display());
            } else {
                println!("No cache at {}", cache_path.display());
            }
        }
    }

    Ok(())
}

async fn cmd_normalize(file: &Path) -> Result<()> {
    let text = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    print!("{}", normalize(&text));
    Ok(())
}
