//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use reelfill_core::checkpoint::CheckpointStore;
use reelfill_core::input::{read_links, read_rating_stats};
use reelfill_core::pipeline::{EnrichReport, ProgressReporter, RunPhase, run_enrichment};
use reelfill_core::resume::build_resume_set;
use reelfill_shared::{AppConfig, PipelineConfig, TmdbSettings, init_config, load_config};
use reelfill_storage::Storage;
use reelfill_tmdb::TmdbClient;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// reelfill: fill a local movie catalog with TMDB detail, resumably.
#[derive(Parser)]
#[command(
    name = "reelfill",
    version,
    about = "Enrich a MovieLens catalog with TMDB detail and cast, resuming from a checkpoint.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run (or resume) an enrichment pass.
    Enrich(EnrichArgs),

    /// Checkpoint maintenance.
    Checkpoint {
        #[command(subcommand)]
        action: CheckpointAction,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Overrides for a single enrichment run. Unset flags fall back to the config file.
#[derive(Args)]
pub(crate) struct EnrichArgs {
    /// Links table (`movieId,imdbId,tmdbId`).
    #[arg(long)]
    links: Option<String>,

    /// Ratings table (`userId,movieId,rating,...`).
    #[arg(long)]
    ratings: Option<String>,

    /// Checkpoint file to resume from and save to.
    #[arg(long)]
    checkpoint: Option<String>,

    /// Where to write ids without a TMDB counterpart (overwritten).
    #[arg(long)]
    missing: Option<String>,

    /// Database receiving the completed records.
    #[arg(long)]
    database: Option<String>,

    /// Number of concurrent workers.
    #[arg(short, long)]
    workers: Option<usize>,

    /// Save the checkpoint every N completions (0 disables periodic saves).
    #[arg(long)]
    save_interval: Option<u64>,

    /// Skip writing completed records to the database.
    #[arg(long)]
    no_store: bool,
}

/// Checkpoint subcommands.
#[derive(Subcommand)]
pub(crate) enum CheckpointAction {
    /// Load the checkpoint and report its size and consistency.
    Inspect {
        /// Checkpoint file (defaults to the configured path).
        #[arg(long)]
        checkpoint: Option<String>,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "reelfill=info",
        1 => "reelfill=debug",
        _ => "reelfill=trace",
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Enrich(args) => cmd_enrich(args).await,
        Command::Checkpoint { action } => match action {
            CheckpointAction::Inspect { checkpoint } => {
                cmd_checkpoint_inspect(checkpoint.as_deref()).await
            }
        },
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

/// Fold CLI overrides into the loaded config.
fn apply_overrides(config: &mut AppConfig, args: &EnrichArgs) {
    let paths = &mut config.paths;
    for (slot, value) in [
        (&mut paths.links_file, &args.links),
        (&mut paths.ratings_file, &args.ratings),
        (&mut paths.checkpoint_file, &args.checkpoint),
        (&mut paths.missing_file, &args.missing),
        (&mut paths.database, &args.database),
    ] {
        if let Some(value) = value {
            *slot = value.clone();
        }
    }
    if let Some(workers) = args.workers {
        config.pipeline.workers = workers;
    }
    if let Some(interval) = args.save_interval {
        config.pipeline.save_interval = interval;
    }
}

async fn cmd_enrich(args: EnrichArgs) -> Result<()> {
    let mut config = load_config()?;
    apply_overrides(&mut config, &args);

    if config.pipeline.workers == 0 {
        return Err(eyre!("--workers must be at least 1"));
    }

    // Validate API key before doing anything
    let settings = TmdbSettings::from_config(&config)?;
    let pipeline = PipelineConfig::from(&config);

    info!(
        links = %config.paths.links_file,
        ratings = %config.paths.ratings_file,
        workers = pipeline.workers,
        "starting enrichment"
    );

    let stats = read_rating_stats(&PathBuf::from(&config.paths.ratings_file))?;
    let links = read_links(&PathBuf::from(&config.paths.links_file))?;

    let storage = if args.no_store {
        None
    } else {
        Some(Storage::open(&PathBuf::from(&config.paths.database)).await?)
    };

    let reporter = CliProgress::new();
    let report = run_enrichment(
        &pipeline,
        links,
        &stats,
        |_| TmdbClient::new(&settings),
        storage.as_ref(),
        &reporter,
    )
    .await?;

    print_summary(&report, &pipeline);
    report.ensure_complete()?;
    Ok(())
}

fn print_summary(report: &EnrichReport, pipeline: &PipelineConfig) {
    println!();
    println!("  Run:        {}", report.run_id);
    println!("  Enriched:   {}", report.enriched);
    println!("  Skipped:    {}", report.skipped);
    println!("  Missing:    {}", report.missing.len());
    if report.duplicate_inputs > 0 {
        println!("  Duplicates: {}", report.duplicate_inputs);
    }
    println!("  Failed:     {}", report.failures.len());
    println!("  Total:      {}", report.records.len());
    println!("  Checkpoint: {}", pipeline.checkpoint_path.display());
    println!("  Time:       {:.1}s", report.elapsed.as_secs_f64());
    for warning in &report.warnings {
        println!("  Warning:    {warning}");
    }
    println!();
    println!(
        "  Note: {} is overwritten on every run; archive it before the next one.",
        pipeline.missing_path.display()
    );
    println!();
}

async fn cmd_checkpoint_inspect(path: Option<&str>) -> Result<()> {
    let config = load_config()?;
    let path = PathBuf::from(path.unwrap_or(&config.paths.checkpoint_file));

    let records = CheckpointStore::new(&path).load().await?;
    let resume = build_resume_set(&records)?;
    let with_cast = records.iter().filter(|r| !r.participants.is_empty()).count();

    println!();
    println!("  Checkpoint: {}", path.display());
    println!("  Records:    {}", resume.len());
    println!("  With cast:  {with_cast}");
    println!();

    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, phase: RunPhase) {
        match phase {
            RunPhase::Failed => self.spinner.finish_and_clear(),
            other => self.spinner.set_message(format!("Phase: {other}")),
        }
    }

    fn item_done(&self, current: u64, total: u64) {
        self.spinner
            .set_message(format!("Enriching [{current}/{total}]"));
    }

    fn done(&self, _report: &EnrichReport) {
        self.spinner.finish_and_clear();
    }
}
