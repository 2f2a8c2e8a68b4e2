mod request;
mod server;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use lum_core::levels::{DEFAULT_PERCENTS, DEFAULT_ROOT_STEP, DEFAULT_TURNS};
use lum_core::{
    AnalysisReport, AnalysisStatus, BodyPair, CachedProvider, CancellationToken, CelestialBody, DateRange,
    HarmonicSet, MatchQuery, MeanElementsProvider, PositionProvider, ReferenceFrame, SampleGrid, ScoringWeights,
    Step, analyze, export_json, import_json, join_time_price, joined_csv, next_match_after, parse_instant,
    percent_grid, sqrt_ladder, timing_csv, timing_rows,
};
use lum_store::{LuminaraConfig, PersistentProvider, PositionStore, default_base_dir};
use rmcp::{ServiceExt, transport::stdio};

use crate::request::{Overrides, build_request, load_reactions, load_request, parse_weights};
use crate::server::{DEFAULT_SEARCH_DAYS, DEFAULT_SEARCH_ORB, DEFAULT_SEARCH_STEP, sample_positions};

#[derive(Parser)]
#[command(name = "lum", about = "Harmonic cycle analytics CLI and MCP server")]
struct Cli {
    /// Enable verbose debug output
    #[arg(long, global = true)]
    verbose: bool,

    /// Config file (default: <data dir>/luminara.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Compute every position instead of using the on-disk cache
    #[arg(long, global = true)]
    no_cache: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start MCP server on stdio transport
    Serve,

    /// Detect, cluster and score harmonic events around an anchor date
    Analyze(AnalyzeArgs),

    /// Print a body's positions over a range
    Positions {
        #[arg(long)]
        body: CelestialBody,

        #[arg(long, value_parser = parse_instant)]
        from: DateTime<Utc>,

        #[arg(long, value_parser = parse_instant)]
        to: DateTime<Utc>,

        #[arg(long)]
        step: Option<Step>,

        #[arg(long)]
        frame: Option<ReferenceFrame>,
    },

    /// Find the next exact hit of a separation after an anchor
    Next {
        #[arg(long)]
        pair: BodyPair,

        /// Target separation in degrees
        #[arg(long)]
        target: f64,

        #[arg(long, value_parser = parse_instant)]
        anchor: DateTime<Utc>,

        /// Search window in days
        #[arg(long, default_value_t = DEFAULT_SEARCH_DAYS)]
        days: i64,

        #[arg(long, default_value = DEFAULT_SEARCH_STEP)]
        step: Step,

        #[arg(long, default_value_t = DEFAULT_SEARCH_ORB)]
        orb: f64,

        #[arg(long)]
        frame: Option<ReferenceFrame>,
    },

    /// Project price levels from an anchor price
    Levels {
        #[arg(long)]
        price: f64,

        #[arg(long, value_enum, default_value_t = LevelMethod::Percent)]
        method: LevelMethod,

        /// Comma-separated percent moves
        #[arg(long, value_delimiter = ',')]
        percents: Vec<f64>,

        #[arg(long, default_value_t = DEFAULT_ROOT_STEP)]
        root_step: f64,

        #[arg(long, default_value_t = DEFAULT_TURNS)]
        turns: u32,

        /// Exported report JSON; prints its timing rows crossed with the levels as CSV
        #[arg(long)]
        join: Option<PathBuf>,
    },

    /// Inspect or clear the on-disk position cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Show cached row counts per body
    Stats,
    /// Delete every cached position
    Clear,
}

#[derive(Clone, Copy, ValueEnum)]
enum LevelMethod {
    Percent,
    Sqrt,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// Summary and cluster table
    Text,
    /// Versioned report envelope
    Json,
    /// One row per harmonic event
    Csv,
}

#[derive(Args)]
struct AnalyzeArgs {
    /// Anchor instant: RFC 3339 or YYYY-MM-DD
    #[arg(long, value_parser = parse_instant, required_unless_present = "request")]
    anchor: Option<DateTime<Utc>>,

    /// Asset the anchor belongs to
    #[arg(long)]
    asset: Option<String>,

    /// Body pair such as sun-moon (repeatable)
    #[arg(long = "pair", required_unless_present = "request")]
    pairs: Vec<BodyPair>,

    #[arg(long, value_parser = parse_instant)]
    from: Option<DateTime<Utc>>,

    #[arg(long, value_parser = parse_instant)]
    to: Option<DateTime<Utc>>,

    /// Days before the anchor
    #[arg(long, conflicts_with = "from")]
    before: Option<i64>,

    /// Days after the anchor
    #[arg(long, conflicts_with = "to")]
    after: Option<i64>,

    #[arg(long)]
    step: Option<Step>,

    /// Harmonics such as 4,8 or 2-12
    #[arg(long)]
    harmonics: Option<HarmonicSet>,

    #[arg(long)]
    orb: Option<f64>,

    #[arg(long)]
    frame: Option<ReferenceFrame>,

    /// Cluster time tolerance in steps
    #[arg(long)]
    time_tolerance: Option<u32>,

    /// Cluster angle tolerance in degrees
    #[arg(long)]
    angle_tolerance: Option<f64>,

    /// Scoring weights d,t,s[,r]
    #[arg(long, value_parser = parse_weights)]
    weights: Option<ScoringWeights>,

    /// JSON object of date -> reaction weight
    #[arg(long)]
    reactions: Option<PathBuf>,

    /// Interpolate event instants between samples
    #[arg(long)]
    interpolate: bool,

    /// Order clusters by start instead of strength
    #[arg(long)]
    chronological: bool,

    #[arg(long)]
    concurrency: Option<usize>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Same as --format json
    #[arg(long, conflicts_with = "format")]
    json: bool,

    /// Analysis request JSON; flags override its fields
    #[arg(long)]
    request: Option<PathBuf>,
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let base_dir = default_base_dir();
    let config = load_config(&cli, &base_dir)?;

    match &cli.command {
        Commands::Serve => cmd_serve(&cli, &config, &base_dir).await,
        Commands::Analyze(args) => cmd_analyze(&cli, &config, &base_dir, args),
        Commands::Positions {
            body,
            from,
            to,
            step,
            frame,
        } => {
            let step = step.unwrap_or(config.analysis.step);
            let frame = frame.unwrap_or(config.analysis.frame);
            cmd_positions(&cli, &config, &base_dir, *body, frame, DateRange::new(*from, *to), step)
        }
        Commands::Next {
            pair,
            target,
            anchor,
            days,
            step,
            orb,
            frame,
        } => {
            let window = Duration::try_days(*days).with_context(|| format!("--days {days} is out of range"))?;
            let query = MatchQuery {
                pair: *pair,
                frame: frame.unwrap_or(config.analysis.frame),
                anchor: *anchor,
                target_angle: *target,
                window,
                step: *step,
                orb: *orb,
            };
            cmd_next(&cli, &config, &base_dir, &query)
        }
        Commands::Levels {
            price,
            method,
            percents,
            root_step,
            turns,
            join,
        } => cmd_levels(*price, *method, percents, *root_step, *turns, join.as_deref()),
        Commands::Cache { action } => cmd_cache(&config, &base_dir, action),
    }
}

fn load_config(cli: &Cli, base_dir: &Path) -> Result<LuminaraConfig> {
    match cli.config.as_deref() {
        Some(path) => LuminaraConfig::load(path).with_context(|| format!("failed to load config {}", path.display())),
        None => LuminaraConfig::load_default(Some(base_dir)).context("failed to load config"),
    }
}

fn open_cache(config: &LuminaraConfig, base_dir: &Path) -> Result<PositionStore> {
    let path = config.cache_path(base_dir);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).with_context(|| format!("failed to create {}", parent.display()))?;
    }
    PositionStore::open(&path).with_context(|| format!("failed to open position cache {}", path.display()))
}

/// The analytic provider, behind the on-disk cache unless it is disabled.
fn open_provider(cli: &Cli, config: &LuminaraConfig, base_dir: &Path) -> Result<Box<dyn PositionProvider>> {
    if cli.no_cache || !config.cache.enabled {
        tracing::debug!("position cache disabled");
        return Ok(Box::new(MeanElementsProvider::new()));
    }
    let store = open_cache(config, base_dir)?;
    Ok(Box::new(PersistentProvider::new(MeanElementsProvider::new(), store)))
}

async fn cmd_serve(cli: &Cli, config: &LuminaraConfig, base_dir: &Path) -> Result<()> {
    let provider = CachedProvider::new(open_provider(cli, config, base_dir)?);
    tracing::info!("starting MCP server with provider '{}'", provider.name());

    let server = server::LumServer::new(Arc::new(provider), config.clone());
    let service = match server.clone().serve(stdio()).await {
        Ok(service) => service,
        Err(e) => {
            // stdin closed before the client finished initializing
            tracing::warn!("MCP session ended during initialization: {e}");
            return Ok(());
        }
    };
    service.waiting().await.context("MCP server failed")?;

    server.shutdown();
    Ok(())
}

fn cmd_analyze(cli: &Cli, config: &LuminaraConfig, base_dir: &Path, args: &AnalyzeArgs) -> Result<()> {
    let base = args.request.as_deref().map(load_request).transpose()?;
    let reactions = args.reactions.as_deref().map(load_reactions).transpose()?;
    let overrides = Overrides {
        anchor: args.anchor,
        asset: args.asset.clone(),
        pairs: args.pairs.clone(),
        from: args.from,
        to: args.to,
        days_before: args.before,
        days_after: args.after,
        step: args.step,
        harmonics: args.harmonics.clone(),
        orb: args.orb,
        frame: args.frame,
        time_tolerance_steps: args.time_tolerance,
        angle_tolerance: args.angle_tolerance,
        weights: args.weights,
        reactions,
        interpolate: args.interpolate,
        chronological: args.chronological,
        concurrency: args.concurrency,
    };
    let request = build_request(config, base, overrides)?;

    let provider = open_provider(cli, config, base_dir)?;
    let report = analyze(&request, &*provider, &CancellationToken::new()).context("analysis failed")?;

    let format = if args.json { OutputFormat::Json } else { args.format };
    match format {
        OutputFormat::Text => print_report(&report),
        OutputFormat::Json => println!("{}", export_json(&report).context("failed to serialize report")?),
        OutputFormat::Csv => print!("{}", timing_csv(&timing_rows(&report)).context("failed to write CSV")?),
    }
    Ok(())
}

fn status_label(status: AnalysisStatus) -> &'static str {
    match status {
        AnalysisStatus::Complete => "complete",
        AnalysisStatus::Partial => "partial",
        AnalysisStatus::EmptyRange => "empty range",
    }
}

fn print_report(report: &AnalysisReport) {
    println!(
        "anchor:      {} ({})",
        report.anchor.instant.format("%Y-%m-%d %H:%M"),
        report.anchor.asset_id
    );
    println!("frame:       {}", report.frame);
    println!("samples:     {}", report.samples);
    println!("events:      {}", report.events.len());
    println!("clusters:    {}", report.clusters.len());
    println!("diagnostics: {}", report.diagnostics.len());
    println!("status:      {}", status_label(report.status));

    if report.clusters.is_empty() {
        return;
    }
    println!();
    println!(
        "{:>4}  {:<16}  {:<16}  {:>7}  {:>8}  {:<20}  harmonics",
        "id", "start", "end", "members", "strength", "pairs"
    );
    for scored in &report.clusters {
        let c = &scored.cluster;
        let pairs = c.pairs().iter().map(ToString::to_string).collect::<Vec<_>>().join(",");
        let harmonics = c.harmonics().iter().map(ToString::to_string).collect::<Vec<_>>().join(",");
        println!(
            "{:>4}  {:<16}  {:<16}  {:>7}  {:>8.4}  {:<20}  {}",
            c.id,
            c.start().format("%Y-%m-%d %H:%M"),
            c.end().format("%Y-%m-%d %H:%M"),
            c.member_count,
            scored.score.strength,
            pairs,
            harmonics
        );
    }
}

fn cmd_positions(
    cli: &Cli,
    config: &LuminaraConfig,
    base_dir: &Path,
    body: CelestialBody,
    frame: ReferenceFrame,
    range: DateRange,
    step: Step,
) -> Result<()> {
    anyhow::ensure!(range.is_ordered(), "--from must not be after --to");
    let provider = open_provider(cli, config, base_dir)?;
    let grid = SampleGrid::new(range, step);
    let (positions, unavailable) =
        sample_positions(&*provider, body, frame, &grid).context("failed to compute positions")?;

    for p in &positions {
        println!("{}  {:>10.4}", p.instant.format("%Y-%m-%d %H:%M"), p.angle_degrees);
    }
    if unavailable > 0 {
        eprintln!("{unavailable} instants outside ephemeris coverage");
    }
    Ok(())
}

fn cmd_next(cli: &Cli, config: &LuminaraConfig, base_dir: &Path, query: &MatchQuery) -> Result<()> {
    let provider = open_provider(cli, config, base_dir)?;
    let hit = next_match_after(&*provider, query, &CancellationToken::new()).context("search failed")?;

    match hit {
        Some(hit) => println!(
            "{} {} at {} (separation {:.4}, miss {:.2}')",
            hit.pair,
            hit.target_angle,
            hit.instant.format("%Y-%m-%d %H:%M"),
            hit.separation_degrees,
            hit.miss_arcmin
        ),
        None => println!(
            "no {} {} within {} days",
            query.pair,
            query.target_angle,
            query.window.num_days()
        ),
    }
    Ok(())
}

fn cmd_levels(
    price: f64,
    method: LevelMethod,
    percents: &[f64],
    root_step: f64,
    turns: u32,
    join: Option<&Path>,
) -> Result<()> {
    let levels = match method {
        LevelMethod::Percent if percents.is_empty() => percent_grid(price, &DEFAULT_PERCENTS),
        LevelMethod::Percent => percent_grid(price, percents),
        LevelMethod::Sqrt => sqrt_ladder(price, root_step, turns),
    }
    .context("failed to project levels")?;

    if let Some(path) = join {
        let text = std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
        let report = import_json(&text).with_context(|| format!("invalid report in {}", path.display()))?;
        let joined = join_time_price(&timing_rows(&report), &levels, price);
        print!("{}", joined_csv(&joined).context("failed to write CSV")?);
        return Ok(());
    }

    for level in levels.iter().rev() {
        println!("{:<12}  {:>14.4}  {:>+8.2}%", level.label, level.level, level.delta_pct);
    }
    Ok(())
}

fn cmd_cache(config: &LuminaraConfig, base_dir: &Path, action: &CacheAction) -> Result<()> {
    let store = open_cache(config, base_dir)?;
    match action {
        CacheAction::Stats => {
            let stats = store.stats().context("failed to read cache stats")?;
            let version = store.schema_version().context("failed to read schema version")?;
            println!("path:   {}", config.cache_path(base_dir).display());
            println!("schema: {}", version.map_or_else(|| "unknown".to_string(), |v| v.to_string()));
            println!("total:  {}", stats.total);
            for (body, n) in &stats.by_body {
                println!("  {:<10} {}", body.name(), n);
            }
        }
        CacheAction::Clear => {
            let removed = store.clear().context("failed to clear cache")?;
            println!("removed {removed} cached positions");
        }
    }
    Ok(())
}
