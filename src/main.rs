use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use refurb_pricer::config::Config;
use refurb_pricer::csv_io::{input_template, read_devices, write_results};
use refurb_pricer::model::VelocityCategory;
use refurb_pricer::explain::inr;
use refurb_pricer::runs::{apply_review, create_run, submit_feedback, ReviewDecision};
use refurb_pricer::stats::analytics;
use refurb_pricer::store::{SqliteStore, Store};
use refurb_pricer::{Engine, MarketTable};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "refurb-pricer", version, about = "Refurbished smartphone pricing and velocity")]
struct Cli {
    /// TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database for runs and the knowledge base
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// JSON market reference table replacing the built-in one
    #[arg(long, global = true)]
    market_data: Option<PathBuf>,

    /// Seed for velocity-day jitter
    #[arg(long, global = true)]
    seed: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the CSV input template
    Template,
    /// Price the devices in a CSV file and save the run
    Price {
        input: PathBuf,
        #[arg(long)]
        name: Option<String>,
    },
    /// List saved runs, newest first
    Runs,
    /// Print one run as JSON
    Show { run_id: String },
    /// Export a run's results as CSV
    Export {
        run_id: String,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Record a reviewer decision for one device
    Review {
        run_id: String,
        device_id: String,
        #[arg(long)]
        approve: Option<u32>,
        #[arg(long)]
        velocity: Option<VelocityCategory>,
        #[arg(long)]
        note: Option<String>,
        #[arg(long, conflicts_with = "reject")]
        accept: bool,
        #[arg(long)]
        reject: bool,
    },
    /// Push a run's reviewed results into the knowledge base
    Submit { run_id: String },
    /// Show knowledge-base patterns
    Patterns,
    /// List knowledge-base entries and reviewer notes
    Kb,
    /// Summarise all runs and reviews
    Analytics,
    /// Delete a run
    Delete { run_id: String },
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_run(store: &dyn Store, run_id: &str) -> anyhow::Result<refurb_pricer::model::Run> {
    store
        .get_run(run_id)?
        .with_context(|| format!("run '{}' not found", run_id))
}

fn open_store(config: &Config) -> anyhow::Result<SqliteStore> {
    SqliteStore::open(&config.database_path)
        .with_context(|| format!("opening database {}", config.database_path.display()))
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref()).context("loading configuration")?;
    if let Some(db) = cli.db {
        config.database_path = db;
    }
    if let Some(path) = cli.market_data {
        config.market_data_path = Some(path);
    }
    if cli.seed.is_some() {
        config.seed = cli.seed;
    }
    config.validate()?;

    init_logging(&config.log_level);
    tracing::debug!(?config, "configuration resolved");

    match cli.command {
        Command::Template => print!("{}", input_template()?),
        Command::Price { input, name } => {
            let store = open_store(&config)?;
            let market_owned;
            let market: &MarketTable = match &config.market_data_path {
                Some(path) => {
                    market_owned = MarketTable::from_json_file(path)
                        .with_context(|| format!("loading market data {}", path.display()))?;
                    &market_owned
                }
                None => MarketTable::builtin(),
            };

            let file = std::fs::File::open(&input)
                .with_context(|| format!("opening {}", input.display()))?;
            let devices = read_devices(file, config.max_devices_per_run)?;

            let seed = config.seed.unwrap_or_else(rand::random);
            let engine = Engine::new(market);
            let run = create_run(&store, &engine, name, devices, seed)?;

            println!("run {} ({})", run.id, run.name);
            for (device, result) in run.devices.iter().zip(&run.results) {
                println!(
                    "  {:<36} {:<8} {:<16} {:>8} [{}-{}] conf {:>3}  {:<6} ~{}d  flags {}",
                    device.id,
                    device.brand,
                    device.model,
                    result.recommended_price,
                    result.price_low,
                    result.price_high,
                    result.confidence_score,
                    result.velocity_category,
                    result.velocity_days_estimate,
                    result.risk_flags.len(),
                );
            }
        }
        Command::Runs => {
            let store = open_store(&config)?;
            for run in store.list_runs()? {
                println!(
                    "{}  {:<24} {:<10} {:>2} devices  {}{}",
                    run.id,
                    run.name,
                    run.status.as_str(),
                    run.devices.len(),
                    run.created_at.format("%Y-%m-%d %H:%M"),
                    if run.feedback_submitted { "  feedback submitted" } else { "" },
                );
            }
        }
        Command::Show { run_id } => {
            let store = open_store(&config)?;
            let run = load_run(&store, &run_id)?;
            println!("{}", serde_json::to_string_pretty(&run)?);
        }
        Command::Export { run_id, out } => {
            let store = open_store(&config)?;
            let run = load_run(&store, &run_id)?;
            match out {
                Some(path) => {
                    let file = std::fs::File::create(&path)
                        .with_context(|| format!("creating {}", path.display()))?;
                    write_results(&run, file)?;
                }
                None => write_results(&run, std::io::stdout().lock())?,
            }
        }
        Command::Review { run_id, device_id, approve, velocity, note, accept, reject } => {
            let store = open_store(&config)?;
            let mut run = load_run(&store, &run_id)?;
            let accepted = match (accept, reject) {
                (true, _) => Some(true),
                (_, true) => Some(false),
                _ => None,
            };
            if approve.is_none() && velocity.is_none() && note.is_none() && accepted.is_none() {
                bail!("nothing to record: pass --approve, --velocity, --note, --accept or --reject");
            }
            apply_review(
                &mut run,
                &device_id,
                ReviewDecision { approved_price: approve, velocity_override: velocity, note, accepted },
            )?;
            store.save_run(&run)?;
            println!("recorded review for device {}", device_id);
        }
        Command::Submit { run_id } => {
            let store = open_store(&config)?;
            let mut run = load_run(&store, &run_id)?;
            let n = submit_feedback(&store, &mut run)?;
            println!("added {} knowledge base entries from run {}", n, run.id);
        }
        Command::Patterns => {
            let store = open_store(&config)?;
            for p in store.kb_patterns()? {
                println!("{:<40} {:>+7} x{:<3} {}", p.key, p.avg_delta, p.occurrences, p.insight);
            }
        }
        Command::Kb => {
            let store = open_store(&config)?;
            let entries = store.kb_entries()?;
            for e in &entries {
                let velocity = match e.human_velocity_override {
                    Some(v) if v != e.velocity_category => format!("{} (overrode {})", v, e.velocity_category),
                    _ => e.velocity_category.to_string(),
                };
                println!(
                    "{}  {:<8} {:<16} {:<9} {:>9} -> {:>9} {:>+7}  {:<24} {}",
                    e.created_at.format("%d %b %Y"),
                    e.brand,
                    e.model,
                    e.condition_tier.to_string(),
                    inr(e.recommended_price as u64),
                    inr(e.human_approved_price as u64),
                    e.delta,
                    velocity,
                    e.feedback_note.as_deref().unwrap_or(""),
                );
            }
            println!("{} entries", entries.len());
        }
        Command::Analytics => {
            let store = open_store(&config)?;
            let a = analytics(&store.list_runs()?, &store.kb_entries()?);
            println!("runs                  {}", a.total_runs);
            println!("devices               {}", a.total_devices);
            println!("avg recommended       {}", inr(a.avg_recommended_price as u64));
            println!("avg confidence        {}%", a.avg_confidence);
            println!("kb entries            {}", a.kb_entries);
            println!("acceptance rate       {}%", a.acceptance_rate);
            println!("avg reviewer delta    {:+}", a.avg_kb_delta);
            for (category, n) in &a.velocity_distribution {
                println!("velocity {:<12} {}", category.to_string(), n);
            }
            for (tier, n) in &a.condition_distribution {
                println!("condition {:<11} {}", tier, n);
            }
            for b in &a.brands {
                println!(
                    "brand {:<15} {:>3} devices  avg {:>9}  conf {:>3}%  fast {}",
                    b.brand,
                    b.count,
                    inr(b.avg_price as u64),
                    b.avg_confidence,
                    b.fast_count,
                );
            }
        }
        Command::Delete { run_id } => {
            let store = open_store(&config)?;
            if !store.delete_run(&run_id)? {
                bail!("run '{}' not found", run_id);
            }
            println!("deleted run {}", run_id);
        }
    }

    Ok(())
}
