use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::error;

use ledger_recon::{
    run_cycle, Config, CycleOptions, CycleOutcome, LedgerStore, ReconciliationMode, RunJournal,
};

/// Where the full error chain goes when a command fails
const CRASH_LOG: &str = "debug_log.txt";

#[derive(Parser)]
#[command(name = "ledger-recon")]
#[command(about = "Incremental keyed-record ledger reconciliation")]
#[command(version)]
#[command(subcommand_required = false)]
struct Cli {
    /// Configuration file
    #[arg(long, short = 'c', env = "LEDGER_RECON_CONFIG", default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run one reconciliation cycle (default)
    Run {
        /// Directory holding the source exports and the ledger
        #[arg(long, default_value = ".")]
        dir: PathBuf,

        /// Reconcile and report without writing the ledger, backup or journal
        #[arg(long)]
        dry_run: bool,

        /// Print the outcome as JSON
        #[arg(long)]
        json: bool,
    },

    /// Create a header-only ledger when none exists
    Init {
        #[arg(long, default_value = ".")]
        dir: PathBuf,
    },

    /// Show recent runs from the journal
    History {
        #[arg(long, default_value = ".")]
        dir: PathBuf,

        #[arg(long, short = 'n', default_value_t = 10)]
        limit: usize,
    },
}

fn main() {
    init_tracing();
    let cli = Cli::parse();

    if let Err(err) = run(cli) {
        error!(error = %err, "command failed");
        eprintln!("❌ {:#}", err);
        if let Err(log_err) = fs::write(CRASH_LOG, format!("{:?}\n", err)) {
            eprintln!("   (could not write {}: {})", CRASH_LOG, log_err);
        } else {
            eprintln!("   Details written to {}", CRASH_LOG);
        }
        std::process::exit(1);
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    let config = Config::from_file(&cli.config)
        .with_context(|| format!("Failed to load config {}", cli.config.display()))?;

    match cli.command.unwrap_or(Command::Run {
        dir: PathBuf::from("."),
        dry_run: false,
        json: false,
    }) {
        Command::Run { dir, dry_run, json } => run_reconcile(&config, dir, dry_run, json),
        Command::Init { dir } => run_init(&config, &dir),
        Command::History { dir, limit } => run_history(&config, &dir, limit),
    }
}

fn run_reconcile(config: &Config, dir: PathBuf, dry_run: bool, json: bool) -> Result<()> {
    let options = CycleOptions { dir, dry_run };

    if json {
        let outcome = run_cycle(config, &options)?;
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }

    println!("📒 Ledger Reconciliation");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("\n📂 Scanning {} for '{}'...", options.dir.display(), config.source.filename_contains);

    let outcome = run_cycle(config, &options)?;
    print_outcome(&outcome);
    Ok(())
}

fn print_outcome(outcome: &CycleOutcome) {
    for source in &outcome.sources {
        println!(
            "✓ {} ({} rows, {} kept)",
            source.path.display(),
            source.rows_read,
            source.rows_kept
        );
    }

    let report = &outcome.report;
    match report.mode {
        ReconciliationMode::FirstRun => println!("\n🆕 First run: ledger built from this batch"),
        ReconciliationMode::Incremental => println!("\n🔄 Incremental run: merged into existing ledger"),
    }
    println!("✓ Raw rows: {}", report.raw_records);
    println!(
        "✓ Identifiers: {} ({} repeated)",
        report.distinct_identifiers, report.repeated_identifiers
    );
    println!("✓ Known: {}", report.known);
    println!("✓ New: {}", report.inserted);
    println!("✓ Ledger: {} → {}", report.ledger_before, report.ledger_after);

    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    if outcome.dry_run {
        println!("🔍 Dry run: nothing written");
        return;
    }
    if let Some(backup) = &outcome.backup {
        println!("💾 Backup: {}", backup.display());
    }
    println!("✅ Ledger written: {}", outcome.ledger_path.display());
    if let Some(run_id) = &outcome.run_id {
        println!("📜 Run {} journaled", run_id);
    }
    println!("⏱️  {} ms", outcome.elapsed_ms);
}

fn run_init(config: &Config, dir: &Path) -> Result<()> {
    let store = LedgerStore::new(config, dir);
    if store.init()? {
        println!("✅ Created {}", store.path().display());
    } else {
        println!("✓ {} already exists, left untouched", store.path().display());
    }
    Ok(())
}

fn run_history(config: &Config, dir: &Path, limit: usize) -> Result<()> {
    let journal = config
        .journal
        .as_ref()
        .context("No [journal] section in config")?;
    let path = journal.resolve_path(dir);
    if !path.exists() {
        println!("📜 No runs journaled yet ({})", path.display());
        return Ok(());
    }

    let entries = RunJournal::open(&path)?.recent(limit)?;
    println!("📜 Last {} runs", entries.len());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    for entry in entries {
        println!("{}", entry.summary());
        if let Some(backup) = &entry.backup {
            println!("   💾 {}", backup);
        }
    }
    Ok(())
}
