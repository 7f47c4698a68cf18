use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use file_clerk::{
    format_size, unpack_archive, AuditLog, BackupManager, BatchRunner, Config, FileTask,
    LogNotifier, NaiveBayesModel, Orchestrator, Pipeline, Settings, TextModel, Ticker,
    WatchService, WatchState,
};

const TICK_MS: u64 = 80;
const WAIT_POLL_MS: u64 = 250;
const DEFAULT_CONFIG: &str = "config.json";

fn spinner_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template(" {spinner} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_chars("▏▎▍▌▋▊▉█▉▋▌▍▎")
}

#[derive(Parser)]
#[command(name = "file-clerk")]
#[command(version)]
#[command(about = "Classify dropped files into category folders and keep an audit trail")]
struct Cli {
    #[arg(
        short,
        long,
        global = true,
        env = "FILE_CLERK_CONFIG",
        help = "Config file [default: ./config.json if present]"
    )]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Back up, organize and archive a directory once
    Batch {
        #[arg(help = "Directory to organize")]
        dir: PathBuf,
    },
    /// Organize new files as they appear
    Watch {
        #[arg(help = "Directory to watch [default: watch.root from config]")]
        dir: Option<PathBuf>,
        #[arg(
            short,
            long,
            value_parser = clap::value_parser!(u64).range(1..),
            help = "Also run a full batch every SECS seconds"
        )]
        interval: Option<u64>,
    },
    /// Show how a file would be classified
    Classify {
        #[arg(help = "File to classify")]
        file: PathBuf,
    },
    /// Replace a directory with its last backup
    Restore {
        #[arg(help = "Directory to restore")]
        dir: PathBuf,
    },
    /// Print the action log, oldest first
    Log,
    /// Write the default configuration
    InitConfig {
        #[arg(help = "Where to write the config")]
        path: PathBuf,
        #[arg(long, help = "Overwrite an existing file")]
        force: bool,
    },
    /// Extract a category archive
    Unpack {
        #[arg(help = "Archive to extract")]
        archive: PathBuf,
        #[arg(long, help = "Destination directory")]
        into: PathBuf,
    },
    /// Generate shell completions
    Completions {
        #[arg(help = "Shell to generate for (bash, zsh, fish, powershell)")]
        shell: Shell,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::InitConfig { path, force } => return cmd_init_config(path, *force),
        Commands::Completions { shell } => {
            generate(*shell, &mut Cli::command(), "file-clerk", &mut io::stdout());
            return Ok(());
        }
        _ => {}
    }

    let settings = load_settings(cli.config.as_deref())?;
    let _guard = file_clerk::logging::init_logger(settings.log_file.as_deref());
    let settings = Arc::new(settings);

    match cli.command {
        Commands::Batch { dir } => cmd_batch(settings, &dir),
        Commands::Watch { dir, interval } => cmd_watch(settings, dir, interval),
        Commands::Classify { file } => cmd_classify(settings, &file),
        Commands::Restore { dir } => cmd_restore(&dir),
        Commands::Log => cmd_log(&settings),
        Commands::Unpack { archive, into } => cmd_unpack(&archive, &into),
        Commands::InitConfig { .. } | Commands::Completions { .. } => Ok(()),
    }
}

fn load_settings(path: Option<&Path>) -> Result<Settings> {
    let config = match path {
        Some(path) => Config::load(path)?,
        None if Path::new(DEFAULT_CONFIG).exists() => Config::load(Path::new(DEFAULT_CONFIG))?,
        None => Config::default(),
    };
    Ok(config.validate()?)
}

fn load_model(settings: &Settings) -> Option<Arc<dyn TextModel>> {
    let path = settings.model_path.as_ref()?;
    match NaiveBayesModel::load(path) {
        Ok(model) => Some(Arc::new(model)),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "model unavailable, continuing without it");
            None
        }
    }
}

fn build_orchestrator(settings: Arc<Settings>) -> Result<Arc<Orchestrator>> {
    let audit = AuditLog::open(&settings.audit_db)
        .with_context(|| format!("opening audit log {}", settings.audit_db.display()))?;
    let pipeline = Pipeline::new(Arc::clone(&settings), load_model(&settings));

    Ok(Arc::new(Orchestrator::new(
        settings,
        pipeline,
        Arc::new(audit),
        Arc::new(LogNotifier),
    )))
}

fn cmd_batch(settings: Arc<Settings>, dir: &Path) -> Result<()> {
    let orchestrator = build_orchestrator(settings)?;

    let runner = BatchRunner::new(dir, orchestrator);

    let pb = ProgressBar::new_spinner();
    pb.set_style(spinner_style());
    pb.enable_steady_tick(Duration::from_millis(TICK_MS));
    pb.set_message(format!("Organizing {}", runner.source().display()));

    let report = runner.run_now();
    pb.finish_and_clear();
    let report = report?;

    for moved in &report.moved {
        println!(
            "  [+] {} -> {}/{} ({})",
            moved.record.filename,
            moved.record.category,
            moved.record.new_filename,
            moved.classification.decided_by
        );
    }
    for failed in &report.failed {
        println!("  [!] {}: {}", failed.path.display(), failed.error);
    }
    for archive in &report.archived {
        let size = std::fs::metadata(archive).map(|m| m.len()).unwrap_or(0);
        println!("  [z] {} ({})", archive.display(), format_size(size));
    }

    println!("\n{}", report.summary());
    Ok(())
}

fn cmd_watch(settings: Arc<Settings>, dir: Option<PathBuf>, interval: Option<u64>) -> Result<()> {
    let root = dir
        .or_else(|| settings.watch.root.clone())
        .context("no directory given and no watch.root configured")?;
    let interval = interval.or(settings.batch.interval_secs);

    let orchestrator = build_orchestrator(settings)?;
    let service = WatchService::new(&root, Arc::clone(&orchestrator));
    let root = service.root().to_path_buf();
    let handle = service.start()?;

    let batches = interval.map(|secs| {
        let (ticker, triggers) = Ticker::start(Duration::from_secs(secs));
        let runner = BatchRunner::new(&root, Arc::clone(&orchestrator));
        let thread = std::thread::spawn(move || runner.run_on_triggers(triggers));
        (ticker, thread)
    });

    println!("Watching: {}", root.display());
    if let Some(secs) = interval {
        println!("Full batch every {}s", secs);
    }
    println!("\nPress Enter to stop.\n");

    let (enter_tx, enter_rx) = mpsc::channel();
    std::thread::spawn(move || {
        let mut line = String::new();
        let _ = io::stdin().lock().read_line(&mut line);
        let _ = enter_tx.send(());
    });

    // Leave early when either worker has stopped on its own.
    loop {
        match enter_rx.recv_timeout(Duration::from_millis(WAIT_POLL_MS)) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }
        let batch_done = batches
            .as_ref()
            .is_some_and(|(_, thread)| thread.is_finished());
        if handle.state() == WatchState::Stopped || batch_done {
            break;
        }
    }

    let (state, stats) = handle.stop();
    println!(
        "Watch {:?}: {} organized, {} failed",
        state, stats.dispatched, stats.failed
    );

    if let Some((ticker, thread)) = batches {
        ticker.stop();
        match thread.join() {
            Ok(result) => {
                let runs = result.context("scheduled batch aborted")?;
                println!("Batch runs: {}", runs);
            }
            Err(_) => anyhow::bail!("batch thread panicked"),
        }
    }

    if let Some(fault) = stats.fault {
        anyhow::bail!("watch stopped: {fault}");
    }
    Ok(())
}

fn cmd_classify(settings: Arc<Settings>, file: &Path) -> Result<()> {
    if !file.is_file() {
        anyhow::bail!("not a file: {}", file.display());
    }
    let pipeline = Pipeline::new(Arc::clone(&settings), load_model(&settings));
    let task = FileTask::new(file);
    let result = pipeline.classify(&task);

    println!("File: {}", file.display());
    println!("Type: {}", task.kind);
    println!("Category: {}", result.category);
    println!("Recipient: {}", result.recipient);
    println!("Decided by: {}", result.decided_by);
    Ok(())
}

fn cmd_restore(dir: &Path) -> Result<()> {
    let manager = BackupManager::new();
    match manager.restore(dir)? {
        Some(files) => println!(
            "Restored {} files into {} from {}",
            files.len(),
            dir.display(),
            manager.location(dir).display()
        ),
        None => println!("No backup found for {}", dir.display()),
    }
    Ok(())
}

fn cmd_log(settings: &Settings) -> Result<()> {
    let audit = AuditLog::open(&settings.audit_db)?;
    let records = audit.records()?;

    if records.is_empty() {
        println!("No actions recorded.");
        return Ok(());
    }

    println!(
        "{:<20} {:<6} {:<30} {:<14} {:<30} {}",
        "Timestamp", "Action", "File", "Category", "New name", "Recipient"
    );
    for r in &records {
        println!(
            "{:<20} {:<6} {:<30} {:<14} {:<30} {}",
            r.timestamp.format("%Y-%m-%d %H:%M:%S"),
            r.action,
            r.filename,
            r.category,
            r.new_filename,
            r.recipient
        );
    }
    println!("\n{} actions", records.len());
    Ok(())
}

fn cmd_init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
    }
    Config::default().save(path)?;
    println!("Wrote default config to {}", path.display());
    Ok(())
}

fn cmd_unpack(archive: &Path, into: &Path) -> Result<()> {
    unpack_archive(archive, into)?;
    println!("Extracted {} into {}", archive.display(), into.display());
    Ok(())
}
