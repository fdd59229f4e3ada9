use anyhow::{bail, Context, Result};
use clap::Parser;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use treemirror::config::Config;
use treemirror::schedule::{spawn_quit_listener, Scheduler};
use treemirror::sync::{LogSink, PassReport, Reconciler};

/// One-way mirroring of a source directory tree onto a replica.
#[derive(Parser, Debug)]
#[command(name = "treemirror", version)]
struct Cli {
    /// Source directory (ground truth)
    source: Option<PathBuf>,

    /// Replica directory kept in conformance with the source
    replica: Option<PathBuf>,

    /// Seconds between synchronization cycles
    #[arg(short, long)]
    interval: Option<u64>,

    /// Change log file (appended to)
    #[arg(short, long)]
    log: Option<PathBuf>,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Worker threads (0 = one per CPU)
    #[arg(short, long)]
    workers: Option<usize>,

    /// Compare digests of every file, not only those with newer timestamps
    #[arg(long)]
    strict: bool,

    /// Keep replica entries whose name matches this glob (repeatable)
    #[arg(long = "protect", value_name = "GLOB")]
    protect: Vec<String>,

    /// Do not echo change lines to the console
    #[arg(short, long)]
    quiet: bool,

    /// Run one cycle and exit
    #[arg(long)]
    once: bool,

    /// Print each cycle's report as JSON
    #[arg(long)]
    json: bool,

    /// Debug-level diagnostics
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    /// Layer explicit flags over the loaded configuration.
    fn apply(&self, config: &mut Config) {
        if let Some(source) = &self.source {
            config.source = source.clone();
        }
        if let Some(replica) = &self.replica {
            config.replica = replica.clone();
        }
        if let Some(interval) = self.interval {
            config.interval_secs = interval;
        }
        if let Some(log) = &self.log {
            config.log_file = log.clone();
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if self.strict {
            config.strict = true;
        }
        if self.quiet {
            config.console = false;
        }
        config.protect.extend(self.protect.iter().cloned());
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = load_config(&cli)?;
    cli.apply(&mut config);

    let config = if config.has_trees() {
        config.validate(cli.once)?;
        config
    } else {
        prompt_for_config(config, cli.once)?
    };

    let sink = Arc::new(LogSink::open(&config.log_file, config.console)?);
    let reconciler = Reconciler::new(config.reconcile_config()?, sink.clone())?;

    tracing::info!(
        source = %config.source.display(),
        replica = %config.replica.display(),
        log = %sink.path().display(),
        workers = reconciler.workers(),
        strict = config.strict,
        "starting mirror"
    );

    let scheduler = Scheduler::new(config.interval());
    let json = cli.json;
    let report_cycle = |report: &PassReport| print_report(report, json);

    if cli.once {
        let report = scheduler.run_cycle(&reconciler, &*sink, &config.source, &config.replica);
        report_cycle(&report);
    } else {
        spawn_quit_listener(scheduler.stop_handle())
            .context("Failed to start quit listener")?;
        println!("Type QUIT to exit program.");
        scheduler.run(
            &reconciler,
            &*sink,
            &config.source,
            &config.replica,
            report_cycle,
        );
    }

    sink.flush();
    Ok(())
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "treemirror=debug"
    } else {
        "treemirror=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

/// Explicit `--config`, else the per-user file if present, else defaults.
fn load_config(cli: &Cli) -> Result<Config> {
    if let Some(path) = &cli.config {
        return Config::load(path);
    }

    match Config::default_path() {
        Some(path) if path.is_file() => {
            tracing::debug!(path = %path.display(), "using per-user config");
            Config::load(&path)
        }
        _ => Ok(Config::default()),
    }
}

/// Ask for `source;replica;interval;logfile` until the answer validates.
fn prompt_for_config(base: Config, once: bool) -> Result<Config> {
    let stdin = io::stdin();
    let mut input = stdin.lock();

    loop {
        println!(
            "Enter original directory, replica directory, synchronization interval (in seconds) \
             and log file path separated by \";\":"
        );
        io::stdout().flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            bail!("No configuration given");
        }

        let parsed: Config = match line.parse() {
            Ok(parsed) => parsed,
            Err(e) => {
                eprintln!("Error: {}", e);
                continue;
            }
        };

        let config = Config {
            source: parsed.source,
            replica: parsed.replica,
            interval_secs: parsed.interval_secs,
            log_file: parsed.log_file,
            ..base.clone()
        };

        match config.validate(once) {
            Ok(()) => return Ok(config),
            Err(e) => eprintln!("Error: {}", e),
        }
    }
}

fn print_report(report: &PassReport, json: bool) {
    if json {
        match serde_json::to_string(report) {
            Ok(line) => println!("{}", line),
            Err(e) => tracing::warn!(error = %e, "failed to serialize report"),
        }
        return;
    }

    println!(
        "{} created, {} updated, {} deleted, {} folders deleted, {} copied, {} errors in {} ms",
        report.files_created,
        report.files_updated,
        report.files_deleted,
        report.dirs_deleted,
        humansize::format_size(report.bytes_copied, humansize::DECIMAL),
        report.failures.len(),
        report.duration.as_millis()
    );
}
