//! dircomp: progressive recursive directory comparison.
//!
//! Thin binary entry point. All logic lives in the `dircomp-core` and
//! `dircomp-view` crates; this drives a view to completion and prints the
//! colour-coded tree.

use anyhow::Context;
use clap::Parser;
use colored::{ColoredString, Colorize};
use dircomp_core::export::Report;
use dircomp_core::{CompareConfig, ComparisonSession};
use dircomp_view::{style_for, DiffViewState, Tone, ViewCommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};

#[derive(Debug, Parser)]
#[command(name = "dircomp")]
#[command(about = "Compare two directory trees", long_about = None)]
struct Cli {
    /// Left-hand directory (or file)
    left: PathBuf,
    /// Right-hand directory (or file)
    right: PathBuf,
    /// Number of worker threads (defaults to the CPU count, max 16)
    #[arg(short, long)]
    workers: Option<usize>,
    /// JSON config file; flags override its values
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Omit identical entries from the listing
    #[arg(long)]
    hide_identical: bool,
    /// Expand every directory, including one-sided ones
    #[arg(long)]
    full: bool,
    /// Write a report; `.json` selects JSON, anything else CSV
    #[arg(long)]
    report: Option<PathBuf>,
    /// Give up (and print partial results) after this many seconds
    #[arg(long)]
    timeout: Option<u64>,
    /// Debug-level logging on stderr
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    // Logs go to stderr so stdout carries only the listing.
    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .with_writer(std::io::stderr)
        .init();

    let mut config = match &cli.config {
        Some(path) => CompareConfig::from_json_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => CompareConfig::default(),
    };
    if let Some(workers) = cli.workers {
        config.worker_count = workers;
    }
    config.hide_identical |= cli.hide_identical;
    config.validate()?;

    let session = ComparisonSession::start(&cli.left, &cli.right, config);
    let mut view = DiffViewState::new(session, usize::MAX);
    let finished = run_to_completion(&mut view, cli.timeout.map(Duration::from_secs));

    if cli.full {
        expand_everything(&mut view);
    } else {
        view.handle(ViewCommand::ExpandAll);
    }

    for row in &view.rows {
        let style = style_for(row.status);
        let name = if row.is_container {
            format!("{}/", row.name)
        } else {
            row.name.to_string()
        };
        let line = format!("{}{} {}", "  ".repeat(row.depth as usize), style.marker, name);
        println!("{}", paint(&line, style.tone));
    }
    println!("{}", view.status_line());

    if let Some(path) = &cli.report {
        Report::from_session(view.session())
            .save(path)
            .with_context(|| format!("writing report {}", path.display()))?;
        tracing::info!("Report written to {}", path.display());
    }

    let differs = view.summary().differences() > 0 || view.summary().errors > 0;
    Ok(if !finished {
        ExitCode::from(2)
    } else if differs {
        ExitCode::from(1)
    } else {
        ExitCode::SUCCESS
    })
}

/// Poll the view like a renderer would until the scan completes. Returns
/// `false` if the timeout hit first (the session is cancelled then).
fn run_to_completion(view: &mut DiffViewState, timeout: Option<Duration>) -> bool {
    let started = Instant::now();
    let mut last_report = Instant::now();
    loop {
        view.poll();
        if view.session().is_complete() {
            view.poll();
            return true;
        }
        if timeout.is_some_and(|t| started.elapsed() >= t) {
            tracing::warn!("Timed out; showing partial results");
            view.handle(ViewCommand::Cancel);
            view.poll();
            return false;
        }
        if last_report.elapsed() >= Duration::from_secs(1) {
            tracing::info!("{}", view.status_line());
            last_report = Instant::now();
        }
        std::thread::sleep(Duration::from_millis(16));
    }
}

/// Expand until no collapsed directory is left. Lists one-sided
/// directories synchronously, which the interactive "expand all" never does.
fn expand_everything(view: &mut DiffViewState) {
    loop {
        let collapsed: Vec<_> = view
            .rows
            .iter()
            .filter(|r| r.is_container && !r.is_expanded)
            .map(|r| r.node)
            .collect();
        if collapsed.is_empty() {
            return;
        }
        let mut progressed = false;
        for node in collapsed {
            progressed |= view.session().expand_index(node);
        }
        if !progressed {
            return;
        }
        view.handle(ViewCommand::ExpandAll);
    }
}

fn paint(line: &str, tone: Tone) -> ColoredString {
    match tone {
        Tone::Muted => line.dimmed(),
        Tone::Left => line.green(),
        Tone::Right => line.cyan(),
        Tone::Changed => line.red(),
        Tone::Contains => line.yellow(),
        Tone::Error => line.bright_red().bold(),
        Tone::Busy => line.normal(),
    }
}
