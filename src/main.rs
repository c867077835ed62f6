//! chatpace - per-platform rate limiter tooling
//!
//! CLI entry point for inspecting budgets and simulating traffic.

use std::collections::HashMap;
use std::fs;
use std::io::{BufRead, BufReader};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clap::{CommandFactory, Parser};
use colored::Colorize;
use eyre::{Context, Result};
use tokio::time::Instant;
use tracing::{info, warn};

use chatpace::cli::{Cli, Command, OutputFormat, get_log_dir, get_log_path};
use chatpace::config::Config;
use chatpace::domain::{Priority, resource};
use chatpace::scheduler::{LimiterConfig, LimiterRegistry, RefillKind};

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    let filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into());

    // Append to the log file so `logs` sees earlier runs; stderr only when it can't be opened
    let log_dir = get_log_dir();
    let log_file = fs::create_dir_all(&log_dir)
        .context("Failed to create log directory")
        .and_then(|_| {
            fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(get_log_path())
                .context("Failed to open log file")
        });

    match log_file {
        Ok(file) => {
            tracing_subscriber::fmt()
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .with_env_filter(filter)
                .init();
        }
        Err(e) => {
            tracing_subscriber::fmt()
                .with_writer(std::io::stderr)
                .with_env_filter(filter)
                .init();
            warn!("Logging to stderr: {:#}", e);
        }
    }

    info!("Logging initialized (verbose: {})", verbose);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    setup_logging(cli.verbose).context("Failed to setup logging")?;

    // Load configuration
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    info!("chatpace loaded config: {} limiters", config.limiters.len());

    // Dispatch command
    match cli.command {
        Some(Command::Limits { format }) => cmd_limits(&config, format),
        Some(Command::CheckConfig) => cmd_check_config(&config),
        Some(Command::Simulate {
            resource,
            jobs,
            priority,
            fail_every,
            no_jitter,
        }) => cmd_simulate(&config, &resource, jobs, priority, fail_every, no_jitter).await,
        Some(Command::Logs { lines }) => cmd_logs(lines),
        None => {
            // Default: print help
            Cli::command().print_help()?;
            println!();
            Ok(())
        }
    }
}

fn describe_refill(budget: &LimiterConfig) -> String {
    match budget.refill {
        RefillKind::Continuous => format!("{}/s", budget.refill_rate),
        RefillKind::Window => format!("full every {}ms", budget.window_ms),
    }
}

/// Show every resource's budget
fn cmd_limits(config: &Config, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&config.limiters)?);
        }
        OutputFormat::Table => print_limits_table(config),
        OutputFormat::Text => {
            println!(
                "{:<12} {:>8}  {:<20} {}",
                "RESOURCE".bold(),
                "CAPACITY".bold(),
                "REFILL".bold(),
                "DELAY".bold()
            );
            for (name, budget) in &config.limiters {
                println!(
                    "{:<12} {:>8}  {:<20} {}-{} ms",
                    name,
                    budget.capacity,
                    describe_refill(budget),
                    budget.min_delay_ms,
                    budget.max_delay_ms
                );
            }
        }
    }
    Ok(())
}

/// Bordered table with a kind column separating chat platforms from APIs
fn print_limits_table(config: &Config) {
    let rows: Vec<[String; 5]> = config
        .limiters
        .iter()
        .map(|(name, budget)| {
            let kind = if resource::is_platform(name) { "platform" } else { "api" };
            [
                name.clone(),
                kind.to_string(),
                budget.capacity.to_string(),
                describe_refill(budget),
                format!("{}-{} ms", budget.min_delay_ms, budget.max_delay_ms),
            ]
        })
        .collect();

    let headers = ["RESOURCE", "KIND", "CAPACITY", "REFILL", "DELAY"];
    let mut widths = headers.map(str::len);
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.len());
        }
    }

    let border = widths
        .iter()
        .map(|w| "-".repeat(w + 2))
        .collect::<Vec<_>>()
        .join("+");
    let line = |cells: &[String]| {
        let padded: Vec<String> = cells
            .iter()
            .zip(widths)
            .map(|(cell, w)| format!(" {:<w$} ", cell, w = w))
            .collect();
        format!("|{}|", padded.join("|"))
    };

    println!("+{}+", border);
    println!("{}", line(&headers.map(String::from)).bold());
    println!("+{}+", border);
    for row in &rows {
        println!("{}", line(row));
    }
    println!("+{}+", border);
}

/// Validate the loaded configuration
fn cmd_check_config(config: &Config) -> Result<()> {
    config.validate()?;
    LimiterRegistry::from_config(config)?;

    println!("{} {} limiters configured", "OK".green().bold(), config.limiters.len());
    for (name, budget) in &config.limiters {
        println!("  {:<12} ~{:.2} jobs/s sustained", name, budget.steady_rate());
    }
    Ok(())
}

/// Run synthetic jobs through one limiter
async fn cmd_simulate(
    config: &Config,
    resource: &str,
    jobs: usize,
    priority: Priority,
    fail_every: Option<usize>,
    no_jitter: bool,
) -> Result<()> {
    let mut config = config.clone();
    if no_jitter {
        if let Some(budget) = config.limiters.get_mut(resource) {
            budget.min_delay_ms = 0;
            budget.max_delay_ms = 0;
        }
    }

    let registry = LimiterRegistry::from_config(&config)?;
    let limiter = registry.get(resource)?;

    println!(
        "Simulating {} jobs on {} (capacity {}, refill {}, priority {})",
        jobs,
        resource.bold(),
        limiter.config().capacity,
        describe_refill(limiter.config()),
        priority
    );
    println!();

    let start = Instant::now();
    let dispatches: Arc<Mutex<HashMap<usize, Duration>>> = Arc::new(Mutex::new(HashMap::new()));

    let handles: Vec<_> = (1..=jobs)
        .map(|n| {
            let dispatches = Arc::clone(&dispatches);
            let fail = fail_every.is_some_and(|k| k > 0 && n % k == 0);
            let handle = limiter.submit(
                move || async move {
                    if let Ok(mut d) = dispatches.lock() {
                        d.insert(n, start.elapsed());
                    }
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    if fail { Err(format!("job {} failed", n)) } else { Ok(n) }
                },
                priority,
            );
            (n, handle)
        })
        .collect();

    let mut failures = 0;
    for (n, handle) in handles {
        let outcome = handle.await;
        let at = dispatches
            .lock()
            .ok()
            .and_then(|d| d.get(&n).copied())
            .map(|o| format!("{:>8.3}s", o.as_secs_f64()))
            .unwrap_or_else(|| format!("{:>9}", "-"));

        match outcome {
            Ok(Ok(_)) => println!("  {} job {:<4} {}", at, n, "ok".green()),
            Ok(Err(e)) => {
                failures += 1;
                println!("  {} job {:<4} {}", at, n, e.red());
            }
            Err(e) => {
                failures += 1;
                println!("  {} job {:<4} {}", at, n, e.to_string().red());
            }
        }
    }

    let stats = limiter.stats();
    println!();
    println!(
        "Dispatched {} in {:.3}s, {} failed, average queue wait {:?}",
        stats.total_dispatched,
        start.elapsed().as_secs_f64(),
        failures,
        stats.average_wait()
    );

    registry.shutdown();
    Ok(())
}

/// Show logs
fn cmd_logs(lines: usize) -> Result<()> {
    let log_path = get_log_path();

    if !log_path.exists() {
        println!("No log file found at: {}", log_path.display());
        return Ok(());
    }

    // Read last N lines
    let file = fs::File::open(&log_path).context("Failed to open log file")?;
    let reader = BufReader::new(file);
    let all_lines: Vec<String> = reader.lines().map_while(Result::ok).collect();

    let start = all_lines.len().saturating_sub(lines);
    for line in &all_lines[start..] {
        println!("{}", line);
    }

    Ok(())
}
