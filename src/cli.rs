//! CLI command definitions and subcommands

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::domain::Priority;

/// chatpace - rate-limited job scheduler for AI chat sync
#[derive(Parser)]
#[command(
    name = "chatpace",
    about = "Inspect and exercise the per-platform rate limiters",
    version = env!("GIT_DESCRIBE"),
    after_help = "Logs are written to: ~/.local/share/chatpace/logs/chatpace.log"
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// CLI subcommands
#[derive(Subcommand)]
pub enum Command {
    /// Show the rate budget of every resource
    Limits {
        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Load and validate the configuration
    CheckConfig,

    /// Push synthetic jobs through a resource's limiter and report dispatch times
    Simulate {
        /// Resource to simulate (chatgpt, claude, gemini, dashboard, ...)
        resource: String,

        /// Number of jobs to submit
        #[arg(short, long, default_value = "5")]
        jobs: usize,

        /// Priority of every job (name or integer)
        #[arg(short, long, default_value = "normal", allow_hyphen_values = true)]
        priority: Priority,

        /// Make every Nth job fail
        #[arg(long)]
        fail_every: Option<usize>,

        /// Skip the humanization delay
        #[arg(long)]
        no_jitter: bool,
    },

    /// Show logs
    Logs {
        /// Number of lines to show
        #[arg(short, long, default_value = "50")]
        lines: usize,
    },
}

/// How `limits` prints the budgets
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// One aligned line per resource
    #[default]
    #[value(alias = "plain")]
    Text,
    /// The budget map as JSON
    Json,
    /// Bordered table, with platforms and APIs told apart
    Table,
}

/// Directory holding the log file
pub fn get_log_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("chatpace")
        .join("logs")
}

/// Path of the log file written by the binary
pub fn get_log_path() -> PathBuf {
    get_log_dir().join("chatpace.log")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_no_command() {
        let cli = Cli::parse_from(["chatpace"]);
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_cli_parse_limits() {
        let cli = Cli::parse_from(["chatpace", "limits", "--format", "json"]);
        assert!(matches!(
            cli.command,
            Some(Command::Limits {
                format: OutputFormat::Json
            })
        ));
    }

    #[test]
    fn test_cli_parse_check_config() {
        let cli = Cli::parse_from(["chatpace", "check-config"]);
        assert!(matches!(cli.command, Some(Command::CheckConfig)));
    }

    #[test]
    fn test_cli_parse_simulate_defaults() {
        let cli = Cli::parse_from(["chatpace", "simulate", "claude"]);
        if let Some(Command::Simulate {
            resource,
            jobs,
            priority,
            fail_every,
            no_jitter,
        }) = cli.command
        {
            assert_eq!(resource, "claude");
            assert_eq!(jobs, 5);
            assert_eq!(priority, Priority::NORMAL);
            assert!(fail_every.is_none());
            assert!(!no_jitter);
        } else {
            panic!("Expected Simulate command");
        }
    }

    #[test]
    fn test_cli_parse_simulate_options() {
        let cli = Cli::parse_from([
            "chatpace",
            "simulate",
            "dashboard",
            "--jobs",
            "12",
            "--priority",
            "-3",
            "--fail-every",
            "4",
            "--no-jitter",
        ]);
        if let Some(Command::Simulate {
            jobs,
            priority,
            fail_every,
            no_jitter,
            ..
        }) = cli.command
        {
            assert_eq!(jobs, 12);
            assert_eq!(priority, Priority(-3));
            assert_eq!(fail_every, Some(4));
            assert!(no_jitter);
        } else {
            panic!("Expected Simulate command");
        }
    }

    #[test]
    fn test_cli_parse_logs() {
        let cli = Cli::parse_from(["chatpace", "logs", "--lines", "10"]);
        assert!(matches!(cli.command, Some(Command::Logs { lines: 10 })));
    }

    #[test]
    fn test_limits_format_values() {
        let cli = Cli::parse_from(["chatpace", "limits"]);
        assert!(matches!(cli.command, Some(Command::Limits { format: OutputFormat::Text })));

        let cli = Cli::parse_from(["chatpace", "limits", "-f", "plain"]);
        assert!(matches!(cli.command, Some(Command::Limits { format: OutputFormat::Text })));

        let cli = Cli::parse_from(["chatpace", "limits", "--format", "table"]);
        assert!(matches!(cli.command, Some(Command::Limits { format: OutputFormat::Table })));

        assert!(Cli::try_parse_from(["chatpace", "limits", "--format", "yaml"]).is_err());
    }

    #[test]
    fn test_cli_with_config() {
        let cli = Cli::parse_from(["chatpace", "-c", "/path/to/config.yml", "limits"]);
        assert_eq!(cli.config, Some(PathBuf::from("/path/to/config.yml")));
    }
}
