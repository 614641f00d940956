//! CLI interface for Forge
//!
//! Defines the commands and global flags using clap's derive API.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Forge project builder
///
/// Generates requirements, design, code, tests, deployment files and docs
/// for a project described in one prompt. Works offline: when no provider
/// credential is configured every artifact comes from built-in templates.
#[derive(Parser, Debug)]
#[command(name = "forge")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log: Option<String>,

    /// Specify alternate configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the full pipeline for a prompt
    Build {
        /// What to build
        prompt: String,

        /// Never route to paid providers
        #[arg(long)]
        free_only: bool,

        /// Only route to these providers (repeatable)
        #[arg(long = "provider", value_name = "NAME")]
        providers: Vec<String>,

        /// Run as a background job and poll it until it finishes
        #[arg(long)]
        detach_poll: bool,
    },

    /// Answer a prompt with a single routed call
    Dispatch {
        /// The prompt to answer
        prompt: String,

        /// Never route to paid providers
        #[arg(long)]
        free_only: bool,
    },

    /// Show configured providers and their availability
    Providers,

    /// Show the report of a finished run
    Report {
        /// Run directory containing run_report.json
        run_dir: PathBuf,
    },

    /// Show job history
    History {
        /// Number of jobs to show (default: 10)
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::parse_from(["forge", "providers"]);
        assert!(matches!(cli.command, Command::Providers));
        assert!(!cli.json);
        assert!(cli.log.is_none());
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_global_flags() {
        let cli = Cli::parse_from(["forge", "--json", "--log", "debug", "providers"]);
        assert!(cli.json);
        assert_eq!(cli.log, Some("debug".to_string()));
    }

    #[test]
    fn test_build_command() {
        let cli = Cli::parse_from([
            "forge",
            "build",
            "build a todo app",
            "--free-only",
            "--provider",
            "groq",
            "--provider",
            "ollama",
        ]);
        if let Command::Build {
            prompt,
            free_only,
            providers,
            detach_poll,
        } = cli.command
        {
            assert_eq!(prompt, "build a todo app");
            assert!(free_only);
            assert_eq!(providers, vec!["groq", "ollama"]);
            assert!(!detach_poll);
        } else {
            panic!("Expected Build command");
        }
    }

    #[test]
    fn test_report_command() {
        let cli = Cli::parse_from(["forge", "report", "runs/20240101-000000-todo"]);
        if let Command::Report { run_dir } = cli.command {
            assert_eq!(run_dir, PathBuf::from("runs/20240101-000000-todo"));
        } else {
            panic!("Expected Report command");
        }
    }

    #[test]
    fn test_history_command() {
        let cli = Cli::parse_from(["forge", "history", "--limit", "20"]);
        if let Command::History { limit } = cli.command {
            assert_eq!(limit, 20);
        } else {
            panic!("Expected History command");
        }
    }
}
