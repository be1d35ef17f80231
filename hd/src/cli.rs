//! CLI command definitions and subcommands

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::domain::{PersonaKind, SessionStatus};

/// Default number of rounds printed by `hd backoff`
pub const DEFAULT_BACKOFF_ATTEMPTS: u32 = 8;

/// Haunter - escalating reminders until a commitment is resolved
#[derive(Parser)]
#[command(
    name = "hd",
    about = "Operator tools for the haunting & escalation engine",
    version,
    after_help = "Logs are written to: ~/.local/share/haunter/logs/haunter.log"
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true, help = "Log level (overrides config)")]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Subcommand)]
pub enum Command {
    /// Print a persona's follow-up delay schedule
    Backoff {
        /// Persona whose timings to use
        #[arg(short, long, default_value = "commitment")]
        persona: PersonaKind,

        /// Number of escalation rounds to print
        #[arg(short, long, default_value_t = DEFAULT_BACKOFF_ATTEMPTS)]
        attempts: u32,
    },

    /// List stored sessions
    Sessions {
        /// Only show sessions in this status
        #[arg(short, long)]
        status: Option<SessionStatus>,
    },

    /// Show what startup recovery would re-derive
    Recover {
        /// Only print the plan; jobs are re-armed by the host process
        #[arg(long)]
        dry_run: bool,
    },

    /// Classify a reply through the intent router
    Classify {
        /// Reply text
        text: String,

        /// Persona the reply is addressed to
        #[arg(short, long, default_value = "commitment")]
        persona: PersonaKind,

        /// Title of the commitment, for context
        #[arg(short, long, default_value = "")]
        title: String,
    },
}

/// Path of the log file written by `hd`
pub fn get_log_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("haunter")
        .join("logs")
        .join("haunter.log")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_backoff_defaults() {
        let cli = Cli::try_parse_from(["hd", "backoff"]).unwrap();
        match cli.command {
            Command::Backoff { persona, attempts } => {
                assert_eq!(persona, PersonaKind::Commitment);
                assert_eq!(attempts, DEFAULT_BACKOFF_ATTEMPTS);
            }
            _ => panic!("expected backoff"),
        }
    }

    #[test]
    fn test_parse_sessions_status() {
        let cli = Cli::try_parse_from(["hd", "sessions", "--status", "in-progress"]).unwrap();
        match cli.command {
            Command::Sessions { status } => assert_eq!(status, Some(SessionStatus::InProgress)),
            _ => panic!("expected sessions"),
        }
    }

    #[test]
    fn test_unknown_persona_rejected() {
        assert!(Cli::try_parse_from(["hd", "backoff", "--persona", "ghost"]).is_err());
    }

    #[test]
    fn test_global_flags() {
        let cli = Cli::try_parse_from(["hd", "recover", "--dry-run", "--log-level", "debug"]).unwrap();
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        assert!(matches!(cli.command, Command::Recover { dry_run: true }));
    }
}
