//! Command-line interface for ridelog.
//!
//! This module provides the CLI structure for the `ridelog` binary.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{ConfigCommand, ModeArg, OutputFormat, RecordCommand, SessionsCommand};

/// ridelog - Record ride telemetry
///
/// Replays a sensor trace through the telemetry sampler, raising hazard
/// alerts as it goes, and keeps the recorded sessions in a local database.
#[derive(Debug, Parser)]
#[command(name = "ridelog")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Replay a sensor trace and record the session
    Record(RecordCommand),

    /// Manage saved sessions
    #[command(subcommand)]
    Sessions(SessionsCommand),

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> crate::logging::Verbosity {
        if self.quiet {
            crate::logging::Verbosity::Quiet
        } else {
            match self.verbose {
                0 => crate::logging::Verbosity::Normal,
                1 => crate::logging::Verbosity::Verbose,
                _ => crate::logging::Verbosity::Trace,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn sessions_list() -> Command {
        Command::Sessions(SessionsCommand::List {
            limit: 20,
            format: OutputFormat::Table,
        })
    }

    #[test]
    fn test_cli_name() {
        let cli = Cli::command();
        assert_eq!(cli.get_name(), "ridelog");
    }

    #[test]
    fn test_verbosity_quiet() {
        let cli = Cli {
            config: None,
            verbose: 3,
            quiet: true,
            command: sessions_list(),
        };
        assert_eq!(cli.verbosity(), crate::logging::Verbosity::Quiet);
    }

    #[test]
    fn test_verbosity_levels() {
        for (verbose, expected) in [
            (0, crate::logging::Verbosity::Normal),
            (1, crate::logging::Verbosity::Verbose),
            (2, crate::logging::Verbosity::Trace),
        ] {
            let cli = Cli {
                config: None,
                verbose,
                quiet: false,
                command: sessions_list(),
            };
            assert_eq!(cli.verbosity(), expected);
        }
    }

    #[test]
    fn test_cli_verify() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_record() {
        let args = vec![
            "ridelog", "record", "--trace", "ride.jsonl", "--mode", "landscape", "-s", "8",
            "--no-save",
        ];
        let cli = Cli::try_parse_from(args).unwrap();
        match cli.command {
            Command::Record(cmd) => {
                assert_eq!(cmd.trace, PathBuf::from("ride.jsonl"));
                assert_eq!(cmd.mode, Some(ModeArg::Landscape));
                assert!((cmd.speedup - 8.0).abs() < f64::EPSILON);
                assert!(cmd.no_save);
                assert!(!cmd.json);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_parse_record_requires_trace() {
        assert!(Cli::try_parse_from(vec!["ridelog", "record"]).is_err());
    }

    #[test]
    fn test_parse_sessions_show() {
        let cli = Cli::try_parse_from(vec!["ridelog", "sessions", "show", "abc"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Sessions(SessionsCommand::Show { ref id, points: false }) if id == "abc"
        ));
    }

    #[test]
    fn test_parse_sessions_prune() {
        let cli =
            Cli::try_parse_from(vec!["ridelog", "sessions", "prune", "--days", "30"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Sessions(SessionsCommand::Prune { days: Some(30) })
        ));
    }

    #[test]
    fn test_parse_config_validate() {
        let cli = Cli::try_parse_from(vec!["ridelog", "config", "validate", "-f", "/tmp/c.toml"])
            .unwrap();
        assert!(matches!(
            cli.command,
            Command::Config(ConfigCommand::Validate { file: Some(_) })
        ));
    }

    #[test]
    fn test_parse_with_config() {
        let args = vec!["ridelog", "-c", "/custom/config.toml", "sessions", "list"];
        let cli = Cli::try_parse_from(args).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/custom/config.toml")));
    }

    #[test]
    fn test_parse_with_verbose() {
        let cli = Cli::try_parse_from(vec!["ridelog", "-vv", "config", "path"]).unwrap();
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn test_parse_with_quiet() {
        let cli = Cli::try_parse_from(vec!["ridelog", "-q", "config", "path"]).unwrap();
        assert!(cli.quiet);
    }
}
