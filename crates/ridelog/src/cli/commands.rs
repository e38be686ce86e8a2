//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::path::PathBuf;

use clap::{Args, Subcommand, ValueEnum};

use crate::telemetry::OrientationMode;

/// Record command arguments.
#[derive(Debug, Args)]
pub struct RecordCommand {
    /// JSON-lines sensor trace to replay
    #[arg(short, long, value_name = "FILE")]
    pub trace: PathBuf,

    /// Phone mounting (defaults to the configured mode)
    #[arg(short, long, value_enum)]
    pub mode: Option<ModeArg>,

    /// Replay rate relative to real time
    #[arg(short, long, default_value = "1.0")]
    pub speedup: f64,

    /// Don't save the recorded session
    #[arg(long)]
    pub no_save: bool,

    /// Print the summary as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Saved session commands.
#[derive(Debug, Subcommand)]
pub enum SessionsCommand {
    /// List saved sessions, newest first
    List {
        /// Maximum number of sessions to show
        #[arg(short, long, default_value = "20")]
        limit: usize,

        /// Output format
        #[arg(short, long, value_enum, default_value = "table")]
        format: OutputFormat,
    },

    /// Show one saved session
    Show {
        /// Session id
        id: String,

        /// Include every recorded point
        #[arg(short, long)]
        points: bool,
    },

    /// Delete a saved session
    Delete {
        /// Session id
        id: String,
    },

    /// Delete sessions older than a number of days
    Prune {
        /// Age in days (defaults to `storage.max_age_days`)
        #[arg(short, long)]
        days: Option<u32>,
    },

    /// Show database statistics
    Stats,
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

/// Mounting mode argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    /// Long edge vertical
    Portrait,
    /// Long edge horizontal
    Landscape,
}

impl From<ModeArg> for OrientationMode {
    fn from(arg: ModeArg) -> Self {
        match arg {
            ModeArg::Portrait => Self::Portrait,
            ModeArg::Landscape => Self::Landscape,
        }
    }
}

/// Output format for commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Plain text output
    #[default]
    Plain,
    /// Formatted table
    Table,
    /// JSON output
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_arg_conversion() {
        assert_eq!(
            OrientationMode::from(ModeArg::Portrait),
            OrientationMode::Portrait
        );
        assert_eq!(
            OrientationMode::from(ModeArg::Landscape),
            OrientationMode::Landscape
        );
    }

    #[test]
    fn test_output_format_default() {
        assert_eq!(OutputFormat::default(), OutputFormat::Plain);
    }

    #[test]
    fn test_record_command_debug() {
        let cmd = RecordCommand {
            trace: PathBuf::from("ride.jsonl"),
            mode: Some(ModeArg::Landscape),
            speedup: 10.0,
            no_save: true,
            json: false,
        };
        let debug_str = format!("{cmd:?}");
        assert!(debug_str.contains("ride.jsonl"));
        assert!(debug_str.contains("Landscape"));
    }

    #[test]
    fn test_sessions_command_debug() {
        let cmd = SessionsCommand::Show {
            id: "abc123".to_string(),
            points: false,
        };
        let debug_str = format!("{cmd:?}");
        assert!(debug_str.contains("Show"));
        assert!(debug_str.contains("abc123"));
    }

    #[test]
    fn test_config_command_debug() {
        let cmd = ConfigCommand::Show { json: false };
        let debug_str = format!("{cmd:?}");
        assert!(debug_str.contains("Show"));
    }

    #[test]
    fn test_output_format_debug() {
        let format = OutputFormat::Json;
        let debug_str = format!("{format:?}");
        assert_eq!(debug_str, "Json");
    }
}
