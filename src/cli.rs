//! Command-Line Interface

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Pose Coach - replay landmark recordings through a rule graph
#[derive(Parser, Debug)]
#[command(name = "pose-coach")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Engine config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Feed a JSON-lines sample recording through a rule graph
    Replay {
        /// Recorded samples, one JSON object per line
        #[arg(short, long)]
        samples: PathBuf,

        /// Rule graph file
        #[arg(short, long)]
        rules: PathBuf,

        /// Use the fuzzy simulation instead of the discrete one
        #[arg(long)]
        fuzzy: bool,

        /// Two-point differences instead of the regression fit
        #[arg(long)]
        raw: bool,

        /// Write per-step weights and counts as JSON
        #[arg(short, long)]
        log: Option<PathBuf>,
    },

    /// Load and validate a rule graph file
    CheckRules {
        /// Rule graph file
        #[arg(short, long)]
        rules: PathBuf,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_verify() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_replay_with_defaults() {
        let args = vec!["pose-coach", "replay", "--samples", "s.jsonl", "--rules", "r.toml"];
        let cli = Cli::try_parse_from(args).unwrap();

        match cli.command {
            Commands::Replay {
                samples,
                rules,
                fuzzy,
                raw,
                log,
            } => {
                assert_eq!(samples, PathBuf::from("s.jsonl"));
                assert_eq!(rules, PathBuf::from("r.toml"));
                assert!(!fuzzy);
                assert!(!raw);
                assert!(log.is_none());
            }
            _ => panic!("Expected Replay command"),
        }
        assert!(!cli.verbose);
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_parse_replay_with_all_options() {
        let args = vec![
            "pose-coach",
            "replay",
            "-s", "s.jsonl",
            "-r", "r.toml",
            "--fuzzy",
            "--raw",
            "--log", "out.json",
            "--config", "engine.toml",
            "-v",
        ];
        let cli = Cli::try_parse_from(args).unwrap();

        match cli.command {
            Commands::Replay { fuzzy, raw, log, .. } => {
                assert!(fuzzy);
                assert!(raw);
                assert_eq!(log, Some(PathBuf::from("out.json")));
            }
            _ => panic!("Expected Replay command"),
        }
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("engine.toml")));
    }

    #[test]
    fn test_parse_check_rules() {
        let cli = Cli::try_parse_from(["pose-coach", "check-rules", "--rules", "squat.toml"]).unwrap();
        assert!(matches!(cli.command, Commands::CheckRules { .. }));
    }

    #[test]
    fn test_replay_requires_inputs() {
        assert!(Cli::try_parse_from(["pose-coach", "replay", "--samples", "s.jsonl"]).is_err());
        assert!(Cli::try_parse_from(["pose-coach"]).is_err());
    }
}
