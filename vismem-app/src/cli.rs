use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use vismem_core::SessionMode;

#[derive(Parser)]
#[command(name = "vismem")]
#[command(about = "Delayed matching-to-sample sessions: plan, simulate, preview", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// JSON session settings, merged over the defaults; VISMEM_* variables win
    #[arg(short, long, global = true, env = "VISMEM_CONFIG")]
    pub config: Option<PathBuf>,

    /// Diagnostics format on stderr; RUST_LOG sets the level
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run a session against a simulated participant and export it as JSON lines
    Run(RunArgs),

    /// Print the sequenced trial list
    Plan(PlanArgs),

    /// Render a pattern, or a whole trial, to PNG
    Preview(PreviewArgs),
}

#[derive(Args)]
pub struct RunArgs {
    /// Block to run
    #[arg(short, long, default_value = "main")]
    pub mode: SessionMode,

    #[arg(short, long, default_value = "")]
    pub participant: String,

    /// Output file for the JSON-lines export (stdout when omitted)
    #[arg(short, long)]
    pub out: Option<PathBuf>,

    /// Stimulus seed, overrides the settings
    #[arg(long)]
    pub seed: Option<u32>,

    /// Seed for the simulated participant's choices
    #[arg(long)]
    pub participant_seed: Option<u64>,

    /// Run on the wall clock instead of simulated time
    #[arg(long)]
    pub realtime: bool,

    /// Probability that an attempt is correct
    #[arg(long, default_value_t = 0.8)]
    pub accuracy: f64,

    #[arg(long, default_value_t = 450.0)]
    pub rt_min_ms: f64,

    #[arg(long, default_value_t = 1800.0)]
    pub rt_max_ms: f64,

    /// Stop after the first wrong answer instead of trying the other options
    #[arg(long)]
    pub no_retry: bool,

    /// Never answer; needs a response deadline
    #[arg(long)]
    pub silent: bool,

    /// Chance per trial that the participant leaves the page
    #[arg(long, default_value_t = 0.0)]
    pub hide_probability: f64,
}

#[derive(Args)]
pub struct PlanArgs {
    /// Only list one block
    #[arg(short, long)]
    pub mode: Option<SessionMode>,

    /// Sequencing seed, overrides the settings
    #[arg(long)]
    pub seed: Option<u32>,

    /// One JSON object per slot
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct PreviewArgs {
    /// PNG to write
    pub out: PathBuf,

    /// Segment count, defaults to the configured one
    #[arg(short, long)]
    pub segments: Option<usize>,

    #[arg(long)]
    pub seed: Option<u32>,

    /// Tile size in pixels
    #[arg(long, default_value_t = 140)]
    pub size: u32,

    /// Render sample and choices of a full trial instead of one pattern
    #[arg(long)]
    pub trial: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_run_options() {
        let cli = Cli::try_parse_from([
            "vismem",
            "run",
            "--mode",
            "Practice",
            "--participant",
            "p07",
            "--seed",
            "42",
            "--no-retry",
        ])
        .unwrap();
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.mode, SessionMode::Practice);
        assert_eq!(args.participant, "p07");
        assert_eq!(args.seed, Some(42));
        assert!(args.no_retry);
        assert!(!args.realtime);
        assert_eq!(cli.log_format, LogFormat::Pretty);
    }

    #[test]
    fn rejects_unknown_mode() {
        assert!(Cli::try_parse_from(["vismem", "run", "--mode", "warmup"]).is_err());
    }
}
