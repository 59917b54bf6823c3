use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatArg {
    Text,
    Jsonl,
}

#[derive(Parser, Debug)]
#[command(name = "aiwhisper", version, about = "Run AIWhisperer plans")]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file; defaults to ~/.aiwhisper/config.toml or ./config.toml.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct RunArgs {
    #[arg(long)]
    pub plan: PathBuf,

    /// Snapshot file written during the run.
    #[arg(long)]
    pub state: Option<PathBuf>,

    /// Continue from the snapshot at `--state`.
    #[arg(long, requires = "state")]
    pub resume: bool,

    /// With `--resume`, reset failed and skipped tasks to pending first.
    #[arg(long, requires = "resume")]
    pub retry_failed: bool,

    #[arg(long, value_enum)]
    pub format: Option<FormatArg>,

    /// Append engine events as JSON lines to this file.
    #[arg(long)]
    pub events: Option<String>,

    #[arg(long)]
    pub model: Option<String>,

    #[arg(long)]
    pub no_stream: bool,

    #[arg(long)]
    pub workspace: Option<PathBuf>,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct ValidateArgs {
    #[arg(long)]
    pub plan: PathBuf,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct StatusArgs {
    #[arg(long)]
    pub state: PathBuf,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    Run(RunArgs),
    Validate(ValidateArgs),
    Status(StatusArgs),
    Models,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_run_flags() {
        let args = Args::parse_from([
            "aiwhisper",
            "run",
            "--plan",
            "plan.json",
            "--state",
            "s.json",
            "--resume",
            "--retry-failed",
            "--format",
            "jsonl",
            "--no-stream",
        ]);
        let Commands::Run(run) = args.command else {
            panic!("expected run");
        };
        assert_eq!(run.plan, PathBuf::from("plan.json"));
        assert!(run.resume && run.retry_failed && run.no_stream);
        assert_eq!(run.format, Some(FormatArg::Jsonl));
    }

    #[test]
    fn resume_needs_state() {
        let err = Args::try_parse_from(["aiwhisper", "run", "--plan", "p.json", "--resume"]);
        assert!(err.is_err());
    }

    #[test]
    fn config_is_global() {
        let args = Args::parse_from(["aiwhisper", "models", "--config", "c.toml"]);
        assert_eq!(args.config, Some(PathBuf::from("c.toml")));
        assert!(matches!(args.command, Commands::Models));
    }
}
