use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use std::path::PathBuf;

use crate::api::TargetMode;

#[derive(Parser)]
#[command(name = "fleetrun")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Render a template and push or audit it across a device fleet", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Render a template and print the payload
    Render(RenderArgs),

    /// Push or audit a payload across devices
    Run(RunArgs),

    /// Serve the HTTP API
    Serve(ServeArgs),

    /// Manage the configuration file
    #[command(subcommand)]
    Config(ConfigCommand),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

// ============================================================================
// Payload source
// ============================================================================

#[derive(Args, Clone, Default)]
pub struct SourceArgs {
    /// Template file to render
    #[arg(short, long, value_name = "FILE", conflicts_with_all = ["template_name", "commands"])]
    pub template: Option<PathBuf>,

    /// Template name, looked up in the templates directory
    #[arg(short = 'n', long, value_name = "NAME", conflicts_with = "commands")]
    pub template_name: Option<String>,

    /// Raw command sent without rendering (repeatable)
    #[arg(short = 'c', long = "command", value_name = "LINE")]
    pub commands: Vec<String>,

    /// Variables file (.toml or .json)
    #[arg(long, value_name = "FILE")]
    pub vars: Option<PathBuf>,

    /// Set a variable (repeatable, overrides --vars)
    #[arg(short, long = "set", value_name = "KEY=VALUE")]
    pub set: Vec<String>,
}

impl SourceArgs {
    pub fn is_empty(&self) -> bool {
        self.template.is_none() && self.template_name.is_none() && self.commands.is_empty()
    }
}

#[derive(Args)]
pub struct RenderArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Write the payload to a file instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

// ============================================================================
// Run
// ============================================================================

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    Push,
    Audit,
    RenderOnly,
}

impl From<ModeArg> for TargetMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Push => Self::Push,
            ModeArg::Audit => Self::Audit,
            ModeArg::RenderOnly => Self::RenderOnly,
        }
    }
}

#[derive(Args)]
pub struct RunArgs {
    /// What to do with the payload
    #[arg(short, long, value_enum)]
    pub mode: Option<ModeArg>,

    /// Device inventory (.toml or .json)
    #[arg(short, long, value_name = "FILE")]
    pub inventory: Option<PathBuf>,

    #[command(flatten)]
    pub source: SourceArgs,

    /// Full run request as JSON; other flags override its fields
    #[arg(long, value_name = "FILE")]
    pub request: Option<PathBuf>,

    /// Maximum devices contacted at once
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Per-device timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Retries for transient failures
    #[arg(long)]
    pub retries: Option<u32>,

    /// Delay before the first retry
    #[arg(long, value_name = "MS")]
    pub backoff_ms: Option<u64>,

    /// Identifier for this run (generated when omitted)
    #[arg(long)]
    pub run_id: Option<String>,

    /// Push without asking for confirmation
    #[arg(short, long)]
    pub yes: bool,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,

    /// Also write the JSON report to a file
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Show device output under each outcome
    #[arg(long)]
    pub show_output: bool,
}

// ============================================================================
// Serve
// ============================================================================

#[derive(Args)]
pub struct ServeArgs {
    /// Address to listen on (overrides config)
    #[arg(short, long, value_name = "ADDR")]
    pub bind: Option<String>,

    /// Prefix for every route (overrides config)
    #[arg(long, value_name = "PATH")]
    pub root_path: Option<String>,
}

// ============================================================================
// Config Commands
// ============================================================================

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Print the effective configuration
    Show,

    /// Print the config file path
    Path,

    /// Write a config file with default values
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_flags() {
        let cli = Cli::parse_from([
            "fleetrun", "run", "-m", "audit", "-i", "lab.toml", "-n", "ntp", "-s", "server=10.0.0.5",
            "--jobs", "4", "--json",
        ]);
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert!(args.mode == Some(ModeArg::Audit));
        assert_eq!(args.source.template_name.as_deref(), Some("ntp"));
        assert_eq!(args.source.set, ["server=10.0.0.5"]);
        assert_eq!(args.jobs, Some(4));
        assert!(args.json);
    }

    #[test]
    fn test_template_and_commands_conflict() {
        let result = Cli::try_parse_from([
            "fleetrun", "render", "-t", "a.tmpl", "-c", "show version",
        ]);
        assert!(result.is_err());
    }
}
