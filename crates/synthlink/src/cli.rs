//! Clap derive structures for the `synthlink` CLI.
//!
//! Also compiled by `build.rs` for man page generation, so nothing here
//! may reach into the rest of the crate.

use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// synthlink -- drive a synthesizer editor controller from the shell
#[derive(Debug, Parser)]
#[command(
    name = "synthlink",
    version,
    about = "Inspect and edit synthesizer parameters through an editor controller",
    long_about = "Talks to a synthesizer editor controller over HTTP and its duplex\n\
        channel: list MIDI devices and parameters, push edits, select ports\n\
        and run bulk refreshes from the hardware.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Config profile to use
    #[arg(long, short = 'p', env = "SYNTHLINK_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Controller base URL (overrides profile)
    #[arg(long, short = 'c', env = "SYNTHLINK_CONTROLLER", global = true)]
    pub controller: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "SYNTHLINK_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Request timeout in seconds (overrides profile)
    #[arg(long, env = "SYNTHLINK_TIMEOUT", global = true)]
    pub timeout: Option<u64>,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List MIDI input and output ports
    #[command(alias = "dev")]
    Devices,

    /// List synthesizer parameters
    #[command(alias = "ls")]
    Params(ParamsArgs),

    /// Show a single parameter
    Get {
        /// Parameter address (e.g., "synth/env/attack")
        address: String,
    },

    /// Change a parameter on the synthesizer
    Set {
        /// Parameter address
        address: String,

        /// New value (0-127)
        value: u8,
    },

    /// Select a MIDI port
    Select(SelectArgs),

    /// Re-read every parameter from the hardware
    Refresh(RefreshArgs),

    /// Stream parameter echoes, refresh progress and connection changes
    Watch(WatchArgs),

    /// Manage CLI configuration and profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

impl Command {
    /// Whether the command needs the duplex channel open.
    pub fn needs_channel(&self) -> bool {
        matches!(self, Self::Set { .. } | Self::Refresh(_) | Self::Watch(_))
    }
}

// ── Subcommand arguments ─────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ParamsArgs {
    /// Only show addresses starting with this prefix
    #[arg(long)]
    pub prefix: Option<String>,
}

#[derive(Debug, Args)]
pub struct SelectArgs {
    #[command(subcommand)]
    pub command: SelectCommand,
}

#[derive(Debug, Subcommand)]
pub enum SelectCommand {
    /// Select the MIDI input port
    Input {
        /// Port name as listed by `synthlink devices`
        name: String,
    },

    /// Select the MIDI output port
    Output {
        /// Port name as listed by `synthlink devices`
        name: String,
    },
}

#[derive(Debug, Args)]
pub struct RefreshArgs {
    /// Hide the progress bar
    #[arg(long)]
    pub no_progress: bool,
}

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Stop after this long (e.g., "30s", "5m"); runs until Ctrl-C otherwise
    #[arg(long, short = 'd', value_parser = parse_duration)]
    pub duration: Option<Duration>,
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the config file location
    Path,

    /// Display current resolved configuration
    Show,

    /// Create or extend the config file with guided setup
    Init,
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Target shell
    pub shell: clap_complete::Shell,
}

fn parse_duration(raw: &str) -> Result<Duration, humantime::DurationError> {
    humantime::parse_duration(raw)
}
