//! Clap derive structures for the `netorch` CLI.
//!
//! Defines the command tree, global flags, and shared value enums.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// netorch -- subscriber enforcement across the access network
#[derive(Debug, Parser)]
#[command(
    name = "netorch",
    version,
    about = "Orchestrate ISP network devices from the billing database",
    long_about = "Applies billing decisions to the access network.\n\n\
        Reads clients, packages and equipment from the billing store and\n\
        drives RouterOS devices: disconnects, reconnects, bandwidth plans,\n\
        data caps, health checks and discovery.",
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
    /// Config file (defaults to the platform config directory)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Operator name recorded on events this invocation triggers
    #[arg(long, env = "NETORCH_OPERATOR", default_value = "cli", global = true)]
    pub operator: String,

    /// Output format
    #[arg(long, short = 'o', default_value = "table", global = true)]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Log line format on stderr
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Skip confirmation prompts
    #[arg(long, short = 'y', global = true)]
    pub yes: bool,
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

#[derive(Debug, Clone, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines
    Text,
    /// One JSON object per line
    Json,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Inspect, probe and discover managed devices
    #[command(alias = "dev", alias = "d")]
    Devices(DevicesArgs),

    /// Disconnect, reconnect and re-plan subscribers
    #[command(alias = "cl")]
    Clients(ClientsArgs),

    /// Inspect active bandwidth policies
    Qos(QosArgs),

    /// Run health, discovery, usage and compliance loops until interrupted
    Monitor(MonitorArgs),

    /// View the network event log
    Events(EventsArgs),

    /// Manage CLI configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Devices ──────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct DevicesArgs {
    #[command(subcommand)]
    pub command: DevicesCommand,
}

#[derive(Debug, Subcommand)]
pub enum DevicesCommand {
    /// List approved devices with their last-known status
    #[command(alias = "ls")]
    List,

    /// Probe every device once and report status transitions
    Check,

    /// Sweep network ranges for unknown RouterOS devices
    Discover {
        /// CIDR range to sweep (repeatable; defaults to monitor.network_ranges)
        #[arg(long = "range", short = 'r', value_name = "CIDR")]
        ranges: Vec<String>,
    },
}

// ── Clients ──────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ClientsArgs {
    #[command(subcommand)]
    pub command: ClientsCommand,
}

#[derive(Debug, Subcommand)]
pub enum ClientsCommand {
    /// Cut a client off on every assigned device
    Disconnect {
        /// Client ID
        client: String,
    },

    /// Restore a client and re-apply its package's plan
    Reconnect {
        /// Client ID
        client: String,
    },

    /// Move a client to a package's bandwidth plan
    Limit {
        /// Client ID
        client: String,

        /// Service package ID
        #[arg(long, short = 'p')]
        package: String,
    },
}

// ── QoS ──────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct QosArgs {
    #[command(subcommand)]
    pub command: QosCommand,
}

#[derive(Debug, Subcommand)]
pub enum QosCommand {
    /// List policies rebuilt from the store
    #[command(alias = "ls")]
    List,

    /// Compare live queue rates against each client's plan
    Check,
}

// ── Monitor ──────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct MonitorArgs {
    /// Stop after this long (e.g. "30m", "2h"); runs until Ctrl-C otherwise
    #[arg(long = "for", value_name = "DURATION")]
    pub run_for: Option<String>,
}

// ── Events ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct EventsArgs {
    #[command(subcommand)]
    pub command: EventsCommand,
}

#[derive(Debug, Subcommand)]
pub enum EventsCommand {
    /// List the most recent events, newest first
    #[command(alias = "ls")]
    List {
        /// Max results
        #[arg(long, short = 'l', default_value = "50")]
        limit: usize,
    },
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Create the config file with guided setup
    Init,

    /// Display the resolved configuration (secrets masked)
    Show,

    /// Print the config file path
    Path,

    /// Store a secret in the system keyring
    SetSecret {
        /// Which secret to store
        secret: SecretKind,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum SecretKind {
    /// Billing store API key
    Store,
    /// Default RouterOS password
    Routeros,
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
