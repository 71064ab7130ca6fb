//! Clap derive structures for the `excs` CLI.

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// excs -- talk to a DCC-EX command station over its text protocol
#[derive(Debug, Parser)]
#[command(
    name = "excs",
    version,
    about = "Control a DCC-EX model railway command station from the command line",
    long_about = "Connects to a DCC-EX EX-CommandStation over TCP (port 2560 by default)\n\
        to list its roster, routes, turnouts and tracks, and to switch power,\n\
        turnouts, routes and locomotives.",
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
    /// Station profile to use
    #[arg(long, short = 'p', env = "EXCS_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Station host name or IP address (overrides profile)
    #[arg(long, short = 'H', env = "EXCS_HOST", global = true)]
    pub host: Option<String>,

    /// Station TCP port (overrides profile)
    #[arg(long, env = "EXCS_PORT", global = true)]
    pub port: Option<u16>,

    /// Response timeout in seconds (overrides profile)
    #[arg(long, env = "EXCS_TIMEOUT", global = true)]
    pub timeout: Option<u64>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "EXCS_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,
}

// ── Shared value enums ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
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

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Switch {
    On,
    Off,
}

impl Switch {
    pub fn is_on(self) -> bool {
        self == Self::On
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TurnoutPosition {
    /// Straight through
    Closed,
    /// Diverging
    Thrown,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Show the station's firmware, processor and motor controller
    Info,

    /// List locomotives in the station roster
    #[command(alias = "locos")]
    Roster,

    /// List routes and automations
    Routes,

    /// List turnouts and their states
    Turnouts,

    /// List track outputs
    Tracks(TracksArgs),

    /// Switch power on all tracks
    Power {
        state: Switch,
    },

    /// Switch power on one track
    TrackPower {
        /// Track letter (A-H)
        letter: char,
        state: Switch,
    },

    /// Route operations
    Route(RouteArgs),

    /// Turnout operations
    Turnout(TurnoutArgs),

    /// Locomotive throttle operations
    Loco(LocoArgs),

    /// Configuration variable (CV) operations
    Cv(CvArgs),

    /// Emergency-stop every locomotive
    #[command(alias = "stop")]
    Estop,

    /// Reboot the command station
    Reboot,

    /// Stream connection events and push messages
    Watch(WatchArgs),

    /// Manage CLI configuration and profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Catalogs ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Args)]
pub struct TracksArgs {
    /// Also read the track current
    #[arg(long, short = 'c')]
    pub current: bool,
}

// ── Routes ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct RouteArgs {
    #[command(subcommand)]
    pub command: RouteCommand,
}

#[derive(Debug, Clone, Copy, Subcommand)]
pub enum RouteCommand {
    /// Start a route or automation
    Start { id: u32 },
}

// ── Turnouts ─────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct TurnoutArgs {
    #[command(subcommand)]
    pub command: TurnoutCommand,
}

#[derive(Debug, Clone, Copy, Subcommand)]
pub enum TurnoutCommand {
    /// Close or throw a turnout
    Set { id: u32, position: TurnoutPosition },
}

// ── Locomotives ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct LocoArgs {
    #[command(subcommand)]
    pub command: LocoCommand,
}

#[derive(Debug, Clone, Copy, Subcommand)]
pub enum LocoCommand {
    /// Set speed as a percentage of full speed
    Speed {
        /// DCC address
        cab: u32,
        /// 0-100
        percent: u8,
        /// Drive in reverse
        #[arg(long, short = 'r')]
        reverse: bool,
    },

    /// Switch a decoder function
    Function {
        cab: u32,
        /// Function number (0-68)
        function: u8,
        state: Switch,
    },

    /// Emergency-stop one locomotive
    Stop { cab: u32 },

    /// Ask the station to report a locomotive's state
    State { cab: u32 },
}

// ── CVs ──────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CvArgs {
    #[command(subcommand)]
    pub command: CvCommand,
}

#[derive(Debug, Clone, Copy, Subcommand)]
pub enum CvCommand {
    /// Write a CV on the main track
    Write {
        /// Decoder address (1-10239)
        address: u32,
        /// CV number (1-1024)
        cv: u32,
        /// Value (0-255)
        value: u32,
    },
}

// ── Watch ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Args)]
pub struct WatchArgs {
    /// Stop after this many seconds (default: until interrupted)
    #[arg(long, short = 'd')]
    pub duration: Option<u64>,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Clone, Subcommand)]
pub enum ConfigCommand {
    /// Print the config file location
    Path,
    /// Show the loaded configuration
    Show,
    /// List profile names
    Profiles,
    /// Add or replace a profile from --host and --port
    Add {
        /// Profile name
        name: String,
        /// Also make it the default profile
        #[arg(long)]
        default: bool,
    },
    /// Set the default profile
    Use {
        /// Profile name to set as default
        name: String,
    },
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
