use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use courier_core::SyncMode;

#[derive(Parser)]
#[command(name = "courier")]
#[command(about = "Relay a device's message store to a remote chat channel")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to the ledger database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// Optional path to the origin message store
    #[arg(long, global = true, value_name = "PATH")]
    pub origin_path: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a full sync pass
    Sync {
        /// Run even if the last full pass is recent
        #[arg(long)]
        force: bool,
        /// Destination override for this pass
        #[arg(long, value_name = "ID", allow_hyphen_values = true)]
        destination: Option<String>,
    },
    /// Run a quick pass over new messages
    Quick {
        /// Destination override for this pass
        #[arg(long, value_name = "ID", allow_hyphen_values = true)]
        destination: Option<String>,
    },
    /// Watch the origin and relay new messages until interrupted
    Watch {
        /// How often to poll the origin store for changes
        #[arg(long, value_name = "MS", default_value_t = 1000, value_parser = clap::value_parser!(u64).range(50..))]
        poll_ms: u64,
    },
    /// Show sync settings and ledger counts
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Inspect or change sync settings
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// List messages that exhausted their delivery attempts
    DeadLetters {
        /// Number of messages to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Re-arm dead-lettered messages (all when no ids are given)
    Reset {
        /// Origin message ids
        ids: Vec<String>,
    },
    /// Check that every delivered message has exactly one mirror row
    Verify {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete old messages from the ledger
    Prune {
        /// Age threshold in days
        #[arg(long, value_name = "DAYS")]
        older_than_days: u32,
        /// Also delete messages that were never delivered
        #[arg(long)]
        include_unsynced: bool,
    },
    /// Manage the bot token stored in the OS keychain
    Token {
        #[command(subcommand)]
        command: TokenCommands,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show resolved configuration
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Turn syncing on
    Enable,
    /// Turn syncing off
    Disable,
    /// Set the destination chat id
    Destination {
        /// Chat id messages are relayed to
        #[arg(allow_hyphen_values = true)]
        id: String,
    },
    /// Choose which messages are relayed
    Mode {
        #[arg(value_enum)]
        mode: ModeArg,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum ModeArg {
    /// Every message in the origin
    All,
    /// Only messages newer than the moment this mode is first chosen
    NewOnly,
}

impl From<ModeArg> for SyncMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::All => Self::All,
            ModeArg::NewOnly => Self::NewOnly,
        }
    }
}

#[derive(Subcommand)]
pub enum TokenCommands {
    /// Store the bot token (read from stdin when omitted)
    Set {
        token: Option<String>,
    },
    /// Remove the stored bot token
    Clear,
    /// Show where the bot token comes from
    Status,
}
