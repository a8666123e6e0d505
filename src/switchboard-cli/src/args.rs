//! Command-line arguments.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use switchboard_engine::config::DEFAULT_FLEET_FILE;

/// Log verbosity level for CLI output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogLevel {
    /// Only show errors
    Error,
    /// Show warnings and errors (default)
    #[default]
    Warn,
    /// Show informational messages, warnings, and errors
    Info,
    /// Show debug messages and above
    Debug,
    /// Show all messages including trace-level details
    Trace,
}

impl LogLevel {
    /// Convert to tracing filter string.
    pub fn as_filter_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "switchboard", version, about = "Chat with a model that can call your tool servers")]
pub struct Cli {
    /// Tool-server fleet file
    #[arg(long, global = true, value_name = "PATH", default_value = DEFAULT_FLEET_FILE)]
    pub servers: PathBuf,

    /// Engine settings (TOML)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Store conversations as JSONL files in this directory
    #[arg(long, global = true, value_name = "DIR")]
    pub store: Option<PathBuf>,

    /// Shorthand for --log-level debug
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Log level; SWITCHBOARD_LOG or RUST_LOG apply when unset
    #[arg(long, global = true, value_enum)]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Level requested on the command line, if any.
    pub fn requested_level(&self) -> Option<LogLevel> {
        if self.verbose {
            Some(LogLevel::Debug)
        } else {
            self.log_level
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Connect the tool servers and list their tools
    Tools,

    /// Send one message and print the reply
    Ask {
        /// The message
        message: String,

        #[command(flatten)]
        conversation: ConversationArgs,
    },

    /// Chat interactively; `/clear` resets the conversation, `/quit` exits
    Chat {
        #[command(flatten)]
        conversation: ConversationArgs,
    },
}

#[derive(Debug, Clone, clap::Args)]
pub struct ConversationArgs {
    /// User id recorded with each turn
    #[arg(long, default_value = "cli")]
    pub user: String,

    /// Continue an existing conversation
    #[arg(long, value_name = "ID")]
    pub conversation: Option<String>,
}
