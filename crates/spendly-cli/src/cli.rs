//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI arguments.
//! The actual command implementations are in the `commands` module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Spendly - Track expenses over WhatsApp
#[derive(Parser)]
#[command(name = "spendly")]
#[command(about = "WhatsApp expense-tracking assistant", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Database path
    #[arg(long, env = "SPENDLY_DB_PATH", default_value = "spendly.db", global = true)]
    pub db: PathBuf,

    /// Config file (defaults to <data dir>/spendly/config.toml when present)
    #[arg(long, env = "SPENDLY_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the database
    Init,

    /// Start the webhook and dashboard server
    Serve {
        /// Port to listen on
        #[arg(short, long, env = "PORT", default_value = "3000")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Accept `?phone=` on the dashboard API instead of a token
        ///
        /// WARNING: Do not use this flag when exposing the server to a network.
        #[arg(long)]
        no_auth: bool,

        /// Origin allowed to call the dashboard API (repeatable)
        #[arg(long = "allow-origin")]
        allowed_origins: Vec<String>,

        /// Token expected by the GET /webhook subscription handshake
        #[arg(long, env = "VERIFY_TOKEN")]
        verify_token: Option<String>,
    },

    /// Talk to the bot from the terminal
    ///
    /// Replies are printed instead of sent. Without a message, reads one
    /// message per line from stdin until EOF.
    Chat {
        /// Sender phone number
        #[arg(long, default_value = "+10000000000")]
        phone: String,

        /// Single message to send
        message: Option<String>,
    },

    /// List a user's recent expenses
    Expenses {
        /// Phone number of the user
        #[arg(long)]
        phone: String,

        /// Number of expenses to show
        #[arg(short, long, default_value = "20")]
        limit: i64,
    },

    /// Show a user's budgets and current usage
    Budgets {
        /// Phone number of the user
        #[arg(long)]
        phone: String,
    },

    /// Show database and channel status
    Status,
}
