//! Spendly CLI - WhatsApp expense assistant
//!
//! Usage:
//!   spendly init                           Initialize database
//!   spendly serve --port 3000              Start webhook + dashboard server
//!   spendly chat "50rs coffee at ccd"      Talk to the bot locally
//!   spendly expenses --phone +91...        List a user's expenses
//!   spendly budgets --phone +91...         Show budget usage

mod cli;
mod commands;


use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    match cli.command {
        Commands::Init => commands::cmd_init(&cli.db),
        Commands::Serve {
            port,
            host,
            no_auth,
            allowed_origins,
            verify_token,
        } => {
            let config = commands::load_config(cli.config.as_deref())?;
            let server = spendly_server::ServerConfig {
                require_auth: !no_auth,
                allowed_origins,
                verify_token,
            };
            commands::cmd_serve(&cli.db, &config, &host, port, server).await
        }
        Commands::Chat { phone, message } => {
            let config = commands::load_config(cli.config.as_deref())?;
            let db = commands::open_db(&cli.db)?;
            let router = commands::chat_router(db, commands::ai_client(), &config)?;
            match message {
                Some(message) => commands::cmd_chat_once(&router, &phone, &message).await,
                None => commands::cmd_chat_repl(&router, &phone).await,
            }
        }
        Commands::Expenses { phone, limit } => {
            let db = commands::open_db(&cli.db)?;
            commands::cmd_expenses(&db, &phone, limit)
        }
        Commands::Budgets { phone } => {
            let config = commands::load_config(cli.config.as_deref())?;
            let db = commands::open_db(&cli.db)?;
            commands::cmd_budgets(&db, &config, &phone)
        }
        Commands::Status => {
            let config = commands::load_config(cli.config.as_deref())?;
            commands::cmd_status(&cli.db, &config)
        }
    }
}
