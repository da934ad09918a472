//! Core command implementations and shared utilities
//!
//! This module contains:
//! - `open_db` - Shared utility to open the database
//! - `load_config` - Config file plus environment overrides
//! - `ai_client` - Model backend from the environment
//! - `cmd_init` - Initialize the database

use std::path::Path;

use anyhow::{Context, Result};
use spendly_core::ai::AIClient;
use spendly_core::config::Config;
use spendly_core::db::Database;
use tracing::info;

/// Open (and migrate) the database
pub fn open_db(db_path: &Path) -> Result<Database> {
    let path_str = db_path
        .to_str()
        .with_context(|| format!("Database path is not valid UTF-8: {}", db_path.display()))?;
    Database::new(path_str).context("Failed to open database")
}

pub fn load_config(path: Option<&Path>) -> Result<Config> {
    Config::load(path).context("Failed to load config")
}

/// Configured model backend, or the offline heuristics when none is set
pub fn ai_client() -> AIClient {
    AIClient::from_env().unwrap_or_else(|| {
        info!("No AI backend configured (set OLLAMA_HOST or AI_BACKEND), using offline heuristics");
        AIClient::mock()
    })
}

pub fn cmd_init(db_path: &Path) -> Result<()> {
    println!("🔧 Initializing database at {}...", db_path.display());

    let db = open_db(db_path)?;
    let users = db.count_users()?;

    println!("✅ Database initialized successfully!");
    if users > 0 {
        println!("   Existing users: {}", users);
    }
    println!();
    println!("Next steps:");
    println!("  1. Try the bot locally: spendly chat \"50rs coffee at ccd\"");
    println!("  2. Start the webhook server: spendly serve");

    Ok(())
}
