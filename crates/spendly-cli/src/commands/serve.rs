//! Server command implementation

use std::path::Path;

use anyhow::{Context, Result};
use spendly_core::channels::Channels;
use spendly_core::config::Config;
use spendly_server::{AppState, ServerConfig};

use super::{ai_client, open_db};

pub async fn cmd_serve(
    db_path: &Path,
    config: &Config,
    host: &str,
    port: u16,
    server: ServerConfig,
) -> Result<()> {
    println!("🚀 Starting Spendly server...");
    println!("   Database: {}", db_path.display());
    println!("   Webhook: http://{}:{}/webhook", host, port);
    println!("   Dashboard API: http://{}:{}/api", host, port);

    if server.require_auth {
        if config.dashboard.jwt_secret.is_some() {
            println!("   🔒 Dashboard: magic-link tokens (JWT_SECRET set)");
        } else {
            println!("   ❌ Dashboard: JWT_SECRET not set, login links are disabled");
        }
    } else {
        println!();
        println!("   ⚠️  Dashboard authentication DISABLED - do not expose to network!");
    }
    if !server.allowed_origins.is_empty() {
        println!("   🌐 Allowed origins: {}", server.allowed_origins.join(", "));
    }
    println!(
        "   ⏱️  Rate limit: {} messages / {}h",
        config.rate_limit.max_messages, config.rate_limit.window_hours
    );
    println!();
    println!("   Press Ctrl+C to stop");

    let db = open_db(db_path)?;
    let channels = Channels::from_config(config).context("Failed to set up channels")?;
    let state = AppState::new(db, ai_client(), channels, config, server);

    spendly_server::serve(state, host, port, config.sweep_interval()).await?;

    Ok(())
}
