//! Status command implementation

use std::fs;
use std::path::Path;

use anyhow::Result;
use spendly_core::ai::AIClient;
use spendly_core::config::Config;
use spendly_core::db::ExpenseFilter;

use super::open_db;

fn configured(present: bool) -> &'static str {
    if present {
        "✅ configured"
    } else {
        "➖ not configured (local fallback)"
    }
}

pub fn cmd_status(db_path: &Path, config: &Config) -> Result<()> {
    println!();
    println!("📊 Spendly Status");
    println!("   ─────────────────────────────────────────────────────────────");

    println!("   Database: {}", db_path.display());
    if db_path.exists() {
        if let Ok(metadata) = fs::metadata(db_path) {
            let size_kb = metadata.len() as f64 / 1024.0;
            if size_kb < 1024.0 {
                println!("   Size: {:.1} KB", size_kb);
            } else {
                println!("   Size: {:.1} MB", size_kb / 1024.0);
            }
        }

        match open_db(db_path) {
            Ok(db) => {
                println!("   Users: {}", db.count_users()?);
                println!("   Expenses: {}", db.count_expenses(&ExpenseFilter::new())?);
            }
            Err(e) => {
                println!("   ❌ Error opening database: {:#}", e);
            }
        }
    } else {
        println!("   Size: (database not initialized)");
    }

    println!();
    match AIClient::from_env() {
        Some(ai) => println!("   AI backend: {}", ai.backend_name()),
        None => println!("   AI backend: offline heuristics (set OLLAMA_HOST or AI_BACKEND)"),
    }

    let twilio = &config.twilio;
    println!(
        "   Twilio: {}",
        configured(twilio.account_sid.is_some() && twilio.auth_token.is_some())
    );
    let cloudinary = &config.cloudinary;
    println!(
        "   Cloudinary: {}",
        configured(cloudinary.cloud_name.is_some() && cloudinary.api_secret.is_some())
    );
    println!("   Google Vision: {}", configured(config.vision.api_key.is_some()));
    println!(
        "   Dashboard login: {}",
        if config.dashboard.jwt_secret.is_some() {
            "✅ enabled"
        } else {
            "❌ disabled (set JWT_SECRET)"
        }
    );
    println!(
        "   Rate limit: {} messages / {}h",
        config.rate_limit.max_messages, config.rate_limit.window_hours
    );

    println!();
    Ok(())
}
