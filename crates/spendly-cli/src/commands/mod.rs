//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `core` - Shared utilities (open_db, load_config, ai_client) and init
//! - `serve` - Web server command
//! - `chat` - Local conversation with the bot
//! - `reports` - Expense and budget listings for one user
//! - `status` - Database and channel status

pub mod chat;
pub mod core;
pub mod reports;
pub mod serve;
pub mod status;

// Re-export command functions for main.rs
pub use chat::*;
pub use core::*;
pub use reports::*;
pub use serve::*;
pub use status::*;

/// Truncate a string to a maximum length, adding "..." if truncated
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
