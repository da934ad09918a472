//! HTTP request handlers organized by domain
//!
//! Each submodule contains handlers for a specific API area.

pub mod auth;
pub mod expenses;
pub mod export;
pub mod health;
pub mod upload;
pub mod webhook;

// Re-export all handlers for use in router
pub use auth::*;
pub use expenses::*;
pub use export::*;
pub use health::*;
pub use upload::*;
pub use webhook::*;
