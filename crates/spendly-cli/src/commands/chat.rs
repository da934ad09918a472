//! Local conversation with the bot
//!
//! Messages go through the same router as the webhook. Outbound messages
//! are logged rather than sent, and the replies are printed.

use std::sync::Arc;

use anyhow::{Context, Result};
use spendly_core::ai::AIClient;
use spendly_core::channels::{Channels, LogMessenger};
use spendly_core::config::Config;
use spendly_core::db::Database;
use spendly_core::router::{ConversationRouter, HandleOutcome, InboundMessage, RouterSettings};
use spendly_server::MagicLinks;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

/// Router wired like the server's, minus real outbound delivery
pub fn chat_router(db: Database, ai: AIClient, config: &Config) -> Result<ConversationRouter> {
    let channels = Channels {
        messenger: Arc::new(LogMessenger),
        ..Channels::from_config(config).context("Failed to set up channels")?
    };

    let mut router = ConversationRouter::new(db, ai, channels, RouterSettings::from_config(config));
    if let Some(links) = MagicLinks::from_settings(&config.dashboard) {
        router = router.with_link_issuer(Arc::new(links));
    }
    Ok(router)
}

/// Replies for one message, in order
pub async fn chat_replies(
    router: &ConversationRouter,
    phone: &str,
    message: &str,
) -> Result<Vec<String>> {
    let inbound = InboundMessage::text(&format!("whatsapp:{}", phone), message);
    let outcome = router.handle(&inbound).await?;
    Ok(match outcome {
        HandleOutcome::Replied { replies, .. } => replies,
        HandleOutcome::RateLimited => {
            vec!["⛔ Daily message limit reached, try again later.".to_string()]
        }
        HandleOutcome::Ignored(_) => Vec::new(),
    })
}

pub async fn cmd_chat_once(router: &ConversationRouter, phone: &str, message: &str) -> Result<()> {
    for reply in chat_replies(router, phone, message).await? {
        println!("{}\n", reply);
    }
    Ok(())
}

pub async fn cmd_chat_repl(router: &ConversationRouter, phone: &str) -> Result<()> {
    println!("💬 Chatting as {} (Ctrl+D to quit)", phone);
    println!();

    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        for reply in chat_replies(router, phone, &line).await? {
            println!("{}\n", reply);
        }
    }

    println!();
    Ok(())
}
