//! Conversation router
//!
//! Takes one inbound webhook event and produces the bot's replies. The only
//! state carried between events is the user's first-time flag; everything
//! else is decided from the message itself.
//!
//! Replies for one event are sent in order. The low-quota warning is the
//! exception: it is sent from a spawned task so it never delays the answer.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, error, info, warn};

use crate::ai::AIClient;
use crate::analytics::QueryAnalytics;
use crate::budget::{budget_help, BudgetEvaluator};
use crate::channels::{bare_phone, Channels, LoginLinkIssuer};
use crate::clock::{Clock, LocalCalendar, SystemClock};
use crate::config::Config;
use crate::db::Database;
use crate::error::Result;
use crate::intent::{self, Command, Intent};
use crate::messages;
use crate::models::User;
use crate::pipeline::ExpensePipeline;
use crate::rate_limit::{RateLimitConfig, RateLimiter};

/// Inbound Twilio webhook form
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InboundMessage {
    #[serde(rename = "From")]
    pub from: Option<String>,
    #[serde(rename = "Body")]
    pub body: Option<String>,
    #[serde(rename = "NumMedia")]
    pub num_media: Option<String>,
    #[serde(rename = "MediaUrl0")]
    pub media_url: Option<String>,
    #[serde(rename = "MediaContentType0")]
    pub media_content_type: Option<String>,
    #[serde(rename = "MessageStatus")]
    pub message_status: Option<String>,
    #[serde(rename = "SmsStatus")]
    pub sms_status: Option<String>,
    #[serde(rename = "Payload")]
    pub payload: Option<String>,
}

impl InboundMessage {
    /// Plain text message from `from`
    pub fn text(from: &str, body: &str) -> Self {
        Self {
            from: Some(from.to_string()),
            body: Some(body.to_string()),
            num_media: Some("0".to_string()),
            ..Self::default()
        }
    }

    /// Single attachment from `from`
    pub fn media(from: &str, url: &str, content_type: &str) -> Self {
        Self {
            from: Some(from.to_string()),
            num_media: Some("1".to_string()),
            media_url: Some(url.to_string()),
            media_content_type: Some(content_type.to_string()),
            ..Self::default()
        }
    }

    /// Delivery receipts and other non-content callbacks
    pub fn is_status_callback(&self) -> bool {
        let not_received =
            |status: &Option<String>| status.as_deref().is_some_and(|s| s != "received");
        not_received(&self.message_status)
            || not_received(&self.sms_status)
            || self.payload.as_deref().is_some_and(|p| !p.is_empty())
    }

    /// Unparseable counts are treated as no media
    pub fn media_count(&self) -> u32 {
        self.num_media
            .as_deref()
            .and_then(|n| n.trim().parse().ok())
            .unwrap_or(0)
    }
}

/// Why an event produced no reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    StatusCallback,
    MissingSender,
}

/// Which branch handled an event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Command(Command),
    Greeting,
    BudgetCommand,
    Query,
    Expense,
    Image,
    ImageRequired,
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandleOutcome {
    Ignored(IgnoreReason),
    RateLimited,
    /// Replies in the order they were sent
    Replied { route: Route, replies: Vec<String> },
}

impl HandleOutcome {
    pub fn replies(&self) -> &[String] {
        match self {
            Self::Replied { replies, .. } => replies,
            _ => &[],
        }
    }
}

/// Tunables taken from config
#[derive(Debug, Clone, Copy)]
pub struct RouterSettings {
    pub calendar: LocalCalendar,
    pub rate_limit: RateLimitConfig,
    pub warn_remaining: u32,
    pub tip_probability: f64,
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl RouterSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            calendar: config.calendar(),
            rate_limit: config.rate_limit_config(),
            warn_remaining: config.rate_limit.warn_remaining,
            tip_probability: config.bot.dashboard_tip_probability,
        }
    }
}

pub struct ConversationRouter {
    db: Database,
    ai: AIClient,
    channels: Channels,
    pipeline: ExpensePipeline,
    budgets: BudgetEvaluator,
    analytics: QueryAnalytics,
    limiter: Arc<RateLimiter>,
    links: Option<Arc<dyn LoginLinkIssuer>>,
    clock: Arc<dyn Clock>,
    warn_remaining: u32,
}

impl ConversationRouter {
    pub fn new(db: Database, ai: AIClient, channels: Channels, settings: RouterSettings) -> Self {
        let pipeline = ExpensePipeline::new(
            db.clone(),
            ai.clone(),
            channels.ocr.clone(),
            channels.random.clone(),
            settings.calendar,
        )
        .with_tip_probability(settings.tip_probability);

        Self {
            budgets: BudgetEvaluator::new(db.clone(), settings.calendar),
            analytics: QueryAnalytics::new(db.clone(), settings.calendar),
            limiter: Arc::new(RateLimiter::new(settings.rate_limit)),
            links: None,
            clock: Arc::new(SystemClock),
            warn_remaining: settings.warn_remaining,
            pipeline,
            channels,
            db,
            ai,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_link_issuer(mut self, links: Arc<dyn LoginLinkIssuer>) -> Self {
        self.links = Some(links);
        self
    }

    /// Share a limiter (e.g. with the sweep job)
    pub fn with_rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = limiter;
        self
    }

    pub fn rate_limiter(&self) -> Arc<RateLimiter> {
        Arc::clone(&self.limiter)
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn ai(&self) -> &AIClient {
        &self.ai
    }

    /// Handle one webhook event
    ///
    /// Only fails if the user record itself can't be loaded; every other
    /// failure becomes a reply.
    pub async fn handle(&self, message: &InboundMessage) -> Result<HandleOutcome> {
        if message.is_status_callback() {
            debug!(
                status = ?message.message_status.as_ref().or(message.sms_status.as_ref()),
                "Status callback acknowledged"
            );
            return Ok(HandleOutcome::Ignored(IgnoreReason::StatusCallback));
        }

        let Some(from) = message.from.as_deref().filter(|f| !f.trim().is_empty()) else {
            warn!("Inbound message without From, ignoring");
            return Ok(HandleOutcome::Ignored(IgnoreReason::MissingSender));
        };

        let phone = bare_phone(from);
        let now = self.clock.now();
        let (user, created) = self.db.get_or_create_user(phone, now)?;
        if created {
            info!(phone = %phone, user_id = user.id, "New user");
        }

        let decision = self.limiter.check(phone, now);
        if !decision.allowed {
            info!(phone = %phone, count = decision.current_count, "Rate limited");
            self.send(phone, &messages::rate_limited(decision.reset_in))
                .await;
            return Ok(HandleOutcome::RateLimited);
        }
        if decision.remaining <= self.warn_remaining {
            self.warn_in_background(phone, decision.remaining);
        }

        let body = message.body.as_deref().map(str::trim).unwrap_or("");
        let (route, replies) = if message.media_count() > 0 {
            self.handle_media(&user, message, now).await
        } else if !body.is_empty() {
            self.handle_text(&user, body, now).await
        } else {
            let first_time = self.consume_first_time(&user);
            (Route::Empty, vec![messages::welcome(first_time).to_string()])
        };

        for reply in &replies {
            self.send(phone, reply).await;
        }

        debug!(phone = %phone, route = ?route, replies = replies.len(), "Message handled");
        Ok(HandleOutcome::Replied { route, replies })
    }

    async fn handle_text(
        &self,
        user: &User,
        body: &str,
        now: DateTime<Utc>,
    ) -> (Route, Vec<String>) {
        match intent::classify(body) {
            Intent::Command(command) => {
                let reply = match self.run_command(command, user, now) {
                    Ok(reply) => reply,
                    Err(e) => {
                        error!(command = ?command, error = %e, "Command failed");
                        messages::COMMAND_FAILED.to_string()
                    }
                };
                (Route::Command(command), vec![reply])
            }
            Intent::Greeting => {
                let first_time = self.consume_first_time(user);
                (Route::Greeting, vec![messages::welcome(first_time).to_string()])
            }
            Intent::BudgetCommand(text) => {
                let reply = self
                    .budgets
                    .handle_command(&self.ai, &text, user.id, now)
                    .await;
                (Route::BudgetCommand, vec![reply])
            }
            Intent::NaturalQuery(text) => {
                let reply = self.analytics.answer(&self.ai, &text, user.id, now).await;
                (Route::Query, vec![reply])
            }
            Intent::Expense(text) => {
                let mut replies = self.onboarding(user);
                match self.pipeline.process_text(user.id, &text, now).await {
                    Ok(outcome) => replies.extend(outcome.replies()),
                    Err(e) => {
                        error!(user_id = user.id, error = %e, "Expense processing failed");
                        replies.push(messages::GENERAL_ERROR.to_string());
                    }
                }
                (Route::Expense, replies)
            }
        }
    }

    async fn handle_media(
        &self,
        user: &User,
        message: &InboundMessage,
        now: DateTime<Utc>,
    ) -> (Route, Vec<String>) {
        let content_type = message.media_content_type.as_deref().unwrap_or("");
        let url = match message.media_url.as_deref() {
            Some(url) if content_type.starts_with("image/") => url,
            _ => {
                info!(content_type, "Rejected non-image attachment");
                return (
                    Route::ImageRequired,
                    vec![messages::IMAGE_REQUIRED.to_string()],
                );
            }
        };

        let mut replies = self.onboarding(user);
        match self.store_and_process(user, url, content_type, now).await {
            Ok(outcome) => replies.extend(outcome),
            Err(e) => {
                error!(user_id = user.id, error = %e, "Image processing failed");
                replies.push(messages::GENERAL_ERROR.to_string());
            }
        }
        (Route::Image, replies)
    }

    async fn store_and_process(
        &self,
        user: &User,
        url: &str,
        content_type: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<String>> {
        let bytes = self.channels.media.fetch(url).await?;
        let stored = self.channels.images.upload(&bytes, content_type).await?;
        info!(user_id = user.id, store = self.channels.images.name(), "Bill image stored");
        let outcome = self.pipeline.process_image(user.id, &stored, now).await?;
        Ok(outcome.replies())
    }

    fn run_command(&self, command: Command, user: &User, now: DateTime<Utc>) -> Result<String> {
        Ok(match command {
            Command::Help => messages::help().to_string(),
            Command::Summary => self.analytics.summary(user.id, now)?,
            Command::Today => self.analytics.today(user.id, now)?,
            Command::Week => self.analytics.week(user.id, now)?,
            Command::Categories => self.analytics.categories(user.id)?,
            Command::ListBudgets => self.budgets.list(user.id, now)?,
            Command::BudgetStatus => self.budgets.status(user.id, None, now)?,
            Command::BudgetHelp => budget_help(),
            Command::Login => self.login_reply(user),
        })
    }

    fn login_reply(&self, user: &User) -> String {
        let Some(links) = self.links.as_ref() else {
            warn!("Login requested but no link issuer is configured");
            return messages::LOGIN_FAILED.to_string();
        };
        match links.issue(&user.phone_number) {
            Ok(link) => messages::login_link(&link, links.ttl_minutes()),
            Err(e) => {
                error!(user_id = user.id, error = %e, "Failed to issue login link");
                messages::LOGIN_FAILED.to_string()
            }
        }
    }

    /// Welcome plus follow-up, once per user, ahead of their first expense
    fn onboarding(&self, user: &User) -> Vec<String> {
        if self.consume_first_time(user) {
            vec![
                messages::welcome(true).to_string(),
                messages::FIRST_EXPENSE_FOLLOW_UP.to_string(),
            ]
        } else {
            Vec::new()
        }
    }

    /// True only for the event that flipped the flag
    fn consume_first_time(&self, user: &User) -> bool {
        if !user.is_first_time {
            return false;
        }
        self.db.consume_first_time(user.id).unwrap_or_else(|e| {
            warn!(user_id = user.id, error = %e, "Failed to clear first-time flag");
            false
        })
    }

    fn warn_in_background(&self, phone: &str, remaining: u32) {
        let messenger = Arc::clone(&self.channels.messenger);
        let phone = phone.to_string();
        tokio::spawn(async move {
            if let Err(e) = messenger
                .send(&phone, &messages::rate_limit_warning(remaining))
                .await
            {
                warn!(phone = %phone, error = %e, "Failed to send quota warning");
            }
        });
    }

    /// Send and log failures; a lost reply never fails the event
    async fn send(&self, phone: &str, body: &str) {
        if let Err(e) = self.channels.messenger.send(phone, body).await {
            warn!(
                phone = %phone,
                messenger = self.channels.messenger.name(),
                error = %e,
                "Failed to send reply"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_callbacks() {
        let mut message = InboundMessage::text("whatsapp:+1555", "hi");
        assert!(!message.is_status_callback());

        message.sms_status = Some("received".to_string());
        assert!(!message.is_status_callback());

        message.message_status = Some("delivered".to_string());
        assert!(message.is_status_callback());

        let payload = InboundMessage {
            payload: Some("{\"error\":1}".to_string()),
            ..InboundMessage::default()
        };
        assert!(payload.is_status_callback());
    }

    #[test]
    fn test_media_count() {
        assert_eq!(InboundMessage::text("a", "b").media_count(), 0);
        assert_eq!(InboundMessage::media("a", "u", "image/jpeg").media_count(), 1);
        let garbled = InboundMessage {
            num_media: Some("lots".to_string()),
            ..InboundMessage::default()
        };
        assert_eq!(garbled.media_count(), 0);
    }

    #[test]
    fn test_settings_from_config() {
        let mut config = Config::default();
        config.rate_limit.warn_remaining = 1;
        config.bot.timezone_offset_minutes = 330;

        let settings = RouterSettings::from_config(&config);
        assert_eq!(settings.warn_remaining, 1);
        assert_eq!(settings.rate_limit.max_messages, 10);
        assert_eq!(settings.calendar.offset_minutes(), 330);
    }

    use crate::db::ExpenseFilter;
    use crate::models::ExpenseSource;
    use crate::pipeline::EXTRACTION_FAILED_DESCRIPTION;
    use crate::test_utils::{
        FixedLinkIssuer, ManualClock, MemoryImageStore, RecordingMessenger, ScriptedOcr,
        StaticFetcher, TestChannels,
    };
    use chrono::{Duration, TimeZone};

    const FROM: &str = "whatsapp:+919800000001";
    const PHONE: &str = "+919800000001";

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 15, 12, 0, 0).unwrap()
    }

    struct Harness {
        router: ConversationRouter,
        channels: TestChannels,
        clock: Arc<ManualClock>,
    }

    impl Harness {
        fn new(channels: TestChannels) -> Self {
            Self::with_settings(channels, RouterSettings::default())
        }

        fn with_settings(channels: TestChannels, settings: RouterSettings) -> Self {
            let clock = Arc::new(ManualClock::new(now()));
            let router = ConversationRouter::new(
                Database::in_memory().unwrap(),
                AIClient::mock(),
                channels.channels(),
                settings,
            )
            .with_clock(clock.clone());
            Self {
                router,
                channels,
                clock,
            }
        }

        async fn text(&self, body: &str) -> HandleOutcome {
            self.router
                .handle(&InboundMessage::text(FROM, body))
                .await
                .unwrap()
        }

        fn expenses(&self) -> Vec<crate::models::Expense> {
            self.router
                .database()
                .list_expenses(&ExpenseFilter::new())
                .unwrap()
        }
    }

    fn route(outcome: &HandleOutcome) -> &Route {
        match outcome {
            HandleOutcome::Replied { route, .. } => route,
            other => panic!("expected a reply, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_first_expense_gets_onboarding() {
        let harness = Harness::new(TestChannels::default());

        let outcome = harness.text("50rs coffee at ccd").await;
        assert_eq!(route(&outcome), &Route::Expense);

        let replies = outcome.replies();
        assert_eq!(replies.len(), 3);
        assert_eq!(replies[0], messages::welcome(true));
        assert_eq!(replies[1], messages::FIRST_EXPENSE_FOLLOW_UP);
        assert!(replies[2].starts_with("✅ *Expense saved!*"));
        assert!(replies[2].contains("₹50 spent at ccd on 15/03/2024"));

        let sent = harness.channels.messenger.sent();
        assert_eq!(sent.len(), 3);
        assert!(sent.iter().all(|m| m.to == PHONE));

        let expenses = harness.expenses();
        assert_eq!(expenses.len(), 1);
        assert_eq!(expenses[0].amount, 50.0);
        assert_eq!(expenses[0].category, "Food & Dining");
        assert_eq!(expenses[0].source, ExpenseSource::Whatsapp);

        // Onboarding happens once
        let outcome = harness.text("100 lunch at office canteen").await;
        assert_eq!(outcome.replies().len(), 1);
        assert_eq!(harness.expenses().len(), 2);
    }

    #[tokio::test]
    async fn test_greeting_consumes_onboarding() {
        let harness = Harness::new(TestChannels::default());

        let first = harness.text("Hi").await;
        assert_eq!(route(&first), &Route::Greeting);
        assert_eq!(first.replies(), [messages::welcome(true).to_string()]);

        let second = harness.text("hello").await;
        assert_eq!(second.replies(), [messages::welcome(false).to_string()]);

        let expense = harness.text("50rs coffee at ccd").await;
        assert_eq!(expense.replies().len(), 1);
    }

    #[tokio::test]
    async fn test_commands_do_not_consume_onboarding() {
        let harness = Harness::new(TestChannels::default());

        let help = harness.text("help").await;
        assert_eq!(route(&help), &Route::Command(Command::Help));
        assert_eq!(help.replies(), [messages::help().to_string()]);

        let summary = harness.text("summary").await;
        assert!(summary.replies()[0].contains("No expenses tracked yet"));

        let expense = harness.text("50rs coffee at ccd").await;
        assert_eq!(expense.replies().len(), 3);
    }

    #[tokio::test]
    async fn test_unreadable_text_saves_nothing() {
        let harness = Harness::new(TestChannels::default());
        harness.text("hi").await;

        let outcome = harness.text("no idea what this is").await;
        assert_eq!(route(&outcome), &Route::Expense);
        assert_eq!(outcome.replies(), [messages::PARSING_ERROR.to_string()]);
        assert!(harness.expenses().is_empty());
    }

    #[tokio::test]
    async fn test_bill_photo_is_stored_and_recorded() {
        let channels = TestChannels {
            ocr: ScriptedOcr::text("Cafe Coffee Day\nTotal 250"),
            ..TestChannels::default()
        };
        let harness = Harness::new(channels);
        harness.text("hi").await;

        let outcome = harness
            .router
            .handle(&InboundMessage::media(FROM, "https://api.twilio.com/m/1", "image/jpeg"))
            .await
            .unwrap();
        assert_eq!(route(&outcome), &Route::Image);
        assert!(outcome.replies()[0].starts_with("✅ *Bill processed successfully!*"));
        assert!(outcome.replies()[0].contains("₹250"));

        assert_eq!(harness.channels.images.uploads().len(), 1);
        let expenses = harness.expenses();
        assert_eq!(expenses[0].source, ExpenseSource::Image);
        assert_eq!(expenses[0].image_url.as_deref(), Some("memory://images/1"));
        assert_eq!(expenses[0].amount, 250.0);
    }

    #[tokio::test]
    async fn test_unreadable_photo_is_kept() {
        let harness = Harness::new(TestChannels::default());
        harness.text("hi").await;

        let outcome = harness
            .router
            .handle(&InboundMessage::media(FROM, "https://x/m/2", "image/png"))
            .await
            .unwrap();
        assert_eq!(outcome.replies(), [messages::IMAGE_UNREADABLE.to_string()]);

        let expenses = harness.expenses();
        assert_eq!(expenses.len(), 1);
        assert_eq!(expenses[0].amount, 0.0);
        assert_eq!(expenses[0].category, "Uncategorized");
        assert_eq!(
            expenses[0].description.as_deref(),
            Some(EXTRACTION_FAILED_DESCRIPTION)
        );
    }

    #[tokio::test]
    async fn test_non_image_attachment_is_rejected() {
        let harness = Harness::new(TestChannels::default());

        let outcome = harness
            .router
            .handle(&InboundMessage::media(FROM, "https://x/doc.pdf", "application/pdf"))
            .await
            .unwrap();
        assert_eq!(route(&outcome), &Route::ImageRequired);
        assert_eq!(outcome.replies(), [messages::IMAGE_REQUIRED.to_string()]);
        assert!(harness.channels.images.uploads().is_empty());

        // The rejection didn't use up the welcome
        let greeting = harness.text("hi").await;
        assert_eq!(greeting.replies(), [messages::welcome(true).to_string()]);
    }

    #[tokio::test]
    async fn test_storage_failure_is_general_error() {
        let channels = TestChannels {
            images: MemoryImageStore::failing(),
            ..TestChannels::default()
        };
        let harness = Harness::new(channels);
        harness.text("hi").await;

        let outcome = harness
            .router
            .handle(&InboundMessage::media(FROM, "https://x/m/3", "image/jpeg"))
            .await
            .unwrap();
        assert_eq!(outcome.replies(), [messages::GENERAL_ERROR.to_string()]);
        assert!(harness.expenses().is_empty());

        let channels = TestChannels {
            media: StaticFetcher::failing(),
            ..TestChannels::default()
        };
        let harness = Harness::new(channels);
        harness.text("hi").await;
        let outcome = harness
            .router
            .handle(&InboundMessage::media(FROM, "https://x/m/4", "image/jpeg"))
            .await
            .unwrap();
        assert_eq!(outcome.replies(), [messages::GENERAL_ERROR.to_string()]);
    }

    #[tokio::test]
    async fn test_ignored_events_send_nothing() {
        let harness = Harness::new(TestChannels::default());

        let mut status = InboundMessage::text(FROM, "hi");
        status.message_status = Some("delivered".to_string());
        assert_eq!(
            harness.router.handle(&status).await.unwrap(),
            HandleOutcome::Ignored(IgnoreReason::StatusCallback)
        );

        let anonymous = InboundMessage {
            body: Some("50 coffee".to_string()),
            ..InboundMessage::default()
        };
        assert_eq!(
            harness.router.handle(&anonymous).await.unwrap(),
            HandleOutcome::Ignored(IgnoreReason::MissingSender)
        );

        assert!(harness.channels.messenger.sent().is_empty());
        assert_eq!(harness.router.database().count_users().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_empty_message_gets_welcome() {
        let harness = Harness::new(TestChannels::default());
        let outcome = harness.text("   ").await;
        assert_eq!(route(&outcome), &Route::Empty);
        assert_eq!(outcome.replies(), [messages::welcome(true).to_string()]);
    }

    #[tokio::test]
    async fn test_rate_limit_warns_then_blocks() {
        let settings = RouterSettings {
            rate_limit: RateLimitConfig {
                max_messages: 3,
                window: Duration::hours(24),
            },
            warn_remaining: 1,
            ..RouterSettings::default()
        };
        let harness = Harness::with_settings(TestChannels::default(), settings);

        for _ in 0..3 {
            assert!(matches!(
                harness.text("help").await,
                HandleOutcome::Replied { .. }
            ));
        }
        assert_eq!(harness.text("help").await, HandleOutcome::RateLimited);

        let bodies: Vec<String> = harness
            .channels
            .messenger
            .wait_for(6)
            .await
            .into_iter()
            .map(|m| m.body)
            .collect();
        assert_eq!(bodies.len(), 6);
        assert!(bodies.contains(&messages::rate_limit_warning(1)));
        assert!(bodies.contains(&messages::rate_limit_warning(0)));
        assert!(bodies.iter().any(|b| b.contains("Daily limit reached")));

        // A new window admits the user again
        harness.clock.advance(Duration::hours(24));
        assert!(matches!(
            harness.text("help").await,
            HandleOutcome::Replied { .. }
        ));
    }

    #[tokio::test]
    async fn test_budget_alert_follows_expense() {
        let harness = Harness::new(TestChannels::default());
        harness.text("hi").await;

        let set = harness.text("Set budget for food as 5000 monthly").await;
        assert_eq!(route(&set), &Route::BudgetCommand);
        assert!(set.replies()[0].contains("Budget Set!"));

        let spend = harness.text("4500 dinner at restaurant").await;
        let replies = spend.replies();
        assert_eq!(replies.len(), 2);
        assert!(replies[1].contains("BUDGET ALERT"));
        assert!(replies[1].contains("Food & Dining"));

        let status = harness.text("budget status").await;
        assert!(status.replies()[0].contains("💸 Spent: ₹4,500 (90.0%)"));
    }

    #[tokio::test]
    async fn test_spending_question_is_answered() {
        let harness = Harness::new(TestChannels::default());
        harness.text("hi").await;
        harness.text("50rs coffee at ccd").await;

        let outcome = harness
            .text("how much did I spend on food this month")
            .await;
        assert_eq!(route(&outcome), &Route::Query);
        assert!(outcome.replies()[0].contains("50"));
        assert_eq!(harness.expenses().len(), 1);
    }

    #[tokio::test]
    async fn test_login_link() {
        let harness = Harness::new(TestChannels::default());
        let outcome = harness.text("login").await;
        assert_eq!(outcome.replies(), [messages::LOGIN_FAILED.to_string()]);

        let channels = TestChannels::default();
        let router = ConversationRouter::new(
            Database::in_memory().unwrap(),
            AIClient::mock(),
            channels.channels(),
            RouterSettings::default(),
        )
        .with_link_issuer(Arc::new(FixedLinkIssuer::new("http://localhost:3001")));

        let outcome = router
            .handle(&InboundMessage::text(FROM, "dashboard"))
            .await
            .unwrap();
        assert_eq!(route(&outcome), &Route::Command(Command::Login));
        assert!(outcome.replies()[0]
            .contains("http://localhost:3001/dashboard?token=test-919800000001"));
        assert!(outcome.replies()[0].contains("valid for 15 minutes"));
    }

    #[tokio::test]
    async fn test_send_failures_do_not_fail_the_event() {
        let channels = TestChannels {
            messenger: RecordingMessenger::failing(),
            ..TestChannels::default()
        };
        let harness = Harness::new(channels);

        let outcome = harness.text("50rs coffee at ccd").await;
        assert_eq!(outcome.replies().len(), 3);
        // Every reply was still attempted
        assert_eq!(harness.channels.messenger.sent().len(), 3);
        assert_eq!(harness.expenses().len(), 1);
    }
}
