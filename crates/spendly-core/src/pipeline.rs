//! Expense pipeline: extract, categorize, persist, check budgets
//!
//! Text and bill photos share the same path once there is raw text. The one
//! asymmetry is failure: a photo is always saved (zeroed and Uncategorized if
//! nothing could be read), a text that can't be understood is not.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::ai::{AIBackend, AIClient, ExtractedExpense};
use crate::budget::{BudgetAlert, BudgetEvaluator};
use crate::categorize::{Categorization, Categorizer};
use crate::channels::{RandomSource, TextRecognizer};
use crate::clock::LocalCalendar;
use crate::db::Database;
use crate::error::Result;
use crate::messages::{self, SavedExpense};
use crate::models::{Category, Expense, ExpenseSource, NewExpense};

/// Description stored on an image expense nobody could read
pub const EXTRACTION_FAILED_DESCRIPTION: &str = "Auto extraction failed";

/// What happened to one expense message
#[derive(Debug, Clone)]
pub enum PipelineOutcome {
    /// Saved with extracted fields
    Recorded {
        expense: Expense,
        categorization: Categorization,
        alerts: Vec<BudgetAlert>,
        with_tip: bool,
    },
    /// Photo saved without details
    Unreadable { expense: Expense },
    /// Text not understood; nothing saved
    NotUnderstood,
}

impl PipelineOutcome {
    pub fn expense(&self) -> Option<&Expense> {
        match self {
            Self::Recorded { expense, .. } | Self::Unreadable { expense } => Some(expense),
            Self::NotUnderstood => None,
        }
    }

    /// Replies in send order: the confirmation, then one per budget alert
    pub fn replies(&self) -> Vec<String> {
        match self {
            Self::Recorded {
                expense,
                alerts,
                with_tip,
                ..
            } => {
                let date = expense
                    .structured_data
                    .as_ref()
                    .and_then(|d| d.get("date"))
                    .and_then(|d| d.as_str());
                let saved = SavedExpense {
                    amount: expense.amount,
                    vendor: expense.vendor(),
                    date,
                };
                let mut replies = vec![messages::expense_saved(
                    &saved,
                    expense.source == ExpenseSource::Image,
                    *with_tip,
                )];
                replies.extend(alerts.iter().map(BudgetAlert::message));
                replies
            }
            Self::Unreadable { .. } => vec![messages::IMAGE_UNREADABLE.to_string()],
            Self::NotUnderstood => vec![messages::PARSING_ERROR.to_string()],
        }
    }
}

#[derive(Clone)]
pub struct ExpensePipeline {
    db: Database,
    ai: AIClient,
    categorizer: Categorizer,
    budgets: BudgetEvaluator,
    ocr: Arc<dyn TextRecognizer>,
    random: Arc<dyn RandomSource>,
    calendar: LocalCalendar,
    tip_probability: f64,
}

impl ExpensePipeline {
    pub fn new(
        db: Database,
        ai: AIClient,
        ocr: Arc<dyn TextRecognizer>,
        random: Arc<dyn RandomSource>,
        calendar: LocalCalendar,
    ) -> Self {
        Self {
            categorizer: Categorizer::new(ai.clone()),
            budgets: BudgetEvaluator::new(db.clone(), calendar),
            db,
            ai,
            ocr,
            random,
            calendar,
            tip_probability: 0.2,
        }
    }

    /// Chance of appending the dashboard tip to a confirmation
    pub fn with_tip_probability(mut self, probability: f64) -> Self {
        self.tip_probability = probability;
        self
    }

    /// Record a typed expense
    pub async fn process_text(
        &self,
        user_id: i64,
        text: &str,
        now: DateTime<Utc>,
    ) -> Result<PipelineOutcome> {
        let extracted = match self.ai.extract_expense(text).await {
            Ok(extracted) => extracted,
            Err(e) => {
                info!(user_id, error = %e, "Could not extract expense from text");
                return Ok(PipelineOutcome::NotUnderstood);
            }
        };

        self.record(user_id, text, &extracted, ExpenseSource::Whatsapp, None, now)
            .await
    }

    /// Read and record a stored bill photo
    pub async fn process_image(
        &self,
        user_id: i64,
        image_url: &str,
        now: DateTime<Utc>,
    ) -> Result<PipelineOutcome> {
        let ocr_text = match self.ocr.extract_text(image_url).await {
            Ok(text) => text,
            Err(e) => {
                warn!(user_id, error = %e, "OCR failed");
                return self.save_unreadable(user_id, "", image_url, now);
            }
        };

        let extracted = match self.ai.extract_expense(&ocr_text).await {
            Ok(extracted) => extracted,
            Err(e) => {
                warn!(user_id, error = %e, "Could not extract expense from bill");
                return self.save_unreadable(user_id, &ocr_text, image_url, now);
            }
        };

        self.record(
            user_id,
            &ocr_text,
            &extracted,
            ExpenseSource::Image,
            Some(image_url),
            now,
        )
        .await
    }

    async fn record(
        &self,
        user_id: i64,
        raw_text: &str,
        extracted: &ExtractedExpense,
        source: ExpenseSource,
        image_url: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<PipelineOutcome> {
        let vendor = extracted.known_vendor().unwrap_or("");
        let categorization = self
            .categorizer
            .categorize(raw_text, vendor, extracted.total)
            .await;

        let date = extracted
            .date
            .clone()
            .unwrap_or_else(|| self.calendar.display_date(now));
        let description = format!(
            "Vendor: {} | Date: {}",
            extracted.known_vendor().unwrap_or("N/A"),
            date
        );

        let expense = self.db.insert_expense(&NewExpense {
            user_id,
            amount: extracted.total,
            category: categorization.category.as_str().to_string(),
            description: Some(description),
            source,
            raw_text: Some(raw_text.to_string()),
            image_url: image_url.map(str::to_string),
            structured_data: serde_json::to_value(extracted).ok(),
            created_at: now,
        })?;

        info!(
            user_id,
            expense_id = expense.id,
            amount = expense.amount,
            category = %expense.category,
            method = categorization.method.as_str(),
            source = %source,
            "Expense recorded"
        );

        // Budget trouble must not cost the user their confirmation
        let alerts = self
            .budgets
            .check_alerts(user_id, &expense, now)
            .unwrap_or_else(|e| {
                warn!(user_id, error = %e, "Budget alert check failed");
                Vec::new()
            });

        Ok(PipelineOutcome::Recorded {
            expense,
            categorization,
            alerts,
            with_tip: self.random.chance(self.tip_probability),
        })
    }

    fn save_unreadable(
        &self,
        user_id: i64,
        ocr_text: &str,
        image_url: &str,
        now: DateTime<Utc>,
    ) -> Result<PipelineOutcome> {
        let expense = self.db.insert_expense(&NewExpense {
            user_id,
            amount: 0.0,
            category: Category::Uncategorized.as_str().to_string(),
            description: Some(EXTRACTION_FAILED_DESCRIPTION.to_string()),
            source: ExpenseSource::Image,
            raw_text: Some(ocr_text.to_string()),
            image_url: Some(image_url.to_string()),
            structured_data: None,
            created_at: now,
        })?;
        info!(user_id, expense_id = expense.id, "Saved unreadable bill");
        Ok(PipelineOutcome::Unreadable { expense })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::{ExtractionConfidence, MockBackend};
    use crate::budget::AlertLevel;
    use crate::categorize::CategorizationMethod;
    use crate::db::ExpenseFilter;
    use crate::test_utils::{FixedRandom, ScriptedOcr};
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 15, 12, 0, 0).unwrap()
    }

    fn pipeline_with(db: &Database, ai: AIClient, ocr: ScriptedOcr, tip: bool) -> ExpensePipeline {
        ExpensePipeline::new(
            db.clone(),
            ai,
            Arc::new(ocr),
            Arc::new(FixedRandom(tip)),
            LocalCalendar::utc(),
        )
    }

    fn user(db: &Database) -> i64 {
        db.get_or_create_user("+919876543210", now()).unwrap().0.id
    }

    fn all_expenses(db: &Database, user_id: i64) -> Vec<Expense> {
        db.list_expenses(&ExpenseFilter::new().user(user_id)).unwrap()
    }

    #[tokio::test]
    async fn test_text_expense_recorded() {
        let db = Database::in_memory().unwrap();
        let user_id = user(&db);
        let pipeline = pipeline_with(&db, AIClient::mock(), ScriptedOcr::text(""), false);

        let outcome = pipeline
            .process_text(user_id, "50rs coffee at ccd", now())
            .await
            .unwrap();

        let PipelineOutcome::Recorded {
            expense,
            categorization,
            alerts,
            ..
        } = &outcome
        else {
            panic!("expected a recorded expense, got {:?}", outcome);
        };
        assert_eq!(expense.amount, 50.0);
        assert_eq!(expense.category, "Food & Dining");
        assert_eq!(expense.source, ExpenseSource::Whatsapp);
        assert_eq!(
            expense.description.as_deref(),
            Some("Vendor: ccd | Date: 15/03/2024")
        );
        assert_eq!(expense.raw_text.as_deref(), Some("50rs coffee at ccd"));
        assert_eq!(categorization.method, CategorizationMethod::Keyword);
        assert!(alerts.is_empty());

        let replies = outcome.replies();
        assert_eq!(replies.len(), 1);
        assert!(replies[0].contains("₹50 spent at ccd on today"));
    }

    #[tokio::test]
    async fn test_same_text_twice_records_twice() {
        let db = Database::in_memory().unwrap();
        let user_id = user(&db);
        let pipeline = pipeline_with(&db, AIClient::mock(), ScriptedOcr::text(""), false);

        for _ in 0..2 {
            pipeline
                .process_text(user_id, "paid 200 to uber", now())
                .await
                .unwrap();
        }
        assert_eq!(all_expenses(&db, user_id).len(), 2);
    }

    #[tokio::test]
    async fn test_unreadable_text_is_not_saved() {
        let db = Database::in_memory().unwrap();
        let user_id = user(&db);
        let ai = AIClient::Mock(MockBackend::new().failing_extraction());
        let pipeline = pipeline_with(&db, ai, ScriptedOcr::text(""), false);

        let outcome = pipeline
            .process_text(user_id, "coffee with friends", now())
            .await
            .unwrap();

        assert!(matches!(outcome, PipelineOutcome::NotUnderstood));
        assert_eq!(outcome.replies(), vec![messages::PARSING_ERROR.to_string()]);
        assert!(all_expenses(&db, user_id).is_empty());
    }

    #[tokio::test]
    async fn test_unreadable_image_is_still_saved() {
        let db = Database::in_memory().unwrap();
        let user_id = user(&db);
        let ai = AIClient::Mock(MockBackend::new().failing_extraction());
        let pipeline = pipeline_with(&db, ai, ScriptedOcr::text("blurry"), false);

        let outcome = pipeline
            .process_image(user_id, "https://img/bill.jpg", now())
            .await
            .unwrap();

        assert!(matches!(outcome, PipelineOutcome::Unreadable { .. }));
        let saved = all_expenses(&db, user_id);
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].amount, 0.0);
        assert_eq!(saved[0].category, "Uncategorized");
        assert_eq!(saved[0].description.as_deref(), Some(EXTRACTION_FAILED_DESCRIPTION));
        assert_eq!(saved[0].raw_text.as_deref(), Some("blurry"));
        assert_eq!(saved[0].image_url.as_deref(), Some("https://img/bill.jpg"));
        assert_eq!(saved[0].source, ExpenseSource::Image);
    }

    #[tokio::test]
    async fn test_ocr_failure_is_still_saved() {
        let db = Database::in_memory().unwrap();
        let user_id = user(&db);
        let pipeline = pipeline_with(&db, AIClient::mock(), ScriptedOcr::failing(), false);

        let outcome = pipeline
            .process_image(user_id, "https://img/bill.jpg", now())
            .await
            .unwrap();

        assert_eq!(outcome.replies(), vec![messages::IMAGE_UNREADABLE.to_string()]);
        assert_eq!(outcome.expense().unwrap().raw_text.as_deref(), Some(""));
    }

    #[tokio::test]
    async fn test_image_expense_uses_receipt_fields() {
        let db = Database::in_memory().unwrap();
        let user_id = user(&db);
        let ai = AIClient::Mock(MockBackend::new().with_extraction(ExtractedExpense {
            total: 1250.0,
            vendor: "Big Bazaar".to_string(),
            date: Some("12/03/2024".to_string()),
            items: vec!["rice".into(), "dal".into()],
            confidence: ExtractionConfidence::High,
        }));
        let pipeline = pipeline_with(
            &db,
            ai,
            ScriptedOcr::text("BIG BAZAAR\nrice dal vegetables\nTOTAL 1250"),
            true,
        );

        let outcome = pipeline
            .process_image(user_id, "https://img/bill.jpg", now())
            .await
            .unwrap();

        let expense = outcome.expense().unwrap();
        assert_eq!(expense.category, "Groceries");
        assert_eq!(expense.source, ExpenseSource::Image);
        assert_eq!(
            expense.description.as_deref(),
            Some("Vendor: Big Bazaar | Date: 12/03/2024")
        );
        assert_eq!(expense.structured_data.as_ref().unwrap()["total"], 1250.0);

        let replies = outcome.replies();
        assert!(replies[0].starts_with("✅ *Bill processed successfully!*"));
        assert!(replies[0].contains("📅 *Date:* 12/03/2024"));
        assert!(replies[0].ends_with(messages::DASHBOARD_TIP));
    }

    #[tokio::test]
    async fn test_alerts_follow_confirmation_in_order() {
        let db = Database::in_memory().unwrap();
        let user_id = user(&db);
        let evaluator = BudgetEvaluator::new(db.clone(), LocalCalendar::utc());
        evaluator
            .set_budget(user_id, "Food & Dining", 5000.0, "monthly", now())
            .unwrap();

        let pipeline = pipeline_with(&db, AIClient::mock(), ScriptedOcr::text(""), false);
        let mut levels = Vec::new();
        for _ in 0..3 {
            let outcome = pipeline
                .process_text(user_id, "2000 dinner at restaurant", now())
                .await
                .unwrap();
            let PipelineOutcome::Recorded { alerts, .. } = &outcome else {
                panic!("expected a recorded expense");
            };
            levels.push(alerts.iter().map(|a| a.level).collect::<Vec<_>>());

            let replies = outcome.replies();
            assert_eq!(replies.len(), 1 + alerts.len());
            assert!(replies[0].starts_with("✅"));
        }

        assert_eq!(
            levels,
            vec![vec![], vec![AlertLevel::Warning], vec![AlertLevel::Exceeded]]
        );
    }
}
