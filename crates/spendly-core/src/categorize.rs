//! Two-stage expense categorization
//!
//! A keyword scorer runs first. Only when it is not confident enough does the
//! AI oracle get asked, and every failure of the oracle degrades to a local
//! answer, so categorization never fails.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::ai::parsing::parse_category;
use crate::ai::{AIBackend, AIClient};
use crate::models::Category;

/// Keyword scores at or above this skip the AI oracle
pub const KEYWORD_CONFIDENCE_THRESHOLD: f64 = 0.7;

const MAX_KEYWORD_CONFIDENCE: f64 = 0.95;
const AI_CONFIDENCE: f64 = 0.8;
const FALLBACK_CONFIDENCE: f64 = 0.3;
const ERROR_FALLBACK_CONFIDENCE: f64 = 0.2;
const DEFAULT_CONFIDENCE: f64 = 0.1;

/// Keyword list and base weight for one category
struct KeywordRule {
    category: Category,
    keywords: &'static [&'static str],
    base_confidence: f64,
}

/// Table order matters: on equal scores the earlier category wins.
const KEYWORD_RULES: &[KeywordRule] = &[
    KeywordRule {
        category: Category::FoodAndDining,
        keywords: &[
            "zomato", "swiggy", "uber eats", "food panda", "dominos", "pizza hut",
            "restaurant", "cafe", "coffee", "tea", "starbucks", "ccd", "barista",
            "lunch", "dinner", "breakfast", "snack", "meal", "food", "pizza", "burger",
            "biryani", "chinese", "indian", "continental", "mcdonalds", "kfc", "subway",
            "burger king", "taco bell",
        ],
        base_confidence: 0.9,
    },
    KeywordRule {
        category: Category::Transportation,
        keywords: &[
            "uber", "ola", "lyft", "taxi", "cab", "auto", "rickshaw", "petrol", "diesel",
            "fuel", "gas", "cng", "parking", "bus", "metro", "train", "railway", "irctc",
            "ticket", "flight", "airline", "indigo", "spicejet", "toll", "highway",
        ],
        base_confidence: 0.9,
    },
    KeywordRule {
        category: Category::Shopping,
        keywords: &[
            "amazon", "flipkart", "myntra", "ajio", "nykaa", "meesho", "shopping", "mall",
            "store", "outlet", "market", "mobile", "phone", "laptop", "electronics",
            "appliance", "clothes", "shirt", "shoes", "dress", "fashion",
        ],
        base_confidence: 0.8,
    },
    KeywordRule {
        category: Category::Groceries,
        keywords: &[
            "grocery", "supermarket", "dmart", "reliance", "big bazaar", "more",
            "vegetables", "fruits", "milk", "bread", "eggs", "rice", "kirana",
            "general store", "provision", "daily needs",
        ],
        base_confidence: 0.9,
    },
    KeywordRule {
        category: Category::Entertainment,
        keywords: &[
            "netflix", "amazon prime", "hotstar", "spotify", "youtube", "movie", "cinema",
            "pvr", "inox", "ticket", "show", "game", "steam", "playstation", "xbox", "book",
            "kindle",
        ],
        base_confidence: 0.8,
    },
    KeywordRule {
        category: Category::Healthcare,
        keywords: &[
            "doctor", "hospital", "clinic", "medical", "health", "medicine", "pharmacy",
            "chemist", "apollo", "medplus", "dentist", "checkup", "consultation", "surgery",
            "treatment",
        ],
        base_confidence: 0.9,
    },
    KeywordRule {
        category: Category::Utilities,
        keywords: &[
            "electricity", "water", "gas", "bill", "utility", "internet", "wifi",
            "broadband", "mobile", "recharge", "airtel", "jio", "vodafone", "bsnl",
            "postpaid", "prepaid",
        ],
        base_confidence: 0.9,
    },
    KeywordRule {
        category: Category::Education,
        keywords: &[
            "school", "college", "university", "course", "fees", "tuition", "coaching",
            "education", "training", "certification", "book", "study", "exam", "admission",
        ],
        base_confidence: 0.8,
    },
    KeywordRule {
        category: Category::PersonalCare,
        keywords: &[
            "salon", "haircut", "spa", "massage", "beauty", "cosmetics", "gym", "fitness",
            "yoga", "personal trainer", "grooming",
        ],
        base_confidence: 0.7,
    },
];

/// Which stage produced a categorization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategorizationMethod {
    Keyword,
    Ai,
    /// Oracle answered with something outside the vocabulary
    Fallback,
    /// Oracle call failed
    ErrorFallback,
    /// Nothing to categorize
    Default,
}

impl CategorizationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Keyword => "keyword",
            Self::Ai => "ai",
            Self::Fallback => "fallback",
            Self::ErrorFallback => "error_fallback",
            Self::Default => "default",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Categorization {
    pub category: Category,
    /// In `[0, 1]`
    pub confidence: f64,
    pub method: CategorizationMethod,
}

impl Categorization {
    fn new(category: Category, confidence: f64, method: CategorizationMethod) -> Self {
        Self {
            category,
            confidence,
            method,
        }
    }
}

/// Score `text` and `vendor` against the keyword table
///
/// Returns Miscellaneous with zero confidence when nothing matches, and with
/// 0.1 (method `default`) when there is no text at all.
pub fn keyword_categorize(text: &str, vendor: &str) -> Categorization {
    let search = format!("{} {}", text, vendor).trim().to_lowercase();
    if search.is_empty() {
        return Categorization::new(
            Category::Miscellaneous,
            DEFAULT_CONFIDENCE,
            CategorizationMethod::Default,
        );
    }

    let mut best = Categorization::new(Category::Miscellaneous, 0.0, CategorizationMethod::Keyword);

    for rule in KEYWORD_RULES {
        let matched: Vec<&str> = rule
            .keywords
            .iter()
            .copied()
            .filter(|keyword| search.contains(keyword))
            .collect();
        if matched.is_empty() {
            continue;
        }

        let longest = matched.iter().map(|k| k.len()).max().unwrap_or(0) as f64 / 10.0;
        let score = ((matched.len() as f64 * 0.3 + longest * 0.7) * rule.base_confidence)
            .min(MAX_KEYWORD_CONFIDENCE);

        if score > best.confidence {
            best = Categorization::new(rule.category, score, CategorizationMethod::Keyword);
        }
    }

    best
}

/// What the oracle said
enum OracleAnswer {
    Known(Category),
    Unknown,
    Failed,
}

/// Keyword scorer with AI fallback
#[derive(Clone)]
pub struct Categorizer {
    ai: AIClient,
}

impl Categorizer {
    pub fn new(ai: AIClient) -> Self {
        Self { ai }
    }

    /// Categorize an expense; never fails
    pub async fn categorize(&self, text: &str, vendor: &str, amount: f64) -> Categorization {
        if text.trim().is_empty() && vendor.trim().is_empty() {
            warn!("Empty text and vendor for categorization");
            return Categorization::new(
                Category::Miscellaneous,
                DEFAULT_CONFIDENCE,
                CategorizationMethod::Default,
            );
        }

        let guess = keyword_categorize(text, vendor);
        if guess.confidence >= KEYWORD_CONFIDENCE_THRESHOLD {
            debug!(category = %guess.category, confidence = guess.confidence, "Keyword categorization");
            return guess;
        }

        let answer = self.ask_oracle(text, vendor, amount).await;

        // First strategy with an answer wins
        let strategies = [
            match answer {
                OracleAnswer::Known(category) => Some(Categorization::new(
                    category,
                    AI_CONFIDENCE,
                    CategorizationMethod::Ai,
                )),
                _ => None,
            },
            (guess.confidence > 0.0).then_some(guess),
            Some(match answer {
                OracleAnswer::Failed => Categorization::new(
                    Category::Miscellaneous,
                    ERROR_FALLBACK_CONFIDENCE,
                    CategorizationMethod::ErrorFallback,
                ),
                _ => Categorization::new(
                    Category::Miscellaneous,
                    FALLBACK_CONFIDENCE,
                    CategorizationMethod::Fallback,
                ),
            }),
        ];

        strategies.into_iter().flatten().next().unwrap_or(guess)
    }

    async fn ask_oracle(&self, text: &str, vendor: &str, amount: f64) -> OracleAnswer {
        match self.ai.categorize_expense(text, vendor, amount).await {
            Ok(response) => match parse_category(&response) {
                Some(category) => OracleAnswer::Known(category),
                None => {
                    warn!(answer = %response, "AI returned invalid category");
                    OracleAnswer::Unknown
                }
            },
            Err(e) => {
                warn!(error = %e, "Categorization oracle failed");
                OracleAnswer::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::MockBackend;

    fn categorizer(mock: MockBackend) -> Categorizer {
        Categorizer::new(AIClient::Mock(mock))
    }

    #[test]
    fn test_keyword_scores() {
        let result = keyword_categorize("petrol pump diesel", "");
        assert_eq!(result.category, Category::Transportation);
        assert!((result.confidence - 0.918).abs() < 1e-9);

        let result = keyword_categorize("50rs coffee at ccd", "ccd");
        assert_eq!(result.category, Category::FoodAndDining);
        assert!(result.confidence >= KEYWORD_CONFIDENCE_THRESHOLD);

        let result = keyword_categorize("uber", "");
        assert_eq!(result.category, Category::Transportation);
        assert!((result.confidence - 0.522).abs() < 1e-9);
    }

    #[test]
    fn test_keyword_no_match_and_empty() {
        let result = keyword_categorize("paid rahul 45", "");
        assert_eq!(result.category, Category::Miscellaneous);
        assert_eq!(result.confidence, 0.0);

        let result = keyword_categorize("  ", "");
        assert_eq!(result.method, CategorizationMethod::Default);
        assert_eq!(result.confidence, 0.1);
    }

    #[test]
    fn test_score_is_capped() {
        let result = keyword_categorize(
            "zomato swiggy restaurant coffee lunch dinner breakfast burger king",
            "",
        );
        assert_eq!(result.confidence, MAX_KEYWORD_CONFIDENCE);
    }

    #[tokio::test]
    async fn test_confident_keyword_skips_ai() {
        let mock = MockBackend::new().with_category("Shopping");
        let c = categorizer(mock.clone());
        let result = c.categorize("dinner at restaurant", "", 500.0).await;
        assert_eq!(result.category, Category::FoodAndDining);
        assert_eq!(result.method, CategorizationMethod::Keyword);
        assert_eq!(mock.categorize_calls(), 0);
    }

    #[tokio::test]
    async fn test_ai_used_when_no_keywords() {
        let mock = MockBackend::new().with_category("Healthcare");
        let c = categorizer(mock.clone());
        let result = c.categorize("paid rahul 45", "", 45.0).await;
        assert_eq!(result.category, Category::Healthcare);
        assert_eq!(result.method, CategorizationMethod::Ai);
        assert_eq!(result.confidence, 0.8);
        assert_eq!(mock.categorize_calls(), 1);
    }

    #[tokio::test]
    async fn test_invalid_ai_answer_falls_back() {
        let c = categorizer(MockBackend::new().with_category("Snacks"));
        let result = c.categorize("paid rahul 45", "", 45.0).await;
        assert_eq!(result.category, Category::Miscellaneous);
        assert_eq!(result.method, CategorizationMethod::Fallback);
        assert_eq!(result.confidence, 0.3);

        // A weak keyword guess beats the blind fallback
        let result = c.categorize("uber", "", 200.0).await;
        assert_eq!(result.category, Category::Transportation);
        assert_eq!(result.method, CategorizationMethod::Keyword);
    }

    #[tokio::test]
    async fn test_ai_failure_falls_back() {
        let c = categorizer(MockBackend::new().failing_categorization());
        let result = c.categorize("paid rahul 45", "", 45.0).await;
        assert_eq!(result.category, Category::Miscellaneous);
        assert_eq!(result.method, CategorizationMethod::ErrorFallback);
        assert_eq!(result.confidence, 0.2);
    }

    #[tokio::test]
    async fn test_empty_input_is_default() {
        let mock = MockBackend::new();
        let c = categorizer(mock.clone());
        let result = c.categorize("", " ", 0.0).await;
        assert_eq!(result.method, CategorizationMethod::Default);
        assert_eq!(mock.categorize_calls(), 0);
    }
}
