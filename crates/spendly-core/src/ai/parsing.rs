//! JSON parsing helpers for AI backend responses
//!
//! These functions extract JSON from AI model responses, which often include
//! code fences or extra text around the payload, and validate the fields
//! before anything downstream sees them.

use chrono::{Datelike, NaiveDate};

use crate::error::{Error, Result};
use crate::models::Category;

use super::types::{
    AnalysisType, BudgetCommand, BudgetCommandParse, ExtractedExpense, ExtractionConfidence,
    ParsedQuery, QueryParse, RawBudgetCommand, RawExtraction, RawQuery,
};

pub const QUERY_NOT_UNDERSTOOD: &str = "Could not understand the query";
pub const BUDGET_NOT_UNDERSTOOD: &str = "Could not understand the budget command";
pub const INVALID_AMOUNT: &str = "Invalid amount";

/// Remove Markdown code fences a model wrapped around its answer
pub fn strip_code_fences(response: &str) -> &str {
    let trimmed = response.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop an optional language tag on the opening fence
    let rest = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

fn truncate(s: &str) -> String {
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s.to_string()
    }
}

/// Find the first balanced `{...}` object in a response
pub fn extract_json_object(response: &str) -> Result<&str> {
    let response = strip_code_fences(response);

    if let Some(start) = response.find('{') {
        let mut depth = 0;
        let mut in_string = false;
        let mut escaped = false;

        for (i, c) in response[start..].char_indices() {
            if in_string {
                match c {
                    _ if escaped => escaped = false,
                    '\\' => escaped = true,
                    '"' => in_string = false,
                    _ => {}
                }
                continue;
            }
            match c {
                '"' => in_string = true,
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(&response[start..=start + i]);
                    }
                }
                _ => {}
            }
        }
    }

    Err(Error::InvalidData(format!(
        "No JSON found in AI response | Raw: {}",
        truncate(response)
    )))
}

/// Read a money amount from a JSON number or a string like "₹1,250.50"
///
/// Returns `None` for anything that is not a finite, non-negative number.
pub fn parse_amount(value: &serde_json::Value) -> Option<f64> {
    let amount = match value {
        serde_json::Value::Number(n) => n.as_f64()?,
        serde_json::Value::String(s) => {
            let lowered = s.trim().to_lowercase();
            let cleaned: String = lowered
                .trim_start_matches('₹')
                .trim_start_matches("inr")
                .trim_start_matches("rs.")
                .trim_start_matches("rs")
                .trim_end_matches("rs")
                .chars()
                .filter(|c| !c.is_whitespace() && *c != ',')
                .collect();
            cleaned.parse::<f64>().ok()?
        }
        _ => return None,
    };

    (amount.is_finite() && amount >= 0.0).then_some(amount)
}

/// Parse and validate an extraction payload
pub fn parse_extraction(response: &str) -> Result<ExtractedExpense> {
    let json_str = extract_json_object(response)?;
    let raw: RawExtraction = serde_json::from_str(json_str).map_err(|e| {
        Error::InvalidData(format!(
            "Invalid extraction JSON from AI: {} | Raw: {}",
            e,
            truncate(json_str)
        ))
    })?;
    validate_extraction(raw)
}

pub(crate) fn validate_extraction(raw: RawExtraction) -> Result<ExtractedExpense> {
    let total = raw
        .total
        .as_ref()
        .ok_or_else(|| Error::InvalidData("Extraction has no total".into()))
        .and_then(|value| {
            parse_amount(value).ok_or_else(|| {
                Error::InvalidData(format!("Extraction total is not a valid amount: {}", value))
            })
        })?;

    let vendor = raw
        .vendor
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| "Unknown".to_string());

    let date = raw
        .date
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty());

    let items = raw
        .items
        .unwrap_or_default()
        .into_iter()
        .map(|item| match item {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        })
        .collect();

    let confidence = raw
        .confidence
        .and_then(|c| c.parse().ok())
        .unwrap_or(ExtractionConfidence::Medium);

    Ok(ExtractedExpense {
        total,
        vendor,
        date,
        items,
        confidence,
    })
}

/// Parse a category answer, accepting only the known vocabulary
///
/// Matching ignores case, quotes and trailing punctuation.
pub fn parse_category(response: &str) -> Option<Category> {
    let answer = strip_code_fences(response)
        .lines()
        .find(|line| !line.trim().is_empty())?
        .trim()
        .trim_matches(|c: char| c == '"' || c == '\'' || c == '*' || c == '.' || c == '`')
        .trim();

    Category::KNOWN
        .iter()
        .find(|c| c.as_str().eq_ignore_ascii_case(answer))
        .copied()
}

fn parse_date(value: Option<&str>) -> Option<NaiveDate> {
    value.and_then(|s| NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok())
}

/// Parse an analytics query payload
///
/// Missing dates default to the current month up to `today`.
pub fn parse_query_response(response: &str, today: NaiveDate) -> Result<QueryParse> {
    let json_str = extract_json_object(response)?;
    let raw: RawQuery = serde_json::from_str(json_str)
        .map_err(|e| Error::InvalidData(format!("Invalid query JSON from AI: {}", e)))?;
    Ok(validate_query(raw, today))
}

pub(crate) fn validate_query(raw: RawQuery, today: NaiveDate) -> QueryParse {
    if raw.is_valid == Some(false) {
        return QueryParse::Invalid(
            raw.error
                .filter(|e| !e.trim().is_empty())
                .unwrap_or_else(|| QUERY_NOT_UNDERSTOOD.to_string()),
        );
    }

    let month_start = today.with_day(1).unwrap_or(today);
    let mut start_date = parse_date(raw.start_date.as_deref()).unwrap_or(month_start);
    let mut end_date = parse_date(raw.end_date.as_deref()).unwrap_or(today);
    if start_date > end_date {
        std::mem::swap(&mut start_date, &mut end_date);
    }

    let analysis_type = raw
        .analysis_type
        .and_then(|t| t.parse().ok())
        .unwrap_or(AnalysisType::Summary);

    let limit = raw.limit.as_ref().and_then(|value| match value {
        serde_json::Value::Number(n) => n.as_u64().map(|n| n as usize),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    });

    let category = raw
        .category
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty() && !c.eq_ignore_ascii_case("null") && !c.eq_ignore_ascii_case("all"));

    QueryParse::Valid(ParsedQuery {
        timeframe: raw.timeframe.filter(|t| !t.trim().is_empty()),
        category,
        analysis_type,
        start_date,
        end_date,
        limit: limit.filter(|l| *l > 0),
    })
}

/// Parse a budget command payload
pub fn parse_budget_response(response: &str) -> Result<BudgetCommandParse> {
    let json_str = extract_json_object(response)?;
    let raw: RawBudgetCommand = serde_json::from_str(json_str)
        .map_err(|e| Error::InvalidData(format!("Invalid budget JSON from AI: {}", e)))?;
    Ok(validate_budget_command(raw))
}

pub(crate) fn validate_budget_command(raw: RawBudgetCommand) -> BudgetCommandParse {
    if raw.is_valid == Some(false) {
        return BudgetCommandParse::Invalid(
            raw.error
                .filter(|e| !e.trim().is_empty())
                .unwrap_or_else(|| BUDGET_NOT_UNDERSTOOD.to_string()),
        );
    }

    let Some(category) = raw
        .category
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
    else {
        return BudgetCommandParse::Invalid(BUDGET_NOT_UNDERSTOOD.to_string());
    };

    let amount = match raw.amount.as_ref().and_then(parse_amount) {
        Some(amount) if amount > 0.0 => amount,
        _ => return BudgetCommandParse::Invalid(INVALID_AMOUNT.to_string()),
    };

    let period = raw
        .period
        .map(|p| p.trim().to_lowercase())
        .filter(|p| !p.is_empty())
        .unwrap_or_else(|| "monthly".to_string());

    BudgetCommandParse::Valid(BudgetCommand {
        category,
        amount,
        period,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 15).unwrap()
    }

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("  plain  "), "plain");
    }

    #[test]
    fn test_extract_json_with_text_and_braces_in_strings() {
        let response = r#"Sure! {"vendor": "Cafe {Brew}", "total": 50} hope that helps"#;
        let json_str = extract_json_object(response).unwrap();
        assert_eq!(json_str, r#"{"vendor": "Cafe {Brew}", "total": 50}"#);
    }

    #[test]
    fn test_extract_json_missing() {
        assert!(extract_json_object("no json here").is_err());
    }

    #[test]
    fn test_parse_amount_variants() {
        assert_eq!(parse_amount(&json!(50)), Some(50.0));
        assert_eq!(parse_amount(&json!("50")), Some(50.0));
        assert_eq!(parse_amount(&json!("₹1,250.50")), Some(1250.5));
        assert_eq!(parse_amount(&json!("Rs. 300")), Some(300.0));
        assert_eq!(parse_amount(&json!("50rs")), Some(50.0));
        assert_eq!(parse_amount(&json!(-5)), None);
        assert_eq!(parse_amount(&json!("abc")), None);
        assert_eq!(parse_amount(&json!(null)), None);
    }

    #[test]
    fn test_parse_extraction_defaults() {
        let result = parse_extraction(r#"```json
{"total": "50"}
```"#)
        .unwrap();
        assert_eq!(result.total, 50.0);
        assert_eq!(result.vendor, "Unknown");
        assert_eq!(result.date, None);
        assert!(result.items.is_empty());
        assert_eq!(result.confidence, ExtractionConfidence::Medium);
        assert_eq!(result.known_vendor(), None);
    }

    #[test]
    fn test_parse_extraction_full() {
        let result = parse_extraction(
            r#"{"total": 420.5, "vendor": "DMart", "date": "2024-03-14", "items": ["milk", {"name": "eggs"}], "confidence": "HIGH"}"#,
        )
        .unwrap();
        assert_eq!(result.total, 420.5);
        assert_eq!(result.known_vendor(), Some("DMart"));
        assert_eq!(result.items.len(), 2);
        assert_eq!(result.confidence, ExtractionConfidence::High);
    }

    #[test]
    fn test_parse_extraction_rejects_bad_total() {
        assert!(parse_extraction(r#"{"vendor": "ccd"}"#).is_err());
        assert!(parse_extraction(r#"{"total": "lots", "vendor": "ccd"}"#).is_err());
        assert!(parse_extraction(r#"{"total": -10}"#).is_err());
    }

    #[test]
    fn test_parse_category() {
        assert_eq!(parse_category("Shopping"), Some(Category::Shopping));
        assert_eq!(parse_category("\"food & dining\".\n"), Some(Category::FoodAndDining));
        assert_eq!(parse_category("Miscellaneous"), Some(Category::Miscellaneous));
        assert_eq!(parse_category("Snacks"), None);
        // Uncategorized is never a valid model answer
        assert_eq!(parse_category("Uncategorized"), None);
    }

    #[test]
    fn test_parse_query_response() {
        let response = r#"{"timeframe": "last month", "category": "Food & Dining", "analysisType": "total",
            "startDate": "2024-02-01", "endDate": "2024-02-29", "limit": null, "isValid": true}"#;
        let QueryParse::Valid(query) = parse_query_response(response, today()).unwrap() else {
            panic!("expected valid query");
        };
        assert_eq!(query.analysis_type, AnalysisType::Total);
        assert_eq!(query.category.as_deref(), Some("Food & Dining"));
        assert_eq!(query.start_date, NaiveDate::from_ymd_opt(2024, 2, 1).unwrap());
        assert_eq!(query.limit, None);
    }

    #[test]
    fn test_parse_query_defaults_and_unknown_type() {
        let response = r#"{"analysisType": "wat", "limit": "3"}"#;
        let QueryParse::Valid(query) = parse_query_response(response, today()).unwrap() else {
            panic!("expected valid query");
        };
        assert_eq!(query.analysis_type, AnalysisType::Summary);
        assert_eq!(query.start_date, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        assert_eq!(query.end_date, today());
        assert_eq!(query.limit, Some(3));
    }

    #[test]
    fn test_parse_query_invalid() {
        let parsed = parse_query_response(r#"{"isValid": false}"#, today()).unwrap();
        assert_eq!(parsed, QueryParse::Invalid(QUERY_NOT_UNDERSTOOD.to_string()));
    }

    #[test]
    fn test_parse_budget_response() {
        let parsed =
            parse_budget_response(r#"{"category": "Food & Dining", "amount": 5000, "period": "Monthly", "isValid": true}"#)
                .unwrap();
        assert_eq!(
            parsed,
            BudgetCommandParse::Valid(BudgetCommand {
                category: "Food & Dining".to_string(),
                amount: 5000.0,
                period: "monthly".to_string(),
            })
        );
    }

    #[test]
    fn test_parse_budget_response_invalid_amount() {
        let parsed = parse_budget_response(r#"{"category": "Shopping", "amount": 0}"#).unwrap();
        assert_eq!(parsed, BudgetCommandParse::Invalid(INVALID_AMOUNT.to_string()));

        let parsed = parse_budget_response(r#"{"amount": 100}"#).unwrap();
        assert_eq!(parsed, BudgetCommandParse::Invalid(BUDGET_NOT_UNDERSTOOD.to_string()));
    }
}
