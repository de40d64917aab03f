use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::domain::{NormalizedTradeline, RawTradelineCandidate};
use crate::pipeline::classify::NegativeClassifier;

static MONTH_YEAR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{1,2})/(\d{4})$").unwrap());

/// Canonicalizes raw candidate fields into typed values. Pure, no I/O, and
/// never fails a whole record: unparseable sub-fields are nulled and noted.
#[derive(Debug, Clone)]
pub struct FieldNormalizer {
    classifier: NegativeClassifier,
}

impl FieldNormalizer {
    pub fn new(classifier: NegativeClassifier) -> Self {
        Self { classifier }
    }

    pub fn normalize(&self, candidate: &RawTradelineCandidate) -> NormalizedTradeline {
        let mut warnings = Vec::new();

        let account_balance = normalize_field(
            "account_balance",
            &candidate.account_balance,
            normalize_currency,
            &mut warnings,
        );
        let credit_limit = normalize_field(
            "credit_limit",
            &candidate.credit_limit,
            normalize_currency,
            &mut warnings,
        );
        let monthly_payment = normalize_field(
            "monthly_payment",
            &candidate.monthly_payment,
            normalize_currency,
            &mut warnings,
        );
        let date_opened = normalize_field(
            "date_opened",
            &candidate.date_opened,
            normalize_date,
            &mut warnings,
        );

        let mut record = NormalizedTradeline {
            source_index: candidate.source_index,
            creditor_name: trimmed(&candidate.creditor_name),
            account_number: trimmed(&candidate.account_number),
            account_balance,
            credit_limit,
            monthly_payment,
            date_opened,
            account_type: trimmed(&candidate.account_type).map(|s| title_case(&s)),
            account_status: trimmed(&candidate.account_status).map(|s| title_case(&s)),
            payment_history: trimmed(&candidate.payment_history),
            comments: trimmed(&candidate.comments),
            credit_bureau: trimmed(&candidate.credit_bureau).map(|s| title_case(&s)),
            is_negative: false,
            negative_confidence: 0.0,
            negative_indicators: Vec::new(),
            dispute_count: 0,
            normalization_warnings: warnings,
        };

        // The single point where negative fields are set from content. A
        // candidate that arrived already flagged negative keeps the flag:
        // known-negative records are never downgraded.
        let classification = self.classifier.classify(&record);
        record.is_negative = candidate.is_negative || classification.is_negative;
        record.negative_confidence = classification.confidence;
        record.negative_indicators = classification.indicators;

        debug!(
            source_index = record.source_index,
            is_negative = record.is_negative,
            score = classification.score,
            "normalized candidate"
        );

        record
    }
}

fn trimmed(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn normalize_field<T>(
    name: &str,
    raw: &Option<String>,
    parse: impl Fn(&str) -> Option<T>,
    warnings: &mut Vec<String>,
) -> Option<T> {
    let raw = trimmed(raw)?;
    match parse(&raw) {
        Some(value) => Some(value),
        None => {
            warnings.push(format!("{} could not be normalized: {}", name, raw));
            None
        }
    }
}

/// Parse a currency string like "$3,250.75". Unparsable input is `None`,
/// never zero: zero means "no balance", which is distinct from unknown.
pub fn normalize_currency(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .chars()
        .filter(|c| *c != '$' && *c != ',' && !c.is_whitespace())
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Reduce a date string to ISO `YYYY-MM-DD` using a real calendar parse.
/// Date-shaped reference numbers are rejected by nulling, never guessed at.
pub fn normalize_date(raw: &str) -> Option<String> {
    let raw = raw.trim();

    // A dash-delimited pair whose segments exceed calendar bounds is a
    // reference number wearing a date costume (e.g. "45-78").
    let dash_parts: Vec<&str> = raw.split('-').collect();
    if dash_parts.len() == 2 {
        if let (Ok(first), Ok(second)) = (
            dash_parts[0].parse::<u32>(),
            dash_parts[1].parse::<u32>(),
        ) {
            if first > 31 || second > 59 {
                return None;
            }
        }
    }

    // MM/YYYY defaults to the first of the month
    if let Some(caps) = MONTH_YEAR_RE.captures(raw) {
        let month: u32 = caps[1].parse().ok()?;
        let year: i32 = caps[2].parse().ok()?;
        return NaiveDate::from_ymd_opt(year, month, 1).map(|d| d.to_string());
    }

    for format in ["%Y-%m-%d", "%m/%d/%Y", "%m-%d-%Y", "%Y/%m/%d", "%d/%m/%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
            return Some(date.format("%Y-%m-%d").to_string());
        }
    }
    None
}

/// Title-case each whitespace-separated word.
pub fn title_case(s: &str) -> String {
    s.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalizer() -> FieldNormalizer {
        FieldNormalizer::new(NegativeClassifier::default())
    }

    #[test]
    fn currency_strips_symbols_and_groups() {
        assert_eq!(normalize_currency("$3,250.75"), Some(3250.75));
        assert_eq!(normalize_currency("$500"), Some(500.0));
        assert_eq!(normalize_currency("0"), Some(0.0));
        assert_eq!(normalize_currency("n/a"), None);
        assert_eq!(normalize_currency("$"), None);
    }

    #[test]
    fn dates_round_trip_every_supported_format() {
        // Day 25 so the DD/MM form cannot be mistaken for MM/DD
        let expected = "2023-04-25";
        for input in [
            "2023-04-25",
            "04/25/2023",
            "04-25-2023",
            "2023/04/25",
            "25/04/2023",
        ] {
            assert_eq!(normalize_date(input).as_deref(), Some(expected), "{}", input);
        }
        assert_eq!(normalize_date("04/2023").as_deref(), Some("2023-04-01"));
    }

    #[test]
    fn impossible_dates_are_nulled_not_guessed() {
        assert_eq!(normalize_date("13/45/2025"), None);
        assert_eq!(normalize_date("02/30/2024"), None);
        assert_eq!(normalize_date("2024-02-30"), None);
    }

    #[test]
    fn disguised_reference_numbers_are_rejected() {
        assert_eq!(normalize_date("45-78"), None);
        assert_eq!(normalize_date("12-99"), None);
    }

    #[test]
    fn unparseable_fields_null_without_failing_the_record() {
        let candidate = RawTradelineCandidate {
            creditor_name: Some("  Chase Bank  ".to_string()),
            account_balance: Some("unknown".to_string()),
            date_opened: Some("13/45/2025".to_string()),
            account_status: Some("open".to_string()),
            ..Default::default()
        };
        let record = normalizer().normalize(&candidate);
        assert_eq!(record.creditor_name.as_deref(), Some("Chase Bank"));
        assert_eq!(record.account_balance, None);
        assert_eq!(record.date_opened, None);
        assert_eq!(record.account_status.as_deref(), Some("Open"));
        assert_eq!(record.normalization_warnings.len(), 2);
    }

    #[test]
    fn classifier_verdict_is_copied_onto_the_record() {
        let candidate = RawTradelineCandidate {
            creditor_name: Some("Midland Credit Management".to_string()),
            account_status: Some("collection".to_string()),
            payment_history: Some("120 days past due".to_string()),
            ..Default::default()
        };
        let record = normalizer().normalize(&candidate);
        assert!(record.is_negative);
        assert!(record.negative_confidence >= 0.5);
        assert!(!record.negative_indicators.is_empty());
    }

    #[test]
    fn preset_negative_flag_is_never_downgraded() {
        let candidate = RawTradelineCandidate {
            creditor_name: Some("Chase Bank".to_string()),
            account_status: Some("Collection".to_string()),
            comments: Some("Account has charge off history".to_string()),
            is_negative: true,
            ..Default::default()
        };
        // Status alone scores 0.45, under the 0.50 threshold, but the
        // extraction-confirmed flag survives normalization.
        let record = normalizer().normalize(&candidate);
        assert!(record.is_negative);
        assert!(record.negative_confidence >= 0.35);
    }

    #[test]
    fn title_case_handles_mixed_input() {
        assert_eq!(title_case("CREDIT CARD"), "Credit Card");
        assert_eq!(title_case("charged OFF"), "Charged Off");
    }
}
