use chrono::NaiveDate;
use tracing::debug;

use crate::config::ValidatorConfig;
use crate::domain::{NormalizedTradeline, ValidationResult};
use crate::pipeline::classify::NegativeClassifier;

/// Applies structural and business rules to normalized tradelines. Errors
/// make a record invalid; warnings only lower its confidence score.
#[derive(Debug, Clone)]
pub struct Validator {
    config: ValidatorConfig,
    classifier: NegativeClassifier,
}

impl Validator {
    pub fn new(config: ValidatorConfig, classifier: NegativeClassifier) -> Self {
        Self { config, classifier }
    }

    pub fn validate(&self, record: &NormalizedTradeline) -> ValidationResult {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        if is_blank(&record.creditor_name) {
            errors.push("creditor_name is required".to_string());
        }
        if is_blank(&record.credit_bureau) {
            errors.push("credit_bureau is required".to_string());
        }

        self.check_account_number(record, &mut errors, &mut warnings);
        self.check_date_opened(record, &mut errors, &mut warnings);
        self.check_negative_consistency(record, &mut warnings);

        // Anomalies recorded during normalization surface as warnings
        warnings.extend(record.normalization_warnings.iter().cloned());

        let mut score = 1.0;
        score -= warnings.len() as f64 * self.config.warning_penalty;
        score -= errors.len() as f64 * self.config.error_penalty;
        let score = score.max(0.0);

        let valid = errors.is_empty();
        debug!(
            source_index = record.source_index,
            valid,
            score,
            errors = errors.len(),
            warnings = warnings.len(),
            "validated record"
        );

        ValidationResult {
            valid,
            score,
            errors,
            warnings,
        }
    }

    /// An account number needs at least 4 contiguous alphanumerics once the
    /// masking and separators are stripped. Masked forms like `****1234` or
    /// `636992104989****` are acceptable; a short or garbled value is only a
    /// warning. A missing number is an error when nothing else distinguishes
    /// the record.
    fn check_account_number(
        &self,
        record: &NormalizedTradeline,
        errors: &mut Vec<String>,
        warnings: &mut Vec<String>,
    ) {
        match record.account_number.as_deref().map(str::trim) {
            Some(number) if !number.is_empty() => {
                let longest_run = number
                    .split(|c: char| !c.is_ascii_alphanumeric())
                    .map(str::len)
                    .max()
                    .unwrap_or(0);
                if longest_run < 4 {
                    warnings.push(format!(
                        "account_number '{}' has fewer than 4 contiguous alphanumeric characters",
                        number
                    ));
                }
            }
            _ => {
                if record.has_distinguishing_data() {
                    warnings.push("account_number is missing".to_string());
                } else {
                    errors.push(
                        "account_number is missing and the record has no other distinguishing data"
                            .to_string(),
                    );
                }
            }
        }
    }

    fn check_date_opened(
        &self,
        record: &NormalizedTradeline,
        errors: &mut Vec<String>,
        warnings: &mut Vec<String>,
    ) {
        let Some(date) = record.date_opened.as_deref() else {
            return;
        };
        let is_iso = NaiveDate::parse_from_str(date, "%Y-%m-%d").is_ok();
        if is_iso {
            return;
        }
        // An invalid date is fatal only when it is the record's sole
        // distinguishing field
        if is_blank(&record.account_number)
            && record.account_balance.is_none()
            && record.credit_limit.is_none()
            && record.monthly_payment.is_none()
        {
            errors.push(format!(
                "date_opened '{}' is not a valid ISO date and is the only distinguishing field",
                date
            ));
        } else {
            warnings.push(format!("date_opened '{}' is not a valid ISO date", date));
        }
    }

    /// Surface disagreements between the stored negative flag and what the
    /// classifier derives from content. Never auto-corrected.
    fn check_negative_consistency(
        &self,
        record: &NormalizedTradeline,
        warnings: &mut Vec<String>,
    ) {
        let derived = self.classifier.classify(record);
        if derived.is_negative != record.is_negative {
            warnings.push(format!(
                "negative flag mismatch: record is flagged {} but content scores {:.2} ({})",
                record.is_negative,
                derived.score,
                if derived.is_negative {
                    "negative"
                } else {
                    "positive"
                }
            ));
        }
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map(str::trim).unwrap_or("").is_empty()
}
