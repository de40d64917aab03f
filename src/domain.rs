use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A tradeline candidate as found in raw report text. Field values are the
/// approximate strings the parser cut out of the source; nothing here is
/// normalized. Immutable once emitted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawTradelineCandidate {
    /// Ordinal of this candidate in the source text, used to reassemble
    /// per-record results deterministically
    pub source_index: usize,
    pub creditor_name: Option<String>,
    pub account_number: Option<String>,
    pub account_balance: Option<String>,
    pub credit_limit: Option<String>,
    pub monthly_payment: Option<String>,
    pub date_opened: Option<String>,
    pub account_type: Option<String>,
    pub account_status: Option<String>,
    pub payment_history: Option<String>,
    pub comments: Option<String>,
    pub credit_bureau: Option<String>,
    /// Parse-time hint from negative keyword hits. Once true, normalization
    /// never downgrades it.
    pub is_negative: bool,
}

/// A tradeline with canonical field types, ready for validation and
/// reconciliation. Currency fields are parsed amounts (`None` means unknown,
/// which is distinct from a zero balance), `date_opened` is ISO `YYYY-MM-DD`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizedTradeline {
    pub source_index: usize,
    pub creditor_name: Option<String>,
    pub account_number: Option<String>,
    pub account_balance: Option<f64>,
    pub credit_limit: Option<f64>,
    pub monthly_payment: Option<f64>,
    pub date_opened: Option<String>,
    pub account_type: Option<String>,
    pub account_status: Option<String>,
    pub payment_history: Option<String>,
    pub comments: Option<String>,
    pub credit_bureau: Option<String>,
    pub is_negative: bool,
    pub negative_confidence: f64,
    pub negative_indicators: Vec<String>,
    pub dispute_count: u32,
    /// Anomalies recorded while normalizing (nulled fields and why)
    pub normalization_warnings: Vec<String>,
}

/// The tradeline fields the pipeline knows how to copy between records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradelineField {
    CreditorName,
    AccountNumber,
    AccountBalance,
    CreditLimit,
    MonthlyPayment,
    DateOpened,
    AccountType,
    AccountStatus,
    PaymentHistory,
    Comments,
    CreditBureau,
}

/// Explicit field-mapping table shared by the normalizer and reconciler:
/// `(field, mergeable)`. Only mergeable fields participate in fill-empty-only
/// merging; `AccountNumber` is special-cased in the reconciler.
pub const FIELD_MAP: &[(TradelineField, bool)] = &[
    (TradelineField::CreditorName, false),
    (TradelineField::AccountNumber, false),
    (TradelineField::AccountBalance, true),
    (TradelineField::CreditLimit, true),
    (TradelineField::MonthlyPayment, true),
    (TradelineField::DateOpened, true),
    (TradelineField::AccountType, true),
    (TradelineField::AccountStatus, true),
    (TradelineField::PaymentHistory, false),
    (TradelineField::Comments, false),
    (TradelineField::CreditBureau, false),
];

/// String values that count as "empty" when merging
const STRING_PLACEHOLDERS: &[&str] = &["", "NULL", "N/A", "0"];

fn string_is_empty(value: &Option<String>) -> bool {
    match value {
        None => true,
        Some(s) => {
            let trimmed = s.trim();
            if STRING_PLACEHOLDERS
                .iter()
                .any(|p| trimmed.eq_ignore_ascii_case(p))
            {
                return true;
            }
            // All-x date placeholders like "xx/xx/xxxx"
            !trimmed.is_empty()
                && trimmed
                    .chars()
                    .all(|c| c == 'x' || c == 'X' || c == '/' || c == '-')
        }
    }
}

fn amount_is_empty(value: &Option<f64>) -> bool {
    match value {
        None => true,
        Some(v) => *v == 0.0,
    }
}

impl NormalizedTradeline {
    /// Whether a field holds no usable data (absent or a recognized
    /// placeholder). Drives the fill-empty-only merge policy.
    pub fn field_is_empty(&self, field: TradelineField) -> bool {
        match field {
            TradelineField::CreditorName => string_is_empty(&self.creditor_name),
            TradelineField::AccountNumber => string_is_empty(&self.account_number),
            TradelineField::AccountBalance => amount_is_empty(&self.account_balance),
            TradelineField::CreditLimit => amount_is_empty(&self.credit_limit),
            TradelineField::MonthlyPayment => amount_is_empty(&self.monthly_payment),
            TradelineField::DateOpened => string_is_empty(&self.date_opened),
            TradelineField::AccountType => string_is_empty(&self.account_type),
            TradelineField::AccountStatus => string_is_empty(&self.account_status),
            TradelineField::PaymentHistory => string_is_empty(&self.payment_history),
            TradelineField::Comments => string_is_empty(&self.comments),
            TradelineField::CreditBureau => string_is_empty(&self.credit_bureau),
        }
    }

    /// Copy one field's value from another record.
    pub fn copy_field_from(&mut self, other: &NormalizedTradeline, field: TradelineField) {
        match field {
            TradelineField::CreditorName => self.creditor_name = other.creditor_name.clone(),
            TradelineField::AccountNumber => self.account_number = other.account_number.clone(),
            TradelineField::AccountBalance => self.account_balance = other.account_balance,
            TradelineField::CreditLimit => self.credit_limit = other.credit_limit,
            TradelineField::MonthlyPayment => self.monthly_payment = other.monthly_payment,
            TradelineField::DateOpened => self.date_opened = other.date_opened.clone(),
            TradelineField::AccountType => self.account_type = other.account_type.clone(),
            TradelineField::AccountStatus => self.account_status = other.account_status.clone(),
            TradelineField::PaymentHistory => {
                self.payment_history = other.payment_history.clone()
            }
            TradelineField::Comments => self.comments = other.comments.clone(),
            TradelineField::CreditBureau => self.credit_bureau = other.credit_bureau.clone(),
        }
    }

    /// A record with none of account number, open date, or any currency
    /// amount has nothing to distinguish it from another account.
    pub fn has_distinguishing_data(&self) -> bool {
        !string_is_empty(&self.account_number)
            || !string_is_empty(&self.date_opened)
            || self.account_balance.is_some()
            || self.credit_limit.is_some()
            || self.monthly_payment.is_some()
    }
}

/// Verdict attached 1:1 to a normalized tradeline by the validator.
/// Any error makes the record invalid; warnings only reduce the score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub score: f64,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// Derived identity of a tradeline. Two records with equal keys are the same
/// real-world account within a bureau and must merge, never duplicate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReconciliationKey {
    pub creditor: String,
    pub account_prefix: String,
    pub date_opened: String,
    pub bureau: String,
}

impl ReconciliationKey {
    /// Build the identity key for a record. Creditor, account prefix, and
    /// bureau must all be present for the key to be trustworthy; missing
    /// parts reject the record with a reason.
    pub fn from_record(record: &NormalizedTradeline) -> std::result::Result<Self, String> {
        let creditor = record
            .creditor_name
            .as_deref()
            .map(normalize_key_part)
            .unwrap_or_default();
        if creditor.is_empty() {
            return Err("reconciliation key requires a creditor name".to_string());
        }

        let digits: String = record
            .account_number
            .as_deref()
            .unwrap_or("")
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect();
        let account_prefix: String = digits.chars().take(4).collect();
        if account_prefix.is_empty() {
            return Err("reconciliation key requires an account number prefix".to_string());
        }

        let bureau = record
            .credit_bureau
            .as_deref()
            .map(normalize_key_part)
            .unwrap_or_default();
        if bureau.is_empty() {
            return Err("reconciliation key requires a credit bureau".to_string());
        }

        Ok(Self {
            creditor,
            account_prefix,
            date_opened: record.date_opened.clone().unwrap_or_default(),
            bureau,
        })
    }

    /// Stable string form, used to key per-identity reconciliation locks.
    pub fn lock_token(&self) -> String {
        format!(
            "{}|{}|{}|{}",
            self.creditor, self.account_prefix, self.date_opened, self.bureau
        )
    }
}

fn normalize_key_part(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Compact per-record validation summary carried on the run result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordValidationSummary {
    pub source_index: usize,
    pub creditor_name: Option<String>,
    pub valid: bool,
    pub score: f64,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// Stages of one pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineStage {
    Extracting,
    Parsing,
    Normalizing,
    Validating,
    Reconciling,
    Storing,
    Done,
    Failed,
}

/// Aggregate outcome of one end-to-end pipeline invocation. Callers always
/// receive one of these with partial progress flags, even on failure.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineRunResult {
    pub run_id: Uuid,
    pub user_id: String,
    pub started_at: DateTime<Utc>,
    pub final_stage: PipelineStage,
    pub pdf_processed: bool,
    pub text_extracted: bool,
    pub parsed_count: usize,
    pub valid_count: usize,
    pub invalid_count: usize,
    pub new_count: usize,
    pub merged_count: usize,
    pub stored_count: usize,
    pub warnings: Vec<String>,
    pub error: Option<String>,
    pub duration_ms: u64,
    pub record_summaries: Vec<RecordValidationSummary>,
    pub success: bool,
    pub cancelled: bool,
}

impl PipelineRunResult {
    pub fn started(user_id: &str) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            started_at: Utc::now(),
            final_stage: PipelineStage::Extracting,
            pdf_processed: false,
            text_extracted: false,
            parsed_count: 0,
            valid_count: 0,
            invalid_count: 0,
            new_count: 0,
            merged_count: 0,
            stored_count: 0,
            warnings: Vec::new(),
            error: None,
            duration_ms: 0,
            record_summaries: Vec::new(),
            success: false,
            cancelled: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record_with_identity() -> NormalizedTradeline {
        NormalizedTradeline {
            creditor_name: Some("Chase  Bank".to_string()),
            account_number: Some("4400-1234-5678-9010".to_string()),
            date_opened: Some("2020-01-15".to_string()),
            credit_bureau: Some("Equifax".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn key_normalizes_case_and_whitespace() {
        let key = ReconciliationKey::from_record(&record_with_identity()).unwrap();
        assert_eq!(key.creditor, "chase bank");
        assert_eq!(key.account_prefix, "4400");
        assert_eq!(key.date_opened, "2020-01-15");
        assert_eq!(key.bureau, "equifax");
    }

    #[test]
    fn key_requires_creditor_prefix_and_bureau() {
        let mut record = record_with_identity();
        record.creditor_name = None;
        assert!(ReconciliationKey::from_record(&record).is_err());

        let mut record = record_with_identity();
        record.account_number = Some("----".to_string());
        assert!(ReconciliationKey::from_record(&record).is_err());

        let mut record = record_with_identity();
        record.credit_bureau = Some("   ".to_string());
        assert!(ReconciliationKey::from_record(&record).is_err());
    }

    #[test]
    fn distinct_bureaus_yield_distinct_keys() {
        let equifax = record_with_identity();
        let mut transunion = record_with_identity();
        transunion.credit_bureau = Some("TransUnion".to_string());

        let k1 = ReconciliationKey::from_record(&equifax).unwrap();
        let k2 = ReconciliationKey::from_record(&transunion).unwrap();
        assert_ne!(k1, k2);
    }

    #[test]
    fn placeholders_count_as_empty() {
        let record = NormalizedTradeline {
            account_status: Some("N/A".to_string()),
            date_opened: Some("xx/xx/xxxx".to_string()),
            account_balance: Some(0.0),
            ..Default::default()
        };
        assert!(record.field_is_empty(TradelineField::AccountStatus));
        assert!(record.field_is_empty(TradelineField::DateOpened));
        assert!(record.field_is_empty(TradelineField::AccountBalance));

        let populated = NormalizedTradeline {
            account_status: Some("Open".to_string()),
            account_balance: Some(512.4),
            ..Default::default()
        };
        assert!(!populated.field_is_empty(TradelineField::AccountStatus));
        assert!(!populated.field_is_empty(TradelineField::AccountBalance));
    }
}
