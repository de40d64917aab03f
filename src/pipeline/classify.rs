use serde::{Deserialize, Serialize};

use crate::config::ClassifierConfig;
use crate::domain::NormalizedTradeline;

/// Factor weights for the derogatory-status score. Must sum to 1.0.
const WEIGHT_STATUS: f64 = 0.40;
const WEIGHT_PAYMENT_HISTORY: f64 = 0.30;
const WEIGHT_BALANCE: f64 = 0.15;
const WEIGHT_CREDITOR: f64 = 0.10;
const WEIGHT_REMARKS: f64 = 0.05;

/// Keyword severities applied to account status text and to free-text
/// remarks. First match wins, so more specific phrases come first.
const STATUS_SEVERITIES: &[(&str, f64)] = &[
    ("charged off", 1.0),
    ("charge off", 1.0),
    ("charge-off", 1.0),
    ("collection", 1.0),
    ("bankruptcy", 1.0),
    ("foreclosure", 1.0),
    ("repossession", 1.0),
    ("default", 0.9),
    ("delinquent", 0.8),
    ("settled", 0.8),
    ("past due", 0.6),
    ("late", 0.6),
];

/// Collection agencies recognized by substring in the creditor name.
const COLLECTION_AGENCIES: &[&str] = &[
    "portfolio recovery",
    "midland",
    "lvnv",
    "cavalry",
    "enhanced recovery",
    "convergent",
    "ic system",
    "radius global",
    "transworld",
];

/// Per-factor sub-scores, each in [0, 1].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FactorScores {
    pub status: f64,
    pub payment_history: f64,
    pub balance: f64,
    pub creditor: f64,
    pub remarks: f64,
}

/// Result of scoring one record for derogatory-status likelihood.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classification {
    pub is_negative: bool,
    /// Confidence in the chosen label, biased toward that label
    pub confidence: f64,
    /// Weighted score in [0, 1]
    pub score: f64,
    pub factors: FactorScores,
    /// Human-readable "factor: value" strings for every non-zero factor
    pub indicators: Vec<String>,
}

/// Scores tradelines as negative/derogatory with a weighted multi-factor
/// heuristic. Deterministic and pure; same input always yields the same
/// score and label.
#[derive(Debug, Clone)]
pub struct NegativeClassifier {
    config: ClassifierConfig,
}

impl NegativeClassifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self { config }
    }

    pub fn classify(&self, record: &NormalizedTradeline) -> Classification {
        let factors = FactorScores {
            status: self.status_factor(record.account_status.as_deref()),
            payment_history: self.payment_history_factor(record.payment_history.as_deref()),
            balance: self.balance_factor(record),
            creditor: self.creditor_factor(record.creditor_name.as_deref()),
            remarks: self.remarks_factor(record.comments.as_deref()),
        };

        let score = WEIGHT_STATUS * factors.status
            + WEIGHT_PAYMENT_HISTORY * factors.payment_history
            + WEIGHT_BALANCE * factors.balance
            + WEIGHT_CREDITOR * factors.creditor
            + WEIGHT_REMARKS * factors.remarks;

        let is_negative = score >= self.config.negative_threshold;

        // Confidence biases toward the chosen label: negatives get a +0.2
        // boost on the score, positives +0.1 on its complement.
        let confidence = if is_negative {
            (score + 0.2).min(1.0)
        } else {
            ((1.0 - score) + 0.1).min(1.0)
        };

        let mut indicators = Vec::new();
        for (name, value) in [
            ("status", factors.status),
            ("payment_history", factors.payment_history),
            ("balance", factors.balance),
            ("creditor", factors.creditor),
            ("remarks", factors.remarks),
        ] {
            if value > 0.0 {
                indicators.push(format!("{}: {:.2}", name, value));
            }
        }

        Classification {
            is_negative,
            confidence,
            score,
            factors,
            indicators,
        }
    }

    fn keyword_severity(text: &str) -> Option<f64> {
        let lower = text.to_lowercase();
        STATUS_SEVERITIES
            .iter()
            .find(|(keyword, _)| lower.contains(keyword))
            .map(|(_, severity)| *severity)
    }

    fn status_factor(&self, status: Option<&str>) -> f64 {
        let Some(status) = status else { return 0.0 };
        if let Some(severity) = Self::keyword_severity(status) {
            return severity;
        }
        // Explicit positive override: a closed, paid account is not
        // derogatory even though "closed" reads adverse elsewhere.
        let lower = status.to_lowercase();
        if lower.contains("closed") && lower.contains("paid") {
            return 0.0;
        }
        0.0
    }

    fn payment_history_factor(&self, history: Option<&str>) -> f64 {
        let Some(history) = history else { return 0.0 };
        let lower = history.to_lowercase();
        if lower.contains("120") || lower.contains("90") {
            1.0
        } else if lower.contains("60") {
            0.7
        } else if lower.contains("30") {
            0.4
        } else if lower.contains("late") || lower.contains("past due") {
            0.5
        } else {
            0.0
        }
    }

    fn balance_factor(&self, record: &NormalizedTradeline) -> f64 {
        // Missing amounts score 0 for this sub-check; unknown is not adverse.
        let balance = record.account_balance.unwrap_or(0.0);
        let closed = record
            .account_status
            .as_deref()
            .map(|s| s.to_lowercase().contains("closed"))
            .unwrap_or(false);

        if closed && balance > 0.0 {
            return 0.8;
        }
        if let Some(limit) = record.credit_limit {
            if limit > 0.0 && balance > limit * 1.05 {
                return 0.5;
            }
        }
        0.0
    }

    fn creditor_factor(&self, creditor: Option<&str>) -> f64 {
        let Some(creditor) = creditor else { return 0.0 };
        let lower = creditor.to_lowercase();
        if COLLECTION_AGENCIES.iter().any(|a| lower.contains(a)) {
            return 1.0;
        }
        if lower.contains("collection") || lower.contains("recovery") {
            return 0.8;
        }
        0.0
    }

    fn remarks_factor(&self, comments: Option<&str>) -> f64 {
        comments.and_then(Self::keyword_severity).unwrap_or(0.0)
    }
}

impl Default for NegativeClassifier {
    fn default() -> Self {
        Self::new(ClassifierConfig::default())
    }
}
