use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

use crate::config::ParserConfig;
use crate::domain::RawTradelineCandidate;

/// Vocabulary a line must hit at least twice to qualify as a candidate.
const DOMAIN_KEYWORDS: &[&str] = &[
    "account", "balance", "limit", "payment", "creditor", "card", "loan",
];

/// Keywords that pre-flag a candidate as negative at parse time.
const NEGATIVE_KEYWORDS: &[&str] = &["late", "delinquent", "charged off", "collection", "closed"];

const BUREAUS: &[&str] = &["equifax", "experian", "transunion"];

static ACCOUNT_TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[0-9*][0-9* \-]{2,22}[0-9*]").unwrap());

static CURRENCY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\s*[\d,]+(?:\.\d{1,2})?").unwrap());

static DATE_TOKEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:\d{1,2}/\d{1,2}/\d{4}|\d{1,2}/\d{4}|\d{4}-\d{2}-\d{2})\b").unwrap()
});

static PAGE_NOISE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(?:page\s+\d+(?:\s+of\s+\d+)?|-+\s*page\s*break\s*-+|\d+)\s*$").unwrap()
});

static LATE_HISTORY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(30|60|90|120)\s*(?:days?)?\s*(?:late|past\s+due)").unwrap()
});

/// Parser output: the candidates found plus any scan warnings (e.g. the
/// candidate cap was hit).
#[derive(Debug, Default)]
pub struct ParseOutcome {
    pub candidates: Vec<RawTradelineCandidate>,
    pub warnings: Vec<String>,
}

/// Scans raw report text for tradeline-shaped lines and cuts them into
/// candidate records with approximate field boundaries. Never panics on
/// malformed input; an empty candidate list is a normal outcome.
#[derive(Debug, Clone)]
pub struct RecordParser {
    config: ParserConfig,
}

impl RecordParser {
    pub fn new(config: ParserConfig) -> Self {
        Self { config }
    }

    pub fn parse(&self, text: &str) -> ParseOutcome {
        let lines: Vec<&str> = text.lines().collect();
        let mut outcome = ParseOutcome::default();
        let mut current_bureau: Option<String> = None;

        for (index, raw_line) in lines.iter().enumerate() {
            let line = raw_line.trim();

            // Bureau banners set running context for subsequent candidates
            if let Some(bureau) = detect_bureau_banner(line) {
                current_bureau = Some(bureau);
                continue;
            }
            if line.len() < self.config.min_line_length || is_noise(line) {
                continue;
            }

            let lower = line.to_lowercase();
            let keyword_hits = DOMAIN_KEYWORDS
                .iter()
                .filter(|k| lower.contains(*k))
                .count();
            if keyword_hits < 2 {
                continue;
            }

            if outcome.candidates.len() >= self.config.max_candidates {
                let message = format!(
                    "candidate cap of {} reached; remaining text not scanned",
                    self.config.max_candidates
                );
                warn!("{}", message);
                outcome.warnings.push(message);
                break;
            }

            let window = context_window(&lines, index, self.config.context_window);
            let candidate = self.extract_candidate(
                line,
                &window,
                outcome.candidates.len(),
                current_bureau.clone(),
            );
            outcome.candidates.push(candidate);
        }

        debug!(
            candidates = outcome.candidates.len(),
            warnings = outcome.warnings.len(),
            "parse complete"
        );
        outcome
    }

    fn extract_candidate(
        &self,
        line: &str,
        window: &str,
        source_index: usize,
        credit_bureau: Option<String>,
    ) -> RawTradelineCandidate {
        let lower = line.to_lowercase();

        let account_number = find_account_token(line).or_else(|| find_account_token(window));

        // Dollar amounts in reading order: balance, then limit, then payment
        let amounts: Vec<String> = CURRENCY_RE
            .find_iter(line)
            .map(|m| m.as_str().to_string())
            .collect();
        let mut amounts = amounts.into_iter();
        let account_balance = amounts.next();
        let credit_limit = amounts.next();
        let monthly_payment = amounts.next();

        let date_opened = DATE_TOKEN_RE
            .find(line)
            .or_else(|| DATE_TOKEN_RE.find(window))
            .map(|m| m.as_str().to_string());

        let is_negative = NEGATIVE_KEYWORDS.iter().any(|k| lower.contains(k));

        RawTradelineCandidate {
            source_index,
            creditor_name: leading_creditor_name(line),
            account_number,
            account_balance,
            credit_limit,
            monthly_payment,
            date_opened,
            account_type: Some("Credit Card".to_string()),
            account_status: Some(infer_status(&lower).to_string()),
            payment_history: LATE_HISTORY_RE
                .find(window)
                .map(|m| m.as_str().to_string()),
            comments: if is_negative {
                Some(line.to_string())
            } else {
                None
            },
            credit_bureau,
            is_negative,
        }
    }
}

fn context_window(lines: &[&str], index: usize, radius: usize) -> String {
    let start = index.saturating_sub(radius);
    let end = (index + radius + 1).min(lines.len());
    lines[start..end].join(" ")
}

fn is_noise(line: &str) -> bool {
    line.contains('\u{000C}') || PAGE_NOISE_RE.is_match(line)
}

fn detect_bureau_banner(line: &str) -> Option<String> {
    let lower = line.to_lowercase();
    // Banner lines are short headers naming the bureau, not data rows
    if lower.len() > 60 {
        return None;
    }
    BUREAUS
        .iter()
        .find(|b| lower.contains(*b))
        .filter(|_| !lower.contains('$'))
        .map(|b| match *b {
            "equifax" => "Equifax".to_string(),
            "experian" => "Experian".to_string(),
            _ => "TransUnion".to_string(),
        })
}

/// Find an account-number-shaped token: a 4-16 digit run, optionally dashed
/// or grouped, with masking stars allowed. Date-shaped tokens are skipped.
fn find_account_token(text: &str) -> Option<String> {
    for m in ACCOUNT_TOKEN_RE.find_iter(text) {
        let token = m.as_str().trim();
        if DATE_TOKEN_RE.is_match(token) || token.contains('/') {
            continue;
        }
        let digits = token.chars().filter(|c| c.is_ascii_digit()).count();
        let stars = token.chars().filter(|c| *c == '*').count();
        let significant = digits + stars;
        if (4..=20).contains(&significant) && (digits >= 4 || stars >= 4) {
            return Some(token.replace(' ', ""));
        }
    }
    None
}

/// Interpret a leading free-text run (before the first digit, dollar sign,
/// or domain keyword) as the creditor name.
fn leading_creditor_name(line: &str) -> Option<String> {
    let head: String = line
        .chars()
        .take_while(|c| !c.is_ascii_digit() && *c != '$' && *c != '*')
        .collect();
    let words: Vec<&str> = head
        .split_whitespace()
        .take_while(|w| {
            let w = w.trim_matches(['-', ':', ',', '.']).to_lowercase();
            !DOMAIN_KEYWORDS.contains(&w.as_str())
        })
        .collect();
    let name = words.join(" ");
    if name.len() >= 3 {
        Some(name)
    } else {
        None
    }
}

fn infer_status(lower_line: &str) -> &'static str {
    if lower_line.contains("collection") {
        "Collection"
    } else if lower_line.contains("charged off") || lower_line.contains("charge off") {
        "Charged Off"
    } else if lower_line.contains("closed") {
        "Closed"
    } else {
        "Open"
    }
}
