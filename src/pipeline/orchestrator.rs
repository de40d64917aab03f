use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{error, info, instrument, warn};

use crate::config::Config;
use crate::domain::{
    NormalizedTradeline, PipelineRunResult, PipelineStage, RecordValidationSummary,
};
use crate::extract::{FileInfo, TextExtractor};
use crate::pipeline::classify::NegativeClassifier;
use crate::pipeline::normalize::FieldNormalizer;
use crate::pipeline::parser::RecordParser;
use crate::pipeline::reconcile::Reconciler;
use crate::pipeline::validate::Validator;
use crate::storage::Storage;

/// External cancellation signal, checked between pipeline stages. A
/// cancelled run returns a partial result rather than an error.
#[derive(Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Pre-flight check result for a source, without full processing.
#[derive(Debug, Clone, Serialize)]
pub struct PreflightResult {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub file_info: Option<FileInfo>,
}

/// Configured limits and component identifiers, for observability callers.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineStatistics {
    pub version: &'static str,
    pub max_candidates: usize,
    pub min_line_length: usize,
    pub negative_threshold: f64,
    pub warning_penalty: f64,
    pub error_penalty: f64,
    pub components: Vec<&'static str>,
}

/// Sequences Extract → Parse → Normalize → Validate → Reconcile → Store over
/// one source. Stages run batch-wise: no stage starts before the prior
/// stage's full output is collected.
pub struct PipelineOrchestrator {
    config: Config,
    parser: RecordParser,
    normalizer: FieldNormalizer,
    validator: Validator,
    reconciler: Reconciler,
    extractor: Arc<dyn TextExtractor>,
    storage: Arc<dyn Storage>,
}

impl PipelineOrchestrator {
    pub fn new(
        config: Config,
        extractor: Arc<dyn TextExtractor>,
        storage: Arc<dyn Storage>,
    ) -> Self {
        let classifier = NegativeClassifier::new(config.classifier.clone());
        Self {
            parser: RecordParser::new(config.parser.clone()),
            normalizer: FieldNormalizer::new(classifier.clone()),
            validator: Validator::new(config.validator.clone(), classifier),
            reconciler: Reconciler::new(),
            extractor,
            storage,
            config,
        }
    }

    /// Run the full pipeline for one source. Always returns a result with
    /// partial progress flags, never panics on data problems.
    #[instrument(skip(self, cancel), fields(user_id = %user_id, store))]
    pub async fn run(
        &self,
        source: &str,
        user_id: &str,
        store: bool,
        cancel: &CancellationToken,
    ) -> PipelineRunResult {
        let started = Instant::now();
        let mut result = PipelineRunResult::started(user_id);

        // Extracting
        let extraction = self.extractor.extract_text(source).await;
        result.pdf_processed = true;
        if !extraction.success || extraction.text.trim().is_empty() {
            let reason = extraction
                .error
                .unwrap_or_else(|| "extraction produced no text".to_string());
            error!("extraction failed: {}", reason);
            return self.fail(result, started, reason);
        }
        result.text_extracted = true;

        if cancel.is_cancelled() {
            return self.cancelled(result, started, PipelineStage::Parsing);
        }

        // Parsing
        result.final_stage = PipelineStage::Parsing;
        let parse_outcome = self.parser.parse(&extraction.text);
        result.parsed_count = parse_outcome.candidates.len();
        result.warnings.extend(parse_outcome.warnings);
        self.check_parse_bounds(&mut result);

        if cancel.is_cancelled() {
            return self.cancelled(result, started, PipelineStage::Normalizing);
        }

        // Normalizing/classifying; records are independent, so order of
        // processing does not matter, but output is reassembled by source
        // index for reproducible diagnostics.
        result.final_stage = PipelineStage::Normalizing;
        let mut normalized: Vec<NormalizedTradeline> = parse_outcome
            .candidates
            .iter()
            .map(|c| self.normalizer.normalize(c))
            .collect();
        normalized.sort_by_key(|r| r.source_index);

        if cancel.is_cancelled() {
            return self.cancelled(result, started, PipelineStage::Validating);
        }

        // Validating
        result.final_stage = PipelineStage::Validating;
        let mut valid_records = Vec::new();
        for record in normalized {
            let verdict = self.validator.validate(&record);
            result.record_summaries.push(RecordValidationSummary {
                source_index: record.source_index,
                creditor_name: record.creditor_name.clone(),
                valid: verdict.valid,
                score: verdict.score,
                errors: verdict.errors,
                warnings: verdict.warnings,
            });
            if verdict.valid {
                valid_records.push(record);
            } else {
                result.invalid_count += 1;
            }
        }
        result.valid_count = valid_records.len();
        if result.invalid_count > 0 {
            result.warnings.push(format!(
                "{} record(s) failed validation and will not be stored",
                result.invalid_count
            ));
        }

        if cancel.is_cancelled() {
            return self.cancelled(result, started, PipelineStage::Reconciling);
        }

        // Reconciling
        result.final_stage = PipelineStage::Reconciling;
        let reconciled = match self
            .reconciler
            .reconcile(&valid_records, &*self.storage, user_id)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("reconciliation failed: {}", e);
                return self.fail(result, started, format!("reconciliation failed: {}", e));
            }
        };
        result.new_count = reconciled.new.len();
        result.merged_count = reconciled.merged.len();
        for (record, reason) in &reconciled.invalid {
            result.invalid_count += 1;
            result.warnings.push(format!(
                "record {} dropped during reconciliation: {}",
                record.source_index, reason
            ));
        }

        if cancel.is_cancelled() {
            return self.cancelled(result, started, PipelineStage::Storing);
        }

        // Storing
        if store && !reconciled.to_save.is_empty() {
            result.final_stage = PipelineStage::Storing;
            match self.storage.persist(&reconciled.to_save, user_id).await {
                Ok(outcome) => {
                    result.stored_count = outcome.stored_count;
                    result.warnings.extend(outcome.warnings);
                    for e in outcome.errors {
                        result.warnings.push(format!("storage: {}", e));
                    }
                    if outcome.stored_count < reconciled.to_save.len() {
                        warn!(
                            stored = outcome.stored_count,
                            attempted = reconciled.to_save.len(),
                            "partial storage failure"
                        );
                    }
                }
                Err(e) => {
                    // Whole-batch storage failure is fatal to success only
                    // because zero records end up stored
                    warn!("storage handoff failed: {}", e);
                    result.warnings.push(format!("storage handoff failed: {}", e));
                }
            }
        }

        result.success = result.pdf_processed
            && result.text_extracted
            && result.valid_count > 0
            && (!store || result.stored_count > 0);
        result.final_stage = if result.success {
            PipelineStage::Done
        } else {
            PipelineStage::Failed
        };
        result.duration_ms = started.elapsed().as_millis() as u64;

        info!(
            run_id = %result.run_id,
            parsed = result.parsed_count,
            valid = result.valid_count,
            stored = result.stored_count,
            merged = result.merged_count,
            success = result.success,
            duration_ms = result.duration_ms,
            "pipeline run complete"
        );
        result
    }

    /// Pre-flight a source without running the pipeline: is there text to
    /// work with at all?
    pub async fn validate_only(&self, source: &str) -> PreflightResult {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        let file_info = match self.extractor.file_info(source).await {
            Ok(info) => Some(info),
            Err(e) => {
                errors.push(format!("source is not readable: {}", e));
                None
            }
        };

        let extraction = self.extractor.extract_text(source).await;
        if !extraction.success {
            errors.push(
                extraction
                    .error
                    .unwrap_or_else(|| "no text could be extracted".to_string()),
            );
        } else if extraction.text.len() < self.config.parser.min_line_length {
            warnings.push("extracted text is too short to contain tradelines".to_string());
        }

        PreflightResult {
            valid: errors.is_empty(),
            errors,
            warnings,
            file_info,
        }
    }

    pub fn statistics(&self) -> PipelineStatistics {
        PipelineStatistics {
            version: env!("CARGO_PKG_VERSION"),
            max_candidates: self.config.parser.max_candidates,
            min_line_length: self.config.parser.min_line_length,
            negative_threshold: self.config.classifier.negative_threshold,
            warning_penalty: self.config.validator.warning_penalty,
            error_penalty: self.config.validator.error_penalty,
            components: vec![
                "record_parser",
                "field_normalizer",
                "negative_classifier",
                "validator",
                "reconciler",
            ],
        }
    }

    fn check_parse_bounds(&self, result: &mut PipelineRunResult) {
        let bounds = &self.config.orchestrator;
        if result.parsed_count < bounds.min_expected_candidates {
            result.warnings.push(format!(
                "parsed {} candidate(s), below the expected minimum of {}",
                result.parsed_count, bounds.min_expected_candidates
            ));
        } else if result.parsed_count > bounds.max_expected_candidates {
            result.warnings.push(format!(
                "parsed {} candidates, above the expected maximum of {}",
                result.parsed_count, bounds.max_expected_candidates
            ));
        }
    }

    fn fail(
        &self,
        mut result: PipelineRunResult,
        started: Instant,
        reason: String,
    ) -> PipelineRunResult {
        result.error = Some(reason);
        result.success = false;
        result.final_stage = PipelineStage::Failed;
        result.duration_ms = started.elapsed().as_millis() as u64;
        result
    }

    fn cancelled(
        &self,
        mut result: PipelineRunResult,
        started: Instant,
        next_stage: PipelineStage,
    ) -> PipelineRunResult {
        warn!(?next_stage, "pipeline run cancelled");
        result.cancelled = true;
        result.success = false;
        result.duration_ms = started.elapsed().as_millis() as u64;
        result
    }
}
