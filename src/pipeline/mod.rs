pub mod classify;
pub mod normalize;
pub mod orchestrator;
pub mod parser;
pub mod reconcile;
pub mod validate;

pub use classify::{Classification, NegativeClassifier};
pub use normalize::FieldNormalizer;
pub use orchestrator::{CancellationToken, PipelineOrchestrator, PipelineStatistics, PreflightResult};
pub use parser::{ParseOutcome, RecordParser};
pub use reconcile::{merge_tradelines, ReconciliationOutcome, Reconciler};
pub use validate::Validator;
