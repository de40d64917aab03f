use anyhow::Result;
use std::io::Write;
use std::sync::Arc;

use tradeline_pipeline::config::Config;
use tradeline_pipeline::domain::PipelineStage;
use tradeline_pipeline::extract::PlainTextExtractor;
use tradeline_pipeline::pipeline::{CancellationToken, PipelineOrchestrator};
use tradeline_pipeline::storage::InMemoryStorage;

const REPORT: &str = "\
Equifax Credit Report
Chase Bank account 4400-1234-5678-9010 balance $3,250.75 limit $10,000 payment $150
Opened 01/15/2020
Page 1 of 2
\u{000C}
TransUnion
Chase Bank account 4400-1234-5678-9010 balance $3,250.75 limit $10,000 payment $150
Opened 01/15/2020
Midland Credit Management account 987654321 balance $540 collection 90 days past due
Page 2 of 2
";

fn write_report(dir: &tempfile::TempDir) -> Result<String> {
    let path = dir.path().join("report.txt");
    let mut file = std::fs::File::create(&path)?;
    write!(file, "{}", REPORT)?;
    Ok(path.to_string_lossy().into_owned())
}

#[tokio::test]
async fn end_to_end_run_over_a_report_file() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = write_report(&dir)?;

    let storage = Arc::new(InMemoryStorage::new());
    let orchestrator = PipelineOrchestrator::new(
        Config::default(),
        Arc::new(PlainTextExtractor),
        storage.clone(),
    );

    let result = orchestrator
        .run(&path, "user-1", true, &CancellationToken::new())
        .await;

    assert!(result.success, "warnings: {:?}", result.warnings);
    assert_eq!(result.final_stage, PipelineStage::Done);
    assert_eq!(result.parsed_count, 3);
    assert_eq!(result.valid_count, 3);
    // Same card under two bureaus stays two rows; the collection account is a third
    assert_eq!(result.new_count, 3);
    assert_eq!(storage.stored_count(), 3);

    // The collection tradeline must come out flagged negative
    let summaries = &result.record_summaries;
    assert!(summaries
        .iter()
        .any(|s| s.creditor_name.as_deref() == Some("Midland Credit Management")));

    Ok(())
}

#[tokio::test]
async fn reprocessing_the_same_report_merges_not_duplicates() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = write_report(&dir)?;

    let storage = Arc::new(InMemoryStorage::new());
    let orchestrator = PipelineOrchestrator::new(
        Config::default(),
        Arc::new(PlainTextExtractor),
        storage.clone(),
    );
    let token = CancellationToken::new();

    let first = orchestrator.run(&path, "user-1", true, &token).await;
    assert_eq!(first.new_count, 3);

    let second = orchestrator.run(&path, "user-1", true, &token).await;
    assert!(second.success);
    assert_eq!(second.new_count, 0);
    assert_eq!(second.merged_count, 3);
    assert_eq!(storage.stored_count(), 3, "reprocessing must not add rows");

    Ok(())
}

#[tokio::test]
async fn preflight_accepts_the_report_and_rejects_an_empty_file() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = write_report(&dir)?;

    let orchestrator = PipelineOrchestrator::new(
        Config::default(),
        Arc::new(PlainTextExtractor),
        Arc::new(InMemoryStorage::new()),
    );

    let ok = orchestrator.validate_only(&path).await;
    assert!(ok.valid);
    assert_eq!(ok.file_info.as_ref().map(|i| i.page_count), Some(2));

    let empty_path = dir.path().join("empty.txt");
    std::fs::File::create(&empty_path)?;
    let rejected = orchestrator
        .validate_only(&empty_path.to_string_lossy())
        .await;
    assert!(!rejected.valid);

    Ok(())
}
