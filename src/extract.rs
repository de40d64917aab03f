use async_trait::async_trait;
use serde::Serialize;

use crate::error::Result;

/// Outcome of pulling text out of a report source. Failure or empty text is
/// fatal for a pipeline run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExtractionResult {
    pub success: bool,
    pub text: String,
    pub error: Option<String>,
}

/// Lightweight facts about a source, for pre-flight checks.
#[derive(Debug, Clone, Serialize)]
pub struct FileInfo {
    pub name: String,
    pub size_bytes: u64,
    /// Form-feed page breaks plus one
    pub page_count: usize,
}

/// Collaborator that turns a report source into raw text. PDF byte-level
/// extraction lives behind this trait; the pipeline only sees the result.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract_text(&self, source: &str) -> ExtractionResult;
    async fn file_info(&self, source: &str) -> Result<FileInfo>;
}

/// Reads already-extracted UTF-8 text from a file path.
pub struct PlainTextExtractor;

#[async_trait]
impl TextExtractor for PlainTextExtractor {
    async fn extract_text(&self, source: &str) -> ExtractionResult {
        match tokio::fs::read_to_string(source).await {
            Ok(text) => ExtractionResult {
                success: !text.trim().is_empty(),
                error: if text.trim().is_empty() {
                    Some(format!("'{}' contains no extractable text", source))
                } else {
                    None
                },
                text,
            },
            Err(e) => ExtractionResult {
                success: false,
                text: String::new(),
                error: Some(format!("failed to read '{}': {}", source, e)),
            },
        }
    }

    async fn file_info(&self, source: &str) -> Result<FileInfo> {
        let metadata = tokio::fs::metadata(source).await?;
        let text = tokio::fs::read_to_string(source).await.unwrap_or_default();
        Ok(FileInfo {
            name: source.to_string(),
            size_bytes: metadata.len(),
            page_count: text.matches('\u{000C}').count() + 1,
        })
    }
}

/// Treats the source argument itself as the extracted text. Used by tests
/// and callers that already hold raw report text.
pub struct InlineTextExtractor;

#[async_trait]
impl TextExtractor for InlineTextExtractor {
    async fn extract_text(&self, source: &str) -> ExtractionResult {
        ExtractionResult {
            success: !source.trim().is_empty(),
            text: source.to_string(),
            error: if source.trim().is_empty() {
                Some("source text is empty".to_string())
            } else {
                None
            },
        }
    }

    async fn file_info(&self, source: &str) -> Result<FileInfo> {
        Ok(FileInfo {
            name: "<inline>".to_string(),
            size_bytes: source.len() as u64,
            page_count: source.matches('\u{000C}').count() + 1,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn inline_extractor_passes_text_through() {
        let extractor = InlineTextExtractor;
        let result = extractor.extract_text("some report text").await;
        assert!(result.success);
        assert_eq!(result.text, "some report text");

        let result = extractor.extract_text("   ").await;
        assert!(!result.success);
        assert!(result.error.is_some());
    }

    #[tokio::test]
    async fn plain_text_extractor_reads_files_and_counts_pages() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "page one\u{000C}page two").unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let extractor = PlainTextExtractor;
        let result = extractor.extract_text(&path).await;
        assert!(result.success);

        let info = extractor.file_info(&path).await.unwrap();
        assert_eq!(info.page_count, 2);
        assert!(info.size_bytes > 0);
    }

    #[tokio::test]
    async fn missing_file_is_a_failed_extraction_not_a_panic() {
        let extractor = PlainTextExtractor;
        let result = extractor.extract_text("/no/such/report.txt").await;
        assert!(!result.success);
        assert!(result.error.is_some());
    }
}
