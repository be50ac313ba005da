use crate::error::ServiceError;
use async_trait::async_trait;
use std::path::Path;

/// Layout-aware extraction service returning markdown with page-break and table markup.
#[async_trait]
pub trait LayoutExtractor: Send + Sync {
    async fn extract_layout(&self, path: &Path) -> Result<String, ServiceError>;
}

/// Completion service that rewrites one markdown table as prose.
#[async_trait]
pub trait TableSummarizer: Send + Sync {
    async fn summarize(&self, table_markdown: &str) -> Result<String, ServiceError>;
}

#[async_trait]
impl<T: LayoutExtractor + ?Sized> LayoutExtractor for Box<T> {
    async fn extract_layout(&self, path: &Path) -> Result<String, ServiceError> {
        (**self).extract_layout(path).await
    }
}
