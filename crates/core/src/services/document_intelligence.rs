use crate::error::ServiceError;
use crate::extractor::document_stem;
use crate::traits::LayoutExtractor;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;
use url::Url;

const BACKEND: &str = "document-intelligence";
const KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";

#[derive(Debug, Serialize)]
struct AnalyzeRequest {
    #[serde(rename = "base64Source")]
    base64_source: String,
}

#[derive(Debug, Deserialize)]
struct AnalyzeOperation {
    status: String,
    #[serde(rename = "analyzeResult", default)]
    analyze_result: Option<AnalyzeResult>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct AnalyzeResult {
    content: String,
}

/// Prebuilt-layout analysis with markdown output.
pub struct DocumentIntelligenceClient {
    endpoint: String,
    api_key: String,
    model: String,
    api_version: String,
    poll_interval: Duration,
    max_polls: u32,
    client: Client,
}

impl DocumentIntelligenceClient {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            model: "prebuilt-layout".to_string(),
            api_version: "2024-11-30".to_string(),
            poll_interval: Duration::from_secs(2),
            max_polls: 90,
            client: Client::new(),
        }
    }

    pub fn with_polling(mut self, poll_interval: Duration, max_polls: u32) -> Self {
        self.poll_interval = poll_interval;
        self.max_polls = max_polls.max(1);
        self
    }

    fn analyze_url(&self) -> Result<Url, ServiceError> {
        let base = if self.endpoint.ends_with('/') {
            Url::parse(&self.endpoint)?
        } else {
            Url::parse(&format!("{}/", self.endpoint))?
        };

        let mut url = base.join(&format!("documentintelligence/documentModels/{}:analyze", self.model))?;
        url.query_pairs_mut()
            .append_pair("api-version", &self.api_version)
            .append_pair("outputContentFormat", "markdown");
        Ok(url)
    }

    async fn poll(&self, operation_url: &str) -> Result<String, ServiceError> {
        for attempt in 1..=self.max_polls {
            let response = self
                .client
                .get(operation_url)
                .header(KEY_HEADER, &self.api_key)
                .send()
                .await?;

            if !response.status().is_success() {
                return Err(status_error(response.status()));
            }

            let operation: AnalyzeOperation = response.json().await?;
            if let Some(content) = operation_content(operation)? {
                return Ok(content);
            }

            debug!(attempt, "layout analysis still running");
            tokio::time::sleep(self.poll_interval).await;
        }

        Err(ServiceError::Timeout {
            service: BACKEND,
            after: self.poll_interval * self.max_polls,
        })
    }
}

fn status_error(status: reqwest::StatusCode) -> ServiceError {
    ServiceError::BackendResponse {
        backend: BACKEND.to_string(),
        details: status.to_string(),
    }
}

/// `Some(markdown)` once the operation succeeded, `None` while it is still running.
fn operation_content(operation: AnalyzeOperation) -> Result<Option<String>, ServiceError> {
    match operation.status.to_ascii_lowercase().as_str() {
        "succeeded" => operation
            .analyze_result
            .map(|result| Some(result.content))
            .ok_or_else(|| ServiceError::BackendResponse {
                backend: BACKEND.to_string(),
                details: "succeeded without analyzeResult".to_string(),
            }),
        "failed" | "canceled" => Err(ServiceError::BackendResponse {
            backend: BACKEND.to_string(),
            details: operation
                .error
                .map(|error| error.to_string())
                .unwrap_or_else(|| operation.status.clone()),
        }),
        _ => Ok(None),
    }
}

#[async_trait]
impl LayoutExtractor for DocumentIntelligenceClient {
    async fn extract_layout(&self, path: &Path) -> Result<String, ServiceError> {
        let pdf = tokio::fs::read(path)
            .await
            .map_err(|error| ServiceError::Request(format!("cannot read {}: {error}", path.display())))?;

        let payload = AnalyzeRequest {
            base64_source: STANDARD.encode(pdf),
        };

        let response = self
            .client
            .post(self.analyze_url()?)
            .header(KEY_HEADER, &self.api_key)
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(status_error(response.status()));
        }

        let operation_url = response
            .headers()
            .get("operation-location")
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| ServiceError::BackendResponse {
                backend: BACKEND.to_string(),
                details: "missing Operation-Location header".to_string(),
            })?;

        self.poll(&operation_url).await
    }
}

/// Layout markdown produced ahead of time, stored as `<stem>.md` in one directory.
pub struct SidecarLayout {
    directory: PathBuf,
}

impl SidecarLayout {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn markdown_path(&self, pdf: &Path) -> Result<PathBuf, ServiceError> {
        let stem = document_stem(pdf).map_err(|error| ServiceError::Request(error.to_string()))?;
        Ok(self.directory.join(format!("{stem}.md")))
    }
}

#[async_trait]
impl LayoutExtractor for SidecarLayout {
    async fn extract_layout(&self, path: &Path) -> Result<String, ServiceError> {
        let markdown_path = self.markdown_path(path)?;
        tokio::fs::read_to_string(&markdown_path).await.map_err(|error| {
            ServiceError::Request(format!("cannot read {}: {error}", markdown_path.display()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn operation(value: Value) -> AnalyzeOperation {
        serde_json::from_value(value).expect("operation json")
    }

    #[test]
    fn analyze_url_keeps_endpoint_path() -> Result<(), ServiceError> {
        let client = DocumentIntelligenceClient::new("https://example.cognitiveservices.azure.com", "key");
        assert_eq!(
            client.analyze_url()?.as_str(),
            "https://example.cognitiveservices.azure.com/documentintelligence/documentModels/prebuilt-layout:analyze?api-version=2024-11-30&outputContentFormat=markdown"
        );
        Ok(())
    }

    #[test]
    fn polling_keeps_at_least_one_attempt() {
        let client = DocumentIntelligenceClient::new("https://example.cognitiveservices.azure.com", "key")
            .with_polling(Duration::from_millis(250), 0);

        assert_eq!(client.poll_interval, Duration::from_millis(250));
        assert_eq!(client.max_polls, 1);
    }

    #[test]
    fn running_operations_have_no_content_yet() -> Result<(), ServiceError> {
        assert_eq!(operation_content(operation(json!({"status": "running"})))?, None);
        Ok(())
    }

    #[test]
    fn succeeded_operations_return_markdown() -> Result<(), ServiceError> {
        let content = operation_content(operation(json!({
            "status": "succeeded",
            "analyzeResult": {"content": "# Title\n<!-- PageBreak -->\n"}
        })))?;

        assert_eq!(content.as_deref(), Some("# Title\n<!-- PageBreak -->\n"));
        Ok(())
    }

    #[test]
    fn failed_operations_are_backend_errors() {
        let error = operation_content(operation(json!({
            "status": "failed",
            "error": {"code": "InvalidContent"}
        })))
        .unwrap_err();

        assert!(matches!(error, ServiceError::BackendResponse { details, .. } if details.contains("InvalidContent")));
    }

    #[tokio::test]
    async fn sidecar_layout_reads_markdown_by_stem() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        std::fs::write(dir.path().join("notice.md"), "layout")?;

        let layout = SidecarLayout::new(dir.path());
        let markdown = layout.extract_layout(Path::new("/pdfs/notice.pdf")).await?;

        assert_eq!(markdown, "layout");
        Ok(())
    }
}
