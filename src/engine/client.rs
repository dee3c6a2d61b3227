use async_trait::async_trait;
use reqwest::Client;
use serde::{Serialize, Deserialize};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::cli::config::EngineSettings;
use crate::task::config::CrawlConfig;
use crate::task::record::{PageImage, PageLink};

#[cfg(test)]
use mockall::automock;

/// Error surfaced by an engine call
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The request never produced a usable response
    #[error("engine request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The engine answered but reported a crawl failure
    #[error("{0}")]
    Rejected(String),
}

/// Request forwarded to the remote crawl engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineRequest {
    pub url: String,
    pub config: CrawlConfig,
}

/// Response returned by the remote crawl engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineResponse {
    pub success: bool,

    pub url: String,

    #[serde(default)]
    pub title: Option<String>,

    #[serde(default)]
    pub markdown: Option<String>,

    #[serde(default)]
    pub html: Option<String>,

    #[serde(default)]
    pub text: Option<String>,

    #[serde(default)]
    pub extracted_content: Option<String>,

    #[serde(default)]
    pub screenshot: Option<String>,

    #[serde(default)]
    pub links: Vec<PageLink>,

    #[serde(default)]
    pub images: Vec<PageImage>,

    #[serde(default)]
    pub metadata: Value,

    #[serde(default)]
    pub error: Option<String>,
}

/// Interface to the external crawl engine.
///
/// The gateway never crawls anything itself; every URL goes through exactly
/// one call on this trait.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CrawlEngine: Send + Sync {
    /// Crawl a single URL with the given configuration
    async fn crawl(&self, request: EngineRequest) -> Result<EngineResponse, EngineError>;

    /// Check whether the engine service is reachable
    async fn probe(&self) -> Result<(), EngineError>;
}

/// HTTP client for the remote crawl engine service
pub struct RemoteEngineClient {
    client: Client,
    base_url: String,
}

impl RemoteEngineClient {
    /// Create a client from the engine settings. The `CRAWL_ENGINE_URL`
    /// environment variable overrides the configured base URL.
    pub fn new(settings: &EngineSettings) -> Self {
        let base_url = std::env::var("CRAWL_ENGINE_URL")
            .unwrap_or_else(|_| settings.url.clone());

        let client = Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()
            .expect("Failed to create HTTP client");

        Self { client, base_url }
    }

    /// Create a client against an explicit base URL
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl CrawlEngine for RemoteEngineClient {
    async fn crawl(&self, request: EngineRequest) -> Result<EngineResponse, EngineError> {
        let endpoint = format!("{}/crawl", self.base_url);

        debug!("Sending request to crawl engine: {}", request.url);

        let response = self
            .client
            .post(&endpoint)
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json::<EngineResponse>()
            .await?;

        if !response.success {
            let message = response
                .error
                .unwrap_or_else(|| "engine crawl failed with unknown error".to_string());
            return Err(EngineError::Rejected(message));
        }

        debug!("Engine crawled URL: {}", request.url);

        Ok(response)
    }

    async fn probe(&self) -> Result<(), EngineError> {
        let endpoint = format!("{}/health", self.base_url);

        self.client
            .get(&endpoint)
            .send()
            .await?
            .error_for_status()?;

        Ok(())
    }
}
