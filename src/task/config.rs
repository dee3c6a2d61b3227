use serde::{Serialize, Deserialize};
use std::collections::HashMap;

/// Supported content extraction strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionStrategy {
    #[default]
    Default,
    Llm,
    Css,
    Regex,
}

impl ExtractionStrategy {
    /// Strategies with label and description, for the config endpoints
    pub fn catalog() -> Vec<(&'static str, &'static str, &'static str)> {
        vec![
            ("default", "Default", "Standard content extraction"),
            ("llm", "LLM", "AI-powered extraction"),
            ("css", "CSS Selector", "CSS selector-based extraction"),
            ("regex", "Regex", "Regular expression extraction"),
        ]
    }
}

/// Output formats a stored result can be rendered in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Json,
    Markdown,
    Html,
    Text,
}

impl OutputFormat {
    /// Parse a `format` query parameter, defaulting to JSON
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "json" => Some(Self::Json),
            "markdown" => Some(Self::Markdown),
            "html" => Some(Self::Html),
            "text" => Some(Self::Text),
            _ => None,
        }
    }

    /// File extension used by the download endpoint
    pub fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Markdown => "md",
            Self::Html => "html",
            Self::Text => "txt",
        }
    }

    /// MIME type used by the download endpoint
    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::Markdown => "text/markdown",
            Self::Html => "text/html",
            Self::Text => "text/plain",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Markdown => "markdown",
            Self::Html => "html",
            Self::Text => "text",
        }
    }
}

/// Extraction configuration supplied by the caller.
///
/// Opaque to the orchestrator; validated at the edge and passed through to
/// the engine unchanged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlConfig {
    /// Minimum word count threshold for content blocks
    #[serde(default = "default_word_count_threshold")]
    pub word_count_threshold: u32,

    /// Strategy to use for content extraction
    #[serde(default)]
    pub extraction_strategy: ExtractionStrategy,

    /// CSS selector to target specific elements
    #[serde(default)]
    pub css_selector: Option<String>,

    /// CSS selector or time to wait for before extraction
    #[serde(default)]
    pub wait_for: Option<String>,

    /// Whether to take a screenshot
    #[serde(default)]
    pub screenshot: bool,

    /// Whether to generate a PDF
    #[serde(default)]
    pub pdf: bool,

    /// Remove overlay elements like popups
    #[serde(default = "default_true")]
    pub remove_overlay_elements: bool,

    /// Exclude external links from content
    #[serde(default = "default_true")]
    pub exclude_external_links: bool,

    /// Exclude social media links
    #[serde(default = "default_true")]
    pub exclude_social_media_links: bool,

    /// Custom user agent string
    #[serde(default)]
    pub user_agent: Option<String>,

    /// Custom HTTP headers
    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// Engine request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout: u64,
}

/// Bounds from the engine contract
pub const MIN_WORD_COUNT_THRESHOLD: u32 = 1;
pub const MAX_WORD_COUNT_THRESHOLD: u32 = 10_000;
pub const MIN_TIMEOUT_SECS: u64 = 5;
pub const MAX_TIMEOUT_SECS: u64 = 300;

fn default_word_count_threshold() -> u32 {
    200
}

fn default_true() -> bool {
    true
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            word_count_threshold: default_word_count_threshold(),
            extraction_strategy: ExtractionStrategy::Default,
            css_selector: None,
            wait_for: None,
            screenshot: false,
            pdf: false,
            remove_overlay_elements: true,
            exclude_external_links: true,
            exclude_social_media_links: true,
            user_agent: None,
            headers: HashMap::new(),
            timeout: default_timeout_secs(),
        }
    }
}
