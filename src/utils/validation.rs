use std::net::Ipv4Addr;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Serialize, Deserialize};
use url::Url;

use crate::error::GatewayError;
use crate::task::config::{
    CrawlConfig, MAX_TIMEOUT_SECS, MAX_WORD_COUNT_THRESHOLD, MIN_TIMEOUT_SECS,
    MIN_WORD_COUNT_THRESHOLD,
};

/// Outcome of a dry-run validation request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub suggestions: Vec<String>,
}

/// Characters accepted in a CSS selector
fn css_selector_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"^[a-zA-Z0-9\s\.\#\[\]\():\-_,>+~=\*\^\$\|"']+$"#)
            .expect("valid selector pattern")
    })
}

/// Validate a crawl target URL.
///
/// Accepts well-formed http/https URLs with a hostname; rejects loopback
/// and private-range targets.
pub fn validate_url(raw: &str) -> Result<Url, GatewayError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(GatewayError::Validation("URL cannot be empty".to_string()));
    }

    let parsed = Url::parse(raw)
        .map_err(|e| GatewayError::Validation(format!("Invalid URL format: {e}")))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(GatewayError::Validation(
            "URL must use HTTP or HTTPS protocol".to_string(),
        ));
    }

    let host = parsed
        .host_str()
        .ok_or_else(|| GatewayError::Validation("URL must have a valid hostname".to_string()))?
        .to_lowercase();

    if matches!(host.as_str(), "localhost" | "127.0.0.1" | "0.0.0.0" | "::1" | "[::1]") {
        return Err(GatewayError::Validation(
            "Access to localhost is not allowed".to_string(),
        ));
    }

    if let Ok(addr) = host.parse::<Ipv4Addr>() {
        if addr.is_private() || addr.is_loopback() {
            return Err(GatewayError::Validation(
                "Access to private IP addresses is not allowed".to_string(),
            ));
        }
    }

    Ok(parsed)
}

/// Whether a CSS selector contains only accepted characters
pub fn is_valid_css_selector(selector: &str) -> bool {
    let selector = selector.trim();
    if selector.is_empty() {
        return false;
    }

    // Screen out markup and control characters first
    if selector.chars().any(|c| matches!(c, '<' | '`' | '\n' | '\r' | '\t')) {
        return false;
    }

    css_selector_re().is_match(selector)
}

/// Collect the hard configuration errors that block task creation
fn config_errors(config: &CrawlConfig) -> Vec<String> {
    let mut errors = Vec::new();

    if config.word_count_threshold < MIN_WORD_COUNT_THRESHOLD {
        errors.push(format!(
            "word_count_threshold must be at least {MIN_WORD_COUNT_THRESHOLD}"
        ));
    } else if config.word_count_threshold > MAX_WORD_COUNT_THRESHOLD {
        errors.push(format!(
            "word_count_threshold cannot exceed {MAX_WORD_COUNT_THRESHOLD}"
        ));
    }

    if config.timeout < MIN_TIMEOUT_SECS {
        errors.push(format!("timeout must be at least {MIN_TIMEOUT_SECS} seconds"));
    } else if config.timeout > MAX_TIMEOUT_SECS {
        errors.push(format!("timeout cannot exceed {MAX_TIMEOUT_SECS} seconds"));
    }

    if let Some(selector) = config.css_selector.as_deref() {
        if !selector.trim().is_empty() && !is_valid_css_selector(selector) {
            errors.push("css_selector contains invalid characters".to_string());
        }
    }

    errors
}

/// Validate a configuration before creating a task
pub fn check_config(config: &CrawlConfig) -> Result<(), GatewayError> {
    let errors = config_errors(config);
    if errors.is_empty() {
        Ok(())
    } else {
        Err(GatewayError::Validation(errors.join("; ")))
    }
}

/// Build the full dry-run report for the validate endpoint
pub fn validation_report(url: Option<&str>, config: &CrawlConfig) -> ValidationReport {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();
    let mut suggestions = Vec::new();

    if let Some(url) = url {
        if let Err(GatewayError::Validation(message)) = validate_url(url) {
            errors.push(message);
        }
    }

    errors.extend(config_errors(config));

    if config.word_count_threshold < 50 {
        warnings.push("Very low word_count_threshold may result in noisy content".to_string());
    }

    if config.timeout > 120 && config.timeout <= MAX_TIMEOUT_SECS {
        warnings.push("High timeout values may affect performance".to_string());
    }

    if let Some(selector) = config.css_selector.as_deref() {
        if selector.trim().is_empty() {
            warnings.push("Empty CSS selector will be ignored".to_string());
        } else if config.extraction_strategy != crate::task::config::ExtractionStrategy::Css {
            suggestions
                .push("Consider using 'css' extraction strategy with CSS selector".to_string());
        }
    }

    if config.screenshot && config.pdf {
        suggestions.push("Generating both screenshot and PDF may slow down crawling".to_string());
    }

    if !config.remove_overlay_elements {
        suggestions.push("Keeping overlay elements may result in unwanted content".to_string());
    }

    if !config.exclude_external_links {
        warnings.push("Including external links may expose sensitive information".to_string());
    }

    ValidationReport {
        valid: errors.is_empty(),
        errors,
        warnings,
        suggestions,
    }
}
