//! Extractor configuration with conservative defaults.
//!
//! [`ExtractConfig`] bounds every stage of a page visit: navigation, the
//! post-load settle period, script evaluation, and how much content is
//! kept. The defaults match what the Control Plane expects of a Hub.

use crate::error::ExtractError;
use serde::{Deserialize, Serialize};

/// Fixed, non-identifying User-Agent presented by every surface.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// Configuration for a sandboxed page visit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractConfig {
    /// Maximum time for navigation to finish, in milliseconds.
    pub page_load_timeout_ms: u64,
    /// Extra settle period after navigation finishes, for late-hydrating pages.
    pub dom_ready_grace_ms: u64,
    /// Maximum time to wait for a single script evaluation.
    pub eval_timeout_ms: u64,
    /// User-Agent sent by the surface.
    pub user_agent: String,
    /// Paragraph text budget in characters.
    pub max_text_chars: usize,
    /// Maximum number of h1-h3 headings collected.
    pub max_headings: usize,
    /// Per-heading character clamp.
    pub max_heading_chars: usize,
    /// Below this many characters of text (and with no headings) a page is
    /// considered unextractable.
    pub min_text_chars: usize,
    /// Largest document body the HTTP surface will read.
    pub max_document_bytes: usize,
    /// Redirect hops followed before navigation is treated as failed.
    pub max_redirects: usize,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            page_load_timeout_ms: 15_000,
            dom_ready_grace_ms: 5_000,
            eval_timeout_ms: 3_000,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            max_text_chars: 5_000,
            max_headings: 20,
            max_heading_chars: 200,
            min_text_chars: 200,
            max_document_bytes: 5 * 1024 * 1024,
            max_redirects: 10,
        }
    }
}

impl ExtractConfig {
    /// Validates this configuration.
    ///
    /// Checks:
    /// - `page_load_timeout_ms` and `eval_timeout_ms` must be greater than 0
    /// - `user_agent` must not be blank
    /// - `max_text_chars`, `max_heading_chars` and `max_document_bytes` must be greater than 0
    pub fn validate(&self) -> Result<(), ExtractError> {
        if self.page_load_timeout_ms == 0 {
            return Err(ExtractError::Config(
                "page_load_timeout_ms must be greater than 0".into(),
            ));
        }
        if self.eval_timeout_ms == 0 {
            return Err(ExtractError::Config(
                "eval_timeout_ms must be greater than 0".into(),
            ));
        }
        if self.user_agent.trim().is_empty() {
            return Err(ExtractError::Config("user_agent must not be empty".into()));
        }
        if self.max_text_chars == 0 || self.max_heading_chars == 0 {
            return Err(ExtractError::Config(
                "text and heading budgets must be greater than 0".into(),
            ));
        }
        if self.max_document_bytes == 0 {
            return Err(ExtractError::Config(
                "max_document_bytes must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn default_config_matches_hub_contract() {
        let config = ExtractConfig::default();
        assert_eq!(config.page_load_timeout_ms, 15_000);
        assert_eq!(config.dom_ready_grace_ms, 5_000);
        assert_eq!(config.eval_timeout_ms, 3_000);
        assert_eq!(config.max_text_chars, 5_000);
        assert_eq!(config.max_headings, 20);
        assert_eq!(config.max_heading_chars, 200);
        assert_eq!(config.min_text_chars, 200);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_page_timeout_rejected() {
        let config = ExtractConfig {
            page_load_timeout_ms: 0,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("page_load_timeout_ms"));
    }

    #[test]
    fn zero_grace_is_valid() {
        let config = ExtractConfig {
            dom_ready_grace_ms: 0,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn blank_user_agent_rejected() {
        let config = ExtractConfig {
            user_agent: "  ".into(),
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("user_agent"));
    }

    #[test]
    fn partial_toml_like_json_fills_defaults() {
        let config: ExtractConfig =
            serde_json::from_str(r#"{"page_load_timeout_ms": 20000}"#).unwrap();
        assert_eq!(config.page_load_timeout_ms, 20_000);
        assert_eq!(config.max_headings, 20);
    }
}
