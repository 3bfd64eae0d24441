//! Render-surface abstraction.
//!
//! A surface is the script-capable page engine the extractor drives. It is
//! treated as a black box: it can begin a navigation (reporting progress as
//! [`SurfaceEvent`]s), evaluate one of the fixed [`PageScript`]s against the
//! current document, and be torn down. Results come back in the JSON-literal
//! form a browser engine returns from script evaluation, so a string result
//! arrives quoted and escaped.

pub mod http;

use crate::error::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

pub use http::{HttpSurface, HttpSurfaceFactory};

/// Progress reported by a surface while a navigation is in flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceEvent {
    /// Navigation to `url` started (emitted again for each redirect target).
    PageStarted { url: String },
    /// A response with an error status arrived.
    HttpError { status: u16, main_frame: bool },
    /// A transport-level failure occurred.
    LoadError { description: String, main_frame: bool },
    /// The document finished loading.
    PageFinished { url: String },
}

/// Sender half handed to a surface for the duration of one navigation.
pub type SurfaceEvents = mpsc::UnboundedSender<SurfaceEvent>;

/// The fixed set of in-page scripts the extractor may run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageScript {
    /// Returns an empty string when safe, otherwise the reason to refuse.
    CheckHeuristics,
    /// Returns cleaned paragraph text within the text budget.
    ExtractParagraphs,
    /// Returns a JSON array of clamped h1-h3 headings.
    ExtractHeadings,
}

impl PageScript {
    /// Stable name used in logs.
    pub fn name(self) -> &'static str {
        match self {
            Self::CheckHeuristics => "check_heuristics",
            Self::ExtractParagraphs => "extract_paragraphs",
            Self::ExtractHeadings => "extract_headings",
        }
    }
}

/// Settings a surface is created with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceSettings {
    pub scripting_enabled: bool,
    pub storage_enabled: bool,
    pub file_access_enabled: bool,
    pub user_agent: String,
    pub max_text_chars: usize,
    pub max_headings: usize,
    pub max_heading_chars: usize,
    pub max_document_bytes: usize,
    pub max_redirects: usize,
}

impl SurfaceSettings {
    /// Sandboxing defaults: scripts on, persistent storage and file access off.
    pub fn sandboxed(config: &crate::ExtractConfig) -> Self {
        Self {
            scripting_enabled: true,
            storage_enabled: false,
            file_access_enabled: false,
            user_agent: config.user_agent.clone(),
            max_text_chars: config.max_text_chars,
            max_headings: config.max_headings,
            max_heading_chars: config.max_heading_chars,
            max_document_bytes: config.max_document_bytes,
            max_redirects: config.max_redirects,
        }
    }
}

/// A script-capable page engine.
#[async_trait]
pub trait RenderSurface: Send {
    /// Start navigating to `url`. Progress is reported on `events`; the call
    /// itself returns as soon as navigation has been scheduled.
    fn begin_load(&mut self, url: &str, events: SurfaceEvents) -> Result<()>;

    /// Evaluate `script` against the current document.
    ///
    /// Returns the raw engine result, or `None` if the engine produced no
    /// value. Callers bound this with their own timeout.
    async fn evaluate(&mut self, script: PageScript) -> Option<String>;

    /// Abort any in-flight navigation.
    fn stop_loading(&mut self);

    /// Drop navigation history and cached documents.
    fn clear(&mut self);

    /// Release every resource held by the surface. Must be idempotent.
    fn destroy(&mut self);
}

/// Creates surfaces for the extractor.
pub trait SurfaceFactory: Send + Sync {
    /// Build a new surface with the given settings.
    fn create(&self, settings: &SurfaceSettings) -> Result<Box<dyn RenderSurface>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ExtractConfig;

    #[test]
    fn sandboxed_settings_disable_storage_and_files() {
        let settings = SurfaceSettings::sandboxed(&ExtractConfig::default());
        assert!(settings.scripting_enabled);
        assert!(!settings.storage_enabled);
        assert!(!settings.file_access_enabled);
        assert_eq!(settings.user_agent, crate::config::DEFAULT_USER_AGENT);
    }

    #[test]
    fn script_names_are_stable() {
        assert_eq!(PageScript::CheckHeuristics.name(), "check_heuristics");
        assert_eq!(PageScript::ExtractParagraphs.name(), "extract_paragraphs");
        assert_eq!(PageScript::ExtractHeadings.name(), "extract_headings");
    }
}
