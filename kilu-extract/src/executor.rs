//! Sandboxed extraction state machine.
//!
//! [`SandboxedExtractor`] drives one render surface through a single page
//! visit:
//!
//! ```text
//! Idle ─► LoadStart ─► DomReady ─► Extract ─► Done
//!              │           │          │
//!              └───────────┴──────────┴─────► Failed
//! ```
//!
//! Every surface interaction is a race between the surface and a timer. The
//! first resolution wins: once a load has resolved, the event receiver is
//! dropped and anything the surface reports afterwards is discarded.

use crate::config::ExtractConfig;
use crate::error::{ExtractError, Result};
use crate::surface::{PageScript, RenderSurface, SurfaceEvent, SurfaceFactory, SurfaceSettings};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// URL path fragments that indicate the navigation landed on a sign-in wall.
const AUTH_PATH_MARKERS: [&str; 3] = ["/login", "/signin", "/auth"];

/// Main-frame status codes that mean the page is gated.
const BLOCKING_STATUSES: [u16; 3] = [401, 403, 429];

/// Progress of one page visit. Only ever moves forward until destroy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ExtractionState {
    Idle,
    LoadStart,
    DomReady,
    Extract,
    Done,
    Failed,
}

/// Content collected from a page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    /// Cleaned paragraph text.
    pub text: String,
    /// h1-h3 headings in document order.
    pub headings: Vec<String>,
}

impl Extraction {
    /// Number of characters in the cleaned text.
    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }

    /// A page with too little text and no headings cannot be summarised and
    /// must go to a human instead.
    pub fn is_unextractable(&self, min_text_chars: usize) -> bool {
        self.char_count() < min_text_chars && self.headings.is_empty()
    }
}

/// Drives a render surface through load, safety check and extraction.
pub struct SandboxedExtractor {
    factory: Arc<dyn SurfaceFactory>,
    config: ExtractConfig,
    surface: Option<Box<dyn RenderSurface>>,
    state: ExtractionState,
}

impl SandboxedExtractor {
    /// Create an extractor. No surface exists until [`initialize`](Self::initialize).
    pub fn new(factory: Arc<dyn SurfaceFactory>, config: ExtractConfig) -> Self {
        Self {
            factory,
            config,
            surface: None,
            state: ExtractionState::Idle,
        }
    }

    /// Current state of the page visit.
    pub fn state(&self) -> ExtractionState {
        self.state
    }

    /// The configuration this extractor was built with.
    pub fn config(&self) -> &ExtractConfig {
        &self.config
    }

    /// Create the render surface with sandboxing defaults. No-op if a
    /// surface already exists.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError::Config`] for an invalid configuration, or the
    /// factory's error if the surface cannot be built.
    pub fn initialize(&mut self) -> Result<()> {
        if self.surface.is_some() {
            return Ok(());
        }
        self.config.validate()?;
        let settings = SurfaceSettings::sandboxed(&self.config);
        self.surface = Some(self.factory.create(&settings)?);
        debug!("render surface initialized");
        Ok(())
    }

    /// Navigate to `url` and wait for the page to settle.
    ///
    /// Fails if navigation does not finish within `page_load_timeout`. After
    /// the page finishes, waits `dom_ready_grace` for late-hydrating content.
    /// Fails closed when the navigated URL looks like a sign-in path, when
    /// the main frame answers 401/403/429, or on a main-frame network error.
    pub async fn load(
        &mut self,
        url: &str,
        page_load_timeout: Duration,
        dom_ready_grace: Duration,
    ) -> Result<()> {
        let surface = self.surface.as_mut().ok_or(ExtractError::NotInitialized)?;
        self.state = ExtractionState::LoadStart;

        let (tx, mut rx) = mpsc::unbounded_channel();
        if let Err(e) = surface.begin_load(url, tx) {
            self.state = ExtractionState::Failed;
            return Err(e);
        }

        let mut pending_block: Option<String> = None;
        let deadline = tokio::time::sleep(page_load_timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                () = &mut deadline => {
                    surface.stop_loading();
                    self.state = ExtractionState::Failed;
                    warn!(url, "page load timed out");
                    return Err(ExtractError::Timeout(format!(
                        "page load of {}ms exceeded",
                        page_load_timeout.as_millis()
                    )));
                }
                event = rx.recv() => match event {
                    Some(SurfaceEvent::PageFinished { .. }) => break,
                    Some(event) => {
                        if let Some(failure) = classify(&event, &mut pending_block) {
                            surface.stop_loading();
                            self.state = ExtractionState::Failed;
                            return Err(failure);
                        }
                    }
                    None => {
                        self.state = ExtractionState::Failed;
                        return Err(ExtractError::Http(
                            "surface ended navigation without finishing".into(),
                        ));
                    }
                },
            }
        }

        self.state = ExtractionState::DomReady;

        // Late callbacks during the settle period can still fail the load.
        let grace = tokio::time::sleep(dom_ready_grace);
        tokio::pin!(grace);
        loop {
            tokio::select! {
                () = &mut grace => break,
                event = rx.recv() => match event {
                    Some(event) => {
                        if let Some(failure) = classify(&event, &mut pending_block) {
                            self.state = ExtractionState::Failed;
                            return Err(failure);
                        }
                    }
                    None => {
                        grace.as_mut().await;
                        break;
                    }
                },
            }
        }

        if let Some(reason) = pending_block {
            self.state = ExtractionState::Failed;
            info!(url, %reason, "page blocked after load");
            return Err(ExtractError::Blocked(reason));
        }

        self.state = ExtractionState::Extract;
        Ok(())
    }

    /// Evaluate `script` against the current document.
    ///
    /// Returns an empty string when the surface does not answer within
    /// `eval_timeout` or produces no value; callers treat that as "no data".
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError::NotInitialized`] if there is no surface.
    pub async fn run(&mut self, script: PageScript, eval_timeout: Duration) -> Result<String> {
        let surface = self.surface.as_mut().ok_or(ExtractError::NotInitialized)?;
        match tokio::time::timeout(eval_timeout, surface.evaluate(script)).await {
            Ok(Some(raw)) => Ok(unwrap_script_result(&raw)),
            Ok(None) => Ok(String::new()),
            Err(_) => {
                warn!(script = script.name(), "script evaluation timed out");
                Ok(String::new())
            }
        }
    }

    /// Run the pre-extraction safety scan. Empty means safe to proceed.
    pub async fn check_safety(&mut self) -> Result<String> {
        let timeout = self.eval_timeout();
        let reason = self.run(PageScript::CheckHeuristics, timeout).await?;
        let reason = reason.trim();
        if reason.is_empty() || reason == "null" {
            return Ok(String::new());
        }
        self.state = ExtractionState::Failed;
        Ok(reason.to_owned())
    }

    /// Collect paragraph text and headings from the loaded page.
    pub async fn extract(&mut self) -> Result<Extraction> {
        let timeout = self.eval_timeout();
        let text = self.run(PageScript::ExtractParagraphs, timeout).await?;
        let raw_headings = self.run(PageScript::ExtractHeadings, timeout).await?;
        let headings = serde_json::from_str::<Vec<String>>(&raw_headings).unwrap_or_default();

        let extraction = Extraction {
            text: text.trim().to_owned(),
            headings,
        };
        self.state = if extraction.is_unextractable(self.config.min_text_chars) {
            ExtractionState::Failed
        } else {
            ExtractionState::Done
        };
        Ok(extraction)
    }

    /// Stop navigation, clear history and cache, and release the surface.
    /// Safe to call any number of times.
    pub fn destroy(&mut self) {
        if let Some(mut surface) = self.surface.take() {
            surface.stop_loading();
            surface.clear();
            surface.destroy();
            debug!("render surface destroyed");
        }
        self.state = ExtractionState::Idle;
    }

    fn eval_timeout(&self) -> Duration {
        Duration::from_millis(self.config.eval_timeout_ms)
    }
}

impl Drop for SandboxedExtractor {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Map a surface event to an immediate failure, or record a deferred block.
fn classify(event: &SurfaceEvent, pending_block: &mut Option<String>) -> Option<ExtractError> {
    match event {
        SurfaceEvent::PageStarted { url } => {
            if is_auth_path(url) {
                *pending_block = Some(format!("URL redirect suggests auth: {url}"));
            }
            None
        }
        SurfaceEvent::HttpError {
            status,
            main_frame: true,
        } if BLOCKING_STATUSES.contains(status) => Some(ExtractError::Blocked(format!(
            "HTTP error {status} on main frame"
        ))),
        SurfaceEvent::LoadError {
            description,
            main_frame: true,
        } => Some(ExtractError::Blocked(format!(
            "page load error: {description}"
        ))),
        _ => None,
    }
}

/// True when the URL path looks like a sign-in wall.
pub fn is_auth_path(url: &str) -> bool {
    let lower = url.to_lowercase();
    AUTH_PATH_MARKERS.iter().any(|marker| lower.contains(marker))
}

/// Undo one level of engine quoting: strip surrounding double quotes and
/// resolve backslash escapes (`\n`, `\"`, `\\`, `\uXXXX`, ...). Values that
/// are not quoted are returned unchanged.
pub fn unwrap_script_result(raw: &str) -> String {
    let Some(inner) = raw
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
    else {
        return if raw == "null" { String::new() } else { raw.to_owned() };
    };

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('b') => out.push('\u{0008}'),
            Some('f') => out.push('\u{000C}'),
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    Some(decoded) => out.push(decoded),
                    None => {
                        out.push_str("\\u");
                        out.push_str(&hex);
                    }
                }
            }
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}
