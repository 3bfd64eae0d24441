//! HTTP-backed render surface.
//!
//! Fetches the main document with a sandboxed [`reqwest::Client`] (fixed
//! User-Agent, no cookie store, limited redirects) and evaluates page
//! scripts against the parsed DOM. Sub-resources are never fetched, so every
//! reported event is a main-frame event.

use crate::dom;
use crate::error::{ExtractError, Result};
use crate::surface::{
    PageScript, RenderSurface, SurfaceEvent, SurfaceEvents, SurfaceFactory, SurfaceSettings,
};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// Creates [`HttpSurface`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpSurfaceFactory;

impl SurfaceFactory for HttpSurfaceFactory {
    fn create(&self, settings: &SurfaceSettings) -> Result<Box<dyn RenderSurface>> {
        Ok(Box::new(HttpSurface::new(settings.clone())?))
    }
}

/// Build a [`reqwest::Client`] for sandboxed page loads.
///
/// The client has:
/// - The fixed User-Agent from `settings`
/// - No cookie store (storage stays disabled)
/// - A redirect limit from `settings`
///
/// # Errors
///
/// Returns [`ExtractError::Http`] if the client cannot be constructed.
pub fn build_client(settings: &SurfaceSettings) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(settings.user_agent.clone())
        .redirect(reqwest::redirect::Policy::limited(settings.max_redirects))
        .build()
        .map_err(|e| ExtractError::Http(format!("failed to build HTTP client: {e}")))
}

/// A render surface that loads documents over HTTP.
pub struct HttpSurface {
    client: reqwest::Client,
    settings: SurfaceSettings,
    document: Arc<Mutex<Option<String>>>,
    history: Vec<String>,
    load_task: Option<JoinHandle<()>>,
    destroyed: bool,
}

impl HttpSurface {
    /// Create a surface with its own client.
    pub fn new(settings: SurfaceSettings) -> Result<Self> {
        let client = build_client(&settings)?;
        Ok(Self {
            client,
            settings,
            document: Arc::new(Mutex::new(None)),
            history: Vec::new(),
            load_task: None,
            destroyed: false,
        })
    }

    /// URLs navigated since the last [`clear`](RenderSurface::clear).
    pub fn history(&self) -> &[String] {
        &self.history
    }
}

#[async_trait]
impl RenderSurface for HttpSurface {
    fn begin_load(&mut self, url: &str, events: SurfaceEvents) -> Result<()> {
        if self.destroyed {
            return Err(ExtractError::NotInitialized);
        }
        let parsed = url::Url::parse(url)
            .map_err(|e| ExtractError::Http(format!("invalid URL {url}: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ExtractError::Blocked(format!(
                "scheme '{}' is not allowed",
                parsed.scheme()
            )));
        }

        self.stop_loading();
        if let Ok(mut slot) = self.document.lock() {
            *slot = None;
        }
        self.history.push(parsed.to_string());

        debug!(url = %parsed, "surface navigation scheduled");
        self.load_task = Some(tokio::spawn(fetch_document(
            self.client.clone(),
            parsed.to_string(),
            self.settings.max_document_bytes,
            Arc::clone(&self.document),
            events,
        )));
        Ok(())
    }

    async fn evaluate(&mut self, script: PageScript) -> Option<String> {
        let html = self.document.lock().ok()?.clone()?;
        trace!(script = script.name(), "evaluating page script");
        Some(dom::evaluate_script(&html, script, &self.settings))
    }

    fn stop_loading(&mut self) {
        if let Some(task) = self.load_task.take() {
            task.abort();
        }
    }

    fn clear(&mut self) {
        self.history.clear();
        if let Ok(mut slot) = self.document.lock() {
            *slot = None;
        }
    }

    fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.stop_loading();
        self.clear();
        self.destroyed = true;
    }
}

impl Drop for HttpSurface {
    fn drop(&mut self) {
        self.stop_loading();
    }
}

async fn fetch_document(
    client: reqwest::Client,
    url: String,
    max_bytes: usize,
    document: Arc<Mutex<Option<String>>>,
    events: SurfaceEvents,
) {
    // Send failures mean the navigation already resolved; later events are moot.
    let _ = events.send(SurfaceEvent::PageStarted { url: url.clone() });

    let response = match client.get(&url).send().await {
        Ok(response) => response,
        Err(e) => {
            let _ = events.send(SurfaceEvent::LoadError {
                description: describe_transport_error(&e),
                main_frame: true,
            });
            return;
        }
    };

    let final_url = response.url().to_string();
    if final_url != url {
        let _ = events.send(SurfaceEvent::PageStarted {
            url: final_url.clone(),
        });
    }

    let status = response.status();
    if status.is_client_error() || status.is_server_error() {
        let _ = events.send(SurfaceEvent::HttpError {
            status: status.as_u16(),
            main_frame: true,
        });
    }

    match read_body(response, max_bytes).await {
        Ok(body) => {
            if let Ok(mut slot) = document.lock() {
                *slot = Some(body);
            }
            let _ = events.send(SurfaceEvent::PageFinished { url: final_url });
        }
        Err(description) => {
            let _ = events.send(SurfaceEvent::LoadError {
                description,
                main_frame: true,
            });
        }
    }
}

/// Read the response body, keeping at most `max_bytes`.
async fn read_body(
    mut response: reqwest::Response,
    max_bytes: usize,
) -> std::result::Result<String, String> {
    let mut bytes: Vec<u8> = Vec::new();
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| format!("body read failed: {e}"))?
    {
        let room = max_bytes.saturating_sub(bytes.len());
        if chunk.len() >= room {
            bytes.extend_from_slice(&chunk[..room]);
            debug!(max_bytes, "document truncated at size limit");
            break;
        }
        bytes.extend_from_slice(&chunk);
    }
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn describe_transport_error(error: &reqwest::Error) -> String {
    if error.is_redirect() {
        "too many redirects".to_owned()
    } else if error.is_timeout() {
        "connection timed out".to_owned()
    } else if error.is_connect() {
        "connection failed".to_owned()
    } else {
        format!("request failed: {error}")
    }
}
