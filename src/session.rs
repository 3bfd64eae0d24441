//! Durable Hub session: the bearer token issued at pairing and an optional
//! Control Plane URL override.
//!
//! The file is JSON, replaced atomically on every change. The token is
//! never logged and is redacted from `Debug` output.

use crate::error::{HubError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Clone, Default, Serialize, Deserialize)]
struct SessionRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    control_plane_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    session_token: Option<String>,
}

/// Thread-safe holder of the Hub session, optionally backed by a file.
pub struct SessionStore {
    path: Option<PathBuf>,
    record: Mutex<SessionRecord>,
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("path", &self.path)
            .field("has_token", &self.has_token())
            .finish()
    }
}

impl SessionStore {
    /// Open the session file at `path`. A missing or malformed file starts
    /// an empty session.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Session`] if the file exists but cannot be read.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let record = read_record(&path)?;
        Ok(Self {
            path: Some(path),
            record: Mutex::new(record),
        })
    }

    /// A session that lives only in memory.
    #[must_use]
    pub fn in_memory(token: Option<String>) -> Self {
        Self {
            path: None,
            record: Mutex::new(SessionRecord {
                control_plane_url: None,
                session_token: token,
            }),
        }
    }

    /// Current bearer token, if paired.
    pub fn token(&self) -> Option<String> {
        self.record.lock().ok()?.session_token.clone()
    }

    /// Whether a bearer token is present.
    pub fn has_token(&self) -> bool {
        self.record
            .lock()
            .map(|r| r.session_token.is_some())
            .unwrap_or(false)
    }

    /// Store a new bearer token.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Session`] if the file cannot be written.
    pub fn set_token(&self, token: impl Into<String>) -> Result<()> {
        self.update(|r| r.session_token = Some(token.into()))
    }

    /// Forget the bearer token. The Hub must be re-paired afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Session`] if the file cannot be written.
    pub fn clear_token(&self) -> Result<()> {
        self.update(|r| r.session_token = None)
    }

    /// Control Plane URL recorded at pairing, overriding the configured one.
    pub fn control_plane_url(&self) -> Option<String> {
        self.record.lock().ok()?.control_plane_url.clone()
    }

    /// Record the Control Plane URL chosen at pairing.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Session`] if the file cannot be written.
    pub fn set_control_plane_url(&self, url: impl Into<String>) -> Result<()> {
        self.update(|r| r.control_plane_url = Some(url.into()))
    }

    fn update(&self, apply: impl FnOnce(&mut SessionRecord)) -> Result<()> {
        let snapshot = {
            let mut record = self
                .record
                .lock()
                .map_err(|_| HubError::Session("session lock poisoned".into()))?;
            apply(&mut record);
            record.clone()
        };
        match &self.path {
            Some(path) => write_record(path, &snapshot),
            None => Ok(()),
        }
    }
}

fn read_record(path: &Path) -> Result<SessionRecord> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(SessionRecord::default()),
        Err(e) => {
            return Err(HubError::Session(format!(
                "failed to read session file: {e}"
            )));
        }
    };
    match serde_json::from_slice(&bytes) {
        Ok(record) => Ok(record),
        Err(e) => {
            tracing::warn!(
                "ignoring malformed session file at {}: {e}",
                path.display()
            );
            Ok(SessionRecord::default())
        }
    }
}

fn write_record(path: &Path, record: &SessionRecord) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| HubError::Session(format!("failed to create session directory: {e}")))?;
    }
    let tmp_path = path.with_extension("tmp");
    let json = serde_json::to_vec_pretty(record)
        .map_err(|e| HubError::Session(format!("failed to serialize session: {e}")))?;
    std::fs::write(&tmp_path, json)
        .map_err(|e| HubError::Session(format!("failed to write session temp file: {e}")))?;
    std::fs::rename(&tmp_path, path)
        .map_err(|e| HubError::Session(format!("failed to finalize session file: {e}")))?;
    Ok(())
}
