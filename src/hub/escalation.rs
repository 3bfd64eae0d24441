//! Per-task "already escalated" record.
//!
//! Ensures a Hub asks its Approver about a given task at most once until
//! that task's result is accepted. The record is a JSON map of
//! `task_id -> true` rewritten atomically on every change so it survives
//! restarts. Single writer (the task loop); not a distributed lock.
//!
//! The loop never executes a task whose flag is set, so a flagged task
//! cannot reach a successful submit on its own. Flags are dropped in bulk
//! with [`EscalationGate::clear_all`] once the Control Plane reports an
//! empty queue: at that point no escalated task is still leased to this
//! Hub, and a task the Approver sends back must be runnable again.

use crate::error::{HubError, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Durable set of escalated task ids.
#[derive(Debug)]
pub struct EscalationGate {
    path: Option<PathBuf>,
    escalated: BTreeMap<String, bool>,
}

impl EscalationGate {
    /// Open the record at `path`. An unreadable or malformed file is logged
    /// and treated as empty.
    #[must_use]
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let escalated = load(&path);
        debug!(
            entries = escalated.len(),
            "escalation record loaded from {}",
            path.display()
        );
        Self {
            path: Some(path),
            escalated,
        }
    }

    /// A record that is not persisted.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            path: None,
            escalated: BTreeMap::new(),
        }
    }

    pub fn has_escalated(&self, task_id: &str) -> bool {
        self.escalated.get(task_id).copied().unwrap_or(false)
    }

    /// Record that `task_id` has been escalated.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Store`] if the record cannot be persisted. The
    /// in-memory flag is set regardless.
    pub fn mark_escalated(&mut self, task_id: &str) -> Result<()> {
        self.escalated.insert(task_id.to_owned(), true);
        self.persist()
    }

    /// Forget `task_id`. Called only once its result has been accepted.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Store`] if the record cannot be persisted.
    pub fn clear(&mut self, task_id: &str) -> Result<()> {
        if self.escalated.remove(task_id).is_none() {
            return Ok(());
        }
        self.persist()
    }

    /// Forget every flagged task. Returns how many were dropped.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Store`] if the record cannot be persisted. The
    /// in-memory record is emptied regardless.
    pub fn clear_all(&mut self) -> Result<usize> {
        let dropped = self.escalated.len();
        if dropped == 0 {
            return Ok(0);
        }
        self.escalated.clear();
        self.persist()?;
        Ok(dropped)
    }

    pub fn len(&self) -> usize {
        self.escalated.len()
    }

    pub fn is_empty(&self) -> bool {
        self.escalated.is_empty()
    }

    fn persist(&self) -> Result<()> {
        match &self.path {
            Some(path) => save(path, &self.escalated),
            None => Ok(()),
        }
    }
}

fn load(path: &Path) -> BTreeMap<String, bool> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return BTreeMap::new(),
        Err(e) => {
            warn!("cannot read escalation record at {}: {e}", path.display());
            return BTreeMap::new();
        }
    };
    match serde_json::from_slice(&bytes) {
        Ok(map) => map,
        Err(e) => {
            warn!(
                "ignoring malformed escalation record at {}: {e}",
                path.display()
            );
            BTreeMap::new()
        }
    }
}

fn save(path: &Path, escalated: &BTreeMap<String, bool>) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            HubError::Store(format!("failed to create escalation record directory: {e}"))
        })?;
    }
    let tmp_path = path.with_extension("tmp");
    let json = serde_json::to_vec(escalated)
        .map_err(|e| HubError::Store(format!("failed to serialize escalation record: {e}")))?;
    std::fs::write(&tmp_path, json).map_err(|e| {
        HubError::Store(format!("failed to write escalation record temp file: {e}"))
    })?;
    std::fs::rename(&tmp_path, path)
        .map_err(|e| HubError::Store(format!("failed to finalize escalation record: {e}")))?;
    Ok(())
}
