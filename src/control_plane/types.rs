//! Control Plane wire types.

use crate::hashing::ContentHashes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A queue entry as the Control Plane sends it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueuedTask {
    pub task_id: String,
    #[serde(default)]
    pub plan_id: Option<String>,
    #[serde(default)]
    pub grant_id: Option<String>,
    #[serde(default)]
    pub active_grant_id: Option<String>,
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub inputs: Option<String>,
    #[serde(default)]
    pub external_url: Option<String>,
    #[serde(default)]
    pub expires_at: Option<String>,
    #[serde(default)]
    pub limits: Option<serde_json::Value>,
    #[serde(default)]
    pub forbidden: Option<serde_json::Value>,
}

/// Queue response body: a bare array or `{ "items": [...] }`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum QueueResponse {
    List(Vec<QueuedTask>),
    Wrapped {
        #[serde(default)]
        items: Vec<QueuedTask>,
    },
}

impl QueueResponse {
    pub fn into_items(self) -> Vec<QueuedTask> {
        match self {
            Self::List(items) | Self::Wrapped { items } => items,
        }
    }
}

/// A leased task, ready to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub task_id: String,
    pub grant_id: String,
    pub external_url: String,
    pub lease_expires_at: Option<DateTime<Utc>>,
}

impl TryFrom<QueuedTask> for Task {
    type Error = String;

    /// Requires a grant (`grant_id`, else `active_grant_id`) and a URL.
    fn try_from(queued: QueuedTask) -> Result<Self, Self::Error> {
        let grant_id = queued
            .grant_id
            .or(queued.active_grant_id)
            .filter(|g| !g.trim().is_empty())
            .ok_or_else(|| format!("task {} has no grant", queued.task_id))?;
        let external_url = queued
            .external_url
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| format!("task {} has no external_url", queued.task_id))?;
        let lease_expires_at = queued
            .expires_at
            .as_deref()
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|dt| dt.with_timezone(&Utc));
        Ok(Self {
            task_id: queued.task_id,
            grant_id,
            external_url,
            lease_expires_at,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MintStepBatchRequest {
    pub size: u32,
}

/// Authorization for a batch of execution steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepBatch {
    pub batch_id: String,
    pub size: u32,
    pub issued_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaseRefreshRequest {
    pub task_id: String,
}

/// Result payload for `POST /tasks/{task_id}/result`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskResult {
    pub url: String,
    pub extracted_text: String,
    pub headings: Vec<String>,
    pub summary: String,
    pub facts: Vec<String>,
    pub hashes: ContentHashes,
}

/// How the Control Plane took a submitted result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// 2xx.
    Accepted,
    /// 409: a result for this task already exists.
    Duplicate,
}

/// One question put to the Approver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssumptionItem {
    pub key: String,
    pub question: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssumptionsRequest {
    pub assumptions: Vec<AssumptionItem>,
}

/// Control Plane error body.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorEnvelope {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}
