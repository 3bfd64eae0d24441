//! HTTP implementation of [`ControlPlane`].
//!
//! Every request is bearer-authenticated with the current session token and
//! addressed under the normalized `/v1` base URL. The session's recorded
//! Control Plane URL, when present, overrides the configured one.

use super::error::{envelope_message, status_message};
use super::types::{
    AssumptionItem, AssumptionsRequest, LeaseRefreshRequest, MintStepBatchRequest,
    QueueResponse, StepBatch, SubmitOutcome, Task, TaskResult,
};
use super::{ControlPlane, ControlPlaneError};
use crate::config::{ControlPlaneConfig, normalize_base_url};
use crate::error::{HubError, Result};
use crate::session::SessionStore;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Control Plane client over HTTPS.
pub struct HttpControlPlane {
    client: reqwest::Client,
    config: ControlPlaneConfig,
    session: Arc<SessionStore>,
}

impl std::fmt::Debug for HttpControlPlane {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpControlPlane")
            .field("base_url", &self.config.base_url)
            .field("session", &self.session)
            .finish()
    }
}

impl HttpControlPlane {
    /// Build a client.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Config`] if the HTTP client cannot be constructed.
    pub fn new(config: ControlPlaneConfig, session: Arc<SessionStore>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .connect_timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| HubError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            config,
            session,
        })
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    /// Base URL followed by `segments`, each percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> std::result::Result<url::Url, ControlPlaneError> {
        let base = resolve_base_url(&self.config, &self.session)
            .map_err(|e| ControlPlaneError::NotConfigured(e.to_string()))?;
        let mut url = url::Url::parse(&base)
            .map_err(|e| ControlPlaneError::NotConfigured(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|()| ControlPlaneError::NotConfigured(format!("{base} cannot be a base URL")))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.session.token() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn post_json<T: Serialize + ?Sized>(
        &self,
        segments: &[&str],
        body: &T,
    ) -> std::result::Result<reqwest::Response, ControlPlaneError> {
        let url = self.endpoint(segments)?;
        debug!(%url, "control plane POST");
        self.authorized(self.client.post(url))
            .json(body)
            .send()
            .await
            .map_err(transport_error)
    }
}

#[async_trait]
impl ControlPlane for HttpControlPlane {
    fn has_session(&self) -> bool {
        self.session.has_token()
    }

    fn invalidate_session(&self) {
        if let Err(e) = self.session.clear_token() {
            error!("cannot clear session token: {e}");
        }
    }

    async fn poll_queue(&self, max: u32) -> std::result::Result<Vec<Task>, ControlPlaneError> {
        let mut url = self.endpoint(&["hub", "queue"])?;
        url.query_pairs_mut().append_pair("max", &max.to_string());
        debug!(%url, "control plane GET");

        let response = self
            .authorized(self.client.get(url))
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status().as_u16();
        if matches!(status, 401 | 403) {
            let body = response.text().await.unwrap_or_default();
            return Err(ControlPlaneError::Unauthorized(status_message(
                status,
                envelope_message(&body).as_deref(),
            )));
        }
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let body = response.text().await.map_err(transport_error)?;
        if body.trim().is_empty() {
            return Ok(Vec::new());
        }
        let queue: QueueResponse =
            serde_json::from_str(&body).map_err(|e| ControlPlaneError::Decode(e.to_string()))?;

        let tasks = queue
            .into_items()
            .into_iter()
            .filter_map(|queued| match Task::try_from(queued) {
                Ok(task) => Some(task),
                Err(reason) => {
                    warn!("dropping queue entry: {reason}");
                    None
                }
            })
            .collect();
        Ok(tasks)
    }

    async fn mint_step_batch(
        &self,
        grant_id: &str,
        size: u32,
    ) -> std::result::Result<Option<StepBatch>, ControlPlaneError> {
        let response = self
            .post_json(
                &["grants", grant_id, "mint-step-batch"],
                &MintStepBatchRequest { size },
            )
            .await?;

        let status = response.status().as_u16();
        if matches!(status, 403 | 429) {
            let body = response.text().await.unwrap_or_default();
            return Err(ControlPlaneError::Quota(status_message(
                status,
                envelope_message(&body).as_deref(),
            )));
        }
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }
        // Success is the status alone; the batch body is informational.
        let body = response.text().await.unwrap_or_default();
        if body.trim().is_empty() {
            return Ok(None);
        }
        match serde_json::from_str::<StepBatch>(&body) {
            Ok(batch) => Ok(Some(batch)),
            Err(e) => {
                debug!("mint response carried no step batch: {e}");
                Ok(None)
            }
        }
    }

    async fn refresh_lease(&self, task_id: &str) -> std::result::Result<(), ControlPlaneError> {
        let response = self
            .post_json(
                &["hub", "lease", "refresh"],
                &LeaseRefreshRequest {
                    task_id: task_id.to_owned(),
                },
            )
            .await?;
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }
        Ok(())
    }

    async fn submit_result(
        &self,
        task_id: &str,
        result: &TaskResult,
    ) -> std::result::Result<SubmitOutcome, ControlPlaneError> {
        let response = self.post_json(&["tasks", task_id, "result"], result).await?;
        if response.status().is_success() {
            return Ok(SubmitOutcome::Accepted);
        }
        if response.status().as_u16() == 409 {
            return Ok(SubmitOutcome::Duplicate);
        }
        Err(status_error(response).await)
    }

    async fn request_assumptions(
        &self,
        task_id: &str,
        assumptions: &[AssumptionItem],
    ) -> std::result::Result<(), ControlPlaneError> {
        let body = AssumptionsRequest {
            assumptions: assumptions.to_vec(),
        };
        let response = self
            .post_json(&["tasks", task_id, "assumptions", "request"], &body)
            .await?;
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }
        Ok(())
    }
}

/// The normalized API root in effect: the session's paired URL if recorded,
/// otherwise the configured one.
///
/// # Errors
///
/// See [`normalize_base_url`].
pub fn resolve_base_url(config: &ControlPlaneConfig, session: &SessionStore) -> Result<String> {
    let raw = session
        .control_plane_url()
        .unwrap_or_else(|| config.base_url.clone());
    normalize_base_url(&raw, config.allow_insecure)
}

async fn status_error(response: reqwest::Response) -> ControlPlaneError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    ControlPlaneError::Status {
        status,
        message: status_message(status, envelope_message(&body).as_deref()),
    }
}

fn transport_error(error: reqwest::Error) -> ControlPlaneError {
    if error.is_timeout() {
        ControlPlaneError::Transport("request timed out".into())
    } else if error.is_connect() {
        ControlPlaneError::Transport("connection failed".into())
    } else {
        ControlPlaneError::Transport(error.to_string())
    }
}
