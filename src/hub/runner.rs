//! The Hub task loop.
//!
//! [`HubRuntime`] owns every piece of loop state: backoff counters, run
//! history, escalation record and the current [`OperatingState`]. Each
//! iteration walks the same gates in order:
//!
//! ```text
//! session? ─► online? ─► under hourly cap? ─► poll ─► escalated? ─► execute
//! ```
//!
//! A blocked gate transitions state and returns the delay to sleep. The
//! sleep itself happens in [`HubRuntime::run`] after the attempt's cleanup,
//! so the wake resource is never held across a backoff.

use crate::config::HubConfig;
use crate::control_plane::{AssumptionItem, ControlPlane, ControlPlaneError, Task, TaskResult};
use crate::error::Result;
use crate::hashing::ContentHashes;
use crate::hub::backoff::BackoffPolicy;
use crate::hub::clock::{Clock, SystemClock};
use crate::hub::escalation::EscalationGate;
use crate::hub::heartbeat::LeaseHeartbeat;
use crate::hub::network::{AlwaysOnline, NetworkProbe};
use crate::hub::run_history::RunHistory;
use crate::hub::state::{OperatingState, StatusUpdate, short_id};
use crate::hub::wake::WakeGuard;
use kilu_extract::{Extraction, SandboxedExtractor, SurfaceFactory};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

/// Facts carry at most this many headings.
const MAX_FACTS: usize = 5;

/// Why an attempt was handed to the Approver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscalationKind {
    /// Navigation failed, timed out, or was gated.
    PageLoadFailed,
    /// The safety scan found a login, paywall or CAPTCHA signal.
    SecurityHeuristic,
    /// The page loaded but held no usable content.
    ExtractionBlocked,
}

impl EscalationKind {
    /// Assumption key sent to the Control Plane.
    pub fn key(self) -> &'static str {
        match self {
            Self::PageLoadFailed => "page_load_failed",
            Self::SecurityHeuristic => "security_heuristic",
            Self::ExtractionBlocked => "extraction_blocked",
        }
    }
}

/// Task loop state and collaborators.
pub struct HubRuntime {
    config: HubConfig,
    control_plane: Arc<dyn ControlPlane>,
    surfaces: Arc<dyn SurfaceFactory>,
    clock: Arc<dyn Clock>,
    network: Arc<dyn NetworkProbe>,
    wake: WakeGuard,
    backoff: BackoffPolicy,
    escalations: EscalationGate,
    history: RunHistory,
    status_tx: Option<mpsc::UnboundedSender<StatusUpdate>>,
    state: OperatingState,
}

impl HubRuntime {
    /// Create a runtime with real time, an always-online probe, a logging
    /// wake backend and an in-memory escalation record.
    pub fn new(
        config: HubConfig,
        control_plane: Arc<dyn ControlPlane>,
        surfaces: Arc<dyn SurfaceFactory>,
    ) -> Self {
        let history = RunHistory::new(config.runtime.max_runs_per_hour);
        Self {
            config,
            control_plane,
            surfaces,
            clock: Arc::new(SystemClock),
            network: Arc::new(AlwaysOnline),
            wake: WakeGuard::default(),
            backoff: BackoffPolicy::new(),
            escalations: EscalationGate::in_memory(),
            history,
            status_tx: None,
            state: OperatingState::Idle,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_network_probe(mut self, network: Arc<dyn NetworkProbe>) -> Self {
        self.network = network;
        self
    }

    pub fn with_wake_guard(mut self, wake: WakeGuard) -> Self {
        self.wake = wake;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_escalation_gate(mut self, escalations: EscalationGate) -> Self {
        self.escalations = escalations;
        self
    }

    /// Publish every transition on `tx`.
    pub fn with_status_channel(mut self, tx: mpsc::UnboundedSender<StatusUpdate>) -> Self {
        self.status_tx = Some(tx);
        self
    }

    pub(crate) fn set_status_channel(&mut self, tx: mpsc::UnboundedSender<StatusUpdate>) {
        self.status_tx = Some(tx);
    }

    pub fn state(&self) -> OperatingState {
        self.state
    }

    pub fn escalations(&self) -> &EscalationGate {
        &self.escalations
    }

    pub fn history(&self) -> &RunHistory {
        &self.history
    }

    pub fn backoff(&self) -> &BackoffPolicy {
        &self.backoff
    }

    pub fn wake(&self) -> &WakeGuard {
        &self.wake
    }

    /// Run iterations while `active` reads `true`. Backoff sleeps end early
    /// when `active` flips to `false`; an attempt in progress always
    /// finishes first.
    pub async fn run(&mut self, mut active: watch::Receiver<bool>) {
        info!("hub loop started");
        while is_active(&active) {
            let delay = match self.run_iteration().await {
                Ok(delay) => delay,
                Err(e) => {
                    error!("hub loop iteration failed: {e}");
                    Some(self.enter(OperatingState::ErrorUnknown, format!("Crash: {e}")))
                }
            };
            if let Some(delay) = delay {
                debug!(delay_ms = delay.as_millis() as u64, state = %self.state, "backing off");
                let clock = Arc::clone(&self.clock);
                tokio::select! {
                    () = clock.sleep(delay) => {}
                    () = wait_until_inactive(&mut active) => {}
                }
            }
        }
        self.wake.release();
        info!("hub loop stopped");
    }

    /// One pass through the gates. Returns how long to sleep before the
    /// next pass, or `None` to continue immediately.
    ///
    /// # Errors
    ///
    /// Returns an error only for failures outside the expected taxonomy
    /// (for example a surface that cannot be created); the caller treats
    /// these as `ErrorUnknown`.
    pub async fn run_iteration(&mut self) -> Result<Option<Duration>> {
        if !self.control_plane.has_session() {
            return Ok(Some(
                self.enter(OperatingState::ErrorAuth, "Missing Hub session token"),
            ));
        }

        if !self.network.is_online().await {
            return Ok(Some(
                self.enter(OperatingState::ErrorNetwork, "No network connection"),
            ));
        }

        let now = self.clock.now_ms();
        if self.history.is_at_cap_at(now) {
            self.transition(
                OperatingState::Idle,
                format!(
                    "Hourly limit ({}) reached. Sleeping...",
                    self.config.runtime.max_runs_per_hour
                ),
            );
            return Ok(Some(Duration::from_millis(
                self.config.runtime.hourly_cap_sleep_ms,
            )));
        }

        self.transition(OperatingState::Idle, "Polling queue");
        let tasks = match self
            .control_plane
            .poll_queue(self.config.control_plane.queue_max)
            .await
        {
            Ok(tasks) => tasks,
            Err(ControlPlaneError::Unauthorized(message)) => {
                warn!("session rejected by control plane: {message}");
                self.control_plane.invalidate_session();
                return Ok(Some(self.enter(OperatingState::ErrorAuth, message)));
            }
            Err(e) => {
                return Ok(Some(self.enter(
                    OperatingState::ErrorNetwork,
                    format!("Queue poll failed: {e}"),
                )));
            }
        };

        let Some(task) = tasks.into_iter().next() else {
            match self.escalations.clear_all() {
                Ok(0) => {}
                Ok(dropped) => info!(dropped, "queue empty, escalation record released"),
                Err(e) => error!("cannot persist escalation record: {e}"),
            }
            return Ok(Some(self.enter(OperatingState::Idle, "Queue empty")));
        };

        if self.escalations.has_escalated(&task.task_id) {
            return Ok(Some(self.enter(
                OperatingState::WaitingApprover,
                format!(
                    "Waiting for Approver resolution on task {}",
                    short_id(&task.task_id)
                ),
            )));
        }

        self.execute(&task).await
    }

    /// Run `task` end to end with the wake resource held and the lease
    /// heartbeat running. Both, and the extractor, are torn down on every
    /// exit path.
    async fn execute(&mut self, task: &Task) -> Result<Option<Duration>> {
        let lease = self
            .wake
            .acquire(Duration::from_millis(self.config.runtime.wake_timeout_ms));
        self.transition(
            OperatingState::Idle,
            format!("Running task {}", short_id(&task.task_id)),
        );
        if let Err(e) = self.history.record_at(self.clock.now_ms()) {
            warn!("{e}");
        }

        let heartbeat = LeaseHeartbeat::start(
            Arc::clone(&self.control_plane),
            task.task_id.clone(),
            Duration::from_millis(self.config.runtime.heartbeat_interval_ms),
            self.wake.clone(),
        );
        let mut extractor =
            SandboxedExtractor::new(Arc::clone(&self.surfaces), self.config.extract.clone());

        let outcome = self.attempt(task, &mut extractor).await;

        heartbeat.stop().await;
        extractor.destroy();
        drop(lease);
        debug!(task_id = %task.task_id, "attempt resources released");
        outcome
    }

    async fn attempt(
        &mut self,
        task: &Task,
        extractor: &mut SandboxedExtractor,
    ) -> Result<Option<Duration>> {
        match self
            .control_plane
            .mint_step_batch(&task.grant_id, self.config.control_plane.step_batch_size)
            .await
        {
            Ok(Some(batch)) => {
                debug!(batch_id = %batch.batch_id, size = batch.size, "step batch minted");
            }
            Ok(None) => debug!(grant_id = %task.grant_id, "step batch authorized"),
            Err(ControlPlaneError::Quota(message)) => {
                return Ok(Some(self.enter(
                    OperatingState::ErrorQuota,
                    format!("Mint failed: {message}"),
                )));
            }
            Err(e) => {
                return Ok(Some(self.enter(
                    OperatingState::ErrorNetwork,
                    format!("Mint failed: {e}"),
                )));
            }
        }

        extractor.initialize()?;
        let extract = &self.config.extract;
        let page_timeout = Duration::from_millis(extract.page_load_timeout_ms);
        let grace = Duration::from_millis(extract.dom_ready_grace_ms);
        let min_text_chars = extract.min_text_chars;

        if let Err(e) = extractor.load(&task.external_url, page_timeout, grace).await {
            info!(task_id = %task.task_id, url = %task.external_url, "page load failed: {e}");
            let delay = self
                .escalate(task, EscalationKind::PageLoadFailed, &e.to_string())
                .await;
            return Ok(Some(delay));
        }

        let reason = extractor.check_safety().await?;
        if !reason.is_empty() {
            info!(task_id = %task.task_id, url = %task.external_url, %reason, "safety check refused page");
            let delay = self
                .escalate(task, EscalationKind::SecurityHeuristic, &reason)
                .await;
            return Ok(Some(delay));
        }

        let extraction = extractor.extract().await?;
        if extraction.is_unextractable(min_text_chars) {
            let delay = self
                .escalate(
                    task,
                    EscalationKind::ExtractionBlocked,
                    "DOM loaded but no meaningful content.",
                )
                .await;
            return Ok(Some(delay));
        }

        let result = build_result(&task.external_url, extraction);
        match self.control_plane.submit_result(&task.task_id, &result).await {
            Ok(outcome) => {
                debug!(task_id = %task.task_id, ?outcome, "result submitted");
                self.backoff.reset();
                if let Err(e) = self.escalations.clear(&task.task_id) {
                    error!("cannot clear escalation record: {e}");
                }
                self.transition(
                    OperatingState::Idle,
                    format!("Success on task {}", short_id(&task.task_id)),
                );
                Ok(None)
            }
            Err(e) => Ok(Some(self.enter(
                OperatingState::ErrorNetwork,
                format!("Submit failed: {e}"),
            ))),
        }
    }

    /// Ask the Approver about `task` unless already asked, then wait.
    async fn escalate(&mut self, task: &Task, kind: EscalationKind, reason: &str) -> Duration {
        if self.escalations.has_escalated(&task.task_id) {
            debug!(task_id = %task.task_id, "already escalated");
        } else {
            if let Err(e) = self.escalations.mark_escalated(&task.task_id) {
                error!("cannot persist escalation record: {e}");
            }
            let item = AssumptionItem {
                key: kind.key().to_owned(),
                question: format!("Execution blocked: {reason}"),
            };
            match self
                .control_plane
                .request_assumptions(&task.task_id, &[item])
                .await
            {
                Ok(()) => info!(task_id = %task.task_id, key = kind.key(), "escalated to approver"),
                Err(e) => warn!(
                    task_id = %task.task_id,
                    status = ?e.status(),
                    "escalation request failed: {e}"
                ),
            }
        }
        self.enter(OperatingState::WaitingApprover, "Escalated to Approver")
    }

    /// Transition and return the backoff for the new state.
    fn enter(&mut self, state: OperatingState, message: impl Into<String>) -> Duration {
        self.transition(state, message);
        self.backoff.delay(state)
    }

    fn transition(&mut self, state: OperatingState, message: impl Into<String>) {
        let message = message.into();
        if state.is_error() {
            warn!(state = %state, "{message}");
        } else {
            info!(state = %state, "{message}");
        }
        self.state = state;
        if let Some(tx) = &self.status_tx {
            // A closed channel just means nobody is watching.
            let _ = tx.send(StatusUpdate::new(state, message));
        }
    }
}

/// Result payload for a successful extraction.
pub fn build_result(url: &str, extraction: Extraction) -> TaskResult {
    let summary = format!(
        "Successfully extracted {} characters and {} headings from {url}.",
        extraction.char_count(),
        extraction.headings.len()
    );
    let facts = extraction
        .headings
        .iter()
        .take(MAX_FACTS)
        .map(|heading| format!("Heading Extracted: {heading}"))
        .collect();
    let hashes = ContentHashes::compute(&extraction.text, &extraction.headings);
    TaskResult {
        url: url.to_owned(),
        extracted_text: extraction.text,
        headings: extraction.headings,
        summary,
        facts,
        hashes,
    }
}

fn is_active(active: &watch::Receiver<bool>) -> bool {
    *active.borrow()
}

async fn wait_until_inactive(active: &mut watch::Receiver<bool>) {
    loop {
        let still_active = *active.borrow_and_update();
        if !still_active {
            return;
        }
        if active.changed().await.is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::hashing::content_hash;

    #[test]
    fn result_summary_and_facts() {
        let extraction = Extraction {
            text: "x".repeat(4000),
            headings: (1..=7).map(|i| format!("H{i}")).collect(),
        };
        let result = build_result("https://example.com/a", extraction);
        assert_eq!(
            result.summary,
            "Successfully extracted 4000 characters and 7 headings from https://example.com/a."
        );
        assert_eq!(result.facts.len(), 5);
        assert_eq!(result.facts[0], "Heading Extracted: H1");
        assert_eq!(result.hashes.headings_hash, content_hash("H1|H2|H3|H4|H5|H6|H7"));
    }

    #[test]
    fn escalation_keys() {
        assert_eq!(EscalationKind::PageLoadFailed.key(), "page_load_failed");
        assert_eq!(EscalationKind::SecurityHeuristic.key(), "security_heuristic");
        assert_eq!(EscalationKind::ExtractionBlocked.key(), "extraction_blocked");
    }

    #[tokio::test]
    async fn wait_until_inactive_returns_on_flip() {
        let (tx, mut rx) = watch::channel(true);
        let waiter = tokio::spawn(async move {
            wait_until_inactive(&mut rx).await;
        });
        tx.send(false).unwrap();
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn wait_until_inactive_returns_when_sender_dropped() {
        let (tx, mut rx) = watch::channel(true);
        drop(tx);
        wait_until_inactive(&mut rx).await;
    }
}
