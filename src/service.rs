//! Supervisor for the Hub loop.
//!
//! [`HubService`] owns the loop task and accepts start, pause, resume and
//! stop commands. Pausing or stopping lets the current attempt finish,
//! interrupts any backoff sleep, and hands the [`HubRuntime`] back so a
//! later resume keeps its counters, run history and escalation record.

use crate::config::HubConfig;
use crate::control_plane::HttpControlPlane;
use crate::error::{HubError, Result};
use crate::hub::{EscalationGate, HubRuntime, StatusUpdate, TcpProbe};
use crate::hub_dirs;
use crate::session::SessionStore;
use kilu_extract::HttpSurfaceFactory;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::info;

/// Lifecycle of the supervised loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Stopped,
    Running,
    Paused,
}

/// Owns the loop task.
pub struct HubService {
    runtime: Option<HubRuntime>,
    task: Option<JoinHandle<HubRuntime>>,
    active_tx: watch::Sender<bool>,
    state: ServiceState,
}

impl HubService {
    /// Wrap `runtime`. Status updates arrive on the returned receiver.
    pub fn new(mut runtime: HubRuntime) -> (Self, mpsc::UnboundedReceiver<StatusUpdate>) {
        let (status_tx, status_rx) = mpsc::unbounded_channel();
        runtime.set_status_channel(status_tx);
        let (active_tx, _) = watch::channel(false);
        (
            Self {
                runtime: Some(runtime),
                task: None,
                active_tx,
                state: ServiceState::Stopped,
            },
            status_rx,
        )
    }

    pub fn state(&self) -> ServiceState {
        self.state
    }

    /// Spawn the loop. No-op while already running.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Service`] if an earlier loop task panicked and
    /// took the runtime with it.
    pub fn start(&mut self) -> Result<()> {
        if self.state == ServiceState::Running {
            return Ok(());
        }
        let mut runtime = self
            .runtime
            .take()
            .ok_or_else(|| HubError::Service("hub runtime unavailable".into()))?;

        self.active_tx.send_replace(true);
        let active_rx = self.active_tx.subscribe();
        self.task = Some(tokio::spawn(async move {
            runtime.run(active_rx).await;
            runtime
        }));
        self.state = ServiceState::Running;
        info!("hub service running");
        Ok(())
    }

    /// Let the loop reach its next iteration boundary and park it.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Service`] if the loop task panicked.
    pub async fn pause(&mut self) -> Result<()> {
        if self.state != ServiceState::Running {
            return Ok(());
        }
        self.halt().await?;
        self.state = ServiceState::Paused;
        info!("hub service paused");
        Ok(())
    }

    /// Restart a paused loop with its state intact.
    ///
    /// # Errors
    ///
    /// See [`HubService::start`].
    pub fn resume(&mut self) -> Result<()> {
        if self.state != ServiceState::Paused {
            return Ok(());
        }
        info!("hub service resuming");
        self.start()
    }

    /// Stop the loop and wait for it to exit.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Service`] if the loop task panicked.
    pub async fn stop(&mut self) -> Result<()> {
        if self.state == ServiceState::Running {
            self.halt().await?;
        }
        self.state = ServiceState::Stopped;
        info!("hub service stopped");
        Ok(())
    }

    /// The runtime, when the loop is not running.
    pub fn runtime(&self) -> Option<&HubRuntime> {
        self.runtime.as_ref()
    }

    async fn halt(&mut self) -> Result<()> {
        self.active_tx.send_replace(false);
        let Some(task) = self.task.take() else {
            return Ok(());
        };
        match task.await {
            Ok(runtime) => {
                self.runtime = Some(runtime);
                Ok(())
            }
            Err(e) => {
                self.state = ServiceState::Stopped;
                Err(HubError::Service(format!("hub loop task failed: {e}")))
            }
        }
    }
}

/// Assemble a production runtime: HTTP Control Plane client over the stored
/// session, TCP connectivity probe, persisted escalation record and the
/// HTTP render surface.
///
/// # Errors
///
/// Returns an error if the config is invalid or the session file cannot be
/// read.
pub fn build_runtime(config: HubConfig) -> Result<HubRuntime> {
    config.validate()?;

    let session = Arc::new(SessionStore::open(hub_dirs::session_file())?);
    let control_plane = Arc::new(HttpControlPlane::new(
        config.control_plane.clone(),
        Arc::clone(&session),
    )?);
    let probe = Arc::new(TcpProbe::new(
        config.control_plane.clone(),
        session,
        Duration::from_secs(config.control_plane.request_timeout_secs),
    ));
    let escalations = EscalationGate::open(hub_dirs::escalation_file());

    Ok(
        HubRuntime::new(config, control_plane, Arc::new(HttpSurfaceFactory))
            .with_network_probe(probe)
            .with_escalation_gate(escalations),
    )
}
