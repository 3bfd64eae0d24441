//! Background lease keep-alive for the task in flight.
//!
//! One spawned task per attempt. It refreshes the lease every interval
//! while the wake resource is held, swallows refresh failures, and exits
//! on [`LeaseHeartbeat::stop`], on drop, or once the wake resource is gone.

use crate::control_plane::ControlPlane;
use crate::hub::wake::WakeGuard;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Handle to a running heartbeat.
pub struct LeaseHeartbeat {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl LeaseHeartbeat {
    /// Start refreshing `task_id`'s lease every `interval`.
    pub fn start(
        control_plane: Arc<dyn ControlPlane>,
        task_id: String,
        interval: Duration,
        wake: WakeGuard,
    ) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = token.cancelled() => break,
                    () = tokio::time::sleep(interval) => {}
                }
                if !wake.is_held() {
                    debug!(task_id, "wake resource gone, heartbeat exiting");
                    break;
                }
                match control_plane.refresh_lease(&task_id).await {
                    Ok(()) => debug!(task_id, "lease refreshed"),
                    Err(e) => warn!(task_id, status = ?e.status(), "lease refresh failed: {e}"),
                }
            }
        });
        Self {
            cancel,
            handle: Some(handle),
        }
    }

    /// Stop the heartbeat and wait for it to exit.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for LeaseHeartbeat {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::control_plane::{
        AssumptionItem, ControlPlaneError, StepBatch, SubmitOutcome, Task, TaskResult,
    };
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RefreshRecorder {
        refreshed: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl ControlPlane for RefreshRecorder {
        fn has_session(&self) -> bool {
            true
        }

        fn invalidate_session(&self) {}

        async fn poll_queue(&self, _max: u32) -> Result<Vec<Task>, ControlPlaneError> {
            Ok(Vec::new())
        }

        async fn mint_step_batch(
            &self,
            _grant_id: &str,
            _size: u32,
        ) -> Result<Option<StepBatch>, ControlPlaneError> {
            Err(ControlPlaneError::Transport("unused".into()))
        }

        async fn refresh_lease(&self, task_id: &str) -> Result<(), ControlPlaneError> {
            self.refreshed.lock().unwrap().push(task_id.to_owned());
            if self.fail {
                Err(ControlPlaneError::Transport("offline".into()))
            } else {
                Ok(())
            }
        }

        async fn submit_result(
            &self,
            _task_id: &str,
            _result: &TaskResult,
        ) -> Result<SubmitOutcome, ControlPlaneError> {
            Ok(SubmitOutcome::Accepted)
        }

        async fn request_assumptions(
            &self,
            _task_id: &str,
            _assumptions: &[AssumptionItem],
        ) -> Result<(), ControlPlaneError> {
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn refreshes_every_interval_while_held() {
        let recorder = Arc::new(RefreshRecorder::default());
        let wake = WakeGuard::default();
        let _lease = wake.acquire(Duration::from_secs(120));

        let heartbeat = LeaseHeartbeat::start(
            recorder.clone(),
            "task-1".into(),
            Duration::from_secs(30),
            wake.clone(),
        );
        tokio::time::sleep(Duration::from_secs(95)).await;
        heartbeat.stop().await;

        assert_eq!(recorder.refreshed.lock().unwrap().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn failures_are_swallowed() {
        let recorder = Arc::new(RefreshRecorder {
            fail: true,
            ..Default::default()
        });
        let wake = WakeGuard::default();
        let _lease = wake.acquire(Duration::from_secs(120));
        let heartbeat = LeaseHeartbeat::start(
            recorder.clone(),
            "task-2".into(),
            Duration::from_secs(30),
            wake.clone(),
        );
        tokio::time::sleep(Duration::from_secs(65)).await;
        assert!(heartbeat.is_running());
        assert_eq!(recorder.refreshed.lock().unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn exits_when_wake_released() {
        let recorder = Arc::new(RefreshRecorder::default());
        let wake = WakeGuard::default();
        let lease = wake.acquire(Duration::from_secs(120));
        let heartbeat = LeaseHeartbeat::start(
            recorder.clone(),
            "task-3".into(),
            Duration::from_secs(30),
            wake.clone(),
        );
        drop(lease);
        tokio::time::sleep(Duration::from_secs(31)).await;
        tokio::task::yield_now().await;

        assert!(!heartbeat.is_running());
        assert!(recorder.refreshed.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn drop_cancels() {
        let recorder = Arc::new(RefreshRecorder::default());
        let wake = WakeGuard::default();
        let _lease = wake.acquire(Duration::from_secs(120));
        let heartbeat = LeaseHeartbeat::start(
            recorder.clone(),
            "task-4".into(),
            Duration::from_secs(30),
            wake.clone(),
        );
        drop(heartbeat);
        tokio::time::sleep(Duration::from_secs(90)).await;
        assert!(recorder.refreshed.lock().unwrap().is_empty());
    }
}
