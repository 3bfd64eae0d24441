//! Control Plane API surface used by the task loop.
//!
//! [`ControlPlane`] is the seam between the loop and the network: the
//! production implementation is [`HttpControlPlane`]; tests substitute
//! in-memory fakes.

pub mod client;
pub mod error;
pub mod types;

use async_trait::async_trait;

pub use client::HttpControlPlane;
pub use error::ControlPlaneError;
pub use types::{AssumptionItem, StepBatch, SubmitOutcome, Task, TaskResult};

/// Operations the Hub performs against the Control Plane.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Whether a session token is available.
    fn has_session(&self) -> bool;

    /// Drop the session token; the Hub must be re-paired.
    fn invalidate_session(&self);

    /// Fetch up to `max` leased tasks. Malformed entries are dropped.
    async fn poll_queue(&self, max: u32) -> Result<Vec<Task>, ControlPlaneError>;

    /// Authorize `size` execution steps under `grant_id`. Any 2xx is an
    /// authorization; the batch is `None` when the body does not carry one.
    async fn mint_step_batch(
        &self,
        grant_id: &str,
        size: u32,
    ) -> Result<Option<StepBatch>, ControlPlaneError>;

    /// Extend the lease on `task_id`.
    async fn refresh_lease(&self, task_id: &str) -> Result<(), ControlPlaneError>;

    /// Submit the result for `task_id`.
    async fn submit_result(
        &self,
        task_id: &str,
        result: &TaskResult,
    ) -> Result<SubmitOutcome, ControlPlaneError>;

    /// Ask the Approver to resolve `assumptions` for `task_id`.
    async fn request_assumptions(
        &self,
        task_id: &str,
        assumptions: &[AssumptionItem],
    ) -> Result<(), ControlPlaneError>;
}
