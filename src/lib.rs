//! KiLu Hub: autonomous worker runtime for bounded web-extraction tasks.
//!
//! A Hub leases tasks from the Control Plane, visits each task's page inside
//! a sandboxed extractor, and either submits the extracted text or hands the
//! task to a human Approver when the page looks gated or empty.
//!
//! # Architecture
//!
//! - **Control Plane client**: queue polling, step-batch minting, lease
//!   refresh, result submission and assumption requests over HTTPS
//! - **Task loop**: one task at a time, gated by session, connectivity and
//!   an hourly attempt cap, with per-state backoff between passes
//! - **Wake guard**: exclusive, time-capped wake resource held only while a
//!   task executes
//! - **Escalation gate**: durable per-task record so the Approver is asked
//!   at most once per task
//! - **Extraction**: provided by the `kilu-extract` crate

pub mod config;
pub mod control_plane;
pub mod error;
pub mod hashing;
pub mod hub;
pub mod hub_dirs;
pub mod service;
pub mod session;

pub use config::HubConfig;
pub use control_plane::{ControlPlane, ControlPlaneError, HttpControlPlane};
pub use error::{HubError, Result};
pub use hub::{HubRuntime, OperatingState, StatusUpdate};
pub use service::{HubService, ServiceState};
pub use session::SessionStore;
