//! Hub task-execution loop and its building blocks.

pub mod backoff;
pub mod clock;
pub mod escalation;
pub mod heartbeat;
pub mod network;
pub mod run_history;
pub mod runner;
pub mod state;
pub mod wake;

pub use backoff::{BackoffCounters, BackoffPolicy};
pub use clock::{Clock, SystemClock};
pub use escalation::EscalationGate;
pub use heartbeat::LeaseHeartbeat;
pub use network::{AlwaysOnline, NetworkProbe, TcpProbe};
pub use run_history::RunHistory;
pub use runner::{EscalationKind, HubRuntime};
pub use state::{OperatingState, StatusUpdate};
pub use wake::{WakeBackend, WakeGuard, WakeLease};
