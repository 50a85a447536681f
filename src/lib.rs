// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod config;
pub mod dedup;
pub mod error;
pub mod ingest;
pub mod pipeline;
pub mod publish;
pub mod rewrite;
pub mod shutdown;
pub mod state;

// ---- Re-exports for stable public API ----
pub use crate::config::RelayConfig;
pub use crate::error::{RelayError, Result};
pub use crate::pipeline::{GroupOutcome, PassReport, Relay};
pub use crate::publish::{Destination, PublishJob, PublishOutcome, PublishScheduler};
pub use crate::shutdown::{Shutdown, ShutdownTrigger};
pub use crate::state::{PersistedState, StateStore};
