// src/ingest/mod.rs
//! Upstream side of the relay: item model, source interfaces, group
//! assembly and per-source offsets.

pub mod group;
pub mod offsets;
pub mod providers;
pub mod types;

pub use group::assemble_groups;
pub use offsets::OffsetTracker;
pub use types::{IncomingItem, ItemGroup, MediaKind, MediaRef, PullSource, PushSource, Source};
