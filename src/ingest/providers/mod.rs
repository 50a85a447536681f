// src/ingest/providers/mod.rs
pub mod channel;
pub mod spool;

pub use channel::{channel_source, ChannelSender, ChannelSource};
pub use spool::SpoolSource;
