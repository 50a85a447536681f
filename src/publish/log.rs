// src/publish/log.rs
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};

use super::Destination;
use crate::error::Result;
use crate::ingest::MediaRef;

/// Dry-run destination: logs what would have been posted.
#[derive(Debug, Default)]
pub struct LogDestination {
    posted: AtomicU64,
}

impl LogDestination {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn posted(&self) -> u64 {
        self.posted.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Destination for LogDestination {
    fn name(&self) -> &str {
        "log"
    }

    async fn publish(&self, text: Option<&str>, media: &[MediaRef]) -> Result<()> {
        let n = self.posted.fetch_add(1, Ordering::Relaxed) + 1;
        let files: Vec<&str> = media.iter().map(|m| m.file.as_str()).collect();
        tracing::info!(
            target: "relay::dry_run",
            n,
            media = ?files,
            text = text.unwrap_or(""),
            "would publish"
        );
        Ok(())
    }
}
