// src/ingest/providers/spool.rs
//! Pull source over JSON-lines spool files.
//!
//! Layout: `<dir>/<source>.jsonl`, one item per line:
//! `{"id": 10, "timestamp": 1700000000, "text": "...", "media": [...], "group_id": 5}`.
//! An external collector appends to these files; the relay only reads them.
//! Missing files mean "no items yet". Malformed lines are skipped with a warning.

use metrics::counter;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::ingest::types::{IncomingItem, MediaRef, PullSource};

#[derive(Debug, Deserialize)]
struct SpoolLine {
    id: i64,
    #[serde(default)]
    timestamp: i64,
    #[serde(default)]
    text: String,
    #[serde(default)]
    media: Vec<MediaRef>,
    #[serde(default)]
    group_id: Option<i64>,
    #[serde(default)]
    outgoing: bool,
}

pub struct SpoolSource {
    dir: PathBuf,
}

impl SpoolSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, source: &str) -> PathBuf {
        self.dir.join(format!("{source}.jsonl"))
    }

    async fn read_all(&self, source: &str) -> Result<Vec<IncomingItem>> {
        let path = self.path_for(source);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        Ok(parse_lines(source, &path, &content))
    }
}

fn parse_lines(source: &str, path: &Path, content: &str) -> Vec<IncomingItem> {
    let mut out = Vec::new();
    for (lineno, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<SpoolLine>(line) {
            Ok(l) => out.push(IncomingItem {
                source: source.to_string(),
                id: l.id,
                timestamp: l.timestamp,
                text: l.text,
                media: l.media,
                group_id: l.group_id,
                outgoing: l.outgoing,
            }),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    path = %path.display(),
                    line = lineno + 1,
                    "skipping malformed spool line"
                );
            }
        }
    }
    out
}

#[async_trait::async_trait]
impl PullSource for SpoolSource {
    fn name(&self) -> &str {
        "spool"
    }

    async fn latest_id(&self, source: &str) -> Result<Option<i64>> {
        Ok(self.read_all(source).await?.iter().map(|it| it.id).max())
    }

    async fn fetch(&self, source: &str, min_id: i64, limit: usize) -> Result<Vec<IncomingItem>> {
        let mut items: Vec<IncomingItem> = self
            .read_all(source)
            .await?
            .into_iter()
            .filter(|it| it.id > min_id)
            .collect();
        items.sort_by_key(|it| it.id);
        items.dedup_by_key(|it| it.id);
        items.truncate(limit);
        counter!("relay_items_fetched_total").increment(items.len() as u64);
        Ok(items)
    }
}
