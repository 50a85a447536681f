// src/ingest/offsets.rs
//! Per-source checkpoint of the last processed item id.
//!
//! Offsets only move forward. A group is processable iff its max id is above
//! the recorded offset; after handling a group (published, duplicate,
//! dropped) the caller advances the offset so the group is never retried.
//!
//! On first contact with a source and with catch-up suppression on, the
//! offset jumps to the source's latest id and nothing is processed in that
//! pass, so the destination is not flooded with backlog.
//!
//! Push transports usually cannot report a latest id. There the relay's
//! start time stands in for it: a first group dated before start is backlog
//! and only bootstraps the offset, a later one is a live post.

use std::collections::BTreeMap;

#[derive(Debug, Clone, Default)]
pub struct OffsetTracker {
    offsets: BTreeMap<String, i64>,
    suppress_catch_up: bool,
    started_at: Option<i64>,
}

impl OffsetTracker {
    pub fn new(suppress_catch_up: bool) -> Self {
        Self {
            offsets: BTreeMap::new(),
            suppress_catch_up,
            started_at: None,
        }
    }

    /// Restore from persisted state.
    pub fn from_offsets(offsets: BTreeMap<String, i64>, suppress_catch_up: bool) -> Self {
        Self {
            offsets,
            suppress_catch_up,
            started_at: None,
        }
    }

    /// Unix seconds when the relay started; groups dated at or after it are
    /// never treated as backlog.
    pub fn with_started_at(mut self, ts: i64) -> Self {
        self.started_at = Some(ts);
        self
    }

    pub fn set_started_at(&mut self, ts: i64) {
        self.started_at = Some(ts);
    }

    pub fn offset(&self, source: &str) -> Option<i64> {
        self.offsets.get(source).copied()
    }

    /// Where a pull fetch should start (exclusive).
    pub fn fetch_floor(&self, source: &str) -> i64 {
        self.offset(source).unwrap_or(0)
    }

    /// Pass-level bootstrap. Returns `true` when this pass is the bootstrap
    /// pass for `source` and nothing should be processed.
    pub fn bootstrap(&mut self, source: &str, latest_id: Option<i64>) -> bool {
        if self.offsets.contains_key(source) || !self.suppress_catch_up {
            return false;
        }
        let start = latest_id.unwrap_or(0).max(0);
        tracing::info!(source, offset = start, "bootstrapping source offset, skipping backlog");
        self.offsets.insert(source.to_string(), start);
        true
    }

    /// Group-level check; `newest_ts` is the group's latest item timestamp.
    /// An unknown source under catch-up suppression is bootstrapped to
    /// `max_id` and the group is reported as not processable, unless the
    /// group is dated at or after the relay start.
    pub fn should_process(&mut self, source: &str, max_id: i64, newest_ts: i64) -> bool {
        match self.offsets.get(source) {
            Some(&off) => max_id > off,
            None if self.suppress_catch_up => {
                if self.started_at.is_some_and(|start| newest_ts >= start) {
                    return true;
                }
                self.bootstrap(source, Some(max_id));
                false
            }
            None => true,
        }
    }

    /// `offset = max(offset, max_id)`.
    pub fn advance(&mut self, source: &str, max_id: i64) {
        let entry = self.offsets.entry(source.to_string()).or_insert(max_id);
        if max_id > *entry {
            *entry = max_id;
        }
    }

    pub fn snapshot(&self) -> BTreeMap<String, i64> {
        self.offsets.clone()
    }
}
