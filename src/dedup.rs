// src/dedup.rs
//! # Fingerprint Store
//! Content-level dedup keyed by a hash of normalized text, independent of
//! item ids. Entries expire after a TTL.
//!
//! Text that normalizes to nothing (media-only posts, pure links) has no
//! fingerprint and is never treated as a duplicate.

use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::time::Duration;

use crate::rewrite::strip_noise;

static RE_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("static regex"));

/// Noise-stripped, lowercased, alphanumerics and single spaces only.
pub fn normalize(text: &str, promo: &Regex) -> String {
    let stripped = strip_noise(text, promo).to_lowercase();
    let alnum: String = stripped
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();
    RE_WS.replace_all(&alnum, " ").trim().to_string()
}

/// Hex SHA-256 of the normalized text, `None` when it normalizes to nothing.
pub fn fingerprint(text: &str, promo: &Regex) -> Option<String> {
    let n = normalize(text, promo);
    if n.is_empty() {
        return None;
    }
    let digest = Sha256::digest(n.as_bytes());
    let mut out = String::with_capacity(64);
    for b in digest.iter() {
        let _ = write!(&mut out, "{:02x}", b);
    }
    Some(out)
}

fn expired(first_seen: i64, ttl: Duration, now: i64) -> bool {
    let ttl = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
    now.saturating_sub(first_seen) > ttl
}

/// Fingerprint → first-seen unix seconds.
#[derive(Debug, Clone)]
pub struct FingerprintStore {
    entries: BTreeMap<String, i64>,
    enabled: bool,
}

impl FingerprintStore {
    pub fn new(enabled: bool) -> Self {
        Self {
            entries: BTreeMap::new(),
            enabled,
        }
    }

    pub fn from_entries(entries: BTreeMap<String, i64>, enabled: bool) -> Self {
        Self { entries, enabled }
    }

    /// Seen within the TTL. An entry older than `ttl` counts as absent even
    /// before [`evict`](Self::evict) removes it.
    pub fn seen(&self, hash: &str, ttl: Duration, now: i64) -> bool {
        self.enabled
            && self
                .entries
                .get(hash)
                .is_some_and(|&first_seen| !expired(first_seen, ttl, now))
    }

    /// Record a hash. A live entry keeps its original first-seen time; an
    /// expired one starts a new window.
    pub fn mark(&mut self, hash: &str, ttl: Duration, now: i64) {
        if !self.enabled {
            return;
        }
        let first_seen = self.entries.entry(hash.to_string()).or_insert(now);
        if expired(*first_seen, ttl, now) {
            *first_seen = now;
        }
    }

    /// Drop entries with `now - first_seen > ttl`. Returns how many went.
    pub fn evict(&mut self, ttl: Duration, now: i64) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, first_seen| !expired(*first_seen, ttl, now));
        let evicted = before - self.entries.len();
        if evicted > 0 {
            tracing::debug!(evicted, remaining = self.entries.len(), "fingerprints evicted");
        }
        evicted
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn snapshot(&self) -> BTreeMap<String, i64> {
        self.entries.clone()
    }
}
