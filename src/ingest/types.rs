// src/ingest/types.rs
use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Photo,
    Video,
    Document,
}

/// Reference to an attachment the destination can re-send without
/// downloading it first (file id or public URL).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MediaRef {
    pub kind: MediaKind,
    pub file: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IncomingItem {
    pub source: String, // upstream feed id
    pub id: i64,        // monotonic per source
    pub timestamp: i64, // unix seconds
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub media: Vec<MediaRef>,
    #[serde(default)]
    pub group_id: Option<i64>,
    /// Our own post echoed back by the source; never republished.
    #[serde(default)]
    pub outgoing: bool,
}

/// Items that must be published as one unit. Never empty; ids ascending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemGroup {
    items: Vec<IncomingItem>,
}

impl ItemGroup {
    pub fn single(item: IncomingItem) -> Self {
        Self { items: vec![item] }
    }

    /// Returns `None` for an empty list.
    pub fn from_items(mut items: Vec<IncomingItem>) -> Option<Self> {
        if items.is_empty() {
            return None;
        }
        items.sort_by_key(|it| it.id);
        Some(Self { items })
    }

    pub fn items(&self) -> &[IncomingItem] {
        &self.items
    }

    pub fn source(&self) -> &str {
        &self.items[0].source
    }

    /// Latest item timestamp in the group.
    pub fn newest_ts(&self) -> i64 {
        self.items.iter().map(|it| it.timestamp).max().unwrap_or(0)
    }

    pub fn min_id(&self) -> i64 {
        self.items[0].id
    }

    pub fn max_id(&self) -> i64 {
        self.items[self.items.len() - 1].id
    }

    /// Caption source: first member carrying non-blank text.
    pub fn text(&self) -> &str {
        self.items
            .iter()
            .map(|it| it.text.as_str())
            .find(|t| !t.trim().is_empty())
            .unwrap_or("")
    }

    pub fn media(&self) -> Vec<MediaRef> {
        self.items
            .iter()
            .flat_map(|it| it.media.iter().cloned())
            .collect()
    }

    pub fn is_outgoing(&self) -> bool {
        self.items.iter().all(|it| it.outgoing)
    }
}

/// Pull model: the relay asks for batches on its own schedule.
#[async_trait::async_trait]
pub trait PullSource: Send + Sync {
    fn name(&self) -> &str;

    /// Highest id currently known for `source`, `None` if it has no items yet.
    async fn latest_id(&self, source: &str) -> Result<Option<i64>>;

    /// Items with `id > min_id`, ascending, at most `limit` of them.
    async fn fetch(&self, source: &str, min_id: i64, limit: usize) -> Result<Vec<IncomingItem>>;
}

/// Push model: the source delivers complete groups as they happen.
#[async_trait::async_trait]
pub trait PushSource: Send {
    fn name(&self) -> &str;

    /// Same as [`PullSource::latest_id`]; may be `None` when the transport
    /// cannot tell, in which case the first delivered group bootstraps.
    async fn latest_id(&self, source: &str) -> Result<Option<i64>>;

    /// Next assembled group, `None` once the stream has ended.
    async fn next_group(&mut self) -> Option<ItemGroup>;
}

/// The pipeline only ever sees this; which variant is active is a wiring
/// decision made in `main`.
pub enum Source {
    Pull(Box<dyn PullSource>),
    Push(Box<dyn PushSource>),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: i64, text: &str, media: usize) -> IncomingItem {
        IncomingItem {
            source: "src".into(),
            id,
            timestamp: 1_700_000_000 + id,
            text: text.into(),
            media: (0..media)
                .map(|i| MediaRef {
                    kind: MediaKind::Photo,
                    file: format!("f{id}-{i}"),
                })
                .collect(),
            group_id: Some(7),
            outgoing: false,
        }
    }

    #[test]
    fn group_sorts_and_exposes_range() {
        let g = ItemGroup::from_items(vec![item(12, "", 1), item(10, "", 1), item(11, "caption", 1)])
            .unwrap();
        assert_eq!(g.min_id(), 10);
        assert_eq!(g.max_id(), 12);
        assert_eq!(g.text(), "caption");
        assert_eq!(g.media().len(), 3);
        assert_eq!(g.media()[0].file, "f10-0");
        assert_eq!(g.newest_ts(), 1_700_000_012);
    }

    #[test]
    fn empty_group_is_rejected() {
        assert!(ItemGroup::from_items(Vec::new()).is_none());
    }
}
