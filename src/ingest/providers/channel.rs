// src/ingest/providers/channel.rs
//! Push source fed through a bounded tokio channel.
//!
//! Whatever receives upstream events (a client library callback, a webhook
//! handler) holds the [`ChannelSender`]; the relay holds the
//! [`ChannelSource`]. Groups arrive already assembled.

use tokio::sync::mpsc;

use crate::error::{RelayError, Result};
use crate::ingest::types::{IncomingItem, ItemGroup, PushSource};

#[derive(Clone)]
pub struct ChannelSender {
    tx: mpsc::Sender<ItemGroup>,
}

pub struct ChannelSource {
    name: String,
    rx: mpsc::Receiver<ItemGroup>,
}

/// Create a connected sender/source pair.
pub fn channel_source(name: impl Into<String>, capacity: usize) -> (ChannelSender, ChannelSource) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        ChannelSender { tx },
        ChannelSource {
            name: name.into(),
            rx,
        },
    )
}

impl ChannelSender {
    pub async fn send_item(&self, item: IncomingItem) -> Result<()> {
        self.send_group(vec![item]).await
    }

    /// Deliver a complete group. Empty input is ignored.
    pub async fn send_group(&self, items: Vec<IncomingItem>) -> Result<()> {
        let Some(group) = ItemGroup::from_items(items) else {
            return Ok(());
        };
        self.tx
            .send(group)
            .await
            .map_err(|_| RelayError::TransientIo("push source closed".to_string()))
    }
}

#[async_trait::async_trait]
impl PushSource for ChannelSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn latest_id(&self, _source: &str) -> Result<Option<i64>> {
        // The channel has no history; the first delivered group bootstraps.
        Ok(None)
    }

    async fn next_group(&mut self) -> Option<ItemGroup> {
        self.rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: i64, gid: Option<i64>) -> IncomingItem {
        IncomingItem {
            source: "live".into(),
            id,
            timestamp: 0,
            text: String::new(),
            media: Vec::new(),
            group_id: gid,
            outgoing: false,
        }
    }

    #[tokio::test]
    async fn delivers_groups_in_order_then_ends() {
        let (tx, mut src) = channel_source("live", 4);
        tx.send_item(item(1, None)).await.unwrap();
        tx.send_group(vec![item(3, Some(9)), item(2, Some(9))])
            .await
            .unwrap();
        tx.send_group(Vec::new()).await.unwrap();
        drop(tx);

        let g1 = src.next_group().await.unwrap();
        assert_eq!(g1.max_id(), 1);
        let g2 = src.next_group().await.unwrap();
        assert_eq!((g2.min_id(), g2.max_id()), (2, 3));
        assert!(src.next_group().await.is_none());
        assert_eq!(src.latest_id("live").await.unwrap(), None);
    }
}
