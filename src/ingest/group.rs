// src/ingest/group.rs
//! Group assembly for the pull model.
//!
//! Items that share a group id (albums, multi-media posts) become one
//! [`ItemGroup`]; everything else is a singleton. Groups come out in the order
//! their first member arrived. A group cut in half by the fetch limit is
//! published as two groups; the relay does not stitch across fetches.

use std::collections::HashMap;

use super::types::{IncomingItem, ItemGroup};

pub fn assemble_groups(items: Vec<IncomingItem>) -> Vec<ItemGroup> {
    let mut buckets: Vec<Vec<IncomingItem>> = Vec::new();
    let mut by_key: HashMap<(String, i64), usize> = HashMap::new();

    for it in items {
        match it.group_id {
            Some(gid) => {
                let key = (it.source.clone(), gid);
                match by_key.get(&key) {
                    Some(&idx) => buckets[idx].push(it),
                    None => {
                        by_key.insert(key, buckets.len());
                        buckets.push(vec![it]);
                    }
                }
            }
            None => buckets.push(vec![it]),
        }
    }

    buckets
        .into_iter()
        .filter_map(ItemGroup::from_items)
        .collect()
}
