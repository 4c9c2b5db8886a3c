// Copyright 2024 The read-until Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;
use parking_lot::Mutex;
use sequencer_api::get_live_reads_response::ReadData;

use crate::error::{Error, Result};

/// An ordered, channel-keyed map of bounded size holding the most recent
/// chunk seen on each channel.
///
/// A channel holds at most one outstanding read at any moment, so keying on
/// channel keeps exactly the freshest data per pore. When the consumer is
/// slower than the sequencer, older entries are dropped and the loss is
/// reported through two counters:
///
/// - `missed`: chunks dropped before the consumer ever saw their read.
/// - `replaced`: chunks superseded by a later chunk of the same read.
pub struct ChunkCache {
    capacity: usize,
    entries: Mutex<IndexMap<u32, ReadData>>,
    missed: AtomicU64,
    replaced: AtomicU64,
}

impl ChunkCache {
    /// Fails with `InvalidConfig` if `capacity` is zero.
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity < 1 {
            return Err(Error::InvalidConfig(
                "cache size must be at least 1".into(),
            ));
        }
        Ok(ChunkCache {
            capacity,
            entries: Mutex::new(IndexMap::new()),
            missed: AtomicU64::new(0),
            replaced: AtomicU64::new(0),
        })
    }

    /// Insert `chunk` as the newest entry for `channel`, evicting the oldest
    /// entries while over capacity. Every displaced chunk is accounted as
    /// `replaced` when a newer chunk of the same read on the same channel
    /// displaced it, `missed` otherwise.
    pub fn put(&self, channel: u32, chunk: ReadData) {
        let mut entries = self.entries.lock();
        if let Some(previous) = entries.shift_remove(&channel) {
            if previous.number == chunk.number {
                self.replaced.fetch_add(1, Ordering::Relaxed);
            } else {
                self.missed.fetch_add(1, Ordering::Relaxed);
            }
        } else {
            while entries.len() >= self.capacity {
                match entries.shift_remove_index(0) {
                    Some((evicted_channel, evicted)) => {
                        if evicted_channel == channel && evicted.number == chunk.number {
                            self.replaced.fetch_add(1, Ordering::Relaxed);
                        } else {
                            self.missed.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                    None => break,
                }
            }
        }
        entries.insert(channel, chunk);
    }

    /// Remove and return the newest (or oldest) entry.
    pub fn pop_one(&self, newest: bool) -> Result<(u32, ReadData)> {
        let mut entries = self.entries.lock();
        let index = if newest {
            entries.len().checked_sub(1).ok_or(Error::EmptyCache)?
        } else {
            0
        };
        entries.shift_remove_index(index).ok_or(Error::EmptyCache)
    }

    /// Remove and return up to `items` entries, newest (or oldest) first. An
    /// empty batch is a normal result.
    pub fn pop_batch(&self, items: usize, newest: bool) -> Vec<(u32, ReadData)> {
        let mut entries = self.entries.lock();
        let mut batch = Vec::with_capacity(items.min(entries.len()));
        for _ in 0..items {
            let index = if newest {
                match entries.len().checked_sub(1) {
                    Some(index) => index,
                    None => break,
                }
            } else {
                0
            };
            match entries.shift_remove_index(index) {
                Some(entry) => batch.push(entry),
                None => break,
            }
        }
        batch
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Chunks dropped before their read was ever delivered.
    pub fn missed(&self) -> u64 {
        self.missed.load(Ordering::Relaxed)
    }

    /// Chunks superseded by a later chunk of the same read.
    pub fn replaced(&self) -> u64 {
        self.replaced.load(Ordering::Relaxed)
    }

    /// Drop all entries and zero the counters, as at session end.
    pub fn clear(&self) {
        let mut entries = self.entries.lock();
        entries.clear();
        self.missed.store(0, Ordering::Relaxed);
        self.replaced.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(number: u32) -> ReadData {
        ReadData {
            id: format!("read-{}", number),
            number,
            ..Default::default()
        }
    }

    #[test]
    fn rejects_zero_capacity() {
        assert!(matches!(
            ChunkCache::new(0),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn never_exceeds_capacity() {
        let cache = ChunkCache::new(3).unwrap();
        for channel in 0..10 {
            cache.put(channel, chunk(1));
            assert!(cache.len() <= 3);
        }
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn same_read_overwrite_counts_replaced() {
        let cache = ChunkCache::new(2).unwrap();
        cache.put(1, chunk(5));
        cache.put(1, chunk(5));
        assert_eq!(cache.replaced(), 1);
        assert_eq!(cache.missed(), 0);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn new_read_overwrite_counts_missed() {
        let cache = ChunkCache::new(2).unwrap();
        cache.put(1, chunk(5));
        cache.put(1, chunk(6));
        assert_eq!(cache.replaced(), 0);
        assert_eq!(cache.missed(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn eviction_drops_oldest_and_counts_missed() {
        let cache = ChunkCache::new(2).unwrap();
        cache.put(1, chunk(5));
        cache.put(2, chunk(7));
        cache.put(3, chunk(9));
        assert_eq!(cache.missed(), 1);
        assert_eq!(cache.len(), 2);
        let popped = cache.pop_batch(2, false);
        assert_eq!(popped[0].0, 2);
        assert_eq!(popped[1].0, 3);
    }

    #[test]
    fn capacity_one_keeps_single_channel() {
        let cache = ChunkCache::new(1).unwrap();
        cache.put(1, chunk(1));
        cache.put(2, chunk(2));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.missed(), 1);
        let (channel, _) = cache.pop_one(true).unwrap();
        assert_eq!(channel, 2);
    }

    #[test]
    fn reinsert_moves_channel_to_newest() {
        let cache = ChunkCache::new(3).unwrap();
        cache.put(1, chunk(1));
        cache.put(2, chunk(2));
        cache.put(1, chunk(3));
        let (channel, chunk) = cache.pop_one(true).unwrap();
        assert_eq!(channel, 1);
        assert_eq!(chunk.number, 3);
        let (channel, _) = cache.pop_one(false).unwrap();
        assert_eq!(channel, 2);
    }

    #[test]
    fn newest_wins_within_channel() {
        let cache = ChunkCache::new(4).unwrap();
        cache.put(7, chunk(1));
        cache.put(7, chunk(2));
        let (_, got) = cache.pop_one(true).unwrap();
        assert_eq!(got.number, 2);
        assert!(cache.pop_one(true).is_err());
    }

    #[test]
    fn pop_on_empty() {
        let cache = ChunkCache::new(2).unwrap();
        assert!(matches!(cache.pop_one(true), Err(Error::EmptyCache)));
        assert!(cache.pop_batch(5, true).is_empty());
    }

    #[test]
    fn pop_batch_zero_leaves_state_untouched() {
        let cache = ChunkCache::new(2).unwrap();
        cache.put(1, chunk(1));
        assert!(cache.pop_batch(0, true).is_empty());
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.missed(), 0);
        assert_eq!(cache.replaced(), 0);
    }

    #[test]
    fn pop_batch_order_respects_newest_flag() {
        let cache = ChunkCache::new(4).unwrap();
        for channel in 1..=3 {
            cache.put(channel, chunk(channel));
        }
        let newest_first = cache.pop_batch(3, true);
        let channels: Vec<u32> = newest_first.iter().map(|(channel, _)| *channel).collect();
        assert_eq!(channels, vec![3, 2, 1]);

        for channel in 1..=3 {
            cache.put(channel, chunk(channel));
        }
        let oldest_first = cache.pop_batch(3, false);
        let channels: Vec<u32> = oldest_first.iter().map(|(channel, _)| *channel).collect();
        assert_eq!(channels, vec![1, 2, 3]);
    }

    #[test]
    fn put_pop_roundtrip_is_idempotent() {
        let cache = ChunkCache::new(2).unwrap();
        cache.put(1, chunk(9));
        let first = cache.pop_one(true).unwrap();
        cache.put(1, chunk(9));
        let second = cache.pop_one(true).unwrap();
        assert_eq!(first, second);
        assert_eq!(cache.missed(), 0);
        assert_eq!(cache.replaced(), 0);
    }

    #[test]
    fn every_put_is_accounted_for() {
        let cache = ChunkCache::new(3).unwrap();
        let mut total_puts = 0u64;
        let mut delivered = 0u64;
        for round in 0..5u32 {
            for channel in 0..4 {
                cache.put(channel, chunk(round));
                total_puts += 1;
            }
            delivered += cache.pop_batch(2, true).len() as u64;
        }
        let resident = cache.len() as u64;
        assert_eq!(
            cache.missed() + cache.replaced() + delivered + resident,
            total_puts
        );
    }

    #[test]
    fn clear_resets_entries_and_counters() {
        let cache = ChunkCache::new(2).unwrap();
        cache.put(1, chunk(1));
        cache.put(1, chunk(2));
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.missed(), 0);
        assert_eq!(cache.replaced(), 0);
    }
}
