// Copyright (C) 2025 Michael Herstine <sp1ff@pobox.com>
//
// This file is part of inkpot.
//
// inkpot is free software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, either version 3 of the
// License, or (at your option) any later version.
//
// inkpot is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even
// the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General
// Public License for more details.
//
// You should have received a copy of the GNU General Public License along with inkpot.  If not,
// see <http://www.gnu.org/licenses/>.

//! # counters
//!
//! A small, time-limited cache for per-post like & view counts.
//!
//! Listings & post pages display like & view counts for every post they show. Those are cheap
//! enough to read from the in-memory backend, but against DynamoDB they're the hottest attributes
//! in the system, and a count that's a few minutes stale is perfectly acceptable. So: a bounded
//! LRU map from (post, counter) to (value, time-of-insertion), with a TTL per counter.
//!
//! The cache is *read-through then refresh*: readers consult it first & populate it on a miss,
//! while writers (liking, reading) push the fresh value from storage back in.

use std::{
    num::NonZeroUsize,
    time::{Duration, Instant},
};

use lru::LruCache;
use serde::Deserialize;

use inkpot_shared::PostId;

/// The counters we cache
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Counter {
    Likes,
    Views,
}

/// Counter cache configuration
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Configuration {
    /// Maximum number of (post, counter) entries to retain
    pub capacity: NonZeroUsize,
    /// Time-to-live for like counts, in seconds
    #[serde(rename = "likes-ttl")]
    pub likes_ttl: u64,
    /// Time-to-live for view counts, in seconds
    #[serde(rename = "views-ttl")]
    pub views_ttl: u64,
}

impl Default for Configuration {
    fn default() -> Self {
        Configuration {
            capacity: NonZeroUsize::new(1024).unwrap(/* known good */),
            likes_ttl: 300,
            views_ttl: 300,
        }
    }
}

pub struct CounterCache {
    cache: LruCache<(PostId, Counter), (u64, Instant)>,
    likes_ttl: Duration,
    views_ttl: Duration,
}

impl CounterCache {
    pub fn new(capacity: NonZeroUsize, likes_ttl: Duration, views_ttl: Duration) -> CounterCache {
        CounterCache {
            cache: LruCache::new(capacity),
            likes_ttl,
            views_ttl,
        }
    }
    fn ttl(&self, counter: Counter) -> Duration {
        match counter {
            Counter::Likes => self.likes_ttl,
            Counter::Views => self.views_ttl,
        }
    }
    /// Look up a count; expired entries are evicted & reported as missing
    pub fn get(&mut self, post: &PostId, counter: Counter) -> Option<u64> {
        let ttl = self.ttl(counter);
        let key = (*post, counter);
        match self.cache.get(&key) {
            Some((value, inserted)) if inserted.elapsed() < ttl => Some(*value),
            Some(_) => {
                self.cache.pop(&key);
                None
            }
            None => None,
        }
    }
    pub fn put(&mut self, post: &PostId, counter: Counter, value: u64) {
        self.cache.put((*post, counter), (value, Instant::now()));
    }
    /// Drop both counts for `post`
    pub fn invalidate(&mut self, post: &PostId) {
        self.cache.pop(&(*post, Counter::Likes));
        self.cache.pop(&(*post, Counter::Views));
    }
    pub fn len(&self) -> usize {
        self.cache.len()
    }
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

impl From<&Configuration> for CounterCache {
    fn from(cfg: &Configuration) -> Self {
        CounterCache::new(
            cfg.capacity,
            Duration::from_secs(cfg.likes_ttl),
            Duration::from_secs(cfg.views_ttl),
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn expiry() {
        let post = PostId::new();
        let mut cache = CounterCache::new(
            NonZeroUsize::new(8).unwrap(),
            Duration::from_secs(300),
            Duration::ZERO,
        );
        cache.put(&post, Counter::Likes, 3);
        cache.put(&post, Counter::Views, 11);
        assert_eq!(cache.get(&post, Counter::Likes), Some(3));
        // A zero TTL means views are always stale
        assert_eq!(cache.get(&post, Counter::Views), None);
        assert_eq!(cache.len(), 1);
        cache.invalidate(&post);
        assert!(cache.is_empty());
    }

    #[test]
    fn bounded() {
        let mut cache = CounterCache::new(
            NonZeroUsize::new(2).unwrap(),
            Duration::from_secs(300),
            Duration::from_secs(300),
        );
        let posts = [PostId::new(), PostId::new(), PostId::new()];
        for (i, post) in posts.iter().enumerate() {
            cache.put(post, Counter::Likes, i as u64);
        }
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&posts[0], Counter::Likes), None);
        assert_eq!(cache.get(&posts[2], Counter::Likes), Some(2));
    }

    #[test]
    fn configuration() {
        let cfg: Configuration = toml::from_str("capacity = 16\nlikes-ttl = 60").unwrap();
        assert_eq!(cfg.capacity.get(), 16);
        assert_eq!(cfg.likes_ttl, 60);
        assert_eq!(cfg.views_ttl, 300);
    }
}
