//! Per-client-address nonce bookkeeping.
//!
//! One live nonce per distinct client address, created lazily on first
//! contact and replaced whenever a request using it is rejected. The map is
//! bounded: when a new address would exceed the cap, the least-recently-used
//! entry is evicted.

use crate::auth::digest::{generate_token, NONCE_SIZE};
use std::collections::HashMap;
use std::net::IpAddr;
use tokio::sync::Mutex;

/// Cap on tracked client addresses.
pub const MAX_TRACKED_ADDRESSES: usize = 1024;

#[derive(Debug)]
struct NonceRecord {
    nonce: String,
    last_used: u64,
}

#[derive(Debug, Default)]
struct NonceMap {
    entries: HashMap<IpAddr, NonceRecord>,
    clock: u64,
}

impl NonceMap {
    fn touch(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn evict_lru(&mut self) {
        if let Some(addr) = self
            .entries
            .iter()
            .min_by_key(|(_, record)| record.last_used)
            .map(|(addr, _)| *addr)
        {
            self.entries.remove(&addr);
        }
    }
}

/// Bounded map of client address to its current nonce.
pub struct NonceStore {
    inner: Mutex<NonceMap>,
    capacity: usize,
}

impl Default for NonceStore {
    fn default() -> Self {
        Self::new()
    }
}

impl NonceStore {
    pub fn new() -> Self {
        Self::with_capacity(MAX_TRACKED_ADDRESSES)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(NonceMap::default()),
            capacity,
        }
    }

    /// The address's current nonce, created on first contact.
    pub async fn current(&self, addr: IpAddr) -> String {
        let mut map = self.inner.lock().await;
        let stamp = map.touch();
        if let Some(record) = map.entries.get_mut(&addr) {
            record.last_used = stamp;
            return record.nonce.clone();
        }
        if map.entries.len() >= self.capacity {
            map.evict_lru();
        }
        let nonce = generate_token(NONCE_SIZE);
        map.entries.insert(
            addr,
            NonceRecord {
                nonce: nonce.clone(),
                last_used: stamp,
            },
        );
        nonce
    }

    /// Replace the address's nonce with a fresh one and return it. Called
    /// whenever a challenge is issued for that address.
    pub async fn rotate(&self, addr: IpAddr) -> String {
        let mut map = self.inner.lock().await;
        let stamp = map.touch();
        let nonce = generate_token(NONCE_SIZE);
        if let Some(record) = map.entries.get_mut(&addr) {
            record.nonce = nonce.clone();
            record.last_used = stamp;
            return nonce;
        }
        if map.entries.len() >= self.capacity {
            map.evict_lru();
        }
        map.entries.insert(
            addr,
            NonceRecord {
                nonce: nonce.clone(),
                last_used: stamp,
            },
        );
        nonce
    }

    #[cfg(test)]
    async fn tracked(&self) -> usize {
        self.inner.lock().await.entries.len()
    }
}
