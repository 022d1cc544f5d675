//! IPv4 longest-prefix-match table.
//!
//! One masked hash map per prefix length, probed from /32 down to /0.
//! Lookups are read-only; the control plane mutates a private clone and
//! publishes it wholesale, so the data path never observes a partial
//! update.

use std::net::Ipv4Addr;

use ahash::AHashMap;
use ipnetwork::Ipv4Network;

#[derive(Debug, Clone)]
pub struct Ipv4LpmTable<V> {
    by_prefix_len: Vec<AHashMap<u32, V>>,
    len: usize,
}

impl<V> Default for Ipv4LpmTable<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> Ipv4LpmTable<V> {
    pub fn new() -> Self {
        Self {
            by_prefix_len: (0..=32).map(|_| AHashMap::new()).collect(),
            len: 0,
        }
    }

    pub fn from_entries(entries: impl IntoIterator<Item = (Ipv4Network, V)>) -> Self {
        let mut table = Self::new();
        for (net, value) in entries {
            table.insert(net, value);
        }
        table
    }

    pub fn insert(&mut self, net: Ipv4Network, value: V) -> Option<V> {
        let prefix = net.prefix();
        let key = u32::from(net.network()) & prefix_mask(prefix);
        let old = self.by_prefix_len[prefix as usize].insert(key, value);
        if old.is_none() {
            self.len += 1;
        }
        old
    }

    pub fn remove(&mut self, net: Ipv4Network) -> Option<V> {
        let prefix = net.prefix();
        let key = u32::from(net.network()) & prefix_mask(prefix);
        let old = self.by_prefix_len[prefix as usize].remove(&key);
        if old.is_some() {
            self.len -= 1;
        }
        old
    }

    /// Longest-prefix match for `addr`.
    pub fn lookup(&self, addr: Ipv4Addr) -> Option<&V> {
        let addr = u32::from(addr);
        for prefix in (0..=32u8).rev() {
            let map = &self.by_prefix_len[prefix as usize];
            if map.is_empty() {
                continue;
            }
            if let Some(value) = map.get(&(addr & prefix_mask(prefix))) {
                return Some(value);
            }
        }
        None
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

fn prefix_mask(prefix: u8) -> u32 {
    if prefix == 0 {
        0
    } else {
        u32::MAX << (32 - prefix as u32)
    }
}
