//! Per-source reputation scoring and port-scan tracking.
//!
//! Scores rise on weighted violations and decay over time; once a source
//! crosses the block threshold the `blocked` flag latches until the entry
//! falls out of the LRU.

use std::net::Ipv4Addr;
use std::num::NonZeroUsize;

use lru::LruCache;

/// Violation weights.
pub const REP_WEIGHT_SYN_NO_ACK: u32 = 50;
pub const REP_WEIGHT_RATE_EXCEEDED: u32 = 30;
pub const REP_WEIGHT_PROTO_ANOMALY: u32 = 40;
pub const REP_WEIGHT_BAD_PAYLOAD: u32 = 60;
pub const REP_WEIGHT_FRAGMENT: u32 = 20;
pub const REP_WEIGHT_PORT_SCAN: u32 = 70;

/// Score decay per elapsed second.
pub const REP_DECAY_PER_SECOND: u32 = 5;
/// Decay is capped at this many elapsed seconds per update.
pub const REP_DECAY_MAX_SECONDS: u64 = 60;
const REP_DECAY_INTERVAL_NS: u64 = 1_000_000_000;

/// Scores saturate here; a blocked source cannot dig deeper.
pub const REP_SCORE_MAX: u32 = 1000;
/// Block threshold when `ConfigKey::ReputationThreshold` is unset.
pub const DEFAULT_REPUTATION_THRESHOLD: u64 = 500;

/// Port-scan detection window.
pub const PORT_SCAN_WINDOW_NS: u64 = 10_000_000_000;
/// Distinct ports tolerated inside one window before the penalty fires.
pub const PORT_SCAN_THRESHOLD: u32 = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReputationEntry {
    pub score: u32,
    pub total_packets: u32,
    pub dropped_packets: u32,
    pub violation_count: u32,
    pub first_seen_ns: u64,
    pub last_seen_ns: u64,
    pub last_decay_ns: u64,
    pub distinct_ports: u16,
    pub blocked: bool,
}

impl ReputationEntry {
    pub fn new(now_ns: u64) -> Self {
        Self {
            score: 0,
            total_packets: 1,
            dropped_packets: 0,
            violation_count: 0,
            first_seen_ns: now_ns,
            last_seen_ns: now_ns,
            last_decay_ns: now_ns,
            distinct_ports: 0,
            blocked: false,
        }
    }

    /// Entry created by a penalty before the source was ever scored.
    pub fn with_penalty(weight: u32, now_ns: u64) -> Self {
        Self {
            score: weight.min(REP_SCORE_MAX),
            total_packets: 0,
            violation_count: 1,
            ..Self::new(now_ns)
        }
    }

    /// Add violation points, saturating at [`REP_SCORE_MAX`].
    pub fn penalize(&mut self, weight: u32, now_ns: u64) {
        self.score = (self.score + weight).min(REP_SCORE_MAX);
        self.violation_count += 1;
        self.last_seen_ns = now_ns;
    }

    /// Apply time-based decay, at most [`REP_DECAY_MAX_SECONDS`] worth.
    pub fn decay(&mut self, now_ns: u64) {
        let elapsed_ns = now_ns.saturating_sub(self.last_decay_ns);
        if elapsed_ns <= REP_DECAY_INTERVAL_NS {
            return;
        }
        let elapsed_secs = (elapsed_ns / REP_DECAY_INTERVAL_NS).min(REP_DECAY_MAX_SECONDS);
        let total_decay = elapsed_secs as u32 * REP_DECAY_PER_SECOND;
        self.score = self.score.saturating_sub(total_decay);
        self.last_decay_ns = now_ns;
    }
}

/// One worker's reputation shard.
#[derive(Debug)]
pub struct ReputationTable {
    entries: LruCache<Ipv4Addr, ReputationEntry>,
}

impl ReputationTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: LruCache::new(NonZeroUsize::new(capacity.max(1)).unwrap()),
        }
    }

    pub fn get_mut(&mut self, addr: &Ipv4Addr) -> Option<&mut ReputationEntry> {
        self.entries.get_mut(addr)
    }

    pub fn get_or_create(&mut self, addr: Ipv4Addr, now_ns: u64) -> (&mut ReputationEntry, bool) {
        let created = !self.entries.contains(&addr);
        let entry = self
            .entries
            .get_or_insert_mut(addr, || ReputationEntry::new(now_ns));
        (entry, created)
    }

    /// The `reputation_penalize` contract used by the other stages: add
    /// violation points, creating the entry when the source is unknown.
    pub fn penalize(&mut self, addr: Ipv4Addr, weight: u32, now_ns: u64) {
        match self.entries.get_mut(&addr) {
            Some(entry) => entry.penalize(weight, now_ns),
            None => {
                self.entries
                    .put(addr, ReputationEntry::with_penalty(weight, now_ns));
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Distinct-destination-port tracker for one source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortScanEntry {
    pub window_start_ns: u64,
    pub distinct_ports: u32,
    /// Seen-bit per port for ports 0-63; higher ports have no bitmap slot
    /// and count as distinct on every sighting.
    pub port_bitmap: u64,
}

impl PortScanEntry {
    fn new(port: u16, now_ns: u64) -> Self {
        Self {
            window_start_ns: now_ns,
            distinct_ports: 1,
            port_bitmap: bitmap_bit(port),
        }
    }

    fn observe(&mut self, port: u16, now_ns: u64) -> bool {
        if now_ns.saturating_sub(self.window_start_ns) > PORT_SCAN_WINDOW_NS {
            *self = Self::new(port, now_ns);
            return false;
        }

        let bit = bitmap_bit(port);
        let already_seen = bit != 0 && self.port_bitmap & bit != 0;
        self.port_bitmap |= bit;
        if !already_seen {
            self.distinct_ports += 1;
        }

        self.distinct_ports > PORT_SCAN_THRESHOLD
    }
}

fn bitmap_bit(port: u16) -> u64 {
    if port < 64 {
        1u64 << port
    } else {
        0
    }
}

/// One worker's port-scan shard.
#[derive(Debug)]
pub struct PortScanTable {
    entries: LruCache<Ipv4Addr, PortScanEntry>,
}

impl PortScanTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: LruCache::new(NonZeroUsize::new(capacity.max(1)).unwrap()),
        }
    }

    /// Record a destination port for `src` and report whether the source
    /// now looks like a scanner.
    pub fn observe(&mut self, src: Ipv4Addr, dst_port: u16, now_ns: u64) -> bool {
        match self.entries.get_mut(&src) {
            Some(entry) => entry.observe(dst_port, now_ns),
            None => {
                self.entries.put(src, PortScanEntry::new(dst_port, now_ns));
                false
            }
        }
    }

    pub fn get(&mut self, src: &Ipv4Addr) -> Option<&PortScanEntry> {
        self.entries.get(src)
    }
}
