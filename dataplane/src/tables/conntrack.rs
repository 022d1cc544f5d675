//! Connection tracking.
//!
//! Lightweight 5-tuple tracking for TCP, UDP and ICMP. Each worker owns
//! its own LRU shard; RSS keeps both directions of a flow on the same
//! core, so no cross-core coordination is needed.

use std::net::Ipv4Addr;
use std::num::NonZeroUsize;
use std::time::Duration;

use lru::LruCache;
use serde::Serialize;

use crate::parser::{PacketContext, TCP_FLAG_ACK, TCP_FLAG_FIN, TCP_FLAG_RST, TCP_FLAG_SYN};

/// Advisory eviction timeouts; the data plane itself evicts by LRU only.
pub const TCP_ESTABLISHED_TIMEOUT: Duration = Duration::from_secs(300);
pub const TCP_NEW_TIMEOUT: Duration = Duration::from_secs(30);
pub const UDP_TIMEOUT: Duration = Duration::from_secs(60);
pub const ICMP_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection entry flags.
pub mod conn_flags {
    pub const SYN_COOKIE_VERIFIED: u8 = 1 << 0;
    pub const WHITELISTED: u8 = 1 << 1;
    pub const SUSPECT: u8 = 1 << 2;
    pub const REPUTATION_OK: u8 = 1 << 3;
    pub const GEOIP_CHECKED: u8 = 1 << 4;
}

/// 5-tuple key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ConnKey {
    pub src_ip: Ipv4Addr,
    pub dst_ip: Ipv4Addr,
    pub src_port: u16,
    pub dst_port: u16,
    pub protocol: u8,
}

impl ConnKey {
    pub fn from_packet(pkt: &PacketContext) -> Self {
        Self {
            src_ip: pkt.src_ip,
            dst_ip: pkt.dst_ip,
            src_port: pkt.src_port,
            dst_port: pkt.dst_port,
            protocol: pkt.ip_proto,
        }
    }

    /// Same flow, opposite direction.
    pub fn reversed(&self) -> Self {
        Self {
            src_ip: self.dst_ip,
            dst_ip: self.src_ip,
            src_port: self.dst_port,
            dst_port: self.src_port,
            protocol: self.protocol,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum ConnState {
    New,
    SynSent,
    SynRecv,
    Established,
    FinWait,
    Closed,
    TimeWait,
    Rst,
}

/// Which direction of the flow a packet travelled, relative to the entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Reverse,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnEntry {
    pub last_seen_ns: u64,
    pub packets_fwd: u32,
    pub packets_rev: u32,
    pub bytes_fwd: u64,
    pub bytes_rev: u64,
    pub state: ConnState,
    pub flags: u8,
    pub violation_count: u8,
    /// Expected next sequence number; zero disables the window check.
    pub seq_expected: u32,
}

impl ConnEntry {
    /// Fresh entry for the first packet of a flow.
    pub fn new(now_ns: u64, pkt_len: u16) -> Self {
        Self {
            last_seen_ns: now_ns,
            packets_fwd: 1,
            packets_rev: 0,
            bytes_fwd: pkt_len as u64,
            bytes_rev: 0,
            state: ConnState::New,
            flags: 0,
            violation_count: 0,
            seq_expected: 0,
        }
    }

    /// Entry installed after a successful SYN-cookie validation.
    pub fn established_via_cookie(now_ns: u64, pkt_len: u16) -> Self {
        Self {
            state: ConnState::Established,
            flags: conn_flags::SYN_COOKIE_VERIFIED,
            ..Self::new(now_ns, pkt_len)
        }
    }

    pub fn record(&mut self, direction: Direction, now_ns: u64, pkt_len: u16) {
        self.last_seen_ns = now_ns;
        match direction {
            Direction::Forward => {
                self.packets_fwd += 1;
                self.bytes_fwd += pkt_len as u64;
            }
            Direction::Reverse => {
                self.packets_rev += 1;
                self.bytes_rev += pkt_len as u64;
            }
        }
    }

    /// Advance the TCP state machine for an observed flag byte.
    ///
    /// NEW -> SYN_SENT -> SYN_RECV -> ESTABLISHED -> FIN_WAIT -> CLOSED,
    /// with RST short-circuiting to CLOSED from the active states.
    pub fn advance_tcp_state(&mut self, tcp_flags: u8, direction: Direction) {
        let forward = direction == Direction::Forward;
        match self.state {
            ConnState::New => {
                if tcp_flags & TCP_FLAG_SYN != 0 {
                    self.state = ConnState::SynSent;
                }
            }
            ConnState::SynSent => {
                if tcp_flags & (TCP_FLAG_SYN | TCP_FLAG_ACK) == (TCP_FLAG_SYN | TCP_FLAG_ACK)
                    && !forward
                {
                    self.state = ConnState::SynRecv;
                }
            }
            ConnState::SynRecv => {
                if tcp_flags & TCP_FLAG_ACK != 0 && forward {
                    self.state = ConnState::Established;
                }
            }
            ConnState::Established => {
                if tcp_flags & TCP_FLAG_FIN != 0 {
                    self.state = ConnState::FinWait;
                }
                if tcp_flags & TCP_FLAG_RST != 0 {
                    self.state = ConnState::Closed;
                }
            }
            ConnState::FinWait => {
                if tcp_flags & TCP_FLAG_FIN != 0 && !forward {
                    self.state = ConnState::Closed;
                }
                if tcp_flags & TCP_FLAG_RST != 0 {
                    self.state = ConnState::Closed;
                }
            }
            ConnState::Closed | ConnState::TimeWait | ConnState::Rst => {}
        }
    }
}

/// One worker's conntrack shard.
#[derive(Debug)]
pub struct ConntrackTable {
    entries: LruCache<ConnKey, ConnEntry>,
}

impl ConntrackTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: LruCache::new(NonZeroUsize::new(capacity.max(1)).unwrap()),
        }
    }

    pub fn get_mut(&mut self, key: &ConnKey) -> Option<&mut ConnEntry> {
        self.entries.get_mut(key)
    }

    /// Look the flow up in either direction.
    pub fn get_direction_mut(&mut self, key: &ConnKey) -> Option<(&mut ConnEntry, Direction)> {
        if self.entries.contains(key) {
            return self
                .entries
                .get_mut(key)
                .map(|entry| (entry, Direction::Forward));
        }
        let reversed = key.reversed();
        if self.entries.contains(&reversed) {
            return self
                .entries
                .get_mut(&reversed)
                .map(|entry| (entry, Direction::Reverse));
        }
        None
    }

    /// Unconditional insert (SYN-cookie validation replaces any stale
    /// entry).
    pub fn insert(&mut self, key: ConnKey, entry: ConnEntry) {
        self.entries.put(key, entry);
    }

    /// Insert only when absent; a racing creator wins and the loser reuses
    /// the existing entry. Returns whether an insert happened.
    pub fn insert_if_absent(&mut self, key: ConnKey, entry: ConnEntry) -> bool {
        if self.entries.contains(&key) {
            return false;
        }
        self.entries.put(key, entry);
        true
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> ConnKey {
        ConnKey {
            src_ip: Ipv4Addr::new(10, 0, 0, 1),
            dst_ip: Ipv4Addr::new(192, 168, 1, 1),
            src_port: 40000,
            dst_port: 80,
            protocol: 6,
        }
    }

    #[test]
    fn handshake_walks_the_state_machine() {
        let mut entry = ConnEntry::new(0, 40);
        entry.advance_tcp_state(TCP_FLAG_SYN, Direction::Forward);
        assert_eq!(entry.state, ConnState::SynSent);
        entry.advance_tcp_state(TCP_FLAG_SYN | TCP_FLAG_ACK, Direction::Reverse);
        assert_eq!(entry.state, ConnState::SynRecv);
        entry.advance_tcp_state(TCP_FLAG_ACK, Direction::Forward);
        assert_eq!(entry.state, ConnState::Established);
        entry.advance_tcp_state(TCP_FLAG_FIN | TCP_FLAG_ACK, Direction::Forward);
        assert_eq!(entry.state, ConnState::FinWait);
        entry.advance_tcp_state(TCP_FLAG_FIN | TCP_FLAG_ACK, Direction::Reverse);
        assert_eq!(entry.state, ConnState::Closed);
    }

    #[test]
    fn syn_ack_in_forward_direction_does_not_advance() {
        let mut entry = ConnEntry::new(0, 40);
        entry.state = ConnState::SynSent;
        entry.advance_tcp_state(TCP_FLAG_SYN | TCP_FLAG_ACK, Direction::Forward);
        assert_eq!(entry.state, ConnState::SynSent);
    }

    #[test]
    fn rst_closes_established() {
        let mut entry = ConnEntry::new(0, 40);
        entry.state = ConnState::Established;
        entry.advance_tcp_state(TCP_FLAG_RST, Direction::Forward);
        assert_eq!(entry.state, ConnState::Closed);
    }

    #[test]
    fn closed_state_is_terminal() {
        let mut entry = ConnEntry::new(0, 40);
        entry.state = ConnState::Closed;
        entry.advance_tcp_state(TCP_FLAG_SYN, Direction::Forward);
        assert_eq!(entry.state, ConnState::Closed);
    }

    #[test]
    fn reverse_lookup_finds_the_forward_entry() {
        let mut table = ConntrackTable::new(16);
        table.insert(key(), ConnEntry::new(0, 40));

        let (_, dir) = table.get_direction_mut(&key().reversed()).unwrap();
        assert_eq!(dir, Direction::Reverse);
        let (_, dir) = table.get_direction_mut(&key()).unwrap();
        assert_eq!(dir, Direction::Forward);
    }

    #[test]
    fn insert_if_absent_keeps_the_first_entry() {
        let mut table = ConntrackTable::new(16);
        assert!(table.insert_if_absent(key(), ConnEntry::new(1, 40)));
        assert!(!table.insert_if_absent(key(), ConnEntry::new(2, 40)));
        assert_eq!(table.get_mut(&key()).unwrap().last_seen_ns, 1);
    }

    #[test]
    fn lru_evicts_the_oldest_flow() {
        let mut table = ConntrackTable::new(2);
        let a = key();
        let mut b = key();
        b.src_port = 40001;
        let mut c = key();
        c.src_port = 40002;

        table.insert(a, ConnEntry::new(0, 40));
        table.insert(b, ConnEntry::new(1, 40));
        table.insert(c, ConnEntry::new(2, 40));
        assert_eq!(table.len(), 2);
        assert!(table.get_mut(&a).is_none());
    }
}
