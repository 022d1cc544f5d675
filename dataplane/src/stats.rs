//! Per-core statistics.
//!
//! Each worker owns one [`CoreStats`] block of monotonic counters updated
//! with relaxed atomics; nothing on the packet path ever reads another
//! core's block. Aggregation happens only when a telemetry reader asks for
//! a [`StatsSnapshot`], which may tear by at most one sample per counter.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

macro_rules! stats_block {
    ($($(#[$doc:meta])* $name:ident),+ $(,)?) => {
        /// One core's counter block.
        #[derive(Debug, Default)]
        pub struct CoreStats {
            $($(#[$doc])* pub $name: AtomicU64,)+
        }

        /// Point-in-time aggregate of one or more counter blocks.
        #[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
        pub struct StatsSnapshot {
            $($(#[$doc])* pub $name: u64,)+
        }

        impl CoreStats {
            pub fn snapshot(&self) -> StatsSnapshot {
                StatsSnapshot {
                    $($name: self.$name.load(Ordering::Relaxed),)+
                }
            }
        }

        impl StatsSnapshot {
            /// Fold another snapshot into this one (cross-core aggregation).
            pub fn merge(&mut self, other: &StatsSnapshot) {
                $(self.$name += other.$name;)+
            }
        }
    };
}

stats_block! {
    rx_packets,
    rx_bytes,
    tx_packets,
    tx_bytes,
    dropped_packets,
    dropped_bytes,
    /// Per-attack drop counters.
    syn_flood_dropped,
    udp_flood_dropped,
    icmp_flood_dropped,
    ack_flood_dropped,
    dns_amp_dropped,
    ntp_amp_dropped,
    ssdp_amp_dropped,
    memcached_amp_dropped,
    fragment_dropped,
    acl_dropped,
    rate_limited,
    /// Conntrack.
    conntrack_new,
    conntrack_established,
    /// SYN cookie.
    syn_cookies_sent,
    syn_cookies_validated,
    syn_cookies_failed,
    /// Advanced defense counters.
    geoip_dropped,
    reputation_dropped,
    reputation_auto_blocked,
    proto_violation_dropped,
    payload_match_dropped,
    tcp_state_dropped,
    tcp_state_violations,
    threat_intel_dropped,
    dns_queries_validated,
    dns_queries_blocked,
    ntp_monlist_blocked,
    port_scan_detected,
}

impl CoreStats {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub(crate) fn count_rx(&self, pkt_len: u16) {
        self.rx_packets.fetch_add(1, Ordering::Relaxed);
        self.rx_bytes.fetch_add(pkt_len as u64, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn count_tx(&self, pkt_len: u16) {
        self.tx_packets.fetch_add(1, Ordering::Relaxed);
        self.tx_bytes.fetch_add(pkt_len as u64, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn count_drop(&self, pkt_len: u16) {
        self.dropped_packets.fetch_add(1, Ordering::Relaxed);
        self.dropped_bytes.fetch_add(pkt_len as u64, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn bump(&self, counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}
