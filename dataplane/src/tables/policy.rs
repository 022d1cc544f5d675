//! Control-plane policy entries: GeoIP, threat intelligence and the
//! port-protocol registration map.

use serde::Serialize;

/// Pack a two-letter country code the way the GeoIP feed does
/// (`"CN"` -> `b'C' << 8 | b'N'`). Returns zero for anything shorter.
pub fn country_code(tag: &str) -> u16 {
    let bytes = tag.as_bytes();
    if bytes.len() < 2 {
        return 0;
    }
    (bytes[0] as u16) << 8 | bytes[1] as u16
}

/// Per-country action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GeoAction {
    Pass,
    Drop,
    /// Halve the per-source rate for this origin.
    RateLimit,
    /// Pass, but emit a telemetry event.
    Monitor,
}

/// GeoIP LPM value: the resolved country plus a per-prefix action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GeoEntry {
    pub country: u16,
    pub action: GeoAction,
}

impl GeoEntry {
    pub fn new(tag: &str, action: GeoAction) -> Self {
        Self {
            country: country_code(tag),
            action,
        }
    }
}

/// Which feed published a threat-intel entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ThreatFeed {
    Spamhaus,
    AbuseIpDb,
    EmergingThreats,
    Custom,
}

/// Threat classification carried by the feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ThreatCategory {
    Botnet,
    Scanner,
    TorExit,
    Proxy,
    Malware,
}

/// Feed-requested action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ThreatAction {
    Drop,
    RateLimit,
    Monitor,
}

/// Threat-intel LPM value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ThreatIntelEntry {
    pub feed: ThreatFeed,
    pub category: ThreatCategory,
    /// Feed confidence, 0-100.
    pub confidence: u8,
    pub action: ThreatAction,
}

/// Bits in the port-protocol registration map: destination (or, for
/// amplification checks, source) ports registered for protocol-aware
/// handling beyond the well-known defaults.
pub mod proto_bits {
    pub const DNS: u32 = 1 << 0;
    pub const NTP: u32 = 1 << 1;
    pub const SSDP: u32 = 1 << 2;
    pub const MEMCACHED: u32 = 1 << 3;
    pub const CHARGEN: u32 = 1 << 4;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn country_codes_pack_big_endian() {
        assert_eq!(country_code("US"), 0x5553);
        assert_eq!(country_code("CN"), (b'C' as u16) << 8 | b'N' as u16);
        assert_eq!(country_code(""), 0);
        assert_eq!(country_code("X"), 0);
    }
}
