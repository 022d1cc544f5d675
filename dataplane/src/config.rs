//! Runtime configuration store.
//!
//! A fixed array of 64-bit slots indexed by a closed key enumeration. The
//! control plane is the only writer; the packet path reads with relaxed
//! atomics and treats absent (never written) slots as zero.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Number of configuration slots; leaves headroom for future keys.
pub const CONFIG_SLOTS: usize = 64;

/// Configuration keys understood by the data plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(usize)]
pub enum ConfigKey {
    /// Global enable/disable for the whole pipeline.
    Enabled = 0,
    /// Per-source TCP (SYN) rate limit, packets per second.
    SynRatePps = 1,
    /// Per-source UDP rate limit, packets per second.
    UdpRatePps = 2,
    /// Per-source ICMP rate limit, packets per second.
    IcmpRatePps = 3,
    /// Aggregate packets-per-second limit.
    GlobalPpsLimit = 4,
    /// Aggregate bits-per-second limit.
    GlobalBpsLimit = 5,
    /// SYN-cookie challenge/response enable.
    SynCookieEnable = 6,
    /// Connection tracking enable.
    ConntrackEnable = 7,
    /// Learned baseline PPS (control-plane bookkeeping).
    BaselinePps = 8,
    /// Learned baseline BPS (control-plane bookkeeping).
    BaselineBps = 9,
    /// Attack detection threshold, multiplier x100.
    AttackThreshold = 10,
    /// GeoIP country filtering enable.
    GeoIpEnable = 11,
    /// IP reputation scoring enable.
    ReputationEnable = 12,
    /// Reputation score threshold for auto-block (0-1000).
    ReputationThreshold = 13,
    /// Deep protocol validation enable.
    ProtoValidationEnable = 14,
    /// Payload pattern matching enable.
    PayloadMatchEnable = 15,
    /// Current escalation level (0-3).
    EscalationLevel = 16,
    /// Threat intelligence feed blocking enable.
    ThreatIntelEnable = 17,
    /// DNS validation mode: 0=off, 1=basic, 2=strict.
    DnsValidationMode = 18,
    /// TCP state machine validation enable.
    TcpStateEnable = 19,
    /// Adaptive rate limiting enable.
    AdaptiveRateEnable = 20,
}

/// Coarse attack-pressure signal set by the control plane. Stages consult
/// it to tighten thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum EscalationLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl EscalationLevel {
    /// Decode the raw config value; anything above the known range clamps
    /// to `Critical`.
    pub fn from_raw(raw: u64) -> Self {
        match raw {
            0 => EscalationLevel::Low,
            1 => EscalationLevel::Medium,
            2 => EscalationLevel::High,
            _ => EscalationLevel::Critical,
        }
    }

    pub fn as_raw(self) -> u64 {
        match self {
            EscalationLevel::Low => 0,
            EscalationLevel::Medium => 1,
            EscalationLevel::High => 2,
            EscalationLevel::Critical => 3,
        }
    }
}

/// DNS validation strictness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum DnsValidationMode {
    Off,
    Basic,
    Strict,
}

impl DnsValidationMode {
    pub fn from_raw(raw: u64) -> Self {
        match raw {
            0 => DnsValidationMode::Off,
            1 => DnsValidationMode::Basic,
            _ => DnsValidationMode::Strict,
        }
    }
}

/// Shared configuration store.
#[derive(Debug)]
pub struct ConfigStore {
    slots: [AtomicU64; CONFIG_SLOTS],
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore {
    pub fn new() -> Self {
        Self {
            slots: [0u64; CONFIG_SLOTS].map(AtomicU64::new),
        }
    }

    pub fn get(&self, key: ConfigKey) -> u64 {
        self.slots[key as usize].load(Ordering::Relaxed)
    }

    pub fn set(&self, key: ConfigKey, value: u64) {
        self.slots[key as usize].store(value, Ordering::Relaxed);
    }

    /// Treats any nonzero value as enabled.
    pub fn is_enabled(&self, key: ConfigKey) -> bool {
        self.get(key) != 0
    }

    pub fn escalation(&self) -> EscalationLevel {
        EscalationLevel::from_raw(self.get(ConfigKey::EscalationLevel))
    }

    pub fn dns_mode(&self) -> DnsValidationMode {
        DnsValidationMode::from_raw(self.get(ConfigKey::DnsValidationMode))
    }
}
