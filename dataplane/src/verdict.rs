//! Verdicts, drop reasons and attack classification.

use serde::Serialize;

/// Terminal outcome for a processed frame.
///
/// The host glue maps these onto its own actions: `Pass` forwards, `Drop`
/// discards, `Tx` reflects the (rewritten) frame out of the same interface,
/// `Redirect` steers to another interface and `Bypass` forwards without
/// further inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Verdict {
    Pass,
    Drop(DropReason),
    Tx,
    Redirect,
    Bypass,
}

impl Verdict {
    pub fn is_drop(&self) -> bool {
        matches!(self, Verdict::Drop(_))
    }

    pub fn drop_reason(&self) -> Option<DropReason> {
        match self {
            Verdict::Drop(reason) => Some(*reason),
            _ => None,
        }
    }
}

/// Why a packet was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DropReason {
    Blacklist,
    RateLimit,
    SynFlood,
    UdpFlood,
    IcmpFlood,
    AckInvalid,
    DnsAmplification,
    NtpAmplification,
    SsdpAmplification,
    MemcachedAmplification,
    Fragment,
    ParseError,
    Fingerprint,
    GeoIp,
    Reputation,
    ProtocolInvalid,
    PayloadMatch,
    TcpState,
    ThreatIntel,
}

/// Attack classification attached to emitted events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum AttackType {
    None,
    SynFlood,
    UdpFlood,
    IcmpFlood,
    AckFlood,
    DnsAmplification,
    NtpAmplification,
    SsdpAmplification,
    MemcachedAmplification,
    Fragment,
    GeoIpBlock,
    Reputation,
    ProtocolViolation,
    PayloadMatch,
    ThreatIntel,
}
