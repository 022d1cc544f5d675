//! The ordered mitigation stages.
//!
//! Every stage is a plain function with the same shape: it reads the
//! parsed [`PacketContext`], may consult or mutate shared and per-core
//! state, and returns a [`StageVerdict`]. The walk in
//! [`crate::engine::Worker::process`] calls them in pipeline order and
//! stops at the first `Drop` or `Tx`.

pub(crate) mod ack_flood;
pub(crate) mod acl;
pub(crate) mod conntrack;
pub(crate) mod fingerprint;
pub(crate) mod fragment;
pub(crate) mod geoip;
pub(crate) mod icmp_flood;
pub(crate) mod payload_match;
pub(crate) mod proto_validator;
pub(crate) mod rate_limiter;
pub(crate) mod reputation;
pub(crate) mod syn_flood;
pub(crate) mod threat_intel;
pub(crate) mod udp_flood;

pub(crate) use acl::AclDecision;

use crate::config::{ConfigKey, ConfigStore, EscalationLevel};
use crate::engine::SharedState;
use crate::events::{EventAction, EventRecord};
use crate::parser::{PacketContext, IPPROTO_ICMP, IPPROTO_TCP, IPPROTO_UDP};
use crate::stats::CoreStats;
use crate::verdict::{AttackType, DropReason};

/// Outcome of one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StageVerdict {
    Pass,
    Drop(DropReason),
    Tx,
}

/// Read-only context threaded through every stage call.
pub(crate) struct StageCtx<'a> {
    pub shared: &'a SharedState,
    pub stats: &'a CoreStats,
    pub now_ns: u64,
}

impl StageCtx<'_> {
    pub fn config(&self) -> &ConfigStore {
        &self.shared.config
    }

    pub fn escalation(&self) -> EscalationLevel {
        self.shared.config.escalation()
    }

    pub fn emit(&self, record: EventRecord) {
        self.shared.events.emit(record);
    }

    /// Drop-event template; the caller fills in any stage-specific fields
    /// before emitting.
    pub fn drop_event(
        &self,
        pkt: &PacketContext,
        attack: AttackType,
        reason: DropReason,
    ) -> EventRecord {
        EventRecord::for_packet(
            pkt,
            self.now_ns,
            attack,
            EventAction::Drop,
            Some(reason),
            self.escalation(),
        )
    }

    pub fn emit_drop(&self, pkt: &PacketContext, attack: AttackType, reason: DropReason) {
        self.emit(self.drop_event(pkt, attack, reason));
    }

    /// Monitor match: the packet passes but the collector hears about it.
    pub fn emit_monitor(&self, pkt: &PacketContext, attack: AttackType) {
        self.emit(EventRecord::for_packet(
            pkt,
            self.now_ns,
            attack,
            EventAction::Pass,
            None,
            self.escalation(),
        ));
    }
}

/// Install a tightened per-source rate for a suspicious origin: the
/// protocol's configured base rate divided by `divisor` (floor 1). An
/// existing override is left alone.
pub(crate) fn install_adaptive_override(ctx: &StageCtx<'_>, pkt: &PacketContext, divisor: u64) {
    let base_key = match pkt.ip_proto {
        IPPROTO_TCP => ConfigKey::SynRatePps,
        IPPROTO_UDP => ConfigKey::UdpRatePps,
        IPPROTO_ICMP => ConfigKey::IcmpRatePps,
        _ => ConfigKey::GlobalPpsLimit,
    };
    let base_rate = ctx.config().get(base_key);
    if base_rate == 0 {
        return;
    }
    let stricter = (base_rate / divisor).max(1);
    ctx.shared
        .adaptive_rates
        .entry(pkt.src_ip)
        .or_insert(stricter);
}
