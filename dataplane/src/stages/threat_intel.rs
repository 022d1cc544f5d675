//! Threat-intelligence feed lookups.
//!
//! Source IPs are matched against feed-published prefixes. Confidence
//! thresholds tighten as the escalation level rises: a feed entry that
//! only rates 40 confidence is ignored in normal operation but dropped
//! during a CRITICAL escalation.

use super::{install_adaptive_override, StageCtx, StageVerdict};
use crate::config::{ConfigKey, EscalationLevel};
use crate::parser::PacketContext;
use crate::tables::ThreatAction;
use crate::verdict::{AttackType, DropReason};

/// Divisor applied to the protocol base rate for rate-limited sources.
const THREAT_INTEL_RATE_DIVISOR: u64 = 4;

/// (drop, rate-limit) confidence thresholds for an escalation level.
fn confidence_thresholds(escalation: EscalationLevel) -> (u8, u8) {
    match escalation {
        EscalationLevel::Critical => (30, 10),
        EscalationLevel::High => (50, 30),
        EscalationLevel::Low | EscalationLevel::Medium => (80, 50),
    }
}

pub(crate) fn check(ctx: &StageCtx<'_>, pkt: &PacketContext) -> StageVerdict {
    if !ctx.config().is_enabled(ConfigKey::ThreatIntelEnable) {
        return StageVerdict::Pass;
    }

    let feed = ctx.shared.threat_intel.load();
    let Some(entry) = feed.lookup(pkt.src_ip) else {
        return StageVerdict::Pass;
    };

    let (drop_threshold, rate_limit_threshold) = confidence_thresholds(ctx.escalation());

    match entry.action {
        ThreatAction::Drop if entry.confidence >= drop_threshold => {
            ctx.stats.bump(&ctx.stats.threat_intel_dropped);
            ctx.emit_drop(pkt, AttackType::ThreatIntel, DropReason::ThreatIntel);
            StageVerdict::Drop(DropReason::ThreatIntel)
        }
        ThreatAction::RateLimit if entry.confidence >= rate_limit_threshold => {
            install_adaptive_override(ctx, pkt, THREAT_INTEL_RATE_DIVISOR);
            StageVerdict::Pass
        }
        ThreatAction::Monitor => {
            ctx.emit_monitor(pkt, AttackType::ThreatIntel);
            StageVerdict::Pass
        }
        _ => StageVerdict::Pass,
    }
}
