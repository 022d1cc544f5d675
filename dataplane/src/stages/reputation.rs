//! IP reputation scoring.
//!
//! Every source carries a score that rises on weighted violations
//! (reported by the other stages through [`penalize`]) and decays with
//! time. Crossing the threshold latches the `blocked` flag; a blocked
//! source is dropped until its entry ages out of the LRU shard.

use std::net::Ipv4Addr;

use super::{StageCtx, StageVerdict};
use crate::config::ConfigKey;
use crate::engine::CoreTables;
use crate::parser::PacketContext;
use crate::tables::reputation::{DEFAULT_REPUTATION_THRESHOLD, REP_WEIGHT_PORT_SCAN};
use crate::verdict::{AttackType, DropReason};

pub(crate) fn check(
    ctx: &StageCtx<'_>,
    core: &mut CoreTables,
    pkt: &PacketContext,
) -> StageVerdict {
    if !ctx.config().is_enabled(ConfigKey::ReputationEnable) {
        return StageVerdict::Pass;
    }

    let threshold = match ctx.config().get(ConfigKey::ReputationThreshold) {
        0 => DEFAULT_REPUTATION_THRESHOLD,
        configured => configured,
    };

    // The port-scan tracker runs for every packet, including the first
    // one from a source; its verdict only scores sources we already know.
    let scan_detected = core
        .port_scan
        .observe(pkt.src_ip, pkt.dst_port, ctx.now_ns);
    if scan_detected {
        ctx.stats.bump(&ctx.stats.port_scan_detected);
    }

    let (entry, created) = core.reputation.get_or_create(pkt.src_ip, ctx.now_ns);
    if created {
        return StageVerdict::Pass;
    }

    if entry.blocked {
        entry.total_packets += 1;
        entry.dropped_packets += 1;
        entry.last_seen_ns = ctx.now_ns;
        let score = entry.score;
        return drop_reputation(ctx, pkt, score, false);
    }

    entry.total_packets += 1;
    entry.last_seen_ns = ctx.now_ns;
    entry.decay(ctx.now_ns);

    if scan_detected {
        entry.penalize(REP_WEIGHT_PORT_SCAN, ctx.now_ns);
    }

    if entry.score as u64 >= threshold {
        entry.blocked = true;
        entry.dropped_packets += 1;
        let score = entry.score;
        return drop_reputation(ctx, pkt, score, true);
    }

    StageVerdict::Pass
}

fn drop_reputation(
    ctx: &StageCtx<'_>,
    pkt: &PacketContext,
    score: u32,
    newly_blocked: bool,
) -> StageVerdict {
    ctx.stats.bump(&ctx.stats.reputation_dropped);
    if newly_blocked {
        ctx.stats.bump(&ctx.stats.reputation_auto_blocked);
    }
    let mut event = ctx.drop_event(pkt, AttackType::Reputation, DropReason::Reputation);
    event.reputation_score = score;
    ctx.emit(event);
    StageVerdict::Drop(DropReason::Reputation)
}

/// Report a violation observed by another stage.
pub(crate) fn penalize(ctx: &StageCtx<'_>, core: &mut CoreTables, src: Ipv4Addr, weight: u32) {
    if !ctx.config().is_enabled(ConfigKey::ReputationEnable) {
        return;
    }
    core.reputation.penalize(src, weight, ctx.now_ns);
}
