//! ACK-flood mitigation.
//!
//! A pure ACK that belongs to no tracked flow in either direction is
//! spoofed flood traffic. Only meaningful with conntrack enabled; the
//! stage steps aside otherwise.

use super::{StageCtx, StageVerdict};
use crate::config::ConfigKey;
use crate::engine::CoreTables;
use crate::parser::{PacketContext, TCP_FLAG_ACK};
use crate::tables::ConnKey;
use crate::verdict::{AttackType, DropReason};

pub(crate) fn check(
    ctx: &StageCtx<'_>,
    core: &mut CoreTables,
    pkt: &PacketContext,
) -> StageVerdict {
    if !pkt.is_tcp() || pkt.tcp_flags != TCP_FLAG_ACK {
        return StageVerdict::Pass;
    }
    if !ctx.config().is_enabled(ConfigKey::ConntrackEnable) {
        return StageVerdict::Pass;
    }

    let key = ConnKey::from_packet(pkt);
    if let Some((entry, direction)) = core.conntrack.get_direction_mut(&key) {
        entry.record(direction, ctx.now_ns, pkt.pkt_len);
        return StageVerdict::Pass;
    }

    ctx.stats.bump(&ctx.stats.ack_flood_dropped);
    ctx.emit_drop(pkt, AttackType::AckFlood, DropReason::AckInvalid);
    StageVerdict::Drop(DropReason::AckInvalid)
}
