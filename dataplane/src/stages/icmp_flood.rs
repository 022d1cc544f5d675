//! ICMP flood mitigation.
//!
//! Two policies: reject oversized messages (ping-of-death and smurf
//! shapes) and accept only the handful of ICMP types a protected network
//! actually needs to hear.

use super::{StageCtx, StageVerdict};
use crate::parser::{PacketContext, ICMP_HDR_LEN};
use crate::verdict::{AttackType, DropReason};

const ICMP_ECHO_REPLY: u8 = 0;
const ICMP_DEST_UNREACHABLE: u8 = 3;
const ICMP_ECHO_REQUEST: u8 = 8;
const ICMP_TIME_EXCEEDED: u8 = 11;

/// Maximum accepted ICMP message size (header + payload).
const ICMP_MAX_SIZE: usize = 1024;

pub(crate) fn check(ctx: &StageCtx<'_>, pkt: &PacketContext) -> StageVerdict {
    if !pkt.is_icmp() || pkt.l4_offset.is_none() {
        return StageVerdict::Pass;
    }

    if pkt.payload_len as usize + ICMP_HDR_LEN > ICMP_MAX_SIZE {
        return drop_icmp(ctx, pkt);
    }

    match pkt.icmp_type {
        ICMP_ECHO_REPLY | ICMP_DEST_UNREACHABLE | ICMP_ECHO_REQUEST | ICMP_TIME_EXCEEDED => {
            StageVerdict::Pass
        }
        _ => drop_icmp(ctx, pkt),
    }
}

fn drop_icmp(ctx: &StageCtx<'_>, pkt: &PacketContext) -> StageVerdict {
    ctx.stats.bump(&ctx.stats.icmp_flood_dropped);
    ctx.emit_drop(pkt, AttackType::IcmpFlood, DropReason::IcmpFlood);
    StageVerdict::Drop(DropReason::IcmpFlood)
}
