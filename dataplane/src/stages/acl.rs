//! Access-control lists: whitelist and blacklist LPM lookups.
//!
//! The whitelist always takes priority. A whitelisted source bypasses the
//! drop stages entirely (the walk still records it in conntrack); a
//! blacklisted source is dropped on the spot.

use super::StageCtx;
use crate::parser::PacketContext;
use crate::verdict::{AttackType, DropReason};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AclDecision {
    Pass,
    Whitelisted,
    Drop,
}

pub(crate) fn check(ctx: &StageCtx<'_>, pkt: &PacketContext) -> AclDecision {
    if ctx.shared.whitelist.load().lookup(pkt.src_ip).is_some() {
        return AclDecision::Whitelisted;
    }

    if ctx.shared.blacklist.load().lookup(pkt.src_ip).is_some() {
        ctx.stats.bump(&ctx.stats.acl_dropped);
        ctx.emit_drop(pkt, AttackType::None, DropReason::Blacklist);
        return AclDecision::Drop;
    }

    AclDecision::Pass
}
