//! Attack-signature fingerprint matching.
//!
//! Packets are compared against the published signature table in order;
//! the first signature whose predicates all hold drops the packet. An
//! empty table costs one snapshot load and nothing else.

use super::{StageCtx, StageVerdict};
use crate::parser::PacketContext;
use crate::verdict::{AttackType, DropReason};

pub(crate) fn check(ctx: &StageCtx<'_>, pkt: &PacketContext) -> StageVerdict {
    let signatures = ctx.shared.signatures.load();
    if signatures.is_empty() {
        return StageVerdict::Pass;
    }

    for signature in signatures.iter() {
        if signature.matches(pkt) {
            ctx.stats.bump(&ctx.stats.acl_dropped);
            ctx.emit_drop(pkt, AttackType::None, DropReason::Fingerprint);
            return StageVerdict::Drop(DropReason::Fingerprint);
        }
    }

    StageVerdict::Pass
}
