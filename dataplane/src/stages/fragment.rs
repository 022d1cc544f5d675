//! IP fragment rejection.
//!
//! The scrubber refuses to reassemble: tiny first fragments are a classic
//! evasion shape, and non-first fragments carry no L4 header to inspect,
//! so every fragment is dropped.

use tracing::trace;

use super::{reputation, StageCtx, StageVerdict};
use crate::engine::CoreTables;
use crate::parser::PacketContext;
use crate::tables::reputation::REP_WEIGHT_FRAGMENT;
use crate::verdict::{AttackType, DropReason};

/// Minimum credible first-fragment size.
pub const FRAGMENT_MIN_FIRST_SIZE: u16 = 68;

pub(crate) fn check(
    ctx: &StageCtx<'_>,
    core: &mut CoreTables,
    pkt: &PacketContext,
) -> StageVerdict {
    if !pkt.is_fragment {
        return StageVerdict::Pass;
    }

    // Both shapes drop: a tiny first fragment is an evasion attempt, and
    // everything else is a fragment we will not reassemble.
    if pkt.frag_offset == 0 && pkt.pkt_len < FRAGMENT_MIN_FIRST_SIZE {
        trace!(src = %pkt.src_ip, len = pkt.pkt_len, "tiny first fragment");
    }

    ctx.stats.bump(&ctx.stats.fragment_dropped);
    reputation::penalize(ctx, core, pkt.src_ip, REP_WEIGHT_FRAGMENT);
    ctx.emit_drop(pkt, AttackType::Fragment, DropReason::Fragment);
    StageVerdict::Drop(DropReason::Fragment)
}
