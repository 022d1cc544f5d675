//! Payload pattern matching.
//!
//! Walks the published rule table in order and applies the first matching
//! rule's action. Hit counters are recorded for every match, including
//! monitor-only rules.

use super::{install_adaptive_override, reputation, StageCtx, StageVerdict};
use crate::config::ConfigKey;
use crate::engine::CoreTables;
use crate::frame::FrameView;
use crate::parser::PacketContext;
use crate::tables::reputation::REP_WEIGHT_BAD_PAYLOAD;
use crate::tables::PayloadAction;
use crate::verdict::{AttackType, DropReason};

/// Divisor applied to the protocol base rate for rate-limited matches.
const PAYLOAD_RATE_DIVISOR: u64 = 4;

pub(crate) fn check(
    ctx: &StageCtx<'_>,
    core: &mut CoreTables,
    pkt: &PacketContext,
    frame: &FrameView<'_>,
) -> StageVerdict {
    if !ctx.config().is_enabled(ConfigKey::PayloadMatchEnable) {
        return StageVerdict::Pass;
    }
    if pkt.payload_offset.is_none() || pkt.payload_len == 0 {
        return StageVerdict::Pass;
    }

    let rules = ctx.shared.payload_rules.load();
    for rule in rules.iter() {
        if !rule.matches(pkt, frame) {
            continue;
        }
        rule.record_hit();

        match rule.action() {
            PayloadAction::Drop => {
                ctx.stats.bump(&ctx.stats.payload_match_dropped);
                reputation::penalize(ctx, core, pkt.src_ip, REP_WEIGHT_BAD_PAYLOAD);
                ctx.emit_drop(pkt, AttackType::PayloadMatch, DropReason::PayloadMatch);
                return StageVerdict::Drop(DropReason::PayloadMatch);
            }
            PayloadAction::RateLimit => {
                install_adaptive_override(ctx, pkt, PAYLOAD_RATE_DIVISOR);
                return StageVerdict::Pass;
            }
            PayloadAction::Monitor => {
                ctx.emit_monitor(pkt, AttackType::PayloadMatch);
                return StageVerdict::Pass;
            }
        }
    }

    StageVerdict::Pass
}
