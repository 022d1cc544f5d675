//! Per-source and aggregate rate limiting.
//!
//! Per-source limits are protocol-keyed token buckets in the worker's LRU
//! shard, created full on first sight with a 2x burst allowance. An
//! adaptive override installed by the policy stages replaces the
//! configured rate for that source. The aggregate limiters are two
//! per-worker buckets: one counting packets, one counting bytes.

use super::{reputation, StageCtx, StageVerdict};
use crate::config::ConfigKey;
use crate::engine::CoreTables;
use crate::parser::{PacketContext, IPPROTO_ICMP, IPPROTO_TCP, IPPROTO_UDP};
use crate::tables::reputation::REP_WEIGHT_RATE_EXCEEDED;
use crate::tables::TokenBucket;
use crate::verdict::{AttackType, DropReason};

pub(crate) fn per_source(
    ctx: &StageCtx<'_>,
    core: &mut CoreTables,
    pkt: &PacketContext,
) -> StageVerdict {
    let rate_key = match pkt.ip_proto {
        IPPROTO_TCP => ConfigKey::SynRatePps,
        IPPROTO_UDP => ConfigKey::UdpRatePps,
        IPPROTO_ICMP => ConfigKey::IcmpRatePps,
        _ => return StageVerdict::Pass,
    };

    let configured = ctx.config().get(rate_key);
    if configured == 0 {
        return StageVerdict::Pass;
    }

    // A policy-installed override tightens the limit for this source.
    let rate = ctx
        .shared
        .adaptive_rates
        .get(&pkt.src_ip)
        .map(|entry| *entry)
        .unwrap_or(configured);
    let burst = rate.saturating_mul(2);

    let allowed = core.rate_limiters.get_mut(&pkt.src_ip).map(|bucket| {
        bucket.set_rate(rate, burst);
        bucket.try_consume(ctx.now_ns, 1)
    });

    let allowed = match allowed {
        Some(allowed) => allowed,
        None => {
            // First packet from this source starts a full bucket and is
            // not charged.
            core.rate_limiters
                .put(pkt.src_ip, TokenBucket::full(rate, burst, ctx.now_ns));
            true
        }
    };

    if allowed {
        return StageVerdict::Pass;
    }

    ctx.stats.bump(&ctx.stats.rate_limited);
    reputation::penalize(ctx, core, pkt.src_ip, REP_WEIGHT_RATE_EXCEEDED);
    ctx.emit_drop(pkt, AttackType::None, DropReason::RateLimit);
    StageVerdict::Drop(DropReason::RateLimit)
}

pub(crate) fn global(
    ctx: &StageCtx<'_>,
    core: &mut CoreTables,
    pkt: &PacketContext,
) -> StageVerdict {
    let pps_limit = ctx.config().get(ConfigKey::GlobalPpsLimit);
    let bps_limit = ctx.config().get(ConfigKey::GlobalBpsLimit);
    if pps_limit == 0 && bps_limit == 0 {
        return StageVerdict::Pass;
    }

    if pps_limit > 0
        && !consume_global(&mut core.global_pps, pps_limit, 1, ctx.now_ns)
    {
        ctx.stats.bump(&ctx.stats.rate_limited);
        return StageVerdict::Drop(DropReason::RateLimit);
    }

    if bps_limit > 0 {
        // The byte bucket is denominated in bytes per second.
        let byte_rate = bps_limit / 8;
        if !consume_global(&mut core.global_bps, byte_rate, pkt.pkt_len as u64, ctx.now_ns) {
            ctx.stats.bump(&ctx.stats.rate_limited);
            return StageVerdict::Drop(DropReason::RateLimit);
        }
    }

    StageVerdict::Pass
}

fn consume_global(bucket: &mut TokenBucket, rate: u64, cost: u64, now_ns: u64) -> bool {
    let burst = rate.saturating_mul(2);
    if bucket.rate_pps == 0 {
        // First configured use; start full.
        *bucket = TokenBucket::full(rate, burst, now_ns);
    } else {
        bucket.set_rate(rate, burst);
    }
    bucket.try_consume(now_ns, cost)
}
