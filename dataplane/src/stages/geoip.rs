//! GeoIP country filtering.
//!
//! The LPM lookup resolves the source prefix to a country; the
//! per-country policy map decides what happens. Prefixes without a policy
//! fall back to the action the feed attached to the prefix itself. At
//! CRITICAL escalation, unknown origins and countries without an explicit
//! policy are dropped outright.

use super::{install_adaptive_override, StageCtx, StageVerdict};
use crate::config::{ConfigKey, EscalationLevel};
use crate::events::{EventAction, EventRecord};
use crate::parser::PacketContext;
use crate::tables::GeoAction;
use crate::verdict::{AttackType, DropReason};

/// Divisor applied to the protocol base rate for rate-limited countries.
const GEOIP_RATE_DIVISOR: u64 = 2;

pub(crate) fn check(ctx: &StageCtx<'_>, pkt: &PacketContext) -> StageVerdict {
    if !ctx.config().is_enabled(ConfigKey::GeoIpEnable) {
        return StageVerdict::Pass;
    }

    let critical = ctx.escalation() >= EscalationLevel::Critical;

    let geoip = ctx.shared.geoip.load();
    let Some(geo) = geoip.lookup(pkt.src_ip) else {
        // No country mapping at all; hostile by assumption only under
        // full escalation.
        if critical {
            return drop_geoip(ctx, pkt, 0);
        }
        return StageVerdict::Pass;
    };

    let action = match ctx.shared.country_policy.load().get(&geo.country) {
        Some(action) => *action,
        None if critical => return drop_geoip(ctx, pkt, geo.country),
        None => geo.action,
    };

    match action {
        GeoAction::Drop => drop_geoip(ctx, pkt, geo.country),
        GeoAction::RateLimit => {
            install_adaptive_override(ctx, pkt, GEOIP_RATE_DIVISOR);
            StageVerdict::Pass
        }
        GeoAction::Monitor => {
            let mut event = EventRecord::for_packet(
                pkt,
                ctx.now_ns,
                AttackType::GeoIpBlock,
                EventAction::Pass,
                None,
                ctx.escalation(),
            );
            event.country_code = geo.country;
            ctx.emit(event);
            StageVerdict::Pass
        }
        GeoAction::Pass => StageVerdict::Pass,
    }
}

fn drop_geoip(ctx: &StageCtx<'_>, pkt: &PacketContext, country: u16) -> StageVerdict {
    ctx.stats.bump(&ctx.stats.geoip_dropped);
    let mut event = ctx.drop_event(pkt, AttackType::GeoIpBlock, DropReason::GeoIp);
    event.country_code = country;
    ctx.emit(event);
    StageVerdict::Drop(DropReason::GeoIp)
}
