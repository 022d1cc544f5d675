//! Conntrack update: the stage that closes the pipeline.
//!
//! Informational only, never drops. Records the packet against its flow,
//! advances the TCP state machine, promotes UDP/ICMP flows to ESTABLISHED
//! on the first reverse-direction packet, and creates NEW entries for
//! unseen flows.

use super::StageCtx;
use crate::config::ConfigKey;
use crate::engine::CoreTables;
use crate::parser::PacketContext;
use crate::tables::{conn_flags, ConnEntry, ConnKey, ConnState, Direction};

pub(crate) fn update(
    ctx: &StageCtx<'_>,
    core: &mut CoreTables,
    pkt: &PacketContext,
    whitelisted: bool,
) {
    if !ctx.config().is_enabled(ConfigKey::ConntrackEnable) {
        return;
    }

    let key = ConnKey::from_packet(pkt);

    if let Some((entry, direction)) = core.conntrack.get_direction_mut(&key) {
        entry.record(direction, ctx.now_ns, pkt.pkt_len);

        if pkt.is_tcp() {
            entry.advance_tcp_state(pkt.tcp_flags, direction);
        } else if direction == Direction::Reverse && entry.state == ConnState::New {
            // Bidirectional UDP/ICMP traffic counts as established.
            entry.state = ConnState::Established;
            ctx.stats.bump(&ctx.stats.conntrack_established);
        }

        if whitelisted {
            entry.flags |= conn_flags::WHITELISTED;
        }
        return;
    }

    let mut entry = ConnEntry::new(ctx.now_ns, pkt.pkt_len);
    if whitelisted {
        entry.flags |= conn_flags::WHITELISTED;
    }
    if core.conntrack.insert_if_absent(key, entry) {
        ctx.stats.bump(&ctx.stats.conntrack_new);
    }
}
