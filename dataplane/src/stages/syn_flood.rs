//! SYN-flood mitigation via SYN cookies.
//!
//! An incoming pure SYN never reaches the protected server: the inbound
//! frame is rewritten in place into a SYN-ACK whose initial sequence
//! number is the cookie, and reflected back with a `Tx` verdict. A pure
//! ACK answering such a challenge validates against the current or
//! previous seed and installs an ESTABLISHED conntrack entry; an ACK that
//! matches neither seed and no tracked flow is the flood itself.

use super::{reputation, StageCtx, StageVerdict};
use crate::config::ConfigKey;
use crate::cookie;
use crate::engine::CoreTables;
use crate::frame::{FrameMut, FrameView};
use crate::parser::{PacketContext, TCP_FLAG_ACK, TCP_FLAG_SYN};
use crate::tables::reputation::REP_WEIGHT_SYN_NO_ACK;
use crate::tables::{ConnEntry, ConnKey, ConnState};
use crate::verdict::{AttackType, DropReason};

/// Window advertised in the reflected SYN-ACK.
const SYN_ACK_WINDOW: u16 = 65535;
/// TTL stamped onto the reflected SYN-ACK.
const SYN_ACK_TTL: u8 = 64;

pub(crate) fn check(
    ctx: &StageCtx<'_>,
    core: &mut CoreTables,
    pkt: &PacketContext,
    frame: &mut [u8],
) -> StageVerdict {
    if !pkt.is_tcp() || pkt.l4_offset.is_none() {
        return StageVerdict::Pass;
    }
    if !ctx.config().is_enabled(ConfigKey::SynCookieEnable) {
        return StageVerdict::Pass;
    }

    match pkt.tcp_flags & (TCP_FLAG_SYN | TCP_FLAG_ACK) {
        TCP_FLAG_SYN => handle_syn(ctx, pkt, frame),
        TCP_FLAG_ACK => handle_ack(ctx, core, pkt),
        _ => StageVerdict::Pass,
    }
}

fn handle_syn(ctx: &StageCtx<'_>, pkt: &PacketContext, frame: &mut [u8]) -> StageVerdict {
    let seeds = **ctx.shared.syn_cookie.load();
    let mss_index = cookie::mss_to_index(1460);
    let cookie = cookie::generate(
        seeds.current,
        pkt.src_ip,
        pkt.dst_ip,
        pkt.src_port,
        pkt.dst_port,
        mss_index,
    );

    if !rewrite_as_syn_ack(frame, pkt, cookie) {
        // A frame the parser accepted always has room for the rewrite;
        // refuse to reflect rather than transmit a half-built reply.
        return StageVerdict::Pass;
    }

    ctx.stats.bump(&ctx.stats.syn_cookies_sent);
    StageVerdict::Tx
}

fn handle_ack(ctx: &StageCtx<'_>, core: &mut CoreTables, pkt: &PacketContext) -> StageVerdict {
    let key = ConnKey::from_packet(pkt);
    let tracked_state = core.conntrack.get_mut(&key).map(|entry| entry.state);

    // Established flows are the common case; nothing to prove.
    if matches!(tracked_state, Some(state) if state >= ConnState::Established) {
        return StageVerdict::Pass;
    }

    let seeds = **ctx.shared.syn_cookie.load();
    if cookie::validate(
        &seeds,
        pkt.src_ip,
        pkt.dst_ip,
        pkt.src_port,
        pkt.dst_port,
        pkt.tcp_ack_seq,
    ) {
        core.conntrack.insert(
            key,
            ConnEntry::established_via_cookie(ctx.now_ns, pkt.pkt_len),
        );
        ctx.stats.bump(&ctx.stats.syn_cookies_validated);
        return StageVerdict::Pass;
    }

    if tracked_state.is_none() {
        // No flow and no valid cookie: this ACK answers nothing.
        ctx.stats.bump(&ctx.stats.syn_cookies_failed);
        reputation::penalize(ctx, core, pkt.src_ip, REP_WEIGHT_SYN_NO_ACK);
        ctx.emit_drop(pkt, AttackType::SynFlood, DropReason::SynFlood);
        return StageVerdict::Drop(DropReason::SynFlood);
    }

    StageVerdict::Pass
}

/// Rewrite the inbound SYN in place into the SYN-ACK challenge.
///
/// Every write re-validates its byte range; on any failure the frame may
/// be partially rewritten but is not transmitted.
fn rewrite_as_syn_ack(frame: &mut [u8], pkt: &PacketContext, cookie: u32) -> bool {
    let l3 = pkt.l3_offset;
    let Some(l4) = pkt.l4_offset else {
        return false;
    };

    let mut f = FrameMut::new(frame);

    // L2: reply to the sender.
    if !f.swap_ranges(0, 6, 6) {
        return false;
    }

    // L3: swap addresses, fresh id and TTL.
    let ok = f.swap_ranges(l3 + 12, l3 + 16, 4)
        && f.write_u16(l3 + 4, 0)
        && f.write_u8(l3 + 8, SYN_ACK_TTL);
    if !ok {
        return false;
    }

    // L4: swap ports, acknowledge the client ISN, answer with the cookie.
    let ok = f.swap_ranges(l4, l4 + 2, 2)
        && f.write_u32(l4 + 8, pkt.tcp_seq.wrapping_add(1))
        && f.write_u32(l4 + 4, cookie)
        && f.write_u8(l4 + 13, TCP_FLAG_SYN | TCP_FLAG_ACK)
        && f.write_u16(l4 + 14, SYN_ACK_WINDOW)
        // TCP checksum is left to hardware offload.
        && f.write_u16(l4 + 16, 0);
    if !ok {
        return false;
    }

    // IP header checksum over the 20-byte header.
    if !f.write_u16(l3 + 10, 0) {
        return false;
    }
    let checksum = ipv4_header_checksum(&f.as_view(), l3);
    f.write_u16(l3 + 10, checksum)
}

/// Internet checksum over the 20-byte IPv4 header at `l3`.
pub(crate) fn ipv4_header_checksum(view: &FrameView<'_>, l3: usize) -> u16 {
    let mut sum: u32 = 0;
    for i in 0..10 {
        sum += view.read_u16(l3 + i * 2).unwrap_or(0) as u32;
    }
    while sum >> 16 != 0 {
        sum = (sum & 0xffff) + (sum >> 16);
    }
    !(sum as u16)
}
