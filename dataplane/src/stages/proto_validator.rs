//! Deep protocol validation.
//!
//! Application-layer inspection for the protocols attackers reflect off:
//! DNS, NTP, SSDP and memcached, plus TCP state-machine validation for
//! everything with a conntrack entry. Dispatch is by destination port,
//! with the port-protocol registration map covering services on
//! non-well-known ports.

use super::{reputation, StageCtx, StageVerdict};
use crate::config::{ConfigKey, DnsValidationMode, EscalationLevel};
use crate::engine::CoreTables;
use crate::frame::FrameView;
use crate::parser::{PacketContext, TCP_FLAG_ACK, TCP_FLAG_RST, TCP_FLAG_SYN};
use crate::tables::policy::proto_bits;
use crate::tables::reputation::REP_WEIGHT_PROTO_ANOMALY;
use crate::tables::{ConnKey, ConnState};
use crate::verdict::{AttackType, DropReason};

const PORT_DNS: u16 = 53;
const PORT_NTP: u16 = 123;
const PORT_SSDP: u16 = 1900;
const PORT_MEMCACHED: u16 = 11211;

/// DNS responses with more answers than this are reflection shrapnel.
const DNS_AMP_ANCOUNT_LIMIT: u16 = 10;
/// RFC 1035 maximum UDP DNS payload without EDNS.
const DNS_MAX_NON_EDNS: u16 = 512;
const DNS_HDR_LEN: usize = 12;

const NTP_MODE_CLIENT: u8 = 3;
const NTP_MODE_SERVER: u8 = 4;
const NTP_MODE_CONTROL: u8 = 6;
const NTP_MODE_PRIVATE: u8 = 7;
const NTP_MIN_LEN: u16 = 48;

/// Tolerated TCP state violations before the drop, outside strict mode.
const TCP_VIOLATION_LIMIT: u8 = 3;
/// Sequence numbers further than this from the expected value count as a
/// violation.
const TCP_SEQ_WINDOW: u32 = 1 << 30;

pub(crate) fn check(
    ctx: &StageCtx<'_>,
    core: &mut CoreTables,
    pkt: &PacketContext,
    frame: &FrameView<'_>,
) -> StageVerdict {
    if !ctx.config().is_enabled(ConfigKey::ProtoValidationEnable) {
        return StageVerdict::Pass;
    }

    if pkt.is_tcp() {
        return tcp_state_validate(ctx, core, pkt);
    }

    if pkt.is_udp() {
        match pkt.dst_port {
            PORT_DNS => {
                let mode = ctx.config().dns_mode();
                if mode > DnsValidationMode::Off {
                    return dns_validate(ctx, core, pkt, frame, mode);
                }
            }
            PORT_NTP => return ntp_validate(ctx, core, pkt, frame),
            PORT_SSDP => return ssdp_validate(ctx, core, pkt, frame),
            PORT_MEMCACHED => return memcached_validate(ctx, core, pkt),
            other => {
                // Registered services on non-well-known ports.
                let registered = ctx
                    .shared
                    .port_protocols
                    .load()
                    .get(&other)
                    .copied()
                    .unwrap_or(0);
                if registered & proto_bits::DNS != 0 {
                    let mode = ctx.config().dns_mode();
                    if mode > DnsValidationMode::Off {
                        return dns_validate(ctx, core, pkt, frame, mode);
                    }
                } else if registered & proto_bits::NTP != 0 {
                    return ntp_validate(ctx, core, pkt, frame);
                } else if registered & proto_bits::SSDP != 0 {
                    return ssdp_validate(ctx, core, pkt, frame);
                } else if registered & proto_bits::MEMCACHED != 0 {
                    return memcached_validate(ctx, core, pkt);
                }
            }
        }
    }

    StageVerdict::Pass
}

// ============================================================================
// DNS
// ============================================================================

fn dns_validate(
    ctx: &StageCtx<'_>,
    core: &mut CoreTables,
    pkt: &PacketContext,
    frame: &FrameView<'_>,
    mode: DnsValidationMode,
) -> StageVerdict {
    let Some(payload_offset) = pkt.payload_offset else {
        return StageVerdict::Pass;
    };
    if frame.slice(payload_offset, DNS_HDR_LEN).is_none() {
        // Too short to be DNS; let the flood stages decide.
        return StageVerdict::Pass;
    }

    let flags = frame.read_u16(payload_offset + 2).unwrap_or(0);
    let qdcount = frame.read_u16(payload_offset + 4).unwrap_or(0);
    let ancount = frame.read_u16(payload_offset + 6).unwrap_or(0);
    let is_response = flags & 0x8000 != 0;

    // Reflected responses with stacked answers are amplification.
    if is_response && ancount > DNS_AMP_ANCOUNT_LIMIT {
        ctx.stats.bump(&ctx.stats.dns_queries_blocked);
        ctx.stats.bump(&ctx.stats.proto_violation_dropped);
        reputation::penalize(ctx, core, pkt.src_ip, REP_WEIGHT_PROTO_ANOMALY);
        ctx.emit_drop(pkt, AttackType::DnsAmplification, DropReason::DnsAmplification);
        return StageVerdict::Drop(DropReason::DnsAmplification);
    }

    if mode >= DnsValidationMode::Strict && !is_response {
        let opcode = (flags >> 11) & 0x0F;
        let malformed =
            qdcount != 1 || opcode != 0 || pkt.payload_len > DNS_MAX_NON_EDNS;
        if malformed {
            ctx.stats.bump(&ctx.stats.dns_queries_blocked);
            ctx.stats.bump(&ctx.stats.proto_violation_dropped);
            reputation::penalize(ctx, core, pkt.src_ip, REP_WEIGHT_PROTO_ANOMALY);
            ctx.emit_drop(pkt, AttackType::ProtocolViolation, DropReason::ProtocolInvalid);
            return StageVerdict::Drop(DropReason::ProtocolInvalid);
        }
    }

    ctx.stats.bump(&ctx.stats.dns_queries_validated);
    StageVerdict::Pass
}

// ============================================================================
// NTP
// ============================================================================

fn ntp_validate(
    ctx: &StageCtx<'_>,
    core: &mut CoreTables,
    pkt: &PacketContext,
    frame: &FrameView<'_>,
) -> StageVerdict {
    let Some(payload_offset) = pkt.payload_offset else {
        return StageVerdict::Pass;
    };
    let Some(first_byte) = frame.read_u8(payload_offset) else {
        return StageVerdict::Pass;
    };
    let mode = first_byte & 0x07;

    // Mode 7 (monlist) is the amplification workhorse; never legitimate
    // at an internet-facing scrubber.
    if mode == NTP_MODE_PRIVATE {
        return drop_ntp_amp(ctx, core, pkt);
    }

    // Mode 6 (control) only inside an established exchange.
    if mode == NTP_MODE_CONTROL {
        let key = ConnKey::from_packet(pkt);
        let established = core
            .conntrack
            .get_direction_mut(&key)
            .map(|(entry, _)| entry.state >= ConnState::Established)
            .unwrap_or(false);
        if !established {
            return drop_ntp_amp(ctx, core, pkt);
        }
    }

    if (mode == NTP_MODE_CLIENT || mode == NTP_MODE_SERVER) && pkt.payload_len < NTP_MIN_LEN {
        ctx.stats.bump(&ctx.stats.proto_violation_dropped);
        reputation::penalize(ctx, core, pkt.src_ip, REP_WEIGHT_PROTO_ANOMALY);
        ctx.emit_drop(pkt, AttackType::ProtocolViolation, DropReason::ProtocolInvalid);
        return StageVerdict::Drop(DropReason::ProtocolInvalid);
    }

    StageVerdict::Pass
}

fn drop_ntp_amp(ctx: &StageCtx<'_>, core: &mut CoreTables, pkt: &PacketContext) -> StageVerdict {
    ctx.stats.bump(&ctx.stats.ntp_monlist_blocked);
    ctx.stats.bump(&ctx.stats.proto_violation_dropped);
    reputation::penalize(ctx, core, pkt.src_ip, REP_WEIGHT_PROTO_ANOMALY);
    ctx.emit_drop(pkt, AttackType::NtpAmplification, DropReason::NtpAmplification);
    StageVerdict::Drop(DropReason::NtpAmplification)
}

// ============================================================================
// SSDP
// ============================================================================

fn ssdp_validate(
    ctx: &StageCtx<'_>,
    core: &mut CoreTables,
    pkt: &PacketContext,
    frame: &FrameView<'_>,
) -> StageVerdict {
    let Some(payload_offset) = pkt.payload_offset else {
        return StageVerdict::Pass;
    };
    let Some(head) = frame.slice(payload_offset, 8) else {
        return StageVerdict::Pass;
    };

    // Reflected-response shapes; these never arrive unsolicited.
    let is_http_response = head == &b"HTTP/1.1"[..];
    let is_notify = &head[..6] == &b"NOTIFY"[..];

    if is_http_response || is_notify {
        ctx.stats.bump(&ctx.stats.ssdp_amp_dropped);
        ctx.stats.bump(&ctx.stats.proto_violation_dropped);
        reputation::penalize(ctx, core, pkt.src_ip, REP_WEIGHT_PROTO_ANOMALY);
        ctx.emit_drop(pkt, AttackType::SsdpAmplification, DropReason::SsdpAmplification);
        return StageVerdict::Drop(DropReason::SsdpAmplification);
    }

    StageVerdict::Pass
}

// ============================================================================
// Memcached
// ============================================================================

fn memcached_validate(
    ctx: &StageCtx<'_>,
    core: &mut CoreTables,
    pkt: &PacketContext,
) -> StageVerdict {
    // UDP memcached must never traverse an internet-facing scrubber.
    ctx.stats.bump(&ctx.stats.memcached_amp_dropped);
    ctx.stats.bump(&ctx.stats.proto_violation_dropped);
    reputation::penalize(ctx, core, pkt.src_ip, REP_WEIGHT_PROTO_ANOMALY);
    ctx.emit_drop(
        pkt,
        AttackType::MemcachedAmplification,
        DropReason::MemcachedAmplification,
    );
    StageVerdict::Drop(DropReason::MemcachedAmplification)
}

// ============================================================================
// TCP State Machine
// ============================================================================

fn tcp_state_validate(
    ctx: &StageCtx<'_>,
    core: &mut CoreTables,
    pkt: &PacketContext,
) -> StageVerdict {
    if !ctx.config().is_enabled(ConfigKey::TcpStateEnable) {
        return StageVerdict::Pass;
    }
    if pkt.l4_offset.is_none() {
        return StageVerdict::Pass;
    }

    let flags = pkt.tcp_flags;
    let strict = ctx.escalation() >= EscalationLevel::High;
    let violation_limit = if strict { 1 } else { TCP_VIOLATION_LIMIT };

    // `(violation, exceeded)` computed in a scope so the entry borrow is
    // released before any penalty bookkeeping.
    let key = ConnKey::from_packet(pkt);
    let tracked = core.conntrack.get_mut(&key).map(|entry| {
        let mut violation = match entry.state {
            ConnState::New => flags & (TCP_FLAG_SYN | TCP_FLAG_ACK) != TCP_FLAG_SYN,
            ConnState::SynSent => {
                flags & (TCP_FLAG_SYN | TCP_FLAG_ACK) != (TCP_FLAG_SYN | TCP_FLAG_ACK)
                    && flags & TCP_FLAG_RST == 0
            }
            ConnState::SynRecv => {
                (flags & TCP_FLAG_ACK == 0 && flags & TCP_FLAG_RST == 0)
                    || (flags & TCP_FLAG_SYN != 0 && flags & TCP_FLAG_ACK == 0)
            }
            ConnState::Established => flags & TCP_FLAG_SYN != 0 && flags & TCP_FLAG_ACK == 0,
            ConnState::FinWait => flags & TCP_FLAG_SYN != 0,
            ConnState::Closed | ConnState::TimeWait => flags & TCP_FLAG_RST == 0,
            ConnState::Rst => false,
        };

        // Wildly out-of-window sequence numbers count as violations too.
        if !violation && entry.state >= ConnState::Established && entry.seq_expected != 0 {
            let diff = pkt.tcp_seq.wrapping_sub(entry.seq_expected);
            if diff > TCP_SEQ_WINDOW && diff < 0u32.wrapping_sub(TCP_SEQ_WINDOW) {
                violation = true;
            }
        }

        let exceeded = if violation {
            entry.violation_count = entry.violation_count.saturating_add(1);
            entry.violation_count > violation_limit
        } else {
            false
        };
        (violation, exceeded)
    });

    match tracked {
        None => {
            // Without an entry only a fresh SYN or a lone RST is
            // acceptable.
            if flags & (TCP_FLAG_SYN | TCP_FLAG_ACK) == TCP_FLAG_SYN || flags & TCP_FLAG_RST != 0
            {
                return StageVerdict::Pass;
            }
            ctx.stats.bump(&ctx.stats.tcp_state_violations);
            drop_tcp_state(ctx, core, pkt)
        }
        Some((violation, exceeded)) => {
            if violation {
                ctx.stats.bump(&ctx.stats.tcp_state_violations);
            }
            if exceeded {
                return drop_tcp_state(ctx, core, pkt);
            }
            StageVerdict::Pass
        }
    }
}

fn drop_tcp_state(ctx: &StageCtx<'_>, core: &mut CoreTables, pkt: &PacketContext) -> StageVerdict {
    ctx.stats.bump(&ctx.stats.tcp_state_dropped);
    ctx.stats.bump(&ctx.stats.proto_violation_dropped);
    reputation::penalize(ctx, core, pkt.src_ip, REP_WEIGHT_PROTO_ANOMALY);
    ctx.emit_drop(pkt, AttackType::ProtocolViolation, DropReason::TcpState);
    StageVerdict::Drop(DropReason::TcpState)
}
