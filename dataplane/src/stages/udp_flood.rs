//! UDP flood and amplification detection.
//!
//! Keyed by *source* port: a large payload arriving from a reflector
//! service's port is an amplification response. Per-service size
//! thresholds follow the response shapes of each protocol; additional
//! amp-sensitive ports come from the port-protocol registration map.

use super::{StageCtx, StageVerdict};
use crate::parser::PacketContext;
use crate::verdict::{AttackType, DropReason};

const PORT_DNS: u16 = 53;
const PORT_NTP: u16 = 123;
const PORT_SSDP: u16 = 1900;
const PORT_MEMCACHED: u16 = 11211;
const PORT_CHARGEN: u16 = 19;
const PORT_CLDAP: u16 = 389;
const PORT_SNMP: u16 = 161;

/// Amplification response size thresholds (payload bytes).
const DNS_AMP_THRESHOLD: u16 = 512;
const NTP_AMP_THRESHOLD: u16 = 468;
const SSDP_AMP_THRESHOLD: u16 = 256;
const MEMCACHED_AMP_THRESHOLD: u16 = 1400;
const GENERIC_AMP_THRESHOLD: u16 = 256;
const REGISTERED_AMP_THRESHOLD: u16 = 512;

pub(crate) fn check(ctx: &StageCtx<'_>, pkt: &PacketContext) -> StageVerdict {
    if !pkt.is_udp() {
        return StageVerdict::Pass;
    }

    let payload_len = pkt.payload_len;

    match pkt.src_port {
        PORT_DNS if payload_len > DNS_AMP_THRESHOLD => {
            ctx.stats.bump(&ctx.stats.dns_amp_dropped);
            ctx.emit_drop(pkt, AttackType::DnsAmplification, DropReason::DnsAmplification);
            StageVerdict::Drop(DropReason::DnsAmplification)
        }
        PORT_NTP if payload_len > NTP_AMP_THRESHOLD => {
            ctx.stats.bump(&ctx.stats.ntp_amp_dropped);
            ctx.emit_drop(pkt, AttackType::NtpAmplification, DropReason::NtpAmplification);
            StageVerdict::Drop(DropReason::NtpAmplification)
        }
        PORT_SSDP if payload_len > SSDP_AMP_THRESHOLD => {
            ctx.stats.bump(&ctx.stats.ssdp_amp_dropped);
            ctx.emit_drop(pkt, AttackType::SsdpAmplification, DropReason::SsdpAmplification);
            StageVerdict::Drop(DropReason::SsdpAmplification)
        }
        PORT_MEMCACHED if payload_len > MEMCACHED_AMP_THRESHOLD => {
            ctx.stats.bump(&ctx.stats.memcached_amp_dropped);
            ctx.emit_drop(
                pkt,
                AttackType::MemcachedAmplification,
                DropReason::MemcachedAmplification,
            );
            StageVerdict::Drop(DropReason::MemcachedAmplification)
        }
        PORT_CHARGEN | PORT_CLDAP | PORT_SNMP if payload_len > GENERIC_AMP_THRESHOLD => {
            drop_udp_flood(ctx, pkt)
        }
        src_port => {
            // Operator-registered amp-sensitive services.
            let registered = ctx
                .shared
                .port_protocols
                .load()
                .get(&src_port)
                .copied()
                .unwrap_or(0);
            if registered != 0 && payload_len > REGISTERED_AMP_THRESHOLD {
                return drop_udp_flood(ctx, pkt);
            }
            StageVerdict::Pass
        }
    }
}

fn drop_udp_flood(ctx: &StageCtx<'_>, pkt: &PacketContext) -> StageVerdict {
    ctx.stats.bump(&ctx.stats.udp_flood_dropped);
    ctx.emit_drop(pkt, AttackType::UdpFlood, DropReason::UdpFlood);
    StageVerdict::Drop(DropReason::UdpFlood)
}
