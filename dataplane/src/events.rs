//! Telemetry events.
//!
//! Stages emit one [`EventRecord`] per drop (and per monitor match) into a
//! bounded lock-free ring. The push never blocks: when the collector falls
//! behind and the ring fills, records are silently discarded.

use std::net::Ipv4Addr;

use crossbeam::queue::ArrayQueue;
use serde::Serialize;

use crate::config::EscalationLevel;
use crate::parser::PacketContext;
use crate::verdict::{AttackType, DropReason};

/// Whether the event describes a passed (monitor) or dropped packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EventAction {
    Pass,
    Drop,
}

/// One telemetry record, drained by the event collector.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventRecord {
    pub timestamp_ns: u64,
    pub src_ip: Ipv4Addr,
    pub dst_ip: Ipv4Addr,
    pub src_port: u16,
    pub dst_port: u16,
    pub protocol: u8,
    pub attack_type: AttackType,
    pub action: EventAction,
    pub drop_reason: Option<DropReason>,
    /// Flow-rate estimates; currently always zero, reserved for forward
    /// compatibility.
    pub pps_estimate: u64,
    pub bps_estimate: u64,
    /// Source reputation score at emission time, when the emitting stage
    /// knows it.
    pub reputation_score: u32,
    /// Packed two-letter country code, zero when unknown.
    pub country_code: u16,
    pub escalation_level: EscalationLevel,
}

impl EventRecord {
    /// Build a record from a parsed packet; the stage fills in any extra
    /// context (reputation score, country) it has on hand.
    pub(crate) fn for_packet(
        pkt: &PacketContext,
        now_ns: u64,
        attack_type: AttackType,
        action: EventAction,
        drop_reason: Option<DropReason>,
        escalation_level: EscalationLevel,
    ) -> Self {
        Self {
            timestamp_ns: now_ns,
            src_ip: pkt.src_ip,
            dst_ip: pkt.dst_ip,
            src_port: pkt.src_port,
            dst_port: pkt.dst_port,
            protocol: pkt.ip_proto,
            attack_type,
            action,
            drop_reason,
            pps_estimate: 0,
            bps_estimate: 0,
            reputation_score: 0,
            country_code: 0,
            escalation_level,
        }
    }
}

/// Bounded event ring between the workers and the telemetry collector.
#[derive(Debug)]
pub struct EventRing {
    queue: ArrayQueue<EventRecord>,
}

impl EventRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: ArrayQueue::new(capacity.max(1)),
        }
    }

    /// Non-blocking publish; a full ring drops the record on the floor.
    pub(crate) fn emit(&self, record: EventRecord) {
        let _ = self.queue.push(record);
    }

    /// Drain one record; collectors call this in a loop.
    pub fn pop(&self) -> Option<EventRecord> {
        self.queue.pop()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }
}
