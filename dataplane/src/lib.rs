//! PacketShield data plane.
//!
//! A line-rate IPv4 packet-scrubbing pipeline that sits in front of
//! protected servers and decides, per inbound frame, whether to forward,
//! drop, or answer with a crafted reply:
//! - Parser: Ethernet -> VLAN stripping -> IPv4 -> TCP/UDP/ICMP into a
//!   bounds-checked [`PacketContext`]
//! - Verdict stages: ACL, threat intel, GeoIP, reputation, fragment,
//!   signature fingerprint, payload patterns, deep protocol validation,
//!   SYN/ACK/UDP/ICMP flood mitigation, per-source and aggregate rate
//!   limits, conntrack
//! - SYN-cookie challenge/response with in-place SYN-ACK reflection
//!
//! The crate owns no I/O. Host glue feeds raw frames into
//! [`Worker::process`] and maps the returned [`Verdict`] onto its own
//! forward/discard/reflect actions; the control plane drives a
//! [`ControlHandle`]; a telemetry collector drains [`Engine::poll_event`]
//! and scrapes [`Engine::stats`].
//!
//! # Example
//!
//! ```
//! use packetshield_dataplane::{ConfigKey, Engine, EngineConfig, Verdict};
//!
//! let engine = Engine::new(EngineConfig::default());
//! let control = engine.control();
//! control.set_config(ConfigKey::Enabled, 1);
//!
//! let mut worker = engine.worker(0);
//!
//! // Ethernet/IPv4/TCP SYN, 10.0.0.1:12345 -> 192.168.1.1:80
//! let mut frame = Vec::new();
//! frame.extend_from_slice(&[0x22; 6]);
//! frame.extend_from_slice(&[0x11; 6]);
//! frame.extend_from_slice(&0x0800u16.to_be_bytes());
//! let mut ip = [0u8; 20];
//! ip[0] = 0x45;
//! ip[2..4].copy_from_slice(&40u16.to_be_bytes());
//! ip[8] = 64;
//! ip[9] = 6;
//! ip[12..16].copy_from_slice(&[10, 0, 0, 1]);
//! ip[16..20].copy_from_slice(&[192, 168, 1, 1]);
//! frame.extend_from_slice(&ip);
//! let mut tcp = [0u8; 20];
//! tcp[0..2].copy_from_slice(&12345u16.to_be_bytes());
//! tcp[2..4].copy_from_slice(&80u16.to_be_bytes());
//! tcp[12] = 5 << 4;
//! tcp[13] = 0x02; // SYN
//! frame.extend_from_slice(&tcp);
//!
//! assert_eq!(worker.process(&mut frame, 1_000), Verdict::Pass);
//! ```

pub mod config;
pub mod control;
pub mod cookie;
pub mod engine;
pub mod error;
pub mod events;
pub mod frame;
pub mod parser;
pub mod stats;
pub mod tables;
pub mod verdict;

mod stages;

pub use config::{ConfigKey, ConfigStore, DnsValidationMode, EscalationLevel, CONFIG_SLOTS};
pub use control::ControlHandle;
pub use cookie::SynCookieSeeds;
pub use engine::{Engine, EngineConfig, Worker};
pub use error::ControlError;
pub use events::{EventAction, EventRecord, EventRing};
pub use frame::{FrameMut, FrameView};
pub use parser::{parse, PacketContext, ParseError};
pub use stats::{CoreStats, StatsSnapshot};
pub use tables::{
    conn_flags, country_code, proto_bits, AttackSignature, ConnEntry, ConnKey, ConnState,
    ConntrackTable, Direction, GeoAction, GeoEntry, Ipv4LpmTable, PayloadAction, PayloadRule,
    PayloadRuleTable, SignatureTable, ThreatAction, ThreatCategory, ThreatFeed, ThreatIntelEntry,
    TokenBucket, MAX_PAYLOAD_RULES, MAX_SIGNATURES,
};
pub use verdict::{AttackType, DropReason, Verdict};
