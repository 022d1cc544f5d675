//! Shared data structures read and mutated by the verdict stages.
//!
//! Two families live here: control-plane-published snapshots (LPM tries,
//! signature/payload/policy tables) that the data path only reads, and
//! per-core LRU shards (conntrack, rate limiters, reputation, port-scan)
//! that each worker owns outright.

pub mod conntrack;
pub mod lpm;
pub mod payload;
pub mod policy;
pub mod reputation;
pub mod signature;
pub mod token_bucket;

pub use conntrack::{conn_flags, ConnEntry, ConnKey, ConnState, ConntrackTable, Direction};
pub use lpm::Ipv4LpmTable;
pub use payload::{PayloadAction, PayloadRule, PayloadRuleTable, MAX_PAYLOAD_RULES};
pub use policy::{
    country_code, proto_bits, GeoAction, GeoEntry, ThreatAction, ThreatCategory, ThreatFeed,
    ThreatIntelEntry,
};
pub use reputation::{PortScanTable, ReputationEntry, ReputationTable};
pub use signature::{AttackSignature, SignatureTable, MAX_SIGNATURES};
pub use token_bucket::TokenBucket;
