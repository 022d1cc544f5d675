//! PacketShield data-plane test library.
//!
//! Packet-generation builders and helpers for driving crafted frames
//! through the verdict pipeline in userspace tests.

pub mod packet_generator;

// Re-export commonly used items
pub use packet_generator::*;
