//! ICMPv4 Echo Request and Echo Reply messages.

enum_sim! {
    /// An enum-like type for the ICMPv4 message type field.
    pub struct IcmpType (u8) {
        /// Echo Reply.
        ECHO_REPLY = 0,

        /// Echo Request.
        ECHO_REQUEST = 8,
    }
}

/// Byte length of the fixed ICMPv4 echo header.
pub const ICMPV4_HEADER_LEN: usize = 8;

mod timestamp;
pub use timestamp::{EchoTimestamp, ECHO_TIMESTAMP_LEN, MAX_MICROS, UNIX_EPOCH_YEAR};

mod echo;
pub use echo::Icmpv4Echo;
