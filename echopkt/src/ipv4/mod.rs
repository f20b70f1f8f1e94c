//! IPv4 protocol.

pub use std::net::Ipv4Addr;

enum_sim! {
    /// An enum-like type for representing the protocol carried by an IPv4 datagram.
    pub struct IpProtocol (u8) {
        /// IP packet payload is ICMP protocol.
        ICMP = 1,

        /// IP packet payload is TCP protocol.
        TCP = 6,

        /// IP packet payload is UDP protocol.
        UDP =  17,
    }
}

mod packet;
pub use packet::{Ipv4Packet, DEFAULT_TTL, IPV4_HEADER_LEN, IPV4_OPTIONS_LEN_MAX};
