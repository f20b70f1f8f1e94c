#![warn(missing_debug_implementations, rust_2018_idioms)]

//! Encode and decode IPv4 datagrams carrying ICMP Echo messages.
//!
//! Packets are owned values. [`ipv4::Ipv4Packet`] is generic over any
//! [`Payload`], and [`icmpv4::Icmpv4Echo`] is the payload for Echo Request
//! and Echo Reply messages. Lengths and checksums are computed from the
//! field values whenever they are read, so they are never stale.
//!
//! ```
//! use echopkt::icmpv4::Icmpv4Echo;
//! use echopkt::ipv4::{Ipv4Addr, Ipv4Packet};
//!
//! let mut echo = Icmpv4Echo::request(0x1234, 1);
//! echo.set_data(b"ping".to_vec());
//!
//! let mut pkt = Ipv4Packet::new(echo);
//! pkt.set_src_addr(Ipv4Addr::new(192, 168, 0, 214));
//! pkt.set_dst_addr(Ipv4Addr::new(142, 250, 180, 14));
//!
//! let bytes = pkt.to_bytes();
//! assert_eq!(bytes.len(), 32);
//!
//! let parsed = Ipv4Packet::<Icmpv4Echo>::parse_strict(&bytes).unwrap();
//! assert_eq!(parsed.payload().ident(), 0x1234);
//! assert_eq!(parsed.payload().data(), b"ping");
//! ```

#[macro_use]
mod macros;

mod error;
pub use error::{Error, Result};

mod traits;
pub use traits::Payload;

pub mod checksum_utils;

pub mod icmpv4;
pub mod ipv4;
