use bytes::BufMut;

use crate::ipv4::IpProtocol;
use crate::Result;

/// A protocol message that can be carried inside an [`Ipv4Packet`].
///
/// Implementors are owned values. `decode` builds a complete value from the
/// payload region of a datagram, and `encode_to` writes exactly
/// `encoded_len()` bytes without touching `self`.
///
/// [`Ipv4Packet`]: crate::ipv4::Ipv4Packet
pub trait Payload: Sized {
    /// The IP protocol number announced in the enclosing IPv4 header.
    const PROTOCOL: IpProtocol;

    /// Number of bytes `encode_to` writes.
    fn encoded_len(&self) -> usize;

    /// Append the wire representation of `self` to `buf`.
    fn encode_to<B: BufMut>(&self, buf: &mut B);

    /// Decode a value from the payload bytes of a datagram.
    fn decode(buf: &[u8]) -> Result<Self>;

    /// Return the wire representation of `self` as a new vector.
    fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        self.encode_to(&mut buf);
        buf
    }
}
