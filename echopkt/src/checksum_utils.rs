//! Internet checksum (RFC 1071) shared by the IPv4 header and ICMP.
//!
//! The partial functions (`from_slice`, `from_buf`) return the folded
//! one's-complement sum without the final complement. `checksum` returns
//! the value that goes on the wire.

use byteorder::{ByteOrder, NetworkEndian};
use bytes::Buf;

/// Compute the folded one's-complement sum of `data`.
///
/// `data` is read as a sequence of 16-bit network-order words. An odd
/// trailing byte is summed as if followed by a zero byte.
pub fn from_slice(data: &[u8]) -> u16 {
    let mut accum = 0;
    let tail = sum_words(data, &mut accum);

    if let Some(byte) = tail {
        accum += u64::from(byte) << 8;
    }

    propagate_carries(accum)
}

/// Compute the folded one's-complement sum of the first `len` bytes of a
/// possibly multi-segment buffer.
///
/// A segment that ends on an odd byte is stitched to the first byte of the
/// next segment, so the result equals `from_slice` over the flattened bytes.
pub fn from_buf<T: Buf>(buf: T, len: usize) -> u16 {
    let mut buf = buf.take(len);
    let mut tail_byte: Option<u8> = None;
    let mut accum = 0;

    while buf.has_remaining() {
        let mut chunk = buf.chunk();
        let chunk_len = chunk.len();

        if let Some(byte) = tail_byte.take() {
            accum += u64::from(NetworkEndian::read_u16(&[byte, chunk[0]]));
            chunk = &chunk[1..];
        }
        tail_byte = sum_words(chunk, &mut accum);

        buf.advance(chunk_len);
    }

    if let Some(byte) = tail_byte {
        accum += u64::from(byte) << 8;
    }

    propagate_carries(accum)
}

/// Compute the checksum to store on the wire for `data`.
///
/// The checksum field inside `data` must be zero when this is called.
/// A buffer of all zeroes yields `0xffff`.
#[inline]
pub fn checksum(data: &[u8]) -> u16 {
    !from_slice(data)
}

/// Check a buffer that already carries its checksum.
///
/// The sum of a correctly checksummed buffer, checksum field included, is
/// all ones.
#[inline]
pub fn verify(data: &[u8]) -> bool {
    from_slice(data) == 0xffff
}

// Adds every complete 16-bit word of `data` into `accum` and hands back the
// odd trailing byte, if any. The u64 accumulator holds the sum of any slice
// that fits in memory.
fn sum_words(data: &[u8], accum: &mut u64) -> Option<u8> {
    let mut words = data.chunks_exact(2);
    for word in &mut words {
        *accum += u64::from(NetworkEndian::read_u16(word));
    }
    words.remainder().first().copied()
}

fn propagate_carries(word: u64) -> u16 {
    let mut sum = word;
    while sum >> 16 != 0 {
        sum = (sum & 0xffff) + (sum >> 16);
    }
    sum as u16
}
