use byteorder::{ByteOrder, NetworkEndian};
use bytes::{Buf, BufMut};

use crate::checksum_utils;
use crate::ipv4::{IpProtocol, Ipv4Packet};
use crate::{Error, Payload, Result};

use super::timestamp::{current_year, EchoTimestamp, ECHO_TIMESTAMP_LEN};
use super::{IcmpType, ICMPV4_HEADER_LEN};

const LAYER: &str = "icmpv4";

/// An ICMPv4 Echo Request or Echo Reply message.
///
/// Wire layout:
///
/// ```text
///  0       1       2               4               6               8
/// +-------+-------+---------------+---------------+---------------+
/// | type  | code  |   checksum    |  identifier   |   sequence    |
/// +-------+-------+---------------+---------------+---------------+
/// |  timestamp seconds (optional) | timestamp microseconds (opt.) |
/// +-------------------------------+-------------------------------+
/// |  data ...
/// ```
///
/// The checksum is not stored, it is computed from the other fields
/// whenever it is read or the message is encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Icmpv4Echo {
    icmp_type: IcmpType,
    code: u8,
    ident: u16,
    seq_num: u16,
    timestamp: Option<EchoTimestamp>,
    data: Vec<u8>,
}

impl Default for Icmpv4Echo {
    fn default() -> Self {
        Self::new()
    }
}

impl Icmpv4Echo {
    /// An Echo Request with a random identifier, sequence number 0 and no data.
    pub fn new() -> Self {
        Self::request(rand::random(), 0)
    }

    /// An Echo Request with the given identifier and sequence number.
    pub fn request(ident: u16, seq_num: u16) -> Self {
        Self {
            icmp_type: IcmpType::ECHO_REQUEST,
            code: 0,
            ident,
            seq_num,
            timestamp: None,
            data: Vec::new(),
        }
    }

    /// The Echo Reply answering this message.
    ///
    /// Identifier, sequence number, timestamp and data are returned
    /// unchanged, as RFC 792 requires.
    pub fn reply(&self) -> Self {
        Self {
            icmp_type: IcmpType::ECHO_REPLY,
            code: 0,
            ..self.clone()
        }
    }

    /// Decode with `now_year` as the latest year a timestamp may fall in.
    ///
    /// [`Payload::decode`] calls this with the current UTC year. Pinning the
    /// year makes the result independent of the wall clock.
    ///
    /// # Errors
    /// Fails with [`Error::MalformedPacket`] if `buf` is shorter than 8 bytes.
    pub fn decode_at(buf: &[u8], now_year: u32) -> Result<Self> {
        if buf.len() < ICMPV4_HEADER_LEN {
            return Error::reject(LAYER, "buffer shorter than 8 bytes", buf.len());
        }

        let rest = &buf[ICMPV4_HEADER_LEN..];
        let timestamp = EchoTimestamp::detect(rest, now_year);
        let data = match timestamp {
            Some(_) => &rest[ECHO_TIMESTAMP_LEN..],
            None => rest,
        };

        Ok(Self {
            icmp_type: IcmpType::from(buf[0]),
            code: buf[1],
            ident: NetworkEndian::read_u16(&buf[4..6]),
            seq_num: NetworkEndian::read_u16(&buf[6..8]),
            timestamp,
            data: data.to_vec(),
        })
    }

    /// Whether `buf`, an encoded echo message, carries a correct checksum.
    pub fn verify_checksum(buf: &[u8]) -> bool {
        buf.len() >= ICMPV4_HEADER_LEN && checksum_utils::verify(buf)
    }

    /// Byte length of the header, timestamp included.
    #[inline]
    pub fn header_len(&self) -> usize {
        match self.timestamp {
            Some(_) => ICMPV4_HEADER_LEN + ECHO_TIMESTAMP_LEN,
            None => ICMPV4_HEADER_LEN,
        }
    }

    /// The checksum over the whole message, computed with the checksum field zeroed.
    pub fn checksum(&self) -> u16 {
        let mut header = [0; ICMPV4_HEADER_LEN + ECHO_TIMESTAMP_LEN];
        self.write_header(&mut &mut header[..], 0);

        let message = (&header[..self.header_len()]).chain(&self.data[..]);
        !checksum_utils::from_buf(message, self.encoded_len())
    }

    fn write_header<B: BufMut>(&self, buf: &mut B, checksum: u16) {
        buf.put_u8(self.icmp_type.into());
        buf.put_u8(self.code);
        buf.put_u16(checksum);
        buf.put_u16(self.ident);
        buf.put_u16(self.seq_num);
        if let Some(ts) = self.timestamp {
            ts.write_to(buf);
        }
    }

    #[inline]
    pub fn icmp_type(&self) -> IcmpType {
        self.icmp_type
    }

    #[inline]
    pub fn set_icmp_type(&mut self, value: IcmpType) {
        self.icmp_type = value;
    }

    #[inline]
    pub fn is_echo_request(&self) -> bool {
        self.icmp_type == IcmpType::ECHO_REQUEST
    }

    #[inline]
    pub fn is_echo_reply(&self) -> bool {
        self.icmp_type == IcmpType::ECHO_REPLY
    }

    #[inline]
    pub fn code(&self) -> u8 {
        self.code
    }

    #[inline]
    pub fn set_code(&mut self, value: u8) {
        self.code = value;
    }

    /// Identifier used to match replies to requests.
    #[inline]
    pub fn ident(&self) -> u16 {
        self.ident
    }

    #[inline]
    pub fn set_ident(&mut self, value: u16) {
        self.ident = value;
    }

    #[inline]
    pub fn seq_num(&self) -> u16 {
        self.seq_num
    }

    #[inline]
    pub fn set_seq_num(&mut self, value: u16) {
        self.seq_num = value;
    }

    #[inline]
    pub fn timestamp(&self) -> Option<EchoTimestamp> {
        self.timestamp
    }

    /// Seconds of the timestamp, present exactly when the microseconds are.
    #[inline]
    pub fn timestamp_secs(&self) -> Option<u32> {
        self.timestamp.map(|ts| ts.secs)
    }

    #[inline]
    pub fn timestamp_micros(&self) -> Option<u32> {
        self.timestamp.map(|ts| ts.micros)
    }

    #[inline]
    pub fn set_timestamp(&mut self, value: Option<EchoTimestamp>) {
        self.timestamp = value;
    }

    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    pub fn data_mut(&mut self) -> &mut Vec<u8> {
        &mut self.data
    }

    #[inline]
    pub fn set_data(&mut self, value: Vec<u8>) {
        self.data = value;
    }
}

impl Payload for Icmpv4Echo {
    const PROTOCOL: IpProtocol = IpProtocol::ICMP;

    #[inline]
    fn encoded_len(&self) -> usize {
        self.header_len() + self.data.len()
    }

    fn encode_to<B: BufMut>(&self, buf: &mut B) {
        self.write_header(buf, self.checksum());
        buf.put_slice(&self.data);
    }

    fn decode(buf: &[u8]) -> Result<Self> {
        Self::decode_at(buf, current_year())
    }
}

impl Ipv4Packet<Icmpv4Echo> {
    /// The datagram answering this echo request: addresses swapped, the
    /// type of service kept, and the payload replaced by its reply.
    ///
    /// The remaining header fields take their defaults and options are
    /// not copied.
    pub fn echo_reply(&self) -> Self {
        let mut reply = Ipv4Packet::new(self.payload().reply());
        reply.set_tos(self.tos());
        reply.set_src_addr(self.dst_addr());
        reply.set_dst_addr(self.src_addr());
        reply
    }
}
