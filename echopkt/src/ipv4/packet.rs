use byteorder::{ByteOrder, NetworkEndian};
use bytes::BufMut;
use log::trace;

use crate::checksum_utils;
use crate::{Error, Payload, Result};

use super::{IpProtocol, Ipv4Addr};

/// Byte length of the IPv4 header without options.
pub const IPV4_HEADER_LEN: usize = 20;

/// Maximum byte length of the IPv4 options, the header length field is 4 bits wide.
pub const IPV4_OPTIONS_LEN_MAX: usize = 40;

/// Time-to-live of a newly built packet.
pub const DEFAULT_TTL: u8 = 64;

const IPV4_VERSION: u8 = 4;
const IPV4_PACKET_LEN_MAX: usize = 65535;
const LAYER: &str = "ipv4";

/// An IPv4 datagram that owns its header fields and a payload of type `T`.
///
/// The header length, the total length and the header checksum are not
/// stored. They are recomputed from the options and the payload on every
/// read, so they never go stale after a setter is called.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ipv4Packet<T> {
    tos: u8,
    ident: u16,
    flags_frag_offset: u16,
    ttl: u8,
    protocol: IpProtocol,
    src_addr: Ipv4Addr,
    dst_addr: Ipv4Addr,
    options: Vec<u8>,
    payload: T,
}

impl<T: Payload + Default> Default for Ipv4Packet<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: Payload> Ipv4Packet<T> {
    /// Create a packet around `payload`.
    ///
    /// The protocol field is taken from `T::PROTOCOL`, the time-to-live is
    /// [`DEFAULT_TTL`] and every other field is zero.
    pub fn new(payload: T) -> Self {
        Self {
            tos: 0,
            ident: 0,
            flags_frag_offset: 0,
            ttl: DEFAULT_TTL,
            protocol: T::PROTOCOL,
            src_addr: Ipv4Addr::UNSPECIFIED,
            dst_addr: Ipv4Addr::UNSPECIFIED,
            options: Vec::new(),
            payload,
        }
    }

    /// Decode a datagram from `buf`.
    ///
    /// The version nibble and the header checksum are not checked, see
    /// [`parse_strict`](Self::parse_strict) for that. Bytes past the total
    /// length field are ignored.
    ///
    /// # Errors
    /// Fails with [`Error::MalformedPacket`] when `buf` is shorter than 20
    /// bytes, when the header length field is below 5 words, when the header
    /// or the total length runs past the end of `buf`, when the total length
    /// is smaller than the header, or when the payload fails to decode.
    pub fn parse(buf: &[u8]) -> Result<Self> {
        let (header_len, packet_len) = check_lengths(buf)?;
        Self::parse_unchecked(buf, header_len, packet_len)
    }

    /// Decode a datagram from `buf`, also requiring version 4 and a valid
    /// header checksum.
    ///
    /// # Errors
    /// Everything [`parse`](Self::parse) rejects, plus a version other than
    /// 4 or a header checksum that does not verify.
    pub fn parse_strict(buf: &[u8]) -> Result<Self> {
        let (header_len, packet_len) = check_lengths(buf)?;

        if buf[0] >> 4 != IPV4_VERSION {
            return Error::reject(LAYER, "version is not 4", buf.len());
        }
        if !checksum_utils::verify(&buf[..header_len]) {
            return Error::reject(LAYER, "header checksum mismatch", buf.len());
        }

        Self::parse_unchecked(buf, header_len, packet_len)
    }

    fn parse_unchecked(buf: &[u8], header_len: usize, packet_len: usize) -> Result<Self> {
        let payload = T::decode(&buf[header_len..packet_len])?;

        let packet = Self {
            tos: buf[1],
            ident: NetworkEndian::read_u16(&buf[4..6]),
            flags_frag_offset: NetworkEndian::read_u16(&buf[6..8]),
            ttl: buf[8],
            protocol: IpProtocol::from(buf[9]),
            src_addr: Ipv4Addr::from(NetworkEndian::read_u32(&buf[12..16])),
            dst_addr: Ipv4Addr::from(NetworkEndian::read_u32(&buf[16..20])),
            options: buf[IPV4_HEADER_LEN..header_len].to_vec(),
            payload,
        };
        trace!(
            "parsed ipv4 {} -> {}, protocol {}, {} header bytes, {} payload bytes",
            packet.src_addr,
            packet.dst_addr,
            packet.protocol,
            header_len,
            packet_len - header_len
        );

        Ok(packet)
    }

    /// Serialize the packet, header checksum included.
    ///
    /// # Panics
    /// Panics if the packet is longer than 65535 bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let packet_len = usize::from(self.packet_len());

        let mut buf = Vec::with_capacity(packet_len);
        self.write_header(&mut buf, self.header_checksum());
        self.payload.encode_to(&mut buf);

        debug_assert_eq!(buf.len(), packet_len);
        buf
    }

    /// The header as it is summed for the checksum: the checksum field is zero.
    fn serialize_header(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.header_len());
        self.write_header(&mut buf, 0);
        buf
    }

    fn write_header<B: BufMut>(&self, buf: &mut B, checksum: u16) {
        buf.put_u8((IPV4_VERSION << 4) | self.ihl());
        buf.put_u8(self.tos);
        buf.put_u16(self.packet_len());
        buf.put_u16(self.ident);
        buf.put_u16(self.flags_frag_offset);
        buf.put_u8(self.ttl);
        buf.put_u8(self.protocol.into());
        buf.put_u16(checksum);
        buf.put_slice(&self.src_addr.octets());
        buf.put_slice(&self.dst_addr.octets());
        buf.put_slice(&self.options);
    }

    /// Always 4.
    #[inline]
    pub fn version(&self) -> u8 {
        IPV4_VERSION
    }

    /// Header length in 32-bit words, between 5 and 15.
    #[inline]
    pub fn ihl(&self) -> u8 {
        (self.header_len() / 4) as u8
    }

    /// Header length in bytes, options included.
    #[inline]
    pub fn header_len(&self) -> usize {
        IPV4_HEADER_LEN + self.options.len()
    }

    /// Total length of the datagram: header plus encoded payload.
    ///
    /// # Panics
    /// Panics if the datagram would be longer than 65535 bytes.
    #[inline]
    pub fn packet_len(&self) -> u16 {
        let packet_len = self.header_len() + self.payload.encoded_len();
        assert!(packet_len <= IPV4_PACKET_LEN_MAX);
        packet_len as u16
    }

    /// The header checksum, computed over the current field values.
    pub fn header_checksum(&self) -> u16 {
        checksum_utils::checksum(&self.serialize_header())
    }

    #[inline]
    pub fn tos(&self) -> u8 {
        self.tos
    }

    #[inline]
    pub fn set_tos(&mut self, value: u8) {
        self.tos = value;
    }

    /// The differentiated services code point, upper 6 bits of the type of service.
    #[inline]
    pub fn dscp(&self) -> u8 {
        self.tos >> 2
    }

    #[inline]
    pub fn set_dscp(&mut self, value: u8) {
        assert!(value <= 0x3f);
        self.tos = (self.tos & 0x03) | (value << 2);
    }

    /// The explicit congestion notification, lower 2 bits of the type of service.
    #[inline]
    pub fn ecn(&self) -> u8 {
        self.tos & 0x03
    }

    #[inline]
    pub fn set_ecn(&mut self, value: u8) {
        assert!(value <= 0x03);
        self.tos = (self.tos & 0xfc) | value;
    }

    #[inline]
    pub fn ident(&self) -> u16 {
        self.ident
    }

    #[inline]
    pub fn set_ident(&mut self, value: u16) {
        self.ident = value;
    }

    /// The raw flags (3 bits) and fragment offset (13 bits) word.
    #[inline]
    pub fn flags_frag_offset(&self) -> u16 {
        self.flags_frag_offset
    }

    #[inline]
    pub fn set_flags_frag_offset(&mut self, value: u16) {
        self.flags_frag_offset = value;
    }

    #[inline]
    pub fn dont_frag(&self) -> bool {
        self.flags_frag_offset & 0x4000 != 0
    }

    #[inline]
    pub fn set_dont_frag(&mut self, value: bool) {
        if value {
            self.flags_frag_offset |= 0x4000;
        } else {
            self.flags_frag_offset &= !0x4000;
        }
    }

    #[inline]
    pub fn more_frags(&self) -> bool {
        self.flags_frag_offset & 0x2000 != 0
    }

    #[inline]
    pub fn set_more_frags(&mut self, value: bool) {
        if value {
            self.flags_frag_offset |= 0x2000;
        } else {
            self.flags_frag_offset &= !0x2000;
        }
    }

    /// Fragment offset in units of 8 bytes.
    #[inline]
    pub fn frag_offset(&self) -> u16 {
        self.flags_frag_offset & 0x1fff
    }

    #[inline]
    pub fn set_frag_offset(&mut self, value: u16) {
        assert!(value <= 0x1fff);
        self.flags_frag_offset = (self.flags_frag_offset & 0xe000) | value;
    }

    #[inline]
    pub fn ttl(&self) -> u8 {
        self.ttl
    }

    #[inline]
    pub fn set_ttl(&mut self, value: u8) {
        self.ttl = value;
    }

    #[inline]
    pub fn protocol(&self) -> IpProtocol {
        self.protocol
    }

    #[inline]
    pub fn set_protocol(&mut self, value: IpProtocol) {
        self.protocol = value;
    }

    #[inline]
    pub fn src_addr(&self) -> Ipv4Addr {
        self.src_addr
    }

    #[inline]
    pub fn set_src_addr(&mut self, value: Ipv4Addr) {
        self.src_addr = value;
    }

    #[inline]
    pub fn dst_addr(&self) -> Ipv4Addr {
        self.dst_addr
    }

    #[inline]
    pub fn set_dst_addr(&mut self, value: Ipv4Addr) {
        self.dst_addr = value;
    }

    /// Raw option bytes, passed through without interpretation.
    #[inline]
    pub fn options(&self) -> &[u8] {
        &self.options
    }

    /// Replace the option bytes.
    ///
    /// # Panics
    /// Panics if the length is not a multiple of 4 or exceeds
    /// [`IPV4_OPTIONS_LEN_MAX`].
    #[inline]
    pub fn set_options(&mut self, value: Vec<u8>) {
        assert!(value.len() % 4 == 0 && value.len() <= IPV4_OPTIONS_LEN_MAX);
        self.options = value;
    }

    #[inline]
    pub fn payload(&self) -> &T {
        &self.payload
    }

    #[inline]
    pub fn payload_mut(&mut self) -> &mut T {
        &mut self.payload
    }

    #[inline]
    pub fn set_payload(&mut self, value: T) {
        self.payload = value;
    }

    #[inline]
    pub fn into_payload(self) -> T {
        self.payload
    }
}

// Returns the header length and the total length once both are known to fit in `buf`.
fn check_lengths(buf: &[u8]) -> Result<(usize, usize)> {
    if buf.len() < IPV4_HEADER_LEN {
        return Error::reject(LAYER, "buffer shorter than 20 bytes", buf.len());
    }

    let header_len = usize::from(buf[0] & 0x0f) * 4;
    if header_len < IPV4_HEADER_LEN {
        return Error::reject(LAYER, "header length field below 5 words", buf.len());
    }
    if header_len > buf.len() {
        return Error::reject(LAYER, "options run past the end of the buffer", buf.len());
    }

    let packet_len = usize::from(NetworkEndian::read_u16(&buf[2..4]));
    if packet_len < header_len {
        return Error::reject(LAYER, "total length shorter than the header", buf.len());
    }
    if packet_len > buf.len() {
        return Error::reject(LAYER, "total length exceeds the buffer", buf.len());
    }

    Ok((header_len, packet_len))
}

#[cfg(test)]
mod tests {
    use super::*;

    // Keeps its payload bytes verbatim.
    #[derive(Debug, Clone, Default, PartialEq, Eq)]
    struct Opaque(Vec<u8>);

    impl Payload for Opaque {
        const PROTOCOL: IpProtocol = IpProtocol::UDP;

        fn encoded_len(&self) -> usize {
            self.0.len()
        }

        fn encode_to<B: BufMut>(&self, buf: &mut B) {
            buf.put_slice(&self.0);
        }

        fn decode(buf: &[u8]) -> Result<Self> {
            Ok(Opaque(buf.to_vec()))
        }
    }

    // Echo reply captured from a ping to 142.250.180.14.
    static PACKET_BYTES: [u8; 84] = [
        0x45, 0x00, 0x00, 0x54, 0x00, 0x00, 0x00, 0x00, 0x76, 0x01, 0x40, 0x22, 0x8e, 0xfa, 0xb4,
        0x0e, 0xc0, 0xa8, 0x00, 0xd6, 0x00, 0x00, 0x46, 0x31, 0xb2, 0x28, 0x00, 0x00, 0x66, 0xbf,
        0x77, 0xf3, 0x00, 0x08, 0x3d, 0xe8, 0x08, 0x09, 0x0a, 0x0b, 0x0c, 0x0d, 0x0e, 0x0f, 0x10,
        0x11, 0x12, 0x13, 0x14, 0x15, 0x16, 0x17, 0x18, 0x19, 0x1a, 0x1b, 0x1c, 0x1d, 0x1e, 0x1f,
        0x20, 0x21, 0x22, 0x23, 0x24, 0x25, 0x26, 0x27, 0x28, 0x29, 0x2a, 0x2b, 0x2c, 0x2d, 0x2e,
        0x2f, 0x30, 0x31, 0x32, 0x33, 0x34, 0x35, 0x36, 0x37,
    ];

    #[test]
    fn packet_parse() {
        let pkt = Ipv4Packet::<Opaque>::parse(&PACKET_BYTES[..]).unwrap();

        assert_eq!(pkt.version(), 4);
        assert_eq!(pkt.ihl(), 5);
        assert_eq!(pkt.header_len(), 20);
        assert_eq!(pkt.tos(), 0);
        assert_eq!(pkt.packet_len(), 84);
        assert_eq!(pkt.ident(), 0);
        assert_eq!(pkt.flags_frag_offset(), 0);
        assert_eq!(pkt.ttl(), 118);
        assert_eq!(pkt.protocol(), IpProtocol::ICMP);
        assert_eq!(pkt.header_checksum(), 0x4022);
        assert_eq!(pkt.src_addr(), Ipv4Addr::new(142, 250, 180, 14));
        assert_eq!(pkt.dst_addr(), Ipv4Addr::new(192, 168, 0, 214));
        assert!(pkt.options().is_empty());
        assert_eq!(pkt.payload().0, &PACKET_BYTES[20..]);
    }

    #[test]
    fn packet_build() {
        let mut pkt = Ipv4Packet::new(Opaque(PACKET_BYTES[20..].to_vec()));
        pkt.set_ttl(118);
        pkt.set_protocol(IpProtocol::ICMP);
        pkt.set_src_addr(Ipv4Addr::new(142, 250, 180, 14));
        pkt.set_dst_addr(Ipv4Addr::new(192, 168, 0, 214));

        assert_eq!(pkt.to_bytes(), &PACKET_BYTES[..]);
    }

    #[test]
    fn defaults() {
        let pkt = Ipv4Packet::<Opaque>::default();
        assert_eq!(pkt.version(), 4);
        assert_eq!(pkt.ihl(), 5);
        assert_eq!(pkt.packet_len(), 20);
        assert_eq!(pkt.ttl(), DEFAULT_TTL);
        assert_eq!(pkt.protocol(), IpProtocol::UDP);
        assert_eq!(pkt.src_addr(), Ipv4Addr::UNSPECIFIED);

        let bytes = pkt.to_bytes();
        assert_eq!(bytes.len(), 20);
        assert_eq!(&bytes[..10], &[0x45, 0x00, 0x00, 0x14, 0x00, 0x00, 0x00, 0x00, 0x40, 0x11]);
        assert!(checksum_utils::verify(&bytes));
    }

    #[test]
    fn derived_fields_follow_setters() {
        let mut pkt = Ipv4Packet::new(Opaque(vec![1, 2, 3, 4]));
        let before = pkt.header_checksum();
        assert_eq!(pkt.packet_len(), 24);

        pkt.set_options(vec![0x01; 8]);
        assert_eq!(pkt.ihl(), 7);
        assert_eq!(pkt.packet_len(), 32);
        assert_ne!(pkt.header_checksum(), before);

        pkt.payload_mut().0.extend_from_slice(&[5, 6]);
        assert_eq!(pkt.packet_len(), 34);
    }

    #[test]
    fn options_pass_through() {
        let mut pkt = Ipv4Packet::new(Opaque(vec![0xaa; 6]));
        pkt.set_options(vec![0x94, 0x04, 0x00, 0x00]);

        let bytes = pkt.to_bytes();
        assert_eq!(bytes[0], 0x46);
        assert_eq!(&bytes[20..24], &[0x94, 0x04, 0x00, 0x00]);
        assert_eq!(&bytes[24..], &[0xaa; 6]);

        let parsed = Ipv4Packet::<Opaque>::parse(&bytes).unwrap();
        assert_eq!(parsed.options(), &[0x94, 0x04, 0x00, 0x00]);
        assert_eq!(parsed.payload().0, vec![0xaa; 6]);
        assert_eq!(parsed, pkt);
    }

    #[test]
    #[should_panic]
    fn options_must_be_word_aligned() {
        let mut pkt = Ipv4Packet::<Opaque>::default();
        pkt.set_options(vec![0; 3]);
    }

    #[test]
    #[should_panic]
    fn options_must_fit_header_length_field() {
        let mut pkt = Ipv4Packet::<Opaque>::default();
        pkt.set_options(vec![0; 44]);
    }

    #[test]
    #[should_panic]
    fn oversized_packet_panics() {
        let pkt = Ipv4Packet::new(Opaque(vec![0; 65535 - 19]));
        pkt.to_bytes();
    }

    #[test]
    fn flag_views() {
        let mut pkt = Ipv4Packet::<Opaque>::default();
        pkt.set_dont_frag(true);
        assert_eq!(pkt.flags_frag_offset(), 0x4000);
        pkt.set_more_frags(true);
        pkt.set_frag_offset(0x1234);
        assert_eq!(pkt.flags_frag_offset(), 0x7234);
        assert!(pkt.dont_frag());
        assert!(pkt.more_frags());
        assert_eq!(pkt.frag_offset(), 0x1234);

        pkt.set_dont_frag(false);
        assert_eq!(pkt.flags_frag_offset(), 0x3234);

        pkt.set_dscp(0x2e);
        pkt.set_ecn(0x01);
        assert_eq!(pkt.tos(), 0xb9);
        assert_eq!(pkt.dscp(), 0x2e);
        assert_eq!(pkt.ecn(), 0x01);
    }

    #[test]
    fn parse_rejects_short_buffer() {
        let err = Ipv4Packet::<Opaque>::parse(&PACKET_BYTES[..19]).unwrap_err();
        assert_eq!(err.layer(), "ipv4");
        assert_eq!(err.reason(), "buffer shorter than 20 bytes");
    }

    #[test]
    fn parse_rejects_truncated_packet() {
        // Total length says 84 but only the header is present.
        let res = Ipv4Packet::<Opaque>::parse(&PACKET_BYTES[..20]);
        assert_eq!(
            res,
            Err(Error::MalformedPacket {
                layer: "ipv4",
                reason: "total length exceeds the buffer"
            })
        );
    }

    #[test]
    fn parse_rejects_bad_lengths() {
        let mut bytes = PACKET_BYTES;
        bytes[0] = 0x44;
        assert!(Ipv4Packet::<Opaque>::parse(&bytes[..]).is_err());

        let mut bytes = PACKET_BYTES;
        bytes[0] = 0x4f;
        assert!(Ipv4Packet::<Opaque>::parse(&bytes[..40]).is_err());

        let mut bytes = PACKET_BYTES;
        bytes[2] = 0x00;
        bytes[3] = 0x10;
        assert!(Ipv4Packet::<Opaque>::parse(&bytes[..]).is_err());
    }

    #[test]
    fn parse_ignores_trailing_bytes() {
        let mut bytes = PACKET_BYTES.to_vec();
        bytes.extend_from_slice(&[0xee; 6]);

        let pkt = Ipv4Packet::<Opaque>::parse(&bytes).unwrap();
        assert_eq!(pkt.payload().0, &PACKET_BYTES[20..]);
        assert_eq!(pkt.to_bytes(), &PACKET_BYTES[..]);
    }

    #[test]
    fn lenient_parse_keeps_version_four() {
        let mut bytes = PACKET_BYTES;
        bytes[0] = 0x65;

        let pkt = Ipv4Packet::<Opaque>::parse(&bytes[..]).unwrap();
        assert_eq!(pkt.version(), 4);
        assert_eq!(pkt.to_bytes()[0], 0x45);

        let res = Ipv4Packet::<Opaque>::parse_strict(&bytes[..]);
        assert_eq!(res.unwrap_err().reason(), "version is not 4");
    }

    #[test]
    fn strict_parse_verifies_checksum() {
        assert!(Ipv4Packet::<Opaque>::parse_strict(&PACKET_BYTES[..]).is_ok());

        let mut bytes = PACKET_BYTES;
        bytes[11] ^= 0x01;
        assert!(Ipv4Packet::<Opaque>::parse(&bytes[..]).is_ok());
        assert_eq!(
            Ipv4Packet::<Opaque>::parse_strict(&bytes[..]).unwrap_err().reason(),
            "header checksum mismatch"
        );
    }

    #[test]
    fn payload_errors_propagate() {
        #[derive(Debug)]
        struct Picky;

        impl Payload for Picky {
            const PROTOCOL: IpProtocol = IpProtocol::TCP;

            fn encoded_len(&self) -> usize {
                0
            }

            fn encode_to<B: BufMut>(&self, _buf: &mut B) {}

            fn decode(buf: &[u8]) -> Result<Self> {
                Error::reject("picky", "never satisfied", buf.len())
            }
        }

        let err = Ipv4Packet::<Picky>::parse(&PACKET_BYTES[..]).unwrap_err();
        assert_eq!(err.layer(), "picky");
    }

    #[test]
    fn payload_replacement() {
        let mut pkt = Ipv4Packet::<Opaque>::parse(&PACKET_BYTES[..]).unwrap();
        pkt.set_payload(Opaque(vec![1, 2, 3]));
        assert_eq!(pkt.packet_len(), 23);

        let reparsed = Ipv4Packet::<Opaque>::parse(&pkt.to_bytes()).unwrap();
        assert_eq!(reparsed.src_addr(), pkt.src_addr());
        assert_eq!(reparsed.into_payload(), Opaque(vec![1, 2, 3]));
    }
}
