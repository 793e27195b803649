//! Packet classification
//!
//! Mirrors the kernel filter `icmp[icmptype] = icmp-echo` in plain Rust so
//! sources without a compiled filter (savefile replay, tests) obey the
//! same rule. Only IPv4 is considered, and only the first fragment of a
//! datagram carries an ICMP header.

use crate::constants::{ICMP_ECHO_REPLY, ICMP_ECHO_REQUEST, IPPROTO_ICMP};

const ETHERTYPE_IPV4: u16 = 0x0800;
const ETHERTYPE_VLAN: u16 = 0x8100;
const ETHERTYPE_QINQ: u16 = 0x88a8;

/// Link-layer framing of captured packets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkType {
    Ethernet,
    /// BSD loopback, 4-byte address family in host byte order
    Null,
    /// OpenBSD loopback, 4-byte address family in network byte order
    Loop,
    /// Raw IP, no link header
    Raw,
    LinuxSll,
    LinuxSll2,
    Unsupported(i32),
}

impl LinkType {
    /// Map a DLT/LINKTYPE value as reported by the capture library
    pub fn from_dlt(dlt: i32) -> Self {
        match dlt {
            1 => LinkType::Ethernet,
            0 => LinkType::Null,
            108 => LinkType::Loop,
            12 | 14 | 101 | 228 => LinkType::Raw,
            113 => LinkType::LinuxSll,
            276 => LinkType::LinuxSll2,
            other => LinkType::Unsupported(other),
        }
    }
}

impl From<pcap::Linktype> for LinkType {
    fn from(linktype: pcap::Linktype) -> Self {
        LinkType::from_dlt(linktype.0)
    }
}

/// What a captured packet turned out to be
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketClass {
    EchoRequest,
    EchoReply,
    OtherIcmp(u8),
    /// Non-initial fragment of an ICMP datagram
    Fragment,
    /// IPv4 but another protocol, or not IPv4 at all
    NotIcmp,
    /// Too short or inconsistent to parse
    Malformed,
}

impl PacketClass {
    pub fn is_echo_request(self) -> bool {
        self == PacketClass::EchoRequest
    }
}

/// Classify a captured packet
pub fn classify(link: LinkType, data: &[u8]) -> PacketClass {
    match network_payload(link, data) {
        Some(ip) => classify_ipv4(ip),
        None if data.is_empty() => PacketClass::Malformed,
        None => PacketClass::NotIcmp,
    }
}

/// Shorthand for `classify(..).is_echo_request()`
pub fn is_echo_request(link: LinkType, data: &[u8]) -> bool {
    classify(link, data).is_echo_request()
}

/// Strip the link header, returning the IPv4 packet if there is one
fn network_payload(link: LinkType, data: &[u8]) -> Option<&[u8]> {
    match link {
        LinkType::Ethernet => {
            let mut offset = 12;
            let mut ethertype = read_u16(data, offset)?;
            while ethertype == ETHERTYPE_VLAN || ethertype == ETHERTYPE_QINQ {
                offset += 4;
                ethertype = read_u16(data, offset)?;
            }
            (ethertype == ETHERTYPE_IPV4).then(|| &data[offset + 2..])
        }
        LinkType::Null | LinkType::Loop => {
            let family = data.get(..4)?;
            // AF_INET is 2 everywhere; accept either byte order
            let inet = family == [2, 0, 0, 0] || family == [0, 0, 0, 2];
            inet.then(|| &data[4..])
        }
        LinkType::Raw => Some(data),
        LinkType::LinuxSll => {
            let proto = read_u16(data, 14)?;
            (proto == ETHERTYPE_IPV4).then(|| &data[16..])
        }
        LinkType::LinuxSll2 => {
            let proto = read_u16(data, 0)?;
            if proto != ETHERTYPE_IPV4 || data.len() < 20 {
                return None;
            }
            Some(&data[20..])
        }
        LinkType::Unsupported(_) => None,
    }
}

fn classify_ipv4(ip: &[u8]) -> PacketClass {
    let Some(&version_ihl) = ip.first() else {
        return PacketClass::Malformed;
    };
    if version_ihl >> 4 != 4 {
        return PacketClass::NotIcmp;
    }

    let header_len = ((version_ihl & 0x0f) as usize) * 4;
    if header_len < 20 || ip.len() < header_len {
        return PacketClass::Malformed;
    }
    if ip[9] != IPPROTO_ICMP {
        return PacketClass::NotIcmp;
    }

    // Later fragments carry no ICMP header
    let fragment_offset = u16::from_be_bytes([ip[6], ip[7]]) & 0x1fff;
    if fragment_offset != 0 {
        return PacketClass::Fragment;
    }

    match ip.get(header_len) {
        Some(&ICMP_ECHO_REQUEST) => PacketClass::EchoRequest,
        Some(&ICMP_ECHO_REPLY) => PacketClass::EchoReply,
        Some(&other) => PacketClass::OtherIcmp(other),
        None => PacketClass::Malformed,
    }
}

fn read_u16(data: &[u8], offset: usize) -> Option<u16> {
    let bytes = data.get(offset..offset + 2)?;
    Some(u16::from_be_bytes([bytes[0], bytes[1]]))
}

/// Hand-built packets for tests
#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    const IPPROTO_TCP: u8 = 6;

    fn ipv4(protocol: u8, payload: &[u8]) -> Vec<u8> {
        let total = (20 + payload.len()) as u16;
        let mut packet = vec![
            0x45, 0x00, // version/IHL, DSCP
            0, 0, // total length
            0x12, 0x34, // identification
            0x00, 0x00, // flags/fragment offset
            64, protocol, // TTL, protocol
            0, 0, // checksum (not verified)
            192, 168, 1, 10, // source
            192, 168, 1, 1, // destination
        ];
        packet[2..4].copy_from_slice(&total.to_be_bytes());
        packet.extend_from_slice(payload);
        packet
    }

    fn ethernet(ip: Vec<u8>) -> Vec<u8> {
        let mut frame = vec![
            0x00, 0x11, 0x22, 0x33, 0x44, 0x55, // destination
            0x66, 0x77, 0x88, 0x99, 0xaa, 0xbb, // source
        ];
        frame.extend_from_slice(&ETHERTYPE_IPV4.to_be_bytes());
        frame.extend(ip);
        frame
    }

    fn icmp(icmp_type: u8) -> Vec<u8> {
        vec![icmp_type, 0, 0, 0, 0x00, 0x01, 0x00, 0x01, b'p', b'i', b'n', b'g']
    }

    pub fn echo_request() -> Vec<u8> {
        ethernet(ipv4(IPPROTO_ICMP, &icmp(ICMP_ECHO_REQUEST)))
    }

    pub fn echo_reply() -> Vec<u8> {
        ethernet(ipv4(IPPROTO_ICMP, &icmp(ICMP_ECHO_REPLY)))
    }

    /// TCP segment whose first byte equals the echo-request type
    pub fn tcp() -> Vec<u8> {
        let mut segment = vec![0u8; 20];
        segment[0] = ICMP_ECHO_REQUEST;
        ethernet(ipv4(IPPROTO_TCP, &segment))
    }

    pub fn raw_echo_request() -> Vec<u8> {
        ipv4(IPPROTO_ICMP, &icmp(ICMP_ECHO_REQUEST))
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_echo_request_matches() {
        assert_eq!(classify(LinkType::Ethernet, &echo_request()), PacketClass::EchoRequest);
        assert!(is_echo_request(LinkType::Raw, &raw_echo_request()));
    }

    #[test]
    fn test_reply_and_tcp_rejected() {
        assert_eq!(classify(LinkType::Ethernet, &echo_reply()), PacketClass::EchoReply);
        assert_eq!(classify(LinkType::Ethernet, &tcp()), PacketClass::NotIcmp);
        assert!(!is_echo_request(LinkType::Ethernet, &echo_reply()));
        assert!(!is_echo_request(LinkType::Ethernet, &tcp()));
    }

    #[test]
    fn test_vlan_tagged_request() {
        let mut frame = echo_request();
        frame.splice(12..12, [0x81, 0x00, 0x00, 0x05]);
        assert!(is_echo_request(LinkType::Ethernet, &frame));
    }

    #[test]
    fn test_loopback_framing() {
        let mut null = vec![2, 0, 0, 0];
        null.extend(raw_echo_request());
        assert!(is_echo_request(LinkType::Null, &null));

        let mut loop_frame = vec![0, 0, 0, 2];
        loop_frame.extend(raw_echo_request());
        assert!(is_echo_request(LinkType::Loop, &loop_frame));

        let mut inet6 = vec![24, 0, 0, 0];
        inet6.extend(raw_echo_request());
        assert!(!is_echo_request(LinkType::Null, &inet6));
    }

    #[test]
    fn test_linux_cooked_framing() {
        let mut sll = vec![0u8; 14];
        sll.extend_from_slice(&ETHERTYPE_IPV4.to_be_bytes());
        sll.extend(raw_echo_request());
        assert!(is_echo_request(LinkType::LinuxSll, &sll));
    }

    #[test]
    fn test_later_fragment_ignored() {
        let mut frame = echo_request();
        // fragment offset 185 (x8 bytes)
        frame[14 + 6] = 0x00;
        frame[14 + 7] = 0xb9;
        assert_eq!(classify(LinkType::Ethernet, &frame), PacketClass::Fragment);
    }

    #[test]
    fn test_truncated_packets() {
        let frame = echo_request();
        assert_eq!(classify(LinkType::Ethernet, &[]), PacketClass::Malformed);
        assert_eq!(classify(LinkType::Ethernet, &frame[..14 + 20]), PacketClass::Malformed);
        assert_eq!(classify(LinkType::Ethernet, &frame[..14 + 10]), PacketClass::Malformed);
        assert_eq!(classify(LinkType::Ethernet, &frame[..10]), PacketClass::NotIcmp);
    }

    #[test]
    fn test_link_type_mapping() {
        assert_eq!(LinkType::from(pcap::Linktype::ETHERNET), LinkType::Ethernet);
        assert_eq!(LinkType::from_dlt(113), LinkType::LinuxSll);
        assert_eq!(LinkType::from_dlt(9999), LinkType::Unsupported(9999));
    }

    proptest! {
        #[test]
        fn prop_only_type_eight_matches(icmp_type in any::<u8>()) {
            let mut frame = echo_request();
            frame[14 + 20] = icmp_type;
            prop_assert_eq!(
                is_echo_request(LinkType::Ethernet, &frame),
                icmp_type == ICMP_ECHO_REQUEST
            );
        }

        #[test]
        fn prop_never_panics(data in proptest::collection::vec(any::<u8>(), 0..128)) {
            for link in [LinkType::Ethernet, LinkType::Null, LinkType::Raw, LinkType::LinuxSll, LinkType::LinuxSll2] {
                let _ = classify(link, &data);
            }
        }
    }
}
