//! IPv4 (RFC 791) header view. Options are skipped over via IHL, never parsed.

use std::net::Ipv4Addr;

use super::checksum::{fill_checksum, internet_checksum};

pub const IPV4_MIN_HEADER_LEN: usize = 20;
pub const IPV4_VERSION: u8 = 4;

pub const PROTO_ICMP: u8 = 1;

/// Read-only typed view over an IPv4 header plus payload.
pub struct Ipv4View<'a> {
    buf: &'a [u8],
}

impl<'a> Ipv4View<'a> {
    /// Wraps `buf`. Returns `None` if the buffer is shorter than the header's own IHL
    /// claims, or the version field isn't 4.
    pub fn parse(buf: &'a [u8]) -> Option<Self> {
        if buf.len() < IPV4_MIN_HEADER_LEN {
            return None;
        }
        let view = Ipv4View { buf };
        if view.version() != IPV4_VERSION {
            return None;
        }
        if buf.len() < view.header_len() {
            return None;
        }
        Some(view)
    }

    pub fn version(&self) -> u8 {
        self.buf[0] >> 4
    }

    pub fn ihl(&self) -> u8 {
        self.buf[0] & 0x0F
    }

    pub fn tos(&self) -> u8 {
        self.buf[1]
    }

    pub fn identification(&self) -> u16 {
        u16::from_be_bytes([self.buf[4], self.buf[5]])
    }

    /// Whether the don't-fragment bit is set in the flags/fragment-offset field.
    pub fn df(&self) -> bool {
        u16::from_be_bytes([self.buf[6], self.buf[7]]) & 0x4000 != 0
    }

    /// Header length in bytes, derived from the IHL nibble.
    pub fn header_len(&self) -> usize {
        self.ihl() as usize * 4
    }

    pub fn total_len(&self) -> u16 {
        u16::from_be_bytes([self.buf[2], self.buf[3]])
    }

    pub fn ttl(&self) -> u8 {
        self.buf[8]
    }

    pub fn protocol(&self) -> u8 {
        self.buf[9]
    }

    pub fn checksum(&self) -> u16 {
        u16::from_be_bytes([self.buf[10], self.buf[11]])
    }

    pub fn src(&self) -> Ipv4Addr {
        Ipv4Addr::new(self.buf[12], self.buf[13], self.buf[14], self.buf[15])
    }

    pub fn dst(&self) -> Ipv4Addr {
        Ipv4Addr::new(self.buf[16], self.buf[17], self.buf[18], self.buf[19])
    }

    pub fn checksum_valid(&self) -> bool {
        internet_checksum(&self.buf[..self.header_len()]) == 0
    }

    /// The header bytes, options included.
    pub fn header(&self) -> &'a [u8] {
        &self.buf[..self.header_len()]
    }

    /// Payload following the header, honoring IHL so options are skipped.
    pub fn payload(&self) -> &'a [u8] {
        &self.buf[self.header_len()..]
    }

    /// The entire datagram as received (header, options, and payload), used
    /// when an ICMP error message needs to quote the offending packet.
    pub fn raw(&self) -> &'a [u8] {
        self.buf
    }
}

/// Builds a minimal (no-options, 20-byte) IPv4 header and appends `payload`.
/// `tos` and `identification` are normally carried over from the datagram
/// that triggered this one (echo reply, ICMP error); `df` sets the
/// don't-fragment bit.
#[allow(clippy::too_many_arguments)]
pub fn build(
    ttl: u8,
    tos: u8,
    protocol: u8,
    src: Ipv4Addr,
    dst: Ipv4Addr,
    identification: u16,
    df: bool,
    payload: &[u8],
) -> Vec<u8> {
    let total_len = IPV4_MIN_HEADER_LEN + payload.len();
    let mut out = Vec::with_capacity(total_len);
    out.push((IPV4_VERSION << 4) | 5); // IHL = 5 words, no options
    out.push(tos);
    out.extend_from_slice(&(total_len as u16).to_be_bytes());
    out.extend_from_slice(&identification.to_be_bytes());
    let flags_fragment_offset: u16 = if df { 0x4000 } else { 0 };
    out.extend_from_slice(&flags_fragment_offset.to_be_bytes());
    out.push(ttl);
    out.push(protocol);
    out.extend_from_slice(&[0, 0]); // checksum placeholder
    out.extend_from_slice(&src.octets());
    out.extend_from_slice(&dst.octets());
    fill_checksum(&mut out, 10);
    out.extend_from_slice(payload);
    out
}

/// Decrements TTL and recomputes the checksum in place, over the header only
/// (options included, payload excluded, per the IHL nibble) — `datagram` may
/// be the header alone or the full header-plus-payload buffer. Returns
/// `false` (leaving `datagram` untouched) if the TTL was already zero.
pub fn decrement_ttl(datagram: &mut [u8]) -> bool {
    if datagram[8] == 0 {
        return false;
    }
    datagram[8] -= 1;
    let header_len = (datagram[0] & 0x0F) as usize * 4;
    fill_checksum(&mut datagram[..header_len], 10);
    true
}
