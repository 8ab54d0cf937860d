//! ICMP (RFC 792), restricted to the echo and error types this router emits.

use super::checksum::{fill_checksum, internet_checksum};

pub const ICMP_HEADER_LEN: usize = 8;

/// Bytes of the original IPv4 header plus payload carried back in an error message.
pub const ICMP_DATA_SIZE: usize = 28;

pub const TYPE_ECHO_REPLY: u8 = 0;
pub const TYPE_UNREACHABLE: u8 = 3;
pub const TYPE_ECHO_REQUEST: u8 = 8;
pub const TYPE_TIME_EXCEEDED: u8 = 11;

pub const CODE_NET_UNREACHABLE: u8 = 0;
pub const CODE_HOST_UNREACHABLE: u8 = 1;
pub const CODE_PORT_UNREACHABLE: u8 = 3;
pub const CODE_TTL_EXCEEDED: u8 = 0;

/// Read-only typed view over an ICMP message.
pub struct IcmpView<'a> {
    buf: &'a [u8],
}

impl<'a> IcmpView<'a> {
    pub fn parse(buf: &'a [u8]) -> Option<Self> {
        if buf.len() < ICMP_HEADER_LEN {
            return None;
        }
        Some(IcmpView { buf })
    }

    pub fn icmp_type(&self) -> u8 {
        self.buf[0]
    }

    pub fn code(&self) -> u8 {
        self.buf[1]
    }

    pub fn checksum(&self) -> u16 {
        u16::from_be_bytes([self.buf[2], self.buf[3]])
    }

    pub fn checksum_valid(&self) -> bool {
        internet_checksum(self.buf) == 0
    }

    pub fn rest_of_header(&self) -> &'a [u8] {
        &self.buf[4..8]
    }

    pub fn data(&self) -> &'a [u8] {
        &self.buf[ICMP_HEADER_LEN..]
    }

    pub fn is_echo_request(&self) -> bool {
        self.icmp_type() == TYPE_ECHO_REQUEST && self.code() == 0
    }
}

/// Turns a parsed echo request into an echo reply with identical identifier,
/// sequence number, and payload — only the type field and checksum change.
pub fn echo_reply(request: &IcmpView<'_>) -> Vec<u8> {
    let mut out = Vec::with_capacity(request.buf.len());
    out.push(TYPE_ECHO_REPLY);
    out.push(0);
    out.extend_from_slice(&[0, 0]); // checksum placeholder
    out.extend_from_slice(request.rest_of_header());
    out.extend_from_slice(request.data());
    fill_checksum(&mut out, 2);
    out
}

/// Builds a type-3 (destination unreachable) or type-11 (time exceeded) message,
/// carrying the offending IP header plus the first 8 bytes that followed it.
pub fn error_message(icmp_type: u8, code: u8, offending_ip_packet: &[u8]) -> Vec<u8> {
    let carried = &offending_ip_packet[..offending_ip_packet.len().min(ICMP_DATA_SIZE)];
    let mut out = Vec::with_capacity(ICMP_HEADER_LEN + ICMP_DATA_SIZE);
    out.push(icmp_type);
    out.push(code);
    out.extend_from_slice(&[0, 0]); // checksum placeholder
    out.extend_from_slice(&[0, 0, 0, 0]); // unused word
    out.extend_from_slice(carried);
    out.resize(ICMP_HEADER_LEN + ICMP_DATA_SIZE, 0);
    fill_checksum(&mut out, 2);
    out
}
