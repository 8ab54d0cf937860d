//! ARP (RFC 826) packet view, restricted to Ethernet/IPv4.

use super::ethernet::{MacAddr, ETHER_ADDR_LEN};
use std::net::Ipv4Addr;

pub const ARP_HEADER_LEN: usize = 28;

pub const HTYPE_ETHERNET: u16 = 1;
pub const PTYPE_IPV4: u16 = 0x0800;

pub const ARP_OP_REQUEST: u16 = 1;
pub const ARP_OP_REPLY: u16 = 2;

/// A fully decoded ARP packet (owned — small and fixed-size, no reason to borrow).
#[derive(Debug, Clone, Copy)]
pub struct ArpPacket {
    pub hardware_type: u16,
    pub protocol_type: u16,
    pub hardware_len: u8,
    pub protocol_len: u8,
    pub opcode: u16,
    pub sender_hw: MacAddr,
    pub sender_ip: Ipv4Addr,
    pub target_hw: MacAddr,
    pub target_ip: Ipv4Addr,
}

impl ArpPacket {
    /// Parses the ARP payload starting at `data[0]` (i.e. just past the Ethernet header).
    /// Returns `None` if the opcode is unsupported or hardware/protocol types mismatch
    /// our Ethernet/IPv4-only assumption.
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < ARP_HEADER_LEN {
            return None;
        }
        let hardware_type = u16::from_be_bytes([data[0], data[1]]);
        let protocol_type = u16::from_be_bytes([data[2], data[3]]);
        let hardware_len = data[4];
        let protocol_len = data[5];
        let opcode = u16::from_be_bytes([data[6], data[7]]);
        if hardware_type != HTYPE_ETHERNET
            || protocol_type != PTYPE_IPV4
            || hardware_len as usize != ETHER_ADDR_LEN
            || protocol_len != 4
        {
            return None;
        }
        if opcode != ARP_OP_REQUEST && opcode != ARP_OP_REPLY {
            return None;
        }
        Some(ArpPacket {
            hardware_type,
            protocol_type,
            hardware_len,
            protocol_len,
            opcode,
            sender_hw: MacAddr::from_bytes(&data[8..14]),
            sender_ip: Ipv4Addr::new(data[14], data[15], data[16], data[17]),
            target_hw: MacAddr::from_bytes(&data[18..24]),
            target_ip: Ipv4Addr::new(data[24], data[25], data[26], data[27]),
        })
    }

    pub fn is_request(&self) -> bool {
        self.opcode == ARP_OP_REQUEST
    }

    /// Builds an ARP who-has request asking for `target_ip`'s hardware address.
    pub fn request(sender_hw: MacAddr, sender_ip: Ipv4Addr, target_ip: Ipv4Addr) -> Self {
        ArpPacket {
            hardware_type: HTYPE_ETHERNET,
            protocol_type: PTYPE_IPV4,
            hardware_len: ETHER_ADDR_LEN as u8,
            protocol_len: 4,
            opcode: ARP_OP_REQUEST,
            sender_hw,
            sender_ip,
            target_hw: MacAddr([0; 6]),
            target_ip,
        }
    }

    /// Builds a reply addressed back to `target_hw`/`target_ip` (the original requester).
    pub fn reply(
        sender_hw: MacAddr,
        sender_ip: Ipv4Addr,
        target_hw: MacAddr,
        target_ip: Ipv4Addr,
    ) -> Self {
        ArpPacket {
            hardware_type: HTYPE_ETHERNET,
            protocol_type: PTYPE_IPV4,
            hardware_len: ETHER_ADDR_LEN as u8,
            protocol_len: 4,
            opcode: ARP_OP_REPLY,
            sender_hw,
            sender_ip,
            target_hw,
            target_ip,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(ARP_HEADER_LEN);
        out.extend_from_slice(&self.hardware_type.to_be_bytes());
        out.extend_from_slice(&self.protocol_type.to_be_bytes());
        out.push(self.hardware_len);
        out.push(self.protocol_len);
        out.extend_from_slice(&self.opcode.to_be_bytes());
        out.extend_from_slice(&self.sender_hw.0);
        out.extend_from_slice(&self.sender_ip.octets());
        out.extend_from_slice(&self.target_hw.0);
        out.extend_from_slice(&self.target_ip.octets());
        out
    }
}
