//! The packet dispatcher: `Router::handle_frame` and the ARP sweeper tick it
//! shares a cache with. Every error condition named in the taxonomy below
//! terminates locally — this module never returns a `Result`.

use std::net::Ipv4Addr;

use crate::arpcache::{FlushedRequest, PendingFrame, SweepAction};
use crate::codec::ethernet::{self, EthernetView, MacAddr, ETHERTYPE_ARP, ETHERTYPE_IPV4};
use crate::codec::ipv4::Ipv4View;
use crate::codec::{accepts_arp, accepts_frame, accepts_icmp, accepts_ip};
use crate::codec::{arp, icmp, ipv4};
use crate::iface::Interface;
use crate::Router;

const INIT_TTL: u8 = 64;

impl Router {
    /// Entry point for a frame arriving on `arrival_if`. Never panics on
    /// malformed input, never propagates an error: every branch either sends
    /// zero or more frames or logs and returns.
    pub fn handle_frame(&self, frame: &[u8], arrival_if: &str) {
        let Some(arrival) = self.interfaces.find_by_name(arrival_if) else {
            tracing::error!(arrival_if, "frame delivered to unknown interface");
            return;
        };
        if !accepts_frame(frame.len()) {
            tracing::trace!(len = frame.len(), "frame too short to hold an Ethernet header");
            return;
        }
        let eth = EthernetView::new(frame);
        match eth.ethertype() {
            ETHERTYPE_ARP => self.handle_arp(frame, &eth, arrival),
            ETHERTYPE_IPV4 => self.handle_ipv4(frame.len(), &eth, arrival),
            other => tracing::trace!(ethertype = format!("{other:#06x}"), "dropping unknown ethertype"),
        }
    }

    fn handle_arp(&self, frame: &[u8], eth: &EthernetView<'_>, arrival: &Interface) {
        if !accepts_arp(frame.len()) {
            tracing::warn!(len = frame.len(), "arp frame too short");
            return;
        }
        let Some(pkt) = arp::ArpPacket::parse(eth.payload()) else {
            tracing::warn!("dropping arp frame with unsupported opcode/hwtype");
            return;
        };

        if pkt.is_request() {
            tracing::debug!(sender_ip = %pkt.sender_ip, ?pkt.sender_hw, "arp request received");
            if let Some(flushed) = self.arp.insert(pkt.sender_ip, pkt.sender_hw, self.env.now()) {
                self.flush_pending(flushed);
            }
            let reply = arp::ArpPacket::reply(arrival.mac, arrival.ip, pkt.sender_hw, pkt.sender_ip);
            let out = self.build_arp_frame(arrival.mac, pkt.sender_hw, &reply);
            self.send(&arrival.name, &out);
            return;
        }

        // Reply. The entry is learned regardless of who it's addressed to;
        // only flushing our own pending frames is gated on that.
        tracing::debug!(sender_ip = %pkt.sender_ip, ?pkt.sender_hw, "arp reply received");
        let flushed = self.arp.insert(pkt.sender_ip, pkt.sender_hw, self.env.now());
        if pkt.target_ip != arrival.ip {
            tracing::trace!(target_ip = %pkt.target_ip, "ignoring arp reply not addressed to us");
            return;
        }
        if let Some(flushed) = flushed {
            self.flush_pending(flushed);
        }
    }

    /// Sends every frame that was waiting on a just-resolved (or just
    /// overheard) next hop, in FIFO arrival order.
    fn flush_pending(&self, flushed: FlushedRequest) {
        for pending in flushed.pending {
            self.flush_one(&flushed.hw_addr, pending);
        }
    }

    fn flush_one(&self, hw_addr: &MacAddr, pending: PendingFrame) {
        let Some(dest) = Ipv4View::parse(&pending.ip_datagram).map(|v| v.dst()) else {
            tracing::error!("pending frame's ip datagram no longer parses");
            return;
        };
        let Some(out_iface) = self.resolve_out_interface(dest) else {
            tracing::warn!(dest = %dest, "route vanished before pending frame could flush");
            return;
        };
        // ttl/checksum were already fixed up at queue_request time (handle_ip_forward);
        // nothing left to recompute before sending.
        let datagram = pending.ip_datagram;
        let frame = self.build_ip_frame(out_iface.mac, *hw_addr, &datagram);
        self.send(&out_iface.name, &frame);
    }

    fn handle_ipv4(&self, frame_len: usize, eth: &EthernetView<'_>, arrival: &Interface) {
        if !accepts_ip(frame_len) {
            tracing::warn!(len = frame_len, "ip frame too short");
            return;
        }
        let payload = eth.payload();
        let Some(view) = Ipv4View::parse(payload) else {
            tracing::warn!("dropping malformed ip header");
            return;
        };
        if !view.checksum_valid() {
            tracing::warn!(src = %view.src(), "dropping ip frame with bad checksum");
            return;
        }

        if let Some(dst_iface) = self.interfaces.find_by_ip(view.dst()) {
            self.handle_ip_for_us(eth, &view, dst_iface);
        } else {
            self.handle_ip_forward(eth, &view, arrival);
        }
    }

    fn handle_ip_for_us(&self, eth: &EthernetView<'_>, view: &Ipv4View<'_>, dst_iface: &Interface) {
        if view.protocol() == ipv4::PROTO_ICMP && accepts_icmp(view.payload().len()) {
            if let Some(icmp_view) = icmp::IcmpView::parse(view.payload()) {
                if icmp_view.is_echo_request() && icmp_view.checksum_valid() {
                    tracing::debug!(src = %view.src(), "answering icmp echo request");
                    let reply_icmp = icmp::echo_reply(&icmp_view);
                    let reply_ip = ipv4::build(
                        INIT_TTL,
                        view.tos(),
                        ipv4::PROTO_ICMP,
                        dst_iface.ip,
                        view.src(),
                        view.identification(),
                        view.df(),
                        &reply_icmp,
                    );
                    self.send_on_return_path(view.src(), dst_iface, eth.src(), &reply_ip);
                    return;
                }
            }
        }
        tracing::warn!(src = %view.src(), protocol = view.protocol(), "unsupported transport addressed to us");
        let error_icmp = icmp::error_message(icmp::TYPE_UNREACHABLE, icmp::CODE_PORT_UNREACHABLE, view.raw());
        let error_ip = ipv4::build(
            INIT_TTL,
            view.tos(),
            ipv4::PROTO_ICMP,
            dst_iface.ip,
            view.src(),
            view.identification(),
            true,
            &error_icmp,
        );
        let frame = self.build_ip_frame(dst_iface.mac, eth.src(), &error_ip);
        self.send(&dst_iface.name, &frame);
    }

    /// Sends an echo reply out the interface on the longest-prefix-match
    /// return path to `original_src`, per the in-place ICMP contract — not
    /// necessarily the interface whose IP the request happened to target.
    /// Falls back through the ARP cache/queue exactly as forwarding does.
    fn send_on_return_path(
        &self,
        original_src: Ipv4Addr,
        fallback_iface: &Interface,
        requester_mac: MacAddr,
        reply_ip: &[u8],
    ) {
        let Some(resolved) = self.resolve_route(original_src) else {
            tracing::warn!(dst = %original_src, "no return route for echo reply, falling back to request's interface");
            let frame = self.build_ip_frame(fallback_iface.mac, requester_mac, reply_ip);
            self.send(&fallback_iface.name, &frame);
            return;
        };
        let Some(out_iface) = self.interfaces.find_by_name(&resolved.out_interface) else {
            tracing::error!(out_interface = resolved.out_interface, "route names unknown interface");
            return;
        };

        match self.arp.lookup(resolved.next_hop, self.env.now()) {
            Some(hw) => {
                let frame = self.build_ip_frame(out_iface.mac, hw, reply_ip);
                self.send(&out_iface.name, &frame);
            }
            None => {
                tracing::debug!(next_hop = %resolved.next_hop, "queuing echo reply for arp resolution");
                let is_new = self.arp.queue_request(
                    resolved.next_hop,
                    reply_ip.to_vec(),
                    fallback_iface.name.clone(),
                    requester_mac,
                    self.env.now(),
                );
                if is_new {
                    self.arp.mark_probed(resolved.next_hop, self.env.now());
                    self.send_arp_probe(out_iface, resolved.next_hop);
                }
            }
        }
    }

    fn handle_ip_forward(&self, eth: &EthernetView<'_>, view: &Ipv4View<'_>, arrival: &Interface) {
        if view.ttl() <= 1 {
            tracing::warn!(src = %view.src(), dst = %view.dst(), "ttl expired in transit");
            let error_icmp = icmp::error_message(icmp::TYPE_TIME_EXCEEDED, icmp::CODE_TTL_EXCEEDED, view.raw());
            let error_ip = ipv4::build(
                INIT_TTL,
                view.tos(),
                ipv4::PROTO_ICMP,
                arrival.ip,
                view.src(),
                view.identification(),
                true,
                &error_icmp,
            );
            let frame = self.build_ip_frame(arrival.mac, eth.src(), &error_ip);
            self.send(&arrival.name, &frame);
            return;
        }

        let mut datagram = view.header().to_vec();
        datagram.extend_from_slice(view.payload());
        ipv4::decrement_ttl(&mut datagram);

        let Some(resolved) = self.resolve_route(view.dst()) else {
            tracing::warn!(dst = %view.dst(), "no route");
            let error_icmp = icmp::error_message(icmp::TYPE_UNREACHABLE, icmp::CODE_NET_UNREACHABLE, view.raw());
            let error_ip = ipv4::build(
                INIT_TTL,
                view.tos(),
                ipv4::PROTO_ICMP,
                arrival.ip,
                view.src(),
                view.identification(),
                true,
                &error_icmp,
            );
            let frame = self.build_ip_frame(arrival.mac, eth.src(), &error_ip);
            self.send(&arrival.name, &frame);
            return;
        };
        let Some(out_iface) = self.interfaces.find_by_name(&resolved.out_interface) else {
            tracing::error!(out_interface = resolved.out_interface, "route names unknown interface");
            return;
        };

        match self.arp.lookup(resolved.next_hop, self.env.now()) {
            Some(hw) => {
                let frame = self.build_ip_frame(out_iface.mac, hw, &datagram);
                self.send(&out_iface.name, &frame);
            }
            None => {
                tracing::debug!(next_hop = %resolved.next_hop, "queuing frame for arp resolution");
                let is_new = self.arp.queue_request(
                    resolved.next_hop,
                    datagram,
                    arrival.name.clone(),
                    eth.src(),
                    self.env.now(),
                );
                if is_new {
                    self.arp.mark_probed(resolved.next_hop, self.env.now());
                    self.send_arp_probe(out_iface, resolved.next_hop);
                }
            }
        }
    }

    /// Runs one sweeper tick: reissues due probes, fails exhausted requests
    /// with ICMP host-unreachable per waiting frame.
    pub fn tick(&self, now: std::time::Instant) {
        for action in self.arp.sweep(now) {
            match action {
                SweepAction::Probe { target_ip } => {
                    let Some(out_iface) = self.interface_for_next_hop(target_ip) else {
                        continue;
                    };
                    self.arp.mark_probed(target_ip, now);
                    self.send_arp_probe(out_iface, target_ip);
                }
                SweepAction::Failed { pending } => {
                    for frame in pending {
                        self.fail_pending(frame);
                    }
                }
            }
        }
    }

    fn fail_pending(&self, pending: PendingFrame) {
        let Some(arrival) = self.interfaces.find_by_name(&pending.arrival_if) else {
            return;
        };
        tracing::warn!(arrival_if = %pending.arrival_if, "arp resolution exhausted, sending host unreachable");
        let error_icmp = icmp::error_message(
            icmp::TYPE_UNREACHABLE,
            icmp::CODE_HOST_UNREACHABLE,
            &pending.ip_datagram,
        );
        let Some(orig) = Ipv4View::parse(&pending.ip_datagram) else {
            return;
        };
        let error_ip = ipv4::build(
            INIT_TTL,
            orig.tos(),
            ipv4::PROTO_ICMP,
            arrival.ip,
            orig.src(),
            orig.identification(),
            true,
            &error_icmp,
        );
        let frame = self.build_ip_frame(arrival.mac, pending.orig_src_mac, &error_ip);
        self.send(&arrival.name, &frame);
    }

    fn send_arp_probe(&self, out_iface: &Interface, target_ip: Ipv4Addr) {
        let req = arp::ArpPacket::request(out_iface.mac, out_iface.ip, target_ip);
        let frame = self.build_arp_frame(out_iface.mac, MacAddr::BROADCAST, &req);
        self.send(&out_iface.name, &frame);
    }

    fn interface_for_next_hop(&self, next_hop: Ipv4Addr) -> Option<&Interface> {
        self.resolve_out_interface(next_hop)
    }

    fn resolve_route(&self, dest: Ipv4Addr) -> Option<crate::rtable::ResolvedRoute> {
        self.routes.resolve(dest)
    }

    fn resolve_out_interface(&self, dest: Ipv4Addr) -> Option<&Interface> {
        let resolved = self.routes.resolve(dest)?;
        self.interfaces.find_by_name(&resolved.out_interface)
    }

    fn build_arp_frame(&self, src: MacAddr, dst: MacAddr, pkt: &arp::ArpPacket) -> Vec<u8> {
        let mut out = Vec::with_capacity(ethernet::ETHERNET_HEADER_LEN + arp::ARP_HEADER_LEN);
        ethernet::write_header(&mut out, dst, src, ETHERTYPE_ARP);
        out.extend_from_slice(&pkt.to_bytes());
        out
    }

    fn build_ip_frame(&self, src: MacAddr, dst: MacAddr, ip_datagram: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(ethernet::ETHERNET_HEADER_LEN + ip_datagram.len());
        ethernet::write_header(&mut out, dst, src, ETHERTYPE_IPV4);
        out.extend_from_slice(ip_datagram);
        out
    }

    fn send(&self, out_if: &str, frame: &[u8]) {
        if let Err(error) = self.env.send_packet(out_if, frame) {
            tracing::error!(out_if, ?error, "send_packet failed");
        }
    }
}
