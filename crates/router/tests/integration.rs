//! End-to-end scenarios driven against a `RecordingEnv`: no real sockets, no
//! wall-clock sleeps. Each scenario builds raw frames with the codec, feeds
//! them to `Router::handle_frame`/`Router::tick`, and inspects what the
//! env would have put on the wire.

use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use router::codec::ethernet::{MacAddr, ETHERTYPE_ARP, ETHERTYPE_IPV4};
use router::codec::{arp, checksum, ethernet, icmp, ipv4};
use router::env::RouterEnv;
use router::iface::InterfaceConfig;
use router::rtable::RouteConfig;
use router::Router;

/// An in-memory `RouterEnv`: captures every frame that would have been sent,
/// and hands out a clock the test drives by hand.
struct RecordingEnv {
    sent: Mutex<Vec<(String, Vec<u8>)>>,
    clock: Mutex<Instant>,
}

impl RecordingEnv {
    fn new(start: Instant) -> Self {
        RecordingEnv {
            sent: Mutex::new(Vec::new()),
            clock: Mutex::new(start),
        }
    }

    fn drain(&self) -> Vec<(String, Vec<u8>)> {
        std::mem::take(&mut self.sent.lock().unwrap())
    }
}

impl RouterEnv for RecordingEnv {
    fn send_packet(&self, out_if: &str, frame: &[u8]) -> std::io::Result<()> {
        self.sent.lock().unwrap().push((out_if.to_string(), frame.to_vec()));
        Ok(())
    }

    fn now(&self) -> Instant {
        *self.clock.lock().unwrap()
    }
}

fn mac(last: u8) -> MacAddr {
    MacAddr([0x02, 0, 0, 0, 0, last])
}

fn arp_frame(src_mac: MacAddr, dst_mac: MacAddr, pkt: &arp::ArpPacket) -> Vec<u8> {
    let mut out = Vec::new();
    ethernet::write_header(&mut out, dst_mac, src_mac, ETHERTYPE_ARP);
    out.extend_from_slice(&pkt.to_bytes());
    out
}

fn ip_frame(src_mac: MacAddr, dst_mac: MacAddr, ip_datagram: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    ethernet::write_header(&mut out, dst_mac, src_mac, ETHERTYPE_IPV4);
    out.extend_from_slice(ip_datagram);
    out
}

fn echo_request_icmp(ident: u16, seq: u16, payload: &[u8]) -> Vec<u8> {
    let mut out = vec![icmp::TYPE_ECHO_REQUEST, 0, 0, 0];
    out.extend_from_slice(&ident.to_be_bytes());
    out.extend_from_slice(&seq.to_be_bytes());
    out.extend_from_slice(payload);
    checksum::fill_checksum(&mut out, 2);
    out
}

/// `eth0` = 10.0.0.1/24, `eth1` = 10.0.2.1/24, with a static route sending
/// 10.0.1.0/24 directly out `eth1` (no gateway hop).
fn two_interface_router(env: Arc<RecordingEnv>) -> Arc<Router> {
    let interfaces = vec![
        InterfaceConfig {
            name: "eth0".into(),
            mac: mac(1),
            ip: Ipv4Addr::new(10, 0, 0, 1),
            mask: Ipv4Addr::new(255, 255, 255, 0),
        },
        InterfaceConfig {
            name: "eth1".into(),
            mac: mac(2),
            ip: Ipv4Addr::new(10, 0, 2, 1),
            mask: Ipv4Addr::new(255, 255, 255, 0),
        },
    ];
    let routes = vec![RouteConfig {
        destination: Ipv4Addr::new(10, 0, 1, 0),
        mask: Ipv4Addr::new(255, 255, 255, 0),
        gateway: Ipv4Addr::UNSPECIFIED,
        out_interface: "eth1".into(),
    }];
    Arc::new(Router::new(interfaces, routes, env).unwrap())
}

#[test]
fn s1_arp_request_to_us_gets_a_reply() {
    let env = Arc::new(RecordingEnv::new(Instant::now()));
    let router = two_interface_router(Arc::clone(&env));

    let requester_mac = MacAddr([0x02, 0xaa, 0, 0, 0, 1]);
    let req = arp::ArpPacket::request(requester_mac, Ipv4Addr::new(10, 0, 0, 2), Ipv4Addr::new(10, 0, 0, 1));
    let frame = arp_frame(requester_mac, MacAddr::BROADCAST, &req);

    router.handle_frame(&frame, "eth0");

    assert_eq!(
        router.arp_lookup(Ipv4Addr::new(10, 0, 0, 2), env.now()),
        Some(requester_mac)
    );

    let sent = env.drain();
    assert_eq!(sent.len(), 1);
    let (out_if, reply_bytes) = &sent[0];
    assert_eq!(out_if, "eth0");
    let eth = ethernet::EthernetView::new(reply_bytes);
    assert_eq!(eth.src(), mac(1));
    assert_eq!(eth.dst(), requester_mac);
    let reply = arp::ArpPacket::parse(eth.payload()).unwrap();
    assert_eq!(reply.opcode, arp::ARP_OP_REPLY);
    assert_eq!(reply.sender_hw, mac(1));
    assert_eq!(reply.sender_ip, Ipv4Addr::new(10, 0, 0, 1));
    assert_eq!(reply.target_hw, requester_mac);
    assert_eq!(reply.target_ip, Ipv4Addr::new(10, 0, 0, 2));
}

#[test]
fn s2_forward_with_cache_miss_then_hit() {
    let env = Arc::new(RecordingEnv::new(Instant::now()));
    let router = two_interface_router(Arc::clone(&env));

    let client_mac = MacAddr([0x02, 0xcc, 0, 0, 0, 5]);
    let datagram = ipv4::build(
        10,
        0,
        17,
        Ipv4Addr::new(10, 0, 0, 5),
        Ipv4Addr::new(10, 0, 1, 5),
        1,
        false,
        b"hello",
    );
    let frame = ip_frame(client_mac, mac(1), &datagram);

    router.handle_frame(&frame, "eth0");

    let sent = env.drain();
    assert_eq!(sent.len(), 1, "only the arp probe should go out, no ip frame yet");
    let (out_if, probe_bytes) = &sent[0];
    assert_eq!(out_if, "eth1");
    let eth = ethernet::EthernetView::new(probe_bytes);
    assert_eq!(eth.ethertype(), ETHERTYPE_ARP);
    let probe = arp::ArpPacket::parse(eth.payload()).unwrap();
    assert_eq!(probe.opcode, arp::ARP_OP_REQUEST);
    assert_eq!(probe.target_ip, Ipv4Addr::new(10, 0, 1, 5));

    let responder_mac = MacAddr([0x02, 0xbb, 0, 0, 0, 5]);
    let reply = arp::ArpPacket::reply(responder_mac, Ipv4Addr::new(10, 0, 1, 5), mac(2), Ipv4Addr::new(10, 0, 2, 1));
    let reply_frame = arp_frame(responder_mac, mac(2), &reply);
    router.handle_frame(&reply_frame, "eth1");

    let sent = env.drain();
    assert_eq!(sent.len(), 1, "the queued ip frame should flush exactly once");
    let (out_if, forwarded_bytes) = &sent[0];
    assert_eq!(out_if, "eth1");
    let eth = ethernet::EthernetView::new(forwarded_bytes);
    assert_eq!(eth.ethertype(), ETHERTYPE_IPV4);
    assert_eq!(eth.src(), mac(2));
    assert_eq!(eth.dst(), responder_mac);
    let ip = ipv4::Ipv4View::parse(eth.payload()).unwrap();
    assert_eq!(ip.ttl(), 9, "ttl must be decremented exactly once");
    assert!(ip.checksum_valid());
    assert_eq!(ip.dst(), Ipv4Addr::new(10, 0, 1, 5));
}

#[test]
fn s3_five_probes_then_host_unreachable() {
    let t0 = Instant::now();
    let env = Arc::new(RecordingEnv::new(t0));
    let router = two_interface_router(Arc::clone(&env));

    let client_mac = MacAddr([0x02, 0xcc, 0, 0, 0, 9]);
    let datagram = ipv4::build(
        10,
        0,
        17,
        Ipv4Addr::new(10, 0, 0, 9),
        Ipv4Addr::new(10, 0, 1, 9),
        1,
        false,
        b"x",
    );
    let frame = ip_frame(client_mac, mac(1), &datagram);
    router.handle_frame(&frame, "eth0");
    let first_probe = env.drain();
    assert_eq!(first_probe.len(), 1, "immediate first probe on queue");

    let mut now = t0;
    let mut probes_seen = 1;
    for _ in 0..4 {
        now += Duration::from_secs(1);
        router.tick(now);
        let sent = env.drain();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "eth1");
        probes_seen += 1;
    }
    assert_eq!(probes_seen, 5);

    now += Duration::from_secs(1);
    router.tick(now);
    let sent = env.drain();
    assert_eq!(sent.len(), 1, "exactly one icmp host-unreachable for the one waiting frame");
    let (out_if, unreachable_bytes) = &sent[0];
    assert_eq!(out_if, "eth0");
    let eth = ethernet::EthernetView::new(unreachable_bytes);
    assert_eq!(eth.dst(), client_mac);
    let ip = ipv4::Ipv4View::parse(eth.payload()).unwrap();
    assert_eq!(ip.dst(), Ipv4Addr::new(10, 0, 0, 9));
    let icmp_view = icmp::IcmpView::parse(ip.payload()).unwrap();
    assert_eq!(icmp_view.icmp_type(), icmp::TYPE_UNREACHABLE);
    assert_eq!(icmp_view.code(), icmp::CODE_HOST_UNREACHABLE);

    assert_eq!(router.arp_lookup(Ipv4Addr::new(10, 0, 1, 9), now), None);
}

#[test]
fn s4_ttl_one_forward_yields_time_exceeded() {
    let env = Arc::new(RecordingEnv::new(Instant::now()));
    let router = two_interface_router(Arc::clone(&env));

    let client_mac = MacAddr([0x02, 0xcc, 0, 0, 0, 7]);
    let datagram = ipv4::build(
        1,
        0,
        17,
        Ipv4Addr::new(10, 0, 0, 7),
        Ipv4Addr::new(10, 0, 1, 200),
        1,
        false,
        b"y",
    );
    let frame = ip_frame(client_mac, mac(1), &datagram);
    router.handle_frame(&frame, "eth0");

    let sent = env.drain();
    assert_eq!(sent.len(), 1, "no forwarded frame, only the icmp error");
    let (out_if, bytes) = &sent[0];
    assert_eq!(out_if, "eth0");
    let eth = ethernet::EthernetView::new(bytes);
    let ip = ipv4::Ipv4View::parse(eth.payload()).unwrap();
    assert_eq!(ip.src(), Ipv4Addr::new(10, 0, 0, 1));
    assert_eq!(ip.dst(), Ipv4Addr::new(10, 0, 0, 7));
    let icmp_view = icmp::IcmpView::parse(ip.payload()).unwrap();
    assert_eq!(icmp_view.icmp_type(), icmp::TYPE_TIME_EXCEEDED);
    assert_eq!(icmp_view.code(), icmp::CODE_TTL_EXCEEDED);
}

#[test]
fn s5_echo_request_to_us_gets_a_reply() {
    let env = Arc::new(RecordingEnv::new(Instant::now()));
    let router = two_interface_router(Arc::clone(&env));

    let client_mac = MacAddr([0x02, 0xcc, 0, 0, 0, 2]);
    let echo = echo_request_icmp(0x1234, 1, b"ping-payload");
    let datagram = ipv4::build(
        64,
        0,
        ipv4::PROTO_ICMP,
        Ipv4Addr::new(10, 0, 0, 2),
        Ipv4Addr::new(10, 0, 0, 1),
        1,
        false,
        &echo,
    );
    let frame = ip_frame(client_mac, mac(1), &datagram);

    router.handle_frame(&frame, "eth0");

    let sent = env.drain();
    assert_eq!(sent.len(), 1);
    let (out_if, bytes) = &sent[0];
    assert_eq!(out_if, "eth0");
    let eth = ethernet::EthernetView::new(bytes);
    assert_eq!(eth.src(), mac(1));
    assert_eq!(eth.dst(), client_mac);
    let ip = ipv4::Ipv4View::parse(eth.payload()).unwrap();
    assert!(ip.checksum_valid());
    assert_eq!(ip.src(), Ipv4Addr::new(10, 0, 0, 1));
    assert_eq!(ip.dst(), Ipv4Addr::new(10, 0, 0, 2));
    let icmp_view = icmp::IcmpView::parse(ip.payload()).unwrap();
    assert!(icmp_view.checksum_valid());
    assert_eq!(icmp_view.icmp_type(), icmp::TYPE_ECHO_REPLY);
    assert_eq!(icmp_view.data(), b"ping-payload");
}

#[test]
fn s6_no_route_yields_net_unreachable() {
    let env = Arc::new(RecordingEnv::new(Instant::now()));
    let router = two_interface_router(Arc::clone(&env));

    let client_mac = MacAddr([0x02, 0xcc, 0, 0, 0, 3]);
    let datagram = ipv4::build(
        32,
        0,
        17,
        Ipv4Addr::new(10, 0, 0, 3),
        Ipv4Addr::new(192, 168, 77, 7),
        1,
        false,
        b"z",
    );
    let frame = ip_frame(client_mac, mac(1), &datagram);

    router.handle_frame(&frame, "eth0");

    let sent = env.drain();
    assert_eq!(sent.len(), 1);
    let (out_if, bytes) = &sent[0];
    assert_eq!(out_if, "eth0");
    let eth = ethernet::EthernetView::new(bytes);
    let ip = ipv4::Ipv4View::parse(eth.payload()).unwrap();
    let icmp_view = icmp::IcmpView::parse(ip.payload()).unwrap();
    assert_eq!(icmp_view.icmp_type(), icmp::TYPE_UNREACHABLE);
    assert_eq!(icmp_view.code(), icmp::CODE_NET_UNREACHABLE);
}

