//! IPv4-to-Ethernet resolution cache: a TTL'd entry table plus a queue of
//! frames waiting on in-flight ARP requests, guarded by a single mutex shared
//! with the periodic sweeper.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::codec::ethernet::MacAddr;

pub const ARP_ENTRY_TTL: Duration = Duration::from_secs(15);
pub const ARP_PROBE_INTERVAL: Duration = Duration::from_secs(1);
pub const ARP_MAX_PROBES: u32 = 5;

struct ArpEntry {
    hw_addr: MacAddr,
    inserted_at: Instant,
}

impl ArpEntry {
    fn expired(&self, now: Instant) -> bool {
        now.duration_since(self.inserted_at) > ARP_ENTRY_TTL
    }
}

/// An IP datagram (already TTL-decremented and checksum-fixed, Ethernet header
/// stripped) waiting on resolution of its next hop.
pub struct PendingFrame {
    pub ip_datagram: Vec<u8>,
    pub arrival_if: String,
    pub orig_src_mac: MacAddr,
}

struct ArpRequest {
    last_sent: Instant,
    times_sent: u32,
    pending: Vec<PendingFrame>,
}

/// The pending frames released by a resolved or failed ArpRequest, handed back
/// to the caller so I/O happens outside the cache's lock.
pub struct FlushedRequest {
    pub target_ip: Ipv4Addr,
    pub hw_addr: MacAddr,
    pub pending: Vec<PendingFrame>,
}

/// A request that needs another who-has probe sent, or has exhausted its
/// retries and must be failed with ICMP host-unreachable to each waiter.
pub enum SweepAction {
    Probe { target_ip: Ipv4Addr },
    Failed { pending: Vec<PendingFrame> },
}

struct Inner {
    entries: HashMap<Ipv4Addr, ArpEntry>,
    requests: HashMap<Ipv4Addr, ArpRequest>,
}

/// Thread-safe IP→HW cache. One mutex covers both maps so a reply's
/// insert-then-flush transition is atomic with respect to the sweeper.
pub struct ArpCache {
    inner: Mutex<Inner>,
}

impl ArpCache {
    pub fn new() -> Self {
        ArpCache {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                requests: HashMap::new(),
            }),
        }
    }

    /// Looks up `ip`, purging the entry first if it has expired.
    pub fn lookup(&self, ip: Ipv4Addr, now: Instant) -> Option<MacAddr> {
        let mut inner = self.inner.lock().unwrap();
        let expired = inner.entries.get(&ip).is_some_and(|e| e.expired(now));
        if expired {
            inner.entries.remove(&ip);
            return None;
        }
        inner.entries.get(&ip).map(|e| e.hw_addr)
    }

    /// Queues `frame` behind resolution of `ip`, creating a fresh ArpRequest
    /// (`times_sent = 0`) if one doesn't already exist. Returns `true` when a
    /// new request was created and the caller should send the first probe
    /// immediately.
    pub fn queue_request(
        &self,
        ip: Ipv4Addr,
        ip_datagram: Vec<u8>,
        arrival_if: String,
        orig_src_mac: MacAddr,
        now: Instant,
    ) -> bool {
        let mut inner = self.inner.lock().unwrap();
        let pending_frame = PendingFrame {
            ip_datagram,
            arrival_if,
            orig_src_mac,
        };
        match inner.requests.get_mut(&ip) {
            Some(req) => {
                req.pending.push(pending_frame);
                false
            }
            None => {
                inner.requests.insert(
                    ip,
                    ArpRequest {
                        last_sent: now,
                        times_sent: 0,
                        pending: vec![pending_frame],
                    },
                );
                true
            }
        }
    }

    /// Records that a probe for `ip` was just sent, bumping its retry counter.
    /// Used both by the sweeper and by the dispatcher's immediate first probe.
    pub fn mark_probed(&self, ip: Ipv4Addr, now: Instant) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(req) = inner.requests.get_mut(&ip) {
            req.times_sent += 1;
            req.last_sent = now;
        }
    }

    /// Inserts/refreshes the entry for `ip` and, if a request for it was
    /// outstanding, removes it and returns its pending frames for the caller
    /// to flush. The entry-insert and request-removal happen under one lock
    /// acquisition so a duplicate reply can't double-flush.
    pub fn insert(&self, ip: Ipv4Addr, hw_addr: MacAddr, now: Instant) -> Option<FlushedRequest> {
        let mut inner = self.inner.lock().unwrap();
        inner.entries.insert(
            ip,
            ArpEntry {
                hw_addr,
                inserted_at: now,
            },
        );
        inner.requests.remove(&ip).map(|req| FlushedRequest {
            target_ip: ip,
            hw_addr,
            pending: req.pending,
        })
    }

    /// One sweeper tick. Snapshots which requests are due for action, removes
    /// the failed ones, and returns the actions to perform — all I/O happens
    /// after the lock is released.
    pub fn sweep(&self, now: Instant) -> Vec<SweepAction> {
        let mut inner = self.inner.lock().unwrap();
        let due: Vec<Ipv4Addr> = inner
            .requests
            .iter()
            .filter(|(_, req)| now.duration_since(req.last_sent) >= ARP_PROBE_INTERVAL)
            .map(|(ip, _)| *ip)
            .collect();

        let mut actions = Vec::with_capacity(due.len());
        for ip in due {
            let exhausted = inner
                .requests
                .get(&ip)
                .is_some_and(|req| req.times_sent >= ARP_MAX_PROBES);
            if exhausted {
                if let Some(req) = inner.requests.remove(&ip) {
                    actions.push(SweepAction::Failed {
                        pending: req.pending,
                    });
                }
            } else {
                actions.push(SweepAction::Probe { target_ip: ip });
            }
        }
        actions
    }
}

impl Default for ArpCache {
    fn default() -> Self {
        Self::new()
    }
}
