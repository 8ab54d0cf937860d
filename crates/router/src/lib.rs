//
// Copyright (c) 2024-2025 Elide Technologies, Inc.
//
// Licensed under the MIT license (the "License"); you may not use this file except in compliance
// with the License. You may obtain a copy of the License at
//
// https://opensource.org/license/mit/
//
// Unless required by applicable law or agreed to in writing, software distributed under the License is distributed on
// an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied. See the
// License for the specific language governing permissions and limitations under the License.
//

//! Software IPv4 router core: Ethernet/ARP/IPv4/ICMP dispatch over a
//! host-supplied transport. The host owns sockets, virtual interfaces, and
//! the clock (see [`env::RouterEnv`]); this crate owns only the protocol
//! logic and the ARP resolution cache shared between the receive path and
//! the periodic sweeper.

pub mod arpcache;
pub mod codec;
mod dispatch;
pub mod env;
pub mod iface;
pub mod rtable;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use anyhow::{bail, Context};

use arpcache::{ArpCache, ARP_PROBE_INTERVAL};
use codec::ethernet;
use env::RouterEnv;
use iface::{Interface, InterfaceConfig, InterfaceTable};
use rtable::{RouteConfig, RoutingTable};

/// A configured software router: immutable interface/route tables, a
/// concurrent ARP cache, and a handle to the host environment.
pub struct Router {
    interfaces: InterfaceTable,
    routes: RoutingTable,
    arp: ArpCache,
    env: Arc<dyn RouterEnv>,
}

impl Router {
    /// Validates the host-supplied configuration and builds a `Router`.
    /// Fails fast (before any frame is ever handled) if interface names
    /// collide or a route names an interface that doesn't exist.
    pub fn new(
        interfaces: Vec<InterfaceConfig>,
        routes: Vec<RouteConfig>,
        env: Arc<dyn RouterEnv>,
    ) -> anyhow::Result<Router> {
        if interfaces.is_empty() {
            bail!("router requires at least one interface");
        }
        for (i, a) in interfaces.iter().enumerate() {
            for b in &interfaces[i + 1..] {
                if a.name == b.name {
                    bail!("duplicate interface name {:?}", a.name);
                }
            }
        }
        let interfaces: Vec<Interface> = interfaces.into_iter().map(Interface::from).collect();
        let interface_table = InterfaceTable::new(interfaces);

        for route in &routes {
            interface_table
                .find_by_name(&route.out_interface)
                .with_context(|| {
                    format!(
                        "route to {}/{} names unknown interface {:?}",
                        route.destination, route.mask, route.out_interface
                    )
                })?;
        }
        let routes = RoutingTable::new(routes, &interface_table);

        Ok(Router {
            interfaces: interface_table,
            routes,
            arp: ArpCache::new(),
            env,
        })
    }

    /// Looks up a resolved next-hop hardware address, purging the entry if
    /// it has expired. Exposed so a host can inspect cache state (metrics,
    /// diagnostics) without reaching into the dispatcher's internals.
    pub fn arp_lookup(&self, ip: std::net::Ipv4Addr, now: std::time::Instant) -> Option<ethernet::MacAddr> {
        self.arp.lookup(ip, now)
    }
}

/// Owns the background ARP sweeper thread for a [`Router`], started
/// separately from construction so tests can drive `Router::tick` by hand
/// against a fake clock instead of waiting on wall-clock sleeps.
pub struct Sweeper {
    router: Arc<Router>,
    shutdown: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Sweeper {
    /// Spawns the sweeper thread, ticking roughly once per `ARP_PROBE_INTERVAL`.
    pub fn spawn(router: Arc<Router>) -> Sweeper {
        let shutdown = Arc::new(AtomicBool::new(false));
        let handle = {
            let router = Arc::clone(&router);
            let shutdown = Arc::clone(&shutdown);
            std::thread::Builder::new()
                .name("router-arp-sweeper".into())
                .spawn(move || {
                    while !shutdown.load(Ordering::SeqCst) {
                        std::thread::sleep(ARP_PROBE_INTERVAL);
                        router.tick(router.env.now());
                    }
                })
                .expect("failed to spawn arp sweeper thread")
        };
        Sweeper {
            router,
            shutdown,
            handle: Mutex::new(Some(handle)),
        }
    }

    /// Signals the sweeper to stop and joins its thread. Idempotent.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.lock().unwrap().take() {
            let _ = handle.join();
        }
    }

    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }
}

impl Drop for Sweeper {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::ethernet::MacAddr;
    use std::net::Ipv4Addr;
    use std::time::Instant;

    struct NullEnv;
    impl RouterEnv for NullEnv {
        fn send_packet(&self, _out_if: &str, _frame: &[u8]) -> std::io::Result<()> {
            Ok(())
        }
        fn now(&self) -> Instant {
            Instant::now()
        }
    }

    #[test]
    fn rejects_duplicate_interface_names() {
        let cfg = vec![
            InterfaceConfig {
                name: "eth0".into(),
                mac: MacAddr([0; 6]),
                ip: Ipv4Addr::new(10, 0, 0, 1),
                mask: Ipv4Addr::new(255, 255, 255, 0),
            },
            InterfaceConfig {
                name: "eth0".into(),
                mac: MacAddr([1; 6]),
                ip: Ipv4Addr::new(10, 0, 1, 1),
                mask: Ipv4Addr::new(255, 255, 255, 0),
            },
        ];
        let result = Router::new(cfg, vec![], Arc::new(NullEnv));
        assert!(result.is_err());
    }

    #[test]
    fn rejects_routes_to_unknown_interfaces() {
        let cfg = vec![InterfaceConfig {
            name: "eth0".into(),
            mac: MacAddr([0; 6]),
            ip: Ipv4Addr::new(10, 0, 0, 1),
            mask: Ipv4Addr::new(255, 255, 255, 0),
        }];
        let routes = vec![RouteConfig {
            destination: Ipv4Addr::new(0, 0, 0, 0),
            mask: Ipv4Addr::new(0, 0, 0, 0),
            gateway: Ipv4Addr::UNSPECIFIED,
            out_interface: "eth9".into(),
        }];
        let result = Router::new(cfg, routes, Arc::new(NullEnv));
        assert!(result.is_err());
    }
}
