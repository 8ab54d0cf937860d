//! The seam between the dispatcher/sweeper and whatever actually owns sockets,
//! virtual interfaces, or a wall clock.

use std::time::Instant;

/// Everything the core needs from its host: send a frame, read the clock.
/// Production hosts and the crate's own tests both implement this; the core
/// never touches a socket or `Instant::now()` directly.
pub trait RouterEnv: Send + Sync {
    fn send_packet(&self, out_if: &str, frame: &[u8]) -> std::io::Result<()>;

    fn now(&self) -> Instant;
}
