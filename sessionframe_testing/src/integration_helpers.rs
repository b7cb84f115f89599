//! Socket and timing helpers shared by integration test crates.

use std::{
    net::{Ipv4Addr, SocketAddr, TcpListener as StdTcpListener, UdpSocket as StdUdpSocket},
    time::Duration,
};

use tokio::time::{Instant, sleep};

/// Shared result type for integration tests.
pub type TestResult<T = ()> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

fn localhost() -> SocketAddr { SocketAddr::new(Ipv4Addr::LOCALHOST.into(), 0) }

/// Create a TCP listener bound to a free local port.
///
/// # Errors
///
/// Returns any IO error encountered while binding to an ephemeral localhost
/// port.
pub fn unused_listener() -> std::io::Result<StdTcpListener> { StdTcpListener::bind(localhost()) }

/// Create a UDP socket bound to a free local port.
///
/// # Errors
///
/// Returns any IO error encountered while binding.
pub fn unused_socket() -> std::io::Result<StdUdpSocket> { StdUdpSocket::bind(localhost()) }

/// Poll `condition` every few milliseconds until it holds or `limit` passes.
///
/// Returns whether the condition was met.
pub async fn wait_for(mut condition: impl FnMut() -> bool, limit: Duration) -> bool {
    let deadline = Instant::now() + limit;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        sleep(Duration::from_millis(5)).await;
    }
}
