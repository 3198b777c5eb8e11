//! TCP readiness check for published service ports

use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout, Instant};
use tracing::debug;

/// How long an accepted connection must stay open to count as ready
///
/// Docker's userland proxy accepts on a published port before anything in
/// the container listens, then closes the connection once it fails to reach
/// the backend.
pub const READY_SETTLE: Duration = Duration::from_millis(200);

/// Poll `host:port` until a connection is accepted and held open, or `limit` elapses
///
/// Returns true once the peer kept a connection open for [`READY_SETTLE`]
/// or sent data on it.
pub async fn wait_for_port(host: &str, port: u16, limit: Duration, interval: Duration) -> bool {
    let deadline = Instant::now() + limit;
    let address = format!("{}:{}", host, port);

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return false;
        }

        match timeout(remaining, TcpStream::connect(&address)).await {
            Ok(Ok(stream)) => {
                if holds_connection(stream).await {
                    debug!("{} is accepting connections", address);
                    return true;
                }
                debug!("{} accepted then closed the connection", address);
            }
            Ok(Err(e)) => debug!("{} not ready: {}", address, e),
            Err(_) => return false,
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        sleep(interval.min(remaining)).await;
    }
}

/// True unless the peer closes or resets the connection within [`READY_SETTLE`]
async fn holds_connection(mut stream: TcpStream) -> bool {
    let mut buf = [0u8; 64];
    match timeout(READY_SETTLE, stream.read(&mut buf)).await {
        Err(_) => true,
        Ok(Ok(read)) => read > 0,
        Ok(Err(_)) => false,
    }
}
