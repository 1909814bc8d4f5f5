//! Helpers for exercising the relay against a throwaway upstream.

use crate::{AppState, RelayConfig};
use axum::Router;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use url::Url;

/// AppState with the embedded dashboard and the default 500 ms timeout.
pub fn create_test_app_state(upstream_url: Url) -> AppState {
    create_test_app_state_with_timeout(upstream_url, Duration::from_millis(500))
}

pub fn create_test_app_state_with_timeout(upstream_url: Url, timeout: Duration) -> AppState {
    let config = RelayConfig {
        upstream_url,
        upstream_timeout_ms: timeout.as_millis() as u64,
        listen_addr: "127.0.0.1:0".parse().unwrap(),
        templates_dir: None,
    };
    AppState::new(config).expect("Failed to build test app state")
}

/// Serve `router` on an ephemeral localhost port for the rest of the test.
pub async fn spawn_upstream(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test upstream");
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

pub fn upstream_url(addr: SocketAddr, path: &str) -> Url {
    format!("http://{}{}", addr, path).parse().unwrap()
}

/// A localhost URL nothing is listening on.
pub fn unreachable_url() -> Url {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    upstream_url(addr, "/stats")
}

/// A listener whose accept queue is already full, so new handshakes stall.
///
/// Keep the returned listener and streams alive for as long as the stall is needed.
pub async fn saturated_listener() -> (TcpListener, Vec<TcpStream>, SocketAddr) {
    let socket = TcpSocket::new_v4().unwrap();
    socket.bind("127.0.0.1:0".parse().unwrap()).unwrap();
    let listener = socket.listen(0).unwrap();
    let addr = listener.local_addr().unwrap();

    let mut held = Vec::new();
    for _ in 0..16 {
        match tokio::time::timeout(Duration::from_millis(100), TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => held.push(stream),
            _ => break,
        }
    }
    (listener, held, addr)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_test_app_state() {
        let state = create_test_app_state("http://127.0.0.1:8453/stats".parse().unwrap());
        assert_eq!(state.upstream.timeout(), Duration::from_millis(500));
        assert_eq!(state.upstream.url().as_str(), "http://127.0.0.1:8453/stats");
    }
}
