//! TCP transport for companion sessions.

use crate::error::{ClientError, Stage};
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::debug;

/// Connect to `host:port`, bounded by `connect_timeout`
pub async fn connect_tcp(
    host: &str,
    port: u16,
    connect_timeout: Duration,
) -> Result<TcpStream, ClientError> {
    debug!("Connecting to {}:{}", host, port);

    let stream = tokio::time::timeout(connect_timeout, TcpStream::connect((host, port)))
        .await
        .map_err(|_| ClientError::Timeout(Stage::Connect))?
        .map_err(|e| {
            ClientError::Connection(format!("could not connect to {}:{}: {}", host, port, e))
        })?;

    // Requests are small and latency-bound
    stream.set_nodelay(true)?;

    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_tcp_connect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let stream = connect_tcp("127.0.0.1", port, Duration::from_secs(1))
            .await
            .unwrap();
        assert!(stream.peer_addr().is_ok());
    }

    #[tokio::test]
    async fn test_tcp_connect_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let result = connect_tcp("127.0.0.1", port, Duration::from_secs(1)).await;
        assert!(matches!(result, Err(ClientError::Connection(_))));
    }
}
