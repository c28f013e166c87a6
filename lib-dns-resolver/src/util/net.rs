use async_trait::async_trait;
use bytes::BytesMut;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::timeout;

use dns_types::protocol::types::HEADER_MASK_TC;

/// The largest response datagram the transport will read.  1232
/// octets is the safe payload bound for unfragmented UDP; 512 would
/// be the strict RFC 1035 figure.
pub const MAX_RESPONSE_SIZE: usize = 1232;

/// Check that two serialised messages carry the same transaction ID:
/// the ID is the first two octets of a message.
pub fn id_matches(m1: &[u8], m2: &[u8]) -> bool {
    m1.len() >= 2 && m2.len() >= 2 && m1[0] == m2[0] && m1[1] == m2[1]
}

/// How an exchange with a nameserver can fail.
#[derive(Debug)]
pub enum TransportError {
    /// The deadline passed with no datagram arriving.
    Timeout,

    /// The response ID does not match the query ID.
    IdMismatch,

    /// The response has the TC bit set.  This resolver does not fall
    /// back to TCP, so a truncated response is fatal.
    Truncated,

    /// Any underlying I/O failure.
    Network(io::Error),
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            TransportError::Timeout => write!(f, "timed out"),
            TransportError::IdMismatch => {
                write!(f, "response ID does not match the query ID")
            }
            TransportError::Truncated => write!(f, "response truncated"),
            TransportError::Network(error) => write!(f, "network error: {error}"),
        }
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TransportError::Network(error) => Some(error),
            _ => None,
        }
    }
}

impl From<io::Error> for TransportError {
    fn from(error: io::Error) -> Self {
        TransportError::Network(error)
    }
}

/// How the resolver talks to a nameserver.  The engine only needs a
/// single request / response exchange; putting it behind a trait
/// means tests can script the servers instead of using the network.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn exchange(
        &self,
        server: SocketAddr,
        request: &[u8],
    ) -> Result<Vec<u8>, TransportError>;
}

/// The real transport: a one-shot UDP exchange.
///
/// Each call binds a fresh socket, sends the query, and reads a
/// single datagram, with the whole exchange bounded by the deadline.
/// There are no retries: retrying is the resolver's concern, not the
/// transport's.
#[derive(Debug, Clone, Copy)]
pub struct UdpTransport {
    timeout: Duration,
}

impl UdpTransport {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl Transport for UdpTransport {
    async fn exchange(
        &self,
        server: SocketAddr,
        request: &[u8],
    ) -> Result<Vec<u8>, TransportError> {
        match timeout(self.timeout, exchange_udp(server, request)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout),
        }
    }
}

/// Deadline-less body of the UDP exchange.
async fn exchange_udp(server: SocketAddr, request: &[u8]) -> Result<Vec<u8>, TransportError> {
    let bind_address = if server.is_ipv6() { "[::]:0" } else { "0.0.0.0:0" };
    let sock = UdpSocket::bind(bind_address).await?;
    sock.connect(server).await?;
    sock.send(request).await?;

    let mut buf = BytesMut::zeroed(MAX_RESPONSE_SIZE);
    let len = sock.recv(&mut buf).await?;
    buf.truncate(len);

    if !id_matches(request, &buf) {
        return Err(TransportError::IdMismatch);
    }

    if buf.len() > 2 && buf[2] & HEADER_MASK_TC != 0 {
        return Err(TransportError::Truncated);
    }

    Ok(buf.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_matches_compares_first_two_octets() {
        assert!(id_matches(&[0x00, 0x16, 1, 2, 3], &[0x00, 0x16, 9, 9]));
        assert!(!id_matches(&[0x00, 0x16, 1, 2, 3], &[0x00, 0x14]));
    }

    #[test]
    fn id_matches_rejects_short_messages() {
        assert!(!id_matches(&[0x00], &[0x00, 0x16]));
        assert!(!id_matches(&[0x00, 0x16], &[]));
    }

    #[tokio::test]
    async fn udp_transport_times_out() {
        // bind a socket that never answers
        let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let server = silent.local_addr().unwrap();

        let transport = UdpTransport::new(Duration::from_millis(50));
        let result = transport.exchange(server, &[0, 22, 0, 0]).await;

        assert!(matches!(result, Err(TransportError::Timeout)));
    }

    #[tokio::test]
    async fn udp_transport_checks_id() {
        let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let server = peer.local_addr().unwrap();

        tokio::spawn(async move {
            let mut buf = [0u8; 512];
            let (_, addr) = peer.recv_from(&mut buf).await.unwrap();
            peer.send_to(&[0, 23, 0, 0], addr).await.unwrap();
        });

        let transport = UdpTransport::new(Duration::from_secs(1));
        let result = transport.exchange(server, &[0, 22, 0, 0]).await;

        assert!(matches!(result, Err(TransportError::IdMismatch)));
    }

    #[tokio::test]
    async fn udp_transport_rejects_truncation() {
        let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let server = peer.local_addr().unwrap();

        tokio::spawn(async move {
            let mut buf = [0u8; 512];
            let (_, addr) = peer.recv_from(&mut buf).await.unwrap();
            peer.send_to(&[0, 22, HEADER_MASK_TC, 0], addr).await.unwrap();
        });

        let transport = UdpTransport::new(Duration::from_secs(1));
        let result = transport.exchange(server, &[0, 22, 0, 0]).await;

        assert!(matches!(result, Err(TransportError::Truncated)));
    }
}
