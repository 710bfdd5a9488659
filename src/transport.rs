//! ==============================================================================
//! transport.rs - datagram send / receive contract
//! ==============================================================================
//!
//! the core only needs two things from the network:
//!     - recv():      wait for the next datagram and its sender
//!     - broadcast(): send one datagram to every swarm member
//!
//! `UdpTransport` is the production implementation (bind + SO_BROADCAST).
//! `testing::MemoryTransport` feeds datagrams from memory for tests.
//!
//! ==============================================================================

use async_trait::async_trait;
use std::net::{IpAddr, SocketAddr};
use tokio::net::UdpSocket;

use crate::config::NetworkConfig;
use crate::error::TransportError;

#[async_trait]
pub trait Transport: Send + Sync {
    /// Next datagram and the address that sent it.
    async fn recv(&self) -> Result<(Vec<u8>, SocketAddr), TransportError>;

    async fn broadcast(&self, payload: &[u8]) -> Result<(), TransportError>;
}

pub struct UdpTransport {
    socket: UdpSocket,
    broadcast_to: SocketAddr,
    max_datagram: usize,
}

impl UdpTransport {
    /// Bind the shared swarm port and enable broadcast.
    pub async fn bind(network: &NetworkConfig) -> Result<Self, TransportError> {
        let bind_addr = format!("{}:{}", network.bind_address, network.port);
        let socket = UdpSocket::bind(&bind_addr)
            .await
            .map_err(|source| TransportError::Bind { addr: bind_addr.clone(), source })?;
        socket
            .set_broadcast(true)
            .map_err(|source| TransportError::Bind { addr: bind_addr.clone(), source })?;

        let ip: IpAddr = network.broadcast_address.parse().map_err(|_| TransportError::Bind {
            addr: bind_addr.clone(),
            source: std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("invalid broadcast address {:?}", network.broadcast_address),
            ),
        })?;

        tracing::info!("Listening for incoming messages on {}", bind_addr);
        Ok(Self {
            socket,
            broadcast_to: SocketAddr::new(ip, network.port),
            max_datagram: network.max_datagram.max(1),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Point broadcasts somewhere else (tests aim them at loopback).
    pub fn with_broadcast_target(mut self, target: SocketAddr) -> Self {
        self.broadcast_to = target;
        self
    }
}

#[async_trait]
impl Transport for UdpTransport {
    async fn recv(&self) -> Result<(Vec<u8>, SocketAddr), TransportError> {
        let mut buf = vec![0u8; self.max_datagram];
        let (len, from) = self.socket.recv_from(&mut buf).await.map_err(TransportError::Receive)?;
        buf.truncate(len);
        Ok((buf, from))
    }

    async fn broadcast(&self, payload: &[u8]) -> Result<(), TransportError> {
        self.socket
            .send_to(payload, self.broadcast_to)
            .await
            .map_err(TransportError::Send)?;
        Ok(())
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use parking_lot::Mutex;
    use tokio::sync::mpsc;

    type Hook = Box<dyn Fn() + Send + Sync>;

    /// In-memory transport: inbound datagrams come from a channel, broadcasts
    /// are recorded. Dropping every sender closes the transport.
    pub struct MemoryTransport {
        inbound: tokio::sync::Mutex<mpsc::UnboundedReceiver<(Vec<u8>, SocketAddr)>>,
        sent: Mutex<Vec<Vec<u8>>>,
        fail_broadcast: bool,
        on_broadcast: Option<Hook>,
    }

    pub type Inbox = mpsc::UnboundedSender<(Vec<u8>, SocketAddr)>;

    impl MemoryTransport {
        pub fn new() -> (Self, Inbox) {
            let (tx, rx) = mpsc::unbounded_channel();
            let transport = Self {
                inbound: tokio::sync::Mutex::new(rx),
                sent: Mutex::new(Vec::new()),
                fail_broadcast: false,
                on_broadcast: None,
            };
            (transport, tx)
        }

        pub fn failing_broadcast(mut self) -> Self {
            self.fail_broadcast = true;
            self
        }

        /// Run `hook` every time a broadcast is attempted.
        pub fn on_broadcast(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
            self.on_broadcast = Some(Box::new(hook));
            self
        }

        pub fn sent(&self) -> Vec<Vec<u8>> {
            self.sent.lock().clone()
        }
    }

    #[async_trait]
    impl Transport for MemoryTransport {
        async fn recv(&self) -> Result<(Vec<u8>, SocketAddr), TransportError> {
            self.inbound.lock().await.recv().await.ok_or(TransportError::Closed)
        }

        async fn broadcast(&self, payload: &[u8]) -> Result<(), TransportError> {
            if let Some(hook) = &self.on_broadcast {
                hook();
            }
            if self.fail_broadcast {
                return Err(TransportError::Send(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "network unreachable",
                )));
            }
            self.sent.lock().push(payload.to_vec());
            Ok(())
        }
    }

    pub fn peer(last_octet: u8) -> SocketAddr {
        SocketAddr::from(([192, 168, 1, last_octet], 4210))
    }
}
