//! Where finished transport packets go.

use async_trait::async_trait;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use tokio::net::UdpSocket;
use url::{Host, Url};

use crate::error::{Result, TsError};

/// A packet sink awaited one transport packet at a time by the sender loop.
///
/// Handshakes and retransmission belong to the implementation; a returned
/// error ends the sending session.
#[async_trait]
pub trait Transport: Send {
    async fn write(&mut self, data: &[u8]) -> Result<usize>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Box<T> {
    async fn write(&mut self, data: &[u8]) -> Result<usize> {
        (**self).write(data).await
    }
}

/// Plain TS over UDP, one datagram per transport packet.
#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
    peer: SocketAddr,
}

impl UdpTransport {
    /// Connects to a `udp://host:port` URL.
    pub async fn connect(url: &str) -> Result<Self> {
        let url = Url::parse(url)?;
        if url.scheme() != "udp" {
            return Err(TsError::Config(format!("unsupported scheme: {}", url.scheme())));
        }
        let port = url
            .port()
            .ok_or_else(|| TsError::Config(format!("missing port in {}", url)))?;
        let peer = match url.host() {
            Some(Host::Ipv4(ip)) => SocketAddr::from((ip, port)),
            Some(Host::Ipv6(ip)) => SocketAddr::from((ip, port)),
            Some(Host::Domain(domain)) => tokio::net::lookup_host((domain, port))
                .await?
                .next()
                .ok_or_else(|| TsError::Transport(format!("cannot resolve {}", domain)))?,
            None => return Err(TsError::Config(format!("missing host in {}", url))),
        };

        let local = if peer.is_ipv4() {
            SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))
        } else {
            SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0))
        };
        let socket = UdpSocket::bind(local).await?;
        socket
            .connect(peer)
            .await
            .map_err(|e| TsError::Transport(format!("failed to connect to {}: {}", peer, e)))?;
        Ok(Self { socket, peer })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }
}

#[async_trait]
impl Transport for UdpTransport {
    async fn write(&mut self, data: &[u8]) -> Result<usize> {
        Ok(self.socket.send(data).await?)
    }
}
