//! UDP transport.
//!
//! One socket, one task per datagram. Malformed packets are dropped
//! silently and non-QUERY opcodes get a NOTIMP reply before resolution
//! ever runs, so the resolver only sees well-formed standard queries.

use std::net::SocketAddr;
use std::sync::Arc;

use log::{debug, error, info, warn};
use tokio::net::UdpSocket;
use tokio::task;

use crate::config::MAX_PACKET_SIZE;
use crate::errors::DnsError;
use crate::resolver::Resolver;
use crate::wire::{self, Question, ResponseCode};

/// The UDP DNS listener.
pub struct DnsServer {
    socket: Arc<UdpSocket>,
    resolver: Arc<Resolver>,
}

impl DnsServer {
    /// Bind the UDP socket.
    ///
    /// # Arguments
    /// * `addr` - The address to listen on.
    /// * `resolver` - The shared resolver.
    pub async fn bind(addr: SocketAddr, resolver: Arc<Resolver>) -> Result<Self, DnsError> {
        let socket = UdpSocket::bind(addr).await?;
        info!("UDP DNS server listening on {}", socket.local_addr()?);
        Ok(Self {
            socket: Arc::new(socket),
            resolver,
        })
    }

    /// The bound address, useful when listening on an ephemeral port.
    pub fn local_addr(&self) -> Result<SocketAddr, DnsError> {
        Ok(self.socket.local_addr()?)
    }

    /// Receive datagrams forever, spawning a task per query.
    pub async fn serve(self) -> Result<(), DnsError> {
        let mut buf = vec![0u8; MAX_PACKET_SIZE];
        loop {
            match self.socket.recv_from(&mut buf).await {
                Ok((amt, src)) => {
                    let packet = buf[..amt].to_vec();
                    let socket = Arc::clone(&self.socket);
                    let resolver = Arc::clone(&self.resolver);
                    task::spawn(async move {
                        if let Err(e) = handle_query(packet, src, socket, resolver).await {
                            warn!("UDP query error: {}", e);
                        }
                    });
                }
                Err(e) => error!("UDP receive error: {}", e),
            }
        }
    }
}

/// Resolve one datagram and send the reply.
async fn handle_query(
    packet: Vec<u8>,
    src: SocketAddr,
    socket: Arc<UdpSocket>,
    resolver: Arc<Resolver>,
) -> Result<(), DnsError> {
    if packet.len() < 12 {
        debug!("Dropping short packet from {}", src);
        return Ok(());
    }
    let Some(question) = Question::parse(&packet) else {
        debug!("Dropping unparseable packet from {}", src);
        return Ok(());
    };

    let opcode = (packet[2] & 0x78) >> 3;
    if opcode != 0 {
        let response = wire::build_response(
            &packet,
            &question,
            &[],
            ResponseCode::NotImplemented,
            resolver.is_authoritative(),
        );
        socket.send_to(&response, src).await?;
        return Ok(());
    }

    debug!(
        "UDP query for {} ({:?}) from {}",
        question.name, question.kind, src
    );
    let resolution = resolver.resolve(&question, src.ip()).await;
    let response = wire::build_response(
        &packet,
        &question,
        &resolution.answers,
        resolution.rcode,
        resolution.authoritative,
    );
    socket.send_to(&response, src).await?;
    Ok(())
}
