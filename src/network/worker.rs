//! Receive loop
//!
//! The worker owns the UDP socket for its whole life: it binds, reports the
//! outcome through the start acknowledgement channel, then reads one
//! datagram at a time until the running flag is cleared. The socket read
//! timeout bounds how long a stop request can go unnoticed.

use super::{ReceiverEvent, Shared};
use crate::codec::{self, Format};
use crate::config::ReceiverConfig;
use crate::error::{Result, TelemetryError};
use crate::types::TelemetryRecord;
use crossbeam_channel::{Sender, TrySendError};
use std::io::ErrorKind;
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Largest UDP payload we accept
pub const MAX_DATAGRAM_SIZE: usize = 65_535;

/// Socket-owning side of a [`super::UdpReceiver`]
pub(crate) struct ReceiveWorker {
    config: ReceiverConfig,
    shared: Arc<Shared>,
    running: Arc<AtomicBool>,
}

impl ReceiveWorker {
    pub(crate) fn new(config: ReceiverConfig, shared: Arc<Shared>, running: Arc<AtomicBool>) -> Self {
        Self {
            config,
            shared,
            running,
        }
    }

    fn bind(&self) -> Result<UdpSocket> {
        let port = self.config.port;
        let socket = UdpSocket::bind(self.config.socket_addr())
            .map_err(|source| TelemetryError::Bind { port, source })?;
        socket.set_read_timeout(Some(self.config.read_timeout()))?;
        Ok(socket)
    }

    /// Bind, acknowledge, and receive until stopped
    pub(crate) fn run(self, ack_tx: Sender<Result<SocketAddr>>, done_tx: Sender<()>) {
        let socket = match self.bind().and_then(|s| Ok((s.local_addr()?, s))) {
            Ok((addr, socket)) => {
                let _ = ack_tx.send(Ok(addr));
                tracing::info!("UDP receiver listening on {}", addr);
                socket
            }
            Err(e) => {
                let _ = ack_tx.send(Err(e));
                let _ = done_tx.send(());
                return;
            }
        };

        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        while self.running.load(Ordering::SeqCst) {
            match socket.recv_from(&mut buf) {
                Ok((len, source)) => self.handle_datagram(&buf[..len], source),
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => {
                    tracing::warn!("UDP receive error: {}", e);
                    self.shared.emit(ReceiverEvent::Error(e.to_string()));
                    // Avoid spinning on a persistent socket error
                    std::thread::sleep(self.config.read_timeout());
                }
            }
        }

        drop(socket);
        tracing::debug!("UDP receive loop exited");
        let _ = done_tx.send(());
    }

    fn handle_datagram(&self, data: &[u8], source: SocketAddr) {
        tracing::trace!("Datagram of {} bytes from {}", data.len(), source);

        match codec::decode(data, Format::Auto) {
            Ok(record) if record.is_valid() => {
                self.shared.received.fetch_add(1, Ordering::Relaxed);
                self.publish(record);
            }
            Ok(record) => self.reject(
                source,
                format!(
                    "invalid record (subsystem {:?}, timestamp {})",
                    record.subsystem_id, record.timestamp
                ),
            ),
            Err(e) => self.reject(source, e.to_string()),
        }
    }

    fn reject(&self, source: SocketAddr, reason: String) {
        self.shared.dropped.fetch_add(1, Ordering::Relaxed);
        tracing::debug!("Dropped datagram from {}: {}", source, reason);
        self.shared
            .emit(ReceiverEvent::DatagramDropped { source, reason });
    }

    /// Send a record to every live subscriber
    fn publish(&self, record: TelemetryRecord) {
        let mut subscribers = self.shared.lock_subscribers();
        subscribers.retain(|tx| match tx.try_send(record.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.shared.overflowed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    "Subscriber queue full, dropping record for {}",
                    record.subsystem_id
                );
                true
            }
            Err(TrySendError::Disconnected(_)) => {
                tracing::debug!("Pruning disconnected subscriber");
                false
            }
        });
    }
}
