//! UDP telemetry reception
//!
//! The receiver runs its socket on a dedicated worker thread and talks to
//! the rest of the process only through crossbeam channels.
//!
//! # Architecture
//!
//! - [`UdpReceiver`] - control handle: start, stop, rebind, statistics
//! - [`ReceiveWorker`](worker) - owns the socket, decodes, publishes records
//! - [`ReceiverEvent`] - state changes, socket errors and dropped datagrams
//!
//! Records are published to every channel handed out by
//! [`UdpReceiver::subscribe`], and notifications to every channel handed out
//! by [`UdpReceiver::events`]. Both survive restarts and rebinds.
//!
//! # Example
//!
//! ```ignore
//! let mut receiver = UdpReceiver::new(ReceiverConfig::with_port(5000));
//! let records = receiver.subscribe();
//! receiver.start()?;
//!
//! for record in records.iter() {
//!     println!("{} {}", record.subsystem_id, record.health_code);
//! }
//! ```

pub mod worker;

pub use worker::MAX_DATAGRAM_SIZE;

use crate::config::{validate_port, ReceiverConfig};
use crate::error::{Result, ResultExt, TelemetryError};
use crate::types::TelemetryRecord;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use worker::ReceiveWorker;

/// Lifecycle state of a [`UdpReceiver`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReceiverState {
    #[default]
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl std::fmt::Display for ReceiverState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReceiverState::Stopped => write!(f, "Stopped"),
            ReceiverState::Starting => write!(f, "Starting"),
            ReceiverState::Running => write!(f, "Running"),
            ReceiverState::Stopping => write!(f, "Stopping"),
        }
    }
}

/// Notification from the receiver
#[derive(Debug, Clone, PartialEq)]
pub enum ReceiverEvent {
    /// The receiver changed state
    StateChanged(ReceiverState),
    /// Socket or lifecycle error; reception continues where possible
    Error(String),
    /// A datagram could not be turned into a valid record
    DatagramDropped { source: SocketAddr, reason: String },
}

/// Packet counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReceiverStats {
    /// Datagrams decoded into valid records
    pub packets_received: u64,
    /// Datagrams that did not decode into a valid record
    pub packets_dropped: u64,
    /// Received records a full subscriber queue had no room for
    pub subscriber_overflow: u64,
}

/// State shared between the control handle and the worker
pub(crate) struct Shared {
    state: Mutex<ReceiverState>,
    local_addr: Mutex<Option<SocketAddr>>,
    subscribers: Mutex<Vec<Sender<TelemetryRecord>>>,
    observers: Mutex<Vec<Sender<ReceiverEvent>>>,
    event_capacity: usize,
    pub(crate) received: AtomicU64,
    pub(crate) dropped: AtomicU64,
    pub(crate) overflowed: AtomicU64,
}

impl Shared {
    pub(crate) fn new(event_capacity: usize) -> Self {
        Self {
            state: Mutex::new(ReceiverState::Stopped),
            local_addr: Mutex::new(None),
            subscribers: Mutex::new(Vec::new()),
            observers: Mutex::new(Vec::new()),
            event_capacity: event_capacity.max(1),
            received: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            overflowed: AtomicU64::new(0),
        }
    }

    /// Send `event` to every observer. A full observer misses it.
    pub(crate) fn emit(&self, event: ReceiverEvent) {
        let mut observers = self.observers.lock().unwrap_or_else(PoisonError::into_inner);
        observers.retain(|tx| {
            !matches!(tx.try_send(event.clone()), Err(TrySendError::Disconnected(_)))
        });
    }

    fn observe(&self) -> Receiver<ReceiverEvent> {
        let (tx, rx) = bounded(self.event_capacity);
        self.observers.lock().unwrap_or_else(PoisonError::into_inner).push(tx);
        rx
    }

    pub(crate) fn lock_subscribers(&self) -> MutexGuard<'_, Vec<Sender<TelemetryRecord>>> {
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn state(&self) -> ReceiverState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: ReceiverState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
        tracing::debug!("UDP receiver state: {}", state);
        self.emit(ReceiverEvent::StateChanged(state));
    }

    fn set_local_addr(&self, addr: Option<SocketAddr>) {
        *self.local_addr.lock().unwrap_or_else(PoisonError::into_inner) = addr;
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handles of a running worker
struct WorkerHandle {
    running: Arc<AtomicBool>,
    done_rx: Receiver<()>,
    thread: JoinHandle<()>,
}

/// UDP telemetry receiver
///
/// Owns at most one worker thread. Dropping the receiver stops it.
pub struct UdpReceiver {
    config: ReceiverConfig,
    shared: Arc<Shared>,
    worker: Option<WorkerHandle>,
}

impl UdpReceiver {
    /// Create a stopped receiver
    pub fn new(config: ReceiverConfig) -> Self {
        let shared = Arc::new(Shared::new(config.event_capacity));
        Self {
            config,
            shared,
            worker: None,
        }
    }

    pub fn config(&self) -> &ReceiverConfig {
        &self.config
    }

    /// Configured port
    pub fn port(&self) -> u16 {
        self.config.port
    }

    pub fn state(&self) -> ReceiverState {
        self.shared.state()
    }

    pub fn is_running(&self) -> bool {
        self.state() == ReceiverState::Running
    }

    /// Address the socket is bound to while running
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.shared.local_addr()
    }

    /// Bind the socket and start the receive loop
    ///
    /// Returns once the worker has bound the socket. Calling `start` on a
    /// running receiver does nothing.
    pub fn start(&mut self) -> Result<()> {
        if matches!(self.state(), ReceiverState::Running | ReceiverState::Starting) {
            tracing::info!("UDP receiver already running on port {}", self.config.port);
            return Ok(());
        }
        self.config.validate()?;

        self.shared.set_state(ReceiverState::Starting);

        let running = Arc::new(AtomicBool::new(true));
        let (ack_tx, ack_rx) = bounded::<Result<SocketAddr>>(1);
        let (done_tx, done_rx) = bounded::<()>(1);
        let worker = ReceiveWorker::new(self.config.clone(), self.shared.clone(), running.clone());

        let spawned = std::thread::Builder::new()
            .name("udp-receiver".to_string())
            .spawn(move || worker.run(ack_tx, done_tx))
            .map_err(TelemetryError::Io)
            .context("Failed to spawn receiver thread");
        let thread = match spawned {
            Ok(thread) => thread,
            Err(e) => {
                self.shared.set_state(ReceiverState::Stopped);
                return Err(e);
            }
        };

        match ack_rx.recv_timeout(self.config.start_timeout()) {
            Ok(Ok(addr)) => {
                self.shared.set_local_addr(Some(addr));
                self.worker = Some(WorkerHandle {
                    running,
                    done_rx,
                    thread,
                });
                self.shared.set_state(ReceiverState::Running);
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = thread.join();
                tracing::error!("UDP receiver failed to start: {}", e);
                self.shared.emit(ReceiverEvent::Error(e.to_string()));
                self.shared.set_state(ReceiverState::Stopped);
                Err(e)
            }
            Err(RecvTimeoutError::Timeout) => {
                running.store(false, Ordering::SeqCst);
                let msg = format!(
                    "Receiver worker did not bind port {} within {:?}",
                    self.config.port,
                    self.config.start_timeout()
                );
                tracing::error!("{}", msg);
                self.shared.emit(ReceiverEvent::Error(msg.clone()));
                self.shared.set_state(ReceiverState::Stopped);
                Err(TelemetryError::Timeout(msg))
            }
            Err(RecvTimeoutError::Disconnected) => {
                let _ = thread.join();
                self.shared.set_state(ReceiverState::Stopped);
                Err(TelemetryError::Channel(
                    "Receiver worker exited before binding".to_string(),
                ))
            }
        }
    }

    /// Stop the receive loop and release the socket
    ///
    /// Waits up to `stop_timeout` for the worker. Does nothing when stopped.
    pub fn stop(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };

        self.shared.set_state(ReceiverState::Stopping);
        worker.running.store(false, Ordering::SeqCst);

        match worker.done_rx.recv_timeout(self.config.stop_timeout()) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if worker.thread.join().is_err() {
                    tracing::error!("UDP receiver worker panicked");
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!(
                    "UDP receiver worker did not stop within {:?}, detaching",
                    self.config.stop_timeout()
                );
            }
        }

        self.shared.set_local_addr(None);
        self.shared.set_state(ReceiverState::Stopped);
        tracing::info!("UDP receiver stopped");
    }

    /// Change the listening port, rebinding if running
    ///
    /// If the rebind fails the new port is kept and the receiver is left
    /// stopped.
    pub fn set_port(&mut self, port: u16) -> Result<()> {
        validate_port(port)?;
        if port == self.config.port {
            return Ok(());
        }

        let was_running = self.worker.is_some();
        if was_running {
            self.stop();
        }
        self.config.port = port;
        if was_running {
            self.start()
                .with_context(|| format!("Failed to rebind UDP receiver to port {}", port))?;
        }
        Ok(())
    }

    /// New channel receiving every valid record
    pub fn subscribe(&self) -> Receiver<TelemetryRecord> {
        let (tx, rx) = bounded(self.config.subscriber_capacity.max(1));
        self.shared.lock_subscribers().push(tx);
        rx
    }

    /// New channel receiving lifecycle and error notifications from now on
    pub fn events(&self) -> Receiver<ReceiverEvent> {
        self.shared.observe()
    }

    pub fn stats(&self) -> ReceiverStats {
        ReceiverStats {
            packets_received: self.shared.received.load(Ordering::Relaxed),
            packets_dropped: self.shared.dropped.load(Ordering::Relaxed),
            subscriber_overflow: self.shared.overflowed.load(Ordering::Relaxed),
        }
    }

    pub fn packets_received(&self) -> u64 {
        self.shared.received.load(Ordering::Relaxed)
    }

    pub fn packets_dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }

    /// Records lost because a subscriber queue was full
    pub fn subscriber_overflow(&self) -> u64 {
        self.shared.overflowed.load(Ordering::Relaxed)
    }

    pub fn reset_statistics(&self) {
        self.shared.received.store(0, Ordering::Relaxed);
        self.shared.dropped.store(0, Ordering::Relaxed);
        self.shared.overflowed.store(0, Ordering::Relaxed);
    }
}

impl Drop for UdpReceiver {
    fn drop(&mut self) {
        self.stop();
    }
}
