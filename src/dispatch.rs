//! Routing of decoded records to subsystem consumers
//!
//! The dispatcher keeps a registry of `subsystem id → consumer` and forwards
//! each valid record to the consumer registered for its id. Consumers never
//! run on the routing thread: routed records are queued on a bounded
//! channel and executed by whoever owns the [`DeliveryQueue`] (typically the
//! UI or main thread), so a slow consumer cannot stall reception.
//!
//! # Architecture
//!
//! ```text
//! UdpReceiver ──records──▶ router thread ──route()──▶ delivery queue ──▶ consumer
//!                              (attach)         │
//!                                               └──▶ DispatchEvent (dispatched / unrouted)
//! ```
//!
//! - [`TelemetryDispatcher`] - cloneable handle; registry + counters behind one mutex
//! - [`DeliveryQueue`] - consumer-side handle that runs queued deliveries
//! - [`TelemetryConsumer`] - the single `apply_telemetry` entry point
//!
//! Routing only reads the registry. Every hop is a FIFO channel, so records
//! for one subsystem reach its consumer in socket order.
//!
//! Each call to [`TelemetryDispatcher::events`] opens its own bounded
//! notification channel. A full observer misses events; a dropped one is
//! pruned on the next emit.
//!
//! # Example
//!
//! ```ignore
//! let (dispatcher, deliveries) = TelemetryDispatcher::new(&DispatcherConfig::default());
//! dispatcher.register_fn("PSU-1", |record| println!("{:?}", record.health_code))?;
//! dispatcher.attach(receiver.subscribe())?;
//!
//! loop {
//!     deliveries.run_once(Duration::from_millis(100));
//! }
//! ```

use crate::config::DispatcherConfig;
use crate::error::{Result, ResultExt, TelemetryError};
use crate::types::{HealthCode, TelemetryRecord};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

/// Something that reacts to telemetry for one subsystem
#[cfg_attr(test, mockall::automock)]
pub trait TelemetryConsumer: Send {
    /// Apply one record. Called on the delivery thread, in arrival order.
    fn apply_telemetry(&mut self, record: &TelemetryRecord);
}

impl<F> TelemetryConsumer for F
where
    F: FnMut(&TelemetryRecord) + Send,
{
    fn apply_telemetry(&mut self, record: &TelemetryRecord) {
        self(record)
    }
}

/// Shared handle to a registered consumer
pub type ConsumerHandle = Arc<Mutex<dyn TelemetryConsumer>>;

/// Wrap a consumer into a [`ConsumerHandle`]
pub fn consumer_handle<C: TelemetryConsumer + 'static>(consumer: C) -> ConsumerHandle {
    Arc::new(Mutex::new(consumer))
}

/// Result of routing one record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Queued for the registered consumer
    Dispatched,
    /// Valid record with no registered consumer
    Unrouted,
    /// Record failed validation; nothing was counted
    Rejected,
    /// Consumer found but the delivery queue was full or closed
    Dropped,
}

/// Notification emitted for every routed record
#[derive(Debug, Clone)]
pub enum DispatchEvent {
    /// A record was queued for its consumer
    Dispatched {
        subsystem_id: String,
        health_code: HealthCode,
    },
    /// No consumer was registered for the record's subsystem
    Unrouted(TelemetryRecord),
}

/// Routing counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Records queued for a consumer
    pub dispatched: u64,
    /// Valid records with no registered consumer
    pub unrouted: u64,
    /// Records lost to a full or closed delivery queue
    pub dropped: u64,
}

/// One queued delivery
struct Delivery {
    consumer: ConsumerHandle,
    record: TelemetryRecord,
}

#[derive(Default)]
struct Registry {
    consumers: HashMap<String, ConsumerHandle>,
    stats: DispatchStats,
}

/// Thread-safe router from subsystem id to consumer
#[derive(Clone)]
pub struct TelemetryDispatcher {
    registry: Arc<Mutex<Registry>>,
    delivery_tx: Sender<Delivery>,
    observers: Arc<Mutex<Vec<Sender<DispatchEvent>>>>,
    event_capacity: usize,
}

impl TelemetryDispatcher {
    /// Create a dispatcher and the queue its deliveries are executed from
    pub fn new(config: &DispatcherConfig) -> (Self, DeliveryQueue) {
        let (delivery_tx, delivery_rx) = bounded(config.delivery_capacity.max(1));

        let dispatcher = Self {
            registry: Arc::new(Mutex::new(Registry::default())),
            delivery_tx,
            observers: Arc::new(Mutex::new(Vec::new())),
            event_capacity: config.event_capacity.max(1),
        };

        (dispatcher, DeliveryQueue { rx: delivery_rx })
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a consumer. Duplicate ids are rejected and the existing
    /// registration is kept.
    pub fn register(&self, subsystem_id: impl Into<String>, consumer: ConsumerHandle) -> Result<()> {
        let subsystem_id = subsystem_id.into();
        let mut registry = self.lock();

        if registry.consumers.contains_key(&subsystem_id) {
            tracing::warn!("Subsystem already registered: {}", subsystem_id);
            return Err(TelemetryError::DuplicateRegistration(subsystem_id));
        }

        tracing::debug!("Registered consumer for subsystem {}", subsystem_id);
        registry.consumers.insert(subsystem_id, consumer);
        Ok(())
    }

    /// Register a closure as a consumer
    pub fn register_fn<F>(&self, subsystem_id: impl Into<String>, callback: F) -> Result<()>
    where
        F: FnMut(&TelemetryRecord) + Send + 'static,
    {
        self.register(subsystem_id, consumer_handle(callback))
    }

    /// Remove a registration. Returns whether one existed.
    ///
    /// Records already queued for the consumer are still delivered.
    pub fn unregister(&self, subsystem_id: &str) -> bool {
        let removed = self.lock().consumers.remove(subsystem_id).is_some();
        if removed {
            tracing::debug!("Unregistered subsystem {}", subsystem_id);
        }
        removed
    }

    /// Remove every registration
    pub fn clear(&self) {
        self.lock().consumers.clear();
        tracing::debug!("Cleared all registered subsystems");
    }

    pub fn is_registered(&self, subsystem_id: &str) -> bool {
        self.lock().consumers.contains_key(subsystem_id)
    }

    /// Sorted list of registered ids
    pub fn registered_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.lock().consumers.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.lock().consumers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Route one record to its consumer
    pub fn route(&self, record: TelemetryRecord) -> RouteOutcome {
        if !record.is_valid() {
            tracing::warn!(
                "Rejected invalid telemetry record (subsystem {:?}, timestamp {})",
                record.subsystem_id,
                record.timestamp
            );
            return RouteOutcome::Rejected;
        }

        let mut registry = self.lock();

        let Some(consumer) = registry.consumers.get(&record.subsystem_id).cloned() else {
            registry.stats.unrouted += 1;
            drop(registry);
            tracing::debug!("No registered consumer for subsystem {}", record.subsystem_id);
            self.emit(DispatchEvent::Unrouted(record));
            return RouteOutcome::Unrouted;
        };

        let event = DispatchEvent::Dispatched {
            subsystem_id: record.subsystem_id.clone(),
            health_code: record.health_code,
        };

        // Queued under the lock so concurrent routers cannot interleave one
        // subsystem's records.
        match self.delivery_tx.try_send(Delivery { consumer, record }) {
            Ok(()) => {
                registry.stats.dispatched += 1;
                drop(registry);
                tracing::trace!("Dispatched telemetry: {:?}", event);
                self.emit(event);
                RouteOutcome::Dispatched
            }
            Err(TrySendError::Full(delivery)) => {
                registry.stats.dropped += 1;
                drop(registry);
                tracing::warn!(
                    "Delivery queue full, dropping record for {}",
                    delivery.record.subsystem_id
                );
                RouteOutcome::Dropped
            }
            Err(TrySendError::Disconnected(delivery)) => {
                registry.stats.dropped += 1;
                drop(registry);
                tracing::warn!(
                    "Delivery queue closed, dropping record for {}",
                    delivery.record.subsystem_id
                );
                RouteOutcome::Dropped
            }
        }
    }

    fn emit(&self, event: DispatchEvent) {
        let mut observers = self.observers.lock().unwrap_or_else(PoisonError::into_inner);
        observers.retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            // This observer misses the event but keeps its channel
            Err(TrySendError::Full(_)) => true,
            Err(TrySendError::Disconnected(_)) => {
                tracing::debug!("Dispatch observer disconnected, removing");
                false
            }
        });
    }

    /// Snapshot of the routing counters
    pub fn stats(&self) -> DispatchStats {
        self.lock().stats
    }

    /// Reset all routing counters to zero
    pub fn reset_statistics(&self) {
        self.lock().stats = DispatchStats::default();
    }

    /// New channel receiving every dispatch notification from now on
    pub fn events(&self) -> Receiver<DispatchEvent> {
        let (tx, rx) = bounded(self.event_capacity);
        self.observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    /// Route every record from `records` on a dedicated thread
    ///
    /// The thread exits once all senders of `records` are gone, e.g. when
    /// the receiver it was subscribed to is dropped.
    pub fn attach(&self, records: Receiver<TelemetryRecord>) -> Result<JoinHandle<()>> {
        let dispatcher = self.clone();
        std::thread::Builder::new()
            .name("telemetry-router".to_string())
            .spawn(move || {
                tracing::debug!("Telemetry router started");
                for record in records.iter() {
                    dispatcher.route(record);
                }
                tracing::debug!("Telemetry router stopped");
            })
            .map_err(TelemetryError::Io)
            .context("Failed to spawn router thread")
    }
}

/// Consumer-side end of the dispatcher
///
/// Deliveries run on the thread that calls into the queue, outside the
/// registry lock, so consumers may freely call back into the dispatcher.
pub struct DeliveryQueue {
    rx: Receiver<Delivery>,
}

impl DeliveryQueue {
    fn deliver(delivery: Delivery) {
        let mut consumer = delivery
            .consumer
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        consumer.apply_telemetry(&delivery.record);
    }

    /// Run all pending deliveries without blocking. Returns how many ran.
    pub fn drain(&self) -> usize {
        let mut count = 0;
        while let Ok(delivery) = self.rx.try_recv() {
            Self::deliver(delivery);
            count += 1;
        }
        count
    }

    /// Wait up to `timeout` for one delivery, then drain the backlog.
    /// Returns false once every dispatcher handle is gone.
    pub fn run_once(&self, timeout: Duration) -> bool {
        match self.rx.recv_timeout(timeout) {
            Ok(delivery) => {
                Self::deliver(delivery);
                self.drain();
                true
            }
            Err(RecvTimeoutError::Timeout) => true,
            Err(RecvTimeoutError::Disconnected) => false,
        }
    }

    /// Run deliveries until every dispatcher handle is dropped
    pub fn run(&self) {
        for delivery in self.rx.iter() {
            Self::deliver(delivery);
        }
    }

    /// Number of queued deliveries
    pub fn pending(&self) -> usize {
        self.rx.len()
    }
}
