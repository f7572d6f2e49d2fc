//! RHMS Telemetry Monitor - Main Entry Point
//!
//! Listens for subsystem telemetry over UDP and keeps one health monitor
//! per configured subsystem, logging alerts and stale subsystems.

use anyhow::Context;
use rhms_telemetry::{
    config::{default_config_path, AppConfig},
    HealthCode, MonitorBoard, ReceiverEvent, TelemetryDispatcher, UdpReceiver,
};
use std::time::{Duration, Instant};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,rhms_telemetry=debug")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting RHMS telemetry monitor");

    let config = match std::env::args().nth(1) {
        Some(path) => AppConfig::load(&path).with_context(|| format!("Loading {}", path))?,
        None => match default_config_path() {
            Some(path) => {
                tracing::info!("Using config {:?}", path);
                AppConfig::load_or_default(path)
            }
            None => AppConfig::default(),
        },
    };

    let (dispatcher, deliveries) = TelemetryDispatcher::new(&config.dispatcher);

    let mut board = MonitorBoard::new(dispatcher.clone());
    for entry in &config.monitor.subsystems {
        board.add(&entry.id, entry.kind)?;
    }
    if board.is_empty() {
        tracing::warn!("No subsystems configured; every record will be unrouted");
    }

    let mut receiver = UdpReceiver::new(config.receiver.clone());
    let receiver_events = receiver.events();
    let router = dispatcher.attach(receiver.subscribe())?;
    receiver
        .start()
        .with_context(|| format!("Starting UDP receiver on port {}", config.receiver.port))?;

    let timeout_ms = i64::try_from(config.monitor.health_timeout_ms).unwrap_or(i64::MAX);
    let stats_interval = config.monitor.stats_interval();
    let mut last_stats = Instant::now();

    while deliveries.run_once(Duration::from_millis(100)) {
        for event in receiver_events.try_iter() {
            match event {
                ReceiverEvent::Error(msg) => tracing::warn!("Receiver error: {}", msg),
                ReceiverEvent::StateChanged(state) => tracing::info!("Receiver {}", state),
                ReceiverEvent::DatagramDropped { .. } => {}
            }
        }

        if last_stats.elapsed() >= stats_interval {
            let rx = receiver.stats();
            let dx = dispatcher.stats();
            tracing::info!(
                "received={} dropped={} subscriber_overflow={} dispatched={} unrouted={} overflow={}",
                rx.packets_received,
                rx.packets_dropped,
                rx.subscriber_overflow,
                dx.dispatched,
                dx.unrouted,
                dx.dropped
            );
            for row in board.summary().iter().filter(|r| r.code != HealthCode::Ok) {
                tracing::info!("{} [{}] {}: {}", row.subsystem_id, row.kind, row.code, row.message);
            }
            for id in board.timed_out(timeout_ms) {
                tracing::warn!("Subsystem {} timed out", id);
            }
            last_stats = Instant::now();
        }

        if !receiver.is_running() {
            break;
        }
    }

    // Stop the receiver so the router sees its channel close
    tracing::info!("Shutting down...");
    receiver.stop();
    drop(receiver);
    let _ = router.join();

    Ok(())
}
