//! CAN bus driver interface and mock
//!
//! The concrete driver (SocketCAN, vendor stack) lives outside this
//! crate; the transport layer only needs to push frames out and watch
//! frames arrive. `MockCanBus` is a broadcast loopback for tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::broadcast;

use cantp_core::frame::CanFrame;

use crate::error::TransportError;

/// A frame paired with the moment it was observed on the bus.
#[derive(Debug, Clone)]
pub struct TimestampedFrame {
    pub frame: CanFrame,
    pub timestamp: Instant,
}

/// Minimal driver interface to a CAN bus.
#[async_trait]
pub trait CanBusDriver: Send + Sync {
    /// Push a frame onto the bus.
    async fn send_frame(&self, frame: &CanFrame) -> Result<(), TransportError>;

    /// Subscribe to all frames observed on the bus.
    fn subscribe(&self) -> broadcast::Receiver<TimestampedFrame>;

    /// Check if the driver is connected to the bus.
    async fn is_connected(&self) -> bool;
}

/// In-process loopback bus for testing.
///
/// Every sent frame is broadcast to all subscribers, so two transport
/// interfaces sharing one `MockCanBus` see each other's traffic.
pub struct MockCanBus {
    connected: AtomicBool,
    latency: Option<Duration>,
    frames_tx: broadcast::Sender<TimestampedFrame>,
}

impl MockCanBus {
    pub fn new() -> Self {
        let (frames_tx, _) = broadcast::channel(256);
        Self {
            connected: AtomicBool::new(true),
            latency: None,
            frames_tx,
        }
    }

    /// Add a fixed per-frame transmission latency.
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Self::new()
        }
    }

    /// Put a frame on the bus without going through a driver, as if a
    /// third node had sent it.
    pub fn inject_frame(&self, frame: CanFrame) {
        let _ = self.frames_tx.send(TimestampedFrame {
            frame,
            timestamp: Instant::now(),
        });
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }
}

impl Default for MockCanBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CanBusDriver for MockCanBus {
    async fn send_frame(&self, frame: &CanFrame) -> Result<(), TransportError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionClosed);
        }
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        tracing::debug!(
            can_id = format_args!("0x{:X}", frame.raw_id()),
            data = %hex::encode(frame.data()),
            "mock bus frame sent"
        );
        let _ = self.frames_tx.send(TimestampedFrame {
            frame: frame.clone(),
            timestamp: Instant::now(),
        });
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<TimestampedFrame> {
        self.frames_tx.subscribe()
    }

    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}
