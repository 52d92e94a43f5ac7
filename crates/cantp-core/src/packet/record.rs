//! Historic records of packets that crossed the bus.

use std::time::Instant;

use super::CanPacket;

/// Which way a packet travelled relative to this node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransmissionDirection {
    Transmitted,
    Received,
}

/// A packet together with the moment it was observed on the bus.
///
/// Records are immutable; timing parameters are measured from the
/// distance between consecutive record timestamps.
#[derive(Debug, Clone)]
pub struct CanPacketRecord {
    packet: CanPacket,
    direction: TransmissionDirection,
    timestamp: Instant,
}

impl CanPacketRecord {
    pub fn new(packet: CanPacket, direction: TransmissionDirection, timestamp: Instant) -> Self {
        Self {
            packet,
            direction,
            timestamp,
        }
    }

    pub fn packet(&self) -> &CanPacket {
        &self.packet
    }

    pub fn direction(&self) -> TransmissionDirection {
        self.direction
    }

    pub fn timestamp(&self) -> Instant {
        self.timestamp
    }
}
