//! Diagnostic messages and records of completed transfers.

use std::time::{Duration, Instant};

use thiserror::Error;

use crate::addressing::AddressingType;
use crate::packet::{CanPacketRecord, CanPacketType, TransmissionDirection};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MessageError {
    #[error("a diagnostic message payload must not be empty")]
    EmptyPayload,

    #[error("a message record requires at least one packet record")]
    NoPacketRecords,
}

/// A diagnostic message to be sent: the application payload plus the
/// addressing type selecting the physical or functional path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UdsMessage {
    payload: Vec<u8>,
    addressing_type: AddressingType,
}

impl UdsMessage {
    pub fn new(payload: Vec<u8>, addressing_type: AddressingType) -> Result<Self, MessageError> {
        if payload.is_empty() {
            return Err(MessageError::EmptyPayload);
        }
        Ok(Self {
            payload,
            addressing_type,
        })
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn addressing_type(&self) -> AddressingType {
        self.addressing_type
    }
}

/// A completed transfer: the reassembled payload and every packet that
/// made it up, in bus order.
#[derive(Debug, Clone)]
pub struct UdsMessageRecord {
    payload: Vec<u8>,
    addressing_type: AddressingType,
    direction: TransmissionDirection,
    packet_records: Vec<CanPacketRecord>,
}

impl UdsMessageRecord {
    pub fn new(
        payload: Vec<u8>,
        addressing_type: AddressingType,
        direction: TransmissionDirection,
        packet_records: Vec<CanPacketRecord>,
    ) -> Result<Self, MessageError> {
        if payload.is_empty() {
            return Err(MessageError::EmptyPayload);
        }
        if packet_records.is_empty() {
            return Err(MessageError::NoPacketRecords);
        }
        Ok(Self {
            payload,
            addressing_type,
            direction,
            packet_records,
        })
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn addressing_type(&self) -> AddressingType {
        self.addressing_type
    }

    pub fn direction(&self) -> TransmissionDirection {
        self.direction
    }

    pub fn packet_records(&self) -> &[CanPacketRecord] {
        &self.packet_records
    }

    /// When the transfer started (first packet on the bus).
    pub fn start_time(&self) -> Instant {
        self.packet_records[0].timestamp()
    }

    /// When the transfer completed (last packet on the bus).
    pub fn end_time(&self) -> Instant {
        self.packet_records[self.packet_records.len() - 1].timestamp()
    }

    /// Observed N_Bs values: the wait before each Flow Control packet.
    pub fn n_bs_measurements(&self) -> Vec<Duration> {
        self.gaps_before(CanPacketType::FlowControl)
    }

    /// Observed N_Cr values: the wait before each Consecutive Frame.
    pub fn n_cr_measurements(&self) -> Vec<Duration> {
        self.gaps_before(CanPacketType::ConsecutiveFrame)
    }

    fn gaps_before(&self, packet_type: CanPacketType) -> Vec<Duration> {
        self.packet_records
            .windows(2)
            .filter(|pair| pair[1].packet().packet_type() == packet_type)
            .map(|pair| pair[1].timestamp() - pair[0].timestamp())
            .collect()
    }
}
