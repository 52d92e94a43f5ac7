//! Raw CAN frame model and DLC arithmetic
//!
//! Covers both classic CAN (data field up to 8 bytes) and CAN FD
//! (up to 64 bytes in the discrete steps defined by ISO 11898-1).

use thiserror::Error;

use crate::addressing::can_id;

/// Default filler byte for CAN frame data padding per ISO 15765-2.
pub const DEFAULT_FILLER_BYTE: u8 = 0xCC;

/// Data field length for each DLC value (CAN FD table, ISO 11898-1).
const DLC_TO_DATA_LENGTH: [usize; 16] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 12, 16, 20, 24, 32, 48, 64];

/// Largest data field a CAN FD frame can carry.
pub const MAX_FRAME_DATA_LENGTH: usize = 64;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("CAN ID 0x{0:X} is out of range")]
    InvalidCanId(u32),

    #[error("invalid DLC value: {0}")]
    InvalidDlc(u8),

    #[error("{0} bytes is not a valid CAN frame data length")]
    InvalidDataLength(usize),

    #[error("{0} bytes exceeds the maximum CAN FD data field of 64 bytes")]
    DataTooLong(usize),
}

/// Data field length encoded by a DLC value.
pub fn data_length_for_dlc(dlc: u8) -> Result<usize, FrameError> {
    DLC_TO_DATA_LENGTH
        .get(usize::from(dlc))
        .copied()
        .ok_or(FrameError::InvalidDlc(dlc))
}

/// DLC whose data field is exactly `length` bytes long.
pub fn dlc_for_data_length(length: usize) -> Result<u8, FrameError> {
    DLC_TO_DATA_LENGTH
        .iter()
        .position(|&len| len == length)
        .map(|dlc| dlc as u8)
        .ok_or(FrameError::InvalidDataLength(length))
}

/// Smallest DLC whose data field accommodates `length` bytes, rounding up
/// to the next legal CAN FD step where needed.
pub fn min_dlc_for_data_length(length: usize) -> Result<u8, FrameError> {
    DLC_TO_DATA_LENGTH
        .iter()
        .position(|&len| len >= length)
        .map(|dlc| dlc as u8)
        .ok_or(FrameError::DataTooLong(length))
}

/// One raw CAN frame: identifier plus data field.
///
/// Whether the frame is classic CAN or CAN FD follows from the data field
/// length; identifiers above 0x7FF are 29-bit extended identifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanFrame {
    raw_id: u32,
    data: Vec<u8>,
}

impl CanFrame {
    /// Build a frame, validating the identifier range and that the data
    /// field length is a legal DLC step.
    pub fn new(raw_id: u32, data: Vec<u8>) -> Result<Self, FrameError> {
        if !can_id::is_valid_can_id(raw_id) {
            return Err(FrameError::InvalidCanId(raw_id));
        }
        dlc_for_data_length(data.len())?;
        Ok(Self { raw_id, data })
    }

    pub fn raw_id(&self) -> u32 {
        self.raw_id
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn dlc(&self) -> u8 {
        // Length was validated against the DLC table at construction.
        DLC_TO_DATA_LENGTH
            .iter()
            .position(|&len| len == self.data.len())
            .unwrap_or(0) as u8
    }

    pub fn is_can_fd(&self) -> bool {
        self.data.len() > 8
    }

    pub fn is_extended_id(&self) -> bool {
        can_id::is_extended_can_id(self.raw_id)
    }
}
