//! CAN packet framing per ISO 15765-2
//!
//! One CAN frame's worth of protocol data: N_PCI packing for the four
//! packet types, DLC selection, payload extraction and STmin coding.

mod record;

pub use record::{CanPacketRecord, TransmissionDirection};

use std::time::Duration;

use thiserror::Error;

use crate::addressing::{AddressingError, AddressingParams};
use crate::frame::{self, CanFrame, FrameError};

/// Largest FF_DL expressible in the 12-bit short form.
pub const MAX_SHORT_FF_DL: u32 = 0xFFE;
/// Full frames (FF, CF, FC) require at least this DLC.
const MIN_FULL_FRAME_DLC: u8 = 8;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PacketError {
    #[error("DLC {dlc} is too small, at least {required} is required")]
    DlcTooSmall { dlc: u8, required: u8 },

    #[error("payload of {length} bytes exceeds the frame capacity of {capacity} bytes")]
    PayloadTooLong { length: usize, capacity: usize },

    #[error("inconsistent packet arguments: {0}")]
    Inconsistent(String),

    #[error("malformed packet: {0}")]
    Malformed(String),

    #[error("value out of range: {0}")]
    ValueOutOfRange(String),

    #[error(transparent)]
    Addressing(#[from] AddressingError),

    #[error(transparent)]
    Frame(#[from] FrameError),
}

/// N_PCI packet type (high nibble of the first protocol byte).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CanPacketType {
    SingleFrame = 0x0,
    FirstFrame = 0x1,
    ConsecutiveFrame = 0x2,
    FlowControl = 0x3,
}

impl CanPacketType {
    pub fn from_nibble(nibble: u8) -> Option<Self> {
        match nibble {
            0x0 => Some(Self::SingleFrame),
            0x1 => Some(Self::FirstFrame),
            0x2 => Some(Self::ConsecutiveFrame),
            0x3 => Some(Self::FlowControl),
            _ => None,
        }
    }

    pub fn nibble(self) -> u8 {
        self as u8
    }

    /// Whether a packet of this type can open a message.
    pub fn is_initial(self) -> bool {
        matches!(self, Self::SingleFrame | Self::FirstFrame)
    }
}

/// Flow status carried by a Flow Control packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowStatus {
    ContinueToSend = 0x0,
    Wait = 0x1,
    Overflow = 0x2,
}

impl FlowStatus {
    pub fn from_nibble(nibble: u8) -> Option<Self> {
        match nibble {
            0x0 => Some(Self::ContinueToSend),
            0x1 => Some(Self::Wait),
            0x2 => Some(Self::Overflow),
            _ => None,
        }
    }

    pub fn nibble(self) -> u8 {
        self as u8
    }
}

/// Decode an STmin byte into the separation time it requests.
///
/// `0x00..=0x7F` encode 0-127 ms, `0xF1..=0xF9` encode 100-900 us;
/// reserved values fall back to the maximum of 127 ms per ISO 15765-2.
pub fn decode_st_min(raw: u8) -> Duration {
    match raw {
        0x00..=0x7F => Duration::from_millis(u64::from(raw)),
        0xF1..=0xF9 => Duration::from_micros(100 * u64::from(raw - 0xF0)),
        _ => {
            tracing::warn!(raw, "reserved STmin value received, using maximum of 127 ms");
            Duration::from_millis(127)
        }
    }
}

/// Encode a separation time as an STmin byte, rounding up to the next
/// representable value and saturating at 127 ms.
///
/// STmin is a minimum separation; rounding up keeps the encoded value
/// at least as long as the requested one.
pub fn encode_st_min(value: Duration) -> u8 {
    let micros = value.as_micros();
    if micros == 0 {
        0x00
    } else if micros < 1_000 {
        let steps = micros.div_ceil(100).clamp(1, 9);
        0xF0 + steps as u8
    } else {
        micros.div_ceil(1_000).min(127) as u8
    }
}

/// One CAN frame's worth of ISO 15765-2 protocol data.
///
/// Immutable once constructed; the raw frame (including filler padding)
/// and the decoded protocol fields are kept together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanPacket {
    packet_type: CanPacketType,
    addressing: AddressingParams,
    frame: CanFrame,
    payload: Vec<u8>,
    data_length: Option<u32>,
    sequence_number: Option<u8>,
    flow_status: Option<FlowStatus>,
    block_size: Option<u8>,
    st_min: Option<u8>,
}

impl CanPacket {
    /// Build a Single Frame.
    ///
    /// With `dlc: None` the smallest legal DLC accommodating the payload
    /// is chosen (CAN frame data optimization); with an explicit DLC the
    /// payload must fit and the remainder is padded with `filler_byte`.
    /// The short (4-bit) length form is used for classic-CAN-sized
    /// frames, the 8-bit escape form for CAN FD frames.
    pub fn single_frame(
        addressing: AddressingParams,
        payload: &[u8],
        dlc: Option<u8>,
        filler_byte: u8,
    ) -> Result<Self, PacketError> {
        if payload.is_empty() {
            return Err(PacketError::Inconsistent(
                "single frame payload must not be empty".into(),
            ));
        }
        let ab = addressing.format().addressing_data_bytes();

        let frame_length = match dlc {
            Some(dlc) => frame::data_length_for_dlc(dlc)?,
            None => {
                let short_length = ab + 1 + payload.len();
                if short_length <= 8 {
                    short_length
                } else {
                    let long_length = ab + 2 + payload.len();
                    frame::data_length_for_dlc(frame::min_dlc_for_data_length(long_length)?)?
                }
            }
        };

        let overhead = if frame_length <= 8 { 1 } else { 2 };
        let capacity = frame_length
            .checked_sub(ab + overhead)
            .unwrap_or_default();
        if payload.len() > capacity {
            return Err(PacketError::PayloadTooLong {
                length: payload.len(),
                capacity,
            });
        }

        let mut data = Vec::with_capacity(frame_length);
        data.extend(addressing.addressing_byte());
        if frame_length <= 8 {
            data.push(CanPacketType::SingleFrame.nibble() << 4 | payload.len() as u8);
        } else {
            data.push(CanPacketType::SingleFrame.nibble() << 4);
            data.push(payload.len() as u8);
        }
        data.extend_from_slice(payload);
        data.resize(frame_length, filler_byte);

        Ok(Self {
            packet_type: CanPacketType::SingleFrame,
            frame: CanFrame::new(addressing.can_id(), data)?,
            addressing,
            payload: payload.to_vec(),
            data_length: None,
            sequence_number: None,
            flow_status: None,
            block_size: None,
            st_min: None,
        })
    }

    /// Build a First Frame declaring `data_length` (FF_DL) bytes in total.
    ///
    /// The payload must fill the frame exactly; the 12-bit short form is
    /// used up to [`MAX_SHORT_FF_DL`], the 32-bit escape form above it.
    pub fn first_frame(
        addressing: AddressingParams,
        dlc: u8,
        data_length: u32,
        payload: &[u8],
    ) -> Result<Self, PacketError> {
        if dlc < MIN_FULL_FRAME_DLC {
            return Err(PacketError::DlcTooSmall {
                dlc,
                required: MIN_FULL_FRAME_DLC,
            });
        }
        let ab = addressing.format().addressing_data_bytes();
        let frame_length = frame::data_length_for_dlc(dlc)?;

        let single_frame_capacity = if frame_length <= 8 {
            frame_length - ab - 1
        } else {
            frame_length - ab - 2
        };
        if data_length as usize <= single_frame_capacity {
            return Err(PacketError::Inconsistent(format!(
                "a message of {data_length} bytes fits a single frame at DLC {dlc}"
            )));
        }

        let overhead = if data_length <= MAX_SHORT_FF_DL { 2 } else { 6 };
        let expected_payload = frame_length - ab - overhead;
        if payload.len() != expected_payload {
            return Err(PacketError::Inconsistent(format!(
                "first frame payload must fill the frame: expected {expected_payload} bytes, \
                 got {}",
                payload.len()
            )));
        }

        let mut data = Vec::with_capacity(frame_length);
        data.extend(addressing.addressing_byte());
        if data_length <= MAX_SHORT_FF_DL {
            data.push(CanPacketType::FirstFrame.nibble() << 4 | (data_length >> 8) as u8);
            data.push(data_length as u8);
        } else {
            data.push(CanPacketType::FirstFrame.nibble() << 4);
            data.push(0x00);
            data.extend_from_slice(&data_length.to_be_bytes());
        }
        data.extend_from_slice(payload);

        Ok(Self {
            packet_type: CanPacketType::FirstFrame,
            frame: CanFrame::new(addressing.can_id(), data)?,
            addressing,
            payload: payload.to_vec(),
            data_length: Some(data_length),
            sequence_number: None,
            flow_status: None,
            block_size: None,
            st_min: None,
        })
    }

    /// Build a Consecutive Frame with the given sequence number (0-15).
    pub fn consecutive_frame(
        addressing: AddressingParams,
        payload: &[u8],
        sequence_number: u8,
        dlc: u8,
        filler_byte: u8,
    ) -> Result<Self, PacketError> {
        if sequence_number > 0x0F {
            return Err(PacketError::ValueOutOfRange(format!(
                "sequence number {sequence_number} does not fit in 4 bits"
            )));
        }
        if payload.is_empty() {
            return Err(PacketError::Inconsistent(
                "consecutive frame payload must not be empty".into(),
            ));
        }
        if dlc < MIN_FULL_FRAME_DLC {
            return Err(PacketError::DlcTooSmall {
                dlc,
                required: MIN_FULL_FRAME_DLC,
            });
        }
        let ab = addressing.format().addressing_data_bytes();
        let frame_length = frame::data_length_for_dlc(dlc)?;
        let capacity = frame_length - ab - 1;
        if payload.len() > capacity {
            return Err(PacketError::PayloadTooLong {
                length: payload.len(),
                capacity,
            });
        }

        let mut data = Vec::with_capacity(frame_length);
        data.extend(addressing.addressing_byte());
        data.push(CanPacketType::ConsecutiveFrame.nibble() << 4 | sequence_number);
        data.extend_from_slice(payload);
        data.resize(frame_length, filler_byte);

        Ok(Self {
            packet_type: CanPacketType::ConsecutiveFrame,
            frame: CanFrame::new(addressing.can_id(), data)?,
            addressing,
            payload: payload.to_vec(),
            data_length: None,
            sequence_number: Some(sequence_number),
            flow_status: None,
            block_size: None,
            st_min: None,
        })
    }

    /// Build a Flow Control packet.
    ///
    /// Block size and STmin must both be supplied for Continue-To-Send
    /// and must both be absent for Wait/Overflow; the unused byte
    /// positions carry the filler byte on the wire.
    pub fn flow_control(
        addressing: AddressingParams,
        flow_status: FlowStatus,
        block_size: Option<u8>,
        st_min: Option<u8>,
        dlc: u8,
        filler_byte: u8,
    ) -> Result<Self, PacketError> {
        if dlc < MIN_FULL_FRAME_DLC {
            return Err(PacketError::DlcTooSmall {
                dlc,
                required: MIN_FULL_FRAME_DLC,
            });
        }
        match flow_status {
            FlowStatus::ContinueToSend => {
                if block_size.is_none() || st_min.is_none() {
                    return Err(PacketError::Inconsistent(
                        "block size and STmin must both be provided for ContinueToSend".into(),
                    ));
                }
            }
            FlowStatus::Wait | FlowStatus::Overflow => {
                if block_size.is_some() || st_min.is_some() {
                    return Err(PacketError::Inconsistent(format!(
                        "block size and STmin must not be provided for {flow_status:?}"
                    )));
                }
            }
        }
        let ab = addressing.format().addressing_data_bytes();
        let frame_length = frame::data_length_for_dlc(dlc)?;

        let mut data = Vec::with_capacity(frame_length);
        data.extend(addressing.addressing_byte());
        data.push(CanPacketType::FlowControl.nibble() << 4 | flow_status.nibble());
        data.push(block_size.unwrap_or(filler_byte));
        data.push(st_min.unwrap_or(filler_byte));
        data.resize(frame_length, filler_byte);

        Ok(Self {
            packet_type: CanPacketType::FlowControl,
            frame: CanFrame::new(addressing.can_id(), data)?,
            addressing,
            payload: Vec::new(),
            data_length: None,
            sequence_number: None,
            flow_status: Some(flow_status),
            block_size,
            st_min,
        })
    }

    /// Parse a received frame against known addressing parameters.
    pub fn from_frame(
        frame: CanFrame,
        addressing: AddressingParams,
    ) -> Result<Self, PacketError> {
        if !addressing.matches_frame(frame.raw_id(), frame.data().first().copied()) {
            return Err(PacketError::Inconsistent(format!(
                "frame with CAN ID 0x{:X} does not match the addressing parameters",
                frame.raw_id()
            )));
        }
        let ab = addressing.format().addressing_data_bytes();
        let data = frame.data();
        let pci = *data
            .get(ab)
            .ok_or_else(|| PacketError::Malformed("frame too short for an N_PCI byte".into()))?;
        let packet_type = CanPacketType::from_nibble(pci >> 4)
            .ok_or_else(|| PacketError::Malformed(format!("unknown N_PCI nibble 0x{:X}", pci >> 4)))?;

        match packet_type {
            CanPacketType::SingleFrame => Self::parse_single_frame(frame, addressing, ab),
            CanPacketType::FirstFrame => Self::parse_first_frame(frame, addressing, ab),
            CanPacketType::ConsecutiveFrame => Self::parse_consecutive_frame(frame, addressing, ab),
            CanPacketType::FlowControl => Self::parse_flow_control(frame, addressing, ab),
        }
    }

    fn parse_single_frame(
        frame: CanFrame,
        addressing: AddressingParams,
        ab: usize,
    ) -> Result<Self, PacketError> {
        let data = frame.data();
        let pci = data[ab];
        let (offset, sf_dl) = if data.len() <= 8 {
            (ab + 1, usize::from(pci & 0x0F))
        } else {
            if pci & 0x0F != 0 {
                return Err(PacketError::Malformed(
                    "CAN FD single frame must use the escape length form".into(),
                ));
            }
            let long = *data.get(ab + 1).ok_or_else(|| {
                PacketError::Malformed("frame too short for the escape SF_DL byte".into())
            })?;
            (ab + 2, usize::from(long))
        };
        if sf_dl == 0 || offset + sf_dl > data.len() {
            return Err(PacketError::Malformed(format!(
                "SF_DL of {sf_dl} does not fit the {}-byte frame",
                data.len()
            )));
        }
        let payload = data[offset..offset + sf_dl].to_vec();
        Ok(Self {
            packet_type: CanPacketType::SingleFrame,
            addressing,
            payload,
            frame,
            data_length: None,
            sequence_number: None,
            flow_status: None,
            block_size: None,
            st_min: None,
        })
    }

    fn parse_first_frame(
        frame: CanFrame,
        addressing: AddressingParams,
        ab: usize,
    ) -> Result<Self, PacketError> {
        let data = frame.data();
        if data.len() < 8 {
            return Err(PacketError::Malformed(
                "first frame requires a full CAN frame (DLC >= 8)".into(),
            ));
        }
        let pci = data[ab];
        let short_dl = u32::from(pci & 0x0F) << 8 | u32::from(data[ab + 1]);
        let (offset, data_length) = if short_dl != 0 {
            (ab + 2, short_dl)
        } else {
            let bytes = data.get(ab + 2..ab + 6).ok_or_else(|| {
                PacketError::Malformed("frame too short for the escape FF_DL field".into())
            })?;
            let long_dl = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
            if long_dl <= MAX_SHORT_FF_DL {
                return Err(PacketError::Malformed(format!(
                    "escape FF_DL form used for a short length of {long_dl}"
                )));
            }
            (ab + 6, long_dl)
        };
        let single_frame_capacity = if data.len() <= 8 {
            data.len() - ab - 1
        } else {
            data.len() - ab - 2
        };
        if data_length as usize <= single_frame_capacity {
            return Err(PacketError::Malformed(format!(
                "FF_DL of {data_length} fits a single frame at this frame size"
            )));
        }
        let payload = data[offset..].to_vec();
        Ok(Self {
            packet_type: CanPacketType::FirstFrame,
            addressing,
            payload,
            frame,
            data_length: Some(data_length),
            sequence_number: None,
            flow_status: None,
            block_size: None,
            st_min: None,
        })
    }

    fn parse_consecutive_frame(
        frame: CanFrame,
        addressing: AddressingParams,
        ab: usize,
    ) -> Result<Self, PacketError> {
        let data = frame.data();
        if data.len() < 8 {
            return Err(PacketError::Malformed(
                "consecutive frame requires a full CAN frame (DLC >= 8)".into(),
            ));
        }
        let sequence_number = data[ab] & 0x0F;
        // Padding is carried along; the declared message length truncates it.
        let payload = data[ab + 1..].to_vec();
        Ok(Self {
            packet_type: CanPacketType::ConsecutiveFrame,
            addressing,
            payload,
            frame,
            data_length: None,
            sequence_number: Some(sequence_number),
            flow_status: None,
            block_size: None,
            st_min: None,
        })
    }

    fn parse_flow_control(
        frame: CanFrame,
        addressing: AddressingParams,
        ab: usize,
    ) -> Result<Self, PacketError> {
        let data = frame.data();
        if data.len() < 8 {
            return Err(PacketError::Malformed(
                "flow control requires a full CAN frame (DLC >= 8)".into(),
            ));
        }
        let nibble = data[ab] & 0x0F;
        let flow_status = FlowStatus::from_nibble(nibble)
            .ok_or_else(|| PacketError::Malformed(format!("unknown flow status 0x{nibble:X}")))?;
        let (block_size, st_min) = match flow_status {
            FlowStatus::ContinueToSend => (Some(data[ab + 1]), Some(data[ab + 2])),
            // Those byte positions are filler for Wait/Overflow.
            FlowStatus::Wait | FlowStatus::Overflow => (None, None),
        };
        Ok(Self {
            packet_type: CanPacketType::FlowControl,
            addressing,
            payload: Vec::new(),
            frame,
            data_length: None,
            sequence_number: None,
            flow_status: Some(flow_status),
            block_size,
            st_min,
        })
    }

    pub fn packet_type(&self) -> CanPacketType {
        self.packet_type
    }

    pub fn addressing(&self) -> &AddressingParams {
        &self.addressing
    }

    pub fn frame(&self) -> &CanFrame {
        &self.frame
    }

    pub fn dlc(&self) -> u8 {
        self.frame.dlc()
    }

    /// Message payload portion of the frame (empty for Flow Control).
    ///
    /// Single and First Frames yield exactly their declared bytes;
    /// Consecutive Frames include trailing filler, which desegmentation
    /// truncates via the declared message length.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// FF_DL of a First Frame.
    pub fn declared_data_length(&self) -> Option<u32> {
        self.data_length
    }

    /// Sequence number of a Consecutive Frame.
    pub fn sequence_number(&self) -> Option<u8> {
        self.sequence_number
    }

    pub fn flow_status(&self) -> Option<FlowStatus> {
        self.flow_status
    }

    pub fn block_size(&self) -> Option<u8> {
        self.block_size
    }

    pub fn st_min(&self) -> Option<u8> {
        self.st_min
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addressing::{AddressingType, CanAddressingFormat};
    use crate::frame::DEFAULT_FILLER_BYTE;
    use pretty_assertions::assert_eq;

    fn normal_params() -> AddressingParams {
        AddressingParams::validated(
            CanAddressingFormat::Normal,
            AddressingType::Physical,
            Some(0x611),
            None,
            None,
            None,
        )
        .unwrap()
    }

    fn extended_params() -> AddressingParams {
        AddressingParams::validated(
            CanAddressingFormat::Extended,
            AddressingType::Physical,
            Some(0x7E0),
            Some(0xF1),
            None,
            None,
        )
        .unwrap()
    }

    #[test]
    fn test_single_frame_short_form() {
        let sf = CanPacket::single_frame(normal_params(), &[0x3E, 0x00], None, DEFAULT_FILLER_BYTE)
            .unwrap();
        assert_eq!(sf.frame().data(), &[0x02, 0x3E, 0x00]);
        assert_eq!(sf.dlc(), 3);
    }

    #[test]
    fn test_single_frame_with_padding() {
        let sf = CanPacket::single_frame(
            normal_params(),
            &[0x3E, 0x00],
            Some(8),
            DEFAULT_FILLER_BYTE,
        )
        .unwrap();
        assert_eq!(
            sf.frame().data(),
            &[0x02, 0x3E, 0x00, 0xCC, 0xCC, 0xCC, 0xCC, 0xCC]
        );
    }

    #[test]
    fn test_single_frame_escape_form_for_fd() {
        let payload: Vec<u8> = (0..20).collect();
        let sf =
            CanPacket::single_frame(normal_params(), &payload, None, DEFAULT_FILLER_BYTE).unwrap();
        // 22 bytes needed, snapped up to the 24-byte DLC step.
        assert_eq!(sf.frame().data().len(), 24);
        assert_eq!(sf.frame().data()[0], 0x00);
        assert_eq!(sf.frame().data()[1], 20);
        assert_eq!(&sf.frame().data()[2..22], payload.as_slice());
        assert_eq!(sf.frame().data()[22..], [0xCC, 0xCC]);
    }

    #[test]
    fn test_single_frame_extended_addressing_byte() {
        let sf = CanPacket::single_frame(extended_params(), &[0x10, 0x03], None, DEFAULT_FILLER_BYTE)
            .unwrap();
        assert_eq!(sf.frame().data(), &[0xF1, 0x02, 0x10, 0x03]);
    }

    #[test]
    fn test_single_frame_payload_too_long_for_dlc() {
        let err = CanPacket::single_frame(
            normal_params(),
            &[0u8; 8],
            Some(8),
            DEFAULT_FILLER_BYTE,
        );
        assert_eq!(
            err,
            Err(PacketError::PayloadTooLong {
                length: 8,
                capacity: 7
            })
        );
    }

    #[test]
    fn test_first_frame_short_form() {
        let ff = CanPacket::first_frame(normal_params(), 8, 62, &[1, 2, 3, 4, 5, 6]).unwrap();
        assert_eq!(ff.frame().data(), &[0x10, 62, 1, 2, 3, 4, 5, 6]);
        assert_eq!(ff.declared_data_length(), Some(62));
    }

    #[test]
    fn test_first_frame_escape_form() {
        let ff = CanPacket::first_frame(normal_params(), 8, 4095, &[1, 2]).unwrap();
        assert_eq!(ff.frame().data(), &[0x10, 0x00, 0x00, 0x00, 0x0F, 0xFF, 1, 2]);
        assert_eq!(ff.declared_data_length(), Some(4095));
    }

    #[test]
    fn test_first_frame_rejects_single_frame_sized_message() {
        let err = CanPacket::first_frame(normal_params(), 8, 7, &[1, 2, 3, 4, 5, 6]);
        assert!(matches!(err, Err(PacketError::Inconsistent(_))));
    }

    #[test]
    fn test_first_frame_requires_full_frame() {
        assert_eq!(
            CanPacket::first_frame(normal_params(), 7, 62, &[1, 2, 3, 4, 5]),
            Err(PacketError::DlcTooSmall {
                dlc: 7,
                required: 8
            })
        );
    }

    #[test]
    fn test_consecutive_frame_padding_and_sn() {
        let cf = CanPacket::consecutive_frame(normal_params(), &[9, 8, 7], 5, 8, DEFAULT_FILLER_BYTE)
            .unwrap();
        assert_eq!(cf.frame().data(), &[0x25, 9, 8, 7, 0xCC, 0xCC, 0xCC, 0xCC]);
        assert_eq!(cf.sequence_number(), Some(5));
    }

    #[test]
    fn test_consecutive_frame_sequence_number_range() {
        let err =
            CanPacket::consecutive_frame(normal_params(), &[1], 16, 8, DEFAULT_FILLER_BYTE);
        assert!(matches!(err, Err(PacketError::ValueOutOfRange(_))));
    }

    #[test]
    fn test_flow_control_continue_to_send() {
        let fc = CanPacket::flow_control(
            normal_params(),
            FlowStatus::ContinueToSend,
            Some(4),
            Some(10),
            8,
            DEFAULT_FILLER_BYTE,
        )
        .unwrap();
        assert_eq!(fc.frame().data(), &[0x30, 4, 10, 0xCC, 0xCC, 0xCC, 0xCC, 0xCC]);
        assert_eq!(fc.block_size(), Some(4));
        assert_eq!(fc.st_min(), Some(10));
    }

    #[test]
    fn test_flow_control_parameters_both_or_neither() {
        let err = CanPacket::flow_control(
            normal_params(),
            FlowStatus::ContinueToSend,
            Some(4),
            None,
            8,
            DEFAULT_FILLER_BYTE,
        );
        assert!(matches!(err, Err(PacketError::Inconsistent(_))));

        let err = CanPacket::flow_control(
            normal_params(),
            FlowStatus::Wait,
            Some(4),
            Some(10),
            8,
            DEFAULT_FILLER_BYTE,
        );
        assert!(matches!(err, Err(PacketError::Inconsistent(_))));

        let wait = CanPacket::flow_control(
            normal_params(),
            FlowStatus::Wait,
            None,
            None,
            8,
            DEFAULT_FILLER_BYTE,
        )
        .unwrap();
        assert_eq!(wait.frame().data()[0], 0x31);
        assert_eq!(wait.block_size(), None);
    }

    #[test]
    fn test_parse_round_trips() {
        let params = normal_params();
        let packets = [
            CanPacket::single_frame(params.clone(), &[0x22, 0xF1, 0x90], Some(8), 0xCC).unwrap(),
            CanPacket::first_frame(params.clone(), 8, 100, &[1, 2, 3, 4, 5, 6]).unwrap(),
            CanPacket::consecutive_frame(params.clone(), &[1, 2, 3, 4, 5, 6, 7], 1, 8, 0xCC)
                .unwrap(),
            CanPacket::flow_control(
                params.clone(),
                FlowStatus::ContinueToSend,
                Some(0),
                Some(0),
                8,
                0xCC,
            )
            .unwrap(),
        ];
        for packet in packets {
            let parsed = CanPacket::from_frame(packet.frame().clone(), params.clone()).unwrap();
            assert_eq!(parsed.packet_type(), packet.packet_type());
            assert_eq!(parsed.declared_data_length(), packet.declared_data_length());
            assert_eq!(parsed.sequence_number(), packet.sequence_number());
            assert_eq!(parsed.flow_status(), packet.flow_status());
            assert_eq!(parsed.block_size(), packet.block_size());
            assert_eq!(parsed.st_min(), packet.st_min());
        }
    }

    #[test]
    fn test_parse_consecutive_frame_keeps_filler() {
        let cf = CanPacket::consecutive_frame(normal_params(), &[9, 8, 7], 2, 8, 0xCC).unwrap();
        let parsed = CanPacket::from_frame(cf.frame().clone(), normal_params()).unwrap();
        assert_eq!(parsed.payload(), &[9, 8, 7, 0xCC, 0xCC, 0xCC, 0xCC]);
    }

    #[test]
    fn test_parse_rejects_mismatched_addressing() {
        let sf = CanPacket::single_frame(normal_params(), &[0x3E, 0x00], None, 0xCC).unwrap();
        let err = CanPacket::from_frame(sf.frame().clone(), extended_params());
        assert!(matches!(err, Err(PacketError::Inconsistent(_))));
    }

    #[test]
    fn test_parse_rejects_unknown_pci() {
        let frame = CanFrame::new(0x611, vec![0x40, 0, 0, 0, 0, 0, 0, 0]).unwrap();
        let err = CanPacket::from_frame(frame, normal_params());
        assert!(matches!(err, Err(PacketError::Malformed(_))));
    }

    #[test]
    fn test_parse_rejects_bad_sf_dl() {
        // SF_DL of 7 in a 3-byte frame.
        let frame = CanFrame::new(0x611, vec![0x07, 0x3E, 0x00]).unwrap();
        let err = CanPacket::from_frame(frame, normal_params());
        assert!(matches!(err, Err(PacketError::Malformed(_))));
    }

    #[test]
    fn test_parse_rejects_single_frame_sized_ff_dl() {
        // FF_DL of 3 fits a single frame; the builder refuses it, so must
        // the parser.
        let frame = CanFrame::new(0x611, vec![0x10, 0x03, 1, 2, 3, 4, 5, 6]).unwrap();
        let err = CanPacket::from_frame(frame, normal_params());
        assert!(matches!(err, Err(PacketError::Malformed(_))));
    }

    #[test]
    fn test_st_min_codec() {
        assert_eq!(decode_st_min(0x00), Duration::ZERO);
        assert_eq!(decode_st_min(0x7F), Duration::from_millis(127));
        assert_eq!(decode_st_min(0xF1), Duration::from_micros(100));
        assert_eq!(decode_st_min(0xF9), Duration::from_micros(900));
        // Reserved values fall back to the maximum.
        assert_eq!(decode_st_min(0x80), Duration::from_millis(127));
        assert_eq!(decode_st_min(0xFA), Duration::from_millis(127));

        assert_eq!(encode_st_min(Duration::ZERO), 0x00);
        assert_eq!(encode_st_min(Duration::from_millis(10)), 0x0A);
        assert_eq!(encode_st_min(Duration::from_secs(1)), 0x7F);
        assert_eq!(encode_st_min(Duration::from_micros(300)), 0xF3);
        assert_eq!(encode_st_min(Duration::from_micros(250)), 0xF3);
        // Values between representable steps round up, never down.
        assert_eq!(encode_st_min(Duration::from_micros(1_900)), 0x02);
    }
}
