//! Message segmentation and reassembly.
//!
//! Converts between [`UdsMessage`] payloads and the packet sequences
//! that carry them: a Single Frame when everything fits, otherwise a
//! First Frame followed by Consecutive Frames with wrapping sequence
//! numbers.

use thiserror::Error;

use crate::addressing::{AddressingType, NodeAddressingInformation};
use crate::frame;
use crate::message::{MessageError, UdsMessage};
use crate::packet::{CanPacket, CanPacketType, PacketError, MAX_SHORT_FF_DL};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SegmentationError {
    #[error("message of {length} bytes exceeds the maximum transferable length of {max}")]
    MessageTooLong { length: usize, max: u32 },

    #[error(
        "functionally addressed message of {length} bytes exceeds the \
         single frame capacity of {capacity}"
    )]
    FunctionalTooLong { length: usize, capacity: usize },

    #[error("a packet sequence must start with a Single Frame or First Frame")]
    NotInitialPacket,

    #[error("unexpected packet at position {index} of the sequence")]
    UnexpectedPacket { index: usize },

    #[error("wrong sequence number at position {index}: expected {expected}, found {found}")]
    WrongSequenceNumber {
        index: usize,
        expected: u8,
        found: u8,
    },

    #[error("the packet sequence does not carry the full declared message length")]
    IncompleteSequence,

    #[error("the packet sequence mixes packets with different addressing parameters")]
    MixedAddressing,

    #[error(transparent)]
    Packet(#[from] PacketError),

    #[error(transparent)]
    Message(#[from] MessageError),
}

/// Splits outgoing messages into packets for one node's addressing
/// configuration.
#[derive(Debug, Clone)]
pub struct CanSegmenter {
    addressing: NodeAddressingInformation,
    dlc: u8,
    use_data_optimization: bool,
    filler_byte: u8,
}

impl CanSegmenter {
    /// The DLC applies to every produced frame; full frames (FF, CF)
    /// need at least DLC 8, so smaller values are rejected here.
    pub fn new(
        addressing: NodeAddressingInformation,
        dlc: u8,
        use_data_optimization: bool,
        filler_byte: u8,
    ) -> Result<Self, SegmentationError> {
        if dlc < 8 {
            return Err(PacketError::DlcTooSmall { dlc, required: 8 }.into());
        }
        frame::data_length_for_dlc(dlc).map_err(PacketError::from)?;
        Ok(Self {
            addressing,
            dlc,
            use_data_optimization,
            filler_byte,
        })
    }

    pub fn addressing(&self) -> &NodeAddressingInformation {
        &self.addressing
    }

    pub fn dlc(&self) -> u8 {
        self.dlc
    }

    pub fn filler_byte(&self) -> u8 {
        self.filler_byte
    }

    /// Split a message into the packet sequence that transmits it.
    ///
    /// Functionally addressed messages must fit a Single Frame; physical
    /// ones are segmented into FF + CFs with sequence numbers wrapping
    /// 1..15, 0, 1, ...
    pub fn segmentation(&self, message: &UdsMessage) -> Result<Vec<CanPacket>, SegmentationError> {
        let params = self.addressing.tx_params(message.addressing_type()).clone();
        let ab = params.format().addressing_data_bytes();
        let frame_length = frame::data_length_for_dlc(self.dlc).map_err(PacketError::from)?;
        let payload = message.payload();

        let sf_overhead = if frame_length <= 8 { 1 } else { 2 };
        let sf_capacity = frame_length - ab - sf_overhead;
        if payload.len() <= sf_capacity {
            let dlc = if self.use_data_optimization {
                None
            } else {
                Some(self.dlc)
            };
            let sf = CanPacket::single_frame(params, payload, dlc, self.filler_byte)?;
            return Ok(vec![sf]);
        }

        if message.addressing_type() == AddressingType::Functional {
            return Err(SegmentationError::FunctionalTooLong {
                length: payload.len(),
                capacity: sf_capacity,
            });
        }
        if payload.len() > u32::MAX as usize {
            return Err(SegmentationError::MessageTooLong {
                length: payload.len(),
                max: u32::MAX,
            });
        }

        let ff_dl = payload.len() as u32;
        let ff_overhead = if ff_dl <= MAX_SHORT_FF_DL { 2 } else { 6 };
        let ff_payload = frame_length - ab - ff_overhead;
        let cf_capacity = frame_length - ab - 1;

        let mut packets = vec![CanPacket::first_frame(
            params.clone(),
            self.dlc,
            ff_dl,
            &payload[..ff_payload],
        )?];
        let mut sequence_number = 1u8;
        for chunk in payload[ff_payload..].chunks(cf_capacity) {
            packets.push(CanPacket::consecutive_frame(
                params.clone(),
                chunk,
                sequence_number,
                self.dlc,
                self.filler_byte,
            )?);
            sequence_number = (sequence_number + 1) % 16;
        }
        Ok(packets)
    }
}

/// Reassemble exactly one message from a packet sequence.
///
/// The sequence must be complete and carry nothing beyond the declared
/// message; trailing filler in the last Consecutive Frame is truncated
/// via the First Frame's FF_DL.
pub fn desegmentation(packets: &[CanPacket]) -> Result<UdsMessage, SegmentationError> {
    validate_sequence(packets)?;
    let first = &packets[0];
    let addressing_type = first.addressing().addressing_type();
    let payload = match first.packet_type() {
        CanPacketType::SingleFrame => first.payload().to_vec(),
        CanPacketType::FirstFrame => {
            let declared = first
                .declared_data_length()
                .unwrap_or_default() as usize;
            let mut payload = Vec::with_capacity(declared);
            payload.extend_from_slice(first.payload());
            for packet in &packets[1..] {
                payload.extend_from_slice(packet.payload());
            }
            payload.truncate(declared);
            payload
        }
        _ => return Err(SegmentationError::NotInitialPacket),
    };
    Ok(UdsMessage::new(payload, addressing_type)?)
}

/// Whether a packet sequence forms exactly one complete message.
pub fn is_complete_packets_sequence(packets: &[CanPacket]) -> bool {
    validate_sequence(packets).is_ok()
}

fn validate_sequence(packets: &[CanPacket]) -> Result<(), SegmentationError> {
    let first = packets.first().ok_or(SegmentationError::IncompleteSequence)?;
    if !first.packet_type().is_initial() {
        return Err(SegmentationError::NotInitialPacket);
    }
    if packets[1..]
        .iter()
        .any(|packet| packet.addressing() != first.addressing())
    {
        return Err(SegmentationError::MixedAddressing);
    }

    match first.packet_type() {
        CanPacketType::SingleFrame => {
            if packets.len() > 1 {
                return Err(SegmentationError::UnexpectedPacket { index: 1 });
            }
            Ok(())
        }
        CanPacketType::FirstFrame => {
            let declared = first.declared_data_length().unwrap_or_default() as usize;
            let mut carried = first.payload().len();
            let mut expected_sn = 1u8;
            for (index, packet) in packets.iter().enumerate().skip(1) {
                if packet.packet_type() != CanPacketType::ConsecutiveFrame {
                    return Err(SegmentationError::UnexpectedPacket { index });
                }
                if carried >= declared {
                    // The message was already complete; this packet is surplus.
                    return Err(SegmentationError::UnexpectedPacket { index });
                }
                let found = packet.sequence_number().unwrap_or_default();
                if found != expected_sn {
                    return Err(SegmentationError::WrongSequenceNumber {
                        index,
                        expected: expected_sn,
                        found,
                    });
                }
                carried += packet.payload().len();
                expected_sn = (expected_sn + 1) % 16;
            }
            if carried < declared {
                return Err(SegmentationError::IncompleteSequence);
            }
            Ok(())
        }
        _ => Err(SegmentationError::NotInitialPacket),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addressing::{AddressingParams, CanAddressingFormat};
    use crate::frame::DEFAULT_FILLER_BYTE;
    use pretty_assertions::assert_eq;

    fn node() -> NodeAddressingInformation {
        let params = |addressing_type, can_id| {
            AddressingParams::validated(
                CanAddressingFormat::Normal,
                addressing_type,
                Some(can_id),
                None,
                None,
                None,
            )
            .unwrap()
        };
        NodeAddressingInformation::new(
            params(AddressingType::Physical, 0x7E8),
            params(AddressingType::Physical, 0x7E0),
            params(AddressingType::Functional, 0x7DE),
            params(AddressingType::Functional, 0x7DF),
        )
        .unwrap()
    }

    fn segmenter() -> CanSegmenter {
        CanSegmenter::new(node(), 8, false, DEFAULT_FILLER_BYTE).unwrap()
    }

    #[test]
    fn test_segmenter_rejects_small_dlc() {
        assert!(matches!(
            CanSegmenter::new(node(), 7, false, DEFAULT_FILLER_BYTE),
            Err(SegmentationError::Packet(PacketError::DlcTooSmall { .. }))
        ));
    }

    #[test]
    fn test_single_frame_segmentation() {
        let message = UdsMessage::new(vec![0x3E, 0x00], AddressingType::Physical).unwrap();
        let packets = segmenter().segmentation(&message).unwrap();
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].packet_type(), CanPacketType::SingleFrame);
        assert_eq!(packets[0].frame().raw_id(), 0x7E0);
    }

    #[test]
    fn test_multi_frame_packet_counts() {
        // 62 bytes at DLC 8: 6 in the FF, then 8 CFs of 7.
        let message = UdsMessage::new(vec![0xAA; 62], AddressingType::Physical).unwrap();
        let packets = segmenter().segmentation(&message).unwrap();
        assert_eq!(packets.len(), 9);
        assert_eq!(packets[0].packet_type(), CanPacketType::FirstFrame);
        assert_eq!(packets[0].declared_data_length(), Some(62));
        assert!(packets[1..]
            .iter()
            .all(|p| p.packet_type() == CanPacketType::ConsecutiveFrame));
    }

    #[test]
    fn test_round_trip_various_lengths() {
        // 4095 exercises the escape FF_DL form, 4096 stays beyond it.
        for length in [1usize, 7, 8, 62, 4095, 4096] {
            let payload: Vec<u8> = (0..length).map(|i| i as u8).collect();
            let message = UdsMessage::new(payload, AddressingType::Physical).unwrap();
            let packets = segmenter().segmentation(&message).unwrap();
            let rebuilt = desegmentation(&packets).unwrap();
            assert_eq!(rebuilt.payload(), message.payload(), "length {length}");
            assert_eq!(rebuilt.addressing_type(), AddressingType::Physical);
        }
    }

    #[test]
    fn test_sequence_number_wraparound() {
        // 6 + 17 * 7 = 125 bytes produces 17 CFs: 1..15, 0, 1.
        let message = UdsMessage::new(vec![0x55; 125], AddressingType::Physical).unwrap();
        let packets = segmenter().segmentation(&message).unwrap();
        assert_eq!(packets.len(), 18);
        let numbers: Vec<u8> = packets[1..]
            .iter()
            .map(|p| p.sequence_number().unwrap())
            .collect();
        let expected: Vec<u8> = (1..=15).chain([0, 1]).collect();
        assert_eq!(numbers, expected);
        assert_eq!(desegmentation(&packets).unwrap().payload(), &[0x55; 125][..]);
    }

    #[test]
    fn test_functional_must_fit_single_frame() {
        let message = UdsMessage::new(vec![0u8; 8], AddressingType::Functional).unwrap();
        assert_eq!(
            segmenter().segmentation(&message),
            Err(SegmentationError::FunctionalTooLong {
                length: 8,
                capacity: 7
            })
        );
    }

    #[test]
    fn test_functional_single_frame_uses_functional_id() {
        let message = UdsMessage::new(vec![0x10, 0x03], AddressingType::Functional).unwrap();
        let packets = segmenter().segmentation(&message).unwrap();
        assert_eq!(packets[0].frame().raw_id(), 0x7DF);
    }

    #[test]
    fn test_complete_sequence_predicate() {
        let message = UdsMessage::new(vec![0x11; 20], AddressingType::Physical).unwrap();
        let packets = segmenter().segmentation(&message).unwrap();
        assert!(is_complete_packets_sequence(&packets));
        // Dropping the last CF leaves the sequence short.
        assert!(!is_complete_packets_sequence(&packets[..packets.len() - 1]));
        // A sequence cannot start mid-message.
        assert!(!is_complete_packets_sequence(&packets[1..]));
        assert!(!is_complete_packets_sequence(&[]));

        // A Single Frame is a message on its own; nothing may follow it.
        let single = segmenter()
            .segmentation(&UdsMessage::new(vec![0x3E, 0x00], AddressingType::Physical).unwrap())
            .unwrap();
        assert!(is_complete_packets_sequence(&single));
        let mut with_trailer = single.clone();
        with_trailer.push(packets[1].clone());
        assert!(!is_complete_packets_sequence(&with_trailer));
    }

    #[test]
    fn test_validate_rejects_wrong_sequence_number() {
        let message = UdsMessage::new(vec![0x11; 30], AddressingType::Physical).unwrap();
        let mut packets = segmenter().segmentation(&message).unwrap();
        packets.swap(1, 2);
        assert_eq!(
            desegmentation(&packets),
            Err(SegmentationError::WrongSequenceNumber {
                index: 1,
                expected: 1,
                found: 2
            })
        );
    }

    #[test]
    fn test_validate_rejects_surplus_packet() {
        let message = UdsMessage::new(vec![0x11; 20], AddressingType::Physical).unwrap();
        let mut packets = segmenter().segmentation(&message).unwrap();
        let extra = CanPacket::consecutive_frame(
            packets[0].addressing().clone(),
            &[0; 7],
            3,
            8,
            DEFAULT_FILLER_BYTE,
        )
        .unwrap();
        packets.push(extra);
        assert_eq!(
            desegmentation(&packets),
            Err(SegmentationError::UnexpectedPacket { index: 3 })
        );
    }

    #[test]
    fn test_validate_rejects_mixed_addressing() {
        let message = UdsMessage::new(vec![0x11; 20], AddressingType::Physical).unwrap();
        let mut packets = segmenter().segmentation(&message).unwrap();
        let other = AddressingParams::validated(
            CanAddressingFormat::Normal,
            AddressingType::Physical,
            Some(0x123),
            None,
            None,
            None,
        )
        .unwrap();
        packets[2] = CanPacket::consecutive_frame(other, &[0; 7], 2, 8, DEFAULT_FILLER_BYTE)
            .unwrap();
        assert_eq!(desegmentation(&packets), Err(SegmentationError::MixedAddressing));
    }

    #[test]
    fn test_desegmentation_truncates_filler() {
        // 10 bytes: FF carries 6, the lone CF carries 4 plus 3 filler bytes.
        let payload: Vec<u8> = (1..=10).collect();
        let message = UdsMessage::new(payload.clone(), AddressingType::Physical).unwrap();
        let packets = segmenter().segmentation(&message).unwrap();
        assert_eq!(packets.len(), 2);
        assert_eq!(desegmentation(&packets).unwrap().payload(), payload.as_slice());
    }
}
