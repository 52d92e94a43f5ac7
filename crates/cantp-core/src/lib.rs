//! cantp-core - ISO 15765-2 protocol arithmetic for UDS over CAN
//!
//! This crate contains the pure (runtime-free) half of the CAN transport
//! layer: addressing resolution, packet framing and message segmentation.
//! The tokio-based scheduling half lives in `cantp-transport`.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                     CanSegmenter                         │
//! │  UdsMessage <-> Vec<CanPacket> conversion                │
//! │                                                          │
//! │  ┌──────────────────┐   ┌─────────────────────────────┐  │
//! │  │ CanPacket        │   │ NodeAddressingInformation   │  │
//! │  │ (SF/FF/CF/FC     │   │ (rx/tx x phys/func params)  │  │
//! │  │  framing, DLC)   │   │                             │  │
//! │  └────────┬─────────┘   └──────────────┬──────────────┘  │
//! │           │                            │                 │
//! │  ┌────────┴─────────┐   ┌──────────────┴──────────────┐  │
//! │  │ CanFrame         │   │ addressing::can_id          │  │
//! │  │ (raw id + data)  │   │ (29-bit TA/SA bit codec)    │  │
//! │  └──────────────────┘   └─────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod addressing;
pub mod frame;
pub mod message;
pub mod packet;
pub mod segmentation;

pub use addressing::{
    AddressingError, AddressingParams, AddressingType, CanAddressingFormat,
    NodeAddressingInformation,
};
pub use frame::{CanFrame, FrameError, DEFAULT_FILLER_BYTE};
pub use message::{MessageError, UdsMessage, UdsMessageRecord};
pub use packet::{
    CanPacket, CanPacketRecord, CanPacketType, FlowStatus, PacketError, TransmissionDirection,
};
pub use segmentation::{CanSegmenter, SegmentationError};
