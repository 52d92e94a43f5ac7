//! Transport layer errors

use thiserror::Error;

use cantp_core::addressing::AddressingError;
use cantp_core::message::MessageError;
use cantp_core::packet::PacketError;
use cantp_core::segmentation::SegmentationError;

use crate::timing::TimingParameter;

#[derive(Debug, Error, Clone)]
pub enum TransportError {
    #[error("timed out waiting on {parameter}")]
    Timeout { parameter: TimingParameter },

    #[error("timed out waiting for an incoming message")]
    ReceiveTimeout,

    #[error("invalid value for {parameter}: {reason}")]
    InvalidTimingValue {
        parameter: TimingParameter,
        reason: String,
    },

    #[error("peer reported a buffer overflow, transmission aborted")]
    Overflow,

    #[error("send failed: {0}")]
    SendFailed(String),

    #[error("connection closed")]
    ConnectionClosed,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Addressing(#[from] AddressingError),

    #[error(transparent)]
    Packet(#[from] PacketError),

    #[error(transparent)]
    Segmentation(#[from] SegmentationError),

    #[error(transparent)]
    Message(#[from] MessageError),
}
