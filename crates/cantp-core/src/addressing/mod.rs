//! CAN addressing resolution per ISO 15765-2
//!
//! Maps between a CAN identifier + leading data byte and the normalized
//! addressing tuple (addressing type, target/source address, address
//! extension) for each of the five addressing formats.

pub mod can_id;
mod node;

pub use node::NodeAddressingInformation;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use can_id::DecodedCanId;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AddressingError {
    #[error("{argument} is not used by {format:?} addressing and must not be supplied")]
    UnusedArgument {
        format: CanAddressingFormat,
        argument: &'static str,
    },

    #[error("inconsistent addressing arguments: {0}")]
    InconsistentArguments(String),

    #[error("CAN ID 0x{0:X} is out of range")]
    InvalidCanId(u32),

    #[error("CAN ID 0x{0:X} does not match any known addressing offset")]
    UnrecognizedCanId(u32),

    #[error("value out of range: {0}")]
    ValueOutOfRange(String),
}

/// Physical (1-to-1) or functional (1-to-n) addressing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressingType {
    Physical,
    Functional,
}

/// The five CAN addressing formats of ISO 15765-2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanAddressingFormat {
    /// Addressing carried entirely by an opaque CAN ID.
    Normal,
    /// 29-bit CAN ID encodes addressing type, TA and SA.
    NormalFixed,
    /// Opaque CAN ID plus target address in the first data byte.
    Extended,
    /// Opaque CAN ID plus address extension in the first data byte.
    Mixed11Bit,
    /// Normal Fixed style CAN ID plus address extension data byte.
    Mixed29Bit,
}

impl CanAddressingFormat {
    /// Number of leading data-field bytes consumed by addressing.
    pub fn addressing_data_bytes(self) -> usize {
        match self {
            CanAddressingFormat::Normal | CanAddressingFormat::NormalFixed => 0,
            CanAddressingFormat::Extended
            | CanAddressingFormat::Mixed11Bit
            | CanAddressingFormat::Mixed29Bit => 1,
        }
    }

    /// Whether `can_id` is usable with this format (optionally for a
    /// specific addressing type).
    pub fn is_compatible_can_id(
        self,
        can_id: u32,
        addressing_type: Option<AddressingType>,
    ) -> bool {
        match self {
            CanAddressingFormat::Normal
            | CanAddressingFormat::Extended
            | CanAddressingFormat::Mixed11Bit => can_id::is_valid_can_id(can_id),
            CanAddressingFormat::NormalFixed => {
                can_id::is_normal_fixed_compatible(can_id, addressing_type)
            }
            CanAddressingFormat::Mixed29Bit => {
                can_id::is_mixed_29bit_compatible(can_id, addressing_type)
            }
        }
    }

    /// Addressing information derivable from the CAN ID alone.
    ///
    /// Normal, Extended and Mixed 11-bit identifiers are opaque and yield
    /// `None`; the two encoded 29-bit formats yield the full decoded
    /// tuple or fail for an unrecognized identifier.
    pub fn decode_can_id_params(self, can_id: u32) -> Result<Option<DecodedCanId>, AddressingError> {
        can_id::validate_can_id(can_id)?;
        match self {
            CanAddressingFormat::Normal
            | CanAddressingFormat::Extended
            | CanAddressingFormat::Mixed11Bit => Ok(None),
            CanAddressingFormat::NormalFixed => can_id::decode_normal_fixed(can_id).map(Some),
            CanAddressingFormat::Mixed29Bit => can_id::decode_mixed_29bit(can_id).map(Some),
        }
    }
}

/// Normalized, validated addressing tuple for one packet direction.
///
/// Construction via [`AddressingParams::validated`] is the only way to
/// obtain an instance; the type is immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressingParams {
    format: CanAddressingFormat,
    addressing_type: AddressingType,
    can_id: u32,
    target_address: Option<u8>,
    source_address: Option<u8>,
    address_extension: Option<u8>,
}

impl AddressingParams {
    /// Validate a full addressing tuple for `format` and normalize it.
    ///
    /// Parameters not used by the format must be `None` (unused-argument
    /// error otherwise). A CAN ID that conflicts with supplied TA/SA or
    /// the addressing type, or jointly missing required values, is an
    /// inconsistent-arguments error. For the encoded 29-bit formats the
    /// CAN ID is derived from TA/SA when absent and TA/SA are derived
    /// from the CAN ID when present.
    pub fn validated(
        format: CanAddressingFormat,
        addressing_type: AddressingType,
        can_id: Option<u32>,
        target_address: Option<u8>,
        source_address: Option<u8>,
        address_extension: Option<u8>,
    ) -> Result<Self, AddressingError> {
        match format {
            CanAddressingFormat::Normal => {
                reject_unused(format, "target_address", target_address)?;
                reject_unused(format, "source_address", source_address)?;
                reject_unused(format, "address_extension", address_extension)?;
                let can_id = require_can_id(can_id)?;
                Ok(Self {
                    format,
                    addressing_type,
                    can_id,
                    target_address: None,
                    source_address: None,
                    address_extension: None,
                })
            }
            CanAddressingFormat::NormalFixed => {
                reject_unused(format, "address_extension", address_extension)?;
                let (can_id, ta, sa) = resolve_encoded_id(
                    format,
                    addressing_type,
                    can_id,
                    target_address,
                    source_address,
                )?;
                Ok(Self {
                    format,
                    addressing_type,
                    can_id,
                    target_address: Some(ta),
                    source_address: Some(sa),
                    address_extension: None,
                })
            }
            CanAddressingFormat::Extended => {
                reject_unused(format, "source_address", source_address)?;
                reject_unused(format, "address_extension", address_extension)?;
                let can_id = require_can_id(can_id)?;
                let ta = target_address.ok_or_else(|| {
                    AddressingError::InconsistentArguments(
                        "extended addressing requires a target address".into(),
                    )
                })?;
                Ok(Self {
                    format,
                    addressing_type,
                    can_id,
                    target_address: Some(ta),
                    source_address: None,
                    address_extension: None,
                })
            }
            CanAddressingFormat::Mixed11Bit => {
                reject_unused(format, "target_address", target_address)?;
                reject_unused(format, "source_address", source_address)?;
                let can_id = require_can_id(can_id)?;
                let ae = address_extension.ok_or_else(|| {
                    AddressingError::InconsistentArguments(
                        "mixed addressing requires an address extension".into(),
                    )
                })?;
                Ok(Self {
                    format,
                    addressing_type,
                    can_id,
                    target_address: None,
                    source_address: None,
                    address_extension: Some(ae),
                })
            }
            CanAddressingFormat::Mixed29Bit => {
                let ae = address_extension.ok_or_else(|| {
                    AddressingError::InconsistentArguments(
                        "mixed addressing requires an address extension".into(),
                    )
                })?;
                let (can_id, ta, sa) = resolve_encoded_id(
                    format,
                    addressing_type,
                    can_id,
                    target_address,
                    source_address,
                )?;
                Ok(Self {
                    format,
                    addressing_type,
                    can_id,
                    target_address: Some(ta),
                    source_address: Some(sa),
                    address_extension: Some(ae),
                })
            }
        }
    }

    pub fn format(&self) -> CanAddressingFormat {
        self.format
    }

    pub fn addressing_type(&self) -> AddressingType {
        self.addressing_type
    }

    pub fn can_id(&self) -> u32 {
        self.can_id
    }

    pub fn target_address(&self) -> Option<u8> {
        self.target_address
    }

    pub fn source_address(&self) -> Option<u8> {
        self.source_address
    }

    pub fn address_extension(&self) -> Option<u8> {
        self.address_extension
    }

    /// Value of the leading addressing data byte, when the format has one
    /// (TA for Extended, AE for the Mixed formats).
    pub fn addressing_byte(&self) -> Option<u8> {
        match self.format {
            CanAddressingFormat::Normal | CanAddressingFormat::NormalFixed => None,
            CanAddressingFormat::Extended => self.target_address,
            CanAddressingFormat::Mixed11Bit | CanAddressingFormat::Mixed29Bit => {
                self.address_extension
            }
        }
    }

    /// Whether a received frame head (CAN ID + first data byte) matches
    /// this addressing tuple.
    pub fn matches_frame(&self, can_id: u32, first_data_byte: Option<u8>) -> bool {
        if can_id != self.can_id {
            return false;
        }
        match self.addressing_byte() {
            None => true,
            Some(expected) => first_data_byte == Some(expected),
        }
    }
}

fn reject_unused(
    format: CanAddressingFormat,
    argument: &'static str,
    value: Option<u8>,
) -> Result<(), AddressingError> {
    if value.is_some() {
        return Err(AddressingError::UnusedArgument { format, argument });
    }
    Ok(())
}

fn require_can_id(can_id: Option<u32>) -> Result<u32, AddressingError> {
    let can_id =
        can_id.ok_or_else(|| {
            AddressingError::InconsistentArguments("a CAN ID must be provided".into())
        })?;
    can_id::validate_can_id(can_id)?;
    Ok(can_id)
}

/// Resolve CAN ID and TA/SA against each other for the encoded 29-bit
/// formats (Normal Fixed and Mixed 29-bit).
fn resolve_encoded_id(
    format: CanAddressingFormat,
    addressing_type: AddressingType,
    can_id: Option<u32>,
    target_address: Option<u8>,
    source_address: Option<u8>,
) -> Result<(u32, u8, u8), AddressingError> {
    let decode = |id| match format {
        CanAddressingFormat::NormalFixed => can_id::decode_normal_fixed(id),
        CanAddressingFormat::Mixed29Bit => can_id::decode_mixed_29bit(id),
        _ => Err(AddressingError::UnrecognizedCanId(id)),
    };
    let encode = |at, ta, sa| match format {
        CanAddressingFormat::NormalFixed => {
            can_id::encode_normal_fixed(at, ta, sa, can_id::DEFAULT_PRIORITY)
        }
        CanAddressingFormat::Mixed29Bit => {
            can_id::encode_mixed_29bit(at, ta, sa, can_id::DEFAULT_PRIORITY)
        }
        _ => Err(AddressingError::UnrecognizedCanId(0)),
    };

    match can_id {
        Some(id) => {
            let decoded = decode(id)?;
            if decoded.addressing_type != addressing_type {
                return Err(AddressingError::InconsistentArguments(format!(
                    "CAN ID 0x{id:X} encodes {:?} addressing, not {:?}",
                    decoded.addressing_type, addressing_type
                )));
            }
            if let Some(ta) = target_address {
                if ta != decoded.target_address {
                    return Err(AddressingError::InconsistentArguments(format!(
                        "target address 0x{ta:02X} conflicts with CAN ID 0x{id:X}"
                    )));
                }
            }
            if let Some(sa) = source_address {
                if sa != decoded.source_address {
                    return Err(AddressingError::InconsistentArguments(format!(
                        "source address 0x{sa:02X} conflicts with CAN ID 0x{id:X}"
                    )));
                }
            }
            Ok((id, decoded.target_address, decoded.source_address))
        }
        None => match (target_address, source_address) {
            (Some(ta), Some(sa)) => {
                let id = encode(addressing_type, ta, sa)?;
                Ok((id, ta, sa))
            }
            _ => Err(AddressingError::InconsistentArguments(
                "either a CAN ID or both target and source address must be provided".into(),
            )),
        },
    }
}
