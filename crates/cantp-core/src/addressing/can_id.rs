//! CAN identifier bit codec
//!
//! Pure arithmetic for 11-bit/29-bit identifier ranges and for the
//! addressing formats whose identifier encodes the addressing tuple
//! (Normal Fixed and Mixed 29-bit per ISO 15765-2).

use super::{AddressingError, AddressingType};

/// Highest 11-bit (standard) CAN identifier.
pub const MAX_STANDARD_CAN_ID: u32 = 0x7FF;
/// Lowest identifier treated as 29-bit (extended).
pub const MIN_EXTENDED_CAN_ID: u32 = 0x800;
/// Highest 29-bit (extended) CAN identifier.
pub const MAX_EXTENDED_CAN_ID: u32 = 0x1FFF_FFFF;

/// Default priority bits for encoded 29-bit identifiers.
pub const DEFAULT_PRIORITY: u8 = 0b110;
/// Highest value the 3 priority bits can take.
pub const MAX_PRIORITY: u8 = 0b111;

const PRIORITY_SHIFT: u32 = 26;
/// Masks the 26 identifier bits below the priority field.
const WITHOUT_PRIORITY_MASK: u32 = 0x03FF_FFFF;
/// Masks the format base, i.e. the 26-bit value with TA/SA removed.
const BASE_MASK: u32 = 0x03FF_0000;

// Format bases within the 26 bits below the priority field. With the
// default 0b110 priority these yield the well-known 0x18DAxxxx /
// 0x18DBxxxx / 0x18CExxxx / 0x18CDxxxx identifiers.
const NORMAL_FIXED_PHYSICAL_BASE: u32 = 0x00DA_0000;
const NORMAL_FIXED_FUNCTIONAL_BASE: u32 = 0x00DB_0000;
const MIXED_29BIT_PHYSICAL_BASE: u32 = 0x00CE_0000;
const MIXED_29BIT_FUNCTIONAL_BASE: u32 = 0x00CD_0000;

/// Addressing information recovered from an encoded 29-bit identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedCanId {
    pub addressing_type: AddressingType,
    pub target_address: u8,
    pub source_address: u8,
    pub priority: u8,
}

pub fn is_standard_can_id(can_id: u32) -> bool {
    can_id <= MAX_STANDARD_CAN_ID
}

pub fn is_extended_can_id(can_id: u32) -> bool {
    (MIN_EXTENDED_CAN_ID..=MAX_EXTENDED_CAN_ID).contains(&can_id)
}

pub fn is_valid_can_id(can_id: u32) -> bool {
    can_id <= MAX_EXTENDED_CAN_ID
}

pub fn validate_can_id(can_id: u32) -> Result<(), AddressingError> {
    if is_valid_can_id(can_id) {
        Ok(())
    } else {
        Err(AddressingError::InvalidCanId(can_id))
    }
}

pub fn validate_priority(priority: u8) -> Result<(), AddressingError> {
    if priority > MAX_PRIORITY {
        return Err(AddressingError::ValueOutOfRange(format!(
            "priority 0b{priority:b} does not fit in 3 bits"
        )));
    }
    Ok(())
}

fn bases(physical: u32, functional: u32, addressing_type: AddressingType) -> u32 {
    match addressing_type {
        AddressingType::Physical => physical,
        AddressingType::Functional => functional,
    }
}

fn encode(
    physical_base: u32,
    functional_base: u32,
    addressing_type: AddressingType,
    target_address: u8,
    source_address: u8,
    priority: u8,
) -> Result<u32, AddressingError> {
    validate_priority(priority)?;
    let base = bases(physical_base, functional_base, addressing_type);
    Ok(u32::from(priority) << PRIORITY_SHIFT
        | base
        | u32::from(target_address) << 8
        | u32::from(source_address))
}

fn decode(
    physical_base: u32,
    functional_base: u32,
    can_id: u32,
) -> Result<DecodedCanId, AddressingError> {
    validate_can_id(can_id)?;
    let masked_base = can_id & BASE_MASK;
    let addressing_type = if masked_base == physical_base {
        AddressingType::Physical
    } else if masked_base == functional_base {
        AddressingType::Functional
    } else {
        return Err(AddressingError::UnrecognizedCanId(can_id));
    };
    Ok(DecodedCanId {
        addressing_type,
        target_address: (can_id >> 8) as u8,
        source_address: can_id as u8,
        priority: (can_id >> PRIORITY_SHIFT) as u8,
    })
}

/// Encode a Normal Fixed addressing identifier
/// (`0x18DAtas` physical / `0x18DBtasa` functional with default priority).
pub fn encode_normal_fixed(
    addressing_type: AddressingType,
    target_address: u8,
    source_address: u8,
    priority: u8,
) -> Result<u32, AddressingError> {
    encode(
        NORMAL_FIXED_PHYSICAL_BASE,
        NORMAL_FIXED_FUNCTIONAL_BASE,
        addressing_type,
        target_address,
        source_address,
        priority,
    )
}

/// Decode a Normal Fixed addressing identifier.
pub fn decode_normal_fixed(can_id: u32) -> Result<DecodedCanId, AddressingError> {
    decode(NORMAL_FIXED_PHYSICAL_BASE, NORMAL_FIXED_FUNCTIONAL_BASE, can_id)
}

/// Encode a Mixed 29-bit addressing identifier
/// (`0x18CExxxx` physical / `0x18CDxxxx` functional with default priority).
pub fn encode_mixed_29bit(
    addressing_type: AddressingType,
    target_address: u8,
    source_address: u8,
    priority: u8,
) -> Result<u32, AddressingError> {
    encode(
        MIXED_29BIT_PHYSICAL_BASE,
        MIXED_29BIT_FUNCTIONAL_BASE,
        addressing_type,
        target_address,
        source_address,
        priority,
    )
}

/// Decode a Mixed 29-bit addressing identifier.
pub fn decode_mixed_29bit(can_id: u32) -> Result<DecodedCanId, AddressingError> {
    decode(MIXED_29BIT_PHYSICAL_BASE, MIXED_29BIT_FUNCTIONAL_BASE, can_id)
}

pub fn is_normal_fixed_compatible(can_id: u32, addressing_type: Option<AddressingType>) -> bool {
    match decode_normal_fixed(can_id) {
        Ok(decoded) => addressing_type.map_or(true, |at| at == decoded.addressing_type),
        Err(_) => false,
    }
}

pub fn is_mixed_29bit_compatible(can_id: u32, addressing_type: Option<AddressingType>) -> bool {
    match decode_mixed_29bit(can_id) {
        Ok(decoded) => addressing_type.map_or(true, |at| at == decoded.addressing_type),
        Err(_) => false,
    }
}
