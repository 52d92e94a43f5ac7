//! Node addressing aggregate
//!
//! The four directional addressing configurations of one UDS entity,
//! cross-checked at construction and immutable afterwards.

use super::{AddressingError, AddressingParams, AddressingType, CanAddressingFormat};
use crate::frame::CanFrame;

/// Complete addressing configuration of one node: rx/tx parameters for
/// both physical and functional addressing, all in a single format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeAddressingInformation {
    rx_physical: AddressingParams,
    tx_physical: AddressingParams,
    rx_functional: AddressingParams,
    tx_functional: AddressingParams,
}

impl NodeAddressingInformation {
    /// Validate the four directional parameter sets against each other.
    ///
    /// Checks performed:
    /// - all four use the same addressing format,
    /// - rx/tx parameters carry the addressing type of their slot,
    /// - no (CAN ID, addressing byte) pair is reused for both directions
    ///   of the same addressing type,
    /// - for the encoded 29-bit formats, rx and tx of one addressing type
    ///   mirror each other (`rx.(TA,SA) == tx.(SA,TA)`),
    /// - for address-extension formats, AE matches between rx and tx of
    ///   the same addressing type.
    pub fn new(
        rx_physical: AddressingParams,
        tx_physical: AddressingParams,
        rx_functional: AddressingParams,
        tx_functional: AddressingParams,
    ) -> Result<Self, AddressingError> {
        let format = rx_physical.format();
        for (name, params) in [
            ("tx_physical", &tx_physical),
            ("rx_functional", &rx_functional),
            ("tx_functional", &tx_functional),
        ] {
            if params.format() != format {
                return Err(AddressingError::InconsistentArguments(format!(
                    "{name} uses {:?} addressing format while rx_physical uses {format:?}",
                    params.format()
                )));
            }
        }
        for (name, params, expected) in [
            ("rx_physical", &rx_physical, AddressingType::Physical),
            ("tx_physical", &tx_physical, AddressingType::Physical),
            ("rx_functional", &rx_functional, AddressingType::Functional),
            ("tx_functional", &tx_functional, AddressingType::Functional),
        ] {
            if params.addressing_type() != expected {
                return Err(AddressingError::InconsistentArguments(format!(
                    "{name} must use {expected:?} addressing"
                )));
            }
        }

        check_directions_distinct("physical", &rx_physical, &tx_physical)?;
        check_directions_distinct("functional", &rx_functional, &tx_functional)?;

        if matches!(
            format,
            CanAddressingFormat::NormalFixed | CanAddressingFormat::Mixed29Bit
        ) {
            check_mirrored_addresses("physical", &rx_physical, &tx_physical)?;
            check_mirrored_addresses("functional", &rx_functional, &tx_functional)?;
        }
        if matches!(
            format,
            CanAddressingFormat::Mixed11Bit | CanAddressingFormat::Mixed29Bit
        ) {
            check_matching_extension("physical", &rx_physical, &tx_physical)?;
            check_matching_extension("functional", &rx_functional, &tx_functional)?;
        }

        Ok(Self {
            rx_physical,
            tx_physical,
            rx_functional,
            tx_functional,
        })
    }

    pub fn format(&self) -> CanAddressingFormat {
        self.rx_physical.format()
    }

    pub fn rx_physical(&self) -> &AddressingParams {
        &self.rx_physical
    }

    pub fn tx_physical(&self) -> &AddressingParams {
        &self.tx_physical
    }

    pub fn rx_functional(&self) -> &AddressingParams {
        &self.rx_functional
    }

    pub fn tx_functional(&self) -> &AddressingParams {
        &self.tx_functional
    }

    /// Transmit parameters for a given addressing type.
    pub fn tx_params(&self, addressing_type: AddressingType) -> &AddressingParams {
        match addressing_type {
            AddressingType::Physical => &self.tx_physical,
            AddressingType::Functional => &self.tx_functional,
        }
    }

    /// Receive parameters for a given addressing type.
    pub fn rx_params(&self, addressing_type: AddressingType) -> &AddressingParams {
        match addressing_type {
            AddressingType::Physical => &self.rx_physical,
            AddressingType::Functional => &self.rx_functional,
        }
    }

    /// Derive the peer node's mirrored configuration.
    ///
    /// The peer receives what this node transmits and vice versa, so the
    /// rx/tx roles swap; for TA/SA-bearing formats the address swap falls
    /// out of the role swap. Applied twice this is the identity.
    pub fn get_other_end(&self) -> Self {
        Self {
            rx_physical: self.tx_physical.clone(),
            tx_physical: self.rx_physical.clone(),
            rx_functional: self.tx_functional.clone(),
            tx_functional: self.rx_functional.clone(),
        }
    }

    /// Classify a received frame against this node's rx parameters.
    ///
    /// Returns the addressing type the frame was sent with if it targets
    /// this node, `None` for frames addressed elsewhere.
    pub fn classify_input_frame(&self, frame: &CanFrame) -> Option<AddressingType> {
        let first_byte = frame.data().first().copied();
        if self.rx_physical.matches_frame(frame.raw_id(), first_byte) {
            Some(AddressingType::Physical)
        } else if self.rx_functional.matches_frame(frame.raw_id(), first_byte) {
            Some(AddressingType::Functional)
        } else {
            None
        }
    }
}

fn check_directions_distinct(
    kind: &str,
    rx: &AddressingParams,
    tx: &AddressingParams,
) -> Result<(), AddressingError> {
    if rx.can_id() == tx.can_id() && rx.addressing_byte() == tx.addressing_byte() {
        return Err(AddressingError::InconsistentArguments(format!(
            "rx and tx {kind} addressing both resolve to CAN ID 0x{:X}",
            rx.can_id()
        )));
    }
    Ok(())
}

fn check_mirrored_addresses(
    kind: &str,
    rx: &AddressingParams,
    tx: &AddressingParams,
) -> Result<(), AddressingError> {
    if rx.target_address() != tx.source_address() || rx.source_address() != tx.target_address() {
        return Err(AddressingError::InconsistentArguments(format!(
            "rx {kind} (TA, SA) must mirror tx {kind} (SA, TA)"
        )));
    }
    Ok(())
}

fn check_matching_extension(
    kind: &str,
    rx: &AddressingParams,
    tx: &AddressingParams,
) -> Result<(), AddressingError> {
    if rx.address_extension() != tx.address_extension() {
        return Err(AddressingError::InconsistentArguments(format!(
            "rx and tx {kind} addressing must use the same address extension"
        )));
    }
    Ok(())
}
