//! Transport configuration
//!
//! serde types loadable from TOML, converted into the typed layers
//! (node addressing, segmenter parameters, timing, flow control).
//! CAN IDs are written as strings, `0x`-prefixed hex or plain decimal.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use cantp_core::addressing::{
    AddressingParams, AddressingType, CanAddressingFormat, NodeAddressingInformation,
};
use cantp_core::frame::DEFAULT_FILLER_BYTE;

use crate::error::TransportError;
use crate::flow_control::DefaultFlowControl;
use crate::timing::NetworkTimingParameters;

/// Top-level transport configuration for one node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Addressing of the four directional paths
    pub addressing: AddressingConfig,
    /// DLC used for transmitted frames
    #[serde(default = "default_tx_dl")]
    pub tx_dl: u8,
    /// Padding byte for unused frame data
    #[serde(default = "default_padding")]
    pub filler_byte: u8,
    /// Shrink Single Frames to the smallest legal DLC
    #[serde(default)]
    pub use_data_optimization: bool,
    /// Network timing parameters
    #[serde(default)]
    pub timing: TimingConfig,
    /// Flow control announced to sending peers
    #[serde(default)]
    pub flow_control: FlowControlConfig,
}

fn default_tx_dl() -> u8 {
    8
}

fn default_padding() -> u8 {
    DEFAULT_FILLER_BYTE
}

impl TransportConfig {
    /// Parse a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, TransportError> {
        toml::from_str(text).map_err(|e| TransportError::InvalidConfig(e.to_string()))
    }

    /// Load a configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, TransportError> {
        let text = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            TransportError::InvalidConfig(format!(
                "Cannot read '{}': {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::from_toml_str(&text)
    }
}

/// Addressing of one node: format plus the four directional endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddressingConfig {
    pub format: CanAddressingFormat,
    pub rx_physical: EndpointConfig,
    pub tx_physical: EndpointConfig,
    pub rx_functional: EndpointConfig,
    pub tx_functional: EndpointConfig,
}

/// One directional addressing endpoint. Which fields apply depends on
/// the addressing format; the resolver rejects unused ones.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// CAN ID, e.g. "0x7E0" (hex) or "2016" (decimal)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub can_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_address: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_address: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address_extension: Option<u8>,
}

impl AddressingConfig {
    /// Resolve into validated node addressing information.
    pub fn resolve(&self) -> Result<NodeAddressingInformation, TransportError> {
        Ok(NodeAddressingInformation::new(
            self.endpoint(&self.rx_physical, AddressingType::Physical)?,
            self.endpoint(&self.tx_physical, AddressingType::Physical)?,
            self.endpoint(&self.rx_functional, AddressingType::Functional)?,
            self.endpoint(&self.tx_functional, AddressingType::Functional)?,
        )?)
    }

    fn endpoint(
        &self,
        config: &EndpointConfig,
        addressing_type: AddressingType,
    ) -> Result<AddressingParams, TransportError> {
        let can_id = config.can_id.as_deref().map(parse_can_id).transpose()?;
        Ok(AddressingParams::validated(
            self.format,
            addressing_type,
            can_id,
            config.target_address,
            config.source_address,
            config.address_extension,
        )?)
    }
}

/// Timing parameters in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    #[serde(default = "default_timeout_ms")]
    pub n_as_timeout_ms: u64,
    #[serde(default = "default_timeout_ms")]
    pub n_ar_timeout_ms: u64,
    #[serde(default = "default_timeout_ms")]
    pub n_bs_timeout_ms: u64,
    #[serde(default = "default_timeout_ms")]
    pub n_cr_timeout_ms: u64,
    /// Delay before answering a First Frame with Flow Control
    #[serde(default)]
    pub n_br_ms: u64,
    /// Gap between transmitted Consecutive Frames; absent means
    /// "follow the peer's STmin"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n_cs_ms: Option<u64>,
}

fn default_timeout_ms() -> u64 {
    1000
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            n_as_timeout_ms: default_timeout_ms(),
            n_ar_timeout_ms: default_timeout_ms(),
            n_bs_timeout_ms: default_timeout_ms(),
            n_cr_timeout_ms: default_timeout_ms(),
            n_br_ms: 0,
            n_cs_ms: None,
        }
    }
}

impl TimingConfig {
    /// Resolve into validated timing parameters.
    pub fn resolve(&self) -> Result<NetworkTimingParameters, TransportError> {
        let mut timing = NetworkTimingParameters::default();
        timing.set_n_as_timeout(Duration::from_millis(self.n_as_timeout_ms))?;
        timing.set_n_ar_timeout(Duration::from_millis(self.n_ar_timeout_ms))?;
        timing.set_n_bs_timeout(Duration::from_millis(self.n_bs_timeout_ms))?;
        timing.set_n_cr_timeout(Duration::from_millis(self.n_cr_timeout_ms))?;
        timing.set_n_br(Duration::from_millis(self.n_br_ms))?;
        timing.set_n_cs(self.n_cs_ms.map(Duration::from_millis))?;
        Ok(timing)
    }
}

/// Flow control announced to peers sending multi-frame messages.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlowControlConfig {
    /// Consecutive Frames allowed per Flow Control (0 = unlimited)
    #[serde(default)]
    pub block_size: u8,
    /// Minimum separation time between Consecutive Frames (microseconds)
    #[serde(default)]
    pub st_min_us: u32,
}

impl FlowControlConfig {
    pub fn resolve(&self) -> DefaultFlowControl {
        let st_min =
            cantp_core::packet::encode_st_min(Duration::from_micros(u64::from(self.st_min_us)));
        DefaultFlowControl::new(self.block_size, st_min)
    }
}

fn parse_can_id(s: &str) -> Result<u32, TransportError> {
    let s = s.trim();
    let (s, radix) = if s.starts_with("0x") || s.starts_with("0X") {
        (&s[2..], 16)
    } else {
        (s, 10)
    };

    u32::from_str_radix(s, radix)
        .map_err(|e| TransportError::InvalidConfig(format!("Invalid CAN ID '{}': {}", s, e)))
}
