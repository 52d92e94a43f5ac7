//! cantp-transport - tokio-based ISO 15765-2 transport layer
//!
//! Builds on `cantp-core`'s protocol arithmetic to exchange complete
//! diagnostic messages over a CAN bus:
//! - async packet queues (FIFO and release-time ordered)
//! - an abstract bus driver trait plus an in-process mock bus
//! - the six ISO network timing parameters with their validation rules
//! - the transport interface running both sides of the flow-control
//!   state machine
//!
//! # Example
//!
//! ```ignore
//! use cantp_transport::{CanTransportInterface, MockCanBus, TransportConfig};
//!
//! let config = TransportConfig::load("node.toml")?;
//! let bus = Arc::new(MockCanBus::new());
//! let interface = CanTransportInterface::new(
//!     bus,
//!     CanSegmenter::new(config.addressing.resolve()?, config.tx_dl, false, 0xCC)?,
//!     config.timing.resolve()?,
//!     Arc::new(config.flow_control.resolve()),
//! );
//! let record = interface.send_message(&message).await?;
//! ```

pub mod bus;
pub mod config;
pub mod error;
pub mod flow_control;
pub mod interface;
pub mod queue;
pub mod timing;

pub use bus::{CanBusDriver, MockCanBus, TimestampedFrame};
pub use config::{
    AddressingConfig, EndpointConfig, FlowControlConfig, TimingConfig, TransportConfig,
};
pub use error::TransportError;
pub use flow_control::{DefaultFlowControl, FlowControlParameters, FlowControlPolicy};
pub use interface::CanTransportInterface;
pub use queue::{PacketsQueue, TimestampedQueue};
pub use timing::{NetworkTimingParameters, TimingParameter, DEFAULT_TIMEOUT};
