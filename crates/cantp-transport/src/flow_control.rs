//! Flow control generation policy.

use cantp_core::packet::FlowStatus;

/// What the next transmitted Flow Control packet should carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowControlParameters {
    pub flow_status: FlowStatus,
    pub block_size: Option<u8>,
    pub st_min: Option<u8>,
}

/// Decides the content of each Flow Control the receiver sends.
///
/// Implementations can throttle a fast sender (non-zero STmin), force
/// block-wise handshakes (non-zero block size), signal Wait while a
/// buffer drains, or abort with Overflow.
pub trait FlowControlPolicy: Send + Sync {
    fn next_flow_control(&self) -> FlowControlParameters;
}

/// Always Continue-To-Send with block size 0 and STmin 0: the sender
/// may transmit the whole message back to back.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultFlowControl {
    block_size: u8,
    st_min: u8,
}

impl DefaultFlowControl {
    pub fn new(block_size: u8, st_min: u8) -> Self {
        Self {
            block_size,
            st_min,
        }
    }
}

impl FlowControlPolicy for DefaultFlowControl {
    fn next_flow_control(&self) -> FlowControlParameters {
        FlowControlParameters {
            flow_status: FlowStatus::ContinueToSend,
            block_size: Some(self.block_size),
            st_min: Some(self.st_min),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_policy_is_unthrottled_cts() {
        let policy = DefaultFlowControl::default();
        assert_eq!(
            policy.next_flow_control(),
            FlowControlParameters {
                flow_status: FlowStatus::ContinueToSend,
                block_size: Some(0),
                st_min: Some(0),
            }
        );
    }
}
