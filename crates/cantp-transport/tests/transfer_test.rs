//! E2E transfer tests: two transport interfaces on one mock bus.
//!
//! Architecture per test:
//!
//! ```text
//! client CanTransportInterface ──┐
//!                                ├── shared MockCanBus (loopback)
//! server CanTransportInterface ──┘
//! ```
//!
//! The server's node addressing is `get_other_end()` of the client's,
//! so each side's transmissions land in the other side's receive path.
//! Fully in-process, no vCAN required.

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;

use cantp_core::addressing::{
    AddressingParams, AddressingType, CanAddressingFormat, NodeAddressingInformation,
};
use cantp_core::frame::{CanFrame, DEFAULT_FILLER_BYTE};
use cantp_core::message::UdsMessage;
use cantp_core::packet::CanPacketType;
use cantp_core::segmentation::CanSegmenter;
use cantp_transport::{
    CanTransportInterface, DefaultFlowControl, MockCanBus, NetworkTimingParameters,
    TimingParameter, TransportError,
};

fn client_node() -> NodeAddressingInformation {
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

fn interface(
    bus: &Arc<MockCanBus>,
    node: NodeAddressingInformation,
    flow_control: DefaultFlowControl,
) -> CanTransportInterface {
    CanTransportInterface::new(
        bus.clone() as Arc<dyn cantp_transport::CanBusDriver>,
        CanSegmenter::new(node, 8, false, DEFAULT_FILLER_BYTE).unwrap(),
        NetworkTimingParameters::default(),
        Arc::new(flow_control),
    )
}

fn pair(bus: &Arc<MockCanBus>) -> (CanTransportInterface, CanTransportInterface) {
    let client = client_node();
    let server = client.get_other_end();
    (
        interface(bus, client, DefaultFlowControl::default()),
        interface(bus, server, DefaultFlowControl::default()),
    )
}

#[tokio::test]
async fn test_single_frame_transfer() {
    let bus = Arc::new(MockCanBus::new());
    let (client, server) = pair(&bus);

    let message = UdsMessage::new(vec![0x22, 0xF1, 0x90], AddressingType::Physical).unwrap();
    let receiver = tokio::spawn(async move {
        server.receive_message(Duration::from_secs(1)).await
    });
    let sent = client.send_message(&message).await.unwrap();
    let received = receiver.await.unwrap().unwrap();

    assert_eq!(received.payload(), message.payload());
    assert_eq!(received.addressing_type(), AddressingType::Physical);
    assert_eq!(sent.packet_records().len(), 1);
    assert_eq!(received.packet_records().len(), 1);
    assert!(sent.n_bs_measurements().is_empty());
}

#[tokio::test]
async fn test_multi_frame_transfer() {
    let bus = Arc::new(MockCanBus::new());
    let (client, server) = pair(&bus);

    let payload: Vec<u8> = (0..62u8).collect();
    let message = UdsMessage::new(payload.clone(), AddressingType::Physical).unwrap();
    let receiver = tokio::spawn(async move {
        server.receive_message(Duration::from_secs(1)).await
    });
    let sent = client.send_message(&message).await.unwrap();
    let received = receiver.await.unwrap().unwrap();

    assert_eq!(received.payload(), payload.as_slice());
    // FF + FC + 8 CFs on the sender side
    assert_eq!(sent.packet_records().len(), 10);
    assert_eq!(
        sent.packet_records()[0].packet().packet_type(),
        CanPacketType::FirstFrame
    );
    assert_eq!(
        sent.packet_records()[1].packet().packet_type(),
        CanPacketType::FlowControl
    );
    assert_eq!(sent.n_bs_measurements().len(), 1);
    assert_eq!(sent.n_cr_measurements().len(), 8);
}

#[tokio::test]
async fn test_multi_frame_with_block_size_and_st_min() {
    let bus = Arc::new(MockCanBus::new());
    let client = interface(&bus, client_node(), DefaultFlowControl::default());
    // Server hands out blocks of 2 with a 1 ms gap between CFs.
    let server = interface(
        &bus,
        client_node().get_other_end(),
        DefaultFlowControl::new(2, 0x01),
    );

    let payload = vec![0xA5; 34]; // FF(6) + 4 CFs of 7
    let message = UdsMessage::new(payload.clone(), AddressingType::Physical).unwrap();
    let receiver = tokio::spawn(async move {
        server.receive_message(Duration::from_secs(2)).await
    });
    let sent = client.send_message(&message).await.unwrap();
    let received = receiver.await.unwrap().unwrap();

    assert_eq!(received.payload(), payload.as_slice());
    // Two blocks of two CFs means two FC rounds.
    let fc_count = sent
        .packet_records()
        .iter()
        .filter(|r| r.packet().packet_type() == CanPacketType::FlowControl)
        .count();
    assert_eq!(fc_count, 2);
    assert_eq!(sent.packet_records().len(), 7);
}

#[tokio::test]
async fn test_functional_single_frame_transfer() {
    let bus = Arc::new(MockCanBus::new());
    let (client, server) = pair(&bus);

    let message = UdsMessage::new(vec![0x3E, 0x80], AddressingType::Functional).unwrap();
    let receiver = tokio::spawn(async move {
        server.receive_message(Duration::from_secs(1)).await
    });
    client.send_message(&message).await.unwrap();
    let received = receiver.await.unwrap().unwrap();

    assert_eq!(received.payload(), &[0x3E, 0x80]);
    assert_eq!(received.addressing_type(), AddressingType::Functional);
}

#[tokio::test]
async fn test_both_directions_on_one_bus() {
    let bus = Arc::new(MockCanBus::new());
    let (client, server) = pair(&bus);

    let request = UdsMessage::new(vec![0x10, 0x03], AddressingType::Physical).unwrap();
    let response =
        UdsMessage::new(vec![0x50, 0x03, 0x00, 0x19, 0x01, 0xF4], AddressingType::Physical)
            .unwrap();

    let server_task = tokio::spawn(async move {
        let received = server.receive_message(Duration::from_secs(1)).await?;
        server.send_message(&response).await?;
        Ok::<_, cantp_transport::TransportError>(received)
    });

    client.send_message(&request).await.unwrap();
    let reply = client.receive_message(Duration::from_secs(1)).await.unwrap();
    let received = server_task.await.unwrap().unwrap();

    assert_eq!(received.payload(), &[0x10, 0x03]);
    assert_eq!(reply.payload(), &[0x50, 0x03, 0x00, 0x19, 0x01, 0xF4]);
}

#[tokio::test]
async fn test_receive_times_out_on_silent_bus() {
    let bus = Arc::new(MockCanBus::new());
    let (_client, server) = pair(&bus);

    let err = server.receive_message(Duration::from_millis(20)).await;
    assert!(matches!(
        err,
        Err(cantp_transport::TransportError::ReceiveTimeout)
    ));
}

#[tokio::test]
async fn test_flow_control_wait_rearms_and_cts_resumes() {
    let bus = Arc::new(MockCanBus::new());
    let client = interface(&bus, client_node(), DefaultFlowControl::default());

    // Hand-rolled flow controls on the client's physical input ID: a
    // Wait first, then Continue To Send with no block limit.
    bus.inject_frame(
        CanFrame::new(0x7E8, vec![0x31, 0xCC, 0xCC, 0xCC, 0xCC, 0xCC, 0xCC, 0xCC]).unwrap(),
    );
    bus.inject_frame(
        CanFrame::new(0x7E8, vec![0x30, 0x00, 0x00, 0xCC, 0xCC, 0xCC, 0xCC, 0xCC]).unwrap(),
    );

    let payload: Vec<u8> = (0..10u8).collect(); // FF(6) + one CF
    let message = UdsMessage::new(payload, AddressingType::Physical).unwrap();
    let sent = client.send_message(&message).await.unwrap();

    // FF, FC(Wait), FC(CTS), CF
    let types: Vec<CanPacketType> = sent
        .packet_records()
        .iter()
        .map(|r| r.packet().packet_type())
        .collect();
    assert_eq!(
        types,
        vec![
            CanPacketType::FirstFrame,
            CanPacketType::FlowControl,
            CanPacketType::FlowControl,
            CanPacketType::ConsecutiveFrame,
        ]
    );
    assert_eq!(sent.n_bs_measurements().len(), 2);
}

#[tokio::test]
async fn test_flow_control_overflow_aborts_transfer() {
    let bus = Arc::new(MockCanBus::new());
    let client = interface(&bus, client_node(), DefaultFlowControl::default());

    bus.inject_frame(
        CanFrame::new(0x7E8, vec![0x32, 0xCC, 0xCC, 0xCC, 0xCC, 0xCC, 0xCC, 0xCC]).unwrap(),
    );

    let message =
        UdsMessage::new((0..10u8).collect(), AddressingType::Physical).unwrap();
    let err = client.send_message(&message).await;
    assert!(matches!(err, Err(TransportError::Overflow)));
}

#[tokio::test]
async fn test_missing_flow_control_times_out_n_bs() {
    let bus = Arc::new(MockCanBus::new());
    let client = interface(&bus, client_node(), DefaultFlowControl::default());
    let mut timing = client.timing();
    timing.set_n_bs_timeout(Duration::from_millis(50)).unwrap();
    client.set_timing(timing);

    // Nobody answers the First Frame.
    let message =
        UdsMessage::new((0..10u8).collect(), AddressingType::Physical).unwrap();
    let err = client.send_message(&message).await;
    assert!(matches!(
        err,
        Err(TransportError::Timeout {
            parameter: TimingParameter::NBs
        })
    ));
}

#[tokio::test]
async fn test_silence_after_first_frame_times_out_n_cr() {
    let bus = Arc::new(MockCanBus::new());
    let server = interface(&bus, client_node().get_other_end(), DefaultFlowControl::default());
    let mut timing = server.timing();
    timing.set_n_cr_timeout(Duration::from_millis(50)).unwrap();
    server.set_timing(timing);

    // A First Frame arrives, then no Consecutive Frame ever follows.
    bus.inject_frame(CanFrame::new(0x7E0, vec![0x10, 0x0A, 1, 2, 3, 4, 5, 6]).unwrap());

    let err = server.receive_message(Duration::from_secs(1)).await;
    assert!(matches!(
        err,
        Err(TransportError::Timeout {
            parameter: TimingParameter::NCr
        })
    ));
}

#[tokio::test]
async fn test_frames_for_other_nodes_are_ignored() {
    let bus = Arc::new(MockCanBus::new());
    let (_client, server) = pair(&bus);

    // A frame for some unrelated CAN ID must not reach the server.
    let stray = cantp_core::frame::CanFrame::new(0x123, vec![0x02, 0x01, 0x02]).unwrap();
    bus.inject_frame(stray);

    let err = server.receive_message(Duration::from_millis(20)).await;
    assert!(matches!(
        err,
        Err(cantp_transport::TransportError::ReceiveTimeout)
    ));
}
