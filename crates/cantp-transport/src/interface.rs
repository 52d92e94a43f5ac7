//! Transport interface
//!
//! Orchestrates message exchange over a CAN bus driver: a background
//! listener filters bus frames for this node and feeds the receive
//! FIFO, `send_message` runs the sender side of the flow-control state
//! machine and `receive_message` the receiver side.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use cantp_core::addressing::AddressingType;
use cantp_core::packet::{
    decode_st_min, CanPacket, CanPacketRecord, CanPacketType, FlowStatus, TransmissionDirection,
};
use cantp_core::segmentation::{self, CanSegmenter, SegmentationError};
use cantp_core::message::{UdsMessage, UdsMessageRecord};

use crate::bus::CanBusDriver;
use crate::error::TransportError;
use crate::flow_control::FlowControlPolicy;
use crate::queue::{PacketsQueue, TimestampedQueue};
use crate::timing::{NetworkTimingParameters, TimingParameter};

/// One node's ISO 15765-2 transport endpoint.
pub struct CanTransportInterface {
    bus: Arc<dyn CanBusDriver>,
    segmenter: CanSegmenter,
    timing: Mutex<NetworkTimingParameters>,
    flow_control: Arc<dyn FlowControlPolicy>,
    rx_queue: Arc<PacketsQueue<CanPacketRecord>>,
    tx_queue: TimestampedQueue<CanPacket>,
    listener: JoinHandle<()>,
}

impl CanTransportInterface {
    /// Build an interface and start its bus listener task.
    ///
    /// The listener subscribes before this returns, so frames sent
    /// afterwards are never missed.
    pub fn new(
        bus: Arc<dyn CanBusDriver>,
        segmenter: CanSegmenter,
        timing: NetworkTimingParameters,
        flow_control: Arc<dyn FlowControlPolicy>,
    ) -> Self {
        let rx_queue = Arc::new(PacketsQueue::new());
        let listener = Self::spawn_listener(&bus, &segmenter, &rx_queue);
        Self {
            bus,
            segmenter,
            timing: Mutex::new(timing),
            flow_control,
            rx_queue,
            tx_queue: TimestampedQueue::new(),
            listener,
        }
    }

    fn spawn_listener(
        bus: &Arc<dyn CanBusDriver>,
        segmenter: &CanSegmenter,
        rx_queue: &Arc<PacketsQueue<CanPacketRecord>>,
    ) -> JoinHandle<()> {
        let mut frames = bus.subscribe();
        let addressing = segmenter.addressing().clone();
        let rx_queue = rx_queue.clone();
        tokio::spawn(async move {
            loop {
                match frames.recv().await {
                    Ok(observed) => {
                        let Some(addressing_type) =
                            addressing.classify_input_frame(&observed.frame)
                        else {
                            continue;
                        };
                        let params = addressing.rx_params(addressing_type).clone();
                        match CanPacket::from_frame(observed.frame, params) {
                            Ok(packet) => {
                                tracing::debug!(
                                    can_id = format_args!("0x{:X}", packet.frame().raw_id()),
                                    packet_type = ?packet.packet_type(),
                                    "input packet queued"
                                );
                                rx_queue.put(CanPacketRecord::new(
                                    packet,
                                    TransmissionDirection::Received,
                                    observed.timestamp,
                                ));
                            }
                            Err(error) => {
                                tracing::warn!(%error, "dropping malformed input frame");
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        tracing::warn!(missed, "bus listener lagged, input frames lost");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    /// Snapshot of the current timing parameters.
    pub fn timing(&self) -> NetworkTimingParameters {
        self.timing.lock().clone()
    }

    /// Apply new timing parameters.
    pub fn set_timing(&self, timing: NetworkTimingParameters) {
        *self.timing.lock() = timing;
    }

    pub fn segmenter(&self) -> &CanSegmenter {
        &self.segmenter
    }

    /// Send one packet and record it.
    ///
    /// The bus send is bounded by the N_As timeout (N_Ar for Flow
    /// Control, where this node acts as receiver) and the observed
    /// latency updates the corresponding measured value.
    pub async fn send_packet(
        &self,
        packet: &CanPacket,
    ) -> Result<CanPacketRecord, TransportError> {
        let is_flow_control = packet.packet_type() == CanPacketType::FlowControl;
        let (timeout, parameter) = {
            let timing = self.timing.lock();
            if is_flow_control {
                (timing.n_ar_timeout(), TimingParameter::NAr)
            } else {
                (timing.n_as_timeout(), TimingParameter::NAs)
            }
        };

        let started = Instant::now();
        tokio::time::timeout(timeout, self.bus.send_frame(packet.frame()))
            .await
            .map_err(|_| TransportError::Timeout { parameter })??;
        let elapsed = started.elapsed();

        {
            let mut timing = self.timing.lock();
            if is_flow_control {
                timing.record_n_ar(elapsed);
            } else {
                timing.record_n_as(elapsed);
            }
        }
        tracing::debug!(
            can_id = format_args!("0x{:X}", packet.frame().raw_id()),
            packet_type = ?packet.packet_type(),
            data = %hex::encode(packet.frame().data()),
            "packet sent"
        );
        Ok(CanPacketRecord::new(
            packet.clone(),
            TransmissionDirection::Transmitted,
            Instant::now(),
        ))
    }

    /// Wait for the next input packet addressed to this node.
    pub async fn receive_packet(
        &self,
        timeout: Duration,
    ) -> Result<CanPacketRecord, TransportError> {
        let record = tokio::time::timeout(timeout, self.rx_queue.get())
            .await
            .map_err(|_| TransportError::ReceiveTimeout)?;
        self.rx_queue.task_done();
        Ok(record)
    }

    async fn await_packet(
        &self,
        timeout: Duration,
        parameter: TimingParameter,
    ) -> Result<CanPacketRecord, TransportError> {
        let record = tokio::time::timeout(timeout, self.rx_queue.get())
            .await
            .map_err(|_| TransportError::Timeout { parameter })?;
        self.rx_queue.task_done();
        Ok(record)
    }

    /// Transmit a message, running the sender side of the flow-control
    /// state machine for multi-frame transfers.
    pub async fn send_message(
        &self,
        message: &UdsMessage,
    ) -> Result<UdsMessageRecord, TransportError> {
        let packets = self.segmenter.segmentation(message)?;
        let mut packets = packets.into_iter();
        let initial = packets
            .next()
            .ok_or(SegmentationError::IncompleteSequence)?;
        let mut records = vec![self.send_packet(&initial).await?];

        if initial.packet_type() == CanPacketType::SingleFrame {
            return Ok(UdsMessageRecord::new(
                message.payload().to_vec(),
                message.addressing_type(),
                TransmissionDirection::Transmitted,
                records,
            )?);
        }

        let mut pending: VecDeque<CanPacket> = packets.collect();
        while !pending.is_empty() {
            let flow_control = self.wait_for_flow_control(&mut records).await?;
            let block_size = flow_control.block_size().unwrap_or(0);
            let peer_st_min = decode_st_min(flow_control.st_min().unwrap_or(0));
            let separation = self.timing.lock().n_cs().unwrap_or(peer_st_min);

            let block_len = if block_size == 0 {
                pending.len()
            } else {
                usize::from(block_size).min(pending.len())
            };
            // Pace the block through the release-time queue.
            let mut release_at = Instant::now();
            for _ in 0..block_len {
                if let Some(packet) = pending.pop_front() {
                    self.tx_queue.put_at(packet, release_at);
                    release_at += separation;
                }
            }
            for _ in 0..block_len {
                let packet = self.tx_queue.get().await;
                self.tx_queue.task_done();
                records.push(self.send_packet(&packet).await?);
            }
        }

        Ok(UdsMessageRecord::new(
            message.payload().to_vec(),
            message.addressing_type(),
            TransmissionDirection::Transmitted,
            records,
        )?)
    }

    /// Await a Flow Control within N_Bs. Wait frames re-arm the
    /// timeout; Overflow aborts the transfer.
    async fn wait_for_flow_control(
        &self,
        records: &mut Vec<CanPacketRecord>,
    ) -> Result<CanPacket, TransportError> {
        loop {
            let n_bs_timeout = self.timing.lock().n_bs_timeout();
            let record = self
                .await_packet(n_bs_timeout, TimingParameter::NBs)
                .await?;
            if record.packet().packet_type() != CanPacketType::FlowControl {
                tracing::warn!(
                    packet_type = ?record.packet().packet_type(),
                    "ignoring non-FC packet while waiting for flow control"
                );
                continue;
            }
            let packet = record.packet().clone();
            let flow_status = packet.flow_status();
            records.push(record);
            match flow_status {
                Some(FlowStatus::ContinueToSend) => return Ok(packet),
                Some(FlowStatus::Wait) => {
                    tracing::debug!("flow control Wait received, re-arming N_Bs");
                }
                Some(FlowStatus::Overflow) | None => {
                    return Err(TransportError::Overflow);
                }
            }
        }
    }

    /// Wait for a message addressed to this node, running the receiver
    /// side of the flow-control state machine for multi-frame transfers.
    pub async fn receive_message(
        &self,
        timeout: Duration,
    ) -> Result<UdsMessageRecord, TransportError> {
        let deadline = Instant::now() + timeout;
        let initial = loop {
            let remaining = deadline
                .checked_duration_since(Instant::now())
                .ok_or(TransportError::ReceiveTimeout)?;
            let record = self.receive_packet(remaining).await?;
            if record.packet().packet_type().is_initial() {
                break record;
            }
            tracing::debug!(
                packet_type = ?record.packet().packet_type(),
                "ignoring non-initial packet outside a transfer"
            );
        };

        let mut packets = vec![initial.packet().clone()];
        let mut records = vec![initial];

        if packets[0].packet_type() == CanPacketType::FirstFrame {
            self.collect_consecutive_frames(&mut packets, &mut records)
                .await?;
        }

        let message = segmentation::desegmentation(&packets)?;
        Ok(UdsMessageRecord::new(
            message.payload().to_vec(),
            message.addressing_type(),
            TransmissionDirection::Received,
            records,
        )?)
    }

    async fn collect_consecutive_frames(
        &self,
        packets: &mut Vec<CanPacket>,
        records: &mut Vec<CanPacketRecord>,
    ) -> Result<(), TransportError> {
        let first = &packets[0];
        let declared = first.declared_data_length().unwrap_or_default() as usize;
        let addressing_type = first.addressing().addressing_type();
        let tx_params = self
            .segmenter
            .addressing()
            .tx_params(addressing_type)
            .clone();
        let mut carried = first.payload().len();
        let mut expected_sn = 1u8;

        while carried < declared {
            let n_br = self.timing.lock().n_br();
            if !n_br.is_zero() {
                tokio::time::sleep(n_br).await;
            }
            let announced = self.flow_control.next_flow_control();
            let flow_control = CanPacket::flow_control(
                tx_params.clone(),
                announced.flow_status,
                announced.block_size,
                announced.st_min,
                self.segmenter.dlc(),
                self.segmenter.filler_byte(),
            )?;
            records.push(self.send_packet(&flow_control).await?);
            match announced.flow_status {
                FlowStatus::ContinueToSend => {}
                FlowStatus::Wait => continue,
                FlowStatus::Overflow => return Err(TransportError::Overflow),
            }

            let block_size = announced.block_size.unwrap_or(0);
            let mut received_in_block = 0usize;
            while carried < declared
                && (block_size == 0 || received_in_block < usize::from(block_size))
            {
                let n_cr_timeout = self.timing.lock().n_cr_timeout();
                let record = self
                    .await_packet(n_cr_timeout, TimingParameter::NCr)
                    .await?;
                if record.packet().packet_type() != CanPacketType::ConsecutiveFrame {
                    tracing::warn!(
                        packet_type = ?record.packet().packet_type(),
                        "ignoring unexpected packet during a multi-frame reception"
                    );
                    continue;
                }
                let found = record.packet().sequence_number().unwrap_or_default();
                if found != expected_sn {
                    return Err(SegmentationError::WrongSequenceNumber {
                        index: packets.len(),
                        expected: expected_sn,
                        found,
                    }
                    .into());
                }
                expected_sn = (expected_sn + 1) % 16;
                carried += record.packet().payload().len();
                packets.push(record.packet().clone());
                records.push(record);
                received_in_block += 1;
            }
        }
        Ok(())
    }
}

impl Drop for CanTransportInterface {
    fn drop(&mut self) {
        self.listener.abort();
    }
}
