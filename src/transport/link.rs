//! Dedicated link task for one device and characteristic.
//!
//! # Architecture
//!
//! ```text
//!            chunks                                          chunks
//! LinkHandle ──mpsc──► Link Task ─► Packetizer ─► PumpSimulator ─► Packetizer ──mpsc──► LinkHandle
//! ```
//!
//! Corrupt or unparseable frames are logged and dropped; the link keeps
//! running. The task ends when the handle's sender is dropped.

use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::Characteristic;
use crate::error::{PumpError, Result};
use crate::protocol::{Message, Packetizer};
use crate::simulator::PumpSimulator;

/// App-side handle: write chunks in, read notified chunks out.
pub struct LinkHandle {
    inbound: mpsc::Sender<Bytes>,
    outbound: mpsc::Receiver<Bytes>,
    chunk_size: usize,
}

impl LinkHandle {
    /// Write one chunk to the pump.
    pub async fn send_chunk(&self, chunk: impl Into<Bytes>) -> Result<()> {
        self.inbound
            .send(chunk.into())
            .await
            .map_err(|_| PumpError::ConnectionClosed)
    }

    /// Chunk and write a whole frame (CRC included).
    pub async fn send_frame(&self, frame: &[u8]) -> Result<()> {
        for chunk in Packetizer::new(self.chunk_size).chunk_message(frame) {
            self.send_chunk(chunk).await?;
        }
        Ok(())
    }

    /// Frame, chunk and write a message.
    pub async fn send_message(&self, message: &Message) -> Result<()> {
        self.send_frame(&message.to_wire()).await
    }

    /// Next chunk from the pump; `None` once the link task has stopped.
    pub async fn recv_chunk(&mut self) -> Option<Bytes> {
        self.outbound.recv().await
    }

    /// Chunk size of this link.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }
}

/// Spawn the link task and return a handle for exchanging chunks.
///
/// # Arguments
///
/// * `simulator` - Shared simulator; locked once per reassembled frame
/// * `device` - Device address the frames are attributed to
/// * `characteristic` - Selects the chunk size
///
/// # Returns
///
/// A tuple of `(LinkHandle, JoinHandle)`. The task returns `Ok(())` when the
/// handle is dropped and `ConnectionClosed` if the handle stops reading.
pub fn spawn_link(
    simulator: Arc<Mutex<PumpSimulator>>,
    device: impl Into<String>,
    characteristic: Characteristic,
) -> (LinkHandle, JoinHandle<Result<()>>) {
    let (chunk_size, capacity, signed) = {
        let sim = simulator.lock();
        let config = sim.config();
        (
            characteristic.chunk_size(config),
            config.link_channel_capacity,
            sim.signed_opcodes(),
        )
    };

    let (inbound_tx, inbound_rx) = mpsc::channel(capacity);
    let (outbound_tx, outbound_rx) = mpsc::channel(capacity);
    let packetizer = Packetizer::new(chunk_size).with_signed_opcodes(signed);

    let task = tokio::spawn(link_loop(
        simulator,
        device.into(),
        characteristic,
        packetizer,
        inbound_rx,
        outbound_tx,
    ));

    let handle = LinkHandle {
        inbound: inbound_tx,
        outbound: outbound_rx,
        chunk_size,
    };
    (handle, task)
}

/// Main link loop - reassembles inbound chunks and chunks out the replies.
async fn link_loop(
    simulator: Arc<Mutex<PumpSimulator>>,
    device: String,
    characteristic: Characteristic,
    mut packetizer: Packetizer,
    mut inbound: mpsc::Receiver<Bytes>,
    outbound: mpsc::Sender<Bytes>,
) -> Result<()> {
    tracing::debug!(device = %device, ?characteristic, "Link started");

    while let Some(chunk) = inbound.recv().await {
        let mut next = packetizer.add_chunk(&chunk);

        loop {
            let frame = match next {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(e @ PumpError::CrcMismatch { .. }) => {
                    tracing::warn!(device = %device, "Dropped inbound frame: {}", e);
                    next = packetizer.next_message();
                    continue;
                }
                Err(e) => {
                    tracing::warn!(device = %device, "Discarding inbound buffer: {}", e);
                    packetizer.reset();
                    break;
                }
            };

            let replies = {
                let mut sim = simulator.lock();
                sim.handle_frame(&device, &frame)
            };

            match replies {
                Ok(frames) => {
                    for reply in frames {
                        for out in packetizer.chunk_message(&reply) {
                            outbound
                                .send(out)
                                .await
                                .map_err(|_| PumpError::ConnectionClosed)?;
                        }
                    }
                }
                Err(e) if e.is_handshake_fatal() => {
                    tracing::warn!(device = %device, "Pairing aborted on link");
                    tracing::debug!("Link handshake error: {}", e);
                }
                Err(e) => {
                    tracing::warn!(device = %device, "Frame not handled: {}", e);
                }
            }

            next = packetizer.next_message();
        }
    }

    tracing::debug!(device = %device, "Link closed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::crc;
    use std::time::Duration;

    fn simulator() -> Arc<Mutex<PumpSimulator>> {
        Arc::new(Mutex::new(
            PumpSimulator::builder()
                .require_authentication(false)
                .build()
                .unwrap(),
        ))
    }

    async fn recv_frame(handle: &mut LinkHandle) -> Vec<u8> {
        let mut receiver = Packetizer::new(handle.chunk_size());
        loop {
            let chunk = tokio::time::timeout(Duration::from_secs(1), handle.recv_chunk())
                .await
                .expect("reply within timeout")
                .expect("link open");
            if let Some(frame) = receiver.add_chunk(&chunk).unwrap() {
                return frame.to_vec();
            }
        }
    }

    #[tokio::test]
    async fn test_link_answers_status_request() {
        let (mut handle, _task) = spawn_link(simulator(), "dev", Characteristic::CurrentStatus);

        handle
            .send_message(&Message::new(84, 3, &[]).unwrap())
            .await
            .unwrap();

        let frame = recv_frame(&mut handle).await;
        assert_eq!(frame[0], 85);
        assert_eq!(frame[1], 3);
        assert_eq!(frame.len(), 3 + 48);
    }

    #[tokio::test]
    async fn test_link_survives_corrupt_frame() {
        let (mut handle, _task) = spawn_link(simulator(), "dev", Characteristic::CurrentStatus);

        let mut corrupt = crc::append(&[52, 1, 0]);
        corrupt[3] ^= 0xFF;
        handle.send_chunk(corrupt).await.unwrap();

        handle.send_frame(&crc::append(&[52, 2, 0])).await.unwrap();

        let frame = recv_frame(&mut handle).await;
        assert_eq!(frame, vec![53, 2, 2, 100, 100]);
    }

    #[tokio::test]
    async fn test_two_frames_in_one_chunk() {
        let (mut handle, _task) = spawn_link(simulator(), "dev", Characteristic::Control);
        assert_eq!(handle.chunk_size(), 40);

        let mut both = crc::append(&[52, 1, 0]);
        both.extend_from_slice(&crc::append(&[52, 2, 0]));
        handle.send_chunk(both).await.unwrap();

        assert_eq!(recv_frame(&mut handle).await[1], 1);
        assert_eq!(recv_frame(&mut handle).await[1], 2);
    }

    #[tokio::test]
    async fn test_link_stops_when_handle_dropped() {
        let (handle, task) = spawn_link(simulator(), "dev", Characteristic::CurrentStatus);
        drop(handle);

        let result = task.await.unwrap();
        assert!(result.is_ok());
    }
}
