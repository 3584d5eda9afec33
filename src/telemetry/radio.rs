//! Radio link to the long-range modem.
//!
//! The modem owns frequency, bandwidth, spreading factor, coding rate and
//! sync word. This side only hands it one packet at a time over serial,
//! prefixed with the packet length.

use async_trait::async_trait;
use bytes::{BufMut, BytesMut};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use crate::error::{FlightError, Result};
use crate::serial::open_port;
use crate::serial::port_trait::{SerialPortIO, TokioSerialPort};

/// Largest packet the length prefix can describe
pub const MAX_PACKET_LEN: usize = u8::MAX as usize;

/// What the link measured while sending one packet
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TxReceipt {
    pub duration: Duration,
    /// Bytes per second, `None` when the send completed too fast to measure
    pub byte_rate: Option<f64>,
}

impl TxReceipt {
    pub fn measured(bytes: usize, duration: Duration) -> Self {
        let secs = duration.as_secs_f64();
        Self {
            duration,
            byte_rate: (secs > 0.0).then(|| bytes as f64 / secs),
        }
    }
}

/// Anything that can put one packet on the air
#[async_trait]
pub trait RadioLink: Send {
    /// Transmit one packet and wait until it has left
    async fn transmit(&mut self, packet: &[u8]) -> Result<TxReceipt>;
}

/// Serial-attached LoRa modem
pub struct SerialModem<P: SerialPortIO> {
    port: P,
    device_path: String,
}

impl SerialModem<TokioSerialPort> {
    /// Open the modem's serial port
    ///
    /// # Errors
    ///
    /// Returns `FlightError::Serial` if the port cannot be opened.
    pub fn open(path: &str, baud_rate: u32) -> Result<Self> {
        let stream = open_port(path, baud_rate)?;
        Ok(Self::new(TokioSerialPort::new(stream), path))
    }
}

impl<P: SerialPortIO> SerialModem<P> {
    pub fn new(port: P, device_path: &str) -> Self {
        Self {
            port,
            device_path: device_path.to_string(),
        }
    }

    pub fn device_path(&self) -> &str {
        &self.device_path
    }
}

/// Length-prefixed modem frame
pub fn frame_packet(packet: &[u8]) -> Result<BytesMut> {
    if packet.is_empty() || packet.len() > MAX_PACKET_LEN {
        return Err(FlightError::Radio(format!(
            "packet length {} outside 1..={}",
            packet.len(),
            MAX_PACKET_LEN
        )));
    }
    let mut frame = BytesMut::with_capacity(packet.len() + 1);
    frame.put_u8(packet.len() as u8);
    frame.put_slice(packet);
    Ok(frame)
}

#[async_trait]
impl<P: SerialPortIO> RadioLink for SerialModem<P> {
    async fn transmit(&mut self, packet: &[u8]) -> Result<TxReceipt> {
        let frame = frame_packet(packet)?;
        let start = Instant::now();
        self.port
            .send_frame(&frame)
            .await
            .map_err(|e| FlightError::Radio(format!("{}: {}", self.device_path, e)))?;
        let receipt = TxReceipt::measured(packet.len(), start.elapsed());
        debug!("Sent {} bytes in {:?}", packet.len(), receipt.duration);
        Ok(receipt)
    }
}
