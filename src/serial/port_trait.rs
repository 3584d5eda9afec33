//! Write-side abstraction over the modem serial port, so the radio link can be
//! exercised without hardware.

use async_trait::async_trait;
use std::io;

/// Outgoing byte stream of a serial device
#[async_trait]
pub trait SerialPortIO: Send {
    /// Write all data to the port
    async fn write_all(&mut self, data: &[u8]) -> io::Result<()>;

    /// Block until the output buffer has drained
    async fn flush(&mut self) -> io::Result<()>;

    /// Write one link-layer packet and wait for it to leave the port
    async fn send_frame(&mut self, frame: &[u8]) -> io::Result<()> {
        self.write_all(frame).await?;
        self.flush().await
    }
}

/// [`SerialPortIO`] over a real `tokio_serial::SerialStream`
pub struct TokioSerialPort {
    port: tokio_serial::SerialStream,
}

impl TokioSerialPort {
    pub fn new(port: tokio_serial::SerialStream) -> Self {
        Self { port }
    }
}

#[async_trait]
impl SerialPortIO for TokioSerialPort {
    async fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        use tokio::io::AsyncWriteExt;
        self.port.write_all(data).await
    }

    async fn flush(&mut self) -> io::Result<()> {
        use tokio::io::AsyncWriteExt;
        self.port.flush().await
    }
}
