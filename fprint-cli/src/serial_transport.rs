//! `tokio-serial`-backed transport halves (spec §1/§6: the transport is a
//! collaborator the driver is handed, not one it constructs itself).

use async_trait::async_trait;
use fprint_driver::transport::{TransportReader, TransportWriter};
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio_serial::{SerialPortBuilderExt, SerialStream};

pub struct SerialReader {
    inner: ReadHalf<SerialStream>,
}

pub struct SerialWriter {
    inner: WriteHalf<SerialStream>,
}

/// Open `path` at `baud` and split it into the halves [`fprint_driver::Driver::new`] wants.
pub fn open(path: &str, baud: u32) -> anyhow::Result<(SerialReader, SerialWriter)> {
    let port = tokio_serial::new(path, baud).open_native_async()?;
    let (read_half, write_half) = tokio::io::split(port);
    Ok((SerialReader { inner: read_half }, SerialWriter { inner: write_half }))
}

#[async_trait]
impl TransportReader for SerialReader {
    async fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.inner.read(buf).await
    }
}

#[async_trait]
impl TransportWriter for SerialWriter {
    async fn write_all(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        self.inner.write_all(bytes).await
    }
}
