//! The UART boundary (spec §1 "transport is a collaborator, not owned by
//! this driver"): a pair of half-duplex traits so a real transport (the
//! CLI's `tokio-serial` port) and a mock (a pair of in-memory pipes) can
//! both back the reader and sender sides without either owning the
//! other's half.

use async_trait::async_trait;

/// The read half of a transport.
#[async_trait]
pub trait TransportReader: Send {
    async fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize>;
}

/// The write half of a transport.
#[async_trait]
pub trait TransportWriter: Send {
    async fn write_all(&mut self, bytes: &[u8]) -> std::io::Result<()>;
}

/// The sensor's power rail (spec §6 `power(on|off)`), a GPIO concern this
/// crate does not own: the embedder implements this over whatever pin
/// `init`'s `power_pin` would have named and hands it to
/// [`crate::driver::Driver::with_power_control`].
#[async_trait]
pub trait PowerControl: Send {
    async fn set_power(&mut self, on: bool) -> std::io::Result<()>;
}

/// An in-memory loopback transport pair for tests: writes to one end are
/// readable from the other.
pub mod loopback {
    use async_trait::async_trait;
    use tokio::sync::mpsc;

    use super::{TransportReader, TransportWriter};

    pub struct LoopbackReader {
        rx: mpsc::UnboundedReceiver<Vec<u8>>,
        pending: Vec<u8>,
    }

    pub struct LoopbackWriter {
        tx: mpsc::UnboundedSender<Vec<u8>>,
    }

    /// Build a connected reader/writer pair: bytes sent via the returned
    /// [`LoopbackWriter`] become readable from the paired
    /// [`LoopbackReader`] — i.e. this models the sensor's side of the
    /// wire, echoing back whatever a test pushes into it.
    #[must_use]
    pub fn pair() -> (LoopbackWriter, LoopbackReader) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            LoopbackWriter { tx: tx.clone() },
            LoopbackReader {
                rx,
                pending: Vec::new(),
            },
        )
    }

    impl LoopbackWriter {
        /// Test-only hook: push bytes as if the sensor had sent them.
        #[must_use]
        pub fn sender(&self) -> mpsc::UnboundedSender<Vec<u8>> {
            self.tx.clone()
        }
    }

    #[async_trait]
    impl TransportWriter for LoopbackWriter {
        async fn write_all(&mut self, bytes: &[u8]) -> std::io::Result<()> {
            self.tx
                .send(bytes.to_vec())
                .map_err(|_| std::io::Error::from(std::io::ErrorKind::BrokenPipe))
        }
    }

    #[async_trait]
    impl TransportReader for LoopbackReader {
        async fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.pending.is_empty() {
                match self.rx.recv().await {
                    Some(bytes) => self.pending = bytes,
                    None => return Ok(0),
                }
            }
            let n = self.pending.len().min(buf.len());
            buf[..n].copy_from_slice(&self.pending[..n]);
            self.pending.drain(..n);
            Ok(n)
        }
    }
}
