use super::StoreError;
use bytes::Bytes;
use tokio::sync::mpsc;

/// Write half of a streamed response body.
///
/// Backed by a bounded channel whose receiver becomes the HTTP body, so
/// writes wait on a slow client and fail once the client disconnects.
pub struct ResultSink {
    tx: mpsc::Sender<Bytes>,
    bytes_written: u64,
}

impl ResultSink {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            Self {
                tx,
                bytes_written: 0,
            },
            rx,
        )
    }

    pub async fn write(&mut self, chunk: impl Into<Bytes>) -> Result<(), StoreError> {
        let chunk = chunk.into();
        if chunk.is_empty() {
            return Ok(());
        }
        let len = chunk.len() as u64;
        self.tx.send(chunk).await.map_err(|_| StoreError::SinkClosed)?;
        self.bytes_written += len;
        Ok(())
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn has_output(&self) -> bool {
        self.bytes_written > 0
    }
}
