/// Merges a child's stdout and stderr into a single chunk stream.
///
/// Two drain tasks read each pipe independently and forward raw chunks
/// into one shared channel. The channel closes once both pipes reach
/// end-of-stream (both senders dropped), which is the merged EOF.
///
/// Known non-guarantee: when both streams produce output at the same
/// instant, chunks arrive in arbitrary order relative to each other.
/// Byte order within a single stream is preserved; line boundaries
/// across streams are only intact while one stream is idle.
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;

const READ_BUF_SIZE: usize = 4096;
const CHANNEL_CAPACITY: usize = 64;

pub struct MergedOutput {
    rx: mpsc::Receiver<Vec<u8>>,
}

impl MergedOutput {
    /// Start draining both pipes. Chunks become available via `recv`.
    pub fn new<O, E>(stdout: Option<O>, stderr: Option<E>) -> Self
    where
        O: AsyncRead + Unpin + Send + 'static,
        E: AsyncRead + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        if let Some(reader) = stdout {
            tokio::spawn(drain(reader, tx.clone(), "stdout"));
        }
        if let Some(reader) = stderr {
            tokio::spawn(drain(reader, tx, "stderr"));
        }
        Self { rx }
    }

    /// Next merged chunk, or None once both source streams have closed.
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        self.rx.recv().await
    }
}

/// Copy one pipe into the shared channel until end-of-stream.
///
/// A read error stops this drain only; the sibling stream keeps going.
async fn drain<R>(mut reader: R, tx: mpsc::Sender<Vec<u8>>, name: &'static str)
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; READ_BUF_SIZE];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                if tx.send(buf[..n].to_vec()).await.is_err() {
                    // Consumer hung up; nothing left to drain for.
                    break;
                }
            }
            Err(e) => {
                tracing::warn!(stream = name, error = %e, "error reading child output");
                break;
            }
        }
    }
}
