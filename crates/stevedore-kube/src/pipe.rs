//! In-process byte pipe between a blocking writer and an async reader
//!
//! The write end implements [`std::io::Write`] so the tar builder can run on
//! a blocking thread; the read end implements [`AsyncRead`] so it can feed a
//! remote command's stdin. Capacity is bounded, so the writer blocks until
//! the reader catches up.
//!
//! Closing either end unblocks the other: a dropped reader turns every write
//! into `BrokenPipe`, and a writer closed with an error hands that error to
//! the reader instead of a clean end of stream.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, ReadBuf};
use tokio::sync::mpsc;

/// Number of in-flight chunks before the writer blocks
pub const PIPE_CAPACITY: usize = 16;

type Chunk = io::Result<Vec<u8>>;

/// Create a connected pipe
pub fn pipe() -> (PipeWriter, PipeReader) {
    let (tx, rx) = mpsc::channel(PIPE_CAPACITY);
    (
        PipeWriter { tx: Some(tx) },
        PipeReader {
            rx,
            pending: Vec::new(),
            offset: 0,
        },
    )
}

/// Blocking write end
///
/// Must not be used from inside an async task; run the producer on a
/// blocking thread.
#[derive(Debug)]
pub struct PipeWriter {
    tx: Option<mpsc::Sender<Chunk>>,
}

impl PipeWriter {
    /// Close the pipe, handing `error` to the reader
    pub fn close_with_error(mut self, error: io::Error) {
        if let Some(tx) = self.tx.take() {
            // reader already gone: nobody left to tell
            let _ = tx.blocking_send(Err(error));
        }
    }

    fn broken() -> io::Error {
        io::Error::new(io::ErrorKind::BrokenPipe, "pipe reader closed")
    }
}

impl io::Write for PipeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let tx = self.tx.as_ref().ok_or_else(Self::broken)?;
        tx.blocking_send(Ok(buf.to_vec()))
            .map_err(|_| Self::broken())?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Async read end
#[derive(Debug)]
pub struct PipeReader {
    rx: mpsc::Receiver<Chunk>,
    pending: Vec<u8>,
    offset: usize,
}

impl AsyncRead for PipeReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        loop {
            if self.offset < self.pending.len() {
                let n = buf.remaining().min(self.pending.len() - self.offset);
                let start = self.offset;
                buf.put_slice(&self.pending[start..start + n]);
                self.offset += n;
                return Poll::Ready(Ok(()));
            }

            match self.rx.poll_recv(cx) {
                Poll::Ready(Some(Ok(chunk))) => {
                    self.pending = chunk;
                    self.offset = 0;
                }
                Poll::Ready(Some(Err(e))) => return Poll::Ready(Err(e)),
                // every writer dropped: end of stream
                Poll::Ready(None) => return Poll::Ready(Ok(())),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_bytes_flow_through() {
        let (mut writer, mut reader) = pipe();
        let producer = tokio::task::spawn_blocking(move || {
            for i in 0..100u8 {
                writer.write_all(&[i; 64]).unwrap();
            }
        });

        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        producer.await.unwrap();

        assert_eq!(out.len(), 6400);
        assert_eq!(out[64 * 99], 99);
    }

    #[tokio::test]
    async fn test_writer_error_reaches_reader() {
        let (mut writer, mut reader) = pipe();
        tokio::task::spawn_blocking(move || {
            writer.write_all(b"partial").unwrap();
            writer.close_with_error(io::Error::other("walk failed"));
        });

        let mut out = Vec::new();
        let err = reader.read_to_end(&mut out).await.unwrap_err();
        assert_eq!(err.to_string(), "walk failed");
    }

    #[tokio::test]
    async fn test_dropped_reader_breaks_writer() {
        let (mut writer, reader) = pipe();
        drop(reader);
        let err = tokio::task::spawn_blocking(move || writer.write_all(b"data"))
            .await
            .unwrap()
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }
}
