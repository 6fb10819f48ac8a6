use bytes::{Buf as _, Bytes};
use futures::{stream::BoxStream, Stream, StreamExt as _};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::Read;

#[derive(Error, Debug)]
pub enum BodyReadError {
  #[error("Download cancelled")]
  Cancelled,
  #[error("Network error while reading response body: {0}")]
  Network(#[from] reqwest::Error),
}

/// Adapts a streaming HTTP body to [`Read`].
///
/// Every wait for the next network chunk races the cancellation token, so a cancelled
/// download fails on its next read instead of finishing.
pub struct HttpBodyReader<S = BoxStream<'static, reqwest::Result<Bytes>>> {
  stream: S,
  cancel: CancellationToken,
  chunk: Bytes,
  finished: bool,
}

impl<S> HttpBodyReader<S>
where
  S: Stream<Item = reqwest::Result<Bytes>> + Unpin,
{
  #[must_use]
  pub fn new(stream: S, cancel: CancellationToken) -> Self {
    Self {
      stream,
      cancel,
      chunk: Bytes::new(),
      finished: false,
    }
  }
}

impl<S> Read for HttpBodyReader<S>
where
  S: Stream<Item = reqwest::Result<Bytes>> + Unpin,
{
  type ReadError = BodyReadError;

  async fn read(&mut self, output_buffer: &mut [u8]) -> Result<usize, Self::ReadError> {
    if self.cancel.is_cancelled() {
      return Err(BodyReadError::Cancelled);
    }

    loop {
      if !self.chunk.is_empty() {
        let n = self.chunk.len().min(output_buffer.len());
        output_buffer[..n].copy_from_slice(&self.chunk[..n]);
        self.chunk.advance(n);
        return Ok(n);
      }

      if self.finished || output_buffer.is_empty() {
        return Ok(0);
      }

      let next = tokio::select! {
        biased;
        () = self.cancel.cancelled() => return Err(BodyReadError::Cancelled),
        next = self.stream.next() => next,
      };

      match next {
        Some(chunk) => self.chunk = chunk?,
        None => self.finished = true,
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  use futures::stream;

  use crate::ReadExt as _;

  fn chunks(parts: &[&'static str]) -> Vec<reqwest::Result<Bytes>> {
    parts
      .iter()
      .map(|part| Ok(Bytes::from_static(part.as_bytes())))
      .collect()
  }

  #[tokio::test]
  async fn test_reads_across_chunks() {
    let body = stream::iter(chunks(&["hello ", "", "streaming ", "world"]));
    let mut reader = HttpBodyReader::new(body, CancellationToken::new());
    assert_eq!(
      reader.read_until_end().await.unwrap(),
      b"hello streaming world"
    );
    assert_eq!(reader.read(&mut [0; 4]).await.unwrap(), 0);
  }

  #[tokio::test]
  async fn test_cancel_while_waiting_for_data() {
    let body = stream::iter(chunks(&["partial"])).chain(stream::pending());
    let cancel = CancellationToken::new();
    let mut reader = HttpBodyReader::new(body, cancel.clone());

    let mut buf = [0_u8; 64];
    assert_eq!(reader.read(&mut buf).await.unwrap(), 7);

    let (result, ()) = tokio::join!(reader.read(&mut buf), async {
      tokio::task::yield_now().await;
      cancel.cancel();
    });
    assert!(matches!(result, Err(BodyReadError::Cancelled)));
    // Sticky once cancelled.
    assert!(matches!(
      reader.read(&mut buf).await,
      Err(BodyReadError::Cancelled)
    ));
  }
}
