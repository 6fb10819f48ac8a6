use thiserror::Error;

use crate::Read;

/// Size of the transfer buffer used by [`ReadExt::read_until_end`] and [`ReadExt::skip_exactly`].
const TRANSFER_BUFFER_SIZE: usize = 16 * 1024;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReadExactError<U> {
  #[error("Truncated stream: expected {bytes_requested} bytes, only {bytes_read} bytes available")]
  TruncatedStream {
    bytes_requested: u64,
    bytes_read: u64,
  },
  #[error("Underlying read error: {0}")]
  Io(#[from] U),
}

/// Extension trait providing fixed-size and whole-stream reads for any [`Read`] implementor.
pub trait ReadExt: Read {
  /// Reads exactly `byte_count` bytes, retrying partial reads.
  ///
  /// Fails with [`ReadExactError::TruncatedStream`] if the source ends first.
  async fn read_exactly(
    &mut self,
    byte_count: usize,
  ) -> Result<Vec<u8>, ReadExactError<Self::ReadError>>;

  /// Like [`ReadExt::read_exactly`] but returns a shorter buffer instead of failing when the source ends.
  async fn read_truncated(&mut self, byte_count: usize) -> Result<Vec<u8>, Self::ReadError>;

  /// Accumulates all remaining bytes.
  async fn read_until_end(&mut self) -> Result<Vec<u8>, Self::ReadError>;

  /// Consumes and discards exactly `byte_count` bytes.
  async fn skip_exactly(&mut self, byte_count: u64) -> Result<(), ReadExactError<Self::ReadError>>;
}

/// Blanket implementation for all `Read` implementors.
impl<R: Read + ?Sized> ReadExt for R {
  async fn read_exactly(
    &mut self,
    byte_count: usize,
  ) -> Result<Vec<u8>, ReadExactError<Self::ReadError>> {
    let bytes = self.read_truncated(byte_count).await?;
    if bytes.len() < byte_count {
      return Err(ReadExactError::TruncatedStream {
        bytes_requested: byte_count as u64,
        bytes_read: bytes.len() as u64,
      });
    }
    Ok(bytes)
  }

  async fn read_truncated(&mut self, byte_count: usize) -> Result<Vec<u8>, Self::ReadError> {
    let mut output_buffer = vec![0_u8; byte_count];
    let mut total_read = 0;

    while total_read < byte_count {
      let n = self.read(&mut output_buffer[total_read..]).await?;
      if n == 0 {
        break;
      }
      total_read += n;
    }

    output_buffer.truncate(total_read);
    Ok(output_buffer)
  }

  async fn read_until_end(&mut self) -> Result<Vec<u8>, Self::ReadError> {
    let mut collected = Vec::new();
    let mut transfer_buffer = vec![0_u8; TRANSFER_BUFFER_SIZE];

    loop {
      let n = self.read(&mut transfer_buffer).await?;
      if n == 0 {
        return Ok(collected);
      }
      collected.extend_from_slice(&transfer_buffer[..n]);
    }
  }

  async fn skip_exactly(&mut self, byte_count: u64) -> Result<(), ReadExactError<Self::ReadError>> {
    let mut transfer_buffer = vec![0_u8; TRANSFER_BUFFER_SIZE.min(byte_count as usize)];
    let mut remaining = byte_count;

    while remaining > 0 {
      let chunk = remaining.min(transfer_buffer.len() as u64) as usize;
      let n = self.read(&mut transfer_buffer[..chunk]).await?;
      if n == 0 {
        return Err(ReadExactError::TruncatedStream {
          bytes_requested: byte_count,
          bytes_read: byte_count - remaining,
        });
      }
      remaining -= n as u64;
    }
    Ok(())
  }
}
