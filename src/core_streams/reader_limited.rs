use crate::Read;

/// A reader that only reads up to a specified limit.
/// Once the limit is reached it reports end of stream, leaving the rest of the source untouched.
///
/// This is the equivalent of `std::io::Read::take`.
pub struct LimitedReader<R: Read> {
  source_reader: R,
  read_limit_bytes: u64,
  bytes_read: u64,
}

impl<R: Read> LimitedReader<R> {
  /// Creates a new `LimitedReader` with the specified limit.
  #[must_use]
  pub fn new(source_reader: R, read_limit_bytes: u64) -> Self {
    Self {
      source_reader,
      read_limit_bytes,
      bytes_read: 0,
    }
  }

  /// Returns the number of bytes read so far.
  #[must_use]
  pub fn bytes_read(&self) -> u64 {
    self.bytes_read
  }

  /// Returns the number of bytes that may still be read before the limit is hit.
  #[must_use]
  pub fn remaining(&self) -> u64 {
    self.read_limit_bytes - self.bytes_read
  }

  pub fn into_inner(self) -> R {
    self.source_reader
  }
}

impl<R: Read> Read for LimitedReader<R> {
  type ReadError = R::ReadError;

  async fn read(&mut self, output_buffer: &mut [u8]) -> Result<usize, Self::ReadError> {
    let remaining_limit = self.remaining();
    if remaining_limit == 0 {
      return Ok(0);
    }

    let bytes_to_read = (output_buffer.len() as u64).min(remaining_limit) as usize;

    let bytes_read = self
      .source_reader
      .read(&mut output_buffer[..bytes_to_read])
      .await?;

    self.bytes_read += bytes_read as u64;
    Ok(bytes_read)
  }
}
