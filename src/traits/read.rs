use core::convert::Infallible;

use crate::LimitedReader;

/// Trait for pulling bytes from an asynchronous byte source.
///
/// This is the foundation every parser in this crate is built on.
pub trait Read {
  type ReadError;

  /// Read up to `output_buffer.len()` bytes into `output_buffer`.
  /// Providing an empty `output_buffer` is valid and will return 0 bytes read.
  ///
  /// Returns number of bytes read.
  /// On EOF, it returns 0 bytes read.
  /// Any further reads after EOF return 0 bytes read.
  async fn read(&mut self, output_buffer: &mut [u8]) -> Result<usize, Self::ReadError>;
}

impl<R: Read + ?Sized> Read for &mut R {
  type ReadError = R::ReadError;

  async fn read(&mut self, output_buffer: &mut [u8]) -> Result<usize, Self::ReadError> {
    (**self).read(output_buffer).await
  }
}

impl<R: Read + ?Sized> Read for Box<R> {
  type ReadError = R::ReadError;

  async fn read(&mut self, output_buffer: &mut [u8]) -> Result<usize, Self::ReadError> {
    self.as_mut().read(output_buffer).await
  }
}

impl Read for &[u8] {
  type ReadError = Infallible;

  async fn read(&mut self, output_buffer: &mut [u8]) -> Result<usize, Self::ReadError> {
    let n = core::cmp::min(output_buffer.len(), self.len());
    output_buffer[..n].copy_from_slice(&self[..n]);
    *self = &self[n..];
    Ok(n)
  }
}

// --- ReadLimited trait ---

pub trait ReadLimited: Read {
  /// Creates a new reader that stops after `read_limit_bytes` bytes.
  ///
  /// Returns a new [`LimitedReader`] instance.
  #[must_use]
  fn take(&mut self, read_limit_bytes: u64) -> LimitedReader<&mut Self>;
}

impl<R: Read + ?Sized> ReadLimited for R {
  fn take(&mut self, read_limit_bytes: u64) -> LimitedReader<&mut Self> {
    LimitedReader::new(self, read_limit_bytes)
  }
}
