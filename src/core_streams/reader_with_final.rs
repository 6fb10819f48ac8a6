use crate::Read;

/// Wraps a reader so every read also reports whether the source is exhausted.
///
/// One chunk is always read ahead. When a read hands out the last buffered bytes and the
/// source has already signalled its end, the read is flagged as final, so the consumer
/// never needs an extra zero-length round trip to learn about the end.
pub struct ReaderWithFinal<R: Read> {
  source_reader: R,
  lookahead: Vec<u8>,
  lookahead_position: usize,
  lookahead_end: usize,
  source_exhausted: bool,
}

impl<R: Read> ReaderWithFinal<R> {
  #[must_use]
  pub fn new(source_reader: R) -> Self {
    Self {
      source_reader,
      lookahead: Vec::new(),
      lookahead_position: 0,
      lookahead_end: 0,
      source_exhausted: false,
    }
  }

  #[must_use]
  pub fn get_ref(&self) -> &R {
    &self.source_reader
  }

  fn buffered(&self) -> &[u8] {
    &self.lookahead[self.lookahead_position..self.lookahead_end]
  }

  /// Refill the lookahead with one read of up to `capacity` bytes, detecting exhaustion.
  ///
  /// The buffer only ever grows, so steady-state refills do not touch the allocation.
  async fn fill_lookahead(&mut self, capacity: usize) -> Result<(), R::ReadError> {
    if self.lookahead.len() < capacity {
      self.lookahead.resize(capacity, 0);
    }
    self.lookahead_position = 0;
    self.lookahead_end = 0;
    let n = self
      .source_reader
      .read(&mut self.lookahead[..capacity])
      .await?;
    if n == 0 {
      self.source_exhausted = true;
    }
    self.lookahead_end = n;
    Ok(())
  }

  /// Reads up to `output_buffer.len()` bytes and returns `(bytes_read, is_final)`.
  ///
  /// `is_final` is true when no further bytes will ever be produced.
  pub async fn read_with_final(
    &mut self,
    output_buffer: &mut [u8],
  ) -> Result<(usize, bool), R::ReadError> {
    if output_buffer.is_empty() {
      return Ok((0, self.source_exhausted && self.buffered().is_empty()));
    }

    if self.buffered().is_empty() && !self.source_exhausted {
      self.fill_lookahead(output_buffer.len()).await?;
    }

    let available = self.buffered();
    let n = available.len().min(output_buffer.len());
    output_buffer[..n].copy_from_slice(&available[..n]);
    self.lookahead_position += n;

    // Peek the next chunk so the end is reported together with the last bytes.
    if self.buffered().is_empty() && !self.source_exhausted {
      self.fill_lookahead(output_buffer.len()).await?;
    }

    Ok((n, self.source_exhausted && self.buffered().is_empty()))
  }
}

impl<R: Read> Read for ReaderWithFinal<R> {
  type ReadError = R::ReadError;

  async fn read(&mut self, output_buffer: &mut [u8]) -> Result<usize, Self::ReadError> {
    self.read_with_final(output_buffer).await.map(|(n, _)| n)
  }
}
