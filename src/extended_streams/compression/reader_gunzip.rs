use thiserror::Error;

use super::{InflateEngine, InflateError, InflateEvent};
use crate::{Read, ReaderWithFinal};

pub struct GunzipOptions {
  /// How many compressed bytes are pulled from the source per push into the decompressor.
  pub chunk_size: usize,
}

impl Default for GunzipOptions {
  fn default() -> Self {
    Self {
      chunk_size: 1024 * 1024,
    }
  }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GunzipReadError<U> {
  #[error("Decompression error: {0}")]
  Decompression(InflateError),
  #[error("Underlying read error: {0}")]
  Io(U),
}

/// Pull-based gzip decoder over a compressed [`Read`] source.
///
/// Output produced by the push-driven [`InflateEngine`] is collected in an internal buffer and
/// handed out by [`Read::read`]. A decompression error is sticky: once raised it is raised again
/// by every later read.
pub struct GunzipReader<R: Read> {
  source_reader: ReaderWithFinal<R>,
  engine: InflateEngine,
  buffer: Vec<u8>,
  buffer_position: usize,
  sticky_error: Option<InflateError>,
  chunk: Vec<u8>,
  compressed_bytes_read: u64,
  finished: bool,
}

impl<R: Read> GunzipReader<R> {
  #[must_use]
  pub fn new(source_reader: R) -> Self {
    Self::with_options(source_reader, GunzipOptions::default())
  }

  #[must_use]
  pub fn with_options(source_reader: R, options: GunzipOptions) -> Self {
    Self {
      source_reader: ReaderWithFinal::new(source_reader),
      engine: InflateEngine::new(),
      buffer: Vec::new(),
      buffer_position: 0,
      sticky_error: None,
      chunk: vec![0_u8; options.chunk_size.max(1)],
      compressed_bytes_read: 0,
      finished: false,
    }
  }

  /// Total compressed bytes pulled from the source so far.
  ///
  /// Download progress is measured in these, since `Content-Length` describes the compressed body.
  #[must_use]
  pub fn compressed_bytes_read(&self) -> u64 {
    self.compressed_bytes_read
  }

  #[must_use]
  pub fn get_ref(&self) -> &R {
    self.source_reader.get_ref()
  }

  fn collect_events(&mut self) {
    if self.buffer_position == self.buffer.len() {
      self.buffer.clear();
      self.buffer_position = 0;
    }
    while let Some(event) = self.engine.next_event() {
      match event {
        InflateEvent::Data(data) => self.buffer.extend_from_slice(&data),
        InflateEvent::Error(error) => self.sticky_error = Some(error),
        InflateEvent::End => self.finished = true,
      }
    }
  }
}

impl<R: Read> Read for GunzipReader<R> {
  type ReadError = GunzipReadError<R::ReadError>;

  async fn read(&mut self, output_buffer: &mut [u8]) -> Result<usize, Self::ReadError> {
    if output_buffer.is_empty() {
      return Ok(0);
    }

    loop {
      let buffered = &self.buffer[self.buffer_position..];
      if !buffered.is_empty() {
        let n = buffered.len().min(output_buffer.len());
        output_buffer[..n].copy_from_slice(&buffered[..n]);
        self.buffer_position += n;
        return Ok(n);
      }

      if let Some(error) = &self.sticky_error {
        return Err(GunzipReadError::Decompression(error.clone()));
      }

      if self.finished {
        return Ok(0);
      }

      let (bytes_read, is_final) = self
        .source_reader
        .read_with_final(&mut self.chunk)
        .await
        .map_err(GunzipReadError::Io)?;
      self.compressed_bytes_read += bytes_read as u64;

      if bytes_read == 0 {
        self.engine.terminate();
        self.finished = true;
        return Ok(0);
      }

      self.engine.push(&self.chunk[..bytes_read], is_final);
      self.collect_events();
      // A push that only completed part of a header yields nothing; pull more instead of reporting EOF.
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  use crate::{extended_streams::compression::inflate_engine::tests::gzip, ReadExt as _};

  fn small_chunks() -> GunzipOptions {
    GunzipOptions { chunk_size: 7 }
  }

  #[tokio::test]
  async fn test_small_reads_yield_exact_length_then_eof() {
    let payload: Vec<u8> = (0..20_000_u32).map(|i| (i % 97) as u8).collect();
    let compressed = gzip(&payload);
    let mut reader = GunzipReader::with_options(compressed.as_slice(), small_chunks());

    let mut output = Vec::new();
    let mut buf = [0u8; 13];
    loop {
      let n = reader.read(&mut buf).await.unwrap();
      if n == 0 {
        break;
      }
      output.extend_from_slice(&buf[..n]);
    }
    assert_eq!(output, payload);
    assert_eq!(reader.read(&mut buf).await, Ok(0));
    assert_eq!(reader.compressed_bytes_read(), compressed.len() as u64);
  }

  #[tokio::test]
  async fn test_read_until_end_with_default_chunk() {
    let payload = b"npm tarballs are gzip compressed".repeat(100);
    let compressed = gzip(&payload);
    let mut reader = GunzipReader::new(compressed.as_slice());
    assert_eq!(reader.read_until_end().await.unwrap(), payload);
  }

  #[tokio::test]
  async fn test_truncated_stream_error_is_sticky() {
    let payload = b"some content that will be cut short".repeat(40);
    let compressed = gzip(&payload);
    let truncated = &compressed[..compressed.len() / 2];
    let mut reader = GunzipReader::with_options(truncated, small_chunks());

    let mut buf = [0u8; 64];
    let first_error = loop {
      match reader.read(&mut buf).await {
        Ok(0) => panic!("truncated stream must not end cleanly"),
        Ok(_) => {},
        Err(error) => break error,
      }
    };
    assert_eq!(
      first_error,
      GunzipReadError::Decompression(InflateError::UnexpectedEof)
    );
    assert_eq!(reader.read(&mut buf).await, Err(first_error.clone()));
    assert_eq!(reader.read(&mut buf).await, Err(first_error));
  }

  #[tokio::test]
  async fn test_not_gzip() {
    let mut reader = GunzipReader::new(&b"package/package.json\0\0\0"[..]);
    let mut buf = [0u8; 16];
    assert!(matches!(
      reader.read(&mut buf).await,
      Err(GunzipReadError::Decompression(InflateError::Header(_)))
    ));
  }

  #[tokio::test]
  async fn test_empty_source_is_eof() {
    let mut reader = GunzipReader::new(&b""[..]);
    let mut buf = [0u8; 16];
    assert_eq!(reader.read(&mut buf).await, Ok(0));
  }
}
