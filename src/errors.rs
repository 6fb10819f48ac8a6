use core::convert::Infallible;

use thiserror::Error;

use crate::{
  extended_streams::{
    compression::{GunzipReadError, InflateError},
    tar::{PaxParserError, TarExtractError, TarHeaderParserError},
  },
  registry::BodyReadError,
  ReadExactError,
};

/// Errors surfaced by the network and storage facing API.
///
/// The layered stream errors (`GunzipReadError`, `TarExtractError`, ...) convert into this type,
/// so a failure deep inside a tarball still reports what went wrong.
#[derive(Error, Debug)]
pub enum Error {
  #[error("Truncated stream: expected {bytes_requested} bytes, only {bytes_read} bytes available")]
  TruncatedStream {
    bytes_requested: u64,
    bytes_read: u64,
  },
  #[error("Tar archive error: {0}")]
  Archive(#[from] TarHeaderParserError),
  #[error("PAX extended header error: {0}")]
  Pax(#[from] PaxParserError),
  #[error("Tar extension record of {size} bytes exceeds the limit of {limit} bytes")]
  ExtensionTooLarge { size: u64, limit: u64 },
  #[error("Decompression error: {0}")]
  Decompression(#[from] InflateError),
  #[error("HTTP {status} for {url}")]
  HttpStatus { status: u16, url: String },
  #[error("Network error: {0}")]
  Network(#[from] reqwest::Error),
  #[error("Operation cancelled")]
  Cancelled,
  #[error("Invalid JSON from {url}: {source}")]
  InvalidJson {
    url: String,
    source: serde_json::Error,
  },
  #[error("Serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
  #[error("Storage error: {0}")]
  Storage(#[from] std::io::Error),
  #[error("Invalid URL: {0}")]
  InvalidUrl(#[from] url::ParseError),
  #[error("Could not resolve {package}@{specifier}")]
  UnresolvedVersion { package: String, specifier: String },
  #[error("Invalid package manifest for {package}: {reason}")]
  InvalidManifest { package: String, reason: String },
}

impl Error {
  /// Cancellation is a clean abort, not a failure.
  #[must_use]
  pub fn is_cancelled(&self) -> bool {
    matches!(self, Error::Cancelled)
  }
}

impl From<Infallible> for Error {
  fn from(value: Infallible) -> Self {
    match value {}
  }
}

impl From<BodyReadError> for Error {
  fn from(error: BodyReadError) -> Self {
    match error {
      BodyReadError::Cancelled => Error::Cancelled,
      BodyReadError::Network(error) => Error::Network(error),
    }
  }
}

impl<U: Into<Error>> From<ReadExactError<U>> for Error {
  fn from(error: ReadExactError<U>) -> Self {
    match error {
      ReadExactError::TruncatedStream {
        bytes_requested,
        bytes_read,
      } => Error::TruncatedStream {
        bytes_requested,
        bytes_read,
      },
      ReadExactError::Io(error) => error.into(),
    }
  }
}

impl<U: Into<Error>> From<GunzipReadError<U>> for Error {
  fn from(error: GunzipReadError<U>) -> Self {
    match error {
      GunzipReadError::Decompression(error) => Error::Decompression(error),
      GunzipReadError::Io(error) => error.into(),
    }
  }
}

impl<U: Into<Error>> From<TarExtractError<U>> for Error {
  fn from(error: TarExtractError<U>) -> Self {
    match error {
      TarExtractError::Header(error) => Error::Archive(error),
      TarExtractError::Pax(error) => Error::Pax(error),
      TarExtractError::TruncatedStream {
        bytes_requested,
        bytes_read,
      } => Error::TruncatedStream {
        bytes_requested,
        bytes_read,
      },
      TarExtractError::ExtensionTooLarge { size, limit } => Error::ExtensionTooLarge { size, limit },
      TarExtractError::Io(error) => error.into(),
    }
  }
}
