use thiserror::Error;

use crate::{extended_streams::tar::pax_parser::PaxParserError, ReadExactError};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TarHeaderParserError {
  #[error("Corrupt tar header: checksum expected {expected} but computed {actual}. The input may need to be decompressed first")]
  CorruptArchive { expected: i64, actual: i64 },
  #[error("Unsupported tar format, unknown magic+version: {magic:?}+{version:?}")]
  UnsupportedFormat { magic: [u8; 6], version: [u8; 2] },
  #[error("Corrupt tar header: negative entry size {0}")]
  NegativeSize(i64),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TarExtractError<U> {
  #[error("Tar header error: {0}")]
  Header(#[from] TarHeaderParserError),
  #[error("PAX extended header error: {0}")]
  Pax(#[from] PaxParserError),
  #[error("Truncated tar stream: expected {bytes_requested} bytes, only {bytes_read} bytes available")]
  TruncatedStream {
    bytes_requested: u64,
    bytes_read: u64,
  },
  #[error("Extension record of {size} bytes exceeds the limit of {limit} bytes")]
  ExtensionTooLarge { size: u64, limit: u64 },
  #[error("Underlying read error: {0}")]
  Io(U),
}

impl<U> From<ReadExactError<U>> for TarExtractError<U> {
  fn from(error: ReadExactError<U>) -> Self {
    match error {
      ReadExactError::TruncatedStream {
        bytes_requested,
        bytes_read,
      } => TarExtractError::TruncatedStream {
        bytes_requested,
        bytes_read,
      },
      ReadExactError::Io(error) => TarExtractError::Io(error),
    }
  }
}
