//! https://www.ietf.org/rfc/rfc1952.txt

use thiserror::Error;

const ID1: u8 = 0x1F;
const ID2: u8 = 0x8B;
const CM_DEFLATE: u8 = 0x08;
const FLG_FHCRC: u8 = 1 << 1;
const FLG_FEXTRA: u8 = 1 << 2;
const FLG_FNAME: u8 = 1 << 3;
const FLG_FCOMMENT: u8 = 1 << 4;
const FLG_RESERVED: u8 = 0b1110_0000;
/// ID1, ID2, CM, FLG, MTIME (4), XFL, OS
const FIXED_HEADER_LENGTH: usize = 10;
/// CRC32 and ISIZE, both little endian.
pub const GZ_TRAILER_LENGTH: usize = 8;

/// GzHeader represents the gzip member header with only the MTIME field parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GzHeader {
  pub mtime: u32,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GzHeaderError {
  #[error("Invalid gzip header: {0}")]
  InvalidHeader(&'static str),
  #[error("Invalid magic numbers in gzip header expected 0x1F 0x8B got {0:x} {1:x}")]
  InvalidMagicNumbers(u8, u8),
  #[error("Invalid compression method in gzip header, expected deflate (0x08) got {0}")]
  InvalidCompressionMethod(u8),
}

/// Returns the index just past the next NUL byte at or after `offset`.
fn skip_zero_terminated(input_buffer: &[u8], offset: usize) -> Option<usize> {
  input_buffer[offset.min(input_buffer.len())..]
    .iter()
    .position(|&b| b == 0)
    .map(|index| offset + index + 1)
}

impl GzHeader {
  /// Parse a gzip member header from the start of `input_buffer`.
  ///
  /// Returns `Ok(None)` while the buffer does not yet hold the complete header,
  /// so the caller can retry once more input has arrived.
  /// Returns `Ok(Some((header_length, GzHeader)))` once it does.
  pub fn parse(input_buffer: &[u8]) -> Result<Option<(usize, GzHeader)>, GzHeaderError> {
    if input_buffer.len() >= 2 && (input_buffer[0] != ID1 || input_buffer[1] != ID2) {
      return Err(GzHeaderError::InvalidMagicNumbers(
        input_buffer[0],
        input_buffer[1],
      ));
    }

    if input_buffer.len() < FIXED_HEADER_LENGTH {
      return Ok(None);
    }

    if input_buffer[2] != CM_DEFLATE {
      return Err(GzHeaderError::InvalidCompressionMethod(input_buffer[2]));
    }

    let flg = input_buffer[3];
    if flg & FLG_RESERVED != 0 {
      return Err(GzHeaderError::InvalidHeader("reserved flag bits are set"));
    }

    let mtime = u32::from_le_bytes([
      input_buffer[4],
      input_buffer[5],
      input_buffer[6],
      input_buffer[7],
    ]);

    let mut offset = FIXED_HEADER_LENGTH;

    if flg & FLG_FEXTRA != 0 {
      if input_buffer.len() < offset + 2 {
        return Ok(None);
      }
      let xlen = u16::from_le_bytes([input_buffer[offset], input_buffer[offset + 1]]) as usize;
      offset += 2 + xlen;
    }

    if flg & FLG_FNAME != 0 {
      match skip_zero_terminated(input_buffer, offset) {
        Some(next) => offset = next,
        None => return Ok(None),
      }
    }

    if flg & FLG_FCOMMENT != 0 {
      match skip_zero_terminated(input_buffer, offset) {
        Some(next) => offset = next,
        None => return Ok(None),
      }
    }

    if flg & FLG_FHCRC != 0 {
      offset += 2;
    }

    if offset > input_buffer.len() {
      return Ok(None);
    }

    Ok(Some((offset, GzHeader { mtime })))
  }
}
