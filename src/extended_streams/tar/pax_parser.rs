use core::str::Utf8Error;

use hashbrown::HashMap;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PaxParserError {
  #[error("A PAX key-value pair is missing a newline at the end")]
  KeyValuePairMissingNewline,
  #[error("A PAX key-value pair is missing the '=' separator")]
  KeyValuePairMissingEquals,
  #[error("A PAX record has an invalid length field: {0:?}")]
  InvalidLength(String),
  #[error("A PAX record is not valid UTF-8: {0}")]
  InvalidUtf8(#[from] Utf8Error),
  #[error("The PAX size attribute is not a decimal integer: {0:?}")]
  InvalidSize(String),
}

/// Parses the payload of a PAX extended header.
///
/// "%d %s=%s\n", <length>, <keyword>, <value>
///
/// The length counts the whole record, including the length digits, the space and the newline.
/// Parsing stops at the end of the payload, at a record claiming length 0, or at trailing bytes
/// without a length prefix. Later records override earlier ones with the same key.
pub fn parse_pax_records(payload: &[u8]) -> Result<HashMap<String, String>, PaxParserError> {
  let mut records = HashMap::new();
  let mut position = 0;

  while position < payload.len() {
    let remaining = &payload[position..];
    let Some(space_index) = remaining.iter().position(|&b| b == b' ') else {
      break;
    };

    let length_field = &remaining[..space_index];
    let length_text = core::str::from_utf8(length_field)
      .map_err(|_| PaxParserError::InvalidLength(String::from_utf8_lossy(length_field).into_owned()))?;
    let length: usize = length_text
      .parse()
      .map_err(|_| PaxParserError::InvalidLength(length_text.to_string()))?;
    if length == 0 {
      break;
    }
    if length <= space_index + 1 || length > remaining.len() {
      return Err(PaxParserError::InvalidLength(length_text.to_string()));
    }

    let record = &remaining[space_index + 1..length];
    let Some(record) = record.strip_suffix(b"\n") else {
      return Err(PaxParserError::KeyValuePairMissingNewline);
    };
    let record = core::str::from_utf8(record)?;
    let Some((key, value)) = record.split_once('=') else {
      return Err(PaxParserError::KeyValuePairMissingEquals);
    };
    records.insert(key.to_string(), value.to_string());

    position += length;
  }

  Ok(records)
}

/// Parses the decimal PAX `size` attribute.
pub fn parse_pax_size(value: &str) -> Result<u64, PaxParserError> {
  value
    .parse()
    .map_err(|_| PaxParserError::InvalidSize(value.to_string()))
}

/// Parses a PAX time attribute, dropping any fractional part.
#[must_use]
pub fn parse_pax_seconds(value: &str) -> Option<i64> {
  let whole = value.split_once('.').map_or(value, |(whole, _)| whole);
  whole.parse().ok()
}
