use std::borrow::Cow;

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

// --- Constants for the TAR Header Format ---
pub const BLOCK_SIZE: usize = 512;

/// Sum of the checksum field when it is read as eight ASCII spaces.
pub const CHECKSUM_FIELD_NEUTRAL_SUM: i64 = 8 * 0x20;

/// Typeflag byte of a header block.
///
/// `0` to `7` are the POSIX entry kinds, `x` and `g` the PAX extension records.
/// GNU writers add `L` and `K` for long names and link targets, and the obsolete `N`.
#[derive(Debug, Eq, Hash, PartialEq, Clone, Copy)]
pub enum TarTypeFlag {
  /// Regular file
  RegularFile,
  /// Hard link
  HardLink,
  /// Symbolic link
  SymbolicLink,
  /// Character device
  CharacterDevice,
  /// Block device
  BlockDevice,
  /// Directory
  Directory,
  /// FIFO (named pipe)
  Fifo,
  /// Indicates that this is a contiguous file,
  ContiguousFile,
  /// Extended header `pax`
  PaxExtendedHeader,
  /// Global extended header `pax`
  PaxGlobalExtendedHeader,
  /// GNU extension - long file name
  LongNameGnu,
  /// GNU extension - long link name (link target)
  LongLinkNameGnu,
  /// Old GNU extension - long file name
  LongNameOldGnu,
  UnknownTypeFlag(u8),
}

impl From<u8> for TarTypeFlag {
  fn from(value: u8) -> Self {
    match value {
      b'\0' | b'0' => TarTypeFlag::RegularFile,
      b'1' => TarTypeFlag::HardLink,
      b'2' => TarTypeFlag::SymbolicLink,
      b'3' => TarTypeFlag::CharacterDevice,
      b'4' => TarTypeFlag::BlockDevice,
      b'5' => TarTypeFlag::Directory,
      b'6' => TarTypeFlag::Fifo,
      b'7' => TarTypeFlag::ContiguousFile,
      b'x' => TarTypeFlag::PaxExtendedHeader,
      b'g' => TarTypeFlag::PaxGlobalExtendedHeader,
      b'L' => TarTypeFlag::LongNameGnu,
      b'K' => TarTypeFlag::LongLinkNameGnu,
      b'N' => TarTypeFlag::LongNameOldGnu,
      _ => TarTypeFlag::UnknownTypeFlag(value),
    }
  }
}

impl From<TarTypeFlag> for u8 {
  fn from(value: TarTypeFlag) -> Self {
    match value {
      TarTypeFlag::RegularFile => b'0',
      TarTypeFlag::HardLink => b'1',
      TarTypeFlag::SymbolicLink => b'2',
      TarTypeFlag::CharacterDevice => b'3',
      TarTypeFlag::BlockDevice => b'4',
      TarTypeFlag::Directory => b'5',
      TarTypeFlag::Fifo => b'6',
      TarTypeFlag::ContiguousFile => b'7',
      TarTypeFlag::PaxExtendedHeader => b'x',
      TarTypeFlag::PaxGlobalExtendedHeader => b'g',
      TarTypeFlag::LongNameGnu => b'L',
      TarTypeFlag::LongLinkNameGnu => b'K',
      TarTypeFlag::LongNameOldGnu => b'N',
      TarTypeFlag::UnknownTypeFlag(value) => value,
    }
  }
}

pub(crate) fn find_null_terminator_index(bytes: &[u8]) -> usize {
  bytes
    .iter()
    .position(|&b| b == b'\0')
    .unwrap_or(bytes.len())
}

/// Decodes a NUL-terminated text field. Invalid UTF-8 is replaced rather than rejected.
pub fn parse_null_terminated_string(bytes: &[u8]) -> Cow<'_, str> {
  let end = find_null_terminator_index(bytes);
  String::from_utf8_lossy(&bytes[..end])
}

/// Decodes a numeric header field.
///
/// Fields whose first byte has the high bit set use the base-256 encoding:
/// `0x80` introduces a positive big-endian magnitude, `0xFF` a negative
/// two's-complement value. Any other leading byte with the high bit set yields `0`.
///
/// All other fields are ASCII octal, optionally padded with leading spaces or NULs and
/// terminated by a space or NUL. Values that do not fit an `i64` saturate.
#[must_use]
pub fn decode_octal_or_base256(bytes: &[u8]) -> i64 {
  let Some(&first) = bytes.first() else {
    return 0;
  };

  if first & 0x80 != 0 {
    return decode_base256(bytes);
  }

  let mut value: i64 = 0;
  for &byte in bytes.iter().skip_while(|&&b| b == b' ' || b == b'\0') {
    if !(b'0'..=b'7').contains(&byte) {
      break;
    }
    value = value.saturating_mul(8).saturating_add(i64::from(byte - b'0'));
  }
  value
}

fn decode_base256(bytes: &[u8]) -> i64 {
  let (negative, magnitude_bytes) = match bytes[0] {
    0x80 => (false, &bytes[1..]),
    // Two's complement spans the whole field, sign byte included.
    0xFF => (true, bytes),
    _ => return 0,
  };

  let mut magnitude: i128 = 0;
  for &byte in magnitude_bytes {
    let digit = if negative { !byte } else { byte };
    magnitude = magnitude.saturating_mul(256).saturating_add(i128::from(digit));
  }

  let value = if negative {
    -(magnitude.saturating_add(1))
  } else {
    magnitude
  };
  value.clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64
}

#[derive(FromBytes, IntoBytes, KnownLayout, Immutable)]
/// Also known as `v7`
#[repr(C)]
pub struct V7Header {
  /// File name, null-terminated
  pub name_bytes: [u8; 100],
  /// File mode (octal), stored as ASCII bytes
  pub mode: [u8; 8],
  /// User ID of file owner (octal), stored as ASCII bytes
  pub uid: [u8; 8],
  /// Group ID of file owner (octal), stored as ASCII bytes
  pub gid: [u8; 8],
  /// File size in bytes (octal or base-256)
  ///
  /// After the header block, not including the header itself.
  pub size: [u8; 12],
  /// Modification time (epoch seconds, octal), stored as ASCII bytes
  pub mtime: [u8; 12],
  /// Header checksum (space-padded), stored as ASCII bytes
  pub checksum: [u8; 8],
  /// File type flag (e.g., 0 = file, 5 = directory)
  pub typeflag: u8,
  /// Target name of a link, null-terminated
  pub linkname: [u8; 100],
  /// Usually split into [u8; 6] for the magic string and [u8; 2] for the version string.
  /// They are never used independently anyway.
  pub magic_version: [u8; 8],
  /// [`CommonHeaderAdditions`] if `magic_version` matches or just zeros.
  pub padding: [u8; 247],
}

impl V7Header {
  /// Shared by `ustar`, `pax` and `posix` formats. Only the magic part is compared.
  pub const MAGIC_USTAR: &[u8; 6] = b"ustar\0";
  /// Used by the GNU format.
  pub const MAGIC_VERSION_GNU: &[u8; 8] = b"ustar  \0";

  #[must_use]
  pub fn magic(&self) -> [u8; 6] {
    let mut magic = [0; 6];
    magic.copy_from_slice(&self.magic_version[..6]);
    magic
  }

  #[must_use]
  pub fn version(&self) -> [u8; 2] {
    [self.magic_version[6], self.magic_version[7]]
  }

  /// Computes the checksum of a TAR header as defined by the ustar format.
  /// The checksum field (offsets 148..156) is treated as if it were filled with ASCII spaces (0x20).
  #[must_use]
  pub fn compute_header_checksum(&self) -> i64 {
    const CHECKSUM_START: usize = 148;
    const CHECKSUM_END: usize = 156;
    let header = self.as_bytes();

    let outside_checksum: i64 = header[..CHECKSUM_START]
      .iter()
      .chain(&header[CHECKSUM_END..])
      .map(|&byte| i64::from(byte))
      .sum();
    CHECKSUM_FIELD_NEUTRAL_SUM + outside_checksum
  }

  #[must_use]
  pub fn parse_typeflag(&self) -> TarTypeFlag {
    self.typeflag.into()
  }
}

/// Fields contained in the padding of the [`V7Header`].
#[derive(FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct CommonHeaderAdditions {
  /// User name, null-terminated
  pub uname: [u8; 32],
  /// Group name, null-terminated
  pub gname: [u8; 32],
  /// Major device number (octal), stored as ASCII bytes
  pub dev_major: [u8; 8],
  /// Minor device number (octal), stored as ASCII bytes
  pub dev_minor: [u8; 8],
  /// [`UstarHeaderAdditions`] for POSIX archives, GNU specific fields otherwise.
  pub padding: [u8; 167],
}

/// Fields contained in the padding of the [`CommonHeaderAdditions`].
#[derive(FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct UstarHeaderAdditions {
  /// Path prefix used if name exceeds 100 bytes, null-terminated
  pub prefix: [u8; 155],
  pub pad: [u8; 12],
}

/// https://pubs.opengroup.org/onlinepubs/9699919799/utilities/pax.html
///
/// Only the keys that override header fields are listed.
pub mod pax_keys_well_known {
  /// Overrides the gid for files whose id is greater than `2 097 151 (octal 7 777 777)`.
  ///
  /// Stored in decimal format.
  pub const GID: &str = "gid";
  /// Overrides the `gname` field of the header.
  pub const GNAME: &str = "gname";
  /// Overrides the linkname of the header.
  pub const LINKPATH: &str = "linkpath";
  /// Decimal seconds, optionally with a fractional part: `123456789.123456789`
  pub const MTIME: &str = "mtime";
  /// Overrides the `name` and `prefix` fields of the header.
  pub const PATH: &str = "path";
  /// Overrides the size of the header.
  /// Size of the file in bytes, decimal format.
  /// When size greater than `8 589 934 591 (octal 77 777 777 777)`.
  pub const SIZE: &str = "size";
  /// Overrides the uid for files whose id is greater than `2 097 151 (octal 7 777 777)`.
  ///
  /// Stored in decimal format.
  pub const UID: &str = "uid";
  /// Overrides the `uname` field of the header.
  pub const UNAME: &str = "uname";
}
