use hashbrown::HashMap;

use crate::extended_streams::tar::{
  tar_constants::{
    decode_octal_or_base256, parse_null_terminated_string, CommonHeaderAdditions,
    TarTypeFlag, UstarHeaderAdditions, V7Header, BLOCK_SIZE, CHECKSUM_FIELD_NEUTRAL_SUM,
  },
  TarHeaderParserError,
};

/// Kind of archive entry, as seen by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TarEntryType {
  File,
  Link,
  Symlink,
  CharacterDevice,
  BlockDevice,
  Directory,
  Fifo,
  ContiguousFile,
  Unknown,
}

impl From<TarTypeFlag> for TarEntryType {
  fn from(value: TarTypeFlag) -> Self {
    match value {
      TarTypeFlag::RegularFile => TarEntryType::File,
      TarTypeFlag::HardLink => TarEntryType::Link,
      TarTypeFlag::SymbolicLink => TarEntryType::Symlink,
      TarTypeFlag::CharacterDevice => TarEntryType::CharacterDevice,
      TarTypeFlag::BlockDevice => TarEntryType::BlockDevice,
      TarTypeFlag::Directory => TarEntryType::Directory,
      TarTypeFlag::Fifo => TarEntryType::Fifo,
      TarTypeFlag::ContiguousFile => TarEntryType::ContiguousFile,
      _ => TarEntryType::Unknown,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TarHeaderFormat {
  Ustar,
  Gnu,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TarHeader {
  pub name: String,
  pub entry_type: TarEntryType,
  /// Raw typeflag, also set for extension records the extractor consumes itself.
  pub typeflag: TarTypeFlag,
  pub format: TarHeaderFormat,
  /// Empty when the entry is not a link.
  pub link_name: String,
  pub size: u64,
  pub mtime: i64,
  pub mode: u32,
  pub uid: u64,
  pub gid: u64,
  pub uname: String,
  pub gname: String,
  pub dev_major: u32,
  pub dev_minor: u32,
  /// Merged global and per-entry PAX attributes, `None` if there were none.
  pub pax: Option<HashMap<String, String>>,
}

impl TarHeader {
  /// Old archivers mark directories as regular files whose name ends with `/`.
  pub fn apply_legacy_directory(&mut self) {
    if self.entry_type == TarEntryType::File && self.name.ends_with('/') {
      self.entry_type = TarEntryType::Directory;
    }
  }

  /// Whether the entry carries a readable content stream.
  #[must_use]
  pub fn has_content(&self) -> bool {
    self.size > 0
      && matches!(
        self.entry_type,
        TarEntryType::File | TarEntryType::ContiguousFile
      )
  }
}

/// Number of zero bytes following `size` bytes of entry data.
#[must_use]
pub fn padding_after(size: u64) -> u64 {
  let block = BLOCK_SIZE as u64;
  (block - size % block) % block
}

/// Decodes one 512-byte header block.
///
/// Returns `Ok(None)` for an all-zero block, which marks the end of the archive.
/// The legacy directory rule is left to the caller, since PAX and GNU records may still
/// replace the name.
pub fn parse_header(block: &[u8; BLOCK_SIZE]) -> Result<Option<TarHeader>, TarHeaderParserError> {
  let header: &V7Header = zerocopy::transmute_ref!(block);

  let actual = header.compute_header_checksum();
  if actual == CHECKSUM_FIELD_NEUTRAL_SUM {
    return Ok(None);
  }
  let expected = decode_octal_or_base256(&header.checksum);
  if expected != actual {
    return Err(TarHeaderParserError::CorruptArchive { expected, actual });
  }

  let format = if &header.magic_version == V7Header::MAGIC_VERSION_GNU {
    TarHeaderFormat::Gnu
  } else if &header.magic() == V7Header::MAGIC_USTAR {
    TarHeaderFormat::Ustar
  } else {
    return Err(TarHeaderParserError::UnsupportedFormat {
      magic: header.magic(),
      version: header.version(),
    });
  };

  let common: &CommonHeaderAdditions = zerocopy::transmute_ref!(&header.padding);

  let size = decode_octal_or_base256(&header.size);
  if size < 0 {
    return Err(TarHeaderParserError::NegativeSize(size));
  }

  let mut name = parse_null_terminated_string(&header.name_bytes).into_owned();
  if format == TarHeaderFormat::Ustar {
    let ustar: &UstarHeaderAdditions = zerocopy::transmute_ref!(&common.padding);
    let prefix = parse_null_terminated_string(&ustar.prefix);
    if !prefix.is_empty() {
      name = format!("{prefix}/{name}");
    }
  }

  let typeflag = header.parse_typeflag();
  Ok(Some(TarHeader {
    name,
    entry_type: typeflag.into(),
    typeflag,
    format,
    link_name: parse_null_terminated_string(&header.linkname).into_owned(),
    size: size as u64,
    mtime: decode_octal_or_base256(&header.mtime),
    mode: decode_octal_or_base256(&header.mode) as u32,
    uid: decode_octal_or_base256(&header.uid).max(0) as u64,
    gid: decode_octal_or_base256(&header.gid).max(0) as u64,
    uname: parse_null_terminated_string(&common.uname).into_owned(),
    gname: parse_null_terminated_string(&common.gname).into_owned(),
    dev_major: decode_octal_or_base256(&common.dev_major) as u32,
    dev_minor: decode_octal_or_base256(&common.dev_minor) as u32,
    pax: None,
  }))
}
