use hashbrown::HashMap;
use tracing::trace;

use crate::{
  extended_streams::tar::{
    padding_after, parse_header,
    pax_parser::{parse_pax_records, parse_pax_seconds, parse_pax_size},
    tar_constants::{pax_keys_well_known, BLOCK_SIZE},
    TarExtractError, TarHeader, TarTypeFlag,
  },
  Read, ReadExt as _,
};

pub struct TarExtractorOptions {
  /// Upper bound for GNU long name and PAX record payloads, which are held in memory.
  pub max_extension_record_size: u64,
}

impl Default for TarExtractorOptions {
  fn default() -> Self {
    Self {
      max_extension_record_size: 1024 * 1024,
    }
  }
}

/// Forward-only, single-pass reader over the entries of a tar stream.
///
/// Each [`TarEntry`] borrows the extractor, so the previous entry is always dropped before
/// the next one is requested. Content the caller left unread is skipped automatically.
pub struct TarExtractor<R: Read> {
  source_reader: R,
  options: TarExtractorOptions,
  content_remaining: u64,
  padding_remaining: u64,
  global_pax: HashMap<String, String>,
  finished: bool,
}

/// Extension records collected for the next real header.
#[derive(Default)]
struct PendingExtensions {
  long_name: Option<String>,
  long_link_name: Option<String>,
  local_pax: HashMap<String, String>,
}

impl<R: Read> TarExtractor<R> {
  #[must_use]
  pub fn new(source_reader: R) -> Self {
    Self::with_options(source_reader, TarExtractorOptions::default())
  }

  #[must_use]
  pub fn with_options(source_reader: R, options: TarExtractorOptions) -> Self {
    Self {
      source_reader,
      options,
      content_remaining: 0,
      padding_remaining: 0,
      global_pax: HashMap::new(),
      finished: false,
    }
  }

  #[must_use]
  pub fn get_ref(&self) -> &R {
    &self.source_reader
  }

  pub fn into_inner(self) -> R {
    self.source_reader
  }

  /// Advances to the next real entry.
  ///
  /// Returns `Ok(None)` once an all-zero block or the end of the stream is reached.
  pub async fn next_entry(&mut self) -> Result<Option<TarEntry<'_, R>>, TarExtractError<R::ReadError>> {
    if self.finished {
      return Ok(None);
    }

    let leftover = self.content_remaining + self.padding_remaining;
    if leftover > 0 {
      trace!(bytes = leftover, "skipping unread entry content");
      self.source_reader.skip_exactly(leftover).await?;
      self.content_remaining = 0;
      self.padding_remaining = 0;
    }

    let mut pending = PendingExtensions::default();
    loop {
      let block = self
        .source_reader
        .read_truncated(BLOCK_SIZE)
        .await
        .map_err(TarExtractError::Io)?;
      let Ok(block) = <[u8; BLOCK_SIZE]>::try_from(block.as_slice()) else {
        self.finished = true;
        return Ok(None);
      };

      let Some(header) = parse_header(&block)? else {
        self.finished = true;
        return Ok(None);
      };

      match header.typeflag {
        TarTypeFlag::LongNameGnu | TarTypeFlag::LongNameOldGnu => {
          let payload = self.read_extension_payload(header.size).await?;
          pending.long_name = Some(extension_string(&payload));
        },
        TarTypeFlag::LongLinkNameGnu => {
          let payload = self.read_extension_payload(header.size).await?;
          pending.long_link_name = Some(extension_string(&payload));
        },
        TarTypeFlag::PaxExtendedHeader => {
          let payload = self.read_extension_payload(header.size).await?;
          pending.local_pax.extend(parse_pax_records(&payload)?);
        },
        TarTypeFlag::PaxGlobalExtendedHeader => {
          let payload = self.read_extension_payload(header.size).await?;
          self.global_pax.extend(parse_pax_records(&payload)?);
        },
        _ => {
          let header = self.apply_extensions(header, pending)?;
          self.content_remaining = header.size;
          self.padding_remaining = padding_after(header.size);
          return Ok(Some(TarEntry {
            header,
            extractor: self,
          }));
        },
      }
    }
  }

  async fn read_extension_payload(
    &mut self,
    size: u64,
  ) -> Result<Vec<u8>, TarExtractError<R::ReadError>> {
    let limit = self.options.max_extension_record_size;
    if size > limit {
      return Err(TarExtractError::ExtensionTooLarge { size, limit });
    }
    let payload = self.source_reader.read_exactly(size as usize).await?;
    self.source_reader.skip_exactly(padding_after(size)).await?;
    Ok(payload)
  }

  fn apply_extensions(
    &self,
    mut header: TarHeader,
    pending: PendingExtensions,
  ) -> Result<TarHeader, TarExtractError<R::ReadError>> {
    if let Some(long_name) = pending.long_name {
      header.name = long_name;
    }
    if let Some(long_link_name) = pending.long_link_name {
      header.link_name = long_link_name;
    }

    let mut pax = self.global_pax.clone();
    pax.extend(pending.local_pax);

    if let Some(path) = pax.get(pax_keys_well_known::PATH) {
      header.name.clone_from(path);
    }
    if let Some(link_path) = pax.get(pax_keys_well_known::LINKPATH) {
      header.link_name.clone_from(link_path);
    }
    if let Some(size) = pax.get(pax_keys_well_known::SIZE) {
      header.size = parse_pax_size(size)?;
    }
    if let Some(mtime) = pax.get(pax_keys_well_known::MTIME).and_then(|v| parse_pax_seconds(v)) {
      header.mtime = mtime;
    }
    if let Some(uid) = pax.get(pax_keys_well_known::UID).and_then(|v| v.parse().ok()) {
      header.uid = uid;
    }
    if let Some(gid) = pax.get(pax_keys_well_known::GID).and_then(|v| v.parse().ok()) {
      header.gid = gid;
    }
    if let Some(uname) = pax.get(pax_keys_well_known::UNAME) {
      header.uname.clone_from(uname);
    }
    if let Some(gname) = pax.get(pax_keys_well_known::GNAME) {
      header.gname.clone_from(gname);
    }

    header.pax = (!pax.is_empty()).then_some(pax);
    header.apply_legacy_directory();
    Ok(header)
  }
}

/// Long names are NUL-padded inside their payload.
fn extension_string(payload: &[u8]) -> String {
  let end = payload
    .iter()
    .rposition(|&b| b != 0)
    .map_or(0, |index| index + 1);
  String::from_utf8_lossy(&payload[..end]).into_owned()
}

/// One archive entry. Borrows the extractor until dropped.
pub struct TarEntry<'a, R: Read> {
  header: TarHeader,
  extractor: &'a mut TarExtractor<R>,
}

impl<R: Read> TarEntry<'_, R> {
  #[must_use]
  pub fn header(&self) -> &TarHeader {
    &self.header
  }

  /// The underlying source, e.g. to query how many bytes were consumed so far.
  #[must_use]
  pub fn source(&self) -> &R {
    &self.extractor.source_reader
  }

  /// Content stream bounded to the entry size.
  ///
  /// Only regular and contiguous files with a nonzero size have content.
  pub fn content(&mut self) -> Option<EntryContent<'_, R>> {
    if !self.header.has_content() {
      return None;
    }
    Some(EntryContent {
      extractor: &mut *self.extractor,
    })
  }

  /// Reads the whole content into memory. Entries without content yield an empty buffer.
  pub async fn read_content(&mut self) -> Result<Vec<u8>, TarExtractError<R::ReadError>> {
    match self.content() {
      Some(mut content) => content.read_until_end().await,
      None => Ok(Vec::new()),
    }
  }
}

/// Bounded view over the data blocks of the current entry.
pub struct EntryContent<'a, R: Read> {
  extractor: &'a mut TarExtractor<R>,
}

impl<R: Read> EntryContent<'_, R> {
  #[must_use]
  pub fn remaining(&self) -> u64 {
    self.extractor.content_remaining
  }
}

impl<R: Read> Read for EntryContent<'_, R> {
  type ReadError = TarExtractError<R::ReadError>;

  async fn read(&mut self, output_buffer: &mut [u8]) -> Result<usize, Self::ReadError> {
    let remaining = self.extractor.content_remaining;
    if remaining == 0 || output_buffer.is_empty() {
      return Ok(0);
    }

    let bytes_to_read = (output_buffer.len() as u64).min(remaining) as usize;
    let bytes_read = self
      .extractor
      .source_reader
      .read(&mut output_buffer[..bytes_to_read])
      .await
      .map_err(TarExtractError::Io)?;
    if bytes_read == 0 {
      return Err(TarExtractError::TruncatedStream {
        bytes_requested: remaining,
        bytes_read: 0,
      });
    }

    self.extractor.content_remaining -= bytes_read as u64;
    Ok(bytes_read)
  }
}
