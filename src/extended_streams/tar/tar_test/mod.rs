use crate::{
  extended_streams::{
    compression::{gzip, GunzipReader},
    tar::{
      pax_parser::{tests::pax_record, PaxParserError},
      tar_constants::BLOCK_SIZE,
      TarEntryType, TarExtractError, TarExtractor, TarExtractorOptions, TarHeaderParserError,
      TarTypeFlag,
    },
  },
  Read, ReadExt as _,
};

pub(crate) struct TestEntry {
  pub name: String,
  pub size: u64,
  pub typeflag: u8,
  pub link_name: String,
  pub prefix: String,
  pub magic_version: [u8; 8],
  /// Written verbatim into the size field instead of `size`.
  pub raw_size: Option<[u8; 12]>,
}

impl TestEntry {
  pub fn file(name: &str, size: u64) -> Self {
    Self {
      name: name.to_string(),
      size,
      typeflag: b'0',
      link_name: String::new(),
      prefix: String::new(),
      magic_version: *b"ustar\x0000",
      raw_size: None,
    }
  }

  pub fn directory(name: &str) -> Self {
    Self {
      typeflag: b'5',
      ..Self::file(name, 0)
    }
  }

  pub fn extension(typeflag: TarTypeFlag, size: u64) -> Self {
    Self {
      typeflag: typeflag.into(),
      ..Self::file("././@LongLink", size)
    }
  }
}

fn write_field(block: &mut [u8], offset: usize, width: usize, value: &[u8]) {
  let length = value.len().min(width);
  block[offset..offset + length].copy_from_slice(&value[..length]);
}

fn write_octal(block: &mut [u8], offset: usize, width: usize, value: u64) {
  let text = format!("{:0width$o}\0", value, width = width - 1);
  write_field(block, offset, width, text.as_bytes());
}

/// Serializes a ustar header block with a valid checksum.
pub(crate) fn header_block(entry: &TestEntry) -> [u8; BLOCK_SIZE] {
  let mut block = [0_u8; BLOCK_SIZE];
  write_field(&mut block, 0, 100, entry.name.as_bytes());
  write_octal(&mut block, 100, 8, 0o644);
  write_octal(&mut block, 108, 8, 1000);
  write_octal(&mut block, 116, 8, 1000);
  match entry.raw_size {
    Some(raw_size) => write_field(&mut block, 124, 12, &raw_size),
    None => write_octal(&mut block, 124, 12, entry.size),
  }
  write_octal(&mut block, 136, 12, 1_700_000_000);
  block[156] = entry.typeflag;
  write_field(&mut block, 157, 100, entry.link_name.as_bytes());
  write_field(&mut block, 257, 8, &entry.magic_version);
  write_field(&mut block, 265, 32, b"npm");
  write_field(&mut block, 297, 32, b"npm");
  write_field(&mut block, 345, 155, entry.prefix.as_bytes());

  block[148..156].fill(b' ');
  let checksum: u32 = block.iter().map(|&b| u32::from(b)).sum();
  let checksum = format!("{checksum:06o}\0 ");
  block[148..156].copy_from_slice(checksum.as_bytes());
  block
}

/// Assembles an in-memory archive.
#[derive(Default)]
pub(crate) struct TarBuilder {
  data: Vec<u8>,
}

impl TarBuilder {
  pub fn entry(&mut self, entry: &TestEntry, content: &[u8]) -> &mut Self {
    self.data.extend_from_slice(&header_block(entry));
    self.data.extend_from_slice(content);
    let padding = (BLOCK_SIZE - content.len() % BLOCK_SIZE) % BLOCK_SIZE;
    self.data.resize(self.data.len() + padding, 0);
    self
  }

  pub fn file(&mut self, name: &str, content: &[u8]) -> &mut Self {
    self.entry(&TestEntry::file(name, content.len() as u64), content)
  }

  pub fn directory(&mut self, name: &str) -> &mut Self {
    self.entry(&TestEntry::directory(name), &[])
  }

  pub fn pax(&mut self, typeflag: TarTypeFlag, records: &[(&str, &str)]) -> &mut Self {
    let payload: String = records
      .iter()
      .map(|(key, value)| pax_record(key, value))
      .collect();
    let entry = TestEntry::extension(typeflag, payload.len() as u64);
    self.entry(&entry, payload.as_bytes())
  }

  pub fn gnu_long(&mut self, typeflag: TarTypeFlag, value: &str) -> &mut Self {
    let mut payload = value.as_bytes().to_vec();
    payload.push(0);
    let entry = TestEntry::extension(typeflag, payload.len() as u64);
    self.entry(&entry, &payload)
  }

  /// Appends the two zero blocks that end an archive.
  pub fn finish(&mut self) -> Vec<u8> {
    self.data.extend_from_slice(&[0; 2 * BLOCK_SIZE]);
    core::mem::take(&mut self.data)
  }

  pub fn unterminated(&mut self) -> Vec<u8> {
    core::mem::take(&mut self.data)
  }
}

#[derive(Debug, PartialEq, Eq)]
struct ExtractedEntry {
  name: String,
  entry_type: TarEntryType,
  content: Option<Vec<u8>>,
}

async fn extract_all<R: Read>(
  extractor: &mut TarExtractor<R>,
) -> Result<Vec<ExtractedEntry>, TarExtractError<R::ReadError>> {
  let mut entries = Vec::new();
  while let Some(mut entry) = extractor.next_entry().await? {
    let content = match entry.content() {
      Some(mut content) => Some(content.read_until_end().await?),
      None => None,
    };
    entries.push(ExtractedEntry {
      name: entry.header().name.clone(),
      entry_type: entry.header().entry_type,
      content,
    });
  }
  Ok(entries)
}

fn three_file_archive() -> Vec<u8> {
  TarBuilder::default()
    .directory("package/")
    .file("package/package.json", br#"{"name":"demo","version":"1.0.0"}"#)
    .directory("package/lib/")
    .file("package/lib/index.js", &b"export const answer = 42;\n".repeat(40))
    .file("package/README.md", b"# demo\n")
    .finish()
}

#[tokio::test]
async fn test_three_files_in_order() {
  let archive = three_file_archive();
  let mut extractor = TarExtractor::new(archive.as_slice());
  let entries = extract_all(&mut extractor).await.unwrap();

  let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
  assert_eq!(
    names,
    [
      "package/",
      "package/package.json",
      "package/lib/",
      "package/lib/index.js",
      "package/README.md",
    ]
  );

  let files: Vec<_> = entries
    .iter()
    .filter(|e| e.entry_type == TarEntryType::File)
    .collect();
  assert_eq!(files.len(), 3);
  assert_eq!(
    files[0].content.as_deref(),
    Some(&br#"{"name":"demo","version":"1.0.0"}"#[..])
  );
  assert_eq!(
    files[1].content.as_deref(),
    Some(&b"export const answer = 42;\n".repeat(40)[..])
  );
  assert_eq!(files[2].content.as_deref(), Some(&b"# demo\n"[..]));

  for directory in entries.iter().filter(|e| e.entry_type == TarEntryType::Directory) {
    assert_eq!(directory.content, None);
  }

  assert!(extractor.next_entry().await.unwrap().is_none());
}

#[tokio::test]
async fn test_unread_content_is_skipped() {
  let archive = three_file_archive();
  let mut extractor = TarExtractor::new(archive.as_slice());
  let mut names = Vec::new();
  while let Some(mut entry) = extractor.next_entry().await.unwrap() {
    // Read only a few bytes of each file.
    if let Some(mut content) = entry.content() {
      let mut buf = [0_u8; 3];
      content.read(&mut buf).await.unwrap();
    }
    names.push(entry.header().name.clone());
  }
  assert_eq!(names.len(), 5);
  assert_eq!(names[4], "package/README.md");
}

#[tokio::test]
async fn test_zero_size_file_has_no_content() {
  let archive = TarBuilder::default().file("package/empty.js", b"").finish();
  let mut extractor = TarExtractor::new(archive.as_slice());
  let mut entry = extractor.next_entry().await.unwrap().unwrap();
  assert_eq!(entry.header().entry_type, TarEntryType::File);
  assert!(entry.content().is_none());
  assert_eq!(entry.read_content().await.unwrap(), b"");
}

#[tokio::test]
async fn test_pax_path_override() {
  let archive = TarBuilder::default()
    .pax(TarTypeFlag::PaxExtendedHeader, &[("path", "very/long/name.txt")])
    .file("truncated-name", b"content")
    .file("next.txt", b"next")
    .finish();
  let mut extractor = TarExtractor::new(archive.as_slice());
  let entries = extract_all(&mut extractor).await.unwrap();

  assert_eq!(entries[0].name, "very/long/name.txt");
  assert_eq!(entries[0].content.as_deref(), Some(&b"content"[..]));
  // Per-entry attributes apply to exactly one entry.
  assert_eq!(entries[1].name, "next.txt");
}

#[tokio::test]
async fn test_pax_attributes_exposed_on_header() {
  let archive = TarBuilder::default()
    .pax(
      TarTypeFlag::PaxExtendedHeader,
      &[("mtime", "1234.5"), ("uname", "someone")],
    )
    .file("a.txt", b"a")
    .file("b.txt", b"b")
    .finish();
  let mut extractor = TarExtractor::new(archive.as_slice());

  let entry = extractor.next_entry().await.unwrap().unwrap();
  let pax = entry.header().pax.clone().unwrap();
  assert_eq!(pax["uname"], "someone");
  assert_eq!(entry.header().mtime, 1234);
  assert_eq!(entry.header().uname, "someone");
  drop(entry);

  let entry = extractor.next_entry().await.unwrap().unwrap();
  assert_eq!(entry.header().pax, None);
  assert_eq!(entry.header().uname, "npm");
}

#[tokio::test]
async fn test_pax_global_persists_and_local_overrides() {
  let archive = TarBuilder::default()
    .pax(TarTypeFlag::PaxGlobalExtendedHeader, &[("uname", "global"), ("gname", "staff")])
    .file("a.txt", b"a")
    .pax(TarTypeFlag::PaxExtendedHeader, &[("uname", "local")])
    .file("b.txt", b"b")
    .file("c.txt", b"c")
    .pax(TarTypeFlag::PaxGlobalExtendedHeader, &[("uname", "global2")])
    .file("d.txt", b"d")
    .finish();
  let mut extractor = TarExtractor::new(archive.as_slice());

  let mut owners = Vec::new();
  while let Some(entry) = extractor.next_entry().await.unwrap() {
    owners.push((entry.header().uname.clone(), entry.header().gname.clone()));
  }
  assert_eq!(
    owners,
    [
      ("global".to_string(), "staff".to_string()),
      ("local".to_string(), "staff".to_string()),
      ("global".to_string(), "staff".to_string()),
      ("global2".to_string(), "staff".to_string()),
    ]
  );
}

#[tokio::test]
async fn test_pax_size_override() {
  let content = b"0123456789";
  let mut entry = TestEntry::file("sized.bin", 0);
  entry.raw_size = Some(*b"00000000000\0");
  let archive = TarBuilder::default()
    .pax(TarTypeFlag::PaxExtendedHeader, &[("size", "10")])
    .entry(&entry, content)
    .finish();
  let mut extractor = TarExtractor::new(archive.as_slice());
  let entries = extract_all(&mut extractor).await.unwrap();
  assert_eq!(entries.len(), 1);
  assert_eq!(entries[0].content.as_deref(), Some(&content[..]));
}

#[tokio::test]
async fn test_invalid_pax_size() {
  let archive = TarBuilder::default()
    .pax(TarTypeFlag::PaxExtendedHeader, &[("size", "ten")])
    .file("a.txt", b"a")
    .finish();
  let mut extractor = TarExtractor::new(archive.as_slice());
  assert!(matches!(
    extractor.next_entry().await,
    Err(TarExtractError::Pax(PaxParserError::InvalidSize(_)))
  ));
}

#[tokio::test]
async fn test_gnu_long_name_and_link() {
  let long_name = format!("package/{}/index.js", "nested/".repeat(30));
  let long_target = format!("package/{}/target.js", "deep/".repeat(30));
  let mut link = TestEntry::file("short-link", 0);
  link.typeflag = b'2';
  let archive = TarBuilder::default()
    .gnu_long(TarTypeFlag::LongNameGnu, &long_name)
    .file("truncated", b"long")
    .gnu_long(TarTypeFlag::LongLinkNameGnu, &long_target)
    .entry(&link, &[])
    .gnu_long(TarTypeFlag::LongNameOldGnu, "package/legacy.js")
    .file("x", b"legacy")
    .finish();
  let mut extractor = TarExtractor::new(archive.as_slice());

  let mut entry = extractor.next_entry().await.unwrap().unwrap();
  assert_eq!(entry.header().name, long_name);
  assert_eq!(entry.read_content().await.unwrap(), b"long");
  drop(entry);

  let entry = extractor.next_entry().await.unwrap().unwrap();
  assert_eq!(entry.header().entry_type, TarEntryType::Symlink);
  assert_eq!(entry.header().name, "short-link");
  assert_eq!(entry.header().link_name, long_target);
  drop(entry);

  let entry = extractor.next_entry().await.unwrap().unwrap();
  assert_eq!(entry.header().name, "package/legacy.js");
}

#[tokio::test]
async fn test_legacy_directory_after_long_name() {
  let mut entry = TestEntry::file("short", 0);
  entry.typeflag = b'\0';
  let archive = TarBuilder::default()
    .gnu_long(TarTypeFlag::LongNameGnu, "package/some/dir/")
    .entry(&entry, &[])
    .finish();
  let mut extractor = TarExtractor::new(archive.as_slice());
  let entry = extractor.next_entry().await.unwrap().unwrap();
  assert_eq!(entry.header().entry_type, TarEntryType::Directory);
}

#[tokio::test]
async fn test_pax_path_overrides_truncated_directory_name() {
  let truncated = format!("{}/", "d".repeat(99));
  let archive = TarBuilder::default()
    .pax(TarTypeFlag::PaxExtendedHeader, &[("path", "package/real/file.js")])
    .file(&truncated, b"export {}")
    .finish();
  let mut extractor = TarExtractor::new(archive.as_slice());
  let entries = extract_all(&mut extractor).await.unwrap();
  assert_eq!(
    entries,
    [ExtractedEntry {
      name: "package/real/file.js".to_string(),
      entry_type: TarEntryType::File,
      content: Some(b"export {}".to_vec()),
    }]
  );
}

#[tokio::test]
async fn test_long_name_overrides_truncated_directory_name() {
  let truncated = format!("{}/", "d".repeat(99));
  let archive = TarBuilder::default()
    .gnu_long(TarTypeFlag::LongNameGnu, "package/real/index.d.ts")
    .file(&truncated, b"")
    .finish();
  let mut extractor = TarExtractor::new(archive.as_slice());
  let entry = extractor.next_entry().await.unwrap().unwrap();
  assert_eq!(entry.header().name, "package/real/index.d.ts");
  assert_eq!(entry.header().entry_type, TarEntryType::File);
}

#[tokio::test]
async fn test_extension_too_large() {
  let archive = TarBuilder::default()
    .gnu_long(TarTypeFlag::LongNameGnu, &"a".repeat(600))
    .file("x", b"x")
    .finish();
  let mut extractor = TarExtractor::with_options(
    archive.as_slice(),
    TarExtractorOptions {
      max_extension_record_size: 512,
    },
  );
  assert!(matches!(
    extractor.next_entry().await,
    Err(TarExtractError::ExtensionTooLarge {
      size: 601,
      limit: 512
    })
  ));
}

#[tokio::test]
async fn test_corrupt_second_header() {
  let mut archive = three_file_archive();
  // The second header starts after the directory header block.
  archive[BLOCK_SIZE + 10] ^= 0x20;
  let mut extractor = TarExtractor::new(archive.as_slice());
  assert!(extractor.next_entry().await.unwrap().is_some());
  assert!(matches!(
    extractor.next_entry().await,
    Err(TarExtractError::Header(
      TarHeaderParserError::CorruptArchive { .. }
    ))
  ));
}

#[tokio::test]
async fn test_missing_end_blocks_ends_cleanly() {
  let archive = TarBuilder::default()
    .file("a.txt", b"a")
    .file("b.txt", b"b")
    .unterminated();
  let mut extractor = TarExtractor::new(archive.as_slice());
  let entries = extract_all(&mut extractor).await.unwrap();
  assert_eq!(entries.len(), 2);
}

#[tokio::test]
async fn test_truncated_content() {
  let mut archive = TarBuilder::default()
    .file("a.txt", &[7; 1000])
    .unterminated();
  archive.truncate(BLOCK_SIZE + 600);
  let mut extractor = TarExtractor::new(archive.as_slice());
  let mut entry = extractor.next_entry().await.unwrap().unwrap();
  assert_eq!(
    entry.read_content().await,
    Err(TarExtractError::TruncatedStream {
      bytes_requested: 400,
      bytes_read: 0,
    })
  );
}

#[tokio::test]
async fn test_plain_tar_fed_compressed_data() {
  let mut still_compressed = vec![0x1F, 0x8B, 0x08, 0x00];
  still_compressed.resize(2 * BLOCK_SIZE, 0x55);
  let mut extractor = TarExtractor::new(still_compressed.as_slice());
  let error = extractor.next_entry().await.err().unwrap();
  assert!(error.to_string().contains("decompressed first"));
}

#[tokio::test]
async fn test_tar_gz_pipeline() {
  let archive = three_file_archive();
  let compressed = gzip(&archive);
  let mut extractor = TarExtractor::new(GunzipReader::new(compressed.as_slice()));
  let entries = extract_all(&mut extractor).await.unwrap();
  assert_eq!(entries.len(), 5);
  assert_eq!(
    extractor.get_ref().compressed_bytes_read(),
    compressed.len() as u64
  );
}
