use std::collections::VecDeque;

use miniz_oxide::{
  inflate::stream::{inflate, InflateState},
  DataFormat, MZError, MZFlush, MZStatus,
};
use thiserror::Error;

use super::gz_header::{GzHeader, GzHeaderError, GZ_TRAILER_LENGTH};

/// Size of the scratch buffer one inflate call may write into.
const OUTPUT_CHUNK_SIZE: usize = 32 * 1024;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InflateError {
  #[error("Invalid gzip member header: {0}")]
  Header(#[from] GzHeaderError),
  #[error("Deflate stream is corrupt: {0:?}")]
  Deflate(MZError),
  #[error("Decompressor requested a preset dictionary, which gzip does not support")]
  NeedDict,
  #[error("Gzip trailer mismatch: expected crc32 {expected_crc:#010x} and size {expected_size}, got crc32 {actual_crc:#010x} and size {actual_size}")]
  TrailerMismatch {
    expected_crc: u32,
    actual_crc: u32,
    expected_size: u32,
    actual_size: u32,
  },
  #[error("Unexpected EOF while reading compressed data")]
  UnexpectedEof,
}

/// What a push into the [`InflateEngine`] produced, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InflateEvent {
  Data(Vec<u8>),
  Error(InflateError),
  End,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
  Header,
  Body,
  Trailer,
  Terminated,
}

/// Push-driven gzip decompressor.
///
/// Compressed chunks go in through [`InflateEngine::push`]; decompressed output, errors and the
/// end-of-stream signal come out as [`InflateEvent`]s in a FIFO. A single push may produce any
/// number of data events, including none when the chunk only completed part of a header.
pub struct InflateEngine {
  stage: Stage,
  decompressor: Box<InflateState>,
  input: Vec<u8>,
  input_position: usize,
  output_chunk: Vec<u8>,
  member_crc: crc32fast::Hasher,
  member_size: u32,
  members_completed: usize,
  events: VecDeque<InflateEvent>,
}

impl Default for InflateEngine {
  fn default() -> Self {
    Self::new()
  }
}

impl InflateEngine {
  #[must_use]
  pub fn new() -> Self {
    Self {
      stage: Stage::Header,
      decompressor: InflateState::new_boxed(DataFormat::Raw),
      input: Vec::new(),
      input_position: 0,
      output_chunk: vec![0_u8; OUTPUT_CHUNK_SIZE],
      member_crc: crc32fast::Hasher::new(),
      member_size: 0,
      members_completed: 0,
      events: VecDeque::new(),
    }
  }

  /// Pops the oldest pending event.
  pub fn next_event(&mut self) -> Option<InflateEvent> {
    self.events.pop_front()
  }

  #[must_use]
  pub fn is_terminated(&self) -> bool {
    self.stage == Stage::Terminated
  }

  /// Stops the engine. Later pushes are ignored and produce no events.
  pub fn terminate(&mut self) {
    self.stage = Stage::Terminated;
    self.input.clear();
    self.input_position = 0;
  }

  fn fail(&mut self, error: InflateError) {
    self.events.push_back(InflateEvent::Error(error));
    self.terminate();
  }

  fn pending_input(&self) -> &[u8] {
    &self.input[self.input_position..]
  }

  /// Feeds one compressed chunk. `is_final` marks the last chunk of the stream.
  pub fn push(&mut self, chunk: &[u8], is_final: bool) {
    if self.stage == Stage::Terminated {
      return;
    }

    self.input.drain(..self.input_position);
    self.input_position = 0;
    self.input.extend_from_slice(chunk);

    if let Err(error) = self.process() {
      self.fail(error);
      return;
    }

    if is_final {
      if self.stage == Stage::Header && self.members_completed > 0 && self.pending_input().is_empty()
      {
        self.events.push_back(InflateEvent::End);
        self.terminate();
      } else {
        self.fail(InflateError::UnexpectedEof);
      }
    }
  }

  /// Advance through as many stages as the buffered input allows.
  fn process(&mut self) -> Result<(), InflateError> {
    loop {
      match self.stage {
        Stage::Header => {
          // Zero padding after a complete member is not another member.
          if self.members_completed > 0 && self.pending_input().iter().all(|&b| b == 0) {
            self.input_position = self.input.len();
            return Ok(());
          }
          let Some((header_length, _header)) = GzHeader::parse(self.pending_input())? else {
            return Ok(());
          };
          self.input_position += header_length;
          self.decompressor.reset(DataFormat::Raw);
          self.member_crc = crc32fast::Hasher::new();
          self.member_size = 0;
          self.stage = Stage::Body;
        },
        Stage::Body => {
          let result = inflate(
            &mut self.decompressor,
            &self.input[self.input_position..],
            &mut self.output_chunk,
            MZFlush::None,
          );
          self.input_position += result.bytes_consumed;

          if result.bytes_written > 0 {
            let output = &self.output_chunk[..result.bytes_written];
            self.member_crc.update(output);
            self.member_size = self.member_size.wrapping_add(result.bytes_written as u32);
            self.events.push_back(InflateEvent::Data(output.to_vec()));
          }

          match result.status {
            Ok(MZStatus::StreamEnd) => self.stage = Stage::Trailer,
            Ok(MZStatus::Ok) => {
              if result.bytes_consumed == 0 && result.bytes_written == 0 {
                return Ok(());
              }
            },
            Ok(MZStatus::NeedDict) => return Err(InflateError::NeedDict),
            // Out of input, wait for the next push.
            Err(MZError::Buf) => return Ok(()),
            Err(error) => return Err(InflateError::Deflate(error)),
          }
        },
        Stage::Trailer => {
          let trailer = self.pending_input();
          if trailer.len() < GZ_TRAILER_LENGTH {
            return Ok(());
          }
          let expected_crc = u32::from_le_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
          let expected_size = u32::from_le_bytes([trailer[4], trailer[5], trailer[6], trailer[7]]);
          let actual_crc = self.member_crc.clone().finalize();
          if expected_crc != actual_crc || expected_size != self.member_size {
            return Err(InflateError::TrailerMismatch {
              expected_crc,
              actual_crc,
              expected_size,
              actual_size: self.member_size,
            });
          }
          self.input_position += GZ_TRAILER_LENGTH;
          self.members_completed += 1;
          self.stage = Stage::Header;
        },
        Stage::Terminated => return Ok(()),
      }
    }
  }
}
