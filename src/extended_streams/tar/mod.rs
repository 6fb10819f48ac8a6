mod parsing_errors;
mod tar_extractor;
mod tar_header;
pub(crate) mod tar_constants;

pub use parsing_errors::*;
pub use tar_extractor::*;
pub use tar_header::*;
pub use tar_constants::{decode_octal_or_base256, TarTypeFlag, BLOCK_SIZE};

#[cfg(test)]
pub(crate) mod tar_test;

pub(crate) mod pax_parser;
pub use pax_parser::PaxParserError;
