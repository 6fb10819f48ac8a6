mod gz_header;
mod inflate_engine;
mod reader_gunzip;

pub use gz_header::*;
pub use inflate_engine::*;
pub use reader_gunzip::*;

#[cfg(test)]
pub(crate) use inflate_engine::tests::gzip;
