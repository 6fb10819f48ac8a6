mod reader_limited;
mod reader_with_final;

pub use reader_limited::*;
pub use reader_with_final::*;
