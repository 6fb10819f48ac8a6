mod read;
mod read_exact;

pub use read::*;
pub use read_exact::*;
