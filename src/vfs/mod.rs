mod directory_storage;
mod import_map;
mod library_cache;
mod storage;

pub use directory_storage::*;
pub use import_map::*;
pub use library_cache::*;
pub use storage::*;
