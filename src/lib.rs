//! Ingests npm packages into a virtual file system.
//!
//! Tarballs are streamed from the registry through a pull-based gunzip adapter into a
//! single-pass tar extractor, so a package is never buffered in its compressed form.
//! On top of that sit a version resolver, a bounded download scheduler and the storage
//! and cache that serve installed libraries.

pub mod core_streams;
mod errors;
pub mod extended_streams;
pub mod registry;
pub mod traits;
mod updater;
pub mod vfs;

pub use core_streams::*;
pub use errors::*;
pub use traits::*;
pub use updater::*;
