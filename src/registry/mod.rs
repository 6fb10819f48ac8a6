mod body_reader;
mod client;
mod config;
mod downloader;
pub mod patches;
mod resolver;
mod scheduler;
mod work_queue;

#[cfg(test)]
pub(crate) mod test_registry;

pub use body_reader::*;
pub use client::*;
pub use config::*;
pub use downloader::*;
pub use resolver::*;
pub use scheduler::*;
pub use work_queue::*;
