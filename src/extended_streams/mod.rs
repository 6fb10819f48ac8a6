pub mod compression;
pub mod tar;
