//! Directory abstraction for codec files
//!
//! Codecs under test write and read whole files through `Directory`.
//! `RamDirectory` keeps everything in memory; `MockDirectoryWrapper`
//! injects recognizable faults and tracks unclosed outputs.

mod directory;
mod mock;

pub use directory::{Directory, IndexOutput, OwnedBytes, RamDirectory};
pub use mock::MockDirectoryWrapper;
