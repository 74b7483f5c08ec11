//! Encoding and decoding of GUID partition tables.
//!
//! All operations work on byte buffers; reading and writing the disk is left to the caller.

extern crate crc32fast;
extern crate failure;
#[macro_use]
extern crate failure_derive;

mod bytes;
mod entry;
mod error;
pub mod guid;
mod header;

pub use self::{
    entry::{GptEntries, GptPartitionEntry, PartitionRole, ENTRY_SIZE},
    error::GptError,
    guid::Guid,
    header::{GptHeader, HEADER_SIZE, REVISION_1_0, SIGNATURE},
};

/// Logical sector size assumed for disk images.
pub const SECTOR_SIZE: u64 = 512;

/// LBA of the primary GPT header.
pub const PRIMARY_HEADER_LBA: u64 = 1;
