//! An engine for growing virtual machine disk images, and the partitions and APFS
//! containers within them, so that a guest can make use of the additional space.

#[cfg(test)]
extern crate crc32fast;
#[macro_use]
extern crate derive_new;
extern crate dirs;
extern crate failure;
#[macro_use]
extern crate failure_derive;
extern crate fern;
#[macro_use]
extern crate log;
extern crate serde;
#[macro_use]
extern crate serde_derive;
#[cfg(test)]
#[macro_use]
extern crate serde_json;
#[macro_use]
extern crate smart_default;
#[cfg(test)]
extern crate tempdir;

pub extern crate vmdisk_external_commands as external;
pub extern crate vmdisk_gpt as gpt;
extern crate vmdisk_sector_io as sector_io;
extern crate vmdisk_utils as misc;

mod apfs;
mod config;
mod errors;
mod image;
mod logging;
#[cfg(test)]
mod mock;
mod resize;
mod storage;

pub use self::{
    apfs::{resolve_container, ContainerResizer, ContainerTarget},
    config::*,
    image::{DiskImage, GuestType, ImageFormat, ResizeStrategy},
    logging::{log, log_path},
    resize::{
        adjust_layout, DiskResizer, LayoutAdjustment, PartitionExpansion, Reconciled, ResizeError,
        ResizeReport,
    },
    storage::{resize_capability, ManagedImage, ResizeCapability, StorageBacking, StorageDevice},
};
