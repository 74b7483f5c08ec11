//! Growing disk images, and then the partitions within them.

mod container;
mod error;
mod layout;
mod raw;
mod swap;

pub use self::{
    error::ResizeError,
    layout::{adjust_layout, LayoutAdjustment},
};

use crate::{
    apfs,
    config::ResizeConfig,
    errors::IoContext,
    external::{hdiutil, CommandRunner, SystemRunner},
    gpt::SECTOR_SIZE,
    image::{DiskImage, GuestType, ResizeStrategy},
    misc,
    storage::{ManagedImage, StorageDevice},
};
use std::{fmt, fs, path::Path};

/// Fails unless the file system holding `path` has `required` bytes available.
pub(crate) fn ensure_space(path: &Path, required: u64) -> Result<(), ResizeError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let available = misc::available_space(dir)?;
    if available < required {
        return Err(ResizeError::InsufficientSpace { required, available });
    }

    Ok(())
}

/// What became of the partitions after the image was grown.
#[derive(Debug, Clone, PartialEq)]
pub enum PartitionExpansion {
    /// The main APFS container now spans the new space.
    Expanded { strategy: &'static str },
    /// Nothing was attempted.
    Skipped(String),
    /// The image was grown and is usable, but the guest must act to use all of it.
    Limited(String),
    /// Every attempt failed. The image was still grown.
    Failed(String),
}

impl fmt::Display for PartitionExpansion {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PartitionExpansion::Expanded { strategy } => write!(f, "expanded ({})", strategy),
            PartitionExpansion::Skipped(why) => write!(f, "skipped: {}", why),
            PartitionExpansion::Limited(why) => write!(f, "limited: {}", why),
            PartitionExpansion::Failed(why) => write!(f, "failed: {}", why),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResizeReport {
    pub previous_size: u64,
    pub new_size:      u64,
    pub strategy:      ResizeStrategy,
    pub partitions:    PartitionExpansion,
}

/// A managed image grown to match its declared size.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciled {
    pub device: String,
    /// The descriptor to store in place of the old one.
    pub image:  ManagedImage,
    pub report: ResizeReport,
}

/// Grows disk images, issuing every external command through its runner.
pub struct DiskResizer<'a> {
    runner: &'a dyn CommandRunner,
    config: ResizeConfig,
}

impl DiskResizer<'static> {
    /// A resizer which runs the host's tools.
    pub fn new(config: ResizeConfig) -> Self { DiskResizer { runner: &SystemRunner, config } }
}

impl<'a> DiskResizer<'a> {
    pub fn with_runner(config: ResizeConfig, runner: &'a dyn CommandRunner) -> Self {
        DiskResizer { runner, config }
    }

    pub fn config(&self) -> &ResizeConfig { &self.config }

    /// The logical size of an image: the file length of raw images, or the size reported
    /// by the image tool for containers, which may occupy less space on the host.
    pub fn current_size(&self, image: &DiskImage) -> Result<u64, ResizeError> {
        if !image.path.exists() {
            return Err(ResizeError::ImageNotFound { path: image.path.clone() });
        }

        if image.format.is_container() {
            Ok(hdiutil::image_size(self.runner, &image.path)?)
        } else {
            let metadata = fs::metadata(&image.path)
                .at_path("read the metadata of", &image.path)?;
            Ok(metadata.len())
        }
    }

    /// Grows `image` to `to_size` bytes, then expands the partitions within it for Mac
    /// guests. Images are never shrunk.
    ///
    /// Without an explicit strategy, the format's recommended strategy is used. A failure
    /// before the image has been grown leaves it untouched.
    pub fn resize(
        &self,
        image: &DiskImage,
        to_size: u64,
        strategy: Option<ResizeStrategy>,
        guest: GuestType,
    ) -> Result<ResizeReport, ResizeError> {
        if !image.format.supports_resize() {
            return Err(ResizeError::UnsupportedFormat { format: image.format });
        }

        let current = self.current_size(image)?;
        if to_size <= current {
            return Err(ResizeError::CannotShrink { current, requested: to_size });
        }

        if to_size % SECTOR_SIZE != 0 || to_size > self.config.maximum_size {
            return Err(ResizeError::InvalidSize { size: to_size });
        }

        let strategy = strategy.unwrap_or_else(|| image.format.recommended_strategy());
        info!(
            "resizing {} ({}) from {} to {} bytes: {}",
            image.path.display(),
            image.format,
            current,
            to_size,
            strategy
        );

        let path = image.path.as_path();
        match (image.format.is_container(), strategy) {
            (false, ResizeStrategy::ExpandInPlace) => raw::expand_in_place(path, current, to_size)?,
            (false, ResizeStrategy::CreateLargerImage) => {
                swap::create_larger_image(path, to_size, current, |source, temp| {
                    raw::copy_into_larger(source, temp, to_size).map_err(ResizeError::from)
                })?
            }
            (true, ResizeStrategy::ExpandInPlace) => {
                container::expand_in_place(self.runner, path, current, to_size)?
            }
            (true, ResizeStrategy::CreateLargerImage) => {
                swap::create_larger_image(path, to_size, current, |source, temp| {
                    container::copy_into_larger(self.runner, source, temp, to_size)
                })?
            }
        }

        let grown = DiskImage { size: to_size, ..image.clone() };
        let partitions = self.expand_partitions(&grown, guest)?;
        info!("{} resized to {} bytes, partitions {}", path.display(), to_size, partitions);

        Ok(ResizeReport { previous_size: current, new_size: to_size, strategy, partitions })
    }

    fn expand_partitions(
        &self,
        image: &DiskImage,
        guest: GuestType,
    ) -> Result<PartitionExpansion, ResizeError> {
        if guest != GuestType::Mac {
            info!("leaving partitions of {} to the guest", image.path.display());
            return Ok(PartitionExpansion::Skipped("the guest grows its own file systems".into()));
        }

        if self.config.assume_non_apfs {
            info!("treating {} as holding no APFS volumes", image.path.display());
            return Ok(PartitionExpansion::Skipped("APFS expansion is disabled".into()));
        }

        match apfs::expand_partitions(self.runner, &self.config, image) {
            Ok(expansion) => Ok(expansion),
            Err(why) if why.is_fatal() => Err(why),
            Err(why) => {
                warn!("unable to expand the partitions of {}: {}", image.path.display(), why);
                Ok(PartitionExpansion::Failed(why.to_string()))
            }
        }
    }

    /// Grows every managed image in `dir` which is smaller than its declared size.
    ///
    /// Read-only devices, user-supplied images, formats which cannot be resized and
    /// images which do not exist yet are left alone. The first failure ends the pass.
    pub fn reconcile(
        &self,
        devices: &[StorageDevice],
        dir: &Path,
        guest: GuestType,
    ) -> Result<Vec<Reconciled>, ResizeError> {
        let mut reconciled = Vec::new();

        for device in devices {
            if device.read_only {
                debug!("skipping read-only device {}", device.id);
                continue;
            }

            let managed = match device.managed_image() {
                Some(managed) if managed.can_be_resized() => managed,
                _ => continue,
            };

            let image = managed.disk_image(dir);
            if !image.path.exists() {
                continue;
            }

            let current = self.current_size(&image)?;
            if managed.size <= current {
                continue;
            }

            info!("device {} is {} bytes, but declared as {}", device.id, current, managed.size);
            let report = self.resize(&image, managed.size, None, guest)?;
            reconciled.push(Reconciled {
                device: device.id.clone(),
                image: managed.resized(report.new_size),
                report,
            });
        }

        Ok(reconciled)
    }
}
