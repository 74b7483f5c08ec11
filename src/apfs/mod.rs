//! Growing the partitions and APFS containers of a Mac guest's disk, once the image
//! itself has been grown.

mod attach;
mod recovery;
mod resizer;
mod resolver;
mod strategies;

pub use self::{
    resizer::ContainerResizer,
    resolver::{resolve_container, ContainerTarget},
};

use self::{attach::AttachedImage, strategies::ExpansionContext};
use crate::{
    config::ResizeConfig,
    external::{diskutil, CommandError, CommandRunner, FailureKind},
    image::{DiskImage, ImageFormat},
    resize::{adjust_layout, LayoutAdjustment, PartitionExpansion, ResizeError},
};

/// Failures reporting locked volumes become [`ResizeError::ApfsVolumesLocked`].
pub(crate) fn escalate(why: CommandError, container: &str) -> ResizeError {
    match why.kind() {
        FailureKind::Locked => ResizeError::ApfsVolumesLocked { container: container.to_owned() },
        _ => why.into(),
    }
}

/// Expands the main APFS container of a grown image into its new space.
///
/// Raw images first have their recovery partition moved to the end of the disk. The
/// image is then attached without mounting, its container is resolved and grown, and it
/// is detached again on every path out of this function. An interrupted layout rewrite
/// is raised rather than reported as a failed expansion.
pub(crate) fn expand_partitions(
    runner: &dyn CommandRunner,
    config: &ResizeConfig,
    image: &DiskImage,
) -> Result<PartitionExpansion, ResizeError> {
    let raw = image.format == ImageFormat::Raw;

    if raw {
        match adjust_layout(&image.path) {
            Ok(LayoutAdjustment::Unchanged) => debug!("partition layout needs no adjustment"),
            Ok(LayoutAdjustment::Relocated { recovery_first_lba, .. }) => {
                info!("recovery partition relocated to sector {}", recovery_first_lba);
            }
            Err(why) if why.is_fatal() => return Err(why),
            Err(why) => {
                warn!("unable to adjust the partition layout of {}: {}", image.path.display(), why);
                return Ok(PartitionExpansion::Failed(format!("partition layout: {}", why)));
            }
        }
    }

    let attached = AttachedImage::attach(runner, &image.path, raw, config.detach_retry())?;
    let device = attached.identifier().to_owned();

    let listing = diskutil::apfs_list(runner, None)?;
    let target = match resolve_container(&listing, &device) {
        Some(target) => target,
        None => {
            attached.release();
            return Ok(PartitionExpansion::Skipped(format!("no APFS container found on {}", device)));
        }
    };

    // Only disk image containers can have a recovery partition in the way.
    let partitions = if image.format.is_container() {
        diskutil::list_partitions(runner, &device)
            .map_err(|why| warn!("unable to list the partitions of {}: {}", device, why))
            .ok()
    } else {
        None
    };

    let mut ctx = ExpansionContext {
        runner,
        config,
        format: image.format,
        target,
        listing,
        partitions,
        limitation: None,
    };

    let expansion = strategies::run(&mut ctx)?;
    attached.release();
    Ok(expansion)
}
