use crate::{
    external::{hdiutil, hdiutil::AttachedDisk, CommandRunner, Retry},
    resize::ResizeError,
};
use std::path::Path;

/// An image attached as a device for the duration of partition expansion. The device
/// is detached when this is dropped, if it was not detached already.
pub(crate) struct AttachedImage<'a> {
    runner:   &'a dyn CommandRunner,
    disk:     AttachedDisk,
    retry:    Retry,
    attached: bool,
}

impl<'a> AttachedImage<'a> {
    pub fn attach(
        runner: &'a dyn CommandRunner,
        path: &Path,
        raw: bool,
        retry: Retry,
    ) -> Result<AttachedImage<'a>, ResizeError> {
        let disk = hdiutil::attach(runner, path, raw)?;
        info!("attached {} at {}", path.display(), disk.node);
        Ok(AttachedImage { runner, disk, retry, attached: true })
    }

    /// The device identifier of the whole disk, such as `disk4`.
    pub fn identifier(&self) -> &str { self.disk.identifier() }

    pub fn detach(&mut self) -> Result<(), ResizeError> {
        if self.attached {
            info!("detaching {}", self.disk.node);
            hdiutil::detach(self.runner, &self.disk.node, self.retry)?;
            self.attached = false;
        }

        Ok(())
    }

    /// Detaches the device once its partitions have been expanded. The expansion has
    /// already happened by then, so failing to detach is only logged.
    pub fn release(mut self) {
        if let Err(why) = self.detach() {
            warn!("unable to detach {} after expanding its partitions: {}", self.disk.node, why);
            self.attached = false;
        }
    }
}

impl<'a> Drop for AttachedImage<'a> {
    fn drop(&mut self) {
        if let Err(why) = self.detach() {
            error!("unable to detach {}: {}", self.disk.node, why);
        }
    }
}
