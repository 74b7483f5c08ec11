use super::{ensure_space, ResizeError};
use crate::misc;
use std::path::Path;

/// Replaces the image at `path` with a larger copy produced by `build`, which is given
/// the original, moved aside as a backup, and the path of the replacement to write.
///
/// Both the new and the old image must fit on the host at once. If the replacement
/// cannot be built or moved into place, it is removed and the backup is moved back.
pub(crate) fn create_larger_image<F>(
    path: &Path,
    new_size: u64,
    current_size: u64,
    build: F,
) -> Result<(), ResizeError>
where
    F: FnOnce(&Path, &Path) -> Result<(), ResizeError>,
{
    ensure_space(path, new_size + current_size)?;

    let backup = misc::with_suffix(path, "backup");
    let temp = misc::with_suffix(path, "resizing");
    info!("creating a larger copy of {} at {}", path.display(), temp.display());

    misc::rename(path, &backup)?;
    let result =
        build(&backup, &temp).and_then(|_| misc::rename(&temp, path).map_err(ResizeError::from));

    if let Err(why) = result {
        warn!("restoring {} after failed resize: {}", path.display(), why);
        if let Err(cleanup) = misc::remove_if_exists(&temp) {
            error!("unable to remove {}: {}", temp.display(), cleanup);
        }

        if backup.exists() {
            if let Err(restore) = misc::rename(&backup, path) {
                error!("unable to restore {} from {}: {}", path.display(), backup.display(), restore);
            }
        }

        return Err(why);
    }

    // The larger image is in place from here on.
    if let Err(why) = misc::remove_if_exists(&backup) {
        warn!("{} was resized, but its backup remains: {}", path.display(), why);
    }

    Ok(())
}
