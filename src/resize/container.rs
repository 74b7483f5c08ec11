use super::{ensure_space, ResizeError};
use crate::{
    external::{hdiutil, CommandRunner},
    gpt::SECTOR_SIZE,
    misc,
};
use std::path::Path;

/// Grows a disk image container with `hdiutil resize`.
pub(crate) fn expand_in_place(
    runner: &dyn CommandRunner,
    path: &Path,
    current_size: u64,
    new_size: u64,
) -> Result<(), ResizeError> {
    ensure_space(path, new_size - current_size)?;
    hdiutil::resize(runner, path, new_size / SECTOR_SIZE)?;
    Ok(())
}

/// Copies the container at `source` to `temp` and grows the copy.
pub(crate) fn copy_into_larger(
    runner: &dyn CommandRunner,
    source: &Path,
    temp: &Path,
    new_size: u64,
) -> Result<(), ResizeError> {
    misc::cp(source, temp)?;
    hdiutil::resize(runner, temp, new_size / SECTOR_SIZE)?;
    Ok(())
}
