use super::{ensure_space, ResizeError};
use crate::{errors::IoContext, misc, sector_io};
use std::{io, path::Path};

/// Extends a raw image to `new_size` bytes. The added space reads as zeroes.
pub(crate) fn expand_in_place(path: &Path, current_size: u64, new_size: u64) -> Result<(), ResizeError> {
    ensure_space(path, new_size - current_size)?;
    sector_io::extend_to(path, new_size).at_path("extend", path)?;
    Ok(())
}

/// Writes a `new_size` byte image at `temp` which begins with the contents of `source`.
pub(crate) fn copy_into_larger(source: &Path, temp: &Path, new_size: u64) -> io::Result<()> {
    let mut input = misc::open(source)?;
    let mut output = misc::create(temp)?;
    output
        .set_len(new_size)
        .with_context(|_| format!("unable to size {} to {} bytes", temp.display(), new_size))?;
    io::copy(&mut input, &mut output)
        .with_context(|_| format!("failed to copy {} to {}", source.display(), temp.display()))?;
    output.sync_all()
}
