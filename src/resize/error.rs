use crate::{external::CommandError, gpt::GptError, image::ImageFormat};
use std::{io, path::PathBuf};

/// Errors which end a resize.
#[cfg_attr(rustfmt, rustfmt_skip)]
#[derive(Debug, Fail)]
pub enum ResizeError {
    #[fail(display = "disk image not found at {:?}", path)]
    ImageNotFound { path: PathBuf },
    #[fail(display = "resizing is not supported for the {} format", format)]
    UnsupportedFormat { format: ImageFormat },
    #[fail(display = "insufficient disk space: {} bytes are required, but only {} are available", required, available)]
    InsufficientSpace { required: u64, available: u64 },
    #[fail(display = "cannot shrink disk image from {} to {} bytes: only expansion is supported", current, requested)]
    CannotShrink { current: u64, requested: u64 },
    #[fail(display = "invalid size: {} bytes", size)]
    InvalidSize { size: u64 },
    #[fail(display = "command '{}' failed with exit code {}: {}", command, code, output)]
    ExternalToolFailed { command: String, code: i32, output: String },
    #[fail(display = "APFS container {} has locked volumes: unlock them in the guest before resizing", container)]
    ApfsVolumesLocked { container: String },
    #[fail(display = "unrecognized partition layout: {}", why)]
    UnrecognizedLayout { why: String },
    #[fail(display = "partition layout of {:?} was left partially rewritten: {}", path, why)]
    LayoutInterrupted { path: PathBuf, why: io::Error },
    #[fail(display = "I/O error: {}", why)]
    Io { why: io::Error },
}

impl ResizeError {
    /// Whether the error must end a resize even after the image itself has grown.
    ///
    /// Locked volumes need the user to act in the guest, and an interrupted layout
    /// rewrite leaves tables on disk which no longer describe the partitions.
    pub fn is_fatal(&self) -> bool {
        match self {
            ResizeError::ApfsVolumesLocked { .. } | ResizeError::LayoutInterrupted { .. } => true,
            _ => false,
        }
    }
}

impl From<CommandError> for ResizeError {
    fn from(why: CommandError) -> ResizeError {
        ResizeError::ExternalToolFailed {
            command: why.command().to_owned(),
            code:    why.code(),
            output:  why.output(),
        }
    }
}

impl From<io::Error> for ResizeError {
    fn from(why: io::Error) -> ResizeError { ResizeError::Io { why } }
}

impl From<GptError> for ResizeError {
    fn from(why: GptError) -> ResizeError { ResizeError::UnrecognizedLayout { why: why.to_string() } }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_errors() {
        assert!(ResizeError::ApfsVolumesLocked { container: "disk5".into() }.is_fatal());
        let interrupted = ResizeError::LayoutInterrupted {
            path: "/images/Disk.img".into(),
            why:  io::Error::new(io::ErrorKind::Other, "device went away"),
        };
        assert!(interrupted.is_fatal());
        assert!(!ResizeError::UnrecognizedLayout { why: "no recovery partition".into() }.is_fatal());
        assert!(!ResizeError::Io { why: io::Error::new(io::ErrorKind::NotFound, "gone") }.is_fatal());
    }
}
