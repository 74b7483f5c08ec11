use std::{fmt, path::PathBuf, str::FromStr};

/// On-disk formats of managed disk images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    /// A byte-for-byte image of the disk.
    Raw,
    /// A read-write disk image container.
    Dmg,
    /// A sparse disk image container, which only occupies the space that has been written.
    Sparse,
    /// The immutable Apple sparse image format, which cannot be resized.
    Asif,
}

impl ImageFormat {
    pub fn display_name(self) -> &'static str {
        match self {
            ImageFormat::Raw => "Raw Image",
            ImageFormat::Dmg => "Disk Image (DMG)",
            ImageFormat::Sparse => "Sparse Image",
            ImageFormat::Asif => "Apple Silicon Image",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ImageFormat::Raw => "img",
            ImageFormat::Dmg => "dmg",
            ImageFormat::Sparse => "sparseimage",
            ImageFormat::Asif => "asif",
        }
    }

    pub fn supports_resize(self) -> bool { self != ImageFormat::Asif }

    /// Formats whose size is managed by the disk image tool rather than the file length.
    pub fn is_container(self) -> bool {
        match self {
            ImageFormat::Dmg | ImageFormat::Sparse => true,
            _ => false,
        }
    }

    pub fn recommended_strategy(self) -> ResizeStrategy {
        match self {
            ImageFormat::Raw | ImageFormat::Dmg | ImageFormat::Sparse => {
                ResizeStrategy::ExpandInPlace
            }
            ImageFormat::Asif => ResizeStrategy::CreateLargerImage,
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result { f.write_str(self.display_name()) }
}

impl FromStr for ImageFormat {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let format = match input.to_lowercase().as_str() {
            "raw" | "img" => ImageFormat::Raw,
            "dmg" => ImageFormat::Dmg,
            "sparse" | "sparseimage" => ImageFormat::Sparse,
            "asif" => ImageFormat::Asif,
            _ => return Err(format!("'{}' is not a disk image format", input)),
        };

        Ok(format)
    }
}

/// How an image is grown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeStrategy {
    /// Copy the image into a new, larger file, keeping the original as a backup until done.
    CreateLargerImage,
    /// Grow the existing file.
    ExpandInPlace,
}

impl fmt::Display for ResizeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            ResizeStrategy::CreateLargerImage => "create larger image",
            ResizeStrategy::ExpandInPlace => "expand in place",
        })
    }
}

impl FromStr for ResizeStrategy {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input {
            "in-place" | "expand-in-place" => Ok(ResizeStrategy::ExpandInPlace),
            "larger" | "create-larger-image" => Ok(ResizeStrategy::CreateLargerImage),
            _ => Err(format!("'{}' is not a resize strategy", input)),
        }
    }
}

/// The operating system installed on a disk. Only Mac guests have their partitions
/// expanded; other guests grow their file systems themselves at boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GuestType {
    Mac,
    Linux,
}

impl FromStr for GuestType {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.to_lowercase().as_str() {
            "mac" | "macos" => Ok(GuestType::Mac),
            "linux" => Ok(GuestType::Linux),
            _ => Err(format!("'{}' is not a guest type", input)),
        }
    }
}

/// A disk image to be resized, held for the duration of a single resize.
#[derive(new, Debug, Clone, PartialEq)]
pub struct DiskImage {
    pub path:   PathBuf,
    pub format: ImageFormat,
    /// Size in bytes as declared by the virtual machine's configuration.
    pub size:   u64,
}
