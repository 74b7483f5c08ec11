//! The storage devices of a virtual machine, as far as resizing is concerned.

use crate::image::{DiskImage, ImageFormat};
use std::path::{Path, PathBuf};

/// A disk image whose file is kept within the virtual machine's bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagedImage {
    pub id:       String,
    /// File name within the bundle, without its extension.
    pub filename: String,
    /// Declared size in bytes.
    pub size:     u64,
    pub format:   ImageFormat,
}

impl ManagedImage {
    pub fn can_be_resized(&self) -> bool { self.format.supports_resize() }

    pub fn path_in(&self, dir: &Path) -> PathBuf {
        dir.join(format!("{}.{}", self.filename, self.format.extension()))
    }

    pub fn disk_image(&self, dir: &Path) -> DiskImage {
        DiskImage::new(self.path_in(dir), self.format, self.size)
    }

    /// This image with a new declared size.
    pub fn resized(&self, size: u64) -> ManagedImage { ManagedImage { size, ..self.clone() } }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBacking {
    Managed(ManagedImage),
    /// An image supplied by the user, which is never resized.
    Custom(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageDevice {
    pub id:        String,
    #[serde(default)]
    pub boot:      bool,
    #[serde(default)]
    pub read_only: bool,
    pub backing:   StorageBacking,
}

impl StorageDevice {
    pub fn managed_image(&self) -> Option<&ManagedImage> {
        match self.backing {
            StorageBacking::Managed(ref image) => Some(image),
            StorageBacking::Custom(_) => None,
        }
    }

    /// A device can be resized when it is a managed image of a resizable format whose
    /// file already exists.
    pub fn can_be_resized(&self, dir: &Path) -> bool {
        self.managed_image()
            .map_or(false, |image| image.can_be_resized() && image.path_in(dir).exists())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResizeCapability {
    pub device:     String,
    pub format:     ImageFormat,
    pub can_resize: bool,
}

/// Reports whether each managed image in `dir` could be resized. Images which have not
/// been created yet are left out, as they will be created at their declared size.
pub fn resize_capability(devices: &[StorageDevice], dir: &Path) -> Vec<ResizeCapability> {
    devices
        .iter()
        .filter_map(|device| {
            let image = device.managed_image()?;
            if !image.path_in(dir).exists() {
                return None;
            }

            Some(ResizeCapability {
                device:     device.id.clone(),
                format:     image.format,
                can_resize: image.can_be_resized(),
            })
        })
        .collect()
}
