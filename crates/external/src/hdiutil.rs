//! Disk image management through `hdiutil`.

use crate::{
    checked,
    output::{key_value, leading_number, query, FromToolOutput, ToolOutput},
    plist, CommandError, CommandRunner, Retry,
};
use serde_json::Value;
use std::{ffi::OsString, path::Path};

const HDIUTIL: &str = "hdiutil";

/// The whole-disk device node created by attaching an image.
#[derive(Debug, Clone, PartialEq)]
pub struct AttachedDisk {
    /// Device node path, such as `/dev/disk4`.
    pub node: String,
}

impl AttachedDisk {
    /// The device identifier, such as `disk4`.
    pub fn identifier(&self) -> &str { self.node.trim_start_matches("/dev/") }
}

/// `disk4` is a whole disk, while `disk4s2` is one of its slices.
fn is_whole_disk(identifier: &str) -> bool {
    identifier
        .strip_prefix("disk")
        .map_or(false, |rest| !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()))
}

#[derive(Deserialize)]
struct RawAttach {
    #[serde(rename = "system-entities", default)]
    system_entities: Vec<RawEntity>,
}

#[derive(Deserialize)]
struct RawEntity {
    #[serde(rename = "dev-entry")]
    dev_entry: Option<String>,
}

impl FromToolOutput for AttachedDisk {
    fn from_structured(value: Value) -> Result<Self, String> {
        let raw: RawAttach = serde_json::from_value(value).map_err(|why| why.to_string())?;
        raw.system_entities
            .into_iter()
            .filter_map(|entity| entity.dev_entry)
            .find(|node| is_whole_disk(node.trim_start_matches("/dev/")))
            .map(|node| AttachedDisk { node })
            .ok_or_else(|| "no whole-disk device entry in output".into())
    }

    fn from_legacy(text: &str) -> Result<Self, String> {
        text.split(|c: char| c.is_whitespace() || c == '<' || c == '>')
            .filter(|token| token.starts_with("/dev/disk"))
            .find(|node| is_whole_disk(node.trim_start_matches("/dev/")))
            .map(|node| AttachedDisk { node: node.into() })
            .ok_or_else(|| "no /dev/disk node in output".into())
    }
}

/// Attaches an image as a device without mounting any of its volumes. Raw images are
/// attached through the raw disk image class so that any file extension is accepted.
pub fn attach(runner: &dyn CommandRunner, image: &Path, raw: bool) -> Result<AttachedDisk, CommandError> {
    let mut args: Vec<OsString> = vec!["attach".into()];
    if raw {
        args.push("-imagekey".into());
        args.push("diskimage-class=CRawDiskImage".into());
    }
    args.extend_from_slice(&["-nomount".into(), "-plist".into(), image.into()]);

    let output = checked(runner, HDIUTIL, None, &args)?;

    // The image is attached at this point, so the command is never repeated. When the
    // property list cannot be decoded, the device node is picked out of its text.
    let parsed = plist::to_json(runner, &output.stdout, "hdiutil attach")
        .map_err(|why| why.to_string())
        .and_then(|value| ToolOutput::Structured(value).parse::<AttachedDisk>());

    match parsed {
        Ok(disk) => Ok(disk),
        Err(why) => {
            warn!("unable to decode hdiutil attach output, scanning its text: {}", why);
            ToolOutput::Legacy(output.stdout_lossy())
                .parse::<AttachedDisk>()
                .map_err(|why| CommandError::Parse { cmd: "hdiutil attach".into(), why })
        }
    }
}

/// Detaches an attached image, retrying while the device is busy.
pub fn detach(runner: &dyn CommandRunner, node: &str, retry: Retry) -> Result<(), CommandError> {
    retry.retry_until_ok("hdiutil detach", || {
        checked(runner, HDIUTIL, None, &["detach".into(), node.into()]).map(|_| ())
    })
}

/// Resizes a disk image container to `sectors` 512-byte sectors.
pub fn resize(runner: &dyn CommandRunner, image: &Path, sectors: u64) -> Result<(), CommandError> {
    checked(
        runner,
        HDIUTIL,
        None,
        &["resize".into(), "-size".into(), format!("{}s", sectors).into(), image.into()],
    )
    .map(|_| ())
}

/// Logical size of a disk image, as reported by `hdiutil imageinfo`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageSize(pub u64);

impl FromToolOutput for ImageSize {
    fn from_structured(value: Value) -> Result<Self, String> {
        value
            .get("Total Bytes")
            .or_else(|| value.get("Size Information").and_then(|info| info.get("Total Bytes")))
            .and_then(Value::as_u64)
            .map(ImageSize)
            .ok_or_else(|| "Total Bytes missing from image information".into())
    }

    fn from_legacy(text: &str) -> Result<Self, String> {
        text.lines()
            .filter_map(key_value)
            .find(|(key, _)| *key == "Total Bytes")
            .and_then(|(_, value)| leading_number(value))
            .map(ImageSize)
            .ok_or_else(|| "Total Bytes missing from image information".into())
    }
}

pub fn image_size(runner: &dyn CommandRunner, image: &Path) -> Result<u64, CommandError> {
    query::<ImageSize>(
        runner,
        HDIUTIL,
        &["imageinfo".into(), "-plist".into(), image.into()],
        &["imageinfo".into(), image.into()],
    )
    .map(|size| size.0)
}
