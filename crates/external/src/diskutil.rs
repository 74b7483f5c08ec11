//! Partition and APFS container management through `diskutil`.

use crate::{checked, output::query, ApfsListing, CommandError, CommandRunner, PartitionListing};
use std::ffi::OsString;

const DISKUTIL: &str = "diskutil";

/// Why a volume management command was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// A volume in the target is locked by FileVault.
    Locked,
    /// The host's System Integrity Protection refused the operation.
    SecurityPolicy,
    Other,
}

/// Classifies the captured output of a failed command.
///
/// The tools report these conditions only in their messages, so this is the one place
/// where their wording is matched.
pub fn classify_failure(output: &str) -> FailureKind {
    let lower = output.to_lowercase();
    let words: Vec<&str> =
        lower.split(|c: char| !c.is_ascii_alphanumeric()).filter(|word| !word.is_empty()).collect();

    // `t` is what remains of "isn't" and "wasn't".
    let negated = |index: usize| index > 0 && ["not", "never", "t"].contains(&words[index - 1]);
    let locked = words.iter().enumerate().any(|(index, &word)| word == "locked" && !negated(index));
    if locked {
        return FailureKind::Locked;
    }

    if words.contains(&"sip")
        || lower.contains("system integrity protection")
        || lower.contains("operation not permitted")
    {
        return FailureKind::SecurityPolicy;
    }

    FailureKind::Other
}

/// Target size for an APFS container resize.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ContainerSize {
    /// Grow into all space following the container.
    Maximum,
    Bytes(u64),
}

impl ContainerSize {
    fn arg(self) -> OsString {
        match self {
            ContainerSize::Maximum => "0".into(),
            ContainerSize::Bytes(bytes) => format!("{}B", bytes).into(),
        }
    }
}

pub fn list_partitions(runner: &dyn CommandRunner, device: &str) -> Result<PartitionListing, CommandError> {
    query(runner, DISKUTIL, &["list".into(), "-plist".into(), device.into()], &[
        "list".into(),
        device.into(),
    ])
}

/// Lists APFS containers, either all of them or only the one named by `target`.
pub fn apfs_list(runner: &dyn CommandRunner, target: Option<&str>) -> Result<ApfsListing, CommandError> {
    let mut structured: Vec<OsString> = vec!["apfs".into(), "list".into(), "-plist".into()];
    let mut legacy: Vec<OsString> = vec!["apfs".into(), "list".into()];
    if let Some(target) = target {
        structured.push(target.into());
        legacy.push(target.into());
    }

    query(runner, DISKUTIL, &structured, &legacy)
}

/// Resizes an APFS container, addressed by its physical store or container reference.
pub fn resize_container(
    runner: &dyn CommandRunner,
    target: &str,
    size: ContainerSize,
) -> Result<(), CommandError> {
    checked(runner, DISKUTIL, None, &[
        "apfs".into(),
        "resizeContainer".into(),
        target.into(),
        size.arg(),
    ])
    .map(|_| ())
}

pub fn delete_container(runner: &dyn CommandRunner, reference: &str) -> Result<(), CommandError> {
    checked(runner, DISKUTIL, None, &["apfs".into(), "deleteContainer".into(), reference.into()])
        .map(|_| ())
}

/// Turns a partition into free space, which a preceding container can then grow into.
pub fn erase_to_free_space(runner: &dyn CommandRunner, partition: &str) -> Result<(), CommandError> {
    checked(runner, DISKUTIL, None, &[
        "eraseVolume".into(),
        "free".into(),
        "none".into(),
        partition.into(),
    ])
    .map(|_| ())
}
