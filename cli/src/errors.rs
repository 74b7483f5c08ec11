use std::{io, path::PathBuf};
use vmdisk::ResizeError;

#[derive(Debug, Fail)]
pub(crate) enum CliError {
    #[fail(display = "{}", why)]
    Resize { why: ResizeError },
    #[fail(display = "missing required argument '{}'", arg)]
    MissingArg { arg: &'static str },
    #[fail(display = "'{}' is not a valid size: use a byte count or a B, K, M, G or T suffix", size)]
    InvalidSize { size: String },
    #[fail(display = "argument '{}' is not a number", arg)]
    ArgNaN { arg: String },
    #[fail(display = "{}", why)]
    InvalidValue { why: String },
    #[fail(display = "unable to infer the format of {:?}: pass --format", path)]
    UnknownFormat { path: PathBuf },
    #[fail(display = "unable to read {:?}: {}", path, why)]
    Read { path: PathBuf, why: io::Error },
    #[fail(display = "unable to write {:?}: {}", path, why)]
    Write { path: PathBuf, why: io::Error },
    #[fail(display = "invalid device descriptors in {:?}: {}", path, why)]
    Descriptors { path: PathBuf, why: serde_json::Error },
}

impl From<ResizeError> for CliError {
    fn from(why: ResizeError) -> CliError { CliError::Resize { why } }
}

impl From<String> for CliError {
    fn from(why: String) -> CliError { CliError::InvalidValue { why } }
}
