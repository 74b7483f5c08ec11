use crate::{checked, plist, CommandError, CommandRunner};
use serde_json::Value;
use std::ffi::OsString;

/// Output of a tool in one of the two forms it can be requested in.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutput {
    /// A property list, already converted to JSON.
    Structured(Value),
    /// Human-readable text.
    Legacy(String),
}

/// A typed result that can be built from either form of a tool's output.
pub trait FromToolOutput: Sized {
    fn from_structured(value: Value) -> Result<Self, String>;

    fn from_legacy(text: &str) -> Result<Self, String>;
}

impl ToolOutput {
    pub fn parse<T: FromToolOutput>(self) -> Result<T, String> {
        match self {
            ToolOutput::Structured(value) => T::from_structured(value),
            ToolOutput::Legacy(text) => T::from_legacy(&text),
        }
    }
}

/// Runs a read-only query, preferring its property list output. When that cannot be
/// obtained or understood, the command is run again for text output.
pub fn query<T: FromToolOutput>(
    runner: &dyn CommandRunner,
    cmd: &str,
    structured_args: &[OsString],
    legacy_args: &[OsString],
) -> Result<T, CommandError> {
    let structured = checked(runner, cmd, None, structured_args).and_then(|output| {
        let value = plist::to_json(runner, &output.stdout, cmd)?;
        ToolOutput::Structured(value)
            .parse::<T>()
            .map_err(|why| CommandError::Parse { cmd: cmd.into(), why })
    });

    match structured {
        Ok(value) => Ok(value),
        Err(why) => {
            warn!("structured output of {} is unusable, falling back to text: {}", cmd, why);
            let output = checked(runner, cmd, None, legacy_args)?;
            ToolOutput::Legacy(output.stdout_lossy())
                .parse::<T>()
                .map_err(|why| CommandError::Parse { cmd: cmd.into(), why })
        }
    }
}

/// Reads the leading integer of a value such as `68719476736 B (68.7 GB)`.
pub(crate) fn leading_number(value: &str) -> Option<u64> {
    value.split_whitespace().next().and_then(|number| number.parse::<u64>().ok())
}

/// Splits a `Key: value` line, ignoring any tree-drawing prefix.
pub(crate) fn key_value(line: &str) -> Option<(&str, &str)> {
    let line = line.trim_start_matches(|c: char| c == '|' || c == '+' || c == '-' || c.is_whitespace());
    let split = line.find(':')?;
    Some((line[..split].trim(), line[split + 1..].trim()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_values() {
        assert_eq!(
            key_value("|   |   APFS Physical Store Disk:   disk4s2"),
            Some(("APFS Physical Store Disk", "disk4s2"))
        );
        assert_eq!(key_value("\tTotal Bytes: 1024"), Some(("Total Bytes", "1024")));
        assert_eq!(key_value("+-- Container disk5 1234"), None);
    }

    #[test]
    fn leading_numbers() {
        assert_eq!(leading_number("68719476736 B (68.7 GB)"), Some(68_719_476_736));
        assert_eq!(leading_number("unknown"), None);
    }
}
