//! Property lists are decoded by handing them to `plutil`, which re-encodes them as JSON.

use crate::{checked, CommandError, CommandRunner};
use serde_json::Value;

/// Converts a property list to a JSON value. `origin` names the command that produced it.
pub fn to_json(runner: &dyn CommandRunner, plist: &[u8], origin: &str) -> Result<Value, CommandError> {
    let output = checked(
        runner,
        "plutil",
        Some(plist),
        &["-convert".into(), "json".into(), "-o".into(), "-".into(), "-".into()],
    )?;

    serde_json::from_slice(&output.stdout)
        .map_err(|why| CommandError::Parse { cmd: origin.into(), why: why.to_string() })
}
