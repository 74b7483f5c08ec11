//! A collection of external commands used to inspect and manipulate disk images.

extern crate failure;
#[macro_use]
extern crate failure_derive;
#[macro_use]
extern crate log;
extern crate serde;
#[macro_use]
extern crate serde_derive;
#[cfg_attr(test, macro_use)]
extern crate serde_json;
#[macro_use]
extern crate smart_default;

pub mod apfs;
pub mod diskutil;
pub mod hdiutil;
mod output;
pub mod partitions;
pub mod plist;
mod retry;

pub use self::{
    apfs::{ApfsContainer, ApfsListing, ApfsVolume, PhysicalStore},
    diskutil::{classify_failure, ContainerSize, FailureKind},
    output::{query, FromToolOutput, ToolOutput},
    partitions::{PartitionInfo, PartitionListing},
    retry::Retry,
};

use std::{
    ffi::OsString,
    io::{self, Write},
    process::{Command, Stdio},
    thread,
};

/// The captured result of an external command, fully buffered after the process exited.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandOutput {
    /// Exit code, or `None` if the process was terminated by a signal.
    pub code:   Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CommandOutput {
    pub fn success(&self) -> bool { self.code == Some(0) }

    pub fn stdout_lossy(&self) -> String { String::from_utf8_lossy(&self.stdout).into_owned() }

    /// Standard error followed by standard output, for diagnostics.
    pub fn combined(&self) -> String {
        let mut text = String::from_utf8_lossy(&self.stderr).into_owned();
        if !self.stdout.is_empty() {
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str(&String::from_utf8_lossy(&self.stdout));
        }
        text.trim_end().to_owned()
    }
}

#[cfg_attr(rustfmt, rustfmt_skip)]
#[derive(Debug, Fail)]
pub enum CommandError {
    #[fail(display = "failed to spawn {}: {}", cmd, why)]
    Spawn { cmd: String, why: io::Error },
    #[fail(display = "{} failed with exit code {}: {}", cmd, code, output)]
    Status { cmd: String, code: i32, output: String },
    #[fail(display = "unable to parse output of {}: {}", cmd, why)]
    Parse { cmd: String, why: String },
}

impl CommandError {
    pub fn command(&self) -> &str {
        match self {
            CommandError::Spawn { cmd, .. }
            | CommandError::Status { cmd, .. }
            | CommandError::Parse { cmd, .. } => cmd,
        }
    }

    /// The exit code of the command, or `-1` when it never produced a usable result.
    pub fn code(&self) -> i32 {
        match self {
            CommandError::Status { code, .. } => *code,
            _ => -1,
        }
    }

    /// Captured tool output, or a description of why there was none.
    pub fn output(&self) -> String {
        match self {
            CommandError::Spawn { why, .. } => why.to_string(),
            CommandError::Status { output, .. } => output.clone(),
            CommandError::Parse { why, .. } => why.clone(),
        }
    }

    pub fn kind(&self) -> FailureKind { classify_failure(&self.output()) }
}

/// The seam through which every external command is executed.
pub trait CommandRunner {
    fn run(&self, cmd: &str, args: &[OsString], stdin: Option<&[u8]>) -> io::Result<CommandOutput>;
}

/// Executes commands on the host.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, cmd: &str, args: &[OsString], stdin: Option<&[u8]>) -> io::Result<CommandOutput> {
        exec(cmd, stdin, args)
    }
}

/// A generic function for executing a variety of external commands, buffering their output.
pub fn exec(cmd: &str, stdin: Option<&[u8]>, args: &[OsString]) -> io::Result<CommandOutput> {
    info!("executing {} with {:?}", cmd, args);

    let mut child = Command::new(cmd)
        .args(args)
        .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    // Input is fed from another thread so that a child filling its output pipe cannot
    // block on us while we block on its input.
    let writer = match (stdin, child.stdin.take()) {
        (Some(input), Some(mut pipe)) => {
            let input = input.to_vec();
            Some(thread::spawn(move || pipe.write_all(&input)))
        }
        _ => None,
    };

    let output = child.wait_with_output()?;
    if let Some(writer) = writer {
        match writer.join() {
            Ok(result) => result?,
            Err(_) => {
                return Err(io::Error::new(io::ErrorKind::Other, "stdin writer thread panicked"))
            }
        }
    }

    Ok(CommandOutput { code: output.status.code(), stdout: output.stdout, stderr: output.stderr })
}

/// Runs a command through `runner`, treating a non-zero exit status as an error.
pub fn checked(
    runner: &dyn CommandRunner,
    cmd: &str,
    stdin: Option<&[u8]>,
    args: &[OsString],
) -> Result<CommandOutput, CommandError> {
    let command = describe(cmd, args);
    let output = runner
        .run(cmd, args, stdin)
        .map_err(|why| CommandError::Spawn { cmd: command.clone(), why })?;

    if output.success() {
        Ok(output)
    } else {
        let combined = output.combined();
        debug!("{} failed: {}", command, combined);
        Err(CommandError::Status { cmd: command, code: output.code.unwrap_or(-1), output: combined })
    }
}

/// The program name and its leading subcommand words, without paths or sizes.
pub(crate) fn describe(cmd: &str, args: &[OsString]) -> String {
    let mut description = cmd.to_owned();
    for arg in args.iter().map(|arg| arg.to_string_lossy()) {
        if arg.starts_with('-') || arg.contains('/') || arg.chars().next().map_or(true, |c| c.is_ascii_digit()) {
            break;
        }
        description.push(' ');
        description.push_str(&arg);
    }
    description
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_descriptions() {
        let args: Vec<OsString> = vec!["apfs".into(), "resizeContainer".into(), "disk4s2".into(), "0".into()];
        assert_eq!(describe("diskutil", &args), "diskutil apfs resizeContainer disk4s2");
        let args: Vec<OsString> = vec!["resize".into(), "-size".into(), "2048s".into()];
        assert_eq!(describe("hdiutil", &args), "hdiutil resize");
    }

    #[test]
    fn combined_output_puts_stderr_first() {
        let output = CommandOutput {
            code:   Some(1),
            stdout: b"started\n".to_vec(),
            stderr: b"Error: volume is locked".to_vec(),
        };
        assert_eq!(output.combined(), "Error: volume is locked\nstarted");
        assert!(!output.success());
    }

    #[test]
    fn exec_captures_output_and_stdin() {
        let output = exec("cat", Some(b"hello"), &[]).unwrap();
        assert!(output.success());
        assert_eq!(output.stdout, b"hello");
    }

    #[test]
    fn exec_missing_command() {
        assert_eq!(
            exec("vmdisk-no-such-command", None, &[]).unwrap_err().kind(),
            io::ErrorKind::NotFound
        );
    }

    #[test]
    fn checked_reports_exit_code() {
        let err = checked(&SystemRunner, "sh", None, &["-c".into(), "echo oops >&2; exit 3".into()])
            .unwrap_err();
        assert_eq!(err.code(), 3);
        assert_eq!(err.command(), "sh");
        assert_eq!(err.output(), "oops");
    }
}
