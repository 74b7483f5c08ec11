//! A scripted stand-in for the host's command line tools.

use crate::external::{CommandOutput, CommandRunner};
use std::{cell::RefCell, ffi::OsString, io};

/// Records every command it is asked to run, answering from a responder which is given
/// the full command line. `plutil` echoes its input, so property list fixtures may be
/// written as JSON; those conversions are not recorded.
pub struct MockRunner {
    calls:     RefCell<Vec<String>>,
    responder: Box<dyn Fn(&str) -> CommandOutput>,
}

impl MockRunner {
    pub fn new<F: Fn(&str) -> CommandOutput + 'static>(responder: F) -> MockRunner {
        MockRunner { calls: RefCell::new(Vec::new()), responder: Box::new(responder) }
    }

    /// A runner which fails the test if any command is run.
    pub fn unused() -> MockRunner {
        MockRunner::new(|line| panic!("unexpected command: {}", line))
    }

    pub fn calls(&self) -> Vec<String> { self.calls.borrow().clone() }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls.borrow().iter().filter(|call| call.starts_with(prefix)).count()
    }
}

impl CommandRunner for MockRunner {
    fn run(&self, cmd: &str, args: &[OsString], stdin: Option<&[u8]>) -> io::Result<CommandOutput> {
        if cmd == "plutil" {
            return Ok(ok(&String::from_utf8_lossy(stdin.unwrap_or_default())));
        }

        let mut line = cmd.to_owned();
        for arg in args {
            line.push(' ');
            line.push_str(&arg.to_string_lossy());
        }

        self.calls.borrow_mut().push(line.clone());
        Ok((self.responder)(&line))
    }
}

pub fn ok(stdout: &str) -> CommandOutput {
    CommandOutput { code: Some(0), stdout: stdout.as_bytes().to_vec(), stderr: Vec::new() }
}

pub fn json(value: serde_json::Value) -> CommandOutput { ok(&value.to_string()) }

pub fn fail(code: i32, stderr: &str) -> CommandOutput {
    CommandOutput { code: Some(code), stdout: Vec::new(), stderr: stderr.as_bytes().to_vec() }
}
