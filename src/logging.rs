use dirs;
use fern;
use log::{Level, LevelFilter, Record};
use std::{fmt, io, path::PathBuf};

const LOG_FILE: &str = "vmdisk.log";

/// Where the persistent log is written, when a home directory is known.
pub fn log_path() -> Option<PathBuf> { dirs::home_dir().map(|home| home.join(LOG_FILE)) }

fn location(record: &Record) -> String {
    match (record.file(), record.line()) {
        (Some(file), Some(line)) => format!(":{}:{}", file, line),
        _ => String::new(),
    }
}

fn format_line(level: Level, location: &str, message: &fmt::Arguments) -> String {
    format!("[{} vmdisk{}] {}", level, location, message)
}

/// Initializes logging at `level`.
///
/// Every record is handed to `callback`, which lets a front end count or display what
/// happened during a resize. Records are also written to stderr and appended to
/// [`log_path`], so that failed resizes of unattended machines can be diagnosed later.
pub fn log<F: Fn(Level, &str) + Send + Sync + 'static>(
    level: LevelFilter,
    callback: F,
) -> Result<(), fern::InitError> {
    let mut output = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!("{}", format_line(record.level(), &location(record), message)))
        })
        .chain(io::stderr());

    if let Some(path) = log_path() {
        match fern::log_file(&path) {
            Ok(file) => output = output.chain(file),
            Err(why) => eprintln!("unable to open log file at {}: {}", path.display(), why),
        }
    }

    fern::Dispatch::new()
        .level(level)
        .chain(fern::Output::call(move |record| callback(record.level(), &record.args().to_string())))
        .chain(output)
        .apply()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lines_carry_the_source_location() {
        let line = format_line(Level::Warn, ":src/apfs/attach.rs:45", &format_args!("detach failed"));
        assert_eq!(line, "[WARN vmdisk:src/apfs/attach.rs:45] detach failed");

        let bare = format_line(Level::Info, "", &format_args!("grown"));
        assert_eq!(bare, "[INFO vmdisk] grown");
    }
}
