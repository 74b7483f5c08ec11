use std::{io, path::Path};

/// Attaches the image being worked on to I/O errors, keeping the original error kind.
pub trait IoContext<T> {
    fn with_context<F: FnOnce(&io::Error) -> String>(self, func: F) -> io::Result<T>;

    /// Prefixes the error with `unable to {action} {path}`.
    fn at_path(self, action: &str, path: &Path) -> io::Result<T>;
}

impl<T> IoContext<T> for io::Result<T> {
    fn with_context<F: FnOnce(&io::Error) -> String>(self, func: F) -> io::Result<T> {
        self.map_err(|why| {
            let context = func(&why);
            io::Error::new(why.kind(), format!("{}: {}", context, why))
        })
    }

    fn at_path(self, action: &str, path: &Path) -> io::Result<T> {
        self.with_context(|_| format!("unable to {} {}", action, path.display()))
    }
}
