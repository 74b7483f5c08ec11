//! Miscellanious file functions used by vmdisk and its crates.

extern crate libc;
#[macro_use]
extern crate log;

use std::{
    ffi::{CString, OsStr, OsString},
    fs::{self, File},
    io, mem,
    os::unix::ffi::OsStrExt,
    path::{Path, PathBuf},
};

pub fn open<P: AsRef<Path>>(path: P) -> io::Result<File> {
    File::open(&path).map_err(|why| {
        io::Error::new(why.kind(), format!("unable to open file at {:?}: {}", path.as_ref(), why))
    })
}

pub fn create<P: AsRef<Path>>(path: P) -> io::Result<File> {
    File::create(&path).map_err(|why| {
        io::Error::new(why.kind(), format!("unable to create file at {:?}: {}", path.as_ref(), why))
    })
}

pub fn cp<P: AsRef<Path>, Q: AsRef<Path>>(src: P, dst: Q) -> io::Result<u64> {
    let src = src.as_ref();
    let dst = dst.as_ref();
    io::copy(&mut open(src)?, &mut create(dst)?).map_err(|why| {
        io::Error::new(why.kind(), format!("failed to copy {:?} to {:?}: {}", src, dst, why))
    })
}

pub fn rename<P: AsRef<Path>, Q: AsRef<Path>>(src: P, dst: Q) -> io::Result<()> {
    let src = src.as_ref();
    let dst = dst.as_ref();
    info!("moving {} to {}", src.display(), dst.display());
    fs::rename(src, dst).map_err(|why| {
        io::Error::new(why.kind(), format!("failed to move {:?} to {:?}: {}", src, dst, why))
    })
}

/// Removes the file at `path`, returning whether a file was there to remove.
pub fn remove_if_exists<P: AsRef<Path>>(path: P) -> io::Result<bool> {
    let path = path.as_ref();
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(ref why) if why.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(why) => Err(io::Error::new(
            why.kind(),
            format!("failed to remove {:?}: {}", path, why),
        )),
    }
}

/// Concatenates an array of `&OsStr` into a new `OsString`.
pub fn concat_osstr(input: &[&OsStr]) -> OsString {
    let mut output = OsString::with_capacity(input.iter().fold(0, |acc, c| acc + c.len()));

    input.iter().for_each(|comp| output.push(comp));
    output
}

/// Appends `.suffix` to the file name of `path`, so `disk.img` becomes `disk.img.suffix`.
pub fn with_suffix<P: AsRef<Path>>(path: P, suffix: &str) -> PathBuf {
    PathBuf::from(concat_osstr(&[path.as_ref().as_os_str(), ".".as_ref(), suffix.as_ref()]))
}

/// Bytes available to unprivileged users on the file system containing `path`.
pub fn available_space<P: AsRef<Path>>(path: P) -> io::Result<u64> {
    let path = path.as_ref();
    let cpath = CString::new(path.as_os_str().as_bytes()).map_err(|_| {
        io::Error::new(io::ErrorKind::InvalidInput, format!("{:?} contains a null byte", path))
    })?;

    let mut stat: libc::statvfs = unsafe { mem::zeroed() };
    if unsafe { libc::statvfs(cpath.as_ptr(), &mut stat) } != 0 {
        let why = io::Error::last_os_error();
        return Err(io::Error::new(
            why.kind(),
            format!("unable to query free space of {:?}: {}", path, why),
        ));
    }

    Ok(stat.f_bavail as u64 * stat.f_frsize as u64)
}

#[cfg(test)]
mod tests {
    extern crate tempdir;

    use self::tempdir::TempDir;
    use super::*;

    #[test]
    fn suffix_is_appended_to_file_name() {
        assert_eq!(with_suffix("/vm/Disk.img", "backup"), PathBuf::from("/vm/Disk.img.backup"));
        assert_eq!(with_suffix("disk.dmg", "resizing"), PathBuf::from("disk.dmg.resizing"));
    }

    #[test]
    fn copy_rename_remove() {
        let dir = TempDir::new("vmdisk-utils").unwrap();
        let src = dir.path().join("a");
        let dst = dir.path().join("b");
        fs::write(&src, b"contents").unwrap();

        assert_eq!(cp(&src, &dst).unwrap(), 8);
        assert_eq!(fs::read(&dst).unwrap(), b"contents");

        rename(&dst, dir.path().join("c")).unwrap();
        assert!(!dst.exists());

        assert!(remove_if_exists(dir.path().join("c")).unwrap());
        assert!(!remove_if_exists(dir.path().join("c")).unwrap());
    }

    #[test]
    fn missing_files_keep_error_kind() {
        let dir = TempDir::new("vmdisk-utils").unwrap();
        let err = open(dir.path().join("missing")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn free_space_is_reported() {
        let dir = TempDir::new("vmdisk-utils").unwrap();
        assert!(available_space(dir.path()).unwrap() > 0);
        assert!(available_space(dir.path().join("nope")).is_err());
    }
}
