//! Sector-granular access to disk image files.

#[macro_use]
extern crate derive_new;
#[macro_use]
extern crate log;

use std::{
    fs::{File, OpenOptions},
    io::{self, Read, Seek, SeekFrom, Write},
    path::Path,
};

/// Number of sectors moved per read/write cycle.
const CHUNK_SECTORS: u64 = 2048;

/// Defines the first and last sectors of a region on the disk, both inclusive.
#[derive(new, Debug, Clone, Copy, PartialEq)]
pub struct BlockCoordinates {
    pub start: u64,
    pub end:   u64,
}

impl BlockCoordinates {
    pub fn len(&self) -> u64 { self.end - self.start + 1 }

    /// Describes moving this region so that it begins at `start`.
    pub fn moved_to(&self, start: u64) -> OffsetCoordinates {
        OffsetCoordinates {
            skip:   self.start,
            offset: start as i64 - self.start as i64,
            length: self.len(),
        }
    }
}

/// Defines how many sectors to skip, how far they move, and how many there are.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OffsetCoordinates {
    pub skip:   u64,
    pub offset: i64,
    pub length: u64,
}

/// A disk image opened for sector-granular reads and writes.
pub struct SectorFile {
    file:        File,
    sector_size: u64,
}

impl SectorFile {
    pub fn open<P: AsRef<Path>>(path: P, sector_size: u64) -> io::Result<SectorFile> {
        let path = path.as_ref();
        let file = OpenOptions::new().read(true).write(true).open(path).map_err(|why| {
            io::Error::new(why.kind(), format!("unable to open {:?} for sector access: {}", path, why))
        })?;

        Ok(SectorFile { file, sector_size })
    }

    pub fn sector_size(&self) -> u64 { self.sector_size }

    /// Total length of the image in bytes.
    pub fn len(&self) -> io::Result<u64> { self.file.metadata().map(|md| md.len()) }

    /// Number of whole sectors in the image.
    pub fn sectors(&self) -> io::Result<u64> { self.len().map(|len| len / self.sector_size) }

    pub fn read_sectors(&mut self, lba: u64, count: u64) -> io::Result<Vec<u8>> {
        self.read_bytes(lba * self.sector_size, count * self.sector_size)
    }

    pub fn read_bytes(&mut self, offset: u64, len: u64) -> io::Result<Vec<u8>> {
        let mut buffer = vec![0; len as usize];
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(&mut buffer).map_err(|why| {
            io::Error::new(
                why.kind(),
                format!("short read of {} bytes at offset {}: {}", len, offset, why),
            )
        })?;
        Ok(buffer)
    }

    /// Writes `data`, which must be a whole number of sectors, starting at `lba`.
    pub fn write_sectors(&mut self, lba: u64, data: &[u8]) -> io::Result<()> {
        if data.len() as u64 % self.sector_size != 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} bytes is not a whole number of sectors", data.len()),
            ));
        }

        self.file.seek(SeekFrom::Start(lba * self.sector_size))?;
        self.file.write_all(data)
    }

    /// Overwrites the sectors within `coords` with zeroes.
    pub fn zero_sectors(&mut self, coords: BlockCoordinates) -> io::Result<()> {
        info!("zeroing sectors {} - {}", coords.start, coords.end);
        let bs = self.sector_size;
        let zeroes = vec![0; (CHUNK_SECTORS.min(coords.len()) * bs) as usize];

        self.file.seek(SeekFrom::Start(coords.start * bs))?;
        let mut remaining = coords.len();
        while remaining != 0 {
            let count = remaining.min(CHUNK_SECTORS);
            self.file.write_all(&zeroes[..(count * bs) as usize])?;
            remaining -= count;
        }

        Ok(())
    }

    /// Shifts a run of sectors either to the left or right. Overlapping source and
    /// destination regions are handled by copying in the direction of the move.
    pub fn copy_sectors(&mut self, coords: OffsetCoordinates) -> io::Result<()> {
        info!(
            "moving sectors with {} sector size: {{ skip: {}; offset: {}; length: {} }}",
            self.sector_size, coords.skip, coords.offset, coords.length
        );

        let target = coords.skip as i64 + coords.offset;
        if target < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "sectors cannot be moved before the start of the disk",
            ));
        }

        if coords.offset == 0 || coords.length == 0 {
            return Ok(());
        }

        let bs = self.sector_size;
        let target = target as u64;
        let mut buffer = vec![0; (CHUNK_SECTORS.min(coords.length) * bs) as usize];

        let chunks = (0..coords.length)
            .step_by(CHUNK_SECTORS as usize)
            .map(|start| (start, CHUNK_SECTORS.min(coords.length - start)));

        // Moving forward must begin with the last chunk, so that no source sector is
        // overwritten before it has been read.
        let chunks: Box<dyn Iterator<Item = (u64, u64)>> = if coords.offset > 0 {
            Box::new(chunks.collect::<Vec<_>>().into_iter().rev())
        } else {
            Box::new(chunks)
        };

        for (start, count) in chunks {
            let buffer = &mut buffer[..(count * bs) as usize];
            self.file.seek(SeekFrom::Start((coords.skip + start) * bs))?;
            self.file.read_exact(buffer)?;
            self.file.seek(SeekFrom::Start((target + start) * bs))?;
            self.file.write_all(buffer)?;
        }

        Ok(())
    }

    /// Flushes all written data and metadata to the storage device.
    pub fn sync(&self) -> io::Result<()> { self.file.sync_all() }
}

/// Extends the file at `path` to exactly `len` bytes. The new region reads as zeroes and
/// existing content is left untouched. Shrinking is refused.
pub fn extend_to<P: AsRef<Path>>(path: P, len: u64) -> io::Result<()> {
    let path = path.as_ref();
    let file = OpenOptions::new().write(true).open(path)?;
    let current = file.metadata()?.len();
    if len < current {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("refusing to shrink {:?} from {} to {} bytes", path, current, len),
        ));
    }

    info!("extending {} from {} to {} bytes", path.display(), current, len);
    file.set_len(len)?;
    file.sync_all()
}

#[cfg(test)]
mod tests {
    extern crate tempdir;

    use self::tempdir::TempDir;
    use super::*;
    use std::fs;

    const BS: u64 = 512;

    fn image(dir: &TempDir, sectors: u64) -> std::path::PathBuf {
        let path = dir.path().join("disk.img");
        let data: Vec<u8> = (0..sectors * BS).map(|i| (i / BS) as u8).collect();
        fs::write(&path, data).unwrap();
        path
    }

    fn sector_value(data: &[u8], lba: u64) -> u8 { data[(lba * BS) as usize] }

    #[test]
    fn read_and_write_sectors() {
        let dir = TempDir::new("sector-io").unwrap();
        let path = image(&dir, 8);
        let mut file = SectorFile::open(&path, BS).unwrap();

        assert_eq!(file.sectors().unwrap(), 8);
        assert_eq!(file.read_sectors(3, 1).unwrap(), vec![3; BS as usize]);

        file.write_sectors(5, &vec![0xEE; BS as usize]).unwrap();
        assert_eq!(file.read_sectors(5, 1).unwrap(), vec![0xEE; BS as usize]);
        assert!(file.write_sectors(5, &[0; 100]).is_err());
    }

    #[test]
    fn short_reads_are_errors() {
        let dir = TempDir::new("sector-io").unwrap();
        let path = image(&dir, 4);
        let mut file = SectorFile::open(&path, BS).unwrap();
        let err = file.read_sectors(3, 2).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn zero_range() {
        let dir = TempDir::new("sector-io").unwrap();
        let path = image(&dir, 8);
        let mut file = SectorFile::open(&path, BS).unwrap();
        file.zero_sectors(BlockCoordinates::new(2, 4)).unwrap();
        file.sync().unwrap();

        let data = fs::read(&path).unwrap();
        assert_eq!(sector_value(&data, 1), 1);
        assert!(data[(2 * BS) as usize..(5 * BS) as usize].iter().all(|&b| b == 0));
        assert_eq!(sector_value(&data, 5), 5);
    }

    #[test]
    fn overlapping_forward_move() {
        let dir = TempDir::new("sector-io").unwrap();
        let sectors = CHUNK_SECTORS * 3;
        let path = image(&dir, sectors);
        let mut file = SectorFile::open(&path, BS).unwrap();

        let region = BlockCoordinates::new(10, 10 + CHUNK_SECTORS * 2);
        file.copy_sectors(region.moved_to(110)).unwrap();

        let data = fs::read(&path).unwrap();
        for lba in 0..region.len() {
            assert_eq!(sector_value(&data, 110 + lba), (10 + lba) as u8, "lba {}", lba);
        }
    }

    #[test]
    fn overlapping_backward_move() {
        let dir = TempDir::new("sector-io").unwrap();
        let sectors = CHUNK_SECTORS * 3;
        let path = image(&dir, sectors);
        let mut file = SectorFile::open(&path, BS).unwrap();

        let region = BlockCoordinates::new(500, 500 + CHUNK_SECTORS + 7);
        file.copy_sectors(region.moved_to(20)).unwrap();

        let data = fs::read(&path).unwrap();
        for lba in 0..region.len() {
            assert_eq!(sector_value(&data, 20 + lba), (500 + lba) as u8, "lba {}", lba);
        }
    }

    #[test]
    fn extend_preserves_content() {
        let dir = TempDir::new("sector-io").unwrap();
        let path = image(&dir, 4);
        let before = fs::read(&path).unwrap();

        extend_to(&path, 16 * BS).unwrap();
        let after = fs::read(&path).unwrap();
        assert_eq!(after.len() as u64, 16 * BS);
        assert_eq!(&after[..before.len()], &before[..]);
        assert!(after[before.len()..].iter().all(|&b| b == 0));

        assert!(extend_to(&path, BS).is_err());
    }
}
