//! Relocates the recovery partition of a grown raw image to the end of the disk, and
//! extends the main APFS container partition into the space between them.

use super::ResizeError;
use crate::{
    errors::IoContext,
    gpt::{GptEntries, GptHeader, PRIMARY_HEADER_LBA, SECTOR_SIZE},
    sector_io::{BlockCoordinates, OffsetCoordinates, SectorFile},
};
use std::{io, path::Path};

/// Partitions are placed on this sector boundary.
const ALIGNMENT: u64 = 8;

/// Sectors kept free between the last usable sector and the backup entry array.
const TAIL_GAP: u64 = 8;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LayoutAdjustment {
    /// There was no space to grow into.
    Unchanged,
    Relocated { main_last_lba: u64, recovery_first_lba: u64, recovery_last_lba: u64 },
}

fn unrecognized<S: Into<String>>(why: S) -> ResizeError {
    ResizeError::UnrecognizedLayout { why: why.into() }
}

/// The sector operations which rewrite a partition layout.
pub(crate) trait LayoutWriter {
    fn copy_sectors(&mut self, coords: OffsetCoordinates) -> io::Result<()>;
    fn write_sectors(&mut self, lba: u64, data: &[u8]) -> io::Result<()>;
    fn zero_sectors(&mut self, coords: BlockCoordinates) -> io::Result<()>;
    fn sync(&mut self) -> io::Result<()>;
}

impl LayoutWriter for SectorFile {
    fn copy_sectors(&mut self, coords: OffsetCoordinates) -> io::Result<()> {
        SectorFile::copy_sectors(self, coords)
    }

    fn write_sectors(&mut self, lba: u64, data: &[u8]) -> io::Result<()> {
        SectorFile::write_sectors(self, lba, data)
    }

    fn zero_sectors(&mut self, coords: BlockCoordinates) -> io::Result<()> {
        SectorFile::zero_sectors(self, coords)
    }

    fn sync(&mut self) -> io::Result<()> { SectorFile::sync(self) }
}

/// A fully encoded relocation, computed before anything on disk is touched.
pub(crate) struct Relocation {
    old_region:         BlockCoordinates,
    main_last:          u64,
    recovery_first:     u64,
    recovery_last:      u64,
    entries_lba:        u64,
    backup_entries_lba: u64,
    backup_lba:         u64,
    entry_bytes:        Vec<u8>,
    primary_sector:     Vec<u8>,
    backup_sector:      Vec<u8>,
    /// The previous backup table, when it now lies within the extended container.
    stale_backup:       Option<BlockCoordinates>,
}

impl Relocation {
    /// Reads the GPT of `file` and computes where its partitions move to, if anywhere.
    fn plan(file: &mut SectorFile, path: &Path) -> Result<Option<Relocation>, ResizeError> {
        let ss = SECTOR_SIZE;
        let total = file.sectors()?;

        let header = GptHeader::parse(
            &file.read_sectors(PRIMARY_HEADER_LBA, 1).at_path("read the GPT header of", path)?,
        )?;

        let entries_offset = header
            .partition_entries_lba
            .checked_mul(ss)
            .ok_or_else(|| unrecognized("partition entries lie beyond the end of the disk"))?;
        let entry_bytes = file
            .read_bytes(entries_offset, header.entries_len() as u64)
            .at_path("read the GPT entries of", path)?;
        let mut entries = GptEntries::for_header(&header, &entry_bytes)?;

        let main_index =
            entries.main_container().ok_or_else(|| unrecognized("no APFS container partition"))?;
        let recovery_index = entries.recovery().ok_or_else(|| unrecognized("no recovery partition"))?;
        let main = entries.get(main_index).cloned().ok_or_else(|| unrecognized("missing main entry"))?;
        let recovery =
            entries.get(recovery_index).cloned().ok_or_else(|| unrecognized("missing recovery entry"))?;

        if recovery.first_lba <= main.last_lba {
            return Err(unrecognized("recovery partition does not follow the APFS container"));
        }

        let trailing = entries.iter().enumerate().any(|(index, entry)| {
            index != recovery_index && entry.is_valid() && entry.last_lba >= recovery.first_lba
        });
        if trailing {
            return Err(unrecognized("a partition follows the recovery partition"));
        }

        let entries_sectors = header.entries_sectors(ss);
        let length = recovery.sector_count();
        let required = header
            .first_usable_lba
            .checked_add(entries_sectors)
            .and_then(|sectors| sectors.checked_add(TAIL_GAP))
            .and_then(|sectors| sectors.checked_add(length))
            .and_then(|sectors| sectors.checked_add(1))
            .ok_or_else(|| unrecognized("partition table fields exceed the addressable disk"))?;
        if total < required {
            return Err(unrecognized(format!("{} sectors is too small for the partition layout", total)));
        }

        let backup_lba = total - 1;
        let backup_entries_lba = backup_lba - entries_sectors;
        let last_usable = backup_entries_lba - TAIL_GAP;

        let recovery_first = (last_usable + 1 - length) / ALIGNMENT * ALIGNMENT;
        let recovery_last = recovery_first + length - 1;

        if recovery_first <= main.last_lba || recovery_first <= recovery.first_lba {
            info!("no space to grow into after the APFS container of {}", path.display());
            return Ok(None);
        }

        let main_last = recovery_first - 1;
        if let Some(entry) = entries.get_mut(main_index) {
            entry.last_lba = main_last;
        }
        if let Some(entry) = entries.get_mut(recovery_index) {
            entry.first_lba = recovery_first;
            entry.last_lba = recovery_last;
        }

        let mut primary = GptHeader {
            backup_lba,
            last_usable_lba: recovery_last,
            partition_entries_crc32: entries.checksum(),
            ..header.clone()
        };
        primary.seal();
        let backup = primary.mirrored(backup_entries_lba);

        let mut entry_bytes = entries.to_bytes();
        entry_bytes.resize((entries_sectors * ss) as usize, 0);

        let stale = header.backup_lba;
        let stale_backup = if stale != backup_lba && stale < recovery_first && stale > entries_sectors {
            Some(BlockCoordinates::new(stale - entries_sectors, stale))
        } else {
            None
        };

        Ok(Some(Relocation {
            old_region: BlockCoordinates::new(recovery.first_lba, recovery.last_lba),
            main_last,
            recovery_first,
            recovery_last,
            entries_lba: primary.partition_entries_lba,
            backup_entries_lba,
            backup_lba,
            entry_bytes,
            primary_sector: primary.to_sector(ss as usize),
            backup_sector: backup.to_sector(ss as usize),
            stale_backup,
        }))
    }

    /// Moves the recovery partition, then rewrites both tables. Headers are the last to
    /// change for the entries they describe.
    fn write<W: LayoutWriter>(&self, disk: &mut W) -> io::Result<()> {
        disk.copy_sectors(self.old_region.moved_to(self.recovery_first))?;
        disk.sync()?;

        disk.write_sectors(self.entries_lba, &self.entry_bytes)?;
        disk.write_sectors(PRIMARY_HEADER_LBA, &self.primary_sector)?;
        disk.write_sectors(self.backup_entries_lba, &self.entry_bytes)?;
        disk.write_sectors(self.backup_lba, &self.backup_sector)?;
        disk.sync()?;

        let vacated_end = self.old_region.end.min(self.recovery_first - 1);
        disk.zero_sectors(BlockCoordinates::new(self.old_region.start, vacated_end))?;
        if let Some(stale) = self.stale_backup {
            disk.zero_sectors(stale)?;
        }
        disk.sync()
    }

    /// Writes the relocation to `disk`. A failure here leaves the image partially
    /// rewritten, and so is never reported as an unrecognized layout.
    pub(crate) fn apply<W: LayoutWriter>(&self, disk: &mut W, path: &Path) -> Result<(), ResizeError> {
        info!(
            "moving recovery partition from {}-{} to {}-{}, extending APFS container to {}",
            self.old_region.start,
            self.old_region.end,
            self.recovery_first,
            self.recovery_last,
            self.main_last
        );

        self.write(disk).map_err(|why| ResizeError::LayoutInterrupted { path: path.to_path_buf(), why })
    }

    fn adjustment(&self) -> LayoutAdjustment {
        LayoutAdjustment::Relocated {
            main_last_lba:      self.main_last,
            recovery_first_lba: self.recovery_first,
            recovery_last_lba:  self.recovery_last,
        }
    }
}

/// Adjusts the GPT of the raw image at `path` to its current length.
///
/// Every error but [`ResizeError::LayoutInterrupted`] is raised before the image is
/// written to, and leaves it untouched.
pub fn adjust_layout(path: &Path) -> Result<LayoutAdjustment, ResizeError> {
    let mut file = SectorFile::open(path, SECTOR_SIZE)?;
    let relocation = match Relocation::plan(&mut file, path)? {
        Some(relocation) => relocation,
        None => return Ok(LayoutAdjustment::Unchanged),
    };

    relocation.apply(&mut file, path)?;
    Ok(relocation.adjustment())
}
