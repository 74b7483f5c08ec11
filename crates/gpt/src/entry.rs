use crate::{bytes::*, guid, GptError, GptHeader, Guid};

/// Size of the fields defined for a partition entry.
pub const ENTRY_SIZE: usize = 128;
const NAME_UNITS: usize = 36;

/// The role a partition plays, as identified by its type GUID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionRole {
    /// An APFS container partition.
    Container,
    /// A recovery partition, either the APFS recovery container or a legacy `Apple_Boot`.
    Recovery,
    /// The internal shared cache container of Apple silicon guests.
    SharedCache,
    Other,
}

#[cfg_attr(rustfmt, rustfmt_skip)]
#[derive(Debug, Clone, PartialEq)]
pub struct GptPartitionEntry {
    pub type_guid:   Guid,
    pub unique_guid: Guid,
    pub first_lba:   u64,
    pub last_lba:    u64,
    pub attributes:  u64,
    /// UTF-16LE name, zero padded.
    pub name:        [u16; NAME_UNITS],
}

impl Default for GptPartitionEntry {
    fn default() -> Self {
        GptPartitionEntry {
            type_guid:   Guid::ZERO,
            unique_guid: Guid::ZERO,
            first_lba:   0,
            last_lba:    0,
            attributes:  0,
            name:        [0; NAME_UNITS],
        }
    }
}

impl GptPartitionEntry {
    pub fn parse(bytes: &[u8]) -> Result<GptPartitionEntry, GptError> {
        if bytes.len() < ENTRY_SIZE {
            return Err(GptError::ShortBuffer {
                what: "partition entry",
                need: ENTRY_SIZE,
                len:  bytes.len(),
            });
        }

        let mut name = [0; NAME_UNITS];
        for (i, unit) in name.iter_mut().enumerate() {
            *unit = u16::from_le_bytes([bytes[56 + i * 2], bytes[57 + i * 2]]);
        }

        Ok(GptPartitionEntry {
            type_guid: Guid::from_slice(&bytes[0..16]),
            unique_guid: Guid::from_slice(&bytes[16..32]),
            first_lba: read_u64(bytes, 32),
            last_lba: read_u64(bytes, 40),
            attributes: read_u64(bytes, 48),
            name,
        })
    }

    pub fn encode(&self, buf: &mut [u8]) {
        buf[0..16].copy_from_slice(&self.type_guid.0);
        buf[16..32].copy_from_slice(&self.unique_guid.0);
        write_u64(buf, 32, self.first_lba);
        write_u64(buf, 40, self.last_lba);
        write_u64(buf, 48, self.attributes);
        for (i, unit) in self.name.iter().enumerate() {
            buf[56 + i * 2..58 + i * 2].copy_from_slice(&unit.to_le_bytes());
        }
    }

    pub fn is_used(&self) -> bool { !self.type_guid.is_zero() }

    /// An entry is valid when it is in use and its range is not inverted.
    pub fn is_valid(&self) -> bool { self.is_used() && self.last_lba >= self.first_lba }

    /// Number of sectors spanned by the partition, inclusive of both ends.
    pub fn sector_count(&self) -> u64 {
        if self.last_lba < self.first_lba {
            0
        } else {
            self.last_lba - self.first_lba + 1
        }
    }

    pub fn role(&self) -> PartitionRole {
        match self.type_guid {
            guid::APPLE_APFS => PartitionRole::Container,
            guid::APPLE_APFS_RECOVERY | guid::APPLE_BOOT => PartitionRole::Recovery,
            guid::APPLE_APFS_ISC => PartitionRole::SharedCache,
            _ => PartitionRole::Other,
        }
    }

    pub fn name(&self) -> String {
        let end = self.name.iter().position(|&unit| unit == 0).unwrap_or(NAME_UNITS);
        String::from_utf16_lossy(&self.name[..end])
    }

    /// Sets the name, truncating it to the 36 UTF-16 code units available.
    pub fn set_name(&mut self, name: &str) {
        self.name = [0; NAME_UNITS];
        for (unit, value) in self.name.iter_mut().zip(name.encode_utf16()) {
            *unit = value;
        }
    }
}

/// The partition entry array, retaining the raw bytes so that fields beyond the first
/// 128 bytes of each entry survive a rewrite.
#[derive(Debug, Clone, PartialEq)]
pub struct GptEntries {
    raw:        Vec<u8>,
    entry_size: usize,
    entries:    Vec<GptPartitionEntry>,
}

impl GptEntries {
    /// An array of `count` unused entries.
    pub fn new(count: u32, entry_size: u32) -> Result<GptEntries, GptError> {
        GptEntries::parse(&vec![0; count as usize * entry_size as usize], count, entry_size)
    }

    pub fn parse(bytes: &[u8], count: u32, entry_size: u32) -> Result<GptEntries, GptError> {
        if (entry_size as usize) < ENTRY_SIZE || !entry_size.is_power_of_two() {
            return Err(GptError::InvalidEntrySize { size: entry_size });
        }

        let entry_size = entry_size as usize;
        let need = count as usize * entry_size;
        if bytes.len() < need {
            return Err(GptError::ShortBuffer { what: "partition entry array", need, len: bytes.len() });
        }

        let raw = bytes[..need].to_vec();
        let entries = raw
            .chunks(entry_size)
            .map(GptPartitionEntry::parse)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(GptEntries { raw, entry_size, entries })
    }

    /// Decodes the array described by `header`, verifying it against the header's checksum.
    pub fn for_header(header: &GptHeader, bytes: &[u8]) -> Result<GptEntries, GptError> {
        let entries = GptEntries::parse(bytes, header.number_of_entries, header.entry_size)?;
        let computed = entries.checksum();
        if computed != header.partition_entries_crc32 {
            return Err(GptError::EntriesChecksum {
                stored: header.partition_entries_crc32,
                computed,
            });
        }

        Ok(entries)
    }

    pub fn len(&self) -> usize { self.entries.len() }

    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    pub fn iter(&self) -> impl Iterator<Item = &GptPartitionEntry> { self.entries.iter() }

    pub fn get(&self, index: usize) -> Option<&GptPartitionEntry> { self.entries.get(index) }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut GptPartitionEntry> {
        self.entries.get_mut(index)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut raw = self.raw.clone();
        for (entry, slot) in self.entries.iter().zip(raw.chunks_mut(self.entry_size)) {
            entry.encode(slot);
        }
        raw
    }

    /// CRC32 over the full entry array.
    pub fn checksum(&self) -> u32 { crc32fast::hash(&self.to_bytes()) }

    /// Index of the main APFS container: the valid container entry spanning the most
    /// sectors. The first such entry wins a tie.
    pub fn main_container(&self) -> Option<usize> {
        let mut found: Option<(usize, u64)> = None;
        for (index, entry) in self.entries.iter().enumerate() {
            if entry.is_valid() && entry.role() == PartitionRole::Container {
                let span = entry.sector_count();
                if found.map_or(true, |(_, largest)| span > largest) {
                    found = Some((index, span));
                }
            }
        }

        found.map(|(index, _)| index)
    }

    /// Index of the first valid recovery entry.
    pub fn recovery(&self) -> Option<usize> {
        self.entries
            .iter()
            .position(|entry| entry.is_valid() && entry.role() == PartitionRole::Recovery)
    }
}
