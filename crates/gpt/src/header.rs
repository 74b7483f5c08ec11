use crate::{bytes::*, Guid, GptError};

/// The GPT header signature.
pub const SIGNATURE: &[u8; 8] = b"EFI PART";
/// Size of the header fields defined by the UEFI specification.
pub const HEADER_SIZE: usize = 92;
/// Revision 1.0, the only revision in use.
pub const REVISION_1_0: u32 = 0x0001_0000;

const CRC_FIELD: std::ops::Range<usize> = 16..20;

/// A GPT header, as stored at LBA 1 (primary) or at the last LBA of the disk (backup).
#[cfg_attr(rustfmt, rustfmt_skip)]
#[derive(Debug, Clone, PartialEq)]
pub struct GptHeader {
    pub signature:               [u8; 8],
    pub revision:                u32,
    pub header_size:             u32,
    pub header_crc32:            u32,
    pub current_lba:             u64,
    pub backup_lba:              u64,
    pub first_usable_lba:        u64,
    pub last_usable_lba:         u64,
    pub disk_guid:               Guid,
    pub partition_entries_lba:   u64,
    pub number_of_entries:       u32,
    pub entry_size:              u32,
    pub partition_entries_crc32: u32,
}

impl GptHeader {
    /// Decodes a header from the start of `bytes`, verifying its signature and checksum.
    pub fn parse(bytes: &[u8]) -> Result<GptHeader, GptError> {
        if bytes.len() < HEADER_SIZE {
            return Err(GptError::ShortBuffer { what: "GPT header", need: HEADER_SIZE, len: bytes.len() });
        }

        if &bytes[0..8] != SIGNATURE {
            return Err(GptError::InvalidSignature);
        }

        let header_size = read_u32(bytes, 12);
        if (header_size as usize) < HEADER_SIZE || header_size as usize > bytes.len() {
            return Err(GptError::InvalidHeaderSize { size: header_size });
        }

        let mut signature = [0; 8];
        signature.copy_from_slice(&bytes[0..8]);

        let header = GptHeader {
            signature,
            revision: read_u32(bytes, 8),
            header_size,
            header_crc32: read_u32(bytes, 16),
            current_lba: read_u64(bytes, 24),
            backup_lba: read_u64(bytes, 32),
            first_usable_lba: read_u64(bytes, 40),
            last_usable_lba: read_u64(bytes, 48),
            disk_guid: Guid::from_slice(&bytes[56..72]),
            partition_entries_lba: read_u64(bytes, 72),
            number_of_entries: read_u32(bytes, 80),
            entry_size: read_u32(bytes, 84),
            partition_entries_crc32: read_u32(bytes, 88),
        };

        // The checksum covers `header_size` bytes, which may include reserved space.
        let mut covered = bytes[..header_size as usize].to_vec();
        covered[CRC_FIELD].copy_from_slice(&[0; 4]);
        let computed = crc32fast::hash(&covered);
        if computed != header.header_crc32 {
            return Err(GptError::HeaderChecksum { stored: header.header_crc32, computed });
        }

        Ok(header)
    }

    fn encode(&self, buf: &mut [u8], crc: u32) {
        buf[0..8].copy_from_slice(&self.signature);
        write_u32(buf, 8, self.revision);
        write_u32(buf, 12, self.header_size);
        write_u32(buf, 16, crc);
        write_u32(buf, 20, 0);
        write_u64(buf, 24, self.current_lba);
        write_u64(buf, 32, self.backup_lba);
        write_u64(buf, 40, self.first_usable_lba);
        write_u64(buf, 48, self.last_usable_lba);
        buf[56..72].copy_from_slice(&self.disk_guid.0);
        write_u64(buf, 72, self.partition_entries_lba);
        write_u32(buf, 80, self.number_of_entries);
        write_u32(buf, 84, self.entry_size);
        write_u32(buf, 88, self.partition_entries_crc32);
    }

    fn covered_len(&self) -> usize { (self.header_size as usize).max(HEADER_SIZE) }

    /// Computes the header checksum over the header bytes with the CRC field zeroed.
    pub fn checksum(&self) -> u32 {
        let mut buf = vec![0; self.covered_len()];
        self.encode(&mut buf, 0);
        crc32fast::hash(&buf)
    }

    /// Recomputes and stores the header checksum.
    pub fn seal(&mut self) { self.header_crc32 = self.checksum(); }

    /// Encodes the header into a zero-padded sector, always with a freshly computed checksum.
    pub fn to_sector(&self, sector_size: usize) -> Vec<u8> {
        let mut sector = vec![0; sector_size.max(self.covered_len())];
        self.encode(&mut sector, self.checksum());
        sector
    }

    /// The mirror image of this header, located at `backup_lba` and describing the entry
    /// array at `entries_lba`.
    pub fn mirrored(&self, entries_lba: u64) -> GptHeader {
        let mut header = GptHeader {
            current_lba: self.backup_lba,
            backup_lba: self.current_lba,
            partition_entries_lba: entries_lba,
            ..self.clone()
        };
        header.seal();
        header
    }

    /// Length in bytes of the partition entry array.
    pub fn entries_len(&self) -> usize { self.number_of_entries as usize * self.entry_size as usize }

    /// Number of sectors occupied by the partition entry array.
    pub fn entries_sectors(&self, sector_size: u64) -> u64 {
        (self.entries_len() as u64 + sector_size - 1) / sector_size
    }
}
