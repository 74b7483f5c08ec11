use std::{fmt, str::FromStr};

/// A GUID in its on-disk layout, where the first three fields are little-endian.
#[derive(Clone, Copy, Default, Hash, PartialEq, Eq)]
pub struct Guid(pub [u8; 16]);

impl Guid {
    pub const ZERO: Guid = Guid([0; 16]);

    /// Builds a GUID from the fields of its canonical textual form.
    pub const fn from_fields(d1: u32, d2: u16, d3: u16, d4: [u8; 8]) -> Guid {
        let a = d1.to_le_bytes();
        let b = d2.to_le_bytes();
        let c = d3.to_le_bytes();
        Guid([
            a[0], a[1], a[2], a[3], b[0], b[1], c[0], c[1], d4[0], d4[1], d4[2], d4[3], d4[4],
            d4[5], d4[6], d4[7],
        ])
    }

    pub fn from_slice(bytes: &[u8]) -> Guid {
        let mut guid = [0; 16];
        guid.copy_from_slice(&bytes[..16]);
        Guid(guid)
    }

    pub fn is_zero(&self) -> bool { self.0 == [0; 16] }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{:08X}-{:04X}-{:04X}-{:02X}{:02X}-{:02X}{:02X}{:02X}{:02X}{:02X}{:02X}",
            u32::from_le_bytes([b[0], b[1], b[2], b[3]]),
            u16::from_le_bytes([b[4], b[5]]),
            u16::from_le_bytes([b[6], b[7]]),
            b[8],
            b[9],
            b[10],
            b[11],
            b[12],
            b[13],
            b[14],
            b[15]
        )
    }
}

impl fmt::Debug for Guid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result { write!(f, "Guid({})", self) }
}

impl FromStr for Guid {
    type Err = &'static str;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = input.split('-').collect();
        if !input.is_ascii()
            || fields.len() != 5
            || [8, 4, 4, 4, 12].iter().zip(&fields).any(|(len, field)| field.len() != *len)
        {
            return Err("GUID must be in the form XXXXXXXX-XXXX-XXXX-XXXX-XXXXXXXXXXXX");
        }

        let parse_err = |_| "GUID contains a non-hexadecimal digit";
        let d1 = u32::from_str_radix(fields[0], 16).map_err(parse_err)?;
        let d2 = u16::from_str_radix(fields[1], 16).map_err(parse_err)?;
        let d3 = u16::from_str_radix(fields[2], 16).map_err(parse_err)?;

        let tail = [fields[3], fields[4]].concat();
        let mut d4 = [0u8; 8];
        for (i, byte) in d4.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&tail[i * 2..i * 2 + 2], 16).map_err(parse_err)?;
        }

        Ok(Guid::from_fields(d1, d2, d3, d4))
    }
}

/// Partition type of an APFS container partition (`Apple_APFS`).
pub const APPLE_APFS: Guid =
    Guid::from_fields(0x7C34_57EF, 0x0000, 0x11AA, [0xAA, 0x11, 0x00, 0x30, 0x65, 0x43, 0xEC, 0xAC]);

/// Partition type of the APFS recovery container (`Apple_APFS_Recovery`).
pub const APPLE_APFS_RECOVERY: Guid =
    Guid::from_fields(0x5263_7672, 0x7900, 0x11AA, [0xAA, 0x11, 0x00, 0x30, 0x65, 0x43, 0xEC, 0xAC]);

/// Partition type of the internal shared cache container (`Apple_APFS_ISC`).
pub const APPLE_APFS_ISC: Guid =
    Guid::from_fields(0x6964_6961, 0x6700, 0x11AA, [0xAA, 0x11, 0x00, 0x30, 0x65, 0x43, 0xEC, 0xAC]);

/// Legacy recovery partition type (`Apple_Boot`).
pub const APPLE_BOOT: Guid =
    Guid::from_fields(0x426F_6F74, 0x0000, 0x11AA, [0xAA, 0x11, 0x00, 0x30, 0x65, 0x43, 0xEC, 0xAC]);

pub const EFI_SYSTEM: Guid =
    Guid::from_fields(0xC12A_7328, 0xF81F, 0x11D2, [0xBA, 0x4B, 0x00, 0xA0, 0xC9, 0x3E, 0xC9, 0x3B]);
