//! Partition maps of whole disks, as reported by `diskutil list`.

use crate::output::FromToolOutput;
use serde_json::Value;

pub const APFS_CONTENT: &str = "Apple_APFS";
pub const RECOVERY_CONTENT: &str = "Apple_APFS_Recovery";
pub const LEGACY_RECOVERY_CONTENT: &str = "Apple_Boot";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartitionListing {
    pub device:     String,
    pub partitions: Vec<PartitionInfo>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartitionInfo {
    pub identifier: String,
    /// Partition type name, such as `Apple_APFS`.
    pub content:    String,
    /// Size in bytes. Only approximate when decoded from text output.
    pub size:       u64,
}

impl PartitionInfo {
    pub fn is_recovery(&self) -> bool {
        self.content == RECOVERY_CONTENT || self.content == LEGACY_RECOVERY_CONTENT
    }

    pub fn is_apfs(&self) -> bool { self.content == APFS_CONTENT }
}

impl PartitionListing {
    pub fn recovery(&self) -> Option<&PartitionInfo> { self.partitions.iter().find(|p| p.is_recovery()) }

    pub fn position(&self, identifier: &str) -> Option<usize> {
        self.partitions.iter().position(|p| p.identifier == identifier)
    }

    /// The recovery partition, if it sits directly after the given partition and so
    /// prevents it from growing.
    pub fn recovery_after(&self, identifier: &str) -> Option<&PartitionInfo> {
        let position = self.position(identifier)?;
        self.partitions.get(position + 1).filter(|p| p.is_recovery())
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawList {
    #[serde(default)]
    all_disks_and_partitions: Vec<RawDisk>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawDisk {
    device_identifier: String,
    #[serde(default)]
    partitions:        Vec<RawPartition>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawPartition {
    device_identifier: String,
    #[serde(default)]
    content:           String,
    #[serde(default)]
    size:              u64,
}

impl FromToolOutput for PartitionListing {
    fn from_structured(value: Value) -> Result<Self, String> {
        let raw: RawList = serde_json::from_value(value).map_err(|why| why.to_string())?;
        let disk = raw
            .all_disks_and_partitions
            .into_iter()
            .find(|disk| !disk.partitions.is_empty())
            .ok_or_else(|| "no partitioned disk in output".to_owned())?;

        Ok(PartitionListing {
            device:     disk.device_identifier,
            partitions: disk
                .partitions
                .into_iter()
                .map(|p| PartitionInfo {
                    identifier: p.device_identifier,
                    content:    p.content,
                    size:       p.size,
                })
                .collect(),
        })
    }

    fn from_legacy(text: &str) -> Result<Self, String> {
        let mut listing = PartitionListing::default();

        for line in text.lines() {
            let line = line.trim();
            if line.starts_with("/dev/") {
                if !listing.device.is_empty() {
                    break;
                }
                let device = line.split_whitespace().next().unwrap_or_default();
                listing.device = device.trim_start_matches("/dev/").trim_end_matches(':').into();
                continue;
            }

            let mut fields = line.split_whitespace();
            let index = match fields.next().and_then(|f| f.strip_suffix(':')) {
                Some(index) => match index.parse::<u32>() {
                    Ok(index) => index,
                    Err(_) => continue,
                },
                None => continue,
            };

            let fields: Vec<&str> = fields.collect();
            // Entry zero describes the partition scheme of the whole disk.
            if index == 0 || fields.len() < 4 {
                continue;
            }

            let identifier = fields[fields.len() - 1];
            let size = parse_display_size(fields[fields.len() - 3], fields[fields.len() - 2]);
            listing.partitions.push(PartitionInfo {
                identifier: identifier.into(),
                content:    fields[0].into(),
                size:       size.unwrap_or(0),
            });
        }

        if listing.partitions.is_empty() {
            return Err("no partitions found in output".into());
        }

        Ok(listing)
    }
}

/// Converts a decimal size such as `62.9 GB` into bytes.
fn parse_display_size(number: &str, unit: &str) -> Option<u64> {
    let number = number.trim_start_matches('+').trim_start_matches('*').parse::<f64>().ok()?;
    let multiplier = match unit {
        "B" | "Bytes" => 1f64,
        "KB" => 1e3,
        "MB" => 1e6,
        "GB" => 1e9,
        "TB" => 1e12,
        _ => return None,
    };

    Some((number * multiplier).round() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEGACY: &str = "\
/dev/disk4 (disk image):
   #:                       TYPE NAME                    SIZE       IDENTIFIER
   0:      GUID_partition_scheme                        +68.7 GB    disk4
   1:             Apple_APFS_ISC Container disk3         524.3 MB   disk4s1
   2:                 Apple_APFS Container disk5         62.9 GB    disk4s2
   3:        Apple_APFS_Recovery Container disk6         5.4 GB     disk4s3

/dev/disk5 (synthesized):
   #:                       TYPE NAME                    SIZE       IDENTIFIER
   0:      APFS Container Scheme -                      +62.9 GB    disk5
";

    #[test]
    fn legacy_listing() {
        let listing = PartitionListing::from_legacy(LEGACY).unwrap();
        assert_eq!(listing.device, "disk4");
        assert_eq!(listing.partitions.len(), 3);
        assert_eq!(listing.partitions[1].identifier, "disk4s2");
        assert_eq!(listing.partitions[1].content, "Apple_APFS");
        assert_eq!(listing.partitions[1].size, 62_900_000_000);
        assert_eq!(listing.recovery().map(|p| p.identifier.as_str()), Some("disk4s3"));
        assert_eq!(listing.recovery_after("disk4s2").map(|p| p.identifier.as_str()), Some("disk4s3"));
        assert!(listing.recovery_after("disk4s1").is_none());
    }

    #[test]
    fn structured_listing() {
        let value = json!({
            "AllDisks": ["disk4", "disk4s1", "disk4s2"],
            "AllDisksAndPartitions": [{
                "Content": "GUID_partition_scheme",
                "DeviceIdentifier": "disk4",
                "Partitions": [
                    { "Content": "Apple_APFS", "DeviceIdentifier": "disk4s1", "Size": 10_000_000u64 },
                    { "Content": "Apple_Boot", "DeviceIdentifier": "disk4s2", "Size": 650_000u64 }
                ],
                "Size": 10_737_418_240u64
            }]
        });

        let listing = PartitionListing::from_structured(value).unwrap();
        assert_eq!(listing.device, "disk4");
        assert!(listing.partitions[0].is_apfs());
        assert_eq!(listing.recovery_after("disk4s1").map(|p| p.size), Some(650_000));
    }

    #[test]
    fn unpartitioned_output_is_an_error() {
        assert!(PartitionListing::from_legacy("/dev/disk9 (disk image):\n").is_err());
        assert!(PartitionListing::from_structured(json!({ "AllDisksAndPartitions": [] })).is_err());
    }
}
