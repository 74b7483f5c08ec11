//! Typed APFS container listings, as reported by `diskutil apfs list`.

use crate::output::{key_value, leading_number, FromToolOutput};
use serde_json::Value;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApfsListing {
    pub containers: Vec<ApfsContainer>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApfsContainer {
    /// Device identifier of the synthesized container disk, such as `disk5`.
    pub reference:        String,
    pub capacity_ceiling: u64,
    pub physical_stores:  Vec<PhysicalStore>,
    pub volumes:          Vec<ApfsVolume>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PhysicalStore {
    pub identifier: String,
    pub size:       u64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApfsVolume {
    pub identifier: String,
    pub name:       String,
    pub roles:      Vec<String>,
    pub locked:     bool,
}

impl ApfsVolume {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r.eq_ignore_ascii_case(role))
    }
}

impl ApfsContainer {
    /// A container holding the guest's operating system, rather than firmware support data.
    pub fn is_main(&self) -> bool {
        let any_role = |role| self.volumes.iter().any(|v| v.has_role(role));
        (any_role("System") || any_role("Data")) && !any_role("xART") && !any_role("Hardware")
    }

    pub fn is_locked(&self) -> bool { self.volumes.iter().any(|v| v.locked) }

    /// Whether the container lives on `device` or one of its slices.
    pub fn belongs_to(&self, device: &str) -> bool {
        let slice_prefix = [device, "s"].concat();
        self.reference == device
            || self.physical_stores.iter().any(|store| {
                store.identifier == device || store.identifier.starts_with(&slice_prefix)
            })
    }

    pub fn physical_size(&self) -> u64 { self.physical_stores.iter().map(|s| s.size).sum() }
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawListing {
    #[serde(default)]
    containers: Vec<RawContainer>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawContainer {
    container_reference: String,
    #[serde(default)]
    capacity_ceiling:    u64,
    #[serde(default)]
    physical_stores:     Vec<RawStore>,
    #[serde(default)]
    volumes:             Vec<RawVolume>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawStore {
    device_identifier: String,
    #[serde(default)]
    size:              u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawVolume {
    device_identifier: String,
    #[serde(default)]
    name:              String,
    #[serde(default)]
    roles:             Vec<String>,
    #[serde(default)]
    locked:            bool,
}

impl FromToolOutput for ApfsListing {
    fn from_structured(value: Value) -> Result<Self, String> {
        let raw: RawListing = serde_json::from_value(value).map_err(|why| why.to_string())?;
        let containers = raw
            .containers
            .into_iter()
            .map(|c| ApfsContainer {
                reference:        c.container_reference,
                capacity_ceiling: c.capacity_ceiling,
                physical_stores:  c
                    .physical_stores
                    .into_iter()
                    .map(|s| PhysicalStore { identifier: s.device_identifier, size: s.size })
                    .collect(),
                volumes:          c
                    .volumes
                    .into_iter()
                    .map(|v| ApfsVolume {
                        identifier: v.device_identifier,
                        name:       v.name,
                        roles:      v.roles,
                        locked:     v.locked,
                    })
                    .collect(),
            })
            .collect();

        Ok(ApfsListing { containers })
    }

    fn from_legacy(text: &str) -> Result<Self, String> {
        #[derive(PartialEq)]
        enum Section {
            Container,
            Store,
            Volume,
        }

        let mut containers: Vec<ApfsContainer> = Vec::new();
        let mut section = Section::Container;

        for line in text.lines() {
            let (key, value) = match key_value(line) {
                Some(pair) => pair,
                None => continue,
            };

            if key == "APFS Container Reference" {
                containers.push(ApfsContainer { reference: value.into(), ..Default::default() });
                section = Section::Container;
                continue;
            }

            let container = match containers.last_mut() {
                Some(container) => container,
                None => continue,
            };

            match key {
                "Size (Capacity Ceiling)" => {
                    container.capacity_ceiling = leading_number(value).unwrap_or(0);
                }
                "APFS Physical Store Disk" => {
                    container.physical_stores.push(PhysicalStore {
                        identifier: value.into(),
                        size:       0,
                    });
                    section = Section::Store;
                }
                "Size" if section == Section::Store => {
                    if let Some(store) = container.physical_stores.last_mut() {
                        store.size = leading_number(value).unwrap_or(0);
                    }
                }
                "APFS Volume Disk (Role)" => {
                    let mut parts = value.splitn(2, ' ');
                    let identifier = parts.next().unwrap_or_default().to_owned();
                    let roles = parts
                        .next()
                        .map(|roles| roles.trim().trim_start_matches('(').trim_end_matches(')'))
                        .filter(|roles| !roles.is_empty() && *roles != "No specific role")
                        .map(|roles| roles.split(',').map(|r| r.trim().to_owned()).collect())
                        .unwrap_or_default();
                    container.volumes.push(ApfsVolume { identifier, roles, ..Default::default() });
                    section = Section::Volume;
                }
                "Name" if section == Section::Volume => {
                    if let Some(volume) = container.volumes.last_mut() {
                        volume.name = value
                            .rfind(" (")
                            .filter(|_| value.ends_with(')'))
                            .map_or(value, |end| &value[..end])
                            .to_owned();
                    }
                }
                "FileVault" | "Locked" if section == Section::Volume => {
                    if let Some(volume) = container.volumes.last_mut() {
                        volume.locked |= value.contains("(Locked)")
                            || (key == "Locked" && value.starts_with("Yes"));
                    }
                }
                _ => (),
            }
        }

        if containers.is_empty() && !text.contains("APFS Container") {
            return Err("no APFS container information in output".into());
        }

        Ok(ApfsListing { containers })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub const LEGACY: &str = "\
APFS Containers (2 found)
|
+-- Container disk5 A1B2C3D4-0000-0000-0000-000000000000
|   ====================================================
|   APFS Container Reference:     disk5
|   Size (Capacity Ceiling):      62907318272 B (62.9 GB)
|   Capacity In Use By Volumes:   15727632384 B (15.7 GB) (25.0% used)
|   Capacity Not Allocated:       47179685888 B (47.2 GB) (75.0% free)
|   |
|   +-< Physical Store disk4s2 5C3B6F0F-0000-0000-0000-000000000000
|   |   -----------------------------------------------------------
|   |   APFS Physical Store Disk:   disk4s2
|   |   Size:                       62907318272 B (62.9 GB)
|   |
|   +-> Volume disk5s1 0A0B0C0D-0000-0000-0000-000000000000
|   |   ---------------------------------------------------
|   |   APFS Volume Disk (Role):   disk5s1 (System)
|   |   Name:                      Macintosh HD (Case-insensitive)
|   |   Mount Point:               Not Mounted
|   |   Capacity Consumed:         9510146048 B (9.5 GB)
|   |   Sealed:                    Broken
|   |   FileVault:                 No
|   |
|   +-> Volume disk5s5 1A1B1C1D-0000-0000-0000-000000000000
|       ---------------------------------------------------
|       APFS Volume Disk (Role):   disk5s5 (Data)
|       Name:                      Data (Case-insensitive)
|       Mount Point:               Not Mounted
|       FileVault:                 Yes (Locked)
|
+-- Container disk3 B1B2C3D4-0000-0000-0000-000000000000
    ====================================================
    APFS Container Reference:     disk3
    Size (Capacity Ceiling):      524288000 B (524.3 MB)
    |
    +-< Physical Store disk4s1 6C3B6F0F-0000-0000-0000-000000000000
    |   -----------------------------------------------------------
    |   APFS Physical Store Disk:   disk4s1
    |   Size:                       524288000 B (524.3 MB)
    |
    +-> Volume disk3s1 2A1B1C1D-0000-0000-0000-000000000000
        ---------------------------------------------------
        APFS Volume Disk (Role):   disk3s1 (xART)
        Name:                      xART (Case-sensitive)
        FileVault:                 No
";

    pub fn structured() -> Value {
        json!({
            "Containers": [
                {
                    "ContainerReference": "disk5",
                    "CapacityCeiling": 62907318272u64,
                    "PhysicalStores": [{ "DeviceIdentifier": "disk4s2", "Size": 62907318272u64 }],
                    "Volumes": [
                        { "DeviceIdentifier": "disk5s1", "Name": "Macintosh HD", "Roles": ["System"] },
                        { "DeviceIdentifier": "disk5s5", "Name": "Data", "Roles": ["Data"], "Locked": true }
                    ]
                },
                {
                    "ContainerReference": "disk3",
                    "CapacityCeiling": 524288000u64,
                    "PhysicalStores": [{ "DeviceIdentifier": "disk4s1", "Size": 524288000u64 }],
                    "Volumes": [{ "DeviceIdentifier": "disk3s1", "Name": "xART", "Roles": ["xART"] }]
                }
            ]
        })
    }

    #[test]
    fn structured_and_legacy_agree() {
        let structured = ApfsListing::from_structured(structured()).unwrap();
        let legacy = ApfsListing::from_legacy(LEGACY).unwrap();
        assert_eq!(structured, legacy);

        let main = &legacy.containers[0];
        assert_eq!(main.reference, "disk5");
        assert_eq!(main.capacity_ceiling, 62_907_318_272);
        assert_eq!(main.physical_stores[0].identifier, "disk4s2");
        assert_eq!(main.volumes[0].name, "Macintosh HD");
        assert!(main.is_main());
        assert!(main.is_locked());
        assert!(main.belongs_to("disk4"));
        assert!(!main.belongs_to("disk40"));

        let firmware = &legacy.containers[1];
        assert!(!firmware.is_main());
        assert!(!firmware.is_locked());
    }

    #[test]
    fn volumes_without_roles() {
        let text = "\
|   APFS Container Reference:     disk7
|   +-> Volume disk7s1
|   |   APFS Volume Disk (Role):   disk7s1 (No specific role)
|   |   Name:                      Untitled
";
        let listing = ApfsListing::from_legacy(text).unwrap();
        assert!(listing.containers[0].volumes[0].roles.is_empty());
        assert_eq!(listing.containers[0].volumes[0].name, "Untitled");
        assert!(!listing.containers[0].is_main());
    }

    #[test]
    fn empty_listings() {
        assert!(ApfsListing::from_legacy("No APFS Containers found\n").unwrap().containers.is_empty());
        assert!(ApfsListing::from_legacy("garbage").is_err());
        assert!(ApfsListing::from_structured(json!({})).unwrap().containers.is_empty());
    }
}
