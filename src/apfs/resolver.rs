use crate::external::{ApfsContainer, ApfsListing};

/// An APFS container chosen as the target of a resize.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerTarget {
    /// The container reference, such as `disk5`.
    pub container:      String,
    /// The partition backing the container, such as `disk4s2`.
    pub physical_store: Option<String>,
    pub locked:         bool,
}

impl ContainerTarget {
    fn new(container: &ApfsContainer, device: &str) -> ContainerTarget {
        let slice_prefix = [device, "s"].concat();
        let physical_store = container
            .physical_stores
            .iter()
            .find(|store| store.identifier.starts_with(&slice_prefix))
            .or_else(|| container.physical_stores.first())
            .map(|store| store.identifier.clone());

        ContainerTarget {
            container: container.reference.clone(),
            physical_store,
            locked: container.is_locked(),
        }
    }

    /// The identifier resize commands are addressed to: the physical store when known.
    pub fn resize_target(&self) -> &str {
        self.physical_store.as_ref().unwrap_or(&self.container)
    }
}

/// Capacity figures of a container which may diverge after a resize.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContainerDetails {
    pub capacity_ceiling: u64,
    pub physical_size:    u64,
}

impl ContainerDetails {
    pub fn find(listing: &ApfsListing, reference: &str) -> Option<ContainerDetails> {
        listing.containers.iter().find(|c| c.reference == reference).map(|c| ContainerDetails {
            capacity_ceiling: c.capacity_ceiling,
            physical_size:    c.physical_size(),
        })
    }
}

/// Picks the container on `device` to grow. Containers holding the guest's system or
/// data volumes are preferred over auxiliary ones, and unlocked over locked. Among
/// auxiliary containers the largest unlocked one is chosen, and failing that the first.
pub fn resolve_container(listing: &ApfsListing, device: &str) -> Option<ContainerTarget> {
    let candidates: Vec<&ApfsContainer> =
        listing.containers.iter().filter(|c| c.belongs_to(device)).collect();

    let chosen = candidates
        .iter()
        .find(|c| c.is_main() && !c.is_locked())
        .or_else(|| candidates.iter().find(|c| c.is_main()))
        .or_else(|| {
            candidates.iter().filter(|c| !c.is_locked()).max_by_key(|c| c.capacity_ceiling)
        })
        .or_else(|| candidates.first())?;

    debug!("resolved APFS container {} on {}", chosen.reference, device);
    Some(ContainerTarget::new(chosen, device))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::external::{ApfsVolume, PhysicalStore};

    pub fn container(reference: &str, store: &str, ceiling: u64, roles: &[&str], locked: bool) -> ApfsContainer {
        ApfsContainer {
            reference:        reference.into(),
            capacity_ceiling: ceiling,
            physical_stores:  vec![PhysicalStore { identifier: store.into(), size: ceiling }],
            volumes:          roles
                .iter()
                .enumerate()
                .map(|(index, role)| ApfsVolume {
                    identifier: format!("{}s{}", reference, index + 1),
                    name:       role.to_string(),
                    roles:      vec![role.to_string()],
                    locked,
                })
                .collect(),
        }
    }

    fn listing(containers: Vec<ApfsContainer>) -> ApfsListing { ApfsListing { containers } }

    #[test]
    fn data_container_is_chosen_over_xart() {
        let listing = listing(vec![
            container("disk3", "disk4s1", 5_000_000_000, &["xART"], false),
            container("disk5", "disk4s2", 60_000_000_000, &["Data"], false),
        ]);

        let target = resolve_container(&listing, "disk4").unwrap();
        assert_eq!(target.container, "disk5");
        assert_eq!(target.physical_store.as_ref().map(String::as_str), Some("disk4s2"));
        assert_eq!(target.resize_target(), "disk4s2");
        assert!(!target.locked);
    }

    #[test]
    fn isc_with_system_roles_is_not_main() {
        let mut hardware = container("disk3", "disk4s1", 90_000_000_000, &["Hardware", "System"], false);
        hardware.volumes[1].roles.push("xART".into());
        let listing = listing(vec![hardware, container("disk5", "disk4s2", 1_000, &["System"], false)]);
        assert_eq!(resolve_container(&listing, "disk4").unwrap().container, "disk5");
    }

    #[test]
    fn locked_main_beats_unlocked_auxiliary() {
        let listing = listing(vec![
            container("disk3", "disk4s1", 5_000, &["Preboot"], false),
            container("disk5", "disk4s2", 60_000, &["System", "Data"], true),
        ]);

        let target = resolve_container(&listing, "disk4").unwrap();
        assert_eq!(target.container, "disk5");
        assert!(target.locked);
    }

    #[test]
    fn unlocked_main_beats_locked_main() {
        let listing = listing(vec![
            container("disk5", "disk4s2", 60_000, &["Data"], true),
            container("disk6", "disk4s3", 10_000, &["System"], false),
        ]);
        assert_eq!(resolve_container(&listing, "disk4").unwrap().container, "disk6");
    }

    #[test]
    fn largest_unlocked_auxiliary_then_first() {
        let auxiliary = listing(vec![
            container("disk3", "disk4s1", 5_000, &["Preboot"], false),
            container("disk5", "disk4s2", 9_000, &["Recovery"], false),
            container("disk6", "disk4s3", 90_000, &["Update"], true),
        ]);
        assert_eq!(resolve_container(&auxiliary, "disk4").unwrap().container, "disk5");

        let locked = listing(vec![
            container("disk3", "disk4s1", 5_000, &["Preboot"], true),
            container("disk5", "disk4s2", 9_000, &["Recovery"], true),
        ]);
        assert_eq!(resolve_container(&locked, "disk4").unwrap().container, "disk3");
    }

    #[test]
    fn containers_on_other_devices_are_ignored() {
        let listing = listing(vec![
            container("disk1", "disk0s2", 500_000, &["System"], false),
            container("disk41", "disk40s2", 500_000, &["System"], false),
        ]);
        assert!(resolve_container(&listing, "disk4").is_none());
        assert_eq!(resolve_container(&listing, "disk1").unwrap().container, "disk1");
    }
}
