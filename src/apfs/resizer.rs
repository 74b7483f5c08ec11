use super::{escalate, resolver::ContainerDetails, ContainerTarget};
use crate::{
    config::ResizeConfig,
    external::{
        diskutil::{self, ContainerSize},
        CommandRunner, FailureKind,
    },
    resize::ResizeError,
};

/// Grows an APFS container into the space that follows it.
pub struct ContainerResizer<'a> {
    runner: &'a dyn CommandRunner,
    config: &'a ResizeConfig,
}

impl<'a> ContainerResizer<'a> {
    pub fn new(runner: &'a dyn CommandRunner, config: &'a ResizeConfig) -> Self {
        ContainerResizer { runner, config }
    }

    /// Resizes the container to its maximum. A container with locked volumes is refused
    /// before any command is issued, as the resize would fail against it regardless.
    pub fn resize(&self, target: &ContainerTarget) -> Result<(), ResizeError> {
        if target.locked {
            return Err(ResizeError::ApfsVolumesLocked { container: target.container.clone() });
        }

        info!("growing APFS container {} through {}", target.container, target.resize_target());
        diskutil::resize_container(self.runner, target.resize_target(), ContainerSize::Maximum)
            .map_err(|why| escalate(why, &target.container))?;

        // A container resized through its physical store does not always grow its
        // volumes to the new ceiling until it is resized once more by reference.
        if target.physical_store.is_some() {
            self.best_effort(target, &target.container, ContainerSize::Maximum, "follow-up resize")?;
        }

        self.nudge(target)
    }

    /// Corrects a capacity ceiling which fell short of the physical store after a resize,
    /// by shrinking the container a little and growing it again.
    pub fn nudge(&self, target: &ContainerTarget) -> Result<(), ResizeError> {
        let listing = match diskutil::apfs_list(self.runner, Some(&target.container)) {
            Ok(listing) => listing,
            Err(why) => {
                if why.kind() == FailureKind::Locked {
                    return Err(escalate(why, &target.container));
                }

                warn!("unable to inspect APFS container {}: {}", target.container, why);
                return Ok(());
            }
        };

        let details = match ContainerDetails::find(&listing, &target.container) {
            Some(details) => details,
            None => {
                warn!("APFS container {} is missing from its own listing", target.container);
                return Ok(());
            }
        };

        if details.physical_size <= details.capacity_ceiling + self.config.nudge_tolerance {
            debug!(
                "APFS container {} ceiling {} matches its physical size {}",
                target.container, details.capacity_ceiling, details.physical_size
            );
            return Ok(());
        }

        let alignment = self.config.nudge_alignment.max(1);
        let shrunk = (details.capacity_ceiling.saturating_sub(self.config.nudge_shrink) / alignment
            * alignment)
            .max(alignment);

        info!(
            "APFS container {} ceiling {} is below its physical size {}: nudging through {}",
            target.container, details.capacity_ceiling, details.physical_size, shrunk
        );

        let store = target.resize_target();
        self.best_effort(target, store, ContainerSize::Bytes(shrunk), "nudge shrink")?;
        self.best_effort(target, store, ContainerSize::Maximum, "nudge grow")
    }

    /// Failures are logged and ignored, except for locked volumes.
    fn best_effort(
        &self,
        target: &ContainerTarget,
        address: &str,
        size: ContainerSize,
        what: &str,
    ) -> Result<(), ResizeError> {
        match diskutil::resize_container(self.runner, address, size) {
            Ok(()) => Ok(()),
            Err(why) => {
                if why.kind() == FailureKind::Locked {
                    return Err(escalate(why, &target.container));
                }

                warn!("{} of APFS container {} failed: {}", what, target.container, why);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::mock::{fail, json, ok, MockRunner};
    use serde_json::Value;

    pub fn container_json(reference: &str, store: &str, ceiling: u64, store_size: u64) -> Value {
        json!({
            "Containers": [{
                "ContainerReference": reference,
                "CapacityCeiling": ceiling,
                "PhysicalStores": [{ "DeviceIdentifier": store, "Size": store_size }],
                "Volumes": [{ "DeviceIdentifier": format!("{}s1", reference), "Name": "Data", "Roles": ["Data"] }]
            }]
        })
    }

    fn target(locked: bool) -> ContainerTarget {
        ContainerTarget {
            container: "disk5".into(),
            physical_store: Some("disk4s2".into()),
            locked,
        }
    }

    #[test]
    fn locked_container_issues_no_commands() {
        let runner = MockRunner::unused();
        let config = ResizeConfig::default();

        match ContainerResizer::new(&runner, &config).resize(&target(true)) {
            Err(ResizeError::ApfsVolumesLocked { container }) => assert_eq!(container, "disk5"),
            other => panic!("expected locked volumes error, got {:?}", other),
        }

        assert!(runner.calls().is_empty());
    }

    #[test]
    fn resizes_store_then_container() {
        let runner = MockRunner::new(|line| {
            if line.starts_with("diskutil apfs list") {
                json(container_json("disk5", "disk4s2", 64_000_000_000, 64_000_000_000))
            } else {
                ok("Finished APFS operation")
            }
        });
        let config = ResizeConfig::default();

        ContainerResizer::new(&runner, &config).resize(&target(false)).unwrap();
        assert_eq!(runner.calls(), vec![
            "diskutil apfs resizeContainer disk4s2 0",
            "diskutil apfs resizeContainer disk5 0",
            "diskutil apfs list -plist disk5",
        ]);
    }

    #[test]
    fn failed_follow_up_is_ignored() {
        let runner = MockRunner::new(|line| match line {
            "diskutil apfs resizeContainer disk5 0" => fail(1, "Error: -69519: The target disk is too small"),
            line if line.starts_with("diskutil apfs list") => {
                json(container_json("disk5", "disk4s2", 64_000_000_000, 64_000_000_000))
            }
            _ => ok(""),
        });
        let config = ResizeConfig::default();

        assert!(ContainerResizer::new(&runner, &config).resize(&target(false)).is_ok());
    }

    #[test]
    fn failed_primary_resize_is_reported() {
        let runner = MockRunner::new(|_| fail(1, "Error: -69743: The new size must be different"));
        let config = ResizeConfig::default();

        match ContainerResizer::new(&runner, &config).resize(&target(false)) {
            Err(ResizeError::ExternalToolFailed { command, code, .. }) => {
                assert_eq!(command, "diskutil apfs resizeContainer disk4s2");
                assert_eq!(code, 1);
            }
            other => panic!("expected tool failure, got {:?}", other),
        }
    }

    #[test]
    fn stale_ceiling_is_nudged() {
        let runner = MockRunner::new(|line| {
            if line.starts_with("diskutil apfs list") {
                json(container_json("disk5", "disk4s2", 60_000_000_000, 64_000_000_000))
            } else {
                ok("")
            }
        });
        let config = ResizeConfig::default();

        ContainerResizer::new(&runner, &config).nudge(&target(false)).unwrap();
        assert_eq!(runner.calls(), vec![
            "diskutil apfs list -plist disk5",
            "diskutil apfs resizeContainer disk4s2 59966443520B",
            "diskutil apfs resizeContainer disk4s2 0",
        ]);
    }

    #[test]
    fn nudge_within_tolerance_does_nothing() {
        let runner = MockRunner::new(|_| json(container_json("disk5", "disk4s2", 64_000_000_000, 64_000_500_000)));
        let config = ResizeConfig::default();

        ContainerResizer::new(&runner, &config).nudge(&target(false)).unwrap();
        assert_eq!(runner.count("diskutil apfs resizeContainer"), 0);
    }

    #[test]
    fn nudge_shrink_is_clamped_to_one_alignment_unit() {
        let runner = MockRunner::new(|line| {
            if line.starts_with("diskutil apfs list") {
                json(container_json("disk5", "disk4s2", 1_000_000, 64_000_000_000))
            } else {
                fail(1, "Error: -69519: The target disk is too small")
            }
        });
        let config = ResizeConfig::default();

        ContainerResizer::new(&runner, &config).nudge(&target(false)).unwrap();
        assert_eq!(runner.count("diskutil apfs resizeContainer disk4s2 4096B"), 1);
        assert_eq!(runner.count("diskutil apfs resizeContainer disk4s2 0"), 1);
    }

    #[test]
    fn locked_nudge_is_never_downgraded() {
        let runner = MockRunner::new(|line| {
            if line.starts_with("diskutil apfs list") {
                json(container_json("disk5", "disk4s2", 60_000_000_000, 64_000_000_000))
            } else {
                fail(1, "Error: -69624: The volume is locked")
            }
        });
        let config = ResizeConfig::default();

        match ContainerResizer::new(&runner, &config).nudge(&target(false)) {
            Err(ResizeError::ApfsVolumesLocked { container }) => assert_eq!(container, "disk5"),
            other => panic!("expected locked volumes error, got {:?}", other),
        }
        assert_eq!(runner.count("diskutil apfs resizeContainer"), 1);
    }
}
