use super::strategies::{ExpansionContext, ExpansionStrategy, StepOutcome};
use crate::{
    external::{diskutil, CommandError, FailureKind},
    resize::ResizeError,
};

const SECURITY_LIMITATION: &str = "the disk image was grown, but System Integrity Protection \
     prevented removing the recovery partition that follows the main APFS container: boot the \
     guest into recovery mode to reclaim the new space";

/// Removes a recovery partition which sits between a container and the space added to a
/// disk image container. The guest regenerates its recovery partition when needed.
///
/// Raw images never need this, as their recovery partition is relocated to the end of the
/// disk before the image is attached.
pub(crate) struct RemoveRecoveryContainer;

impl ExpansionStrategy for RemoveRecoveryContainer {
    fn name(&self) -> &'static str { "remove recovery container" }

    fn attempt(&self, ctx: &mut ExpansionContext) -> Result<StepOutcome, ResizeError> {
        if !ctx.format.is_container() {
            return Ok(StepOutcome::NotApplicable);
        }

        let recovery = match ctx.blocking_recovery() {
            Some(recovery) => recovery,
            None => return Ok(StepOutcome::NotApplicable),
        };

        if ctx.target.locked {
            return Err(ResizeError::ApfsVolumesLocked { container: ctx.target.container.clone() });
        }

        info!("recovery partition {} blocks APFS container {}", recovery, ctx.target.container);

        let recovery_container = ctx
            .listing
            .containers
            .iter()
            .find(|c| c.physical_stores.iter().any(|store| store.identifier == recovery))
            .map(|c| c.reference.clone());

        // Older guests keep an HFS+ recovery partition, which has no container to delete.
        if let Some(reference) = recovery_container {
            if let Err(why) = diskutil::delete_container(ctx.runner, &reference) {
                return refused(ctx, why);
            }
        }

        if let Err(why) = diskutil::erase_to_free_space(ctx.runner, &recovery) {
            return refused(ctx, why);
        }

        match ctx.resizer().resize(&ctx.target) {
            Ok(()) => {
                info!("removed recovery partition {}: the guest will recreate it", recovery);
                Ok(StepOutcome::Succeeded)
            }
            Err(why @ ResizeError::ApfsVolumesLocked { .. }) => Err(why),
            Err(why) => Ok(StepOutcome::Continue(why.to_string())),
        }
    }
}

fn refused(ctx: &mut ExpansionContext, why: CommandError) -> Result<StepOutcome, ResizeError> {
    match why.kind() {
        FailureKind::SecurityPolicy => {
            warn!("recovery partition removal refused: {}", why);
            ctx.limitation = Some(SECURITY_LIMITATION.into());
            Ok(StepOutcome::Succeeded)
        }
        FailureKind::Locked => {
            Err(ResizeError::ApfsVolumesLocked { container: ctx.target.container.clone() })
        }
        FailureKind::Other => Ok(StepOutcome::Continue(why.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        apfs::strategies::{
            run,
            tests::{context, partitions, steady},
        },
        config::ResizeConfig,
        image::ImageFormat,
        mock::{fail, MockRunner},
        resize::PartitionExpansion,
    };

    #[test]
    fn recovery_container_is_deleted_then_main_grown() {
        let runner = MockRunner::new(steady);
        let config = ResizeConfig::default();
        let mut ctx =
            context(&runner, &config, ImageFormat::Sparse, Some(partitions("Apple_APFS_Recovery")), false);

        assert_eq!(run(&mut ctx).unwrap(), PartitionExpansion::Expanded {
            strategy: "remove recovery container",
        });
        assert_eq!(&runner.calls()[..3], &[
            "diskutil apfs deleteContainer disk6".to_owned(),
            "diskutil eraseVolume free none disk4s3".to_owned(),
            "diskutil apfs resizeContainer disk4s2 0".to_owned(),
        ]);
    }

    #[test]
    fn hfs_recovery_is_erased_without_deleting_a_container() {
        let runner = MockRunner::new(steady);
        let config = ResizeConfig::default();
        let mut listing = partitions("Apple_Boot");
        listing.partitions[2].identifier = "disk4s4".into();
        let mut ctx = context(&runner, &config, ImageFormat::Dmg, Some(listing), false);

        assert_eq!(RemoveRecoveryContainer.attempt(&mut ctx).unwrap(), StepOutcome::Succeeded);
        assert_eq!(runner.count("diskutil apfs deleteContainer"), 0);
        assert_eq!(runner.count("diskutil eraseVolume free none disk4s4"), 1);
    }

    #[test]
    fn security_policy_refusal_is_a_limited_success() {
        let runner = MockRunner::new(|line| {
            if line.starts_with("diskutil apfs deleteContainer") {
                fail(1, "Error: -69877: Couldn't open device (Operation not permitted)")
            } else {
                steady(line)
            }
        });
        let config = ResizeConfig::default();
        let mut ctx =
            context(&runner, &config, ImageFormat::Sparse, Some(partitions("Apple_APFS_Recovery")), false);

        match run(&mut ctx).unwrap() {
            PartitionExpansion::Limited(why) => assert!(why.contains("recovery mode")),
            other => panic!("expected a limited expansion, got {:?}", other),
        }
        assert_eq!(runner.count("diskutil eraseVolume"), 0);
    }

    #[test]
    fn blocked_erase_is_not_mistaken_for_locked_volumes() {
        let runner = MockRunner::new(|line| {
            if line.starts_with("diskutil eraseVolume") {
                fail(1, "Error: eraseVolume blocked by System Integrity Protection")
            } else {
                steady(line)
            }
        });
        let config = ResizeConfig::default();
        let mut ctx = context(&runner, &config, ImageFormat::Dmg, Some(partitions("Apple_APFS_Recovery")), false);

        assert_eq!(RemoveRecoveryContainer.attempt(&mut ctx).unwrap(), StepOutcome::Succeeded);
        assert!(ctx.limitation.is_some());
    }

    #[test]
    fn not_applicable_to_raw_images_or_without_recovery() {
        let runner = MockRunner::unused();
        let config = ResizeConfig::default();

        let mut raw = context(&runner, &config, ImageFormat::Raw, Some(partitions("Apple_APFS_Recovery")), false);
        assert_eq!(RemoveRecoveryContainer.attempt(&mut raw).unwrap(), StepOutcome::NotApplicable);

        let mut unblocked = context(&runner, &config, ImageFormat::Dmg, Some(partitions("Apple_HFS")), false);
        assert_eq!(RemoveRecoveryContainer.attempt(&mut unblocked).unwrap(), StepOutcome::NotApplicable);

        let mut unknown = context(&runner, &config, ImageFormat::Dmg, None, false);
        assert_eq!(RemoveRecoveryContainer.attempt(&mut unknown).unwrap(), StepOutcome::NotApplicable);
    }

    #[test]
    fn locked_main_container_is_never_touched() {
        let runner = MockRunner::unused();
        let config = ResizeConfig::default();
        let mut ctx =
            context(&runner, &config, ImageFormat::Sparse, Some(partitions("Apple_APFS_Recovery")), true);

        match RemoveRecoveryContainer.attempt(&mut ctx) {
            Err(ResizeError::ApfsVolumesLocked { container }) => assert_eq!(container, "disk5"),
            other => panic!("expected locked volumes error, got {:?}", other),
        }
    }
}
