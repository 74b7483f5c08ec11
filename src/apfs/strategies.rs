//! The ordered fallbacks through which a resolved container is grown.

use super::{escalate, recovery::RemoveRecoveryContainer, ContainerResizer, ContainerTarget};
use crate::{
    config::ResizeConfig,
    external::{
        diskutil::{self, ContainerSize},
        ApfsListing, CommandRunner, PartitionListing,
    },
    image::ImageFormat,
    resize::{PartitionExpansion, ResizeError},
};

/// The result of a single strategy. Errors returned alongside these end the sequence.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum StepOutcome {
    Succeeded,
    NotApplicable,
    /// Failed, but a later strategy may still succeed.
    Continue(String),
}

/// Everything the strategies know about the attached image.
pub(crate) struct ExpansionContext<'a> {
    pub runner:     &'a dyn CommandRunner,
    pub config:     &'a ResizeConfig,
    pub format:     ImageFormat,
    pub target:     ContainerTarget,
    /// Every container known to the host when the image was attached.
    pub listing:    ApfsListing,
    pub partitions: Option<PartitionListing>,
    /// Set by a strategy which succeeded without reclaiming all of the space.
    pub limitation: Option<String>,
}

impl<'a> ExpansionContext<'a> {
    pub fn resizer(&self) -> ContainerResizer<'_> { ContainerResizer::new(self.runner, self.config) }

    /// The recovery partition directly following the container's physical store.
    pub fn blocking_recovery(&self) -> Option<String> {
        let store = self.target.physical_store.as_ref()?;
        self.partitions
            .as_ref()?
            .recovery_after(store)
            .map(|partition| partition.identifier.clone())
    }
}

pub(crate) trait ExpansionStrategy {
    fn name(&self) -> &'static str;

    fn attempt(&self, ctx: &mut ExpansionContext) -> Result<StepOutcome, ResizeError>;
}

/// Grows the resolved container through the container resizer.
pub(crate) struct ResizeResolvedContainer;

impl ExpansionStrategy for ResizeResolvedContainer {
    fn name(&self) -> &'static str { "resize resolved container" }

    fn attempt(&self, ctx: &mut ExpansionContext) -> Result<StepOutcome, ResizeError> {
        match ctx.resizer().resize(&ctx.target) {
            Ok(()) => Ok(StepOutcome::Succeeded),
            Err(why @ ResizeError::ApfsVolumesLocked { .. }) => Err(why),
            Err(why) => Ok(StepOutcome::Continue(why.to_string())),
        }
    }
}

/// Grows the physical store with no limit, regardless of the recovery partition behind it.
pub(crate) struct ResizePhysicalStoreUnbounded;

impl ExpansionStrategy for ResizePhysicalStoreUnbounded {
    fn name(&self) -> &'static str { "resize physical store without limit" }

    fn attempt(&self, ctx: &mut ExpansionContext) -> Result<StepOutcome, ResizeError> {
        if ctx.blocking_recovery().is_none() {
            return Ok(StepOutcome::NotApplicable);
        }

        let store = match ctx.target.physical_store {
            Some(ref store) => store,
            None => return Ok(StepOutcome::NotApplicable),
        };

        match diskutil::resize_container(ctx.runner, store, ContainerSize::Maximum) {
            Ok(()) => Ok(StepOutcome::Succeeded),
            Err(why) => match escalate(why, &ctx.target.container) {
                why @ ResizeError::ApfsVolumesLocked { .. } => Err(why),
                why => Ok(StepOutcome::Continue(why.to_string())),
            },
        }
    }
}

fn strategies() -> [&'static dyn ExpansionStrategy; 3] {
    [&RemoveRecoveryContainer, &ResizeResolvedContainer, &ResizePhysicalStoreUnbounded]
}

/// Tries each strategy in turn until one succeeds. Locked volumes end the sequence with
/// an error; any other failure moves on to the next strategy.
pub(crate) fn run(ctx: &mut ExpansionContext) -> Result<PartitionExpansion, ResizeError> {
    let mut failures = Vec::new();

    for strategy in strategies().iter() {
        match strategy.attempt(ctx)? {
            StepOutcome::Succeeded => {
                info!("APFS container {} expanded: {}", ctx.target.container, strategy.name());
                return Ok(match ctx.limitation.take() {
                    Some(limitation) => PartitionExpansion::Limited(limitation),
                    None => PartitionExpansion::Expanded { strategy: strategy.name() },
                });
            }
            StepOutcome::NotApplicable => debug!("{}: not applicable", strategy.name()),
            StepOutcome::Continue(why) => {
                warn!("{} failed: {}", strategy.name(), why);
                failures.push(format!("{}: {}", strategy.name(), why));
            }
        }
    }

    Ok(PartitionExpansion::Failed(failures.join("; ")))
}
