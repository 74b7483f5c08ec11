use crate::external::Retry;

pub const KIB: u64 = 1024;
pub const MIB: u64 = KIB * 1024;
pub const GIB: u64 = MIB * 1024;
pub const TIB: u64 = GIB * 1024;

/// Tunables for a resize, passed explicitly to every resize rather than read from
/// process-wide defaults.
#[derive(Debug, Clone, PartialEq, SmartDefault)]
pub struct ResizeConfig {
    /// Treat Mac guests as though their volumes were not APFS, leaving the partition
    /// layout and containers untouched.
    pub assume_non_apfs: bool,
    /// Largest size an image may be grown to.
    #[default(512 * GIB)]
    pub maximum_size:    u64,
    /// How far below its ceiling a container is shrunk to force its ceiling to be
    /// recomputed.
    #[default(32 * MIB)]
    pub nudge_shrink:    u64,
    /// How far a container's ceiling may fall short of its physical store before it
    /// is nudged.
    #[default(MIB)]
    pub nudge_tolerance: u64,
    #[default = 4096]
    pub nudge_alignment: u64,
    #[default = 3]
    pub detach_attempts: u32,
    /// Milliseconds between detach attempts.
    #[default = 1000]
    pub detach_interval: u64,
}

impl ResizeConfig {
    pub(crate) fn detach_retry(&self) -> Retry {
        Retry::default().attempts(self.detach_attempts).interval(self.detach_interval)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ResizeConfig::default();
        assert!(!config.assume_non_apfs);
        assert_eq!(config.maximum_size, 549_755_813_888);
        assert_eq!(config.nudge_shrink, 33_554_432);
        assert_eq!(config.nudge_tolerance, 1_048_576);
        assert_eq!(config.nudge_alignment, 4096);
        assert_eq!(config.detach_attempts, 3);
        assert_eq!(config.detach_interval, 1000);
    }
}
