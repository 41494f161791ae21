//! Failure injection for the mock control plane
//!
//! Lets tests make individual control-plane calls fail, optionally only the
//! first N times.

use std::collections::HashMap;
use std::time::Duration;

use super::{ControlPlaneError, ResourceKind};

/// Control-plane call kinds, used as injection and call-log keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    FindImage,
    FindFlavor,
    FindNetwork,
    CreateVolume,
    GetVolume,
    CreateInstance,
    GetInstance,
    ConsoleOutput,
    DeleteInstance,
    DeleteVolume,
    Ping,
    ListImages,
    ListFlavors,
    ListNetworks,
}

impl Op {
    /// True for calls that create or delete remote resources
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            Op::CreateVolume | Op::CreateInstance | Op::DeleteInstance | Op::DeleteVolume
        )
    }
}

/// Failure configuration for an operation
#[derive(Debug, Clone)]
pub struct FailureConfig {
    /// Error to return (if any)
    pub error: Option<ControlPlaneError>,
    /// Delay to add before responding
    pub delay: Option<Duration>,
    /// Number of times to fail before succeeding (None = always fail)
    pub fail_count: Option<u32>,
}

impl FailureConfig {
    /// Fail with a generic remote error
    pub fn remote(message: impl Into<String>) -> Self {
        Self {
            error: Some(ControlPlaneError::Remote(message.into())),
            delay: None,
            fail_count: None,
        }
    }

    /// Fail as if the named resource did not exist
    pub fn not_found(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            error: Some(ControlPlaneError::NotFound {
                kind,
                name: name.into(),
            }),
            delay: None,
            fail_count: None,
        }
    }

    /// Only add delay
    pub fn delay(duration: Duration) -> Self {
        Self {
            error: None,
            delay: Some(duration),
            fail_count: None,
        }
    }

    /// Set the number of times to fail before succeeding
    pub fn with_fail_count(mut self, count: u32) -> Self {
        self.fail_count = Some(count);
        self
    }
}

/// Per-operation failure injector
#[derive(Debug, Default)]
pub struct FailureInjector {
    configs: HashMap<Op, FailureConfig>,
    /// Call counts per operation (for fail_count tracking)
    call_counts: HashMap<Op, u32>,
}

impl FailureInjector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inject a failure for an operation
    pub fn inject(&mut self, op: Op, config: FailureConfig) {
        self.configs.insert(op, config);
        self.call_counts.insert(op, 0);
    }

    /// Clear all failure injections
    pub fn clear(&mut self) {
        self.configs.clear();
        self.call_counts.clear();
    }

    /// Clear failure injection for a specific operation
    pub fn clear_op(&mut self, op: Op) {
        self.configs.remove(&op);
        self.call_counts.remove(&op);
    }

    /// Check if a failure should occur for an operation
    pub fn check(&mut self, op: Op) -> Option<&FailureConfig> {
        let config = self.configs.get(&op)?;
        let count = self.call_counts.entry(op).or_insert(0);
        *count += 1;

        if let Some(fail_limit) = config.fail_count {
            if *count > fail_limit {
                return None;
            }
        }

        Some(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_config_not_found() {
        let config = FailureConfig::not_found(ResourceKind::Image, "centos");
        assert!(matches!(
            config.error,
            Some(ControlPlaneError::NotFound {
                kind: ResourceKind::Image,
                ..
            })
        ));
    }

    #[test]
    fn test_failure_injector_basic() {
        let mut injector = FailureInjector::new();
        assert!(injector.check(Op::Ping).is_none());

        injector.inject(Op::CreateVolume, FailureConfig::remote("quota exceeded"));
        let config = injector.check(Op::CreateVolume).unwrap();
        assert_eq!(
            config.error,
            Some(ControlPlaneError::Remote("quota exceeded".to_string()))
        );
    }

    #[test]
    fn test_failure_injector_fail_count() {
        let mut injector = FailureInjector::new();

        // Fail twice, then succeed
        injector.inject(
            Op::GetInstance,
            FailureConfig::remote("503").with_fail_count(2),
        );

        assert!(injector.check(Op::GetInstance).is_some());
        assert!(injector.check(Op::GetInstance).is_some());
        assert!(injector.check(Op::GetInstance).is_none());
    }

    #[test]
    fn test_failure_injector_clear() {
        let mut injector = FailureInjector::new();

        injector.inject(Op::DeleteVolume, FailureConfig::remote("busy"));
        assert!(injector.check(Op::DeleteVolume).is_some());

        injector.clear_op(Op::DeleteVolume);
        assert!(injector.check(Op::DeleteVolume).is_none());
    }

    #[test]
    fn test_mutation_ops() {
        assert!(Op::CreateInstance.is_mutation());
        assert!(Op::DeleteVolume.is_mutation());
        assert!(!Op::FindImage.is_mutation());
        assert!(!Op::GetVolume.is_mutation());
    }
}
