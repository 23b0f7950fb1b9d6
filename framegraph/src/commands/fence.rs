//! Monotonic fence values.

use std::fmt;

/// Tag marking which batch of GPU work a deferred destruction belongs to.
///
/// Issued by the [`LifetimeManager`](crate::LifetimeManager). A value is
/// never reused; objects tagged with `N` may be destroyed once every command
/// buffer with a fence `<= N` has completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ResourceFence(pub u64);

impl ResourceFence {
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ResourceFence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "resource fence #{}", self.0)
    }
}

/// Position of a submission on the queue timeline.
///
/// Strictly increasing per [`CmdQueue`](crate::CmdQueue).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct TimelineFence(pub u64);

impl TimelineFence {
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TimelineFence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timeline #{}", self.0)
    }
}
