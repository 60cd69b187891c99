// SPDX-License-Identifier: AGPL-3.0-only

//! Cluster barrier
//!
//! The barrier is a platform primitive; the pipeline only needs "no unit
//! passes until every unit has arrived". It is also the only point at which
//! outstanding transfers are guaranteed to have landed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cluster-wide rendezvous.
pub trait ClusterBarrier: Send + Sync {
    /// Block until every unit of the cluster has called `barrier`.
    fn barrier(&self);
}

impl ClusterBarrier for std::sync::Barrier {
    fn barrier(&self) {
        self.wait();
    }
}

#[derive(Debug, Default)]
struct CancelState {
    raised: AtomicBool,
    parent: Option<CancelToken>,
}

/// Shared stop flag for a pipeline run.
///
/// Raising it makes every unit skip the stage work of the remaining
/// iterations while still calling the barrier, so all units leave the run
/// together instead of one of them waiting forever.
///
/// A token never lowers. Long-lived owners hand each run a
/// [`child`](Self::child): the run sees its parent being raised, but a
/// failing run only raises its own child.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<CancelState>);

impl CancelToken {
    /// Create a token that is not raised.
    pub fn new() -> Self {
        Self::default()
    }

    /// New token that is raised when either it or `self` is raised.
    #[must_use]
    pub fn child(&self) -> Self {
        Self(Arc::new(CancelState {
            raised: AtomicBool::new(false),
            parent: Some(self.clone()),
        }))
    }

    /// Raise the token.
    pub fn cancel(&self) {
        self.0.raised.store(true, Ordering::Release);
    }

    /// True once this token or one of its parents is raised.
    pub fn is_cancelled(&self) -> bool {
        self.0.raised.load(Ordering::Acquire)
            || self.0.parent.as_ref().is_some_and(Self::is_cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Barrier;

    #[test]
    fn no_unit_passes_early() {
        let barrier = Barrier::new(4);
        let arrived = AtomicUsize::new(0);
        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    arrived.fetch_add(1, Ordering::SeqCst);
                    ClusterBarrier::barrier(&barrier);
                    assert_eq!(arrived.load(Ordering::SeqCst), 4);
                });
            }
        });
    }

    #[test]
    fn cancel_is_shared() {
        let token = CancelToken::new();
        let other = token.clone();
        assert!(!other.is_cancelled());
        token.cancel();
        assert!(other.is_cancelled());
    }

    #[test]
    fn child_follows_parent_but_not_back() {
        let parent = CancelToken::new();
        let run = parent.child();
        run.cancel();
        assert!(run.is_cancelled());
        assert!(!parent.is_cancelled());

        let next = parent.child();
        assert!(!next.is_cancelled());
        parent.cancel();
        assert!(next.is_cancelled());
    }
}
