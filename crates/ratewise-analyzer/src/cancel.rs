//! Cooperative cancellation for CPU-bound forecast fits.
//!
//! A blocking fit cannot be aborted from outside, so it polls a token at
//! regular intervals. A token trips when it is cancelled directly, when any
//! ancestor is cancelled, or when its deadline passes.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    ancestors: Vec<Arc<AtomicBool>>,
    deadline: Option<Instant>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// A token that also trips at `deadline`.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(existing) => existing.min(deadline),
            None => deadline,
        });
        self
    }

    /// A token cancelled whenever `self` is, which can also be cancelled on its own.
    pub fn child(&self) -> Self {
        let mut ancestors = self.ancestors.clone();
        ancestors.push(Arc::clone(&self.flag));
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            ancestors,
            deadline: self.deadline,
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        if self.flag.load(Ordering::Acquire) {
            return true;
        }
        if self.ancestors.iter().any(|a| a.load(Ordering::Acquire)) {
            return true;
        }
        matches!(self.deadline, Some(d) if Instant::now() >= d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn parent_cancellation_reaches_child() {
        let parent = CancelToken::new();
        let child = parent.child();
        assert!(!child.is_cancelled());
        parent.cancel();
        assert!(child.is_cancelled());
    }

    #[test]
    fn child_cancellation_does_not_reach_parent() {
        let parent = CancelToken::new();
        let child = parent.child();
        child.cancel();
        assert!(child.is_cancelled());
        assert!(!parent.is_cancelled());
    }

    #[test]
    fn past_deadline_trips() {
        let token = CancelToken::new().with_deadline(Instant::now());
        assert!(token.is_cancelled());
        let token = CancelToken::new().with_deadline(Instant::now() + Duration::from_secs(60));
        assert!(!token.is_cancelled());
    }

    #[test]
    fn earliest_deadline_wins() {
        let now = Instant::now();
        let token = CancelToken::new()
            .with_deadline(now)
            .with_deadline(now + Duration::from_secs(60));
        assert!(token.is_cancelled());
    }
}
