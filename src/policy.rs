//! Fault policies consulted by the stream decorators.
//!
//! A policy maps each decorated operation to a [`Verdict`]. Three
//! policies cover the fault shapes the harness injects:
//!
//! - [`KillSwitch`] - one shared flag denies every operation while off
//! - [`Conditional`] - denies operations touching messages that fail a predicate
//! - [`SkipMatching`] - silently drops messages matched by a predicate
//!
//! [`Passthrough`] is the explicit no-op policy; it is what gets
//! registered for message types an interceptor does not target, so
//! non-target calls behave exactly as if undecorated.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Outcome of a policy check for one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Let the operation through.
    Allow,
    /// Fail the operation with `Unavailable`; nothing is forwarded.
    Deny,
    /// Consume the message without forwarding it and without error.
    Skip,
}

/// Per-message-type fault policy.
///
/// `check_call` runs before operations that have no message at hand
/// (advancing a reader); `check_message` runs against each message
/// produced or written; `check_close` gates writer completion.
pub trait FaultPolicy<T>: Send + Sync {
    fn check_call(&self) -> Verdict {
        Verdict::Allow
    }

    fn check_message(&self, message: &T) -> Verdict;

    fn check_close(&self) -> Verdict {
        Verdict::Allow
    }
}

/// Whole-call availability flag shared by every stream one interceptor
/// decorates.
///
/// The flag is read with relaxed ordering: a flip takes effect on the
/// next check, never for an operation already past its check. That is
/// the only ordering this fault generator promises.
#[derive(Clone)]
pub struct KillSwitch {
    available: Arc<AtomicBool>,
}

impl KillSwitch {
    pub fn new() -> Self {
        Self {
            available: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Handle through which test code flips availability.
    pub fn switch(&self) -> AvailabilitySwitch {
        AvailabilitySwitch(Arc::clone(&self.available))
    }

    fn verdict(&self) -> Verdict {
        if self.available.load(Ordering::Relaxed) {
            Verdict::Allow
        } else {
            Verdict::Deny
        }
    }
}

impl Default for KillSwitch {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> FaultPolicy<T> for KillSwitch {
    fn check_call(&self) -> Verdict {
        self.verdict()
    }

    fn check_message(&self, _message: &T) -> Verdict {
        self.verdict()
    }

    fn check_close(&self) -> Verdict {
        self.verdict()
    }
}

/// Shared handle to a [`KillSwitch`] flag, held by test code.
#[derive(Clone)]
pub struct AvailabilitySwitch(Arc<AtomicBool>);

impl AvailabilitySwitch {
    /// Flip availability. Effective on the next policy check.
    pub fn set(&self, available: bool) {
        self.0.store(available, Ordering::Relaxed);
    }

    pub fn is_available(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Content-conditional availability: the predicate returns true for
/// messages that are allowed through.
pub struct Conditional<T> {
    allow: Arc<dyn Fn(&T) -> bool + Send + Sync>,
}

impl<T> Conditional<T> {
    pub fn new(allow: impl Fn(&T) -> bool + Send + Sync + 'static) -> Self {
        Self {
            allow: Arc::new(allow),
        }
    }
}

impl<T> Clone for Conditional<T> {
    fn clone(&self) -> Self {
        Self {
            allow: Arc::clone(&self.allow),
        }
    }
}

impl<T> FaultPolicy<T> for Conditional<T> {
    fn check_message(&self, message: &T) -> Verdict {
        if (self.allow)(message) {
            Verdict::Allow
        } else {
            Verdict::Deny
        }
    }
}

/// Silent message loss: the predicate returns true for messages to drop.
pub struct SkipMatching<T> {
    skip: Arc<dyn Fn(&T) -> bool + Send + Sync>,
}

impl<T> SkipMatching<T> {
    pub fn new(skip: impl Fn(&T) -> bool + Send + Sync + 'static) -> Self {
        Self {
            skip: Arc::new(skip),
        }
    }
}

impl<T> Clone for SkipMatching<T> {
    fn clone(&self) -> Self {
        Self {
            skip: Arc::clone(&self.skip),
        }
    }
}

impl<T> FaultPolicy<T> for SkipMatching<T> {
    fn check_message(&self, message: &T) -> Verdict {
        if (self.skip)(message) {
            Verdict::Skip
        } else {
            Verdict::Allow
        }
    }
}

/// Allows everything. The strategy registered for message types an
/// interceptor is not configured to affect.
#[derive(Debug, Clone, Copy, Default)]
pub struct Passthrough;

impl<T> FaultPolicy<T> for Passthrough {
    fn check_message(&self, _message: &T) -> Verdict {
        Verdict::Allow
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kill_switch_starts_available() {
        let policy = KillSwitch::new();
        assert_eq!(FaultPolicy::<u32>::check_call(&policy), Verdict::Allow);
        assert_eq!(policy.check_message(&7u32), Verdict::Allow);
    }

    #[test]
    fn test_kill_switch_flip_is_reversible() {
        let policy = KillSwitch::new();
        let switch = policy.switch();

        switch.set(false);
        assert!(!switch.is_available());
        assert_eq!(FaultPolicy::<u32>::check_call(&policy), Verdict::Deny);
        assert_eq!(FaultPolicy::<u32>::check_close(&policy), Verdict::Deny);

        switch.set(true);
        assert_eq!(FaultPolicy::<u32>::check_call(&policy), Verdict::Allow);
    }

    #[test]
    fn test_conditional_denies_exactly_failing_messages() {
        let policy = Conditional::new(|n: &u32| *n % 2 == 0);
        assert_eq!(policy.check_message(&4), Verdict::Allow);
        assert_eq!(policy.check_message(&5), Verdict::Deny);
        assert_eq!(policy.check_call(), Verdict::Allow);
        assert_eq!(policy.check_close(), Verdict::Allow);
    }

    #[test]
    fn test_skip_matching_never_denies() {
        let policy = SkipMatching::new(|n: &u32| *n == 3);
        assert_eq!(policy.check_message(&3), Verdict::Skip);
        assert_eq!(policy.check_message(&4), Verdict::Allow);
        assert_eq!(policy.check_call(), Verdict::Allow);
    }

    #[test]
    fn test_passthrough_allows_everything() {
        let policy = Passthrough;
        assert_eq!(policy.check_message(&"anything"), Verdict::Allow);
        assert_eq!(FaultPolicy::<&str>::check_call(&policy), Verdict::Allow);
    }
}
