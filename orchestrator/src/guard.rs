use std::sync::atomic::{AtomicBool, Ordering};

/// Holds a flag raised until dropped.
#[must_use]
pub(crate) struct FlagGuard<'a>(&'a AtomicBool);

impl<'a> FlagGuard<'a> {
    /// Raises `flag` unless it's already raised.
    pub(crate) fn try_acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for FlagGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn at_most_one_holder() {
        let flag = AtomicBool::new(false);

        let guard = FlagGuard::try_acquire(&flag).unwrap();
        assert!(FlagGuard::try_acquire(&flag).is_none());

        drop(guard);
        assert!(!flag.load(Ordering::Acquire));
        assert!(FlagGuard::try_acquire(&flag).is_some());
    }
}
