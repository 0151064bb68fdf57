//! Debug-only control block lifecycle tracker.
//!
//! Records whether a block's payload has been disposed. In debug builds,
//! disposing twice or destroying the block before disposal panics. In
//! release builds, this compiles to a zero-cost no-op.

#[cfg(debug_assertions)]
use core::cell::Cell;
use core::marker::PhantomData;

/// Per-block phase tracker. Embedded in the counts header of every block.
#[derive(Debug)]
pub(crate) struct DebugLifecycle {
    #[cfg(debug_assertions)]
    disposed: Cell<bool>,
    // Keep !Send + !Sync in line with single-threaded design.
    _nosend: PhantomData<*mut ()>,
}

impl DebugLifecycle {
    pub(crate) const fn new() -> Self {
        Self {
            #[cfg(debug_assertions)]
            disposed: Cell::new(false),
            _nosend: PhantomData,
        }
    }

    /// Mark the payload as disposed. In debug builds, panics on a second call.
    #[inline]
    pub(crate) fn on_dispose(&self) {
        #[cfg(debug_assertions)]
        {
            assert!(!self.disposed.get(), "payload disposed twice");
            self.disposed.set(true);
        }
    }

    /// Check that the block may be freed. In debug builds, panics if the
    /// payload has not been disposed yet.
    #[inline]
    pub(crate) fn on_destroy(&self) {
        #[cfg(debug_assertions)]
        assert!(
            self.disposed.get(),
            "control block destroyed before its payload was disposed"
        );
    }
}
