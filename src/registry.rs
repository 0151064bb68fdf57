//! Debug-only registry of addresses owned by pointer-owning blocks.
//!
//! Adopting the same allocation into two independent control blocks is a
//! usage fault that ends in a double free. Debug builds keep a per-thread
//! set of adopted addresses and panic on the second adoption; release
//! builds compile every call to a no-op and leave the fault undetected.
//! Handles are `!Send`, so the thread that adopts an address is the one
//! that disposes it. Zero-sized payloads share dangling addresses and are
//! not tracked.

#[cfg(debug_assertions)]
use core::cell::RefCell;
#[cfg(debug_assertions)]
use hashbrown::HashSet;

#[cfg(debug_assertions)]
thread_local! {
    static ADOPTED: RefCell<HashSet<usize>> = RefCell::new(HashSet::new());
}

/// Zero-sized front for the per-thread adoption set.
pub(crate) struct AdoptionRegistry;

impl AdoptionRegistry {
    /// Record the address of `value` as owned by a new block. In debug
    /// builds, panics if it is already owned by a live block. Adoptions
    /// made after the set itself was destroyed go unchecked.
    #[inline]
    pub(crate) fn enter<T: ?Sized>(value: &T) {
        #[cfg(debug_assertions)]
        {
            if let Some(key) = Self::key(value) {
                // Untracked while thread locals are torn down.
                let fresh = ADOPTED
                    .try_with(|set| set.borrow_mut().insert(key))
                    .unwrap_or(true);
                assert!(
                    fresh,
                    "address {key:#x} adopted by two control blocks; it would be freed twice"
                );
            }
        }
        #[cfg(not(debug_assertions))]
        let _ = value;
    }

    /// Forget the address of `value` right before its block disposes of it.
    #[inline]
    pub(crate) fn leave<T: ?Sized>(value: &T) {
        #[cfg(debug_assertions)]
        {
            if let Some(key) = Self::key(value) {
                // The set may already be gone while thread locals are torn down.
                let _ = ADOPTED.try_with(|set| set.borrow_mut().remove(&key));
            }
        }
        #[cfg(not(debug_assertions))]
        let _ = value;
    }

    #[cfg(debug_assertions)]
    fn key<T: ?Sized>(value: &T) -> Option<usize> {
        if core::mem::size_of_val(value) == 0 {
            return None;
        }
        Some((value as *const T).cast::<()>() as usize)
    }

    #[cfg(all(test, debug_assertions))]
    pub(crate) fn contains<T: ?Sized>(value: &T) -> bool {
        Self::key(value).map_or(false, |key| ADOPTED.with(|set| set.borrow().contains(&key)))
    }
}
