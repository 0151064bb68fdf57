//! Self-observable payloads: values that can mint owners of themselves.
//!
//! A payload embeds a [`SelfObserver`] (a weak reference to itself) and
//! exposes it through [`SelfObservable`]. The registering construction
//! paths fill the observer in; the provided accessors then hand out new
//! `Shared`/`Weak` handles from `&self`. The back-reference is weak, so a
//! payload never keeps itself alive.

use crate::shared::Shared;
use crate::weak::Weak;
use core::cell::Cell;
use core::fmt;

/// Embedded weak reference from a payload to its own control block.
///
/// Stays expired for values never placed under tracked ownership.
pub struct SelfObserver<T: ?Sized> {
    slot: Cell<Weak<T>>,
}

impl<T: ?Sized> SelfObserver<T> {
    pub const fn new() -> Self {
        Self {
            slot: Cell::new(Weak::new()),
        }
    }

    fn get(&self) -> Weak<T> {
        let current = self.slot.take();
        let copy = current.clone();
        self.slot.set(current);
        copy
    }

    fn set(&self, weak: Weak<T>) {
        // The previous observer is dropped after the slot is consistent again.
        drop(self.slot.replace(weak));
    }
}

impl<T: ?Sized> Default for SelfObserver<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> fmt::Debug for SelfObserver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelfObserver")
            .field("expired", &self.get().expired())
            .finish()
    }
}

/// A payload that can hand out owners of itself.
///
/// Only the registering constructors fill the embedded observer in:
/// [`produce_observed`](crate::produce_observed),
/// [`Shared::adopt_observed`] and [`Shared::from_raw_observed`], or an
/// explicit [`Shared::register_self`]. Payloads built through plain
/// `produce`, `adopt`, `from_raw` or `From<Box<T>>` stay unregistered and
/// their accessors return empty/expired handles.
///
/// ```
/// use shared_ownership::{produce_observed, SelfObservable, SelfObserver, Shared};
///
/// struct Node {
///     me: SelfObserver<Node>,
/// }
///
/// impl SelfObservable for Node {
///     fn self_observer(&self) -> &SelfObserver<Self> {
///         &self.me
///     }
/// }
///
/// let node = produce_observed(Node { me: SelfObserver::new() });
/// let again = node.shared_from_this();
/// assert_eq!(Shared::use_count(&node), 2);
/// assert!(node == again);
/// ```
pub trait SelfObservable: 'static {
    fn self_observer(&self) -> &SelfObserver<Self>;

    /// A new owner sharing the current block, or an empty owner if `self`
    /// is not (or no longer) under tracked ownership.
    fn shared_from_this(&self) -> Shared<Self> {
        self.self_observer().get().lock()
    }

    /// A new observer of `self`; expired if `self` was never registered.
    fn weak_from_this(&self) -> Weak<Self> {
        self.self_observer().get()
    }
}

impl<T: SelfObservable + ?Sized> Shared<T> {
    /// Point the payload's embedded observer at `this` (block and exposed
    /// address). Overwrites any earlier registration; no-op when empty.
    pub fn register_self(this: &Self) {
        if let Some(payload) = Shared::get(this) {
            payload.self_observer().set(Shared::downgrade(this));
        }
    }

    /// [`Shared::adopt`] followed by [`Shared::register_self`].
    pub fn adopt_observed(payload: Box<T>) -> Self {
        let owner = Self::adopt(payload);
        Self::register_self(&owner);
        owner
    }

    /// [`Shared::from_raw`] followed by [`Shared::register_self`].
    ///
    /// # Safety
    /// Same contract as [`Shared::from_raw`].
    pub unsafe fn from_raw_observed(ptr: *mut T) -> Self {
        let owner = Self::from_raw(ptr);
        Self::register_self(&owner);
        owner
    }
}

#[cfg(test)]
mod tests {
    use super::{SelfObservable, SelfObserver};
    use crate::produce::produce_observed;
    use crate::shared::Shared;

    struct Leaf {
        me: SelfObserver<Leaf>,
        value: i32,
    }

    impl SelfObservable for Leaf {
        fn self_observer(&self) -> &SelfObserver<Self> {
            &self.me
        }
    }

    #[test]
    fn registration_adds_one_weak_reference() {
        let leaf = produce_observed(Leaf {
            me: SelfObserver::new(),
            value: 3,
        });
        assert_eq!(Shared::use_count(&leaf), 1);
        assert_eq!(Shared::weak_count(&leaf), 1);
        assert_eq!(leaf.shared_from_this().value, 3);
    }

    #[test]
    fn reregistration_overwrites_previous_observer() {
        let leaf = produce_observed(Leaf {
            me: SelfObserver::new(),
            value: 1,
        });
        Shared::register_self(&leaf);
        assert_eq!(Shared::weak_count(&leaf), 1);
    }

    #[test]
    fn debug_reports_expiry() {
        let loose = SelfObserver::<Leaf>::new();
        assert_eq!(format!("{loose:?}"), "SelfObserver { expired: true }");
    }
}
