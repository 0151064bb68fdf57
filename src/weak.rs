use crate::block::BlockRef;
use crate::shared::Shared;
use crate::tokens::WeakToken;
use core::fmt;
use core::mem;
use core::ptr::NonNull;

struct WeakLink<T: ?Sized> {
    ptr: NonNull<T>,
    block: BlockRef,
    token: WeakToken,
}

/// Non-owning observer of a payload held by [`Shared`] owners.
///
/// A `Weak` keeps the control block allocated (so counts stay queryable)
/// but never keeps the payload alive. Use [`Weak::lock`] or
/// [`Weak::upgrade`] to obtain an owner while the payload still exists.
pub struct Weak<T: ?Sized> {
    link: Option<WeakLink<T>>,
}

impl<T: ?Sized> Weak<T> {
    /// An observer of nothing; permanently expired.
    pub const fn new() -> Self {
        Self { link: None }
    }

    pub(crate) fn from_parts(ptr: NonNull<T>, block: BlockRef, token: WeakToken) -> Self {
        Self {
            link: Some(WeakLink { ptr, block, token }),
        }
    }

    /// Number of strong references to the observed payload; 0 once it has
    /// been disposed or if this observer is empty.
    pub fn use_count(&self) -> usize {
        self.link.as_ref().map_or(0, |l| l.block.counts().strong())
    }

    /// Number of weak references to the observed block, this one included.
    /// While the payload's destructor runs the block holds one extra.
    pub fn weak_count(&self) -> usize {
        self.link.as_ref().map_or(0, |l| l.block.counts().weak())
    }

    pub fn expired(&self) -> bool {
        self.use_count() == 0
    }

    /// A new owner if the payload is alive, `None` otherwise.
    pub fn upgrade(&self) -> Option<Shared<T>> {
        let link = self.link.as_ref()?;
        let token = link.block.try_acquire_strong()?;
        Some(Shared::from_parts(link.ptr, link.block, token))
    }

    /// A new owner if the payload is alive, an empty owner otherwise.
    /// Never fails; see [`Shared::promote`] for the raising variant.
    pub fn lock(&self) -> Shared<T> {
        self.upgrade().unwrap_or_default()
    }

    /// Stop observing and become empty.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn swap(&mut self, other: &mut Self) {
        mem::swap(&mut self.link, &mut other.link);
    }

    /// The observed address, even after the payload has been disposed.
    /// Only dereference it while an owner keeps the payload alive.
    pub fn as_ptr(&self) -> Option<NonNull<T>> {
        self.link.as_ref().map(|l| l.ptr)
    }

    /// True when both observers watch the same address, or both are empty.
    pub fn ptr_eq<U: ?Sized>(&self, other: &Weak<U>) -> bool {
        self.addr() == other.addr()
    }

    fn addr(&self) -> *const () {
        self.link
            .as_ref()
            .map_or(core::ptr::null(), |l| l.ptr.as_ptr().cast::<()>().cast_const())
    }
}

impl<T: ?Sized> Default for Weak<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> Clone for Weak<T> {
    fn clone(&self) -> Self {
        match &self.link {
            None => Self::new(),
            Some(link) => Self::from_parts(link.ptr, link.block, link.block.acquire_weak()),
        }
    }
}

impl<T: ?Sized> Drop for Weak<T> {
    fn drop(&mut self) {
        if let Some(WeakLink { block, token, .. }) = self.link.take() {
            // SAFETY: `token` was minted by `block`.
            unsafe { block.release_weak(token) }
        }
    }
}

impl<T: ?Sized> From<&Shared<T>> for Weak<T> {
    fn from(owner: &Shared<T>) -> Self {
        Shared::downgrade(owner)
    }
}

impl<T: ?Sized> fmt::Debug for Weak<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(Weak)")
    }
}
