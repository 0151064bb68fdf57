use crate::block::BlockRef;
use crate::error::{AllocError, ExpiredError};
use crate::tokens::StrongToken;
use crate::weak::Weak;
use core::fmt;
use core::hash::{Hash, Hasher};
use core::marker::PhantomData;
use core::mem;
use core::ops::Deref;
use core::ptr::{self, NonNull};
use std::alloc::handle_alloc_error;

/// Owning half of a populated handle: the exposed address, the block
/// tracking the lifetime, and the strong token minted for this handle.
struct Link<T: ?Sized> {
    ptr: NonNull<T>,
    block: BlockRef,
    token: StrongToken,
}

/// Shared, reference-counted owner of a heap value.
///
/// `Clone` adds a strong reference; dropping (or `reset`) removes one. The
/// payload is dropped when the last strong reference goes away, and the
/// control block is freed once no `Weak` observes it either.
///
/// The exposed address and the tracked lifetime are independent: an
/// aliased owner (see [`Shared::map`]) dereferences to a sub-object while
/// keeping the whole original payload alive.
///
/// A `Shared` may be empty. Empty owners come from [`Shared::empty`],
/// `Default`, [`Shared::take`], [`Shared::reset`] and [`Weak::lock`] on an
/// expired observer.
///
/// Counts are plain integers, so `Shared` is neither `Send` nor `Sync`.
/// Functions on `Shared` are associated functions (`Shared::use_count(&s)`)
/// so they never shadow methods of the payload reached through `Deref`.
pub struct Shared<T: ?Sized> {
    link: Option<Link<T>>,
    _owns: PhantomData<T>,
}

impl<T: ?Sized + 'static> Shared<T> {
    /// Take ownership of a boxed value, tracking it with a separately
    /// allocated control block.
    ///
    /// Does not register a `SelfObservable` payload; use
    /// [`Shared::adopt_observed`] for those.
    pub fn adopt(payload: Box<T>) -> Self {
        Self::try_adopt(payload).unwrap_or_else(|e| handle_alloc_error(e.layout()))
    }

    /// Like [`Shared::adopt`], but reports allocation failure. On error the
    /// payload has been dropped and no owner exists.
    pub fn try_adopt(payload: Box<T>) -> Result<Self, AllocError> {
        let raw = NonNull::from(Box::leak(payload));
        // SAFETY: `raw` comes from a Box we owned exclusively.
        match unsafe { BlockRef::adopt(raw) } {
            Ok((block, token)) => Ok(Self::from_parts(raw, block, token)),
            Err(e) => {
                // SAFETY: adoption failed, so we still own the allocation.
                drop(unsafe { Box::from_raw(raw.as_ptr()) });
                Err(e)
            }
        }
    }

    /// Adopt a pointer obtained from `Box::into_raw`. A null pointer
    /// yields an empty owner.
    ///
    /// # Safety
    /// `ptr` must be null or come from `Box::into_raw`, and must not be
    /// adopted by any other owner. Adopting the same address twice frees
    /// it twice; debug builds detect this and panic.
    pub unsafe fn from_raw(ptr: *mut T) -> Self {
        match NonNull::new(ptr) {
            None => Self::empty(),
            Some(raw) => match BlockRef::adopt(raw) {
                Ok((block, token)) => Self::from_parts(raw, block, token),
                Err(e) => {
                    drop(Box::from_raw(ptr));
                    handle_alloc_error(e.layout())
                }
            },
        }
    }

    /// Release the current payload, then adopt `payload` in its place.
    pub fn reset_with(this: &mut Self, payload: Box<T>) {
        Self::reset(this);
        *this = Self::adopt(payload);
    }
}

impl<T: ?Sized> Shared<T> {
    pub(crate) fn from_parts(ptr: NonNull<T>, block: BlockRef, token: StrongToken) -> Self {
        Self {
            link: Some(Link { ptr, block, token }),
            _owns: PhantomData,
        }
    }

    /// An owner with no payload and no control block.
    pub const fn empty() -> Self {
        Self {
            link: None,
            _owns: PhantomData,
        }
    }

    /// Raising promotion: a new owner of the payload `weak` observes, or
    /// `ExpiredError` if it has already been disposed.
    pub fn promote(weak: &Weak<T>) -> Result<Self, ExpiredError> {
        weak.upgrade().ok_or(ExpiredError)
    }

    /// Aliasing constructor: share `this`'s block and strong count but
    /// expose `ptr`. Returns an empty owner when `this` is empty.
    ///
    /// # Safety
    /// `ptr` must stay valid for as long as the payload tracked by `this`
    /// is alive, e.g. because it points into that payload.
    pub unsafe fn alias<U: ?Sized>(this: &Self, ptr: NonNull<U>) -> Shared<U> {
        match &this.link {
            None => Shared::empty(),
            Some(link) => Shared::from_parts(ptr, link.block, link.block.acquire_strong()),
        }
    }

    /// Safe aliasing: a new owner exposing the part of the payload picked
    /// by `project`, keeping the whole payload alive.
    pub fn map<U: ?Sized, F>(this: &Self, project: F) -> Shared<U>
    where
        F: FnOnce(&T) -> &U,
    {
        match &this.link {
            None => Shared::empty(),
            Some(link) => {
                // SAFETY: the strong token in `link` keeps the payload alive.
                let part = NonNull::from(project(unsafe { link.ptr.as_ref() }));
                Shared::from_parts(part, link.block, link.block.acquire_strong())
            }
        }
    }

    /// Like [`Shared::map`], but moves `this`'s strong reference into the
    /// result instead of adding one.
    pub fn map_into<U: ?Sized, F>(mut this: Self, project: F) -> Shared<U>
    where
        F: FnOnce(&T) -> &U,
    {
        let Some(whole) = Self::as_ptr(&this) else {
            return Shared::empty();
        };
        // SAFETY: `this` keeps the payload alive; if `project` unwinds,
        // dropping `this` releases its strong reference as usual.
        let part = NonNull::from(project(unsafe { whole.as_ref() }));
        match this.link.take() {
            Some(Link { block, token, .. }) => Shared::from_parts(part, block, token),
            None => Shared::empty(),
        }
    }

    /// New weak observer of the same payload.
    pub fn downgrade(this: &Self) -> Weak<T> {
        match &this.link {
            None => Weak::new(),
            Some(link) => Weak::from_parts(link.ptr, link.block, link.block.acquire_weak()),
        }
    }

    /// Number of strong references to the payload; 0 for an empty owner.
    pub fn use_count(this: &Self) -> usize {
        this.link.as_ref().map_or(0, |l| l.block.counts().strong())
    }

    /// Number of weak references to the payload's block; 0 for an empty
    /// owner.
    pub fn weak_count(this: &Self) -> usize {
        this.link.as_ref().map_or(0, |l| l.block.counts().weak())
    }

    pub fn is_empty(this: &Self) -> bool {
        this.link.is_none()
    }

    /// The exposed payload, or `None` for an empty owner.
    pub fn get(this: &Self) -> Option<&T> {
        // SAFETY: the strong token keeps the payload alive while `this` is borrowed.
        this.link.as_ref().map(|l| unsafe { l.ptr.as_ref() })
    }

    /// The exposed address, or `None` for an empty owner.
    pub fn as_ptr(this: &Self) -> Option<NonNull<T>> {
        this.link.as_ref().map(|l| l.ptr)
    }

    /// True when both owners expose the same address (aliasing-aware, so
    /// the same as `==`).
    pub fn ptr_eq<U: ?Sized>(this: &Self, other: &Shared<U>) -> bool {
        this.addr() == other.addr()
    }

    /// True when both owners track the same lifetime, whatever addresses
    /// they expose.
    pub fn same_block<U: ?Sized>(this: &Self, other: &Shared<U>) -> bool {
        match (&this.link, &other.link) {
            (Some(a), Some(b)) => a.block.same_block(b.block),
            _ => false,
        }
    }

    /// Move the contents out, leaving `this` empty. Counts are unchanged.
    pub fn take(this: &mut Self) -> Self {
        mem::take(this)
    }

    /// Give up this strong reference and become empty.
    pub fn reset(this: &mut Self) {
        *this = Self::empty();
    }

    /// Exchange the contents of two owners without touching any count.
    pub fn swap(this: &mut Self, other: &mut Self) {
        mem::swap(&mut this.link, &mut other.link);
    }

    fn addr(&self) -> *const () {
        self.link
            .as_ref()
            .map_or(ptr::null(), |l| l.ptr.as_ptr().cast::<()>().cast_const())
    }
}

impl<T: ?Sized> Default for Shared<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T: ?Sized> Clone for Shared<T> {
    fn clone(&self) -> Self {
        match &self.link {
            None => Self::empty(),
            Some(link) => Self::from_parts(link.ptr, link.block, link.block.acquire_strong()),
        }
    }
}

impl<T: ?Sized> Drop for Shared<T> {
    fn drop(&mut self) {
        if let Some(Link { block, token, .. }) = self.link.take() {
            // SAFETY: `token` was minted by `block`.
            unsafe { block.release_strong(token) }
        }
    }
}

impl<T: ?Sized> Deref for Shared<T> {
    type Target = T;

    /// # Panics
    /// Panics if the owner is empty.
    fn deref(&self) -> &T {
        match Shared::get(self) {
            Some(value) => value,
            None => panic!("dereferenced an empty Shared"),
        }
    }
}

impl<T: ?Sized + 'static> From<Box<T>> for Shared<T> {
    fn from(payload: Box<T>) -> Self {
        Self::adopt(payload)
    }
}

impl<T: ?Sized> TryFrom<&Weak<T>> for Shared<T> {
    type Error = ExpiredError;

    fn try_from(weak: &Weak<T>) -> Result<Self, ExpiredError> {
        Self::promote(weak)
    }
}

impl<T: ?Sized, U: ?Sized> PartialEq<Shared<U>> for Shared<T> {
    fn eq(&self, other: &Shared<U>) -> bool {
        self.addr() == other.addr()
    }
}

impl<T: ?Sized> Eq for Shared<T> {}

impl<T: ?Sized> Hash for Shared<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (self.addr() as usize).hash(state);
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for Shared<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match Shared::get(self) {
            Some(value) => fmt::Debug::fmt(value, f),
            None => f.write_str("Empty"),
        }
    }
}

impl<T: ?Sized> fmt::Pointer for Shared<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Pointer::fmt(&self.addr(), f)
    }
}
