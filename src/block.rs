//! Control blocks: out-of-band strong/weak counts and two-phase teardown.
//!
//! A block is created with one strong token already minted. Returning the
//! last strong token disposes the payload; the block's own memory is freed
//! once both counts are zero, by whichever release made the second count
//! reach zero. Two layouts exist and are chosen once, at construction:
//!
//! - `PtrBlock<T>` points at a payload adopted from a `Box<T>`; disposal
//!   frees that separate allocation.
//! - `InlineBlock<T>` stores the payload next to the counts; disposal only
//!   runs the payload's destructor and the memory goes away with the block.

use crate::error::AllocError;
use crate::lifecycle::DebugLifecycle;
use crate::registry::AdoptionRegistry;
use crate::tokens::{Count, StrongCount, StrongToken, WeakCount, WeakToken};
use core::alloc::Layout;
use core::cell::UnsafeCell;
use core::mem::{self, MaybeUninit};
use core::ptr::{self, NonNull};
use std::alloc::{alloc, dealloc};

/// Counts header embedded at the start of every block.
#[derive(Debug)]
pub(crate) struct Counts {
    strong: StrongCount,
    weak: WeakCount,
    lifecycle: DebugLifecycle,
}

impl Counts {
    const fn new() -> Self {
        Self {
            strong: StrongCount::new(),
            weak: WeakCount::new(),
            lifecycle: DebugLifecycle::new(),
        }
    }

    pub(crate) fn strong(&self) -> usize {
        self.strong.count()
    }

    pub(crate) fn weak(&self) -> usize {
        self.weak.count()
    }
}

/// Bookkeeping unit shared by every handle of one allocation group.
pub(crate) trait ControlBlock {
    fn counts(&self) -> &Counts;

    /// Drop the payload. The block itself stays allocated.
    ///
    /// # Safety
    /// Called at most once, after the strong count reached zero, with no
    /// outstanding borrows of the payload.
    unsafe fn dispose(&self);
}

/// Block for a payload that lives in its own `Box` allocation.
pub(crate) struct PtrBlock<T: ?Sized> {
    counts: Counts,
    payload: NonNull<T>,
}

impl<T: ?Sized> ControlBlock for PtrBlock<T> {
    fn counts(&self) -> &Counts {
        &self.counts
    }

    unsafe fn dispose(&self) {
        AdoptionRegistry::leave(self.payload.as_ref());
        drop(Box::from_raw(self.payload.as_ptr()));
    }
}

/// Block whose payload storage is part of the block's own allocation.
pub(crate) struct InlineBlock<T> {
    counts: Counts,
    payload: UnsafeCell<MaybeUninit<T>>,
}

impl<T> ControlBlock for InlineBlock<T> {
    fn counts(&self) -> &Counts {
        &self.counts
    }

    unsafe fn dispose(&self) {
        ptr::drop_in_place(self.payload.get().cast::<T>());
    }
}

#[cfg(test)]
thread_local! {
    static LIVE_BLOCKS: core::cell::Cell<usize> = const { core::cell::Cell::new(0) };
}

/// Number of blocks allocated and not yet freed on this thread.
#[cfg(test)]
pub(crate) fn live_blocks() -> usize {
    LIVE_BLOCKS.with(|c| c.get())
}

#[cfg(test)]
fn note_block(delta: isize) {
    LIVE_BLOCKS.with(|c| c.set(c.get().wrapping_add_signed(delta)));
}

fn alloc_block<B>() -> Result<NonNull<B>, AllocError> {
    let layout = Layout::new::<B>();
    // SAFETY: every block holds a `Counts`, so the layout is never zero-sized.
    let raw = unsafe { alloc(layout) }.cast::<B>();
    let mem = NonNull::new(raw).ok_or(AllocError::new(layout))?;
    #[cfg(test)]
    note_block(1);
    Ok(mem)
}

/// Releases raw block memory if payload construction unwinds.
struct DeallocOnUnwind<B> {
    mem: NonNull<B>,
}

impl<B> Drop for DeallocOnUnwind<B> {
    fn drop(&mut self) {
        #[cfg(test)]
        note_block(-1);
        // SAFETY: `mem` came from `alloc_block::<B>` and was never handed out.
        unsafe { dealloc(self.mem.as_ptr().cast(), Layout::new::<B>()) }
    }
}

/// Weak token a block holds on itself while its payload is disposed.
/// Returned on drop, so a panicking payload destructor still releases it.
struct DisposeHold {
    block: BlockRef,
    token: Option<WeakToken>,
}

impl Drop for DisposeHold {
    fn drop(&mut self) {
        if let Some(token) = self.token.take() {
            // SAFETY: `token` was minted by `block`.
            unsafe { self.block.release_weak(token) }
        }
    }
}

/// Type-erased pointer to a live control block.
///
/// A `BlockRef` is only ever stored next to a strong or weak token minted
/// by the block it points to, which keeps the block allocated.
#[derive(Copy, Clone)]
pub(crate) struct BlockRef(NonNull<dyn ControlBlock>);

impl BlockRef {
    /// Allocate a pointer-owning block for `payload` and mint its first
    /// strong token.
    ///
    /// # Safety
    /// `payload` must come from `Box::into_raw` and must not be owned by
    /// any other block. On error the caller still owns `payload`.
    pub(crate) unsafe fn adopt<T: ?Sized + 'static>(
        payload: NonNull<T>,
    ) -> Result<(BlockRef, StrongToken), AllocError> {
        AdoptionRegistry::enter(payload.as_ref());
        let mem = match alloc_block::<PtrBlock<T>>() {
            Ok(mem) => mem,
            Err(e) => {
                AdoptionRegistry::leave(payload.as_ref());
                return Err(e);
            }
        };
        mem.as_ptr().write(PtrBlock {
            counts: Counts::new(),
            payload,
        });
        trace_block!(
            "adopt {:p} into block {:p}",
            payload.cast::<()>(),
            mem.cast::<()>()
        );
        Ok(Self::first_strong(mem))
    }

    /// Allocate an inline-storage block and build the payload directly in
    /// it. If `init` panics the memory is released and nothing escapes.
    pub(crate) fn produce<T: 'static, F>(
        init: F,
    ) -> Result<(BlockRef, NonNull<T>, StrongToken), AllocError>
    where
        F: FnOnce() -> T,
    {
        let mem = alloc_block::<InlineBlock<T>>()?;
        let guard = DeallocOnUnwind { mem };
        let block = mem.as_ptr();
        // SAFETY: `block` is valid for writes of an `InlineBlock<T>`; the
        // payload slot is `UnsafeCell<MaybeUninit<T>>`, which has the layout
        // of `T`.
        let payload = unsafe {
            ptr::addr_of_mut!((*block).counts).write(Counts::new());
            let slot = ptr::addr_of_mut!((*block).payload).cast::<T>();
            slot.write(init());
            NonNull::new_unchecked(slot)
        };
        mem::forget(guard);
        trace_block!(
            "produce {} byte block {:p}",
            mem::size_of::<InlineBlock<T>>(),
            mem.cast::<()>()
        );
        let (block, token) = Self::first_strong(mem);
        Ok((block, payload, token))
    }

    fn first_strong<B: ControlBlock + 'static>(mem: NonNull<B>) -> (BlockRef, StrongToken) {
        let block = BlockRef(mem);
        let token = block.counts().strong.get();
        (block, token)
    }

    #[inline]
    pub(crate) fn counts(&self) -> &Counts {
        // SAFETY: the token held next to this BlockRef keeps the block alive.
        unsafe { self.0.as_ref().counts() }
    }

    /// Mint another strong token for a block whose payload is alive.
    #[inline]
    pub(crate) fn acquire_strong(&self) -> StrongToken {
        let counts = self.counts();
        debug_assert!(counts.strong() > 0, "strong token minted for a disposed payload");
        counts.strong.get()
    }

    /// Mint a strong token only while the payload is alive.
    #[inline]
    pub(crate) fn try_acquire_strong(&self) -> Option<StrongToken> {
        let counts = self.counts();
        if counts.strong() == 0 {
            None
        } else {
            Some(counts.strong.get())
        }
    }

    #[inline]
    pub(crate) fn acquire_weak(&self) -> WeakToken {
        self.counts().weak.get()
    }

    /// Return a strong token. The last one disposes the payload, and frees
    /// the block too when no weak token is outstanding.
    ///
    /// # Safety
    /// `token` must have been minted by this block.
    pub(crate) unsafe fn release_strong(self, token: StrongToken) {
        let counts = self.counts();
        if !counts.strong.put(token) {
            return;
        }
        // The payload may own weak references to this very block; hold one
        // more so its destructor cannot free the block underneath us.
        let hold = DisposeHold {
            block: self,
            token: Some(counts.weak.get()),
        };
        counts.lifecycle.on_dispose();
        trace_block!("dispose payload of block {:p}", self.0.cast::<()>());
        self.0.as_ref().dispose();
        drop(hold);
    }

    /// Return a weak token. Frees the block when this was the last
    /// reference of either kind.
    ///
    /// # Safety
    /// `token` must have been minted by this block.
    pub(crate) unsafe fn release_weak(self, token: WeakToken) {
        let counts = self.counts();
        if counts.weak.put(token) && counts.strong() == 0 {
            counts.lifecycle.on_destroy();
            self.destroy();
        }
    }

    unsafe fn destroy(self) {
        trace_block!("destroy block {:p}", self.0.cast::<()>());
        #[cfg(test)]
        note_block(-1);
        // Blocks have no drop glue of their own; this only frees memory.
        drop(Box::from_raw(self.0.as_ptr()));
    }

    #[inline]
    pub(crate) fn same_block(self, other: BlockRef) -> bool {
        self.0.cast::<()>() == other.0.cast::<()>()
    }
}
