//! shared-ownership: single-threaded shared (`Shared`) and weak (`Weak`)
//! ownership of heap values through an out-of-band control block.
//!
//! Internal Design:
//!
//! Summary
//! - Goal: deterministic, non-garbage-collected lifetime management with
//!   several owners, where "which address is exposed" and "whose lifetime
//!   is tracked" are independent.
//! - Layers:
//!   - tokens: branded single-threaded counters handing out linear
//!     tokens; one token per live handle.
//!   - block: the control block (`Counts` header + two layouts behind the
//!     `ControlBlock` trait) and `BlockRef`, which drives the two-phase
//!     teardown (dispose payload, then free the block).
//!   - Shared / Weak: handles pairing an exposed address with a `BlockRef`
//!     and a token.
//!   - produce: single-allocation factory (payload stored inline).
//!   - observable: opt-in self-observation for payloads.
//!
//! Control block states
//! - Live (strong > 0) -> WeakOnly (strong == 0, weak > 0) when the last
//!   strong reference goes while observers remain: the payload is disposed.
//! - Live -> Dead on that same release when no observer remains: dispose,
//!   then free the block, in one step.
//! - WeakOnly -> Dead on the last weak release: free the block only.
//! - While the payload is being disposed the block holds one weak token of
//!   its own, so a payload owning weak references to its own block (every
//!   self-observable payload does) cannot free the block mid-dispose.
//!
//! Constraints
//! - Single-threaded: `!Send`/`!Sync` by design (no atomics). A concurrent
//!   variant would need atomic counts and a race-free dispose-then-free.
//! - Payloads placed under tracked ownership are `'static`: blocks are
//!   type-erased, so an aliased owner may outlive every handle naming the
//!   original payload type.
//! - Strong cycles leak; nothing detects them.
//!
//! Usage faults
//! - `Shared::adopt` takes a `Box`, so safe code cannot adopt an address
//!   twice. `Shared::from_raw` is `unsafe` and leaves double adoption to
//!   the caller; debug builds track adopted addresses per thread and panic
//!   on a second adoption, release builds do not check.
//! - Reference-count overflow aborts, matching `Rc`.
//!
//! Failure reporting
//! - `Shared::promote` / `TryFrom<&Weak<T>>` return `ExpiredError`;
//!   `Weak::lock` never fails and yields an empty owner instead.
//! - `try_adopt` / `try_produce` return `AllocError`; the infallible forms
//!   call `handle_alloc_error`. No partially built handle is observable.
//! - With the `trace` feature, block lifecycle transitions are logged via
//!   `log::trace!`; otherwise the crate never logs.

macro_rules! trace_block {
    ($($arg:tt)+) => {
        #[cfg(feature = "trace")]
        log::trace!(target: "shared_ownership::block", $($arg)+);
    };
}

mod block;
mod error;
mod lifecycle;
#[cfg(test)]
mod lifecycle_proptest;
mod observable;
mod produce;
mod registry;
mod shared;
mod tokens;
mod weak;

// Public surface
pub use error::{AllocError, ExpiredError};
pub use observable::{SelfObservable, SelfObserver};
pub use produce::{produce, produce_observed, produce_with, try_produce, try_produce_with};
pub use shared::Shared;
pub use weak::Weak;
