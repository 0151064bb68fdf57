//! Single-allocation construction: counts and payload share one block.

use crate::block::BlockRef;
use crate::error::AllocError;
use crate::observable::SelfObservable;
use crate::shared::Shared;
use std::alloc::handle_alloc_error;

/// Build a [`Shared`] whose payload lives inside its control block.
///
/// Compared to [`Shared::adopt`] this saves the payload's own allocation.
/// Teardown is still two-phase: the payload is dropped with the last strong
/// reference, the memory goes away with the last weak one.
///
/// A [`SelfObservable`] payload built here is not registered: its
/// `shared_from_this` yields an empty owner. Use [`produce_observed`].
pub fn produce<T: 'static>(value: T) -> Shared<T> {
    produce_with(move || value)
}

/// Like [`produce`], but builds the payload straight into the freshly
/// allocated block. If `init` panics the block is released and the panic
/// propagates.
pub fn produce_with<T: 'static, F>(init: F) -> Shared<T>
where
    F: FnOnce() -> T,
{
    try_produce_with(init).unwrap_or_else(|e| handle_alloc_error(e.layout()))
}

/// Like [`produce`], but reports allocation failure instead of aborting.
/// On error `value` has been dropped.
pub fn try_produce<T: 'static>(value: T) -> Result<Shared<T>, AllocError> {
    try_produce_with(move || value)
}

/// Fallible form of [`produce_with`]. `init` only runs once the block's
/// memory has been obtained.
pub fn try_produce_with<T: 'static, F>(init: F) -> Result<Shared<T>, AllocError>
where
    F: FnOnce() -> T,
{
    let (block, payload, token) = BlockRef::produce(init)?;
    Ok(Shared::from_parts(payload, block, token))
}

/// [`produce`] for a self-observable payload: the returned owner is
/// registered with the payload's embedded observer.
pub fn produce_observed<T: SelfObservable>(value: T) -> Shared<T> {
    let owner = produce(value);
    Shared::register_self(&owner);
    owner
}
