//! Lifetime-tied linear tokens and the counters that mint them.
//!
//! Every live `Shared` holds one strong token and every live `Weak` one
//! weak token. Dropping a token panics; the only valid way to dispose of
//! it is to return it to the originating counter via `Count::put`.

use core::cell::Cell;
use core::marker::PhantomData;

/// Zero-sized, linear token tied to its originating counter via lifetime.
pub(crate) struct Token<'a, C: ?Sized> {
    // Lifetime is tracked separately from the counter type to avoid
    // imposing `'a` bounds on `C`.
    _lt: PhantomData<&'a ()>,
    _ctr: PhantomData<*const C>,
}

impl<'a, C: ?Sized> Token<'a, C> {
    #[inline]
    fn new() -> Self {
        Self {
            _lt: PhantomData,
            _ctr: PhantomData,
        }
    }
}

impl<'a, C: ?Sized> Drop for Token<'a, C> {
    fn drop(&mut self) {
        // Intentional fail-fast on misuse: token must be consumed by Count::put.
        panic!("Token dropped without Count::put");
    }
}

/// A source of counted references, enforced by linear Token flow.
pub(crate) trait Count {
    /// The token type minted by this counter.
    type Token<'a>: Sized
    where
        Self: 'a;

    /// Acquire one counted reference and return a linear token for it.
    ///
    /// Tokens are minted with a 'static lifetime so handles can store
    /// them; they are still branded to the counter type and shorten
    /// covariantly when handed back through `put`.
    fn get(&self) -> Self::Token<'static>;

    /// Return (consume) a previously acquired token.
    /// Returns true if the count is now zero.
    fn put<'a>(&'a self, t: Self::Token<'a>) -> bool;

    /// Current number of outstanding tokens.
    fn count(&self) -> usize;
}

/// Brand for counters of owning references.
#[derive(Debug)]
pub(crate) enum Strong {}

/// Brand for counters of observing references.
#[derive(Debug)]
pub(crate) enum Weak {}

/// Single-threaded reference counter, branded by the kind of reference it
/// counts so tokens of one kind cannot be returned to the other.
#[derive(Debug)]
pub(crate) struct UsizeCount<K> {
    count: Cell<usize>,
    _kind: PhantomData<K>,
}

impl<K> UsizeCount<K> {
    pub(crate) const fn new() -> Self {
        Self {
            count: Cell::new(0),
            _kind: PhantomData,
        }
    }
}

impl<K: 'static> Count for UsizeCount<K> {
    type Token<'a>
        = Token<'a, Self>
    where
        Self: 'a;

    #[inline]
    fn get(&self) -> Self::Token<'static> {
        let c = self.count.get();
        let n = c.wrapping_add(1);
        self.count.set(n);
        if n == 0 {
            // Follow Rc semantics: abort on overflow rather than continue unsafely.
            std::process::abort();
        }
        Token::<'static, Self>::new()
    }

    #[inline]
    fn put<'a>(&'a self, t: Self::Token<'a>) -> bool {
        let c = self.count.get();
        assert!(c > 0, "UsizeCount underflow");
        let n = c - 1;
        self.count.set(n);
        core::mem::forget(t);
        n == 0
    }

    #[inline]
    fn count(&self) -> usize {
        self.count.get()
    }
}

pub(crate) type StrongCount = UsizeCount<Strong>;
pub(crate) type WeakCount = UsizeCount<Weak>;
pub(crate) type StrongToken = Token<'static, StrongCount>;
pub(crate) type WeakToken = Token<'static, WeakCount>;
