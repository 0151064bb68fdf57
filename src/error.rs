use core::alloc::Layout;
use core::fmt;

/// Promotion of a `Weak` failed because its payload has already been
/// disposed (or the observer never tracked one).
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ExpiredError;

impl fmt::Display for ExpiredError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("weak reference has expired")
    }
}

impl std::error::Error for ExpiredError {}

/// The global allocator could not provide memory for a control block.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct AllocError {
    layout: Layout,
}

impl AllocError {
    pub(crate) fn new(layout: Layout) -> Self {
        Self { layout }
    }

    /// Layout of the allocation that failed.
    pub fn layout(&self) -> Layout {
        self.layout
    }
}

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "failed to allocate a control block of {} bytes (align {})",
            self.layout.size(),
            self.layout.align()
        )
    }
}

impl std::error::Error for AllocError {}
