use core::alloc::Layout;
use core::fmt;
use thiserror::Error;

/// Node allocation failed while pushing.
///
/// The value that could not be pushed is handed back to the caller.
#[derive(Error)]
#[error("memory allocation of {size} bytes for a stack node failed", size = .layout.size())]
pub struct AllocError<T> {
    layout: Layout,
    value: T,
}

impl<T> AllocError<T> {
    pub(crate) fn new(layout: Layout, value: T) -> AllocError<T> {
        AllocError { layout, value }
    }

    /// Layout of the node that could not be allocated.
    pub fn layout(&self) -> Layout {
        self.layout
    }

    /// Take back the value that was not pushed.
    pub fn into_inner(self) -> T {
        self.value
    }
}

impl<T> fmt::Debug for AllocError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AllocError")
            .field("layout", &self.layout)
            .finish_non_exhaustive()
    }
}
