use crate::error::AllocError;
use crate::sync::{AtomicBool, AtomicPtr, Ordering, UnsafeCell};
use alloc::alloc::{alloc, Layout};
use alloc::boxed::Box;
use core::mem::MaybeUninit;
use core::ptr::{null_mut, NonNull};

/// A list element shared by the stack and the pending-deletion chain.
///
/// While the node is reachable from the stack head, `next` points to the
/// node below it. Once detached, the same link chains it into the
/// pending-deletion list. It is never a member of both.
pub(crate) struct Node<T> {
    pub(crate) next: AtomicPtr<Node<T>>,
    slot: Slot<T>,
}

impl<T> Node<T> {
    /// Allocate a node owning `data`, with an empty link.
    pub(crate) fn try_alloc(data: T) -> Result<NonNull<Node<T>>, AllocError<T>> {
        let layout = Layout::new::<Node<T>>();

        // a node always holds its link, so the layout is never zero-sized
        let ptr = unsafe { alloc(layout) }.cast::<Node<T>>();

        match NonNull::new(ptr) {
            Some(node) => {
                unsafe {
                    node.as_ptr().write(Node {
                        next: AtomicPtr::new(null_mut()),
                        slot: Slot::new(data),
                    })
                };
                Ok(node)
            }
            None => Err(AllocError::new(layout, data)),
        }
    }

    /// Release a node obtained from `try_alloc`.
    ///
    /// # Safety
    ///
    /// `node` must come from `try_alloc`, must not be freed yet, and no
    /// other thread may touch it afterwards.
    pub(crate) unsafe fn free(node: *mut Node<T>) {
        // allocated with the global allocator and `Layout::new::<Node<T>>()`
        drop(Box::from_raw(node));
    }

    /// Move the payload out. Only the first call gets it.
    pub(crate) fn take(&self) -> Option<T> {
        self.slot.take()
    }
}

/// Inline payload storage that can be emptied exactly once.
struct Slot<T> {
    taken: AtomicBool,
    data: UnsafeCell<MaybeUninit<T>>,
}

impl<T> Slot<T> {
    fn new(data: T) -> Slot<T> {
        Slot {
            taken: AtomicBool::new(false),
            data: UnsafeCell::new(MaybeUninit::new(data)),
        }
    }

    fn take(&self) -> Option<T> {
        if self.taken.swap(true, Ordering::AcqRel) {
            return None;
        }

        // the swap above made us the only reader
        Some(self.data.with_mut(|data| unsafe { (*data).assume_init_read() }))
    }
}

impl<T> Drop for Slot<T> {
    fn drop(&mut self) {
        if !self.taken.load(Ordering::Relaxed) {
            self.data
                .with_mut(|data| unsafe { (*data).assume_init_drop() });
        }
    }
}
