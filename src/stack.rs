use crate::error::AllocError;
use crate::node::Node;
use crate::reclaim::Reclaimer;
use crate::sync::{AtomicPtr, Ordering};
use alloc::alloc::handle_alloc_error;
use core::fmt;
use core::marker::PhantomData;
use core::ptr::null_mut;

/// A lock-free multi-producer multi-consumer LIFO stack.
///
/// `push` and `pop` are compare-and-swap retry loops on the head. Popped
/// nodes are reclaimed by counting the threads currently inside `pop`;
/// see the crate documentation for the details.
pub struct Stack<T> {
    head: AtomicPtr<Node<T>>,
    reclaimer: Reclaimer<T>,
    _phantom: PhantomData<T>,
}

impl<T> Stack<T> {
    pub fn new() -> Stack<T> {
        Stack {
            head: AtomicPtr::new(null_mut()),
            reclaimer: Reclaimer::new(),
            _phantom: PhantomData,
        }
    }

    /// Push `v` onto the stack.
    ///
    /// Allocation failure is fatal and goes to the global allocation error
    /// handler. Use [`Stack::try_push`] to get the value back instead.
    pub fn push(&self, v: T) {
        if let Err(e) = self.try_push(v) {
            handle_alloc_error(e.layout());
        }
    }

    /// Push `v` onto the stack, or return it inside an [`AllocError`] if no
    /// node could be allocated.
    pub fn try_push(&self, v: T) -> Result<(), AllocError<T>> {
        let node = Node::try_alloc(v)?.as_ptr();

        let mut head = self.head.load(Ordering::Relaxed);
        loop {
            // node is not published yet, nobody else sees this store
            unsafe { (*node).next.store(head, Ordering::Relaxed) };

            match self
                .head
                .compare_exchange_weak(head, node, Ordering::SeqCst, Ordering::Relaxed)
            {
                Ok(_) => return Ok(()),
                Err(now) => head = now,
            }
        }
    }

    /// Pop the most recently pushed value, or `None` if the stack is empty.
    pub fn pop(&self) -> Option<T> {
        self.reclaimer.enter();

        let mut head = self.head.load(Ordering::SeqCst);
        while !head.is_null() {
            // head may already be detached by another popper, but it is not
            // freed while we are registered in the reclaimer
            let next = unsafe { (*head).next.load(Ordering::Relaxed) };

            match self
                .head
                .compare_exchange_weak(head, next, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => break,
                Err(now) => head = now,
            }
        }

        let result = if head.is_null() {
            None
        } else {
            unsafe { (*head).take() }
        };

        unsafe { self.reclaimer.retire(head) };

        result
    }

    /// Whether the stack looked empty at some recent point.
    ///
    /// This is a hint only. Another thread may push or pop right after the
    /// read, so it must not guard calls to `push` or `pop`.
    pub fn is_empty_hint(&self) -> bool {
        self.head.load(Ordering::Relaxed).is_null()
    }
}

impl<T> Default for Stack<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Stack<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stack")
            .field("is_empty_hint", &self.is_empty_hint())
            .finish_non_exhaustive()
    }
}

impl<T> Drop for Stack<T> {
    fn drop(&mut self) {
        let mut node = self.head.load(Ordering::Acquire);
        while !node.is_null() {
            unsafe {
                let next = (*node).next.load(Ordering::Relaxed);
                Node::free(node);
                node = next;
            }
        }
        // the pending chain goes with `reclaimer`
    }
}

unsafe impl<T: Send> Sync for Stack<T> {}
unsafe impl<T: Send> Send for Stack<T> {}
