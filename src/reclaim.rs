//! Deferred freeing of nodes detached by `pop`.
//!
//! Every popper registers itself in `poppers` before it reads the stack
//! head and leaves through [`Reclaimer::retire`]. A popper that finds
//! itself alone frees its node right away and flushes the nodes deferred
//! by earlier poppers. Otherwise the node goes to the pending chain and
//! waits for a later sole popper.
//!
//! Freeing the just-detached node whenever the caller is the sole popper
//! assumes nobody else can still hold that node. Check changes here with
//! long stress runs under a memory-error detector.

use crate::node::Node;
use crate::sync::{fence, AtomicPtr, AtomicUsize, Ordering};
use core::ptr::null_mut;
use tracing::trace;

pub(crate) struct Reclaimer<T> {
    poppers: AtomicUsize,
    pending: AtomicPtr<Node<T>>,
}

impl<T> Reclaimer<T> {
    pub(crate) fn new() -> Reclaimer<T> {
        Reclaimer {
            poppers: AtomicUsize::new(0),
            pending: AtomicPtr::new(null_mut()),
        }
    }

    /// Register the calling thread as an active popper.
    ///
    /// Must happen before the popper reads the stack head.
    pub(crate) fn enter(&self) {
        self.poppers.fetch_add(1, Ordering::SeqCst);
        fence(Ordering::SeqCst);
    }

    /// Free or defer `node`, then leave the popper set.
    ///
    /// # Safety
    ///
    /// `node` is null or was detached from the stack by the caller, and the
    /// caller entered with [`Reclaimer::enter`] and has not retired since.
    pub(crate) unsafe fn retire(&self, node: *mut Node<T>) {
        // order the detach before reading the popper count
        fence(Ordering::SeqCst);

        if self.poppers.load(Ordering::SeqCst) == 1 {
            let detached = self.pending.swap(null_mut(), Ordering::SeqCst);

            if self.poppers.fetch_sub(1, Ordering::SeqCst) == 1 {
                let freed = free_chain(detached);
                if freed > 0 {
                    trace!(freed, "flushed deferred nodes");
                }
            } else if !detached.is_null() {
                // someone entered pop after the swap, hand the chain back
                trace!("popper entered during flush, re-chaining deferred nodes");
                self.chain_all(detached);
            }

            if !node.is_null() {
                Node::free(node);
            }
        } else {
            if !node.is_null() {
                self.chain(node, node);
            }
            self.poppers.fetch_sub(1, Ordering::SeqCst);
        }
    }

    /// Prepend an already linked run of nodes to the pending chain.
    unsafe fn chain_all(&self, first: *mut Node<T>) {
        let mut last = first;
        loop {
            let next = (*last).next.load(Ordering::Relaxed);
            if next.is_null() {
                break;
            }
            last = next;
        }

        self.chain(first, last);
    }

    /// Prepend `first..=last` to the pending chain.
    unsafe fn chain(&self, first: *mut Node<T>, last: *mut Node<T>) {
        let mut head = self.pending.load(Ordering::Relaxed);
        loop {
            (*last).next.store(head, Ordering::Relaxed);
            match self.pending.compare_exchange_weak(
                head,
                first,
                Ordering::Release,
                Ordering::Relaxed,
            ) {
                Ok(_) => return,
                Err(now) => head = now,
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn poppers(&self) -> usize {
        self.poppers.load(Ordering::SeqCst)
    }

    #[cfg(test)]
    pub(crate) fn pending_len(&self) -> usize {
        let mut len = 0;
        let mut node = self.pending.load(Ordering::Acquire);
        while !node.is_null() {
            len += 1;
            node = unsafe { (*node).next.load(Ordering::Relaxed) };
        }
        len
    }
}

impl<T> Drop for Reclaimer<T> {
    fn drop(&mut self) {
        unsafe { free_chain(self.pending.load(Ordering::Acquire)) };
    }
}

/// Free every node of a chain, returning how many were freed.
///
/// # Safety
///
/// The chain must be exclusively owned by the caller.
unsafe fn free_chain<T>(mut node: *mut Node<T>) -> usize {
    let mut freed = 0;
    while !node.is_null() {
        let next = (*node).next.load(Ordering::Relaxed);
        Node::free(node);
        node = next;
        freed += 1;
    }
    freed
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize as StdAtomicUsize;
    use std::sync::Arc;

    struct Counted(Arc<StdAtomicUsize>);

    impl Drop for Counted {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn node(drops: &Arc<StdAtomicUsize>) -> *mut Node<Counted> {
        Node::try_alloc(Counted(drops.clone())).unwrap().as_ptr()
    }

    #[test]
    fn test_sole_popper_frees() {
        let drops = Arc::new(StdAtomicUsize::new(0));
        let reclaimer = Reclaimer::new();

        reclaimer.enter();
        unsafe { reclaimer.retire(node(&drops)) };

        assert_eq!(drops.load(Ordering::Relaxed), 1);
        assert_eq!(reclaimer.poppers(), 0);
        assert_eq!(reclaimer.pending_len(), 0);
    }

    #[test]
    fn test_empty_pop_leaves() {
        let reclaimer = Reclaimer::<u32>::new();

        reclaimer.enter();
        unsafe { reclaimer.retire(null_mut()) };
        assert_eq!(reclaimer.poppers(), 0);

        // a null node is never chained, even with company
        reclaimer.enter();
        reclaimer.enter();
        unsafe { reclaimer.retire(null_mut()) };
        assert_eq!(reclaimer.pending_len(), 0);
        unsafe { reclaimer.retire(null_mut()) };
        assert_eq!(reclaimer.poppers(), 0);
    }

    #[test]
    fn test_defer_then_flush() {
        let drops = Arc::new(StdAtomicUsize::new(0));
        let reclaimer = Reclaimer::new();

        // three poppers overlap, the first two must defer
        reclaimer.enter();
        reclaimer.enter();
        reclaimer.enter();
        unsafe { reclaimer.retire(node(&drops)) };
        unsafe { reclaimer.retire(node(&drops)) };

        assert_eq!(drops.load(Ordering::Relaxed), 0);
        assert_eq!(reclaimer.pending_len(), 2);
        assert_eq!(reclaimer.poppers(), 1);

        // the last one is alone and flushes everything
        unsafe { reclaimer.retire(node(&drops)) };

        assert_eq!(drops.load(Ordering::Relaxed), 3);
        assert_eq!(reclaimer.pending_len(), 0);
        assert_eq!(reclaimer.poppers(), 0);
    }

    #[test]
    fn test_chain_all_keeps_order() {
        let drops = Arc::new(StdAtomicUsize::new(0));
        let reclaimer = Reclaimer::new();

        let a = node(&drops);
        let b = node(&drops);
        let c = node(&drops);

        unsafe {
            reclaimer.chain(c, c);
            (*a).next.store(b, Ordering::Relaxed);
            reclaimer.chain_all(a);
        }

        assert_eq!(reclaimer.pending.load(Ordering::Relaxed), a);
        assert_eq!(unsafe { (*b).next.load(Ordering::Relaxed) }, c);
        assert_eq!(reclaimer.pending_len(), 3);

        drop(reclaimer);
        assert_eq!(drops.load(Ordering::Relaxed), 3);
    }
}
