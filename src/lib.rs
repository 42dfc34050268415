//! A lock-free LIFO stack for `no_std` with popper-count based node
//! reclamation.
//!
//! [`Stack::push`] and [`Stack::pop`] are compare-and-swap retry loops on
//! a single head pointer. The hard part is freeing popped nodes: a thread
//! racing through its own `pop` may still compare against a node that
//! another thread has already detached.
//!
//! Each stack counts the threads currently inside `pop`. A popper that
//! sees itself as the only one frees its node immediately and flushes the
//! chain of nodes deferred by earlier poppers. A popper with company puts
//! its node on that chain instead. The payload is moved out as soon as the
//! node is detached, so getting the value never waits on reclamation.
//!
//! The scheme is lock-free, not wait-free: under contention a thread may
//! retry its compare-and-swap any number of times.
//!
//! ```
//! use popstack::Stack;
//!
//! let stack = Stack::new();
//! stack.push(1);
//! stack.push(2);
//!
//! assert_eq!(stack.pop(), Some(2));
//! assert_eq!(stack.pop(), Some(1));
//! assert_eq!(stack.pop(), None);
//! ```

#![no_std]

extern crate alloc;

mod error;
mod node;
mod reclaim;
mod stack;
mod sync;

pub use error::AllocError;
pub use stack::Stack;

#[cfg(test)]
#[macro_use]
extern crate std;

#[cfg(all(test, not(loom)))]
mod tests {
    use crate::Stack;
    use std::sync::Arc;
    use std::vec::Vec;

    const NUM_LOOP: usize = 100000;
    const NUM_THREADS: usize = 4;

    #[test]
    fn test_stack() {
        let stack = Arc::new(Stack::<usize>::new());
        let mut v = Vec::new();

        for i in 0..NUM_THREADS {
            let stack0 = stack.clone();
            let t = std::thread::spawn(move || {
                let mut sum = 0;
                if i & 1 == 0 {
                    for j in 0..NUM_LOOP {
                        let k = i * NUM_LOOP + j;
                        stack0.push(k);
                    }
                } else {
                    for _ in 0..NUM_LOOP {
                        loop {
                            if let Some(k) = stack0.pop() {
                                sum += k;
                                break;
                            }
                        }
                    }
                }
                sum
            });
            v.push(t);
        }

        let mut popped = 0;
        for t in v {
            popped += t.join().unwrap();
        }

        let pushed: usize = (0..NUM_THREADS)
            .step_by(2)
            .flat_map(|i| (0..NUM_LOOP).map(move |j| i * NUM_LOOP + j))
            .sum();

        assert_eq!(popped, pushed);
        assert_eq!(stack.pop(), None);
    }
}
