use std::cell::UnsafeCell;
use std::hint;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::CachePadded;

/// A FIFO-fair ticket lock.
///
/// Each waiter draws a ticket and spins until it is served, so no thread can
/// be starved no matter how hot the contention. The arena swap depends on
/// this: a swap request must get through even while every network thread is
/// hammering `take_current`.
#[derive(Debug, Default)]
pub struct TicketLock<T: ?Sized> {
    now_serving: CachePadded<AtomicUsize>,
    next_ticket: CachePadded<AtomicUsize>,
    value: UnsafeCell<T>,
}

unsafe impl<T: ?Sized + Send> Send for TicketLock<T> {}
unsafe impl<T: ?Sized + Send> Sync for TicketLock<T> {}

impl<T> TicketLock<T> {
    pub const fn new(value: T) -> Self {
        Self {
            now_serving: CachePadded(AtomicUsize::new(0)),
            next_ticket: CachePadded(AtomicUsize::new(0)),
            value: UnsafeCell::new(value),
        }
    }

    pub fn lock(&self) -> TicketLockGuard<'_, T> {
        let ticket = self.next_ticket.0.fetch_add(1, Ordering::Relaxed);
        while self.now_serving.0.load(Ordering::Acquire) != ticket {
            hint::spin_loop();
        }
        TicketLockGuard { lock: self }
    }
}

pub struct TicketLockGuard<'a, T: ?Sized> {
    lock: &'a TicketLock<T>,
}

impl<T: ?Sized> Deref for TicketLockGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: the guard holds the lock, so access is exclusive.
        unsafe { &*self.lock.value.get() }
    }
}

impl<T: ?Sized> DerefMut for TicketLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: the guard holds the lock, so access is exclusive.
        unsafe { &mut *self.lock.value.get() }
    }
}

impl<T: ?Sized> Drop for TicketLockGuard<'_, T> {
    fn drop(&mut self) {
        let next = self.lock.now_serving.0.load(Ordering::Relaxed) + 1;
        self.lock.now_serving.0.store(next, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn serves_in_order() {
        let lock = TicketLock::new(Vec::new());
        lock.lock().push(1);
        lock.lock().push(2);
        assert_eq!(*lock.lock(), [1, 2]);
    }

    #[test]
    fn contended_counter() {
        let lock = Arc::new(TicketLock::new(0_u64));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let lock = Arc::clone(&lock);
                thread::spawn(move || {
                    for _ in 0..10_000 {
                        *lock.lock() += 1;
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(*lock.lock(), 80_000);
    }
}
