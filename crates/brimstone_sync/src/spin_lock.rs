use std::cell::UnsafeCell;
use std::hint;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::CachePadded;

/// An unfair test-and-test-and-set lock.
///
/// Acquisition spins with a pause hint until the flag clears, then races a
/// weak compare-exchange. There is no queueing, so a thread can be overtaken
/// arbitrarily often; use [`TicketLock`](crate::TicketLock) where starvation
/// matters.
#[derive(Debug, Default)]
pub struct SpinLock<T: ?Sized> {
    locked: CachePadded<AtomicBool>,
    value: UnsafeCell<T>,
}

unsafe impl<T: ?Sized + Send> Send for SpinLock<T> {}
unsafe impl<T: ?Sized + Send> Sync for SpinLock<T> {}

impl<T> SpinLock<T> {
    pub const fn new(value: T) -> Self {
        Self {
            locked: CachePadded(AtomicBool::new(false)),
            value: UnsafeCell::new(value),
        }
    }

    pub fn lock(&self) -> SpinLockGuard<'_, T> {
        while !self.try_lock_weak() {
            while self.is_locked() {
                hint::spin_loop();
            }
        }
        SpinLockGuard { lock: self }
    }

    fn try_lock_weak(&self) -> bool {
        self.locked
            .0
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    fn is_locked(&self) -> bool {
        self.locked.0.load(Ordering::Relaxed)
    }

    /// Raw pointer to the protected value, bypassing the lock.
    ///
    /// For single-producer fast paths that have external reasons to know no
    /// other thread is inside the lock. All other callers go through
    /// [`lock`](Self::lock).
    pub fn as_mut_ptr(&self) -> *mut T {
        self.value.get()
    }
}

pub struct SpinLockGuard<'a, T: ?Sized> {
    lock: &'a SpinLock<T>,
}

impl<T: ?Sized> Deref for SpinLockGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: the guard holds the lock, so access is exclusive.
        unsafe { &*self.lock.value.get() }
    }
}

impl<T: ?Sized> DerefMut for SpinLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: the guard holds the lock, so access is exclusive.
        unsafe { &mut *self.lock.value.get() }
    }
}

impl<T: ?Sized> Drop for SpinLockGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.locked.0.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn uncontended() {
        let lock = SpinLock::new(7);
        *lock.lock() += 1;
        assert_eq!(*lock.lock(), 8);
    }

    #[test]
    fn contended_counter() {
        let lock = Arc::new(SpinLock::new(0_u64));

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
