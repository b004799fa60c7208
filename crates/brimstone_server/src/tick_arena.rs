//! Double-buffered bump arenas for per-tick allocations.
//!
//! Decoded packet records live in whichever arena is *current*; once per tick
//! the game loop swaps current and next. An arena's contents stay readable
//! for the rest of the tick that allocated them and through the following
//! tick (while the arena sits idle as *next*); they are overwritten when the
//! arena becomes current again two swaps later.
//!
//! The handoff is a ticket lock plus a reader count. [`TickArenas::swap`]
//! must win the lock even while every network thread hammers
//! [`take_current`](TickArenas::take_current), which is exactly what ticket
//! fairness buys. After the flip, the swap waits for stragglers still holding
//! the new current arena before the tick proceeds — so guards must stay
//! short-lived.

use std::hint;
use std::io;
use std::mem;
use std::ptr;
use std::slice;
use std::str;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use brimstone_network::MappedBuffer;
use brimstone_sync::{SpinLock, TicketLock};

/// Each arena maps 1 GiB up front; the mapping is virtual, so only pages the
/// cursor actually reaches ever become resident.
pub const ARENA_SIZE: usize = 1 << 30;

const PAGE_SIZE: usize = 4096;

/// How many pause-spins the swap burns before downgrading to a scheduler
/// yield while draining readers.
const SPINS_BEFORE_YIELD: u32 = 128;

#[derive(Debug, Default)]
struct Cursor {
    /// Next free offset.
    offset: usize,
    /// The cursor recorded at the last reset; pages between the two are
    /// hinted back to the kernel.
    high_water: usize,
}

/// One bump arena of the pair.
#[derive(Debug)]
pub struct Arena {
    mapping: MappedBuffer,
    cursor: SpinLock<Cursor>,
    active_readers: AtomicUsize,
}

impl Arena {
    fn new(size: usize) -> io::Result<Self> {
        Ok(Self {
            mapping: MappedBuffer::map(size)?,
            cursor: SpinLock::new(Cursor::default()),
            active_readers: AtomicUsize::new(0),
        })
    }

    fn bump(&self, cursor: &mut Cursor, size: usize, align: usize) -> Option<*mut u8> {
        debug_assert!(align.is_power_of_two());

        let offset = cursor.offset.checked_add(align - 1)? & !(align - 1);
        let end = offset.checked_add(size)?;
        if end > self.mapping.len() {
            return None;
        }
        cursor.offset = end;

        // SAFETY: offset + size is within the mapping.
        Some(unsafe { self.mapping.as_ptr().add(offset) })
    }

    fn alloc_raw(&self, size: usize, align: usize) -> Option<*mut u8> {
        let mut cursor = self.cursor.lock();
        self.bump(&mut cursor, size, align)
    }

    /// Lock-free bump for single-producer contexts.
    ///
    /// # Safety
    ///
    /// The caller must guarantee that no other thread is allocating from this
    /// arena for the duration of the call.
    unsafe fn alloc_raw_unlocked(&self, size: usize, align: usize) -> Option<*mut u8> {
        // SAFETY: exclusivity is the caller's contract.
        let cursor = unsafe { &mut *self.cursor.as_mut_ptr() };
        self.bump(cursor, size, align)
    }

    /// Rewinds the cursor and hints any tail used last time around but not
    /// this time back to the kernel. Contents below the cursor are left
    /// intact; they are only overwritten once the arena is current again.
    fn reset(&self) {
        let mut cursor = self.cursor.lock();

        if cursor.offset + PAGE_SIZE < cursor.high_water {
            let start = (cursor.offset + PAGE_SIZE - 1) & !(PAGE_SIZE - 1);
            let end = cursor.high_water & !(PAGE_SIZE - 1);
            if start < end {
                // SAFETY: [start, end) is page-aligned and inside the mapping.
                unsafe {
                    libc::madvise(
                        self.mapping.as_ptr().add(start).cast(),
                        end - start,
                        libc::MADV_FREE,
                    );
                }
            }
        }

        cursor.high_water = cursor.offset;
        cursor.offset = 0;
    }
}

/// The arena pair and the handoff state.
#[derive(Debug)]
pub struct TickArenas {
    arenas: [Arena; 2],
    /// Index of the current (consumer-facing) arena, guarded by the fair
    /// lock shared between swap and take_current.
    current: TicketLock<usize>,
}

impl TickArenas {
    pub fn new() -> io::Result<Self> {
        Self::with_size(ARENA_SIZE)
    }

    fn with_size(size: usize) -> io::Result<Self> {
        Ok(Self {
            arenas: [Arena::new(size)?, Arena::new(size)?],
            current: TicketLock::new(0),
        })
    }

    /// Pins the current arena for reading and allocating. The swap cannot
    /// retire the arena while the guard lives, so keep it scoped tightly.
    pub fn take_current(&self) -> ArenaGuard<'_> {
        let index = self.current.lock();
        let arena = &self.arenas[*index];
        arena.active_readers.fetch_add(1, Ordering::Relaxed);
        drop(index);
        ArenaGuard { arena }
    }

    /// Exchanges current and next. Called once per tick by the game loop.
    ///
    /// The old current becomes next and is reset (cursor rewound, unused tail
    /// hinted away); the old next becomes current. Readers that raced the
    /// flip incremented the other arena's counter, so waiting for the new
    /// current's count to drain is enough to know nobody still reads what the
    /// producers are about to overwrite.
    pub fn swap(&self) {
        let new_current = {
            let mut index = self.current.lock();
            *index ^= 1;
            self.arenas[*index ^ 1].reset();
            *index
        };

        let mut spins = 0_u32;
        while self.arenas[new_current]
            .active_readers
            .load(Ordering::Acquire)
            != 0
        {
            spins += 1;
            if spins < SPINS_BEFORE_YIELD {
                hint::spin_loop();
            } else {
                thread::yield_now();
            }
        }
    }
}

/// A pinned reference to the current arena. Everything allocated through the
/// guard borrows from it, so no allocation can outlive the pin.
#[derive(Debug)]
pub struct ArenaGuard<'t> {
    arena: &'t Arena,
}

impl ArenaGuard<'_> {
    /// Copies `value` into the arena. `Copy` keeps drop glue out of memory
    /// that is reclaimed wholesale.
    pub fn alloc<T: Copy>(&self, value: T) -> Option<&mut T> {
        let ptr = self
            .arena
            .alloc_raw(mem::size_of::<T>(), mem::align_of::<T>())?
            .cast::<T>();

        // SAFETY: the allocation is fresh, aligned for T, and disjoint from
        // every other allocation this tick.
        unsafe {
            ptr.write(value);
            Some(&mut *ptr)
        }
    }

    /// Copies a byte slice into the arena.
    pub fn alloc_slice(&self, bytes: &[u8]) -> Option<&mut [u8]> {
        let ptr = self.arena.alloc_raw(bytes.len(), 1)?;

        // SAFETY: as in `alloc`; the regions cannot overlap.
        unsafe {
            ptr::copy_nonoverlapping(bytes.as_ptr(), ptr, bytes.len());
            Some(slice::from_raw_parts_mut(ptr, bytes.len()))
        }
    }

    /// Copies a string into the arena.
    pub fn alloc_str(&self, s: &str) -> Option<&str> {
        let bytes = self.alloc_slice(s.as_bytes())?;
        // SAFETY: the bytes were copied verbatim from a valid str.
        Some(unsafe { str::from_utf8_unchecked(bytes) })
    }

    /// Bump without taking the allocation lock.
    ///
    /// # Safety
    ///
    /// Only sound while a single producer allocates from this arena; see
    /// [`Arena::alloc_raw_unlocked`].
    pub unsafe fn alloc_slice_unlocked(&self, bytes: &[u8]) -> Option<&mut [u8]> {
        // SAFETY: forwarded contract.
        let ptr = unsafe { self.arena.alloc_raw_unlocked(bytes.len(), 1)? };

        // SAFETY: as in `alloc_slice`.
        unsafe {
            ptr::copy_nonoverlapping(bytes.as_ptr(), ptr, bytes.len());
            Some(slice::from_raw_parts_mut(ptr, bytes.len()))
        }
    }
}

impl Drop for ArenaGuard<'_> {
    fn drop(&mut self) {
        self.arena.active_readers.fetch_sub(1, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    use super::*;

    #[test]
    fn allocations_do_not_overlap() {
        let arenas = TickArenas::with_size(1 << 16).unwrap();
        let guard = arenas.take_current();

        let a = guard.alloc_slice(&[0xaa; 100]).unwrap().as_ptr() as usize;
        let b = guard.alloc_slice(&[0xbb; 100]).unwrap().as_ptr() as usize;
        let c = guard.alloc(0xcc_u64).unwrap() as *mut u64 as usize;

        assert!(a + 100 <= b);
        assert!(b + 100 <= c);
        assert_eq!(c % mem::align_of::<u64>(), 0);
    }

    #[test]
    fn alloc_fails_past_the_end() {
        let arenas = TickArenas::with_size(PAGE_SIZE).unwrap();
        let guard = arenas.take_current();

        assert!(guard.alloc_slice(&[0; PAGE_SIZE]).is_some());
        assert!(guard.alloc(0_u8).is_none());
    }

    #[test]
    fn values_survive_one_swap_but_not_two() {
        let arenas = TickArenas::with_size(1 << 16).unwrap();

        let ptr = {
            let guard = arenas.take_current();
            let slice = guard.alloc_slice(b"payload").unwrap();
            slice.as_ptr()
        };

        // One swap: the arena is now `next`, contents intact.
        arenas.swap();
        // SAFETY: test-only peek at memory the contract says is still live.
        let bytes = unsafe { slice::from_raw_parts(ptr, 7) };
        assert_eq!(bytes, b"payload");

        // Second swap makes it current again; the next allocation reuses the
        // same offset.
        arenas.swap();
        let guard = arenas.take_current();
        let reused = guard.alloc_slice(b"other!!").unwrap();
        assert_eq!(reused.as_ptr(), ptr);
    }

    #[test]
    fn swap_waits_for_readers() {
        let arenas = Arc::new(TickArenas::with_size(1 << 16).unwrap());
        let swapped = Arc::new(AtomicBool::new(false));

        let guard = arenas.take_current();

        let swapper = {
            let arenas = Arc::clone(&arenas);
            let swapped = Arc::clone(&swapped);
            thread::spawn(move || {
                // Two swaps: the second targets the arena the guard pins.
                arenas.swap();
                arenas.swap();
                swapped.store(true, Ordering::Release);
            })
        };

        thread::sleep(std::time::Duration::from_millis(50));
        assert!(
            !swapped.load(Ordering::Acquire),
            "swap finished while a reader still held the arena"
        );

        drop(guard);
        swapper.join().unwrap();
        assert!(swapped.load(Ordering::Acquire));
    }

    #[test]
    fn concurrent_producers_see_intact_payloads() {
        let arenas = Arc::new(TickArenas::with_size(1 << 20).unwrap());

        let producers: Vec<_> = (0..4_u8)
            .map(|tag| {
                let arenas = Arc::clone(&arenas);
                thread::spawn(move || {
                    for _ in 0..500 {
                        let guard = arenas.take_current();
                        if let Some(slice) = guard.alloc_slice(&[tag; 64]) {
                            assert!(slice.iter().all(|&b| b == tag));
                        }
                    }
                })
            })
            .collect();

        for _ in 0..20 {
            arenas.swap();
            thread::sleep(std::time::Duration::from_millis(1));
        }

        for producer in producers {
            producer.join().unwrap();
        }
    }

    #[test]
    fn unlocked_alloc_bumps_the_same_cursor() {
        let arenas = TickArenas::with_size(1 << 16).unwrap();
        let guard = arenas.take_current();

        let a = guard.alloc_slice(&[1; 8]).unwrap().as_ptr() as usize;
        // SAFETY: this test is the only producer.
        let b = unsafe { guard.alloc_slice_unlocked(&[2; 8]) }.unwrap().as_ptr() as usize;
        assert_eq!(a + 8, b);
    }
}
