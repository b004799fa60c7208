//! Pools of fixed-size anonymous memory mappings.
//!
//! Mapping instead of heap-allocating keeps the resident set elastic: a
//! buffer going back into the pool is handed to the kernel with `MADV_FREE`,
//! so unused pages can be reclaimed under memory pressure while the mapping
//! itself stays cheap to reuse. Free lists are LIFO to keep hot buffers hot.

use std::io;
use std::ptr::{self, NonNull};
use std::slice;

use brimstone_sync::SpinLock;

/// A fixed-size private anonymous mapping. Unmapped on drop.
#[derive(Debug)]
pub struct MappedBuffer {
    ptr: NonNull<u8>,
    len: usize,
}

// SAFETY: the mapping is plain memory with no thread affinity; shared access
// hands out only `&[u8]`, and mutation requires `&mut` or a raw pointer whose
// discipline is the caller's.
unsafe impl Send for MappedBuffer {}
unsafe impl Sync for MappedBuffer {}

impl MappedBuffer {
    pub fn map(len: usize) -> io::Result<Self> {
        // SAFETY: anonymous private mapping with no backing fd.
        let ptr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };

        if ptr == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }

        match NonNull::new(ptr.cast::<u8>()) {
            Some(ptr) => Ok(Self { ptr, len }),
            None => Err(io::Error::other("mmap returned a null mapping")),
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: the mapping is readable for its whole length.
        unsafe { slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: the mapping is writable and we hold the only reference.
        unsafe { slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }

    /// Forwards a usage hint for the whole region to the kernel. Advisory
    /// only; failures are ignored.
    pub(crate) fn advise(&self, advice: libc::c_int) {
        // SAFETY: the range is a live mapping owned by self.
        unsafe {
            libc::madvise(self.ptr.as_ptr().cast(), self.len, advice);
        }
    }
}

impl Drop for MappedBuffer {
    fn drop(&mut self) {
        // SAFETY: the mapping was created by mmap and is unmapped exactly once.
        unsafe {
            libc::munmap(self.ptr.as_ptr().cast(), self.len);
        }
    }
}

/// A pool for contexts that are entered from a single thread; the reactor's
/// TCP-recv and protocol-recv pools. No locking.
#[derive(Debug)]
pub struct BufferPool {
    buffer_size: usize,
    free: Vec<MappedBuffer>,
}

impl BufferPool {
    pub fn new(buffer_size: usize) -> Self {
        Self {
            buffer_size,
            free: Vec::new(),
        }
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Pops a free buffer, or maps a fresh one when the pool is dry.
    pub fn take(&mut self) -> io::Result<MappedBuffer> {
        match self.free.pop() {
            Some(buffer) => {
                buffer.advise(libc::MADV_WILLNEED);
                Ok(buffer)
            }
            None => MappedBuffer::map(self.buffer_size),
        }
    }

    /// Returns a buffer and tells the kernel its pages are reclaimable.
    pub fn put(&mut self, buffer: MappedBuffer) {
        debug_assert_eq!(buffer.len(), self.buffer_size);
        buffer.advise(libc::MADV_FREE);
        self.free.push(buffer);
    }
}

/// The spin-locked variant for the protocol-send pool, which may be entered
/// from any thread that composes an outbound packet.
#[derive(Debug)]
pub struct SharedBufferPool {
    buffer_size: usize,
    free: SpinLock<Vec<MappedBuffer>>,
}

impl SharedBufferPool {
    pub fn new(buffer_size: usize) -> Self {
        Self {
            buffer_size,
            free: SpinLock::new(Vec::new()),
        }
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    pub fn take(&self) -> io::Result<MappedBuffer> {
        let popped = self.free.lock().pop();
        match popped {
            Some(buffer) => {
                buffer.advise(libc::MADV_WILLNEED);
                Ok(buffer)
            }
            None => MappedBuffer::map(self.buffer_size),
        }
    }

    pub fn put(&self, buffer: MappedBuffer) {
        debug_assert_eq!(buffer.len(), self.buffer_size);
        buffer.advise(libc::MADV_FREE);
        self.free.lock().push(buffer);
    }
}
