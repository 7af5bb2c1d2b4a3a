//! Single-producer single-consumer byte ring carrying encoded records
//!
//! The ring stores variable-length frames. Every frame starts with an
//! 8-byte header holding the payload length and a caller-defined tag, and
//! is padded to an 8-byte boundary. A frame never wraps around the physical
//! end of the storage: when the remaining tail is too short, the writer
//! fills it with a padding frame and continues at offset zero.
//!
//! Both cursors are monotonically increasing byte counts. The writer
//! publishes a frame by storing its cursor with `Release` after the frame
//! bytes are written; the reader acquires it before touching the bytes, and
//! releases its own cursor after it is done with them.

use crossbeam_utils::{Backoff, CachePadded};
use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Size of the frame header
pub const HEADER_LEN: usize = 8;

/// Frame alignment
pub const FRAME_ALIGN: usize = 8;

/// Smallest ring that can be created
pub const MIN_CAPACITY: usize = 64;

const PAD_TAG: u32 = u32::MAX;

/// Reason a frame could not be written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteError {
    /// Not enough free space and the write was non-blocking
    Full,
    /// The frame can never fit into the ring
    TooLarge { size: usize, capacity: usize },
    /// The reader was dropped
    Disconnected,
}

struct Shared {
    storage: Box<[UnsafeCell<u8>]>,
    mask: usize,
    write_pos: CachePadded<AtomicUsize>,
    read_pos: CachePadded<AtomicUsize>,
    reader_alive: AtomicBool,
}

// SAFETY: the writer only touches bytes in the free region and the reader
// only touches bytes in the published region; the cursor handshake keeps
// the two regions disjoint.
unsafe impl Sync for Shared {}

impl Shared {
    #[inline]
    fn capacity(&self) -> usize {
        self.storage.len()
    }

    /// Raw pointer to the byte at `offset`
    #[inline]
    fn byte_ptr(&self, offset: usize) -> *mut u8 {
        debug_assert!(offset < self.capacity());
        // SAFETY: offset is within the storage slice.
        unsafe { UnsafeCell::raw_get(self.storage.as_ptr().add(offset)) }
    }
}

/// Producer half of a ring
pub struct Writer {
    shared: Arc<Shared>,
    write_pos: usize,
    cached_read_pos: usize,
}

/// Consumer half of a ring
pub struct Reader {
    shared: Arc<Shared>,
    read_pos: usize,
    cached_write_pos: usize,
}

/// Create a ring holding at least `min_capacity` bytes
///
/// The capacity is rounded up to a power of two and to at least
/// [`MIN_CAPACITY`].
pub fn channel(min_capacity: usize) -> (Writer, Reader) {
    let capacity = min_capacity.max(MIN_CAPACITY).next_power_of_two();
    let storage: Box<[UnsafeCell<u8>]> = (0..capacity).map(|_| UnsafeCell::new(0)).collect();

    let shared = Arc::new(Shared {
        storage,
        mask: capacity - 1,
        write_pos: CachePadded::new(AtomicUsize::new(0)),
        read_pos: CachePadded::new(AtomicUsize::new(0)),
        reader_alive: AtomicBool::new(true),
    });

    let writer = Writer {
        shared: Arc::clone(&shared),
        write_pos: 0,
        cached_read_pos: 0,
    };
    let reader = Reader {
        shared,
        read_pos: 0,
        cached_write_pos: 0,
    };
    (writer, reader)
}

/// Total bytes a frame with `payload_len` bytes occupies
#[inline]
pub const fn frame_len(payload_len: usize) -> usize {
    (HEADER_LEN + payload_len + FRAME_ALIGN - 1) & !(FRAME_ALIGN - 1)
}

#[inline]
fn write_header(shared: &Shared, offset: usize, len: u32, tag: u32) {
    let mut header = [0u8; HEADER_LEN];
    header[..4].copy_from_slice(&len.to_le_bytes());
    header[4..].copy_from_slice(&tag.to_le_bytes());
    // SAFETY: offset is 8-aligned and at least HEADER_LEN bytes remain
    // before the physical end, since the capacity is a multiple of 8.
    unsafe {
        std::ptr::copy_nonoverlapping(header.as_ptr(), shared.byte_ptr(offset), HEADER_LEN);
    }
}

#[inline]
fn read_header(shared: &Shared, offset: usize) -> (u32, u32) {
    let mut header = [0u8; HEADER_LEN];
    // SAFETY: see write_header.
    unsafe {
        std::ptr::copy_nonoverlapping(shared.byte_ptr(offset), header.as_mut_ptr(), HEADER_LEN);
    }
    let len = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
    let tag = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
    (len, tag)
}

impl Writer {
    pub fn capacity(&self) -> usize {
        self.shared.capacity()
    }

    /// Largest payload a single frame can carry
    pub fn max_payload(&self) -> usize {
        self.capacity() - HEADER_LEN
    }

    /// Whether the reader half still exists
    pub fn is_connected(&self) -> bool {
        self.shared.reader_alive.load(Ordering::Acquire)
    }

    /// Bytes not yet released by the reader
    pub fn pending_bytes(&self) -> usize {
        self.write_pos - self.shared.read_pos.load(Ordering::Acquire)
    }

    #[inline]
    fn free_space(&self) -> usize {
        self.capacity() - (self.write_pos - self.cached_read_pos)
    }

    /// Wait until `needed` bytes are free, refreshing the cached read cursor
    fn reserve(&mut self, needed: usize, blocking: bool) -> Result<(), WriteError> {
        if self.free_space() >= needed {
            return Ok(());
        }

        let backoff = Backoff::new();
        loop {
            self.cached_read_pos = self.shared.read_pos.load(Ordering::Acquire);
            if self.free_space() >= needed {
                return Ok(());
            }
            if !blocking {
                return Err(WriteError::Full);
            }
            if !self.is_connected() {
                return Err(WriteError::Disconnected);
            }
            if backoff.is_completed() {
                std::thread::sleep(Duration::from_micros(50));
            } else {
                backoff.snooze();
            }
        }
    }

    /// Append a frame of `len` payload bytes, filled in by `fill`
    ///
    /// With `blocking` set the call waits for the reader to free space;
    /// otherwise it fails with [`WriteError::Full`]. `fill` runs at most once
    /// and only when the frame is actually written.
    pub fn write<F>(&mut self, tag: u32, len: usize, blocking: bool, fill: F) -> Result<(), WriteError>
    where
        F: FnOnce(&mut [u8]),
    {
        debug_assert_ne!(tag, PAD_TAG);
        let capacity = self.capacity();
        let frame = frame_len(len);
        if frame > capacity || len > u32::MAX as usize {
            return Err(WriteError::TooLarge {
                size: frame,
                capacity,
            });
        }

        if !self.is_connected() {
            return Err(WriteError::Disconnected);
        }

        let offset = self.write_pos & self.shared.mask;
        let contiguous = capacity - offset;
        if frame > contiguous {
            // pad out the tail, the frame goes to offset zero
            self.reserve(contiguous, blocking)?;
            write_header(&self.shared, offset, 0, PAD_TAG);
            self.write_pos += contiguous;
            self.shared.write_pos.store(self.write_pos, Ordering::Release);
        }

        self.reserve(frame, blocking)?;

        let offset = self.write_pos & self.shared.mask;
        write_header(&self.shared, offset, len as u32, tag);
        // SAFETY: [offset + HEADER_LEN, offset + frame) lies in the free
        // region, inside the storage, and is not visible to the reader until
        // the cursor below is published.
        let payload = unsafe {
            std::slice::from_raw_parts_mut(self.shared.byte_ptr(offset + HEADER_LEN), len)
        };
        fill(payload);

        self.write_pos += frame;
        self.shared.write_pos.store(self.write_pos, Ordering::Release);
        Ok(())
    }
}

impl Reader {
    pub fn capacity(&self) -> usize {
        self.shared.capacity()
    }

    /// Whether every published frame was consumed
    pub fn is_empty(&mut self) -> bool {
        if self.read_pos != self.cached_write_pos {
            return false;
        }
        self.cached_write_pos = self.shared.write_pos.load(Ordering::Acquire);
        self.read_pos == self.cached_write_pos
    }

    /// Pass the oldest frame's tag and payload to `f`, then release it
    ///
    /// Returns `None` when the ring is empty.
    pub fn read<R, F>(&mut self, f: F) -> Option<R>
    where
        F: FnOnce(u32, &[u8]) -> R,
    {
        loop {
            if self.is_empty() {
                return None;
            }

            let offset = self.read_pos & self.shared.mask;
            let (len, tag) = read_header(&self.shared, offset);

            if tag == PAD_TAG {
                self.read_pos += self.capacity() - offset;
                self.shared.read_pos.store(self.read_pos, Ordering::Release);
                continue;
            }

            let len = len as usize;
            // SAFETY: the frame was published by the writer's Release store
            // which we acquired in is_empty, and the writer does not touch it
            // until read_pos moves past it.
            let payload = unsafe {
                std::slice::from_raw_parts(self.shared.byte_ptr(offset + HEADER_LEN), len)
            };
            let result = f(tag, payload);

            self.read_pos += frame_len(len);
            self.shared.read_pos.store(self.read_pos, Ordering::Release);
            return Some(result);
        }
    }
}

impl Drop for Reader {
    fn drop(&mut self) {
        self.shared.reader_alive.store(false, Ordering::Release);
    }
}
