//! Chunk-chained bump allocator.
//!
//! An [`Arena`] hands out byte slices carved out of a singly-growing chain
//! of fixed-size chunks. Chunks are boxed (`Box<[u8]>`) so the backing
//! storage never moves once allocated — only the `Vec` that tracks the
//! chunks grows, and growing that `Vec` relocates pointers to `Chunk`
//! values, never the heap buffer a `Chunk` owns. Every byte slice ever
//! handed out by [`Arena::alloc`] therefore stays valid until [`Arena::reset`]
//! or [`Arena::free`] is called, no matter how many further allocations are
//! made in between.
//!
//! [`Arena::alloc`] takes `&self`, not `&mut self`: callers interleave
//! writing new entries with holding references to previously written ones
//! (this is exactly how the info-file parser uses a [`DualArena`]), so the
//! allocator needs interior mutability rather than exclusive borrows. The
//! bump pointer and chunk list live behind a `RefCell`/`Cell`, and the
//! lifetime of a returned slice is tied to `&self` via a small amount of
//! unsafe code whose soundness rests on the pointer-stability invariant
//! above.
//!
//! A failed backing allocation is not a recoverable condition here: the
//! workload is batch decoding of gigabyte-scale files, and partial output
//! from a half-grown arena is worse than no output. [`Arena::alloc`] logs a
//! diagnostic naming the operation and the requested size, then panics
//! (the workspace's release profile runs with `panic = "abort"`, so this is
//! a process abort in production builds).

use std::cell::{Cell, RefCell};

/// Smallest chunk an [`Arena`] ever allocates.
const MIN_CHUNK_SIZE: usize = 4 * 1024;

/// Chunk doubling stops growing past this size; further growth still
/// appends chunks of this size (or `2n` for an allocation larger than it).
const MAX_CHUNK_SIZE: usize = 16 * 1024 * 1024;

struct Chunk {
    buf: Box<[u8]>,
    used: Cell<usize>,
}

impl Chunk {
    fn new(size: usize) -> Self {
        Self {
            buf: vec![0u8; size].into_boxed_slice(),
            used: Cell::new(0),
        }
    }

    fn free(&self) -> usize {
        self.buf.len() - self.used.get()
    }
}

/// A pointer-stable, chunk-chained bump allocator.
///
/// Not `Sync` (it uses `Cell`/`RefCell` internally) and not meant to be: the
/// archive's concurrency model touches an arena from exactly one thread —
/// workers that extract signals in parallel write into a pre-allocated
/// output buffer instead, never into the archive's arena.
pub struct Arena {
    label: &'static str,
    chunks: RefCell<Vec<Chunk>>,
    current: Cell<usize>,
    next_chunk_size: Cell<usize>,
}

impl Arena {
    /// Allocate the first chunk and return a ready-to-use arena.
    pub fn new(label: &'static str, initial_size: usize) -> Self {
        let initial_size = initial_size.max(MIN_CHUNK_SIZE);
        Self {
            label,
            chunks: RefCell::new(vec![Chunk::new(initial_size)]),
            current: Cell::new(0),
            next_chunk_size: Cell::new(initial_size),
        }
    }

    /// Grow the arena until its summed capacity is at least `total` bytes.
    /// Never copies or moves existing chunks — it only appends new ones.
    pub fn reserve(&self, total: usize) {
        while self.capacity() < total {
            self.push_chunk(self.next_chunk_size.get());
        }
    }

    /// Allocate `n` bytes and return a slice into them. The slice is zeroed.
    ///
    /// Order of attempts: bump the current chunk if it has room; else scan
    /// the chain (bounded by chunk count) for any chunk with enough free
    /// space; else append a fresh chunk sized `max(next_chunk_size, 2n)`.
    pub fn alloc(&self, n: usize) -> &[u8] {
        if n == 0 {
            return &[];
        }

        {
            let chunks = self.chunks.borrow();
            let cur = self.current.get();
            if chunks[cur].free() >= n {
                let start = chunks[cur].used.get();
                chunks[cur].used.set(start + n);
                let ptr = chunks[cur].buf.as_ptr();
                return unsafe { self.slice_at(ptr, start, n) };
            }
            for (idx, chunk) in chunks.iter().enumerate() {
                if idx != cur && chunk.free() >= n {
                    self.current.set(idx);
                    let start = chunk.used.get();
                    chunk.used.set(start + n);
                    let ptr = chunk.buf.as_ptr();
                    return unsafe { self.slice_at(ptr, start, n) };
                }
            }
        }

        let size = self.next_chunk_size.get().max(2 * n);
        self.push_chunk(size);
        let chunks = self.chunks.borrow();
        let idx = chunks.len() - 1;
        self.current.set(idx);
        let start = 0;
        chunks[idx].used.set(n);
        let ptr = chunks[idx].buf.as_ptr();
        unsafe { self.slice_at(ptr, start, n) }
    }

    /// Copy `s` into the arena and return a `&str` borrowed from it. An
    /// extra NUL byte is written immediately after the copied bytes (not
    /// included in the returned slice) so that a raw pointer into the
    /// arena can still be treated as a C-string tail, matching the classic
    /// `strdup` contract.
    pub fn alloc_str(&self, s: &str) -> &str {
        let bytes = self.alloc_bytes_with_nul(s.as_bytes());
        unsafe { std::str::from_utf8_unchecked(bytes) }
    }

    /// Byte-slice equivalent of [`Arena::alloc_str`] (`strndup`): copies
    /// `bytes`, appends a trailing NUL, returns the (non-NUL-terminated)
    /// slice.
    pub fn alloc_bytes(&self, bytes: &[u8]) -> &[u8] {
        self.alloc_bytes_with_nul(bytes)
    }

    fn alloc_bytes_with_nul(&self, bytes: &[u8]) -> &[u8] {
        let out = self.alloc(bytes.len() + 1);
        let out_mut = out.as_ptr() as *mut u8;
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), out_mut, bytes.len());
            *out_mut.add(bytes.len()) = 0;
            std::slice::from_raw_parts(out_mut, bytes.len())
        }
    }

    /// Reset every chunk's bump pointer to zero. No chunk is freed, but
    /// every pointer handed out before the reset is now invalid.
    pub fn reset(&self) {
        let chunks = self.chunks.borrow();
        for chunk in chunks.iter() {
            chunk.used.set(0);
        }
        self.current.set(0);
    }

    /// Free every chunk. Equivalent to dropping the arena, exposed
    /// explicitly to mirror the classic allocator's `arena_free`.
    pub fn free(&self) {
        self.chunks.borrow_mut().clear();
        self.current.set(0);
    }

    /// Total bytes allocated out of the arena so far (sum over chunks).
    pub fn used(&self) -> usize {
        self.chunks.borrow().iter().map(|c| c.used.get()).sum()
    }

    /// Total bytes backing the arena so far (sum over chunks).
    pub fn capacity(&self) -> usize {
        self.chunks.borrow().iter().map(|c| c.buf.len()).sum()
    }

    fn push_chunk(&self, size: usize) {
        let size = size.max(MIN_CHUNK_SIZE);
        if size > MAX_CHUNK_SIZE {
            tracing::debug!(
                arena = self.label,
                requested = size,
                "chunk larger than the {}MiB doubling cap (oversized single allocation)",
                MAX_CHUNK_SIZE / (1024 * 1024)
            );
        }
        self.chunks.borrow_mut().push(Chunk::new(size));
        let doubled = (self.next_chunk_size.get() * 2).min(MAX_CHUNK_SIZE);
        self.next_chunk_size.set(doubled);
    }

    /// # Safety
    /// `ptr` must point at the start of a `Chunk`'s backing buffer that is
    /// still owned by `self.chunks` (i.e. has not been freed), `start + n`
    /// must be within that buffer's length, and the byte range
    /// `[start, start+n)` must not have been handed out by a previous call
    /// that is still being written through (bump allocation guarantees
    /// this: `used` only ever increases past any previously returned
    /// range).
    unsafe fn slice_at(&self, ptr: *const u8, start: usize, n: usize) -> &[u8] {
        std::slice::from_raw_parts(ptr.add(start), n)
    }
}

/// Two independent arenas: a hot key arena (walked during every lookup) and
/// a cold value arena (touched only on a hit). Splitting them keeps the
/// working set touched by `KvTable::get` small even when values are large
/// multi-line blobs.
pub struct DualArena {
    pub keys: Arena,
    pub values: Arena,
}

impl DualArena {
    pub fn new(key_capacity: usize, value_capacity: usize) -> Self {
        Self {
            keys: Arena::new("key", key_capacity),
            values: Arena::new("value", value_capacity),
        }
    }

    /// Pre-size both arenas given an expected input size `f`: `F/3` bytes
    /// for keys, `5F/3` bytes for values, an upper-bound estimate that
    /// keeps well-formed sidecars allocation-free past this call.
    pub fn reserve_for_file_size(&self, file_size: usize) {
        self.keys.reserve(file_size / 3);
        self.values.reserve(file_size * 5 / 3);
    }

    pub fn reset(&self) {
        self.keys.reset();
        self.values.reset();
    }

    pub fn free(&self) {
        self.keys.free();
        self.values.free();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_within_chunk_is_stable() {
        let arena = Arena::new("test", 64);
        let a = arena.alloc_str("hello");
        let b = arena.alloc_str("world");
        assert_eq!(a, "hello");
        assert_eq!(b, "world");
    }

    #[test]
    fn alloc_across_chunk_growth_preserves_earlier_pointers() {
        let arena = Arena::new("test", 16);
        let mut handles = Vec::new();
        for i in 0..500 {
            handles.push(arena.alloc_str(&format!("entry-{i}")));
        }
        for (i, h) in handles.iter().enumerate() {
            assert_eq!(*h, format!("entry-{i}"));
        }
    }

    #[test]
    fn reset_allows_reuse_without_freeing_chunks() {
        let arena = Arena::new("test", 64);
        arena.alloc_str("abc");
        let cap_before = arena.capacity();
        arena.reset();
        assert_eq!(arena.used(), 0);
        assert_eq!(arena.capacity(), cap_before);
        arena.alloc_str("xyz");
    }

    #[test]
    fn free_drops_all_chunks() {
        let arena = Arena::new("test", 64);
        arena.alloc_str("abc");
        arena.free();
        assert_eq!(arena.capacity(), 0);
        assert_eq!(arena.used(), 0);
    }

    #[test]
    fn reserve_grows_capacity_without_copying_existing_chunks() {
        let arena = Arena::new("test", 64);
        let a = arena.alloc_str("pin-me");
        arena.reserve(1_000_000);
        assert!(arena.capacity() >= 1_000_000);
        assert_eq!(a, "pin-me");
    }

    #[test]
    fn zero_length_alloc_is_empty_slice() {
        let arena = Arena::new("test", 64);
        assert_eq!(arena.alloc(0), &[] as &[u8]);
    }

    #[test]
    fn dual_arena_reserve_for_file_size() {
        let dual = DualArena::new(16, 16);
        dual.reserve_for_file_size(3000);
        assert!(dual.keys.capacity() >= 1000);
        assert!(dual.values.capacity() >= 5000);
    }
}
