//! Reference-counted byte buffers.
//!
//! Grounded on `libavtransport/buffer.c`: the C type tracks an atomic
//! refcount by hand and fires a deallocator callback when it drops to zero.
//! In Rust the equivalent is `Arc` plus `Drop` — the refcount bookkeeping and
//! the single-invocation deallocator guarantee both come for free from the
//! language, so `Buffer` is a thin wrapper that also carries the "only
//! resize when unique" rule as a checked operation instead of an assertion.

use std::ops::Deref;
use std::sync::Arc;

use crate::error::{Error, Result};

type Dealloc = Box<dyn FnOnce(&[u8]) + Send + Sync>;

struct Inner {
    data: Vec<u8>,
    dealloc: Option<Dealloc>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(f) = self.dealloc.take() {
            f(&self.data);
        }
    }
}

/// A shared, ref-counted region of bytes.
///
/// Cloning a `Buffer` is cheap (an `Arc` clone) and models the C library's
/// `avt_buffer_ref`/`avt_buffer_quick_ref`: both copies point at the same
/// backing storage. A buffer created by [`Buffer::slice`] is read-only,
/// matching `AVT_BUFFER_FLAG_RO`.
#[derive(Clone)]
pub struct Buffer {
    inner: Arc<Inner>,
    offset: usize,
    len: usize,
    read_only: bool,
}

impl Buffer {
    /// Allocates a zero-filled buffer of `len` bytes.
    pub fn alloc(len: usize) -> Self {
        Buffer {
            inner: Arc::new(Inner {
                data: vec![0u8; len],
                dealloc: None,
            }),
            offset: 0,
            len,
            read_only: false,
        }
    }

    /// Wraps an existing byte vector without copying.
    pub fn from_vec(data: Vec<u8>) -> Self {
        let len = data.len();
        Buffer {
            inner: Arc::new(Inner {
                data,
                dealloc: None,
            }),
            offset: 0,
            len,
            read_only: false,
        }
    }

    /// Wraps existing bytes with a custom deallocator, run once the last
    /// reference drops. Mirrors `avt_buffer_create`'s caller-supplied
    /// `free`/`opaque` pair.
    pub fn with_deallocator(data: Vec<u8>, dealloc: impl FnOnce(&[u8]) + Send + Sync + 'static) -> Self {
        let len = data.len();
        Buffer {
            inner: Arc::new(Inner {
                data,
                dealloc: Some(Box::new(dealloc)),
            }),
            offset: 0,
            len,
            read_only: false,
        }
    }

    /// Number of live references to the backing storage, including `self`.
    pub fn refcount(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    /// Length of this view in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// `true` if this view covers zero bytes.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// `true` if this view was produced by [`Buffer::slice`] and must not be
    /// resized or written through.
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Returns the bytes this view covers.
    pub fn data(&self) -> &[u8] {
        &self.inner.data[self.offset..self.offset + self.len]
    }

    /// A read-only sub-view sharing the same backing allocation, matching
    /// `avt_buffer_ref`'s offset/length slicing.
    pub fn slice(&self, offset: usize, len: usize) -> Result<Self> {
        if offset + len > self.len {
            return Err(Error::Range(format!(
                "slice {offset}..{offset}+{len} exceeds buffer of length {}",
                self.len
            )));
        }
        Ok(Buffer {
            inner: Arc::clone(&self.inner),
            offset: self.offset + offset,
            len,
            read_only: true,
        })
    }

    /// Attempts to grow or shrink the buffer in place.
    ///
    /// Only succeeds when this is the sole reference to the backing
    /// allocation and the view isn't read-only — the Rust analogue of the C
    /// library's `assert(buf->refcnt == 1)` in `avt_buffer_resize`, made
    /// recoverable instead of fatal.
    pub fn try_resize(&mut self, new_len: usize) -> Result<()> {
        if self.read_only {
            return Err(Error::Range("cannot resize a read-only buffer view".into()));
        }
        let inner = Arc::get_mut(&mut self.inner).ok_or_else(|| {
            Error::Range("cannot resize a buffer with more than one live reference".into())
        })?;
        inner.data.resize(new_len, 0);
        self.offset = 0;
        self.len = new_len;
        Ok(())
    }

    /// Writable access to the bytes, if this is the sole reference.
    pub fn data_mut(&mut self) -> Result<&mut [u8]> {
        if self.read_only {
            return Err(Error::Range("cannot write through a read-only buffer view".into()));
        }
        let offset = self.offset;
        let len = self.len;
        let inner = Arc::get_mut(&mut self.inner).ok_or_else(|| {
            Error::Range("cannot mutate a buffer with more than one live reference".into())
        })?;
        Ok(&mut inner.data[offset..offset + len])
    }
}

impl Deref for Buffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.data()
    }
}

impl std::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("len", &self.len)
            .field("refcount", &self.refcount())
            .field("read_only", &self.read_only)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refcount_tracks_live_clones() {
        let a = Buffer::alloc(16);
        assert_eq!(a.refcount(), 1);
        let b = a.clone();
        assert_eq!(a.refcount(), 2);
        drop(b);
        assert_eq!(a.refcount(), 1);
    }

    #[test]
    fn resize_fails_when_shared() {
        let mut a = Buffer::alloc(16);
        let _b = a.clone();
        assert!(a.try_resize(32).is_err());
    }

    #[test]
    fn resize_succeeds_when_unique() {
        let mut a = Buffer::alloc(16);
        a.try_resize(32).unwrap();
        assert_eq!(a.len(), 32);
    }

    #[test]
    fn slice_is_read_only_and_shares_storage() {
        let a = Buffer::from_vec(vec![1, 2, 3, 4, 5]);
        let s = a.slice(1, 3).unwrap();
        assert_eq!(s.data(), &[2, 3, 4]);
        assert!(s.is_read_only());
        assert_eq!(a.refcount(), 2);
    }

    #[test]
    fn slice_out_of_range_errors() {
        let a = Buffer::alloc(4);
        assert!(a.slice(2, 4).is_err());
    }

    #[test]
    fn deallocator_runs_exactly_once_on_last_drop() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        let count = Arc::new(AtomicUsize::new(0));
        let count2 = Arc::clone(&count);
        let a = Buffer::with_deallocator(vec![0u8; 8], move |_| {
            count2.fetch_add(1, Ordering::SeqCst);
        });
        let b = a.clone();
        drop(a);
        assert_eq!(count.load(Ordering::SeqCst), 0);
        drop(b);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    // For any sequence of reference/unref operations, the deallocator
    // runs exactly once, only
    // after every reference is dropped. `ops` drives a sequence of
    // clone-then-drop-at-random-index operations against one buffer.
    #[quickcheck_macros::quickcheck]
    fn deallocator_fires_exactly_once_for_arbitrary_clone_drop_sequence(ops: Vec<bool>) -> bool {
        use std::sync::atomic::{AtomicUsize, Ordering};
        let count = Arc::new(AtomicUsize::new(0));
        let count2 = Arc::clone(&count);
        let root = Buffer::with_deallocator(vec![0u8; 4], move |_| {
            count2.fetch_add(1, Ordering::SeqCst);
        });

        let mut live = vec![root];
        for clone_not_drop in ops {
            if clone_not_drop || live.len() == 1 {
                let idx = live.len() - 1;
                let clone = live[idx].clone();
                live.push(clone);
            } else {
                live.pop();
            }
            if count.load(Ordering::SeqCst) > 0 {
                // `live` is never emptied mid-loop (a drop that would empty
                // it is turned into a clone above), so the deallocator
                // firing this early would mean it fired while a reference
                // is still alive.
                return false;
            }
        }
        drop(live);
        count.load(Ordering::SeqCst) == 1
    }
}
