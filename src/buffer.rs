//! Cache-line aligned float storage and the activation/gradient workspace.
//!
//! - [`AlignedBuffer`] is a fixed-length, zero-initialised, 64-byte aligned
//!   `f32` buffer. It dereferences to `[f32]`.
//! - [`Workspace`] owns the activation and gradient buffers of one network,
//!   both sized from a [`BufferLayout`].

use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::ops::{Deref, DerefMut, Range};
use std::ptr::NonNull;

use crate::error::{SirenError, SirenResult};
use crate::layout::BufferLayout;

/// Alignment of every [`AlignedBuffer`] allocation (64 bytes).
pub const CACHE_LINE: usize = 64;

/// Fixed-length 64-byte aligned `f32` buffer.
///
/// ```rust
/// use sirensdf::AlignedBuffer;
///
/// let mut buf = AlignedBuffer::zeroed(16).unwrap();
/// buf[3] = 1.5;
/// assert_eq!(buf.iter().sum::<f32>(), 1.5);
/// assert_eq!(buf.as_ptr() as usize % 64, 0);
/// ```
pub struct AlignedBuffer {
    ptr: NonNull<f32>,
    len: usize,
    layout: Option<Layout>,
}

// SAFETY: the buffer exclusively owns its allocation.
unsafe impl Send for AlignedBuffer {}
unsafe impl Sync for AlignedBuffer {}

impl AlignedBuffer {
    /// Allocates `len` zeros.
    pub fn zeroed(len: usize) -> SirenResult<Self> {
        if len == 0 {
            return Ok(Self {
                ptr: NonNull::dangling(),
                len: 0,
                layout: None,
            });
        }
        let layout = Layout::array::<f32>(len)
            .and_then(|l| l.align_to(CACHE_LINE))
            .map_err(|e| SirenError::overflow(format!("aligned buffer of {len} floats: {e}")))?;
        Ok(Self {
            ptr: Self::allocate(layout),
            len,
            layout: Some(layout),
        })
    }

    /// Allocates a copy of `data`.
    pub fn from_slice(data: &[f32]) -> SirenResult<Self> {
        let mut buf = Self::zeroed(data.len())?;
        buf.copy_from_slice(data);
        Ok(buf)
    }

    fn allocate(layout: Layout) -> NonNull<f32> {
        // SAFETY: layout has non-zero size, allocation failure is routed to handle_alloc_error
        unsafe {
            let raw = alloc_zeroed(layout);
            match NonNull::new(raw as *mut f32) {
                Some(ptr) => ptr,
                None => std::alloc::handle_alloc_error(layout),
            }
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Overwrites every element with zero.
    #[inline]
    pub fn fill_zero(&mut self) {
        self.as_mut_slice().fill(0.0);
    }

    #[inline]
    pub fn as_slice(&self) -> &[f32] {
        // SAFETY: ptr is valid (or dangling with len 0) for `len` elements
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        // SAFETY: ptr is uniquely owned and valid for `len` elements
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl Deref for AlignedBuffer {
    type Target = [f32];

    #[inline]
    fn deref(&self) -> &[f32] {
        self.as_slice()
    }
}

impl DerefMut for AlignedBuffer {
    #[inline]
    fn deref_mut(&mut self) -> &mut [f32] {
        self.as_mut_slice()
    }
}

impl Drop for AlignedBuffer {
    fn drop(&mut self) {
        if let Some(layout) = self.layout {
            // SAFETY: layout is the one used for the allocation
            unsafe { dealloc(self.ptr.as_ptr() as *mut u8, layout) }
        }
    }
}

impl Clone for AlignedBuffer {
    fn clone(&self) -> Self {
        let Some(layout) = self.layout else {
            return Self {
                ptr: NonNull::dangling(),
                len: 0,
                layout: None,
            };
        };
        let mut copy = Self {
            ptr: Self::allocate(layout),
            len: self.len,
            layout: Some(layout),
        };
        copy.copy_from_slice(self.as_slice());
        copy
    }
}

impl std::fmt::Debug for AlignedBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlignedBuffer").field("len", &self.len).finish()
    }
}

/// Activation and gradient storage for one network.
///
/// Both buffers are `layout.activation_len()` long and share the offsets of
/// the layout they were built from.
#[derive(Clone, Debug)]
pub struct Workspace {
    pub activations: AlignedBuffer,
    pub gradients: AlignedBuffer,
}

impl Workspace {
    pub fn new(layout: &BufferLayout) -> SirenResult<Self> {
        Ok(Self {
            activations: AlignedBuffer::zeroed(layout.activation_len())?,
            gradients: AlignedBuffer::zeroed(layout.activation_len())?,
        })
    }

    /// Total bytes held by both buffers.
    pub fn memory_usage(&self) -> usize {
        (self.activations.len() + self.gradients.len()) * std::mem::size_of::<f32>()
    }
}

/// Splits one buffer into a read-only block and a disjoint writable block.
///
/// Forward writes later blocks from earlier ones and backward the reverse;
/// both directions are handled.
///
/// # Panics
///
/// If the ranges overlap or leave the buffer.
pub(crate) fn split_blocks(
    buf: &mut [f32],
    read: Range<usize>,
    write: Range<usize>,
) -> (&[f32], &mut [f32]) {
    if read.end <= write.start {
        let (head, tail) = buf.split_at_mut(write.start);
        (&head[read], &mut tail[..write.len()])
    } else {
        assert!(
            write.end <= read.start,
            "overlapping blocks {read:?} and {write:?}"
        );
        let (head, tail) = buf.split_at_mut(read.start);
        (&tail[..read.len()], &mut head[write])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SirenConfig;

    #[test]
    fn test_alignment_and_zeroing() {
        let buf = AlignedBuffer::zeroed(100).unwrap();
        assert_eq!(buf.as_ptr() as usize % CACHE_LINE, 0);
        assert!(buf.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_empty_buffer() {
        let buf = AlignedBuffer::zeroed(0).unwrap();
        assert!(buf.is_empty());
        assert_eq!(buf.as_slice(), &[] as &[f32]);
        let copy = buf.clone();
        assert!(copy.is_empty());
    }

    #[test]
    fn test_clone_is_deep() {
        let mut a = AlignedBuffer::from_slice(&[1.0, 2.0, 3.0]).unwrap();
        let b = a.clone();
        a[0] = 9.0;
        assert_eq!(b.as_slice(), &[1.0, 2.0, 3.0]);
        assert_ne!(a.as_ptr(), b.as_ptr());
    }

    #[test]
    fn test_workspace_sizes() {
        let layout = BufferLayout::from_config(&SirenConfig::sdf(1, 8, 16)).unwrap();
        let ws = Workspace::new(&layout).unwrap();
        assert_eq!(ws.activations.len(), layout.activation_len());
        assert_eq!(ws.gradients.len(), layout.activation_len());
        assert_eq!(ws.memory_usage(), 2 * 4 * layout.activation_len());
    }

    #[test]
    fn test_split_blocks_both_directions() {
        let mut buf: Vec<f32> = (0..10).map(|x| x as f32).collect();
        {
            let (src, dst) = split_blocks(&mut buf, 0..2, 5..7);
            dst.copy_from_slice(src);
        }
        assert_eq!(&buf[5..7], &[0.0, 1.0]);
        {
            let (src, dst) = split_blocks(&mut buf, 8..10, 2..4);
            dst.copy_from_slice(src);
        }
        assert_eq!(&buf[2..4], &[8.0, 9.0]);
    }

    #[test]
    #[should_panic(expected = "overlapping")]
    fn test_split_blocks_overlap_panics() {
        let mut buf = vec![0.0f32; 8];
        let _ = split_blocks(&mut buf, 2..6, 4..8);
    }
}
