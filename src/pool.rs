//! Shared-memory buffer pools.
//!
//! A [`BufferPool`] owns one memfd-backed mapping. [`Buffer`]s are cheap
//! descriptors carved out of it: they never hold a pointer into the mapping,
//! only an offset plus the pool generation they were carved from. Pixel
//! access goes back through the pool, which rejects descriptors from an
//! older mapping with [`Error::StaleBuffer`].

use std::fs::File;
use std::os::fd::{AsFd, BorrowedFd};
use std::sync::atomic::{AtomicU32, Ordering};

use memmap2::MmapMut;
use rustix::fs::{memfd_create, MemfdFlags};

use crate::error::{Error, Result};
use crate::geometry::Size;

/// Identifies a pool for the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PoolId(u32);

impl PoolId {
    fn next() -> Self {
        static COUNTER: AtomicU32 = AtomicU32::new(1);
        PoolId(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u32 {
        self.0
    }
}

/// Pixel layouts understood by the shm path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PixelFormat {
    #[default]
    Argb8888,
    Xrgb8888,
}

impl PixelFormat {
    pub fn bytes_per_pixel(&self) -> u32 {
        match self {
            PixelFormat::Argb8888 | PixelFormat::Xrgb8888 => 4,
        }
    }

    /// Tightly packed stride for `width` pixels, `None` if it overflows.
    pub fn min_stride(&self, width: u32) -> Option<u32> {
        width.checked_mul(self.bytes_per_pixel())
    }
}

/// A pixel buffer carved from a [`BufferPool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Buffer {
    pool: PoolId,
    generation: u32,
    offset: usize,
    width: u32,
    height: u32,
    stride: u32,
    format: PixelFormat,
}

impl Buffer {
    pub fn pool(&self) -> PoolId {
        self.pool
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn stride(&self) -> u32 {
        self.stride
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Bytes covered by the buffer (`stride * height`).
    pub fn len(&self) -> usize {
        self.stride as usize * self.height as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A region of anonymous shared memory sliced into pixel buffers.
pub struct BufferPool {
    id: PoolId,
    file: Option<File>,
    mmap: Option<MmapMut>,
    generation: u32,
}

impl BufferPool {
    /// Create an empty pool. Call [`allocate`](Self::allocate) before carving.
    pub fn new() -> Self {
        Self {
            id: PoolId::next(),
            file: None,
            mmap: None,
            generation: 0,
        }
    }

    /// Create a pool and map `size` bytes right away.
    pub fn with_size(size: usize) -> Result<Self> {
        let mut pool = Self::new();
        pool.allocate(size)?;
        Ok(pool)
    }

    pub fn id(&self) -> PoolId {
        self.id
    }

    /// Bumped every time the mapping is replaced.
    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn size(&self) -> usize {
        self.mmap.as_ref().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_mapped(&self) -> bool {
        self.mmap.is_some()
    }

    /// The memfd backing the pool, for sharing with the compositor.
    pub fn fd(&self) -> Option<BorrowedFd<'_>> {
        self.file.as_ref().map(|f| f.as_fd())
    }

    /// Map `size` bytes, replacing any previous mapping.
    ///
    /// The previous mapping is dropped before the new one is made, and every
    /// buffer carved before this call becomes stale. The memfd is kept so the
    /// compositor side can resize its pool instead of recreating it.
    pub fn allocate(&mut self, size: usize) -> Result<()> {
        if size == 0 {
            return Err(Error::Allocation {
                size,
                source: std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "pool size must be non-zero",
                ),
            });
        }

        self.mmap = None;
        let alloc_err = |source| Error::Allocation { size, source };

        let file = match self.file.take() {
            Some(file) => file,
            None => File::from(
                memfd_create("strata-pool", MemfdFlags::CLOEXEC)
                    .map_err(|e| alloc_err(e.into()))?,
            ),
        };
        let file = self.file.insert(file);
        file.set_len(size as u64).map_err(alloc_err)?;

        // SAFETY: the memfd is private to this pool and the compositor only
        // reads from it, so no other writer can truncate it under the map.
        let mmap = unsafe { MmapMut::map_mut(&*file) }.map_err(alloc_err)?;

        self.generation = self.generation.wrapping_add(1);
        self.mmap = Some(mmap);
        log::debug!(
            "Pool {} mapped {} bytes (generation {})",
            self.id.0,
            size,
            self.generation
        );
        Ok(())
    }

    /// Grow the mapping to at least `min_size` bytes. Returns whether it was
    /// reallocated, in which case previously carved buffers are stale.
    pub fn reserve(&mut self, min_size: usize) -> Result<bool> {
        if self.is_mapped() && self.size() >= min_size {
            return Ok(false);
        }
        self.allocate(min_size)?;
        Ok(true)
    }

    /// Carve a buffer description out of the pool.
    ///
    /// `offset + stride * height` may equal the pool size exactly.
    pub fn carve(
        &self,
        width: u32,
        height: u32,
        stride: u32,
        format: PixelFormat,
        offset: usize,
    ) -> Result<Buffer> {
        let min = format
            .min_stride(width)
            .ok_or(Error::TooLarge { width, height })?;
        if stride < min {
            return Err(Error::InvalidStride { stride, min });
        }

        let len = (stride as usize)
            .checked_mul(height as usize)
            .ok_or(Error::TooLarge { width, height })?;
        let pool_size = self.size();
        match offset.checked_add(len) {
            Some(end) if end <= pool_size => {}
            _ => {
                return Err(Error::OutOfBounds {
                    offset,
                    len,
                    pool_size,
                })
            }
        }

        Ok(Buffer {
            pool: self.id,
            generation: self.generation,
            offset,
            width,
            height,
            stride,
            format,
        })
    }

    fn check(&self, buffer: &Buffer) -> Result<()> {
        if buffer.pool != self.id || buffer.generation != self.generation || !self.is_mapped() {
            return Err(Error::StaleBuffer);
        }
        Ok(())
    }

    /// Pixel bytes of `buffer`, exactly `stride * height` long.
    pub fn data(&self, buffer: &Buffer) -> Result<&[u8]> {
        self.check(buffer)?;
        let mmap = self.mmap.as_ref().ok_or(Error::StaleBuffer)?;
        Ok(&mmap[buffer.offset..buffer.offset + buffer.len()])
    }

    /// Mutable pixel bytes of `buffer`, exactly `stride * height` long.
    pub fn data_mut(&mut self, buffer: &Buffer) -> Result<&mut [u8]> {
        self.check(buffer)?;
        let mmap = self.mmap.as_mut().ok_or(Error::StaleBuffer)?;
        Ok(&mut mmap[buffer.offset..buffer.offset + buffer.len()])
    }

    /// Whether `buffer` still refers to this pool's current mapping.
    pub fn is_current(&self, buffer: &Buffer) -> bool {
        self.check(buffer).is_ok()
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferPool")
            .field("id", &self.id)
            .field("size", &self.size())
            .field("generation", &self.generation)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_carve_reports_size() {
        let pool = BufferPool::with_size(64 * 4 * 32).unwrap();
        let buffer = pool.carve(64, 32, 256, PixelFormat::Argb8888, 0).unwrap();
        assert_eq!(buffer.size(), Size::new(64, 32));
        assert_eq!(buffer.len(), 256 * 32);
    }

    #[test]
    fn test_carve_exact_fit_is_accepted() {
        let pool = BufferPool::with_size(4 * 4 * 4 + 16).unwrap();
        assert!(pool.carve(4, 4, 16, PixelFormat::Argb8888, 16).is_ok());
    }

    #[test]
    fn test_carve_one_past_end_is_rejected() {
        let pool = BufferPool::with_size(4 * 4 * 4 + 16).unwrap();
        let err = pool.carve(4, 4, 16, PixelFormat::Argb8888, 17).unwrap_err();
        assert!(matches!(
            err,
            Error::OutOfBounds {
                offset: 17,
                len: 64,
                pool_size: 80
            }
        ));
    }

    #[test]
    fn test_carve_rejects_short_stride() {
        let pool = BufferPool::with_size(1024).unwrap();
        let err = pool.carve(10, 2, 20, PixelFormat::Xrgb8888, 0).unwrap_err();
        assert!(matches!(err, Error::InvalidStride { stride: 20, min: 40 }));
    }

    #[test]
    fn test_carve_rejects_overflowing_width() {
        let pool = BufferPool::with_size(1024).unwrap();
        assert_eq!(PixelFormat::Argb8888.min_stride(0x4000_0000), None);
        assert!(matches!(
            pool.carve(0x4000_0000, 1, u32::MAX, PixelFormat::Argb8888, 0),
            Err(Error::TooLarge {
                width: 0x4000_0000,
                height: 1
            })
        ));
    }

    #[test]
    fn test_carve_on_unmapped_pool_fails() {
        let pool = BufferPool::new();
        assert!(matches!(
            pool.carve(1, 1, 4, PixelFormat::Argb8888, 0),
            Err(Error::OutOfBounds { .. })
        ));
    }

    #[test]
    fn test_zero_sized_allocation_fails() {
        let mut pool = BufferPool::new();
        assert!(matches!(pool.allocate(0), Err(Error::Allocation { .. })));
        assert!(!pool.is_mapped());
    }

    #[test]
    fn test_data_slice_is_bounded_to_buffer() {
        let mut pool = BufferPool::with_size(4096).unwrap();
        let buffer = pool.carve(8, 8, 32, PixelFormat::Argb8888, 1024).unwrap();
        let data = pool.data_mut(&buffer).unwrap();
        assert_eq!(data.len(), 32 * 8);
        data.fill(0xAB);

        let whole = pool.carve(1024, 1, 4096, PixelFormat::Argb8888, 0).unwrap();
        let all = pool.data(&whole).unwrap();
        assert!(all[..1024].iter().all(|&b| b == 0));
        assert!(all[1024..1024 + 256].iter().all(|&b| b == 0xAB));
        assert!(all[1024 + 256..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_regrow_invalidates_buffers() {
        let mut pool = BufferPool::with_size(800 * 4 * 600).unwrap();
        let old = pool.carve(800, 600, 800 * 4, PixelFormat::Argb8888, 0).unwrap();

        assert!(pool.carve(1920, 1080, 1920 * 4, PixelFormat::Argb8888, 0).is_err());
        assert!(pool.reserve(1920 * 4 * 1080).unwrap());
        assert_eq!(pool.size(), 1920 * 4 * 1080);

        assert!(matches!(pool.data_mut(&old), Err(Error::StaleBuffer)));
        let new = pool.carve(1920, 1080, 1920 * 4, PixelFormat::Argb8888, 0).unwrap();
        assert_eq!(pool.data_mut(&new).unwrap().len(), 1920 * 4 * 1080);
    }

    #[test]
    fn test_reserve_within_capacity_keeps_mapping() {
        let mut pool = BufferPool::with_size(1000).unwrap();
        let buffer = pool.carve(10, 10, 40, PixelFormat::Argb8888, 0).unwrap();
        assert!(!pool.reserve(400).unwrap());
        assert!(pool.is_current(&buffer));
    }

    #[test]
    fn test_buffer_from_other_pool_is_stale() {
        let a = BufferPool::with_size(64).unwrap();
        let b = BufferPool::with_size(64).unwrap();
        let buffer = a.carve(4, 4, 16, PixelFormat::Argb8888, 0).unwrap();
        assert!(matches!(b.data(&buffer), Err(Error::StaleBuffer)));
    }
}
