//! Reusable shared-memory pixel buffers.
//!
//! The compositor reads a buffer asynchronously after it is attached and
//! tells us when it is done with a release event.  [`BufferPool`] keeps
//! every buffer it has created together with an in-use flag driven by
//! those events, so a new frame is always drawn into a buffer the server
//! is not reading.
//!
//! # Reclamation policy
//!
//! Buffers are never destroyed when they are released, only when a later
//! [`acquire`](BufferPool::acquire) finds them free **and** of the wrong
//! size.  At release time the pool cannot know which size the next frame
//! will need, so stale buffers are reclaimed lazily during the scan.

use crate::traits::{BufferBackend, BufferSpec};
use log::{debug, trace};
use memmap2::MmapMut;

/// Bytes per pixel of the fixed 32-bit ARGB format.
pub const BYTES_PER_PIXEL: u32 = 4;

/// Errors from [`BufferPool::acquire`].
#[derive(Debug, thiserror::Error)]
pub enum PoolError<E> {
    /// `width × height` ARGB pixels do not fit in addressable memory.
    #[error("{width}x{height} buffer does not fit in memory")]
    TooLarge { width: u32, height: u32 },

    #[error(transparent)]
    Backend(E),
}

/// Identifies a buffer across the release round-trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId(pub u64);

/// One pooled buffer.
pub struct Buffer<H> {
    id: BufferId,
    width: u32,
    height: u32,
    size: usize,
    in_use: bool,
    pixels: MmapMut,
    handle: H,
}

impl<H> Buffer<H> {
    pub fn id(&self) -> BufferId {
        self.id
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Size of the pixel storage in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn in_use(&self) -> bool {
        self.in_use
    }

    /// The server-side handle to attach.
    pub fn handle(&self) -> &H {
        &self.handle
    }

    /// Writable pixel storage.
    pub fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.pixels[..]
    }

    /// Pixel storage and handle at once, for drawing and then attaching.
    pub fn split_mut(&mut self) -> (&mut [u8], &H) {
        (&mut self.pixels[..], &self.handle)
    }
}

/// A pool of buffers backed by `B`.
pub struct BufferPool<B: BufferBackend> {
    backend: B,
    buffers: Vec<Buffer<B::Handle>>,
    next_id: u64,
}

impl<B: BufferBackend> BufferPool<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            buffers: Vec::new(),
            next_id: 0,
        }
    }

    /// Hand out a free buffer of exactly `width × height` pixels, marking
    /// it in use.
    ///
    /// Free buffers of another size met during the scan are destroyed.
    /// If nothing can be reused, a new buffer is created through the
    /// backend.
    ///
    /// Sizes whose byte count overflows fail with
    /// [`PoolError::TooLarge`] before the backend is asked.
    pub fn acquire(
        &mut self,
        width: u32,
        height: u32,
    ) -> Result<&mut Buffer<B::Handle>, PoolError<B::Error>> {
        let mut index = 0;
        let mut found = None;
        while index < self.buffers.len() {
            let buffer = &self.buffers[index];
            if buffer.in_use {
                index += 1;
                continue;
            }
            if buffer.width != width || buffer.height != height {
                let stale = self.buffers.remove(index);
                debug!(
                    "destroying stale {}x{} buffer {:?}",
                    stale.width, stale.height, stale.id
                );
                let Buffer { pixels, handle, .. } = stale;
                drop(pixels);
                self.backend.destroy(handle);
                continue;
            }
            found = Some(index);
            break;
        }

        let index = match found {
            Some(index) => {
                trace!("reusing buffer {:?}", self.buffers[index].id);
                index
            }
            None => {
                let buffer = self.create(width, height)?;
                self.buffers.push(buffer);
                self.buffers.len() - 1
            }
        };

        let buffer = &mut self.buffers[index];
        buffer.in_use = true;
        Ok(buffer)
    }

    /// The server no longer reads buffer `id`.
    ///
    /// Only clears the in-use flag; see the module docs for why nothing is
    /// destroyed here.
    pub fn release(&mut self, id: BufferId) {
        match self.buffers.iter_mut().find(|b| b.id == id) {
            Some(buffer) => {
                trace!("buffer {:?} released", id);
                buffer.in_use = false;
            }
            None => debug!("release for unknown buffer {:?}", id),
        }
    }

    /// Number of buffers currently held, in use or not.
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// Iterate over the held buffers.
    pub fn iter(&self) -> impl Iterator<Item = &Buffer<B::Handle>> {
        self.buffers.iter()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn create(&mut self, width: u32, height: u32) -> Result<Buffer<B::Handle>, PoolError<B::Error>> {
        let spec = argb_spec(width, height).ok_or(PoolError::TooLarge { width, height })?;
        let id = BufferId(self.next_id);
        self.next_id += 1;

        let (handle, pixels) = self.backend.create(id, spec).map_err(PoolError::Backend)?;
        debug!("created {}x{} buffer {:?} ({} bytes)", width, height, id, spec.size);

        Ok(Buffer {
            id,
            width,
            height,
            size: spec.size,
            in_use: true,
            pixels,
            handle,
        })
    }
}

/// Stride and byte size of a `width × height` ARGB buffer, if they fit.
fn argb_spec(width: u32, height: u32) -> Option<BufferSpec> {
    let stride = width.checked_mul(BYTES_PER_PIXEL)?;
    let size = usize::try_from(stride)
        .ok()?
        .checked_mul(usize::try_from(height).ok()?)?;
    Some(BufferSpec {
        width,
        height,
        stride,
        size,
    })
}

impl<B: BufferBackend> Drop for BufferPool<B> {
    fn drop(&mut self) {
        for Buffer { pixels, handle, .. } in self.buffers.drain(..) {
            drop(pixels);
            self.backend.destroy(handle);
        }
    }
}
