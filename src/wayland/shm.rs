//! `wl_shm` buffers backed by anonymous memory files.

use super::session::Session;
use crate::pool::BufferId;
use crate::traits::{BufferBackend, BufferSpec};
use memmap2::MmapMut;
use std::os::fd::AsFd;
use wayland_client::protocol::{wl_buffer::WlBuffer, wl_shm, wl_shm::WlShm};
use wayland_client::QueueHandle;

/// The only pixel format the overlay draws in.
const FORMAT: wl_shm::Format = wl_shm::Format::Argb8888;

/// Errors from allocating shared memory for a buffer.
#[derive(Debug, thiserror::Error)]
pub enum ShmError {
    #[error("failed to create memfd: {0}")]
    Memfd(#[from] memfd::Error),

    #[error("failed to size or map shared memory: {0}")]
    Io(#[from] std::io::Error),

    #[error("{width}x{height} buffer is too large for wl_shm")]
    TooLarge { width: u32, height: u32 },
}

/// Creates `wl_buffer`s whose release events carry their [`BufferId`].
pub struct ShmBackend {
    shm: WlShm,
    qh: QueueHandle<Session>,
}

impl ShmBackend {
    pub fn new(shm: WlShm, qh: QueueHandle<Session>) -> Self {
        Self { shm, qh }
    }
}

impl BufferBackend for ShmBackend {
    type Handle = WlBuffer;
    type Error = ShmError;

    fn create(&mut self, id: BufferId, spec: BufferSpec) -> Result<(WlBuffer, MmapMut), ShmError> {
        let too_large = || ShmError::TooLarge {
            width: spec.width,
            height: spec.height,
        };
        let size = i32::try_from(spec.size).map_err(|_| too_large())?;
        let width = i32::try_from(spec.width).map_err(|_| too_large())?;
        let height = i32::try_from(spec.height).map_err(|_| too_large())?;
        let stride = i32::try_from(spec.stride).map_err(|_| too_large())?;

        let memfd = memfd::MemfdOptions::new()
            .close_on_exec(true)
            .create("gridpoint-buffer")?;
        let file = memfd.as_file();
        file.set_len(spec.size as u64)?;
        // SAFETY: the file is private to this process and the server only
        // reads it; nothing truncates it while the mapping is alive.
        let pixels = unsafe { MmapMut::map_mut(file)? };

        let pool = self.shm.create_pool(file.as_fd(), size, &self.qh, ());
        let buffer = pool.create_buffer(0, width, height, stride, FORMAT, &self.qh, id);
        pool.destroy();

        Ok((buffer, pixels))
    }

    fn destroy(&mut self, handle: WlBuffer) {
        handle.destroy();
    }
}
