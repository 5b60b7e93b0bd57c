//! Core traits that decouple gridpoint from the display server.
//!
//! The [`Navigator`](crate::navigator::Navigator) and the
//! [`BufferPool`](crate::pool::BufferPool) only depend on these
//! abstractions.  The Wayland backend in [`crate::wayland`] implements them
//! for real; the unit tests implement them with recording doubles.

use crate::command::{Button, Direction};
use crate::config::GridConfig;
use crate::pool::BufferId;
use crate::selection::{Extent, Selection};
use memmap2::MmapMut;

/// Everything the navigator drives after a state change: the overlay
/// drawing and the synthetic pointer.
///
/// An implementation might paint into a layer surface and talk to a
/// virtual-pointer device, or it might just record the calls.
pub trait Presenter {
    /// The error type produced when a frame cannot be drawn.
    type Error: std::error::Error + Send + 'static;

    /// Size of the active output in logical pixels, i.e. the coordinate
    /// space of [`move_pointer`](Presenter::move_pointer).
    fn output_extent(&self) -> Extent;

    /// Redraw the whole overlay for `selection`.
    ///
    /// There is no partial redraw: every call paints and commits a full
    /// frame.
    fn render(&mut self, selection: &Selection, grid: &GridConfig) -> Result<(), Self::Error>;

    /// Warp the pointer to `(x, y)` inside `extent`.
    fn move_pointer(&mut self, x: u32, y: u32, extent: Extent);

    /// Hold `button` down at the current pointer position.
    fn press(&mut self, button: Button);

    fn release(&mut self, button: Button);

    /// Scroll one wheel step towards `direction`.
    fn scroll(&mut self, direction: Direction);

    /// Press and release `button` at the current pointer position.
    fn click(&mut self, button: Button) {
        self.press(button);
        self.release(button);
    }
}

/// Geometry of a buffer requested from a [`BufferBackend`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferSpec {
    pub width: u32,
    pub height: u32,
    /// Bytes per row.
    pub stride: u32,
    /// Total bytes, `stride * height`.
    pub size: usize,
}

/// Creates and destroys the server-side half of a pooled buffer.
///
/// # Contract
///
/// * [`create`](BufferBackend::create) returns a handle plus writable
///   storage of exactly `spec.size` bytes shared with the server.
/// * The backend must route the server's release notification for the
///   new buffer back to [`BufferPool::release`](crate::pool::BufferPool::release)
///   with the given `id`.
pub trait BufferBackend {
    /// Server-side buffer object.
    type Handle;
    /// The error type produced when storage cannot be created.
    type Error: std::error::Error + Send + 'static;

    fn create(&mut self, id: BufferId, spec: BufferSpec) -> Result<(Self::Handle, MmapMut), Self::Error>;

    /// Release the server-side object.  The storage has already been
    /// unmapped when this is called.
    fn destroy(&mut self, handle: Self::Handle);
}
