//! The on-screen overlay and the synthetic pointer.
//!
//! [`Overlay`] is the real [`Presenter`]: it draws into a full-output
//! layer surface through a [`BufferPool`] and drives a wlr virtual pointer
//! bound to the same output.

use super::session::{Output, OutputId, Session};
use super::shm::{ShmBackend, ShmError};
use crate::command::{Axis, Button, Direction};
use crate::config::GridConfig;
use crate::pool::{BufferPool, PoolError};
use crate::render::{self, RenderError};
use crate::selection::{Extent, Selection};
use crate::traits::Presenter;
use log::{debug, trace};
use std::time::Instant;
use wayland_client::protocol::{
    wl_compositor::WlCompositor, wl_pointer, wl_shm::WlShm, wl_surface::WlSurface,
};
use wayland_client::{Proxy, QueueHandle};
use wayland_protocols_wlr::layer_shell::v1::client::{
    zwlr_layer_shell_v1::{Layer, ZwlrLayerShellV1},
    zwlr_layer_surface_v1::{Anchor, KeyboardInteractivity, ZwlrLayerSurfaceV1},
};
use wayland_protocols_wlr::virtual_pointer::v1::client::{
    zwlr_virtual_pointer_manager_v1::ZwlrVirtualPointerManagerV1,
    zwlr_virtual_pointer_v1::ZwlrVirtualPointerV1,
};

const NAMESPACE: &str = "gridpoint";

/// Scroll distance of one wheel detent, as libinput reports it.
const SCROLL_STEP: f64 = 15.0;

/// Errors from drawing a frame.
#[derive(Debug, thiserror::Error)]
pub enum OverlayError {
    #[error(transparent)]
    Buffer(#[from] PoolError<ShmError>),
    #[error(transparent)]
    Paint(#[from] RenderError),
}

pub struct Overlay {
    output: OutputId,
    surface: WlSurface,
    layer_surface: ZwlrLayerSurfaceV1,
    pointer: ZwlrVirtualPointerV1,
    pool: BufferPool<ShmBackend>,
    /// Surface size in logical pixels, `0 × 0` until configured.
    size: Extent,
    scale: u32,
    logical_size: Option<Extent>,
    epoch: Instant,
}

impl Overlay {
    /// Create the surface, its layer role and the virtual pointer.
    ///
    /// The surface covers the whole output above everything else, takes
    /// exclusive keyboard focus and lets pointer input pass through.
    pub(super) fn open(
        id: OutputId,
        output: &Output,
        compositor: &WlCompositor,
        shm: &WlShm,
        layer_shell: &ZwlrLayerShellV1,
        pointer_manager: &ZwlrVirtualPointerManagerV1,
        qh: &QueueHandle<Session>,
    ) -> Self {
        let surface = compositor.create_surface(qh, ());

        let region = compositor.create_region(qh, ());
        surface.set_input_region(Some(&region));
        region.destroy();

        let layer_surface = layer_shell.get_layer_surface(
            &surface,
            Some(&output.wl_output),
            Layer::Overlay,
            NAMESPACE.to_string(),
            qh,
            (),
        );
        layer_surface.set_anchor(Anchor::Top | Anchor::Bottom | Anchor::Left | Anchor::Right);
        layer_surface.set_exclusive_zone(-1);
        layer_surface.set_keyboard_interactivity(KeyboardInteractivity::Exclusive);
        surface.commit();

        let pointer = if pointer_manager.version() >= 2 {
            pointer_manager.create_virtual_pointer_with_output(
                None,
                Some(&output.wl_output),
                qh,
                (),
            )
        } else {
            debug!("virtual pointer manager v1, pointer is not tied to the output");
            pointer_manager.create_virtual_pointer(None, qh, ())
        };

        Self {
            output: id,
            surface,
            layer_surface,
            pointer,
            pool: BufferPool::new(ShmBackend::new(shm.clone(), qh.clone())),
            size: Extent::default(),
            scale: output.scale,
            logical_size: output.logical_size,
            epoch: Instant::now(),
        }
    }

    pub fn output(&self) -> OutputId {
        self.output
    }

    pub fn pool_mut(&mut self) -> &mut BufferPool<ShmBackend> {
        &mut self.pool
    }

    /// The compositor assigned a new surface size.
    pub fn resize(&mut self, size: Extent) {
        debug!("overlay configured to {}x{}", size.width, size.height);
        self.size = size;
    }

    pub fn set_scale(&mut self, scale: u32) {
        self.scale = scale.max(1);
    }

    pub fn set_logical_size(&mut self, size: Extent) {
        self.logical_size = Some(size);
    }

    fn now(&self) -> u32 {
        self.epoch.elapsed().as_millis() as u32
    }
}

impl Drop for Overlay {
    fn drop(&mut self) {
        self.pointer.destroy();
        self.layer_surface.destroy();
        self.surface.destroy();
    }
}

impl Presenter for Overlay {
    type Error = OverlayError;

    /// The output's logical size, or the surface size while it is unknown.
    fn output_extent(&self) -> Extent {
        self.logical_size
            .filter(|size| !size.is_empty())
            .unwrap_or(self.size)
    }

    fn render(&mut self, selection: &Selection, grid: &GridConfig) -> Result<(), OverlayError> {
        if self.size.is_empty() {
            debug!("skipping frame, surface not configured yet");
            return Ok(());
        }
        let scale = self.scale.max(1);
        let extent = self.size.scaled(scale);

        let buffer = self.pool.acquire(extent.width, extent.height)?;
        let id = buffer.id();
        let (pixels, wl_buffer) = buffer.split_mut();
        if let Err(err) = render::paint_grid(pixels, extent, selection, grid, scale) {
            self.pool.release(id);
            return Err(err.into());
        }

        trace!("presenting buffer {:?} at scale {}", id, scale);
        self.surface.set_buffer_scale(scale as i32);
        self.surface.attach(Some(wl_buffer), 0, 0);
        self.surface
            .damage_buffer(0, 0, extent.width as i32, extent.height as i32);
        self.surface.commit();
        Ok(())
    }

    fn move_pointer(&mut self, x: u32, y: u32, extent: Extent) {
        trace!("pointer to ({}, {}) in {}x{}", x, y, extent.width, extent.height);
        self.pointer
            .motion_absolute(self.now(), x, y, extent.width, extent.height);
        self.pointer.frame();
    }

    fn press(&mut self, button: Button) {
        self.pointer
            .button(self.now(), button.code(), wl_pointer::ButtonState::Pressed);
        self.pointer.frame();
    }

    fn release(&mut self, button: Button) {
        self.pointer
            .button(self.now(), button.code(), wl_pointer::ButtonState::Released);
        self.pointer.frame();
    }

    /// One wheel detent towards `direction`.
    fn scroll(&mut self, direction: Direction) {
        let axis = match direction.axis() {
            Axis::Horizontal => wl_pointer::Axis::HorizontalScroll,
            Axis::Vertical => wl_pointer::Axis::VerticalScroll,
        };
        let discrete = if direction.is_far() { 1 } else { -1 };
        let time = self.now();
        self.pointer.axis_source(wl_pointer::AxisSource::Wheel);
        self.pointer
            .axis_discrete(time, axis, SCROLL_STEP * f64::from(discrete), discrete);
        self.pointer.frame();
    }
}
