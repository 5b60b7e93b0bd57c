//! Wayland implementations.
//!
//! This module binds the compositor globals through the
//! [`CapabilityBinder`](crate::capability::CapabilityBinder), implements the
//! [`Presenter`](crate::traits::Presenter) and
//! [`BufferBackend`](crate::traits::BufferBackend) traits on top of
//! layer-shell, virtual-pointer and `wl_shm`, and runs the event loop.
//!
//! Nothing outside this module should reference Wayland directly.

mod dispatch;
pub mod overlay;
pub mod session;
pub mod shm;

pub use session::{run, Session, SessionError};
