//! **gridpoint**, keyboard-driven pointer targeting for Wayland.
//!
//! gridpoint covers one output with a grid overlay.  Each keystroke cuts
//! the selected region in half (or pans it), the pointer follows the
//! centre of the selection, and a final keystroke clicks there.  The
//! process exits after the click or on cancel.
//!
//! # Architecture
//!
//! The navigation core knows nothing about Wayland.  It is organised
//! around two traits:
//!
//! * [`traits::Presenter`]: draws the overlay and synthesizes pointer
//!   events, so the [`navigator::Navigator`] can be driven by a recorder in
//!   tests.
//! * [`traits::BufferBackend`]: creates the server side of pooled pixel
//!   buffers, so the [`pool::BufferPool`] reuse policy is testable on
//!   anonymous memory.
//!
//! [`keys`] maps a keysym plus active modifiers to a list of commands.
//! [`capability`] matches registry globals against a sorted descriptor
//! table.  The concrete table, every event handler and the real presenter
//! live in [`wayland`].

pub mod capability;
pub mod command;
pub mod config;
pub mod keys;
pub mod navigator;
pub mod pool;
pub mod render;
pub mod selection;
pub mod traits;
pub mod wayland;
