//! The normalized selection rectangle.
//!
//! A [`Selection`] is the region the user is currently narrowing down,
//! expressed as fractions of the active output: `(0, 0, 1, 1)` is the whole
//! output.  Cuts shrink it, moves pan it, and its centre is where the
//! pointer goes.
//!
//! Every transform keeps the rectangle inside the unit square:
//! `0 <= x`, `0 <= y`, `x + width <= 1`, `y + height <= 1`.

use crate::command::{Axis, Direction};

/// Size of an output or surface in logical pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Extent {
    pub width: u32,
    pub height: u32,
}

impl Extent {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Whether either dimension is zero.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Multiply both dimensions by an integer scale factor.
    pub fn scaled(self, factor: u32) -> Self {
        Self {
            width: self.width.saturating_mul(factor),
            height: self.height.saturating_mul(factor),
        }
    }
}

/// A rectangle in normalized output coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Selection {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Default for Selection {
    fn default() -> Self {
        Self::FULL
    }
}

impl Selection {
    /// The whole output.
    pub const FULL: Selection = Selection {
        x: 0.0,
        y: 0.0,
        width: 1.0,
        height: 1.0,
    };

    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Keep `keep` of the extent along `direction`'s axis.
    ///
    /// `Left`/`Up` keep the near part, `Right`/`Down` keep the far part and
    /// shift the origin so the kept region stays anchored at the far edge.
    pub fn cut(mut self, direction: Direction, keep: f64) -> Self {
        let (origin, extent) = self.axis_mut(direction.axis());
        if direction.is_far() {
            *origin += *extent * (1.0 - keep);
        }
        *extent *= keep;
        self.clamped()
    }

    /// Pan by `fraction` of the extent along `direction`'s axis without
    /// resizing.
    ///
    /// Panning stops at the output edge: the origin is clamped so the
    /// rectangle never leaves the unit square.
    pub fn shift(mut self, direction: Direction, fraction: f64) -> Self {
        let (origin, extent) = self.axis_mut(direction.axis());
        let delta = *extent * fraction;
        if direction.is_far() {
            *origin += delta;
        } else {
            *origin -= delta;
        }
        self.clamped()
    }

    /// Centre of the selection in absolute coordinates of `extent`.
    ///
    /// Computed as `extent * origin + extent * size / 2` per axis and
    /// truncated to whole pixels.
    pub fn center_in(&self, extent: Extent) -> (u32, u32) {
        let w = extent.width as f64;
        let h = extent.height as f64;
        let x = w * self.x + w * self.width / 2.0;
        let y = h * self.y + h * self.height / 2.0;
        (x as u32, y as u32)
    }

    /// Whether the rectangle lies inside the unit square (within `eps`).
    pub fn is_within_unit(&self, eps: f64) -> bool {
        self.x >= -eps
            && self.y >= -eps
            && self.width >= 0.0
            && self.height >= 0.0
            && self.x + self.width <= 1.0 + eps
            && self.y + self.height <= 1.0 + eps
    }

    fn axis_mut(&mut self, axis: Axis) -> (&mut f64, &mut f64) {
        match axis {
            Axis::Horizontal => (&mut self.x, &mut self.width),
            Axis::Vertical => (&mut self.y, &mut self.height),
        }
    }

    /// Clamp sizes to `[0, 1]` and origins to `[0, 1 - size]`.
    fn clamped(mut self) -> Self {
        self.width = self.width.clamp(0.0, 1.0);
        self.height = self.height.clamp(0.0, 1.0);
        self.x = self.x.clamp(0.0, 1.0 - self.width);
        self.y = self.y.clamp(0.0, 1.0 - self.height);
        self
    }
}
