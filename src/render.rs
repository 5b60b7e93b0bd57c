//! Painting the grid overlay into a pixel buffer.
//!
//! The overlay is a set of nested outlines: for each of the `N × N` cells
//! of the selection a thin outer outline in the `outline` colour and,
//! inset by the output scale, a scale-wide inner outline in the `inner`
//! colour.  Everything outside the outlines is fully transparent.
//!
//! Outlines are drawn as four filled rectangles each.  Cell geometry is
//! computed in whole buffer pixels so that neighbouring cells share exact
//! edges at every scale.

use crate::config::{Color, GridConfig};
use crate::selection::{Extent, Selection};
use tiny_skia::{Paint, PixmapMut, Rect, Transform};

/// The pixel storage cannot be viewed as an image of the requested size.
#[derive(Debug, thiserror::Error)]
#[error("buffer of {len} bytes cannot hold a {width}x{height} image")]
pub struct RenderError {
    pub len: usize,
    pub width: u32,
    pub height: u32,
}

/// Pixel rectangle of one grid cell, in buffer coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellRect {
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
}

/// Cells of an `n × n` grid laid over `selection`, in buffer pixels of a
/// `extent`-sized buffer.  Column-major, like the drawing order.
pub fn cells(extent: Extent, selection: &Selection, n: u32) -> impl Iterator<Item = CellRect> {
    let n = n.max(1);
    let width = extent.width as f64;
    let height = extent.height as f64;
    let cell_w = ((extent.width / n) as f64 * selection.width) as i64;
    let cell_h = ((extent.height / n) as f64 * selection.height) as i64;
    let origin_x = (width * selection.x) as i64;
    let origin_y = (height * selection.y) as i64;

    (0..n as i64).flat_map(move |col| {
        (0..n as i64).map(move |row| CellRect {
            x: origin_x + col * cell_w,
            y: origin_y + row * cell_h,
            width: cell_w,
            height: cell_h,
        })
    })
}

/// Clear `pixels` and paint the grid for `selection`.
///
/// `extent` is the buffer size in pixels, i.e. the surface size already
/// multiplied by `scale`.  `pixels` must hold exactly `extent` pixels of
/// 32-bit ARGB (little-endian, premultiplied).
pub fn paint_grid(
    pixels: &mut [u8],
    extent: Extent,
    selection: &Selection,
    grid: &GridConfig,
    scale: u32,
) -> Result<(), RenderError> {
    let len = pixels.len();
    let mut pixmap =
        PixmapMut::from_bytes(pixels, extent.width, extent.height).ok_or(RenderError {
            len,
            width: extent.width,
            height: extent.height,
        })?;
    pixmap.fill(tiny_skia::Color::TRANSPARENT);

    let outline = solid(grid.outline);
    let inner = solid(grid.inner);
    let inset = scale.max(1) as i64;

    for cell in cells(extent, selection, grid.size) {
        draw_outline(&mut pixmap, cell, 1, &outline);
        let inside = CellRect {
            x: cell.x + inset,
            y: cell.y + inset,
            width: cell.width - 2 * inset,
            height: cell.height - 2 * inset,
        };
        draw_outline(&mut pixmap, inside, inset, &inner);
    }
    Ok(())
}

/// A crisp solid-colour paint.
///
/// wl_shm's ARGB8888 is stored B, G, R, A in memory while tiny-skia writes
/// R, G, B, A, so red and blue trade places here.
fn solid(color: Color) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color_rgba8(color.blue, color.green, color.red, color.alpha);
    paint.anti_alias = false;
    paint
}

fn draw_outline(pixmap: &mut PixmapMut<'_>, cell: CellRect, stroke: i64, paint: &Paint<'_>) {
    let CellRect {
        x,
        y,
        width,
        height,
    } = cell;
    fill_box(pixmap, x, y, width, stroke, paint);
    fill_box(pixmap, x, y, stroke, height, paint);
    fill_box(pixmap, x, y + height - stroke, width, stroke, paint);
    fill_box(pixmap, x + width - stroke, y, stroke, height, paint);
}

fn fill_box(pixmap: &mut PixmapMut<'_>, x: i64, y: i64, width: i64, height: i64, paint: &Paint<'_>) {
    if width <= 0 || height <= 0 {
        return;
    }
    if let Some(rect) = Rect::from_xywh(x as f32, y as f32, width as f32, height as f32) {
        pixmap.fill_rect(rect, paint, Transform::identity(), None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BLACK: u32 = 0xff00_0000;
    const WHITE: u32 = 0xffff_ffff;

    /// Paint into a fresh buffer and return it as native ARGB words.
    fn paint(extent: Extent, selection: Selection, grid: GridConfig, scale: u32) -> Vec<u32> {
        let mut bytes = vec![0xaa; extent.width as usize * extent.height as usize * 4];
        paint_grid(&mut bytes, extent, &selection, &grid, scale).unwrap();
        bytes
            .chunks_exact(4)
            .map(|px| u32::from_le_bytes([px[0], px[1], px[2], px[3]]))
            .collect()
    }

    fn at(pixels: &[u32], extent: Extent, x: u32, y: u32) -> u32 {
        pixels[(y * extent.width + x) as usize]
    }

    #[test]
    fn cells_split_the_full_output() {
        let got: Vec<CellRect> = cells(Extent::new(100, 60), &Selection::FULL, 2).collect();
        assert_eq!(
            got,
            vec![
                CellRect { x: 0, y: 0, width: 50, height: 30 },
                CellRect { x: 0, y: 30, width: 50, height: 30 },
                CellRect { x: 50, y: 0, width: 50, height: 30 },
                CellRect { x: 50, y: 30, width: 50, height: 30 },
            ]
        );
    }

    #[test]
    fn cells_follow_the_selection() {
        let sel = Selection::new(0.5, 0.5, 0.5, 0.5);
        let got: Vec<CellRect> = cells(Extent::new(100, 100), &sel, 2).collect();
        assert_eq!(got[0], CellRect { x: 50, y: 50, width: 25, height: 25 });
        assert_eq!(got[3], CellRect { x: 75, y: 75, width: 25, height: 25 });
    }

    #[test]
    fn full_selection_draws_both_outlines() {
        let extent = Extent::new(20, 20);
        let px = paint(extent, Selection::FULL, GridConfig::default(), 1);
        // Outer outline on the edge, inner outline one pixel in.
        assert_eq!(at(&px, extent, 0, 0), BLACK);
        assert_eq!(at(&px, extent, 5, 0), BLACK);
        assert_eq!(at(&px, extent, 1, 1), WHITE);
        assert_eq!(at(&px, extent, 5, 1), WHITE);
        // Cell interior stays transparent.
        assert_eq!(at(&px, extent, 5, 5), 0);
        // Second column starts at x = 10.
        assert_eq!(at(&px, extent, 10, 5), BLACK);
        assert_eq!(at(&px, extent, 11, 5), WHITE);
    }

    #[test]
    fn previous_contents_are_cleared() {
        let extent = Extent::new(16, 16);
        let sel = Selection::new(0.0, 0.0, 0.5, 0.5);
        let px = paint(extent, sel, GridConfig::default(), 1);
        // Far corner is outside the selection and must not keep the 0xaa fill.
        assert_eq!(at(&px, extent, 15, 15), 0);
    }

    #[test]
    fn inner_outline_scales_with_output() {
        let extent = Extent::new(40, 40);
        let grid = GridConfig {
            size: 1,
            ..GridConfig::default()
        };
        let px = paint(extent, Selection::FULL, grid, 2);
        assert_eq!(at(&px, extent, 0, 20), BLACK);
        assert_eq!(at(&px, extent, 1, 20), 0);
        assert_eq!(at(&px, extent, 2, 20), WHITE);
        assert_eq!(at(&px, extent, 3, 20), WHITE);
        assert_eq!(at(&px, extent, 4, 20), 0);
    }

    #[test]
    fn colours_land_in_argb_order() {
        let extent = Extent::new(10, 10);
        let grid = GridConfig {
            size: 1,
            outline: Color::from_argb(0xffff_0000),
            inner: Color::from_argb(0xff00_00ff),
        };
        let px = paint(extent, Selection::FULL, grid, 1);
        assert_eq!(at(&px, extent, 0, 0), 0xffff_0000);
        assert_eq!(at(&px, extent, 1, 1), 0xff00_00ff);
    }

    #[test]
    fn degenerate_cells_are_skipped() {
        let extent = Extent::new(10, 10);
        let sel = Selection::new(0.5, 0.5, 0.0, 0.0);
        let px = paint(extent, sel, GridConfig::default(), 1);
        assert!(px.iter().all(|&p| p == 0));
    }

    #[test]
    fn wrong_buffer_size_is_an_error() {
        let mut bytes = vec![0u8; 10];
        let err = paint_grid(
            &mut bytes,
            Extent::new(4, 4),
            &Selection::FULL,
            &GridConfig::default(),
            1,
        )
        .unwrap_err();
        assert_eq!(err.len, 10);
    }
}
