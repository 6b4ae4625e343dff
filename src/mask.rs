//! Buffer discs and their rasterization onto the raster grid.
//!
//! A cell is covered when its center falls strictly inside the polygon,
//! which is GDAL's default burn rule. Only the part of the grid under the
//! polygon's bounding box is visited; the covered set is the same as
//! rasterizing over the whole grid.

use crate::raster::Grid;
use geo::{BoundingRect, Contains, Coord, LineString, Point, Polygon};
use ndarray::Array2;
use std::f64::consts::PI;

/// OGR's default number of segments per quarter circle.
pub const DEFAULT_QUAD_SEGS: usize = 30;

/// Polygon approximating a circle of `radius` around `center`.
pub fn buffer_disc(center: Point<f64>, radius: f64, quad_segs: usize) -> Polygon<f64> {
    let n = 4 * quad_segs.max(1);
    let r = radius.abs();

    let mut coords = Vec::with_capacity(n + 1);
    for i in 0..n {
        let angle = 2.0 * PI * i as f64 / n as f64;
        coords.push((center.x() + r * angle.cos(), center.y() + r * angle.sin()));
    }
    coords.push(coords[0]);

    Polygon::new(LineString::from(coords), vec![])
}

/// Covered cells of a grid, stored as a window over the polygon extent.
#[derive(Debug, Clone)]
pub struct ZoneMask {
    row_off: usize,
    col_off: usize,
    cells: Array2<bool>,
}

impl ZoneMask {
    fn empty() -> Self {
        Self {
            row_off: 0,
            col_off: 0,
            cells: Array2::from_elem((0, 0), false),
        }
    }

    pub fn count(&self) -> usize {
        self.cells.iter().filter(|&&covered| covered).count()
    }

    pub fn is_empty(&self) -> bool {
        !self.cells.iter().any(|&covered| covered)
    }

    /// (row, col) grid indices of covered cells, in row-major order.
    pub fn selected(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.cells
            .indexed_iter()
            .filter(|(_, covered)| **covered)
            .map(move |((r, c), _)| (r + self.row_off, c + self.col_off))
    }
}

/// Half-open index range of cells whose centers may lie between pixel
/// coordinates `min` and `max`, clipped to `0..limit`.
fn pixel_span(min: f64, max: f64, limit: usize) -> Option<(usize, usize)> {
    if !min.is_finite() || !max.is_finite() {
        return None;
    }
    let lo = (min.floor() - 1.0).max(0.0);
    let hi = (max.ceil() + 1.0).min(limit as f64);
    if lo >= hi {
        return None;
    }
    Some((lo as usize, hi as usize))
}

/// Burn `polygon` onto `grid`.
pub fn rasterize(polygon: &Polygon<f64>, grid: &Grid) -> ZoneMask {
    let Some(bounds) = polygon.bounding_rect() else {
        return ZoneMask::empty();
    };

    // All four corners, since a rotated grid does not keep the box axis-aligned
    let (min, max) = (bounds.min(), bounds.max());
    let corners = [
        grid.to_pixel(min.x, min.y),
        grid.to_pixel(min.x, max.y),
        grid.to_pixel(max.x, min.y),
        grid.to_pixel(max.x, max.y),
    ];
    let (mut col_min, mut col_max) = (f64::INFINITY, f64::NEG_INFINITY);
    let (mut row_min, mut row_max) = (f64::INFINITY, f64::NEG_INFINITY);
    for (col, row) in corners {
        col_min = col_min.min(col);
        col_max = col_max.max(col);
        row_min = row_min.min(row);
        row_max = row_max.max(row);
    }

    let (Some((row_start, row_end)), Some((col_start, col_end))) = (
        pixel_span(row_min, row_max, grid.height),
        pixel_span(col_min, col_max, grid.width),
    ) else {
        return ZoneMask::empty();
    };

    let cells = Array2::from_shape_fn(
        (row_end - row_start, col_end - col_start),
        |(r, c)| {
            let (x, y) = grid.cell_center(r + row_start, c + col_start);
            polygon.contains(&Coord { x, y })
        },
    );

    ZoneMask {
        row_off: row_start,
        col_off: col_start,
        cells,
    }
}
