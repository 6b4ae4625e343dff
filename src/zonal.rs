//! Zonal averages of flood risk layers under a point buffer.

use crate::crs::Projection;
use crate::error::{FloodRiskError, Result};
use crate::mask::{buffer_disc, rasterize, ZoneMask};
use crate::raster::{RasterLayer, RasterSet};
use geo::Point;
use log::debug;

/// How a layer's own nodata sentinel is treated when averaging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NodataPolicy {
    /// Average every selected cell, sentinel values included.
    #[default]
    Include,
    /// Leave out sentinel and NaN cells. A zone holding only nodata averages to NaN.
    Exclude,
}

#[derive(Debug, Clone)]
pub struct ZonalAverager {
    buffer_dist: f64,
    quad_segs: usize,
    nodata: NodataPolicy,
}

impl ZonalAverager {
    pub fn new(buffer_dist: f64, quad_segs: usize, nodata: NodataPolicy) -> Self {
        Self {
            buffer_dist,
            quad_segs,
            nodata,
        }
    }

    /// Mask covered by the buffer around (x, y), given in buffer space.
    pub fn zone<P: Projection>(
        &self,
        projection: &P,
        x: f64,
        y: f64,
        rasters: &RasterSet,
    ) -> Result<ZoneMask> {
        let disc = buffer_disc(Point::new(x, y), self.buffer_dist, self.quad_segs);
        let zone = projection.to_raster_space(&disc)?;
        Ok(rasterize(&zone, rasters.grid()))
    }

    /// Per-layer means under the buffer, in layer order.
    pub fn compute<P: Projection>(
        &self,
        projection: &P,
        x: f64,
        y: f64,
        rasters: &RasterSet,
    ) -> Result<Vec<f64>> {
        let mask = self.zone(projection, x, y, rasters)?;
        if mask.is_empty() {
            return Err(FloodRiskError::EmptySelection {
                x,
                y,
                buffer_dist: self.buffer_dist,
            });
        }
        debug!("Buffer at ({:.3}, {:.3}) selects {} cells", x, y, mask.count());

        Ok(rasters
            .layers()
            .iter()
            .map(|layer| self.layer_mean(layer, &mask))
            .collect())
    }

    fn layer_mean(&self, layer: &RasterLayer, mask: &ZoneMask) -> f64 {
        let mut sum = 0.0;
        let mut count = 0usize;

        for (row, col) in mask.selected() {
            let value = layer.data[[row, col]];
            if self.nodata == NodataPolicy::Exclude && layer.is_nodata(value) {
                continue;
            }
            sum += value;
            count += 1;
        }

        if count == 0 {
            f64::NAN
        } else {
            sum / count as f64
        }
    }
}
