use crate::error::{FloodRiskError, Result};
use gdal::spatial_ref::{AxisMappingStrategy, CoordTransform, SpatialRef};
use geo::{Coord, LineString, Polygon};
use log::debug;

/// Moves points into buffer space and buffer polygons into raster space.
///
/// Failures for a single point or polygon are reported as
/// `FloodRiskError::PointTransform` so they stay scoped to one row.
pub trait Projection {
    /// Source SRS (lon, lat) to the metric buffer SRS.
    fn to_buffer_space(&self, lon: f64, lat: f64) -> Result<(f64, f64)>;

    /// Buffer SRS polygon to the raster's native SRS, vertex by vertex.
    fn to_raster_space(&self, polygon: &Polygon<f64>) -> Result<Polygon<f64>>;
}

/// GDAL backed pair of transforms: source -> buffer -> raster.
pub struct CoordinateTransformer {
    buffer_transform: CoordTransform,
    raster_transform: CoordTransform,
}

impl CoordinateTransformer {
    pub fn new(source_srid: u32, buffer_srid: u32, raster_wkt: &str) -> Result<Self> {
        let source_sr = epsg_ref(source_srid)?;
        let buffer_sr = epsg_ref(buffer_srid)?;
        let mut raster_sr = SpatialRef::from_wkt(raster_wkt).map_err(|e| {
            FloodRiskError::Projection(format!("invalid raster projection WKT: {}", e))
        })?;
        raster_sr.set_axis_mapping_strategy(AxisMappingStrategy::TraditionalGisOrder);

        let buffer_transform = CoordTransform::new(&source_sr, &buffer_sr).map_err(|e| {
            FloodRiskError::Projection(format!(
                "cannot transform EPSG:{} to EPSG:{}: {}",
                source_srid, buffer_srid, e
            ))
        })?;
        let raster_transform = CoordTransform::new(&buffer_sr, &raster_sr).map_err(|e| {
            FloodRiskError::Projection(format!(
                "cannot transform EPSG:{} to raster projection: {}",
                buffer_srid, e
            ))
        })?;

        debug!(
            "Transforms ready: EPSG:{} -> EPSG:{} -> raster SRS",
            source_srid, buffer_srid
        );
        Ok(Self {
            buffer_transform,
            raster_transform,
        })
    }
}

fn epsg_ref(srid: u32) -> Result<SpatialRef> {
    let mut sr = SpatialRef::from_epsg(srid)
        .map_err(|e| FloodRiskError::Projection(format!("unsupported EPSG:{}: {}", srid, e)))?;
    // x = longitude, y = latitude regardless of the authority axis order
    sr.set_axis_mapping_strategy(AxisMappingStrategy::TraditionalGisOrder);
    Ok(sr)
}

fn transform_ring(transform: &CoordTransform, ring: &LineString<f64>) -> Result<LineString<f64>> {
    let mut xs: Vec<f64> = ring.coords().map(|c| c.x).collect();
    let mut ys: Vec<f64> = ring.coords().map(|c| c.y).collect();
    let mut zs = vec![0.0; xs.len()];

    transform
        .transform_coords(&mut xs, &mut ys, &mut zs)
        .map_err(|e| FloodRiskError::PointTransform(format!("buffer polygon: {}", e)))?;

    Ok(xs
        .into_iter()
        .zip(ys)
        .map(|(x, y)| Coord { x, y })
        .collect())
}

impl Projection for CoordinateTransformer {
    fn to_buffer_space(&self, lon: f64, lat: f64) -> Result<(f64, f64)> {
        let mut xs = [lon];
        let mut ys = [lat];
        let mut zs = [0.0];
        self.buffer_transform
            .transform_coords(&mut xs, &mut ys, &mut zs)
            .map_err(|e| {
                FloodRiskError::PointTransform(format!("point ({}, {}): {}", lon, lat, e))
            })?;
        Ok((xs[0], ys[0]))
    }

    fn to_raster_space(&self, polygon: &Polygon<f64>) -> Result<Polygon<f64>> {
        let exterior = transform_ring(&self.raster_transform, polygon.exterior())?;
        let interiors = polygon
            .interiors()
            .iter()
            .map(|ring| transform_ring(&self.raster_transform, ring))
            .collect::<Result<Vec<_>>>()?;
        Ok(Polygon::new(exterior, interiors))
    }
}
