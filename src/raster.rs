use crate::error::{FloodRiskError, Result};
use gdal::raster::RasterBand;
use gdal::Dataset;
use log::{debug, info, warn};
use ndarray::Array2;
use std::path::Path;

/// Pixel frame shared by every loaded layer, taken from the first raster.
///
/// The geotransform follows GDAL's layout:
/// `x = gt[0] + col * gt[1] + row * gt[2]` and
/// `y = gt[3] + col * gt[4] + row * gt[5]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    pub width: usize,
    pub height: usize,
    pub geotransform: [f64; 6],
}

impl Grid {
    pub fn new(width: usize, height: usize, geotransform: [f64; 6]) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(FloodRiskError::RasterLoad {
                path: "<grid>".to_string(),
                reason: format!("invalid dimensions {}x{}", width, height),
            });
        }
        let [_, a, b, _, d, e] = geotransform;
        let det = a * e - b * d;
        if !det.is_finite() || det == 0.0 {
            return Err(FloodRiskError::RasterLoad {
                path: "<grid>".to_string(),
                reason: format!("geotransform {:?} cannot be inverted", geotransform),
            });
        }
        Ok(Self {
            width,
            height,
            geotransform,
        })
    }

    pub fn cell_width(&self) -> f64 {
        self.geotransform[1]
    }

    /// Negative for north-up rasters.
    pub fn cell_height(&self) -> f64 {
        self.geotransform[5]
    }

    pub fn is_rotated(&self) -> bool {
        self.geotransform[2] != 0.0 || self.geotransform[4] != 0.0
    }

    /// Georeferenced center of cell (row, col).
    pub fn cell_center(&self, row: usize, col: usize) -> (f64, f64) {
        let gt = &self.geotransform;
        let col = col as f64 + 0.5;
        let row = row as f64 + 0.5;
        (
            gt[0] + col * gt[1] + row * gt[2],
            gt[3] + col * gt[4] + row * gt[5],
        )
    }

    /// Fractional (col, row) position of a georeferenced coordinate.
    pub fn to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        let gt = &self.geotransform;
        let dx = x - gt[0];
        let dy = y - gt[3];
        let det = gt[1] * gt[5] - gt[2] * gt[4];
        (
            (gt[5] * dx - gt[2] * dy) / det,
            (gt[1] * dy - gt[4] * dx) / det,
        )
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.height, self.width)
    }
}

/// Band 1 of one flood risk raster.
#[derive(Debug, Clone)]
pub struct RasterLayer {
    pub data: Array2<f64>,
    pub nodata: Option<f64>,
}

impl RasterLayer {
    pub fn new(data: Array2<f64>, nodata: Option<f64>) -> Self {
        Self { data, nodata }
    }

    pub fn is_nodata(&self, value: f64) -> bool {
        if value.is_nan() {
            return true;
        }
        matches!(self.nodata, Some(nd) if value == nd)
    }
}

/// Aligned flood risk layers plus the grid and projection of the first one.
#[derive(Debug, Clone)]
pub struct RasterSet {
    grid: Grid,
    spatial_reference: String,
    layers: Vec<RasterLayer>,
}

impl RasterSet {
    /// Build a set from in-memory layers. Every layer must match the grid shape.
    pub fn new(grid: Grid, spatial_reference: String, layers: Vec<RasterLayer>) -> Result<Self> {
        for (i, layer) in layers.iter().enumerate() {
            if layer.data.dim() != grid.shape() {
                let (rows, cols) = layer.data.dim();
                return Err(FloodRiskError::RasterLoad {
                    path: format!("<layer {}>", i),
                    reason: format!(
                        "shape {}x{} does not match grid {}x{}",
                        cols, rows, grid.width, grid.height
                    ),
                });
            }
        }
        Ok(Self {
            grid,
            spatial_reference,
            layers,
        })
    }

    /// Load band 1 of every path. The first file defines grid and projection.
    pub fn load<P: AsRef<Path>>(paths: &[P]) -> Result<Self> {
        let first = paths.first().ok_or_else(|| FloodRiskError::RasterLoad {
            path: "<none>".to_string(),
            reason: "no flood risk files given".to_string(),
        })?;
        let first_path = first.as_ref().display().to_string();

        info!("Opening reference raster: {}", first_path);
        let dataset = open_dataset(&first_path)?;
        let geotransform = dataset
            .geo_transform()
            .map_err(|e| raster_error(&first_path, e))?;
        let spatial_reference = dataset.projection();
        let (data, nodata) = read_band(&dataset, &first_path)?;
        let (height, width) = data.dim();
        let grid = Grid::new(width, height, geotransform)?;

        info!("Raster size: {}x{}", grid.width, grid.height);
        if grid.is_rotated() {
            info!("Geotransform has rotation terms: {:?}", grid.geotransform);
        }
        info!(
            "Cell size: {:.6} x {:.6}",
            grid.cell_width(),
            grid.cell_height()
        );

        let mut layers = Vec::with_capacity(paths.len());
        layers.push(RasterLayer::new(data, nodata));

        for path in &paths[1..] {
            let path = path.as_ref().display().to_string();
            let dataset = open_dataset(&path)?;
            if let Ok(gt) = dataset.geo_transform() {
                if gt != grid.geotransform {
                    warn!(
                        "{} has a different geotransform than {}, using it as if aligned",
                        path, first_path
                    );
                }
            }
            let (data, nodata) = read_band(&dataset, &path)?;
            if data.dim() != grid.shape() {
                let (rows, cols) = data.dim();
                return Err(FloodRiskError::RasterLoad {
                    path,
                    reason: format!(
                        "size {}x{} does not match {} ({}x{})",
                        cols, rows, first_path, grid.width, grid.height
                    ),
                });
            }
            layers.push(RasterLayer::new(data, nodata));
        }

        info!("Loaded {} flood risk layer(s)", layers.len());
        Self::new(grid, spatial_reference, layers)
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    /// Native projection of the rasters as WKT.
    pub fn spatial_reference(&self) -> &str {
        &self.spatial_reference
    }

    pub fn layers(&self) -> &[RasterLayer] {
        &self.layers
    }
}

fn raster_error(path: &str, err: impl std::fmt::Display) -> FloodRiskError {
    FloodRiskError::RasterLoad {
        path: path.to_string(),
        reason: err.to_string(),
    }
}

fn open_dataset(path: &str) -> Result<Dataset> {
    Dataset::open(path).map_err(|e| raster_error(path, e))
}

/// Read band 1 as f64 along with its nodata value
fn read_band(dataset: &Dataset, path: &str) -> Result<(Array2<f64>, Option<f64>)> {
    let rasterband: RasterBand = dataset.rasterband(1).map_err(|e| raster_error(path, e))?;

    let width = rasterband.x_size() as usize;
    let height = rasterband.y_size() as usize;
    if width == 0 || height == 0 {
        return Err(raster_error(
            path,
            format!("invalid dimensions {}x{}", width, height),
        ));
    }

    let nodata = rasterband.no_data_value();
    debug!(
        "Reading {} ({}x{}, nodata={:?})",
        path, width, height, nodata
    );

    let buffer = rasterband
        .read_as::<f64>((0, 0), (width, height), (width, height), None)
        .map_err(|e| raster_error(path, e))?;
    let data_vec: Vec<f64> = buffer.into_iter().collect();
    let data = Array2::from_shape_vec((height, width), data_vec)?;

    Ok((data, nodata))
}
