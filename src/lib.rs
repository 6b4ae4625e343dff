// Library exports for testing and reuse

pub mod cli;
pub mod config;
pub mod crs;
pub mod error;
pub mod mask;
pub mod pipeline;
pub mod raster;
pub mod table;
pub mod zonal;

// Re-export commonly used types
pub use config::Config;
pub use crs::{CoordinateTransformer, Projection};
pub use error::{FloodRiskError, Result};
pub use raster::{Grid, RasterLayer, RasterSet};
pub use table::{ProcessSummary, RowErrorPolicy, TableProcessor};
pub use zonal::{NodataPolicy, ZonalAverager};
