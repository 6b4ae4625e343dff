use thiserror::Error;

#[derive(Error, Debug)]
pub enum FloodRiskError {
    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("Thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("Failed to write output file: {0}")]
    Persist(#[from] tempfile::PersistError),

    #[error("Cannot open {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot load raster {path}: {reason}")]
    RasterLoad { path: String, reason: String },

    #[error("Projection error: {0}")]
    Projection(String),

    #[error("Cannot transform coordinates: {0}")]
    PointTransform(String),

    #[error("Column '{column}' not found in header (available: {available})")]
    ColumnNotFound { column: String, available: String },

    #[error("Invalid coordinate on line {line}: column '{column}' has value '{value}'")]
    InvalidCoordinate {
        line: u64,
        column: String,
        value: String,
    },

    #[error("Buffer of {buffer_dist} around ({x:.3}, {y:.3}) selects no raster cells")]
    EmptySelection { x: f64, y: f64, buffer_dist: f64 },

    #[error("Got {names} flood risk names for {files} flood risk files")]
    ArgumentMismatch { names: usize, files: usize },

    #[error("Invalid buffer distance: {0} (must be finite and not negative)")]
    InvalidBufferDistance(f64),

    #[error("Invalid value for {name}: {value}")]
    InvalidSetting { name: &'static str, value: String },
}

impl FloodRiskError {
    /// Errors tied to a single input row; everything else is fatal.
    pub fn is_row_error(&self) -> bool {
        matches!(
            self,
            FloodRiskError::InvalidCoordinate { .. }
                | FloodRiskError::PointTransform(_)
                | FloodRiskError::EmptySelection { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, FloodRiskError>;
