use crate::cli::Args;
use crate::error::{FloodRiskError, Result};
use crate::table::RowErrorPolicy;
use crate::zonal::NodataPolicy;
use std::path::PathBuf;

/// Validated settings for one run.
#[derive(Debug, Clone)]
pub struct Config {
    pub input_csv: PathBuf,
    pub output_csv: PathBuf,
    pub source_srid: u32,
    pub target_srid: u32,
    pub lat_col: String,
    pub lng_col: String,
    pub buffer_dist: f64,
    pub flood_risk_names: Vec<String>,
    pub flood_risk_files: Vec<PathBuf>,
    pub row_errors: RowErrorPolicy,
    pub nodata: NodataPolicy,
    pub quad_segs: usize,
    pub batch_size: usize,
}

impl Config {
    pub fn from_args(args: &Args) -> Result<Self> {
        let config = Self {
            input_csv: PathBuf::from(&args.input_csv),
            output_csv: PathBuf::from(&args.output_csv),
            source_srid: args.source_srid,
            target_srid: args.target_srid,
            lat_col: args.lat_col.clone(),
            lng_col: args.lng_col.clone(),
            buffer_dist: args.buffer_dist as f64,
            flood_risk_names: args.flood_risk_names.clone(),
            flood_risk_files: args.flood_risk_files.iter().map(PathBuf::from).collect(),
            row_errors: args.on_row_error,
            nodata: if args.exclude_nodata {
                NodataPolicy::Exclude
            } else {
                NodataPolicy::Include
            },
            quad_segs: args.quad_segs,
            batch_size: args.batch_size,
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks that hold for any run, however the config was built.
    pub fn validate(&self) -> Result<()> {
        if self.flood_risk_names.len() != self.flood_risk_files.len() {
            return Err(FloodRiskError::ArgumentMismatch {
                names: self.flood_risk_names.len(),
                files: self.flood_risk_files.len(),
            });
        }
        if !self.buffer_dist.is_finite() || self.buffer_dist < 0.0 {
            return Err(FloodRiskError::InvalidBufferDistance(self.buffer_dist));
        }
        if self.quad_segs == 0 {
            return Err(FloodRiskError::InvalidSetting {
                name: "quad_segs",
                value: self.quad_segs.to_string(),
            });
        }
        if self.batch_size == 0 {
            return Err(FloodRiskError::InvalidSetting {
                name: "batch_size",
                value: self.batch_size.to_string(),
            });
        }
        Ok(())
    }
}
