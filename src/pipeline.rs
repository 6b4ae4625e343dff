use crate::config::Config;
use crate::crs::CoordinateTransformer;
use crate::error::{FloodRiskError, Result};
use crate::raster::RasterSet;
use crate::table::{output_header, CoordinateColumns, ProcessSummary, TableProcessor};
use crate::zonal::ZonalAverager;
use csv::{ReaderBuilder, WriterBuilder};
use log::info;
use std::fs::File;
use std::path::Path;
use tempfile::NamedTempFile;

/// Run the whole CSV -> buffered averages -> CSV job described by `config`.
///
/// Nothing is written to `config.output_csv` unless every row succeeds (or
/// is skipped under the skip policy); results go to a temporary file next
/// to the output and are renamed into place at the end.
pub fn run(config: &Config) -> Result<ProcessSummary> {
    config.validate()?;

    info!("Reading input table: {}", config.input_csv.display());
    let input = File::open(&config.input_csv).map_err(|source| FloodRiskError::Open {
        path: config.input_csv.display().to_string(),
        source,
    })?;
    let mut reader = ReaderBuilder::new().flexible(true).from_reader(input);
    let header = reader.headers()?.clone();
    CoordinateColumns::locate(&header, &config.lat_col, &config.lng_col)?;

    let rasters = RasterSet::load(config.flood_risk_files.as_slice())?;

    // Fail on bad SRIDs or WKT before any row is read
    CoordinateTransformer::new(
        config.source_srid,
        config.target_srid,
        rasters.spatial_reference(),
    )?;
    info!(
        "Points in EPSG:{}, buffered by {} in EPSG:{}",
        config.source_srid, config.buffer_dist, config.target_srid
    );

    let averager = ZonalAverager::new(config.buffer_dist, config.quad_segs, config.nodata);
    let raster_wkt = rasters.spatial_reference();
    let processor = TableProcessor::new(
        &rasters,
        averager,
        || CoordinateTransformer::new(config.source_srid, config.target_srid, raster_wkt),
        &header,
        &config.lat_col,
        &config.lng_col,
    )?
    .with_policy(config.row_errors)
    .with_batch_size(config.batch_size);

    let output_dir = match config.output_csv.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let staging = NamedTempFile::new_in(output_dir)?;
    let mut writer = WriterBuilder::new()
        .flexible(true)
        .from_writer(staging.as_file());
    writer.write_record(&output_header(&header, &config.flood_risk_names))?;

    let summary = processor.process(&mut reader, &mut writer)?;
    drop(writer);

    staging.persist(&config.output_csv)?;
    info!(
        "Wrote {} rows to {} ({} skipped)",
        summary.rows_written,
        config.output_csv.display(),
        summary.rows_skipped
    );
    Ok(summary)
}
