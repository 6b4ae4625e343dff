use crate::crs::Projection;
use crate::error::{FloodRiskError, Result};
use crate::raster::RasterSet;
use crate::zonal::ZonalAverager;
use csv::{StringRecord, Writer};
use log::{debug, warn};
use rayon::prelude::*;
use std::io::{Read, Write};

/// What to do when a single row cannot be evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum RowErrorPolicy {
    /// Stop the whole run at the first bad row.
    #[default]
    Abort,
    /// Warn, drop the row and carry on.
    Skip,
}

/// Header positions of the coordinate columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinateColumns {
    pub lng_idx: usize,
    pub lat_idx: usize,
}

#[derive(Debug, Clone)]
struct ColumnNames {
    lng: String,
    lat: String,
}

impl CoordinateColumns {
    pub fn locate(header: &StringRecord, lat_col: &str, lng_col: &str) -> Result<Self> {
        let find = |name: &str| {
            header
                .iter()
                .position(|field| field == name)
                .ok_or_else(|| FloodRiskError::ColumnNotFound {
                    column: name.to_string(),
                    available: header.iter().collect::<Vec<_>>().join(", "),
                })
        };
        Ok(Self {
            lng_idx: find(lng_col)?,
            lat_idx: find(lat_col)?,
        })
    }
}

/// Input header followed by the appended result columns.
pub fn output_header(header: &StringRecord, extra_col_names: &[String]) -> StringRecord {
    let mut out = header.clone();
    for name in extra_col_names {
        out.push_field(name);
    }
    out
}

/// `5.0`, `0.125`, `nan`.
///
/// Finite values use Rust's shortest round-trip form. Very large or small
/// magnitudes switch to exponent notation without a sign or zero padding
/// on the exponent (`1e16`, `1e-7`), unlike the `1e+16`/`1e-07` style some
/// other tools write. Both parse back to the same `f64`.
pub fn format_value(value: f64) -> String {
    if value.is_nan() {
        "nan".to_string()
    } else {
        format!("{:?}", value)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessSummary {
    pub rows_read: u64,
    pub rows_written: u64,
    pub rows_skipped: u64,
}

/// Streams CSV rows through the buffer pipeline and appends one average per layer.
pub struct TableProcessor<'a, F> {
    rasters: &'a RasterSet,
    averager: ZonalAverager,
    projection_factory: F,
    columns: CoordinateColumns,
    names: ColumnNames,
    policy: RowErrorPolicy,
    batch_size: usize,
}

impl<'a, F, P> TableProcessor<'a, F>
where
    F: Fn() -> Result<P> + Sync + Send,
    P: Projection,
{
    pub fn new(
        rasters: &'a RasterSet,
        averager: ZonalAverager,
        projection_factory: F,
        header: &StringRecord,
        lat_col: &str,
        lng_col: &str,
    ) -> Result<Self> {
        let columns = CoordinateColumns::locate(header, lat_col, lng_col)?;
        Ok(Self {
            rasters,
            averager,
            projection_factory,
            columns,
            names: ColumnNames {
                lng: lng_col.to_string(),
                lat: lat_col.to_string(),
            },
            policy: RowErrorPolicy::Abort,
            batch_size: 1024,
        })
    }

    pub fn with_policy(mut self, policy: RowErrorPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    fn parse_field(&self, record: &StringRecord, idx: usize, name: &str, line: u64) -> Result<f64> {
        let raw = record.get(idx).unwrap_or("");
        raw.trim()
            .parse::<f64>()
            .map_err(|_| FloodRiskError::InvalidCoordinate {
                line,
                column: name.to_string(),
                value: raw.to_string(),
            })
    }

    /// Averages for one data row.
    pub fn evaluate(&self, projection: &P, record: &StringRecord, line: u64) -> Result<Vec<f64>> {
        let lng = self.parse_field(record, self.columns.lng_idx, &self.names.lng, line)?;
        let lat = self.parse_field(record, self.columns.lat_idx, &self.names.lat, line)?;
        let (x, y) = projection.to_buffer_space(lng, lat)?;
        self.averager.compute(projection, x, y, self.rasters)
    }

    /// One chunk per worker thread, each with its own projection. Failing
    /// to build a projection fails the whole batch.
    fn evaluate_batch(&self, batch: &[(u64, StringRecord)]) -> Result<Vec<Result<Vec<f64>>>> {
        let chunk_len = batch.len().div_ceil(rayon::current_num_threads()).max(1);
        let chunks: Vec<Vec<Result<Vec<f64>>>> = batch
            .par_chunks(chunk_len)
            .map(|chunk| {
                let projection = (self.projection_factory)()?;
                Ok(chunk
                    .iter()
                    .map(|(line, record)| self.evaluate(&projection, record, *line))
                    .collect())
            })
            .collect::<Result<_>>()?;
        Ok(chunks.into_iter().flatten().collect())
    }

    fn flush_batch<W: Write>(
        &self,
        batch: &[(u64, StringRecord)],
        writer: &mut Writer<W>,
        summary: &mut ProcessSummary,
    ) -> Result<()> {
        let results = self.evaluate_batch(batch)?;
        for ((line, record), result) in batch.iter().zip(results) {
            match result {
                Ok(values) => {
                    let mut out = record.clone();
                    for value in values {
                        out.push_field(&format_value(value));
                    }
                    writer.write_record(&out)?;
                    summary.rows_written += 1;
                }
                Err(e) if e.is_row_error() && self.policy == RowErrorPolicy::Skip => {
                    warn!("Skipping line {}: {}", line, e);
                    summary.rows_skipped += 1;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Process every data row left in `reader`, in order. The header must
    /// already have been consumed and written.
    pub fn process<R: Read, W: Write>(
        &self,
        reader: &mut csv::Reader<R>,
        writer: &mut Writer<W>,
    ) -> Result<ProcessSummary> {
        let mut summary = ProcessSummary::default();
        let mut batch = Vec::with_capacity(self.batch_size);

        for record in reader.records() {
            let record = record?;
            let line = record.position().map(|p| p.line()).unwrap_or(0);
            summary.rows_read += 1;
            batch.push((line, record));

            if batch.len() == self.batch_size {
                self.flush_batch(&batch, writer, &mut summary)?;
                debug!("Processed {} rows", summary.rows_read);
                batch.clear();
            }
        }
        if !batch.is_empty() {
            self.flush_batch(&batch, writer, &mut summary)?;
        }

        writer.flush()?;
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crs::testing::Planar;
    use crate::mask::DEFAULT_QUAD_SEGS;
    use crate::raster::{Grid, RasterLayer};
    use crate::zonal::NodataPolicy;
    use csv::ReaderBuilder;
    use geo::Polygon;
    use ndarray::Array2;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Planar, except that points west of x = 0 cannot be transformed.
    struct EastOnly;

    impl Projection for EastOnly {
        fn to_buffer_space(&self, lon: f64, lat: f64) -> Result<(f64, f64)> {
            if lon < 0.0 {
                return Err(FloodRiskError::PointTransform(format!(
                    "point ({}, {}) is outside the projection's area of use",
                    lon, lat
                )));
            }
            Ok((lon, lat))
        }

        fn to_raster_space(&self, polygon: &Polygon<f64>) -> Result<Polygon<f64>> {
            Ok(polygon.clone())
        }
    }

    fn rasters() -> RasterSet {
        let grid = Grid::new(10, 10, [0.0, 100.0, 0.0, 1000.0, 0.0, -100.0]).unwrap();
        let layers = vec![
            RasterLayer::new(Array2::from_elem((10, 10), 5.0), None),
            RasterLayer::new(Array2::from_shape_fn((10, 10), |(r, _)| r as f64), None),
        ];
        RasterSet::new(grid, String::new(), layers).unwrap()
    }

    fn run(input: &str, policy: RowErrorPolicy, batch_size: usize) -> Result<(String, ProcessSummary)> {
        run_with(input, policy, batch_size, || Ok(Planar))
    }

    fn run_with<F, P>(
        input: &str,
        policy: RowErrorPolicy,
        batch_size: usize,
        factory: F,
    ) -> Result<(String, ProcessSummary)>
    where
        F: Fn() -> Result<P> + Sync + Send,
        P: Projection,
    {
        let rasters = rasters();
        let mut reader = ReaderBuilder::new().flexible(true).from_reader(input.as_bytes());
        let header = reader.headers()?.clone();
        let processor = TableProcessor::new(
            &rasters,
            ZonalAverager::new(150.0, DEFAULT_QUAD_SEGS, NodataPolicy::Include),
            factory,
            &header,
            "lat",
            "lon",
        )?
        .with_policy(policy)
        .with_batch_size(batch_size);

        let mut writer = csv::WriterBuilder::new().flexible(true).from_writer(Vec::new());
        let names = vec!["avg_a".to_string(), "avg_b".to_string()];
        writer.write_record(&output_header(&header, &names))?;
        let summary = processor.process(&mut reader, &mut writer)?;
        let bytes = writer.into_inner().map_err(|e| e.into_error())?;
        Ok((String::from_utf8(bytes).unwrap(), summary))
    }

    #[test]
    fn test_locate_columns() {
        let header = StringRecord::from(vec!["id", "lat", "lon"]);
        let cols = CoordinateColumns::locate(&header, "lat", "lon").unwrap();
        assert_eq!(cols, CoordinateColumns { lng_idx: 2, lat_idx: 1 });
    }

    #[test]
    fn test_missing_column() {
        let header = StringRecord::from(vec!["id", "latitude", "lon"]);
        let err = CoordinateColumns::locate(&header, "lat", "lon").unwrap_err();
        match err {
            FloodRiskError::ColumnNotFound { column, available } => {
                assert_eq!(column, "lat");
                assert_eq!(available, "id, latitude, lon");
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_column_match_is_exact() {
        let header = StringRecord::from(vec!["Lat", "lon "]);
        assert!(CoordinateColumns::locate(&header, "lat", "lon").is_err());
    }

    #[test]
    fn test_output_header_appends_names() {
        let header = StringRecord::from(vec!["id", "lon", "lat"]);
        let names = vec!["avg_1m".to_string(), "avg_2m".to_string()];
        let out = output_header(&header, &names);
        assert_eq!(out, StringRecord::from(vec!["id", "lon", "lat", "avg_1m", "avg_2m"]));
    }

    #[test]
    fn test_format_value() {
        assert_eq!(format_value(5.0), "5.0");
        assert_eq!(format_value(0.125), "0.125");
        assert_eq!(format_value(-9999.0), "-9999.0");
        assert_eq!(format_value(f64::NAN), "nan");
    }

    #[test]
    fn test_format_value_extremes() {
        assert_eq!(format_value(1e16), "1e16");
        assert_eq!(format_value(1e-7), "1e-7");
        assert_eq!(format_value(1e16).parse::<f64>().unwrap(), 1e16);
    }

    #[test]
    fn test_rows_appended_in_order() {
        let input = "id,lon,lat\na,500,500\nb,500,300\n\"c, quoted\",500,800\n";
        let (output, summary) = run(input, RowErrorPolicy::Abort, 1024).unwrap();
        assert_eq!(
            output,
            "id,lon,lat,avg_a,avg_b\n\
             a,500,500,5.0,4.5\n\
             b,500,300,5.0,6.5\n\
             \"c, quoted\",500,800,5.0,1.5\n"
        );
        assert_eq!(
            summary,
            ProcessSummary { rows_read: 3, rows_written: 3, rows_skipped: 0 }
        );
    }

    #[test]
    fn test_small_batches_keep_order() {
        let input: String = std::iter::once("id,lon,lat\n".to_string())
            .chain((0..25).map(|i| format!("{},{},500\n", i, 150 + i * 30)))
            .collect();
        let (single, _) = run(&input, RowErrorPolicy::Abort, 1).unwrap();
        let (batched, _) = run(&input, RowErrorPolicy::Abort, 7).unwrap();
        assert_eq!(single, batched);

        let ids: Vec<String> = single
            .lines()
            .skip(1)
            .map(|l| l.split(',').next().unwrap().to_string())
            .collect();
        let expected: Vec<String> = (0..25).map(|i| i.to_string()).collect();
        assert_eq!(ids, expected);
    }

    #[test]
    fn test_bad_coordinate_aborts_by_default() {
        let input = "id,lon,lat\na,500,500\nb,east,500\n";
        let err = run(input, RowErrorPolicy::Abort, 1024).unwrap_err();
        match err {
            FloodRiskError::InvalidCoordinate { line, column, value } => {
                assert_eq!(line, 3);
                assert_eq!(column, "lon");
                assert_eq!(value, "east");
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_skip_policy_drops_bad_rows() {
        let input = "id,lon,lat\na,500,500\nb,east,500\nc,-9000,500\nd, 500 ,500\n";
        let (output, summary) = run(input, RowErrorPolicy::Skip, 2).unwrap();
        assert_eq!(
            output,
            "id,lon,lat,avg_a,avg_b\n\
             a,500,500,5.0,4.5\n\
             d, 500 ,500,5.0,4.5\n"
        );
        assert_eq!(
            summary,
            ProcessSummary { rows_read: 4, rows_written: 2, rows_skipped: 2 }
        );
    }

    #[test]
    fn test_short_row_is_invalid_coordinate() {
        let input = "id,lon,lat\na,500\n";
        let err = run(input, RowErrorPolicy::Abort, 1024).unwrap_err();
        assert!(matches!(err, FloodRiskError::InvalidCoordinate { .. }));
    }

    #[test]
    fn test_projection_failure_is_fatal_even_when_skipping() {
        let rasters = rasters();
        let mut reader = ReaderBuilder::new().from_reader("lon,lat\n1,2\n".as_bytes());
        let header = reader.headers().unwrap().clone();
        let processor = TableProcessor::new(
            &rasters,
            ZonalAverager::new(150.0, DEFAULT_QUAD_SEGS, NodataPolicy::Include),
            || -> Result<Planar> { Err(FloodRiskError::Projection("no transform".to_string())) },
            &header,
            "lat",
            "lon",
        )
        .unwrap()
        .with_policy(RowErrorPolicy::Skip);

        let mut writer = csv::Writer::from_writer(Vec::new());
        let err = processor.process(&mut reader, &mut writer).unwrap_err();
        assert!(matches!(err, FloodRiskError::Projection(_)));
    }

    #[test]
    fn test_point_transform_failure_skips_row() {
        let input = "id,lon,lat\na,500,500\nwest,-1,500\nc,500,300\n";
        let (output, summary) = run_with(input, RowErrorPolicy::Skip, 1024, || Ok(EastOnly)).unwrap();
        assert_eq!(
            output,
            "id,lon,lat,avg_a,avg_b\n\
             a,500,500,5.0,4.5\n\
             c,500,300,5.0,6.5\n"
        );
        assert_eq!(
            summary,
            ProcessSummary { rows_read: 3, rows_written: 2, rows_skipped: 1 }
        );
    }

    #[test]
    fn test_point_transform_failure_aborts_by_default() {
        let input = "id,lon,lat\na,500,500\nwest,-1,500\n";
        let err = run_with(input, RowErrorPolicy::Abort, 1024, || Ok(EastOnly)).unwrap_err();
        assert!(matches!(err, FloodRiskError::PointTransform(_)));
    }

    #[test]
    fn test_projection_built_once_per_worker() {
        let calls = AtomicUsize::new(0);
        let input: String = std::iter::once("id,lon,lat\n".to_string())
            .chain((0..64).map(|i| format!("{},{},500\n", i, 150 + i * 10)))
            .collect();
        let (output, _) = run_with(&input, RowErrorPolicy::Abort, 1024, || {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(Planar)
        })
        .unwrap();

        let built = calls.load(Ordering::SeqCst);
        assert!(built >= 1);
        assert!(built <= rayon::current_num_threads());
        assert_eq!(output.lines().count(), 65);
    }
}
