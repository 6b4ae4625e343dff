use crate::table::RowErrorPolicy;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "flood-risk")]
#[command(about = "Calculate average flood risk for buffered points")]
#[command(version)]
#[command(author = "Huimori Project")]
pub struct Args {
    /// Input CSV file with point locations
    #[arg(short = 'i', long = "input_csv", value_name = "FILE")]
    pub input_csv: String,

    /// Output CSV file to save results to
    #[arg(short = 'o', long = "output_csv", value_name = "FILE")]
    pub output_csv: String,

    /// EPSG code of input points
    #[arg(short = 's', long = "source_srid", default_value_t = 4326)]
    pub source_srid: u32,

    /// EPSG code of projection to use for buffer
    #[arg(short = 't', long = "target_srid", default_value_t = 3106)]
    pub target_srid: u32,

    /// Latitude column in the input CSV
    #[arg(short = 'y', long = "lat_col", default_value = "lat")]
    pub lat_col: String,

    /// Longitude column in the input CSV
    #[arg(short = 'x', long = "lng_col", default_value = "lon")]
    pub lng_col: String,

    /// Buffer distance, in units of the buffer projection
    #[arg(
        short = 'd',
        long = "buffer_dist",
        default_value_t = 1000,
        allow_negative_numbers = true
    )]
    pub buffer_dist: i64,

    /// Columns to append to the CSV header, one per flood risk file
    #[arg(
        short = 'n',
        long = "flood_risk_names",
        num_args = 1..,
        default_values = ["avg_1m", "avg_2m", "avg_3m"]
    )]
    pub flood_risk_names: Vec<String>,

    /// Flood risk rasters to process
    #[arg(required = true, value_name = "FLOOD_RISK_FILES")]
    pub flood_risk_files: Vec<String>,

    /// What to do with rows that have bad coordinates or an empty buffer
    #[arg(long = "on_row_error", value_enum, default_value_t = RowErrorPolicy::Abort)]
    pub on_row_error: RowErrorPolicy,

    /// Leave each layer's nodata cells out of the average
    #[arg(long = "exclude_nodata")]
    pub exclude_nodata: bool,

    /// Segments per quarter circle when approximating the buffer
    #[arg(long = "quad_segs", default_value_t = 30)]
    pub quad_segs: usize,

    /// Rows evaluated together before being written
    #[arg(long = "batch_size", default_value_t = 1024)]
    pub batch_size: usize,

    /// Number of threads (default: all available)
    #[arg(short = 'j', long, value_name = "N")]
    pub threads: Option<usize>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::parse_from(["flood-risk", "-i", "in.csv", "-o", "out.csv", "a.tif"]);
        assert_eq!(args.source_srid, 4326);
        assert_eq!(args.target_srid, 3106);
        assert_eq!(args.lat_col, "lat");
        assert_eq!(args.lng_col, "lon");
        assert_eq!(args.buffer_dist, 1000);
        assert_eq!(args.flood_risk_names, vec!["avg_1m", "avg_2m", "avg_3m"]);
        assert_eq!(args.flood_risk_files, vec!["a.tif"]);
        assert_eq!(args.on_row_error, RowErrorPolicy::Abort);
        assert!(!args.exclude_nodata);
    }

    #[test]
    fn test_long_names() {
        let args = Args::parse_from([
            "flood-risk",
            "--input_csv",
            "in.csv",
            "--output_csv",
            "out.csv",
            "--buffer_dist",
            "250",
            "--on_row_error",
            "skip",
            "a.tif",
            "b.tif",
            "--flood_risk_names",
            "one",
            "two",
        ]);
        assert_eq!(args.buffer_dist, 250);
        assert_eq!(args.on_row_error, RowErrorPolicy::Skip);
        assert_eq!(args.flood_risk_files, vec!["a.tif", "b.tif"]);
        assert_eq!(args.flood_risk_names, vec!["one", "two"]);
    }

    #[test]
    fn test_files_required() {
        assert!(Args::try_parse_from(["flood-risk", "-i", "in.csv", "-o", "out.csv"]).is_err());
    }
}
