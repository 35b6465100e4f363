use anyhow::{Context, Result};
use clap::Parser;
use cluster_common::{AggregateReport, ColorScale, DataFormat};
use env_logger::Builder;
use image::RgbImage;
use log::{info, warn, LevelFilter};
use palette::{LinSrgb, Mix, Srgb};
use rayon::prelude::*;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// Command-line arguments for the visualizer
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Aggregate report written by the cluster engine (.json, .bin or .msgpack)
    #[arg(short, long)]
    input: PathBuf,

    /// Output prefix; writes <prefix>.png and <prefix>w.png (size-weighted)
    #[arg(short, long, default_value = "csize")]
    output: String,

    /// Width in pixels of one frame column
    #[arg(long, default_value_t = 4)]
    cell_width: u32,

    /// Height in pixels of one cluster-size row
    #[arg(long, default_value_t = 8)]
    cell_height: u32,

    /// Number of colour levels
    #[arg(long, default_value_t = 20)]
    nlevels: u32,

    /// RGB (0-1) of the lowest occupied bin
    #[arg(long, default_value = "1,1,0", value_parser = parse_rgb)]
    rgb_lo: [f32; 3],

    /// RGB (0-1) of the highest occupied bin
    #[arg(long, default_value = "0,0,1", value_parser = parse_rgb)]
    rgb_hi: [f32; 3],
}

/// Parses "r,g,b" with components in 0..=1.
fn parse_rgb(s: &str) -> Result<[f32; 3], String> {
    let parts: Vec<f32> = s
        .split(',')
        .map(|p| p.trim().parse::<f32>().map_err(|e| format!("'{}': {}", p, e)))
        .collect::<Result<_, _>>()?;
    match parts.as_slice() {
        &[r, g, b] if parts.iter().all(|c| (0.0..=1.0).contains(c)) => Ok([r, g, b]),
        _ => Err(format!("expected three comma-separated values in 0..1, got '{}'", s)),
    }
}

/// Maps bin values to colours: white for empty bins, `mid` at the smallest
/// positive value and `hi` at the maximum, in `nlevels` discrete steps.
struct ColorMap {
    empty: LinSrgb,
    mid: LinSrgb,
    hi: LinSrgb,
    nlevels: u32,
}

impl ColorMap {
    fn new(lo: [f32; 3], hi: [f32; 3], nlevels: u32) -> Self {
        Self {
            empty: Srgb::new(1.0f32, 1.0, 1.0).into_linear(),
            mid: Srgb::new(lo[0], lo[1], lo[2]).into_linear(),
            hi: Srgb::new(hi[0], hi[1], hi[2]).into_linear(),
            nlevels: nlevels.max(2),
        }
    }

    /// Position of `value` on the colour ramp, quantised to the level grid.
    fn level(&self, value: f64, scale: &ColorScale) -> f64 {
        let Some(mid) = scale.min_positive else { return 0.0 };
        if value <= 0.0 {
            return 0.0;
        }
        let fraction = if value <= mid || scale.max <= mid {
            0.5 * (value / mid).min(1.0)
        } else {
            0.5 + 0.5 * ((value - mid) / (scale.max - mid)).min(1.0)
        };
        let steps = (self.nlevels - 1) as f64;
        (fraction * steps).round() / steps
    }

    fn color(&self, value: f64, scale: &ColorScale) -> [u8; 3] {
        let level = self.level(value, scale) as f32;
        let mixed = if level <= 0.5 {
            self.empty.mix(self.mid, level * 2.0)
        } else {
            self.mid.mix(self.hi, (level - 0.5) * 2.0)
        };
        let rgb: Srgb<u8> = Srgb::<f32>::from_linear(mixed).into_format();
        [rgb.red, rgb.green, rgb.blue]
    }
}

/// Renders `matrix[frame][size - 1]` with frames along x and size 1 at the bottom.
fn render_matrix(
    matrix: &[Vec<f64>],
    max_size: usize,
    scale: &ColorScale,
    colors: &ColorMap,
    cell_width: u32,
    cell_height: u32,
) -> Result<RgbImage> {
    let frames = matrix.len() as u32;
    let width = (frames * cell_width).max(1);
    let height = (max_size as u32 * cell_height).max(1);
    let row_len = width as usize * 3;
    let mut buffer = vec![255u8; row_len * height as usize];

    buffer.par_chunks_mut(row_len).enumerate().for_each(|(y, row)| {
        let size_index = (height as usize - 1 - y) / cell_height as usize;
        if size_index >= max_size {
            return;
        }
        for (x, pixel) in row.chunks_mut(3).enumerate() {
            let frame = x / cell_width as usize;
            let value = matrix.get(frame).and_then(|r| r.get(size_index)).copied().unwrap_or(0.0);
            pixel.copy_from_slice(&colors.color(value, scale));
        }
    });

    RgbImage::from_raw(width, height, buffer).context("Image buffer does not match its dimensions")
}

fn load_report(path: &Path) -> Result<AggregateReport> {
    let format = match path.extension().and_then(|e| e.to_str()) {
        Some("bin") => DataFormat::Bincode,
        Some("msgpack") => DataFormat::MessagePack,
        Some("json") => DataFormat::Json,
        other => {
            warn!("Unknown report extension {:?}; assuming JSON.", other);
            DataFormat::Json
        }
    };
    let file = File::open(path).with_context(|| format!("Failed to open report: {}", path.display()))?;
    let reader = BufReader::new(file);
    let report = match format {
        DataFormat::Json => serde_json::from_reader(reader).context("Failed to parse JSON report")?,
        DataFormat::Bincode => bincode::deserialize_from(reader).context("Failed to decode bincode report")?,
        DataFormat::MessagePack => rmp_serde::decode::from_read(reader).context("Failed to decode MessagePack report")?,
    };
    Ok(report)
}

fn main() -> Result<()> {
    let args = Args::parse();
    run_with_args(args)
}

fn run_with_args(args: Args) -> Result<()> {
    Builder::from_default_env().filter(None, LevelFilter::Info).init();

    info!("Starting Cluster Visualizer...");
    let report = load_report(&args.input)?;
    info!(
        "Report: {} entities, {} frames, largest cluster size {}",
        report.entity_count,
        report.frame_count(),
        report.max_size
    );
    if report.frame_count() == 0 || report.max_size == 0 {
        warn!("Report contains no analysed frames. Exiting.");
        return Ok(());
    }
    let times = report.times();
    if let (Some(first), Some(last)) = (times.first(), times.last()) {
        info!("Time axis: {} to {}", first, last);
    }

    let colors = ColorMap::new(args.rgb_lo, args.rgb_hi, args.nlevels);
    let raw: Vec<Vec<f64>> = report
        .histogram
        .iter()
        .map(|row| row.iter().map(|&c| c as f64).collect())
        .collect();

    let outputs = [
        (format!("{}.png", args.output), &raw, &report.raw_scale, "Cluster size distribution"),
        (format!("{}w.png", args.output), &report.weighted, &report.weighted_scale, "Weighted cluster size distribution"),
    ];
    for (filename, matrix, scale, title) in outputs {
        let image = render_matrix(matrix, report.max_size, scale, &colors, args.cell_width, args.cell_height)?;
        image
            .save(&filename)
            .with_context(|| format!("Failed to save {}", filename))?;
        info!(
            "{} saved to {} ({}x{} px, min {:?}, max {})",
            title,
            filename,
            image.width(),
            image.height(),
            scale.min_positive,
            scale.max
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scale() -> ColorScale {
        ColorScale { min_positive: Some(1.0), max: 5.0 }
    }

    #[test]
    fn rgb_argument_parsing() {
        assert_eq!(parse_rgb("1, 0.5,0").unwrap(), [1.0, 0.5, 0.0]);
        assert!(parse_rgb("1,1").is_err());
        assert!(parse_rgb("2,0,0").is_err());
        assert!(parse_rgb("a,b,c").is_err());
    }

    #[test]
    fn empty_bins_are_white_and_extremes_hit_the_end_colours() {
        let colors = ColorMap::new([1.0, 1.0, 0.0], [0.0, 0.0, 1.0], 21);
        assert_eq!(colors.color(0.0, &scale()), [255, 255, 255]);
        assert_eq!(colors.color(1.0, &scale()), [255, 255, 0]);
        assert_eq!(colors.color(5.0, &scale()), [0, 0, 255]);
    }

    #[test]
    fn levels_are_quantised() {
        let colors = ColorMap::new([1.0, 1.0, 0.0], [0.0, 0.0, 1.0], 5);
        let s = scale();
        assert_eq!(colors.level(1.0, &s), 0.5);
        assert_eq!(colors.level(5.0, &s), 1.0);
        // 2.0 sits at 0.625 on the ramp, rounded to the 0.75 level of a 5-level grid.
        assert_eq!(colors.level(2.0, &s), 0.75);
        let all_zero = ColorScale { min_positive: None, max: 0.0 };
        assert_eq!(colors.level(3.0, &all_zero), 0.0);
    }

    #[test]
    fn report_is_loaded_by_extension() {
        let report = AggregateReport {
            entity_count: 2,
            max_size: 2,
            records: Vec::new(),
            histogram: vec![vec![0, 1]],
            weighted: vec![vec![0.0, 2.0]],
            average: vec![0.0, 1.0],
            raw_scale: ColorScale { min_positive: Some(1.0), max: 1.0 },
            weighted_scale: ColorScale { min_positive: Some(2.0), max: 2.0 },
        };
        let dir = tempfile::tempdir().unwrap();

        let json = dir.path().join("report.json");
        std::fs::write(&json, serde_json::to_vec(&report).unwrap()).unwrap();
        let loaded = load_report(&json).unwrap();
        assert_eq!(loaded.histogram, report.histogram);
        assert_eq!(loaded.weighted_scale, report.weighted_scale);

        let bin = dir.path().join("report.bin");
        std::fs::write(&bin, bincode::serialize(&report).unwrap()).unwrap();
        assert_eq!(load_report(&bin).unwrap().average, report.average);
    }

    #[test]
    fn matrix_layout_puts_size_one_at_the_bottom() {
        let colors = ColorMap::new([1.0, 1.0, 0.0], [0.0, 0.0, 1.0], 21);
        let matrix = vec![vec![1.0, 0.0], vec![0.0, 5.0]];
        let image = render_matrix(&matrix, 2, &scale(), &colors, 2, 3).unwrap();
        assert_eq!((image.width(), image.height()), (4, 6));
        // Frame 0, size 1: bottom-left.
        assert_eq!(image.get_pixel(0, 5).0, [255, 255, 0]);
        // Frame 1, size 2: top-right.
        assert_eq!(image.get_pixel(3, 0).0, [0, 0, 255]);
        // Frame 0, size 2: empty.
        assert_eq!(image.get_pixel(1, 1).0, [255, 255, 255]);
    }
}
