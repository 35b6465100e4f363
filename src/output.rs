use anyhow::{Context, Result};
use cluster_common::{AggregateReport, DataFormat, FrameRecord, MembershipListing};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

fn optional(value: Option<f64>, precision: usize) -> String {
    value.map_or_else(String::new, |v| format!("{:.*}", precision, v))
}

/// Per-frame scalars, one CSV row per analysed frame, written as frames arrive.
pub struct TimeSeriesWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl TimeSeriesWriter<File> {
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        let writer = csv::Writer::from_path(path_ref)
            .with_context(|| format!("Failed to create time series '{}'", path_ref.display()))?;
        Self::new(writer)
    }
}

impl<W: Write> TimeSeriesWriter<W> {
    pub fn new(mut writer: csv::Writer<W>) -> Result<Self> {
        writer.write_record(["time", "clusters", "average_size", "max_size", "max_label", "temperature"])?;
        Ok(Self { writer })
    }

    pub fn write(&mut self, record: &FrameRecord) -> Result<()> {
        self.writer.write_record(&[
            format!("{:.6e}", record.time),
            record.cluster_count.to_string(),
            optional(record.average_size, 3),
            record.max_cluster_size.to_string(),
            record.max_cluster_label.map_or_else(String::new, |l| l.to_string()),
            optional(record.temperature, 3),
        ])?;
        Ok(())
    }

    pub fn finish(mut self) -> Result<W> {
        self.writer.flush()?;
        self.writer.into_inner().map_err(|e| anyhow::anyhow!("Failed to flush time series: {}", e))
    }
}

/// Entity labels of every analysed frame: the frame time followed by one label per entity.
pub struct LabelTableWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl LabelTableWriter<File> {
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        let writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(path_ref)
            .with_context(|| format!("Failed to create label table '{}'", path_ref.display()))?;
        Ok(Self::new(writer))
    }
}

impl<W: Write> LabelTableWriter<W> {
    pub fn new(writer: csv::Writer<W>) -> Self {
        Self { writer }
    }

    pub fn write(&mut self, time: f64, labels: &[usize]) -> Result<()> {
        let mut row = Vec::with_capacity(labels.len() + 1);
        row.push(format!("{:.3}", time));
        row.extend(labels.iter().map(|l| l.to_string()));
        self.writer.write_record(&row)?;
        Ok(())
    }

    pub fn finish(mut self) -> Result<W> {
        self.writer.flush()?;
        self.writer.into_inner().map_err(|e| anyhow::anyhow!("Failed to flush label table: {}", e))
    }
}

/// Cluster-size distribution averaged over the analysed frames.
pub fn write_size_distribution<W: Write>(writer: W, report: &AggregateReport) -> Result<()> {
    let mut writer = csv::Writer::from_writer(writer);
    writer.write_record(["size", "clusters_per_frame"])?;
    for (s, avg) in report.average.iter().enumerate() {
        writer.write_record(&[(s + 1).to_string(), format!("{:.3}", avg)])?;
    }
    writer.flush()?;
    Ok(())
}

/// Raw per-frame histogram: frame ordinal, then one count per cluster size.
pub fn write_histogram_over_time<W: Write>(writer: W, report: &AggregateReport) -> Result<()> {
    let mut writer = csv::Writer::from_writer(writer);
    let mut header = vec!["frame".to_string()];
    header.extend((1..=report.max_size).map(|s| format!("size_{}", s)));
    writer.write_record(&header)?;
    for (frame, row) in report.histogram.iter().enumerate() {
        let mut fields = Vec::with_capacity(row.len() + 1);
        fields.push(frame.to_string());
        fields.extend(row.iter().map(|c| c.to_string()));
        writer.write_record(&fields)?;
    }
    writer.flush()?;
    Ok(())
}

/// GROMACS-style index groups for the final frame: one `[ clust L ]` group per
/// cluster when `all_clusters` is set, then `[ max_clust ]`. Particle numbers are 1-based.
pub fn write_membership<W: Write>(mut writer: W, listing: &MembershipListing, all_clusters: bool) -> Result<()> {
    if all_clusters {
        for cluster in &listing.clusters {
            writeln!(writer, "[ clust {} ]", cluster.label)?;
            for p in &cluster.particles {
                writeln!(writer, "{}", p + 1)?;
            }
        }
    }
    writeln!(writer, "[ max_clust ]")?;
    for p in &listing.max_cluster.particles {
        writeln!(writer, "{}", p + 1)?;
    }
    writer.flush()?;
    Ok(())
}

/// Serializes the full report for the visualizer.
pub fn write_report<W: Write>(mut writer: W, report: &AggregateReport, format: DataFormat) -> Result<()> {
    match format {
        DataFormat::Json => serde_json::to_writer(&mut writer, report).context("Failed to serialize report to JSON")?,
        DataFormat::Bincode => bincode::serialize_into(&mut writer, report).context("Failed to serialize report to bincode")?,
        DataFormat::MessagePack => {
            rmp_serde::encode::write(&mut writer, report).context("Failed to serialize report to MessagePack")?
        }
    }
    writer.flush()?;
    Ok(())
}

/// Creates `path` and hands a buffered writer to `write`.
pub fn write_file<P, F>(path: P, write: F) -> Result<()>
where
    P: AsRef<Path>,
    F: FnOnce(BufWriter<File>) -> Result<()>,
{
    let path_ref = path.as_ref();
    let file = File::create(path_ref).with_context(|| format!("Failed to create '{}'", path_ref.display()))?;
    write(BufWriter::new(file)).with_context(|| format!("Failed to write '{}'", path_ref.display()))
}
