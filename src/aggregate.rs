use crate::cluster::ClusterLabeling;
use cluster_common::{AggregateReport, ColorScale, FrameRecord, FrameSnapshot};

/// Resolves the time reported for a frame: the frame time if present, else the
/// step, else a counter starting at 1. The result is scaled by `time_factor`.
#[derive(Debug)]
pub struct FrameClock {
    counter: u32,
    time_factor: f64,
}

impl FrameClock {
    pub fn new(time_factor: f64) -> Self {
        Self { counter: 0, time_factor }
    }

    pub fn resolve(&mut self, frame: &FrameSnapshot) -> f64 {
        let raw = if let Some(time) = frame.time {
            time
        } else if let Some(step) = frame.step {
            step as f64
        } else {
            self.counter += 1;
            self.counter as f64
        };
        raw * self.time_factor
    }
}

/// Derives the per-frame record and histogram row from a labeling.
///
/// The returned row has one bin per possible size: `row[size - 1]` counts the
/// clusters of that size. Temperature is left unset.
pub fn summarize_frame(labeling: &ClusterLabeling, time: f64) -> (FrameRecord, Vec<u32>) {
    let mut row = vec![0u32; labeling.entity_count()];
    let mut cluster_count = 0;
    let mut multi_sum = 0usize;
    let mut multi_count = 0usize;
    let mut max_cluster_size = 0;
    let mut max_cluster_label = 0;

    for (label, size) in labeling.clusters() {
        cluster_count += 1;
        row[size - 1] += 1;
        if size > 1 {
            multi_sum += size;
            multi_count += 1;
        }
        // Strict comparison: ties keep the smallest label.
        if size > max_cluster_size {
            max_cluster_size = size;
            max_cluster_label = label;
        }
    }

    let max_cluster_label = (max_cluster_size > 1).then_some(max_cluster_label);
    let average_size = (multi_count > 0).then(|| multi_sum as f64 / multi_count as f64);
    let record = FrameRecord {
        time,
        cluster_count,
        average_size,
        max_cluster_size,
        max_cluster_label,
        temperature: None,
    };
    (record, row)
}

/// Everything that survives from one frame to the next: the ordered frame
/// records and the per-frame size histogram. Append-only.
#[derive(Debug, Default)]
pub struct TrajectoryAggregate {
    entity_count: usize,
    records: Vec<FrameRecord>,
    histogram: Vec<Vec<u32>>,
    max_size: usize,
}

impl TrajectoryAggregate {
    pub fn new(entity_count: usize) -> Self {
        Self { entity_count, ..Default::default() }
    }

    /// Appends a finalized frame.
    pub fn push(&mut self, record: FrameRecord, row: Vec<u32>) {
        self.max_size = self.max_size.max(record.max_cluster_size);
        self.records.push(record);
        self.histogram.push(row);
    }

    pub fn records(&self) -> &[FrameRecord] {
        &self.records
    }

    pub fn frame_count(&self) -> usize {
        self.records.len()
    }

    /// Post-processes the whole trajectory: histogram truncated to the largest
    /// size seen, its size-weighted variant, the per-size average over frames
    /// and the colour bounds of both matrices.
    pub fn finish(self) -> AggregateReport {
        let max_size = self.max_size;
        let histogram: Vec<Vec<u32>> = self
            .histogram
            .into_iter()
            .map(|mut row| {
                row.truncate(max_size);
                row
            })
            .collect();

        let weighted: Vec<Vec<f64>> = histogram
            .iter()
            .map(|row| {
                row.iter()
                    .enumerate()
                    .map(|(s, &count)| count as f64 * (s + 1) as f64)
                    .collect()
            })
            .collect();

        let frames = histogram.len();
        let average: Vec<f64> = (0..max_size)
            .map(|s| {
                if frames == 0 {
                    return 0.0;
                }
                let total: u64 = histogram.iter().map(|row| row[s] as u64).sum();
                total as f64 / frames as f64
            })
            .collect();

        let raw_scale = color_scale(histogram.iter().flatten().map(|&c| c as f64));
        let weighted_scale = color_scale(weighted.iter().flatten().copied());

        AggregateReport {
            entity_count: self.entity_count,
            max_size,
            records: self.records,
            histogram,
            weighted,
            average,
            raw_scale,
            weighted_scale,
        }
    }
}

#[cfg(test)]
impl TrajectoryAggregate {
    /// Largest cluster size seen so far.
    pub fn max_size(&self) -> usize {
        self.max_size
    }
}

/// Smallest strictly positive value and largest value of a matrix.
pub fn color_scale<I: IntoIterator<Item = f64>>(values: I) -> ColorScale {
    let mut min_positive: Option<f64> = None;
    let mut max = 0.0f64;
    for v in values {
        if v > 0.0 {
            min_positive = Some(min_positive.map_or(v, |m| m.min(v)));
        }
        max = max.max(v);
    }
    ColorScale { min_positive, max }
}

/// Entities counted in clusters per frame, from the averaged distribution.
/// Each size's contribution is truncated to an integer before summing.
pub fn entities_in_clusters(report: &AggregateReport) -> usize {
    report
        .average
        .iter()
        .enumerate()
        .map(|(s, &avg)| ((s + 1) as f64 * avg) as usize)
        .sum()
}
