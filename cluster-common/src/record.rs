use serde::{Deserialize, Serialize};

/// Per-frame cluster statistics, one per analysed frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameRecord {
    /// Resolved frame time (time, else step, else a 1-based counter), scaled by the time factor.
    pub time: f64,
    /// Number of clusters, singletons included.
    pub cluster_count: usize,
    /// Mean size of the clusters larger than one entity; `None` when every cluster is a singleton.
    pub average_size: Option<f64>,
    pub max_cluster_size: usize,
    /// Label (smallest entity index) of the largest cluster; `None` when no
    /// cluster has more than one entity.
    pub max_cluster_label: Option<usize>,
    /// Kinetic temperature (K) of the largest cluster.
    pub temperature: Option<f64>,
}

/// Lower and upper bounds used to colour a histogram matrix.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColorScale {
    /// Smallest strictly positive bin value; `None` for an all-zero matrix.
    pub min_positive: Option<f64>,
    pub max: f64,
}

/// Trajectory-wide results handed to the writers and the visualizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateReport {
    pub entity_count: usize,
    /// Largest cluster size seen in any analysed frame; histogram rows have this many columns.
    pub max_size: usize,
    pub records: Vec<FrameRecord>,
    /// `histogram[frame][size - 1]`: clusters of `size` in that frame.
    pub histogram: Vec<Vec<u32>>,
    /// `weighted[frame][size - 1] = histogram[frame][size - 1] * size`.
    pub weighted: Vec<Vec<f64>>,
    /// `average[size - 1]`: mean number of clusters of `size` per analysed frame.
    pub average: Vec<f64>,
    pub raw_scale: ColorScale,
    pub weighted_scale: ColorScale,
}

impl AggregateReport {
    pub fn frame_count(&self) -> usize {
        self.records.len()
    }

    /// Frame times, in frame order.
    pub fn times(&self) -> Vec<f64> {
        self.records.iter().map(|r| r.time).collect()
    }
}

/// Members of one cluster of the final analysed frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterMembership {
    pub label: usize,
    pub entities: Vec<usize>,
    /// 0-based particle indices of all member entities, in entity order.
    pub particles: Vec<usize>,
}

/// Cluster membership of the final analysed frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MembershipListing {
    pub time: f64,
    /// Every cluster, ordered by label.
    pub clusters: Vec<ClusterMembership>,
    pub max_cluster: ClusterMembership,
}
