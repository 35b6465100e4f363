use thiserror::Error;

/// Fatal errors raised by the clustering core.
///
/// Configuration errors abort before any frame is analysed; state errors
/// mean a merge invariant was broken and the aggregate can no longer be trusted.
#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("topology ({topology} particles) and trajectory ({trajectory} particles) do not match")]
    ParticleCountMismatch { topology: usize, trajectory: usize },

    #[error("molecule clustering needs a topology file")]
    MissingTopology,

    #[error("no entities selected for clustering")]
    EmptySelection,

    #[error("particle index {index} is out of range for a frame with {particles} particles")]
    IndexOutOfRange { index: usize, particles: usize },

    #[error("negative cluster size for label {label}")]
    NegativeClusterSize { label: usize },

    #[error("cluster sizes sum to {counted}, expected {entities}")]
    PartitionMismatch { counted: usize, entities: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
