pub mod config;
pub mod error;
pub mod frame;
pub mod record;
pub mod vecmath;

// Re-export key types for easier use by dependent crates
pub use config::{AnalysisConfig, ClusterMode, ClusteringConfig, DataFormat, InputConfig, OutputConfig, TemperatureConfig};
pub use error::ClusterError;
pub use frame::{FrameSnapshot, SimBox};
pub use record::{AggregateReport, ClusterMembership, ColorScale, FrameRecord, MembershipListing};
pub use vecmath::Vec3;
