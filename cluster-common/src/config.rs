use serde::{Deserialize, Serialize};
use anyhow::Result;
use std::path::{Path, PathBuf};

/// Serialization format of a trajectory stream or of the aggregate report.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DataFormat {
    /// JSON; trajectories are read as JSON lines (one frame per line).
    #[default]
    Json,
    Bincode,
    MessagePack,
}

impl DataFormat {
    pub fn extension(self) -> &'static str {
        match self {
            DataFormat::Json => "json",
            DataFormat::Bincode => "bin",
            DataFormat::MessagePack => "msgpack",
        }
    }
}

// Where frames, topology and index groups come from
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct InputConfig {
    pub trajectory: PathBuf,
    #[serde(default)]
    pub format: DataFormat,
    /// Topology descriptor (molecule blocks and masses). Required for molecule mode and temperatures.
    #[serde(default)]
    pub topology: Option<PathBuf>,
    /// GROMACS-style index file selecting the particles to cluster (particle mode only).
    #[serde(default)]
    pub index_file: Option<PathBuf>,
    /// Group to read from `index_file`; the first group when absent.
    #[serde(default)]
    pub index_group: Option<String>,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ClusterMode {
    /// One entity per selected particle.
    #[default]
    Particles,
    /// One entity per topology molecule (rigid block of particles).
    Molecules,
}

// Cutoffs and parallelism for the per-frame clustering
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ClusteringConfig {
    #[serde(default)]
    pub mode: ClusterMode,
    /// Largest particle-particle distance (nm) for two entities to be in contact.
    #[serde(default = "default_cutoff")]
    pub cutoff: f32,
    /// Largest entity-center distance (nm) before the particle-level test is attempted.
    #[serde(default = "default_molecule_cutoff")]
    pub molecule_cutoff: f32,
    #[serde(default = "default_pbc")]
    pub pbc: bool,
    /// Analyse every `skip`-th frame; 0 analyses every frame.
    #[serde(default)]
    pub skip: u32,
    /// Worker threads for the proximity pass; 0 uses the rayon default.
    #[serde(default)]
    pub threads: usize,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct TemperatureConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Degrees of freedom of the whole system; three per particle when absent.
    #[serde(default)]
    pub degrees_of_freedom: Option<u32>,
}

// Configuration for output settings, loaded from config.toml
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct OutputConfig {
    pub base_filename: String,
    /// Multiplies every reported frame time (unit conversion).
    #[serde(default = "default_time_factor")]
    pub time_factor: f64,
    /// Also list every cluster of the final frame in the membership index file.
    #[serde(default = "default_true")]
    pub write_all_clusters: bool,
    #[serde(default)]
    pub report_format: DataFormat,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        ClusteringConfig {
            mode: ClusterMode::Particles,
            cutoff: default_cutoff(),
            molecule_cutoff: default_molecule_cutoff(),
            pbc: default_pbc(),
            skip: 0,
            threads: 0,
        }
    }
}

impl Default for TemperatureConfig {
    fn default() -> Self {
        TemperatureConfig { enabled: true, degrees_of_freedom: None }
    }
}

fn default_cutoff() -> f32 {
    0.35
}

fn default_molecule_cutoff() -> f32 {
    2.0
}

fn default_pbc() -> bool {
    true
}

fn default_true() -> bool {
    true
}

fn default_time_factor() -> f64 {
    1.0
}

// Main analysis configuration structure, loaded from config.toml.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct AnalysisConfig {
    pub input: InputConfig,
    #[serde(default)]
    pub clustering: ClusteringConfig,
    #[serde(default)]
    pub temperature: TemperatureConfig,
    pub output: OutputConfig,
}

impl AnalysisConfig {
    /// Loads the analysis configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();

        let config_str = std::fs::read_to_string(path_ref)
            .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path_ref.display(), e))?;
        let config: AnalysisConfig = toml::from_str(&config_str)
            .map_err(|e| anyhow::anyhow!("Failed to parse TOML from '{}': {}", path_ref.display(), e))?;

        config.validate()?;
        Ok(config)
    }

    /// Rejects settings the analysis cannot run with.
    pub fn validate(&self) -> Result<()> {
        let c = &self.clustering;
        if !c.cutoff.is_finite() || c.cutoff < 0.0 {
            anyhow::bail!("cutoff must be a non-negative number, got {}.", c.cutoff);
        }
        if !c.molecule_cutoff.is_finite() || c.molecule_cutoff < 0.0 {
            anyhow::bail!("molecule_cutoff must be a non-negative number, got {}.", c.molecule_cutoff);
        }
        if c.mode == ClusterMode::Molecules && self.input.topology.is_none() {
            return Err(crate::ClusterError::MissingTopology.into());
        }
        if !self.output.time_factor.is_finite() || self.output.time_factor <= 0.0 {
            anyhow::bail!("time_factor must be positive.");
        }
        if self.output.base_filename.is_empty() {
            anyhow::bail!("base_filename must not be empty.");
        }
        Ok(())
    }

    /// True when the coarse center cutoff can reject pairs the particle cutoff would accept.
    pub fn coarse_cutoff_suppresses_contacts(&self) -> bool {
        self.clustering.molecule_cutoff < self.clustering.cutoff
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", content).unwrap();
        file
    }

    #[test]
    fn load_minimal_config_uses_defaults() {
        let file = write_config(
            r#"
            [input]
            trajectory = "traj.jsonl"

            [output]
            base_filename = "clust"
            "#,
        );
        let config = AnalysisConfig::load(file.path()).unwrap();
        assert_eq!(config.input.format, DataFormat::Json);
        assert_eq!(config.clustering.mode, ClusterMode::Particles);
        assert_eq!(config.clustering.cutoff, 0.35);
        assert_eq!(config.clustering.molecule_cutoff, 2.0);
        assert!(config.clustering.pbc);
        assert_eq!(config.clustering.skip, 0);
        assert!(config.temperature.enabled);
        assert_eq!(config.output.time_factor, 1.0);
        assert!(!config.coarse_cutoff_suppresses_contacts());
    }

    #[test]
    fn load_full_config() {
        let file = write_config(
            r#"
            [input]
            trajectory = "traj.bin"
            format = "bincode"
            topology = "topol.toml"

            [clustering]
            mode = "molecules"
            cutoff = 0.5
            molecule_cutoff = 0.4
            pbc = false
            skip = 5
            threads = 4

            [temperature]
            degrees_of_freedom = 600

            [output]
            base_filename = "run1"
            report_format = "messagepack"
            write_all_clusters = false
            "#,
        );
        let config = AnalysisConfig::load(file.path()).unwrap();
        assert_eq!(config.input.format, DataFormat::Bincode);
        assert_eq!(config.clustering.mode, ClusterMode::Molecules);
        assert_eq!(config.clustering.skip, 5);
        assert_eq!(config.temperature.degrees_of_freedom, Some(600));
        assert_eq!(config.output.report_format, DataFormat::MessagePack);
        assert!(config.coarse_cutoff_suppresses_contacts());
    }

    #[test]
    fn molecule_mode_without_topology_is_rejected() {
        let file = write_config(
            r#"
            [input]
            trajectory = "traj.jsonl"

            [clustering]
            mode = "molecules"

            [output]
            base_filename = "clust"
            "#,
        );
        let err = AnalysisConfig::load(file.path()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<crate::ClusterError>(),
            Some(crate::ClusterError::MissingTopology)
        ));
    }

    #[test]
    fn negative_cutoff_is_rejected() {
        let file = write_config(
            r#"
            [input]
            trajectory = "traj.jsonl"

            [clustering]
            cutoff = -1.0

            [output]
            base_filename = "clust"
            "#,
        );
        assert!(AnalysisConfig::load(file.path()).is_err());
    }
}
