use crate::aggregate::{summarize_frame, FrameClock, TrajectoryAggregate};
use crate::cluster::{ClusterLabeling, ClusterMerger};
use crate::entity::EntityModel;
use crate::proximity::ProximityEvaluator;
use crate::temperature::TemperatureEstimator;
use crate::topology::{load_index_group, Topology};
use anyhow::{Context, Result};
use cluster_common::{
    AggregateReport, AnalysisConfig, ClusterError, ClusterMembership, ClusterMode, FrameRecord, FrameSnapshot,
    MembershipListing, SimBox,
};
use log::{debug, info, trace, warn};
use rayon::ThreadPool;

/// Builds the entities to cluster: topology molecules in molecule mode, otherwise
/// the configured index group, or every particle of the trajectory.
pub fn select_entities(
    config: &AnalysisConfig,
    topology: Option<&Topology>,
    trajectory_particles: usize,
) -> Result<EntityModel> {
    match config.clustering.mode {
        ClusterMode::Molecules => {
            let topology = topology.ok_or(ClusterError::MissingTopology)?;
            if config.input.index_file.is_some() {
                info!("Using molecules rather than particles; the index file is not read.");
            }
            Ok(EntityModel::from_blocks(topology.molecules.clone())?)
        }
        ClusterMode::Particles => {
            let indices = match &config.input.index_file {
                Some(path) => {
                    let group = load_index_group(path, config.input.index_group.as_deref())?;
                    info!("Clustering {} particles of index group '{}'.", group.indices.len(), group.name);
                    group.indices
                }
                None => (0..trajectory_particles).collect(),
            };
            if let Some(&bad) = indices.iter().find(|&&i| i >= trajectory_particles) {
                return Err(ClusterError::IndexOutOfRange { index: bad, particles: trajectory_particles }.into());
            }
            Ok(EntityModel::from_indices(&indices)?)
        }
    }
}

/// Runs the per-frame clustering pipeline and accumulates trajectory statistics.
pub struct ClusterAnalysis {
    skip: u32,
    pbc: bool,
    entities: EntityModel,
    proximity: ProximityEvaluator,
    merger: ClusterMerger,
    /// Labeling of the most recently analysed frame.
    labeling: ClusterLabeling,
    temperature: TemperatureEstimator,
    clock: FrameClock,
    aggregate: TrajectoryAggregate,
    /// Worker pool for the proximity pass.
    pool: ThreadPool,
    /// Frames seen so far, analysed or skipped.
    frames_seen: u64,
    warned_missing_box: bool,
}

impl ClusterAnalysis {
    /// Creates the analysis for a trajectory of `trajectory_particles` particles.
    ///
    /// A topology, when given, must describe exactly that many particles.
    pub fn new(
        config: &AnalysisConfig,
        entities: EntityModel,
        topology: Option<&Topology>,
        trajectory_particles: usize,
    ) -> Result<Self> {
        if let Some(topology) = topology {
            if topology.particle_count() != trajectory_particles {
                return Err(ClusterError::ParticleCountMismatch {
                    topology: topology.particle_count(),
                    trajectory: trajectory_particles,
                }
                .into());
            }
        }

        let clustering = &config.clustering;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(clustering.threads)
            .build()
            .context("Failed to build the proximity thread pool")?;

        let n = entities.len();
        let temperature = TemperatureEstimator::new(
            config.temperature.enabled,
            topology.map(|t| t.masses.clone()),
            config.temperature.degrees_of_freedom,
            trajectory_particles,
        );
        if config.temperature.degrees_of_freedom.is_some() {
            info!("Temperature degrees-of-freedom factor: {:.4}", temperature.dof_factor());
        }

        Ok(Self {
            skip: clustering.skip,
            pbc: clustering.pbc,
            proximity: ProximityEvaluator::new(n, clustering.cutoff, clustering.molecule_cutoff),
            merger: ClusterMerger::new(n),
            labeling: ClusterLabeling::default(),
            temperature,
            clock: FrameClock::new(config.output.time_factor),
            aggregate: TrajectoryAggregate::new(n),
            pool,
            entities,
            frames_seen: 0,
            warned_missing_box: false,
        })
    }

    pub fn entities(&self) -> &EntityModel {
        &self.entities
    }

    pub fn thread_count(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Labeling of the most recently analysed frame.
    pub fn labeling(&self) -> &ClusterLabeling {
        &self.labeling
    }

    pub fn frames_seen(&self) -> u64 {
        self.frames_seen
    }

    pub fn frames_analysed(&self) -> usize {
        self.aggregate.frame_count()
    }

    fn periodic_box(&mut self, frame: &FrameSnapshot) -> Option<SimBox> {
        if !self.pbc {
            return None;
        }
        match frame.sim_box {
            Some(sim_box) if sim_box.is_periodic() => Some(sim_box),
            _ => {
                if !self.warned_missing_box {
                    warn!("Periodic boundaries requested but frame {} has no box; using plain distances.", self.frames_seen);
                    self.warned_missing_box = true;
                }
                None
            }
        }
    }

    /// Feeds the next frame of the trajectory.
    ///
    /// Returns the frame's record, or `None` when the skip stride excludes it.
    pub fn process_frame(&mut self, frame: &FrameSnapshot) -> Result<Option<&FrameRecord>> {
        let index = self.frames_seen;
        self.frames_seen += 1;
        if self.skip > 0 && index % self.skip as u64 != 0 {
            trace!("Skipping frame {}", index);
            return Ok(None);
        }

        self.entities.update_centers(&frame.positions)?;
        let periodic_box = self.periodic_box(frame);
        self.proximity.evaluate(&self.pool, &self.entities, &frame.positions, periodic_box.as_ref());
        self.merger.merge(self.proximity.adjacency(), &mut self.labeling)?;

        let time = self.clock.resolve(frame);
        let (mut record, row) = summarize_frame(&self.labeling, time);
        if let Some(label) = record.max_cluster_label {
            record.temperature = self.temperature.estimate(frame, &self.entities, &self.labeling, label);
        }

        debug!(
            "Frame {} (t={}): {} contacts, {} clusters, largest {} (label {:?})",
            index,
            time,
            self.proximity.pair_count(),
            record.cluster_count,
            record.max_cluster_size,
            record.max_cluster_label
        );
        self.aggregate.push(record, row);
        Ok(self.aggregate.records().last())
    }

    /// Cluster membership of the last analysed frame. `None` before any frame,
    /// or when that frame has no cluster larger than one entity.
    pub fn membership(&self) -> Option<MembershipListing> {
        let record = self.aggregate.records().last()?;
        let max_label = record.max_cluster_label?;
        let clusters: Vec<ClusterMembership> = self
            .labeling
            .clusters()
            .map(|(label, _)| {
                let entities: Vec<usize> = self.labeling.members(label).collect();
                let particles = self.entities.particles_of(entities.iter().copied());
                ClusterMembership { label, entities, particles }
            })
            .collect();
        let max_cluster = clusters.iter().find(|c| c.label == max_label)?.clone();
        Some(MembershipListing { time: record.time, clusters, max_cluster })
    }

    /// Ends the trajectory and post-processes the histogram.
    pub fn finish(self) -> AggregateReport {
        self.aggregate.finish()
    }
}
