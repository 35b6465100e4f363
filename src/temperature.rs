use crate::cluster::ClusterLabeling;
use crate::entity::EntityModel;
use cluster_common::FrameSnapshot;
use log::warn;

/// Boltzmann constant in kJ mol^-1 K^-1.
pub const BOLTZ: f64 = 0.008_314_462_6;

/// Equipartition temperature of `particles` free particles carrying `kinetic_energy`.
pub fn kinetic_temperature(kinetic_energy: f64, particles: usize, dof_factor: f64) -> f64 {
    2.0 * kinetic_energy / (3.0 * dof_factor * particles as f64 * BOLTZ)
}

/// Kinetic temperature of the largest cluster of a frame.
#[derive(Debug)]
pub struct TemperatureEstimator {
    enabled: bool,
    masses: Option<Vec<f32>>,
    /// Ratio of the configured degrees of freedom to three per particle.
    dof_factor: f64,
    advised: bool,
}

impl TemperatureEstimator {
    /// `total_particles` is the particle count of the trajectory, used to scale
    /// an explicit `degrees_of_freedom`.
    pub fn new(
        enabled: bool,
        masses: Option<Vec<f32>>,
        degrees_of_freedom: Option<u32>,
        total_particles: usize,
    ) -> Self {
        let dof_factor = match degrees_of_freedom {
            Some(ndf) if total_particles > 0 => ndf as f64 / (3.0 * total_particles as f64),
            _ => 1.0,
        };
        Self { enabled, masses, dof_factor, advised: false }
    }

    pub fn dof_factor(&self) -> f64 {
        self.dof_factor
    }

    fn advise(&mut self, reason: &str) {
        if !self.advised {
            warn!("Cluster temperatures unavailable: {}. Continuing without them.", reason);
            self.advised = true;
        }
    }

    /// Sums `m v^2 / 2` over every particle of every entity labelled `label`
    /// and converts it to a temperature. `None` when disabled or when masses
    /// or velocities are missing; the first such miss logs one advisory.
    pub fn estimate(
        &mut self,
        frame: &FrameSnapshot,
        entities: &EntityModel,
        labeling: &ClusterLabeling,
        label: usize,
    ) -> Option<f64> {
        if !self.enabled {
            return None;
        }
        let Some(velocities) = frame.velocities.as_deref() else {
            self.advise("the trajectory has no velocities");
            return None;
        };
        let Some(masses) = self.masses.as_deref() else {
            self.advise("particle masses need a topology file");
            return None;
        };

        let particles = entities.particles_of(labeling.members(label));
        let mut kinetic_energy = 0.0f64;
        for &p in &particles {
            match (masses.get(p), velocities.get(p)) {
                (Some(&m), Some(&v)) => kinetic_energy += 0.5 * m as f64 * v.length_squared() as f64,
                _ => {
                    self.advise("velocity or mass data does not cover every particle");
                    return None;
                }
            }
        }
        if particles.is_empty() || self.dof_factor <= 0.0 {
            return None;
        }
        Some(kinetic_temperature(kinetic_energy, particles.len(), self.dof_factor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::ClusterMerger;
    use cluster_common::Vec3;

    fn pair_labeling() -> ClusterLabeling {
        // Entities 0 and 1 together, 2 alone.
        let mut out = ClusterLabeling::default();
        ClusterMerger::new(3).merge(&[vec![1], vec![], vec![]], &mut out).unwrap();
        out
    }

    fn frame(velocities: Option<Vec<Vec3>>) -> FrameSnapshot {
        FrameSnapshot {
            positions: vec![Vec3::zero(); 3],
            velocities,
            ..Default::default()
        }
    }

    #[test]
    fn temperature_of_largest_cluster() {
        let entities = EntityModel::from_indices(&[0, 1, 2]).unwrap();
        let labeling = pair_labeling();
        let v = vec![Vec3::new(1.0, 0.0, 0.0), Vec3::new(0.0, 2.0, 0.0), Vec3::new(100.0, 0.0, 0.0)];
        let mut estimator = TemperatureEstimator::new(true, Some(vec![2.0, 1.0, 1.0]), None, 3);

        let t = estimator.estimate(&frame(Some(v)), &entities, &labeling, 0).unwrap();
        // E = 0.5*2*1 + 0.5*1*4 = 3
        let expected = 2.0 * 3.0 / (3.0 * 2.0 * BOLTZ);
        assert!((t - expected).abs() < 1e-9 * expected);
    }

    #[test]
    fn degrees_of_freedom_scale_temperature() {
        let estimator = TemperatureEstimator::new(true, None, Some(6), 3);
        assert!((estimator.dof_factor() - 6.0 / 9.0).abs() < 1e-12);
        let full = kinetic_temperature(3.0, 2, 1.0);
        let constrained = kinetic_temperature(3.0, 2, estimator.dof_factor());
        assert!((constrained / full - 1.5).abs() < 1e-12);
    }

    #[test]
    fn molecule_temperature_counts_all_particles() {
        let entities = EntityModel::from_blocks(vec![0..2, 2..3]).unwrap();
        let mut labeling = ClusterLabeling::default();
        ClusterMerger::new(2).merge(&[vec![], vec![]], &mut labeling).unwrap();
        let v = vec![Vec3::new(1.0, 0.0, 0.0); 3];
        let mut estimator = TemperatureEstimator::new(true, Some(vec![1.0; 3]), None, 3);
        let t = estimator.estimate(&frame(Some(v)), &entities, &labeling, 0).unwrap();
        assert!((t - kinetic_temperature(1.0, 2, 1.0)).abs() < 1e-9);
    }

    #[test]
    fn missing_data_gives_no_temperature() {
        let entities = EntityModel::from_indices(&[0, 1, 2]).unwrap();
        let labeling = pair_labeling();
        let mut no_masses = TemperatureEstimator::new(true, None, None, 3);
        let v = Some(vec![Vec3::zero(); 3]);
        assert!(no_masses.estimate(&frame(v.clone()), &entities, &labeling, 0).is_none());
        assert!(no_masses.advised);
        assert!(no_masses.estimate(&frame(v), &entities, &labeling, 0).is_none());

        let mut no_velocities = TemperatureEstimator::new(true, Some(vec![1.0; 3]), None, 3);
        assert!(no_velocities.estimate(&frame(None), &entities, &labeling, 0).is_none());

        let mut disabled = TemperatureEstimator::new(false, Some(vec![1.0; 3]), None, 3);
        assert!(disabled.estimate(&frame(None), &entities, &labeling, 0).is_none());
        assert!(!disabled.advised);
    }
}
