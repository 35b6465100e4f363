use cluster_common::{ClusterError, Vec3};
use std::ops::Range;

/// The units being clustered: single particles or contiguous particle blocks (molecules),
/// plus the per-frame center buffer, reused across frames.
#[derive(Debug)]
pub struct EntityModel {
    blocks: Vec<Range<usize>>,
    centers: Vec<Vec3>,
    /// One past the highest particle index any block touches.
    required_particles: usize,
}

impl EntityModel {
    /// One entity per selected particle.
    pub fn from_indices(indices: &[usize]) -> Result<Self, ClusterError> {
        Self::from_blocks(indices.iter().map(|&i| i..i + 1).collect())
    }

    /// One entity per molecule block.
    pub fn from_blocks(blocks: Vec<Range<usize>>) -> Result<Self, ClusterError> {
        if blocks.is_empty() {
            return Err(ClusterError::EmptySelection);
        }
        if let Some(pos) = blocks.iter().position(|b| b.is_empty()) {
            return Err(ClusterError::InvalidConfig(format!("entity {} has no particles", pos)));
        }
        let required_particles = blocks.iter().map(|b| b.end).max().unwrap_or(0);
        let centers = vec![Vec3::zero(); blocks.len()];
        Ok(Self { blocks, centers, required_particles })
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn blocks(&self) -> &[Range<usize>] {
        &self.blocks
    }

    /// Centers computed by the last call to `update_centers`.
    pub fn centers(&self) -> &[Vec3] {
        &self.centers
    }

    /// Total number of particles over all entities.
    pub fn particle_count(&self) -> usize {
        self.blocks.iter().map(|b| b.len()).sum()
    }

    /// Recomputes every entity center as the unweighted mean of its particle positions.
    pub fn update_centers(&mut self, positions: &[Vec3]) -> Result<(), ClusterError> {
        if positions.len() < self.required_particles {
            return Err(ClusterError::IndexOutOfRange {
                index: self.required_particles - 1,
                particles: positions.len(),
            });
        }
        for (center, block) in self.centers.iter_mut().zip(&self.blocks) {
            let mut sum = Vec3::zero();
            for &p in &positions[block.clone()] {
                sum += p;
            }
            *center = sum / block.len() as f32;
        }
        Ok(())
    }

    /// Particle indices of the given entities, in the order given.
    pub fn particles_of<I: IntoIterator<Item = usize>>(&self, entities: I) -> Vec<usize> {
        entities.into_iter().flat_map(|e| self.blocks[e].clone()).collect()
    }
}

#[cfg(test)]
impl EntityModel {
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn block(&self, entity: usize) -> Range<usize> {
        self.blocks[entity].clone()
    }
}
