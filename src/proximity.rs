use crate::entity::EntityModel;
use cluster_common::{SimBox, Vec3};
use rayon::prelude::*;
use rayon::ThreadPool;
use std::ops::Range;

/// Displacement `a - b`, reduced to its minimum image when a periodic box is given.
#[inline(always)]
pub fn displacement(a: Vec3, b: Vec3, periodic_box: Option<&SimBox>) -> Vec3 {
    let d = a - b;
    match periodic_box {
        Some(sim_box) => sim_box.minimum_image(d),
        None => d,
    }
}

/// True if any particle of `a` lies closer than the cutoff to any particle of `b`.
/// Stops at the first such pair.
#[inline]
fn blocks_in_contact(
    a: &Range<usize>,
    b: &Range<usize>,
    positions: &[Vec3],
    cutoff_sq: f32,
    periodic_box: Option<&SimBox>,
) -> bool {
    positions[a.clone()].iter().any(|&pa| {
        positions[b.clone()]
            .iter()
            .any(|&pb| displacement(pa, pb, periodic_box).length_squared() < cutoff_sq)
    })
}

/// Finds all entity pairs in contact in one frame.
///
/// The relation is stored as one row per entity holding the higher-indexed
/// entities it touches. Rows are cleared, not reallocated, between frames.
#[derive(Debug)]
pub struct ProximityEvaluator {
    cutoff_sq: f32,
    coarse_cutoff_sq: f32,
    rows: Vec<Vec<usize>>,
}

impl ProximityEvaluator {
    pub fn new(entity_count: usize, cutoff: f32, coarse_cutoff: f32) -> Self {
        Self {
            cutoff_sq: cutoff * cutoff,
            coarse_cutoff_sq: coarse_cutoff * coarse_cutoff,
            rows: vec![Vec::new(); entity_count],
        }
    }

    /// Rebuilds the adjacency rows for the current frame on `pool`.
    ///
    /// Entity centers must already be up to date. Pairs whose centers are
    /// farther apart than the coarse cutoff are rejected without looking at
    /// their particles.
    pub fn evaluate(
        &mut self,
        pool: &ThreadPool,
        entities: &EntityModel,
        positions: &[Vec3],
        periodic_box: Option<&SimBox>,
    ) {
        let cutoff_sq = self.cutoff_sq;
        let coarse_cutoff_sq = self.coarse_cutoff_sq;
        let centers = entities.centers();
        let blocks = entities.blocks();
        let n = centers.len();

        // Row i is written by exactly one task; everything else is read-only.
        pool.install(|| {
            self.rows[..n].par_iter_mut().enumerate().for_each(|(i, row)| {
                row.clear();
                for j in (i + 1)..n {
                    let d2 = displacement(centers[i], centers[j], periodic_box).length_squared();
                    if d2 > coarse_cutoff_sq {
                        continue;
                    }
                    if blocks_in_contact(&blocks[i], &blocks[j], positions, cutoff_sq, periodic_box) {
                        row.push(j);
                    }
                }
            });
        });
        // par_iter completes only after every row is written.
    }

    /// `adjacency()[i]` lists, in ascending order, every `j > i` in contact with `i`.
    pub fn adjacency(&self) -> &[Vec<usize>] {
        &self.rows
    }

    /// Number of adjacent pairs found in the last frame.
    pub fn pair_count(&self) -> usize {
        self.rows.iter().map(Vec::len).sum()
    }
}

#[cfg(test)]
impl ProximityEvaluator {
    pub fn is_adjacent(&self, i: usize, j: usize) -> bool {
        let (lo, hi) = if i < j { (i, j) } else { (j, i) };
        self.rows[lo].binary_search(&hi).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(threads: usize) -> ThreadPool {
        rayon::ThreadPoolBuilder::new().num_threads(threads).build().unwrap()
    }

    fn line(xs: &[f32]) -> Vec<Vec3> {
        xs.iter().map(|&x| Vec3::new(x, 0.0, 0.0)).collect()
    }

    fn evaluate(
        entities: &mut EntityModel,
        positions: &[Vec3],
        cutoff: f32,
        coarse: f32,
        periodic_box: Option<&SimBox>,
    ) -> ProximityEvaluator {
        entities.update_centers(positions).unwrap();
        let mut evaluator = ProximityEvaluator::new(entities.len(), cutoff, coarse);
        evaluator.evaluate(&pool(2), entities, positions, periodic_box);
        evaluator
    }

    #[test]
    fn single_particles_within_cutoff_are_adjacent() {
        let positions = line(&[0.0, 0.3, 1.0, 1.2]);
        let mut entities = EntityModel::from_indices(&[0, 1, 2, 3]).unwrap();
        let evaluator = evaluate(&mut entities, &positions, 0.35, 2.0, None);
        assert!(evaluator.is_adjacent(0, 1));
        assert!(evaluator.is_adjacent(3, 2));
        assert!(!evaluator.is_adjacent(1, 2));
        assert_eq!(evaluator.pair_count(), 2);
    }

    #[test]
    fn distance_equal_to_cutoff_is_not_a_contact() {
        let positions = line(&[0.0, 0.5]);
        let mut entities = EntityModel::from_indices(&[0, 1]).unwrap();
        let evaluator = evaluate(&mut entities, &positions, 0.5, 2.0, None);
        assert_eq!(evaluator.pair_count(), 0);
    }

    #[test]
    fn periodic_images_are_in_contact() {
        let positions = line(&[0.1, 9.9]);
        let sim_box = SimBox::rectangular(10.0, 10.0, 10.0);
        let mut entities = EntityModel::from_indices(&[0, 1]).unwrap();
        let with_pbc = evaluate(&mut entities, &positions, 0.35, 2.0, Some(&sim_box));
        assert!(with_pbc.is_adjacent(0, 1));
        let without_pbc = evaluate(&mut entities, &positions, 0.35, 2.0, None);
        assert!(!without_pbc.is_adjacent(0, 1));
    }

    #[test]
    fn molecule_contact_uses_particle_distances() {
        // Centers 1.0 apart, closest particles 0.2 apart.
        let positions = line(&[-0.4, 0.4, 0.6, 1.4]);
        let mut entities = EntityModel::from_blocks(vec![0..2, 2..4]).unwrap();
        let evaluator = evaluate(&mut entities, &positions, 0.35, 2.0, None);
        assert!(evaluator.is_adjacent(0, 1));
    }

    #[test]
    fn coarse_cutoff_rejects_before_particle_test() {
        let positions = line(&[-0.4, 0.4, 0.6, 1.4]);
        let mut entities = EntityModel::from_blocks(vec![0..2, 2..4]).unwrap();
        let evaluator = evaluate(&mut entities, &positions, 0.35, 0.9, None);
        assert_eq!(evaluator.pair_count(), 0);
    }

    #[test]
    fn rows_are_reset_between_frames() {
        let mut entities = EntityModel::from_indices(&[0, 1]).unwrap();
        let near = line(&[0.0, 0.1]);
        let far = line(&[0.0, 5.0]);
        let pool = pool(1);
        let mut evaluator = ProximityEvaluator::new(2, 0.35, 2.0);
        entities.update_centers(&near).unwrap();
        evaluator.evaluate(&pool, &entities, &near, None);
        assert_eq!(evaluator.pair_count(), 1);
        entities.update_centers(&far).unwrap();
        evaluator.evaluate(&pool, &entities, &far, None);
        assert_eq!(evaluator.pair_count(), 0);
    }
}
