use serde::{Deserialize, Serialize};
use crate::vecmath::Vec3;

/// Simulation box given by its three box vectors, GROMACS convention:
/// `a` along x, `b` in the xy plane, `c` free (lower-triangular matrix).
/// A zero diagonal element switches periodicity off along that axis.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimBox {
    pub vectors: [Vec3; 3],
}

impl SimBox {
    /// Rectangular box with edge lengths `x`, `y`, `z`.
    pub fn rectangular(x: f32, y: f32, z: f32) -> Self {
        SimBox {
            vectors: [
                Vec3::new(x, 0.0, 0.0),
                Vec3::new(0.0, y, 0.0),
                Vec3::new(0.0, 0.0, z),
            ],
        }
    }

    /// True if at least one axis is periodic.
    pub fn is_periodic(&self) -> bool {
        (0..3).any(|dim| self.vectors[dim].component(dim) > 0.0)
    }

    /// Applies the minimum-image convention to the displacement `d`.
    ///
    /// Shifts are removed from z down to x so that off-diagonal components of
    /// triclinic boxes are taken into account. Exact for rectangular boxes.
    #[inline]
    pub fn minimum_image(&self, mut d: Vec3) -> Vec3 {
        for dim in (0..3).rev() {
            let v = self.vectors[dim];
            let len = v.component(dim);
            if len > 0.0 {
                let shift = (d.component(dim) / len).round();
                if shift != 0.0 {
                    d = d - v * shift;
                }
            }
        }
        d
    }
}

/// One frame of a trajectory as supplied by the trajectory reader.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FrameSnapshot {
    /// Simulation time (ps) if the trajectory stores it.
    #[serde(default)]
    pub time: Option<f64>,
    /// Integration step if the trajectory stores it.
    #[serde(default)]
    pub step: Option<i64>,
    #[serde(default, rename = "box")]
    pub sim_box: Option<SimBox>,
    pub positions: Vec<Vec3>,
    #[serde(default)]
    pub velocities: Option<Vec<Vec3>>,
}

impl FrameSnapshot {
    pub fn particle_count(&self) -> usize {
        self.positions.len()
    }
}
