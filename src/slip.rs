use crate::error::{Error, Result};
use nalgebra::{Matrix3, Vector3};

/// One crystallographic slip system: unit slip direction, unit plane normal
/// and the Schmid tensor `d ⊗ n`, all in the crystal lattice frame.
#[derive(Debug, Clone)]
pub struct SlipSystem {
    direction: Vector3<f64>,
    normal: Vector3<f64>,
    schmid: Matrix3<f64>,
}

impl SlipSystem {
    pub fn new(normal: [f64; 3], direction: [f64; 3]) -> Result<Self> {
        let n = Vector3::from(normal);
        let d = Vector3::from(direction);
        if n.norm() < 1e-12 || d.norm() < 1e-12 {
            return Err(Error::InvalidSlipSystem(
                "plane normal and slip direction must be nonzero".to_string(),
            ));
        }
        let n = n.normalize();
        let d = d.normalize();
        if d.dot(&n).abs() > 1e-10 {
            return Err(Error::InvalidSlipSystem(format!(
                "slip direction {:?} does not lie in the plane with normal {:?}",
                direction, normal
            )));
        }
        Ok(Self {
            schmid: d * n.transpose(),
            direction: d,
            normal: n,
        })
    }

    pub fn direction(&self) -> &Vector3<f64> {
        &self.direction
    }

    pub fn normal(&self) -> &Vector3<f64> {
        &self.normal
    }

    pub fn schmid(&self) -> &Matrix3<f64> {
        &self.schmid
    }
}

/// Immutable, simulation-wide set of slip systems. The number of systems is
/// fixed at construction and indexes every per-slip-system array.
#[derive(Debug, Clone)]
pub struct SlipSystemSet {
    systems: Vec<SlipSystem>,
}

/// {111}<110> octahedral slip, as (plane normal, slip direction) pairs.
const FCC_OCTAHEDRAL: [([f64; 3], [f64; 3]); 12] = [
    ([1.0, 1.0, 1.0], [0.0, 1.0, -1.0]),
    ([1.0, 1.0, 1.0], [1.0, 0.0, -1.0]),
    ([1.0, 1.0, 1.0], [1.0, -1.0, 0.0]),
    ([-1.0, 1.0, 1.0], [1.0, 0.0, 1.0]),
    ([-1.0, 1.0, 1.0], [1.0, 1.0, 0.0]),
    ([-1.0, 1.0, 1.0], [0.0, 1.0, -1.0]),
    ([1.0, -1.0, 1.0], [0.0, 1.0, 1.0]),
    ([1.0, -1.0, 1.0], [1.0, 1.0, 0.0]),
    ([1.0, -1.0, 1.0], [1.0, 0.0, -1.0]),
    ([1.0, 1.0, -1.0], [0.0, 1.0, 1.0]),
    ([1.0, 1.0, -1.0], [1.0, 0.0, 1.0]),
    ([1.0, 1.0, -1.0], [1.0, -1.0, 0.0]),
];

impl SlipSystemSet {
    pub fn new(entries: &[([f64; 3], [f64; 3])]) -> Result<Self> {
        let systems = entries
            .iter()
            .map(|(normal, direction)| SlipSystem::new(*normal, *direction))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { systems })
    }

    /// The 12 octahedral slip systems of an FCC crystal.
    pub fn fcc_octahedral() -> Self {
        Self::new(&FCC_OCTAHEDRAL).expect("FCC octahedral table is valid")
    }

    pub fn len(&self) -> usize {
        self.systems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.systems.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SlipSystem> {
        self.systems.iter()
    }

    pub fn system(&self, i: usize) -> &SlipSystem {
        &self.systems[i]
    }

    /// Slip directions rotated to the sample frame, flattened as
    /// `[d1x, d1y, d1z, d2x, ...]` for the dislocation transport solver.
    pub fn rotated_directions(&self, rotation: &Matrix3<f64>) -> Vec<f64> {
        let mut flat = Vec::with_capacity(3 * self.systems.len());
        for system in &self.systems {
            let rotated = rotation * system.direction;
            flat.extend_from_slice(rotated.as_slice());
        }
        flat
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn fcc_octahedral_has_12_orthonormal_systems() {
        let set = SlipSystemSet::fcc_octahedral();
        assert_eq!(set.len(), 12);
        for system in set.iter() {
            assert_relative_eq!(system.direction().norm(), 1.0, epsilon = 1e-14);
            assert_relative_eq!(system.normal().norm(), 1.0, epsilon = 1e-14);
            assert_relative_eq!(system.direction().dot(system.normal()), 0.0, epsilon = 1e-14);
            // d orthogonal to n makes the Schmid tensor traceless
            assert_relative_eq!(system.schmid().trace(), 0.0, epsilon = 1e-14);
        }
    }

    #[test]
    fn rejects_direction_outside_plane() {
        assert!(SlipSystem::new([1.0, 1.0, 1.0], [1.0, 1.0, 1.0]).is_err());
        assert!(SlipSystem::new([0.0, 0.0, 0.0], [1.0, 0.0, 0.0]).is_err());
    }

    #[test]
    fn rotated_directions_identity() {
        let set = SlipSystemSet::new(&[([0.0, 1.0, 0.0], [1.0, 0.0, 0.0])]).unwrap();
        let flat = set.rotated_directions(&Matrix3::identity());
        assert_eq!(flat, vec![1.0, 0.0, 0.0]);
    }

    #[test]
    fn rotated_directions_90_deg_about_z() {
        let set = SlipSystemSet::new(&[([0.0, 1.0, 0.0], [1.0, 0.0, 0.0])]).unwrap();
        let rot = Matrix3::new(0.0, -1.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0);
        let flat = set.rotated_directions(&rot);
        assert_relative_eq!(flat[0], 0.0, epsilon = 1e-15);
        assert_relative_eq!(flat[1], 1.0, epsilon = 1e-15);
        assert_relative_eq!(flat[2], 0.0, epsilon = 1e-15);
    }
}
