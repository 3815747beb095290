use crate::error::{Error, Result};
use crate::slip::SlipSystemSet;
use crate::stress_strain::{green_strain, mandel_to_tensor, tensor_to_mandel};
use nalgebra::{Matrix3, SMatrix};

/// det(Fe) below this is treated as a degenerate elastic deformation.
pub const DET_FE_TOL: f64 = 1e-12;

/// Per-point working arrays for one residual evaluation, one entry per slip
/// system. Passed explicitly through the stages so data flow and ownership
/// stay visible; nothing here survives the call.
#[derive(Debug, Clone)]
pub struct SlipState {
    pub tau: Vec<f64>,
    pub strength: Vec<f64>,
    pub velocity: Vec<f64>,
    pub dvelocity_dtau: Vec<f64>,
    pub slip_incr: Vec<f64>,
    pub dslip_incr_dtau: Vec<f64>,
}

impl SlipState {
    pub fn new(n: usize) -> Self {
        Self {
            tau: vec![0.0; n],
            strength: vec![0.0; n],
            velocity: vec![0.0; n],
            dvelocity_dtau: vec![0.0; n],
            slip_incr: vec![0.0; n],
            dslip_incr_dtau: vec![0.0; n],
        }
    }

    pub fn len(&self) -> usize {
        self.tau.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tau.is_empty()
    }
}

/// External values for one integration point and one Newton iteration.
/// Tensors are in the sample frame, the stiffness is a Mandel 6x6 matrix.
pub struct PointInput<'a> {
    pub def_grad: Matrix3<f64>,
    /// Committed previous-step inverse of the plastic deformation gradient.
    pub fp_old_inv: Matrix3<f64>,
    pub trial_pk2: Matrix3<f64>,
    pub stiffness: SMatrix<f64, 6, 6>,
    pub rotation: Matrix3<f64>,
    pub temperature: f64,
    pub del_t: f64,
    pub crss: &'a [f64],
    pub rho_edge_pos: &'a [f64],
    pub rho_edge_neg: &'a [f64],
}

#[derive(Debug)]
pub struct PointOutput {
    /// Trial stress minus the stiffness-consistent stress; the outer Newton
    /// solve drives this to zero.
    pub residual: Matrix3<f64>,
    /// Candidate plastic deformation gradient inverse, committed by the
    /// caller on convergence.
    pub fp_inv: Matrix3<f64>,
}

/// Finite-strain slip update with backward-Euler integration of the plastic
/// deformation gradient. A constitutive model supplies the strength,
/// velocity and slip-increment hooks; the projection and residual assembly
/// are shared.
pub trait SlipUpdate {
    fn slip_systems(&self) -> &SlipSystemSet;

    fn thermal_expansion(&self) -> f64;

    fn reference_temperature(&self) -> f64;

    /// Temperature-adjusted strength per slip system from the committed CRSS.
    fn update_strength(&self, temperature: f64, crss: &[f64], strength: &mut [f64]);

    /// Slip-system dislocation velocity and its derivative with respect to
    /// the resolved shear stress, from `state.tau` and `state.strength`.
    fn dislocation_velocity(&self, state: &mut SlipState);

    /// Plastic slip increment per slip system and its stress-derivative.
    /// Errs with `ExcessiveSlipIncrement` when the safeguard trips.
    fn slip_increments(&self, input: &PointInput, state: &mut SlipState) -> Result<()>;

    /// One residual evaluation: projector, strength update, velocity, slip
    /// kinetics, backward-Euler plastic update and residual assembly. On the
    /// safeguard abort nothing past the kinetics stage is computed.
    fn compute_residual(&self, input: &PointInput, state: &mut SlipState) -> Result<PointOutput> {
        let systems = self.slip_systems();
        let n = systems.len();
        assert_eq!(state.len(), n);
        assert_eq!(input.crss.len(), n);
        assert_eq!(input.rho_edge_pos.len(), n);
        assert_eq!(input.rho_edge_neg.len(), n);

        // Schmid tensors in the sample frame
        let rotation_t = input.rotation.transpose();
        let schmid: Vec<Matrix3<f64>> = systems
            .iter()
            .map(|s| input.rotation * s.schmid() * rotation_t)
            .collect();

        let fe = input.def_grad * input.fp_old_inv;
        let det = fe.determinant();
        if !(det > DET_FE_TOL) {
            return Err(Error::SingularElasticDeformation { det });
        }
        let ce_pk2 = (fe.transpose() * fe) * input.trial_pk2 / det;
        for i in 0..n {
            state.tau[i] = ce_pk2.dot(&schmid[i]);
        }

        self.update_strength(input.temperature, input.crss, &mut state.strength);

        self.dislocation_velocity(state);

        self.slip_increments(input, state)?;

        let mut eqv_slip_incr = Matrix3::identity();
        for i in 0..n {
            eqv_slip_incr -= schmid[i] * state.slip_incr[i];
        }
        let fp_inv = input.fp_old_inv * eqv_slip_incr;
        let fe = input.def_grad * fp_inv;
        let ee = green_strain(&fe);
        let eigenstrain = thermal_eigenstrain(
            self.thermal_expansion(),
            input.temperature,
            self.reference_temperature(),
        );
        let pk2_model = input.stiffness * tensor_to_mandel(ee - eigenstrain);
        let residual = input.trial_pk2 - mandel_to_tensor(pk2_model);

        Ok(PointOutput { residual, fp_inv })
    }
}

/// Isotropic stress-free strain from thermal expansion,
/// (exp(2/3 alpha (T - T_ref)) - 1) / 2 * I.
pub fn thermal_eigenstrain(alpha: f64, temperature: f64, reference: f64) -> Matrix3<f64> {
    0.5 * (((2.0 / 3.0) * alpha * (temperature - reference)).exp() - 1.0) * Matrix3::identity()
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_relative_eq;

    /// Hook impl with no plastic flow, to exercise the shared projector and
    /// assembler in isolation.
    struct NoFlow {
        systems: SlipSystemSet,
    }

    impl SlipUpdate for NoFlow {
        fn slip_systems(&self) -> &SlipSystemSet {
            &self.systems
        }
        fn thermal_expansion(&self) -> f64 {
            0.0
        }
        fn reference_temperature(&self) -> f64 {
            293.0
        }
        fn update_strength(&self, _temperature: f64, crss: &[f64], strength: &mut [f64]) {
            strength.copy_from_slice(crss);
        }
        fn dislocation_velocity(&self, state: &mut SlipState) {
            state.velocity.fill(0.0);
            state.dvelocity_dtau.fill(0.0);
        }
        fn slip_increments(&self, _input: &PointInput, state: &mut SlipState) -> Result<()> {
            state.slip_incr.fill(0.0);
            state.dslip_incr_dtau.fill(0.0);
            Ok(())
        }
    }

    fn no_flow() -> NoFlow {
        NoFlow {
            systems: SlipSystemSet::new(&[([0.0, 1.0, 0.0], [1.0, 0.0, 0.0])]).unwrap(),
        }
    }

    fn stretch(s: f64) -> Matrix3<f64> {
        let mut f = Matrix3::identity();
        f[(0, 0)] = s;
        f
    }

    #[test]
    fn eigenstrain_zero_at_reference_temperature() {
        let eig = thermal_eigenstrain(1e-4, 293.0, 293.0);
        assert_relative_eq!(eig, Matrix3::zeros(), epsilon = 1e-16);
        let eig = thermal_eigenstrain(123.0, 600.0, 600.0);
        assert_relative_eq!(eig, Matrix3::zeros(), epsilon = 1e-16);
    }

    #[test]
    fn eigenstrain_is_isotropic_and_monotonic() {
        let warm = thermal_eigenstrain(1e-5, 400.0, 293.0);
        assert!(warm[(0, 0)] > 0.0);
        assert_relative_eq!(warm[(0, 0)], warm[(1, 1)], epsilon = 1e-16);
        assert_relative_eq!(warm[(0, 1)], 0.0, epsilon = 1e-16);
        let cold = thermal_eigenstrain(1e-5, 200.0, 293.0);
        assert!(cold[(0, 0)] < 0.0);
    }

    #[test]
    fn residual_zero_at_equilibrium() {
        let model = no_flow();
        let stiffness = SMatrix::<f64, 6, 6>::identity() * 210e3;
        let def_grad = stretch(1.01);
        let ee = green_strain(&def_grad);
        let trial_pk2 = mandel_to_tensor(stiffness * tensor_to_mandel(ee));

        let input = PointInput {
            def_grad,
            fp_old_inv: Matrix3::identity(),
            trial_pk2,
            stiffness,
            rotation: Matrix3::identity(),
            temperature: 293.0,
            del_t: 1.0,
            crss: &[1.0],
            rho_edge_pos: &[0.0],
            rho_edge_neg: &[0.0],
        };
        let mut state = SlipState::new(1);
        let out = model.compute_residual(&input, &mut state).unwrap();
        assert_relative_eq!(out.residual, Matrix3::zeros(), epsilon = 1e-10);
        assert_relative_eq!(out.fp_inv, Matrix3::identity(), epsilon = 1e-14);
    }

    #[test]
    fn projector_resolves_shear_onto_slip_system() {
        // Pure shear tau_xy on the (y-plane, x-direction) system, F = I:
        // C S / det = S, and (d x n) : S picks out the xy component.
        let model = no_flow();
        let mut trial_pk2 = Matrix3::zeros();
        trial_pk2[(0, 1)] = 10.0;
        trial_pk2[(1, 0)] = 10.0;

        let input = PointInput {
            def_grad: Matrix3::identity(),
            fp_old_inv: Matrix3::identity(),
            trial_pk2,
            stiffness: SMatrix::<f64, 6, 6>::identity(),
            rotation: Matrix3::identity(),
            temperature: 293.0,
            del_t: 1.0,
            crss: &[1.0],
            rho_edge_pos: &[0.0],
            rho_edge_neg: &[0.0],
        };
        let mut state = SlipState::new(1);
        model.compute_residual(&input, &mut state).unwrap();
        assert_relative_eq!(state.tau[0], 10.0, epsilon = 1e-12);
    }

    #[test]
    fn singular_elastic_deformation_is_an_error() {
        let model = no_flow();
        let input = PointInput {
            def_grad: Matrix3::zeros(),
            fp_old_inv: Matrix3::identity(),
            trial_pk2: Matrix3::zeros(),
            stiffness: SMatrix::<f64, 6, 6>::identity(),
            rotation: Matrix3::identity(),
            temperature: 293.0,
            del_t: 1.0,
            crss: &[1.0],
            rho_edge_pos: &[0.0],
            rho_edge_neg: &[0.0],
        };
        let mut state = SlipState::new(1);
        let err = model.compute_residual(&input, &mut state).unwrap_err();
        assert!(matches!(err, Error::SingularElasticDeformation { .. }));
    }
}
