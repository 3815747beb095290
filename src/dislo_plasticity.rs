use crate::error::{Error, Result};
use crate::interfaces::{ConstitutiveModel, Q, QDim, QValueInput, QValueOutput};
use crate::slip::SlipSystemSet;
use crate::slip_update::{PointInput, SlipState, SlipUpdate};
use crate::stress_strain::{mandel_to_tensor, tensor_to_mandel};
use nalgebra::{Matrix3, SMatrix};
use std::collections::HashMap;

/// The CRSS supplied in the input refers to room temperature. This is a
/// physical convention, intentionally independent of the configurable
/// `reference_temperature` used for the thermal eigenstrain.
const CRSS_REFERENCE_TEMPERATURE: f64 = 293.0;

const DEFAULT_TEMPERATURE: f64 = 293.0;

#[derive(Debug)]
pub struct DisloParameters {
    pub thermal_expansion: f64,
    pub reference_temperature: f64,
    pub dcrss_dt_a: f64,
    pub dcrss_dt_b: f64,
    pub dcrss_dt_c: f64,
    pub dislo_mobility: f64,
    pub burgers_vector_mag: f64,
    pub slip_incr_tol: f64,
}

impl DisloParameters {
    fn from_map(parameters: &HashMap<String, f64>) -> Self {
        Self {
            thermal_expansion: *parameters.get("thermal_expansion").unwrap_or(&0.0),
            reference_temperature: *parameters.get("reference_temperature").unwrap_or(&293.0),
            dcrss_dt_a: *parameters.get("dCRSS_dT_A").unwrap_or(&1.0),
            dcrss_dt_b: *parameters.get("dCRSS_dT_B").unwrap_or(&0.0),
            dcrss_dt_c: *parameters.get("dCRSS_dT_C").unwrap_or(&0.0),
            dislo_mobility: *parameters.get("dislo_mobility").unwrap_or(&0.0),
            burgers_vector_mag: *parameters.get("burgers_vector_mag").unwrap_or(&0.0),
            slip_incr_tol: *parameters.get("slip_incr_tol").unwrap_or(&2.0e-2),
        }
    }
}

/// Dislocation-density-based crystal plasticity with thermal eigenstrain,
/// temperature-dependent CRSS and a stress-dependent dislocation velocity.
///
/// One residual evaluation per call; the outer Newton solve owns the trial
/// stress and convergence control.
#[derive(Debug)]
pub struct DisloCrystalPlasticity {
    parameters: DisloParameters,
    slip_systems: SlipSystemSet,
}

impl DisloCrystalPlasticity {
    pub fn with_slip_systems(
        parameters: &HashMap<String, f64>,
        slip_systems: SlipSystemSet,
    ) -> Self {
        Self {
            parameters: DisloParameters::from_map(parameters),
            slip_systems,
        }
    }

    pub fn n_slip_systems(&self) -> usize {
        self.slip_systems.len()
    }

    /// One quadrature point with caller-owned working buffers, so the
    /// evaluation loops allocate once instead of once per point.
    fn evaluate_ip_with(
        &self,
        ip: usize,
        del_t: f64,
        input: &QValueInput,
        output: &mut QValueOutput,
        state: &mut SlipState,
        zero_rho: &[f64],
    ) -> Result<()> {
        let n = self.slip_systems.len();

        let def_grad = input.get_tensor::<{ Q::DeformationGradient.dim() }, {
            Q::DeformationGradient.size()
        }>(Q::DeformationGradient, ip)?;
        let fp_old_inv = input.get_tensor::<{ Q::PlasticDefGradInverse.dim() }, {
            Q::PlasticDefGradInverse.size()
        }>(Q::PlasticDefGradInverse, ip)?;
        let trial_pk2 = mandel_to_tensor(
            input.get_vector::<{ Q::MandelStress.size() }>(Q::MandelStress, ip)?,
        );
        let stiffness = SMatrix::<f64, 6, 6>::from_row_slice(input.get_slice(
            Q::MandelTangent,
            ip,
            Q::MandelTangent.size(),
        )?);
        let rotation = if input.is_some(Q::CrystalRotation) {
            input.get_tensor::<{ Q::CrystalRotation.dim() }, { Q::CrystalRotation.size() }>(
                Q::CrystalRotation,
                ip,
            )?
        } else {
            Matrix3::identity()
        };
        let temperature = input.get_scalar_or(Q::Temperature, ip, DEFAULT_TEMPERATURE);
        let crss = input.get_slice(Q::Crss, ip, n)?;

        // densities default to zero when the transport solver is not coupled
        let rho_edge_pos = if input.is_some(Q::RhoEdgePos) {
            input.get_slice(Q::RhoEdgePos, ip, n)?
        } else {
            zero_rho
        };
        let rho_edge_neg = if input.is_some(Q::RhoEdgeNeg) {
            input.get_slice(Q::RhoEdgeNeg, ip, n)?
        } else {
            zero_rho
        };

        let point = PointInput {
            def_grad,
            fp_old_inv,
            trial_pk2,
            stiffness,
            rotation,
            temperature,
            del_t,
            crss,
            rho_edge_pos,
            rho_edge_neg,
        };
        let result = self.compute_residual(&point, state);

        // The velocity and its derivative are consumed by the transport
        // solver and must be present even when the slip safeguard trips;
        // the projector-stage errors happen before they are computed.
        if matches!(&result, Ok(_) | Err(Error::ExcessiveSlipIncrement { .. })) {
            output.set_slice(Q::DisloVelocity, ip, &state.velocity)?;
            output.set_slice(Q::DDisloVelocityDTau, ip, &state.dvelocity_dtau)?;
        }
        let point_output = result?;

        output.set_slice(Q::SlipIncrOut, ip, &state.slip_incr)?;
        output.set_tensor::<{ Q::PlasticDefGradInverse.dim() }, {
            Q::PlasticDefGradInverse.size()
        }>(Q::PlasticDefGradInverse, ip, &point_output.fp_inv)?;
        output.set_vector::<{ Q::MandelResidual.size() }>(
            Q::MandelResidual,
            ip,
            tensor_to_mandel(point_output.residual),
        )?;
        output.set_slice(
            Q::SlipDirection,
            ip,
            &self.slip_systems.rotated_directions(&rotation),
        )?;
        Ok(())
    }
}

impl SlipUpdate for DisloCrystalPlasticity {
    fn slip_systems(&self) -> &SlipSystemSet {
        &self.slip_systems
    }

    fn thermal_expansion(&self) -> f64 {
        self.parameters.thermal_expansion
    }

    fn reference_temperature(&self) -> f64 {
        self.parameters.reference_temperature
    }

    /// Critical resolved shear stress decreases exponentially with
    /// temperature: (A + B exp(-C (T - 293.0))) * crss.
    fn update_strength(&self, temperature: f64, crss: &[f64], strength: &mut [f64]) {
        let factor = self.parameters.dcrss_dt_a
            + self.parameters.dcrss_dt_b
                * (-self.parameters.dcrss_dt_c * (temperature - CRSS_REFERENCE_TEMPERATURE)).exp();
        for (s, c) in strength.iter_mut().zip(crss) {
            *s = factor * c;
        }
    }

    /// Thresholded linear law: zero below the adjusted strength, linear in
    /// the stress excess above it. The derivative is always non-negative.
    fn dislocation_velocity(&self, state: &mut SlipState) {
        let mobility = self.parameters.dislo_mobility;
        for i in 0..state.len() {
            let tau = state.tau[i];
            if tau.abs() > state.strength[i] {
                state.velocity[i] = mobility * (tau.abs() - state.strength[i]) * 1.0f64.copysign(tau);
                state.dvelocity_dtau[i] = mobility;
            } else {
                state.velocity[i] = 0.0;
                state.dvelocity_dtau[i] = 0.0;
            }
        }
    }

    fn slip_increments(&self, input: &PointInput, state: &mut SlipState) -> Result<()> {
        let b = self.parameters.burgers_vector_mag;
        let tol = self.parameters.slip_incr_tol;
        for i in 0..state.len() {
            // Positive and negative edge dislocations give the same
            // contribution to the plastic shearing rate even if their
            // velocities are opposite, so the densities add.
            let rho = input.rho_edge_pos[i] + input.rho_edge_neg[i];
            let incr =
                rho * state.velocity[i] * b * 1.0f64.copysign(state.tau[i]) * input.del_t;
            if incr.abs() > tol {
                log::warn!(
                    "maximum allowable slip increment exceeded: {:e} on slip system {}",
                    incr.abs(),
                    i
                );
                return Err(Error::ExcessiveSlipIncrement {
                    system: i,
                    value: incr,
                    tol,
                });
            }
            state.slip_incr[i] = incr;
            state.dslip_incr_dtau[i] = rho * state.dvelocity_dtau[i] * b * input.del_t;
        }
        Ok(())
    }
}

impl ConstitutiveModel for DisloCrystalPlasticity {
    fn new(parameters: &HashMap<String, f64>) -> Option<Self> {
        Some(Self::with_slip_systems(
            parameters,
            SlipSystemSet::fcc_octahedral(),
        ))
    }

    fn evaluate_ip(
        &self,
        ip: usize,
        del_t: f64,
        input: &QValueInput,
        output: &mut QValueOutput,
    ) -> Result<()> {
        let n = self.slip_systems.len();
        let mut state = SlipState::new(n);
        let zero_rho = vec![0.0; n];
        self.evaluate_ip_with(ip, del_t, input, output, &mut state, &zero_rho)
    }

    // The working buffers are shared across points; every consumed entry is
    // rewritten before it is read, so no reset between points is needed.
    fn evaluate(&self, del_t: f64, input: &QValueInput, output: &mut QValueOutput) -> Result<()> {
        let n_ip = self.n_quadrature_points(input, output)?;
        let n = self.slip_systems.len();
        let mut state = SlipState::new(n);
        let zero_rho = vec![0.0; n];
        for ip in 0..n_ip {
            self.evaluate_ip_with(ip, del_t, input, output, &mut state, &zero_rho)?;
        }
        Ok(())
    }

    fn evaluate_some(
        &self,
        del_t: f64,
        input: &QValueInput,
        output: &mut QValueOutput,
        ips: &[usize],
    ) -> Result<()> {
        let n = self.slip_systems.len();
        let mut state = SlipState::new(n);
        let zero_rho = vec![0.0; n];
        for ip in ips {
            self.evaluate_ip_with(*ip, del_t, input, output, &mut state, &zero_rho)?;
        }
        Ok(())
    }

    fn define_input(&self) -> HashMap<Q, QDim> {
        let n = self.slip_systems.len();
        HashMap::from([
            (Q::DeformationGradient, QDim::SquareTensor(3)),
            (Q::MandelStress, QDim::Vector(6)),
            (Q::MandelTangent, QDim::Vector(36)),
            (Q::CrystalRotation, QDim::SquareTensor(3)),
            (Q::Temperature, QDim::Scalar),
            (Q::RhoEdgePos, QDim::Vector(n)),
            (Q::RhoEdgeNeg, QDim::Vector(n)),
            (Q::Crss, QDim::Vector(n)),
        ])
    }

    fn define_history(&self) -> HashMap<Q, QDim> {
        HashMap::from([(Q::PlasticDefGradInverse, QDim::SquareTensor(3))])
    }

    fn define_output(&self) -> HashMap<Q, QDim> {
        let n = self.slip_systems.len();
        HashMap::from([
            (Q::MandelResidual, QDim::Vector(6)),
            (Q::SlipIncrOut, QDim::Vector(n)),
            (Q::DisloVelocity, QDim::Vector(n)),
            (Q::DDisloVelocityDTau, QDim::Vector(n)),
            (Q::SlipDirection, QDim::Vector(3 * n)),
        ])
    }

    fn parameters(&self) -> HashMap<String, f64> {
        HashMap::from([
            ("thermal_expansion".to_string(), self.parameters.thermal_expansion),
            (
                "reference_temperature".to_string(),
                self.parameters.reference_temperature,
            ),
            ("dCRSS_dT_A".to_string(), self.parameters.dcrss_dt_a),
            ("dCRSS_dT_B".to_string(), self.parameters.dcrss_dt_b),
            ("dCRSS_dT_C".to_string(), self.parameters.dcrss_dt_c),
            ("dislo_mobility".to_string(), self.parameters.dislo_mobility),
            (
                "burgers_vector_mag".to_string(),
                self.parameters.burgers_vector_mag,
            ),
            ("slip_incr_tol".to_string(), self.parameters.slip_incr_tol),
        ])
    }
}
