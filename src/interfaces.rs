use crate::error::{Error, Result};
use nalgebra::{DVectorView, DVectorViewMut, SMatrix, SVector};
use std::collections::HashMap;
use strum::EnumCount;
use strum_macros::{EnumCount as EnumCountMacro, EnumString, IntoStaticStr};

/// Physical quantities that can appear in the quadrature input/output
/// arrays. The string representation is the name used at the Python
/// boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumCountMacro, EnumString, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum Q {
    DeformationGradient,
    /// Trial second Piola-Kirchhoff stress in Mandel notation.
    MandelStress,
    /// Elastic stiffness as a Mandel 6x6 matrix, row-major.
    MandelTangent,
    /// Inverse of the plastic deformation gradient. Committed value on the
    /// input side, current-iteration candidate on the output side.
    PlasticDefGradInverse,
    CrystalRotation,
    Temperature,
    /// Positive edge dislocation densities, one entry per slip system.
    RhoEdgePos,
    /// Negative edge dislocation densities, one entry per slip system.
    RhoEdgeNeg,
    /// Committed critical resolved shear stress per slip system.
    Crss,
    /// Stress residual driven to zero by the outer Newton solve.
    MandelResidual,
    /// Rotated slip directions, three components per slip system.
    SlipDirection,
    SlipIncrOut,
    DisloVelocity,
    #[strum(serialize = "ddislo_velocity_dtau")]
    DDisloVelocityDTau,
}

impl Q {
    /// Spatial dimension: 3 for rank-2 tensor quantities, 1 otherwise.
    pub const fn dim(self) -> usize {
        match self {
            Q::DeformationGradient | Q::PlasticDefGradInverse | Q::CrystalRotation => 3,
            _ => 1,
        }
    }

    /// Entries per quadrature point. Per-slip-system quantities have a
    /// model-dependent size and return 0 here; their actual size comes from
    /// the model's `define_*` maps.
    pub const fn size(self) -> usize {
        match self {
            Q::DeformationGradient | Q::PlasticDefGradInverse | Q::CrystalRotation => 9,
            Q::MandelStress | Q::MandelResidual => 6,
            Q::MandelTangent => 36,
            Q::Temperature => 1,
            _ => 0,
        }
    }
}

/// Dimension of a quantity as seen by the model that defines it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QDim {
    Scalar,
    Vector(usize),
    SquareTensor(usize),
}

impl QDim {
    pub const fn size(self) -> usize {
        match self {
            QDim::Scalar => 1,
            QDim::Vector(n) => n,
            QDim::SquareTensor(d) => d * d,
        }
    }
}

/// Read-only views on the flat quadrature arrays, one slot per quantity.
/// Each array stores its per-point chunks contiguously, tensors row-major.
pub struct QValueInput<'a> {
    data: Vec<Option<DVectorView<'a, f64>>>,
}

impl<'a> QValueInput<'a> {
    pub fn new() -> Self {
        Self {
            data: (0..Q::COUNT).map(|_| None).collect(),
        }
    }

    pub fn add(&mut self, q: Q, view: DVectorView<'a, f64>) {
        self.data[q as usize] = Some(view);
    }

    pub fn is_some(&self, q: Q) -> bool {
        self.data[q as usize].is_some()
    }

    pub fn len(&self, q: Q) -> Option<usize> {
        self.data[q as usize].as_ref().map(|v| v.nrows())
    }

    fn view(&self, q: Q) -> Result<&DVectorView<'a, f64>> {
        self.data[q as usize]
            .as_ref()
            .ok_or(Error::MissingQuantity(q.into()))
    }

    pub fn get_scalar(&self, q: Q, ip: usize) -> Result<f64> {
        Ok(self.view(q)?[ip])
    }

    /// Scalar value with a fallback for quantities the caller did not couple.
    pub fn get_scalar_or(&self, q: Q, ip: usize, default: f64) -> f64 {
        match self.data[q as usize].as_ref() {
            Some(v) => v[ip],
            None => default,
        }
    }

    pub fn get_vector<const SIZE: usize>(&self, q: Q, ip: usize) -> Result<SVector<f64, SIZE>> {
        Ok(self.view(q)?.fixed_view::<SIZE, 1>(ip * SIZE, 0).into_owned())
    }

    pub fn get_tensor<const D: usize, const SIZE: usize>(
        &self,
        q: Q,
        ip: usize,
    ) -> Result<SMatrix<f64, D, D>> {
        let v = self.view(q)?;
        Ok(SMatrix::<f64, D, D>::from_row_slice(
            v.fixed_view::<SIZE, 1>(ip * SIZE, 0).as_slice(),
        ))
    }

    /// Per-point chunk of a runtime-sized quantity (the per-slip arrays).
    pub fn get_slice(&self, q: Q, ip: usize, size: usize) -> Result<&[f64]> {
        let v = self.view(q)?;
        Ok(&v.as_slice()[ip * size..(ip + 1) * size])
    }
}

/// Mutable views on the flat quadrature output arrays.
pub struct QValueOutput<'a> {
    data: Vec<Option<DVectorViewMut<'a, f64>>>,
}

impl<'a> QValueOutput<'a> {
    pub fn new() -> Self {
        Self {
            data: (0..Q::COUNT).map(|_| None).collect(),
        }
    }

    pub fn add(&mut self, q: Q, view: DVectorViewMut<'a, f64>) {
        self.data[q as usize] = Some(view);
    }

    pub fn is_some(&self, q: Q) -> bool {
        self.data[q as usize].is_some()
    }

    pub fn len(&self, q: Q) -> Option<usize> {
        self.data[q as usize].as_ref().map(|v| v.nrows())
    }

    fn view_mut(&mut self, q: Q) -> Result<&mut DVectorViewMut<'a, f64>> {
        self.data[q as usize]
            .as_mut()
            .ok_or(Error::MissingQuantity(q.into()))
    }

    pub fn set_scalar(&mut self, q: Q, ip: usize, value: f64) -> Result<()> {
        self.view_mut(q)?[ip] = value;
        Ok(())
    }

    pub fn set_vector<const SIZE: usize>(
        &mut self,
        q: Q,
        ip: usize,
        value: SVector<f64, SIZE>,
    ) -> Result<()> {
        self.view_mut(q)?
            .fixed_view_mut::<SIZE, 1>(ip * SIZE, 0)
            .copy_from(&value);
        Ok(())
    }

    /// Writes a rank-2 tensor row-major, matching `QValueInput::get_tensor`.
    pub fn set_tensor<const D: usize, const SIZE: usize>(
        &mut self,
        q: Q,
        ip: usize,
        value: &SMatrix<f64, D, D>,
    ) -> Result<()> {
        let transposed = value.transpose();
        self.view_mut(q)?
            .fixed_view_mut::<SIZE, 1>(ip * SIZE, 0)
            .copy_from_slice(transposed.as_slice());
        Ok(())
    }

    pub fn set_slice(&mut self, q: Q, ip: usize, values: &[f64]) -> Result<()> {
        let size = values.len();
        let v = self.view_mut(q)?;
        v.as_mut_slice()[ip * size..(ip + 1) * size].copy_from_slice(values);
        Ok(())
    }
}

pub trait ConstitutiveModel: Sized {
    fn new(parameters: &HashMap<String, f64>) -> Option<Self>;

    /// Evaluates the model at one quadrature point. An `Err` means no
    /// residual was produced and nothing past the failing stage was written.
    fn evaluate_ip(
        &self,
        ip: usize,
        del_t: f64,
        input: &QValueInput,
        output: &mut QValueOutput,
    ) -> Result<()>;

    fn evaluate(&self, del_t: f64, input: &QValueInput, output: &mut QValueOutput) -> Result<()> {
        let n = self.n_quadrature_points(input, output)?;
        for ip in 0..n {
            self.evaluate_ip(ip, del_t, input, output)?;
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
        for ip in ips {
            self.evaluate_ip(*ip, del_t, input, output)?;
        }
        Ok(())
    }

    /// Number of quadrature points implied by the provided arrays. Every
    /// provided array must agree; quantities with defaults may be absent.
    fn n_quadrature_points(&self, input: &QValueInput, output: &QValueOutput) -> Result<usize> {
        let mut n: Option<usize> = None;
        let mut check = |q: Q, dim: QDim, len: Option<usize>| -> Result<()> {
            let Some(len) = len else { return Ok(()) };
            let size = dim.size();
            if len % size != 0 {
                return Err(Error::InconsistentArrayLength {
                    quantity: q.into(),
                    expected: size,
                    found: len,
                });
            }
            let points = len / size;
            match n {
                Some(m) if m != points => Err(Error::InconsistentArrayLength {
                    quantity: q.into(),
                    expected: m * size,
                    found: len,
                }),
                _ => {
                    n = Some(points);
                    Ok(())
                }
            }
        };
        for (q, dim) in self.define_input() {
            check(q, dim, input.len(q))?;
        }
        for (q, dim) in self.define_history() {
            check(q, dim, input.len(q))?;
            check(q, dim, output.len(q))?;
        }
        for (q, dim) in self.define_output() {
            check(q, dim, output.len(q))?;
        }
        for (q, dim) in self.define_optional_output() {
            check(q, dim, output.len(q))?;
        }
        for (q, dim) in self.define_optional_history() {
            check(q, dim, input.len(q))?;
            check(q, dim, output.len(q))?;
        }
        n.ok_or(Error::MissingQuantity(Q::DeformationGradient.into()))
    }

    /// Physical quantities that are required as input for the constitutive
    /// model together with their dimensions.
    fn define_input(&self) -> HashMap<Q, QDim>;

    /// Physical quantities that are needed as internal variables for the
    /// constitutive model together with their dimensions. These variables
    /// are stored both in the input and the output.
    fn define_history(&self) -> HashMap<Q, QDim>;

    /// Physical quantities that are needed as output, but are not needed in
    /// order to calculate the constitutive model.
    fn define_output(&self) -> HashMap<Q, QDim>;

    /// Physical quantities that are optional output of the constitutive
    /// model, useful for postprocessing or coupled solvers.
    fn define_optional_output(&self) -> HashMap<Q, QDim> {
        HashMap::new()
    }

    fn define_optional_history(&self) -> HashMap<Q, QDim> {
        HashMap::new()
    }

    fn parameters(&self) -> HashMap<String, f64>;
}

#[cfg(test)]
mod test {
    use super::*;
    use nalgebra::{DVector, Matrix3};

    #[test]
    fn quantity_names_round_trip() {
        use std::str::FromStr;
        assert_eq!(Q::from_str("rho_edge_pos").unwrap(), Q::RhoEdgePos);
        assert_eq!(
            Q::from_str("ddislo_velocity_dtau").unwrap(),
            Q::DDisloVelocityDTau
        );
        let name: &'static str = Q::SlipIncrOut.into();
        assert_eq!(name, "slip_incr_out");
        assert!(Q::from_str("not_a_quantity").is_err());
    }

    #[test]
    fn tensor_accessors_are_row_major() {
        let raw = DVector::from_iterator(18, (0..18).map(|i| i as f64));
        let mut input = QValueInput::new();
        input.add(Q::DeformationGradient, raw.rows(0, 18));

        let t = input.get_tensor::<3, 9>(Q::DeformationGradient, 1).unwrap();
        assert_eq!(t[(0, 0)], 9.0);
        assert_eq!(t[(0, 1)], 10.0);
        assert_eq!(t[(1, 0)], 12.0);

        let mut out_raw = DVector::zeros(18);
        {
            let mut output = QValueOutput::new();
            output.add(Q::PlasticDefGradInverse, out_raw.rows_mut(0, 18));
            output
                .set_tensor::<3, 9>(Q::PlasticDefGradInverse, 1, &t)
                .unwrap();
        }
        assert_eq!(&out_raw.as_slice()[9..18], &raw.as_slice()[9..18]);

        let id = Matrix3::identity();
        let mut output = QValueOutput::new();
        output.add(Q::PlasticDefGradInverse, out_raw.rows_mut(0, 18));
        output
            .set_tensor::<3, 9>(Q::PlasticDefGradInverse, 0, &id)
            .unwrap();
        assert_eq!(out_raw[0], 1.0);
        assert_eq!(out_raw[1], 0.0);
        assert_eq!(out_raw[4], 1.0);
    }

    #[test]
    fn missing_quantity_is_reported() {
        let input = QValueInput::new();
        assert!(matches!(
            input.get_scalar(Q::Temperature, 0),
            Err(Error::MissingQuantity("temperature"))
        ));
        assert_eq!(input.get_scalar_or(Q::Temperature, 0, 293.0), 293.0);
    }
}
