use nalgebra::{Const, Dyn};
use numpy::{PyReadonlyArray1, PyReadwriteArray1};
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use std::collections::HashMap;
use std::str::FromStr;

pub mod dislo_plasticity;
pub mod error;
pub mod interfaces;
pub mod slip;
pub mod slip_update;
pub mod stress_strain;

use dislo_plasticity::DisloCrystalPlasticity;
use error::Error;
use interfaces::{ConstitutiveModel, Q, QDim, QValueInput, QValueOutput};

pyo3::create_exception!(
    dislofe,
    ExcessiveSlipError,
    pyo3::exceptions::PyRuntimeError,
    "A slip increment exceeded the configured tolerance; the driver should \
     cut back the time step and retry."
);

fn to_py_err(err: Error) -> PyErr {
    match err {
        Error::ExcessiveSlipIncrement { .. } => ExcessiveSlipError::new_err(err.to_string()),
        _ => PyValueError::new_err(err.to_string()),
    }
}

fn parse_quantity(name: &str) -> PyResult<Q> {
    Q::from_str(name).map_err(|_| PyValueError::new_err(format!("unknown quantity '{name}'")))
}

fn build_input<'a, 'py>(
    arrays: &'a HashMap<String, PyReadonlyArray1<'py, f64>>,
) -> PyResult<QValueInput<'a>> {
    let mut input = QValueInput::new();
    for (name, array) in arrays {
        let view = array
            .try_as_matrix::<Dyn, Const<1>, Const<1>, Dyn>()
            .ok_or_else(|| {
                PyValueError::new_err(format!("array for '{name}' is not contiguous"))
            })?;
        input.add(parse_quantity(name)?, view);
    }
    Ok(input)
}

fn build_output<'a, 'py>(
    arrays: &'a HashMap<String, PyReadwriteArray1<'py, f64>>,
) -> PyResult<QValueOutput<'a>> {
    let mut output = QValueOutput::new();
    for (name, array) in arrays {
        let view = array
            .try_as_matrix_mut::<Dyn, Const<1>, Const<1>, Dyn>()
            .ok_or_else(|| {
                PyValueError::new_err(format!("array for '{name}' is not contiguous"))
            })?;
        output.add(parse_quantity(name)?, view);
    }
    Ok(output)
}

fn dims_by_name(map: HashMap<Q, QDim>) -> HashMap<&'static str, usize> {
    map.into_iter()
        .map(|(q, dim)| (q.into(), dim.size()))
        .collect()
}

/// Wrapper struct for DisloCrystalPlasticity in python. Quantities are
/// passed as dicts of flat float64 arrays keyed by quantity name, one chunk
/// per quadrature point.
#[pyclass]
struct PyDisloCrystalPlasticity {
    model: DisloCrystalPlasticity,
}

#[pymethods]
impl PyDisloCrystalPlasticity {
    #[new]
    fn new(parameters: HashMap<String, f64>) -> PyResult<Self> {
        let model = DisloCrystalPlasticity::new(&parameters)
            .ok_or_else(|| PyValueError::new_err("invalid parameters"))?;
        Ok(Self { model })
    }

    fn evaluate<'py>(
        &self,
        del_t: f64,
        input: HashMap<String, PyReadonlyArray1<'py, f64>>,
        output: HashMap<String, PyReadwriteArray1<'py, f64>>,
    ) -> PyResult<()> {
        let qinput = build_input(&input)?;
        let mut qoutput = build_output(&output)?;
        self.model
            .evaluate(del_t, &qinput, &mut qoutput)
            .map_err(to_py_err)
    }

    fn evaluate_some<'py>(
        &self,
        del_t: f64,
        input: HashMap<String, PyReadonlyArray1<'py, f64>>,
        output: HashMap<String, PyReadwriteArray1<'py, f64>>,
        ips: Vec<usize>,
    ) -> PyResult<()> {
        let qinput = build_input(&input)?;
        let mut qoutput = build_output(&output)?;
        self.model
            .evaluate_some(del_t, &qinput, &mut qoutput, &ips)
            .map_err(to_py_err)
    }

    fn parameters(&self) -> HashMap<String, f64> {
        self.model.parameters()
    }

    fn n_slip_systems(&self) -> usize {
        self.model.n_slip_systems()
    }

    fn define_input(&self) -> HashMap<&'static str, usize> {
        dims_by_name(self.model.define_input())
    }

    fn define_history(&self) -> HashMap<&'static str, usize> {
        dims_by_name(self.model.define_history())
    }

    fn define_output(&self) -> HashMap<&'static str, usize> {
        dims_by_name(self.model.define_output())
    }
}

/// A Python module implemented in Rust.
#[pymodule]
fn dislofe(py: Python, m: &PyModule) -> PyResult<()> {
    m.add_class::<PyDisloCrystalPlasticity>()?;
    m.add("ExcessiveSlipError", py.get_type::<ExcessiveSlipError>())?;
    Ok(())
}
