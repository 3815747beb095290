use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the constitutive update.
///
/// `ExcessiveSlipIncrement` is the recoverable case: the caller is expected
/// to cut back the time step and re-invoke. Everything else indicates a
/// degenerate state or a misuse of the quadrature interface.
#[derive(Error, Debug)]
pub enum Error {
    /// A slip increment exceeded the configured tolerance. No residual was
    /// produced for this call.
    #[error("slip increment {value:e} on slip system {system} exceeds tolerance {tol:e}")]
    ExcessiveSlipIncrement { system: usize, value: f64, tol: f64 },

    /// det(Fe) was not strictly positive during stress projection.
    #[error("singular elastic deformation gradient: det(Fe) = {det:e}")]
    SingularElasticDeformation { det: f64 },

    /// A required quantity was not present in the input or output views.
    #[error("quantity '{0}' was not provided")]
    MissingQuantity(&'static str),

    /// A quantity array length does not match the number of quadrature
    /// points implied by the other arrays.
    #[error("array for '{quantity}' has {found} entries, expected {expected}")]
    InconsistentArrayLength {
        quantity: &'static str,
        expected: usize,
        found: usize,
    },

    /// A slip system definition is degenerate (zero vector or direction not
    /// orthogonal to the plane normal).
    #[error("invalid slip system: {0}")]
    InvalidSlipSystem(String),
}
