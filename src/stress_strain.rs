use nalgebra::{Matrix3, SMatrix, SVector};

pub fn tensor_to_mandel(tensor: SMatrix<f64, 3, 3>) -> SVector<f64, 6> {
    const SQRT: f64 = 1.4142135623730951;
    SVector::<f64, 6>::new(
        tensor.m11,
        tensor.m22,
        tensor.m33,
        SQRT * tensor.m23,
        SQRT * tensor.m13,
        SQRT * tensor.m12,
    )
}

pub fn mandel_to_tensor(mandel: SVector<f64, 6>) -> SMatrix<f64, 3, 3> {
    const FACTOR: f64 = 0.7071067811865475;
    SMatrix::<f64, 3, 3>::new(
        mandel.x,
        FACTOR * mandel.b,
        FACTOR * mandel.a,
        FACTOR * mandel.b,
        mandel.y,
        FACTOR * mandel.w,
        FACTOR * mandel.a,
        FACTOR * mandel.w,
        mandel.z,
    )
}

/// Elastic Green-Lagrange strain E = (Fe^T Fe - I) / 2.
pub fn green_strain(fe: &Matrix3<f64>) -> Matrix3<f64> {
    0.5 * (fe.transpose() * fe - Matrix3::identity())
}
