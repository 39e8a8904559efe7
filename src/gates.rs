use std::f64::consts::{FRAC_1_SQRT_2, FRAC_PI_2, FRAC_PI_4};

use nalgebra::DMatrix;
use num_complex::Complex;

use crate::Qbit;

/// Dense gate matrix over the qubits a gate acts on.
///
/// For a k-qubit gate the first listed qubit is the most significant bit of
/// the row/column index.
pub type GateMatrix = DMatrix<Qbit>;

// Basis permutations: column i is sent to row TABLE[i].
const CX_TABLE: [usize; 4] = [0, 1, 3, 2];
const SWAP_TABLE: [usize; 4] = [0, 2, 1, 3];
const CCX_TABLE: [usize; 8] = [0, 1, 2, 3, 4, 5, 7, 6];

fn single(m00: Qbit, m01: Qbit, m10: Qbit, m11: Qbit) -> GateMatrix {
    DMatrix::from_row_slice(2, 2, &[m00, m01, m10, m11])
}

fn permutation_matrix(table: &[usize]) -> GateMatrix {
    let mut matrix = DMatrix::zeros(table.len(), table.len());
    for (col, &row) in table.iter().enumerate() {
        matrix[(row, col)] = Complex::ONE;
    }
    matrix
}

pub fn h_matrix() -> GateMatrix {
    let v = Complex::new(FRAC_1_SQRT_2, 0.0);
    single(v, v, v, -v)
}

pub fn x_matrix() -> GateMatrix {
    single(Complex::ZERO, Complex::ONE, Complex::ONE, Complex::ZERO)
}

pub fn y_matrix() -> GateMatrix {
    single(
        Complex::ZERO,
        Complex::new(0.0, -1.0),
        Complex::new(0.0, 1.0),
        Complex::ZERO,
    )
}

pub fn z_matrix() -> GateMatrix {
    single(
        Complex::ONE,
        Complex::ZERO,
        Complex::ZERO,
        Complex::new(-1.0, 0.0),
    )
}

/// P(φ) = diag(1, e^{iφ})
pub fn phase_matrix(phi: f64) -> GateMatrix {
    single(
        Complex::ONE,
        Complex::ZERO,
        Complex::ZERO,
        Complex::from_polar(1.0, phi),
    )
}

pub fn s_matrix() -> GateMatrix {
    phase_matrix(FRAC_PI_2)
}

pub fn t_matrix() -> GateMatrix {
    phase_matrix(FRAC_PI_4)
}

/// Rx(θ) = cos(θ/2)·I − i·sin(θ/2)·X
pub fn rx_matrix(theta: f64) -> GateMatrix {
    let (s, c) = (theta / 2.0).sin_cos();
    single(
        Complex::new(c, 0.0),
        Complex::new(0.0, -s),
        Complex::new(0.0, -s),
        Complex::new(c, 0.0),
    )
}

/// Ry(θ) = cos(θ/2)·I − i·sin(θ/2)·Y
pub fn ry_matrix(theta: f64) -> GateMatrix {
    let (s, c) = (theta / 2.0).sin_cos();
    single(
        Complex::new(c, 0.0),
        Complex::new(-s, 0.0),
        Complex::new(s, 0.0),
        Complex::new(c, 0.0),
    )
}

/// Rz(θ) = cos(θ/2)·I − i·sin(θ/2)·Z
pub fn rz_matrix(theta: f64) -> GateMatrix {
    single(
        Complex::from_polar(1.0, -theta / 2.0),
        Complex::ZERO,
        Complex::ZERO,
        Complex::from_polar(1.0, theta / 2.0),
    )
}

/// CNOT over (control, target).
pub fn cx_matrix() -> GateMatrix {
    permutation_matrix(&CX_TABLE)
}

pub fn swap_matrix() -> GateMatrix {
    permutation_matrix(&SWAP_TABLE)
}

/// Toffoli over (control1, control2, target).
pub fn ccx_matrix() -> GateMatrix {
    permutation_matrix(&CCX_TABLE)
}
