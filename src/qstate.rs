use std::fmt::Display;
use std::str::FromStr;

use nalgebra::{DVector, Matrix2};
use num_complex::Complex;
use rand::Rng;

use crate::circuit::MAX_QUBITS;
use crate::error::{QuboxError, Result};
use crate::gates::GateMatrix;
use crate::Qbit;

/// Amplitudes below this magnitude are treated as zero in display views.
pub const AMPLITUDE_EPSILON: f64 = 1e-12;

/// Largest deviation of the total probability from 1 tolerated by `measure`.
pub const NORM_TOLERANCE: f64 = 1e-6;

/// Outcome of a single-qubit measurement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    pub bit: bool,
    /// Probability of the drawn outcome before collapse.
    pub probability: f64,
}

/// Expectation values of X, Y and Z on one qubit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlochVector {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl BlochVector {
    /// 1 for a pure single-qubit state, smaller when entangled with the rest.
    pub fn length(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }
}

/// State vector over N qubits. Bit i of a basis index is the value of qubit i.
#[derive(Debug, Clone, PartialEq)]
pub struct QState {
    pub(crate) state: DVector<Qbit>,
}

impl QState {
    pub fn new(state: &[Qbit]) -> Result<Self> {
        let len = state.len();
        if len == 0 || (len & (len - 1)) != 0 {
            return Err(QuboxError::InvalidStateVector { len });
        }

        let state = DVector::from_row_slice(state);
        Ok(Self { state })
    }

    pub fn zero_state(num_of_qbits: usize) -> Result<Self> {
        let mut qstate = Self {
            state: DVector::zeros(0),
        };
        qstate.reset(num_of_qbits)?;
        Ok(qstate)
    }

    /// Reallocate only when the width changes, then set |0…0>.
    pub fn reset(&mut self, num_of_qbits: usize) -> Result<()> {
        if num_of_qbits > MAX_QUBITS {
            return Err(QuboxError::InvalidQubitCount {
                requested: num_of_qbits,
                max: MAX_QUBITS,
            });
        }
        let size = 1_usize << num_of_qbits;
        if self.state.len() == size {
            self.state.fill(Complex::ZERO);
        } else {
            self.state = DVector::zeros(size);
        }
        self.state[0] = Complex::ONE;
        Ok(())
    }

    pub fn num_of_qbits(&self) -> usize {
        self.state.len().ilog2() as usize
    }

    pub fn amplitudes(&self) -> &[Qbit] {
        self.state.as_slice()
    }

    pub fn norm_sqr(&self) -> f64 {
        self.state.iter().map(|a| a.norm_sqr()).sum()
    }

    /// Rescale to unit norm. A zero vector is left untouched.
    pub fn normalize(&mut self) {
        let norm = self.norm_sqr().sqrt();
        if norm > 0.0 {
            self.state.unscale_mut(norm);
        }
    }

    fn check_qubit(&self, qubit: usize) -> Result<()> {
        if qubit >= self.num_of_qbits() {
            return Err(QuboxError::placement(
                "qubits",
                format!(
                    "qubit index {} out of range for {} qubit(s)",
                    qubit,
                    self.num_of_qbits()
                ),
            ));
        }
        Ok(())
    }

    /// Apply a k-qubit matrix to the listed qubits without building the 2^N operator.
    ///
    /// Basis indices are grouped by the bits outside `qubits`; every group is a
    /// 2^k sub-vector that is multiplied by `matrix` in place. The first listed
    /// qubit is the most significant bit of the matrix index.
    pub fn apply_gate(&mut self, matrix: &GateMatrix, qubits: &[usize]) -> Result<()> {
        let dim = 1_usize << qubits.len();
        if matrix.nrows() != dim || matrix.ncols() != dim {
            return Err(QuboxError::placement(
                "matrix",
                format!(
                    "{}x{} matrix cannot act on {} qubit(s)",
                    matrix.nrows(),
                    matrix.ncols(),
                    qubits.len()
                ),
            ));
        }
        for (i, &q) in qubits.iter().enumerate() {
            self.check_qubit(q)?;
            if qubits[..i].contains(&q) {
                return Err(QuboxError::placement(
                    "qubits",
                    format!("qubit {q} listed more than once"),
                ));
            }
        }

        let k = qubits.len();
        let mask = qubits.iter().fold(0, |mask, &q| mask | (1 << q));
        let offsets = (0..dim)
            .map(|local| {
                qubits
                    .iter()
                    .enumerate()
                    .filter(|(j, _)| (local >> (k - 1 - j)) & 1 == 1)
                    .fold(0, |offset, (_, &q)| offset | (1 << q))
            })
            .collect::<Vec<usize>>();

        let mut group = vec![Complex::ZERO; dim];
        for base in (0..self.state.len()).filter(|base| base & mask == 0) {
            for (slot, &offset) in group.iter_mut().zip(&offsets) {
                *slot = self.state[base | offset];
            }
            for (row, &offset) in offsets.iter().enumerate() {
                self.state[base | offset] = group
                    .iter()
                    .enumerate()
                    .map(|(col, amp)| matrix[(row, col)] * amp)
                    .sum();
            }
        }

        Ok(())
    }

    /// Probability that `qubit` reads 0.
    pub fn probability_of_zero(&self, qubit: usize) -> Result<f64> {
        self.check_qubit(qubit)?;
        Ok(self
            .state
            .iter()
            .enumerate()
            .filter(|(i, _)| i & (1 << qubit) == 0)
            .map(|(_, a)| a.norm_sqr())
            .sum())
    }

    /// Measure one qubit, collapsing the state onto the drawn outcome.
    pub fn measure<R: Rng + ?Sized>(&mut self, qubit: usize, rng: &mut R) -> Result<Measurement> {
        let p0 = self.probability_of_zero(qubit)?;
        let total = self.norm_sqr();
        if (total - 1.0).abs() > NORM_TOLERANCE {
            return Err(QuboxError::DegenerateMeasurement { probability: total });
        }
        let p1 = (total - p0).max(0.0);

        let bit = rng.random::<f64>() * total >= p0;
        let probability = if bit { p1 } else { p0 };
        if probability <= 0.0 {
            return Err(QuboxError::DegenerateMeasurement { probability });
        }

        self.collapse(qubit, bit, probability);
        Ok(Measurement { bit, probability })
    }

    fn collapse(&mut self, qubit: usize, bit: bool, probability: f64) {
        let scale = probability.sqrt();
        for (i, amp) in self.state.iter_mut().enumerate() {
            if ((i >> qubit) & 1 == 1) == bit {
                *amp /= scale;
            } else {
                *amp = Complex::ZERO;
            }
        }
    }

    /// (basis index, probability) for every basis state, in index order.
    pub fn probabilities(&self) -> Vec<(usize, f64)> {
        self.state
            .iter()
            .enumerate()
            .map(|(i, a)| (i, a.norm_sqr()))
            .collect()
    }

    /// Basis label (qubit 0 rightmost) to probability, omitting zero entries.
    pub fn probability_distribution(&self) -> Vec<(String, f64)> {
        let width = self.num_of_qbits();
        self.probabilities()
            .into_iter()
            .filter(|(_, p)| p.sqrt() >= AMPLITUDE_EPSILON)
            .map(|(i, p)| (format!("{:0width$b}", i, width = width), p))
            .collect()
    }

    /// Reduced density matrix of `qubit`, tracing out every other qubit.
    pub fn reduced_density_matrix(&self, qubit: usize) -> Result<Matrix2<Qbit>> {
        self.check_qubit(qubit)?;
        let bit = 1 << qubit;

        let mut rho: Matrix2<Qbit> = Matrix2::zeros();
        for (i, a0) in self.state.iter().enumerate().filter(|(i, _)| i & bit == 0) {
            let a1 = self.state[i | bit];
            rho[(0, 0)] += a0 * a0.conj();
            rho[(0, 1)] += a0 * a1.conj();
            rho[(1, 1)] += a1 * a1.conj();
        }
        rho[(1, 0)] = rho[(0, 1)].conj();
        Ok(rho)
    }

    pub fn reduced_bloch(&self, qubit: usize) -> Result<BlochVector> {
        let rho = self.reduced_density_matrix(qubit)?;
        Ok(BlochVector {
            x: 2.0 * rho[(0, 1)].re,
            y: 2.0 * rho[(1, 0)].im,
            z: (rho[(0, 0)] - rho[(1, 1)]).re,
        })
    }

    /// Dirac notation such as `0.7071|00> + 0.7071|11>`.
    pub fn to_ket_string(&self) -> String {
        let width = self.num_of_qbits();
        let terms = self
            .state
            .iter()
            .enumerate()
            .filter(|(_, a)| a.norm() >= AMPLITUDE_EPSILON)
            .map(|(i, a)| {
                let coef = if a.im.abs() < AMPLITUDE_EPSILON {
                    format!("{:.4}", a.re)
                } else if a.re.abs() < AMPLITUDE_EPSILON {
                    format!("{:.4}i", a.im)
                } else if a.im > 0.0 {
                    format!("({:.4} + {:.4}i)", a.re, a.im)
                } else {
                    format!("({:.4} - {:.4}i)", a.re, -a.im)
                };
                format!("{}|{:0width$b}>", coef, i, width = width)
            })
            .collect::<Vec<_>>();

        if terms.is_empty() {
            "0".to_string()
        } else {
            terms.join(" + ")
        }
    }
}

impl FromStr for QState {
    type Err = QuboxError;

    /// Basis state from a bit string, qubit 0 rightmost.
    fn from_str(qbits: &str) -> Result<Self> {
        if qbits.len() > MAX_QUBITS {
            return Err(QuboxError::InvalidQubitCount {
                requested: qbits.len(),
                max: MAX_QUBITS,
            });
        }
        let index = usize::from_str_radix(qbits, 2)
            .map_err(|_| QuboxError::InvalidStateVector { len: qbits.len() })?;
        let mut state = DVector::zeros(1_usize << qbits.len());
        state[index] = Complex::ONE;

        Ok(Self { state })
    }
}

impl Display for QState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let bin_width = self.num_of_qbits();

        for (i, value) in self.state.iter().enumerate() {
            writeln!(f, "|{:0width$b}>: {}", i, value, width = bin_width)?;
        }

        Ok(())
    }
}
