//! A small quantum circuit simulator.
//!
//! Circuits are built from a fixed gate library, replayed against a dense
//! state vector and exchanged as a subset of OpenQASM 2.0.
//!
//! ```
//! use qubox::{Circuit, Simulator};
//!
//! let circuit = Circuit::new(2)?.h(0)?.cnot(0, 1)?;
//! let result = Simulator::seeded(7).run(&circuit)?;
//! assert!((result.probabilities()[0b11].1 - 0.5).abs() < 1e-9);
//! # Ok::<(), qubox::QuboxError>(())
//! ```

pub mod circuit;
pub mod classical;
pub mod error;
pub mod gates;
pub mod instruction;
pub mod qasm;
pub mod qstate;
pub mod simulator;
#[doc(hidden)]
pub mod test_util;

use num_complex::Complex;

/// A single complex amplitude.
pub type Qbit = Complex<f64>;

pub use circuit::{Circuit, Placement, MAX_CLBITS, MAX_QUBITS};
pub use classical::ClassicalRegisters;
pub use error::{QuboxError, Result};
pub use instruction::{ClassicalBit, Condition, CustomGate, Gate, GateKind, InitialState};
pub use qasm::{decode, encode};
pub use qstate::{BlochVector, Measurement, QState};
pub use simulator::{RunStatus, Simulation, SimulationResult, Simulator, StepOutcome};
