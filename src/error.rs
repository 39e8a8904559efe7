//! Error types for circuit construction, QASM decoding and simulation.

use thiserror::Error;

/// Errors produced by the simulator core.
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum QuboxError {
    /// A gate could not be placed: bad arity, qubit range, duplicate qubits or parameters.
    #[error("Invalid gate placement ({field}): {reason}")]
    InvalidGatePlacement {
        /// The offending field of the gate descriptor.
        field: &'static str,
        reason: String,
    },

    /// QASM text could not be decoded.
    #[error("Malformed QASM at line {line} `{text}`: {reason}")]
    MalformedQasm {
        /// 1-based line number.
        line: usize,
        /// Raw text of the offending line.
        text: String,
        reason: String,
    },

    /// A conditional gate read a classical bit that has not been measured yet.
    #[error("Classical register entry {register}[{index}] read before it was written")]
    UnresolvedClassicalReference { register: String, index: usize },

    /// The state was not normalized when a measurement was attempted.
    #[error("Cannot measure: state vector has total probability {probability}")]
    DegenerateMeasurement { probability: f64 },

    /// A whole-register comparison read a register whose value does not fit a `u64`.
    #[error("Classical register {register} of {size} bits does not fit in 64 bits")]
    RegisterOverflow { register: String, size: usize },

    #[error("Qubit count must be between 1 and {max}, got {requested}")]
    InvalidQubitCount { requested: usize, max: usize },

    #[error("State vector length must be a non-zero power of 2, got {len}")]
    InvalidStateVector { len: usize },

    /// The run has already halted and its state is frozen.
    #[error("Simulation halted; start a new run")]
    SimulationHalted,
}

impl QuboxError {
    pub(crate) fn placement(field: &'static str, reason: impl Into<String>) -> Self {
        QuboxError::InvalidGatePlacement {
            field,
            reason: reason.into(),
        }
    }
}

/// Result type for simulator operations.
pub type Result<T> = std::result::Result<T, QuboxError>;
