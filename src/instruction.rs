//! Gate descriptors: what a circuit placement does, independent of when.

use std::fmt::{self, Display};
use std::str::FromStr;

use crate::error::{QuboxError, Result};
use crate::gates::{
    ccx_matrix, cx_matrix, h_matrix, phase_matrix, rx_matrix, ry_matrix, rz_matrix, s_matrix,
    swap_matrix, t_matrix, x_matrix, y_matrix, z_matrix, GateMatrix,
};
use crate::qasm;

/// Classical register written by measurements that do not name one.
pub const DEFAULT_CREG: &str = "c";

/// Payload-free gate tag, used for placement requests and the QASM keyword table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GateKind {
    H,
    X,
    Y,
    Z,
    S,
    T,
    Rx,
    Ry,
    Rz,
    P,
    CNot,
    Toffoli,
    Swap,
    Measure,
    Reset,
}

impl GateKind {
    pub const ALL: [GateKind; 15] = [
        GateKind::H,
        GateKind::X,
        GateKind::Y,
        GateKind::Z,
        GateKind::S,
        GateKind::T,
        GateKind::Rx,
        GateKind::Ry,
        GateKind::Rz,
        GateKind::P,
        GateKind::CNot,
        GateKind::Toffoli,
        GateKind::Swap,
        GateKind::Measure,
        GateKind::Reset,
    ];

    /// QASM instruction keyword.
    pub fn keyword(self) -> &'static str {
        match self {
            GateKind::H => "h",
            GateKind::X => "x",
            GateKind::Y => "y",
            GateKind::Z => "z",
            GateKind::S => "s",
            GateKind::T => "t",
            GateKind::Rx => "rx",
            GateKind::Ry => "ry",
            GateKind::Rz => "rz",
            GateKind::P => "p",
            GateKind::CNot => "cx",
            GateKind::Toffoli => "ccx",
            GateKind::Swap => "swap",
            GateKind::Measure => "measure",
            GateKind::Reset => "reset",
        }
    }

    pub fn from_keyword(keyword: &str) -> Option<Self> {
        GateKind::ALL.into_iter().find(|kind| kind.keyword() == keyword)
    }

    pub fn num_qubits(self) -> usize {
        match self {
            GateKind::CNot | GateKind::Swap => 2,
            GateKind::Toffoli => 3,
            _ => 1,
        }
    }

    /// Number of real angle parameters the gate carries.
    pub fn num_params(self) -> usize {
        match self {
            GateKind::Rx | GateKind::Ry | GateKind::Rz | GateKind::P => 1,
            _ => 0,
        }
    }

    pub fn is_unitary(self) -> bool {
        !matches!(self, GateKind::Measure | GateKind::Reset)
    }
}

impl Display for GateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// One bit of a named classical register.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassicalBit {
    pub register: String,
    pub index: usize,
}

impl ClassicalBit {
    pub fn new(register: impl Into<String>, index: usize) -> Self {
        Self {
            register: register.into(),
            index,
        }
    }
}

impl Display for ClassicalBit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.register, self.index)
    }
}

/// Classical condition guarding a gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    /// A single measured bit equals `value`.
    Bit { bit: ClassicalBit, value: bool },
    /// The whole register, read with bit 0 as least significant, equals `value`.
    Register { register: String, value: u64 },
}

impl Condition {
    pub fn bit(bit: ClassicalBit, value: bool) -> Self {
        Condition::Bit { bit, value }
    }

    pub fn register(register: impl Into<String>, value: u64) -> Self {
        Condition::Register {
            register: register.into(),
            value,
        }
    }

    pub fn register_name(&self) -> &str {
        match self {
            Condition::Bit { bit, .. } => &bit.register,
            Condition::Register { register, .. } => register,
        }
    }
}

impl Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Bit { bit, value } => write!(f, "{}=={}", bit, u8::from(*value)),
            Condition::Register { register, value } => write!(f, "{register}=={value}"),
        }
    }
}

/// A gate together with the qubits (and angle) it acts on.
#[derive(Debug, Clone, PartialEq)]
pub enum Gate {
    H(usize),
    X(usize),
    Y(usize),
    Z(usize),
    S(usize),
    T(usize),
    Rx { target: usize, theta: f64 },
    Ry { target: usize, theta: f64 },
    Rz { target: usize, theta: f64 },
    P { target: usize, phi: f64 },
    CNot { control: usize, target: usize },
    Toffoli { controls: [usize; 2], target: usize },
    Swap(usize, usize),
    Measure { target: usize, clbit: ClassicalBit },
    Reset(usize),
}

impl Gate {
    /// Build a descriptor from a kind, its qubits (controls first) and its angles.
    ///
    /// Measurements built here write to `c[target]`; use [`Gate::measure_into`]
    /// to name another destination.
    pub fn new(kind: GateKind, qubits: &[usize], params: &[f64]) -> Result<Self> {
        if qubits.len() != kind.num_qubits() {
            return Err(QuboxError::placement(
                "qubits",
                format!(
                    "'{}' acts on {} qubit(s), got {}",
                    kind,
                    kind.num_qubits(),
                    qubits.len()
                ),
            ));
        }
        if params.len() != kind.num_params() {
            return Err(QuboxError::placement(
                "params",
                format!(
                    "'{}' takes {} parameter(s), got {}",
                    kind,
                    kind.num_params(),
                    params.len()
                ),
            ));
        }

        let q = qubits;
        let gate = match kind {
            GateKind::H => Gate::H(q[0]),
            GateKind::X => Gate::X(q[0]),
            GateKind::Y => Gate::Y(q[0]),
            GateKind::Z => Gate::Z(q[0]),
            GateKind::S => Gate::S(q[0]),
            GateKind::T => Gate::T(q[0]),
            GateKind::Rx => Gate::Rx {
                target: q[0],
                theta: params[0],
            },
            GateKind::Ry => Gate::Ry {
                target: q[0],
                theta: params[0],
            },
            GateKind::Rz => Gate::Rz {
                target: q[0],
                theta: params[0],
            },
            GateKind::P => Gate::P {
                target: q[0],
                phi: params[0],
            },
            GateKind::CNot => Gate::CNot {
                control: q[0],
                target: q[1],
            },
            GateKind::Toffoli => Gate::Toffoli {
                controls: [q[0], q[1]],
                target: q[2],
            },
            GateKind::Swap => Gate::Swap(q[0], q[1]),
            GateKind::Measure => Gate::measure(q[0]),
            GateKind::Reset => Gate::Reset(q[0]),
        };

        gate.validate()?;
        Ok(gate)
    }

    /// Measure `target` into the default register bit `c[target]`.
    pub fn measure(target: usize) -> Self {
        Gate::Measure {
            target,
            clbit: ClassicalBit::new(DEFAULT_CREG, target),
        }
    }

    pub fn measure_into(target: usize, clbit: ClassicalBit) -> Self {
        Gate::Measure { target, clbit }
    }

    pub fn kind(&self) -> GateKind {
        match self {
            Gate::H(_) => GateKind::H,
            Gate::X(_) => GateKind::X,
            Gate::Y(_) => GateKind::Y,
            Gate::Z(_) => GateKind::Z,
            Gate::S(_) => GateKind::S,
            Gate::T(_) => GateKind::T,
            Gate::Rx { .. } => GateKind::Rx,
            Gate::Ry { .. } => GateKind::Ry,
            Gate::Rz { .. } => GateKind::Rz,
            Gate::P { .. } => GateKind::P,
            Gate::CNot { .. } => GateKind::CNot,
            Gate::Toffoli { .. } => GateKind::Toffoli,
            Gate::Swap(..) => GateKind::Swap,
            Gate::Measure { .. } => GateKind::Measure,
            Gate::Reset(_) => GateKind::Reset,
        }
    }

    /// Qubits the gate acts on, controls before target.
    pub fn qubits(&self) -> Vec<usize> {
        match *self {
            Gate::H(q)
            | Gate::X(q)
            | Gate::Y(q)
            | Gate::Z(q)
            | Gate::S(q)
            | Gate::T(q)
            | Gate::Reset(q) => vec![q],
            Gate::Rx { target, .. }
            | Gate::Ry { target, .. }
            | Gate::Rz { target, .. }
            | Gate::P { target, .. }
            | Gate::Measure { target, .. } => vec![target],
            Gate::CNot { control, target } => vec![control, target],
            Gate::Toffoli { controls, target } => vec![controls[0], controls[1], target],
            Gate::Swap(a, b) => vec![a, b],
        }
    }

    /// The rotation angle of parameterized gates.
    pub fn param(&self) -> Option<f64> {
        match *self {
            Gate::Rx { theta, .. } | Gate::Ry { theta, .. } | Gate::Rz { theta, .. } => {
                Some(theta)
            }
            Gate::P { phi, .. } => Some(phi),
            _ => None,
        }
    }

    pub fn acts_on(&self, qubit: usize) -> bool {
        self.qubits().contains(&qubit)
    }

    /// Dense matrix over [`Gate::qubits`], or `None` for measurement and reset.
    pub fn matrix(&self) -> Option<GateMatrix> {
        let matrix = match *self {
            Gate::H(_) => h_matrix(),
            Gate::X(_) => x_matrix(),
            Gate::Y(_) => y_matrix(),
            Gate::Z(_) => z_matrix(),
            Gate::S(_) => s_matrix(),
            Gate::T(_) => t_matrix(),
            Gate::Rx { theta, .. } => rx_matrix(theta),
            Gate::Ry { theta, .. } => ry_matrix(theta),
            Gate::Rz { theta, .. } => rz_matrix(theta),
            Gate::P { phi, .. } => phase_matrix(phi),
            Gate::CNot { .. } => cx_matrix(),
            Gate::Toffoli { .. } => ccx_matrix(),
            Gate::Swap(..) => swap_matrix(),
            Gate::Measure { .. } | Gate::Reset(_) => return None,
        };
        Some(matrix)
    }

    /// The same gate with qubit i replaced by `qubits[i]`.
    pub(crate) fn remap(&self, qubits: &[usize]) -> Result<Gate> {
        let mapped = self
            .qubits()
            .into_iter()
            .map(|q| {
                qubits.get(q).copied().ok_or_else(|| {
                    QuboxError::placement("qubits", format!("no argument for relative qubit {q}"))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        match self {
            Gate::Measure { clbit, .. } => Ok(Gate::measure_into(mapped[0], clbit.clone())),
            _ => {
                let params = self.param().into_iter().collect::<Vec<_>>();
                Gate::new(self.kind(), &mapped, &params)
            }
        }
    }

    /// QASM text without the trailing `;`, naming qubits through `qubit`.
    pub(crate) fn write_qasm(
        &self,
        f: &mut impl fmt::Write,
        qubit: impl Fn(usize) -> String,
    ) -> fmt::Result {
        f.write_str(self.kind().keyword())?;
        if let Some(angle) = self.param() {
            write!(f, "({angle})")?;
        }
        let qubits = self
            .qubits()
            .into_iter()
            .map(qubit)
            .collect::<Vec<_>>()
            .join(",");
        write!(f, " {qubits}")?;
        if let Gate::Measure { clbit, .. } = self {
            write!(f, " -> {clbit}")?;
        }
        Ok(())
    }

    /// Checks that hold regardless of circuit width: distinct qubits, finite angles.
    pub(crate) fn validate(&self) -> Result<()> {
        let qubits = self.qubits();
        for (i, q) in qubits.iter().enumerate() {
            if qubits[..i].contains(q) {
                return Err(QuboxError::placement(
                    "qubits",
                    format!("'{}' uses qubit {} more than once", self.kind(), q),
                ));
            }
        }
        if let Some(angle) = self.param() {
            if !angle.is_finite() {
                return Err(QuboxError::placement(
                    "params",
                    format!("'{}' angle must be finite, got {}", self.kind(), angle),
                ));
            }
        }
        Ok(())
    }
}

impl Display for Gate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_qasm(f, |q| format!("q[{q}]"))
    }
}

/// Starting state of one qubit, prepared from |0> before the first placement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InitialState {
    #[default]
    Zero,
    One,
    Plus,
    Minus,
}

impl InitialState {
    pub const ALL: [InitialState; 4] = [
        InitialState::Zero,
        InitialState::One,
        InitialState::Plus,
        InitialState::Minus,
    ];

    pub fn symbol(self) -> char {
        match self {
            InitialState::Zero => '0',
            InitialState::One => '1',
            InitialState::Plus => '+',
            InitialState::Minus => '-',
        }
    }

    /// Gates taking `qubit` from |0> to this state.
    pub fn preparation(self, qubit: usize) -> Vec<Gate> {
        match self {
            InitialState::Zero => vec![],
            InitialState::One => vec![Gate::X(qubit)],
            InitialState::Plus => vec![Gate::H(qubit)],
            InitialState::Minus => vec![Gate::X(qubit), Gate::H(qubit)],
        }
    }
}

impl FromStr for InitialState {
    type Err = QuboxError;

    fn from_str(s: &str) -> Result<Self> {
        InitialState::ALL
            .into_iter()
            .find(|state| s.len() == 1 && s.starts_with(state.symbol()))
            .ok_or_else(|| {
                QuboxError::placement(
                    "initial_state",
                    format!("unknown initial state '{s}', expected 0, 1, + or -"),
                )
            })
    }
}

impl Display for InitialState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "|{}>", self.symbol())
    }
}

/// A named unitary sequence over relative qubits `0..num_qubits`.
///
/// Applying it to concrete qubits expands the body into ordinary placements.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomGate {
    name: String,
    num_qubits: usize,
    body: Vec<Gate>,
}

impl CustomGate {
    pub fn new(name: impl Into<String>, num_qubits: usize, body: Vec<Gate>) -> Result<Self> {
        let name = name.into();
        if !qasm::is_identifier(&name) || GateKind::from_keyword(&name).is_some() {
            return Err(QuboxError::placement(
                "name",
                format!("'{name}' cannot name a custom gate"),
            ));
        }
        if num_qubits == 0 {
            return Err(QuboxError::placement(
                "qubits",
                format!("custom gate '{name}' must act on at least one qubit"),
            ));
        }
        for gate in &body {
            if !gate.kind().is_unitary() {
                return Err(QuboxError::placement(
                    "body",
                    format!("custom gate '{name}' may not contain '{}'", gate.kind()),
                ));
            }
            gate.validate()?;
            if let Some(q) = gate.qubits().into_iter().find(|&q| q >= num_qubits) {
                return Err(QuboxError::placement(
                    "body",
                    format!("custom gate '{name}' uses qubit {q} but has only {num_qubits}"),
                ));
            }
        }
        Ok(Self {
            name,
            num_qubits,
            body,
        })
    }

    /// The two-qubit Bell pair preparation: H on the first qubit, then CNOT.
    pub fn bell() -> Self {
        Self {
            name: "bell".to_string(),
            num_qubits: 2,
            body: vec![
                Gate::H(0),
                Gate::CNot {
                    control: 0,
                    target: 1,
                },
            ],
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn num_qubits(&self) -> usize {
        self.num_qubits
    }

    /// Body gates over relative qubit indices.
    pub fn body(&self) -> &[Gate] {
        &self.body
    }

    /// The body mapped onto `qubits`: relative qubit i becomes `qubits[i]`.
    pub fn expand(&self, qubits: &[usize]) -> Result<Vec<Gate>> {
        if qubits.len() != self.num_qubits {
            return Err(QuboxError::placement(
                "qubits",
                format!(
                    "'{}' acts on {} qubit(s), got {}",
                    self.name,
                    self.num_qubits,
                    qubits.len()
                ),
            ));
        }
        if let Some((i, q)) = qubits
            .iter()
            .enumerate()
            .find(|&(i, q)| qubits[..i].contains(q))
        {
            return Err(QuboxError::placement(
                "qubits",
                format!("'{}' uses qubit {} more than once (argument {})", self.name, q, i),
            ));
        }
        self.body.iter().map(|gate| gate.remap(qubits)).collect()
    }
}
