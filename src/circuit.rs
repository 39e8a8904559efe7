use std::collections::BTreeMap;
use std::fmt::{self, Display};

use tracing::debug;

use crate::error::{QuboxError, Result};
use crate::instruction::{
    ClassicalBit, Condition, CustomGate, Gate, GateKind, InitialState, DEFAULT_CREG,
};
use crate::qasm;

/// Widest circuit accepted; the state vector holds 2^N amplitudes.
pub const MAX_QUBITS: usize = 24;

/// Widest classical register; whole-register conditions compare against a `u64`.
pub const MAX_CLBITS: usize = 64;

/// A gate at a display time step, optionally guarded by a classical condition.
#[derive(Debug, Clone, PartialEq)]
pub struct Placement {
    pub gate: Gate,
    pub time_step: usize,
    pub condition: Option<Condition>,
}

impl Placement {
    pub fn occupies(&self, time_step: usize, qubit: usize) -> bool {
        self.time_step == time_step && self.gate.acts_on(qubit)
    }
}

impl Display for Placement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(condition) = &self.condition {
            write!(f, "if({condition}) ")?;
        }
        write!(f, "{}", self.gate)
    }
}

/// Ordered gate placements over a fixed number of qubits.
///
/// Insertion order is the execution order; time steps only group gates for display.
#[derive(Debug, Clone, PartialEq)]
pub struct Circuit {
    num_of_qbits: usize,
    initial_states: Vec<InitialState>,
    placements: Vec<Placement>,
    registers: BTreeMap<String, usize>,
    custom_gates: BTreeMap<String, CustomGate>,
}

macro_rules! single_qubit_builders {
    ($($name:ident => $variant:ident),* $(,)?) => {
        $(
            pub fn $name(mut self, index: usize) -> Result<Self> {
                self.add_gate(Gate::$variant(index), None)?;
                Ok(self)
            }
        )*
    };
}

macro_rules! rotation_builders {
    ($($name:ident => $variant:ident { $angle:ident }),* $(,)?) => {
        $(
            pub fn $name(mut self, index: usize, $angle: f64) -> Result<Self> {
                self.add_gate(Gate::$variant { target: index, $angle }, None)?;
                Ok(self)
            }
        )*
    };
}

impl Circuit {
    pub fn new(num_of_qbits: usize) -> Result<Self> {
        if num_of_qbits == 0 || num_of_qbits > MAX_QUBITS {
            return Err(QuboxError::InvalidQubitCount {
                requested: num_of_qbits,
                max: MAX_QUBITS,
            });
        }
        Ok(Self {
            num_of_qbits,
            initial_states: vec![InitialState::Zero; num_of_qbits],
            placements: Vec::new(),
            registers: BTreeMap::new(),
            custom_gates: BTreeMap::new(),
        })
    }

    pub fn num_of_qbits(&self) -> usize {
        self.num_of_qbits
    }

    /// Declare a classical register. Redeclaring with the same size is a no-op.
    pub fn add_register(&mut self, name: &str, size: usize) -> Result<()> {
        if !qasm::is_identifier(name) {
            return Err(QuboxError::placement(
                "register",
                format!("'{name}' is not a valid register name"),
            ));
        }
        if size == 0 || size > MAX_CLBITS {
            return Err(QuboxError::placement(
                "register",
                format!("register '{name}' must hold between 1 and {MAX_CLBITS} bits, got {size}"),
            ));
        }
        match self.registers.get(name) {
            Some(&existing) if existing != size => Err(QuboxError::placement(
                "register",
                format!("register '{name}' already declared with {existing} bit(s)"),
            )),
            _ => {
                self.registers.insert(name.to_string(), size);
                Ok(())
            }
        }
    }

    /// Declared classical registers as `(name, size)`, ordered by name.
    pub fn registers(&self) -> impl Iterator<Item = (&str, usize)> {
        self.registers
            .iter()
            .map(|(name, &size)| (name.as_str(), size))
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index >= self.num_of_qbits {
            return Err(QuboxError::placement(
                "qubits",
                format!(
                    "qubit index {} out of range for {} qubit(s)",
                    index, self.num_of_qbits
                ),
            ));
        }
        Ok(())
    }

    /// Size of `register`. The default register is sized to the qubit count until declared.
    fn register_size(&self, register: &str) -> Option<usize> {
        match self.registers.get(register) {
            Some(&size) => Some(size),
            None if register == DEFAULT_CREG => Some(self.num_of_qbits),
            None => None,
        }
    }

    fn check_clbit(&self, field: &'static str, bit: &ClassicalBit) -> Result<()> {
        let size = self.register_size(&bit.register).ok_or_else(|| {
            QuboxError::placement(
                field,
                format!("classical register '{}' is not declared", bit.register),
            )
        })?;
        if bit.index >= size {
            return Err(QuboxError::placement(
                field,
                format!(
                    "bit {} out of range for register '{}' of size {}",
                    bit, bit.register, size
                ),
            ));
        }
        Ok(())
    }

    fn validate(&self, gate: &Gate, condition: Option<&Condition>) -> Result<()> {
        gate.validate()?;
        for q in gate.qubits() {
            self.check_index(q)?;
        }
        if let Gate::Measure { clbit, .. } = gate {
            self.check_clbit("clbit", clbit)?;
        }
        match condition {
            Some(Condition::Bit { bit, .. }) => self.check_clbit("condition", bit)?,
            Some(Condition::Register { register, value }) => {
                let size = self.register_size(register).ok_or_else(|| {
                    QuboxError::placement(
                        "condition",
                        format!("classical register '{register}' is not declared"),
                    )
                })?;
                if size < 64 && *value >= 1_u64 << size {
                    return Err(QuboxError::placement(
                        "condition",
                        format!("value {value} does not fit register '{register}' of size {size}"),
                    ));
                }
            }
            None => {}
        }
        Ok(())
    }

    fn next_step(&self, qubits: &[usize]) -> usize {
        self.placements
            .iter()
            .filter(|p| qubits.iter().any(|&q| p.gate.acts_on(q)))
            .map(|p| p.time_step + 1)
            .max()
            .unwrap_or(0)
    }

    /// Append a gate. Without a time step it goes one step after the last gate
    /// touching any of its qubits; with one, gates already occupying those
    /// qubits at that step are replaced. Returns the step used.
    pub fn add_gate(&mut self, gate: Gate, time_step: Option<usize>) -> Result<usize> {
        self.insert(gate, None, time_step)
    }

    /// Append a gate that only runs when `condition` holds at execution time.
    pub fn add_conditional_gate(
        &mut self,
        gate: Gate,
        condition: Condition,
        time_step: Option<usize>,
    ) -> Result<usize> {
        self.insert(gate, Some(condition), time_step)
    }

    /// Build and append a gate from its kind, qubits (controls first) and angles.
    pub fn place(
        &mut self,
        kind: GateKind,
        qubits: &[usize],
        params: &[f64],
        time_step: Option<usize>,
    ) -> Result<usize> {
        let gate = Gate::new(kind, qubits, params)?;
        self.add_gate(gate, time_step)
    }

    fn insert(
        &mut self,
        gate: Gate,
        condition: Option<Condition>,
        time_step: Option<usize>,
    ) -> Result<usize> {
        self.validate(&gate, condition.as_ref())?;

        let qubits = gate.qubits();
        let time_step = match time_step {
            Some(step) => {
                let before = self.placements.len();
                self.placements
                    .retain(|p| !qubits.iter().any(|&q| p.occupies(step, q)));
                if self.placements.len() != before {
                    debug!(step, replaced = before - self.placements.len(), "replacing gates");
                }
                step
            }
            None => self.next_step(&qubits),
        };

        let uses_default_register =
            matches!(&gate, Gate::Measure { clbit, .. } if clbit.register == DEFAULT_CREG)
                || condition
                    .as_ref()
                    .is_some_and(|c| c.register_name() == DEFAULT_CREG);
        if uses_default_register {
            self.registers
                .entry(DEFAULT_CREG.to_string())
                .or_insert(self.num_of_qbits);
        }

        debug!(%gate, time_step, "adding gate");
        self.placements.push(Placement {
            gate,
            time_step,
            condition,
        });
        Ok(time_step)
    }

    /// Remove the gate touching `qubit` at `time_step`, if there is one.
    pub fn remove_gate(&mut self, time_step: usize, qubit: usize) -> Option<Placement> {
        let position = self
            .placements
            .iter()
            .position(|p| p.occupies(time_step, qubit))?;
        Some(self.placements.remove(position))
    }

    pub fn gate_at(&self, time_step: usize, qubit: usize) -> Option<&Placement> {
        self.placements.iter().find(|p| p.occupies(time_step, qubit))
    }

    /// Placements in execution order.
    pub fn gate_sequence(&self) -> &[Placement] {
        &self.placements
    }

    pub fn len(&self) -> usize {
        self.placements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.placements.is_empty()
    }

    /// Number of time steps spanned by the placements.
    pub fn depth(&self) -> usize {
        self.placements
            .iter()
            .map(|p| p.time_step + 1)
            .max()
            .unwrap_or(0)
    }

    pub fn has_measurements(&self) -> bool {
        self.placements
            .iter()
            .any(|p| matches!(p.gate, Gate::Measure { .. }))
    }

    /// Start `qubit` in `state` instead of |0>.
    pub fn set_initial_state(&mut self, qubit: usize, state: InitialState) -> Result<()> {
        self.check_index(qubit)?;
        self.initial_states[qubit] = state;
        Ok(())
    }

    pub fn initial_state(&self, qubit: usize) -> Option<InitialState> {
        self.initial_states.get(qubit).copied()
    }

    /// Gates that take |0…0> to the initial states, qubit 0 first.
    pub fn preparation(&self) -> Vec<Gate> {
        self.initial_states
            .iter()
            .enumerate()
            .flat_map(|(qubit, state)| state.preparation(qubit))
            .collect()
    }

    /// Register a custom gate. Redefining a name with a different body is an error.
    pub fn define_custom_gate(&mut self, gate: CustomGate) -> Result<()> {
        match self.custom_gates.get(gate.name()) {
            Some(existing) if *existing != gate => Err(QuboxError::placement(
                "name",
                format!("custom gate '{}' is already defined", gate.name()),
            )),
            _ => {
                debug!(name = gate.name(), qubits = gate.num_qubits(), "defining custom gate");
                self.custom_gates.insert(gate.name().to_string(), gate);
                Ok(())
            }
        }
    }

    pub fn custom_gate(&self, name: &str) -> Option<&CustomGate> {
        self.custom_gates.get(name)
    }

    /// Custom gate definitions, ordered by name.
    pub fn custom_gates(&self) -> impl Iterator<Item = &CustomGate> {
        self.custom_gates.values()
    }

    /// Expand a defined custom gate onto `qubits`. Returns the time step of each placed gate.
    pub fn add_custom_gate(&mut self, name: &str, qubits: &[usize]) -> Result<Vec<usize>> {
        self.add_custom_gate_with(name, qubits, None)
    }

    pub(crate) fn add_custom_gate_with(
        &mut self,
        name: &str,
        qubits: &[usize],
        condition: Option<Condition>,
    ) -> Result<Vec<usize>> {
        let gate = self.custom_gates.get(name).ok_or_else(|| {
            QuboxError::placement("name", format!("custom gate '{name}' is not defined"))
        })?;
        let expanded = gate.expand(qubits)?;
        self.insert_all(expanded, condition)
    }

    /// Entangle two qubits into (|00> + |11>)/√2 from |00>: H on `control`, then CNOT.
    pub fn add_bell_pair(&mut self, control: usize, target: usize) -> Result<Vec<usize>> {
        let expanded = CustomGate::bell().expand(&[control, target])?;
        self.insert_all(expanded, None)
    }

    /// Validate every gate before placing any of them.
    fn insert_all(&mut self, gates: Vec<Gate>, condition: Option<Condition>) -> Result<Vec<usize>> {
        for gate in &gates {
            self.validate(gate, condition.as_ref())?;
        }
        gates
            .into_iter()
            .map(|gate| self.insert(gate, condition.clone(), None))
            .collect()
    }

    pub fn to_qasm(&self) -> String {
        qasm::encode(self)
    }

    pub fn from_qasm(text: &str) -> Result<Self> {
        qasm::decode(text)
    }

    single_qubit_builders! {
        h => H,
        x => X,
        y => Y,
        z => Z,
        s => S,
        t => T,
        reset => Reset,
    }

    rotation_builders! {
        rx => Rx { theta },
        ry => Ry { theta },
        rz => Rz { theta },
        p => P { phi },
    }

    pub fn cnot(mut self, control: usize, target: usize) -> Result<Self> {
        self.add_gate(Gate::CNot { control, target }, None)?;
        Ok(self)
    }

    pub fn toffoli(mut self, control1: usize, control2: usize, target: usize) -> Result<Self> {
        self.add_gate(
            Gate::Toffoli {
                controls: [control1, control2],
                target,
            },
            None,
        )?;
        Ok(self)
    }

    pub fn swap(mut self, index1: usize, index2: usize) -> Result<Self> {
        self.add_gate(Gate::Swap(index1, index2), None)?;
        Ok(self)
    }

    pub fn measure(mut self, index: usize) -> Result<Self> {
        self.add_gate(Gate::measure(index), None)?;
        Ok(self)
    }

    pub fn bell(mut self, control: usize, target: usize) -> Result<Self> {
        self.add_bell_pair(control, target)?;
        Ok(self)
    }

    /// Run `gate` only if classical bit `c[bit]` reads 1.
    pub fn c_if(mut self, bit: usize, gate: Gate) -> Result<Self> {
        let condition = Condition::bit(ClassicalBit::new(DEFAULT_CREG, bit), true);
        self.add_conditional_gate(gate, condition, None)?;
        Ok(self)
    }
}

impl Display for Circuit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "qubits: {}", self.num_of_qbits)?;
        if self.initial_states.iter().any(|s| *s != InitialState::Zero) {
            let symbols = self
                .initial_states
                .iter()
                .rev()
                .map(|s| s.symbol())
                .collect::<String>();
            writeln!(f, "initial: |{symbols}>")?;
        }
        for placement in &self.placements {
            writeln!(f, "t={:<3} {}", placement.time_step, placement)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_zero_and_oversized_circuits() {
        assert!(matches!(
            Circuit::new(0),
            Err(QuboxError::InvalidQubitCount { requested: 0, .. })
        ));
        assert!(Circuit::new(MAX_QUBITS + 1).is_err());
        assert_eq!(Circuit::new(3).unwrap().num_of_qbits(), 3);
    }

    #[test]
    fn test_cnot_with_same_control_and_target_is_rejected() {
        let mut circuit = Circuit::new(2).unwrap();
        let err = circuit
            .place(GateKind::CNot, &[0, 0], &[], None)
            .unwrap_err();
        assert!(matches!(
            err,
            QuboxError::InvalidGatePlacement { field: "qubits", .. }
        ));
        assert!(circuit.is_empty());
    }

    #[test]
    fn test_out_of_range_gate_leaves_circuit_untouched() {
        let mut circuit = Circuit::new(2).unwrap().h(0).unwrap();
        let before = circuit.clone();

        assert!(circuit.add_gate(Gate::X(2), None).is_err());
        assert!(circuit
            .add_gate(
                Gate::Toffoli {
                    controls: [0, 1],
                    target: 5
                },
                Some(0)
            )
            .is_err());
        assert_eq!(circuit, before);
    }

    #[test]
    fn test_rotation_requires_one_parameter() {
        let mut circuit = Circuit::new(1).unwrap();
        assert!(circuit.place(GateKind::Ry, &[0], &[], None).is_err());
        assert!(circuit.place(GateKind::X, &[0], &[1.0], None).is_err());
        assert_eq!(circuit.place(GateKind::Ry, &[0], &[1.0], None), Ok(0));
    }

    #[test]
    fn test_auto_time_steps_follow_qubit_usage() {
        let mut circuit = Circuit::new(3).unwrap();
        assert_eq!(circuit.add_gate(Gate::H(0), None), Ok(0));
        assert_eq!(circuit.add_gate(Gate::H(2), None), Ok(0));
        assert_eq!(
            circuit.add_gate(
                Gate::CNot {
                    control: 0,
                    target: 1
                },
                None
            ),
            Ok(1)
        );
        assert_eq!(circuit.add_gate(Gate::X(1), None), Ok(2));
        assert_eq!(circuit.depth(), 3);
    }

    #[test]
    fn test_explicit_time_step_replaces_occupant() {
        let mut circuit = Circuit::new(2).unwrap();
        circuit.add_gate(Gate::H(0), Some(4)).unwrap();
        circuit.add_gate(Gate::X(1), Some(4)).unwrap();
        circuit
            .add_gate(
                Gate::CNot {
                    control: 0,
                    target: 1,
                },
                Some(4),
            )
            .unwrap();

        assert_eq!(circuit.len(), 1);
        assert_eq!(circuit.gate_at(4, 1).map(|p| p.gate.kind()), Some(GateKind::CNot));
    }

    #[test]
    fn test_remove_gate() {
        let mut circuit = Circuit::new(2).unwrap().h(0).unwrap().cnot(0, 1).unwrap();

        assert_eq!(circuit.remove_gate(0, 1), None);
        assert_eq!(circuit.len(), 2);

        let removed = circuit.remove_gate(1, 1).unwrap();
        assert_eq!(
            removed.gate,
            Gate::CNot {
                control: 0,
                target: 1
            }
        );
        assert_eq!(circuit.gate_sequence().len(), 1);
        assert_eq!(circuit.gate_sequence()[0].gate, Gate::H(0));
    }

    #[test]
    fn test_measure_declares_default_register() {
        let circuit = Circuit::new(2).unwrap().measure(1).unwrap();
        assert!(circuit.has_measurements());
        assert_eq!(circuit.registers().collect::<Vec<_>>(), vec![("c", 2)]);
    }

    #[test]
    fn test_measure_into_undeclared_register_is_rejected() {
        let mut circuit = Circuit::new(2).unwrap();
        let gate = Gate::measure_into(0, ClassicalBit::new("m", 0));
        let err = circuit.add_gate(gate.clone(), None).unwrap_err();
        assert!(matches!(
            err,
            QuboxError::InvalidGatePlacement { field: "clbit", .. }
        ));

        circuit.add_register("m", 1).unwrap();
        assert!(circuit.add_gate(gate, None).is_ok());
        assert!(circuit
            .add_gate(Gate::measure_into(1, ClassicalBit::new("m", 1)), None)
            .is_err());
    }

    #[test]
    fn test_register_declarations() {
        let mut circuit = Circuit::new(2).unwrap();
        assert!(circuit.add_register("flags", 3).is_ok());
        assert!(circuit.add_register("flags", 3).is_ok());
        assert!(circuit.add_register("flags", 2).is_err());
        assert!(circuit.add_register("0bad", 1).is_err());
        assert!(circuit.add_register("empty", 0).is_err());
    }

    #[test]
    fn test_condition_value_must_fit_register() {
        let mut circuit = Circuit::new(2).unwrap();
        circuit.add_register("c", 2).unwrap();
        assert!(circuit
            .add_conditional_gate(Gate::X(0), Condition::register("c", 4), None)
            .is_err());
        assert!(circuit
            .add_conditional_gate(Gate::X(0), Condition::register("c", 3), None)
            .is_ok());
    }

    #[test]
    fn test_display_lists_steps() {
        let circuit = Circuit::new(2)
            .unwrap()
            .h(0)
            .unwrap()
            .measure(0)
            .unwrap()
            .c_if(0, Gate::X(1))
            .unwrap();
        let text = circuit.to_string();
        assert!(text.starts_with("qubits: 2\n"));
        assert!(text.contains("t=0   h q[0]"));
        assert!(text.contains("if(c[0]==1) x q[1]"));
    }

    #[test]
    fn test_register_wider_than_u64_is_rejected() {
        let mut circuit = Circuit::new(1).unwrap();
        assert!(circuit.add_register("wide", MAX_CLBITS).is_ok());
        assert!(matches!(
            circuit.add_register("big", MAX_CLBITS + 1),
            Err(QuboxError::InvalidGatePlacement { field: "register", .. })
        ));
        assert!(circuit
            .add_conditional_gate(Gate::X(0), Condition::register("wide", u64::MAX), None)
            .is_ok());
    }

    #[test]
    fn test_register_names_must_not_be_keywords() {
        let mut circuit = Circuit::new(1).unwrap();
        for name in ["pi", "if", "qreg", "creg", "include", "barrier", "OPENQASM", "gate"] {
            assert!(circuit.add_register(name, 1).is_err(), "{name}");
        }
        assert_eq!(circuit.registers().count(), 0);
        assert!(circuit.add_register("pi_bits", 1).is_ok());
    }

    #[test]
    fn test_initial_states_become_preparation_gates() {
        let mut circuit = Circuit::new(3).unwrap();
        circuit.set_initial_state(0, InitialState::One).unwrap();
        circuit.set_initial_state(2, InitialState::Minus).unwrap();
        assert!(circuit.set_initial_state(3, InitialState::Plus).is_err());

        assert_eq!(circuit.initial_state(1), Some(InitialState::Zero));
        assert_eq!(
            circuit.preparation(),
            vec![Gate::X(0), Gate::X(2), Gate::H(2)]
        );
        assert!(circuit.is_empty());
        assert!(circuit.to_string().contains("initial: |-01>"));
    }

    #[test]
    fn test_custom_gate_expands_into_placements() {
        let mut circuit = Circuit::new(3).unwrap();
        let body = vec![
            Gate::H(0),
            Gate::CNot {
                control: 0,
                target: 1,
            },
        ];
        circuit
            .define_custom_gate(CustomGate::new("pair", 2, body.clone()).unwrap())
            .unwrap();
        assert!(circuit
            .define_custom_gate(CustomGate::new("pair", 2, body).unwrap())
            .is_ok());
        assert!(circuit
            .define_custom_gate(CustomGate::new("pair", 1, vec![]).unwrap())
            .is_err());

        assert_eq!(circuit.add_custom_gate("pair", &[2, 0]), Ok(vec![0, 1]));
        assert_eq!(circuit.gate_sequence()[0].gate, Gate::H(2));
        assert_eq!(
            circuit.gate_sequence()[1].gate,
            Gate::CNot {
                control: 2,
                target: 0
            }
        );

        let before = circuit.clone();
        assert!(circuit.add_custom_gate("pair", &[1, 3]).is_err());
        assert!(circuit.add_custom_gate("missing", &[0]).is_err());
        assert_eq!(circuit, before);
    }

    #[test]
    fn test_bell_builder_places_h_then_cnot() {
        let circuit = Circuit::new(2).unwrap().bell(1, 0).unwrap();
        let gates = circuit
            .gate_sequence()
            .iter()
            .map(|p| p.gate.clone())
            .collect::<Vec<_>>();
        assert_eq!(
            gates,
            vec![
                Gate::H(1),
                Gate::CNot {
                    control: 1,
                    target: 0
                }
            ]
        );
        assert!(Circuit::new(2).unwrap().bell(0, 0).is_err());
    }
}
