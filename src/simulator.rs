use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info, warn};

use crate::circuit::{Circuit, Placement};
use crate::classical::ClassicalRegisters;
use crate::error::{QuboxError, Result};
use crate::gates::x_matrix;
use crate::instruction::Gate;
use crate::qstate::{BlochVector, Measurement, QState};

/// Lifecycle of one run.
#[derive(Debug, Clone, PartialEq)]
pub enum RunStatus {
    Idle,
    Running,
    Completed,
    /// Stopped on an error; the partial state stays readable but frozen.
    Halted(QuboxError),
}

/// What a single step did with its placement.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    Applied,
    /// The classical condition was false; the state is unchanged.
    Skipped,
    Measured(Measurement),
    /// No placements left.
    Finished,
}

/// Owns the measurement randomness and starts runs.
pub struct Simulator {
    rng: StdRng,
}

impl Simulator {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_os_rng(),
        }
    }

    /// Reproducible measurement outcomes.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Begin a run from |0…0> with the circuit's initial qubit states prepared.
    pub fn start<'a>(&'a mut self, circuit: &'a Circuit) -> Result<Simulation<'a>> {
        let mut state = QState::zero_state(circuit.num_of_qbits())?;
        for gate in circuit.preparation() {
            if let Some(matrix) = gate.matrix() {
                state.apply_gate(&matrix, &gate.qubits())?;
            }
        }

        Ok(Simulation {
            circuit,
            rng: &mut self.rng,
            state,
            registers: ClassicalRegisters::with_layout(circuit.registers()),
            cursor: 0,
            status: RunStatus::Idle,
        })
    }

    /// Replay the whole circuit in insertion order.
    pub fn run(&mut self, circuit: &Circuit) -> Result<SimulationResult> {
        self.start(circuit)?.into_result()
    }

    /// Run `shots` independent times and count the classical outcomes.
    pub fn sample(&mut self, circuit: &Circuit, shots: usize) -> Result<BTreeMap<String, usize>> {
        let mut counts = BTreeMap::new();
        for _ in 0..shots {
            let result = self.run(circuit)?;
            *counts.entry(result.registers.outcome()).or_insert(0) += 1;
        }
        Ok(counts)
    }
}

impl Default for Simulator {
    fn default() -> Self {
        Self::new()
    }
}

/// One run of a circuit, advanced placement by placement.
pub struct Simulation<'a> {
    circuit: &'a Circuit,
    rng: &'a mut StdRng,
    state: QState,
    registers: ClassicalRegisters,
    cursor: usize,
    status: RunStatus,
}

impl Simulation<'_> {
    pub fn status(&self) -> &RunStatus {
        &self.status
    }

    /// Index of the next placement to execute.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn state(&self) -> &QState {
        &self.state
    }

    pub fn registers(&self) -> &ClassicalRegisters {
        &self.registers
    }

    /// Execute the next placement.
    pub fn step(&mut self) -> Result<StepOutcome> {
        match self.status {
            RunStatus::Halted(_) => return Err(QuboxError::SimulationHalted),
            RunStatus::Completed => return Ok(StepOutcome::Finished),
            RunStatus::Idle => self.status = RunStatus::Running,
            RunStatus::Running => {}
        }

        let circuit = self.circuit;
        let Some(placement) = circuit.gate_sequence().get(self.cursor) else {
            self.complete();
            return Ok(StepOutcome::Finished);
        };

        match self.execute(placement) {
            Ok(outcome) => {
                self.cursor += 1;
                if self.cursor == circuit.len() {
                    self.complete();
                }
                Ok(outcome)
            }
            Err(err) => {
                warn!(position = self.cursor, %placement, %err, "simulation halted");
                self.status = RunStatus::Halted(err.clone());
                Err(err)
            }
        }
    }

    /// Step until the run completes or halts.
    pub fn finish(&mut self) -> Result<()> {
        while self.step()? != StepOutcome::Finished {}
        Ok(())
    }

    /// Finish the run and keep its final state.
    pub fn into_result(mut self) -> Result<SimulationResult> {
        self.finish()?;
        Ok(SimulationResult {
            state: self.state,
            registers: self.registers,
        })
    }

    fn complete(&mut self) {
        self.status = RunStatus::Completed;
        info!(
            qubits = self.circuit.num_of_qbits(),
            gates = self.circuit.len(),
            "simulation completed"
        );
    }

    fn execute(&mut self, placement: &Placement) -> Result<StepOutcome> {
        if let Some(condition) = &placement.condition {
            if !self.registers.evaluate(condition)? {
                debug!(position = self.cursor, %placement, "condition false, skipping");
                return Ok(StepOutcome::Skipped);
            }
        }

        let outcome = match &placement.gate {
            Gate::Measure { target, clbit } => {
                let measurement = self.state.measure(*target, &mut *self.rng)?;
                self.registers.set(clbit, measurement.bit)?;
                StepOutcome::Measured(measurement)
            }
            Gate::Reset(target) => {
                let measurement = self.state.measure(*target, &mut *self.rng)?;
                if measurement.bit {
                    self.state.apply_gate(&x_matrix(), &[*target])?;
                }
                StepOutcome::Applied
            }
            gate => {
                if let Some(matrix) = gate.matrix() {
                    self.state.apply_gate(&matrix, &gate.qubits())?;
                }
                StepOutcome::Applied
            }
        };
        debug!(position = self.cursor, %placement, ?outcome, "executed");
        Ok(outcome)
    }
}

/// Final state and classical registers of a completed run.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationResult {
    state: QState,
    registers: ClassicalRegisters,
}

impl SimulationResult {
    pub fn state(&self) -> &QState {
        &self.state
    }

    pub fn registers(&self) -> &ClassicalRegisters {
        &self.registers
    }

    pub fn probabilities(&self) -> Vec<(usize, f64)> {
        self.state.probabilities()
    }

    pub fn reduced_bloch(&self, qubit: usize) -> Result<BlochVector> {
        self.state.reduced_bloch(qubit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assert_approx_eq;
    use crate::instruction::{ClassicalBit, Condition, InitialState};

    fn bell() -> Circuit {
        Circuit::new(2).unwrap().h(0).unwrap().cnot(0, 1).unwrap()
    }

    #[test]
    fn test_bell_probabilities() {
        let result = Simulator::seeded(0).run(&bell()).unwrap();
        let probabilities = result.probabilities();
        assert_approx_eq!(0.5, probabilities[0b00].1);
        assert_approx_eq!(0.0, probabilities[0b01].1);
        assert_approx_eq!(0.0, probabilities[0b10].1);
        assert_approx_eq!(0.5, probabilities[0b11].1);
        assert_eq!(probabilities, result.probabilities());
    }

    #[test]
    fn test_bell_measurements_agree() {
        let circuit = bell().measure(0).unwrap().measure(1).unwrap();
        let mut simulator = Simulator::seeded(42);
        for _ in 0..200 {
            let result = simulator.run(&circuit).unwrap();
            let bits = result.registers().register("c").unwrap();
            assert!(bits[0].is_some());
            assert_eq!(bits[0], bits[1]);
        }
    }

    #[test]
    fn test_step_trace_and_status() {
        let circuit = bell().measure(1).unwrap();
        let mut simulator = Simulator::seeded(3);
        let mut run = simulator.start(&circuit).unwrap();
        assert_eq!(run.status(), &RunStatus::Idle);

        assert_eq!(run.step(), Ok(StepOutcome::Applied));
        assert_eq!(run.status(), &RunStatus::Running);
        assert_approx_eq!(0.0, run.state().reduced_bloch(0).unwrap().z);

        assert_eq!(run.step(), Ok(StepOutcome::Applied));
        assert!(matches!(run.step(), Ok(StepOutcome::Measured(_))));
        assert_eq!(run.status(), &RunStatus::Completed);
        assert_eq!(run.cursor(), 3);
        assert_eq!(run.step(), Ok(StepOutcome::Finished));
    }

    #[test]
    fn test_empty_circuit_completes() {
        let circuit = Circuit::new(1).unwrap();
        let mut simulator = Simulator::seeded(0);
        let mut run = simulator.start(&circuit).unwrap();
        assert_eq!(run.step(), Ok(StepOutcome::Finished));
        assert_eq!(run.status(), &RunStatus::Completed);
    }

    #[test]
    fn test_conditional_gate_applies_and_skips() {
        // q0 is |1>, so c[0] reads 1: the X on q1 runs and the H guarded by c[0]==0 does not.
        let mut circuit = Circuit::new(2).unwrap().x(0).unwrap().measure(0).unwrap();
        circuit
            .add_conditional_gate(
                Gate::X(1),
                Condition::bit(ClassicalBit::new("c", 0), true),
                None,
            )
            .unwrap();
        circuit
            .add_conditional_gate(
                Gate::H(1),
                Condition::bit(ClassicalBit::new("c", 0), false),
                None,
            )
            .unwrap();

        let mut simulator = Simulator::seeded(9);
        let mut run = simulator.start(&circuit).unwrap();
        assert_eq!(run.step(), Ok(StepOutcome::Applied));
        assert!(matches!(run.step(), Ok(StepOutcome::Measured(m)) if m.bit));
        assert_eq!(run.step(), Ok(StepOutcome::Applied));
        assert_eq!(run.step(), Ok(StepOutcome::Skipped));

        let result = run.into_result().unwrap();
        assert_approx_eq!(1.0, result.probabilities()[0b11].1);
    }

    #[test]
    fn test_whole_register_condition() {
        // c = 0b01 after measuring |01>, so only the gate guarded by c==1 runs.
        let mut circuit = Circuit::new(2)
            .unwrap()
            .x(0)
            .unwrap()
            .measure(0)
            .unwrap()
            .measure(1)
            .unwrap();
        circuit
            .add_conditional_gate(Gate::X(1), Condition::register("c", 1), None)
            .unwrap();
        circuit
            .add_conditional_gate(Gate::X(0), Condition::register("c", 2), None)
            .unwrap();

        let result = Simulator::seeded(1).run(&circuit).unwrap();
        assert_eq!(result.registers().value("c"), Ok(1));
        assert_approx_eq!(1.0, result.probabilities()[0b11].1);
    }

    #[test]
    fn test_unwritten_condition_halts_run() {
        let circuit = Circuit::new(2)
            .unwrap()
            .x(0)
            .unwrap()
            .c_if(0, Gate::X(1))
            .unwrap()
            .h(1)
            .unwrap();
        let before = circuit.clone();

        let mut simulator = Simulator::seeded(0);
        let mut run = simulator.start(&circuit).unwrap();
        assert_eq!(run.step(), Ok(StepOutcome::Applied));

        let expected = QuboxError::UnresolvedClassicalReference {
            register: "c".to_string(),
            index: 0,
        };
        assert_eq!(run.step(), Err(expected.clone()));
        assert_eq!(run.status(), &RunStatus::Halted(expected));
        assert_eq!(run.cursor(), 1);
        assert_approx_eq!(1.0, run.state().probabilities()[0b01].1);

        assert_eq!(run.step(), Err(QuboxError::SimulationHalted));
        assert_eq!(run.finish(), Err(QuboxError::SimulationHalted));

        assert!(matches!(
            simulator.run(&circuit),
            Err(QuboxError::UnresolvedClassicalReference { .. })
        ));
        assert_eq!(circuit, before);
    }

    #[test]
    fn test_reset_returns_qubit_to_zero() {
        let circuit = Circuit::new(1).unwrap().h(0).unwrap().reset(0).unwrap();
        let mut simulator = Simulator::seeded(5);
        for _ in 0..20 {
            let result = simulator.run(&circuit).unwrap();
            assert_approx_eq!(1.0, result.probabilities()[0].1);
        }
    }

    #[test]
    fn test_each_run_starts_fresh() {
        let circuit = Circuit::new(1).unwrap().x(0).unwrap();
        let mut simulator = Simulator::seeded(0);
        let first = simulator.run(&circuit).unwrap();
        let second = simulator.run(&circuit).unwrap();
        assert_eq!(first.state(), second.state());
        assert_approx_eq!(1.0, second.probabilities()[1].1);
    }

    #[test]
    fn test_sample_counts_bell_outcomes() {
        let circuit = bell().measure(0).unwrap().measure(1).unwrap();
        let counts = Simulator::seeded(11).sample(&circuit, 500).unwrap();

        assert_eq!(counts.values().sum::<usize>(), 500);
        assert!(counts.keys().all(|k| k == "00" || k == "11"));
        assert!(counts.get("00").copied().unwrap_or(0) > 150);
        assert!(counts.get("11").copied().unwrap_or(0) > 150);
    }

    #[test]
    fn test_initial_states_are_prepared_before_the_first_step() {
        let mut circuit = Circuit::new(2).unwrap();
        circuit.set_initial_state(0, InitialState::One).unwrap();
        circuit.set_initial_state(1, InitialState::Minus).unwrap();

        let mut simulator = Simulator::seeded(0);
        let run = simulator.start(&circuit).unwrap();
        assert_eq!(run.cursor(), 0);
        assert_approx_eq!(-1.0, run.state().reduced_bloch(0).unwrap().z);
        assert_approx_eq!(-1.0, run.state().reduced_bloch(1).unwrap().x);

        let measured = circuit.measure(0).unwrap();
        for _ in 0..10 {
            let result = simulator.run(&measured).unwrap();
            assert_eq!(result.registers().register("c").unwrap()[0], Some(true));
        }
    }

    #[test]
    fn test_bell_composite_matches_hand_built_pair() {
        let composite = Circuit::new(2).unwrap().bell(0, 1).unwrap();
        let a = Simulator::seeded(0).run(&composite).unwrap();
        let b = Simulator::seeded(0).run(&bell()).unwrap();
        assert_eq!(a.state(), b.state());
    }
}
