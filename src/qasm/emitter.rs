use crate::circuit::Circuit;
use crate::instruction::CustomGate;

/// Serialize a circuit; the same circuit always yields the same text.
pub fn encode(circuit: &Circuit) -> String {
    let mut emitter = Emitter::new();
    emitter.emit_circuit(circuit);
    emitter.output
}

struct Emitter {
    output: String,
}

impl Emitter {
    fn new() -> Self {
        Self {
            output: String::new(),
        }
    }

    fn emit_circuit(&mut self, circuit: &Circuit) {
        self.writeln("OPENQASM 2.0;");
        self.writeln("include \"qelib1.inc\";");
        self.writeln("");

        self.writeln(&format!("qreg q[{}];", circuit.num_of_qbits()));

        let has_conditions = circuit
            .gate_sequence()
            .iter()
            .any(|p| p.condition.is_some());
        if circuit.has_measurements() || has_conditions {
            for (name, size) in circuit.registers() {
                self.writeln(&format!("creg {name}[{size}];"));
            }
        }

        for gate in circuit.custom_gates() {
            self.emit_custom_gate(gate);
        }

        for gate in circuit.preparation() {
            self.writeln(&format!("{gate};"));
        }

        for placement in circuit.gate_sequence() {
            self.writeln(&format!("{placement};"));
        }
    }

    /// `gate name a0,a1 { ... }` with relative qubit i written as `ai`.
    fn emit_custom_gate(&mut self, gate: &CustomGate) {
        let formals = (0..gate.num_qubits())
            .map(|q| format!("a{q}"))
            .collect::<Vec<_>>()
            .join(",");
        self.writeln(&format!("gate {} {formals} {{", gate.name()));
        for body_gate in gate.body() {
            let mut line = String::from("  ");
            // Writing into a String cannot fail.
            let _ = body_gate.write_qasm(&mut line, |q| format!("a{q}"));
            line.push(';');
            self.writeln(&line);
        }
        self.writeln("}");
    }

    fn writeln(&mut self, line: &str) {
        self.output.push_str(line);
        self.output.push('\n');
    }
}
