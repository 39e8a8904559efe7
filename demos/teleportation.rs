use std::f64::consts::PI;

use anyhow::Result;
use qubox::{Circuit, Gate, Simulator, StepOutcome};

fn main() -> Result<()> {
    let theta = PI / 3.0;

    // Bell pair on q1/q2, then a Bell measurement of q0/q1.
    let circuit = Circuit::new(3)?
        .ry(0, theta)?
        .h(1)?
        .cnot(1, 2)?
        .cnot(0, 1)?
        .h(0)?
        .measure(0)?
        .measure(1)?
        .c_if(1, Gate::X(2))?
        .c_if(0, Gate::Z(2))?;
    println!("{}", circuit.to_qasm());

    let mut simulator = Simulator::new();
    let mut run = simulator.start(&circuit)?;
    loop {
        let position = run.cursor();
        match run.step()? {
            StepOutcome::Finished => break,
            outcome => println!(
                "{:<22} {:?}\n    {}",
                circuit.gate_sequence()[position].to_string(),
                outcome,
                run.state().to_ket_string()
            ),
        }
    }
    print!("{}", run.registers());

    let bloch = run.state().reduced_bloch(2)?;
    println!(
        "q[2] Bloch vector: ({:.3}, {:.3}, {:.3}), expected ({:.3}, 0.000, {:.3})",
        bloch.x,
        bloch.y,
        bloch.z,
        theta.sin(),
        theta.cos()
    );

    Ok(())
}
