use anyhow::Result;
use qubox::{Circuit, Simulator};

fn main() -> Result<()> {
    let circuit = Circuit::new(2)?.bell(0, 1)?;
    println!("Circuit:\n{}", circuit);
    println!("QASM:\n{}", circuit.to_qasm());

    let mut simulator = Simulator::seeded(7);
    let result = simulator.run(&circuit)?;
    println!("Resulting state: {}", result.state().to_ket_string());

    for qubit in 0..circuit.num_of_qbits() {
        let bloch = result.reduced_bloch(qubit)?;
        println!(
            "q[{}] Bloch vector: ({:.3}, {:.3}, {:.3})",
            qubit, bloch.x, bloch.y, bloch.z
        );
    }

    let measured = circuit.measure(0)?.measure(1)?;
    println!("Counts: {:?}", simulator.sample(&measured, 1000)?);

    Ok(())
}
