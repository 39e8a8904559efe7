use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use qubox::{Circuit, Simulator};

/// Run an OpenQASM 2.0 circuit on the state vector simulator
#[derive(Parser, Debug)]
#[command(name = "qubox")]
#[command(about = "Simulate a QASM circuit and print the final state")]
struct Args {
    /// QASM source file
    file: PathBuf,

    /// Seed for measurement outcomes
    #[arg(long)]
    seed: Option<u64>,

    /// Also sample the classical outcome this many times
    #[arg(long)]
    shots: Option<usize>,

    /// Print the Bloch vector of these qubits
    #[arg(long)]
    bloch: Vec<usize>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let source = fs::read_to_string(&args.file)
        .with_context(|| format!("Failed to read {}", args.file.display()))?;
    let circuit = Circuit::from_qasm(&source)?;
    println!("Circuit:\n{circuit}");

    let mut simulator = match args.seed {
        Some(seed) => Simulator::seeded(seed),
        None => Simulator::new(),
    };

    let result = simulator.run(&circuit)?;
    println!("State: {}", result.state().to_ket_string());

    println!("Probabilities:");
    for (label, probability) in result.state().probability_distribution() {
        println!("  |{label}>: {probability:.6}");
    }

    if !result.registers().is_empty() {
        print!("Registers:\n{}", result.registers());
    }

    for qubit in args.bloch {
        let bloch = result
            .reduced_bloch(qubit)
            .with_context(|| format!("No Bloch vector for qubit {qubit}"))?;
        println!(
            "Bloch q[{qubit}]: ({:.4}, {:.4}, {:.4})",
            bloch.x, bloch.y, bloch.z
        );
    }

    if let Some(shots) = args.shots {
        println!("Counts over {shots} shots:");
        for (outcome, count) in simulator.sample(&circuit, shots)? {
            println!("  {outcome}: {count}");
        }
    }

    Ok(())
}
