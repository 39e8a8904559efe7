//! OpenQASM 2.0 subset codec.
//!
//! | Statement | Example |
//! |-----------|---------|
//! | Version | `OPENQASM 2.0;` |
//! | Include | `include "qelib1.inc";` |
//! | Quantum register | `qreg q[3];` (exactly one) |
//! | Classical register | `creg c[3];` |
//! | Fixed gates | `h q[0];` `x` `y` `z` `s` `t` |
//! | Rotations | `rx(pi/2) q[0];` `ry` `rz` `p` |
//! | Multi-qubit | `cx q[0],q[1];` `ccx q[0],q[1],q[2];` `swap q[0],q[1];` |
//! | Measurement | `measure q[0] -> c[0];` |
//! | Reset | `reset q[0];` |
//! | Condition | `if(c==1) x q[2];` `if(c[0]==1) z q[2];` |
//! | Barrier | `barrier q;` (parsed and dropped) |
//! | Gate definition | `gate bell a,b { h a; cx a,b; }` (may span lines) |
//! | Custom gate | `bell q[0],q[1];` (expanded into its body) |
//!
//! Decoding is all-or-nothing: the first malformed line fails the whole text.

mod emitter;
mod lexer;
mod parser;

pub(crate) use lexer::is_identifier;

pub use emitter::encode;
pub use parser::decode;
