use std::f64::consts::PI;

use tracing::debug;

use super::lexer::{tokenize, Token};
use crate::circuit::Circuit;
use crate::error::{QuboxError, Result};
use crate::instruction::{ClassicalBit, Condition, CustomGate, Gate, GateKind};

/// Parse QASM text into a circuit. Any malformed line fails the whole decode.
pub fn decode(text: &str) -> Result<Circuit> {
    let mut decoder = Decoder::default();
    let mut num_lines = 0;
    for (i, line) in text.lines().enumerate() {
        num_lines = i + 1;
        let tokens = tokenize(line).map_err(|token| QuboxError::MalformedQasm {
            line: i + 1,
            text: line.trim().to_string(),
            reason: format!("unrecognized token `{token}`"),
        })?;
        if tokens.is_empty() {
            continue;
        }

        let mut parser = LineParser {
            tokens,
            pos: 0,
            line: i + 1,
            text: line,
        };
        while !parser.at_end() {
            parser.parse_statement(&mut decoder)?;
        }
    }

    if let Some(open) = decoder.open_gate {
        return Err(QuboxError::MalformedQasm {
            line: open.line,
            text: open.text,
            reason: format!("gate definition `{}` is missing its closing `}}`", open.name),
        });
    }

    decoder.circuit.ok_or_else(|| QuboxError::MalformedQasm {
        line: num_lines,
        text: String::new(),
        reason: "missing qreg declaration".to_string(),
    })
}

/// Circuit under construction plus declarations seen so far.
#[derive(Default)]
struct Decoder {
    circuit: Option<Circuit>,
    qreg: Option<(String, usize)>,
    /// `creg` lines that appeared before the `qreg`.
    pending_cregs: Vec<(String, usize)>,
    /// A `gate` block whose closing `}` has not been read yet.
    open_gate: Option<OpenGate>,
}

struct OpenGate {
    name: String,
    formals: Vec<String>,
    body: Vec<Gate>,
    line: usize,
    text: String,
}

/// A decoded statement: a primitive gate or an application of a custom gate.
enum Instruction {
    Gate(Gate),
    Custom { name: String, qubits: Vec<usize> },
}

struct LineParser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    line: usize,
    text: &'a str,
}

impl LineParser<'_> {
    fn error(&self, reason: impl Into<String>) -> QuboxError {
        QuboxError::MalformedQasm {
            line: self.line,
            text: self.text.trim().to_string(),
            reason: reason.into(),
        }
    }

    /// Re-wrap a circuit construction error with this line's context.
    fn wrap(&self, err: QuboxError) -> QuboxError {
        self.error(err.to_string())
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn check(&self, token: &Token) -> bool {
        self.peek() == Some(token)
    }

    fn consume(&mut self, token: &Token) -> bool {
        if self.check(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: Token) -> Result<()> {
        match self.advance() {
            Some(found) if found == token => Ok(()),
            Some(found) => Err(self.error(format!("expected `{token}`, found `{found}`"))),
            None => Err(self.error(format!("expected `{token}` before end of line"))),
        }
    }

    fn expect_identifier(&mut self) -> Result<String> {
        match self.advance() {
            Some(Token::Identifier(name)) => Ok(name),
            Some(found) => Err(self.error(format!("expected identifier, found `{found}`"))),
            None => Err(self.error("expected identifier before end of line")),
        }
    }

    fn expect_integer(&mut self) -> Result<usize> {
        match self.advance() {
            Some(Token::Integer(digits)) => digits
                .parse()
                .map_err(|_| self.error(format!("unparsable integer `{digits}`"))),
            Some(found) => Err(self.error(format!("expected integer, found `{found}`"))),
            None => Err(self.error("expected integer before end of line")),
        }
    }

    /// `name[size]`
    fn parse_declaration(&mut self) -> Result<(String, usize)> {
        let name = self.expect_identifier()?;
        self.expect(Token::LBracket)?;
        let size = self.expect_integer()?;
        self.expect(Token::RBracket)?;
        self.expect(Token::Semicolon)?;
        Ok((name, size))
    }

    fn parse_statement(&mut self, decoder: &mut Decoder) -> Result<()> {
        if decoder.open_gate.is_some() {
            return self.parse_gate_body_statement(decoder);
        }
        match self.peek().cloned() {
            Some(Token::OpenQasm) => {
                self.advance();
                match self.advance() {
                    Some(Token::Float(version)) if version == 2.0 => {}
                    Some(found) => {
                        return Err(self.error(format!("unsupported OPENQASM version `{found}`")))
                    }
                    None => return Err(self.error("missing OPENQASM version")),
                }
                self.expect(Token::Semicolon)
            }
            Some(Token::Include) => {
                self.advance();
                match self.advance() {
                    Some(Token::StringLiteral(_)) => self.expect(Token::Semicolon),
                    _ => Err(self.error("include expects a quoted file name")),
                }
            }
            Some(Token::QReg) => {
                self.advance();
                let (name, size) = self.parse_declaration()?;
                if decoder.qreg.is_some() {
                    return Err(self.error("only one qreg declaration is supported"));
                }
                let mut circuit = Circuit::new(size).map_err(|e| self.wrap(e))?;
                for (creg, creg_size) in decoder.pending_cregs.drain(..) {
                    circuit
                        .add_register(&creg, creg_size)
                        .map_err(|e| self.wrap(e))?;
                }
                debug!(line = self.line, %name, size, "declared qreg");
                decoder.circuit = Some(circuit);
                decoder.qreg = Some((name, size));
                Ok(())
            }
            Some(Token::CReg) => {
                self.advance();
                let (name, size) = self.parse_declaration()?;
                match decoder.circuit.as_mut() {
                    Some(circuit) => circuit.add_register(&name, size).map_err(|e| self.wrap(e)),
                    None => {
                        decoder.pending_cregs.push((name, size));
                        Ok(())
                    }
                }
            }
            Some(Token::Barrier) => {
                self.advance();
                let qreg = self.qreg(decoder)?;
                loop {
                    let name = self.expect_identifier()?;
                    if name != qreg.0 {
                        return Err(self.error(format!("unknown quantum register `{name}`")));
                    }
                    if self.consume(&Token::LBracket) {
                        let index = self.expect_integer()?;
                        self.check_qubit(&qreg, index)?;
                        self.expect(Token::RBracket)?;
                    }
                    if !self.consume(&Token::Comma) {
                        break;
                    }
                }
                self.expect(Token::Semicolon)
            }
            Some(Token::GateDef) => {
                self.advance();
                self.qreg(decoder)?;
                let name = self.expect_identifier()?;
                if self.check(&Token::LParen) {
                    return Err(self.error(format!(
                        "gate definition `{name}` may not take parameters"
                    )));
                }
                let mut formals = vec![self.expect_identifier()?];
                while self.consume(&Token::Comma) {
                    let formal = self.expect_identifier()?;
                    if formals.contains(&formal) {
                        return Err(self.error(format!("argument `{formal}` listed twice")));
                    }
                    formals.push(formal);
                }
                self.expect(Token::LBrace)?;
                decoder.open_gate = Some(OpenGate {
                    name,
                    formals,
                    body: Vec::new(),
                    line: self.line,
                    text: self.text.trim().to_string(),
                });
                Ok(())
            }
            Some(Token::If) => {
                self.advance();
                let condition = self.parse_condition()?;
                let instruction = self.parse_instruction(decoder)?;
                self.add(decoder, instruction, Some(condition))
            }
            Some(Token::Identifier(_)) => {
                let instruction = self.parse_instruction(decoder)?;
                self.add(decoder, instruction, None)
            }
            Some(found) => Err(self.error(format!("unexpected `{found}` at start of statement"))),
            None => Err(self.error("empty statement")),
        }
    }

    fn qreg(&self, decoder: &Decoder) -> Result<(String, usize)> {
        decoder
            .qreg
            .clone()
            .ok_or_else(|| self.error("instruction before qreg declaration"))
    }

    fn check_qubit(&self, qreg: &(String, usize), index: usize) -> Result<()> {
        if index >= qreg.1 {
            return Err(self.error(format!(
                "qubit index {} out of range for register '{}' of size {}",
                index, qreg.0, qreg.1
            )));
        }
        Ok(())
    }

    fn add(
        &self,
        decoder: &mut Decoder,
        instruction: Instruction,
        condition: Option<Condition>,
    ) -> Result<()> {
        let circuit = decoder
            .circuit
            .as_mut()
            .ok_or_else(|| self.error("instruction before qreg declaration"))?;
        let added = match (instruction, condition) {
            (Instruction::Gate(gate), Some(condition)) => {
                debug!(line = self.line, %gate, "decoded instruction");
                circuit.add_conditional_gate(gate, condition, None).map(|_| ())
            }
            (Instruction::Gate(gate), None) => {
                debug!(line = self.line, %gate, "decoded instruction");
                circuit.add_gate(gate, None).map(|_| ())
            }
            (Instruction::Custom { name, qubits }, condition) => {
                debug!(line = self.line, %name, ?qubits, "decoded custom gate");
                circuit
                    .add_custom_gate_with(&name, &qubits, condition)
                    .map(|_| ())
            }
        };
        added.map_err(|e| self.wrap(e))
    }

    /// One statement inside an open `gate` block, or its closing `}`.
    fn parse_gate_body_statement(&mut self, decoder: &mut Decoder) -> Result<()> {
        let (Some(open), Some(circuit)) = (decoder.open_gate.as_mut(), decoder.circuit.as_mut())
        else {
            return Err(self.error("gate body outside a gate definition"));
        };

        if self.consume(&Token::RBrace) {
            let name = open.name.clone();
            let body = std::mem::take(&mut open.body);
            let gate = CustomGate::new(name, open.formals.len(), body).map_err(|e| self.wrap(e))?;
            circuit.define_custom_gate(gate).map_err(|e| self.wrap(e))?;
            decoder.open_gate = None;
            return Ok(());
        }

        let keyword = self.expect_identifier()?;
        let params = self.parse_params()?;
        let mut qubits = vec![self.parse_formal(&open.formals)?];
        while self.consume(&Token::Comma) {
            qubits.push(self.parse_formal(&open.formals)?);
        }
        self.expect(Token::Semicolon)?;

        let gates = match GateKind::from_keyword(&keyword) {
            Some(kind) => {
                self.check_arity(kind, params.len(), qubits.len())?;
                vec![Gate::new(kind, &qubits, &params).map_err(|e| self.wrap(e))?]
            }
            None => {
                let custom = circuit
                    .custom_gate(&keyword)
                    .ok_or_else(|| self.error(format!("unknown instruction `{keyword}`")))?;
                if !params.is_empty() {
                    return Err(self.error(format!("`{keyword}` takes no parameters")));
                }
                custom.expand(&qubits).map_err(|e| self.wrap(e))?
            }
        };
        open.body.extend(gates);
        Ok(())
    }

    /// A formal argument of the enclosing gate definition, as its relative index.
    fn parse_formal(&mut self, formals: &[String]) -> Result<usize> {
        let name = self.expect_identifier()?;
        formals
            .iter()
            .position(|formal| *formal == name)
            .ok_or_else(|| self.error(format!("`{name}` is not an argument of this gate")))
    }

    /// Optional `(expr, ...)` after an instruction keyword.
    fn parse_params(&mut self) -> Result<Vec<f64>> {
        let mut params = Vec::new();
        if self.consume(&Token::LParen) {
            if !self.check(&Token::RParen) {
                params.push(self.parse_expression()?);
                while self.consume(&Token::Comma) {
                    params.push(self.parse_expression()?);
                }
            }
            self.expect(Token::RParen)?;
        }
        Ok(params)
    }

    fn check_arity(&self, kind: GateKind, num_params: usize, num_qubits: usize) -> Result<()> {
        if num_params != kind.num_params() {
            return Err(self.error(format!(
                "`{}` takes {} parameter(s), got {}",
                kind,
                kind.num_params(),
                num_params
            )));
        }
        if num_qubits != kind.num_qubits() {
            return Err(self.error(format!(
                "`{}` expects {} qubit argument(s), got {}",
                kind,
                kind.num_qubits(),
                num_qubits
            )));
        }
        Ok(())
    }

    /// `(c==3)` or `(c[0]==1)`
    fn parse_condition(&mut self) -> Result<Condition> {
        self.expect(Token::LParen)?;
        let register = self.expect_identifier()?;
        let index = if self.consume(&Token::LBracket) {
            let index = self.expect_integer()?;
            self.expect(Token::RBracket)?;
            Some(index)
        } else {
            None
        };
        self.expect(Token::EqEq)?;
        let value = self.expect_integer()?;
        self.expect(Token::RParen)?;

        match index {
            Some(index) => {
                let value = match value {
                    0 => false,
                    1 => true,
                    _ => return Err(self.error(format!("bit condition compares to {value}"))),
                };
                Ok(Condition::bit(ClassicalBit::new(register, index), value))
            }
            None => Ok(Condition::register(register, value as u64)),
        }
    }

    /// A gate, custom gate, `measure` or `reset` statement including its `;`.
    fn parse_instruction(&mut self, decoder: &Decoder) -> Result<Instruction> {
        let keyword = self.expect_identifier()?;
        let kind = GateKind::from_keyword(&keyword);
        let is_custom = decoder
            .circuit
            .as_ref()
            .is_some_and(|circuit| circuit.custom_gate(&keyword).is_some());
        if kind.is_none() && !is_custom {
            return Err(self.error(format!("unknown instruction `{keyword}`")));
        }
        let qreg = self.qreg(decoder)?;

        let params = self.parse_params()?;
        let mut qubits = vec![self.parse_qubit(&qreg)?];
        while self.consume(&Token::Comma) {
            qubits.push(self.parse_qubit(&qreg)?);
        }

        let Some(kind) = kind else {
            if !params.is_empty() {
                return Err(self.error(format!("`{keyword}` takes no parameters")));
            }
            self.expect(Token::Semicolon)?;
            return Ok(Instruction::Custom {
                name: keyword,
                qubits,
            });
        };
        self.check_arity(kind, params.len(), qubits.len())?;

        let gate = if kind == GateKind::Measure {
            self.expect(Token::Arrow)?;
            let register = self.expect_identifier()?;
            self.expect(Token::LBracket)?;
            let index = self.expect_integer()?;
            self.expect(Token::RBracket)?;
            Gate::measure_into(qubits[0], ClassicalBit::new(register, index))
        } else {
            Gate::new(kind, &qubits, &params).map_err(|e| self.wrap(e))?
        };
        self.expect(Token::Semicolon)?;
        Ok(Instruction::Gate(gate))
    }

    /// `q[i]`
    fn parse_qubit(&mut self, qreg: &(String, usize)) -> Result<usize> {
        let name = self.expect_identifier()?;
        if name != qreg.0 {
            return Err(self.error(format!("unknown quantum register `{name}`")));
        }
        self.expect(Token::LBracket)?;
        let index = self.expect_integer()?;
        self.expect(Token::RBracket)?;
        self.check_qubit(qreg, index)?;
        Ok(index)
    }

    /// Angle expression: numbers, `pi`, unary sign, `+ - * /`, parentheses.
    fn parse_expression(&mut self) -> Result<f64> {
        let mut value = self.parse_term()?;
        loop {
            if self.consume(&Token::Plus) {
                value += self.parse_term()?;
            } else if self.consume(&Token::Minus) {
                value -= self.parse_term()?;
            } else {
                return Ok(value);
            }
        }
    }

    fn parse_term(&mut self) -> Result<f64> {
        let mut value = self.parse_unary()?;
        loop {
            if self.consume(&Token::Star) {
                value *= self.parse_unary()?;
            } else if self.consume(&Token::Slash) {
                value /= self.parse_unary()?;
            } else {
                return Ok(value);
            }
        }
    }

    fn parse_unary(&mut self) -> Result<f64> {
        if self.consume(&Token::Minus) {
            return Ok(-self.parse_unary()?);
        }
        if self.consume(&Token::Plus) {
            return self.parse_unary();
        }
        match self.advance() {
            Some(Token::Float(value)) => Ok(value),
            Some(Token::Integer(digits)) => digits
                .parse::<f64>()
                .map_err(|_| self.error(format!("unparsable number `{digits}`"))),
            Some(Token::Pi) => Ok(PI),
            Some(Token::LParen) => {
                let value = self.parse_expression()?;
                self.expect(Token::RParen)?;
                Ok(value)
            }
            Some(found) => Err(self.error(format!("expected number, found `{found}`"))),
            None => Err(self.error("expected number before end of line")),
        }
    }
}
