//! Classical register contents written by measurements during a run.

use std::collections::BTreeMap;
use std::fmt::{self, Display};

use crate::error::{QuboxError, Result};
use crate::instruction::{ClassicalBit, Condition};

/// Named registers of measured bits; `None` marks a bit not yet written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassicalRegisters {
    registers: BTreeMap<String, Vec<Option<bool>>>,
}

impl ClassicalRegisters {
    /// Empty registers shaped after `(name, size)` declarations.
    pub fn with_layout<'a>(layout: impl IntoIterator<Item = (&'a str, usize)>) -> Self {
        Self {
            registers: layout
                .into_iter()
                .map(|(name, size)| (name.to_string(), vec![None; size]))
                .collect(),
        }
    }

    fn unresolved(bit: &ClassicalBit) -> QuboxError {
        QuboxError::UnresolvedClassicalReference {
            register: bit.register.clone(),
            index: bit.index,
        }
    }

    pub fn get(&self, bit: &ClassicalBit) -> Option<bool> {
        self.registers
            .get(&bit.register)
            .and_then(|bits| bits.get(bit.index).copied().flatten())
    }

    pub(crate) fn set(&mut self, bit: &ClassicalBit, value: bool) -> Result<()> {
        let slot = self
            .registers
            .get_mut(&bit.register)
            .and_then(|bits| bits.get_mut(bit.index))
            .ok_or_else(|| Self::unresolved(bit))?;
        *slot = Some(value);
        Ok(())
    }

    /// Bits of a register, index 0 first.
    pub fn register(&self, name: &str) -> Option<&[Option<bool>]> {
        self.registers.get(name).map(Vec::as_slice)
    }

    /// Integer value of a fully written register, bit 0 least significant.
    ///
    /// Fails with `RegisterOverflow` if a bit past the 64th is set.
    pub fn value(&self, name: &str) -> Result<u64> {
        let bits = self
            .registers
            .get(name)
            .ok_or_else(|| QuboxError::UnresolvedClassicalReference {
                register: name.to_string(),
                index: 0,
            })?;
        bits.iter().enumerate().try_fold(0_u64, |acc, (index, bit)| {
            let bit = bit.ok_or_else(|| QuboxError::UnresolvedClassicalReference {
                register: name.to_string(),
                index,
            })?;
            if !bit {
                return Ok(acc);
            }
            u32::try_from(index)
                .ok()
                .and_then(|shift| 1_u64.checked_shl(shift))
                .map(|mask| acc | mask)
                .ok_or_else(|| QuboxError::RegisterOverflow {
                    register: name.to_string(),
                    size: bits.len(),
                })
        })
    }

    /// Evaluate a gate condition; reading an unwritten bit is an error.
    pub fn evaluate(&self, condition: &Condition) -> Result<bool> {
        match condition {
            Condition::Bit { bit, value } => {
                let measured = self.get(bit).ok_or_else(|| Self::unresolved(bit))?;
                Ok(measured == *value)
            }
            Condition::Register { register, value } => Ok(self.value(register)? == *value),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Option<bool>])> {
        self.registers
            .iter()
            .map(|(name, bits)| (name.as_str(), bits.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.registers.is_empty()
    }

    /// Every register's bit string, space separated in name order.
    pub fn outcome(&self) -> String {
        self.registers
            .values()
            .map(|bits| bit_string(bits))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Highest index leftmost, `?` for unwritten bits.
fn bit_string(bits: &[Option<bool>]) -> String {
    bits.iter()
        .rev()
        .map(|bit| match bit {
            Some(true) => '1',
            Some(false) => '0',
            None => '?',
        })
        .collect()
}

impl Display for ClassicalRegisters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, bits) in self.iter() {
            writeln!(f, "{name}: {}", bit_string(bits))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unwritten_bit_is_unresolved() {
        let registers = ClassicalRegisters::with_layout([("c", 2)]);
        let condition = Condition::bit(ClassicalBit::new("c", 1), true);
        assert_eq!(
            registers.evaluate(&condition),
            Err(QuboxError::UnresolvedClassicalReference {
                register: "c".to_string(),
                index: 1
            })
        );
    }

    #[test]
    fn test_register_value_is_little_endian() {
        let mut registers = ClassicalRegisters::with_layout([("c", 3)]);
        registers.set(&ClassicalBit::new("c", 0), true).unwrap();
        registers.set(&ClassicalBit::new("c", 1), false).unwrap();
        assert!(registers.value("c").is_err());

        registers.set(&ClassicalBit::new("c", 2), true).unwrap();
        assert_eq!(registers.value("c"), Ok(0b101));
        assert_eq!(registers.evaluate(&Condition::register("c", 5)), Ok(true));
        assert_eq!(registers.to_string(), "c: 101\n");
    }

    #[test]
    fn test_outcome_joins_registers() {
        let mut registers = ClassicalRegisters::with_layout([("c", 2), ("a", 1)]);
        registers.set(&ClassicalBit::new("c", 1), true).unwrap();
        registers.set(&ClassicalBit::new("a", 0), false).unwrap();
        assert_eq!(registers.outcome(), "0 1?");
    }

    #[test]
    fn test_set_outside_layout_fails() {
        let mut registers = ClassicalRegisters::with_layout([("c", 1)]);
        assert!(registers.set(&ClassicalBit::new("c", 1), true).is_err());
        assert!(registers.set(&ClassicalBit::new("m", 0), true).is_err());
    }

    #[test]
    fn test_value_of_register_wider_than_u64() {
        let mut registers = ClassicalRegisters::with_layout([("big", 70)]);
        for index in 0..70 {
            registers.set(&ClassicalBit::new("big", index), false).unwrap();
        }
        assert_eq!(registers.value("big"), Ok(0));
        assert_eq!(registers.evaluate(&Condition::register("big", 0)), Ok(true));

        registers.set(&ClassicalBit::new("big", 63), true).unwrap();
        assert_eq!(registers.value("big"), Ok(1 << 63));

        registers.set(&ClassicalBit::new("big", 69), true).unwrap();
        assert_eq!(
            registers.evaluate(&Condition::register("big", 0)),
            Err(QuboxError::RegisterOverflow {
                register: "big".to_string(),
                size: 70
            })
        );
    }
}
