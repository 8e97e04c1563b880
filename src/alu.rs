//! Arithmetic-logic unit: arithmetic, bitwise, compare and stack operations.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::cpu::Cpu;
use crate::error::{Ls8Error, Result};
use crate::registers::{FLAGS_REGISTER, FLAG_EQUAL, FLAG_GREATER, FLAG_LESS};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AluOp {
    Add,
    Sub,
    Mul,
    And,
    Or,
    Xor,
    Not,
    Shl,
    Shr,
    Push,
    Pop,
    Cmp,
}

/// Selects how the operations with known quirks behave.
///
/// `Compatible` reproduces the historical behavior bit for bit: SUB
/// multiplies, and AND/OR/XOR/NOT/SHL/SHR combine the operand *indices*
/// rather than the registers they name. `Corrected` gives conventional
/// semantics for those operations. Everything else is identical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AluMode {
    #[default]
    Compatible,
    Corrected,
}

impl AluOp {
    pub fn name(self) -> &'static str {
        match self {
            AluOp::Add => "ADD",
            AluOp::Sub => "SUB",
            AluOp::Mul => "MUL",
            AluOp::And => "AND",
            AluOp::Or => "OR",
            AluOp::Xor => "XOR",
            AluOp::Not => "NOT",
            AluOp::Shl => "SHL",
            AluOp::Shr => "SHR",
            AluOp::Push => "PUSH",
            AluOp::Pop => "POP",
            AluOp::Cmp => "CMP",
        }
    }

    /// Instruction length in bytes, opcode included.
    pub fn length(self) -> usize {
        match self {
            AluOp::Not | AluOp::Push | AluOp::Pop => 2,
            _ => 3,
        }
    }
}

impl fmt::Display for AluOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AluOp {
    type Err = Ls8Error;

    fn from_str(s: &str) -> Result<Self> {
        let op = match s {
            "ADD" => AluOp::Add,
            "SUB" => AluOp::Sub,
            "MUL" => AluOp::Mul,
            "AND" => AluOp::And,
            "OR" => AluOp::Or,
            "XOR" => AluOp::Xor,
            "NOT" => AluOp::Not,
            "SHL" => AluOp::Shl,
            "SHR" => AluOp::Shr,
            "PUSH" => AluOp::Push,
            "POP" => AluOp::Pop,
            "CMP" => AluOp::Cmp,
            other => return Err(Ls8Error::UnsupportedAluOperation(other.to_string())),
        };
        Ok(op)
    }
}

fn shift_left(value: u8, amount: u8) -> u8 {
    value.checked_shl(amount as u32).unwrap_or(0)
}

fn shift_right(value: u8, amount: u8) -> u8 {
    value.checked_shr(amount as u32).unwrap_or(0)
}

fn compare(left: u8, right: u8) -> u8 {
    if left < right {
        FLAG_LESS
    } else if left > right {
        FLAG_GREATER
    } else {
        FLAG_EQUAL
    }
}

impl Cpu {
    /// Execute `op` with operand bytes `a` and `b`, then advance the program
    /// counter by the instruction length. On error nothing is modified.
    pub fn alu(&mut self, op: AluOp, a: u8, b: u8) -> Result<()> {
        let (ra, rb) = (a as usize, b as usize);
        let corrected = self.config.alu_mode == AluMode::Corrected;

        match op {
            AluOp::Add => {
                let value = self.registers.get(ra)?.wrapping_add(self.registers.get(rb)?);
                self.registers.set(ra, value)?;
            }
            AluOp::Sub if corrected => {
                let value = self.registers.get(ra)?.wrapping_sub(self.registers.get(rb)?);
                self.registers.set(ra, value)?;
            }
            AluOp::Sub | AluOp::Mul => {
                let value = self.registers.get(ra)?.wrapping_mul(self.registers.get(rb)?);
                self.registers.set(ra, value)?;
            }
            AluOp::And | AluOp::Or | AluOp::Xor | AluOp::Shl | AluOp::Shr => {
                let (left, right) = if corrected {
                    (self.registers.get(ra)?, self.registers.get(rb)?)
                } else {
                    (a, b)
                };
                let value = match op {
                    AluOp::And => left & right,
                    AluOp::Or => left | right,
                    AluOp::Xor => left ^ right,
                    AluOp::Shl => shift_left(left, right),
                    _ => shift_right(left, right),
                };
                self.registers.set(ra, value)?;
            }
            AluOp::Not => {
                let operand = if corrected { self.registers.get(ra)? } else { a };
                self.registers.set(ra, !operand)?;
            }
            AluOp::Push => {
                let value = self.registers.get(ra)?;
                self.sp = self.sp.wrapping_sub(1);
                self.memory.write(self.sp as usize, value)?;
            }
            AluOp::Pop => {
                let value = self.memory.read(self.sp as usize)?;
                self.registers.set(ra, value)?;
                self.sp = self.sp.wrapping_add(1);
            }
            AluOp::Cmp => {
                let flags = compare(self.registers.get(ra)?, self.registers.get(rb)?);
                self.registers.set(FLAGS_REGISTER, flags)?;
            }
        }

        self.pc += op.length();
        Ok(())
    }
}
