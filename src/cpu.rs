use std::io::Write;

use log::{debug, log_enabled, trace, Level};
use serde::{Deserialize, Serialize};

use crate::alu::AluMode;
use crate::error::{Ls8Error, Result};
use crate::memory::Memory;
use crate::metrics::{record_instruction, record_program_run, Timer};
use crate::opcodes::{ControlOp, Handler, Opcode};
use crate::registers::{RegisterFile, FLAG_EQUAL, REGISTER_COUNT, STACK_SEED_REGISTER};

/// Tunables for a single machine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineConfig {
    pub alu_mode: AluMode,
    /// Upper bound on instructions executed by one call to [`Cpu::run`].
    pub max_steps: Option<u64>,
}

/// The LS-8 machine: memory, registers, and the control unit state.
///
/// The stack pointer is copied from register 7 once, when the machine is
/// built. After that the two are independent: PUSH and POP move `sp` and
/// never touch register 7, and writing register 7 never moves `sp`.
#[derive(Debug, Clone)]
pub struct Cpu {
    pub(crate) memory: Memory,
    pub(crate) registers: RegisterFile,
    pub(crate) sp: u8,
    pub(crate) pc: usize,
    pub(crate) halted: bool,
    pub(crate) steps: u64,
    pub(crate) config: MachineConfig,
}

impl Cpu {
    pub fn new() -> Self {
        Self::with_config(MachineConfig::default())
    }

    pub fn with_config(config: MachineConfig) -> Self {
        Self::with_registers([0; REGISTER_COUNT], config)
    }

    /// Build a machine with preset registers; `sp` is seeded from register 7.
    pub fn with_registers(registers: [u8; REGISTER_COUNT], config: MachineConfig) -> Self {
        Cpu {
            memory: Memory::new(),
            registers: RegisterFile::from_values(registers),
            sp: registers[STACK_SEED_REGISTER],
            pc: 0,
            halted: false,
            steps: 0,
            config,
        }
    }

    /// Copy a program image into memory at address 0.
    pub fn load(&mut self, image: &[u8]) -> Result<()> {
        self.memory.load_image(image, 0)
    }

    /// Fetch, decode and execute one instruction. Does nothing once halted.
    pub fn step<W: Write>(&mut self, out: &mut W) -> Result<()> {
        if self.halted {
            return Ok(());
        }

        if log_enabled!(Level::Trace) {
            trace!("{}", self.trace_line());
        }

        let opcode = self.memory.read(self.pc)?;
        let operand_a = self.memory.read(self.pc + 1)?;
        let operand_b = self.memory.read(self.pc + 2)?;

        let timer = Timer::new();
        let instruction = match Opcode::decode(opcode) {
            Some(instruction) => instruction,
            None => {
                self.halted = true;
                debug!("unrecognized opcode 0x{:02X} at PC {:02X}", opcode, self.pc);
                return Err(Ls8Error::UnrecognizedOpcode {
                    opcode,
                    pc: self.pc,
                });
            }
        };

        match instruction.handler() {
            Handler::Control(op) => self.control(op, operand_a, operand_b, out)?,
            Handler::Alu(op) => self.alu(op, operand_a, operand_b)?,
        }

        self.steps += 1;
        record_instruction(instruction.mnemonic(), timer.elapsed());
        Ok(())
    }

    /// Run until HLT. Returns the number of instructions executed.
    pub fn run<W: Write>(&mut self, out: &mut W) -> Result<u64> {
        let start = self.steps;
        while !self.halted {
            if let Some(limit) = self.config.max_steps {
                if self.steps - start >= limit {
                    return Err(Ls8Error::StepLimitExceeded(limit));
                }
            }
            self.step(out)?;
        }
        record_program_run(self.config.alu_mode);
        Ok(self.steps - start)
    }

    fn control<W: Write>(&mut self, op: ControlOp, a: u8, b: u8, out: &mut W) -> Result<()> {
        match op {
            ControlOp::Halt => {
                self.halted = true;
                self.pc += 1;
            }
            ControlOp::Print => {
                let value = self.registers.get(a as usize)?;
                writeln!(out, "{}", value)?;
                self.pc += 2;
            }
            ControlOp::LoadImmediate => {
                self.registers.set(a as usize, b)?;
                self.pc += 3;
            }
            ControlOp::Jump => self.jump_if(true, a)?,
            ControlOp::JumpIfEqual => self.jump_if(self.registers.flags() == FLAG_EQUAL, a)?,
            ControlOp::JumpIfNotEqual => {
                self.jump_if(self.registers.flags() != FLAG_EQUAL, a)?
            }
        }
        Ok(())
    }

    // Jump to the address held in `register`, or skip the 2-byte instruction
    fn jump_if(&mut self, condition: bool, register: u8) -> Result<()> {
        if condition {
            self.pc = self.registers.get(register as usize)? as usize;
        } else {
            self.pc += 2;
        }
        Ok(())
    }

    /// One line of machine state: PC, the three bytes at PC, and registers.
    pub fn trace_line(&self) -> String {
        let peek = |address: usize| {
            self.memory
                .read(address)
                .map_or_else(|_| "--".to_string(), |byte| format!("{:02X}", byte))
        };

        let mut line = format!(
            "TRACE: {:02X} | {} {} {} |",
            self.pc,
            peek(self.pc),
            peek(self.pc + 1),
            peek(self.pc + 2)
        );
        for value in self.registers.values() {
            line.push_str(&format!(" {:02X}", value));
        }
        line
    }

    // Getters
    pub fn pc(&self) -> usize { self.pc }
    pub fn sp(&self) -> u8 { self.sp }
    pub fn flags(&self) -> u8 { self.registers.flags() }
    pub fn steps(&self) -> u64 { self.steps }
    pub fn is_halted(&self) -> bool { self.halted }
    pub fn config(&self) -> &MachineConfig { &self.config }
    pub fn memory(&self) -> &Memory { &self.memory }
    pub fn registers(&self) -> [u8; REGISTER_COUNT] { self.registers.values() }

    pub fn register(&self, index: usize) -> Result<u8> {
        self.registers.get(index)
    }

    pub fn set_register(&mut self, index: usize, value: u8) -> Result<()> {
        self.registers.set(index, value)
    }

    pub fn memory_mut(&mut self) -> &mut Memory {
        &mut self.memory
    }
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}
