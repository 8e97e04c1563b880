use crate::error::{Ls8Error, Result};

pub const REGISTER_COUNT: usize = 8;

/// Register holding the result bits of the last CMP.
pub const FLAGS_REGISTER: usize = 4;
/// Register whose value seeds the stack pointer at construction.
pub const STACK_SEED_REGISTER: usize = 7;

// Flags register bits
pub const FLAG_EQUAL: u8 = 0b0000_0001;
pub const FLAG_GREATER: u8 = 0b0000_0010;
pub const FLAG_LESS: u8 = 0b0000_0100;

/// The eight general-purpose registers. Indices 4 and 7 are only special by
/// convention of the ALU and control unit; this type treats all slots alike.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegisterFile {
    slots: [u8; REGISTER_COUNT],
}

impl RegisterFile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_values(slots: [u8; REGISTER_COUNT]) -> Self {
        RegisterFile { slots }
    }

    pub fn get(&self, index: usize) -> Result<u8> {
        self.slots
            .get(index)
            .copied()
            .ok_or(Ls8Error::RegisterOutOfRange(index))
    }

    pub fn set(&mut self, index: usize, value: u8) -> Result<()> {
        let slot = self
            .slots
            .get_mut(index)
            .ok_or(Ls8Error::RegisterOutOfRange(index))?;
        *slot = value;
        Ok(())
    }

    pub fn flags(&self) -> u8 {
        self.slots[FLAGS_REGISTER]
    }

    pub fn values(&self) -> [u8; REGISTER_COUNT] {
        self.slots
    }
}
