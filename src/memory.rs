use crate::error::{Ls8Error, Result};

/// Number of addressable cells.
pub const MEMORY_SIZE: usize = 256;

#[derive(Debug, Clone)]
pub struct Memory {
    data: [u8; MEMORY_SIZE],
}

impl Memory {
    pub fn new() -> Self {
        Memory {
            data: [0; MEMORY_SIZE],
        }
    }

    pub fn read(&self, address: usize) -> Result<u8> {
        self.data
            .get(address)
            .copied()
            .ok_or(Ls8Error::AddressOutOfRange(address))
    }

    pub fn write(&mut self, address: usize, value: u8) -> Result<()> {
        let cell = self
            .data
            .get_mut(address)
            .ok_or(Ls8Error::AddressOutOfRange(address))?;
        *cell = value;
        Ok(())
    }

    // Copy an image into memory starting at `start_address`
    pub fn load_image(&mut self, data: &[u8], start_address: usize) -> Result<()> {
        let end = start_address + data.len();
        if end > MEMORY_SIZE {
            return Err(Ls8Error::AddressOutOfRange(end - 1));
        }
        self.data[start_address..end].copy_from_slice(data);
        Ok(())
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}
