use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::cpu::{Cpu, MachineConfig};
use crate::error::SnapshotError;
use crate::memory::MEMORY_SIZE;
use crate::registers::{RegisterFile, REGISTER_COUNT};

/// Register-level view of a machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuState {
    pub registers: [u8; REGISTER_COUNT],
    pub flags: u8,
    pub pc: usize,
    pub sp: u8,
    pub steps: u64,
    pub halted: bool,
    pub config: MachineConfig,
}

impl CpuState {
    pub fn capture(cpu: &Cpu) -> Self {
        CpuState {
            registers: cpu.registers(),
            flags: cpu.flags(),
            pc: cpu.pc(),
            sp: cpu.sp(),
            steps: cpu.steps(),
            halted: cpu.is_halted(),
            config: *cpu.config(),
        }
    }
}

/// Complete machine state at one point in time, kept in memory only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MachineSnapshot {
    pub id: String,
    pub machine_id: String,
    pub cpu_state: CpuState,
    /// Run-length encoded memory contents
    pub memory_dump: Vec<u8>,
    pub created_at: DateTime<Utc>,
    pub size_bytes: u64,
}

pub type SnapshotStore = Arc<Mutex<HashMap<String, MachineSnapshot>>>;

impl MachineSnapshot {
    pub fn capture(machine_id: &str, cpu: &Cpu) -> Self {
        let memory_dump = compress_memory(cpu.memory().as_slice());
        Self {
            id: Uuid::new_v4().to_string(),
            machine_id: machine_id.to_string(),
            cpu_state: CpuState::capture(cpu),
            size_bytes: memory_dump.len() as u64,
            memory_dump,
            created_at: Utc::now(),
        }
    }

    /// Overwrite every part of `cpu` with the captured state. Leaves `cpu`
    /// untouched if the memory dump is corrupt.
    pub fn restore_into(&self, cpu: &mut Cpu) -> Result<(), SnapshotError> {
        let memory = decompress_memory(&self.memory_dump)?;

        cpu.memory.load_image(&memory, 0).map_err(|_| SnapshotError::WrongSize(memory.len()))?;
        let state = &self.cpu_state;
        cpu.registers = RegisterFile::from_values(state.registers);
        cpu.pc = state.pc;
        cpu.sp = state.sp;
        cpu.steps = state.steps;
        cpu.halted = state.halted;
        cpu.config = state.config;
        Ok(())
    }
}

// Run-length encoding: 0xFF count value for runs, 0xFF 0x00 for a literal 0xFF
fn compress_memory(memory: &[u8]) -> Vec<u8> {
    let mut compressed = Vec::new();
    let mut i = 0;

    while i < memory.len() {
        let current_byte = memory[i];
        let mut count = 1;

        while i + count < memory.len() && memory[i + count] == current_byte && count < 255 {
            count += 1;
        }

        if count > 3 || current_byte == 0 {
            compressed.extend_from_slice(&[0xFF, count as u8, current_byte]);
        } else {
            for _ in 0..count {
                if current_byte == 0xFF {
                    compressed.extend_from_slice(&[0xFF, 0x00]);
                } else {
                    compressed.push(current_byte);
                }
            }
        }

        i += count;
    }

    compressed
}

fn decompress_memory(compressed: &[u8]) -> Result<Vec<u8>, SnapshotError> {
    let mut decompressed = Vec::with_capacity(MEMORY_SIZE);
    let mut i = 0;

    while i < compressed.len() {
        if compressed[i] != 0xFF {
            decompressed.push(compressed[i]);
            i += 1;
            continue;
        }

        match compressed.get(i + 1) {
            None => return Err(SnapshotError::Truncated(i)),
            Some(0x00) => {
                decompressed.push(0xFF);
                i += 2;
            }
            Some(&count) => {
                let value = *compressed.get(i + 2).ok_or(SnapshotError::Truncated(i))?;
                decompressed.extend(std::iter::repeat(value).take(count as usize));
                i += 3;
            }
        }
    }

    if decompressed.len() != MEMORY_SIZE {
        return Err(SnapshotError::WrongSize(decompressed.len()));
    }

    Ok(decompressed)
}
