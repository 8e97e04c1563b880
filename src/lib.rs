//! # LS-8 Emulator
//!
//! An emulator for the LS-8, a minimal 8-bit register-and-stack computer with
//! 256 bytes of memory and eight byte-sized registers.
//!
//! ## Features
//!
//! - Fetch-decode-execute loop with a closed opcode table
//! - Arithmetic, bitwise, compare, stack and jump instructions
//! - Compatible and corrected ALU modes (see [`alu::AluMode`])
//! - Bounds-checked memory and registers
//! - Text image loader, trace lines, in-memory snapshots
//! - HTTP service with Prometheus metrics
//!
//! ## Example
//!
//! ```rust
//! use ls8_emulator::cpu::Cpu;
//! use ls8_emulator::opcodes::{ADD, HLT, LDI, PRN};
//!
//! let mut cpu = Cpu::new();
//! cpu.load(&[LDI, 0, 8, LDI, 1, 9, ADD, 0, 1, PRN, 0, HLT]).unwrap();
//!
//! let mut console = Vec::new();
//! cpu.run(&mut console).unwrap();
//!
//! assert_eq!(console, b"17\n");
//! assert!(cpu.is_halted());
//! ```

pub mod alu;
pub mod cpu;
pub mod error;
pub mod loader;
pub mod memory;
pub mod metrics;
pub mod opcodes;
pub mod registers;
pub mod server;
pub mod snapshots;

pub use cpu::{Cpu, MachineConfig};
pub use error::{LoadError, Ls8Error};
pub use memory::Memory;
