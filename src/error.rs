use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Faults raised while the machine is executing.
#[derive(Debug, Error)]
pub enum Ls8Error {
    #[error("memory address {0} is out of range (0-255)")]
    AddressOutOfRange(usize),

    #[error("register index {0} is out of range (0-7)")]
    RegisterOutOfRange(usize),

    #[error("unrecognized opcode 0b{opcode:08b} (0x{opcode:02X}) at PC {pc:02X}")]
    UnrecognizedOpcode { opcode: u8, pc: usize },

    #[error("unsupported ALU operation: {0}")]
    UnsupportedAluOperation(String),

    #[error("step limit of {0} reached before HLT")]
    StepLimitExceeded(u64),

    #[error("console write failed: {0}")]
    Console(#[from] io::Error),
}

/// Failures while turning a text image into memory contents.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("failed to read image: {0}")]
    Io(#[from] io::Error),

    #[error("line {line}: '{text}' is not an 8-bit binary literal")]
    InvalidLiteral { line: usize, text: String },

    #[error("image has more than {capacity} bytes")]
    ImageTooLarge { capacity: usize },
}

/// Invalid service configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value '{value}' for {key}")]
    InvalidValue { key: &'static str, value: String },
}

pub type Result<T> = std::result::Result<T, Ls8Error>;

/// A snapshot that cannot be applied to a machine.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("truncated run-length data at offset {0}")]
    Truncated(usize),

    #[error("memory dump expands to {0} bytes, expected 256")]
    WrongSize(usize),
}
