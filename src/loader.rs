//! Reads LS-8 text images.
//!
//! An image holds one byte per line written in binary. Anything after `#`
//! is a comment, and lines with no payload are skipped without using up an
//! address:
//!
//! ```text
//! 10000010 # LDI R0,8
//! 00000000
//! 00001000
//!
//! 00000001 # HLT
//! ```

use std::fs;
use std::io;
use std::path::Path;

use crate::error::LoadError;
use crate::memory::MEMORY_SIZE;

/// Parse the text of an image into bytes, in address order from 0.
pub fn parse_image(source: &str) -> Result<Vec<u8>, LoadError> {
    let mut program = Vec::new();

    for (index, line) in source.lines().enumerate() {
        let payload = line.split('#').next().unwrap_or("").trim();
        if payload.is_empty() {
            continue;
        }

        if !payload.bytes().all(|b| b == b'0' || b == b'1') {
            return Err(invalid_literal(index, payload));
        }
        let byte = u8::from_str_radix(payload, 2).map_err(|_| invalid_literal(index, payload))?;

        if program.len() == MEMORY_SIZE {
            return Err(LoadError::ImageTooLarge {
                capacity: MEMORY_SIZE,
            });
        }
        program.push(byte);
    }

    Ok(program)
}

/// Read and parse an image file.
pub fn load_file<P: AsRef<Path>>(path: P) -> Result<Vec<u8>, LoadError> {
    let path = path.as_ref();
    let source = fs::read_to_string(path).map_err(|err| match err.kind() {
        io::ErrorKind::NotFound => LoadError::NotFound(path.to_path_buf()),
        _ => LoadError::Io(err),
    })?;
    parse_image(&source)
}

fn invalid_literal(index: usize, payload: &str) -> LoadError {
    LoadError::InvalidLiteral {
        line: index + 1,
        text: payload.to_string(),
    }
}
