//! Opcode table mapping instruction bytes to their handlers.

use crate::alu::AluOp;

pub const HLT: u8 = 0b0000_0001;
pub const LDI: u8 = 0b1000_0010;
pub const PRN: u8 = 0b0100_0111;
pub const JMP: u8 = 0b0101_0100;
pub const JEQ: u8 = 0b0101_0101;
pub const JNE: u8 = 0b0101_0110;
pub const ADD: u8 = 0b1010_0000;
pub const SUB: u8 = 0b1010_0001;
pub const MUL: u8 = 0b1010_0010;
pub const CMP: u8 = 0b1010_0111;
pub const AND: u8 = 0b1010_1000;
pub const OR: u8 = 0b1010_1010;
pub const XOR: u8 = 0b1010_1011;
pub const NOT: u8 = 0b0110_1001;
pub const SHL: u8 = 0b1010_1100;
pub const SHR: u8 = 0b1010_1101;
pub const PUSH: u8 = 0b0100_0101;
pub const POP: u8 = 0b0100_0110;

/// Instructions executed by the control unit itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlOp {
    Halt,
    Print,
    LoadImmediate,
    Jump,
    JumpIfEqual,
    JumpIfNotEqual,
}

/// Where a decoded opcode is dispatched to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handler {
    Control(ControlOp),
    Alu(AluOp),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    Hlt,
    Ldi,
    Prn,
    Jmp,
    Jeq,
    Jne,
    Add,
    Sub,
    Mul,
    Cmp,
    And,
    Or,
    Xor,
    Not,
    Shl,
    Shr,
    Push,
    Pop,
}

impl Opcode {
    #[cfg(test)]
    pub const ALL: [Opcode; 18] = [
        Opcode::Hlt,
        Opcode::Ldi,
        Opcode::Prn,
        Opcode::Jmp,
        Opcode::Jeq,
        Opcode::Jne,
        Opcode::Add,
        Opcode::Sub,
        Opcode::Mul,
        Opcode::Cmp,
        Opcode::And,
        Opcode::Or,
        Opcode::Xor,
        Opcode::Not,
        Opcode::Shl,
        Opcode::Shr,
        Opcode::Push,
        Opcode::Pop,
    ];

    pub fn decode(byte: u8) -> Option<Opcode> {
        let opcode = match byte {
            HLT => Opcode::Hlt,
            LDI => Opcode::Ldi,
            PRN => Opcode::Prn,
            JMP => Opcode::Jmp,
            JEQ => Opcode::Jeq,
            JNE => Opcode::Jne,
            ADD => Opcode::Add,
            SUB => Opcode::Sub,
            MUL => Opcode::Mul,
            CMP => Opcode::Cmp,
            AND => Opcode::And,
            OR => Opcode::Or,
            XOR => Opcode::Xor,
            NOT => Opcode::Not,
            SHL => Opcode::Shl,
            SHR => Opcode::Shr,
            PUSH => Opcode::Push,
            POP => Opcode::Pop,
            _ => return None,
        };
        Some(opcode)
    }

    pub fn byte(self) -> u8 {
        match self {
            Opcode::Hlt => HLT,
            Opcode::Ldi => LDI,
            Opcode::Prn => PRN,
            Opcode::Jmp => JMP,
            Opcode::Jeq => JEQ,
            Opcode::Jne => JNE,
            Opcode::Add => ADD,
            Opcode::Sub => SUB,
            Opcode::Mul => MUL,
            Opcode::Cmp => CMP,
            Opcode::And => AND,
            Opcode::Or => OR,
            Opcode::Xor => XOR,
            Opcode::Not => NOT,
            Opcode::Shl => SHL,
            Opcode::Shr => SHR,
            Opcode::Push => PUSH,
            Opcode::Pop => POP,
        }
    }

    pub fn handler(self) -> Handler {
        match self {
            Opcode::Hlt => Handler::Control(ControlOp::Halt),
            Opcode::Ldi => Handler::Control(ControlOp::LoadImmediate),
            Opcode::Prn => Handler::Control(ControlOp::Print),
            Opcode::Jmp => Handler::Control(ControlOp::Jump),
            Opcode::Jeq => Handler::Control(ControlOp::JumpIfEqual),
            Opcode::Jne => Handler::Control(ControlOp::JumpIfNotEqual),
            Opcode::Add => Handler::Alu(AluOp::Add),
            Opcode::Sub => Handler::Alu(AluOp::Sub),
            Opcode::Mul => Handler::Alu(AluOp::Mul),
            Opcode::Cmp => Handler::Alu(AluOp::Cmp),
            Opcode::And => Handler::Alu(AluOp::And),
            Opcode::Or => Handler::Alu(AluOp::Or),
            Opcode::Xor => Handler::Alu(AluOp::Xor),
            Opcode::Not => Handler::Alu(AluOp::Not),
            Opcode::Shl => Handler::Alu(AluOp::Shl),
            Opcode::Shr => Handler::Alu(AluOp::Shr),
            Opcode::Push => Handler::Alu(AluOp::Push),
            Opcode::Pop => Handler::Alu(AluOp::Pop),
        }
    }

    pub fn mnemonic(self) -> &'static str {
        match self.handler() {
            Handler::Alu(op) => op.name(),
            Handler::Control(ControlOp::Halt) => "HLT",
            Handler::Control(ControlOp::LoadImmediate) => "LDI",
            Handler::Control(ControlOp::Print) => "PRN",
            Handler::Control(ControlOp::Jump) => "JMP",
            Handler::Control(ControlOp::JumpIfEqual) => "JEQ",
            Handler::Control(ControlOp::JumpIfNotEqual) => "JNE",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_is_consistent() {
        for opcode in Opcode::ALL {
            assert_eq!(Opcode::decode(opcode.byte()), Some(opcode));
        }
        let decodable = (0..=255u8).filter(|&b| Opcode::decode(b).is_some()).count();
        assert_eq!(decodable, Opcode::ALL.len());
    }

    #[test]
    fn test_unknown_bytes() {
        assert_eq!(Opcode::decode(0xFF), None);
        assert_eq!(Opcode::decode(0x00), None);
    }

    #[test]
    fn test_handlers() {
        assert_eq!(Opcode::Ldi.handler(), Handler::Control(ControlOp::LoadImmediate));
        assert_eq!(Opcode::Push.handler(), Handler::Alu(AluOp::Push));
        assert_eq!(Opcode::Prn.mnemonic(), "PRN");
        assert_eq!(Opcode::Cmp.mnemonic(), "CMP");
    }
}
