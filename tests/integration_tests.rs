use ls8_emulator::alu::AluMode;
use ls8_emulator::cpu::{Cpu, MachineConfig};
use ls8_emulator::loader::parse_image;
use ls8_emulator::opcodes::*;

fn run_program(program: &[u8], config: MachineConfig) -> (Cpu, String) {
    let mut cpu = Cpu::with_config(config);
    cpu.load(program).unwrap();

    let mut out = Vec::new();
    cpu.run(&mut out).unwrap();
    (cpu, String::from_utf8(out).unwrap())
}

#[test]
fn test_add_and_print() {
    let source = "\
# Adds 8 and 9 and prints the sum
10000010 # LDI R0,8
00000000
00001000
10000010 # LDI R1,9
00000001
00001001
10100000 # ADD R0,R1
00000000
00000001
01000111 # PRN R0
00000000
00000001 # HLT
";
    let program = parse_image(source).unwrap();
    let (cpu, output) = run_program(&program, MachineConfig::default());

    assert_eq!(output, "17\n");
    assert!(cpu.is_halted());
    assert_eq!(cpu.steps(), 5);
}

#[test]
fn test_push_pop_round_trip() {
    let program = [LDI, 0, 5, PUSH, 0, LDI, 0, 0, POP, 0, PRN, 0, HLT];
    let (cpu, output) = run_program(&program, MachineConfig::default());

    assert_eq!(output, "5\n");
    assert_eq!(cpu.sp(), 0);
    // The pushed byte stays behind in memory
    assert_eq!(cpu.memory().read(255).unwrap(), 5);
}

#[test]
fn test_counting_loop() {
    let program = [
        LDI, 0, 0,  // R0 = counter
        LDI, 1, 5,  // R1 = limit
        LDI, 2, 1,  // R2 = step
        LDI, 3, 12, // R3 = loop start
        PRN, 0,     // 12
        ADD, 0, 2,
        CMP, 0, 1,
        JNE, 3,
        HLT,
    ];
    let (cpu, output) = run_program(&program, MachineConfig::default());

    assert_eq!(output, "0\n1\n2\n3\n4\n");
    assert_eq!(cpu.steps(), 25);
    assert_eq!(cpu.flags(), 0b001);
}

#[test]
fn test_jeq_takes_branch_on_equal() {
    let program = [
        LDI, 0, 7,
        LDI, 1, 7,
        LDI, 2, 17,
        CMP, 0, 1,
        JEQ, 2,
        PRN, 0, // 14, skipped
        HLT,
        PRN, 2, // 17
        HLT,
    ];
    let (cpu, output) = run_program(&program, MachineConfig::default());

    assert_eq!(output, "17\n");
    assert_eq!(cpu.pc(), 20);
}

#[test]
fn test_alu_modes_diverge_only_on_quirks() {
    let program = [
        LDI, 0, 6,
        LDI, 1, 3,
        SUB, 0, 1,
        PRN, 0,
        LDI, 2, 0b1100,
        LDI, 3, 0b1010,
        AND, 2, 3,
        PRN, 2,
        MUL, 1, 1,
        PRN, 1,
        HLT,
    ];

    let (_, compatible) = run_program(&program, MachineConfig::default());
    assert_eq!(compatible, "18\n2\n9\n");

    let corrected_config = MachineConfig {
        alu_mode: AluMode::Corrected,
        max_steps: None,
    };
    let (_, corrected) = run_program(&program, corrected_config);
    assert_eq!(corrected, "3\n8\n9\n");
}

#[test]
fn test_register_seven_diverges_from_stack_pointer() {
    let mut registers = [0u8; 8];
    registers[7] = 0xF4;
    let mut cpu = Cpu::with_registers(registers, MachineConfig::default());
    cpu.load(&[LDI, 0, 42, PUSH, 0, PUSH, 0, PRN, 7, HLT]).unwrap();

    let mut out = Vec::new();
    cpu.run(&mut out).unwrap();

    assert_eq!(cpu.sp(), 0xF2);
    // r7 still holds the seed value
    assert_eq!(String::from_utf8(out).unwrap(), "244\n");
}
