/*
    Copyright (C) 2022-2023  Rafal Michalski

    This file is part of AMSTRUSTY, a Rust library for building emulators.

    For the full copyright notice, see the lib.rs file.
*/
//! CPU tests against a flat 64K memory with no microsecond alignment.
use super::*;

struct TestBus {
    mem: Vec<u8>,
    ticks: u64,
    irq: bool,
    io_value: u8,
    io_writes: Vec<(u16, u8)>,
}

impl TestBus {
    fn new(program: &[u8]) -> Self {
        let mut mem = vec![0u8; 0x10000];
        mem[..program.len()].copy_from_slice(program);
        TestBus { mem, ticks: 0, irq: false, io_value: 0xFF, io_writes: Vec::new() }
    }
}

impl Z80Bus for TestBus {
    fn read_mem(&mut self, addr: u16) -> u8 {
        self.mem[usize::from(addr)]
    }
    fn write_mem(&mut self, addr: u16, data: u8) {
        self.mem[usize::from(addr)] = data;
    }
    fn read_io(&mut self, _port: u16) -> u8 {
        self.io_value
    }
    fn write_io(&mut self, port: u16, data: u8) {
        self.io_writes.push((port, data));
    }
    fn tick(&mut self, ticks: u8) {
        self.ticks += u64::from(ticks);
    }
    fn interrupt_pending(&self) -> bool {
        self.irq
    }
    fn interrupt_acknowledge(&mut self) {}
}

fn run(program: &[u8], steps: usize) -> (Z80, TestBus) {
    let mut cpu = Z80::default();
    cpu.reset();
    let mut bus = TestBus::new(program);
    for _ in 0..steps {
        cpu.step(&mut bus);
    }
    (cpu, bus)
}

#[test]
fn add_flag_semantics() {
    // LD A,0x7F; ADD A,0x01
    let (cpu, bus) = run(&[0x3E, 0x7F, 0xC6, 0x01], 2);
    assert_eq!(0x80, cpu.a());
    assert_eq!(FLAG_S | FLAG_H | FLAG_PV, cpu.f());
    assert_eq!(7 + 7, bus.ticks);

    // LD A,0xFF; ADD A,0x01 -> zero, carry, half-carry
    let (cpu, _) = run(&[0x3E, 0xFF, 0xC6, 0x01], 2);
    assert_eq!(0x00, cpu.a());
    assert_eq!(FLAG_Z | FLAG_H | FLAG_C, cpu.f());
}

#[test]
fn adc_includes_the_carry() {
    // LD A,0xFF; ADD A,0x01 (sets C); LD A,0x10; ADC A,0x01
    let (cpu, _) = run(&[0x3E, 0xFF, 0xC6, 0x01, 0x3E, 0x10, 0xCE, 0x01], 4);
    assert_eq!(0x12, cpu.a());
    assert_eq!(0, cpu.f() & FLAG_C);
}

#[test]
fn sub_flag_semantics() {
    // LD A,0x00; SUB 0x01
    let (cpu, _) = run(&[0x3E, 0x00, 0xD6, 0x01], 2);
    assert_eq!(0xFF, cpu.a());
    assert_eq!(FLAG_S | FLAG_5 | FLAG_H | FLAG_3 | FLAG_N | FLAG_C, cpu.f());

    // LD A,0x80; SUB 0x01 -> signed overflow
    let (cpu, _) = run(&[0x3E, 0x80, 0xD6, 0x01], 2);
    assert_eq!(0x7F, cpu.a());
    assert_ne!(0, cpu.f() & FLAG_PV);
}

#[test]
fn cp_takes_bits_3_and_5_from_the_operand() {
    // LD A,0x10; CP 0x28 - bits 3 and 5 of the operand land in F
    let (cpu, _) = run(&[0x3E, 0x10, 0xFE, 0x28], 2);
    assert_eq!(0x10, cpu.a());
    assert_eq!(FLAG_3 | FLAG_5, cpu.f() & (FLAG_3 | FLAG_5));
    assert_ne!(0, cpu.f() & FLAG_C);
    assert_ne!(0, cpu.f() & FLAG_N);
}

#[test]
fn logical_operations_set_parity() {
    // LD A,0xF0; AND 0x0F
    let (cpu, _) = run(&[0x3E, 0xF0, 0xE6, 0x0F], 2);
    assert_eq!(0x00, cpu.a());
    assert_eq!(FLAG_Z | FLAG_H | FLAG_PV, cpu.f());

    // LD A,0xF0; OR 0x07 -> 0xF7 has odd parity
    let (cpu, _) = run(&[0x3E, 0xF0, 0xF6, 0x07], 2);
    assert_eq!(0xF7, cpu.a());
    assert_eq!(0, cpu.f() & (FLAG_PV | FLAG_H | FLAG_C | FLAG_N));
    assert_ne!(0, cpu.f() & FLAG_S);
}

#[test]
fn inc_dec_preserve_carry() {
    // SCF; INC A; DEC A
    let (cpu, _) = run(&[0x37, 0x3C, 0x3D], 3);
    assert_eq!(0x00, cpu.a());
    assert_ne!(0, cpu.f() & FLAG_C);
    assert_ne!(0, cpu.f() & FLAG_Z);

    // LD A,0x7F; INC A -> overflow into the sign bit
    let (cpu, _) = run(&[0x3E, 0x7F, 0x3C], 2);
    assert_eq!(FLAG_S | FLAG_H | FLAG_PV, cpu.f() & !(FLAG_3 | FLAG_5));
}

#[test]
fn daa_corrects_bcd_addition() {
    // LD A,0x15; ADD A,0x27; DAA -> BCD 42
    let (cpu, _) = run(&[0x3E, 0x15, 0xC6, 0x27, 0x27], 3);
    assert_eq!(0x42, cpu.a());

    // LD A,0x91; ADD A,0x12; DAA -> BCD 03 with carry
    let (cpu, _) = run(&[0x3E, 0x91, 0xC6, 0x12, 0x27], 3);
    assert_eq!(0x03, cpu.a());
    assert_ne!(0, cpu.f() & FLAG_C);
}

#[test]
fn neg_special_cases() {
    // LD A,0x80; NEG: PV set, carry set
    let (cpu, _) = run(&[0x3E, 0x80, 0xED, 0x44], 2);
    assert_eq!(0x80, cpu.a());
    assert_ne!(0, cpu.f() & FLAG_PV);
    assert_ne!(0, cpu.f() & FLAG_C);

    // LD A,0x00; NEG: no carry
    let (cpu, _) = run(&[0x3E, 0x00, 0xED, 0x44], 2);
    assert_eq!(0x00, cpu.a());
    assert_eq!(0, cpu.f() & (FLAG_PV | FLAG_C));
}

#[test]
fn sixteen_bit_add_keeps_s_z_pv() {
    // LD HL,0x0FFF; LD BC,0x0001; ADD HL,BC -> half carry from bit 11
    let (cpu, bus) = run(&[0x21, 0xFF, 0x0F, 0x01, 0x01, 0x00, 0x09], 3);
    assert_eq!(0x1000, cpu.hl);
    assert_ne!(0, cpu.f() & FLAG_H);
    assert_eq!(0, cpu.f() & (FLAG_C | FLAG_N));
    assert_eq!(10 + 10 + 11, bus.ticks);
}

#[test]
fn sbc16_detects_zero_and_borrow() {
    // LD HL,0x0001; LD BC,0x0001; SBC HL,BC (carry clear)
    let (cpu, _) = run(&[0x21, 0x01, 0x00, 0x01, 0x01, 0x00, 0xED, 0x42], 3);
    assert_eq!(0x0000, cpu.hl);
    assert_ne!(0, cpu.f() & FLAG_Z);
    assert_ne!(0, cpu.f() & FLAG_N);
    assert_eq!(0, cpu.f() & FLAG_C);
}

#[test]
fn rotate_accumulator_preserves_s_z_pv() {
    // LD A,0x81; RLCA
    let (cpu, _) = run(&[0x3E, 0x81, 0x07], 2);
    assert_eq!(0x03, cpu.a());
    assert_ne!(0, cpu.f() & FLAG_C);
    assert_eq!(0, cpu.f() & (FLAG_S | FLAG_Z));

    // LD A,0x01; RRA with carry clear
    let (cpu, _) = run(&[0x3E, 0x01, 0x1F], 2);
    assert_eq!(0x00, cpu.a());
    assert_ne!(0, cpu.f() & FLAG_C);
}

#[test]
fn undocumented_sll_shifts_in_a_one() {
    // LD B,0x80; SLL B
    let (cpu, bus) = run(&[0x06, 0x80, 0xCB, 0x30], 2);
    assert_eq!(0x01, cpu.b());
    assert_ne!(0, cpu.f() & FLAG_C);
    assert_eq!(0, cpu.f() & FLAG_Z);
    assert_eq!(7 + 8, bus.ticks);
}

#[test]
fn bit_test_sets_zero_and_parity_together() {
    // LD A,0x00; BIT 7,A
    let (cpu, _) = run(&[0x3E, 0x00, 0xCB, 0x7F], 2);
    assert_eq!(FLAG_Z | FLAG_PV | FLAG_H, cpu.f() & (FLAG_Z | FLAG_PV | FLAG_H));

    // LD A,0x80; BIT 7,A
    let (cpu, _) = run(&[0x3E, 0x80, 0xCB, 0x7F], 2);
    assert_eq!(0, cpu.f() & FLAG_Z);
    assert_ne!(0, cpu.f() & FLAG_S);
}

#[test]
fn ld_block_transfer() {
    // LD HL,0x8000; LD DE,0x9000; LD BC,0x0003; LDIR
    let mut program = vec![0x21, 0x00, 0x80, 0x11, 0x00, 0x90, 0x01, 0x03, 0x00, 0xED, 0xB0];
    program.resize(0x100, 0);
    let mut bus = TestBus::new(&program);
    bus.mem[0x8000..0x8003].copy_from_slice(&[0xAA, 0xBB, 0xCC]);

    let mut cpu = Z80::default();
    cpu.reset();
    // three instructions plus one LDIR step per byte
    for _ in 0..6 {
        cpu.step(&mut bus);
    }
    assert_eq!(&[0xAA, 0xBB, 0xCC], &bus.mem[0x9000..0x9003]);
    assert_eq!(0x0000, cpu.bc);
    assert_eq!(0x8003, cpu.hl);
    assert_eq!(0x9003, cpu.de);
    assert_eq!(0, cpu.f() & FLAG_PV);
    // 10 + 10 + 10 plus two repeating iterations of 21 and a final one of 16
    assert_eq!(30 + 21 + 21 + 16, bus.ticks);
}

#[test]
fn cp_block_stops_on_match() {
    // LD HL,0x8000; LD BC,0x0010; LD A,0xBB; CPIR
    let mut program = vec![0x21, 0x00, 0x80, 0x01, 0x10, 0x00, 0x3E, 0xBB, 0xED, 0xB1];
    program.resize(0x100, 0);
    let mut bus = TestBus::new(&program);
    bus.mem[0x8000..0x8003].copy_from_slice(&[0xAA, 0xBB, 0xCC]);

    let mut cpu = Z80::default();
    cpu.reset();
    for _ in 0..5 {
        cpu.step(&mut bus);
    }
    assert_eq!(0x8002, cpu.hl);
    assert_eq!(0x000E, cpu.bc);
    assert_ne!(0, cpu.f() & FLAG_Z);
    assert_ne!(0, cpu.f() & FLAG_PV);
}

#[test]
fn djnz_loops_until_b_is_zero() {
    // LD B,0x03; XOR A; INC A; DJNZ -2
    let (cpu, bus) = run(&[0x06, 0x03, 0xAF, 0x3C, 0x10, 0xFD], 2 + 3 * 2);
    assert_eq!(0x03, cpu.a());
    assert_eq!(0x00, cpu.b());
    assert_eq!(0x0006, cpu.pc);
    assert_eq!(7 + 4 + 3 * 4 + 13 + 13 + 8, bus.ticks);
}

#[test]
fn stack_and_calls() {
    // LD SP,0xC000; CALL 0x0006; <unreachable>; PUSH AF pushes at the callee
    let program = [0x31, 0x00, 0xC0, 0xCD, 0x08, 0x00, 0x00, 0x00, 0xC9];
    let mut bus = TestBus::new(&program);
    let mut cpu = Z80::default();
    cpu.reset();
    cpu.step(&mut bus); // LD SP,nn
    cpu.step(&mut bus); // CALL 0x0008
    assert_eq!(0x0008, cpu.pc);
    assert_eq!(0xBFFE, cpu.sp);
    assert_eq!(0x06, bus.mem[0xBFFE]);
    assert_eq!(0x00, bus.mem[0xBFFF]);
    cpu.step(&mut bus); // RET
    assert_eq!(0x0006, cpu.pc);
    assert_eq!(0xC000, cpu.sp);
}

#[test]
fn conditional_return_timing() {
    // XOR A (sets Z); RET Z not taken path first: RET NZ
    let (cpu, bus) = run(&[0xAF, 0xC0], 2);
    assert_eq!(0x0002, cpu.pc);
    assert_eq!(4 + 5, bus.ticks);
}

#[test]
fn ex_and_exx_swap_register_banks() {
    let program = [
        0x3E, 0x12,       // LD A,0x12
        0x08,             // EX AF,AF'
        0x3E, 0x34,       // LD A,0x34
        0x01, 0x11, 0x11, // LD BC,0x1111
        0xD9,             // EXX
        0x01, 0x22, 0x22, // LD BC,0x2222
    ];
    let (cpu, _) = run(&program, 6);
    assert_eq!(0x34, cpu.a());
    assert_eq!(0x12, (cpu.af_alt >> 8) as u8);
    assert_eq!(0x2222, cpu.bc);
    assert_eq!(0x1111, cpu.bc_alt);
}

#[test]
fn indexed_addressing_with_displacement() {
    // LD IX,0x8005; LD (IX-5),0x77; LD A,(IX-5)
    let program = [
        0xDD, 0x21, 0x05, 0x80, // LD IX,0x8005
        0xDD, 0x36, 0xFB, 0x77, // LD (IX-5),0x77
        0xDD, 0x7E, 0xFB,       // LD A,(IX-5)
    ];
    let (cpu, bus) = run(&program, 3);
    assert_eq!(0x77, bus.mem[0x8000]);
    assert_eq!(0x77, cpu.a());
    assert_eq!(14 + 22 + 19, bus.ticks);
}

#[test]
fn undocumented_index_register_halves() {
    // LD IX,0x1234; LD A,IXh; ADD A,IXl
    let program = [0xDD, 0x21, 0x34, 0x12, 0xDD, 0x7C, 0xDD, 0x85];
    let (cpu, _) = run(&program, 3);
    assert_eq!(0x12 + 0x34, cpu.a());
}

#[test]
fn dd_prefix_chains_and_falls_through() {
    // DD DD 21: the first prefix costs 4 ticks, then LD IX,nn
    let (cpu, bus) = run(&[0xDD, 0xDD, 0x21, 0x34, 0x12], 1);
    assert_eq!(0x1234, cpu.ix);
    assert_eq!(4 + 14, bus.ticks);

    // DD 04 is plain INC B
    let (cpu, bus) = run(&[0xDD, 0x04], 1);
    assert_eq!(0x01, cpu.b());
    assert_eq!(8, bus.ticks);
}

#[test]
fn ddcb_rotation_copies_to_register() {
    // LD IX,0x8000; RLC (IX+2),B - undocumented register copy
    let mut program = vec![0xDD, 0x21, 0x00, 0x80, 0xDD, 0xCB, 0x02, 0x00];
    program.resize(0x100, 0);
    let mut bus = TestBus::new(&program);
    bus.mem[0x8002] = 0x81;

    let mut cpu = Z80::default();
    cpu.reset();
    cpu.step(&mut bus);
    let ticks_before = bus.ticks;
    cpu.step(&mut bus);
    assert_eq!(0x03, bus.mem[0x8002]);
    assert_eq!(0x03, cpu.b());
    assert_ne!(0, cpu.f() & FLAG_C);
    assert_eq!(23, bus.ticks - ticks_before);
}

#[test]
fn ddcb_bit_leaves_registers_alone() {
    let mut program = vec![0xDD, 0x21, 0x00, 0x80, 0xDD, 0xCB, 0x00, 0x46];
    program.resize(0x100, 0);
    let mut bus = TestBus::new(&program);
    bus.mem[0x8000] = 0x00;

    let mut cpu = Z80::default();
    cpu.reset();
    cpu.step(&mut bus);
    cpu.step(&mut bus);
    assert_ne!(0, cpu.f() & FLAG_Z);
    assert_eq!(0, cpu.b());
}

#[test]
fn io_instructions() {
    // LD A,0x12; OUT (0x34),A
    let (_, bus) = run(&[0x3E, 0x12, 0xD3, 0x34], 2);
    assert_eq!(vec![(0x1234, 0x12)], bus.io_writes);

    // LD BC,0x5678; OUT (C),B; IN A,(0x01)
    let (cpu, bus) = run(&[0x01, 0x78, 0x56, 0xED, 0x41, 0xDB, 0x01], 3);
    assert_eq!(vec![(0x5678, 0x56)], bus.io_writes);
    assert_eq!(0xFF, cpu.a());
}

#[test]
fn in_r_c_sets_flags() {
    let mut bus = TestBus::new(&[0x01, 0x00, 0x10, 0xED, 0x50]);
    bus.io_value = 0x00;
    let mut cpu = Z80::default();
    cpu.reset();
    cpu.step(&mut bus);
    cpu.step(&mut bus); // IN D,(C)
    assert_eq!(0x00, cpu.d());
    assert_ne!(0, cpu.f() & FLAG_Z);
    assert_ne!(0, cpu.f() & FLAG_PV);
    assert_eq!(0, cpu.f() & (FLAG_N | FLAG_H));
}

#[test]
fn rld_rotates_nibbles_through_memory() {
    // LD HL,0x8000; LD A,0x12; RLD
    let mut program = vec![0x21, 0x00, 0x80, 0x3E, 0x12, 0xED, 0x6F];
    program.resize(0x100, 0);
    let mut bus = TestBus::new(&program);
    bus.mem[0x8000] = 0x34;

    let mut cpu = Z80::default();
    cpu.reset();
    for _ in 0..3 {
        cpu.step(&mut bus);
    }
    assert_eq!(0x13, cpu.a());
    assert_eq!(0x42, bus.mem[0x8000]);
}

#[test]
fn r_register_counts_opcode_fetches() {
    let (cpu, _) = run(&[0x00; 10], 10);
    assert_eq!(10, cpu.r());

    // prefixed instructions step R twice
    let (cpu, _) = run(&[0xDD, 0x04, 0xCB, 0x00, 0xED, 0x44], 3);
    assert_eq!(6, cpu.r());
}

#[test]
fn ei_delays_interrupts_by_one_instruction() {
    // EI; NOP; NOP with an interrupt pending throughout
    let mut bus = TestBus::new(&[0xFB, 0x00, 0x00, 0x00]);
    bus.irq = true;
    let mut cpu = Z80::default();
    cpu.reset();
    cpu.interrupt_mode = 1;
    cpu.sp = 0xC000;

    cpu.step(&mut bus); // EI
    assert!(!cpu.iff1);
    cpu.step(&mut bus); // the instruction right after EI still runs
    assert!(!cpu.iff1);
    assert_eq!(0x0002, cpu.pc);
    cpu.step(&mut bus); // now the interrupt is taken
    assert_eq!(0x0038, cpu.pc);
    assert!(!cpu.iff1);
    assert!(!cpu.iff2);
    assert_eq!(0xBFFE, cpu.sp);
    assert_eq!(0x02, bus.mem[0xBFFE]);
}

#[test]
fn interrupt_wakes_a_halted_cpu() {
    let mut bus = TestBus::new(&[0xFB, 0x76, 0x00, 0x00]);
    let mut cpu = Z80::default();
    cpu.reset();
    cpu.interrupt_mode = 1;
    cpu.sp = 0xC000;

    cpu.step(&mut bus); // EI
    cpu.step(&mut bus); // HALT
    assert!(cpu.halted);
    let pc_halted = cpu.pc;
    cpu.step(&mut bus); // spins on the halt
    assert_eq!(pc_halted, cpu.pc);

    bus.irq = true;
    let ticks_before = bus.ticks;
    cpu.step(&mut bus);
    assert!(!cpu.halted);
    assert_eq!(0x0038, cpu.pc);
    // the resume address is the instruction after the halt
    assert_eq!(0x02, bus.mem[0xBFFE]);
    assert_eq!(13, bus.ticks - ticks_before);
}

#[test]
fn retn_restores_iff1_from_iff2() {
    // RETN with iff2 set restores iff1
    let mut bus = TestBus::new(&[0xED, 0x45]);
    let mut cpu = Z80::default();
    cpu.reset();
    cpu.sp = 0xC000;
    bus.mem[0xC000] = 0x34;
    bus.mem[0xC001] = 0x12;
    cpu.iff2 = true;

    cpu.step(&mut bus);
    assert_eq!(0x1234, cpu.pc);
    assert!(cpu.iff1);
}

#[test]
fn jump_and_jr_timing() {
    // JR taken: 12 ticks, JP: 10 ticks
    let (cpu, bus) = run(&[0x18, 0x00, 0xC3, 0x00, 0x10], 2);
    assert_eq!(0x1000, cpu.pc);
    assert_eq!(12 + 10, bus.ticks);

    // JR NZ not taken after XOR A: 7 ticks
    let (_, bus) = run(&[0xAF, 0x20, 0x10], 2);
    assert_eq!(4 + 7, bus.ticks);
}

#[test]
fn halt_spins_without_advancing_pc() {
    let (cpu, bus) = run(&[0x76], 5);
    assert!(cpu.halted);
    assert_eq!(0x0000, cpu.pc);
    assert_eq!(5 * 4, bus.ticks);
}
