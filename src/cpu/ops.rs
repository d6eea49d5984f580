/*
    Copyright (C) 2022-2023  Rafal Michalski

    This file is part of AMSTRUSTY, a Rust library for building emulators.

    For the full copyright notice, see the lib.rs file.
*/
//! Instruction decoding and execution.
//!
//! The decoder is a match over the opcode byte with the regular operand
//! groups decoded from the opcode's bit fields and sub-decoders for the CB,
//! ED, DD and FD prefixes. Helper methods mirror the machine cycles of each
//! instruction: a memory or I/O access followed by the cycle's tick count.
use super::*;

impl Z80 {
    /// Reads a byte operand at PC. One 3-tick machine cycle.
    #[inline]
    fn fetch8<B: Z80Bus>(&mut self, bus: &mut B) -> u8 {
        let data = bus.read_mem(self.pc);
        self.pc = self.pc.wrapping_add(1);
        bus.tick(3);
        data
    }

    /// Reads a word operand at PC, low byte first. Two 3-tick machine cycles.
    #[inline]
    fn fetch16<B: Z80Bus>(&mut self, bus: &mut B) -> u16 {
        let lo = self.fetch8(bus);
        let hi = self.fetch8(bus);
        u16::from_le_bytes([lo, hi])
    }

    /// One 3-tick memory read cycle.
    #[inline]
    fn read8<B: Z80Bus>(&mut self, bus: &mut B, addr: u16) -> u8 {
        let data = bus.read_mem(addr);
        bus.tick(3);
        data
    }

    /// One 3-tick memory write cycle.
    #[inline]
    fn write8<B: Z80Bus>(&mut self, bus: &mut B, addr: u16, data: u8) {
        bus.write_mem(addr, data);
        bus.tick(3);
    }

    /// Reads a word from memory, low byte first. Two 3-tick machine cycles.
    #[inline]
    fn read16<B: Z80Bus>(&mut self, bus: &mut B, addr: u16) -> u16 {
        let lo = self.read8(bus, addr);
        let hi = self.read8(bus, addr.wrapping_add(1));
        u16::from_le_bytes([lo, hi])
    }

    /// Writes a word to memory, low byte first. Two 3-tick machine cycles.
    #[inline]
    fn write16<B: Z80Bus>(&mut self, bus: &mut B, addr: u16, data: u16) {
        self.write8(bus, addr, data as u8);
        self.write8(bus, addr.wrapping_add(1), (data >> 8) as u8);
    }

    /// Reads the displacement byte and forms an indexed effective address.
    /// A 3-tick operand fetch plus the 5-tick internal address calculation.
    #[inline]
    fn index_addr<B: Z80Bus>(&mut self, bus: &mut B, xy: IndexReg) -> u16 {
        let offset = self.fetch8(bus) as i8;
        let addr = self.xy(xy).wrapping_add(offset as u16);
        bus.tick(5);
        addr
    }

    fn push16<B: Z80Bus>(&mut self, bus: &mut B, data: u16) {
        bus.tick(1);
        self.sp = self.sp.wrapping_sub(1);
        self.write8(bus, self.sp, (data >> 8) as u8);
        self.sp = self.sp.wrapping_sub(1);
        self.write8(bus, self.sp, data as u8);
    }

    fn pop16<B: Z80Bus>(&mut self, bus: &mut B) -> u16 {
        let lo = self.read8(bus, self.sp);
        self.sp = self.sp.wrapping_add(1);
        let hi = self.read8(bus, self.sp);
        self.sp = self.sp.wrapping_add(1);
        u16::from_le_bytes([lo, hi])
    }

    /// Reads a 16-bit register pair operand: BC, DE, HL or SP.
    #[inline]
    fn rp(&self, code: u8) -> u16 {
        match code & 3 {
            0 => self.bc,
            1 => self.de,
            2 => self.hl,
            _ => self.sp,
        }
    }

    #[inline]
    fn set_rp(&mut self, code: u8, data: u16) {
        match code & 3 {
            0 => self.bc = data,
            1 => self.de = data,
            2 => self.hl = data,
            _ => self.sp = data,
        }
    }

    // 8-bit arithmetic and logic.

    fn add_a(&mut self, operand: u8, with_carry: bool) {
        let a = self.a();
        let carry = (with_carry && self.f() & FLAG_C != 0) as u8;
        let result = u16::from(a) + u16::from(operand) + u16::from(carry);
        self.set_a(result as u8);
        self.set_f(sz35(result as u8)
            | if (a & 0x0F) + (operand & 0x0F) + carry >= 0x10 { FLAG_H } else { 0 }
            | carry8(result)
            | overflow8_add(a, operand, result));
    }

    fn sub_a(&mut self, operand: u8, with_carry: bool) {
        let a = self.a();
        let carry = (with_carry && self.f() & FLAG_C != 0) as u8;
        let result = u16::from(a)
            .wrapping_sub(u16::from(operand))
            .wrapping_sub(u16::from(carry));
        self.set_a(result as u8);
        self.set_f(sz35(result as u8)
            | half8(a, operand, result)
            | carry8(result)
            | FLAG_N
            | overflow8_sub(a, operand, result));
    }

    fn and_a(&mut self, operand: u8) {
        let a = self.a() & operand;
        self.set_a(a);
        self.set_f(szp35(a) | FLAG_H);
    }

    fn or_a(&mut self, operand: u8) {
        let a = self.a() | operand;
        self.set_a(a);
        self.set_f(szp35(a));
    }

    fn xor_a(&mut self, operand: u8) {
        let a = self.a() ^ operand;
        self.set_a(a);
        self.set_f(szp35(a));
    }

    /// CP: a subtraction that only sets flags; the undocumented bits 3 and 5
    /// come from the operand, not the result.
    fn cp_a(&mut self, operand: u8) {
        let a = self.a();
        let result = u16::from(a).wrapping_sub(u16::from(operand));
        self.set_f(carry8(result)
            | sz(result as u8)
            | FLAG_N
            | overflow8_sub(a, operand, result)
            | flags35(operand)
            | half8(a, operand, result));
    }

    /// Dispatches one of the eight ALU operations by its opcode field.
    fn alu(&mut self, operation: u8, operand: u8) {
        match operation & 7 {
            0 => self.add_a(operand, false),
            1 => self.add_a(operand, true),
            2 => self.sub_a(operand, false),
            3 => self.sub_a(operand, true),
            4 => self.and_a(operand),
            5 => self.xor_a(operand),
            6 => self.or_a(operand),
            _ => self.cp_a(operand),
        }
    }

    fn inc8(&mut self, operand: u8) -> u8 {
        let result = operand.wrapping_add(1);
        self.set_f(sign8(result)
            | if result == 0x80 { FLAG_PV } else { 0 }
            | self.f() & FLAG_C
            | zero8(result)
            | if result & 0x0F == 0 { FLAG_H } else { 0 }
            | flags35(result));
        result
    }

    fn dec8(&mut self, operand: u8) -> u8 {
        let result = operand.wrapping_sub(1);
        self.set_f(sign8(result)
            | if result == 0x7F { FLAG_PV } else { 0 }
            | self.f() & FLAG_C
            | zero8(result)
            | if result & 0x0F == 0x0F { FLAG_H } else { 0 }
            | flags35(result)
            | FLAG_N);
        result
    }

    // 16-bit arithmetic.

    fn add16(&mut self, lhs: u16, rhs: u16) -> u16 {
        let result = u32::from(lhs) + u32::from(rhs);
        self.set_f(self.f() & (FLAG_S | FLAG_Z | FLAG_PV)
            | carry16(result)
            | half16(lhs, rhs, result as u16)
            | flags35((result >> 8) as u8));
        result as u16
    }

    fn adc16(&mut self, rhs: u16) {
        let addend = u32::from(rhs) + (self.f() & FLAG_C != 0) as u32;
        let result = u32::from(self.hl) + addend;
        self.set_f(carry16(result)
            | half16(self.hl, addend as u16, result as u16)
            | flags35((result >> 8) as u8)
            | zero16(result as u16)
            | overflow16_add(self.hl, rhs, result as u16)
            | sign16(result as u16));
        self.hl = result as u16;
    }

    fn sbc16(&mut self, rhs: u16) {
        let subtrahend = u32::from(rhs) + (self.f() & FLAG_C != 0) as u32;
        let result = u32::from(self.hl).wrapping_sub(subtrahend);
        self.set_f(carry16(result)
            | half16(self.hl, subtrahend as u16, result as u16)
            | flags35((result >> 8) as u8)
            | zero16(result as u16)
            | overflow16_sub(self.hl, rhs, result as u16)
            | FLAG_N
            | sign16(result as u16));
        self.hl = result as u16;
    }

    // Rotates and shifts of the accumulator; these keep S, Z and PV.

    fn rlca(&mut self) {
        let a = self.a();
        let result = a << 1 | a >> 7;
        self.set_f(flags35(result)
            | if a & 0x80 != 0 { FLAG_C } else { 0 }
            | self.f() & (FLAG_S | FLAG_Z | FLAG_PV));
        self.set_a(result);
    }

    fn rla(&mut self) {
        let a = self.a();
        let result = a << 1 | self.f() & FLAG_C;
        self.set_f(flags35(result)
            | if a & 0x80 != 0 { FLAG_C } else { 0 }
            | self.f() & (FLAG_S | FLAG_Z | FLAG_PV));
        self.set_a(result);
    }

    fn rrca(&mut self) {
        let a = self.a();
        let result = a >> 1 | a << 7;
        self.set_f(flags35(result)
            | if a & 0x01 != 0 { FLAG_C } else { 0 }
            | self.f() & (FLAG_S | FLAG_Z | FLAG_PV));
        self.set_a(result);
    }

    fn rra(&mut self) {
        let a = self.a();
        let result = a >> 1 | (self.f() & FLAG_C) << 7;
        self.set_f(flags35(result)
            | if a & 0x01 != 0 { FLAG_C } else { 0 }
            | self.f() & (FLAG_S | FLAG_Z | FLAG_PV));
        self.set_a(result);
    }

    /// The CB-prefixed rotates and shifts, dispatched by their opcode field.
    /// These set the full flag complement from the result.
    fn rotate_shift(&mut self, operation: u8, operand: u8) -> u8 {
        let carry_in = self.f() & FLAG_C;
        let (result, carry_out) = match operation & 7 {
            0 => (operand << 1 | operand >> 7, operand & 0x80 != 0),      // RLC
            1 => (operand >> 1 | operand << 7, operand & 0x01 != 0),      // RRC
            2 => (operand << 1 | carry_in, operand & 0x80 != 0),          // RL
            3 => (operand >> 1 | carry_in << 7, operand & 0x01 != 0),     // RR
            4 => (operand << 1, operand & 0x80 != 0),                     // SLA
            5 => (operand >> 1 | operand & 0x80, operand & 0x01 != 0),    // SRA
            6 => (operand << 1 | 0x01, operand & 0x80 != 0),              // SLL
            _ => (operand >> 1, operand & 0x01 != 0),                     // SRL
        };
        self.set_f(szp35(result) | if carry_out { FLAG_C } else { 0 });
        result
    }

    fn bit_test(&mut self, bit: u8, operand: u8) {
        let masked = operand & 1 << bit;
        self.set_f((FLAG_S | FLAG_3 | FLAG_5) & masked
            | if masked == 0 { FLAG_Z | FLAG_PV } else { 0 }
            | FLAG_H
            | self.f() & FLAG_C);
    }

    fn daa(&mut self) {
        let before = self.a();
        let mut correction = 0;
        let mut carry = false;
        if before > 0x99 || self.f() & FLAG_C != 0 {
            correction |= 0x60;
            carry = true;
        }
        if before & 0x0F > 0x09 || self.f() & FLAG_H != 0 {
            correction |= 0x06;
        }

        let result = if self.f() & FLAG_N != 0 {
            before.wrapping_sub(correction)
        }
        else {
            before.wrapping_add(correction)
        };
        self.set_a(result);

        let mut f = self.f() & !FLAG_C | if carry { FLAG_C } else { 0 };
        f = f & !FLAG_H | (result ^ before) & FLAG_H;
        f = f & !(FLAG_S | FLAG_Z | FLAG_PV | FLAG_3 | FLAG_5) | szp35(result);
        self.set_f(f);
    }

    fn cpl(&mut self) {
        let a = !self.a();
        self.set_a(a);
        self.set_f(self.f() & (FLAG_S | FLAG_Z | FLAG_PV | FLAG_C)
            | flags35(a)
            | FLAG_H
            | FLAG_N);
    }

    fn neg(&mut self) {
        let operand = self.a();
        self.set_a(0);
        self.sub_a(operand, false);
        let mut f = self.f() & !(FLAG_PV | FLAG_C);
        if operand == 0x80 {
            f |= FLAG_PV;
        }
        if operand != 0x00 {
            f |= FLAG_C;
        }
        self.set_f(f);
    }

    fn ccf(&mut self) {
        let carry = self.f() & FLAG_C != 0;
        let mut f = self.f() & (FLAG_S | FLAG_Z | FLAG_PV);
        f |= flags35(self.a());
        f |= if carry { FLAG_H } else { FLAG_C };
        self.set_f(f);
    }

    fn scf(&mut self) {
        let f = self.f() & (FLAG_S | FLAG_Z | FLAG_PV)
            | FLAG_C
            | flags35(self.a());
        self.set_f(f);
    }

    // Jumps, calls and returns.

    fn jp<B: Z80Bus>(&mut self, bus: &mut B, taken: bool) {
        let addr = self.fetch16(bus);
        if taken {
            self.pc = addr;
        }
    }

    fn jr<B: Z80Bus>(&mut self, bus: &mut B, taken: bool) {
        let offset = self.fetch8(bus) as i8;
        if taken {
            self.pc = self.pc.wrapping_add(offset as u16);
            bus.tick(5);
        }
    }

    fn djnz<B: Z80Bus>(&mut self, bus: &mut B) {
        bus.tick(1);
        let offset = self.fetch8(bus) as i8;
        let b = self.b().wrapping_sub(1);
        self.set_b(b);
        if b != 0 {
            self.pc = self.pc.wrapping_add(offset as u16);
            bus.tick(5);
        }
    }

    fn call<B: Z80Bus>(&mut self, bus: &mut B, taken: bool) {
        let addr = self.fetch16(bus);
        if taken {
            bus.tick(1);
            self.sp = self.sp.wrapping_sub(1);
            self.write8(bus, self.sp, (self.pc >> 8) as u8);
            self.sp = self.sp.wrapping_sub(1);
            self.write8(bus, self.sp, self.pc as u8);
            self.pc = addr;
        }
    }

    fn ret_cc<B: Z80Bus>(&mut self, bus: &mut B, taken: bool) {
        bus.tick(1);
        if taken {
            self.pc = self.pop16(bus);
        }
    }

    fn rst<B: Z80Bus>(&mut self, bus: &mut B, addr: u16) {
        self.push16(bus, self.pc);
        self.pc = addr;
    }

    // Exchange and block groups.

    fn ex_sp<B: Z80Bus>(&mut self, bus: &mut B, data: u16) -> u16 {
        let lo = bus.read_mem(self.sp);
        self.sp = self.sp.wrapping_add(1);
        bus.tick(3);
        let hi = bus.read_mem(self.sp);
        bus.tick(4);
        bus.write_mem(self.sp, (data >> 8) as u8);
        self.sp = self.sp.wrapping_sub(1);
        bus.tick(3);
        bus.write_mem(self.sp, data as u8);
        bus.tick(5);
        u16::from_le_bytes([lo, hi])
    }

    /// LDI, LDD and their repeating variants. The undocumented bits 3 and 5
    /// derive from the transferred byte plus the accumulator.
    fn ld_block<B: Z80Bus>(&mut self, bus: &mut B, increment: bool, repeat: bool) {
        let data = self.read8(bus, self.hl);
        bus.write_mem(self.de, data);
        let n = data.wrapping_add(self.a());
        self.bc = self.bc.wrapping_sub(1);
        let step = if increment { 1u16 } else { 0xFFFF };
        self.de = self.de.wrapping_add(step);
        self.hl = self.hl.wrapping_add(step);
        self.set_f(self.f() & (FLAG_C | FLAG_S | FLAG_Z)
            | if self.bc != 0 { FLAG_PV } else { 0 }
            | n & FLAG_3
            | if n & 0x02 != 0 { FLAG_5 } else { 0 });
        bus.tick(5);

        if repeat && self.bc != 0 {
            self.pc = self.pc.wrapping_sub(2);
            bus.tick(5);
        }
    }

    /// CPI, CPD and their repeating variants. Bits 3 and 5 come from the
    /// comparison result less the half-borrow.
    fn cp_block<B: Z80Bus>(&mut self, bus: &mut B, repeat: bool, increment: bool) {
        let data = self.read8(bus, self.hl);
        let result = u16::from(self.a()).wrapping_sub(u16::from(data));

        self.hl = self.hl.wrapping_add(if increment { 1 } else { 0xFFFF });
        self.bc = self.bc.wrapping_sub(1);

        let half_carry = half8(self.a(), data, result);
        let mut n = result as u8;
        if half_carry != 0 {
            n = n.wrapping_sub(1);
        }

        self.set_f(self.f() & FLAG_C
            | sz(result as u8)
            | FLAG_N
            | if self.bc != 0 { FLAG_PV } else { 0 }
            | flags35(n)
            | half_carry);
        bus.tick(5);

        if repeat && self.bc != 0 && self.f() & FLAG_Z == 0 {
            self.pc = self.pc.wrapping_sub(2);
            bus.tick(5);
        }
    }

    /// INI, IND and their repeating variants, with the derived parity and
    /// carry rules of the real hardware.
    fn in_block<B: Z80Bus>(&mut self, bus: &mut B, increment: bool, repeat: bool) {
        bus.tick(1);
        let data = bus.read_io(self.bc);
        bus.tick(4);

        bus.write_mem(self.hl, data);
        self.hl = self.hl.wrapping_add(if increment { 1 } else { 0xFFFF });
        let b = self.b().wrapping_sub(1);
        self.set_b(b);
        bus.tick(3);

        let c = if increment { self.c().wrapping_add(1) } else { self.c().wrapping_sub(1) };
        let k = u16::from(data) + u16::from(c);
        let p = (k as u8 & 0x07) ^ b;

        self.set_f(sz35(b)
            | if data & 0x80 != 0 { FLAG_N } else { 0 }
            | if k > 0xFF { FLAG_H | FLAG_C } else { 0 }
            | parity(p));

        if repeat && b != 0 {
            self.pc = self.pc.wrapping_sub(2);
            bus.tick(5);
        }
    }

    /// OUTI, OUTD and their repeating variants.
    fn out_block<B: Z80Bus>(&mut self, bus: &mut B, increment: bool, repeat: bool) {
        bus.tick(1);
        let data = bus.read_mem(self.hl);
        self.hl = self.hl.wrapping_add(if increment { 1 } else { 0xFFFF });
        bus.tick(3);

        let b = self.b().wrapping_sub(1);
        self.set_b(b);
        bus.write_io(self.bc, data);
        bus.tick(4);

        let k = u16::from(data) + u16::from(self.l());
        let p = (k as u8 & 0x07) ^ b;

        self.set_f(sz35(b)
            | if data & 0x80 != 0 { FLAG_N } else { 0 }
            | if k > 0xFF { FLAG_H | FLAG_C } else { 0 }
            | parity(p));

        if repeat && b != 0 {
            self.pc = self.pc.wrapping_sub(2);
            bus.tick(5);
        }
    }

    fn rld<B: Z80Bus>(&mut self, bus: &mut B) {
        let data = self.read8(bus, self.hl);
        let a = self.a();
        let new_a = a & 0xF0 | data >> 4;
        let new_data = data << 4 | a & 0x0F;
        self.set_a(new_a);
        self.set_f(szp35(new_a) | self.f() & FLAG_C);
        bus.tick(4);
        self.write8(bus, self.hl, new_data);
    }

    fn rrd<B: Z80Bus>(&mut self, bus: &mut B) {
        let data = self.read8(bus, self.hl);
        let a = self.a();
        let new_a = a & 0xF0 | data & 0x0F;
        let new_data = a << 4 | data >> 4;
        self.set_a(new_a);
        self.set_f(szp35(new_a) | self.f() & FLAG_C);
        bus.tick(4);
        self.write8(bus, self.hl, new_data);
    }

    fn ld_a_ir(&mut self, data: u8, bus: &mut impl Z80Bus) {
        self.set_f(sign8(data)
            | zero8(data)
            | flags35(data)
            | if self.iff2 { FLAG_PV } else { 0 }
            | self.f() & FLAG_C);
        self.set_a(data);
        bus.tick(1);
    }

    /// Executes a single already-fetched opcode.
    pub(super) fn execute<B: Z80Bus>(&mut self, bus: &mut B, opcode: u8) {
        match opcode {
            0x00 => {}                                              // NOP
            0x08 => core::mem::swap(&mut self.af, &mut self.af_alt), // EX AF,AF'
            0x10 => self.djnz(bus),
            0x18 => self.jr(bus, true),
            0x20 | 0x28 | 0x30 | 0x38 => {                          // JR cc,o
                let taken = self.condition(opcode >> 3 & 3);
                self.jr(bus, taken)
            }
            0x01 | 0x11 | 0x21 | 0x31 => {                          // LD dd,nn
                let data = self.fetch16(bus);
                self.set_rp(opcode >> 4, data);
            }
            0x02 => self.write8(bus, self.bc, self.a()),            // LD (BC),A
            0x12 => self.write8(bus, self.de, self.a()),            // LD (DE),A
            0x0A => {                                               // LD A,(BC)
                let data = self.read8(bus, self.bc);
                self.set_a(data);
            }
            0x1A => {                                               // LD A,(DE)
                let data = self.read8(bus, self.de);
                self.set_a(data);
            }
            0x22 => {                                               // LD (nn),HL
                let addr = self.fetch16(bus);
                self.write16(bus, addr, self.hl);
            }
            0x2A => {                                               // LD HL,(nn)
                let addr = self.fetch16(bus);
                self.hl = self.read16(bus, addr);
            }
            0x32 => {                                               // LD (nn),A
                let addr = self.fetch16(bus);
                self.write8(bus, addr, self.a());
            }
            0x3A => {                                               // LD A,(nn)
                let addr = self.fetch16(bus);
                let data = self.read8(bus, addr);
                self.set_a(data);
            }
            0x03 | 0x13 | 0x23 | 0x33 => {                          // INC dd
                self.set_rp(opcode >> 4, self.rp(opcode >> 4).wrapping_add(1));
                bus.tick(2);
            }
            0x0B | 0x1B | 0x2B | 0x3B => {                          // DEC dd
                self.set_rp(opcode >> 4, self.rp(opcode >> 4).wrapping_sub(1));
                bus.tick(2);
            }
            0x09 | 0x19 | 0x29 | 0x39 => {                          // ADD HL,dd
                self.hl = self.add16(self.hl, self.rp(opcode >> 4));
                bus.tick(4);
                bus.tick(3);
            }
            0x34 => {                                               // INC (HL)
                let data = self.read8(bus, self.hl);
                let result = self.inc8(data);
                self.write8(bus, self.hl, result);
            }
            0x35 => {                                               // DEC (HL)
                let data = self.read8(bus, self.hl);
                let result = self.dec8(data);
                self.write8(bus, self.hl, result);
            }
            0x04 | 0x0C | 0x14 | 0x1C | 0x24 | 0x2C | 0x3C => {     // INC r
                let reg = Reg8::from_code(opcode >> 3);
                let result = self.inc8(self.r8(reg));
                self.set_r8(reg, result);
            }
            0x05 | 0x0D | 0x15 | 0x1D | 0x25 | 0x2D | 0x3D => {     // DEC r
                let reg = Reg8::from_code(opcode >> 3);
                let result = self.dec8(self.r8(reg));
                self.set_r8(reg, result);
            }
            0x36 => {                                               // LD (HL),n
                let data = self.fetch8(bus);
                self.write8(bus, self.hl, data);
            }
            0x06 | 0x0E | 0x16 | 0x1E | 0x26 | 0x2E | 0x3E => {     // LD r,n
                let data = self.fetch8(bus);
                self.set_r8(Reg8::from_code(opcode >> 3), data);
            }
            0x07 => self.rlca(),
            0x0F => self.rrca(),
            0x17 => self.rla(),
            0x1F => self.rra(),
            0x27 => self.daa(),
            0x2F => self.cpl(),
            0x37 => self.scf(),
            0x3F => self.ccf(),
            0x76 => {                                               // HALT
                self.pc = self.pc.wrapping_sub(1);
                self.halted = true;
            }
            0x40..=0x7F => {                                        // LD r,r'
                let dst = opcode >> 3 & 7;
                let src = opcode & 7;
                if dst == 6 {
                    let data = self.r8(Reg8::from_code(src));
                    self.write8(bus, self.hl, data);
                }
                else if src == 6 {
                    let data = self.read8(bus, self.hl);
                    self.set_r8(Reg8::from_code(dst), data);
                }
                else {
                    let data = self.r8(Reg8::from_code(src));
                    self.set_r8(Reg8::from_code(dst), data);
                }
            }
            0x80..=0xBF => {                                        // ALU A,r
                let operand = if opcode & 7 == 6 {
                    self.read8(bus, self.hl)
                }
                else {
                    self.r8(Reg8::from_code(opcode))
                };
                self.alu(opcode >> 3, operand);
            }
            0xC6 | 0xCE | 0xD6 | 0xDE | 0xE6 | 0xEE | 0xF6 | 0xFE => { // ALU A,n
                let operand = self.fetch8(bus);
                self.alu(opcode >> 3, operand);
            }
            0xC0 | 0xC8 | 0xD0 | 0xD8 | 0xE0 | 0xE8 | 0xF0 | 0xF8 => { // RET cc
                let taken = self.condition(opcode >> 3);
                self.ret_cc(bus, taken);
            }
            0xC1 | 0xD1 | 0xE1 => {                                 // POP dd
                let data = self.pop16(bus);
                self.set_rp(opcode >> 4, data);
            }
            0xF1 => self.af = self.pop16(bus),                      // POP AF
            0xC2 | 0xCA | 0xD2 | 0xDA | 0xE2 | 0xEA | 0xF2 | 0xFA => { // JP cc,nn
                let taken = self.condition(opcode >> 3);
                self.jp(bus, taken);
            }
            0xC3 => self.jp(bus, true),                             // JP nn
            0xC4 | 0xCC | 0xD4 | 0xDC | 0xE4 | 0xEC | 0xF4 | 0xFC => { // CALL cc,nn
                let taken = self.condition(opcode >> 3);
                self.call(bus, taken);
            }
            0xCD => self.call(bus, true),                           // CALL nn
            0xC5 | 0xD5 | 0xE5 => self.push16(bus, self.rp(opcode >> 4)), // PUSH dd
            0xF5 => self.push16(bus, self.af),                      // PUSH AF
            0xC7 | 0xCF | 0xD7 | 0xDF | 0xE7 | 0xEF | 0xF7 | 0xFF => { // RST p
                self.rst(bus, u16::from(opcode & 0x38));
            }
            0xC9 => self.pc = self.pop16(bus),                      // RET
            0xD3 => {                                               // OUT (n),A
                let port = u16::from_le_bytes([self.fetch8(bus), self.a()]);
                bus.write_io(port, self.a());
                bus.tick(4);
            }
            0xDB => {                                               // IN A,(n)
                let port = u16::from_le_bytes([self.fetch8(bus), self.a()]);
                let data = bus.read_io(port);
                self.set_a(data);
                bus.tick(4);
            }
            0xD9 => {                                               // EXX
                core::mem::swap(&mut self.bc, &mut self.bc_alt);
                core::mem::swap(&mut self.de, &mut self.de_alt);
                core::mem::swap(&mut self.hl, &mut self.hl_alt);
            }
            0xE3 => self.hl = self.ex_sp(bus, self.hl),             // EX (SP),HL
            0xE9 => self.pc = self.hl,                              // JP (HL)
            0xEB => core::mem::swap(&mut self.de, &mut self.hl),    // EX DE,HL
            0xF3 => {                                               // DI
                self.iff1 = false;
                self.iff2 = false;
            }
            0xFB => self.ei_delay = 2,                              // EI
            0xF9 => {                                               // LD SP,HL
                self.sp = self.hl;
                bus.tick(2);
            }
            0xCB => self.execute_cb(bus),
            0xED => self.execute_ed(bus),
            0xDD => self.execute_ddfd(bus, IndexReg::Ix),
            0xFD => self.execute_ddfd(bus, IndexReg::Iy),
        }
    }

    fn execute_cb<B: Z80Bus>(&mut self, bus: &mut B) {
        let opcode = bus.read_mem_opcode(self.pc);
        self.pc = self.pc.wrapping_add(1);
        self.increment_r();
        bus.tick(4);

        let operand = opcode & 7;
        let bit = opcode >> 3 & 7;
        match opcode >> 6 {
            0 => {
                // rotates and shifts
                if operand == 6 {
                    let data = bus.read_mem(self.hl);
                    let result = self.rotate_shift(bit, data);
                    bus.tick(4);
                    self.write8(bus, self.hl, result);
                }
                else {
                    let reg = Reg8::from_code(operand);
                    let result = self.rotate_shift(bit, self.r8(reg));
                    self.set_r8(reg, result);
                }
            }
            1 => {
                // BIT b
                if operand == 6 {
                    let data = bus.read_mem(self.hl);
                    self.bit_test(bit, data);
                    bus.tick(4);
                }
                else {
                    self.bit_test(bit, self.r8(Reg8::from_code(operand)));
                }
            }
            2 => {
                // RES b
                if operand == 6 {
                    let data = bus.read_mem(self.hl);
                    bus.tick(4);
                    self.write8(bus, self.hl, data & !(1 << bit));
                }
                else {
                    let reg = Reg8::from_code(operand);
                    let result = self.r8(reg) & !(1 << bit);
                    self.set_r8(reg, result);
                }
            }
            _ => {
                // SET b
                if operand == 6 {
                    let data = bus.read_mem(self.hl);
                    bus.tick(4);
                    self.write8(bus, self.hl, data | 1 << bit);
                }
                else {
                    let reg = Reg8::from_code(operand);
                    let result = self.r8(reg) | 1 << bit;
                    self.set_r8(reg, result);
                }
            }
        }
    }

    fn execute_ed<B: Z80Bus>(&mut self, bus: &mut B) {
        let opcode = bus.read_mem_opcode(self.pc);
        self.pc = self.pc.wrapping_add(1);
        self.increment_r();
        bus.tick(4);

        match opcode {
            0x43 | 0x53 | 0x63 | 0x73 => {                          // LD (nn),dd
                let addr = self.fetch16(bus);
                self.write16(bus, addr, self.rp(opcode >> 4));
            }
            0x4B | 0x5B | 0x6B | 0x7B => {                          // LD dd,(nn)
                let addr = self.fetch16(bus);
                let data = self.read16(bus, addr);
                self.set_rp(opcode >> 4, data);
            }
            0x47 => {                                               // LD I,A
                let a = self.a();
                self.set_i(a);
                bus.tick(1);
            }
            0x4F => {                                               // LD R,A
                let a = self.a();
                self.set_r(a);
                bus.tick(1);
            }
            0x57 => self.ld_a_ir(self.i(), bus),                    // LD A,I
            0x5F => self.ld_a_ir(self.r(), bus),                    // LD A,R
            0x67 => self.rrd(bus),
            0x6F => self.rld(bus),
            0xA1 => self.cp_block(bus, false, true),                // CPI
            0xA9 => self.cp_block(bus, false, false),               // CPD
            0xB1 => self.cp_block(bus, true, true),                 // CPIR
            0xB9 => self.cp_block(bus, true, false),                // CPDR
            0xA0 => self.ld_block(bus, true, false),                // LDI
            0xA8 => self.ld_block(bus, false, false),               // LDD
            0xB0 => self.ld_block(bus, true, true),                 // LDIR
            0xB8 => self.ld_block(bus, false, true),                // LDDR
            0xA2 => self.in_block(bus, true, false),                // INI
            0xAA => self.in_block(bus, false, false),               // IND
            0xB2 => self.in_block(bus, true, true),                 // INIR
            0xBA => self.in_block(bus, false, true),                // INDR
            0xA3 => self.out_block(bus, true, false),               // OUTI
            0xAB => self.out_block(bus, false, false),              // OUTD
            0xB3 => self.out_block(bus, true, true),                // OTIR
            0xBB => self.out_block(bus, false, true),               // OTDR
            0x42 | 0x52 | 0x62 | 0x72 => {                          // SBC HL,dd
                self.sbc16(self.rp(opcode >> 4));
                bus.tick(4);
                bus.tick(3);
            }
            0x4A | 0x5A | 0x6A | 0x7A => {                          // ADC HL,dd
                self.adc16(self.rp(opcode >> 4));
                bus.tick(4);
                bus.tick(3);
            }
            0x46 | 0x4E => self.interrupt_mode = 0,                 // IM 0
            0x56 => self.interrupt_mode = 1,                        // IM 1
            0x5E => self.interrupt_mode = 2,                        // IM 2
            0x44 | 0x4C | 0x54 | 0x5C | 0x64 | 0x6C | 0x74 | 0x7C => self.neg(),
            0x45 | 0x55 | 0x5D | 0x65 | 0x6D | 0x75 | 0x7D => {     // RETN
                self.pc = self.pop16(bus);
                self.iff1 = self.iff2;
            }
            0x4D => {                                               // RETI
                self.pc = self.pop16(bus);
                self.iff1 = self.iff2;
            }
            0x40 | 0x48 | 0x50 | 0x58 | 0x60 | 0x68 | 0x70 | 0x78 => { // IN r,(C)
                bus.tick(4);
                let data = bus.read_io(self.bc);
                self.set_f(szp35(data) | self.f() & FLAG_C);
                if opcode != 0x70 {
                    // ED 70 samples the port and discards the data
                    self.set_r8(Reg8::from_code(opcode >> 3), data);
                }
                bus.tick(4);
            }
            0x41 | 0x49 | 0x51 | 0x59 | 0x61 | 0x69 | 0x71 | 0x79 => { // OUT (C),r
                bus.tick(4);
                let data = if opcode == 0x71 {
                    // ED 71 outputs a constant zero
                    0
                }
                else {
                    self.r8(Reg8::from_code(opcode >> 3))
                };
                bus.write_io(self.bc, data);
                bus.tick(4);
            }
            _ => {}
        }
    }

    fn execute_ddfd<B: Z80Bus>(&mut self, bus: &mut B, xy: IndexReg) {
        let opcode = bus.read_mem(self.pc);
        self.pc = self.pc.wrapping_add(1);
        self.increment_r();
        bus.tick(4);

        match opcode {
            0x21 => {                                               // LD xy,nn
                let data = self.fetch16(bus);
                self.set_xy(xy, data);
            }
            0x22 => {                                               // LD (nn),xy
                let addr = self.fetch16(bus);
                self.write16(bus, addr, self.xy(xy));
            }
            0x2A => {                                               // LD xy,(nn)
                let addr = self.fetch16(bus);
                let data = self.read16(bus, addr);
                self.set_xy(xy, data);
            }
            0x23 => {                                               // INC xy
                self.set_xy(xy, self.xy(xy).wrapping_add(1));
                bus.tick(2);
            }
            0x2B => {                                               // DEC xy
                self.set_xy(xy, self.xy(xy).wrapping_sub(1));
                bus.tick(2);
            }
            0x09 | 0x19 | 0x29 | 0x39 => {                          // ADD xy,dd
                let rhs = match opcode >> 4 & 3 {
                    0 => self.bc,
                    1 => self.de,
                    2 => self.xy(xy),
                    _ => self.sp,
                };
                let result = self.add16(self.xy(xy), rhs);
                self.set_xy(xy, result);
                bus.tick(4);
                bus.tick(3);
            }
            0x34 => {                                               // INC (xy+o)
                let addr = self.index_addr(bus, xy);
                let data = self.read8(bus, addr);
                let result = self.inc8(data);
                self.write8(bus, addr, result);
            }
            0x35 => {                                               // DEC (xy+o)
                let addr = self.index_addr(bus, xy);
                let data = self.read8(bus, addr);
                let result = self.dec8(data);
                self.write8(bus, addr, result);
            }
            0x36 => {                                               // LD (xy+o),n
                let offset = self.fetch8(bus) as i8;
                let data = self.fetch8(bus);
                let addr = self.xy(xy).wrapping_add(offset as u16);
                bus.tick(5);
                self.write8(bus, addr, data);
            }
            0x24 | 0x2C => {                                        // INC xyh/xyl
                let reg = Reg8::from_code_indexed(opcode >> 3, xy);
                let result = self.inc8(self.r8(reg));
                self.set_r8(reg, result);
            }
            0x25 | 0x2D => {                                        // DEC xyh/xyl
                let reg = Reg8::from_code_indexed(opcode >> 3, xy);
                let result = self.dec8(self.r8(reg));
                self.set_r8(reg, result);
            }
            0x26 | 0x2E => {                                        // LD xyh/xyl,n
                let data = self.fetch8(bus);
                self.set_r8(Reg8::from_code_indexed(opcode >> 3, xy), data);
            }
            0x76 => self.execute(bus, opcode),                      // HALT, unaffected
            0x40..=0x7F => {
                let dst = opcode >> 3 & 7;
                let src = opcode & 7;
                if dst == 6 {
                    // LD (xy+o),r - the source register is not remapped
                    let addr = self.index_addr(bus, xy);
                    let data = self.r8(Reg8::from_code(src));
                    self.write8(bus, addr, data);
                }
                else if src == 6 {
                    // LD r,(xy+o) - the target register is not remapped
                    let addr = self.index_addr(bus, xy);
                    let data = self.read8(bus, addr);
                    self.set_r8(Reg8::from_code(dst), data);
                }
                else {
                    let data = self.r8(Reg8::from_code_indexed(src, xy));
                    self.set_r8(Reg8::from_code_indexed(dst, xy), data);
                }
            }
            0x80..=0xBF => {                                        // ALU A,xyh/xyl/(xy+o)
                let operand = if opcode & 7 == 6 {
                    let addr = self.index_addr(bus, xy);
                    self.read8(bus, addr)
                }
                else {
                    self.r8(Reg8::from_code_indexed(opcode, xy))
                };
                self.alu(opcode >> 3, operand);
            }
            0xCB => self.execute_ddfdcb(bus, xy),
            0xE1 => {                                               // POP xy
                let data = self.pop16(bus);
                self.set_xy(xy, data);
            }
            0xE5 => self.push16(bus, self.xy(xy)),                  // PUSH xy
            0xE3 => {                                               // EX (SP),xy
                let data = self.ex_sp(bus, self.xy(xy));
                self.set_xy(xy, data);
            }
            0xE9 => self.pc = self.xy(xy),                          // JP (xy)
            0xF9 => {                                               // LD SP,xy
                self.sp = self.xy(xy);
                bus.tick(2);
            }
            _ => self.execute(bus, opcode),
        }
    }

    /// The DDCB and FDCB prefixed instructions: the displacement byte comes
    /// before the sub-opcode, and every non-BIT operation also copies its
    /// result into a general purpose register unless the operand field says
    /// (HL).
    fn execute_ddfdcb<B: Z80Bus>(&mut self, bus: &mut B, xy: IndexReg) {
        let offset = bus.read_mem(self.pc) as i8;
        self.pc = self.pc.wrapping_add(1);
        bus.tick(3);

        let addr = self.xy(xy).wrapping_add(offset as u16);
        bus.tick(2);

        let opcode = bus.read_mem(self.pc);
        self.pc = self.pc.wrapping_add(1);
        bus.tick(3);

        let operand = opcode & 7;
        let bit = opcode >> 3 & 7;
        match opcode >> 6 {
            1 => {
                // BIT b,(xy+o)
                let data = bus.read_mem(addr);
                self.bit_test(bit, data);
                bus.tick(4);
                return
            }
            kind => {
                let data = bus.read_mem(addr);
                let result = match kind {
                    0 => self.rotate_shift(bit, data),
                    2 => data & !(1 << bit),
                    _ => data | 1 << bit,
                };
                if operand != 6 {
                    self.set_r8(Reg8::from_code(operand), result);
                }
                bus.tick(4);
                self.write8(bus, addr, result);
            }
        }
    }
}
