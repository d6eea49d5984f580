/*
    Copyright (C) 2022-2023  Rafal Michalski

    This file is part of AMSTRUSTY, a Rust library for building emulators.

    For the full copyright notice, see the lib.rs file.
*/
//! The Z80 CPU.
//!
//! The CPU talks to the outside world exclusively through the [Z80Bus]
//! trait. Memory requests align the shared clock to the next microsecond
//! boundary before they are served, so that every read, write and I/O access
//! lands on the same tick it would on the real machine; the tick counts of
//! each machine cycle are distributed between the accesses accordingly.
mod ops;

// Flag register bits.
pub const FLAG_S: u8 = 0x80;
pub const FLAG_Z: u8 = 0x40;
pub const FLAG_5: u8 = 0x20;
pub const FLAG_H: u8 = 0x10;
pub const FLAG_3: u8 = 0x08;
pub const FLAG_PV: u8 = 0x04;
pub const FLAG_N: u8 = 0x02;
pub const FLAG_C: u8 = 0x01;

/// The environment a [Z80] executes in: memory, I/O ports, the clock and the
/// interrupt request line.
pub trait Z80Bus {
    /// Serves a CPU memory read; aligns the clock to the microsecond grid first.
    fn read_mem(&mut self, addr: u16) -> u8;
    /// Serves a CPU memory write; aligns the clock to the microsecond grid first.
    fn write_mem(&mut self, addr: u16, data: u8);
    /// Reads a prefixed sub-opcode without waiting for the microsecond grid.
    fn read_mem_opcode(&mut self, addr: u16) -> u8 {
        self.read_mem(addr)
    }
    /// Serves an I/O port read.
    fn read_io(&mut self, port: u16) -> u8;
    /// Serves an I/O port write.
    fn write_io(&mut self, port: u16, data: u8);
    /// Advances the clock by the given number of ticks.
    fn tick(&mut self, ticks: u8);
    /// Whether the maskable interrupt line is being asserted.
    fn interrupt_pending(&self) -> bool {
        false
    }
    /// Notifies the bus that the CPU acknowledged the maskable interrupt.
    fn interrupt_acknowledge(&mut self) {}
}

/// Identifies an 8-bit register operand, including the undocumented halves
/// of the index registers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Reg8 {
    B, C, D, E, H, L, A,
    IxH, IxL, IyH, IyL,
}

/// Selects which of the two index registers a DD or FD prefix refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum IndexReg {
    Ix,
    Iy,
}

impl Reg8 {
    /// Decodes a 3-bit register operand field. The caller must have handled
    /// the memory operand encoding (6) itself.
    fn from_code(code: u8) -> Reg8 {
        match code & 7 {
            0 => Reg8::B,
            1 => Reg8::C,
            2 => Reg8::D,
            3 => Reg8::E,
            4 => Reg8::H,
            5 => Reg8::L,
            7 => Reg8::A,
            _ => unreachable!("memory operand is not a register")
        }
    }

    /// Decodes a 3-bit register operand field under a DD or FD prefix, where
    /// H and L address the halves of the index register instead.
    fn from_code_indexed(code: u8, xy: IndexReg) -> Reg8 {
        match (code & 7, xy) {
            (4, IndexReg::Ix) => Reg8::IxH,
            (5, IndexReg::Ix) => Reg8::IxL,
            (4, IndexReg::Iy) => Reg8::IyH,
            (5, IndexReg::Iy) => Reg8::IyL,
            _ => Reg8::from_code(code)
        }
    }
}

macro_rules! pair_accessors {
    ($pair:ident, $hi:ident, $lo:ident, $set_hi:ident, $set_lo:ident) => {
        #[inline(always)]
        pub fn $hi(&self) -> u8 {
            (self.$pair >> 8) as u8
        }
        #[inline(always)]
        pub fn $lo(&self) -> u8 {
            self.$pair as u8
        }
        #[inline(always)]
        pub fn $set_hi(&mut self, data: u8) {
            self.$pair = self.$pair & 0x00FF | u16::from(data) << 8;
        }
        #[inline(always)]
        pub fn $set_lo(&mut self, data: u8) {
            self.$pair = self.$pair & 0xFF00 | u16::from(data);
        }
    };
}

/// The Z80 register file and interrupt state.
#[derive(Clone, Debug, Default)]
pub struct Z80 {
    pub af: u16,
    pub bc: u16,
    pub de: u16,
    pub hl: u16,
    pub af_alt: u16,
    pub bc_alt: u16,
    pub de_alt: u16,
    pub hl_alt: u16,
    pub ix: u16,
    pub iy: u16,
    pub pc: u16,
    pub sp: u16,
    /// The interrupt vector and memory refresh register pair.
    pub ir: u16,
    pub iff1: bool,
    pub iff2: bool,
    pub interrupt_mode: u8,
    /// Counts instructions until an EI takes effect; interrupts are enabled
    /// when it reaches zero.
    pub ei_delay: u8,
    pub halted: bool,
}

impl Z80 {
    pair_accessors!(af, a, f, set_a, set_f);
    pair_accessors!(bc, b, c, set_b, set_c);
    pair_accessors!(de, d, e, set_d, set_e);
    pair_accessors!(hl, h, l, set_h, set_l);
    pair_accessors!(ix, ixh, ixl, set_ixh, set_ixl);
    pair_accessors!(iy, iyh, iyl, set_iyh, set_iyl);
    pair_accessors!(ir, i, r, set_i, set_r);

    /// Restores the power-on register state.
    pub fn reset(&mut self) {
        self.af = 0;
        self.bc = 0;
        self.de = 0;
        self.hl = 0;
        self.ir = 0;
        self.af_alt = 0;
        self.bc_alt = 0;
        self.de_alt = 0;
        self.hl_alt = 0;
        self.ix = 0xFFFF;
        self.iy = 0xFFFF;
        self.pc = 0;
        self.sp = 0;
        self.iff1 = false;
        self.iff2 = false;
        self.interrupt_mode = 0;
        self.ei_delay = 0;
        self.halted = false;
    }

    #[inline]
    fn r8(&self, reg: Reg8) -> u8 {
        match reg {
            Reg8::B => self.b(),
            Reg8::C => self.c(),
            Reg8::D => self.d(),
            Reg8::E => self.e(),
            Reg8::H => self.h(),
            Reg8::L => self.l(),
            Reg8::A => self.a(),
            Reg8::IxH => self.ixh(),
            Reg8::IxL => self.ixl(),
            Reg8::IyH => self.iyh(),
            Reg8::IyL => self.iyl(),
        }
    }

    #[inline]
    fn set_r8(&mut self, reg: Reg8, data: u8) {
        match reg {
            Reg8::B => self.set_b(data),
            Reg8::C => self.set_c(data),
            Reg8::D => self.set_d(data),
            Reg8::E => self.set_e(data),
            Reg8::H => self.set_h(data),
            Reg8::L => self.set_l(data),
            Reg8::A => self.set_a(data),
            Reg8::IxH => self.set_ixh(data),
            Reg8::IxL => self.set_ixl(data),
            Reg8::IyH => self.set_iyh(data),
            Reg8::IyL => self.set_iyl(data),
        }
    }

    #[inline]
    fn xy(&self, xy: IndexReg) -> u16 {
        match xy {
            IndexReg::Ix => self.ix,
            IndexReg::Iy => self.iy,
        }
    }

    #[inline]
    fn set_xy(&mut self, xy: IndexReg, data: u16) {
        match xy {
            IndexReg::Ix => self.ix = data,
            IndexReg::Iy => self.iy = data,
        }
    }

    /// Steps the memory refresh counter, preserving its top bit.
    #[inline]
    pub fn increment_r(&mut self) {
        self.set_r(self.r() & 0x80 | self.r().wrapping_add(1) & 0x7F);
    }

    /// Evaluates a 3-bit condition code field against the flags.
    #[inline]
    fn condition(&self, code: u8) -> bool {
        let f = self.f();
        match code & 7 {
            0 => f & FLAG_Z == 0,
            1 => f & FLAG_Z != 0,
            2 => f & FLAG_C == 0,
            3 => f & FLAG_C != 0,
            4 => f & FLAG_PV == 0,
            5 => f & FLAG_PV != 0,
            6 => f & FLAG_S == 0,
            _ => f & FLAG_S != 0,
        }
    }

    /// Executes a single instruction, or acknowledges a pending interrupt.
    pub fn step<B: Z80Bus>(&mut self, bus: &mut B) {
        if self.ei_delay > 0 {
            self.ei_delay -= 1;
            if self.ei_delay == 0 {
                self.iff1 = true;
                self.iff2 = true;
            }
        }

        if self.handle_interrupt(bus) {
            return
        }

        let opcode = bus.read_mem(self.pc);
        self.pc = self.pc.wrapping_add(1);
        self.increment_r();
        bus.tick(4);

        self.execute(bus, opcode);
    }

    /// Acknowledges a pending maskable interrupt, if any.
    ///
    /// Returns `true` when the interrupt was vectored, in which case no
    /// instruction is executed this step. The CPC ties the data bus high so
    /// only mode 1 ever vectors anywhere.
    fn handle_interrupt<B: Z80Bus>(&mut self, bus: &mut B) -> bool {
        if !(self.iff1 && bus.interrupt_pending()) {
            return false
        }

        if self.halted {
            self.pc = self.pc.wrapping_add(1);
            self.halted = false;
        }

        self.iff1 = false;
        self.iff2 = false;
        bus.interrupt_acknowledge();
        self.increment_r();

        if self.interrupt_mode == 1 {
            bus.tick(7);

            self.sp = self.sp.wrapping_sub(1);
            bus.write_mem(self.sp, (self.pc >> 8) as u8);
            bus.tick(3);

            self.sp = self.sp.wrapping_sub(1);
            bus.write_mem(self.sp, self.pc as u8);
            bus.tick(3);

            self.pc = 0x0038;
            return true
        }

        false
    }
}

// Flag computation helpers.

#[inline]
fn sign8(data: u8) -> u8 {
    data & FLAG_S
}

#[inline]
fn zero8(data: u8) -> u8 {
    if data == 0 { FLAG_Z } else { 0 }
}

#[inline]
fn flags35(data: u8) -> u8 {
    data & (FLAG_3 | FLAG_5)
}

#[inline]
fn carry8(result: u16) -> u8 {
    if result & 0x100 != 0 { FLAG_C } else { 0 }
}

#[inline]
fn carry16(result: u32) -> u8 {
    if result & 0x1_0000 != 0 { FLAG_C } else { 0 }
}

#[inline]
fn zero16(result: u16) -> u8 {
    if result == 0 { FLAG_Z } else { 0 }
}

#[inline]
fn sign16(result: u16) -> u8 {
    sign8((result >> 8) as u8)
}

#[inline]
fn sz(data: u8) -> u8 {
    sign8(data) | zero8(data)
}

#[inline]
fn sz35(data: u8) -> u8 {
    sz(data) | flags35(data)
}

#[inline]
fn szp35(data: u8) -> u8 {
    sz35(data) | parity(data)
}

/// The parity flag: set when the number of one bits is even.
#[inline]
fn parity(data: u8) -> u8 {
    if data.count_ones() & 1 == 0 { FLAG_PV } else { 0 }
}

/// Half-carry between bits 3 and 4: set when bit 4 of `op1 ^ op2 ^ result`
/// is set, which holds for additions and subtractions alike.
#[inline]
fn half8(op1: u8, op2: u8, result: u16) -> u8 {
    if (op1 ^ op2 ^ result as u8) & 0x10 != 0 { FLAG_H } else { 0 }
}

#[inline]
fn half16(op1: u16, op2: u16, result: u16) -> u8 {
    half8((op1 >> 8) as u8, (op2 >> 8) as u8, result >> 8)
}

/// Overflow of a signed 8-bit addition: both operands share a sign opposite
/// to the result's.
#[inline]
fn overflow8_add(op1: u8, op2: u8, result: u16) -> u8 {
    if (op1 ^ op2 ^ 0x80) & (op1 ^ result as u8) & 0x80 != 0 { FLAG_PV } else { 0 }
}

/// Overflow of a signed 8-bit subtraction: operand signs differ and the
/// result took the subtrahend's.
#[inline]
fn overflow8_sub(op1: u8, op2: u8, result: u16) -> u8 {
    if (op2 ^ result as u8 ^ 0x80) & (op2 ^ op1) & 0x80 != 0 { FLAG_PV } else { 0 }
}

#[inline]
fn overflow16_add(op1: u16, op2: u16, result: u16) -> u8 {
    overflow8_add((op1 >> 8) as u8, (op2 >> 8) as u8, result >> 8)
}

#[inline]
fn overflow16_sub(op1: u16, op2: u16, result: u16) -> u8 {
    overflow8_sub((op1 >> 8) as u8, (op2 >> 8) as u8, result >> 8)
}

#[cfg(test)]
mod tests;
