/*
    Copyright (C) 2022  Rafal Michalski

    This file is part of AMSTRUSTY, a Rust library for building emulators.

    For the full copyright notice, see the lib.rs file.
*/
//! The i8255 parallel peripheral interface.
//!
//! The PPI glues the CPU to the sound generator, the keyboard line selector,
//! the cassette deck and a handful of status inputs: port A is the PSG data
//! bus, port B collects machine status bits (vsync, tape level, vendor id),
//! port C drives the PSG control pins, the tape motor and the keyboard line.
use serde::{Serialize, Deserialize};

use super::ay::Psg;
use super::keyboard::Keyboard;
use super::tape::Tape;

/// The parallel peripheral interface.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ppi {
    printer_ready: bool,
    exp: bool,
    refresh_rate_50hz: bool,
    manufacturer: u8,
    tape_write_data: bool,
    port_a: u8,
    port_b: u8,
    port_c: u8,
    control: u8,
}

impl Default for Ppi {
    fn default() -> Self {
        Ppi {
            printer_ready: false,
            exp: false,
            // 50Hz refresh and the "Amstrad" vendor id, as reported by the firmware at boot
            refresh_rate_50hz: true,
            manufacturer: 0x07,
            tape_write_data: false,
            port_a: 0,
            port_b: 0,
            port_c: 0,
            control: 0,
        }
    }
}

impl Ppi {
    /// Restores the power-on state.
    pub fn reset(&mut self) {
        *self = Default::default();
    }

    /// The current level of the tape write-data line.
    #[inline(always)]
    pub fn tape_write_data(&self) -> bool {
        self.tape_write_data
    }

    #[inline]
    fn port_a_input(&self) -> bool {
        self.control & 0x10 != 0
    }

    #[inline]
    fn port_b_input(&self) -> bool {
        self.control & 0x02 != 0
    }

    #[inline]
    fn port_c_high_input(&self) -> bool {
        self.control & 0x08 != 0
    }

    #[inline]
    fn port_c_low_input(&self) -> bool {
        self.control & 0x01 != 0
    }

    /// Reads one of the PPI ports selected by bits 8 and 9 of the address.
    pub fn read(
            &self,
            port: u16,
            psg: &Psg,
            keyboard: &Keyboard,
            vsync: bool,
            tape: &Tape,
        ) -> u8
    {
        match port & 0x0300 {
            0x0000 => {
                if self.port_a_input() {
                    psg.read(keyboard)
                }
                else {
                    self.port_a
                }
            }
            0x0100 => {
                if self.port_b_input() {
                    (tape.level as u8) << 7             // cassette read data
                        | (self.printer_ready as u8) << 6
                        | (self.exp as u8) << 5         // /EXP
                        | (self.refresh_rate_50hz as u8) << 4
                        | self.manufacturer << 1
                        | vsync as u8
                }
                else {
                    self.port_b
                }
            }
            0x0200 => {
                // The output latch is returned even for input halves.
                self.port_c
            }
            _ => {
                // the control register is write-only
                0
            }
        }
    }

    /// Writes one of the PPI ports or the control register.
    pub fn write(
            &mut self,
            port: u16,
            data: u8,
            psg: &mut Psg,
            keyboard: &mut Keyboard,
            tape: &mut Tape,
        )
    {
        match port & 0x0300 {
            0x0000 => {
                self.port_a = data;
                if !self.port_a_input() {
                    psg.write(self.port_a);
                }
            }
            0x0100 => {
                self.port_b = data;
            }
            0x0200 => {
                self.port_c = data;
                self.write_port_c(psg, keyboard, tape);
            }
            _ => {
                if data & 0x80 != 0 {
                    // mode set: store the control byte and clear all ports
                    self.control = data;
                    self.port_a = 0;
                    self.port_b = 0;
                    self.port_c = 0;
                }
                else if !self.port_c_high_input() && !self.port_c_low_input() {
                    // single bit set/reset on port C
                    let bit = (data & 0x0E) >> 1;
                    self.port_c &= !(1 << bit);
                    self.port_c |= (data & 0x01) << bit;
                    self.write_port_c(psg, keyboard, tape);
                }
            }
        }
    }

    /// Applies the side effects of the port C output lines.
    fn write_port_c(&mut self, psg: &mut Psg, keyboard: &mut Keyboard, tape: &mut Tape) {
        if !self.port_c_low_input() {
            keyboard.select_line(self.port_c & 0x0F);
        }

        if !self.port_c_high_input() {
            tape.motor = self.port_c & 0x10 != 0;
            self.tape_write_data = self.port_c & 0x20 != 0;
            psg.set_control(self.port_c & 0x80 != 0, self.port_c & 0x40 != 0);
            psg.write(self.port_a);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Devices {
        psg: Psg,
        keyboard: Keyboard,
        tape: Tape,
    }

    impl Devices {
        fn new() -> Self {
            Devices {
                psg: Psg::default(),
                keyboard: Keyboard::default(),
                tape: Tape::default(),
            }
        }
    }

    #[test]
    fn port_b_assembles_status_bits() {
        let mut ppi = Ppi::default();
        let mut dev = Devices::new();
        // all ports input
        ppi.write(0xF700, 0x9B, &mut dev.psg, &mut dev.keyboard, &mut dev.tape);

        let b = ppi.read(0xF500, &dev.psg, &dev.keyboard, false, &dev.tape);
        assert_eq!(0b0001_1110, b);

        let b = ppi.read(0xF500, &dev.psg, &dev.keyboard, true, &dev.tape);
        assert_eq!(0b0001_1111, b);

        dev.tape.level = true;
        let b = ppi.read(0xF500, &dev.psg, &dev.keyboard, false, &dev.tape);
        assert_eq!(0b1001_1110, b);
    }

    #[test]
    fn port_c_low_selects_keyboard_line() {
        let mut ppi = Ppi::default();
        let mut dev = Devices::new();
        // port C output
        ppi.write(0xF700, 0x82, &mut dev.psg, &mut dev.keyboard, &mut dev.tape);
        ppi.write(0xF600, 0x05, &mut dev.psg, &mut dev.keyboard, &mut dev.tape);
        assert_eq!(5, dev.keyboard.selected_line());
    }

    #[test]
    fn port_c_high_drives_psg_and_tape_motor() {
        let mut ppi = Ppi::default();
        let mut dev = Devices::new();
        ppi.write(0xF700, 0x82, &mut dev.psg, &mut dev.keyboard, &mut dev.tape);

        ppi.write(0xF600, 0xD0, &mut dev.psg, &mut dev.keyboard, &mut dev.tape);
        assert!(dev.tape.motor);
        assert!(dev.psg.bdir());
        assert!(dev.psg.bc1());

        ppi.write(0xF600, 0x20, &mut dev.psg, &mut dev.keyboard, &mut dev.tape);
        assert!(!dev.tape.motor);
        assert!(ppi.tape_write_data());
        assert!(!dev.psg.bdir());
    }

    #[test]
    fn port_a_output_writes_the_psg() {
        let mut ppi = Ppi::default();
        let mut dev = Devices::new();
        // everything output
        ppi.write(0xF700, 0x80, &mut dev.psg, &mut dev.keyboard, &mut dev.tape);

        // select PSG register 8 through the pins, then write a value to it
        ppi.write(0xF400, 8, &mut dev.psg, &mut dev.keyboard, &mut dev.tape);
        ppi.write(0xF600, 0xC0, &mut dev.psg, &mut dev.keyboard, &mut dev.tape);
        ppi.write(0xF600, 0x00, &mut dev.psg, &mut dev.keyboard, &mut dev.tape);
        ppi.write(0xF400, 0x0D, &mut dev.psg, &mut dev.keyboard, &mut dev.tape);
        ppi.write(0xF600, 0x80, &mut dev.psg, &mut dev.keyboard, &mut dev.tape);

        dev.psg.set_control(false, true);
        assert_eq!(0x0D, dev.psg.read(&dev.keyboard));
    }

    #[test]
    fn control_bit_set_reset_updates_port_c() {
        let mut ppi = Ppi::default();
        let mut dev = Devices::new();
        ppi.write(0xF700, 0x80, &mut dev.psg, &mut dev.keyboard, &mut dev.tape);

        // set bit 4 (tape motor) through the control register
        ppi.write(0xF700, (4 << 1) | 1, &mut dev.psg, &mut dev.keyboard, &mut dev.tape);
        assert!(dev.tape.motor);

        // reset it again
        ppi.write(0xF700, 4 << 1, &mut dev.psg, &mut dev.keyboard, &mut dev.tape);
        assert!(!dev.tape.motor);
    }

    #[test]
    fn mode_set_clears_the_ports() {
        let mut ppi = Ppi::default();
        let mut dev = Devices::new();
        ppi.write(0xF700, 0x80, &mut dev.psg, &mut dev.keyboard, &mut dev.tape);
        ppi.write(0xF400, 0x55, &mut dev.psg, &mut dev.keyboard, &mut dev.tape);
        assert_eq!(0x55, ppi.read(0xF400, &dev.psg, &dev.keyboard, false, &dev.tape));

        ppi.write(0xF700, 0x92, &mut dev.psg, &mut dev.keyboard, &mut dev.tape);
        assert_eq!(0x00, ppi.read(0xF600, &dev.psg, &dev.keyboard, false, &dev.tape));
    }
}
