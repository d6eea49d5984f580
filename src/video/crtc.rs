/*
    Copyright (C) 2022  Rafal Michalski

    This file is part of AMSTRUSTY, a Rust library for building emulators.

    For the full copyright notice, see the lib.rs file.
*/
//! The HD6845 CRT controller: framing counters, sync pulses and the interrupt cadence.
use serde::{Serialize, Deserialize};

const REG_HORIZONTAL_TOTAL: usize = 0;
const REG_HORIZONTAL_DISPLAYED: usize = 1;
const REG_HORIZONTAL_SYNC_POSITION: usize = 2;
const REG_SYNC_WIDTHS: usize = 3;
const REG_VERTICAL_TOTAL: usize = 4;
const REG_VERTICAL_TOTAL_ADJUST: usize = 5;
const REG_VERTICAL_DISPLAYED: usize = 6;
const REG_VERTICAL_SYNC_POSITION: usize = 7;
const REG_MAX_RASTER_ADDRESS: usize = 9;
const REG_DISPLAY_START_HIGH: usize = 12;
const REG_DISPLAY_START_LOW: usize = 13;

/// The number of completed scanlines after which the gate array raises an interrupt.
const SCANLINES_PER_INTERRUPT: u8 = 52;

/// The screen row counter starts this far above the frame buffer, emulating
/// the overscan of a CRT monitor and centering the picture vertically.
const Y_TOP: u16 = (-16i16) as u16;

/// The CRT controller.
///
/// [Crtc::tick] advances the horizontal and vertical counters once per
/// microsecond, generating sync pulses, maintaining the video memory address
/// and pacing the 300 Hz interrupt request through the gate array's
/// 52-scanline counter.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Crtc {
    x: u8,
    y: u16,
    h_count: u8,
    v_count: u8,
    raster: u8,
    in_hsync: bool,
    hsync_count: u8,
    in_vsync: bool,
    vsync_count: u8,
    in_vtotal_adjust: bool,
    vtotal_adjust_count: u8,
    scan_line_count: u8,
    vsync_delay: u8,
    memory_address: u16,
    registers: [u8; 18],
    selected_register: u8,
}

impl Default for Crtc {
    fn default() -> Self {
        let mut crtc = Crtc {
            x: 0,
            y: 0,
            h_count: 0,
            v_count: 0,
            raster: 0,
            in_hsync: false,
            hsync_count: 0,
            in_vsync: false,
            vsync_count: 0,
            in_vtotal_adjust: false,
            vtotal_adjust_count: 0,
            scan_line_count: 0,
            vsync_delay: 0,
            memory_address: 0,
            registers: [0; 18],
            selected_register: 0,
        };
        crtc.reset();
        crtc
    }
}

impl Crtc {
    /// Restores the power-on state with the firmware's default register values.
    pub fn reset(&mut self) {
        self.x = 0;
        self.y = Y_TOP;
        self.raster = 0;
        self.h_count = 0;
        self.v_count = 0;
        self.in_hsync = false;
        self.hsync_count = 0;
        self.in_vsync = false;
        self.vsync_count = 0;
        self.in_vtotal_adjust = false;
        self.vtotal_adjust_count = 0;
        self.scan_line_count = 0;
        self.vsync_delay = 0;
        self.memory_address = 0x0000;
        self.selected_register = 0;
        self.registers = [
            0x3F, 0x28, 0x2E, 0x8E, 0x26, 0x00, 0x19, 0x1E, 0x00,
            0x07, 0x00, 0x00, 0x30, 0x00, 0xC0, 0x00, 0x00, 0x00
        ];
    }

    /// The screen column currently being output.
    #[inline(always)]
    pub fn x(&self) -> u16 {
        u16::from(self.x)
    }

    /// The screen row currently being output; wraps below zero during overscan.
    #[inline(always)]
    pub fn y(&self) -> u16 {
        self.y
    }

    #[inline(always)]
    pub fn h_count(&self) -> u8 {
        self.h_count
    }

    #[inline(always)]
    pub fn v_count(&self) -> u8 {
        self.v_count
    }

    #[inline(always)]
    pub fn raster(&self) -> u8 {
        self.raster
    }

    #[inline(always)]
    pub fn in_hsync(&self) -> bool {
        self.in_hsync
    }

    #[inline(always)]
    pub fn in_vsync(&self) -> bool {
        self.in_vsync
    }

    #[inline(always)]
    pub fn horizontal_displayed(&self) -> u8 {
        self.registers[REG_HORIZONTAL_DISPLAYED]
    }

    #[inline(always)]
    pub fn vertical_displayed(&self) -> u8 {
        self.registers[REG_VERTICAL_DISPLAYED]
    }

    /// The base video memory address for the scanline being output.
    #[inline(always)]
    pub fn memory_address(&self) -> u16 {
        self.memory_address
    }

    /// Clears the 52-scanline interrupt counter. Used by the gate array's
    /// interrupt-control writes.
    pub fn clear_scan_line_count(&mut self) {
        self.scan_line_count = 0;
    }

    /// Called when the CPU acknowledges a maskable interrupt: the gate array
    /// drops the top bit of the scanline counter.
    pub fn interrupt_acknowledged(&mut self) {
        self.scan_line_count &= 0xDF;
    }

    fn read_register(&self) -> u8 {
        if let 12..=17 = self.selected_register {
            return self.registers[usize::from(self.selected_register)]
        }
        0x00
    }

    fn write_register(&mut self, data: u8) {
        if self.selected_register <= 15 {
            // Mask off the bits each register doesn't implement.
            let data = match self.selected_register {
                4|6|7|10 => data & 0x7F,
                5|9|11   => data & 0x1F,
                8        => data & 0x03,
                12|14    => data & 0x3F,
                _        => data
            };
            self.registers[usize::from(self.selected_register)] = data;
        }
    }

    /// Reads from the CRTC I/O ports; only the read-register port responds.
    pub fn read(&self, port: u16) -> u8 {
        match port & 0x0300 {
            0x0300 => self.read_register(),
            _ => 0
        }
    }

    /// Writes to the CRTC I/O ports: register select or register data.
    pub fn write(&mut self, port: u16, data: u8) {
        match port & 0x0300 {
            0x0000 => self.selected_register = data,
            0x0100 => self.write_register(data),
            _ => {}
        }
    }

    fn hsync_end(&mut self, interrupt_requested: &mut bool) {
        self.scan_line_count = self.scan_line_count.wrapping_add(1);

        let mut raise_interrupt = false;
        if self.scan_line_count == SCANLINES_PER_INTERRUPT {
            self.scan_line_count = 0;
            raise_interrupt = true;
        }

        if self.vsync_delay != 0 {
            self.vsync_delay -= 1;
            if self.vsync_delay == 0 {
                if self.scan_line_count >= 32 {
                    raise_interrupt = true;
                }
                self.scan_line_count = 0;
            }
        }

        if raise_interrupt {
            *interrupt_requested = true;
        }
    }

    /// Advances the controller by one microsecond.
    ///
    /// `interrupt_requested` is the wire to the CPU's INT line; it is only
    /// ever raised here and lowered by the interrupt acknowledge or the gate
    /// array.
    pub fn tick(&mut self, interrupt_requested: &mut bool) {
        let mut new_frame = false;

        self.x = self.x.wrapping_add(1);
        self.h_count = self.h_count.wrapping_add(1);
        if self.in_hsync {
            self.hsync_count = self.hsync_count.wrapping_add(1) & 0x0F;
            if self.hsync_count == self.registers[REG_SYNC_WIDTHS] & 0x0F {
                self.in_hsync = false;
                self.x = 0;
                self.y = self.y.wrapping_add(1);
                self.hsync_end(interrupt_requested);
            }
        }
        else if self.h_count == self.registers[REG_HORIZONTAL_SYNC_POSITION] {
            self.in_hsync = true;
            self.hsync_count = 0;
        }

        // The programmed horizontal total is one less than the line length.
        if self.h_count == self.registers[REG_HORIZONTAL_TOTAL].wrapping_add(1) {
            self.h_count = 0;
            self.raster = self.raster.wrapping_add(1) & 0x1F;

            if self.in_vtotal_adjust {
                self.vtotal_adjust_count = self.vtotal_adjust_count.wrapping_add(1);
                if self.vtotal_adjust_count == self.registers[REG_VERTICAL_TOTAL_ADJUST] {
                    self.in_vtotal_adjust = false;
                    new_frame = true;
                }
            }
            else if self.in_vsync {
                self.vsync_count = self.vsync_count.wrapping_add(1) & 0x0F;
                if self.vsync_count == self.registers[REG_SYNC_WIDTHS] >> 4 {
                    self.y = 0;
                    self.in_vsync = false;
                }
            }

            if !self.in_vtotal_adjust && !new_frame
                && self.raster == self.registers[REG_MAX_RASTER_ADDRESS].wrapping_add(1)
            {
                self.raster = 0;
                self.v_count = self.v_count.wrapping_add(1) & 0x7F;

                self.memory_address = self.memory_address
                    .wrapping_add(u16::from(self.registers[REG_HORIZONTAL_DISPLAYED]));

                if self.v_count == self.registers[REG_VERTICAL_SYNC_POSITION] {
                    self.in_vsync = true;
                    self.vsync_count = 0;
                    self.vsync_delay = 2;
                }

                if !self.in_vsync
                    && self.v_count == self.registers[REG_VERTICAL_TOTAL].wrapping_add(1)
                {
                    if self.registers[REG_VERTICAL_TOTAL_ADJUST] == 0 {
                        new_frame = true;
                    }
                    else {
                        self.in_vtotal_adjust = true;
                        self.vtotal_adjust_count = 0;
                    }
                }
            }
        }

        if new_frame {
            self.v_count = 0;
            self.raster = 0;
            self.memory_address = u16::from_le_bytes([
                self.registers[REG_DISPLAY_START_LOW],
                self.registers[REG_DISPLAY_START_HIGH]
            ]);
        }
    }
}
