/*
    Copyright (C) 2022-2023  Rafal Michalski

    This file is part of AMSTRUSTY, a Rust library for building emulators.

    For the full copyright notice, see the lib.rs file.
*/
//! The CPC core: the CPU, the motherboard and the run loop.
//!
//! [Cpc] advances all components in lockstep on a shared tick clock. Memory
//! and I/O requests from the CPU first align the clock to the next
//! microsecond boundary; every full microsecond crossed renders one pixel
//! column, samples the audio when due and steps the CRTC, the sound
//! generator, the disc controller and the tape deck, in that order.
use core::convert::TryFrom;
use core::fmt;

use crate::audio::AudioRingBuffer;
use crate::clock::{StopBits, StopReason, Ticks, TICKS_PER_US};
use crate::cpu::{Z80, Z80Bus};
use crate::formats::dsk::Disc;
use crate::memory::{Mem16k, Memory, MemoryError};
use crate::peripherals::{Fdc, Keyboard, Ppi, Psg, Tape};
use crate::video::{Crtc, GateArray, Screen, PIXELS_PER_COLUMN};

/// The default audio sampling frequency in Hz.
pub const DEFAULT_AUDIO_FREQUENCY: u32 = 48000;

/// An error restoring the machine from a state blob.
#[derive(Debug)]
pub struct SnapshotError(bincode::Error);

impl std::error::Error for SnapshotError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&*self.0)
    }
}

impl fmt::Display for SnapshotError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "malformed state blob: {}", self.0)
    }
}

/// Everything on the bus side of the CPU.
struct Board {
    ticks: Ticks,
    memory: Memory,
    gate_array: GateArray,
    crtc: Crtc,
    psg: Psg,
    keyboard: Keyboard,
    ppi: Ppi,
    fdc: Fdc,
    tape: Tape,
    interrupt_requested: bool,
    frequency: u32,
    audio_tick_total: u32,
    audio_ticks_to_next_sample: u32,
    audio_sample_count: u32,
    audio: AudioRingBuffer,
    screen: Screen,
}

impl Default for Board {
    fn default() -> Self {
        Board {
            ticks: 0,
            memory: Default::default(),
            gate_array: Default::default(),
            crtc: Default::default(),
            psg: Default::default(),
            keyboard: Default::default(),
            ppi: Default::default(),
            fdc: Default::default(),
            tape: Default::default(),
            interrupt_requested: false,
            frequency: DEFAULT_AUDIO_FREQUENCY,
            audio_tick_total: 0,
            audio_ticks_to_next_sample: 0,
            audio_sample_count: 0,
            audio: Default::default(),
            screen: Default::default(),
        }
    }
}

impl Board {
    /// Advances the clock to the next microsecond boundary, 0 to 3 ticks.
    fn tick_to_next_us(&mut self) {
        self.tick(((TICKS_PER_US - self.ticks % TICKS_PER_US) % TICKS_PER_US) as u8);
    }

    /// Steps every non-CPU component once per full microsecond crossed.
    fn step_us(&mut self) {
        self.video_render();
        self.audio_render();

        self.crtc.tick(&mut self.interrupt_requested);
        self.psg.tick();
        self.fdc.tick();
        self.tape.tick();
    }

    /// Renders one 16-pixel column at the CRTC's current screen position.
    fn video_render(&mut self) {
        if self.screen.is_null() {
            return
        }
        let x = self.crtc.x();
        let y = self.crtc.y();
        if x >= self.screen.width_columns() || y >= self.screen.height() {
            return
        }
        if self.crtc.in_hsync() || self.crtc.in_vsync() {
            return
        }

        let pixel_ptr = self.screen.column_ptr(x, y);
        let in_screen = self.crtc.h_count() < self.crtc.horizontal_displayed()
            && self.crtc.v_count() < self.crtc.vertical_displayed();

        if in_screen {
            let mem_addr = self.crtc.memory_address()
                .wrapping_add(u16::from(self.crtc.h_count()));
            let addr = (mem_addr & 0x3000) << 2
                | u16::from(self.crtc.raster() & 0x07) << 11
                | (mem_addr & 0x03FF) << 1;

            let pixels = self.gate_array.pixels(self.memory.video_read(addr));
            unsafe { core::ptr::copy_nonoverlapping(pixels.as_ptr(), pixel_ptr, 8); }
            let pixels = self.gate_array.pixels(self.memory.video_read(addr.wrapping_add(1)));
            unsafe { core::ptr::copy_nonoverlapping(pixels.as_ptr(), pixel_ptr.add(8), 8); }
        }
        else {
            unsafe {
                core::ptr::write_bytes(pixel_ptr, self.gate_array.border(),
                                       usize::from(PIXELS_PER_COLUMN));
            }
        }
    }

    /// Emits one audio sample per channel whenever the sampling period elapses.
    fn audio_render(&mut self) {
        if self.audio_tick_total >= self.audio_ticks_to_next_sample {
            self.audio_sample_count += 1;
            if self.audio_sample_count >= self.frequency {
                self.audio_sample_count = 0;
                self.audio_tick_total = 0;
            }
            self.audio_ticks_to_next_sample =
                (u64::from(self.audio_sample_count) * 1_000_000
                    / u64::from(self.frequency)) as u32;

            let mut amps = self.psg.amplitudes();
            if self.tape.motor && (self.tape.level || self.ppi.tape_write_data()) {
                // a high tape level drowns out everything else
                amps = [15; 3];
            }
            self.audio.write_sample(amps);
        }
        self.audio_tick_total += 1;
    }

    /// Dispatches an I/O read by the partially decoded port address lines.
    fn bus_read(&mut self, port: u16) -> u8 {
        if port & 0x0800 == 0 {
            return self.ppi.read(port, &self.psg, &self.keyboard,
                                 self.crtc.in_vsync(), &self.tape)
        }
        if port & 0x0400 == 0 && port & 0x0080 == 0 {
            // expansion peripherals: only the disc controller is attached
            return self.fdc.read(port)
        }
        0
    }

    /// Dispatches an I/O write; several devices may react to one address.
    fn bus_write(&mut self, port: u16, data: u8) {
        if port & 0x0800 == 0 {
            self.ppi.write(port, data, &mut self.psg, &mut self.keyboard, &mut self.tape);
        }
        if port & 0xC000 == 0x4000 {
            self.gate_array.write(data, &mut self.memory, &mut self.crtc,
                                  &mut self.interrupt_requested);
        }
        if port & 0x8000 == 0 && data & 0xC0 == 0xC0 {
            self.memory.set_ram_config(data);
        }
        if port & 0x4000 == 0 {
            self.crtc.write(port, data);
        }
        if port & 0x2000 == 0 {
            self.memory.select_upper_rom(data);
        }
        if port & 0x0400 == 0 && port & 0x0080 == 0 {
            self.fdc.write(port, data);
        }
    }

    fn reset(&mut self) {
        self.interrupt_requested = false;
        self.memory.reset();
        self.gate_array.reset();
        self.psg.reset();
        self.keyboard.reset();
        self.ppi.reset();
        self.crtc.reset();
        self.fdc.reset();
    }
}

impl Z80Bus for Board {
    fn read_mem(&mut self, addr: u16) -> u8 {
        self.tick_to_next_us();
        self.memory.read(addr)
    }

    fn write_mem(&mut self, addr: u16, data: u8) {
        self.tick_to_next_us();
        self.memory.write(addr, data);
    }

    fn read_mem_opcode(&mut self, addr: u16) -> u8 {
        self.memory.read(addr)
    }

    fn read_io(&mut self, port: u16) -> u8 {
        self.bus_read(port)
    }

    fn write_io(&mut self, port: u16, data: u8) {
        self.bus_write(port, data);
    }

    fn tick(&mut self, ticks: u8) {
        let boundaries = (u64::from(ticks) + self.ticks % TICKS_PER_US) / TICKS_PER_US;
        for _ in 0..boundaries {
            self.step_us();
        }
        self.ticks += u64::from(ticks);
    }

    fn interrupt_pending(&self) -> bool {
        self.interrupt_requested
    }

    fn interrupt_acknowledge(&mut self) {
        self.interrupt_requested = false;
        self.crtc.interrupt_acknowledged();
    }
}

/// The emulated machine.
///
/// The single entry point for running it is [Cpc::run_until]; everything
/// else configures the machine, feeds it media or inspects its state.
pub struct Cpc {
    cpu: Z80,
    board: Board,
}

impl Default for Cpc {
    fn default() -> Self {
        let mut cpu = Z80::default();
        cpu.reset();
        Cpc { cpu, board: Default::default() }
    }
}

impl Cpc {
    /// Creates a machine in its power-on state.
    pub fn new() -> Self {
        Default::default()
    }

    /// Resets the hardware as the reset button would.
    ///
    /// The tick counter, the audio pipeline and any loaded media are
    /// unaffected.
    pub fn reset(&mut self) {
        self.cpu.reset();
        self.board.reset();
    }

    /// The current value of the machine clock.
    pub fn ticks(&self) -> Ticks {
        self.board.ticks
    }

    /// Loads the 16 KiB firmware ROM overlaying the bottom of the address space.
    pub fn load_lower_rom(&mut self, rom: &[u8]) -> Result<(), MemoryError> {
        self.board.memory.set_lower_rom(Mem16k::try_from(rom)?);
        Ok(())
    }

    /// Loads a 16 KiB ROM image into one of the 256 upper ROM slots.
    pub fn load_upper_rom(&mut self, slot: u8, rom: &[u8]) -> Result<(), MemoryError> {
        self.board.memory.set_upper_rom(slot, Mem16k::try_from(rom)?);
        Ok(())
    }

    /// Enables or disables the lower ROM overlay directly.
    pub fn enable_lower_rom(&mut self, enable: bool) {
        self.board.memory.enable_lower_rom(enable);
    }

    /// Enables or disables the upper ROM overlay directly.
    pub fn enable_upper_rom(&mut self, enable: bool) {
        self.board.memory.enable_upper_rom(enable);
    }

    /// Presses or releases a key.
    ///
    /// The key code encodes the matrix coordinates as `bit * 10 + line`;
    /// translating host keys to matrix coordinates is the caller's business.
    /// Returns `true` if the matrix state changed.
    pub fn key_press(&mut self, keycode: u8, down: bool) -> bool {
        self.board.keyboard.key_press(keycode % 10, keycode / 10, down)
    }

    /// Hands the machine a frame buffer to render into.
    ///
    /// `pitch` is the stride between pixel rows in bytes, `height` the number
    /// of rows and `width` the row width in pixels. Pass a null pointer with
    /// zero dimensions to disable rendering. The buffer must stay valid and
    /// untouched for the duration of every [Cpc::run_until] call.
    pub fn set_screen(&mut self, buffer: *mut u8, pitch: u16, height: u16, width: u16) {
        self.board.screen = Screen::new(buffer, pitch, height, width);
    }

    /// Sets the audio sampling frequency in Hz.
    pub fn set_frequency(&mut self, frequency: u32) {
        assert!(frequency > 0, "audio frequency must not be zero");
        self.board.frequency = frequency;
    }

    /// Loads a tape image into the cassette deck, or ejects it with `None`.
    ///
    /// Returns `false` when the image is not recognized.
    pub fn load_tape(&mut self, image: Option<&[u8]>) -> bool {
        match image {
            Some(image) => self.board.tape.load(image),
            None => {
                self.board.tape.eject();
                true
            }
        }
    }

    /// Loads a disc image into one of the two drives, or ejects it with `None`.
    ///
    /// Returns `false` when the image is not recognized.
    pub fn load_disc(&mut self, drive: u8, image: Option<&[u8]>) -> bool {
        assert!(drive < 2, "no such drive: {}", drive);
        match image {
            Some(image) => match Disc::parse(image) {
                Ok(disc) => {
                    self.board.fdc.insert_disc(drive, disc);
                    true
                }
                Err(err) => {
                    log::warn!("disc image rejected: {}", err);
                    false
                }
            },
            None => {
                self.board.fdc.eject_disc(drive);
                true
            }
        }
    }

    /// Copies up to `num_samples` buffered audio samples per channel into the
    /// caller's buffers; `None` entries skip a channel. Returns the number of
    /// samples delivered.
    pub fn get_audio_buffers(
            &mut self,
            num_samples: usize,
            channels: [Option<&mut [u8]>; 3]
        ) -> usize
    {
        self.board.audio.get_buffers(num_samples, channels)
    }

    /// Discards up to `num_samples` buffered audio samples.
    pub fn advance_playback(&mut self, num_samples: usize) {
        self.board.audio.get_buffers(num_samples, [None, None, None]);
    }

    /// Reads a byte from memory the way the CPU sees it, without running.
    pub fn read_ram(&self, addr: u16) -> u8 {
        self.board.memory.read(addr)
    }

    /// Writes a byte to RAM without running.
    pub fn write_ram(&mut self, addr: u16, data: u8) {
        self.board.memory.write(addr, data);
    }

    /// Runs the machine until the clock reaches `stop_ticks` or one of the
    /// conditions in `stop` occurs.
    ///
    /// Executes whole instructions, so the clock may overshoot the deadline
    /// by one instruction. The stop conditions are only examined at
    /// instruction boundaries.
    pub fn run_until(&mut self, stop_ticks: Ticks, stop: StopBits) -> StopReason {
        while self.board.ticks < stop_ticks {
            if stop.contains(StopBits::AUDIO_OVERRUN) && self.board.audio.overrun() {
                return StopReason::AudioOverrun
            }

            let vsync_before = self.board.crtc.in_vsync();
            self.cpu.step(&mut self.board);

            if stop.contains(StopBits::VSYNC)
                && !vsync_before && self.board.crtc.in_vsync()
            {
                return StopReason::VSync
            }
        }
        StopReason::None
    }

    /// Serializes the complete machine state into a byte blob.
    ///
    /// The blob round-trips exactly: loading it and serializing again yields
    /// identical bytes.
    pub fn get_state(&self) -> Vec<u8> {
        let cpu = &self.cpu;
        let board = &self.board;
        bincode::serialize(&(
            board.ticks,
            (cpu.af, cpu.bc, cpu.de, cpu.hl),
            (cpu.af_alt, cpu.bc_alt, cpu.de_alt, cpu.hl_alt),
            (cpu.ix, cpu.iy, cpu.pc, cpu.sp),
            (cpu.iff1, cpu.iff2, board.interrupt_requested,
                cpu.interrupt_mode, cpu.ei_delay, cpu.halted),
            &board.memory,
            &board.fdc,
            &board.keyboard,
            &board.crtc,
            &board.psg,
            &board.ppi,
            &board.gate_array,
            &board.tape,
            (board.audio_tick_total, board.audio_ticks_to_next_sample,
                board.audio_sample_count, board.frequency),
        )).expect("state serialization is infallible")
    }

    /// Restores the machine from a blob produced by [Cpc::get_state].
    ///
    /// The frame buffer binding and buffered audio are left alone.
    pub fn load_state(&mut self, state: &[u8]) -> Result<(), SnapshotError> {
        let (ticks,
             (af, bc, de, hl),
             (af_alt, bc_alt, de_alt, hl_alt),
             (ix, iy, pc, sp),
             (iff1, iff2, interrupt_requested, interrupt_mode, ei_delay, halted),
             memory, fdc, keyboard, crtc, psg, ppi, gate_array, tape,
             (audio_tick_total, audio_ticks_to_next_sample, audio_sample_count, frequency),
        ): StateRepr = bincode::deserialize(state).map_err(SnapshotError)?;

        self.cpu.af = af;
        self.cpu.bc = bc;
        self.cpu.de = de;
        self.cpu.hl = hl;
        self.cpu.af_alt = af_alt;
        self.cpu.bc_alt = bc_alt;
        self.cpu.de_alt = de_alt;
        self.cpu.hl_alt = hl_alt;
        self.cpu.ix = ix;
        self.cpu.iy = iy;
        self.cpu.pc = pc;
        self.cpu.sp = sp;
        self.cpu.iff1 = iff1;
        self.cpu.iff2 = iff2;
        self.cpu.interrupt_mode = interrupt_mode;
        self.cpu.ei_delay = ei_delay;
        self.cpu.halted = halted;

        let board = &mut self.board;
        board.ticks = ticks;
        board.interrupt_requested = interrupt_requested;
        board.memory = memory;
        board.fdc = fdc;
        board.keyboard = keyboard;
        board.crtc = crtc;
        board.psg = psg;
        board.ppi = ppi;
        board.gate_array = gate_array;
        board.tape = tape;
        board.audio_tick_total = audio_tick_total;
        board.audio_ticks_to_next_sample = audio_ticks_to_next_sample;
        board.audio_sample_count = audio_sample_count;
        // a zero frequency would stall the sampler's division
        board.frequency = if frequency == 0 { DEFAULT_AUDIO_FREQUENCY } else { frequency };

        // re-derive the caches the blob deliberately omits
        board.memory.restore();
        board.gate_array.render_pens();
        Ok(())
    }
}

/// The decoded layout of a state blob, mirroring [Cpc::get_state]'s field
/// order exactly.
type StateRepr = (
    Ticks,
    (u16, u16, u16, u16),
    (u16, u16, u16, u16),
    (u16, u16, u16, u16),
    (bool, bool, bool, u8, u8, bool),
    Memory,
    Fdc,
    Keyboard,
    Crtc,
    Psg,
    Ppi,
    GateArray,
    Tape,
    (u32, u32, u32, u32),
);
