/*
    Copyright (C) 2022  Rafal Michalski

    This file is part of AMSTRUSTY, a Rust library for building emulators.

    For the full copyright notice, see the lib.rs file.
*/
//! The cassette deck: plays a TZX/CDT image back as a square-wave level stream.
//!
//! The player walks the image block by block, turning each into a sequence of
//! level-change intervals measured in clock ticks. It advances in
//! quarter-microsecond substeps because the shortest pulses in the format are
//! only a few hundred ticks long.
use serde::{Serialize, Deserialize};

use crate::formats::tzx;

/// The duration of one millisecond of pause, in clock ticks.
const PAUSE_MS_TICKS: u64 = 4000;

/// The playback position within a tape block.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
enum TapePhase {
    Start,
    Pilot,
    SyncOne,
    SyncTwo,
    Data,
    Pause,
    PauseZero,
    End,
}

impl Default for TapePhase {
    fn default() -> Self {
        TapePhase::Start
    }
}

/// Pilot and sync pulse parameters of the block being played.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SpeedBlock {
    pilot_pulse_length: u16,
    sync1_length: u16,
    sync2_length: u16,
    pilot_pulse_count: u16,
}

/// Data bit parameters of the block being played. Pulse lengths are stored
/// already converted to the machine clock.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DataBlock {
    zero_length: u16,
    one_length: u16,
    used_bits_last_byte: u8,
    pause: u16,
    length: u32,
}

/// The cassette deck and its loaded tape image.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tape {
    cursor: usize,
    phase: TapePhase,
    pulses_remaining: i32,
    data_index: u32,
    level_changed: bool,
    data_byte: u8,
    remaining_bits: i32,
    pulse_index: u16,
    pause: u16,
    data_block: DataBlock,
    speed_block: SpeedBlock,
    playing: bool,
    /// The current cassette output level, read through PPI port B.
    pub level: bool,
    /// The state of the motor relay, driven through PPI port C.
    pub motor: bool,
    ticks_to_next_level_change: u64,
    image: Vec<u8>,
}

impl Tape {
    /// Loads a tape image and starts playback from its first block.
    ///
    /// Returns `false` and leaves the deck untouched when the image header
    /// does not check out.
    pub fn load(&mut self, image: &[u8]) -> bool {
        if !tzx::check_header(image) {
            return false
        }
        self.image = image.to_vec();
        self.playing = true;
        self.rewind();
        true
    }

    /// Removes the tape image from the deck.
    pub fn eject(&mut self) {
        self.image.clear();
        self.playing = false;
    }

    /// Repositions playback to the start of the image.
    pub fn rewind(&mut self) {
        self.phase = TapePhase::Start;
        self.cursor = tzx::FIRST_BLOCK_OFFSET;
        self.level = true;
        match self.next_level_change() {
            Some(ticks) => self.ticks_to_next_level_change = ticks,
            None => {
                self.ticks_to_next_level_change = 0;
                self.playing = false;
            }
        }
    }

    /// Advances the deck by one microsecond, in four quarter-microsecond
    /// substeps. Does nothing unless the motor is on and a tape is playing.
    pub fn tick(&mut self) {
        for _ in 0..4 {
            if !self.playing || !self.motor {
                return
            }
            if self.ticks_to_next_level_change <= 1 {
                match self.next_level_change() {
                    Some(ticks) => {
                        // carry over the remainder of the current interval
                        self.ticks_to_next_level_change += ticks - 1;
                    }
                    None => {
                        self.playing = false;
                        self.ticks_to_next_level_change = 0;
                    }
                }
            }
            else {
                self.ticks_to_next_level_change -= 1;
            }
        }
    }

    #[inline]
    fn img_u8(&self, offset: usize) -> u8 {
        tzx::block_u8(&self.image, self.cursor + offset)
    }

    #[inline]
    fn img_u16(&self, offset: usize) -> u16 {
        tzx::block_u16(&self.image, self.cursor + offset)
    }

    #[inline]
    fn img_u24(&self, offset: usize) -> u32 {
        tzx::block_u24(&self.image, self.cursor + offset)
    }

    /// Moves the cursor past the current block.
    fn end_block(&mut self) {
        match tzx::block_size(&self.image, self.cursor) {
            Some(size) => self.cursor += size,
            None => self.cursor = self.image.len(),
        }
        self.phase = TapePhase::Start;
    }

    /// Computes the interval in ticks until the level changes next,
    /// advancing the block state machine. Returns `None` at the end of the
    /// image or on a stop-the-tape block.
    fn next_level_change(&mut self) -> Option<u64> {
        loop {
            if self.cursor >= self.image.len() {
                return None
            }
            let id = self.image[self.cursor];
            let ticks = match id {
                0x10 => self.step_standard_speed_data(),
                0x11 => self.step_turbo_data(),
                0x12 => self.step_pure_tone(),
                0x13 => self.step_pulse_sequence(),
                0x14 => self.step_pure_data(),
                0x15 => self.step_direct_recording(),
                0x20 => self.step_pause_block()?,
                0x21 | 0x22 | 0x31 | 0x32 | 0x33 => {
                    // group, loop and text markers produce no pulses
                    self.end_block();
                    0
                }
                _ => {
                    log::warn!("tape: stopping on unsupported block id {:#04x}", id);
                    return None
                }
            };
            if ticks != 0 {
                return Some(ticks)
            }
        }
    }

    /// One pulse of the data phase: each bit is emitted as two half-cycles.
    fn data_phase(&mut self, data_offset: usize) -> u64 {
        if self.data_index == self.data_block.length {
            self.pause = self.data_block.pause;
            self.phase = TapePhase::Pause;
            return 0
        }

        self.level = !self.level;
        let ticks = if self.data_byte & 0x80 != 0 {
            self.data_block.one_length
        }
        else {
            self.data_block.zero_length
        };

        if !self.level_changed {
            self.level_changed = true;
        }
        else {
            self.data_byte <<= 1;
            self.remaining_bits -= 1;
            if self.remaining_bits == 0 {
                self.data_index += 1;
                self.remaining_bits = self.bits_of_byte(self.data_index);
                self.data_byte = self.img_u8(data_offset + self.data_index as usize);
            }
            self.level_changed = false;
        }

        u64::from(ticks)
    }

    /// How many bits of the data byte at `index` are meaningful.
    #[inline]
    fn bits_of_byte(&self, index: u32) -> i32 {
        if index + 1 == self.data_block.length {
            i32::from(self.data_block.used_bits_last_byte)
        }
        else {
            8
        }
    }

    fn pause_phase(&mut self) -> u64 {
        if self.pause >= 1 {
            self.level = !self.level;
            self.phase = TapePhase::PauseZero;
            PAUSE_MS_TICKS
        }
        else {
            self.phase = TapePhase::End;
            0
        }
    }

    fn pause_zero_phase(&mut self) -> u64 {
        self.level = false;
        self.phase = TapePhase::End;
        PAUSE_MS_TICKS * u64::from(self.pause)
    }

    /// The common pilot/sync/data machinery of the speed data blocks.
    fn step_speed_data_block(&mut self, data_offset: usize) -> u64 {
        match self.phase {
            TapePhase::Start => {
                self.phase = TapePhase::Pilot;
                self.pulses_remaining = i32::from(self.speed_block.pilot_pulse_count);
                0
            }
            TapePhase::Pilot => {
                if self.pulses_remaining <= 0 {
                    self.phase = TapePhase::SyncOne;
                    return 0
                }
                self.level = !self.level;
                self.pulses_remaining -= 1;
                tzx::adjust_ticks(u32::from(self.speed_block.pilot_pulse_length))
            }
            TapePhase::SyncOne => {
                self.level = !self.level;
                self.phase = TapePhase::SyncTwo;
                tzx::adjust_ticks(u32::from(self.speed_block.sync1_length))
            }
            TapePhase::SyncTwo => {
                self.level = !self.level;
                let ticks = tzx::adjust_ticks(u32::from(self.speed_block.sync2_length));
                self.phase = TapePhase::Data;
                self.data_index = 0;
                self.level_changed = false;
                self.data_byte = self.img_u8(data_offset);
                self.remaining_bits = self.bits_of_byte(0);
                ticks
            }
            TapePhase::Data => self.data_phase(data_offset),
            TapePhase::Pause => self.pause_phase(),
            TapePhase::PauseZero => self.pause_zero_phase(),
            TapePhase::End => {
                self.end_block();
                0
            }
        }
    }

    /// Block 0x10: standard speed data with the ROM loader timings.
    fn step_standard_speed_data(&mut self) -> u64 {
        if self.phase == TapePhase::Start {
            self.speed_block = SpeedBlock {
                pilot_pulse_length: 2168,
                sync1_length: 667,
                sync2_length: 735,
                // the short pilot tone is used for data blocks, the long one for headers
                pilot_pulse_count: if self.img_u8(5) & 0x80 != 0 { 3223 } else { 8063 },
            };
            self.data_block = DataBlock {
                zero_length: tzx::adjust_ticks(855) as u16,
                one_length: tzx::adjust_ticks(1710) as u16,
                used_bits_last_byte: 8,
                pause: self.img_u16(1),
                length: u32::from(self.img_u16(3)),
            };
        }
        self.step_speed_data_block(5)
    }

    /// Block 0x11: like 0x10 but with all timings taken from the block.
    fn step_turbo_data(&mut self) -> u64 {
        if self.phase == TapePhase::Start {
            self.speed_block = SpeedBlock {
                pilot_pulse_length: self.img_u16(1),
                sync1_length: self.img_u16(3),
                sync2_length: self.img_u16(5),
                pilot_pulse_count: self.img_u16(11),
            };
            self.data_block = DataBlock {
                zero_length: tzx::adjust_ticks(u32::from(self.img_u16(7))) as u16,
                one_length: tzx::adjust_ticks(u32::from(self.img_u16(9))) as u16,
                used_bits_last_byte: self.img_u8(13),
                pause: self.img_u16(14),
                length: self.img_u24(16),
            };
        }
        self.step_speed_data_block(19)
    }

    /// Block 0x12: a run of identical pulses.
    fn step_pure_tone(&mut self) -> u64 {
        match self.phase {
            TapePhase::Start => {
                self.phase = TapePhase::Pilot;
                self.pulses_remaining = i32::from(self.img_u16(3));
                0
            }
            TapePhase::Pilot => {
                if self.pulses_remaining <= 0 {
                    self.phase = TapePhase::End;
                    return 0
                }
                self.level = !self.level;
                self.pulses_remaining -= 1;
                tzx::adjust_ticks(u32::from(self.img_u16(1)))
            }
            _ => {
                self.end_block();
                0
            }
        }
    }

    /// Block 0x13: a list of individual pulse lengths.
    fn step_pulse_sequence(&mut self) -> u64 {
        match self.phase {
            TapePhase::Start => {
                self.phase = TapePhase::Data;
                self.pulse_index = 0;
                0
            }
            TapePhase::Data => {
                if self.pulse_index >= u16::from(self.img_u8(1)) {
                    self.phase = TapePhase::End;
                    return 0
                }
                self.level = !self.level;
                let ticks = self.img_u16(2 + 2 * usize::from(self.pulse_index));
                self.pulse_index += 1;
                tzx::adjust_ticks(u32::from(ticks))
            }
            _ => {
                self.end_block();
                0
            }
        }
    }

    /// Block 0x14: data bits without pilot or sync.
    fn step_pure_data(&mut self) -> u64 {
        match self.phase {
            TapePhase::Start => {
                self.data_block = DataBlock {
                    zero_length: tzx::adjust_ticks(u32::from(self.img_u16(1))) as u16,
                    one_length: tzx::adjust_ticks(u32::from(self.img_u16(3))) as u16,
                    used_bits_last_byte: self.img_u8(5),
                    pause: self.img_u16(6),
                    length: self.img_u24(8),
                };
                self.phase = TapePhase::Data;
                self.data_index = 0;
                self.level_changed = false;
                self.data_byte = self.img_u8(11);
                self.remaining_bits = self.bits_of_byte(0);
                0
            }
            TapePhase::Data => self.data_phase(11),
            TapePhase::Pause => self.pause_phase(),
            TapePhase::PauseZero => self.pause_zero_phase(),
            _ => {
                self.end_block();
                0
            }
        }
    }

    /// Block 0x15: direct recording, the level copies each sample bit.
    fn step_direct_recording(&mut self) -> u64 {
        let used_bits = self.img_u8(5);
        let length = self.img_u24(6);
        match self.phase {
            TapePhase::Start => {
                self.phase = TapePhase::Data;
                self.data_index = 0;
                self.data_byte = self.img_u8(9);
                self.remaining_bits = if length == 1 { i32::from(used_bits) } else { 8 };
                0
            }
            TapePhase::Data => {
                if self.data_index == length {
                    self.phase = TapePhase::Pause;
                    self.pause = self.img_u16(3);
                    return 0
                }
                self.level = self.data_byte & 0x80 != 0;
                let ticks = tzx::adjust_ticks(u32::from(self.img_u16(1)));
                self.remaining_bits -= 1;
                if self.remaining_bits == 0 {
                    self.data_index += 1;
                    self.data_byte = self.img_u8(9 + self.data_index as usize);
                    self.remaining_bits = if self.data_index + 1 == length {
                        i32::from(used_bits)
                    }
                    else {
                        8
                    };
                }
                else {
                    self.data_byte <<= 1;
                }
                ticks
            }
            TapePhase::Pause => self.pause_phase(),
            TapePhase::PauseZero => self.pause_zero_phase(),
            _ => {
                self.end_block();
                0
            }
        }
    }

    /// Block 0x20: a pause, or - with a zero length - a stop-the-tape marker.
    fn step_pause_block(&mut self) -> Option<u64> {
        let pause = self.img_u16(1);
        if pause == 0 {
            return None
        }
        Some(match self.phase {
            TapePhase::Start => {
                self.pause = pause;
                self.phase = TapePhase::Pause;
                0
            }
            TapePhase::Pause => {
                self.level = !self.level;
                self.phase = TapePhase::PauseZero;
                PAUSE_MS_TICKS
            }
            TapePhase::PauseZero => {
                self.level = false;
                self.phase = TapePhase::End;
                PAUSE_MS_TICKS * u64::from(self.pause)
            }
            _ => {
                self.end_block();
                0
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn standard_block_image(pause: u16, data: &[u8]) -> Vec<u8> {
        let mut image = Vec::new();
        image.extend_from_slice(&tzx::SIGNATURE);
        image.push(1);
        image.push(20);
        image.push(0x10);
        image.extend_from_slice(&pause.to_le_bytes());
        image.extend_from_slice(&(data.len() as u16).to_le_bytes());
        image.extend_from_slice(data);
        image
    }

    #[test]
    fn rejects_bad_headers() {
        let mut tape = Tape::default();
        assert!(!tape.load(b"ZXTape"));
        assert!(!tape.load(b"NotATape!\x1a\x01\x14\x10"));
    }

    #[test]
    fn standard_speed_block_pulse_stream() {
        let data = [0x17u8, 0x9A, 0xF2, 0xBC, 0xCD, 0x0A, 0x39];
        let image = standard_block_image(0, &data);
        let mut tape = Tape::default();
        assert!(tape.load(&image));

        let mut pulses = vec![tape.ticks_to_next_level_change];
        while let Some(ticks) = tape.next_level_change() {
            pulses.push(ticks);
        }

        // pilot: the first data byte's top bit is clear, so the long tone
        let mut expected = vec![tzx::adjust_ticks(2168); 8063];
        // sync pulses
        expected.push(tzx::adjust_ticks(667));
        expected.push(tzx::adjust_ticks(735));
        // each data bit is a full square wave cycle of two pulses
        for byte in data.iter() {
            for bit in (0..8).rev() {
                let raw = if byte & (1 << bit) != 0 { 1710 } else { 855 };
                expected.push(tzx::adjust_ticks(raw));
                expected.push(tzx::adjust_ticks(raw));
            }
        }
        assert_eq!(expected, pulses);
    }

    #[test]
    fn short_pilot_for_data_blocks() {
        let image = standard_block_image(0, &[0x80]);
        let mut tape = Tape::default();
        assert!(tape.load(&image));

        let mut pulses = vec![tape.ticks_to_next_level_change];
        while let Some(ticks) = tape.next_level_change() {
            pulses.push(ticks);
        }
        assert_eq!(3223 + 2 + 16, pulses.len());
    }

    #[test]
    fn pause_zero_block_stops_playback() {
        let mut image = Vec::new();
        image.extend_from_slice(&tzx::SIGNATURE);
        image.push(1);
        image.push(20);
        image.extend_from_slice(&[0x20, 0, 0]);

        let mut tape = Tape::default();
        assert!(tape.load(&image));
        assert!(!tape.playing);
    }

    #[test]
    fn motor_gates_the_countdown() {
        let image = standard_block_image(100, &[0x00]);
        let mut tape = Tape::default();
        assert!(tape.load(&image));
        let before = tape.ticks_to_next_level_change;

        tape.tick();
        assert_eq!(before, tape.ticks_to_next_level_change);

        tape.motor = true;
        tape.tick();
        assert_eq!(before - 4, tape.ticks_to_next_level_change);
    }

    #[test]
    fn trailing_pause_produces_a_millisecond_pulse() {
        let image = standard_block_image(3, &[0xFF]);
        let mut tape = Tape::default();
        assert!(tape.load(&image));

        let mut pulses = vec![tape.ticks_to_next_level_change];
        while let Some(ticks) = tape.next_level_change() {
            pulses.push(ticks);
        }
        let n = pulses.len();
        // 1 ms high then 3 ms low after the last data pulse
        assert_eq!(PAUSE_MS_TICKS, pulses[n - 2]);
        assert_eq!(3 * PAUSE_MS_TICKS, pulses[n - 1]);
        assert!(!tape.level);
    }
}
