/*
    Copyright (C) 2022  Rafal Michalski

    This file is part of AMSTRUSTY, a Rust library for building emulators.

    For the full copyright notice, see the lib.rs file.
*/
//! The CPC keyboard: a 10 by 8 key matrix with three-key ghosting.
use serde::{Serialize, Deserialize};

/// The number of scannable keyboard lines.
pub const LINE_COUNT: u8 = 10;

/// The keyboard matrix as seen through the PSG's I/O port A.
///
/// A key held down pulls its matrix bit low. Whenever the matrix changes, a
/// parallel "clash" matrix is recomputed to emulate the ghosting of the real
/// keyboard: for any rectangle of two lines and two bit columns with three
/// corners held down, the fourth corner reads as held down too.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Keyboard {
    matrix: [u8; LINE_COUNT as usize],
    clash: [u8; LINE_COUNT as usize],
    selected_line: u8,
}

impl Default for Keyboard {
    fn default() -> Self {
        Keyboard {
            matrix: [0xFF; LINE_COUNT as usize],
            clash: [0xFF; LINE_COUNT as usize],
            selected_line: 0,
        }
    }
}

fn set_line_state(matrix: &mut [u8; LINE_COUNT as usize], line: u8, bit: u8, down: bool) -> u8 {
    let mask = 1 << bit;
    let before = matrix[usize::from(line)];
    if down {
        matrix[usize::from(line)] &= !mask;
    }
    else {
        matrix[usize::from(line)] |= mask;
    }
    before ^ matrix[usize::from(line)]
}

impl Keyboard {
    /// Releases all keys and selects line 0.
    pub fn reset(&mut self) {
        *self = Default::default();
    }

    /// Presses or releases the key at (`line`, `bit`).
    ///
    /// Returns `true` if the matrix changed. Out-of-range coordinates are
    /// ignored and return `false`.
    pub fn key_press(&mut self, line: u8, bit: u8, down: bool) -> bool {
        if line >= LINE_COUNT || bit >= 8 {
            return false
        }
        let changed = set_line_state(&mut self.matrix, line, bit, down);
        self.update_clash();
        changed != 0
    }

    /// Selects the keyboard line to be read back.
    pub fn select_line(&mut self, line: u8) {
        self.selected_line = line;
    }

    /// Returns the currently selected keyboard line.
    pub fn selected_line(&self) -> u8 {
        self.selected_line
    }

    /// Reads the state of the selected line, ghosting included.
    ///
    /// An out-of-range line selection reads as a line of released keys.
    pub fn read_selected_line(&self) -> u8 {
        if self.selected_line >= LINE_COUNT {
            return 0xFF
        }
        self.matrix[usize::from(self.selected_line)]
            & self.clash[usize::from(self.selected_line)]
    }

    /// Recomputes the clash matrix from the key matrix.
    fn update_clash(&mut self) {
        for line in self.clash.iter_mut() {
            *line = 0xFF;
        }

        for line0 in 0..LINE_COUNT {
            for line1 in line0 + 1..LINE_COUNT {
                for bit0 in 0..8 {
                    for bit1 in bit0 + 1..8 {
                        let matrix_line0 = self.matrix[usize::from(line0)];
                        let matrix_line1 = self.matrix[usize::from(line1)];
                        let key00 = matrix_line0 & (1 << bit0) == 0;
                        let key01 = matrix_line0 & (1 << bit1) == 0;
                        let key10 = matrix_line1 & (1 << bit0) == 0;
                        let key11 = matrix_line1 & (1 << bit1) == 0;

                        if key00 && key01 && key10 {
                            set_line_state(&mut self.clash, line1, bit1, true);
                        }
                        if key00 && key01 && key11 {
                            set_line_state(&mut self.clash, line1, bit0, true);
                        }
                        if key00 && key10 && key11 {
                            set_line_state(&mut self.clash, line0, bit1, true);
                        }
                        if key01 && key10 && key11 {
                            set_line_state(&mut self.clash, line0, bit0, true);
                        }
                    }
                }
            }
        }
    }
}
