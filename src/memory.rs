/*
    Copyright (C) 2022  Rafal Michalski

    This file is part of AMSTRUSTY, a Rust library for building emulators.

    For the full copyright notice, see the lib.rs file.
*/
//! Memory API: eight 16 KiB RAM banks with selectable ROM overlays.
use core::convert::TryFrom;
use core::fmt;
use core::ops::{Deref, DerefMut};
use std::collections::BTreeMap;

use serde::{Serialize, Deserialize};
use serde::de::{self, SeqAccess, Visitor};
use serde::ser::SerializeTuple;

/// The size of a single memory page in bytes.
pub const MEM16K_SIZE: usize = 0x4000;

/// How the eight RAM banks map onto the four 16 KiB address slots for each of
/// the eight RAM configurations selectable via the expansion gate.
const RAM_CONFIGS: [[u8; 4]; 8] = [
    [0, 1, 2, 3],
    [0, 1, 2, 7],
    [4, 5, 6, 7],
    [0, 3, 2, 7],
    [0, 4, 2, 3],
    [0, 5, 2, 3],
    [0, 6, 2, 3],
    [0, 7, 2, 3],
];

#[non_exhaustive]
#[derive(Debug)]
pub enum MemoryError {
    /// A ROM image does not consist of exactly 16384 bytes.
    InvalidRomSize,
}

impl std::error::Error for MemoryError {}

impl fmt::Display for MemoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", match self {
            MemoryError::InvalidRomSize => "ROM image size is not 16384 bytes",
        })
    }
}

/// A single 16 KiB memory page, allocated on the heap.
///
/// Serializes as raw bytes without a length prefix.
#[derive(Clone)]
pub struct Mem16k(Box<[u8; MEM16K_SIZE]>);

impl Default for Mem16k {
    fn default() -> Self {
        Mem16k(Box::new([0u8; MEM16K_SIZE]))
    }
}

impl Mem16k {
    /// Creates a page with every byte set to `value`.
    pub fn filled(value: u8) -> Self {
        let mut mem = Mem16k::default();
        mem.fill(value);
        mem
    }

    /// Sets every byte of the page to `value`.
    pub fn fill(&mut self, value: u8) {
        for p in self.0.iter_mut() {
            *p = value;
        }
    }
}

impl Deref for Mem16k {
    type Target = [u8; MEM16K_SIZE];
    #[inline(always)]
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for Mem16k {
    #[inline(always)]
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl fmt::Debug for Mem16k {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Mem16k {{ .. }}")
    }
}

impl TryFrom<&[u8]> for Mem16k {
    type Error = MemoryError;
    fn try_from(slice: &[u8]) -> Result<Self, Self::Error> {
        if slice.len() != MEM16K_SIZE {
            return Err(MemoryError::InvalidRomSize)
        }
        let mut mem = Mem16k::default();
        mem.0.copy_from_slice(slice);
        Ok(mem)
    }
}

impl Serialize for Mem16k {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut tup = serializer.serialize_tuple(MEM16K_SIZE)?;
        for byte in self.0.iter() {
            tup.serialize_element(byte)?;
        }
        tup.end()
    }
}

struct Mem16kVisitor;

impl<'de> Visitor<'de> for Mem16kVisitor {
    type Value = Mem16k;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        write!(formatter, "{} bytes of memory", MEM16K_SIZE)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        let mut mem = Mem16k::default();
        for (index, target) in mem.0.iter_mut().enumerate() {
            *target = seq.next_element()?
                         .ok_or_else(|| de::Error::invalid_length(index, &self))?;
        }
        Ok(mem)
    }
}

impl<'de> Deserialize<'de> for Mem16k {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_tuple(MEM16K_SIZE, Mem16kVisitor)
    }
}

/// What a 16 KiB address slot resolves to when the CPU reads from it.
#[derive(Clone, Copy, Debug)]
enum ReadSlot {
    Ram(u8),
    LowerRom,
    UpperRom,
}

impl Default for ReadSlot {
    fn default() -> Self {
        ReadSlot::Ram(0)
    }
}

/// The memory of the CPC: eight 16 KiB RAM banks, a lower ROM overlaying
/// slot 0 and a selectable upper ROM overlaying slot 3.
///
/// Writes always go to the RAM bank mapped by the current RAM configuration;
/// reads go to an enabled ROM overlay or the mapped bank. [Memory::video_read]
/// bypasses the overlays entirely, as the video circuitry does.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Memory {
    banks: [Mem16k; 8],
    ram_config: u8,
    lower_rom_enabled: bool,
    upper_rom_enabled: bool,
    selected_upper_rom: u8,
    lower_rom: Mem16k,
    roms: BTreeMap<u8, Mem16k>,
    #[serde(skip)]
    upper_rom: Mem16k,
    #[serde(skip)]
    read_slots: [ReadSlot; 4],
    #[serde(skip)]
    write_slots: [u8; 4],
}

impl Default for Memory {
    fn default() -> Self {
        let mut memory = Memory {
            banks: Default::default(),
            ram_config: 0,
            lower_rom_enabled: true,
            upper_rom_enabled: true,
            selected_upper_rom: 0,
            lower_rom: Default::default(),
            roms: Default::default(),
            upper_rom: Default::default(),
            read_slots: Default::default(),
            write_slots: Default::default(),
        };
        memory.configure();
        memory
    }
}

impl Memory {
    /// Clears all RAM banks and restores the power-on memory layout:
    /// configuration 0 with both ROM overlays enabled.
    ///
    /// Loaded ROM images are retained.
    pub fn reset(&mut self) {
        for bank in self.banks.iter_mut() {
            bank.fill(0);
        }
        self.lower_rom_enabled = true;
        self.upper_rom_enabled = true;
        self.selected_upper_rom = 0;
        self.set_ram_config(0);
    }

    /// Reads a byte the way the CPU does, honouring the ROM overlays.
    #[inline]
    pub fn read(&self, addr: u16) -> u8 {
        let offset = usize::from(addr & 0x3FFF);
        match self.read_slots[usize::from(addr >> 14)] {
            ReadSlot::Ram(bank) => self.banks[usize::from(bank)][offset],
            ReadSlot::LowerRom => self.lower_rom[offset],
            ReadSlot::UpperRom => self.upper_rom[offset],
        }
    }

    /// Writes a byte to the RAM bank mapped at `addr`.
    #[inline]
    pub fn write(&mut self, addr: u16, data: u8) {
        let bank = self.write_slots[usize::from(addr >> 14)];
        self.banks[usize::from(bank)][usize::from(addr & 0x3FFF)] = data;
    }

    /// Reads a byte the way the video circuitry does: always from RAM.
    #[inline]
    pub fn video_read(&self, addr: u16) -> u8 {
        let bank = self.write_slots[usize::from(addr >> 14)];
        self.banks[usize::from(bank)][usize::from(addr & 0x3FFF)]
    }

    /// Replaces the lower ROM image.
    pub fn set_lower_rom(&mut self, rom: Mem16k) {
        self.lower_rom = rom;
    }

    /// Enables or disables the lower ROM overlay.
    pub fn enable_lower_rom(&mut self, enable: bool) {
        self.lower_rom_enabled = enable;
        self.configure();
    }

    /// Installs an upper ROM image in the given slot.
    ///
    /// The image becomes visible once the slot is selected with
    /// [Memory::select_upper_rom].
    pub fn set_upper_rom(&mut self, slot: u8, rom: Mem16k) {
        self.roms.insert(slot, rom);
    }

    /// Removes an upper ROM image from the given slot.
    pub fn remove_upper_rom(&mut self, slot: u8) {
        self.roms.remove(&slot);
    }

    /// Enables or disables the upper ROM overlay.
    pub fn enable_upper_rom(&mut self, enable: bool) {
        self.upper_rom_enabled = enable;
        self.configure();
    }

    /// Selects which upper ROM slot overlays the topmost address slot.
    ///
    /// Selecting a slot with no image installed falls back to slot 0,
    /// materializing an all-zero image there if none was ever installed.
    pub fn select_upper_rom(&mut self, slot: u8) {
        let slot = if self.roms.contains_key(&slot) { slot } else { 0 };
        self.selected_upper_rom = slot;
        self.upper_rom = self.roms.entry(slot).or_default().clone();
        self.configure();
    }

    /// Selects one of the eight RAM configurations from the low 3 bits of `config`.
    pub fn set_ram_config(&mut self, config: u8) {
        self.ram_config = config & 0x07;
        self.configure();
    }

    /// Returns the currently selected upper ROM slot.
    pub fn selected_upper_rom(&self) -> u8 {
        self.selected_upper_rom
    }

    /// Re-derives the per-slot read and write mappings from the current RAM
    /// configuration and ROM overlay state.
    fn configure(&mut self) {
        let banks = &RAM_CONFIGS[usize::from(self.ram_config & 0x07)];
        for (slot, bank) in banks.iter().enumerate() {
            self.write_slots[slot] = *bank;
            self.read_slots[slot] = ReadSlot::Ram(*bank);
        }
        if self.lower_rom_enabled {
            self.read_slots[0] = ReadSlot::LowerRom;
        }
        if self.upper_rom_enabled {
            self.read_slots[3] = ReadSlot::UpperRom;
        }
    }

    /// Restores the mapping caches after deserialization.
    pub(crate) fn restore(&mut self) {
        self.configure();
        self.select_upper_rom(self.selected_upper_rom);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_ADDRESSES: [u16; 8] = [
        0x0000, 0x3FFF, 0x4000, 0x7FFF, 0x8000, 0xBFFF, 0xC000, 0xFFFF
    ];

    #[test]
    fn ram_configurations() {
        let lower_rom = Mem16k::filled(0x12);
        let upper_rom = Mem16k::filled(0xFE);

        for config in 0..8 {
            let mut memory = Memory::default();
            memory.reset();
            for &lower_enabled in &[false, true] {
                memory.enable_lower_rom(lower_enabled);
                for &upper_enabled in &[false, true] {
                    memory.enable_upper_rom(upper_enabled);
                    memory.set_lower_rom(lower_rom.clone());
                    for rom_slot in (0..=255).step_by(17) {
                        memory.set_upper_rom(rom_slot, upper_rom.clone());
                        memory.select_upper_rom(rom_slot);
                        memory.set_ram_config(config);

                        for &addr in TEST_ADDRESSES.iter() {
                            for &byte in &[0xFFu8, 0x00] {
                                memory.write(addr, byte);

                                let expected = if upper_enabled && addr >= 0xC000 {
                                    upper_rom[usize::from(addr & 0x3FFF)]
                                }
                                else if lower_enabled && addr < 0x4000 {
                                    lower_rom[usize::from(addr & 0x3FFF)]
                                }
                                else {
                                    byte
                                };

                                assert_eq!(byte, memory.video_read(addr));
                                assert_eq!(expected, memory.read(addr));
                            }
                        }
                        memory.remove_upper_rom(rom_slot);
                    }
                }
            }
        }
    }

    #[test]
    fn select_upper_rom_falls_back_to_slot_0() {
        let basic_rom = Mem16k::filled(0x12);
        let test_rom = Mem16k::filled(0xFE);

        for selected in 0..=255u8 {
            for slot in [0u8, 1, 7, 128, 255].iter().copied() {
                let mut memory = Memory::default();
                memory.reset();
                memory.enable_upper_rom(true);
                memory.set_upper_rom(0, basic_rom.clone());
                if slot != 0 {
                    memory.set_upper_rom(slot, test_rom.clone());
                }

                let expected: &Mem16k = if selected != 0 && slot == selected {
                    &test_rom
                }
                else {
                    &basic_rom
                };

                memory.select_upper_rom(selected);
                memory.set_ram_config(0);

                assert_eq!(memory.read(0xC000), expected[0x0000]);
                assert_eq!(memory.read(0xFFFF), expected[0x3FFF]);
            }
        }
    }

    #[test]
    fn selecting_missing_slot_materializes_a_blank_rom() {
        let mut memory = Memory::default();
        memory.reset();
        memory.select_upper_rom(42);
        assert_eq!(0, memory.selected_upper_rom());
        assert_eq!(0x00, memory.read(0xC000));
    }

    #[test]
    fn serde_round_trip() {
        let mut memory = Memory::default();
        memory.reset();
        memory.set_lower_rom(Mem16k::filled(0xA5));
        memory.set_upper_rom(7, Mem16k::filled(0x5A));
        memory.select_upper_rom(7);
        memory.set_ram_config(2);
        memory.write(0x4000, 0x77);

        let encoded = bincode::serialize(&memory).unwrap();
        let mut decoded: Memory = bincode::deserialize(&encoded).unwrap();
        decoded.restore();

        assert_eq!(7, decoded.selected_upper_rom());
        for &addr in TEST_ADDRESSES.iter() {
            assert_eq!(memory.read(addr), decoded.read(addr));
            assert_eq!(memory.video_read(addr), decoded.video_read(addr));
        }
        assert_eq!(encoded, bincode::serialize(&decoded).unwrap());
    }
}
