/*
    Copyright (C) 2022  Rafal Michalski

    This file is part of AMSTRUSTY, a Rust library for building emulators.

    For the full copyright notice, see the lib.rs file.
*/
//! Clock units and the run-loop stop conditions.
use bitflags::bitflags;

/// A linear timestamp of the emulated machine's clock.
///
/// One tick represents 0.25 µs - a single cycle of the 4 MHz Z80 clock.
pub type Ticks = u64;

/// The number of clock ticks per microsecond.
///
/// All hardware except the CPU advances once per microsecond.
pub const TICKS_PER_US: Ticks = 4;

bitflags! {
    /// A bitmask of conditions that can stop [Cpc::run_until][crate::chip::Cpc::run_until]
    /// before the tick deadline is reached.
    #[derive(Default)]
    pub struct StopBits: u8 {
        /// Stop when the audio ring buffer is about to overrun.
        const AUDIO_OVERRUN = 0x01;
        /// Stop when the CRTC enters vertical synchronization.
        const VSYNC         = 0x02;
    }
}

/// The reason [Cpc::run_until][crate::chip::Cpc::run_until] returned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum StopReason {
    /// The tick deadline was reached.
    None = 0,
    /// The audio ring buffer is full.
    AudioOverrun = 1,
    /// A vertical synchronization period has just begun.
    VSync = 2,
}

impl Default for StopReason {
    fn default() -> Self {
        StopReason::None
    }
}

impl From<StopReason> for u8 {
    #[inline(always)]
    fn from(reason: StopReason) -> u8 {
        reason as u8
    }
}
