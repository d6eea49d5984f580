/*
    Copyright (C) 2022-2023  Rafal Michalski

    This file is part of AMSTRUSTY, a Rust library for building emulators.

    AMSTRUSTY is free software: you can redistribute it and/or modify it under
    the terms of the GNU Lesser General Public License (LGPL) as published
    by the Free Software Foundation, either version 3 of the License, or
    (at your option) any later version.

    AMSTRUSTY is distributed in the hope that it will be useful,
    but WITHOUT ANY WARRANTY; without even the implied warranty of
    MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
    GNU Lesser General Public License for more details.

    You should have received a copy of the GNU Lesser General Public License
    along with this program.  If not, see <https://www.gnu.org/licenses/>.

    Author contact information: see Cargo.toml file, section [package.authors].
*/
//! AMSTRUSTY is a library for building cycle-accurate emulators of the
//! Amstrad CPC home computer.
//!
//! The heart of the library is [chip::Cpc]: the Z80, the gate array, the
//! CRT controller, the AY-3-8912 sound generator, the i8255 peripheral
//! interface, the uPD765A floppy disc controller and the cassette deck,
//! advancing together on a shared clock of 0.25 µs ticks. The embedding
//! application drives it with [chip::Cpc::run_until], providing a frame
//! buffer for video and draining an internal ring buffer for audio:
//!
//! ```
//! use amstrusty::chip::Cpc;
//! use amstrusty::clock::{StopBits, StopReason};
//!
//! let mut cpc = Cpc::new();
//! let mut frame = vec![0u8; 1024 * 312];
//! cpc.set_screen(frame.as_mut_ptr(), 1024, 312, 1024);
//!
//! // run for a second of emulated time, pausing whenever audio backs up
//! let deadline = cpc.ticks() + 4_000_000;
//! loop {
//!     match cpc.run_until(deadline, StopBits::AUDIO_OVERRUN) {
//!         StopReason::AudioOverrun => cpc.advance_playback(2400),
//!         _ => break,
//!     }
//! }
//! ```
//!
//! The whole machine state serializes into a byte blob with
//! [chip::Cpc::get_state] and restores with [chip::Cpc::load_state]; the
//! round trip is byte-exact, which the embedding layer can use for
//! rewindable emulation.
pub mod audio;
pub mod chip;
pub mod clock;
pub mod cpu;
pub mod formats;
pub mod memory;
pub mod peripherals;
pub mod video;

pub use chip::{Cpc, SnapshotError};
pub use clock::{StopBits, StopReason, Ticks};
pub use memory::MemoryError;
