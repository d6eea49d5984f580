/*
    Copyright (C) 2022  Rafal Michalski

    This file is part of AMSTRUSTY, a Rust library for building emulators.

    For the full copyright notice, see the lib.rs file.
*/
//! Emulators of the CPC's peripheral devices.
pub mod ay;
pub mod fdc;
pub mod fdd;
pub mod keyboard;
pub mod ppi;
pub mod tape;

pub use ay::Psg;
pub use fdc::Fdc;
pub use fdd::FloppyDrive;
pub use keyboard::Keyboard;
pub use ppi::Ppi;
pub use tape::Tape;
