/*
    Copyright (C) 2022  Rafal Michalski

    This file is part of AMSTRUSTY, a Rust library for building emulators.

    For the full copyright notice, see the lib.rs file.
*/
//! The uPD765A floppy disc controller.
//!
//! Commands arrive byte by byte through the data register; once a command's
//! parameter bytes are complete it executes, optionally streaming data
//! through a tiny FIFO during the execution phase, and finally presents its
//! result bytes. Programs observe errors exactly as on real hardware:
//! through the ST0..ST3 status bytes of the result phase.
use arrayvec::ArrayVec;
use serde::{Serialize, Deserialize};

use crate::formats::dsk::Disc;
use super::fdd::{FloppyDrive, SectorId};

// Main status register bits.
pub const STATUS_DRIVE0_BUSY: u8 = 0x01;
pub const STATUS_DRIVE1_BUSY: u8 = 0x02;
pub const STATUS_CONTROLLER_BUSY: u8 = 0x10;
pub const STATUS_EXECUTION_MODE: u8 = 0x20;
pub const STATUS_TRANSFER_DIRECTION: u8 = 0x40;
pub const STATUS_REQUEST_MASTER: u8 = 0x80;

// Commands, identified by the low five bits of the first command byte.
pub const CMD_READ_TRACK: u8 = 0x02;
pub const CMD_SPECIFY: u8 = 0x03;
pub const CMD_SENSE_DRIVE_STATUS: u8 = 0x04;
pub const CMD_WRITE_DATA: u8 = 0x05;
pub const CMD_READ_DATA: u8 = 0x06;
pub const CMD_RECALIBRATE: u8 = 0x07;
pub const CMD_SENSE_INTERRUPT_STATUS: u8 = 0x08;
pub const CMD_WRITE_DELETED_DATA: u8 = 0x09;
pub const CMD_READ_ID: u8 = 0x0A;
pub const CMD_READ_DELETED_DATA: u8 = 0x0C;
pub const CMD_FORMAT_TRACK: u8 = 0x0D;
pub const CMD_SEEK: u8 = 0x0F;
pub const CMD_SCAN_LOW: u8 = 0x11;
pub const CMD_SCAN_LOW_OR_EQUAL: u8 = 0x19;
pub const CMD_SCAN_HIGH_OR_EQUAL: u8 = 0x1D;

// ST0 bits.
pub const ST0_NORMAL_TERM: u8 = 0x00;
pub const ST0_ABNORMAL_TERM: u8 = 0x40;
pub const ST0_INVALID_COMMAND: u8 = 0x80;
pub const ST0_ABNORMAL_READY_TERM: u8 = 0xC0;
pub const ST0_SEEK_END: u8 = 0x20;
pub const ST0_EQUIPMENT_CHECK: u8 = 0x10;
pub const ST0_NOT_READY: u8 = 0x08;
pub const ST0_UNIT_SELECT1: u8 = 0x01;
pub const ST0_UNIT_SELECT0: u8 = 0x00;

// ST1 bits.
pub const ST1_END_OF_CYLINDER: u8 = 0x80;
pub const ST1_OVERRUN: u8 = 0x10;

/// Data register transfer directions, as reflected in the main status register.
const DIRECTION_IN: u8 = 0;
const DIRECTION_OUT: u8 = 1;

/// Ticks between streamed bytes at the FM data rate.
const READ_TIMEOUT_FM: i8 = 27;

/// Parameter byte counts, including the command byte itself, indexed by the
/// low five bits of the command.
const COMMAND_LENGTHS: [u8; 32] = [
    1, 1,
    9, // 0x02 - read track
    3, // 0x03 - specify
    2, // 0x04 - sense drive status
    9, // 0x05 - write data
    9, // 0x06 - read data
    2, // 0x07 - recalibrate
    1, // 0x08 - sense interrupt status
    9, // 0x09 - write deleted data
    2, // 0x0A - read id
    1,
    9, // 0x0C - read deleted data
    6, // 0x0D - format track
    1,
    3, // 0x0F - seek
    1,
    9, // 0x11 - scan low
    1, 1, 1, 1, 1, 1, 1,
    9, // 0x19 - scan low or equal
    1, 1, 1,
    9, // 0x1D - scan high or equal
    1, 1
];

/// The controller's processing phase for the command in progress.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
enum Phase {
    Command,
    Execute,
    Result,
}

impl Default for Phase {
    fn default() -> Self {
        Phase::Command
    }
}

/// The floppy disc controller with its two drives.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fdc {
    drives: [FloppyDrive; 2],
    read_timeout: i8,
    main_status: u8,
    data: u8,
    data_direction: u8,
    motor: bool,
    current_drive: u8,
    current_head: u8,
    status: [u8; 4],
    seek_completed: [bool; 2],
    status_changed: [bool; 2],
    phase: Phase,
    command: [u8; 12],
    command_count: u8,
    exec: Vec<u8>,
    exec_index: usize,
    result: ArrayVec<[u8; 8]>,
    result_index: u8,
    step_rate_time: u8,
    head_load_time: u8,
    head_unload_time: u8,
    non_dma_mode: u8,
    read_buffer: ArrayVec<[u8; 4]>,
}

impl Default for Fdc {
    fn default() -> Self {
        let mut fdc = Fdc {
            drives: Default::default(),
            read_timeout: 0,
            main_status: 0,
            data: 0,
            data_direction: 0,
            motor: false,
            current_drive: 0,
            current_head: 0,
            status: [0; 4],
            seek_completed: [false; 2],
            status_changed: [false; 2],
            phase: Phase::Command,
            command: [0; 12],
            command_count: 0,
            exec: Vec::new(),
            exec_index: 0,
            result: ArrayVec::new(),
            result_index: 0,
            step_rate_time: 0,
            head_load_time: 0,
            head_unload_time: 0,
            non_dma_mode: 0,
            read_buffer: ArrayVec::new(),
        };
        fdc.reset();
        fdc
    }
}

impl Fdc {
    /// Resets the controller state; inserted discs stay where they are.
    pub fn reset(&mut self) {
        self.main_status = STATUS_REQUEST_MASTER;
        self.data = 0;
        self.set_data_direction(DIRECTION_IN);
        self.motor = false;
        self.current_drive = 0;
        self.current_head = 0;
        self.status = [0; 4];
        self.seek_completed = [false; 2];
        self.status_changed = [true; 2];
        self.set_phase(Phase::Command);
        self.command = [0; 12];
        self.command_count = 0;
        self.exec.clear();
        self.exec_index = 0;
        self.result.clear();
        self.result_index = 0;
        self.step_rate_time = 0;
        self.head_load_time = 0;
        self.head_unload_time = 0;
        self.non_dma_mode = 0;
        self.read_buffer.clear();
        self.read_timeout = 0;
    }

    /// Inserts a disc into one of the drives.
    pub fn insert_disc(&mut self, drive: u8, disc: Disc) {
        self.drives[usize::from(drive & 1)].insert(disc);
    }

    /// Ejects the disc from one of the drives.
    pub fn eject_disc(&mut self, drive: u8) {
        self.drives[usize::from(drive & 1)].eject();
    }

    /// Reads the FDC I/O ports: the main status or data register.
    pub fn read(&mut self, port: u16) -> u8 {
        if port & 0x0100 != 0 {
            if port & 0x0001 != 0 {
                self.read_data_register()
            }
            else {
                self.read_main_status()
            }
        }
        else {
            0
        }
    }

    /// Writes the FDC I/O ports: the motor control or data register.
    pub fn write(&mut self, port: u16, data: u8) {
        match port & 0x0101 {
            0x0000 => self.set_motor(data & 0x01 != 0),
            0x0101 => self.write_data_register(data),
            _ => {}
        }
    }

    /// Advances the controller by one microsecond: paces the byte stream of
    /// an in-flight read command.
    pub fn tick(&mut self) {
        if self.command[0] & 0x1F != CMD_READ_DATA {
            return
        }
        if self.read_timeout > 0 {
            self.read_timeout -= 1;
        }
        if self.read_timeout <= 0 && self.exec_index < self.exec.len() {
            let byte = self.exec[self.exec_index];
            self.push_read_buffer(byte);
            self.exec_index += 1;

            if self.exec_index == usize::from(self.command[5]) * 0x100 {
                self.next_sector();
            }
            self.read_timeout = READ_TIMEOUT_FM;
        }
    }

    /// A full sector has been streamed: move on to the next record or
    /// conclude the command's results.
    fn next_sector(&mut self) {
        self.command[4] = self.command[4].wrapping_add(1);
        if self.command[4] <= self.command[6] {
            let id = SectorId {
                cylinder: self.command[2],
                head: self.command[3],
                record: self.command[4],
                size: self.command[5],
            };
            let drive = &mut self.drives[usize::from(self.current_drive & 1)];
            match drive.read_data(id) {
                Some(data) => self.exec = data.to_vec(),
                None => self.exec.clear(),
            }
            self.exec_index = 0;
        }
        else {
            // the last requested sector is done: prepare the result CHRN
            self.result.clear();
            self.result.push(self.status[0]);
            self.result.push(self.status[1]);
            self.result.push(self.status[2]);
            self.result.push(self.command[2]);
            self.result.push(self.command[3]);
            self.result.push(self.command[4]);
            self.result.push(self.command[5]);
            self.result_index = 0;

            let mut cylinder = self.command[2];
            let mut record = self.command[4];
            let drive = &self.drives[usize::from(self.current_drive & 1)];
            if drive.read_data_result(&mut cylinder, &mut record) {
                self.status[1] |= ST1_END_OF_CYLINDER;
            }
            self.result[3] = cylinder;
            self.result[5] = record;
        }
    }

    fn read_main_status(&self) -> u8 {
        let mut status = self.main_status;
        match self.phase {
            Phase::Result => {
                status |= STATUS_TRANSFER_DIRECTION | STATUS_CONTROLLER_BUSY;
            }
            Phase::Command if self.command_count > 0 => {
                status |= STATUS_CONTROLLER_BUSY;
            }
            _ => {}
        }
        status
    }

    fn read_data_register(&mut self) -> u8 {
        match self.phase {
            Phase::Command => 0,
            Phase::Execute => {
                let data = self.pop_read_buffer().unwrap_or(0);

                if self.exec_index >= self.exec.len() && self.read_buffer.is_empty() {
                    self.exec.clear();
                    self.exec_index = 0;
                    self.set_phase(Phase::Result);

                    if self.command[0] & 0x1F == CMD_READ_DATA {
                        self.status[0] |= ST0_ABNORMAL_TERM;
                        self.status[1] |= ST1_END_OF_CYLINDER;
                        self.result[0] = self.status[0];
                        self.result[1] = self.status[1];
                        self.result[2] = self.status[2];
                        self.set_data_ready(true);
                    }
                }
                data
            }
            Phase::Result => {
                let data = self.result.get(usize::from(self.result_index)).copied().unwrap_or(0);
                self.result_index += 1;
                if usize::from(self.result_index) >= self.result.len() {
                    self.result.clear();
                    self.result_index = 0;
                    self.set_phase(Phase::Command);
                    self.set_data_direction(DIRECTION_IN);
                }
                data
            }
        }
    }

    fn write_data_register(&mut self, data: u8) {
        match self.phase {
            Phase::Command => {
                if usize::from(self.command_count) < self.command.len() {
                    self.command[usize::from(self.command_count)] = data;
                    self.command_count += 1;
                }
                if self.command_count == command_length(self.command[0]) {
                    self.execute_command();
                }
            }
            Phase::Execute => {
                // only write commands accept data here
                if self.exec_index < self.exec.len() {
                    self.exec[self.exec_index] = data;
                }
                self.exec_index += 1;

                if self.exec_index >= self.exec.len() {
                    if self.command[0] & 0x1F == CMD_WRITE_DATA {
                        self.result[0] = self.status[0];
                        self.result[1] = self.status[1];
                        self.result[2] = self.status[2];

                        let id = SectorId {
                            cylinder: self.command[2],
                            head: self.command[3],
                            record: self.command[4],
                            size: self.command[5],
                        };
                        let drive = &mut self.drives[usize::from(self.current_drive & 1)];
                        drive.find_sector(id);
                    }
                    self.exec.clear();
                    self.exec_index = 0;
                    self.set_phase(Phase::Result);
                }
            }
            Phase::Result => {}
        }
    }

    fn execute_command(&mut self) {
        self.set_phase(Phase::Execute);

        match self.command[0] & 0x1F {
            CMD_SPECIFY => self.cmd_specify(),
            CMD_SENSE_DRIVE_STATUS => self.cmd_sense_drive_status(),
            CMD_RECALIBRATE => self.cmd_recalibrate(),
            CMD_SENSE_INTERRUPT_STATUS => self.cmd_sense_interrupt_status(),
            CMD_SEEK => self.cmd_seek(),
            CMD_WRITE_DATA => self.cmd_write_data(),
            CMD_READ_DATA => self.cmd_read_data(),
            CMD_READ_ID => self.cmd_read_id(),
            CMD_READ_TRACK | CMD_READ_DELETED_DATA => {
                self.set_data_direction(DIRECTION_OUT);
            }
            CMD_WRITE_DELETED_DATA | CMD_FORMAT_TRACK
                | CMD_SCAN_LOW | CMD_SCAN_LOW_OR_EQUAL | CMD_SCAN_HIGH_OR_EQUAL => {
                self.set_data_direction(DIRECTION_IN);
            }
            other => {
                log::debug!("fdc: unimplemented command {:#04x}", other);
            }
        }

        self.command_count = 0;
    }

    fn set_motor(&mut self, motor: bool) {
        self.motor = motor;
        self.status_changed = [true; 2];
    }

    /// Whether the selected drive can deliver data: the shared motor must
    /// spin and a disc must be inserted.
    fn drive_ready(&self, drive: usize) -> bool {
        self.motor && self.drives[drive & 1].is_ready()
    }

    fn set_data_direction(&mut self, direction: u8) {
        self.data_direction = direction;
        self.main_status = self.main_status & !STATUS_TRANSFER_DIRECTION
            | if direction == DIRECTION_OUT { STATUS_TRANSFER_DIRECTION } else { 0 };
    }

    fn set_phase(&mut self, phase: Phase) {
        self.phase = phase;
        match phase {
            Phase::Command => {
                self.set_data_direction(DIRECTION_IN);
                self.main_status &= !STATUS_EXECUTION_MODE;
                self.set_data_ready(true);
            }
            Phase::Execute => {
                if self.non_dma_mode != 0 {
                    self.main_status |= STATUS_EXECUTION_MODE;
                }
            }
            Phase::Result => {
                self.main_status &= !STATUS_EXECUTION_MODE;
            }
        }
    }

    /// Latches the drive and head selected by the second command byte; the
    /// selection is echoed into ST0 and ST3.
    fn select_drive(&mut self, select: u8) {
        self.current_drive = select & 0x03;
        self.current_head = (select & 0x04) >> 2;
        self.status[0] = self.status[0] & 0xF8 | select & 0x07;
        self.status[3] = self.status[0] & 0xF8 | select & 0x07;
    }

    fn push_read_buffer(&mut self, data: u8) {
        if self.read_buffer.is_full() {
            // the oldest byte is lost and the overrun is flagged
            self.read_buffer.remove(0);
            self.status[1] |= ST1_OVERRUN;
        }
        self.read_buffer.push(data);
        self.set_data_ready(true);
    }

    fn pop_read_buffer(&mut self) -> Option<u8> {
        if self.read_buffer.is_empty() {
            return None
        }
        let data = self.read_buffer.remove(0);
        if self.read_buffer.is_empty() {
            self.set_data_ready(false);
        }
        Some(data)
    }

    fn set_data_ready(&mut self, ready: bool) {
        self.main_status = self.main_status & !STATUS_REQUEST_MASTER
            | if ready { STATUS_REQUEST_MASTER } else { 0 };
    }

    /// Prepares the standard 7-byte result: ST0, ST1, ST2 and the CHRN of
    /// the command.
    fn set_standard_result(&mut self) {
        self.result.clear();
        self.result.push(self.status[0]);
        self.result.push(self.status[1]);
        self.result.push(self.status[2]);
        self.result.push(self.command[2]);
        self.result.push(self.command[3]);
        self.result.push(self.command[4]);
        self.result.push(self.command[5]);
        self.result_index = 0;
    }

    fn cmd_read_data(&mut self) {
        self.set_data_direction(DIRECTION_OUT);
        self.set_data_ready(false);
        self.select_drive(self.command[1]);

        let drive_index = usize::from(self.current_drive & 1);
        if !self.drives[drive_index].is_ready() {
            self.status[0] = ST0_ABNORMAL_TERM | ST0_EQUIPMENT_CHECK | ST0_NOT_READY;
            self.status[1] = 0;
            self.status[2] = 0;
            self.set_standard_result();
            self.set_phase(Phase::Result);
            return
        }

        let id = SectorId {
            cylinder: self.command[2],
            head: self.command[3],
            record: self.command[4],
            size: self.command[5],
        };

        // position the head on the requested cylinder first
        let drive = &mut self.drives[drive_index];
        drive.set_position(id.cylinder, 0);
        match drive.read_data(id) {
            Some(data) => self.exec = data.to_vec(),
            None => self.exec.clear(),
        }
        self.exec_index = 0;

        self.set_phase(Phase::Execute);
        self.read_timeout = READ_TIMEOUT_FM;
        self.read_buffer.clear();

        self.status = [0; 4];
        self.set_standard_result();
    }

    fn cmd_write_data(&mut self) {
        self.set_data_direction(DIRECTION_IN);
        self.select_drive(self.command[1]);

        if !self.drives[usize::from(self.current_drive & 1)].is_ready() {
            self.status[0] = ST0_ABNORMAL_TERM | ST0_EQUIPMENT_CHECK | ST0_NOT_READY;
            self.status[1] = 0;
            self.status[2] = 0;
            self.set_standard_result();
            self.set_phase(Phase::Result);
            return
        }

        self.exec = vec![0; usize::from(self.command[5]) * 0x100];
        self.exec_index = 0;
        self.set_phase(Phase::Execute);

        self.set_standard_result();
    }

    fn cmd_read_id(&mut self) {
        self.set_data_direction(DIRECTION_OUT);
        self.select_drive(self.command[1]);
        self.status[2] = 0;

        let chrn = self.drives[usize::from(self.current_drive & 1)].read_id();
        match chrn {
            Some(_) => {
                self.status[0] = 0;
                self.status[1] = 0;
            }
            None => {
                self.status[0] = self.status[0] & 0x1F | ST0_ABNORMAL_TERM | ST0_NOT_READY;
                self.status[1] = 0;
            }
        }
        let chrn = chrn.unwrap_or_default();

        self.set_phase(Phase::Result);
        self.result.clear();
        self.result.push(self.status[0]);
        self.result.push(self.status[1]);
        self.result.push(self.status[2]);
        self.result.push(chrn.cylinder);
        self.result.push(chrn.head);
        self.result.push(chrn.record);
        self.result.push(chrn.size);
        self.result_index = 0;
    }

    fn cmd_recalibrate(&mut self) {
        self.set_data_direction(DIRECTION_OUT);
        self.select_drive(self.command[1]);
        // recalibrate is a seek to cylinder 0
        self.command[2] = 0;
        self.cmd_seek();
    }

    fn cmd_seek(&mut self) {
        self.set_data_direction(DIRECTION_OUT);
        self.select_drive(self.command[1]);

        let drive_index = usize::from(self.current_drive & 1);
        self.status[0] &= !ST0_ABNORMAL_READY_TERM;
        if !self.drive_ready(drive_index) {
            self.status[0] |= ST0_ABNORMAL_READY_TERM;
        }
        else if !self.drives[drive_index].seek(self.command[2]) {
            self.status[0] |= ST0_ABNORMAL_TERM;
        }
        else {
            self.status[0] |= ST0_NORMAL_TERM;
        }

        self.seek_completed[drive_index] = true;
        self.set_phase(Phase::Command);
    }

    fn cmd_sense_interrupt_status(&mut self) {
        self.set_data_direction(DIRECTION_OUT);

        if !self.drive_ready(usize::from(self.current_drive & 1)) {
            self.status[0] |= ST0_NOT_READY;
        }
        else {
            self.status[0] &= !ST0_NOT_READY;
        }

        self.result.clear();
        if self.seek_completed[0] {
            self.seek_completed[0] = false;
            self.status_changed[0] = false;
            self.status[0] |= ST0_SEEK_END | ST0_UNIT_SELECT0;
            self.result.push(self.status[0]);
            self.result.push(self.drives[0].track());
        }
        else if self.seek_completed[1] {
            self.seek_completed[1] = false;
            self.status_changed[1] = false;
            self.status[0] |= ST0_SEEK_END | ST0_UNIT_SELECT1;
            self.result.push(self.status[0]);
            self.result.push(self.drives[1].track());
        }
        else if self.status_changed[0] {
            self.status_changed[0] = false;
            self.status[0] = ST0_ABNORMAL_READY_TERM | ST0_UNIT_SELECT0;
            if !self.drive_ready(0) {
                self.status[0] |= ST0_NOT_READY;
            }
            self.result.push(self.status[0]);
            self.result.push(self.drives[0].track());
        }
        else if self.status_changed[1] {
            self.status_changed[1] = false;
            self.status[0] = ST0_ABNORMAL_READY_TERM | ST0_UNIT_SELECT1;
            if !self.drive_ready(1) {
                self.status[0] |= ST0_NOT_READY;
            }
            self.result.push(self.status[0]);
            self.result.push(self.drives[1].track());
        }
        else {
            self.result.push(ST0_INVALID_COMMAND);
        }
        self.result_index = 0;

        self.set_phase(Phase::Result);
    }

    fn cmd_specify(&mut self) {
        self.set_data_direction(DIRECTION_OUT);
        self.step_rate_time = (self.command[1] & 0xF0) >> 4;
        self.head_unload_time = self.command[1] & 0x0F;
        self.head_load_time = (self.command[2] & 0xFE) >> 1;
        self.non_dma_mode = self.command[2] & 0x01;
        self.set_phase(Phase::Command);
    }

    fn cmd_sense_drive_status(&mut self) {
        self.set_data_direction(DIRECTION_OUT);
        self.select_drive(self.command[1]);
        self.result.clear();
        self.result.push(self.status[3]);
        self.result_index = 0;
        self.set_phase(Phase::Result);
    }
}

fn command_length(command: u8) -> u8 {
    COMMAND_LENGTHS[usize::from(command & 0x1F)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::dsk::Disc;
    use crate::formats::dsk::tests::extended_image_single_sector;

    fn loaded_fdc() -> Fdc {
        let disc = Disc::parse(&extended_image_single_sector()).unwrap();
        let mut fdc = Fdc::default();
        fdc.insert_disc(0, disc);
        fdc
    }

    fn submit(fdc: &mut Fdc, bytes: &[u8]) {
        for &byte in bytes {
            fdc.write(0x0101, byte);
        }
    }

    #[test]
    fn initial_main_status() {
        let mut fdc = Fdc::default();
        assert_eq!(STATUS_REQUEST_MASTER, fdc.read(0x0100));
    }

    #[test]
    fn read_sector_streams_data_every_27_ticks() {
        let mut fdc = loaded_fdc();
        fdc.write(0x0000, 1);
        submit(&mut fdc, &[CMD_READ_DATA, 0, 0, 0, 0xC1, 0x10, 0, 0, 0x10]);

        for expected in 0..0x10 {
            for _ in 0..27 {
                fdc.tick();
            }
            assert_eq!(expected, fdc.read(0x0101));
        }

        // afterwards the result phase reports an abnormal end of cylinder
        let status = fdc.read(0x0100);
        assert_ne!(0, status & STATUS_TRANSFER_DIRECTION);
        let st0 = fdc.read(0x0101);
        let st1 = fdc.read(0x0101);
        assert_eq!(ST0_ABNORMAL_TERM, st0 & ST0_ABNORMAL_TERM);
        assert_eq!(ST1_END_OF_CYLINDER, st1 & ST1_END_OF_CYLINDER);
    }

    #[test]
    fn slow_reader_overruns_the_fifo() {
        let mut fdc = loaded_fdc();
        fdc.write(0x0000, 1);
        submit(&mut fdc, &[CMD_READ_DATA, 0, 0, 0, 0xC1, 0x10, 0, 0, 0x10]);

        // never read: five byte periods overflow the 4-byte FIFO
        for _ in 0..27 * 5 {
            fdc.tick();
        }
        assert_ne!(0, fdc.status[1] & ST1_OVERRUN);
        // the oldest byte was pushed out
        assert_eq!(1, fdc.read(0x0101));
    }

    #[test]
    fn read_data_without_disc_fails_over_to_results() {
        let mut fdc = Fdc::default();
        submit(&mut fdc, &[CMD_READ_DATA, 1, 0, 0, 0xC1, 0x10, 0, 0, 0x10]);

        let st0 = fdc.read(0x0101);
        assert_eq!(ST0_ABNORMAL_TERM | ST0_EQUIPMENT_CHECK | ST0_NOT_READY, st0 & 0xF8);
    }

    #[test]
    fn seek_and_sense_interrupt_status() {
        let mut fdc = loaded_fdc();
        fdc.write(0x0000, 1);
        submit(&mut fdc, &[CMD_SEEK, 0, 0]);

        submit(&mut fdc, &[CMD_SENSE_INTERRUPT_STATUS]);
        let st0 = fdc.read(0x0101);
        let cylinder = fdc.read(0x0101);
        assert_ne!(0, st0 & ST0_SEEK_END);
        assert_eq!(0, cylinder);

        // the motor write flagged a status change on the second drive
        submit(&mut fdc, &[CMD_SENSE_INTERRUPT_STATUS]);
        let st0 = fdc.read(0x0101);
        fdc.read(0x0101);
        assert_eq!(ST0_ABNORMAL_READY_TERM | ST0_UNIT_SELECT1, st0 & 0xC1);

        // no pending events left: invalid command
        submit(&mut fdc, &[CMD_SENSE_INTERRUPT_STATUS]);
        assert_eq!(ST0_INVALID_COMMAND, fdc.read(0x0101));
    }

    #[test]
    fn recalibrate_completes_with_motor_off_flagging_not_ready() {
        let mut fdc = loaded_fdc();
        submit(&mut fdc, &[CMD_RECALIBRATE, 0]);
        submit(&mut fdc, &[CMD_SENSE_INTERRUPT_STATUS]);
        let st0 = fdc.read(0x0101);
        assert_ne!(0, st0 & ST0_NOT_READY);
    }

    #[test]
    fn read_id_reports_the_first_sector() {
        let mut fdc = loaded_fdc();
        fdc.write(0x0000, 1);
        submit(&mut fdc, &[CMD_READ_ID, 0]);

        let result: Vec<u8> = (0..7).map(|_| fdc.read(0x0101)).collect();
        assert_eq!(&[0, 0, 0, 0, 0, 0xC1, 0x10], &result[..]);
    }

    #[test]
    fn specify_returns_to_the_command_phase() {
        let mut fdc = Fdc::default();
        submit(&mut fdc, &[CMD_SPECIFY, 0xAF, 0x03]);
        assert_eq!(0x0A, fdc.step_rate_time);
        assert_eq!(0x0F, fdc.head_unload_time);
        assert_eq!(0x01, fdc.head_load_time);
        assert_eq!(1, fdc.non_dma_mode);
        assert_eq!(STATUS_REQUEST_MASTER, fdc.read(0x0100));
    }
}
