/*
    Copyright (C) 2022  Rafal Michalski

    This file is part of AMSTRUSTY, a Rust library for building emulators.

    For the full copyright notice, see the lib.rs file.
*/
//! A floppy disc drive: head position and sector lookup on an inserted disc.
use serde::{Serialize, Deserialize};

use crate::formats::dsk::{Disc, Track};

/// The four-byte identity of a sector: cylinder, head, record and size code.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectorId {
    pub cylinder: u8,
    pub head: u8,
    pub record: u8,
    pub size: u8,
}

/// A single disc drive.
///
/// The controller owns two of these; only drive select bit 0 is wired up on
/// the CPC so the other two theoretical units are never addressed.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FloppyDrive {
    current_sector: u8,
    current_track: usize,
    disc: Option<Disc>,
}

impl FloppyDrive {
    /// Removes the disc from the drive.
    pub fn eject(&mut self) {
        *self = Default::default();
    }

    /// Inserts a disc into the drive.
    pub fn insert(&mut self, disc: Disc) {
        self.eject();
        self.disc = Some(disc);
    }

    /// A drive is ready when a disc is inserted (and the motor spins, which
    /// the controller checks separately).
    pub fn is_ready(&self) -> bool {
        self.disc.is_some()
    }

    /// The cylinder the head is currently positioned at.
    pub fn track(&self) -> u8 {
        if self.disc.is_some() {
            self.current_track as u8
        }
        else {
            0
        }
    }

    /// Positions the head directly at a cylinder without verifying it exists.
    pub(crate) fn set_position(&mut self, cylinder: u8, sector: u8) {
        self.current_track = usize::from(cylinder);
        self.current_sector = sector;
    }

    /// Steps the head to the requested cylinder.
    ///
    /// Returns `false` when no disc is inserted or the cylinder cannot be
    /// found on it.
    pub fn seek(&mut self, cylinder: u8) -> bool {
        let disc = match &self.disc {
            Some(disc) => disc,
            None => return false
        };
        if disc.tracks.iter().any(|track| track.id == cylinder) {
            self.current_track = usize::from(cylinder);
            return true
        }
        false
    }

    fn current_track_ref(&self) -> Option<&Track> {
        let disc = self.disc.as_ref()?;
        disc.tracks.iter().find(|track| usize::from(track.id) == self.current_track)
    }

    /// Reads the id field of the sector under the head.
    pub fn read_id(&self) -> Option<SectorId> {
        let track = self.current_track_ref()?;
        let sector = track.sectors.get(usize::from(self.current_sector))?;
        Some(SectorId {
            cylinder: sector.track,
            head: sector.side,
            record: sector.id,
            size: sector.size,
        })
    }

    /// Rotates the disc until a sector matching `id` passes under the head
    /// and returns its data.
    ///
    /// The search starts at the current sector and wraps around the track
    /// once; the found sector becomes the current one.
    pub fn read_data(&mut self, id: SectorId) -> Option<&[u8]> {
        let found = self.find_sector(id)?;
        let track = self.current_track_ref()?;
        Some(&track.sectors[found].data)
    }

    /// Locates a sector matching `id` on the current track, making it
    /// current. Returns its index within the track.
    pub(crate) fn find_sector(&mut self, id: SectorId) -> Option<usize> {
        let sector_count = self.current_track_ref()?.sectors.len();
        for _ in 0..sector_count {
            if usize::from(self.current_sector) >= sector_count {
                self.current_sector = 0;
            }
            let track = self.current_track_ref()?;
            let sector = &track.sectors[usize::from(self.current_sector)];
            if sector.track == id.cylinder && sector.side == id.head
                && sector.id == id.record && sector.size == id.size
            {
                return Some(usize::from(self.current_sector))
            }
            self.current_sector += 1;
            if usize::from(self.current_sector) >= sector_count {
                self.current_sector = 0;
            }
        }
        None
    }

    /// Computes the CHRN reported at the end of a multi-sector read: when the
    /// requested record is not present on the cylinder any more, the first
    /// record of the next cylinder is reported instead.
    ///
    /// Returns `true` when the reported cylinder changed.
    pub fn read_data_result(&self, cylinder: &mut u8, record: &mut u8) -> bool {
        let disc = match &self.disc {
            Some(disc) => disc,
            None => return false
        };
        let track = match disc.tracks.iter().find(|track| track.id == *cylinder) {
            Some(track) => track,
            None => return false
        };
        if track.sectors.iter().any(|sector| sector.id == *record) {
            return false
        }

        *cylinder += 1;
        if let Some(next_track) = disc.tracks.iter().find(|track| track.id == *cylinder) {
            if let Some(min_id) = next_track.sectors.iter().map(|sector| sector.id).min() {
                *record = min_id;
            }
        }
        true
    }
}
