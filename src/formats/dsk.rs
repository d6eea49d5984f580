/*
    Copyright (C) 2022  Rafal Michalski

    This file is part of AMSTRUSTY, a Rust library for building emulators.

    For the full copyright notice, see the lib.rs file.
*/
//! The DSK and extended DSK floppy disc image formats.
use core::fmt;

use serde::{Serialize, Deserialize};

/// The signature of the original, uniform-track-size disc image format.
pub const DSK_SIGNATURE: &[u8] = b"MV - CPC";
/// The signature of the extended disc image format.
pub const EDSK_SIGNATURE: &[u8] = b"EXTENDED CPC DSK File\r\nDisk-Info\r\n";
/// The signature prefixing each track information block.
pub const TRACK_SIGNATURE: &[u8] = b"Track-Info\r\n";

#[non_exhaustive]
#[derive(Debug, PartialEq)]
pub enum DskError {
    /// The image does not start with a recognized disc signature.
    UnknownFormat,
    /// The image ends in the middle of a track or sector.
    Truncated,
    /// A track information block has a bad signature.
    BadTrackHeader,
}

impl std::error::Error for DskError {}

impl fmt::Display for DskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", match self {
            DskError::UnknownFormat => "not a recognized disc image format",
            DskError::Truncated => "disc image is truncated",
            DskError::BadTrackHeader => "malformed track information header",
        })
    }
}

/// A single sector: its identity fields and data.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sector {
    /// The cylinder recorded in the sector's id field.
    pub track: u8,
    /// The head recorded in the sector's id field.
    pub side: u8,
    /// The sector id (the `R` of CHRN).
    pub id: u8,
    /// The size code (the `N` of CHRN).
    pub size: u8,
    /// The FDC ST1 register recorded when the image was produced.
    pub fdc_status1: u8,
    /// The FDC ST2 register recorded when the image was produced.
    pub fdc_status2: u8,
    /// The sector payload.
    pub data: Vec<u8>,
}

/// A single track of a disc image.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    pub id: u8,
    pub side: u8,
    pub sector_size: u8,
    pub gap3_length: u8,
    pub filler_byte: u8,
    pub formatted: bool,
    pub data_rate: u8,
    pub recording_mode: u8,
    pub sectors: Vec<Sector>,
}

/// An in-memory floppy disc assembled from a DSK or extended DSK image.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Disc {
    pub tracks: Vec<Track>,
}

fn slice(image: &[u8], offset: usize, len: usize) -> Result<&[u8], DskError> {
    image.get(offset..offset + len).ok_or(DskError::Truncated)
}

fn read_u16_le(image: &[u8], offset: usize) -> Result<u16, DskError> {
    let bytes = slice(image, offset, 2)?;
    Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
}

impl Disc {
    /// Parses a disc image, recognizing both on-wire formats by their signature.
    pub fn parse(image: &[u8]) -> Result<Disc, DskError> {
        if image.len() >= EDSK_SIGNATURE.len() && &image[..EDSK_SIGNATURE.len()] == EDSK_SIGNATURE {
            Disc::parse_extended(image)
        }
        else if image.len() >= DSK_SIGNATURE.len() && &image[..DSK_SIGNATURE.len()] == DSK_SIGNATURE {
            Disc::parse_standard(image)
        }
        else {
            Err(DskError::UnknownFormat)
        }
    }

    /// Parses the original format: a uniform track size recorded in the
    /// disc information block.
    fn parse_standard(image: &[u8]) -> Result<Disc, DskError> {
        let track_count = *image.get(0x30).ok_or(DskError::Truncated)?;
        let side_count = *image.get(0x31).ok_or(DskError::Truncated)?;
        let track_size = usize::from(read_u16_le(image, 0x32)?);

        let mut tracks = Vec::new();
        let mut offset = 0x100;
        for _ in 0..u16::from(track_count) * u16::from(side_count) {
            // sector data may extend past the declared track size, so parse
            // from the remainder of the image and only step by the track size
            let track_data = image.get(offset..).ok_or(DskError::Truncated)?;
            let mut track = parse_track_header(track_data)?;
            track.formatted = track_size != 0;
            parse_sectors(track_data, &mut track, |info| {
                usize::from(info[0x03]) * 0x100
            })?;
            tracks.push(track);
            offset += track_size;
        }
        Ok(Disc { tracks })
    }

    /// Parses the extended format: per-track sizes in a table, per-sector
    /// actual data lengths in the sector information records.
    fn parse_extended(image: &[u8]) -> Result<Disc, DskError> {
        let track_count = *image.get(0x30).ok_or(DskError::Truncated)?;
        let side_count = *image.get(0x31).ok_or(DskError::Truncated)?;

        let mut tracks = Vec::new();
        let mut size_table = 0x34;
        let mut offset = 0x100;
        for _ in 0..u16::from(track_count) * u16::from(side_count) {
            let track_size = usize::from(*image.get(size_table).ok_or(DskError::Truncated)?) * 0x100;
            size_table += 1;

            if track_size == 0 {
                // an unformatted track occupies no space in the image
                tracks.push(Track::default());
                continue;
            }

            let track_data = image.get(offset..).ok_or(DskError::Truncated)?;
            let mut track = parse_track_header(track_data)?;
            track.formatted = true;
            track.data_rate = track_data[0x1C];
            track.recording_mode = track_data[0x1D];
            parse_sectors(track_data, &mut track, |info| {
                usize::from(u16::from_le_bytes([info[0x06], info[0x07]]))
            })?;
            tracks.push(track);
            offset += track_size;
        }
        Ok(Disc { tracks })
    }
}

fn parse_track_header(track_data: &[u8]) -> Result<Track, DskError> {
    if track_data.len() < 0x100 || &track_data[..TRACK_SIGNATURE.len()] != TRACK_SIGNATURE {
        return Err(DskError::BadTrackHeader)
    }
    Ok(Track {
        id: track_data[0x10],
        side: track_data[0x11],
        sector_size: track_data[0x14],
        gap3_length: track_data[0x16],
        filler_byte: track_data[0x17],
        formatted: false,
        data_rate: 0,
        recording_mode: 0,
        sectors: Vec::new(),
    })
}

fn parse_sectors<F>(track_data: &[u8], track: &mut Track, data_length: F) -> Result<(), DskError>
    where F: Fn(&[u8]) -> usize
{
    let sector_count = track_data[0x15];
    let mut info_offset = 0x18;
    let mut data_offset = 0x100;
    for _ in 0..sector_count {
        let info = slice(track_data, info_offset, 8)?;
        let length = data_length(info);
        let data = slice(track_data, data_offset, length)?;
        track.sectors.push(Sector {
            track: info[0x00],
            side: info[0x01],
            id: info[0x02],
            size: info[0x03],
            fdc_status1: info[0x04],
            fdc_status2: info[0x05],
            data: data.to_vec(),
        });
        info_offset += 8;
        data_offset += length;
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Builds a minimal single-track, single-sector extended disc image.
    ///
    /// The sector's id field is CHRN = (0, 0, 0xC1, 0x10) with 16 bytes of
    /// data counting up from zero.
    pub(crate) fn extended_image_single_sector() -> Vec<u8> {
        let mut image = Vec::new();
        image.extend_from_slice(EDSK_SIGNATURE);
        image.resize(0x30, 0);
        image.push(0x01); // track count
        image.push(0x01); // side count
        image.extend_from_slice(&[0, 0]);
        image.push(0x01); // track size: 0x100
        image.resize(0x100, 0);

        image.extend_from_slice(TRACK_SIGNATURE);
        image.resize(0x110, 0);
        image.push(0x00); // track id
        image.push(0x00); // side
        image.push(0x01); // data rate
        image.push(0x00); // recording mode
        image.push(0x10); // sector size
        image.push(0x01); // sector count
        image.push(0x80); // GAP3 length
        image.push(0xE5); // filler byte

        // the sector information record
        image.extend_from_slice(&[0x00, 0x00, 0xC1, 0x10, 0x00, 0x00]);
        image.extend_from_slice(&0x0010u16.to_le_bytes());

        image.resize(0x200, 0);
        for data in 0..0x10 {
            image.push(data);
        }
        image
    }

    #[test]
    fn parse_extended_image() {
        let image = extended_image_single_sector();
        let disc = Disc::parse(&image).unwrap();
        assert_eq!(1, disc.tracks.len());
        let track = &disc.tracks[0];
        assert_eq!(0, track.id);
        assert!(track.formatted);
        assert_eq!(1, track.sectors.len());
        let sector = &track.sectors[0];
        assert_eq!(0xC1, sector.id);
        assert_eq!(0x10, sector.size);
        assert_eq!((0..0x10).collect::<Vec<u8>>(), sector.data);
    }

    #[test]
    fn parse_standard_image() {
        // track size 0x100 header + 2 sectors of 0x100 bytes
        let mut image = Vec::new();
        image.extend_from_slice(DSK_SIGNATURE);
        image.resize(0x30, 0);
        image.push(0x01);
        image.push(0x01);
        image.extend_from_slice(&0x0300u16.to_le_bytes());
        image.resize(0x100, 0);

        let track_offset = image.len();
        image.extend_from_slice(TRACK_SIGNATURE);
        image.resize(track_offset + 0x14, 0);
        image.push(0x01); // sector size code
        image.push(0x02); // sector count
        image.push(0x80);
        image.push(0xE5);
        for id in 0..2u8 {
            image.extend_from_slice(&[0x00, 0x00, 0xC1 + id, 0x01, 0x00, 0x00, 0x00, 0x00]);
        }
        image.resize(track_offset + 0x100, 0);
        for id in 0..2 {
            image.extend(std::iter::repeat(0xA0 + id).take(0x100));
        }

        let disc = Disc::parse(&image).unwrap();
        assert_eq!(1, disc.tracks.len());
        let track = &disc.tracks[0];
        assert_eq!(2, track.sectors.len());
        assert_eq!(0xC2, track.sectors[1].id);
        assert_eq!(vec![0xA1u8; 0x100], track.sectors[1].data);
    }

    #[test]
    fn rejects_unknown_and_truncated_images() {
        assert_eq!(Err(DskError::UnknownFormat), Disc::parse(b"GARBAGE").map(|_| ()));
        let mut image = extended_image_single_sector();
        image.truncate(0x208);
        assert_eq!(Err(DskError::Truncated), Disc::parse(&image).map(|_| ()));
        image.truncate(0x180);
        assert_eq!(Err(DskError::BadTrackHeader), Disc::parse(&image).map(|_| ()));
    }
}
