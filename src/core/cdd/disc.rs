// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 itsakeyfut
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! In-memory disc model
//!
//! The drive only needs a track map (which FAD ranges are data, which are
//! audio) and sector contents to hand to the CD block. Disc *image* parsing
//! (cue/iso/chd) lives outside the core; whatever loads an image builds a
//! [`Disc`] from it.
//!
//! # FAD addressing
//!
//! The Saturn CD subsystem addresses sectors by FAD (Frame ADdress), the
//! absolute sector number including the 2-second (150 sector) pregap. Track
//! one therefore starts at FAD 150.

use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};

/// Raw sector size in bytes (2352, full 2352-byte frames)
pub const SECTOR_LEN: usize = 2352;

/// FAD of the start of the program area (after the 2-second pregap)
pub const PREGAP_FADS: u32 = 150;

/// Track payload type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub enum TrackKind {
    /// Mode 1 data track
    Data,
    /// CDDA audio track
    Audio,
}

/// One track of the disc's program area
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub struct Track {
    /// Track number (1-99)
    pub number: u8,
    /// First FAD of the track
    pub start_fad: u32,
    /// One past the last FAD of the track
    pub end_fad: u32,
    /// Data or audio
    pub kind: TrackKind,
}

/// Track layout of an inserted disc
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub struct Disc {
    tracks: Vec<Track>,
    leadout_fad: u32,
}

impl Disc {
    /// Build a disc from an ordered track list
    ///
    /// Tracks must be contiguous and ascending; this is a loader-side
    /// contract, asserted in debug builds.
    pub fn new(tracks: Vec<Track>) -> Self {
        debug_assert!(!tracks.is_empty(), "disc needs at least one track");
        for pair in tracks.windows(2) {
            debug_assert!(pair[0].end_fad == pair[1].start_fad, "tracks must be contiguous");
        }
        let leadout_fad = tracks.last().map_or(PREGAP_FADS, |t| t.end_fad);
        Self {
            tracks,
            leadout_fad,
        }
    }

    /// A small two-track disc for tests and the trace runner: a data track
    /// covering FADs 150..75000 followed by a one-minute audio track.
    pub fn new_dummy() -> Self {
        Self::new(vec![
            Track {
                number: 1,
                start_fad: PREGAP_FADS,
                end_fad: 75_000,
                kind: TrackKind::Data,
            },
            Track {
                number: 2,
                start_fad: 75_000,
                end_fad: 79_500,
                kind: TrackKind::Audio,
            },
        ])
    }

    /// Track covering `fad`, or `None` in the pregap/lead-out
    pub fn track_at(&self, fad: u32) -> Option<&Track> {
        self.tracks
            .iter()
            .find(|t| fad >= t.start_fad && fad < t.end_fad)
    }

    /// All tracks in order
    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    /// First FAD of the lead-out area
    pub fn leadout_fad(&self) -> u32 {
        self.leadout_fad
    }

    /// Synthesize the 2352-byte sector at `fad` into `buf`
    ///
    /// Data sectors carry the standard 12-byte sync pattern, a BCD MSF
    /// header and mode byte 1 with a zeroed payload; audio sectors are
    /// silence. A real disc image source overrides these contents; the
    /// layout here only has to be structurally correct for the CD block.
    pub fn fill_sector(&self, fad: u32, buf: &mut [u8; SECTOR_LEN]) {
        buf.fill(0);

        if let Some(track) = self.track_at(fad) {
            if track.kind == TrackKind::Data {
                // Sync pattern: 00 FF*10 00
                buf[0] = 0x00;
                for byte in &mut buf[1..11] {
                    *byte = 0xFF;
                }
                buf[11] = 0x00;

                let (minute, second, frame) = fad_to_msf(fad);
                buf[12] = dec_to_bcd(minute);
                buf[13] = dec_to_bcd(second);
                buf[14] = dec_to_bcd(frame);
                buf[15] = 0x01; // Mode 1
            }
        }
    }
}

/// Split an absolute FAD into (minute, second, frame), decimal
pub fn fad_to_msf(fad: u32) -> (u8, u8, u8) {
    let minute = (fad / 75 / 60) as u8;
    let second = ((fad / 75) % 60) as u8;
    let frame = (fad % 75) as u8;
    (minute, second, frame)
}

/// Decimal (0-99) to BCD
pub fn dec_to_bcd(value: u8) -> u8 {
    debug_assert!(value < 100);
    ((value / 10) << 4) | (value % 10)
}

/// BCD to decimal
pub fn bcd_to_dec(value: u8) -> u8 {
    (value >> 4) * 10 + (value & 0x0F)
}
