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

//! CD block side of the drive's serial link
//!
//! Models the SH-1 co-processor's end of caller-visible wire traffic: it
//! queues outbound command packets as a bit stream, reassembles inbound
//! status packets from the bits the drive shifts out, and tracks the two
//! control line levels. Sector payloads delivered by the drive are counted
//! and the most recent one kept for inspection.
//!
//! The higher CD block layers (buffer partitions, filters, host command
//! set) are out of scope; this link is the boundary.

use std::collections::VecDeque;

use super::super::cdd::{CddHost, PACKET_BITS, PACKET_LEN, SECTOR_LEN};

/// CD block end of the bit-serial drive link
pub struct CdBlockLink {
    /// Outbound command bits, MSB-first per byte
    command_bits: VecDeque<bool>,
    /// Inbound status bits collected this exchange
    status_bits: Vec<bool>,
    /// Last fully assembled status packet
    last_status: Option<[u8; PACKET_LEN]>,
    /// Frame-sync line level as last driven
    frame_sync: bool,
    /// Request line level as last driven
    request: bool,
    /// Data sectors delivered since construction
    data_sectors: u64,
    /// Audio sectors delivered since construction
    audio_sectors: u64,
    /// FAD of the most recent sector
    last_sector_fad: Option<u32>,
    /// Most recent sector payload
    last_sector: Option<Box<[u8; SECTOR_LEN]>>,
    /// Fill level reported back for CDDA delivery
    audio_fill: u8,
}

impl CdBlockLink {
    pub fn new() -> Self {
        Self {
            command_bits: VecDeque::new(),
            status_bits: Vec::with_capacity(usize::from(PACKET_BITS)),
            last_status: None,
            frame_sync: false,
            request: false,
            data_sectors: 0,
            audio_sectors: 0,
            last_sector_fad: None,
            last_sector: None,
            audio_fill: 0,
        }
    }

    /// Queue a 13-byte command packet for the next exchange
    ///
    /// Bits are shifted to the drive MSB-first, one per TxByte firing. An
    /// empty queue shifts zeros, which the drive discards on the parity
    /// check and treats as a no-op.
    pub fn queue_command(&mut self, packet: &[u8; PACKET_LEN]) {
        for byte in packet {
            for shift in (0..8).rev() {
                self.command_bits.push_back(byte & (1 << shift) != 0);
            }
        }
    }

    /// Take the last fully assembled status packet, if any
    pub fn take_status(&mut self) -> Option<[u8; PACKET_LEN]> {
        self.last_status.take()
    }

    /// Frame-sync line level as last driven by the drive
    pub fn frame_sync(&self) -> bool {
        self.frame_sync
    }

    /// Request line level as last driven by the drive
    pub fn request(&self) -> bool {
        self.request
    }

    /// Data sectors delivered since construction
    pub fn data_sectors(&self) -> u64 {
        self.data_sectors
    }

    /// Audio sectors delivered since construction
    pub fn audio_sectors(&self) -> u64 {
        self.audio_sectors
    }

    /// FAD of the most recent sector, if any
    pub fn last_sector_fad(&self) -> Option<u32> {
        self.last_sector_fad
    }

    /// Most recent sector payload, if any
    pub fn last_sector(&self) -> Option<&[u8; SECTOR_LEN]> {
        self.last_sector.as_deref()
    }

    /// Set the fill level reported back for CDDA delivery
    pub fn set_audio_fill(&mut self, fill: u8) {
        self.audio_fill = fill;
    }

    fn keep_sector(&mut self, fad: u32, payload: &[u8; SECTOR_LEN]) {
        self.last_sector_fad = Some(fad);
        match self.last_sector.as_deref_mut() {
            Some(buf) => buf.copy_from_slice(payload),
            None => self.last_sector = Some(Box::new(*payload)),
        }
    }
}

impl Default for CdBlockLink {
    fn default() -> Self {
        Self::new()
    }
}

impl CddHost for CdBlockLink {
    fn serial_read(&mut self) -> bool {
        self.command_bits.pop_front().unwrap_or(false)
    }

    fn serial_write(&mut self, bit: bool) {
        self.status_bits.push(bit);
        if self.status_bits.len() == usize::from(PACKET_BITS) {
            let mut packet = [0u8; PACKET_LEN];
            for (i, &bit) in self.status_bits.iter().enumerate() {
                if bit {
                    packet[i / 8] |= 1 << (7 - (i % 8));
                }
            }
            log::trace!("CD link: status packet assembled, op {:#04x}", packet[0]);
            self.last_status = Some(packet);
            self.status_bits.clear();
        }
    }

    fn set_frame_sync(&mut self, level: bool) {
        self.frame_sync = level;
    }

    fn set_request(&mut self, level: bool) {
        self.request = level;
    }

    fn deliver_data_sector(&mut self, fad: u32, sector: &[u8; SECTOR_LEN]) {
        self.data_sectors += 1;
        self.keep_sector(fad, sector);
    }

    fn deliver_audio_sector(&mut self, fad: u32, samples: &[u8; SECTOR_LEN]) -> u8 {
        self.audio_sectors += 1;
        self.keep_sector(fad, samples);
        self.audio_fill
    }
}
