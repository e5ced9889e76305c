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

//! CDD command decoding and execution
//!
//! Packet wire format (13 bytes, MSB-first on the line):
//!
//! Command (co-processor to drive):
//!
//! | Byte  | Field                                   |
//! |-------|-----------------------------------------|
//! | 0     | Opcode                                  |
//! | 1..=3 | FAD, 24-bit big-endian (byte 1 carries the ring variant for SeekRing) |
//! | 4..=9 | Unused                                  |
//! | 10    | Read speed (0 = 1x, 1 = 2x)             |
//! | 11    | Parity                                  |
//! | 12    | Always 0                                |
//!
//! Status (drive to co-processor):
//!
//! | Byte   | Field                                  |
//! |--------|----------------------------------------|
//! | 0      | Operation code                         |
//! | 1      | Subcode Q control (0x41 data, 0x01 audio) |
//! | 2      | Track number, BCD (0xAA in lead-out)   |
//! | 3      | Index number, BCD                      |
//! | 4..=6  | Track-relative MSF, BCD                |
//! | 7      | Always 0                               |
//! | 8..=10 | Absolute MSF, BCD                      |
//! | 11     | Checksum over bytes 0..=10             |
//! | 12     | Always 0                               |
//!
//! Both packets carry the same checksum: the bitwise complement of the
//! wrapping byte sum of the 11 payload bytes.

use super::super::timing::Scheduler;
use super::disc::{dec_to_bcd, fad_to_msf, Disc, TrackKind, PREGAP_FADS};
use super::{CdDrive, Operation, ReadSpeed, Transport, PACKET_LEN, SECURITY_RING_FAD, TOC_TICKS};

/// Subcode Q control nibbles for byte 1 of the status packet
const SUBQ_DATA: u8 = 0x41;
const SUBQ_AUDIO: u8 = 0x01;

/// Track number reported inside the lead-out
const TRACK_LEADOUT: u8 = 0xAA;

/// Byte-1 variants selecting the ring seek flavor
const RING_VARIANT_B2: u8 = 0xB2;
const RING_VARIANT_B6: u8 = 0xB6;

/// Command opcode, byte 0 of the command packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CommandOpcode {
    Noop = 0x0,
    SeekRing = 0x2,
    ReadTOC = 0x3,
    Stop = 0x4,
    ReadSector = 0x6,
    Pause = 0x8,
    SeekSector = 0x9,
    ScanForwards = 0xA,
    ScanBackwards = 0xB,
}

impl CommandOpcode {
    /// Decode byte 0; unknown values map to `None`
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x0 => Some(Self::Noop),
            0x2 => Some(Self::SeekRing),
            0x3 => Some(Self::ReadTOC),
            0x4 => Some(Self::Stop),
            0x6 => Some(Self::ReadSector),
            0x8 => Some(Self::Pause),
            0x9 => Some(Self::SeekSector),
            0xA => Some(Self::ScanForwards),
            0xB => Some(Self::ScanBackwards),
            _ => None,
        }
    }
}

/// A command packet decoded at TxEnd
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command {
    /// Decoded opcode; `None` for an unknown byte 0
    pub opcode: Option<CommandOpcode>,
    /// 24-bit frame address from bytes 1..=3
    pub fad: u32,
    /// Ring seek flavor selector (byte 1, overlapping the FAD field)
    pub ring_variant: u8,
    /// Read speed from byte 10
    pub read_speed: ReadSpeed,
    /// Parity byte as received
    pub parity: u8,
    /// True when the received parity matches the payload
    pub parity_ok: bool,
}

impl Command {
    /// Decode the 13 raw command bytes
    pub fn decode(raw: &[u8; PACKET_LEN]) -> Self {
        let fad =
            (u32::from(raw[1]) << 16) | (u32::from(raw[2]) << 8) | u32::from(raw[3]);
        Self {
            opcode: CommandOpcode::from_byte(raw[0]),
            fad,
            ring_variant: raw[1],
            read_speed: if raw[10] == 0 {
                ReadSpeed::Single
            } else {
                ReadSpeed::Double
            },
            parity: raw[11],
            parity_ok: raw[11] == packet_checksum(raw),
        }
    }
}

/// Checksum of a 13-byte packet: complement of the wrapping sum of the
/// 11 payload bytes
pub fn packet_checksum(packet: &[u8; PACKET_LEN]) -> u8 {
    let sum = packet[..11].iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
    !sum
}

/// Build a well-formed command packet; test and frontend helper
pub fn encode_command(
    opcode: CommandOpcode,
    fad: u32,
    read_speed: ReadSpeed,
) -> [u8; PACKET_LEN] {
    debug_assert!(fad < 1 << 24);
    let mut packet = [0u8; PACKET_LEN];
    packet[0] = opcode as u8;
    packet[1] = (fad >> 16) as u8;
    packet[2] = (fad >> 8) as u8;
    packet[3] = fad as u8;
    packet[10] = match read_speed {
        ReadSpeed::Single => 0,
        ReadSpeed::Double => 1,
    };
    packet[11] = packet_checksum(&packet);
    packet
}

impl CdDrive {
    /// Execute a decoded command against drive state
    ///
    /// Runs at TxEnd, before the reply status packet for this exchange is
    /// encoded, so the operation code the command selects is visible in
    /// the very next packet.
    pub(super) fn execute_command(&mut self, sched: &mut Scheduler, command: Command) {
        if !command.parity_ok {
            // The link has no error signaling; a corrupt command is
            // treated as Noop so the drive keeps its current operation.
            log::warn!(
                "CDD: command parity mismatch (got {:#04x}), ignoring",
                command.parity
            );
            return;
        }

        let Some(opcode) = command.opcode else {
            log::warn!("CDD: unknown command opcode {:#04x}", self.command[0]);
            self.operation = Operation::Unknown;
            return;
        };

        if self.tray_open {
            self.operation = Operation::TrayOpen;
            return;
        }
        if self.disc.is_none() && opcode != CommandOpcode::Noop {
            self.operation = Operation::NoDisc;
            return;
        }

        log::trace!("CDD: command {:?} FAD {:#08x}", opcode, command.fad);
        match opcode {
            CommandOpcode::Noop => {}
            CommandOpcode::SeekRing => {
                self.stop_reading(sched);
                self.pending_read = false;
                self.target_fad = SECURITY_RING_FAD;
                self.operation = if command.ring_variant == RING_VARIANT_B6 {
                    Operation::SeekSecurityRingB6
                } else {
                    // Anything other than the B6 variant selects B2.
                    Operation::SeekSecurityRingB2
                };
                self.start_transport(sched, Transport::RingSeek);
            }
            CommandOpcode::ReadTOC => {
                self.stop_reading(sched);
                self.pending_read = false;
                // The transport travels back to the lead-in before the
                // TOC passes start counting.
                self.target_fad = PREGAP_FADS;
                self.operation = Operation::ReadTOC;
                self.start_transport(sched, Transport::Toc { remaining: TOC_TICKS });
            }
            CommandOpcode::Stop => {
                self.stop_reading(sched);
                self.stop_transport(sched);
                self.pending_read = false;
                self.operation = Operation::Stopped;
            }
            CommandOpcode::ReadSector => {
                self.stop_reading(sched);
                // The wire format admits any 24-bit FAD; the sled cannot
                // travel past the lead-out.
                let leadout = self.disc.as_ref().map_or(PREGAP_FADS, Disc::leadout_fad);
                self.target_fad = command.fad.min(leadout);
                self.read_speed = command.read_speed;
                // The read operation code is reported from this exchange
                // on, even while the seek is still in flight.
                self.operation = match self
                    .disc
                    .as_ref()
                    .and_then(|d| d.track_at(self.target_fad))
                    .map(|t| t.kind)
                {
                    Some(TrackKind::Audio) => Operation::ReadAudioSector,
                    _ => Operation::ReadDataSector,
                };
                if self.current_fad == self.target_fad {
                    self.stop_transport(sched);
                    self.pending_read = false;
                    self.start_reading(sched);
                } else {
                    self.pending_read = true;
                    self.start_transport(sched, Transport::Seek);
                }
            }
            CommandOpcode::Pause => {
                self.stop_reading(sched);
                self.stop_transport(sched);
                self.pending_read = false;
                self.operation = Operation::Idle;
            }
            CommandOpcode::SeekSector => {
                self.stop_reading(sched);
                self.pending_read = false;
                let leadout = self.disc.as_ref().map_or(PREGAP_FADS, Disc::leadout_fad);
                self.target_fad = command.fad.min(leadout);
                self.operation = Operation::Seek;
                if self.current_fad == self.target_fad {
                    self.stop_transport(sched);
                    self.operation = Operation::Idle;
                } else {
                    self.start_transport(sched, Transport::Seek);
                }
            }
            CommandOpcode::ScanForwards | CommandOpcode::ScanBackwards => {
                self.stop_reading(sched);
                self.pending_read = false;
                let forwards = opcode == CommandOpcode::ScanForwards;
                self.operation = Operation::Seek;
                self.start_transport(sched, Transport::Scan { forwards });
            }
        }
    }

    /// Encode the status packet for the next exchange
    pub(super) fn build_status(&mut self) {
        let mut packet = [0u8; PACKET_LEN];
        packet[0] = self.operation as u8;

        let fad = self.current_fad;
        match self.disc.as_ref() {
            Some(disc) => match disc.track_at(fad) {
                Some(track) => {
                    packet[1] = match track.kind {
                        TrackKind::Data => SUBQ_DATA,
                        TrackKind::Audio => SUBQ_AUDIO,
                    };
                    packet[2] = dec_to_bcd(track.number);
                    packet[3] = dec_to_bcd(1);
                    let (min, sec, frac) = fad_to_msf(fad - track.start_fad);
                    packet[4] = dec_to_bcd(min);
                    packet[5] = dec_to_bcd(sec);
                    packet[6] = dec_to_bcd(frac);
                }
                None => {
                    packet[1] = SUBQ_DATA;
                    packet[2] = TRACK_LEADOUT;
                    packet[3] = dec_to_bcd(1);
                    let rel = fad.saturating_sub(disc.leadout_fad());
                    let (min, sec, frac) = fad_to_msf(rel);
                    packet[4] = dec_to_bcd(min);
                    packet[5] = dec_to_bcd(sec);
                    packet[6] = dec_to_bcd(frac);
                }
            },
            None => {
                packet[1] = SUBQ_DATA;
            }
        }

        let (min, sec, frac) = fad_to_msf(fad);
        packet[8] = dec_to_bcd(min);
        packet[9] = dec_to_bcd(sec);
        packet[10] = dec_to_bcd(frac);

        packet[11] = packet_checksum(&packet);
        self.status = packet;
    }
}
