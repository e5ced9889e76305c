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

//! CD drive (CDD) emulation for Sega Saturn
//!
//! This module emulates the CD drive mechanism and its bit-serial link to
//! the CD block's SH-1 co-processor. The Saturn drive talks to its
//! controller over a half-duplex serial line: every disc frame the two
//! sides exchange a 13-byte command
//! packet (SH-1 to drive) and a 13-byte status packet (drive to SH-1), one
//! bit at a time, framed by the frame-sync and request control lines.
//!
//! # Protocol sequencer
//!
//! The exchange is driven entirely by scheduler callbacks; there is no
//! polling loop. Each state performs one unit of work and returns the cycle
//! delay until the next state fires:
//!
//! | State    | Action                                              | Next |
//! |----------|-----------------------------------------------------|------|
//! | Reset    | Drop both lines, clear counters                     | Noop |
//! | Noop     | Zero the bit indices, idle until the next frame     | TxBegin |
//! | TxBegin  | Raise frame-sync                                    | TxByte |
//! | TxByte   | Raise request, shift one bit each way               | TxByte / gap / TxEnd |
//! | TxInter1 | First inter-byte gap (longer settle time)           | TxByte |
//! | TxInterN | Later inter-byte gaps                               | TxByte |
//! | TxEnd    | Drop both lines, decode + execute, encode status    | Noop |
//!
//! After 13 bytes x 8 bits (104 `TxByte` firings) the sequencer reaches
//! `TxEnd`, executes the received command, rebuilds the status packet and
//! wraps back to `Noop`. The machine cycles indefinitely while the drive is
//! powered.
//!
//! # Command set
//!
//! | Opcode | Name          | Effect                                    |
//! |--------|---------------|-------------------------------------------|
//! | 0x0    | Noop          | Keep current operation                    |
//! | 0x2    | SeekRing      | Seek to the outer security ring           |
//! | 0x3    | ReadTOC       | Read lead-in table of contents            |
//! | 0x4    | Stop          | Stop the spindle                          |
//! | 0x6    | ReadSector    | Seek to FAD and stream sectors            |
//! | 0x8    | Pause         | Stop reading, keep position               |
//! | 0x9    | SeekSector    | Seek to FAD without reading               |
//! | 0xA    | ScanForwards  | Coarse forward scan                       |
//! | 0xB    | ScanBackwards | Coarse backward scan                      |

use bincode::{Decode, Encode};
use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use super::save_state::{CddState, StateSave};
use super::timing::{Cycles, EventId, EventTag, Scheduler};

mod commands;
mod disc;
#[cfg(test)]
mod tests;

pub use commands::{encode_command, packet_checksum, Command, CommandOpcode};
pub use disc::{bcd_to_dec, dec_to_bcd, fad_to_msf, Disc, Track, TrackKind, SECTOR_LEN};

/// Saturn master clock (NTSC), the unit of all scheduler delays
pub const SYSTEM_CLOCK_HZ: u64 = 28_636_360;

/// Cycles per disc frame at 1x (75 sectors per second)
pub const CYCLES_PER_DISC_FRAME: Cycles = SYSTEM_CLOCK_HZ / 75;

/// Command/status packet length in bytes
pub const PACKET_LEN: usize = 13;

/// Bits per packet (13 bytes x 8)
pub const PACKET_BITS: u8 = (PACKET_LEN * 8) as u8;

/// Reset settle time before the first exchange
const RESET_CYCLES: Cycles = SYSTEM_CLOCK_HZ / 1000; // 1 ms

/// Idle time in Noop padding the exchange out to one per disc frame
const NOOP_CYCLES: Cycles = 340_000;

/// Frame-sync setup time before the first bit
const BEGIN_CYCLES: Cycles = 300;

/// Serial bit period
const BIT_CYCLES: Cycles = 150;

/// First inter-byte gap (TxInter1); the drive needs longer to settle
/// after the opening byte
const INTER_FIRST_CYCLES: Cycles = 1_200;

/// Subsequent inter-byte gaps (TxInterN)
const INTER_NEXT_CYCLES: Cycles = 600;

/// Tail time after the last bit before the next Noop
const END_CYCLES: Cycles = 600;

/// Transport tick period (seeks, scans, TOC passes)
const TRANSPORT_TICK_CYCLES: Cycles = CYCLES_PER_DISC_FRAME;

/// FADs the sled covers per seek tick
const SEEK_STEP_FADS: u32 = 1_500;

/// FADs skipped per scan tick
const SCAN_STEP_FADS: u32 = 150;

/// Transport ticks spent reading the lead-in TOC
const TOC_TICKS: u8 = 3;

/// FAD of the outer security ring area
const SECURITY_RING_FAD: u32 = 0x2F000;

/// Host side of the drive's external interfaces
///
/// The CD block co-processor model implements this: the serial data line in
/// both directions, the two control lines, and sector delivery into the CD
/// block's buffer partitions. One serial callback pair fires per `TxByte`;
/// the line callbacks fire only on level changes.
pub trait CddHost {
    /// Read one inbound bit (co-processor to drive)
    fn serial_read(&mut self) -> bool;

    /// Write one outbound bit (drive to co-processor)
    fn serial_write(&mut self, bit: bool);

    /// Frame-sync line level change
    fn set_frame_sync(&mut self, level: bool);

    /// Request line level change
    fn set_request(&mut self, level: bool);

    /// A decoded data sector is ready
    fn deliver_data_sector(&mut self, fad: u32, sector: &[u8; SECTOR_LEN]);

    /// Raw CDDA bytes are ready; returns the CD block's buffer fill level
    /// (0 = empty, 255 = full)
    fn deliver_audio_sector(&mut self, fad: u32, samples: &[u8; SECTOR_LEN]) -> u8;
}

bitflags! {
    /// The two handshake lines of the serial link
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ControlLines: u8 {
        /// Packet framing line, held through the inter-byte gaps
        const FRAME_SYNC = 1 << 0;
        /// Per-bit strobe line, held while a byte is shifting
        const REQUEST = 1 << 1;
    }
}

/// Protocol sequencer state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub enum SequencerState {
    Reset,
    Noop,
    TxBegin,
    TxByte,
    TxInter1,
    TxInterN,
    TxEnd,
}

/// Drive operation reported in byte 0 of the status packet
///
/// Concrete byte values follow the public Saturn CDD protocol notes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
#[repr(u8)]
pub enum Operation {
    Zero = 0x00,
    ReadTOC = 0x34,
    Stopped = 0x12,
    Seek = 0x22,
    Unknown = 0x30,
    ReadAudioSector = 0x74,
    ReadDataSector = 0x36,
    Idle = 0x46,
    TrayOpen = 0x80,
    NoDisc = 0x83,
    SeekSecurityRingB2 = 0xB2,
    SeekSecurityRingB6 = 0xB6,
}

/// Disc read speed selected by the last ReadSector command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub enum ReadSpeed {
    /// 1x: 75 sectors per second
    Single,
    /// 2x: 150 sectors per second
    Double,
}

impl ReadSpeed {
    /// Cycles between sector deliveries at this speed
    pub fn sector_period(self) -> Cycles {
        match self {
            ReadSpeed::Single => CYCLES_PER_DISC_FRAME,
            ReadSpeed::Double => CYCLES_PER_DISC_FRAME / 2,
        }
    }
}

/// Activity of the transport (sled/pickup) chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub enum Transport {
    /// No motion in progress
    Inactive,
    /// Stepping toward `target_fad`
    Seek,
    /// Stepping toward the security ring
    RingSeek,
    /// Reading the lead-in TOC
    Toc { remaining: u8 },
    /// Coarse scan, direction given
    Scan { forwards: bool },
}

/// CD drive mechanism and protocol engine
///
/// Owns the serial sequencer state, both packet buffers and the transport
/// position. All mutation happens inside the three scheduler callbacks
/// ([`CdDrive::sequencer_step`], [`CdDrive::transport_tick`],
/// [`CdDrive::read_tick`]); nothing here polls.
pub struct CdDrive {
    /// Sequencer state
    pub(super) state: SequencerState,
    /// Inbound command packet, assembled one bit per TxByte firing
    pub(super) command: [u8; PACKET_LEN],
    /// Next inbound bit position (0..104)
    pub(super) command_bit: u8,
    /// Outbound status packet, shifted out one bit per TxByte firing
    pub(super) status: [u8; PACKET_LEN],
    /// Next outbound bit position (0..104)
    pub(super) status_bit: u8,
    /// Pickup position
    pub(super) current_fad: u32,
    /// Seek/read destination
    pub(super) target_fad: u32,
    /// Operation code for the next status packet
    pub(super) operation: Operation,
    /// Selected read speed
    pub(super) read_speed: ReadSpeed,
    /// Transport chain activity
    pub(super) transport: Transport,
    /// A ReadSector is waiting for its seek to land
    pub(super) pending_read: bool,
    /// Sector delivery chain is running
    pub(super) reading: bool,
    /// Current control line levels
    pub(super) lines: ControlLines,
    /// Tray state
    pub(super) tray_open: bool,
    /// Inserted disc, if any
    pub(super) disc: Option<Disc>,
    /// Scratch sector buffer for the read chain
    sector_buf: Box<[u8; SECTOR_LEN]>,
    /// Scheduler handle of the sequencer event
    pub(super) sequencer_event: Option<EventId>,
    /// Scheduler handle of the transport chain, while live
    pub(super) transport_event: Option<EventId>,
    /// Scheduler handle of the read chain, while live
    pub(super) read_event: Option<EventId>,
}

impl CdDrive {
    /// Create a drive in the powered-on Reset state with no disc
    pub fn new() -> Self {
        Self {
            state: SequencerState::Reset,
            command: [0; PACKET_LEN],
            command_bit: 0,
            status: [0; PACKET_LEN],
            status_bit: 0,
            current_fad: disc::PREGAP_FADS,
            target_fad: disc::PREGAP_FADS,
            operation: Operation::NoDisc,
            read_speed: ReadSpeed::Single,
            transport: Transport::Inactive,
            pending_read: false,
            reading: false,
            lines: ControlLines::empty(),
            tray_open: false,
            disc: None,
            sector_buf: Box::new([0; SECTOR_LEN]),
            sequencer_event: None,
            transport_event: None,
            read_event: None,
        }
    }

    /// Register the sequencer with the scheduler
    ///
    /// Called once at system construction; the sequencer event then lives
    /// for the whole session, re-arming itself after every firing.
    pub fn register_events(&mut self, sched: &mut Scheduler) {
        self.sequencer_event = Some(sched.register_event(0, EventTag::CddSequencer));
    }

    /// Insert a disc; the drive spins up into Idle
    pub fn insert_disc(&mut self, disc: Disc) {
        self.disc = Some(disc);
        self.tray_open = false;
        self.operation = Operation::Idle;
        log::info!("CDD: disc inserted");
    }

    /// Open or close the tray
    pub fn set_tray_open(&mut self, open: bool) {
        self.tray_open = open;
        if open {
            self.operation = Operation::TrayOpen;
        } else if self.disc.is_some() {
            self.operation = Operation::Idle;
        } else {
            self.operation = Operation::NoDisc;
        }
    }

    /// True when a disc is inserted
    pub fn has_disc(&self) -> bool {
        self.disc.is_some()
    }

    /// Current pickup position
    pub fn current_fad(&self) -> u32 {
        self.current_fad
    }

    /// Current seek/read destination
    pub fn target_fad(&self) -> u32 {
        self.target_fad
    }

    /// Operation code of the next status packet
    pub fn operation(&self) -> Operation {
        self.operation
    }

    /// Outbound status packet as last encoded
    pub fn status_packet(&self) -> &[u8; PACKET_LEN] {
        &self.status
    }

    /// One sequencer firing; returns the delay until the next state
    ///
    /// This is the `EventTag::CddSequencer` handler. The sequencer is never
    /// removed, so the return value always re-arms it.
    pub fn sequencer_step(&mut self, sched: &mut Scheduler, host: &mut dyn CddHost) -> Cycles {
        match self.state {
            SequencerState::Reset => {
                self.set_lines(host, ControlLines::empty());
                self.command = [0; PACKET_LEN];
                self.status = [0; PACKET_LEN];
                self.command_bit = 0;
                self.status_bit = 0;
                self.state = SequencerState::Noop;
                RESET_CYCLES
            }
            SequencerState::Noop => {
                self.command_bit = 0;
                self.status_bit = 0;
                self.state = SequencerState::TxBegin;
                NOOP_CYCLES
            }
            SequencerState::TxBegin => {
                self.set_lines(host, ControlLines::FRAME_SYNC);
                self.state = SequencerState::TxByte;
                BEGIN_CYCLES
            }
            SequencerState::TxByte => {
                self.set_lines(host, ControlLines::REQUEST);
                self.transfer_bit(host);

                if self.command_bit == PACKET_BITS {
                    self.state = SequencerState::TxEnd;
                } else if self.command_bit % 8 == 0 {
                    self.state = if self.command_bit == 8 {
                        SequencerState::TxInter1
                    } else {
                        SequencerState::TxInterN
                    };
                }
                BIT_CYCLES
            }
            SequencerState::TxInter1 => {
                self.set_lines(host, ControlLines::FRAME_SYNC);
                self.state = SequencerState::TxByte;
                INTER_FIRST_CYCLES
            }
            SequencerState::TxInterN => {
                self.set_lines(host, ControlLines::FRAME_SYNC);
                self.state = SequencerState::TxByte;
                INTER_NEXT_CYCLES
            }
            SequencerState::TxEnd => {
                self.set_lines(host, ControlLines::empty());

                let command = Command::decode(&self.command);
                self.execute_command(sched, command);
                self.build_status();

                self.command_bit = 0;
                self.status_bit = 0;
                self.state = SequencerState::Noop;
                END_CYCLES
            }
        }
    }

    /// One transport firing; `None` means the chain is finished
    ///
    /// This is the `EventTag::CddTransport` handler: seek/ring-seek steps,
    /// TOC passes and scan jumps all run here, one tick per disc frame.
    pub fn transport_tick(&mut self, sched: &mut Scheduler) -> Option<Cycles> {
        match self.transport {
            Transport::Seek | Transport::RingSeek => {
                self.step_toward_target();
                if self.current_fad == self.target_fad {
                    self.finish_seek(sched);
                    None
                } else {
                    Some(TRANSPORT_TICK_CYCLES)
                }
            }
            Transport::Toc { remaining } => {
                if self.current_fad != self.target_fad {
                    // Still traveling to the lead-in; the TOC passes only
                    // count down once the sled arrives.
                    self.step_toward_target();
                    Some(TRANSPORT_TICK_CYCLES)
                } else if remaining <= 1 {
                    log::debug!("CDD: TOC read complete");
                    self.transport = Transport::Inactive;
                    self.transport_event = None;
                    self.operation = Operation::Idle;
                    None
                } else {
                    self.transport = Transport::Toc {
                        remaining: remaining - 1,
                    };
                    Some(TRANSPORT_TICK_CYCLES)
                }
            }
            Transport::Scan { forwards } => {
                let leadout = self.disc.as_ref().map_or(disc::PREGAP_FADS, Disc::leadout_fad);
                self.current_fad = if forwards {
                    (self.current_fad + SCAN_STEP_FADS).min(leadout.saturating_sub(1))
                } else {
                    self.current_fad
                        .saturating_sub(SCAN_STEP_FADS)
                        .max(disc::PREGAP_FADS)
                };
                Some(TRANSPORT_TICK_CYCLES)
            }
            Transport::Inactive => {
                debug_assert!(false, "transport tick with no motion in progress");
                self.transport_event = None;
                None
            }
        }
    }

    /// One read-chain firing; `None` means the chain is finished
    ///
    /// This is the `EventTag::CddRead` handler: deliver the sector under
    /// the pickup and advance one FAD.
    pub fn read_tick(&mut self, host: &mut dyn CddHost) -> Option<Cycles> {
        let Some(disc) = self.disc.as_ref() else {
            self.reading = false;
            self.read_event = None;
            return None;
        };

        let Some(track) = disc.track_at(self.current_fad) else {
            // Ran off the program area; the drive pauses at the lead-out.
            log::debug!("CDD: read reached lead-out at FAD {}", self.current_fad);
            self.reading = false;
            self.read_event = None;
            self.operation = Operation::Idle;
            return None;
        };

        disc.fill_sector(self.current_fad, &mut self.sector_buf);
        match track.kind {
            TrackKind::Data => {
                self.operation = Operation::ReadDataSector;
                host.deliver_data_sector(self.current_fad, &self.sector_buf);
            }
            TrackKind::Audio => {
                self.operation = Operation::ReadAudioSector;
                let fill = host.deliver_audio_sector(self.current_fad, &self.sector_buf);
                log::trace!("CDD: CDDA sector {} delivered, fill {}", self.current_fad, fill);
            }
        }

        self.current_fad += 1;
        Some(self.read_speed.sector_period())
    }

    /// Shift one bit in each direction and advance both indices
    fn transfer_bit(&mut self, host: &mut dyn CddHost) {
        debug_assert!(self.command_bit < PACKET_BITS);
        debug_assert!(self.status_bit < PACKET_BITS);

        // Bits shift MSB-first within each byte.
        let byte = usize::from(self.command_bit / 8);
        let shift = 7 - (self.command_bit % 8);
        if host.serial_read() {
            self.command[byte] |= 1 << shift;
        } else {
            self.command[byte] &= !(1 << shift);
        }
        self.command_bit += 1;

        let byte = usize::from(self.status_bit / 8);
        let shift = 7 - (self.status_bit % 8);
        host.serial_write(self.status[byte] & (1 << shift) != 0);
        self.status_bit += 1;
    }

    /// Apply a control line pattern, invoking callbacks only on changes
    fn set_lines(&mut self, host: &mut dyn CddHost, lines: ControlLines) {
        // Half-duplex link: the two lines are never asserted together.
        debug_assert!(!lines.contains(ControlLines::FRAME_SYNC | ControlLines::REQUEST));

        let changed = self.lines ^ lines;
        if changed.contains(ControlLines::FRAME_SYNC) {
            host.set_frame_sync(lines.contains(ControlLines::FRAME_SYNC));
        }
        if changed.contains(ControlLines::REQUEST) {
            host.set_request(lines.contains(ControlLines::REQUEST));
        }
        self.lines = lines;
    }

    /// Move the pickup one seek step toward `target_fad`
    fn step_toward_target(&mut self) {
        if self.current_fad < self.target_fad {
            self.current_fad = (self.current_fad + SEEK_STEP_FADS).min(self.target_fad);
        } else {
            self.current_fad = self
                .current_fad
                .saturating_sub(SEEK_STEP_FADS)
                .max(self.target_fad);
        }
    }

    /// Seek arrival: settle the operation code and start a pending read
    fn finish_seek(&mut self, sched: &mut Scheduler) {
        log::debug!("CDD: seek complete at FAD {}", self.current_fad);
        let was_ring = self.transport == Transport::RingSeek;
        self.transport = Transport::Inactive;
        self.transport_event = None;

        if was_ring {
            // Operation keeps the ring code set at command time.
            return;
        }

        if self.pending_read {
            self.pending_read = false;
            self.start_reading(sched);
        } else {
            self.operation = Operation::Idle;
        }
    }

    /// Start the sector delivery chain at the current position
    fn start_reading(&mut self, sched: &mut Scheduler) {
        if let Some(id) = self.read_event.take() {
            sched.cancel(id);
        }
        self.reading = true;
        self.operation = match self
            .disc
            .as_ref()
            .and_then(|d| d.track_at(self.current_fad))
            .map(|t| t.kind)
        {
            Some(TrackKind::Audio) => Operation::ReadAudioSector,
            _ => Operation::ReadDataSector,
        };
        self.read_event =
            Some(sched.register_event(self.read_speed.sector_period(), EventTag::CddRead));
    }

    /// Begin a transport chain, replacing any motion in progress
    fn start_transport(&mut self, sched: &mut Scheduler, transport: Transport) {
        if let Some(id) = self.transport_event.take() {
            sched.cancel(id);
        }
        self.transport = transport;
        self.transport_event =
            Some(sched.register_event(TRANSPORT_TICK_CYCLES, EventTag::CddTransport));
    }

    /// Stop the sector delivery chain if it is running
    fn stop_reading(&mut self, sched: &mut Scheduler) {
        if let Some(id) = self.read_event.take() {
            sched.cancel(id);
        }
        self.reading = false;
    }

    /// Stop any transport motion in progress
    fn stop_transport(&mut self, sched: &mut Scheduler) {
        if let Some(id) = self.transport_event.take() {
            sched.cancel(id);
        }
        self.transport = Transport::Inactive;
    }

    /// Re-bind the sequencer handle after savestate restoration
    pub(super) fn bind_sequencer_event(&mut self, id: EventId) {
        self.sequencer_event = Some(id);
    }

    /// Re-bind the transport handle after savestate restoration
    pub(super) fn bind_transport_event(&mut self, id: Option<EventId>) {
        self.transport_event = id;
    }

    /// Re-bind the read handle after savestate restoration
    pub(super) fn bind_read_event(&mut self, id: Option<EventId>) {
        self.read_event = id;
    }
}

impl Default for CdDrive {
    fn default() -> Self {
        Self::new()
    }
}

impl StateSave for CdDrive {
    type State = CddState;

    fn to_state(&self) -> CddState {
        CddState {
            state: self.state,
            command: self.command,
            command_bit: self.command_bit,
            status: self.status,
            status_bit: self.status_bit,
            current_fad: self.current_fad,
            target_fad: self.target_fad,
            operation: self.operation,
            read_speed: self.read_speed,
            transport: self.transport,
            pending_read: self.pending_read,
            reading: self.reading,
            lines: self.lines.bits(),
            tray_open: self.tray_open,
            disc: self.disc.clone(),
        }
    }

    fn restore_from_state(&mut self, state: &CddState) {
        self.state = state.state;
        self.command = state.command;
        self.command_bit = state.command_bit;
        self.status = state.status;
        self.status_bit = state.status_bit;
        self.current_fad = state.current_fad;
        self.target_fad = state.target_fad;
        self.operation = state.operation;
        self.read_speed = state.read_speed;
        self.transport = state.transport;
        self.pending_read = state.pending_read;
        self.reading = state.reading;
        self.lines = ControlLines::from_bits_truncate(state.lines);
        self.tray_open = state.tray_open;
        self.disc = state.disc.clone();
        // Event handles are re-bound by the system after the scheduler
        // itself is restored.
        self.sequencer_event = None;
        self.transport_event = None;
        self.read_event = None;
    }
}
