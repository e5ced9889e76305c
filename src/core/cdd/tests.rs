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

//! Tests for CD drive emulation

use super::*;
use crate::core::system::CdBlockLink;

/// Drive with a dummy disc, stepped out of Reset into Noop
fn new_idle_drive() -> (CdDrive, Scheduler, CdBlockLink) {
    let mut sched = Scheduler::new();
    let mut drive = CdDrive::new();
    drive.register_events(&mut sched);
    drive.insert_disc(Disc::new_dummy());
    let mut host = CdBlockLink::new();
    drive.sequencer_step(&mut sched, &mut host);
    assert_eq!(drive.state, SequencerState::Noop);
    (drive, sched, host)
}

/// Drive one full exchange starting from Noop
///
/// Returns the number of TxByte and TxEnd firings observed. Leaves the
/// sequencer back in Noop.
fn run_exchange(
    drive: &mut CdDrive,
    sched: &mut Scheduler,
    host: &mut CdBlockLink,
) -> (usize, usize) {
    assert_eq!(drive.state, SequencerState::Noop);
    let mut txbyte = 0;
    let mut txend = 0;
    loop {
        let firing = drive.state;
        drive.sequencer_step(sched, host);
        match firing {
            SequencerState::TxByte => txbyte += 1,
            SequencerState::TxEnd => {
                txend += 1;
                break;
            }
            _ => {}
        }
    }
    (txbyte, txend)
}

/// Queue a command and drive the exchange that carries it
fn send_command(
    drive: &mut CdDrive,
    sched: &mut Scheduler,
    host: &mut CdBlockLink,
    packet: &[u8; PACKET_LEN],
) {
    host.queue_command(packet);
    run_exchange(drive, sched, host);
}

#[test]
fn test_drive_initialization() {
    let drive = CdDrive::new();
    assert_eq!(drive.state, SequencerState::Reset);
    assert!(!drive.has_disc());
    assert_eq!(drive.operation(), Operation::NoDisc);
    assert_eq!(drive.current_fad(), disc::PREGAP_FADS);
    assert!(drive.lines.is_empty());
}

#[test]
fn test_reset_clears_counters() {
    let mut sched = Scheduler::new();
    let mut drive = CdDrive::new();
    drive.register_events(&mut sched);
    let mut host = CdBlockLink::new();

    drive.command_bit = 57;
    drive.status_bit = 57;
    drive.sequencer_step(&mut sched, &mut host);

    assert_eq!(drive.state, SequencerState::Noop);
    assert_eq!(drive.command_bit, 0);
    assert_eq!(drive.status_bit, 0);
    assert!(drive.lines.is_empty());
}

#[test]
fn test_exchange_framing() {
    // 13 bytes x 8 bits: exactly 104 TxByte firings, then TxEnd once.
    let (mut drive, mut sched, mut host) = new_idle_drive();
    let (txbyte, txend) = run_exchange(&mut drive, &mut sched, &mut host);
    assert_eq!(txbyte, 104);
    assert_eq!(txend, 1);
    assert_eq!(drive.state, SequencerState::Noop);
    assert_eq!(drive.command_bit, 0);
    assert_eq!(drive.status_bit, 0);
}

#[test]
fn test_bit_indices_stay_in_range() {
    let (mut drive, mut sched, mut host) = new_idle_drive();
    loop {
        assert!(drive.command_bit < PACKET_BITS + 1);
        assert!(drive.status_bit < PACKET_BITS + 1);
        if drive.state == SequencerState::TxByte {
            // Before a transfer both indices must be in packet range.
            assert!(drive.command_bit < PACKET_BITS);
            assert!(drive.status_bit < PACKET_BITS);
        }
        let firing = drive.state;
        drive.sequencer_step(&mut sched, &mut host);
        if firing == SequencerState::TxEnd {
            break;
        }
    }
    assert_eq!(drive.command_bit, 0);
    assert_eq!(drive.status_bit, 0);
}

#[test]
fn test_half_duplex_line_discipline() {
    // Outside Reset/Noop exactly one control line is asserted; the two
    // are never high together.
    let (mut drive, mut sched, mut host) = new_idle_drive();
    loop {
        let firing = drive.state;
        drive.sequencer_step(&mut sched, &mut host);
        assert!(!(host.frame_sync() && host.request()));
        match drive.state {
            SequencerState::TxByte => {
                assert!(host.frame_sync() || host.request());
            }
            SequencerState::TxInter1 | SequencerState::TxInterN => {
                assert!(host.request());
            }
            _ => {}
        }
        if firing == SequencerState::TxEnd {
            assert!(!host.frame_sync() && !host.request());
            break;
        }
    }
}

#[test]
fn test_status_shifted_out_matches_packet() {
    let (mut drive, mut sched, mut host) = new_idle_drive();
    drive.build_status();
    let expected = *drive.status_packet();

    run_exchange(&mut drive, &mut sched, &mut host);
    let received = host.take_status().expect("status packet assembled");
    assert_eq!(received, expected);
}

#[test]
fn test_encode_decode_command() {
    let packet = encode_command(CommandOpcode::ReadSector, 0x001000, ReadSpeed::Single);
    let command = Command::decode(&packet);
    assert_eq!(command.opcode, Some(CommandOpcode::ReadSector));
    assert_eq!(command.fad, 0x001000);
    assert_eq!(command.read_speed, ReadSpeed::Single);
    assert!(command.parity_ok);
}

#[test]
fn test_decode_read_speed() {
    let packet = encode_command(CommandOpcode::ReadSector, 0x2000, ReadSpeed::Double);
    let command = Command::decode(&packet);
    assert_eq!(command.read_speed, ReadSpeed::Double);
}

#[test]
fn test_packet_checksum() {
    let mut packet = [0u8; PACKET_LEN];
    packet[0] = 0x06;
    packet[3] = 0x10;
    assert_eq!(packet_checksum(&packet), !(0x06u8.wrapping_add(0x10)));
}

#[test]
fn test_parity_mismatch_is_ignored() {
    let (mut drive, mut sched, mut host) = new_idle_drive();
    let before = drive.operation();

    let mut packet = encode_command(CommandOpcode::Stop, 0, ReadSpeed::Single);
    packet[11] ^= 0xFF;
    send_command(&mut drive, &mut sched, &mut host, &packet);

    assert_eq!(drive.operation(), before);
    assert_eq!(drive.transport, Transport::Inactive);
}

#[test]
fn test_unknown_opcode() {
    let (mut drive, mut sched, mut host) = new_idle_drive();
    let mut packet = [0u8; PACKET_LEN];
    packet[0] = 0x7;
    packet[11] = packet_checksum(&packet);
    send_command(&mut drive, &mut sched, &mut host, &packet);
    assert_eq!(drive.operation(), Operation::Unknown);
}

#[test]
fn test_read_sector_sets_target_and_operation() {
    // FAD 0x001000 lands in the dummy disc's data track, so the very
    // next status packet must already carry ReadDataSector.
    let (mut drive, mut sched, mut host) = new_idle_drive();
    let packet = encode_command(CommandOpcode::ReadSector, 0x001000, ReadSpeed::Single);
    send_command(&mut drive, &mut sched, &mut host, &packet);

    assert_eq!(drive.target_fad(), 0x001000);
    assert_eq!(drive.operation(), Operation::ReadDataSector);

    let status = drive.status_packet();
    assert_eq!(status[0], Operation::ReadDataSector as u8);
    assert_eq!(status[11], packet_checksum(status));
}

#[test]
fn test_read_sector_audio_track() {
    let (mut drive, mut sched, mut host) = new_idle_drive();
    let packet = encode_command(CommandOpcode::ReadSector, 76_000, ReadSpeed::Single);
    send_command(&mut drive, &mut sched, &mut host, &packet);
    assert_eq!(drive.operation(), Operation::ReadAudioSector);
}

#[test]
fn test_seek_then_read_chain() {
    let (mut drive, mut sched, mut host) = new_idle_drive();
    let packet = encode_command(CommandOpcode::ReadSector, 10_000, ReadSpeed::Single);
    send_command(&mut drive, &mut sched, &mut host, &packet);

    assert_eq!(drive.transport, Transport::Seek);
    assert!(drive.pending_read);
    assert!(drive.transport_event.is_some());

    // Step the transport until the seek lands.
    let mut ticks = 0;
    while drive.transport_tick(&mut sched).is_some() {
        ticks += 1;
        assert!(ticks < 100, "seek never completed");
    }
    assert_eq!(drive.current_fad(), 10_000);
    assert!(!drive.pending_read);
    assert!(drive.reading);
    assert!(drive.read_event.is_some());

    // The read chain now delivers sectors and advances the pickup.
    assert!(drive.read_tick(&mut host).is_some());
    assert_eq!(host.data_sectors(), 1);
    assert_eq!(host.last_sector_fad(), Some(10_000));
    assert_eq!(drive.current_fad(), 10_001);
}

#[test]
fn test_read_at_current_position_starts_immediately() {
    let (mut drive, mut sched, mut host) = new_idle_drive();
    let fad = drive.current_fad();
    let packet = encode_command(CommandOpcode::ReadSector, fad, ReadSpeed::Single);
    send_command(&mut drive, &mut sched, &mut host, &packet);

    assert_eq!(drive.transport, Transport::Inactive);
    assert!(drive.reading);
    assert!(drive.read_event.is_some());
}

#[test]
fn test_read_stops_at_leadout() {
    let (mut drive, mut sched, mut host) = new_idle_drive();
    let leadout = drive.disc.as_ref().unwrap().leadout_fad();
    let packet = encode_command(CommandOpcode::ReadSector, leadout - 1, ReadSpeed::Single);
    send_command(&mut drive, &mut sched, &mut host, &packet);

    while drive.transport_tick(&mut sched).is_some() {}
    assert!(drive.read_tick(&mut host).is_some());
    // Next tick is past the program area: the chain ends.
    assert!(drive.read_tick(&mut host).is_none());
    assert!(!drive.reading);
    assert_eq!(drive.operation(), Operation::Idle);
}

#[test]
fn test_seek_sector_command() {
    let (mut drive, mut sched, mut host) = new_idle_drive();
    let packet = encode_command(CommandOpcode::SeekSector, 30_000, ReadSpeed::Single);
    send_command(&mut drive, &mut sched, &mut host, &packet);

    assert_eq!(drive.target_fad(), 30_000);
    assert_eq!(drive.operation(), Operation::Seek);
    assert_eq!(drive.transport, Transport::Seek);

    while drive.transport_tick(&mut sched).is_some() {}
    assert_eq!(drive.current_fad(), 30_000);
    assert_eq!(drive.operation(), Operation::Idle);
    assert!(!drive.reading);
}

#[test]
fn test_seek_past_leadout_clamps_to_disc_edge() {
    // The wire format carries any 24-bit FAD; an out-of-range command
    // must not drag the pickup past the lead-out (or past the BCD range
    // of the status timecode fields).
    let (mut drive, mut sched, mut host) = new_idle_drive();
    let leadout = drive.disc.as_ref().unwrap().leadout_fad();
    let packet = encode_command(CommandOpcode::SeekSector, 500_000, ReadSpeed::Single);
    send_command(&mut drive, &mut sched, &mut host, &packet);

    assert_eq!(drive.target_fad(), leadout);
    while drive.transport_tick(&mut sched).is_some() {}
    assert_eq!(drive.current_fad(), leadout);

    drive.build_status();
    let status = drive.status_packet();
    assert_eq!(status[2], 0xAA);
    let (min, sec, frac) = fad_to_msf(leadout);
    assert_eq!(status[8], dec_to_bcd(min));
    assert_eq!(status[9], dec_to_bcd(sec));
    assert_eq!(status[10], dec_to_bcd(frac));
}

#[test]
fn test_read_past_leadout_clamps_target() {
    let (mut drive, mut sched, mut host) = new_idle_drive();
    let leadout = drive.disc.as_ref().unwrap().leadout_fad();
    let packet = encode_command(CommandOpcode::ReadSector, 0xFFFFFF, ReadSpeed::Single);
    send_command(&mut drive, &mut sched, &mut host, &packet);

    assert_eq!(drive.target_fad(), leadout);
    while drive.transport_tick(&mut sched).is_some() {}
    // The clamped position is already in the lead-out; the read chain
    // ends on its first tick.
    assert!(drive.read_tick(&mut host).is_none());
    assert_eq!(drive.operation(), Operation::Idle);
}

#[test]
fn test_seek_moves_in_bounded_steps() {
    let (mut drive, mut sched, mut host) = new_idle_drive();
    let start = drive.current_fad();
    let packet = encode_command(CommandOpcode::SeekSector, start + 40_000, ReadSpeed::Single);
    send_command(&mut drive, &mut sched, &mut host, &packet);

    let before = drive.current_fad();
    let _ = drive.transport_tick(&mut sched);
    let after = drive.current_fad();
    assert_eq!(after - before, SEEK_STEP_FADS);
}

#[test]
fn test_seek_ring_command() {
    let (mut drive, mut sched, mut host) = new_idle_drive();
    let mut packet = encode_command(CommandOpcode::SeekRing, 0, ReadSpeed::Single);
    packet[1] = 0xB6;
    packet[11] = packet_checksum(&packet);
    send_command(&mut drive, &mut sched, &mut host, &packet);

    assert_eq!(drive.operation(), Operation::SeekSecurityRingB6);
    assert_eq!(drive.target_fad(), SECURITY_RING_FAD);
    assert_eq!(drive.transport, Transport::RingSeek);

    while drive.transport_tick(&mut sched).is_some() {}
    assert_eq!(drive.current_fad(), SECURITY_RING_FAD);
    // Ring seeks keep reporting the ring operation after arrival.
    assert_eq!(drive.operation(), Operation::SeekSecurityRingB6);
}

#[test]
fn test_read_toc_command() {
    let (mut drive, mut sched, mut host) = new_idle_drive();
    let packet = encode_command(CommandOpcode::ReadTOC, 0, ReadSpeed::Single);
    send_command(&mut drive, &mut sched, &mut host, &packet);

    assert_eq!(drive.operation(), Operation::ReadTOC);
    assert_eq!(drive.transport, Transport::Toc { remaining: TOC_TICKS });

    let mut ticks = 0;
    loop {
        ticks += 1;
        if drive.transport_tick(&mut sched).is_none() {
            break;
        }
    }
    assert_eq!(ticks, usize::from(TOC_TICKS));
    assert_eq!(drive.operation(), Operation::Idle);
}

#[test]
fn test_read_toc_travels_back_through_transport() {
    // A TOC read away from the lead-in repositions the sled through the
    // normal incremental seek motion, not instantaneously.
    let (mut drive, mut sched, mut host) = new_idle_drive();
    let seek = encode_command(CommandOpcode::SeekSector, 30_000, ReadSpeed::Single);
    send_command(&mut drive, &mut sched, &mut host, &seek);
    while drive.transport_tick(&mut sched).is_some() {}
    assert_eq!(drive.current_fad(), 30_000);

    let toc = encode_command(CommandOpcode::ReadTOC, 0, ReadSpeed::Single);
    send_command(&mut drive, &mut sched, &mut host, &toc);
    assert_eq!(drive.current_fad(), 30_000);
    assert_eq!(drive.target_fad(), disc::PREGAP_FADS);

    let _ = drive.transport_tick(&mut sched);
    assert_eq!(drive.current_fad(), 30_000 - SEEK_STEP_FADS);

    let mut ticks = 1;
    loop {
        ticks += 1;
        if drive.transport_tick(&mut sched).is_none() {
            break;
        }
    }
    assert_eq!(drive.current_fad(), disc::PREGAP_FADS);
    assert_eq!(drive.operation(), Operation::Idle);
    // 20 travel ticks from FAD 30_000, then the TOC passes.
    assert_eq!(ticks, 20 + usize::from(TOC_TICKS));
}

#[test]
fn test_stop_command() {
    let (mut drive, mut sched, mut host) = new_idle_drive();
    let read = encode_command(CommandOpcode::ReadSector, 10_000, ReadSpeed::Single);
    send_command(&mut drive, &mut sched, &mut host, &read);

    let stop = encode_command(CommandOpcode::Stop, 0, ReadSpeed::Single);
    send_command(&mut drive, &mut sched, &mut host, &stop);

    assert_eq!(drive.operation(), Operation::Stopped);
    assert_eq!(drive.transport, Transport::Inactive);
    assert!(!drive.reading);
    assert!(!drive.pending_read);
    assert!(drive.transport_event.is_none());
    assert!(drive.read_event.is_none());
}

#[test]
fn test_pause_command() {
    let (mut drive, mut sched, mut host) = new_idle_drive();
    let fad = drive.current_fad();
    let read = encode_command(CommandOpcode::ReadSector, fad, ReadSpeed::Single);
    send_command(&mut drive, &mut sched, &mut host, &read);
    let _ = drive.read_tick(&mut host);

    let pause = encode_command(CommandOpcode::Pause, 0, ReadSpeed::Single);
    send_command(&mut drive, &mut sched, &mut host, &pause);

    assert_eq!(drive.operation(), Operation::Idle);
    assert!(!drive.reading);
    // Pause keeps the position reached so far.
    assert_eq!(drive.current_fad(), fad + 1);
}

#[test]
fn test_scan_commands_move_incrementally() {
    let (mut drive, mut sched, mut host) = new_idle_drive();
    let packet = encode_command(CommandOpcode::SeekSector, 40_000, ReadSpeed::Single);
    send_command(&mut drive, &mut sched, &mut host, &packet);
    while drive.transport_tick(&mut sched).is_some() {}

    let forward = encode_command(CommandOpcode::ScanForwards, 0, ReadSpeed::Single);
    send_command(&mut drive, &mut sched, &mut host, &forward);
    assert_eq!(drive.transport, Transport::Scan { forwards: true });
    let _ = drive.transport_tick(&mut sched);
    assert_eq!(drive.current_fad(), 40_000 + SCAN_STEP_FADS);
    let _ = drive.transport_tick(&mut sched);
    assert_eq!(drive.current_fad(), 40_000 + 2 * SCAN_STEP_FADS);

    let backward = encode_command(CommandOpcode::ScanBackwards, 0, ReadSpeed::Single);
    send_command(&mut drive, &mut sched, &mut host, &backward);
    let _ = drive.transport_tick(&mut sched);
    assert_eq!(drive.current_fad(), 40_000 + SCAN_STEP_FADS);
}

#[test]
fn test_tray_open_reports_in_status() {
    let (mut drive, mut sched, mut host) = new_idle_drive();
    drive.set_tray_open(true);
    let packet = encode_command(CommandOpcode::ReadSector, 0x1000, ReadSpeed::Single);
    send_command(&mut drive, &mut sched, &mut host, &packet);
    assert_eq!(drive.operation(), Operation::TrayOpen);
    assert_eq!(drive.status_packet()[0], Operation::TrayOpen as u8);
}

#[test]
fn test_no_disc_rejects_reads() {
    let mut sched = Scheduler::new();
    let mut drive = CdDrive::new();
    drive.register_events(&mut sched);
    let mut host = CdBlockLink::new();
    drive.sequencer_step(&mut sched, &mut host);

    let packet = encode_command(CommandOpcode::ReadSector, 0x1000, ReadSpeed::Single);
    send_command(&mut drive, &mut sched, &mut host, &packet);
    assert_eq!(drive.operation(), Operation::NoDisc);
    assert_eq!(drive.transport, Transport::Inactive);
}

#[test]
fn test_sector_period_by_speed() {
    assert_eq!(
        ReadSpeed::Single.sector_period(),
        2 * ReadSpeed::Double.sector_period()
    );
    assert_eq!(ReadSpeed::Single.sector_period(), CYCLES_PER_DISC_FRAME);
}

#[test]
fn test_status_track_fields() {
    let (mut drive, mut sched, mut host) = new_idle_drive();
    let packet = encode_command(CommandOpcode::SeekSector, 76_000, ReadSpeed::Single);
    send_command(&mut drive, &mut sched, &mut host, &packet);
    while drive.transport_tick(&mut sched).is_some() {}
    drive.build_status();

    let status = drive.status_packet();
    // FAD 76_000 is inside the dummy disc's audio track 2.
    assert_eq!(status[1], 0x01);
    assert_eq!(status[2], dec_to_bcd(2));
    let (min, sec, frac) = fad_to_msf(76_000);
    assert_eq!(status[8], dec_to_bcd(min));
    assert_eq!(status[9], dec_to_bcd(sec));
    assert_eq!(status[10], dec_to_bcd(frac));
    assert_eq!(status[11], packet_checksum(status));
}

#[test]
fn test_bcd_helpers() {
    assert_eq!(dec_to_bcd(0), 0x00);
    assert_eq!(dec_to_bcd(59), 0x59);
    assert_eq!(bcd_to_dec(0x59), 59);
    assert_eq!(bcd_to_dec(dec_to_bcd(42)), 42);
}

#[test]
fn test_fad_to_msf() {
    assert_eq!(fad_to_msf(0), (0, 0, 0));
    assert_eq!(fad_to_msf(75), (0, 1, 0));
    assert_eq!(fad_to_msf(150), (0, 2, 0));
    assert_eq!(fad_to_msf(60 * 75 + 2 * 75 + 3), (1, 2, 3));
}

#[test]
fn test_disc_track_lookup() {
    let disc = Disc::new_dummy();
    assert_eq!(disc.track_at(150).unwrap().number, 1);
    assert_eq!(disc.track_at(74_999).unwrap().number, 1);
    assert_eq!(disc.track_at(75_000).unwrap().number, 2);
    assert!(disc.track_at(disc.leadout_fad()).is_none());
    assert!(disc.track_at(0).is_none());
}

#[test]
fn test_fill_sector_header() {
    let disc = Disc::new_dummy();
    let mut buf = [0u8; SECTOR_LEN];
    disc.fill_sector(1_000, &mut buf);

    // Mode 1 sync pattern
    assert_eq!(buf[0], 0x00);
    assert_eq!(&buf[1..11], &[0xFF; 10]);
    assert_eq!(buf[11], 0x00);

    let (min, sec, frac) = fad_to_msf(1_000);
    assert_eq!(buf[12], dec_to_bcd(min));
    assert_eq!(buf[13], dec_to_bcd(sec));
    assert_eq!(buf[14], dec_to_bcd(frac));
    assert_eq!(buf[15], 0x01);
}

#[test]
fn test_state_roundtrip() {
    let (mut drive, mut sched, mut host) = new_idle_drive();
    let packet = encode_command(CommandOpcode::ReadSector, 20_000, ReadSpeed::Double);
    send_command(&mut drive, &mut sched, &mut host, &packet);
    let _ = drive.transport_tick(&mut sched);

    let state = drive.to_state();
    let mut restored = CdDrive::new();
    restored.restore_from_state(&state);

    assert_eq!(restored.state, drive.state);
    assert_eq!(restored.command, drive.command);
    assert_eq!(restored.status, drive.status);
    assert_eq!(restored.current_fad, drive.current_fad);
    assert_eq!(restored.target_fad, drive.target_fad);
    assert_eq!(restored.operation, drive.operation);
    assert_eq!(restored.read_speed, drive.read_speed);
    assert_eq!(restored.transport, drive.transport);
    assert_eq!(restored.pending_read, drive.pending_read);
    assert_eq!(restored.lines, drive.lines);
    assert_eq!(restored.disc, drive.disc);
    // Event handles are deliberately dropped; the system re-binds them.
    assert!(restored.sequencer_event.is_none());
    assert!(restored.transport_event.is_none());
    assert!(restored.read_event.is_none());
}
