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

//! System integration module
//!
//! This module ties together the core components (scheduler, CD drive,
//! CD block link, attached processors) and provides the main emulation
//! loop.
//!
//! # Execution model
//!
//! Single-threaded and strictly deterministic. Virtual time advances in
//! batches: each [`System::run_slice`] call first runs every attached
//! processor for the batch budget, then advances the scheduler clock by
//! the same amount, firing all hardware events that came due. Processors
//! finish their last instruction even when it overruns the budget; the
//! overshoot is carried as spillover debt and deducted from the next
//! batch, so long-run cycle counts stay exact.

mod cd_link;

pub use cd_link::CdBlockLink;

use chrono::Utc;

use super::cdd::{CdDrive, Disc, Transport, PACKET_LEN, SYSTEM_CLOCK_HZ};
use super::error::SaveStateError;
use super::save_state::{SaveState, SaveStateMetadata, StateSave, SAVE_STATE_VERSION};
use super::timing::{Cycles, EventDisposition, EventTag, Scheduler};

/// Cycles per video frame (NTSC, ~60 Hz)
pub const CYCLES_PER_FRAME: Cycles = SYSTEM_CLOCK_HZ / 60;

/// Processor slots of the twin-SH-2 arrangement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorSlot {
    Master = 0,
    Slave = 1,
}

/// A batch-executed processor attached to the system
///
/// `run` executes at least `budget` cycles and returns the count actually
/// executed. Overshoot is expected (instructions are not split); the
/// system carries the excess as spillover debt against the next batch.
pub trait Processor {
    fn run(&mut self, budget: Cycles) -> Cycles;
}

/// Saturn system core
///
/// Integrates the hardware scheduler, the CD drive and the CD block end
/// of its serial link, and manages batch execution of attached
/// processors.
///
/// # Example
/// ```no_run
/// use ssrx::core::system::System;
///
/// let mut system = System::new();
/// // system.insert_disc(disc);
/// // system.run_frame();
/// ```
pub struct System {
    /// Hardware event scheduler
    scheduler: Scheduler,
    /// CD drive mechanism
    cdd: CdDrive,
    /// CD block end of the serial link
    cd_link: CdBlockLink,
    /// Attached processors, indexed by [`ProcessorSlot`]
    processors: [Option<Box<dyn Processor>>; 2],
    /// Spillover cycle debt per processor slot
    spillover: [Cycles; 2],
    /// Video frames elapsed
    frame_count: u64,
}

impl System {
    /// Create a new System instance
    ///
    /// Initializes all components to their reset state and registers the
    /// CD drive's sequencer with the scheduler.
    ///
    /// # Returns
    /// Initialized System instance
    pub fn new() -> Self {
        let mut scheduler = Scheduler::new();
        let mut cdd = CdDrive::new();
        cdd.register_events(&mut scheduler);

        log::info!("System: components initialized, CDD sequencer registered");

        Self {
            scheduler,
            cdd,
            cd_link: CdBlockLink::new(),
            processors: [None, None],
            spillover: [0; 2],
            frame_count: 0,
        }
    }

    /// Attach a processor to a slot, replacing any previous occupant
    ///
    /// The slot's spillover debt is reset; a fresh processor owes
    /// nothing.
    pub fn attach_processor(&mut self, slot: ProcessorSlot, processor: Box<dyn Processor>) {
        self.processors[slot as usize] = Some(processor);
        self.spillover[slot as usize] = 0;
    }

    /// Insert a disc into the drive
    pub fn insert_disc(&mut self, disc: Disc) {
        self.cdd.insert_disc(disc);
    }

    /// Open or close the drive tray
    pub fn set_tray_open(&mut self, open: bool) {
        self.cdd.set_tray_open(open);
    }

    /// Current virtual clock in cycles
    pub fn clock(&self) -> Cycles {
        self.scheduler.clock()
    }

    /// Video frames elapsed
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Spillover cycle debt of a processor slot
    pub fn spillover(&self, slot: ProcessorSlot) -> Cycles {
        self.spillover[slot as usize]
    }

    /// Shared access to the CD drive
    pub fn cdd(&self) -> &CdDrive {
        &self.cdd
    }

    /// Shared access to the CD block link
    pub fn cd_link(&self) -> &CdBlockLink {
        &self.cd_link
    }

    /// Mutable access to the CD block link
    ///
    /// Used by the CD block layer to queue command packets and collect
    /// status packets between batches.
    pub fn cd_link_mut(&mut self) -> &mut CdBlockLink {
        &mut self.cd_link
    }

    /// Queue a command packet on the serial link
    pub fn queue_cdd_command(&mut self, packet: &[u8; PACKET_LEN]) {
        self.cd_link.queue_command(packet);
    }

    /// Advance the whole system by one batch of `budget` cycles
    ///
    /// Runs every attached processor for the budget (less its spillover
    /// debt), records new spillover, then advances the scheduler clock by
    /// exactly `budget`, firing all due hardware events in deterministic
    /// order.
    ///
    /// # Arguments
    ///
    /// * `budget` - Batch length in cycles
    pub fn run_slice(&mut self, budget: Cycles) {
        if budget == 0 {
            return;
        }

        for slot in 0..self.processors.len() {
            let debt = self.spillover[slot];
            if debt >= budget {
                // Still paying off an earlier overshoot; skip the batch.
                self.spillover[slot] = debt - budget;
                continue;
            }
            let requested = budget - debt;
            match self.processors[slot].as_mut() {
                Some(processor) => {
                    let executed = processor.run(requested);
                    debug_assert!(
                        executed >= requested,
                        "processor undershot its batch budget"
                    );
                    self.spillover[slot] = executed - requested;
                }
                None => {
                    self.spillover[slot] = 0;
                }
            }
        }

        let target = self.scheduler.clock() + budget;
        let Self {
            scheduler,
            cdd,
            cd_link,
            ..
        } = self;
        scheduler.advance_to(target, |sched, tag, _id| match tag {
            EventTag::CddSequencer => {
                EventDisposition::Reschedule(cdd.sequencer_step(sched, cd_link))
            }
            EventTag::CddTransport => match cdd.transport_tick(sched) {
                Some(delay) => EventDisposition::Reschedule(delay),
                None => EventDisposition::Remove,
            },
            EventTag::CddRead => match cdd.read_tick(cd_link) {
                Some(delay) => EventDisposition::Reschedule(delay),
                None => EventDisposition::Remove,
            },
        });
    }

    /// Advance by one video frame
    pub fn run_frame(&mut self) {
        self.run_slice(CYCLES_PER_FRAME);
        self.frame_count += 1;
    }

    /// Capture the complete core state
    pub fn save_state(&self) -> SaveState {
        SaveState {
            version: SAVE_STATE_VERSION,
            metadata: SaveStateMetadata {
                timestamp: Utc::now(),
                frame_count: self.frame_count,
                playtime: self.scheduler.clock() / SYSTEM_CLOCK_HZ,
            },
            scheduler: self.scheduler.save_state(),
            cdd: self.cdd.to_state(),
            spillover: self.spillover,
        }
    }

    /// Restore the core from a captured state
    ///
    /// Rebuilds the scheduler's pending-event list, then re-binds each
    /// event to its owning component by tag. Validation happens before
    /// any mutation: a live chain with no matching event, or an event no
    /// chain claims, fails the whole restore and leaves the system
    /// untouched.
    ///
    /// # Arguments
    ///
    /// * `state` - The state to restore from
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - The state's version does not match
    /// - An event tag cannot be re-bound to a live handler
    pub fn apply_state(&mut self, state: &SaveState) -> Result<(), SaveStateError> {
        if state.version != SAVE_STATE_VERSION {
            return Err(SaveStateError::VersionMismatch {
                expected: SAVE_STATE_VERSION,
                got: state.version,
            });
        }

        let scheduler = Scheduler::from_state(&state.scheduler);

        let sequencer_event = scheduler
            .find_by_tag(EventTag::CddSequencer)
            .ok_or(SaveStateError::MissingEvent {
                tag: EventTag::CddSequencer,
            })?;

        let transport_event = scheduler.find_by_tag(EventTag::CddTransport);
        let transport_live = state.cdd.transport != Transport::Inactive;
        match (transport_live, transport_event) {
            (true, None) => {
                return Err(SaveStateError::MissingEvent {
                    tag: EventTag::CddTransport,
                })
            }
            (false, Some(_)) => {
                return Err(SaveStateError::UnclaimedEvent {
                    tag: EventTag::CddTransport,
                })
            }
            _ => {}
        }

        let read_event = scheduler.find_by_tag(EventTag::CddRead);
        match (state.cdd.reading, read_event) {
            (true, None) => {
                return Err(SaveStateError::MissingEvent {
                    tag: EventTag::CddRead,
                })
            }
            (false, Some(_)) => {
                return Err(SaveStateError::UnclaimedEvent {
                    tag: EventTag::CddRead,
                })
            }
            _ => {}
        }

        self.scheduler = scheduler;
        self.cdd.restore_from_state(&state.cdd);
        self.cdd.bind_sequencer_event(sequencer_event);
        self.cdd.bind_transport_event(transport_event);
        self.cdd.bind_read_event(read_event);
        self.spillover = state.spillover;
        self.frame_count = state.metadata.frame_count;

        log::debug!(
            "System: state restored at clock {} with {} pending events",
            self.scheduler.clock(),
            self.scheduler.len()
        );
        Ok(())
    }
}

impl Default for System {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests;
