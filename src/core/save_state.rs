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

//! Save state serialization for Saturn emulator core
//!
//! This module provides functionality to save and restore the complete core
//! state, allowing a session to be frozen at any point and resumed later
//! with bit-exact behavior.
//!
//! # Save State Format
//!
//! Save states are serialized using bincode for efficient binary encoding.
//! The state includes:
//! - Metadata (timestamp, frame count, playtime)
//! - Scheduler state (virtual clock, pending events with due cycles,
//!   insertion sequence numbers and owner tags)
//! - CD drive state (sequencer state, packet buffers, bit indices,
//!   pickup position, transport activity, disc layout)
//! - Per-processor spillover cycle counts
//!
//! Handler callbacks are never serialized. Each pending scheduler event
//! carries an owner tag instead; on restore the system re-binds every tag
//! to the live component handler and fails hard on any mismatch.
//!
//! # Version Compatibility
//!
//! Save states include a version number to ensure compatibility.
//! Loading a save state with a different version will fail with an error.
//!
//! # Example
//!
//! ```no_run
//! use ssrx::core::save_state::SaveState;
//! use ssrx::core::System;
//!
//! let mut system = System::new();
//! // ... run emulation ...
//!
//! // Create save state
//! let state = SaveState::from_system(&system);
//!
//! // Save to file
//! state.save_to_file("save.state").unwrap();
//!
//! // Later: load from file and apply
//! let loaded = SaveState::load_from_file("save.state").unwrap();
//! system.apply_state(&loaded).unwrap();
//! ```

use bincode::{config, Decode, Encode};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use super::cdd::{Disc, Operation, ReadSpeed, SequencerState, Transport, PACKET_LEN};
use super::error::SaveStateError;
use super::timing::SchedulerState;

/// Save state version for compatibility checking
///
/// This version number should be incremented whenever the save state format
/// changes in a way that breaks backward compatibility.
pub const SAVE_STATE_VERSION: u32 = 1;

/// Complete core save state
///
/// Contains everything needed to restore the core to a specific point in
/// virtual time, including the full pending-event list of the scheduler.
#[derive(Serialize, Deserialize, Encode, Decode)]
pub struct SaveState {
    /// Version number for compatibility checking
    pub version: u32,

    /// Save state metadata
    pub metadata: SaveStateMetadata,

    /// Scheduler state (clock, counters, pending events)
    pub scheduler: SchedulerState,

    /// CD drive state
    pub cdd: CddState,

    /// Spillover cycle debt per processor
    pub spillover: [u64; 2],
}

/// Save state metadata
///
/// Contains information about when the save state was created.
#[derive(Serialize, Deserialize, Encode, Decode)]
#[bincode(encode_bounds = "", decode_bounds = "")]
pub struct SaveStateMetadata {
    /// Timestamp when the save state was created
    #[bincode(with_serde)]
    pub timestamp: DateTime<Utc>,

    /// Frame count at save time
    pub frame_count: u64,

    /// Playtime in seconds
    pub playtime: u64,
}

/// CD drive state
///
/// Captures the protocol sequencer, both packet buffers and the transport
/// position. Scheduler event handles are not part of this state; they are
/// recovered from the scheduler's own event list by owner tag.
#[derive(Serialize, Deserialize, Encode, Decode)]
pub struct CddState {
    /// Protocol sequencer state
    pub state: SequencerState,

    /// Inbound command packet buffer
    pub command: [u8; PACKET_LEN],

    /// Next inbound bit position
    pub command_bit: u8,

    /// Outbound status packet buffer
    pub status: [u8; PACKET_LEN],

    /// Next outbound bit position
    pub status_bit: u8,

    /// Pickup position
    pub current_fad: u32,

    /// Seek/read destination
    pub target_fad: u32,

    /// Operation code of the next status packet
    pub operation: Operation,

    /// Selected read speed
    pub read_speed: ReadSpeed,

    /// Transport chain activity
    pub transport: Transport,

    /// A ReadSector is waiting for its seek to land
    pub pending_read: bool,

    /// Sector delivery chain is running
    pub reading: bool,

    /// Control line levels (raw bits)
    pub lines: u8,

    /// Tray state
    pub tray_open: bool,

    /// Inserted disc layout, if any
    pub disc: Option<Disc>,
}

impl SaveState {
    /// Create a new save state from the current system state
    ///
    /// # Arguments
    ///
    /// * `system` - Reference to the system to save
    ///
    /// # Returns
    ///
    /// SaveState containing complete core state
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use ssrx::core::{System, save_state::SaveState};
    /// # let system = System::new();
    /// let state = SaveState::from_system(&system);
    /// ```
    pub fn from_system(system: &crate::core::System) -> Self {
        system.save_state()
    }

    /// Save state to file
    ///
    /// Serializes the save state to a binary file using bincode.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to save file
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be created
    /// - Serialization fails
    /// - Write operation fails
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use ssrx::core::save_state::SaveState;
    /// # use ssrx::core::System;
    /// # let state = SaveState::from_system(&System::new());
    /// state.save_to_file("save.state").unwrap();
    /// ```
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), SaveStateError> {
        let config = config::standard();
        let encoded = bincode::encode_to_vec(self, config)?;
        let mut file = File::create(path)?;
        file.write_all(&encoded)?;
        Ok(())
    }

    /// Load state from file
    ///
    /// Deserializes a save state from a binary file and verifies version
    /// compatibility.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to save file
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be opened or read
    /// - Deserialization fails
    /// - Version is incompatible
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use ssrx::core::save_state::SaveState;
    /// let state = SaveState::load_from_file("save.state").unwrap();
    /// ```
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, SaveStateError> {
        let mut file = File::open(path)?;
        let mut buffer = Vec::new();
        file.read_to_end(&mut buffer)?;

        let config = config::standard();
        let (state, _): (SaveState, usize) = bincode::decode_from_slice(&buffer, config)?;

        // Version check
        if state.version != SAVE_STATE_VERSION {
            return Err(SaveStateError::VersionMismatch {
                expected: SAVE_STATE_VERSION,
                got: state.version,
            });
        }

        Ok(state)
    }

    /// Serialized size of this save state
    ///
    /// # Returns
    ///
    /// Size in bytes of the bincode encoding
    pub fn encoded_size(&self) -> Result<usize, SaveStateError> {
        let config = config::standard();
        Ok(bincode::encode_to_vec(self, config)?.len())
    }
}

/// Trait for components that can be saved and restored
///
/// This trait should be implemented by all core components that need
/// to be included in save states.
///
/// # Example
///
/// ```no_run
/// use ssrx::core::save_state::{CddState, StateSave};
///
/// struct MyDrive {
///     current_fad: u32,
/// }
///
/// impl StateSave for MyDrive {
///     type State = CddState;
///
///     fn to_state(&self) -> Self::State {
///         // Convert drive to state...
///         # todo!()
///     }
///
///     fn restore_from_state(&mut self, state: &Self::State) {
///         // Restore drive from state...
///     }
/// }
/// ```
pub trait StateSave {
    /// The state type for this component
    type State: Serialize + for<'de> Deserialize<'de>;

    /// Convert this component to a saveable state
    fn to_state(&self) -> Self::State;

    /// Restore this component from a saved state
    ///
    /// # Arguments
    ///
    /// * `state` - The state to restore from
    fn restore_from_state(&mut self, state: &Self::State);
}
