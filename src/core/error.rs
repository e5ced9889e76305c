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

/// Emulator error types
use thiserror::Error;

use super::timing::EventTag;

/// Result type for emulator operations
pub type Result<T> = std::result::Result<T, EmulatorError>;

/// Main error type for the emulator
///
/// The taxonomy is narrow on purpose: the scheduler and the CD drive model
/// fixed-behavior hardware and never fail at runtime. Fallible paths are
/// confined to the savestate boundary and host I/O.
#[derive(Error, Debug)]
pub enum EmulatorError {
    #[error("Save state error: {0}")]
    SaveState(#[from] SaveStateError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Savestate-specific error types
///
/// Restoration mismatches are hard load failures, never silently dropped:
/// a save state that cannot be re-bound to live components would break the
/// determinism contract if applied partially.
#[derive(Error, Debug)]
pub enum SaveStateError {
    #[error("Incompatible save state version: expected {expected}, got {got}")]
    VersionMismatch { expected: u32, got: u32 },

    #[error("Restored event tag {tag:?} has no matching live component chain")]
    UnclaimedEvent { tag: EventTag },

    #[error("Component chain {tag:?} is live but no event was restored for it")]
    MissingEvent { tag: EventTag },

    #[error("Encode error: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    #[error("Decode error: {0}")]
    Decode(#[from] bincode::error::DecodeError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
