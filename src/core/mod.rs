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

//! Core emulation components
//!
//! This module contains the deterministic hardware core:
//! - Timing (discrete-event hardware scheduler)
//! - CDD (CD drive mechanism and serial protocol)
//! - Save state (bit-exact capture and restore)
//! - System integration

pub mod cdd;
pub mod error;
pub mod save_state;
pub mod system;
pub mod timing;

// Re-export commonly used types
pub use cdd::{CdDrive, Disc};
pub use error::{EmulatorError, Result, SaveStateError};
pub use save_state::SaveState;
pub use system::{CdBlockLink, Processor, ProcessorSlot, System};
pub use timing::{Cycles, EventDisposition, EventId, EventTag, Scheduler};
