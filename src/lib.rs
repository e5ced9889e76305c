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

//! Sega Saturn emulator core library
//!
//! This library provides the deterministic core of a Saturn emulator: the
//! discrete-event hardware scheduler, the CD drive with its bit-serial
//! command/status protocol, and bit-exact save states.
//!
//! # Example
//!
//! ```
//! use ssrx::core::cdd::Disc;
//! use ssrx::core::System;
//!
//! let mut system = System::new();
//! system.insert_disc(Disc::new_dummy());
//!
//! // Advance one video frame of virtual time
//! system.run_frame();
//! ```

pub mod core;
