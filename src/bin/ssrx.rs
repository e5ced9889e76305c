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

use clap::Parser;
use log::info;
use ssrx::core::cdd::{encode_command, CommandOpcode, Disc, ReadSpeed};
use ssrx::core::error::Result;
use ssrx::core::save_state::SaveState;
use ssrx::core::system::System;

/// Sega Saturn emulator core runner
#[derive(Parser)]
#[command(name = "ssrx")]
#[command(about = "Saturn emulator core", long_about = None)]
struct Args {
    /// Number of video frames to run
    #[arg(short = 'n', long, default_value = "600")]
    frames: u64,

    /// Insert a synthetic test disc before running
    #[arg(short = 'd', long)]
    dummy_disc: bool,

    /// Queue a ReadSector command at this FAD before running
    #[arg(short = 'r', long)]
    read_fad: Option<u32>,

    /// Write a save state to this path when done
    #[arg(short = 's', long)]
    save_state: Option<String>,

    /// Resume from a save state before running
    #[arg(short = 'l', long)]
    load_state: Option<String>,
}

fn main() -> Result<()> {
    if let Err(e) = dotenvy::dotenv() {
        // Missing .env is the normal case outside development setups.
        log::debug!("No .env file loaded: {}", e);
    }

    // Initialize logger with default level INFO
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    info!("ssrx v{}", env!("CARGO_PKG_VERSION"));
    info!("Saturn emulator core");

    let args = Args::parse();

    let mut system = System::new();

    if let Some(path) = &args.load_state {
        info!("Loading save state from: {}", path);
        let state = SaveState::load_from_file(path).map_err(ssrx::core::EmulatorError::from)?;
        system.apply_state(&state)?;
        info!(
            "Resumed at clock {} (frame {})",
            system.clock(),
            system.frame_count()
        );
    } else if args.dummy_disc {
        info!("Inserting synthetic test disc");
        system.insert_disc(Disc::new_dummy());
    }

    if let Some(fad) = args.read_fad {
        info!("Queueing ReadSector at FAD {:#08x}", fad);
        let packet = encode_command(CommandOpcode::ReadSector, fad, ReadSpeed::Single);
        system.queue_cdd_command(&packet);
    }

    info!("Running {} frames...", args.frames);
    let log_interval = (args.frames / 10).max(1);

    for i in 0..args.frames {
        system.run_frame();
        if (i + 1) % log_interval == 0 {
            info!(
                "Frame {}/{} | clock {} | CDD op {:?} at FAD {} | {} data sectors",
                i + 1,
                args.frames,
                system.clock(),
                system.cdd().operation(),
                system.cdd().current_fad(),
                system.cd_link().data_sectors()
            );
        }
    }

    info!("Run complete");
    info!("Total cycles: {}", system.clock());
    info!(
        "Sectors delivered: {} data, {} audio",
        system.cd_link().data_sectors(),
        system.cd_link().audio_sectors()
    );

    if let Some(path) = &args.save_state {
        let state = system.save_state();
        state
            .save_to_file(path)
            .map_err(ssrx::core::EmulatorError::from)?;
        info!("Save state written to: {}", path);
    }

    Ok(())
}
