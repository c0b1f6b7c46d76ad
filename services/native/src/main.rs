// Copyright 2025 HEM Sp. z o.o.
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

mod cli;
mod logger;
mod sim;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;
use glasses_hud_core::{HudControl, RuntimeConfig, SessionCoordinator};
use log::{debug, info, warn};

use crate::cli::Cli;
use crate::logger::init_logger;
use crate::sim::SimulatedHost;

const SURFACE_ATTACH_DELAY: Duration = Duration::from_secs(1);

fn load_config(path: Option<&Path>) -> anyhow::Result<RuntimeConfig> {
    let Some(path) = path else {
        return Ok(RuntimeConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Invalid config file {}", path.display()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    if let Err(e) = init_logger(cli.log_file.clone(), cli.log_level) {
        eprintln!("Failed to initialize logger: {}", e);
        bail!("Failed to initialize logger: {}", e);
    }

    let mut config = load_config(cli.config.as_deref())?;
    if cli.force_mono {
        config.force_mono = true;
    }
    debug!("Runtime configuration: {:?}", config);

    let host = SimulatedHost::new(SURFACE_ATTACH_DELAY, Duration::from_secs(cli.screen_cycle_secs));
    let session = Arc::new(SessionCoordinator::new(host.platform(), config));

    info!("Starting service");
    session.start().await?;
    let simulation = host.run();
    let control = session.bind();
    if !control.is_link_ready() {
        warn!("Headset link not ready: {:?}", control.link_state().status);
    }

    info!("Press Ctrl+C to exit");
    tokio::signal::ctrl_c().await.context("Failed to listen for Ctrl+C signal")?;
    info!("Received Ctrl+C signal, exiting...");

    drop(control);
    if let Err(e) = simulation.shutdown().await {
        warn!("Host simulation ended abnormally: {}", e);
    }
    session.shutdown().await;
    info!("Service stopped");
    Ok(())
}
