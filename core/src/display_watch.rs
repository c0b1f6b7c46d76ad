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

use std::sync::Arc;

use futures::StreamExt;
use log::{debug, info};

use crate::display_manager::{DisplayHost, DisplayManager, SurfaceEvent};
use crate::errors::SurfaceError;
use crate::service::{spawn_service, ServiceHandle};

/// Binds any surface already attached, then follows host attach/detach notifications.
/// On shutdown the bound render session is torn down.
pub fn run_display_watch(
    display: Arc<DisplayManager>,
    host: &dyn DisplayHost,
) -> Result<ServiceHandle, SurfaceError> {
    let mut surface_events = host.watch_surfaces()?;

    Ok(spawn_service(move |mut stop| async move {
        display.rescan();

        loop {
            tokio::select! {
                _ = stop.signaled() => {
                    debug!("Shutdown requested, stopping display watch");
                    display.teardown();
                    break;
                }
                event = surface_events.next() => match event {
                    Some(SurfaceEvent::Added(id)) => {
                        info!("External surface {} attached", id);
                        display.on_surface_added(id);
                    }
                    Some(SurfaceEvent::Removed(id)) => {
                        info!("External surface {} detached", id);
                        display.on_surface_removed(id);
                    }
                    None => {
                        debug!("Surface event stream ended");
                        break;
                    }
                }
            }
        }
    }))
}
