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

use log::{debug, info, warn};
use tokio::select;
use tokio::sync::broadcast;

use crate::definitions::{LinkStatus, SurfaceId};
use crate::display_manager::{DisplayEvent, RenderSession};
use crate::hud_applier::{HudStateApplier, HudStatus};
use crate::link_manager::LinkEvent;
use crate::service::{spawn_service, ServiceHandle};

/// Orchestrator subscribes to DisplayManager and LinkManager events
/// and keeps the HUD in step with the bound surface and the headset mode.
pub struct Orchestrator<A: HudStateApplier> {
    display_rx: broadcast::Receiver<DisplayEvent>,
    link_rx: broadcast::Receiver<LinkEvent>,

    applier: Arc<A>,

    // Routing state
    bound_surface: Option<SurfaceId>,
    link_status: LinkStatus,
}

impl<A: HudStateApplier + 'static> Orchestrator<A> {
    pub fn new(
        display_rx: broadcast::Receiver<DisplayEvent>,
        link_rx: broadcast::Receiver<LinkEvent>,
        applier: Arc<A>,
    ) -> Self {
        Self {
            display_rx,
            link_rx,
            applier,
            bound_surface: None,
            link_status: LinkStatus::Uninitialized,
        }
    }

    /// Spawn the orchestrator event loop in background and return a handle.
    pub fn run(mut self) -> ServiceHandle {
        spawn_service(move |mut stop| async move {
            self.report();
            loop {
                select! {
                    biased;
                    _ = stop.signaled() => {
                        info!("Orchestrator shutdown requested");
                        break;
                    }
                    recv_res = self.display_rx.recv() => {
                        match recv_res {
                            Ok(evt) => self.on_display_event(evt),
                            Err(broadcast::error::RecvError::Lagged(n)) => {
                                warn!("DisplayEvent lagged by {} messages; catching up", n);
                                self.resync_display();
                            }
                            Err(broadcast::error::RecvError::Closed) => {
                                info!("DisplayEvent channel closed; stopping orchestrator");
                                break;
                            }
                        }
                    }
                    recv_res = self.link_rx.recv() => {
                        match recv_res {
                            Ok(evt) => self.on_link_event(evt),
                            Err(broadcast::error::RecvError::Lagged(n)) => {
                                warn!("LinkEvent lagged by {} messages; catching up", n);
                            }
                            Err(broadcast::error::RecvError::Closed) => {
                                info!("LinkEvent channel closed; stopping orchestrator");
                                break;
                            }
                        }
                    }
                }
            }
        })
    }

    fn on_display_event(&mut self, evt: DisplayEvent) {
        match evt {
            DisplayEvent::Connected(session) => self.handle_session_ready(session),
            DisplayEvent::Rebuilt(session) => {
                debug!("Render session rebuilt on surface {}", session.surface_id);
                self.handle_session_ready(session);
            }
            DisplayEvent::Disconnected { surface_id } => self.handle_disconnected(surface_id),
        }
    }

    fn on_link_event(&mut self, evt: LinkEvent) {
        match evt {
            LinkEvent::StatusChanged(status) => {
                debug!("Link status: {:?}", status);
                self.link_status = status;
                self.report();
            }
            LinkEvent::ModeChanged { mode, hardware_initiated } => {
                debug!("Link mode: {} (hardware initiated: {})", mode, hardware_initiated);
                if mode != self.applier.commanded_mode() {
                    self.applier.apply_mode(mode);
                    self.report();
                }
            }
        }
    }

    fn handle_session_ready(&mut self, session: RenderSession) {
        self.bound_surface = Some(session.surface_id);
        self.applier.attach_session(&session);
        self.report();
    }

    /// Brings routing state in line with the display after dropped events.
    fn resync_display(&mut self) {
        match self.applier.current_session() {
            Some(session) if self.bound_surface == Some(session.surface_id) => {}
            Some(session) => self.handle_session_ready(session),
            None => {
                if let Some(surface_id) = self.bound_surface {
                    self.handle_disconnected(surface_id);
                }
            }
        }
    }

    fn handle_disconnected(&mut self, surface_id: SurfaceId) {
        if self.bound_surface != Some(surface_id) {
            debug!("Ignoring disconnect of unbound surface {}", surface_id);
            return;
        }
        self.bound_surface = None;
        self.applier.detach_session();
        self.report();
    }

    fn report(&self) {
        self.applier.report(&HudStatus {
            display_connected: self.bound_surface.is_some(),
            link: self.link_status,
            mode: self.applier.commanded_mode(),
        });
    }
}
