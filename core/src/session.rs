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

use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, info, warn};

use crate::config::RuntimeConfig;
use crate::definitions::{InitOutcome, RenderMode};
use crate::display_manager::DisplayManager;
use crate::display_watch::run_display_watch;
use crate::errors::SessionError;
use crate::hud::widgets::{
    BatteryWidget, ClockWidget, LinkStatusWidget, LocationWidget, SignalWidget, LOCATION_WIDGET_ID,
};
use crate::hud::{HudFramework, HudWidget};
use crate::hud_applier::DirectHudApplier;
use crate::link_manager::{LinkManager, LinkState};
use crate::orchestrator::Orchestrator;
use crate::platform::HostPlatform;
use crate::power_persistence::{run_power_watch, PowerPersistenceController};
use crate::presence::PresenceIndicator;
use crate::service::MultiServiceHandle;
use crate::signal_estimation::{SignalEstimator, SignalSample};

type PowerController = PowerPersistenceController<LinkManager, DisplayManager>;

/// Operations exposed to a bound control UI.
#[async_trait]
pub trait HudControl: Send + Sync {
    /// Switches the render mode, honouring the mono policy. Returns the mode applied.
    /// When the link rejects the switch the current mode is left unchanged.
    async fn set_render_mode(&self, mode: RenderMode) -> Result<RenderMode, SessionError>;

    fn set_widget_visibility(&self, visible: bool);

    fn is_external_display_connected(&self) -> bool;

    fn is_link_ready(&self) -> bool;

    fn link_state(&self) -> LinkState;

    /// Runs link initialization again after a terminal failure.
    async fn retry_link(&self) -> Result<InitOutcome, SessionError>;

    async fn on_radio_permission_granted(&self);

    fn on_location_permission_granted(&self);
}

/// Owns every runtime component and their lifetime.
///
/// Components are built in dependency order: display and link first, then signal
/// estimation and the HUD, then power persistence which needs both the link and
/// the display. Teardown runs in reverse.
pub struct SessionCoordinator {
    config: RuntimeConfig,
    platform: HostPlatform,
    display: Arc<DisplayManager>,
    link: Arc<LinkManager>,
    signal: Arc<SignalEstimator>,
    hud: Arc<HudFramework>,
    power: Arc<PowerController>,
    presence: Arc<PresenceIndicator>,
    services: tokio::sync::Mutex<Option<MultiServiceHandle>>,
    bindings: AtomicUsize,
}

impl SessionCoordinator {
    pub fn new(platform: HostPlatform, config: RuntimeConfig) -> Self {
        let initial_mode = config.effective_mode(config.default_render_mode);
        let capacity = config.event_channel_capacity();

        let display = Arc::new(DisplayManager::with_event_capacity(
            platform.display.clone(),
            initial_mode,
            capacity,
        ));
        let link = Arc::new(LinkManager::with_event_capacity(platform.hal.clone(), initial_mode, capacity));
        let signal = Arc::new(SignalEstimator::new(platform.radio.clone()));
        let hud = Arc::new(HudFramework::new(config.hud_clock_period()));
        let power = Arc::new(PowerPersistenceController::new(
            link.clone(),
            display.clone(),
            platform.retention.clone(),
            config.power_guard_timeout(),
        ));
        let presence = Arc::new(PresenceIndicator::new(platform.presence.clone(), config.presence_title.clone()));

        Self {
            config,
            platform,
            display,
            link,
            signal,
            hud,
            power,
            presence,
            services: tokio::sync::Mutex::new(None),
            bindings: AtomicUsize::new(0),
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn display(&self) -> &Arc<DisplayManager> {
        &self.display
    }

    pub fn link(&self) -> &Arc<LinkManager> {
        &self.link
    }

    pub fn hud(&self) -> &Arc<HudFramework> {
        &self.hud
    }

    pub fn presence(&self) -> &Arc<PresenceIndicator> {
        &self.presence
    }

    pub fn is_power_held(&self) -> bool {
        self.power.is_held()
    }

    pub fn signal_sample(&self) -> SignalSample {
        self.signal.latest()
    }

    pub async fn is_running(&self) -> bool {
        self.services.lock().await.is_some()
    }

    /// Brings the session up. A link that fails to initialize does not fail the start;
    /// its status stays queryable and [`HudControl::retry_link`] can be used later.
    pub async fn start(&self) -> Result<(), SessionError> {
        let mut services = self.services.lock().await;
        if services.is_some() {
            return Err(SessionError::AlreadyRunning);
        }
        info!("Starting glasses HUD session");
        self.presence.show("Starting");
        self.power.acquire();

        let mut multi = MultiServiceHandle::with_capacity(3);
        if let Err(e) = self.start_services(&mut multi).await {
            warn!("Session start failed: {}", e);
            self.stop_components(multi).await;
            return Err(e);
        }

        match self.link.initialize().await {
            InitOutcome::Success => info!("Headset link ready"),
            outcome => warn!("Headset link unavailable: {:?}", outcome),
        }

        *services = Some(multi);
        info!("Glasses HUD session started");
        Ok(())
    }

    async fn start_services(&self, multi: &mut MultiServiceHandle) -> Result<(), SessionError> {
        self.register_widgets()?;

        // Subscribed before the display watch runs its first scan.
        let applier = Arc::new(DirectHudApplier::new(self.display.clone(), self.hud.clone(), self.presence.clone()));
        let orchestrator = Orchestrator::new(self.display.subscribe(), self.link.subscribe(), applier);
        multi.add(orchestrator.run());

        let display_watch = run_display_watch(self.display.clone(), self.platform.display.as_ref())
            .map_err(|e| SessionError::EventSource(e.to_string()))?;
        multi.add(display_watch);

        let power_watch = run_power_watch(self.power.clone(), self.platform.screen.as_ref())
            .map_err(|e| SessionError::EventSource(format!("{:#}", e)))?;
        multi.add(power_watch);

        self.signal.start().await;
        Ok(())
    }

    fn register_widgets(&self) -> Result<(), SessionError> {
        let widgets: Vec<Box<dyn HudWidget>> = vec![
            Box::new(ClockWidget::time(self.platform.clock.clone())),
            Box::new(ClockWidget::date(self.platform.clock.clone())),
            Box::new(BatteryWidget::new(self.platform.battery.clone())),
            Box::new(SignalWidget::new(self.signal.subscribe())),
            Box::new(LinkStatusWidget::new(self.link.state(), self.link.subscribe())),
            Box::new(LocationWidget::new(self.platform.location.clone())),
        ];
        for widget in widgets {
            self.hud.register(widget)?;
        }
        Ok(())
    }

    /// Tears the session down. Calling it on a stopped session does nothing.
    pub async fn shutdown(&self) {
        let Some(multi) = self.services.lock().await.take() else {
            debug!("Shutdown requested on a stopped session");
            return;
        };
        info!("Stopping glasses HUD session");
        self.stop_components(multi).await;
        info!("Glasses HUD session stopped");
    }

    async fn stop_components(&self, multi: MultiServiceHandle) {
        self.hud.cleanup();
        if let Err(e) = multi.shutdown().await {
            warn!("Session service ended abnormally: {}", e);
        }
        self.signal.shutdown();
        self.power.release();
        self.link.release().await;
        self.display.teardown();
        self.presence.dismiss();
    }

    /// Binds a control client. The binding keeps the coordinator alive and is counted
    /// until dropped.
    pub fn bind(self: &Arc<Self>) -> SessionBinding {
        let count = self.bindings.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("Control client bound ({} bound)", count);
        SessionBinding { coordinator: self.clone() }
    }

    pub fn bound_clients(&self) -> usize {
        self.bindings.load(Ordering::SeqCst)
    }

    async fn ensure_running(&self) -> Result<(), SessionError> {
        if self.is_running().await {
            Ok(())
        } else {
            Err(SessionError::NotRunning)
        }
    }
}

#[async_trait]
impl HudControl for SessionCoordinator {
    async fn set_render_mode(&self, requested: RenderMode) -> Result<RenderMode, SessionError> {
        self.ensure_running().await?;
        let mode = self.config.effective_mode(requested);
        if mode != requested {
            info!("Mono rendering enforced, applying {} instead of {}", mode, requested);
        }
        if self.link.is_ready() {
            self.link.set_mode(mode).await?;
        } else {
            debug!("Link not ready, {} mode will be requested when it comes up", mode);
        }
        self.link.set_default_mode(mode);
        self.display.set_render_mode(mode);
        self.hud.set_render_mode(mode);
        Ok(mode)
    }

    fn set_widget_visibility(&self, visible: bool) {
        self.display.set_visible(visible);
        self.hud.set_visible(visible);
    }

    fn is_external_display_connected(&self) -> bool {
        self.display.is_connected()
    }

    fn is_link_ready(&self) -> bool {
        self.link.is_ready()
    }

    fn link_state(&self) -> LinkState {
        self.link.state()
    }

    async fn retry_link(&self) -> Result<InitOutcome, SessionError> {
        self.ensure_running().await?;
        Ok(self.link.initialize().await)
    }

    async fn on_radio_permission_granted(&self) {
        if self.is_running().await {
            info!("Radio permission granted, re-running signal estimation");
            self.signal.reinitialize().await;
        }
    }

    fn on_location_permission_granted(&self) {
        if !self.hud.reinitialize_widget(LOCATION_WIDGET_ID) {
            debug!("Location widget not registered, nothing to re-initialize");
        }
    }
}

/// Control client binding; unbinds on drop.
pub struct SessionBinding {
    coordinator: Arc<SessionCoordinator>,
}

impl Deref for SessionBinding {
    type Target = SessionCoordinator;

    fn deref(&self) -> &SessionCoordinator {
        &self.coordinator
    }
}

impl Drop for SessionBinding {
    fn drop(&mut self) {
        let remaining = self.coordinator.bindings.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
        debug!("Control client unbound ({} bound)", remaining);
    }
}
