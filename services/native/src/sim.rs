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

//! Simulated host services, standing in for the platform display, radio, power and
//! headset driver when the service runs on a desktop machine.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures::channel::mpsc;
use glasses_hud_core::display_manager::{
    DisplayHost, RenderTarget, SurfaceEvent, SurfaceEventStream, SurfaceInfo,
};
use glasses_hud_core::errors::{RadioError, SurfaceError};
use glasses_hud_core::hud::widgets::{BatteryHost, GeoPoint, LocationProvider, SystemWallClock};
use glasses_hud_core::hud::HudFrame;
use glasses_hud_core::link_manager::{HalEvent, HalEventStream, HeadsetHal};
use glasses_hud_core::power_persistence::{PowerRetention, RetentionFlags, ScreenEvent, ScreenEventStream, ScreenPowerEvents};
use glasses_hud_core::presence::{PresenceNotice, PresenceNotifier};
use glasses_hud_core::signal_estimation::{CellReading, RadioHost, SignalStrengthReading, SignalStrengthStream};
use glasses_hud_core::{spawn_service, HalResultCode, HostPlatform, RenderMode, ServiceHandle, SurfaceId};
use log::{debug, info};
use tokio::time::{interval, interval_at, sleep, Instant, Interval, MissedTickBehavior};

const GLASSES_SURFACE_ID: SurfaceId = 1;
const SIM_EVENT_CAPACITY: usize = 16;
const RADIO_STEP_PERIOD: Duration = Duration::from_secs(5);
const FRAME_LOG_INTERVAL: u64 = 10;

/// Sender side of a simulated host notification stream. Opening it again replaces the
/// previous listener.
struct EventSlot<T>(Mutex<Option<mpsc::Sender<T>>>);

impl<T> Default for EventSlot<T> {
    fn default() -> Self {
        Self(Mutex::new(None))
    }
}

impl<T> EventSlot<T> {
    fn open(&self) -> mpsc::Receiver<T> {
        let (tx, rx) = mpsc::channel(SIM_EVENT_CAPACITY);
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = Some(tx);
        rx
    }

    fn send(&self, event: T) {
        if let Some(tx) = self.0.lock().unwrap_or_else(PoisonError::into_inner).as_mut() {
            if let Err(e) = tx.try_send(event) {
                debug!("Simulated event dropped: {}", e);
            }
        }
    }
}

#[derive(Default)]
struct SimHeadset {
    initialized: AtomicBool,
    mode: Mutex<RenderMode>,
    events: EventSlot<HalEvent>,
}

#[async_trait]
impl HeadsetHal for SimHeadset {
    async fn init(&self) -> HalResultCode {
        self.initialized.store(true, Ordering::SeqCst);
        info!("Simulated headset initialized");
        HalResultCode::Success
    }

    async fn set_mode(&self, stereo: bool) -> HalResultCode {
        if !self.initialized.load(Ordering::SeqCst) {
            return HalResultCode::NoDevice;
        }
        let mode = RenderMode::from_stereo_flag(stereo);
        *self.mode.lock().unwrap_or_else(PoisonError::into_inner) = mode;
        debug!("Simulated headset switched to {}", mode);
        HalResultCode::Success
    }

    async fn get_mode(&self) -> Result<RenderMode, HalResultCode> {
        if !self.initialized.load(Ordering::SeqCst) {
            return Err(HalResultCode::NoDevice);
        }
        Ok(*self.mode.lock().unwrap_or_else(PoisonError::into_inner))
    }

    fn listen_to_events(&self) -> Result<HalEventStream, HalResultCode> {
        Ok(self.events.open())
    }

    async fn release(&self) {
        self.initialized.store(false, Ordering::SeqCst);
        info!("Simulated headset released");
    }
}

struct SimTarget {
    surface: String,
    frames: AtomicU64,
}

impl RenderTarget for SimTarget {
    fn apply_mode(&self, mode: RenderMode) {
        info!("[{}] render mode {}", self.surface, mode);
    }

    fn set_visible(&self, visible: bool) {
        info!("[{}] visible: {}", self.surface, visible);
    }

    fn is_stale(&self) -> bool {
        false
    }

    fn present(&self, frame: &HudFrame) {
        let count = self.frames.fetch_add(1, Ordering::Relaxed);
        if count % FRAME_LOG_INTERVAL == 0 {
            let texts: Vec<&str> = frame.views.iter().map(|v| v.view.text.as_str()).collect();
            debug!("[{}] frame {} ({}): {}", self.surface, frame.tick, frame.mode, texts.join(" | "));
        }
    }

    fn dismiss(&self) {
        info!("[{}] render target dismissed after {} frames", self.surface, self.frames.load(Ordering::Relaxed));
    }
}

#[derive(Default)]
struct SimDisplay {
    surfaces: Mutex<Vec<SurfaceInfo>>,
    events: EventSlot<SurfaceEvent>,
}

impl SimDisplay {
    fn attach(&self, id: SurfaceId) {
        self.surfaces.lock().unwrap_or_else(PoisonError::into_inner).push(SurfaceInfo {
            id,
            name: format!("sim-glasses-{}", id),
            presentation_capable: true,
        });
        self.events.send(SurfaceEvent::Added(id));
    }
}

impl DisplayHost for SimDisplay {
    fn list_surfaces(&self) -> Vec<SurfaceInfo> {
        self.surfaces.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn create_render_target(
        &self,
        surface: &SurfaceInfo,
        mode: RenderMode,
    ) -> Result<Box<dyn RenderTarget>, SurfaceError> {
        if !surface.presentation_capable {
            return Err(SurfaceError::NotPresentable(surface.id));
        }
        info!("Creating render target on {} ({})", surface.name, mode);
        Ok(Box::new(SimTarget { surface: surface.name.clone(), frames: AtomicU64::new(0) }))
    }

    fn watch_surfaces(&self) -> Result<SurfaceEventStream, SurfaceError> {
        Ok(self.events.open())
    }
}

#[derive(Default)]
struct SimScreen {
    events: EventSlot<ScreenEvent>,
}

impl ScreenPowerEvents for SimScreen {
    fn watch_screen(&self) -> anyhow::Result<ScreenEventStream> {
        Ok(self.events.open())
    }
}

#[derive(Default)]
struct SimRetention {
    held: Mutex<RetentionFlags>,
}

impl PowerRetention for SimRetention {
    fn acquire(&self, kind: RetentionFlags, timeout: Duration) {
        debug!("Retention {:?} acquired for at most {:?}", kind, timeout);
        self.held.lock().unwrap_or_else(PoisonError::into_inner).insert(kind);
    }

    fn release(&self, kind: RetentionFlags) {
        debug!("Retention {:?} released", kind);
        self.held.lock().unwrap_or_else(PoisonError::into_inner).remove(kind);
    }

    fn is_held(&self, kind: RetentionFlags) -> bool {
        self.held.lock().unwrap_or_else(PoisonError::into_inner).contains(kind)
    }
}

/// Radio whose signal sweeps between a weak and a strong cell.
struct SimRadio {
    dbm: Mutex<i32>,
    events: EventSlot<SignalStrengthReading>,
}

impl Default for SimRadio {
    fn default() -> Self {
        Self { dbm: Mutex::new(-95), events: EventSlot::default() }
    }
}

impl SimRadio {
    fn step(&self) {
        let dbm = {
            let mut dbm = self.dbm.lock().unwrap_or_else(PoisonError::into_inner);
            *dbm = if *dbm >= -60 { -110 } else { *dbm + 7 };
            *dbm
        };
        self.events.send(SignalStrengthReading { dbm: Some(dbm), coarse_level: 0 });
    }
}

#[async_trait]
impl RadioHost for SimRadio {
    fn has_telephony(&self) -> bool {
        true
    }

    fn has_permission(&self) -> bool {
        true
    }

    async fn query_cells(&self) -> Result<Vec<CellReading>, RadioError> {
        let dbm = *self.dbm.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(vec![CellReading { registered: true, dbm: Some(dbm) }])
    }

    fn listen_signal_strength(&self) -> Result<SignalStrengthStream, RadioError> {
        Ok(self.events.open())
    }
}

struct SimBattery(AtomicU8);

impl SimBattery {
    fn drain(&self) {
        let _ = self.0.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |p| Some(if p <= 5 { 100 } else { p - 1 }));
    }
}

impl BatteryHost for SimBattery {
    fn battery_percent(&self) -> Option<u8> {
        Some(self.0.load(Ordering::SeqCst))
    }
}

struct SimLocation;

impl LocationProvider for SimLocation {
    fn has_permission(&self) -> bool {
        true
    }

    fn last_known_location(&self) -> Option<GeoPoint> {
        Some(GeoPoint { latitude: 52.2297, longitude: 21.0122 })
    }
}

struct LogPresence;

impl PresenceNotifier for LogPresence {
    fn show(&self, notice: &PresenceNotice) {
        info!("[{}] {}", notice.title, notice.detail);
    }

    fn dismiss(&self) {
        info!("Presence notice dismissed");
    }
}

/// Simulated host plus the driver that plays its events.
pub struct SimulatedHost {
    headset: Arc<SimHeadset>,
    display: Arc<SimDisplay>,
    screen: Arc<SimScreen>,
    retention: Arc<SimRetention>,
    radio: Arc<SimRadio>,
    battery: Arc<SimBattery>,
    attach_delay: Duration,
    screen_cycle: Duration,
}

impl SimulatedHost {
    pub fn new(attach_delay: Duration, screen_cycle: Duration) -> Self {
        Self {
            headset: Arc::default(),
            display: Arc::default(),
            screen: Arc::default(),
            retention: Arc::default(),
            radio: Arc::default(),
            battery: Arc::new(SimBattery(AtomicU8::new(100))),
            attach_delay,
            screen_cycle,
        }
    }

    pub fn platform(&self) -> HostPlatform {
        HostPlatform {
            hal: self.headset.clone(),
            display: self.display.clone(),
            screen: self.screen.clone(),
            retention: self.retention.clone(),
            radio: self.radio.clone(),
            battery: self.battery.clone(),
            clock: Arc::new(SystemWallClock),
            location: Arc::new(SimLocation),
            presence: Arc::new(LogPresence),
        }
    }

    /// Attaches the glasses surface after the configured delay, then cycles the host
    /// screen and sweeps the radio signal until stopped.
    pub fn run(&self) -> ServiceHandle {
        let display = self.display.clone();
        let screen = self.screen.clone();
        let radio = self.radio.clone();
        let battery = self.battery.clone();
        let attach_delay = self.attach_delay;
        let screen_cycle = self.screen_cycle;

        spawn_service(move |mut stop| async move {
            tokio::select! {
                _ = stop.signaled() => return,
                _ = sleep(attach_delay) => display.attach(GLASSES_SURFACE_ID),
            }

            let mut radio_tick = interval(RADIO_STEP_PERIOD);
            radio_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut screen_tick = (!screen_cycle.is_zero())
                .then(|| interval_at(Instant::now() + screen_cycle, screen_cycle));
            let mut screen_on = true;

            loop {
                tokio::select! {
                    _ = stop.signaled() => break,
                    _ = radio_tick.tick() => {
                        radio.step();
                        battery.drain();
                    }
                    _ = next_tick(&mut screen_tick) => {
                        screen_on = !screen_on;
                        info!("Simulated host screen {}", if screen_on { "on" } else { "off" });
                        screen.events.send(if screen_on { ScreenEvent::On } else { ScreenEvent::Off });
                    }
                }
            }
            debug!("Host simulation stopped");
        })
    }
}

async fn next_tick(tick: &mut Option<Interval>) {
    match tick {
        Some(tick) => {
            tick.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glasses_hud_core::{HudControl, RuntimeConfig, SessionCoordinator};

    #[tokio::test]
    async fn session_runs_against_simulated_host() {
        let host = SimulatedHost::new(Duration::ZERO, Duration::from_millis(20));
        let config = RuntimeConfig { hud_clock_period_ms: 5, ..RuntimeConfig::default() };
        let session = SessionCoordinator::new(host.platform(), config);
        session.start().await.unwrap();
        let driver = host.run();

        sleep(Duration::from_millis(100)).await;
        assert!(session.is_external_display_connected());
        assert!(session.is_link_ready());
        assert!(session.is_power_held());

        driver.shutdown().await.unwrap();
        session.shutdown().await;
        assert!(!session.is_power_held());
        assert!(!host.headset.initialized.load(Ordering::SeqCst));
    }

    #[test]
    fn radio_sweep_wraps_around() {
        let radio = SimRadio::default();
        for _ in 0..10 {
            radio.step();
        }
        let dbm = *radio.dbm.lock().unwrap();
        assert!((-110..=-53).contains(&dbm));
    }
}
