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

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use futures::StreamExt;
use log::{debug, info, warn};
use tokio::sync::broadcast;

use crate::definitions::{HalResultCode, InitOutcome, LinkStatus, RenderMode, DEFAULT_EVENT_CHANNEL_CAPACITY};
use crate::errors::LinkError;
use crate::service::{spawn_service, ServiceHandle};

/// Asynchronous notifications delivered by the headset hardware abstraction layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HalEvent {
    /// Result of a (re)initialization performed by the hardware side.
    InitResult(HalResultCode),
    /// The headset switched mode, possibly on its own (physical control toggled).
    ModeChanged(RenderMode),
}

/// Registered listener. Dropping the stream unregisters it.
pub type HalEventStream = futures::channel::mpsc::Receiver<HalEvent>;

/// Contract of the vendor headset driver. Byte-level framing lives behind it.
///
/// `init` and `set_mode` are bounded by the driver's own timeouts.
#[async_trait]
pub trait HeadsetHal: Send + Sync {
    async fn init(&self) -> HalResultCode;

    async fn set_mode(&self, stereo: bool) -> HalResultCode;

    async fn get_mode(&self) -> Result<RenderMode, HalResultCode>;

    fn listen_to_events(&self) -> Result<HalEventStream, HalResultCode>;

    async fn release(&self);
}

/// Snapshot of the hardware link session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkState {
    pub status: LinkStatus,
    /// Mode as last reported by the hardware.
    pub mode: Option<RenderMode>,
    /// Mode restored by the keep-alive nudge.
    pub last_known_good: Option<RenderMode>,
}

/// Events published by [`LinkManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    StatusChanged(LinkStatus),
    ModeChanged { mode: RenderMode, hardware_initiated: bool },
}

/// What the power persistence controller needs from the link.
pub trait LinkKeepAlive: Send + Sync {
    fn is_ready(&self) -> bool;

    fn refresh_keep_alive(&self) -> impl Future<Output = Result<(), LinkError>> + Send;
}

struct LinkShared {
    state: Mutex<LinkState>,
    event_sender: broadcast::Sender<LinkEvent>,
    keep_alive_active: AtomicBool,
    /// A nudge flipped the hardware and did not manage to flip it back.
    restore_pending: AtomicBool,
    release_requested: AtomicBool,
}

impl LinkShared {
    fn state(&self) -> std::sync::MutexGuard<'_, LinkState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, event: LinkEvent) {
        debug!("Link event: {:?}", event);
        let _ = self.event_sender.send(event);
    }

    fn set_status(&self, status: LinkStatus) {
        let changed = {
            let mut state = self.state();
            let changed = state.status != status;
            state.status = status;
            changed
        };
        if changed {
            self.publish(LinkEvent::StatusChanged(status));
        }
    }

    fn on_hal_event(&self, event: HalEvent) {
        match event {
            HalEvent::InitResult(code) => {
                let status = self.state().status;
                match (status, code.is_success()) {
                    (LinkStatus::Ready, false) => {
                        warn!("Headset reported failed re-initialization: {:?}", code);
                        self.set_status(LinkStatus::Error(code));
                    }
                    (LinkStatus::Error(_), true) => {
                        info!("Headset recovered after re-initialization");
                        self.set_status(LinkStatus::Ready);
                    }
                    _ => debug!("Init result {:?} in state {:?}", code, status),
                }
            }
            HalEvent::ModeChanged(mode) => {
                if self.keep_alive_active.load(Ordering::SeqCst) {
                    debug!("Ignoring mode change to {} during keep-alive nudge", mode);
                    return;
                }
                let changed = {
                    let mut state = self.state();
                    let changed = state.mode != Some(mode);
                    state.mode = Some(mode);
                    state.last_known_good = Some(mode);
                    changed
                };
                if changed {
                    info!("Headset switched to {} mode", mode);
                    self.publish(LinkEvent::ModeChanged { mode, hardware_initiated: true });
                }
            }
        }
    }
}

/// Owns the session with the headset hardware abstraction layer.
///
/// Hardware calls are serialized through one async lock. Failures are reported to the
/// caller and never retried here.
pub struct LinkManager {
    hal: Arc<dyn HeadsetHal>,
    default_mode: Mutex<RenderMode>,
    shared: Arc<LinkShared>,
    op_lock: tokio::sync::Mutex<()>,
    event_pump: Mutex<Option<ServiceHandle>>,
}

impl LinkManager {
    pub fn new(hal: Arc<dyn HeadsetHal>, default_mode: RenderMode) -> Self {
        Self::with_event_capacity(hal, default_mode, DEFAULT_EVENT_CHANNEL_CAPACITY)
    }

    pub fn with_event_capacity(hal: Arc<dyn HeadsetHal>, default_mode: RenderMode, capacity: usize) -> Self {
        let (event_sender, _) = broadcast::channel(capacity.max(1));
        Self {
            hal,
            default_mode: Mutex::new(default_mode),
            shared: Arc::new(LinkShared {
                state: Mutex::new(LinkState::default()),
                event_sender,
                keep_alive_active: AtomicBool::new(false),
                restore_pending: AtomicBool::new(false),
                release_requested: AtomicBool::new(false),
            }),
            op_lock: tokio::sync::Mutex::new(()),
            event_pump: Mutex::new(None),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LinkEvent> {
        self.shared.event_sender.subscribe()
    }

    pub fn state(&self) -> LinkState {
        *self.shared.state()
    }

    pub fn status(&self) -> LinkStatus {
        self.shared.state().status
    }

    pub fn is_ready(&self) -> bool {
        self.status() == LinkStatus::Ready
    }

    /// Replaces the mode requested on the next `initialize`. Mode requests made while the
    /// link is down land here so the hardware picks them up once it comes back.
    pub fn set_default_mode(&self, mode: RenderMode) {
        *self.default_mode.lock().unwrap_or_else(PoisonError::into_inner) = mode;
    }

    fn default_mode(&self) -> RenderMode {
        *self.default_mode.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Opens the hardware session and requests the default render mode.
    ///
    /// A failed default-mode request leaves the link `Ready` with the hardware's own mode.
    pub async fn initialize(&self) -> InitOutcome {
        let _op = self.op_lock.lock().await;
        if self.is_ready() {
            debug!("Link already initialized");
            return InitOutcome::Success;
        }
        self.shared.release_requested.store(false, Ordering::SeqCst);
        self.shared.restore_pending.store(false, Ordering::SeqCst);
        self.shared.set_status(LinkStatus::Initializing);

        let code = self.hal.init().await;
        if let Err(e) = LinkError::check(code) {
            warn!("Headset link initialization failed: {}", e);
            self.shared.set_status(LinkStatus::Error(code));
            return InitOutcome::from(code);
        }

        self.start_event_pump();

        match self.hal.get_mode().await {
            Ok(mode) => {
                let mut state = self.shared.state();
                state.mode = Some(mode);
                state.last_known_good = Some(mode);
            }
            Err(code) => debug!("Hardware mode query failed after init: {:?}", code),
        }
        self.shared.set_status(LinkStatus::Ready);
        info!("Headset link ready");

        let default_mode = self.default_mode();
        match LinkError::check(self.hal.set_mode(default_mode.is_stereo()).await) {
            Ok(()) => self.record_mode(default_mode),
            Err(e) => warn!("Failed to apply default {} mode, keeping hardware default: {}", default_mode, e),
        }
        InitOutcome::Success
    }

    /// Requests a render mode change. On failure nothing changes.
    pub async fn set_mode(&self, mode: RenderMode) -> Result<(), LinkError> {
        let _op = self.op_lock.lock().await;
        if !self.is_ready() {
            return Err(LinkError::NotReady);
        }
        LinkError::check(self.hal.set_mode(mode.is_stereo()).await).inspect_err(|e| {
            warn!("Headset rejected {} mode: {}", mode, e);
        })?;
        self.record_mode(mode);
        Ok(())
    }

    /// Queries the hardware and refreshes the reported mode.
    pub async fn get_mode(&self) -> Result<RenderMode, LinkError> {
        let _op = self.op_lock.lock().await;
        if !self.is_ready() {
            return Err(LinkError::NotReady);
        }
        let mode = self
            .hal
            .get_mode()
            .await
            .map_err(|code| LinkError::from_code(code).unwrap_or(LinkError::Unknown))?;
        self.shared.state().mode = Some(mode);
        Ok(mode)
    }

    /// Best-effort nudge: last-known-good mode, its opposite, then last-known-good again.
    /// No acknowledgement from the hardware is awaited beyond the result codes. The whole
    /// nudge holds the operation lock, so mode requests and release queue behind it.
    pub async fn refresh_keep_alive(&self) -> Result<(), LinkError> {
        let _op = self.op_lock.lock().await;
        if self.shared.release_requested.load(Ordering::SeqCst) {
            return Ok(());
        }
        let target = {
            let state = self.shared.state();
            if state.status != LinkStatus::Ready {
                return Err(LinkError::NotReady);
            }
            state.last_known_good.or(state.mode).unwrap_or(self.default_mode())
        };
        debug!("Keep-alive nudge around {} mode", target);

        self.shared.keep_alive_active.store(true, Ordering::SeqCst);
        let result = self.nudge(target).await;
        self.shared.keep_alive_active.store(false, Ordering::SeqCst);
        result
    }

    async fn nudge(&self, target: RenderMode) -> Result<(), LinkError> {
        LinkError::check(self.hal.set_mode(target.opposite().is_stereo()).await)
            .inspect_err(|e| warn!("Keep-alive nudge failed on first step: {}", e))?;
        self.shared.restore_pending.store(true, Ordering::SeqCst);
        LinkError::check(self.hal.set_mode(target.is_stereo()).await)
            .inspect_err(|e| warn!("Keep-alive nudge could not restore {} mode: {}", target, e))?;
        self.shared.restore_pending.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Closes the hardware session. Restores the last-known-good mode first when a
    /// keep-alive nudge left the hardware on the opposite mode. Calling it again is a no-op.
    pub async fn release(&self) {
        self.shared.release_requested.store(true, Ordering::SeqCst);
        self.stop_event_pump();

        let _op = self.op_lock.lock().await;
        let state = self.state();
        if state.status == LinkStatus::Uninitialized {
            return;
        }

        if self.shared.restore_pending.swap(false, Ordering::SeqCst) {
            if let Some(mode) = state.last_known_good {
                if let Err(e) = LinkError::check(self.hal.set_mode(mode.is_stereo()).await) {
                    warn!("Failed to restore {} mode before release: {}", mode, e);
                }
            }
        }

        self.hal.release().await;
        *self.shared.state() = LinkState::default();
        self.shared.publish(LinkEvent::StatusChanged(LinkStatus::Uninitialized));
        info!("Headset link released");
    }

    fn record_mode(&self, mode: RenderMode) {
        {
            let mut state = self.shared.state();
            state.mode = Some(mode);
            state.last_known_good = Some(mode);
        }
        self.shared.publish(LinkEvent::ModeChanged { mode, hardware_initiated: false });
    }

    fn start_event_pump(&self) {
        let mut stream = match self.hal.listen_to_events() {
            Ok(stream) => stream,
            Err(code) => {
                warn!("Could not register headset event listener: {:?}", code);
                return;
            }
        };
        let shared = self.shared.clone();
        let handle = spawn_service(move |mut stop| async move {
            loop {
                tokio::select! {
                    _ = stop.signaled() => break,
                    event = stream.next() => match event {
                        Some(event) => shared.on_hal_event(event),
                        None => {
                            debug!("Headset event stream ended");
                            break;
                        }
                    }
                }
            }
        });
        let previous = self
            .event_pump
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(handle);
        if let Some(previous) = previous {
            previous.stop_now();
        }
    }

    fn stop_event_pump(&self) {
        let handle = self.event_pump.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(handle) = handle {
            handle.stop_now();
        }
    }
}

impl LinkKeepAlive for LinkManager {
    fn is_ready(&self) -> bool {
        LinkManager::is_ready(self)
    }

    async fn refresh_keep_alive(&self) -> Result<(), LinkError> {
        LinkManager::refresh_keep_alive(self).await
    }
}
