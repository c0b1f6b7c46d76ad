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

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;

use log::{debug, info, warn};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::definitions::{RenderMode, SurfaceId, DEFAULT_EVENT_CHANNEL_CAPACITY};
use crate::errors::SurfaceError;
use crate::hud::frame::{FrameSink, HudFrame};

/// External surface as reported by the host display service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceInfo {
    pub id: SurfaceId,
    pub name: String,
    pub presentation_capable: bool,
}

/// Attach/detach notifications from the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceEvent {
    Added(SurfaceId),
    Removed(SurfaceId),
}

pub type SurfaceEventStream = futures::channel::mpsc::Receiver<SurfaceEvent>;

/// On-screen render target constructed on an external surface.
pub trait RenderTarget: Send + Sync {
    fn apply_mode(&self, mode: RenderMode);

    fn set_visible(&self, visible: bool);

    /// True when the host reports the underlying surface as no longer drawable.
    fn is_stale(&self) -> bool;

    fn present(&self, frame: &HudFrame);

    fn dismiss(&self);
}

/// Host display service.
///
/// Implementations must not call back into [`DisplayManager`] synchronously from these methods.
pub trait DisplayHost: Send + Sync {
    fn list_surfaces(&self) -> Vec<SurfaceInfo>;

    fn create_render_target(
        &self,
        surface: &SurfaceInfo,
        mode: RenderMode,
    ) -> Result<Box<dyn RenderTarget>, SurfaceError>;

    fn watch_surfaces(&self) -> Result<SurfaceEventStream, SurfaceError>;
}

/// Live binding between an external surface and the render target drawn on it.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderSession {
    pub session_id: Uuid,
    pub surface_id: SurfaceId,
    pub mode: RenderMode,
    pub visible: bool,
    pub created_at: SystemTime,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DisplayEvent {
    Connected(RenderSession),
    /// The render target was rebuilt on the same surface.
    Rebuilt(RenderSession),
    Disconnected { surface_id: SurfaceId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotPhase {
    NoSurface,
    Detected(SurfaceId),
    Bound(SurfaceId),
}

/// What the power persistence controller needs from the display side.
pub trait DisplayRefresh: Send + Sync {
    fn ensure_active(&self);
}

enum SurfaceSlot {
    NoSurface,
    Detected(SurfaceId),
    Bound {
        session: RenderSession,
        target: Box<dyn RenderTarget>,
    },
}

struct DisplayState {
    slot: SurfaceSlot,
    commanded_mode: RenderMode,
    visible: bool,
}

/// Owns the single external-surface slot.
///
/// Every create/teardown sequence runs under one lock, so a bound session is never
/// replaced half-way.
pub struct DisplayManager {
    host: Arc<dyn DisplayHost>,
    state: Mutex<DisplayState>,
    event_sender: broadcast::Sender<DisplayEvent>,
}

impl DisplayManager {
    pub fn new(host: Arc<dyn DisplayHost>, initial_mode: RenderMode) -> Self {
        Self::with_event_capacity(host, initial_mode, DEFAULT_EVENT_CHANNEL_CAPACITY)
    }

    pub fn with_event_capacity(host: Arc<dyn DisplayHost>, initial_mode: RenderMode, capacity: usize) -> Self {
        let (event_sender, _) = broadcast::channel(capacity.max(1));
        Self {
            host,
            state: Mutex::new(DisplayState {
                slot: SurfaceSlot::NoSurface,
                commanded_mode: initial_mode,
                visible: true,
            }),
            event_sender,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DisplayEvent> {
        self.event_sender.subscribe()
    }

    fn lock(&self) -> MutexGuard<'_, DisplayState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, event: DisplayEvent) {
        debug!("Display event: {:?}", event);
        let _ = self.event_sender.send(event);
    }

    pub fn phase(&self) -> SlotPhase {
        match &self.lock().slot {
            SurfaceSlot::NoSurface => SlotPhase::NoSurface,
            SurfaceSlot::Detected(id) => SlotPhase::Detected(*id),
            SurfaceSlot::Bound { session, .. } => SlotPhase::Bound(session.surface_id),
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.lock().slot, SurfaceSlot::Bound { .. })
    }

    pub fn current_session(&self) -> Option<RenderSession> {
        match &self.lock().slot {
            SurfaceSlot::Bound { session, .. } => Some(session.clone()),
            _ => None,
        }
    }

    pub fn commanded_mode(&self) -> RenderMode {
        self.lock().commanded_mode
    }

    pub fn on_surface_added(&self, surface_id: SurfaceId) {
        let mut state = self.lock();
        let bound = match &state.slot {
            SurfaceSlot::Bound { session, .. } => Some(session.surface_id),
            _ => None,
        };
        match bound {
            Some(bound_id) if bound_id == surface_id => {
                info!("Surface {} attached again, replacing its render session", surface_id);
                self.unbind(&mut state);
            }
            Some(bound_id) => {
                debug!("Surface {} added while {} is bound, ignoring", surface_id, bound_id);
                return;
            }
            None => {}
        }
        self.scan_and_bind(&mut state);
    }

    pub fn on_surface_removed(&self, surface_id: SurfaceId) {
        let mut state = self.lock();
        let bound_here = matches!(
            &state.slot,
            SurfaceSlot::Bound { session, .. } if session.surface_id == surface_id
        );
        if !bound_here {
            debug!("Surface {} removed, not bound", surface_id);
            return;
        }
        info!("Bound surface {} removed", surface_id);
        self.unbind(&mut state);
        self.scan_and_bind(&mut state);
    }

    /// Binds the first presentation-capable surface when nothing is bound.
    pub fn rescan(&self) {
        let mut state = self.lock();
        if matches!(state.slot, SurfaceSlot::NoSurface) {
            self.scan_and_bind(&mut state);
        }
    }

    /// Stores the mode and applies it to the bound target, if any.
    pub fn set_render_mode(&self, mode: RenderMode) {
        let mut state = self.lock();
        state.commanded_mode = mode;
        if let SurfaceSlot::Bound { session, target } = &mut state.slot {
            if session.mode != mode {
                debug!("Applying {} mode to surface {}", mode, session.surface_id);
                target.apply_mode(mode);
                session.mode = mode;
            }
        }
    }

    pub fn set_visible(&self, visible: bool) {
        let mut state = self.lock();
        state.visible = visible;
        if let SurfaceSlot::Bound { session, target } = &mut state.slot {
            if session.visible != visible {
                target.set_visible(visible);
                session.visible = visible;
            }
        }
    }

    /// Rebuilds the render target when its surface went stale. Nothing to do when healthy
    /// or when no surface is bound.
    pub fn ensure_active(&self) {
        let mut state = self.lock();
        let surface_id = match &state.slot {
            SurfaceSlot::Bound { session, target } => {
                if !target.is_stale() {
                    return;
                }
                session.surface_id
            }
            _ => return,
        };
        warn!("Render target on surface {} is stale, rebuilding", surface_id);
        if let SurfaceSlot::Bound { target, .. } = &state.slot {
            target.dismiss();
        }

        let surface = self.host.list_surfaces().into_iter().find(|s| s.id == surface_id);
        let rebuilt = match surface {
            Some(surface) => self.create_session(&state, &surface),
            None => Err(SurfaceError::InvalidSurface(surface_id)),
        };
        match rebuilt {
            Ok((session, target)) => {
                state.slot = SurfaceSlot::Bound { session: session.clone(), target };
                self.publish(DisplayEvent::Rebuilt(session));
            }
            Err(e) => {
                warn!("Could not rebuild render target: {}", e);
                state.slot = SurfaceSlot::NoSurface;
                self.publish(DisplayEvent::Disconnected { surface_id });
            }
        }
    }

    /// Explicit unbind. Safe in any state.
    pub fn teardown(&self) {
        let mut state = self.lock();
        self.unbind(&mut state);
    }

    fn unbind(&self, state: &mut DisplayState) {
        let previous = std::mem::replace(&mut state.slot, SurfaceSlot::NoSurface);
        if let SurfaceSlot::Bound { session, target } = previous {
            target.dismiss();
            info!("Render session {} on surface {} closed", session.session_id, session.surface_id);
            self.publish(DisplayEvent::Disconnected { surface_id: session.surface_id });
        }
    }

    fn scan_and_bind(&self, state: &mut DisplayState) {
        let Some(surface) = self.host.list_surfaces().into_iter().find(|s| s.presentation_capable) else {
            debug!("No presentation-capable surface available");
            state.slot = SurfaceSlot::NoSurface;
            return;
        };
        state.slot = SurfaceSlot::Detected(surface.id);

        match self.create_session(state, &surface) {
            Ok((session, target)) => {
                info!(
                    "Render session {} bound to surface {} (\"{}\") in {} mode",
                    session.session_id, surface.id, surface.name, session.mode
                );
                state.slot = SurfaceSlot::Bound { session: session.clone(), target };
                self.publish(DisplayEvent::Connected(session));
            }
            Err(e) => {
                warn!("Failed to bind surface {}: {}", surface.id, e);
                state.slot = SurfaceSlot::NoSurface;
            }
        }
    }

    fn create_session(
        &self,
        state: &DisplayState,
        surface: &SurfaceInfo,
    ) -> Result<(RenderSession, Box<dyn RenderTarget>), SurfaceError> {
        let mode = state.commanded_mode;
        let target = self.host.create_render_target(surface, mode)?;
        target.apply_mode(mode);
        target.set_visible(state.visible);
        let session = RenderSession {
            session_id: Uuid::new_v4(),
            surface_id: surface.id,
            mode,
            visible: state.visible,
            created_at: SystemTime::now(),
        };
        Ok((session, target))
    }
}

impl DisplayRefresh for DisplayManager {
    fn ensure_active(&self) {
        DisplayManager::ensure_active(self)
    }
}

impl FrameSink for DisplayManager {
    fn present(&self, frame: &HudFrame) {
        let state = self.lock();
        if let SurfaceSlot::Bound { session, target } = &state.slot {
            if session.visible {
                target.present(frame);
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    pub(crate) struct TargetProbe {
        pub created: AtomicUsize,
        pub dismissed: AtomicUsize,
        pub presented: AtomicUsize,
        pub stale: AtomicBool,
        pub modes: Mutex<Vec<RenderMode>>,
    }

    struct MockTarget {
        probe: Arc<TargetProbe>,
    }

    impl RenderTarget for MockTarget {
        fn apply_mode(&self, mode: RenderMode) {
            self.probe.modes.lock().unwrap().push(mode);
        }
        fn set_visible(&self, _visible: bool) {}
        fn is_stale(&self) -> bool {
            self.probe.stale.load(Ordering::SeqCst)
        }
        fn present(&self, _frame: &HudFrame) {
            self.probe.presented.fetch_add(1, Ordering::SeqCst);
        }
        fn dismiss(&self) {
            self.probe.dismissed.fetch_add(1, Ordering::SeqCst);
        }
    }

    pub(crate) struct MockDisplayHost {
        pub surfaces: Mutex<Vec<SurfaceInfo>>,
        pub fail_create: AtomicBool,
        pub probe: Arc<TargetProbe>,
        pub events_tx: Mutex<Option<futures::channel::mpsc::Sender<SurfaceEvent>>>,
    }

    impl MockDisplayHost {
        pub(crate) fn new() -> Arc<Self> {
            Arc::new(Self {
                surfaces: Mutex::new(Vec::new()),
                fail_create: AtomicBool::new(false),
                probe: Arc::new(TargetProbe::default()),
                events_tx: Mutex::new(None),
            })
        }

        pub(crate) fn attach(&self, id: SurfaceId) {
            self.surfaces.lock().unwrap().push(SurfaceInfo {
                id,
                name: format!("glasses-{}", id),
                presentation_capable: true,
            });
        }

        pub(crate) fn detach(&self, id: SurfaceId) {
            self.surfaces.lock().unwrap().retain(|s| s.id != id);
        }

        pub(crate) fn live_targets(&self) -> usize {
            self.probe.created.load(Ordering::SeqCst) - self.probe.dismissed.load(Ordering::SeqCst)
        }
    }

    impl DisplayHost for MockDisplayHost {
        fn list_surfaces(&self) -> Vec<SurfaceInfo> {
            self.surfaces.lock().unwrap().clone()
        }

        fn create_render_target(
            &self,
            surface: &SurfaceInfo,
            _mode: RenderMode,
        ) -> Result<Box<dyn RenderTarget>, SurfaceError> {
            if self.fail_create.load(Ordering::SeqCst) {
                return Err(SurfaceError::InvalidSurface(surface.id));
            }
            self.probe.created.fetch_add(1, Ordering::SeqCst);
            self.probe.stale.store(false, Ordering::SeqCst);
            Ok(Box::new(MockTarget { probe: self.probe.clone() }))
        }

        fn watch_surfaces(&self) -> Result<SurfaceEventStream, SurfaceError> {
            let (tx, rx) = futures::channel::mpsc::channel(16);
            *self.events_tx.lock().unwrap() = Some(tx);
            Ok(rx)
        }
    }

    fn manager(host: &Arc<MockDisplayHost>) -> DisplayManager {
        DisplayManager::new(host.clone(), RenderMode::Mono)
    }

    #[test]
    fn attach_binds_and_notifies() {
        let host = MockDisplayHost::new();
        let display = manager(&host);
        let mut rx = display.subscribe();
        host.attach(7);
        display.on_surface_added(7);
        assert_eq!(display.phase(), SlotPhase::Bound(7));
        match rx.try_recv().unwrap() {
            DisplayEvent::Connected(session) => assert_eq!(session.surface_id, 7),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn reattach_of_bound_surface_replaces_session() {
        let host = MockDisplayHost::new();
        let display = manager(&host);
        host.attach(1);
        display.on_surface_added(1);
        let first = display.current_session().unwrap();
        display.on_surface_added(1);
        let second = display.current_session().unwrap();
        assert_ne!(first.session_id, second.session_id);
        assert_eq!(host.live_targets(), 1);
    }

    #[test]
    fn at_most_one_session_for_any_attach_detach_sequence() {
        let host = MockDisplayHost::new();
        let display = manager(&host);
        let steps: [(bool, SurfaceId); 8] =
            [(true, 1), (true, 2), (true, 1), (false, 1), (true, 3), (false, 2), (false, 3), (true, 2)];
        for (attach, id) in steps {
            if attach {
                host.attach(id);
                display.on_surface_added(id);
            } else {
                host.detach(id);
                display.on_surface_removed(id);
            }
            assert!(host.live_targets() <= 1);
            assert!(!matches!(display.phase(), SlotPhase::Detected(_)));
        }
    }

    #[test]
    fn detach_rescans_to_waiting_surface() {
        let host = MockDisplayHost::new();
        let display = manager(&host);
        host.attach(1);
        host.attach(2);
        display.on_surface_added(1);
        display.on_surface_added(2);
        assert_eq!(display.phase(), SlotPhase::Bound(1));
        host.detach(1);
        display.on_surface_removed(1);
        assert_eq!(display.phase(), SlotPhase::Bound(2));
    }

    #[test]
    fn invalid_surface_clears_slot_and_next_attach_retries() {
        let host = MockDisplayHost::new();
        let display = manager(&host);
        host.attach(4);
        host.fail_create.store(true, Ordering::SeqCst);
        display.on_surface_added(4);
        assert_eq!(display.phase(), SlotPhase::NoSurface);
        host.fail_create.store(false, Ordering::SeqCst);
        display.on_surface_added(4);
        assert_eq!(display.phase(), SlotPhase::Bound(4));
    }

    #[test]
    fn mode_is_stored_without_surface_and_applied_on_bind() {
        let host = MockDisplayHost::new();
        let display = manager(&host);
        display.set_render_mode(RenderMode::Stereo);
        display.set_render_mode(RenderMode::Stereo);
        host.attach(3);
        display.on_surface_added(3);
        assert_eq!(display.current_session().unwrap().mode, RenderMode::Stereo);
        assert_eq!(*host.probe.modes.lock().unwrap(), vec![RenderMode::Stereo]);
    }

    #[test]
    fn ensure_active_is_noop_when_healthy_and_rebuilds_when_stale() {
        let host = MockDisplayHost::new();
        let display = manager(&host);
        host.attach(5);
        display.on_surface_added(5);
        display.ensure_active();
        assert_eq!(host.probe.created.load(Ordering::SeqCst), 1);

        host.probe.stale.store(true, Ordering::SeqCst);
        display.ensure_active();
        assert_eq!(host.probe.created.load(Ordering::SeqCst), 2);
        assert_eq!(host.live_targets(), 1);
        assert_eq!(display.phase(), SlotPhase::Bound(5));
    }

    #[test]
    fn ensure_active_without_surface_does_nothing() {
        let host = MockDisplayHost::new();
        let display = manager(&host);
        display.ensure_active();
        assert_eq!(display.phase(), SlotPhase::NoSurface);
    }

    #[test]
    fn teardown_is_repeatable() {
        let host = MockDisplayHost::new();
        let display = manager(&host);
        host.attach(1);
        display.on_surface_added(1);
        display.teardown();
        display.teardown();
        assert!(!display.is_connected());
        assert_eq!(host.live_targets(), 0);
    }
}
