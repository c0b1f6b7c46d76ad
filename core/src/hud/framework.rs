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
use std::time::Duration;

use log::{debug, info, warn};
use tokio::time::MissedTickBehavior;

use crate::definitions::RenderMode;
use crate::errors::HudError;
use crate::hud::frame::{FrameSink, HudFrame, ViewContainer, ViewHandle};
use crate::hud::widget::HudWidget;
use crate::service::{spawn_service, ServiceHandle};

struct WidgetRegistration {
    widget: Box<dyn HudWidget>,
    mono: ViewHandle,
    stereo: ViewHandle,
    mode: RenderMode,
    visible: bool,
}

struct Registry {
    widgets: Vec<WidgetRegistration>,
    mono: ViewContainer,
    stereo: ViewContainer,
    mode: RenderMode,
    visible: bool,
    tick: u64,
}

impl Registry {
    fn sync_containers(&mut self) {
        self.mono.set_visible(self.visible && self.mode == RenderMode::Mono);
        self.stereo.set_visible(self.visible && self.mode == RenderMode::Stereo);
    }

    fn compose(&mut self) -> HudFrame {
        for reg in self.widgets.iter_mut() {
            reg.widget.update();
        }
        self.tick += 1;
        let container = match self.mode {
            RenderMode::Mono => &self.mono,
            RenderMode::Stereo => &self.stereo,
        };
        HudFrame {
            tick: self.tick,
            mode: self.mode,
            visible: container.is_visible(),
            views: container.snapshot(),
        }
    }
}

/// Registry of overlay widgets refreshed from one shared clock.
///
/// The clock only runs while a render target is attached; see [`HudFramework::start_clock`].
pub struct HudFramework {
    registry: Arc<Mutex<Registry>>,
    clock: Mutex<Option<ServiceHandle>>,
    period: Duration,
}

impl HudFramework {
    pub fn new(period: Duration) -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry {
                widgets: Vec::new(),
                mono: ViewContainer::default(),
                stereo: ViewContainer::default(),
                mode: RenderMode::Mono,
                visible: true,
                tick: 0,
            })),
            clock: Mutex::new(None),
            period,
        }
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Initializes the widget and places its views into the mono and stereo containers.
    pub fn register(&self, mut widget: Box<dyn HudWidget>) -> Result<(), HudError> {
        let mut registry = self.registry();
        let id = widget.id().to_string();
        if registry.widgets.iter().any(|r| r.widget.id() == id) {
            return Err(HudError::DuplicateWidget(id));
        }

        widget.initialize();
        let (Some(mono), Some(stereo)) = (widget.mono_view(), widget.stereo_view()) else {
            widget.cleanup();
            return Err(HudError::MissingViews(id));
        };

        let (mode, visible) = (registry.mode, registry.visible);
        widget.set_render_mode(mode);
        widget.set_visible(visible);
        registry.mono.add(&id, mono.clone());
        registry.stereo.add(&id, stereo.clone());
        registry.widgets.push(WidgetRegistration { widget, mono, stereo, mode, visible });
        registry.sync_containers();
        debug!("Widget \"{}\" registered", id);
        Ok(())
    }

    /// Runs `initialize` again on one widget, e.g. after a permission grant.
    pub fn reinitialize_widget(&self, id: &str) -> bool {
        let mut registry = self.registry();
        let Some(reg) = registry.widgets.iter_mut().find(|r| r.widget.id() == id) else {
            return false;
        };
        reg.widget.initialize();
        let views_kept = matches!(
            (reg.widget.mono_view(), reg.widget.stereo_view()),
            (Some(m), Some(s)) if m.same_as(&reg.mono) && s.same_as(&reg.stereo)
        );
        if !views_kept {
            warn!("Widget \"{}\" replaced its views on re-initialization", id);
        }
        reg.widget.set_render_mode(reg.mode);
        reg.widget.set_visible(reg.visible);
        info!("Widget \"{}\" re-initialized", id);
        true
    }

    pub fn set_render_mode(&self, mode: RenderMode) {
        let mut registry = self.registry();
        registry.mode = mode;
        for reg in registry.widgets.iter_mut() {
            reg.widget.set_render_mode(mode);
            reg.mode = mode;
        }
        registry.sync_containers();
    }

    pub fn set_visible(&self, visible: bool) {
        let mut registry = self.registry();
        registry.visible = visible;
        for reg in registry.widgets.iter_mut() {
            reg.widget.set_visible(visible);
            reg.visible = visible;
        }
        registry.sync_containers();
    }

    pub fn render_mode(&self) -> RenderMode {
        self.registry().mode
    }

    pub fn is_visible(&self) -> bool {
        self.registry().visible
    }

    pub fn widget_count(&self) -> usize {
        self.registry().widgets.len()
    }

    /// Number of views in the (mono, stereo) containers.
    pub fn container_sizes(&self) -> (usize, usize) {
        let registry = self.registry();
        (registry.mono.len(), registry.stereo.len())
    }

    /// Visibility of the (mono, stereo) containers.
    pub fn container_visibility(&self) -> (bool, bool) {
        let registry = self.registry();
        (registry.mono.is_visible(), registry.stereo.is_visible())
    }

    /// Updates every widget once and composes the frame of the shown container.
    pub fn update_all(&self) -> HudFrame {
        self.registry().compose()
    }

    /// Starts the shared clock presenting frames into `sink`. Restarts it when already running.
    pub fn start_clock(&self, sink: Arc<dyn FrameSink>) {
        let registry = self.registry.clone();
        let period = self.period;
        let handle = spawn_service(move |mut stop| async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = stop.signaled() => break,
                    _ = interval.tick() => {
                        let frame = registry.lock().unwrap_or_else(PoisonError::into_inner).compose();
                        sink.present(&frame);
                    }
                }
            }
            debug!("HUD clock stopped");
        });
        let previous = self.clock.lock().unwrap_or_else(PoisonError::into_inner).replace(handle);
        if let Some(previous) = previous {
            previous.stop_now();
        }
        debug!("HUD clock started ({:?})", period);
    }

    /// Stops the clock without waiting on it.
    pub fn stop_clock(&self) {
        let handle = self.clock.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(handle) = handle {
            handle.stop_now();
        }
    }

    pub fn is_clock_running(&self) -> bool {
        self.clock
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    /// Stops the clock, cleans every widget up and empties both containers. Repeatable.
    pub fn cleanup(&self) {
        self.stop_clock();
        let mut registry = self.registry();
        for reg in registry.widgets.iter_mut() {
            reg.widget.cleanup();
        }
        let count = registry.widgets.len();
        registry.widgets.clear();
        registry.mono.clear();
        registry.stereo.clear();
        if count > 0 {
            info!("HUD cleaned up ({} widgets)", count);
        }
    }
}
