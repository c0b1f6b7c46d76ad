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

use log::debug;

use crate::definitions::RenderMode;
use crate::hud::frame::ViewHandle;
use crate::hud::widget::{HudWidget, WidgetCore};
use crate::hud::widgets::LOCATION_WIDGET_ID;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

/// External geolocation provider. Fixes are produced elsewhere; the widget only reads
/// the cached last known one.
pub trait LocationProvider: Send + Sync {
    fn has_permission(&self) -> bool;

    fn last_known_location(&self) -> Option<GeoPoint>;
}

/// Position readout. Disabled until the location permission is granted, at which point
/// the framework re-initializes it.
pub struct LocationWidget {
    core: WidgetCore,
    provider: Arc<dyn LocationProvider>,
    enabled: bool,
}

impl LocationWidget {
    pub fn new(provider: Arc<dyn LocationProvider>) -> Self {
        Self { core: WidgetCore::new(LOCATION_WIDGET_ID), provider, enabled: false }
    }

    fn refresh(&self) {
        if !self.enabled {
            self.core.set_text("Location off");
            return;
        }
        match self.provider.last_known_location() {
            Some(p) => self.core.set_text(&format!("{:.4}, {:.4}", p.latitude, p.longitude)),
            None => self.core.set_text("Locating..."),
        }
    }
}

impl HudWidget for LocationWidget {
    fn id(&self) -> &str {
        self.core.id()
    }

    fn initialize(&mut self) {
        self.core.ensure_views();
        self.enabled = self.provider.has_permission();
        debug!("Location widget initialized (enabled: {})", self.enabled);
        self.refresh();
    }

    fn set_render_mode(&mut self, mode: RenderMode) {
        self.core.set_mode(mode);
    }

    fn set_visible(&mut self, visible: bool) {
        self.core.set_visible(visible);
    }

    fn update(&mut self) {
        self.refresh();
    }

    fn cleanup(&mut self) {
        self.enabled = false;
        self.core.release_views();
    }

    fn mono_view(&self) -> Option<ViewHandle> {
        self.core.mono_view()
    }

    fn stereo_view(&self) -> Option<ViewHandle> {
        self.core.stereo_view()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct FakeProvider {
        permission: AtomicBool,
    }

    impl LocationProvider for FakeProvider {
        fn has_permission(&self) -> bool {
            self.permission.load(Ordering::SeqCst)
        }
        fn last_known_location(&self) -> Option<GeoPoint> {
            Some(GeoPoint { latitude: 52.22977, longitude: 21.01178 })
        }
    }

    #[test]
    fn stays_off_until_reinitialized_with_permission() {
        let provider = Arc::new(FakeProvider { permission: AtomicBool::new(false) });
        let mut widget = LocationWidget::new(provider.clone());
        widget.initialize();
        let view = widget.mono_view().unwrap();
        widget.update();
        assert_eq!(view.snapshot().text, "Location off");

        provider.permission.store(true, Ordering::SeqCst);
        widget.initialize();
        assert!(view.same_as(&widget.mono_view().unwrap()));
        assert_eq!(view.snapshot().text, "52.2298, 21.0118");
    }
}
