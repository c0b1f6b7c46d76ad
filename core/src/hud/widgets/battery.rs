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

use crate::definitions::RenderMode;
use crate::hud::frame::ViewHandle;
use crate::hud::widget::{HudWidget, WidgetCore};
use crate::hud::widgets::BATTERY_WIDGET_ID;

/// Host battery query.
pub trait BatteryHost: Send + Sync {
    /// Charge in percent, `None` when the host cannot tell.
    fn battery_percent(&self) -> Option<u8>;
}

pub struct BatteryWidget {
    core: WidgetCore,
    battery: Arc<dyn BatteryHost>,
    last: Option<Option<u8>>,
}

impl BatteryWidget {
    pub fn new(battery: Arc<dyn BatteryHost>) -> Self {
        Self { core: WidgetCore::new(BATTERY_WIDGET_ID), battery, last: None }
    }

    fn refresh(&mut self) {
        let percent = self.battery.battery_percent().map(|p| p.min(100));
        if self.last == Some(percent) {
            return;
        }
        self.last = Some(percent);
        match percent {
            Some(p) => self.core.set_text(&format!("{}%", p)),
            None => self.core.set_text("--%"),
        }
        self.core.set_level(percent);
    }
}

impl HudWidget for BatteryWidget {
    fn id(&self) -> &str {
        self.core.id()
    }

    fn initialize(&mut self) {
        self.core.ensure_views();
        self.last = None;
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
    use std::sync::Mutex;

    struct FakeBattery(Mutex<Option<u8>>);

    impl BatteryHost for FakeBattery {
        fn battery_percent(&self) -> Option<u8> {
            *self.0.lock().unwrap()
        }
    }

    #[test]
    fn shows_percentage_and_unknown() {
        let battery = Arc::new(FakeBattery(Mutex::new(Some(87))));
        let mut widget = BatteryWidget::new(battery.clone());
        widget.initialize();
        let view = widget.mono_view().unwrap();
        assert_eq!(view.snapshot().text, "87%");
        assert_eq!(view.snapshot().level, Some(87));

        *battery.0.lock().unwrap() = None;
        widget.update();
        assert_eq!(view.snapshot().text, "--%");
        assert_eq!(view.snapshot().level, None);
    }
}
