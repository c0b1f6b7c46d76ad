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

use chrono::NaiveDateTime;

use crate::definitions::RenderMode;
use crate::hud::frame::ViewHandle;
use crate::hud::widget::{HudWidget, WidgetCore};
use crate::hud::widgets::{CLOCK_WIDGET_ID, DATE_WIDGET_ID};

/// Host wall clock, in local time.
pub trait WallClock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

pub struct SystemWallClock;

impl WallClock for SystemWallClock {
    fn now(&self) -> NaiveDateTime {
        chrono::Local::now().naive_local()
    }
}

/// Formats the wall clock into its views on every tick.
pub struct ClockWidget {
    core: WidgetCore,
    clock: Arc<dyn WallClock>,
    format: &'static str,
}

impl ClockWidget {
    /// Time of day, `HH:MM`.
    pub fn time(clock: Arc<dyn WallClock>) -> Self {
        Self { core: WidgetCore::new(CLOCK_WIDGET_ID), clock, format: "%H:%M" }
    }

    /// Weekday, day and month.
    pub fn date(clock: Arc<dyn WallClock>) -> Self {
        Self { core: WidgetCore::new(DATE_WIDGET_ID), clock, format: "%a %d %b" }
    }

    fn refresh(&mut self) {
        let text = self.clock.now().format(self.format).to_string();
        self.core.set_text(&text);
    }
}

impl HudWidget for ClockWidget {
    fn id(&self) -> &str {
        self.core.id()
    }

    fn initialize(&mut self) {
        self.core.ensure_views();
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
    use chrono::NaiveDate;
    use std::sync::Mutex;

    struct FixedClock(Mutex<NaiveDateTime>);

    impl WallClock for FixedClock {
        fn now(&self) -> NaiveDateTime {
            *self.0.lock().unwrap()
        }
    }

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 14).unwrap().and_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn clock_follows_wall_time() {
        let clock = Arc::new(FixedClock(Mutex::new(at(9, 5))));
        let mut widget = ClockWidget::time(clock.clone());
        widget.initialize();
        assert_eq!(widget.mono_view().unwrap().snapshot().text, "09:05");
        *clock.0.lock().unwrap() = at(23, 59);
        widget.update();
        assert_eq!(widget.stereo_view().unwrap().snapshot().text, "23:59");
    }

    #[test]
    fn date_is_formatted() {
        let clock = Arc::new(FixedClock(Mutex::new(at(12, 0))));
        let mut widget = ClockWidget::date(clock);
        widget.initialize();
        assert_eq!(widget.id(), DATE_WIDGET_ID);
        assert_eq!(widget.mono_view().unwrap().snapshot().text, "Fri 14 Mar");
    }
}
