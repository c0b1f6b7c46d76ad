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

use tokio::sync::watch;

use crate::definitions::{RenderMode, MAX_SIGNAL_LEVEL};
use crate::hud::frame::ViewHandle;
use crate::hud::widget::{HudWidget, WidgetCore};
use crate::hud::widgets::SIGNAL_WIDGET_ID;
use crate::signal_estimation::SignalSample;

const BARS: usize = 4;

/// Signal bar fed by the signal estimator. Reads a sample only when a new one arrived.
pub struct SignalWidget {
    core: WidgetCore,
    samples: watch::Receiver<SignalSample>,
}

impl SignalWidget {
    pub fn new(samples: watch::Receiver<SignalSample>) -> Self {
        Self { core: WidgetCore::new(SIGNAL_WIDGET_ID), samples }
    }

    fn show(&self, sample: SignalSample) {
        let level = sample.level.min(MAX_SIGNAL_LEVEL);
        let filled = (level as usize * BARS + MAX_SIGNAL_LEVEL as usize / 2) / MAX_SIGNAL_LEVEL as usize;
        let bars: String = (0..BARS).map(|i| if i < filled { '|' } else { '.' }).collect();
        self.core.set_text(&bars);
        self.core.set_level(Some(level));
    }
}

impl HudWidget for SignalWidget {
    fn id(&self) -> &str {
        self.core.id()
    }

    fn initialize(&mut self) {
        self.core.ensure_views();
        let sample = *self.samples.borrow_and_update();
        self.show(sample);
    }

    fn set_render_mode(&mut self, mode: RenderMode) {
        self.core.set_mode(mode);
    }

    fn set_visible(&mut self, visible: bool) {
        self.core.set_visible(visible);
    }

    fn update(&mut self) {
        // a closed channel keeps the last shown value
        if self.samples.has_changed().unwrap_or(false) {
            let sample = *self.samples.borrow_and_update();
            self.show(sample);
        }
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
    use crate::signal_estimation::SampleSource;

    fn sample(level: u8, seq: u64) -> SignalSample {
        SignalSample { level, seq, source: SampleSource::Listener }
    }

    #[test]
    fn bars_follow_latest_sample() {
        let (tx, rx) = watch::channel(SignalSample::default());
        let mut widget = SignalWidget::new(rx);
        widget.initialize();
        let view = widget.mono_view().unwrap();
        assert_eq!(view.snapshot().text, "||..");
        assert_eq!(view.snapshot().level, Some(50));

        tx.send(sample(MAX_SIGNAL_LEVEL, 1)).unwrap();
        widget.update();
        assert_eq!(view.snapshot().text, "||||");

        tx.send(sample(0, 2)).unwrap();
        widget.update();
        assert_eq!(view.snapshot().text, "....");
    }
}
