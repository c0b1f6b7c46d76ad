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

use log::debug;
use tokio::sync::broadcast::{self, error::TryRecvError};

use crate::definitions::{LinkStatus, RenderMode};
use crate::hud::frame::ViewHandle;
use crate::hud::widget::{HudWidget, WidgetCore};
use crate::hud::widgets::LINK_WIDGET_ID;
use crate::link_manager::{LinkEvent, LinkState};

/// Headset link readout, fed by link events.
pub struct LinkStatusWidget {
    core: WidgetCore,
    events: broadcast::Receiver<LinkEvent>,
    status: LinkStatus,
    mode: Option<RenderMode>,
}

impl LinkStatusWidget {
    pub fn new(initial: LinkState, events: broadcast::Receiver<LinkEvent>) -> Self {
        Self { core: WidgetCore::new(LINK_WIDGET_ID), events, status: initial.status, mode: initial.mode }
    }

    /// Applies every pending event. Returns true when something changed.
    fn drain(&mut self) -> bool {
        let mut changed = false;
        loop {
            match self.events.try_recv() {
                Ok(LinkEvent::StatusChanged(status)) => {
                    changed |= self.status != status;
                    self.status = status;
                }
                Ok(LinkEvent::ModeChanged { mode, .. }) => {
                    changed |= self.mode != Some(mode);
                    self.mode = Some(mode);
                }
                Err(TryRecvError::Lagged(n)) => debug!("Link widget skipped {} events", n),
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
        changed
    }

    fn label(&self) -> String {
        match (self.status, self.mode) {
            (LinkStatus::Ready, Some(mode)) => format!("Link {}", mode),
            (LinkStatus::Ready, None) => "Link ready".to_string(),
            (LinkStatus::Initializing, _) => "Link...".to_string(),
            (LinkStatus::Uninitialized, _) => "Link off".to_string(),
            (LinkStatus::Error(_), _) => "Link error".to_string(),
        }
    }

    fn show(&self) {
        self.core.set_text(&self.label());
    }
}

impl HudWidget for LinkStatusWidget {
    fn id(&self) -> &str {
        self.core.id()
    }

    fn initialize(&mut self) {
        self.core.ensure_views();
        self.drain();
        self.show();
    }

    fn set_render_mode(&mut self, mode: RenderMode) {
        self.core.set_mode(mode);
    }

    fn set_visible(&mut self, visible: bool) {
        self.core.set_visible(visible);
    }

    fn update(&mut self) {
        if self.drain() {
            self.show();
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
    use crate::definitions::HalResultCode;

    #[test]
    fn follows_link_events() {
        let (tx, rx) = broadcast::channel(8);
        let mut widget = LinkStatusWidget::new(LinkState::default(), rx);
        widget.initialize();
        let view = widget.mono_view().unwrap();
        assert_eq!(view.snapshot().text, "Link off");

        tx.send(LinkEvent::StatusChanged(LinkStatus::Ready)).unwrap();
        tx.send(LinkEvent::ModeChanged { mode: RenderMode::Stereo, hardware_initiated: true }).unwrap();
        widget.update();
        assert_eq!(view.snapshot().text, "Link stereo");

        tx.send(LinkEvent::StatusChanged(LinkStatus::Error(HalResultCode::Timeout))).unwrap();
        widget.update();
        assert_eq!(view.snapshot().text, "Link error");
    }
}
