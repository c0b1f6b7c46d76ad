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

use crate::definitions::{LinkStatus, RenderMode};
use crate::display_manager::{DisplayManager, RenderSession};
use crate::hud::{FrameSink, HudFramework};
use crate::presence::PresenceIndicator;

/// Overall session state as seen by the router.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HudStatus {
    pub display_connected: bool,
    pub link: LinkStatus,
    pub mode: RenderMode,
}

impl HudStatus {
    /// One-line description used for the presence notice.
    pub fn describe(&self) -> String {
        if !self.display_connected {
            return "Waiting for glasses display".to_string();
        }
        match self.link {
            LinkStatus::Ready => format!("Glasses connected ({})", self.mode),
            LinkStatus::Initializing => "Glasses display connected, starting headset link".to_string(),
            LinkStatus::Uninitialized => "Glasses display connected, headset link off".to_string(),
            LinkStatus::Error(code) => format!("Glasses display connected, headset link error ({:?})", code),
        }
    }
}

/// Side effects the router applies when the session changes.
///
/// Separates routing policy from the components it drives, so the policy can be
/// exercised without a display host or a running clock.
pub trait HudStateApplier: Send + Sync {
    /// A render session became usable: sync the HUD to it and (re)start the clock.
    fn attach_session(&self, session: &RenderSession);

    /// The bound surface is gone: stop refreshing.
    fn detach_session(&self);

    /// The headset switched mode.
    fn apply_mode(&self, mode: RenderMode);

    fn report(&self, status: &HudStatus);

    /// The mode last commanded to the display, whichever path commanded it.
    fn commanded_mode(&self) -> RenderMode;

    /// The session bound right now; used to catch up after missed events.
    fn current_session(&self) -> Option<RenderSession>;
}

/// Applier driving the real display manager, HUD framework and presence notice.
pub struct DirectHudApplier {
    display: Arc<DisplayManager>,
    hud: Arc<HudFramework>,
    presence: Arc<PresenceIndicator>,
}

impl DirectHudApplier {
    pub fn new(display: Arc<DisplayManager>, hud: Arc<HudFramework>, presence: Arc<PresenceIndicator>) -> Self {
        Self { display, hud, presence }
    }
}

impl HudStateApplier for DirectHudApplier {
    fn attach_session(&self, session: &RenderSession) {
        self.hud.set_render_mode(session.mode);
        self.hud.set_visible(session.visible);
        let sink: Arc<dyn FrameSink> = self.display.clone();
        self.hud.start_clock(sink);
    }

    fn detach_session(&self) {
        self.hud.stop_clock();
    }

    fn apply_mode(&self, mode: RenderMode) {
        debug!("Applying render mode {} to display and HUD", mode);
        self.display.set_render_mode(mode);
        self.hud.set_render_mode(mode);
    }

    fn report(&self, status: &HudStatus) {
        self.presence.show(&status.describe());
    }

    fn commanded_mode(&self) -> RenderMode {
        self.display.commanded_mode()
    }

    fn current_session(&self) -> Option<RenderSession> {
        self.display.current_session()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definitions::HalResultCode;

    #[test]
    fn describe_covers_link_states() {
        let mut status = HudStatus { display_connected: false, link: LinkStatus::Ready, mode: RenderMode::Mono };
        assert_eq!(status.describe(), "Waiting for glasses display");
        status.display_connected = true;
        assert_eq!(status.describe(), "Glasses connected (mono)");
        status.link = LinkStatus::Error(HalResultCode::NoDevice);
        assert!(status.describe().contains("NoDevice"));
    }
}
