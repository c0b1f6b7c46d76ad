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

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::definitions::{
    RenderMode, DEFAULT_EVENT_CHANNEL_CAPACITY, DEFAULT_HUD_CLOCK_PERIOD, DEFAULT_POWER_GUARD_TIMEOUT,
};

/// Tunables of the HUD runtime. Every field has a default so partial config files are accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Render mode requested from the headset after the link comes up.
    pub default_render_mode: RenderMode,

    /// Pin the runtime to mono rendering; stereo requests are coerced to mono.
    pub force_mono: bool,

    /// Cadence of the shared HUD clock, in milliseconds.
    pub hud_clock_period_ms: u64,

    /// Safety ceiling applied when the power guard is acquired, in seconds.
    pub power_guard_timeout_secs: u64,

    pub event_channel_capacity: usize,

    /// Text shown in the persistent presence notice.
    pub presence_title: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            default_render_mode: RenderMode::default(),
            force_mono: false,
            hud_clock_period_ms: DEFAULT_HUD_CLOCK_PERIOD.as_millis() as u64,
            power_guard_timeout_secs: DEFAULT_POWER_GUARD_TIMEOUT.as_secs(),
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            presence_title: "Glasses HUD active".to_string(),
        }
    }
}

impl RuntimeConfig {
    pub fn hud_clock_period(&self) -> Duration {
        Duration::from_millis(self.hud_clock_period_ms.max(1))
    }

    pub fn power_guard_timeout(&self) -> Duration {
        Duration::from_secs(self.power_guard_timeout_secs)
    }

    /// Applies the mono policy to a requested mode.
    pub fn effective_mode(&self, requested: RenderMode) -> RenderMode {
        if self.force_mono {
            RenderMode::Mono
        } else {
            requested
        }
    }

    pub fn event_channel_capacity(&self) -> usize {
        self.event_channel_capacity.max(1)
    }
}
