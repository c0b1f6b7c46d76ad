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

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Highest value a normalized signal sample can take.
pub const MAX_SIGNAL_LEVEL: u8 = 100;

/// Level reported when no real radio reading can be obtained.
pub const NEUTRAL_SIGNAL_LEVEL: u8 = MAX_SIGNAL_LEVEL / 2;

/// Highest coarse level reported by host radio APIs (bars).
pub const MAX_COARSE_SIGNAL_LEVEL: u8 = 4;

pub const DEFAULT_HUD_CLOCK_PERIOD: Duration = Duration::from_secs(1);

/// Safety ceiling for the power guard. The guard is released explicitly on teardown;
/// the timeout only covers a missed release.
pub const DEFAULT_POWER_GUARD_TIMEOUT: Duration = Duration::from_secs(10 * 60);

pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 64;

/// How the overlay is laid out on the headset panel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderMode {
    /// One image shared by both eyes.
    #[default]
    Mono,
    /// A pair of per-eye images.
    Stereo,
}

impl RenderMode {
    pub fn opposite(self) -> Self {
        match self {
            RenderMode::Mono => RenderMode::Stereo,
            RenderMode::Stereo => RenderMode::Mono,
        }
    }

    pub fn is_stereo(self) -> bool {
        self == RenderMode::Stereo
    }

    /// Hardware abstraction layer encodes the mode as a single "stereo" flag.
    pub fn from_stereo_flag(stereo: bool) -> Self {
        if stereo {
            RenderMode::Stereo
        } else {
            RenderMode::Mono
        }
    }
}

impl std::fmt::Display for RenderMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RenderMode::Mono => write!(f, "mono"),
            RenderMode::Stereo => write!(f, "stereo"),
        }
    }
}

/// Result codes returned by the headset hardware abstraction layer.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HalResultCode {
    Success = 0,
    NoDevice = 1,
    NoPermission = 2,
    InvalidArgument = 3,
    UnsupportedCommand = 4,
    ChecksumMismatch = 5,
    VersionMismatch = 6,
    IdMismatch = 7,
    InsufficientMemory = 8,
    CodeNotWritten = 9,
    Timeout = 10,
    ResponseMismatch = 11,
    Unknown = 0x7F,
}

impl HalResultCode {
    pub fn is_success(self) -> bool {
        self == HalResultCode::Success
    }
}

/// Outcome of opening the hardware link session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitOutcome {
    Success,
    NoDevice,
    NoPermission,
    UnknownError,
}

impl From<HalResultCode> for InitOutcome {
    fn from(code: HalResultCode) -> Self {
        match code {
            HalResultCode::Success => InitOutcome::Success,
            HalResultCode::NoDevice => InitOutcome::NoDevice,
            HalResultCode::NoPermission => InitOutcome::NoPermission,
            _ => InitOutcome::UnknownError,
        }
    }
}

/// Session state of the hardware link.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LinkStatus {
    #[default]
    Uninitialized,
    Initializing,
    Ready,
    Error(HalResultCode),
}

/// Identifier the host assigns to an external presentation surface.
pub type SurfaceId = u32;
