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

use crate::display_manager::DisplayHost;
use crate::hud::widgets::{BatteryHost, LocationProvider, WallClock};
use crate::link_manager::HeadsetHal;
use crate::power_persistence::{PowerRetention, ScreenPowerEvents};
use crate::presence::PresenceNotifier;
use crate::signal_estimation::RadioHost;

/// Every host service the runtime talks to.
#[derive(Clone)]
pub struct HostPlatform {
    pub hal: Arc<dyn HeadsetHal>,
    pub display: Arc<dyn DisplayHost>,
    pub screen: Arc<dyn ScreenPowerEvents>,
    pub retention: Arc<dyn PowerRetention>,
    pub radio: Arc<dyn RadioHost>,
    pub battery: Arc<dyn BatteryHost>,
    pub clock: Arc<dyn WallClock>,
    pub location: Arc<dyn LocationProvider>,
    pub presence: Arc<dyn PresenceNotifier>,
}
