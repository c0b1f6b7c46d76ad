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

//! Built-in overlay widgets.

mod battery;
mod clock;
mod link_status;
mod location;
mod signal;

pub use battery::{BatteryHost, BatteryWidget};
pub use clock::{ClockWidget, SystemWallClock, WallClock};
pub use link_status::LinkStatusWidget;
pub use location::{GeoPoint, LocationProvider, LocationWidget};
pub use signal::SignalWidget;

pub const CLOCK_WIDGET_ID: &str = "clock";
pub const DATE_WIDGET_ID: &str = "date";
pub const BATTERY_WIDGET_ID: &str = "battery";
pub const SIGNAL_WIDGET_ID: &str = "signal";
pub const LINK_WIDGET_ID: &str = "link";
pub const LOCATION_WIDGET_ID: &str = "location";
