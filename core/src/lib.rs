pub mod config;
pub mod definitions;
pub mod errors;
pub mod service;
pub mod link_manager;
pub mod display_manager;
pub mod power_persistence;
pub mod signal_estimation;
pub mod hud;
pub mod presence;
pub mod platform;
pub mod session;

mod display_watch;
mod hud_applier;
mod orchestrator;

pub use config::RuntimeConfig;
pub use definitions::{HalResultCode, InitOutcome, LinkStatus, RenderMode, SurfaceId};
pub use display_watch::run_display_watch;
pub use hud_applier::{DirectHudApplier, HudStateApplier, HudStatus};
pub use orchestrator::Orchestrator;
pub use platform::HostPlatform;
pub use power_persistence::run_power_watch;
pub use service::{spawn_service, MultiServiceHandle, ServiceHandle, StopHandle};
pub use session::{HudControl, SessionBinding, SessionCoordinator};
