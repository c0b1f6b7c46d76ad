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

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bitflags::bitflags;
use futures::StreamExt;
use log::{debug, info, warn};

use crate::display_manager::DisplayRefresh;
use crate::link_manager::LinkKeepAlive;
use crate::service::{spawn_service, ServiceHandle};

bitflags! {
    /// Kinds of host power retention held by a [`PowerGuard`].
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
    pub struct RetentionFlags: u8 {
        /// Keeps the CPU running while the host screen is off.
        const CPU = 0b0000_0001;
        /// Keeps the external surface from being suspended.
        const SURFACE = 0b0000_0010;
    }
}

/// Host power-retention primitive (acquire with a safety timeout, release, query).
pub trait PowerRetention: Send + Sync {
    fn acquire(&self, kind: RetentionFlags, timeout: Duration);

    fn release(&self, kind: RetentionFlags);

    fn is_held(&self, kind: RetentionFlags) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScreenEvent {
    On,
    Off,
}

pub type ScreenEventStream = futures::channel::mpsc::Receiver<ScreenEvent>;

/// Host screen on/off broadcasts.
pub trait ScreenPowerEvents: Send + Sync {
    fn watch_screen(&self) -> anyhow::Result<ScreenEventStream>;
}

/// Scoped {cpu, surface} retention. Held state is a flag set, so repeated acquires or
/// releases collapse into one. Dropping the guard releases whatever is still held.
pub struct PowerGuard {
    retention: Arc<dyn PowerRetention>,
    held: Mutex<RetentionFlags>,
    timeout: Duration,
}

impl PowerGuard {
    pub fn new(retention: Arc<dyn PowerRetention>, timeout: Duration) -> Self {
        Self { retention, held: Mutex::new(RetentionFlags::empty()), timeout }
    }

    fn held_flags(&self) -> MutexGuard<'_, RetentionFlags> {
        self.held.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns true when something was newly acquired. A kind the host dropped after the
    /// safety timeout counts as missing and is taken again.
    pub fn acquire(&self) -> bool {
        let mut held = self.held_flags();
        let missing = RetentionFlags::all()
            .iter()
            .filter(|&kind| !(held.contains(kind) && self.retention.is_held(kind)))
            .fold(RetentionFlags::empty(), |acc, kind| acc | kind);
        if missing.is_empty() {
            return false;
        }
        for kind in missing.iter() {
            self.retention.acquire(kind, self.timeout);
        }
        held.insert(missing);
        debug!("Power guard acquired ({:?})", missing);
        true
    }

    /// Returns true when something was released.
    pub fn release(&self) -> bool {
        let held = std::mem::replace(&mut *self.held_flags(), RetentionFlags::empty());
        if held.is_empty() {
            return false;
        }
        for kind in held.iter() {
            // the host may already have dropped it after the safety timeout
            if self.retention.is_held(kind) {
                self.retention.release(kind);
            }
        }
        debug!("Power guard released ({:?})", held);
        true
    }

    pub fn held(&self) -> RetentionFlags {
        *self.held_flags()
    }

    pub fn is_held(&self) -> bool {
        self.held() == RetentionFlags::all()
    }
}

impl Drop for PowerGuard {
    fn drop(&mut self) {
        self.release();
    }
}

/// Keeps the render target and the headset link alive across host screen-off periods.
///
/// The guard is acquired at session start and on every screen-off, and released only on
/// teardown: it has to span several screen cycles.
pub struct PowerPersistenceController<L: LinkKeepAlive, D: DisplayRefresh> {
    link: Arc<L>,
    display: Arc<D>,
    guard: PowerGuard,
}

impl<L: LinkKeepAlive, D: DisplayRefresh> PowerPersistenceController<L, D> {
    pub fn new(link: Arc<L>, display: Arc<D>, retention: Arc<dyn PowerRetention>, timeout: Duration) -> Self {
        Self { link, display, guard: PowerGuard::new(retention, timeout) }
    }

    pub fn acquire(&self) {
        self.guard.acquire();
    }

    pub fn release(&self) {
        if self.guard.release() {
            info!("Power retention released");
        }
    }

    pub fn is_held(&self) -> bool {
        self.guard.is_held()
    }

    pub fn held(&self) -> RetentionFlags {
        self.guard.held()
    }

    pub async fn on_screen_off(&self) {
        debug!("Host screen off");
        self.guard.acquire();
        if self.link.is_ready() {
            if let Err(e) = self.link.refresh_keep_alive().await {
                warn!("Keep-alive nudge failed: {}", e);
            }
        } else {
            debug!("Link not ready, skipping keep-alive nudge");
        }
        self.display.ensure_active();
    }

    pub fn on_screen_on(&self) {
        debug!("Host screen on");
        self.display.ensure_active();
    }

    pub async fn on_screen_event(&self, event: ScreenEvent) {
        match event {
            ScreenEvent::Off => self.on_screen_off().await,
            ScreenEvent::On => self.on_screen_on(),
        }
    }
}

/// Feeds host screen transitions into the controller until shutdown is requested.
pub fn run_power_watch<L, D>(
    controller: Arc<PowerPersistenceController<L, D>>,
    screen: &dyn ScreenPowerEvents,
) -> anyhow::Result<ServiceHandle>
where
    L: LinkKeepAlive + 'static,
    D: DisplayRefresh + 'static,
{
    let mut events = screen.watch_screen()?;
    Ok(spawn_service(move |mut stop| async move {
        loop {
            tokio::select! {
                _ = stop.signaled() => {
                    debug!("Shutdown requested, stopping power watch");
                    break;
                }
                event = events.next() => match event {
                    Some(event) => controller.on_screen_event(event).await,
                    None => {
                        debug!("Screen event stream ended");
                        break;
                    }
                }
            }
        }
    }))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::errors::LinkError;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    pub(crate) struct MockRetention {
        pub held: Mutex<RetentionFlags>,
        pub acquires: AtomicUsize,
        pub releases: AtomicUsize,
    }

    impl PowerRetention for MockRetention {
        fn acquire(&self, kind: RetentionFlags, _timeout: Duration) {
            self.acquires.fetch_add(1, Ordering::SeqCst);
            self.held.lock().unwrap().insert(kind);
        }
        fn release(&self, kind: RetentionFlags) {
            let mut held = self.held.lock().unwrap();
            assert!(held.contains(kind), "released {:?} while not held", kind);
            self.releases.fetch_add(1, Ordering::SeqCst);
            held.remove(kind);
        }
        fn is_held(&self, kind: RetentionFlags) -> bool {
            self.held.lock().unwrap().contains(kind)
        }
    }

    #[derive(Default)]
    struct MockLink {
        ready: AtomicBool,
        nudges: AtomicUsize,
    }

    impl LinkKeepAlive for MockLink {
        fn is_ready(&self) -> bool {
            self.ready.load(Ordering::SeqCst)
        }
        async fn refresh_keep_alive(&self) -> Result<(), LinkError> {
            self.nudges.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[derive(Default)]
    struct MockDisplay {
        refreshes: AtomicUsize,
    }

    impl DisplayRefresh for MockDisplay {
        fn ensure_active(&self) {
            self.refreshes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn controller(
        ready: bool,
    ) -> (PowerPersistenceController<MockLink, MockDisplay>, Arc<MockLink>, Arc<MockDisplay>, Arc<MockRetention>) {
        let link = Arc::new(MockLink::default());
        link.ready.store(ready, Ordering::SeqCst);
        let display = Arc::new(MockDisplay::default());
        let retention = Arc::new(MockRetention::default());
        let ctrl = PowerPersistenceController::new(
            link.clone(),
            display.clone(),
            retention.clone(),
            Duration::from_secs(600),
        );
        (ctrl, link, display, retention)
    }

    #[test]
    fn guard_operations_collapse_duplicates() {
        let retention = Arc::new(MockRetention::default());
        let guard = PowerGuard::new(retention.clone(), Duration::from_secs(1));
        assert!(guard.acquire());
        assert!(!guard.acquire());
        assert!(guard.is_held());
        assert!(guard.release());
        assert!(!guard.release());
        assert!(!guard.is_held());
        assert_eq!(retention.acquires.load(Ordering::SeqCst), 2);
        assert_eq!(retention.releases.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn any_sequence_ends_like_its_collapsed_form() {
        let sequences: [&[bool]; 5] = [
            &[true, true, false, false],
            &[false, true, false, true, true],
            &[true, false, false, true],
            &[false, false],
            &[true, true, true],
        ];
        for seq in sequences {
            let retention = Arc::new(MockRetention::default());
            let guard = PowerGuard::new(retention.clone(), Duration::from_secs(1));
            for &acquire in seq {
                if acquire {
                    guard.acquire();
                } else {
                    guard.release();
                }
            }
            let expected = seq.last().copied().unwrap_or(false);
            assert_eq!(guard.is_held(), expected, "sequence {:?}", seq);
            assert_eq!(*retention.held.lock().unwrap() == RetentionFlags::all(), expected);
        }
    }

    #[test]
    fn release_skips_retention_dropped_by_host_timeout() {
        let retention = Arc::new(MockRetention::default());
        let guard = PowerGuard::new(retention.clone(), Duration::from_secs(1));
        guard.acquire();
        retention.held.lock().unwrap().remove(RetentionFlags::CPU);
        guard.release();
        assert_eq!(retention.releases.load(Ordering::SeqCst), 1);
        assert!(retention.held.lock().unwrap().is_empty());
    }

    #[test]
    fn acquire_retakes_retention_dropped_by_host_timeout() {
        let retention = Arc::new(MockRetention::default());
        let guard = PowerGuard::new(retention.clone(), Duration::from_secs(1));
        assert!(guard.acquire());
        *retention.held.lock().unwrap() = RetentionFlags::empty();
        assert!(guard.acquire());
        assert_eq!(*retention.held.lock().unwrap(), RetentionFlags::all());
        assert_eq!(retention.acquires.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn screen_off_after_host_timeout_restores_retention() {
        let (ctrl, _link, _display, retention) = controller(false);
        ctrl.acquire();
        retention.held.lock().unwrap().remove(RetentionFlags::SURFACE);
        ctrl.on_screen_off().await;
        assert_eq!(*retention.held.lock().unwrap(), RetentionFlags::all());
    }

    #[test]
    fn dropping_the_guard_releases_it() {
        let retention = Arc::new(MockRetention::default());
        {
            let guard = PowerGuard::new(retention.clone(), Duration::from_secs(1));
            guard.acquire();
        }
        assert!(retention.held.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn screen_off_acquires_nudges_and_refreshes() {
        let (ctrl, link, display, _retention) = controller(true);
        ctrl.on_screen_off().await;
        assert!(ctrl.is_held());
        assert_eq!(link.nudges.load(Ordering::SeqCst), 1);
        assert_eq!(display.refreshes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn screen_on_keeps_the_guard() {
        let (ctrl, link, display, _retention) = controller(false);
        ctrl.on_screen_off().await;
        ctrl.on_screen_on();
        assert!(ctrl.is_held());
        assert_eq!(link.nudges.load(Ordering::SeqCst), 0);
        assert_eq!(display.refreshes.load(Ordering::SeqCst), 2);
        ctrl.release();
        ctrl.release();
        assert!(!ctrl.is_held());
    }
}
