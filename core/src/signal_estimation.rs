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

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use futures::StreamExt;
use log::{debug, info, warn};
use tokio::sync::watch;

use crate::definitions::{MAX_COARSE_SIGNAL_LEVEL, MAX_SIGNAL_LEVEL, NEUTRAL_SIGNAL_LEVEL};
use crate::errors::RadioError;
use crate::service::{spawn_service, ServiceHandle};

const DBM_FLOOR: i32 = -120;
const DBM_PER_LEVEL: i32 = 14;

/// One visible radio cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellReading {
    pub registered: bool,
    pub dbm: Option<i32>,
}

/// Payload of a host signal-strength-changed notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalStrengthReading {
    pub dbm: Option<i32>,
    /// Host's own 0-4 estimate, used when no dBm value is available.
    pub coarse_level: u8,
}

pub type SignalStrengthStream = futures::channel::mpsc::Receiver<SignalStrengthReading>;

/// Host radio APIs. Availability and precision vary across host versions.
#[async_trait]
pub trait RadioHost: Send + Sync {
    fn has_telephony(&self) -> bool;

    fn has_permission(&self) -> bool;

    async fn query_cells(&self) -> Result<Vec<CellReading>, RadioError>;

    fn listen_signal_strength(&self) -> Result<SignalStrengthStream, RadioError>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SampleSource {
    CellQuery,
    Listener,
    #[default]
    Neutral,
}

/// Latest normalized reading in `[0, MAX_SIGNAL_LEVEL]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalSample {
    pub level: u8,
    /// Increases with every delivered sample.
    pub seq: u64,
    pub source: SampleSource,
}

impl Default for SignalSample {
    fn default() -> Self {
        Self { level: NEUTRAL_SIGNAL_LEVEL, seq: 0, source: SampleSource::Neutral }
    }
}

/// Maps dBm onto the 0-4 scale: -120 dBm and below is 0, -64 dBm and above is 4.
pub fn dbm_to_coarse_level(dbm: i32) -> u8 {
    ((dbm.saturating_add(-DBM_FLOOR)) / DBM_PER_LEVEL).clamp(0, MAX_COARSE_SIGNAL_LEVEL as i32) as u8
}

pub fn scale_coarse_level(level: u8) -> u8 {
    let level = level.min(MAX_COARSE_SIGNAL_LEVEL) as u32;
    (level * MAX_SIGNAL_LEVEL as u32 / MAX_COARSE_SIGNAL_LEVEL as u32) as u8
}

/// Hosts report "unavailable" with non-negative sentinels.
fn usable_dbm(dbm: Option<i32>) -> Option<i32> {
    dbm.filter(|d| *d < 0)
}

fn level_from_reading(reading: &SignalStrengthReading) -> u8 {
    let coarse = usable_dbm(reading.dbm)
        .map(dbm_to_coarse_level)
        .unwrap_or(reading.coarse_level.min(MAX_COARSE_SIGNAL_LEVEL));
    scale_coarse_level(coarse)
}

struct SamplePublisher {
    sender: watch::Sender<SignalSample>,
    generation: AtomicU64,
}

impl SamplePublisher {
    /// Delivers a sample produced under `generation`. Samples from an older generation are
    /// dropped; unchanged values are not re-delivered unless `force` is set.
    fn publish(&self, generation: u64, level: u8, source: SampleSource, force: bool) -> bool {
        let level = level.min(MAX_SIGNAL_LEVEL);
        self.sender.send_if_modified(|sample| {
            if self.generation.load(Ordering::SeqCst) != generation {
                return false;
            }
            if !force && sample.level == level && sample.source == source {
                return false;
            }
            sample.seq += 1;
            sample.level = level;
            sample.source = source;
            true
        })
    }

    fn publish_neutral(&self, generation: u64) {
        self.publish(generation, NEUTRAL_SIGNAL_LEVEL, SampleSource::Neutral, true);
    }
}

/// Turns tiered host radio readings into one normalized [`SignalSample`].
pub struct SignalEstimator {
    radio: Arc<dyn RadioHost>,
    publisher: Arc<SamplePublisher>,
    listener: Mutex<Option<ServiceHandle>>,
    op_lock: tokio::sync::Mutex<()>,
}

impl SignalEstimator {
    pub fn new(radio: Arc<dyn RadioHost>) -> Self {
        let (sender, _) = watch::channel(SignalSample::default());
        Self {
            radio,
            publisher: Arc::new(SamplePublisher { sender, generation: AtomicU64::new(0) }),
            listener: Mutex::new(None),
            op_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SignalSample> {
        self.publisher.sender.subscribe()
    }

    pub fn latest(&self) -> SignalSample {
        *self.publisher.sender.borrow()
    }

    pub async fn start(&self) {
        self.reinitialize().await;
    }

    /// Re-runs the direct cell query, then re-registers the change listener.
    /// Used at start and whenever the radio permission is granted later on.
    pub async fn reinitialize(&self) {
        let _op = self.op_lock.lock().await;
        self.stop_listener();
        let generation = self.publisher.generation.fetch_add(1, Ordering::SeqCst) + 1;

        if !self.radio.has_telephony() {
            info!("No telephony on host, reporting neutral signal level");
            self.publisher.publish_neutral(generation);
            return;
        }
        if !self.radio.has_permission() {
            info!("Radio permission not granted, reporting neutral signal level");
            self.publisher.publish_neutral(generation);
            return;
        }

        let mut have_reading = false;
        match self.radio.query_cells().await {
            Ok(cells) => {
                let dbm = cells.iter().filter(|c| c.registered).find_map(|c| usable_dbm(c.dbm));
                if let Some(dbm) = dbm {
                    let level = scale_coarse_level(dbm_to_coarse_level(dbm));
                    debug!("Direct cell reading {} dBm -> level {}", dbm, level);
                    self.publisher.publish(generation, level, SampleSource::CellQuery, false);
                    have_reading = true;
                }
            }
            Err(RadioError::PermissionDenied) => {
                warn!("Radio permission revoked during cell query");
                self.publisher.publish_neutral(generation);
                return;
            }
            Err(e) => debug!("Cell query unavailable: {}", e),
        }

        // Neutral goes out before the listener starts so it cannot mask the first reading.
        if !have_reading {
            self.publisher.publish_neutral(generation);
        }

        match self.radio.listen_signal_strength() {
            Ok(stream) => self.spawn_listener(generation, stream),
            Err(e) => warn!("Signal strength listener unavailable: {}", e),
        }
    }

    /// Stops the listener; in-flight readings are discarded.
    pub fn shutdown(&self) {
        self.publisher.generation.fetch_add(1, Ordering::SeqCst);
        self.stop_listener();
    }

    fn spawn_listener(&self, generation: u64, mut stream: SignalStrengthStream) {
        let publisher = self.publisher.clone();
        let handle = spawn_service(move |mut stop| async move {
            loop {
                tokio::select! {
                    _ = stop.signaled() => break,
                    reading = stream.next() => match reading {
                        Some(reading) => {
                            let level = level_from_reading(&reading);
                            publisher.publish(generation, level, SampleSource::Listener, false);
                        }
                        None => {
                            debug!("Signal strength stream ended");
                            break;
                        }
                    }
                }
            }
        });
        *self.listener.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
    }

    fn stop_listener(&self) {
        let handle = self.listener.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(handle) = handle {
            handle.stop_now();
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use tokio::time::{sleep, Duration};

    pub(crate) struct MockRadio {
        pub telephony: AtomicBool,
        pub permission: AtomicBool,
        pub cells: Mutex<Result<Vec<CellReading>, RadioError>>,
        pub listener_tx: Mutex<Option<futures::channel::mpsc::Sender<SignalStrengthReading>>>,
        pub queued_reading: Mutex<Option<SignalStrengthReading>>,
    }

    impl MockRadio {
        pub(crate) fn new() -> Arc<Self> {
            Arc::new(Self {
                telephony: AtomicBool::new(true),
                permission: AtomicBool::new(true),
                cells: Mutex::new(Ok(Vec::new())),
                listener_tx: Mutex::new(None),
                queued_reading: Mutex::new(None),
            })
        }

        pub(crate) fn set_cells(&self, cells: Vec<CellReading>) {
            *self.cells.lock().unwrap() = Ok(cells);
        }

        pub(crate) fn push(&self, reading: SignalStrengthReading) {
            if let Some(tx) = self.listener_tx.lock().unwrap().as_mut() {
                tx.try_send(reading).unwrap();
            }
        }
    }

    #[async_trait]
    impl RadioHost for MockRadio {
        fn has_telephony(&self) -> bool {
            self.telephony.load(Ordering::SeqCst)
        }

        fn has_permission(&self) -> bool {
            self.permission.load(Ordering::SeqCst)
        }

        async fn query_cells(&self) -> Result<Vec<CellReading>, RadioError> {
            self.cells.lock().unwrap().clone()
        }

        fn listen_signal_strength(&self) -> Result<SignalStrengthStream, RadioError> {
            let (mut tx, rx) = futures::channel::mpsc::channel(16);
            if let Some(reading) = self.queued_reading.lock().unwrap().take() {
                tx.try_send(reading).unwrap();
            }
            *self.listener_tx.lock().unwrap() = Some(tx);
            Ok(rx)
        }
    }

    fn registered(dbm: i32) -> CellReading {
        CellReading { registered: true, dbm: Some(dbm) }
    }

    async fn short_wait() {
        sleep(Duration::from_millis(10)).await
    }

    #[test]
    fn dbm_mapping_matches_reference_points() {
        assert_eq!(scale_coarse_level(dbm_to_coarse_level(-120)), 0);
        assert_eq!(scale_coarse_level(dbm_to_coarse_level(-50)), MAX_SIGNAL_LEVEL);
        assert_eq!(dbm_to_coarse_level(-85), 2);
        assert_eq!(scale_coarse_level(dbm_to_coarse_level(-85)), MAX_SIGNAL_LEVEL / 2);
    }

    #[test]
    fn mapping_stays_in_range_for_extreme_values() {
        for dbm in [i32::MIN, -1000, -140, -121, -1] {
            assert!(scale_coarse_level(dbm_to_coarse_level(dbm)) <= MAX_SIGNAL_LEVEL);
        }
        assert_eq!(scale_coarse_level(200), MAX_SIGNAL_LEVEL);
    }

    #[test]
    fn listener_reading_falls_back_to_coarse_level() {
        let reading = SignalStrengthReading { dbm: None, coarse_level: 3 };
        assert_eq!(level_from_reading(&reading), 75);
        let sentinel = SignalStrengthReading { dbm: Some(i32::MAX), coarse_level: 1 };
        assert_eq!(level_from_reading(&sentinel), 25);
    }

    #[tokio::test]
    async fn direct_cell_reading_wins() {
        let radio = MockRadio::new();
        radio.set_cells(vec![CellReading { registered: false, dbm: Some(-50) }, registered(-120)]);
        let estimator = SignalEstimator::new(radio.clone());
        estimator.start().await;
        let sample = estimator.latest();
        assert_eq!(sample.level, 0);
        assert_eq!(sample.source, SampleSource::CellQuery);
    }

    #[tokio::test]
    async fn listener_updates_follow_cell_query() {
        let radio = MockRadio::new();
        let estimator = SignalEstimator::new(radio.clone());
        estimator.start().await;
        assert_eq!(estimator.latest().level, NEUTRAL_SIGNAL_LEVEL);

        let mut rx = estimator.subscribe();
        rx.borrow_and_update();
        radio.push(SignalStrengthReading { dbm: Some(-50), coarse_level: 0 });
        short_wait().await;
        assert!(rx.has_changed().unwrap());
        let sample = *rx.borrow_and_update();
        assert_eq!(sample.level, MAX_SIGNAL_LEVEL);
        assert_eq!(sample.source, SampleSource::Listener);

        radio.push(SignalStrengthReading { dbm: Some(-50), coarse_level: 0 });
        short_wait().await;
        assert!(!rx.has_changed().unwrap());
    }

    #[tokio::test]
    async fn denied_permission_reports_neutral_until_reinitialized() {
        let radio = MockRadio::new();
        radio.permission.store(false, Ordering::SeqCst);
        radio.set_cells(vec![registered(-50)]);
        let estimator = SignalEstimator::new(radio.clone());
        let mut rx = estimator.subscribe();
        estimator.start().await;
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().level, MAX_SIGNAL_LEVEL / 2);

        estimator.reinitialize().await;
        assert_eq!(rx.borrow_and_update().level, MAX_SIGNAL_LEVEL / 2);

        radio.permission.store(true, Ordering::SeqCst);
        estimator.reinitialize().await;
        assert_eq!(rx.borrow_and_update().level, MAX_SIGNAL_LEVEL);
    }

    #[tokio::test]
    async fn no_telephony_reports_neutral() {
        let radio = MockRadio::new();
        radio.telephony.store(false, Ordering::SeqCst);
        let estimator = SignalEstimator::new(radio);
        estimator.start().await;
        let sample = estimator.latest();
        assert_eq!(sample.level, NEUTRAL_SIGNAL_LEVEL);
        assert_eq!(sample.seq, 1);
    }

    #[tokio::test]
    async fn readings_from_replaced_listener_are_dropped() {
        let radio = MockRadio::new();
        let estimator = SignalEstimator::new(radio.clone());
        estimator.start().await;
        let stale_tx = radio.listener_tx.lock().unwrap().take().unwrap();
        estimator.reinitialize().await;
        let seq = estimator.latest().seq;

        let mut stale_tx = stale_tx;
        let _ = stale_tx.try_send(SignalStrengthReading { dbm: Some(-50), coarse_level: 4 });
        short_wait().await;
        assert_eq!(estimator.latest().seq, seq);
        assert_eq!(estimator.latest().level, NEUTRAL_SIGNAL_LEVEL);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn first_listener_reading_is_not_masked_by_neutral() {
        let radio = MockRadio::new();
        *radio.cells.lock().unwrap() = Err(RadioError::QueryFailed("modem busy".to_string()));
        *radio.queued_reading.lock().unwrap() = Some(SignalStrengthReading { dbm: Some(-50), coarse_level: 0 });
        let estimator = SignalEstimator::new(radio.clone());
        estimator.start().await;
        short_wait().await;

        let sample = estimator.latest();
        assert_eq!(sample.level, MAX_SIGNAL_LEVEL);
        assert_eq!(sample.source, SampleSource::Listener);
    }
}
