use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::driver::{GpioDriver, Level, PinMode};

/// Consecutive identical samples required before a reading is trusted.
const WINDOW_SIZE: usize = 3;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DoorState {
    #[default]
    Closed,
    Open,
}

impl DoorState {
    pub fn from_level(level: Level) -> Self {
        match level {
            Level::High => Self::Open,
            Level::Low => Self::Closed,
        }
    }

    pub fn as_bit(self) -> u8 {
        match self {
            Self::Closed => 0,
            Self::Open => 1,
        }
    }

    pub fn word(self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
        }
    }
}

/// Notified on every confirmed door transition, in registration order.
#[async_trait]
pub trait DoorObserver: Send + Sync {
    async fn door_changed(&self, state: DoorState) -> anyhow::Result<()>;
}

/// Cheap cloneable read handle onto the sensor's last confirmed state.
#[derive(Clone)]
pub struct DoorStateHandle {
    rx: watch::Receiver<DoorState>,
}

impl DoorStateHandle {
    pub fn current(&self) -> DoorState {
        *self.rx.borrow()
    }

    /// Handle pinned to a fixed state, for wiring without a live sensor.
    pub fn fixed(state: DoorState) -> Self {
        let (_, rx) = watch::channel(state);
        Self { rx }
    }
}

/// Debounced reader for the door reed switch. Owns the sample window and the
/// confirmed state; both are mutated only from the poll step.
pub struct DoorSensor {
    driver: Arc<dyn GpioDriver>,
    pin: u8,
    window: VecDeque<Level>,
    state_tx: watch::Sender<DoorState>,
    observers: Vec<Arc<dyn DoorObserver>>,
}

impl DoorSensor {
    pub fn new(driver: Arc<dyn GpioDriver>, pin: u8) -> Self {
        let (state_tx, _) = watch::channel(DoorState::default());
        Self { driver, pin, window: VecDeque::with_capacity(WINDOW_SIZE), state_tx, observers: Vec::new() }
    }

    /// Registers an observer. Duplicates are allowed and fire once per
    /// registration.
    pub fn observe(&mut self, observer: Arc<dyn DoorObserver>) {
        self.observers.push(observer);
    }

    pub fn state_handle(&self) -> DoorStateHandle {
        DoorStateHandle { rx: self.state_tx.subscribe() }
    }

    pub fn current_state(&self) -> DoorState {
        *self.state_tx.borrow()
    }

    pub async fn init(&self) -> Result<(), crate::driver::DriverError> {
        self.driver.open(self.pin, PinMode::Input).await
    }

    /// One debounce step: read, shift into the window, act only on a
    /// unanimous window that differs from the confirmed state.
    pub async fn poll_once(&mut self) {
        let level = match self.driver.read(self.pin).await {
            Ok(level) => level,
            Err(error) => {
                // A failed read is a skipped sample, never a dead loop.
                warn!(pin = self.pin, error = %error, "sensor read failed; skipping sample");
                return;
            }
        };

        self.window.push_back(level);
        if self.window.len() > WINDOW_SIZE {
            self.window.pop_front();
        }

        let Some(candidate) = self.unanimous_candidate() else {
            return;
        };

        let previous = self.state_tx.send_replace(candidate);
        if previous == candidate {
            return;
        }

        info!(
            pin = self.pin,
            state = candidate.word(),
            "confirmed door transition"
        );
        for observer in &self.observers {
            if let Err(error) = observer.door_changed(candidate).await {
                warn!(pin = self.pin, error = %error, "door observer failed; continuing fan-out");
            }
        }
    }

    fn unanimous_candidate(&self) -> Option<DoorState> {
        if self.window.len() < WINDOW_SIZE {
            return None;
        }
        let first = *self.window.front()?;
        self.window
            .iter()
            .all(|level| *level == first)
            .then(|| DoorState::from_level(first))
    }

    /// Recurring poll loop. Runs until `shutdown` flips true; the pending
    /// tick dies with the loop so nothing stays scheduled after shutdown.
    pub async fn run(mut self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => self.poll_once().await,
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        debug!(pin = self.pin, "door sensor poll loop stopping");
                        return;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Arc;

    use async_trait::async_trait;
    use tokio::sync::Mutex;

    use super::{DoorObserver, DoorSensor, DoorState};
    use crate::driver::{DriverError, GpioDriver, Level, PinMode};

    struct ScriptedDriver {
        reads: Mutex<VecDeque<Result<Level, DriverError>>>,
    }

    impl ScriptedDriver {
        fn with_reads(reads: Vec<Result<Level, DriverError>>) -> Arc<Self> {
            Arc::new(Self { reads: Mutex::new(reads.into()) })
        }

        fn bits(bits: &[u8]) -> Arc<Self> {
            Self::with_reads(bits.iter().map(|bit| Ok(Level::from_bool(*bit == 1))).collect())
        }
    }

    #[async_trait]
    impl GpioDriver for ScriptedDriver {
        async fn open(&self, _pin: u8, _mode: PinMode) -> Result<(), DriverError> {
            Ok(())
        }

        async fn read(&self, _pin: u8) -> Result<Level, DriverError> {
            self.reads.lock().await.pop_front().unwrap_or(Ok(Level::Low))
        }

        async fn write(&self, _pin: u8, _level: Level) -> Result<(), DriverError> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingObserver {
        seen: Mutex<Vec<DoorState>>,
    }

    #[async_trait]
    impl DoorObserver for RecordingObserver {
        async fn door_changed(&self, state: DoorState) -> anyhow::Result<()> {
            self.seen.lock().await.push(state);
            Ok(())
        }
    }

    struct FailingObserver;

    #[async_trait]
    impl DoorObserver for FailingObserver {
        async fn door_changed(&self, _state: DoorState) -> anyhow::Result<()> {
            anyhow::bail!("observer exploded")
        }
    }

    async fn poll_times(sensor: &mut DoorSensor, times: usize) {
        for _ in 0..times {
            sensor.poll_once().await;
        }
    }

    #[tokio::test]
    async fn unanimous_windows_yield_exactly_the_edge_transitions() {
        let driver = ScriptedDriver::bits(&[0, 0, 0, 1, 1, 1, 0, 0, 0]);
        let mut sensor = DoorSensor::new(driver, 15);
        let observer = Arc::new(RecordingObserver::default());
        sensor.observe(observer.clone());

        poll_times(&mut sensor, 9).await;

        assert_eq!(*observer.seen.lock().await, vec![DoorState::Open, DoorState::Closed]);
        assert_eq!(sensor.current_state(), DoorState::Closed);
    }

    #[tokio::test]
    async fn mixed_window_leaves_state_sticky() {
        let driver = ScriptedDriver::bits(&[1, 1, 0, 1, 0, 1]);
        let mut sensor = DoorSensor::new(driver, 15);
        let observer = Arc::new(RecordingObserver::default());
        sensor.observe(observer.clone());

        poll_times(&mut sensor, 6).await;

        assert!(observer.seen.lock().await.is_empty());
        assert_eq!(sensor.current_state(), DoorState::Closed);
    }

    #[tokio::test]
    async fn window_is_fifo_and_never_exceeds_three_samples() {
        let driver = ScriptedDriver::bits(&[0, 1, 1, 1]);
        let mut sensor = DoorSensor::new(driver, 15);

        poll_times(&mut sensor, 3).await;
        assert_eq!(sensor.window.len(), 3);
        // [0,1,1] is not unanimous yet.
        assert_eq!(sensor.current_state(), DoorState::Closed);

        sensor.poll_once().await;
        // Fourth push evicts the first sample, leaving [1,1,1].
        assert_eq!(sensor.window.len(), 3);
        assert_eq!(sensor.current_state(), DoorState::Open);
    }

    #[tokio::test]
    async fn read_errors_are_skipped_samples() {
        let driver = ScriptedDriver::with_reads(vec![
            Ok(Level::High),
            Err(DriverError::Timeout { pin: 15, waited_ms: 1_000 }),
            Ok(Level::High),
            Ok(Level::High),
        ]);
        let mut sensor = DoorSensor::new(driver, 15);
        let observer = Arc::new(RecordingObserver::default());
        sensor.observe(observer.clone());

        poll_times(&mut sensor, 4).await;

        // The failed tick contributed nothing; the three good samples agree.
        assert_eq!(sensor.window.len(), 3);
        assert_eq!(*observer.seen.lock().await, vec![DoorState::Open]);
    }

    #[tokio::test]
    async fn failing_observer_does_not_block_later_observers() {
        let driver = ScriptedDriver::bits(&[1, 1, 1]);
        let mut sensor = DoorSensor::new(driver, 15);
        let recording = Arc::new(RecordingObserver::default());
        sensor.observe(Arc::new(FailingObserver));
        sensor.observe(recording.clone());

        poll_times(&mut sensor, 3).await;

        assert_eq!(*recording.seen.lock().await, vec![DoorState::Open]);
    }

    #[tokio::test]
    async fn duplicate_registration_fires_once_per_registration() {
        let driver = ScriptedDriver::bits(&[1, 1, 1]);
        let mut sensor = DoorSensor::new(driver, 15);
        let observer = Arc::new(RecordingObserver::default());
        sensor.observe(observer.clone());
        sensor.observe(observer.clone());

        poll_times(&mut sensor, 3).await;

        assert_eq!(*observer.seen.lock().await, vec![DoorState::Open, DoorState::Open]);
    }

    #[tokio::test]
    async fn state_handle_tracks_confirmed_transitions() {
        let driver = ScriptedDriver::bits(&[1, 1, 1]);
        let mut sensor = DoorSensor::new(driver, 15);
        let handle = sensor.state_handle();
        assert_eq!(handle.current(), DoorState::Closed);

        poll_times(&mut sensor, 3).await;

        assert_eq!(handle.current(), DoorState::Open);
    }
}
