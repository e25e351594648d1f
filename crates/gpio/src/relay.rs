use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::driver::{DriverError, GpioDriver, Level};

/// The single hardware side effect garagebot performs: a timed button press
/// on the garage remote.
#[async_trait]
pub trait DoorRemote: Send + Sync {
    async fn press(&self) -> Result<(), DriverError>;
}

/// Pulses the remote relay: engage, hold for the configured duration,
/// disengage. A pulse, not a toggle.
pub struct RemoteButton {
    driver: Arc<dyn GpioDriver>,
    pin: u8,
    pulse: Duration,
}

impl RemoteButton {
    pub fn new(driver: Arc<dyn GpioDriver>, pin: u8, pulse: Duration) -> Self {
        Self { driver, pin, pulse }
    }
}

#[async_trait]
impl DoorRemote for RemoteButton {
    async fn press(&self) -> Result<(), DriverError> {
        info!(pin = self.pin, pulse_ms = self.pulse.as_millis() as u64, "pressing garage remote");
        self.driver.write(self.pin, Level::High).await?;
        tokio::time::sleep(self.pulse).await;
        // A latched relay holds the physical button down, so a failed
        // release gets one best-effort retry before the error propagates.
        if let Err(error) = self.driver.write(self.pin, Level::Low).await {
            warn!(pin = self.pin, error = %error, "relay release failed; retrying");
            if let Err(retry_error) = self.driver.write(self.pin, Level::Low).await {
                warn!(
                    pin = self.pin,
                    error = %retry_error,
                    "relay release retry failed; relay may still be engaged"
                );
            }
            return Err(error);
        }
        Ok(())
    }
}
