use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::debug;

use garagebot_core::GarageError;

/// Upper bound on a single helper response frame, matching the helper's own
/// read window.
const RESPONSE_FRAME_BYTES: usize = 20 * 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Level {
    Low,
    High,
}

impl Level {
    pub fn as_bool(self) -> bool {
        matches!(self, Self::High)
    }

    pub fn from_bool(value: bool) -> Self {
        if value {
            Self::High
        } else {
            Self::Low
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PinMode {
    Input,
    Output,
}

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("pin {pin} request timed out after {waited_ms}ms")]
    Timeout { pin: u8, waited_ms: u64 },
    #[error("pipe i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed helper response: {0}")]
    Decode(String),
}

impl From<DriverError> for GarageError {
    fn from(value: DriverError) -> Self {
        match value {
            DriverError::Timeout { pin, waited_ms } => {
                Self::Timeout { operation: format!("gpio pin {pin}"), waited_ms }
            }
            DriverError::Io(source) => Self::Integration(format!("gpio pipe i/o: {source}")),
            DriverError::Decode(message) => {
                Self::Integration(format!("gpio helper response: {message}"))
            }
        }
    }
}

/// Pin I/O seam. Implementations may be direct or IPC-based; callers treat
/// every operation as a potential suspension point.
#[async_trait]
pub trait GpioDriver: Send + Sync {
    async fn open(&self, pin: u8, mode: PinMode) -> Result<(), DriverError>;
    async fn read(&self, pin: u8) -> Result<Level, DriverError>;
    async fn write(&self, pin: u8, level: Level) -> Result<(), DriverError>;
}

/// Driver that reads low and discards writes. Used off the Pi and in tests.
#[derive(Default)]
pub struct NoopDriver;

#[async_trait]
impl GpioDriver for NoopDriver {
    async fn open(&self, _pin: u8, _mode: PinMode) -> Result<(), DriverError> {
        Ok(())
    }

    async fn read(&self, _pin: u8) -> Result<Level, DriverError> {
        Ok(Level::Low)
    }

    async fn write(&self, _pin: u8, _level: Level) -> Result<(), DriverError> {
        Ok(())
    }
}

struct PipeChannel {
    request: File,
    response: File,
}

/// Driver speaking JSON frames over a pair of FIFOs to the privileged helper
/// process. Requests are strictly serialized: one frame out, one bare JSON
/// boolean back, with a fixed per-request timeout and no retry.
pub struct PipeDriver {
    request_pipe: PathBuf,
    response_pipe: PathBuf,
    timeout: Duration,
    channel: Mutex<Option<PipeChannel>>,
}

impl PipeDriver {
    pub fn new(request_pipe: PathBuf, response_pipe: PathBuf, timeout: Duration) -> Self {
        Self { request_pipe, response_pipe, timeout, channel: Mutex::new(None) }
    }

    async fn request(&self, pin: u8, payload: Value) -> Result<bool, DriverError> {
        let mut guard = self.channel.lock().await;

        // The timeout bounds the whole exchange. Opening a FIFO end blocks
        // until the helper holds the other side, so a dead helper stalls the
        // open or the write just as readily as the read.
        let exchange = async {
            if guard.is_none() {
                let request = OpenOptions::new().write(true).open(&self.request_pipe).await?;
                let response = File::open(&self.response_pipe).await?;
                *guard = Some(PipeChannel { request, response });
            }
            let channel = guard.as_mut().expect("channel populated above");

            let frame = payload.to_string();
            debug!(pin, frame = %frame, "sending gpio helper request");
            channel.request.write_all(frame.as_bytes()).await?;
            channel.request.flush().await?;

            let mut buffer = vec![0_u8; RESPONSE_FRAME_BYTES];
            let bytes = channel.response.read(&mut buffer).await?;

            let value: Value = serde_json::from_slice(&buffer[..bytes])
                .map_err(|err| DriverError::Decode(err.to_string()))?;
            value.as_bool().ok_or_else(|| {
                DriverError::Decode(format!("expected a JSON boolean, got `{value}`"))
            })
        };

        match tokio::time::timeout(self.timeout, exchange).await {
            Ok(result) => result,
            Err(_) => {
                // Drop the channel so the next request reopens the pipes
                // instead of pairing with a stale late response.
                *guard = None;
                Err(DriverError::Timeout { pin, waited_ms: self.timeout.as_millis() as u64 })
            }
        }
    }
}

#[async_trait]
impl GpioDriver for PipeDriver {
    async fn open(&self, _pin: u8, _mode: PinMode) -> Result<(), DriverError> {
        // The helper owns pin setup; opening is a no-op on this side.
        Ok(())
    }

    async fn read(&self, pin: u8) -> Result<Level, DriverError> {
        let value = self.request(pin, json!({ "input": pin })).await?;
        Ok(Level::from_bool(value))
    }

    async fn write(&self, pin: u8, level: Level) -> Result<(), DriverError> {
        // The helper's writable outputs are its relays.
        let mut relay = serde_json::Map::new();
        relay.insert(pin.to_string(), Value::Bool(level.as_bool()));
        self.request(pin, json!({ "relay": relay })).await?;
        Ok(())
    }
}
