//! Hardware access for garagebot:
//! - **Driver** (`driver`) - pin I/O behind a trait, with a JSON-over-FIFO
//!   implementation talking to the privileged helper process
//! - **Sensor** (`sensor`) - debounced door switch polling with observer fan-out
//! - **Relay** (`relay`) - the timed "press the remote button" pulse

pub mod driver;
pub mod relay;
pub mod sensor;

pub use driver::{DriverError, GpioDriver, Level, NoopDriver, PinMode, PipeDriver};
pub use relay::{DoorRemote, RemoteButton};
pub use sensor::{DoorObserver, DoorSensor, DoorState, DoorStateHandle};
