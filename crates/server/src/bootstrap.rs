use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::info;

use garagebot_core::config::{AppConfig, ConfigError, DriverMode, LoadOptions};
use garagebot_gpio::driver::{DriverError, GpioDriver, NoopDriver, PinMode, PipeDriver};
use garagebot_gpio::relay::RemoteButton;
use garagebot_gpio::sensor::DoorSensor;
use garagebot_nlp::RemoteClassifier;
use garagebot_slack::client::{ApiError, WebApiClient};
use garagebot_slack::diagnostics::SlackDiagnostics;
use garagebot_slack::directory::DirectoryResolver;
use garagebot_slack::sender::MessageSender;
use garagebot_slack::socket::MessageLoop;

use crate::controller::Controller;

pub struct Application {
    pub config: AppConfig,
    pub sensor: DoorSensor,
    pub message_loop: MessageLoop,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("hardware initialization failed: {0}")]
    Hardware(#[from] DriverError),
    #[error("nlp client initialization failed: {0}")]
    Nlp(#[source] anyhow::Error),
    #[error("slack client initialization failed: {0}")]
    Slack(#[source] ApiError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

/// Wires every collaborator together: GPIO driver, sensor, remote button,
/// Slack client stack, classifier, and the dispatching controller.
pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(driver = ?config.hardware.driver, "starting garagebot bootstrap");

    let driver: Arc<dyn GpioDriver> = match config.hardware.driver {
        DriverMode::Noop => Arc::new(NoopDriver),
        DriverMode::Pipe => Arc::new(PipeDriver::new(
            config.hardware.request_pipe.clone(),
            config.hardware.response_pipe.clone(),
            Duration::from_millis(config.hardware.request_timeout_ms),
        )),
    };

    let api = Arc::new(
        WebApiClient::new(config.slack.bot_token.clone()).map_err(BootstrapError::Slack)?,
    );
    let directory =
        Arc::new(DirectoryResolver::new(api.clone(), config.slack.directory_page_size));
    let messenger = Arc::new(MessageSender::new(api, directory.clone()));

    let classifier = RemoteClassifier::new(
        config.nlp.endpoint.clone(),
        Duration::from_secs(config.nlp.timeout_secs),
    )
    .map_err(BootstrapError::Nlp)?;

    // Diagnostics degrade to disabled when the channel is missing; they
    // never fail startup.
    let diagnostics = SlackDiagnostics::resolve(
        messenger.clone(),
        &directory,
        config.slack.logging_channel.as_deref(),
    )
    .await;

    let mut sensor = DoorSensor::new(driver.clone(), config.hardware.door_sensor_pin);
    sensor.init().await?;
    driver.open(config.hardware.relay_pin, PinMode::Output).await?;

    let remote = Arc::new(RemoteButton::new(
        driver,
        config.hardware.relay_pin,
        Duration::from_millis(config.hardware.pulse_ms),
    ));

    let controller = Arc::new(Controller::new(
        Arc::new(classifier),
        messenger,
        remote,
        sensor.state_handle(),
        Arc::new(diagnostics),
        config.nlp.confidence_threshold,
        config.slack.door_event_recipients.clone(),
    ));
    sensor.observe(controller.clone());

    // The Socket Mode WebSocket plumbing plugs in behind MessageTransport;
    // until it is wired the loop runs on the noop transport.
    let message_loop = MessageLoop::noop(controller);

    info!(
        sensor_pin = config.hardware.door_sensor_pin,
        relay_pin = config.hardware.relay_pin,
        "garagebot bootstrap complete"
    );

    Ok(Application { config, sensor, message_loop })
}
