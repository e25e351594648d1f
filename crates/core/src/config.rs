use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub slack: SlackConfig,
    pub hardware: HardwareConfig,
    pub nlp: NlpConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct SlackConfig {
    pub app_token: SecretString,
    pub bot_token: SecretString,
    /// Display names notified on every confirmed door transition. Empty
    /// disables notifications.
    pub door_event_recipients: Vec<String>,
    /// Channel name for the low-confidence diagnostic side-channel. Unset
    /// disables it.
    pub logging_channel: Option<String>,
    pub directory_page_size: u32,
}

#[derive(Clone, Debug)]
pub struct HardwareConfig {
    pub driver: DriverMode,
    pub door_sensor_pin: u8,
    pub relay_pin: u8,
    pub poll_interval_ms: u64,
    pub pulse_ms: u64,
    pub request_pipe: PathBuf,
    pub response_pipe: PathBuf,
    pub request_timeout_ms: u64,
}

#[derive(Clone, Debug)]
pub struct NlpConfig {
    pub endpoint: String,
    pub timeout_secs: u64,
    pub confidence_threshold: f64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// How pin I/O reaches the hardware: `noop` discards everything (useful off
/// the Pi), `pipe` talks JSON over FIFOs to the privileged helper process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverMode {
    Noop,
    Pipe,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub slack_app_token: Option<String>,
    pub slack_bot_token: Option<String>,
    pub door_event_recipients: Option<Vec<String>>,
    pub logging_channel: Option<String>,
    pub driver: Option<DriverMode>,
    pub nlp_endpoint: Option<String>,
    pub confidence_threshold: Option<f64>,
    pub log_level: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            slack: SlackConfig {
                app_token: String::new().into(),
                bot_token: String::new().into(),
                door_event_recipients: Vec::new(),
                logging_channel: None,
                directory_page_size: 50,
            },
            hardware: HardwareConfig {
                driver: DriverMode::Noop,
                door_sensor_pin: 15,
                relay_pin: 0,
                poll_interval_ms: 100,
                pulse_ms: 1_000,
                request_pipe: PathBuf::from("/tmp/gpio_driver_input"),
                response_pipe: PathBuf::from("/tmp/gpio_driver_output"),
                request_timeout_ms: 1_000,
            },
            nlp: NlpConfig {
                endpoint: "http://localhost:7700/process".to_string(),
                timeout_secs: 10,
                confidence_threshold: 0.75,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for DriverMode {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "noop" => Ok(Self::Noop),
            "pipe" => Ok(Self::Pipe),
            other => Err(ConfigError::Validation(format!(
                "unsupported hardware driver `{other}` (expected noop|pipe)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("garagebot.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(slack) = patch.slack {
            if let Some(app_token_value) = slack.app_token {
                self.slack.app_token = secret_value(app_token_value);
            }
            if let Some(bot_token_value) = slack.bot_token {
                self.slack.bot_token = secret_value(bot_token_value);
            }
            if let Some(recipients) = slack.door_event_recipients {
                self.slack.door_event_recipients = normalize_recipients(recipients);
            }
            if let Some(logging_channel) = slack.logging_channel {
                self.slack.logging_channel = Some(logging_channel);
            }
            if let Some(page_size) = slack.directory_page_size {
                self.slack.directory_page_size = page_size;
            }
        }

        if let Some(hardware) = patch.hardware {
            if let Some(driver) = hardware.driver {
                self.hardware.driver = driver;
            }
            if let Some(door_sensor_pin) = hardware.door_sensor_pin {
                self.hardware.door_sensor_pin = door_sensor_pin;
            }
            if let Some(relay_pin) = hardware.relay_pin {
                self.hardware.relay_pin = relay_pin;
            }
            if let Some(poll_interval_ms) = hardware.poll_interval_ms {
                self.hardware.poll_interval_ms = poll_interval_ms;
            }
            if let Some(pulse_ms) = hardware.pulse_ms {
                self.hardware.pulse_ms = pulse_ms;
            }
            if let Some(request_pipe) = hardware.request_pipe {
                self.hardware.request_pipe = request_pipe;
            }
            if let Some(response_pipe) = hardware.response_pipe {
                self.hardware.response_pipe = response_pipe;
            }
            if let Some(request_timeout_ms) = hardware.request_timeout_ms {
                self.hardware.request_timeout_ms = request_timeout_ms;
            }
        }

        if let Some(nlp) = patch.nlp {
            if let Some(endpoint) = nlp.endpoint {
                self.nlp.endpoint = endpoint;
            }
            if let Some(timeout_secs) = nlp.timeout_secs {
                self.nlp.timeout_secs = timeout_secs;
            }
            if let Some(confidence_threshold) = nlp.confidence_threshold {
                self.nlp.confidence_threshold = confidence_threshold;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("GARAGEBOT_SLACK_APP_TOKEN") {
            self.slack.app_token = secret_value(value);
        }
        if let Some(value) = read_env("GARAGEBOT_SLACK_BOT_TOKEN") {
            self.slack.bot_token = secret_value(value);
        }
        if let Some(value) = read_env("GARAGEBOT_SLACK_DOOR_EVENT_RECIPIENTS") {
            self.slack.door_event_recipients =
                normalize_recipients(value.split(',').map(str::to_owned).collect());
        }
        if let Some(value) = read_env("GARAGEBOT_SLACK_LOGGING_CHANNEL") {
            self.slack.logging_channel = Some(value);
        }
        if let Some(value) = read_env("GARAGEBOT_SLACK_DIRECTORY_PAGE_SIZE") {
            self.slack.directory_page_size =
                parse_u32("GARAGEBOT_SLACK_DIRECTORY_PAGE_SIZE", &value)?;
        }

        if let Some(value) = read_env("GARAGEBOT_HARDWARE_DRIVER") {
            self.hardware.driver = value.parse()?;
        }
        if let Some(value) = read_env("GARAGEBOT_HARDWARE_DOOR_SENSOR_PIN") {
            self.hardware.door_sensor_pin = parse_u8("GARAGEBOT_HARDWARE_DOOR_SENSOR_PIN", &value)?;
        }
        if let Some(value) = read_env("GARAGEBOT_HARDWARE_RELAY_PIN") {
            self.hardware.relay_pin = parse_u8("GARAGEBOT_HARDWARE_RELAY_PIN", &value)?;
        }
        if let Some(value) = read_env("GARAGEBOT_HARDWARE_POLL_INTERVAL_MS") {
            self.hardware.poll_interval_ms =
                parse_u64("GARAGEBOT_HARDWARE_POLL_INTERVAL_MS", &value)?;
        }
        if let Some(value) = read_env("GARAGEBOT_HARDWARE_PULSE_MS") {
            self.hardware.pulse_ms = parse_u64("GARAGEBOT_HARDWARE_PULSE_MS", &value)?;
        }
        if let Some(value) = read_env("GARAGEBOT_HARDWARE_REQUEST_PIPE") {
            self.hardware.request_pipe = PathBuf::from(value);
        }
        if let Some(value) = read_env("GARAGEBOT_HARDWARE_RESPONSE_PIPE") {
            self.hardware.response_pipe = PathBuf::from(value);
        }
        if let Some(value) = read_env("GARAGEBOT_HARDWARE_REQUEST_TIMEOUT_MS") {
            self.hardware.request_timeout_ms =
                parse_u64("GARAGEBOT_HARDWARE_REQUEST_TIMEOUT_MS", &value)?;
        }

        if let Some(value) = read_env("GARAGEBOT_NLP_ENDPOINT") {
            self.nlp.endpoint = value;
        }
        if let Some(value) = read_env("GARAGEBOT_NLP_TIMEOUT_SECS") {
            self.nlp.timeout_secs = parse_u64("GARAGEBOT_NLP_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("GARAGEBOT_NLP_CONFIDENCE_THRESHOLD") {
            self.nlp.confidence_threshold =
                parse_f64("GARAGEBOT_NLP_CONFIDENCE_THRESHOLD", &value)?;
        }

        let log_level =
            read_env("GARAGEBOT_LOGGING_LEVEL").or_else(|| read_env("GARAGEBOT_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("GARAGEBOT_LOGGING_FORMAT").or_else(|| read_env("GARAGEBOT_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(slack_app_token) = overrides.slack_app_token {
            self.slack.app_token = secret_value(slack_app_token);
        }
        if let Some(slack_bot_token) = overrides.slack_bot_token {
            self.slack.bot_token = secret_value(slack_bot_token);
        }
        if let Some(recipients) = overrides.door_event_recipients {
            self.slack.door_event_recipients = normalize_recipients(recipients);
        }
        if let Some(logging_channel) = overrides.logging_channel {
            self.slack.logging_channel = Some(logging_channel);
        }
        if let Some(driver) = overrides.driver {
            self.hardware.driver = driver;
        }
        if let Some(nlp_endpoint) = overrides.nlp_endpoint {
            self.nlp.endpoint = nlp_endpoint;
        }
        if let Some(confidence_threshold) = overrides.confidence_threshold {
            self.nlp.confidence_threshold = confidence_threshold;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_slack(&self.slack)?;
        validate_hardware(&self.hardware)?;
        validate_nlp(&self.nlp)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

/// Trim each recipient and drop empties, so `"Thor, , Loki"` becomes
/// `["Thor", "Loki"]`.
fn normalize_recipients(recipients: Vec<String>) -> Vec<String> {
    recipients
        .into_iter()
        .map(|recipient| recipient.trim().to_owned())
        .filter(|recipient| !recipient.is_empty())
        .collect()
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("garagebot.toml"), PathBuf::from("config/garagebot.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_slack(slack: &SlackConfig) -> Result<(), ConfigError> {
    let app_token = slack.app_token.expose_secret();
    if app_token.is_empty() {
        return Err(ConfigError::Validation(
            "slack.app_token is required. Get it from https://api.slack.com/apps > Your App > Basic Information > App-Level Tokens".to_string()
        ));
    }
    if !app_token.starts_with("xapp-") {
        let hint = if app_token.starts_with("xoxb-") {
            " (hint: you may have used the bot token instead of the app token)"
        } else {
            ""
        };
        return Err(ConfigError::Validation(format!(
            "slack.app_token must start with `xapp-`{hint}. Get it from https://api.slack.com/apps"
        )));
    }

    let bot_token = slack.bot_token.expose_secret();
    if bot_token.is_empty() {
        return Err(ConfigError::Validation(
            "slack.bot_token is required. Get it from https://api.slack.com/apps > Your App > OAuth & Permissions > Bot User OAuth Token".to_string()
        ));
    }
    if !bot_token.starts_with("xoxb-") {
        let hint = if bot_token.starts_with("xapp-") {
            " (hint: you may have used the app token instead of the bot token)"
        } else {
            ""
        };
        return Err(ConfigError::Validation(format!(
            "slack.bot_token must start with `xoxb-`{hint}. Get it from https://api.slack.com/apps"
        )));
    }

    if slack.directory_page_size == 0 || slack.directory_page_size > 200 {
        return Err(ConfigError::Validation(
            "slack.directory_page_size must be in range 1..=200".to_string(),
        ));
    }

    Ok(())
}

fn validate_hardware(hardware: &HardwareConfig) -> Result<(), ConfigError> {
    if hardware.poll_interval_ms == 0 {
        return Err(ConfigError::Validation(
            "hardware.poll_interval_ms must be greater than zero".to_string(),
        ));
    }

    if hardware.pulse_ms == 0 || hardware.pulse_ms > 10_000 {
        return Err(ConfigError::Validation(
            "hardware.pulse_ms must be in range 1..=10000".to_string(),
        ));
    }

    if hardware.request_timeout_ms == 0 {
        return Err(ConfigError::Validation(
            "hardware.request_timeout_ms must be greater than zero".to_string(),
        ));
    }

    if hardware.door_sensor_pin == hardware.relay_pin {
        return Err(ConfigError::Validation(
            "hardware.door_sensor_pin and hardware.relay_pin must differ".to_string(),
        ));
    }

    Ok(())
}

fn validate_nlp(nlp: &NlpConfig) -> Result<(), ConfigError> {
    if nlp.endpoint.trim().is_empty() {
        return Err(ConfigError::Validation("nlp.endpoint is required".to_string()));
    }
    if !nlp.endpoint.starts_with("http://") && !nlp.endpoint.starts_with("https://") {
        return Err(ConfigError::Validation(
            "nlp.endpoint must start with http:// or https://".to_string(),
        ));
    }

    if nlp.timeout_secs == 0 || nlp.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "nlp.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if !(0.0..=1.0).contains(&nlp.confidence_threshold) {
        return Err(ConfigError::Validation(
            "nlp.confidence_threshold must be in range 0.0..=1.0".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u8(key: &str, value: &str) -> Result<u8, ConfigError> {
    value.parse::<u8>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_f64(key: &str, value: &str) -> Result<f64, ConfigError> {
    value.parse::<f64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    slack: Option<SlackPatch>,
    hardware: Option<HardwarePatch>,
    nlp: Option<NlpPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct SlackPatch {
    app_token: Option<String>,
    bot_token: Option<String>,
    door_event_recipients: Option<Vec<String>>,
    logging_channel: Option<String>,
    directory_page_size: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct HardwarePatch {
    driver: Option<DriverMode>,
    door_sensor_pin: Option<u8>,
    relay_pin: Option<u8>,
    poll_interval_ms: Option<u64>,
    pulse_ms: Option<u64>,
    request_pipe: Option<PathBuf>,
    response_pipe: Option<PathBuf>,
    request_timeout_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct NlpPatch {
    endpoint: Option<String>,
    timeout_secs: Option<u64>,
    confidence_threshold: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
