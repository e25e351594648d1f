use std::{sync::Arc, time::Duration};

use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport failed to connect: {0}")]
    Connect(String),
    #[error("transport read failed: {0}")]
    Receive(String),
    #[error("transport ack failed: {0}")]
    Acknowledge(String),
    #[error("transport disconnect failed: {0}")]
    Disconnect(String),
}

/// One inbound chat message, already unwrapped from its envelope.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundMessage {
    pub envelope_id: String,
    pub channel_id: String,
    /// Message timestamp, used as the thread anchor for the reply.
    pub ts: String,
    pub user_id: String,
    pub text: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { max_retries: 5, base_delay_ms: 250, max_delay_ms: 5_000 }
    }
}

impl ReconnectPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let multiplier = 1_u64 << exponent;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

/// Socket Mode connection seam. The real WebSocket plumbing lives behind
/// this trait; the loop only sees connect/next/ack/disconnect.
#[async_trait]
pub trait MessageTransport: Send + Sync {
    async fn connect(&self) -> Result<(), TransportError>;
    async fn next_message(&self) -> Result<Option<InboundMessage>, TransportError>;
    async fn acknowledge(&self, envelope_id: &str) -> Result<(), TransportError>;
    async fn disconnect(&self) -> Result<(), TransportError>;
}

#[derive(Default)]
pub struct NoopMessageTransport;

#[async_trait]
impl MessageTransport for NoopMessageTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn next_message(&self) -> Result<Option<InboundMessage>, TransportError> {
        Ok(None)
    }

    async fn acknowledge(&self, _envelope_id: &str) -> Result<(), TransportError> {
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

/// Receives each inbound message. A failing handler never stops the loop;
/// each message is an independent unit of work.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle_message(&self, message: &InboundMessage) -> Result<()>;
}

pub struct MessageLoop {
    transport: Arc<dyn MessageTransport>,
    handler: Arc<dyn MessageHandler>,
    reconnect_policy: ReconnectPolicy,
}

impl MessageLoop {
    pub fn new(
        transport: Arc<dyn MessageTransport>,
        handler: Arc<dyn MessageHandler>,
        reconnect_policy: ReconnectPolicy,
    ) -> Self {
        Self { transport, handler, reconnect_policy }
    }

    pub fn noop(handler: Arc<dyn MessageHandler>) -> Self {
        Self::new(Arc::new(NoopMessageTransport), handler, ReconnectPolicy::default())
    }

    pub async fn start(&self) -> Result<()> {
        for attempt in 0..=self.reconnect_policy.max_retries {
            match self.connect_and_pump(attempt).await {
                Ok(()) => return Ok(()),
                Err(transport_error) => {
                    warn!(
                        attempt,
                        max_retries = self.reconnect_policy.max_retries,
                        error = %transport_error,
                        "message transport failed"
                    );

                    if attempt >= self.reconnect_policy.max_retries {
                        warn!(
                            max_retries = self.reconnect_policy.max_retries,
                            "message transport retries exhausted; continuing without chat input"
                        );
                        return Ok(());
                    }

                    let delay = self.reconnect_policy.backoff(attempt);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Ok(())
    }

    async fn connect_and_pump(&self, attempt: u32) -> Result<(), TransportError> {
        info!(attempt, "opening message transport connection");
        self.transport.connect().await?;

        loop {
            let Some(message) = self.transport.next_message().await? else {
                info!(attempt, "message transport stream closed");
                self.transport.disconnect().await?;
                return Ok(());
            };

            debug!(
                envelope_id = %message.envelope_id,
                channel_id = %message.channel_id,
                ts = %message.ts,
                "received inbound message"
            );

            if let Err(error) = self.transport.acknowledge(&message.envelope_id).await {
                warn!(
                    envelope_id = %message.envelope_id,
                    error = %error,
                    "failed to acknowledge inbound message"
                );
            }

            if let Err(error) = self.handler.handle_message(&message).await {
                warn!(
                    envelope_id = %message.envelope_id,
                    channel_id = %message.channel_id,
                    error = %error,
                    "message handler failed; continuing loop"
                );
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

    use super::{
        InboundMessage, MessageHandler, MessageLoop, MessageTransport, ReconnectPolicy,
        TransportError,
    };

    fn message(envelope_id: &str, text: &str) -> InboundMessage {
        InboundMessage {
            envelope_id: envelope_id.to_owned(),
            channel_id: "C1".to_owned(),
            ts: "1730000000.1000".to_owned(),
            user_id: "U1".to_owned(),
            text: text.to_owned(),
        }
    }

    #[derive(Default)]
    struct ScriptedTransport {
        state: Mutex<ScriptedState>,
    }

    #[derive(Default)]
    struct ScriptedState {
        connect_results: VecDeque<Result<(), TransportError>>,
        messages: VecDeque<Result<Option<InboundMessage>, TransportError>>,
        connect_attempts: usize,
        acknowledgements: Vec<String>,
    }

    impl ScriptedTransport {
        fn with_script(
            connect_results: Vec<Result<(), TransportError>>,
            messages: Vec<Result<Option<InboundMessage>, TransportError>>,
        ) -> Arc<Self> {
            Arc::new(Self {
                state: Mutex::new(ScriptedState {
                    connect_results: connect_results.into(),
                    messages: messages.into(),
                    connect_attempts: 0,
                    acknowledgements: Vec::new(),
                }),
            })
        }
    }

    #[async_trait]
    impl MessageTransport for ScriptedTransport {
        async fn connect(&self) -> Result<(), TransportError> {
            let mut state = self.state.lock().await;
            state.connect_attempts += 1;
            state.connect_results.pop_front().unwrap_or(Ok(()))
        }

        async fn next_message(&self) -> Result<Option<InboundMessage>, TransportError> {
            let mut state = self.state.lock().await;
            state.messages.pop_front().unwrap_or(Ok(None))
        }

        async fn acknowledge(&self, envelope_id: &str) -> Result<(), TransportError> {
            let mut state = self.state.lock().await;
            state.acknowledgements.push(envelope_id.to_owned());
            Ok(())
        }

        async fn disconnect(&self) -> Result<(), TransportError> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingHandler {
        handled: Mutex<Vec<String>>,
        fail_on: Option<String>,
    }

    #[async_trait]
    impl MessageHandler for RecordingHandler {
        async fn handle_message(&self, message: &InboundMessage) -> anyhow::Result<()> {
            self.handled.lock().await.push(message.text.clone());
            if self.fail_on.as_deref() == Some(message.text.as_str()) {
                anyhow::bail!("handler failure for {}", message.text);
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn reconnects_after_initial_connect_failure() {
        let transport = ScriptedTransport::with_script(
            vec![Err(TransportError::Connect("network down".to_owned())), Ok(())],
            vec![Ok(Some(message("env-1", "hello"))), Ok(None)],
        );
        let handler = Arc::new(RecordingHandler::default());

        let runner = MessageLoop::new(
            transport.clone(),
            handler.clone(),
            ReconnectPolicy { max_retries: 2, base_delay_ms: 0, max_delay_ms: 0 },
        );

        runner.start().await.expect("runner should not fail");

        let state = transport.state.lock().await;
        assert_eq!(state.connect_attempts, 2);
        assert_eq!(state.acknowledgements, vec!["env-1"]);
        drop(state);
        assert_eq!(*handler.handled.lock().await, vec!["hello"]);
    }

    #[tokio::test]
    async fn exhausts_retries_without_crashing() {
        let transport = ScriptedTransport::with_script(
            vec![
                Err(TransportError::Connect("fail-1".to_owned())),
                Err(TransportError::Connect("fail-2".to_owned())),
                Err(TransportError::Connect("fail-3".to_owned())),
            ],
            vec![],
        );

        let runner = MessageLoop::new(
            transport.clone(),
            Arc::new(RecordingHandler::default()),
            ReconnectPolicy { max_retries: 2, base_delay_ms: 0, max_delay_ms: 0 },
        );

        runner.start().await.expect("runner should degrade gracefully");
        assert_eq!(transport.state.lock().await.connect_attempts, 3);
    }

    #[tokio::test]
    async fn handler_failure_does_not_stop_the_loop() {
        let transport = ScriptedTransport::with_script(
            vec![Ok(())],
            vec![
                Ok(Some(message("env-1", "boom"))),
                Ok(Some(message("env-2", "hello"))),
                Ok(None),
            ],
        );
        let handler =
            Arc::new(RecordingHandler { fail_on: Some("boom".to_owned()), ..Default::default() });

        let runner =
            MessageLoop::new(transport.clone(), handler.clone(), ReconnectPolicy::default());

        runner.start().await.expect("runner survives handler failure");
        assert_eq!(*handler.handled.lock().await, vec!["boom", "hello"]);
        assert_eq!(transport.state.lock().await.acknowledgements, vec!["env-1", "env-2"]);
    }

    #[test]
    fn backoff_is_bounded_by_max_delay() {
        let policy = ReconnectPolicy { max_retries: 10, base_delay_ms: 250, max_delay_ms: 5_000 };
        assert_eq!(policy.backoff(0).as_millis(), 250);
        assert_eq!(policy.backoff(1).as_millis(), 500);
        assert_eq!(policy.backoff(10).as_millis(), 5_000);
    }
}
