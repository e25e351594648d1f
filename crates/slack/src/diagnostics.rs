use std::sync::Arc;

use tracing::{debug, warn};

use crate::directory::DirectoryResolver;
use crate::sender::{Messenger, OutboundMessage};

/// A classification the bot did not act on: raw utterance, the intent the
/// classifier guessed, and the score that fell short.
#[derive(Clone, Debug, PartialEq)]
pub struct DiagnosticRecord {
    pub text: String,
    pub intent: &'static str,
    pub score: f64,
}

/// Posts low-confidence classifications to a dedicated Slack channel so
/// operators can watch misunderstood requests without disturbing the
/// conversational reply.
///
/// The channel name is resolved once at startup. If it cannot be resolved
/// the side-channel is disabled with a warning; it never fails startup.
pub struct SlackDiagnostics {
    messenger: Arc<dyn Messenger>,
    channel_id: Option<String>,
}

impl SlackDiagnostics {
    pub async fn resolve(
        messenger: Arc<dyn Messenger>,
        directory: &DirectoryResolver,
        channel_name: Option<&str>,
    ) -> Self {
        let channel_id = match channel_name {
            Some(name) => match directory.resolve_channel(name).await {
                Ok(id) => {
                    debug!(channel = name, "diagnostic channel available");
                    Some(id)
                }
                Err(error) => {
                    warn!(
                        channel = name,
                        error = %error,
                        "unable to find diagnostic channel; slack diagnostics disabled"
                    );
                    None
                }
            },
            None => {
                warn!("no diagnostic channel configured; slack diagnostics disabled");
                None
            }
        };

        Self { messenger, channel_id }
    }

    pub fn disabled(messenger: Arc<dyn Messenger>) -> Self {
        Self { messenger, channel_id: None }
    }

    /// Diagnostics bound to an already-known channel ID, skipping resolution.
    pub fn with_channel_id(messenger: Arc<dyn Messenger>, channel_id: impl Into<String>) -> Self {
        Self { messenger, channel_id: Some(channel_id.into()) }
    }

    pub fn is_enabled(&self) -> bool {
        self.channel_id.is_some()
    }

    /// Fire-and-forget post; the conversational reply must not wait on the
    /// side-channel. Returns the spawned task so tests can await delivery.
    pub fn record_low_confidence(
        &self,
        record: DiagnosticRecord,
    ) -> Option<tokio::task::JoinHandle<()>> {
        let channel_id = self.channel_id.clone()?;
        let messenger = self.messenger.clone();

        Some(tokio::spawn(async move {
            let text = format!(
                "Low-confidence classification: intent `{}` at {:.2} for \"{}\"",
                record.intent, record.score, record.text
            );
            if let Err(error) = messenger
                .send_text(OutboundMessage::to_channel(channel_id, None, text))
                .await
            {
                warn!(error = %error, "failed to post diagnostic record");
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use tokio::sync::Mutex;

    use super::{DiagnosticRecord, SlackDiagnostics};
    use crate::client::{ApiError, DirectoryEntry, DirectoryPage, SlackApi};
    use crate::directory::DirectoryResolver;
    use crate::sender::{Messenger, OutboundMessage};
    use garagebot_core::GarageError;

    #[derive(Default)]
    struct RecordingMessenger {
        sent: Mutex<Vec<OutboundMessage>>,
    }

    #[async_trait]
    impl Messenger for RecordingMessenger {
        async fn send_text(&self, message: OutboundMessage) -> Result<(), GarageError> {
            self.sent.lock().await.push(message);
            Ok(())
        }
    }

    struct OneChannelApi;

    #[async_trait]
    impl SlackApi for OneChannelApi {
        async fn users_page(
            &self,
            _limit: u32,
            _cursor: Option<&str>,
        ) -> Result<DirectoryPage, ApiError> {
            Ok(DirectoryPage::default())
        }

        async fn channels_page(
            &self,
            _limit: u32,
            _cursor: Option<&str>,
        ) -> Result<DirectoryPage, ApiError> {
            Ok(DirectoryPage {
                entries: vec![DirectoryEntry {
                    id: "C900".to_owned(),
                    name: "garagebot-logs".to_owned(),
                }],
                next_cursor: None,
            })
        }

        async fn open_conversation(&self, _user_ids: &[String]) -> Result<String, ApiError> {
            Ok("D1".to_owned())
        }

        async fn post_message(
            &self,
            _channel_id: &str,
            _thread_ts: Option<&str>,
            _text: &str,
        ) -> Result<(), ApiError> {
            Ok(())
        }
    }

    fn record() -> DiagnosticRecord {
        DiagnosticRecord { text: "open sesame".to_owned(), intent: "OPEN_DOOR", score: 0.42 }
    }

    #[tokio::test]
    async fn resolves_channel_and_posts_records() {
        let messenger = Arc::new(RecordingMessenger::default());
        let directory = DirectoryResolver::new(Arc::new(OneChannelApi), 50);
        let diagnostics =
            SlackDiagnostics::resolve(messenger.clone(), &directory, Some("#garagebot-logs")).await;
        assert!(diagnostics.is_enabled());

        let task = diagnostics.record_low_confidence(record()).expect("enabled");
        task.await.expect("post task");

        let sent = messenger.sent.lock().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].channel.as_deref(), Some("C900"));
        assert!(sent[0].text.contains("OPEN_DOOR"));
        assert!(sent[0].text.contains("0.42"));
        assert!(sent[0].text.contains("open sesame"));
    }

    #[tokio::test]
    async fn unresolvable_channel_disables_the_side_channel() {
        let messenger = Arc::new(RecordingMessenger::default());
        let directory = DirectoryResolver::new(Arc::new(OneChannelApi), 50);
        let diagnostics =
            SlackDiagnostics::resolve(messenger.clone(), &directory, Some("#no-such-channel"))
                .await;

        assert!(!diagnostics.is_enabled());
        assert!(diagnostics.record_low_confidence(record()).is_none());
        assert!(messenger.sent.lock().await.is_empty());
    }

    #[tokio::test]
    async fn missing_configuration_disables_the_side_channel() {
        let messenger = Arc::new(RecordingMessenger::default());
        let directory = DirectoryResolver::new(Arc::new(OneChannelApi), 50);
        let diagnostics = SlackDiagnostics::resolve(messenger, &directory, None).await;

        assert!(!diagnostics.is_enabled());
    }
}
