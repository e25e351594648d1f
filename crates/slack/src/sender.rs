use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use garagebot_core::GarageError;

use crate::client::SlackApi;
use crate::directory::DirectoryResolver;

/// Outbound addressing: either a set of user display names (delivered to a
/// direct conversation) or a channel ID with an optional thread. The two
/// modes are mutually exclusive per call.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OutboundMessage {
    pub users: Vec<String>,
    pub channel: Option<String>,
    pub thread: Option<String>,
    pub text: String,
}

impl OutboundMessage {
    pub fn to_users<I, S>(users: I, text: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            users: users.into_iter().map(Into::into).collect(),
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn to_channel(
        channel: impl Into<String>,
        thread: Option<String>,
        text: impl Into<String>,
    ) -> Self {
        Self { channel: Some(channel.into()), thread, text: text.into(), ..Self::default() }
    }

    fn validate(&self) -> Result<(), GarageError> {
        match (self.users.is_empty(), &self.channel) {
            (false, Some(_)) => Err(GarageError::invalid_argument(
                "cannot address both users and a channel in one send",
            )),
            (true, None) => Err(GarageError::invalid_argument(
                "send requires either users or a channel",
            )),
            (false, None) if self.thread.is_some() => Err(GarageError::invalid_argument(
                "a threaded reply requires a channel",
            )),
            _ => Ok(()),
        }
    }
}

/// Delivery seam the dispatcher talks to.
#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send_text(&self, message: OutboundMessage) -> Result<(), GarageError>;
}

pub struct MessageSender {
    api: Arc<dyn SlackApi>,
    directory: Arc<DirectoryResolver>,
}

impl MessageSender {
    pub fn new(api: Arc<dyn SlackApi>, directory: Arc<DirectoryResolver>) -> Self {
        Self { api, directory }
    }
}

#[async_trait]
impl Messenger for MessageSender {
    async fn send_text(&self, message: OutboundMessage) -> Result<(), GarageError> {
        message.validate()?;

        if let Some(channel) = &message.channel {
            debug!(channel = %channel, threaded = message.thread.is_some(), "posting to channel");
            self.api.post_message(channel, message.thread.as_deref(), &message.text).await?;
            return Ok(());
        }

        let mut user_ids = Vec::with_capacity(message.users.len());
        for user in &message.users {
            user_ids.push(self.directory.resolve_user(user).await?);
        }

        let conversation = self.api.open_conversation(&user_ids).await?;
        debug!(conversation = %conversation, recipients = user_ids.len(), "posting direct message");
        self.api.post_message(&conversation, None, &message.text).await?;
        Ok(())
    }
}
