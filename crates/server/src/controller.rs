use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use garagebot_core::GarageError;
use garagebot_gpio::relay::DoorRemote;
use garagebot_gpio::sensor::{DoorObserver, DoorState, DoorStateHandle};
use garagebot_nlp::{Classification, Intent, IntentClassifier};
use garagebot_slack::diagnostics::{DiagnosticRecord, SlackDiagnostics};
use garagebot_slack::sender::{Messenger, OutboundMessage};
use garagebot_slack::socket::{InboundMessage, MessageHandler};

const NOT_UNDERSTOOD: &str = "I'm not sure what you're saying. Can you try again?";
const FALLBACK: &str = "I'm afraid I didn't understand that. Can you repeat that please?";
const GREETING_FALLBACK: &str = "Hello!";
const OPENING_FALLBACK: &str = "Ok, opening the garage door.";
const CLOSING_FALLBACK: &str = "Ok, closing the garage door.";
const HELP_TEXT: &str = "Here's what I can do:\n\
    • *Open the garage door* — \"open the door\", \"open up\"\n\
    • *Close it* — \"close the door\", \"shut it\"\n\
    • *Report its state* — \"is it open?\", \"door state\"\n\
    Say hello any time to check that I'm up.";

/// Turns one classified chat message into exactly one reply and at most one
/// hardware action, and fans confirmed door transitions out to the
/// configured recipients.
///
/// The relay pulse runs to completion before the confirmation reply is
/// posted, so a confirmation always means the button was actually pressed.
pub struct Controller {
    classifier: Arc<dyn IntentClassifier>,
    messenger: Arc<dyn Messenger>,
    remote: Arc<dyn DoorRemote>,
    door_state: DoorStateHandle,
    diagnostics: Arc<SlackDiagnostics>,
    confidence_threshold: f64,
    door_event_recipients: Vec<String>,
}

impl Controller {
    pub fn new(
        classifier: Arc<dyn IntentClassifier>,
        messenger: Arc<dyn Messenger>,
        remote: Arc<dyn DoorRemote>,
        door_state: DoorStateHandle,
        diagnostics: Arc<SlackDiagnostics>,
        confidence_threshold: f64,
        door_event_recipients: Vec<String>,
    ) -> Self {
        Self {
            classifier,
            messenger,
            remote,
            door_state,
            diagnostics,
            confidence_threshold,
            door_event_recipients,
        }
    }

    async fn compose_reply(&self, text: &str, classification: Classification) -> String {
        if classification.score < self.confidence_threshold {
            info!(
                intent = classification.intent.tag(),
                score = classification.score,
                "classification below confidence threshold"
            );
            self.diagnostics.record_low_confidence(DiagnosticRecord {
                text: text.to_owned(),
                intent: classification.intent.tag(),
                score: classification.score,
            });
            return NOT_UNDERSTOOD.to_owned();
        }

        match classification.intent {
            Intent::Greeting => {
                classification.answer.unwrap_or_else(|| GREETING_FALLBACK.to_owned())
            }
            Intent::OpenDoor => self.press_and_confirm(classification.answer, OPENING_FALLBACK).await,
            Intent::CloseDoor => self.press_and_confirm(classification.answer, CLOSING_FALLBACK).await,
            Intent::QueryState => {
                format!("The garage door is currently {}.", self.door_state.current().word())
            }
            Intent::Help => HELP_TEXT.to_owned(),
            Intent::None => {
                self.diagnostics.record_low_confidence(DiagnosticRecord {
                    text: text.to_owned(),
                    intent: classification.intent.tag(),
                    score: classification.score,
                });
                FALLBACK.to_owned()
            }
        }
    }

    async fn press_and_confirm(&self, answer: Option<String>, fallback: &str) -> String {
        match self.remote.press().await {
            Ok(()) => answer.unwrap_or_else(|| fallback.to_owned()),
            Err(error) => {
                warn!(error = %error, "remote press failed");
                GarageError::from(error).user_message().to_owned()
            }
        }
    }
}

#[async_trait]
impl MessageHandler for Controller {
    async fn handle_message(&self, message: &InboundMessage) -> anyhow::Result<()> {
        let reply = match self.classifier.process(&message.text).await {
            Ok(classification) => self.compose_reply(&message.text, classification).await,
            Err(error) => {
                // The user still gets a textual reply, never silence.
                warn!(error = %error, "classifier failed; replying generically");
                GarageError::integration(error.to_string()).user_message().to_owned()
            }
        };

        self.messenger
            .send_text(OutboundMessage::to_channel(
                message.channel_id.clone(),
                Some(message.ts.clone()),
                reply,
            ))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl DoorObserver for Controller {
    async fn door_changed(&self, state: DoorState) -> anyhow::Result<()> {
        if self.door_event_recipients.is_empty() {
            return Ok(());
        }

        let text = match state {
            DoorState::Open => "The garage door just opened.",
            DoorState::Closed => "The garage door just closed.",
        };
        info!(state = state.word(), recipients = self.door_event_recipients.len(), "notifying door transition");
        self.messenger
            .send_text(OutboundMessage::to_users(self.door_event_recipients.clone(), text))
            .await?;
        Ok(())
    }
}
