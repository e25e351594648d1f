//! Slack integration for garagebot:
//! - **Web API client** (`client`) - `users.list`, `conversations.list`,
//!   `conversations.open`, `chat.postMessage` behind the `SlackApi` trait
//! - **Directory** (`directory`) - display/channel name → ID resolution with
//!   paginated lookup and a process-lifetime cache
//! - **Sender** (`sender`) - outbound addressing validation and delivery
//! - **Socket** (`socket`) - inbound message loop with reconnection logic
//! - **Diagnostics** (`diagnostics`) - low-confidence side-channel posts
//!
//! Set `GARAGEBOT_SLACK_APP_TOKEN` / `GARAGEBOT_SLACK_BOT_TOKEN` from your
//! app at https://api.slack.com/apps.

pub mod client;
pub mod diagnostics;
pub mod directory;
pub mod sender;
pub mod socket;

pub use client::{ApiError, DirectoryEntry, DirectoryPage, SlackApi, WebApiClient};
pub use diagnostics::{DiagnosticRecord, SlackDiagnostics};
pub use directory::DirectoryResolver;
pub use sender::{MessageSender, Messenger, OutboundMessage};
pub use socket::{
    InboundMessage, MessageHandler, MessageLoop, MessageTransport, NoopMessageTransport,
    ReconnectPolicy,
};
