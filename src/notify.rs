//! Outbound notifications to alumni.
//!
//! Delivery is best effort. A failed notification is logged and never fails
//! the operation that triggered it.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::sync::Arc;

use aws_sdk_sns::{error::BuildError, types::MessageAttributeValue, Client as SnsClient};
use log::{info, warn};
use rocket::serde::json::serde_json;
use serde::Serialize;
use thiserror::Error;

/// Kinds of notification the system sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Event {
    RegistrationReceived,
    RegistrationApproved,
    RegistrationRejected,
    OtpIssued,
    BallotAccepted,
}

impl Event {
    fn subject(self) -> &'static str {
        match self {
            Self::RegistrationReceived => "Your alumni registration was received",
            Self::RegistrationApproved => "Your alumni registration was approved",
            Self::RegistrationRejected => "Your alumni registration was not approved",
            Self::OtpIssued => "Your sign-in code",
            Self::BallotAccepted => "Your ballot was recorded",
        }
    }
}

impl Display for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::RegistrationReceived => "registration_received",
            Self::RegistrationApproved => "registration_approved",
            Self::RegistrationRejected => "registration_rejected",
            Self::OtpIssued => "otp_issued",
            Self::BallotAccepted => "ballot_accepted",
        };
        write!(f, "{name}")
    }
}

/// A message for one recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub event: Event,
    /// Email address of the recipient.
    pub recipient: String,
    pub payload: BTreeMap<String, String>,
}

impl Notification {
    pub fn new(event: Event, recipient: impl Into<String>) -> Self {
        Self {
            event,
            recipient: recipient.into(),
            payload: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.payload.insert(key.to_string(), value.into());
        self
    }
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error(transparent)]
    Sns(#[from] aws_sdk_sns::Error),
    #[error(transparent)]
    Build(#[from] BuildError),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Something that can deliver notifications.
#[rocket::async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError>;
}

pub type SharedNotifier = Arc<dyn Notifier>;

/// Send a notification, logging rather than propagating any failure.
pub async fn notify(notifier: &dyn Notifier, notification: Notification) {
    if let Err(err) = notifier.send(&notification).await {
        warn!(
            "Failed to send {} notification to {}: {err}",
            notification.event, notification.recipient
        );
    }
}

/// Publishes notifications to an SNS topic, for a downstream mailer.
pub struct SnsNotifier {
    client: SnsClient,
    topic_arn: String,
}

impl SnsNotifier {
    pub fn new(client: SnsClient, topic_arn: String) -> Self {
        Self { client, topic_arn }
    }
}

#[rocket::async_trait]
impl Notifier for SnsNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        let message = serde_json::to_string(notification)?;
        let attribute = |value: String| {
            MessageAttributeValue::builder()
                .data_type("String")
                .string_value(value)
                .build()
        };
        self.client
            .publish()
            .topic_arn(&self.topic_arn)
            .subject(notification.event.subject())
            .message(message)
            .message_attributes("event", attribute(notification.event.to_string())?)
            .message_attributes("recipient", attribute(notification.recipient.clone())?)
            .send()
            .await
            .map_err(aws_sdk_sns::Error::from)?;
        Ok(())
    }
}

/// Writes notifications to the log. Used when no topic is configured.
pub struct LogNotifier;

#[rocket::async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        // Never log secrets from the payload.
        info!(
            "Notification {} for {} (not delivered: no topic configured)",
            notification.event, notification.recipient
        );
        Ok(())
    }
}

#[cfg(test)]
pub use recording::RecordingNotifier;
