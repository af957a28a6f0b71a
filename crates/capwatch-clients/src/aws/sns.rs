use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_sns::Client;
use capwatch_core::constants::NOTIFICATION_SERVICE;
use capwatch_core::{ErrorKind, RemoteError};
use serde_json::json;

use super::sdk_error;
use crate::traits::{NotificationMessage, NotificationSink};

/// SNS subjects are limited to 100 characters.
const MAX_SUBJECT_LEN: usize = 100;

/// SNS `Publish` with a per-protocol JSON message structure
#[derive(Clone)]
pub struct SnsNotificationSink {
    client: Client,
}

impl SnsNotificationSink {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            client: Client::new(config),
        }
    }
}

fn truncate_subject(subject: &str) -> String {
    subject.chars().take(MAX_SUBJECT_LEN).collect()
}

#[async_trait]
impl NotificationSink for SnsNotificationSink {
    #[tracing::instrument(skip(self, message), fields(aws.service.name = "sns"))]
    async fn publish(
        &self,
        topic: &str,
        message: &NotificationMessage,
        subject: &str,
    ) -> Result<(), RemoteError> {
        let operation = "publish";
        let structured = json!({
            "default": message.default_text,
            "email": message.email_text,
            "sms": message.sms_text,
            "json": message.json_payload.to_string(),
        });
        let body = serde_json::to_string(&structured).map_err(|e| {
            RemoteError::new(ErrorKind::Validation, NOTIFICATION_SERVICE, operation, e.to_string())
        })?;

        self.client
            .publish()
            .topic_arn(topic)
            .subject(truncate_subject(subject))
            .message(body)
            .message_structure("json")
            .send()
            .await
            .map(|_| ())
            .map_err(|e| sdk_error(NOTIFICATION_SERVICE, operation, e))
    }

    async fn validate_topic(&self, topic: &str) -> Result<(), RemoteError> {
        self.client
            .get_topic_attributes()
            .topic_arn(topic)
            .send()
            .await
            .map(|_| ())
            .map_err(|e| sdk_error(NOTIFICATION_SERVICE, "get_topic_attributes", e))
    }
}
