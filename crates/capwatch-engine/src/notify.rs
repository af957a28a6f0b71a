//! Alert publishing
//!
//! Renders consolidated alerts for every delivery protocol of the notification
//! topic and publishes them through the registry's notification sink.

use capwatch_clients::{NotificationMessage, RetryExecutor};
use capwatch_core::constants::NOTIFICATION_SERVICE;
use capwatch_core::{
    truncate_string, AlertMessage, ConsolidatedAlert, CycleError, CycleErrorKind,
};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::consolidate::format_amount;

const SMS_MAX_CHARS: usize = 140;

/// Render `alert` into subject, default, email, sms and json variants.
pub fn render_alert(alert: &ConsolidatedAlert) -> AlertMessage {
    let count = alert.violation_count();
    let subject = format!(
        "[{}] Quota alert: {} ({} violation{})",
        alert.severity,
        alert.target_name,
        count,
        if count == 1 { "" } else { "s" }
    );

    let email_text = format!(
        "{}\nReview the quotas above and request limit increases where needed.\nTarget id: {}\n",
        alert.message, alert.target_id
    );

    let top = alert.violations.first().map(|v| {
        format!(
            " Top: {} {:.1}% ({}/{})",
            v.result.quota_name(),
            v.result.utilization_percentage(),
            format_amount(v.result.current_usage()),
            format_amount(v.result.limit())
        )
    });
    let sms_text = truncate_string(
        &format!(
            "{}: {} quota(s) over threshold on {}.{}",
            alert.severity,
            count,
            alert.target_name,
            top.unwrap_or_default()
        ),
        SMS_MAX_CHARS,
    );

    AlertMessage {
        subject,
        default_text: alert.message.clone(),
        email_text,
        sms_text,
        json_payload: alert.payload.clone(),
    }
}

/// Publishes alerts to one notification topic
pub struct AlertPublisher {
    executor: RetryExecutor,
    topic: Option<String>,
    enabled: AtomicBool,
}

impl AlertPublisher {
    /// Publishing is disabled when `topic` is `None`.
    pub fn new(executor: RetryExecutor, topic: Option<String>) -> Self {
        let enabled = topic.is_some();
        Self {
            executor,
            topic,
            enabled: AtomicBool::new(enabled),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Check the topic once. An unreachable topic disables publishing.
    pub async fn validate_topic(&self) -> bool {
        let Some(topic) = self.topic.as_deref() else {
            return false;
        };
        let Some(sink) = self.executor.registry().notifications(NOTIFICATION_SERVICE).await else {
            tracing::warn!("No notification client, alert publishing disabled");
            self.enabled.store(false, Ordering::Relaxed);
            return false;
        };

        let sink = &sink;
        let valid = self
            .executor
            .call(NOTIFICATION_SERVICE, "get_topic_attributes", move || {
                sink.validate_topic(topic)
            })
            .await;
        match valid {
            Ok(()) => {
                tracing::info!("Notification topic validated");
                self.enabled.store(true, Ordering::Relaxed);
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "Notification topic invalid, alert publishing disabled");
                self.enabled.store(false, Ordering::Relaxed);
                false
            }
        }
    }

    /// Publish every alert. Returns the number sent and one error per failure.
    pub async fn publish_all(&self, alerts: &[ConsolidatedAlert]) -> (usize, Vec<CycleError>) {
        if alerts.is_empty() {
            return (0, Vec::new());
        }
        let Some(topic) = self.topic.as_deref().filter(|_| self.is_enabled()) else {
            tracing::info!(alerts = alerts.len(), "Alert publishing disabled, not sending");
            return (0, Vec::new());
        };
        let Some(sink) = self.executor.registry().notifications(NOTIFICATION_SERVICE).await else {
            let error = CycleError::new(
                CycleErrorKind::Notification,
                "no notification client registered",
            )
            .with_service(NOTIFICATION_SERVICE);
            return (0, vec![error]);
        };

        let sink = &sink;
        let mut sent = 0usize;
        let mut errors = Vec::new();
        for alert in alerts {
            let rendered = render_alert(alert);
            let message = NotificationMessage {
                default_text: rendered.default_text,
                email_text: rendered.email_text,
                sms_text: rendered.sms_text,
                json_payload: rendered.json_payload,
            };
            let (message, subject) = (&message, rendered.subject.as_str());

            match self
                .executor
                .call(NOTIFICATION_SERVICE, "publish", move || {
                    sink.publish(topic, message, subject)
                })
                .await
            {
                Ok(()) => {
                    tracing::info!(
                        target_id = %alert.target_id,
                        severity = %alert.severity,
                        violations = alert.violation_count(),
                        "Alert published"
                    );
                    sent += 1;
                }
                Err(e) => {
                    tracing::error!(target_id = %alert.target_id, error = %e, "Failed to publish alert");
                    errors.push(
                        CycleError::new(CycleErrorKind::Notification, e.to_string())
                            .with_resource(alert.target_id.clone())
                            .with_service(NOTIFICATION_SERVICE),
                    );
                }
            }
        }
        (sent, errors)
    }
}
