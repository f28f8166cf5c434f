//! Email notifications for billing events
//!
//! Sends transactional emails via Resend API. Currently used for trial
//! ending reminders, sent by a periodic background task.

use std::sync::Arc;

use time::{Duration, OffsetDateTime};

use crate::error::BillingResult;
use crate::store::SubscriptionStore;

/// Email configuration
#[derive(Debug, Clone)]
pub struct EmailConfig {
    /// Resend API key
    pub resend_api_key: String,
    /// From address for emails
    pub email_from: String,
    /// App name for branding
    pub app_name: String,
    /// Public app URL for links
    pub app_url: String,
}

impl EmailConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        Self {
            resend_api_key: std::env::var("RESEND_API_KEY").unwrap_or_default(),
            email_from: std::env::var("EMAIL_FROM")
                .unwrap_or_else(|_| "LinkBio <noreply@linkbio.app>".to_string()),
            app_name: std::env::var("APP_NAME").unwrap_or_else(|_| "LinkBio".to_string()),
            app_url: std::env::var("PUBLIC_URL")
                .unwrap_or_else(|_| "https://linkbio.app".to_string()),
        }
    }

    /// Check if email sending is enabled
    pub fn is_enabled(&self) -> bool {
        !self.resend_api_key.is_empty()
    }
}

/// Billing email notification service
#[derive(Clone)]
pub struct BillingEmailService {
    config: EmailConfig,
    client: reqwest::Client,
}

impl BillingEmailService {
    pub fn new(config: EmailConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    pub fn from_env() -> Self {
        Self::new(EmailConfig::from_env())
    }

    /// Send an email via Resend API
    ///
    /// Returns `Ok(true)` if the email was sent successfully,
    /// `Ok(false)` if sending failed or email is not configured. Delivery
    /// failures are logged but never propagated; billing flows must not
    /// fail because a notification did not go out.
    async fn send_email(&self, to: &str, subject: &str, html: &str) -> BillingResult<bool> {
        if !self.config.is_enabled() {
            tracing::warn!(
                to = %to,
                subject = %subject,
                "Email not configured, skipping"
            );
            return Ok(false);
        }

        let body = serde_json::json!({
            "from": self.config.email_from,
            "to": [to],
            "subject": subject,
            "html": html
        });

        let response = self
            .client
            .post("https://api.resend.com/emails")
            .header(
                "Authorization",
                format!("Bearer {}", self.config.resend_api_key),
            )
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().is_success() => {
                tracing::info!(to = %to, subject = %subject, "Billing email sent");
                Ok(true)
            }
            Ok(resp) => {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                tracing::error!(
                    to = %to,
                    subject = %subject,
                    status = %status,
                    body = %body,
                    "Failed to send billing email - non-fatal"
                );
                Ok(false)
            }
            Err(e) => {
                tracing::error!(
                    to = %to,
                    subject = %subject,
                    error = %e,
                    "Failed to send billing email - non-fatal"
                );
                Ok(false)
            }
        }
    }

    /// Send trial ending reminder
    pub async fn send_trial_ending(&self, to: &str, days_remaining: i64) -> BillingResult<bool> {
        let pricing_link = format!("{}/pricing", self.config.app_url);

        let html = format!(
            r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"></head>
<body style="font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; line-height: 1.6; color: #333; max-width: 600px; margin: 0 auto; padding: 20px;">
    <h2 style="color: #f59e0b;">Your Trial is Ending Soon</h2>
    <p>Hi there,</p>
    <p>Your <strong>Premium</strong> trial will end in <strong>{days_remaining} day{s}</strong>.</p>
    <p>After the trial ends your card will be charged automatically. If you do not wish to continue, you can cancel anytime before then.</p>
    <p>
        <a href="{pricing_link}" style="display: inline-block; padding: 12px 24px; background-color: #6366f1; color: white; text-decoration: none; border-radius: 6px; font-weight: bold;">
            Manage Subscription
        </a>
    </p>
    <hr style="border: none; border-top: 1px solid #eee; margin: 20px 0;">
    <p style="color: #999; font-size: 12px;">{app_name}</p>
</body>
</html>"#,
            days_remaining = days_remaining,
            s = if days_remaining == 1 { "" } else { "s" },
            pricing_link = pricing_link,
            app_name = self.config.app_name,
        );

        self.send_email(
            to,
            &format!(
                "Trial Ending in {} Day{} - {}",
                days_remaining,
                if days_remaining == 1 { "" } else { "s" },
                self.config.app_name
            ),
            &html,
        )
        .await
    }
}

/// Background task that reminds users whose trial ends in the next 1 to 3
/// days. Runs off the local mirror, so a user is only reminded if they have
/// checked their status since the trial started.
pub struct TrialReminderService<S> {
    store: Arc<S>,
    email: BillingEmailService,
}

impl<S: SubscriptionStore> TrialReminderService<S> {
    pub fn new(store: Arc<S>, email: BillingEmailService) -> Self {
        Self { store, email }
    }

    /// Scan for trials ending soon and send one reminder per user.
    /// Returns the number of reminders sent.
    pub async fn run_once(&self) -> BillingResult<usize> {
        let now = OffsetDateTime::now_utc();
        let records = self
            .store
            .trials_ending_between(now + Duration::days(1), now + Duration::days(3))
            .await?;

        let mut sent = 0;
        for record in &records {
            let Some(trial_end) = record.trial_end else {
                continue;
            };
            let days_remaining = (trial_end - now).whole_days().max(1);
            if self
                .email
                .send_trial_ending(&record.email, days_remaining)
                .await?
            {
                sent += 1;
            }
        }

        if !records.is_empty() {
            tracing::info!(
                candidates = records.len(),
                sent,
                "Processed trial ending reminders"
            );
        }
        Ok(sent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemorySubscriptionStore, SubscriptionRecord};
    use linkbio_shared::{PlanName, SubscriptionStatus};
    use uuid::Uuid;

    fn trial_record(email: &str, trial_end: OffsetDateTime) -> SubscriptionRecord {
        let mut record =
            SubscriptionRecord::free(Uuid::new_v4(), email, SubscriptionStatus::Active);
        record.plan_name = PlanName::Premium;
        record.trial_end = Some(trial_end);
        record
    }

    #[tokio::test]
    async fn test_unconfigured_email_sends_nothing() {
        let config = EmailConfig {
            resend_api_key: String::new(),
            email_from: "t@x.com".to_string(),
            app_name: "LinkBio".to_string(),
            app_url: "https://app.test".to_string(),
        };
        let store = Arc::new(MemorySubscriptionStore::new());
        let now = OffsetDateTime::now_utc();
        store
            .upsert(&trial_record("a@x.com", now + Duration::days(2)))
            .await
            .unwrap();

        let reminder = TrialReminderService::new(store, BillingEmailService::new(config));
        let sent = reminder.run_once().await.unwrap();
        assert_eq!(sent, 0);
    }

    #[tokio::test]
    async fn test_only_trials_in_window_are_candidates() {
        let store = Arc::new(MemorySubscriptionStore::new());
        let now = OffsetDateTime::now_utc();
        store
            .upsert(&trial_record("soon@x.com", now + Duration::days(2)))
            .await
            .unwrap();
        store
            .upsert(&trial_record("far@x.com", now + Duration::days(10)))
            .await
            .unwrap();

        let records = store
            .trials_ending_between(now + Duration::days(1), now + Duration::days(3))
            .await
            .unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].email, "soon@x.com");
    }

    #[test]
    fn test_email_disabled_without_api_key() {
        let config = EmailConfig {
            resend_api_key: String::new(),
            email_from: "t@x.com".to_string(),
            app_name: "LinkBio".to_string(),
            app_url: "https://app.test".to_string(),
        };
        assert!(!config.is_enabled());
    }
}
